use application::{PasswordHasher, PasswordHasherError};
use async_trait::async_trait;
use bcrypt::{hash, verify, DEFAULT_COST};
use domain::PasswordHash;

/// bcrypt 密码哈希，计算放在阻塞线程池中执行
#[derive(Debug, Clone)]
pub struct BcryptPasswordHasher {
    cost: u32,
}

impl BcryptPasswordHasher {
    /// `cost` 的合法范围是 4..=31，由配置校验保证
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }
}

#[async_trait]
impl PasswordHasher for BcryptPasswordHasher {
    async fn hash(&self, plaintext: &str) -> Result<PasswordHash, PasswordHasherError> {
        let cost = self.cost;
        let plaintext = plaintext.to_owned();
        let hashed = tokio::task::spawn_blocking(move || hash(plaintext, cost))
            .await
            .map_err(|err| PasswordHasherError::hash_error(err.to_string()))?
            .map_err(|err| PasswordHasherError::hash_error(err.to_string()))?;

        PasswordHash::new(hashed).map_err(|err| PasswordHasherError::hash_error(err.to_string()))
    }

    async fn verify(
        &self,
        plaintext: &str,
        hashed: &PasswordHash,
    ) -> Result<bool, PasswordHasherError> {
        let plaintext = plaintext.to_owned();
        let hashed = hashed.as_str().to_owned();
        let outcome = tokio::task::spawn_blocking(move || verify(plaintext, &hashed))
            .await
            .map_err(|err| PasswordHasherError::verify_error(err.to_string()))?;

        match outcome {
            Ok(matches) => Ok(matches),
            // 存储的哈希格式不合法时按不匹配处理，登录方只会看到凭据错误
            Err(err) => {
                tracing::warn!(error = %err, "stored password hash is malformed");
                Ok(false)
            }
        }
    }
}

impl Default for BcryptPasswordHasher {
    fn default() -> Self {
        Self::new(DEFAULT_COST)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hashes_and_verifies() {
        let hasher = BcryptPasswordHasher::new(4);
        let hashed = hasher.hash("secret1").await.unwrap();

        assert_ne!(hashed.as_str(), "secret1");
        assert!(hasher.verify("secret1", &hashed).await.unwrap());
        assert!(!hasher.verify("secret2", &hashed).await.unwrap());
    }

    #[tokio::test]
    async fn malformed_hash_never_matches() {
        let hasher = BcryptPasswordHasher::new(4);
        let bogus = PasswordHash::new("not-a-bcrypt-hash").unwrap();
        assert!(!hasher.verify("secret1", &bogus).await.unwrap());
    }
}
