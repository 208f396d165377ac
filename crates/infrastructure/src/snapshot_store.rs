//! JSON 文件快照存储
//!
//! 每个集合对应 `<data_dir>/<collection>.json`。写入先落到同目录的临时文件，
//! 再通过 rename 原子替换，崩溃时不会留下写了一半的快照。

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use application::SnapshotStore;
use async_trait::async_trait;
use domain::RepositoryError;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct JsonSnapshotStore {
    dir: PathBuf,
}

impl JsonSnapshotStore {
    /// 打开数据目录，不存在时创建
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, RepositoryError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await.map_err(|err| {
            RepositoryError::storage(format!("create data dir {}: {err}", dir.display()))
        })?;
        tracing::info!(data_dir = %dir.display(), "snapshot store opened");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, collection: &str) -> PathBuf {
        self.dir.join(format!("{collection}.json"))
    }
}

#[async_trait]
impl SnapshotStore for JsonSnapshotStore {
    async fn load(&self, collection: &str) -> Result<Option<Value>, RepositoryError> {
        let path = self.path_for(collection);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(RepositoryError::storage(format!(
                    "read {}: {err}",
                    path.display()
                )))
            }
        };

        let value = serde_json::from_slice(&bytes).map_err(|err| {
            RepositoryError::storage(format!("parse {}: {err}", path.display()))
        })?;
        tracing::debug!(collection, bytes = bytes.len(), "snapshot loaded");
        Ok(Some(value))
    }

    async fn persist(&self, collection: &str, snapshot: Value) -> Result<(), RepositoryError> {
        let path = self.path_for(collection);
        let tmp = self.dir.join(format!(".{collection}.json.tmp"));
        let bytes = serde_json::to_vec_pretty(&snapshot)
            .map_err(|err| RepositoryError::storage(format!("serialize {collection}: {err}")))?;

        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|err| RepositoryError::storage(format!("write {}: {err}", tmp.display())))?;
        tokio::fs::rename(&tmp, &path).await.map_err(|err| {
            RepositoryError::storage(format!("rename into {}: {err}", path.display()))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use application::memory::{MemoryAccountRepository, MemoryMessageRepository};
    use application::{AccountRepository, MessageRepository};
    use chrono::Utc;
    use domain::{
        Account, Message, MessageId, NewAccount, PasswordHash, Role, UserEmail, UserId,
        UserStatus, Username,
    };
    use serde_json::json;
    use std::sync::Arc;

    fn account(name: &str) -> Account {
        Account::new(
            UserId::generate(),
            NewAccount {
                username: Username::parse(name).unwrap(),
                email: UserEmail::parse(format!("{name}@example.com")).unwrap(),
                password_hash: PasswordHash::new("hash").unwrap(),
                avatar: None,
                display_name: None,
            },
            Role::Member,
            UserStatus::Active,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn missing_collection_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSnapshotStore::open(dir.path()).await.unwrap();
        assert!(store.load("accounts").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn persist_replaces_file_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSnapshotStore::open(dir.path().join("nested")).await.unwrap();

        store.persist("settings", json!({"v": 1})).await.unwrap();
        store.persist("settings", json!({"v": 2})).await.unwrap();

        assert_eq!(store.load("settings").await.unwrap(), Some(json!({"v": 2})));
        let names: Vec<_> = std::fs::read_dir(store.dir())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["settings.json".to_owned()]);
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("messages.json"), b"{not json").unwrap();
        let store = JsonSnapshotStore::open(dir.path()).await.unwrap();

        let err = store.load("messages").await.unwrap_err();
        assert!(matches!(err, RepositoryError::Storage { .. }));
    }

    #[tokio::test]
    async fn repositories_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let bob = account("bob");
        let carol = account("carol");

        {
            let store: Arc<dyn SnapshotStore> =
                Arc::new(JsonSnapshotStore::open(dir.path()).await.unwrap());
            let accounts = MemoryAccountRepository::persistent(store.clone())
                .await
                .unwrap();
            let messages = MemoryMessageRepository::persistent(store).await.unwrap();

            accounts.create(bob.clone()).await.unwrap();
            accounts.create(carol.clone()).await.unwrap();
            accounts.remove(carol.id, true).await.unwrap();
            messages
                .append(Message::new(
                    MessageId::generate(),
                    1,
                    &bob,
                    "persisted".into(),
                    Utc::now(),
                ))
                .await
                .unwrap();
        }

        let store: Arc<dyn SnapshotStore> =
            Arc::new(JsonSnapshotStore::open(dir.path()).await.unwrap());
        let accounts = MemoryAccountRepository::persistent(store.clone())
            .await
            .unwrap();
        let messages = MemoryMessageRepository::persistent(store).await.unwrap();

        assert_eq!(accounts.find_by_id(bob.id).await.unwrap(), Some(bob));
        assert!(accounts.find_by_id(carol.id).await.unwrap().is_none());
        assert!(accounts.is_blacklisted(&carol.email).await.unwrap());
        let log = messages.list_all().await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].content, "persisted");
    }
}
