//! 内存仓储实现
//!
//! 每个仓储持有一张表，由 tokio `RwLock` 保护。配置了 [`SnapshotStore`] 时，
//! 修改先作用在副本上，快照写入成功后才替换当前状态，
//! 因此持久化失败不会留下半完成的修改。

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use domain::{
    Account, Message, MessageId, RepositoryError, Session, SessionId, SystemSettings, Timestamp,
    UserEmail, UserId, VerificationCode,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::repository::{
    AccountRepository, MentionCheckRepository, MessageRepository, SessionRepository,
    SettingsRepository, VerificationCodeRepository,
};
use crate::snapshot::SnapshotStore;

struct Table<T> {
    name: &'static str,
    state: RwLock<T>,
    store: Option<Arc<dyn SnapshotStore>>,
}

impl<T> Table<T>
where
    T: Clone + Default + Serialize + DeserializeOwned + Send + Sync,
{
    fn in_memory(name: &'static str) -> Self {
        Self {
            name,
            state: RwLock::new(T::default()),
            store: None,
        }
    }

    async fn open(
        name: &'static str,
        store: Arc<dyn SnapshotStore>,
    ) -> Result<Self, RepositoryError> {
        let state = match store.load(name).await? {
            Some(value) => serde_json::from_value(value).map_err(|err| {
                RepositoryError::storage(format!("corrupt snapshot {name}: {err}"))
            })?,
            None => T::default(),
        };
        Ok(Self {
            name,
            state: RwLock::new(state),
            store: Some(store),
        })
    }

    async fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.state.read().await;
        f(&*guard)
    }

    async fn write<R, F>(&self, f: F) -> Result<R, RepositoryError>
    where
        F: FnOnce(&mut T) -> Result<R, RepositoryError> + Send,
        R: Send,
    {
        let mut guard = self.state.write().await;
        let Some(store) = &self.store else {
            return f(&mut *guard);
        };

        let mut next = guard.clone();
        let output = f(&mut next)?;
        let snapshot = serde_json::to_value(&next).map_err(|err| {
            RepositoryError::storage(format!("serialize {}: {err}", self.name))
        })?;
        store.persist(self.name, snapshot).await?;
        *guard = next;
        Ok(output)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct AccountTable {
    accounts: HashMap<UserId, Account>,
    blacklist: BTreeSet<UserEmail>,
}

impl AccountTable {
    fn check_unique(&self, account: &Account) -> Result<(), RepositoryError> {
        for existing in self.accounts.values().filter(|a| a.id != account.id) {
            if existing.email == account.email {
                return Err(RepositoryError::conflict("email"));
            }
            if existing.username == account.username {
                return Err(RepositoryError::conflict("username"));
            }
        }
        Ok(())
    }
}

pub struct MemoryAccountRepository {
    table: Table<AccountTable>,
}

impl MemoryAccountRepository {
    pub fn new() -> Self {
        Self {
            table: Table::in_memory("accounts"),
        }
    }

    pub async fn persistent(store: Arc<dyn SnapshotStore>) -> Result<Self, RepositoryError> {
        Ok(Self {
            table: Table::open("accounts", store).await?,
        })
    }
}

impl Default for MemoryAccountRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountRepository for MemoryAccountRepository {
    async fn create(&self, account: Account) -> Result<Account, RepositoryError> {
        self.table
            .write(|table| {
                if table.accounts.contains_key(&account.id) {
                    return Err(RepositoryError::conflict("id"));
                }
                table.check_unique(&account)?;
                table.accounts.insert(account.id, account.clone());
                Ok(account)
            })
            .await
    }

    async fn update(&self, account: Account) -> Result<Account, RepositoryError> {
        self.table
            .write(|table| {
                if !table.accounts.contains_key(&account.id) {
                    return Err(RepositoryError::NotFound);
                }
                table.check_unique(&account)?;
                table.accounts.insert(account.id, account.clone());
                Ok(account)
            })
            .await
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<Account>, RepositoryError> {
        Ok(self.table.read(|table| table.accounts.get(&id).cloned()).await)
    }

    async fn find_by_email(&self, email: &UserEmail) -> Result<Option<Account>, RepositoryError> {
        Ok(self
            .table
            .read(|table| {
                table
                    .accounts
                    .values()
                    .find(|account| &account.email == email)
                    .cloned()
            })
            .await)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, RepositoryError> {
        Ok(self
            .table
            .read(|table| {
                table
                    .accounts
                    .values()
                    .find(|account| account.username.as_str() == username)
                    .cloned()
            })
            .await)
    }

    async fn list(&self) -> Result<Vec<Account>, RepositoryError> {
        Ok(self
            .table
            .read(|table| table.accounts.values().cloned().collect())
            .await)
    }

    async fn count(&self) -> Result<usize, RepositoryError> {
        Ok(self.table.read(|table| table.accounts.len()).await)
    }

    async fn remove(&self, id: UserId, blacklist: bool) -> Result<Account, RepositoryError> {
        self.table
            .write(|table| {
                let account = table.accounts.remove(&id).ok_or(RepositoryError::NotFound)?;
                if blacklist {
                    table.blacklist.insert(account.email.clone());
                }
                Ok(account)
            })
            .await
    }

    async fn is_blacklisted(&self, email: &UserEmail) -> Result<bool, RepositoryError> {
        Ok(self.table.read(|table| table.blacklist.contains(email)).await)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MessageLog {
    messages: Vec<Message>,
}

impl MessageLog {
    fn position(&self, id: MessageId) -> Option<usize> {
        self.messages.iter().rposition(|message| message.id == id)
    }
}

pub struct MemoryMessageRepository {
    table: Table<MessageLog>,
}

impl MemoryMessageRepository {
    pub fn new() -> Self {
        Self {
            table: Table::in_memory("messages"),
        }
    }

    pub async fn persistent(store: Arc<dyn SnapshotStore>) -> Result<Self, RepositoryError> {
        Ok(Self {
            table: Table::open("messages", store).await?,
        })
    }
}

impl Default for MemoryMessageRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageRepository for MemoryMessageRepository {
    async fn append(&self, message: Message) -> Result<Message, RepositoryError> {
        self.table
            .write(|log| {
                let expected = log.messages.last().map_or(1, |last| last.seq + 1);
                if message.seq != expected {
                    return Err(RepositoryError::conflict("seq"));
                }
                log.messages.push(message.clone());
                Ok(message)
            })
            .await
    }

    async fn update(&self, message: Message) -> Result<Message, RepositoryError> {
        self.table
            .write(|log| {
                let idx = log.position(message.id).ok_or(RepositoryError::NotFound)?;
                log.messages[idx] = message.clone();
                Ok(message)
            })
            .await
    }

    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError> {
        Ok(self
            .table
            .read(|log| log.position(id).map(|idx| log.messages[idx].clone()))
            .await)
    }

    async fn latest(&self) -> Result<Option<Message>, RepositoryError> {
        Ok(self.table.read(|log| log.messages.last().cloned()).await)
    }

    async fn list_after(
        &self,
        after_seq: u64,
        limit: Option<usize>,
    ) -> Result<Vec<Message>, RepositoryError> {
        Ok(self
            .table
            .read(|log| {
                let start = log.messages.partition_point(|message| message.seq <= after_seq);
                let tail = &log.messages[start..];
                let end = limit.map_or(tail.len(), |limit| limit.min(tail.len()));
                tail[..end].to_vec()
            })
            .await)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Message>, RepositoryError> {
        Ok(self
            .table
            .read(|log| {
                let start = log.messages.len().saturating_sub(limit);
                log.messages[start..].to_vec()
            })
            .await)
    }

    async fn list_all(&self) -> Result<Vec<Message>, RepositoryError> {
        Ok(self.table.read(|log| log.messages.clone()).await)
    }
}

pub struct MemoryMentionCheckRepository {
    table: Table<HashMap<UserId, BTreeSet<MessageId>>>,
}

impl MemoryMentionCheckRepository {
    pub fn new() -> Self {
        Self {
            table: Table::in_memory("mention_checks"),
        }
    }

    pub async fn persistent(store: Arc<dyn SnapshotStore>) -> Result<Self, RepositoryError> {
        Ok(Self {
            table: Table::open("mention_checks", store).await?,
        })
    }
}

impl Default for MemoryMentionCheckRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MentionCheckRepository for MemoryMentionCheckRepository {
    async fn add(
        &self,
        user_id: UserId,
        message_ids: &[MessageId],
    ) -> Result<BTreeSet<MessageId>, RepositoryError> {
        self.table
            .write(|checks| {
                let set = checks.entry(user_id).or_default();
                set.extend(message_ids.iter().copied());
                Ok(set.clone())
            })
            .await
    }

    async fn list(&self, user_id: UserId) -> Result<BTreeSet<MessageId>, RepositoryError> {
        Ok(self
            .table
            .read(|checks| checks.get(&user_id).cloned().unwrap_or_default())
            .await)
    }

    async fn remove_user(&self, user_id: UserId) -> Result<(), RepositoryError> {
        self.table
            .write(|checks| {
                checks.remove(&user_id);
                Ok(())
            })
            .await
    }
}

pub struct MemorySettingsRepository {
    table: Table<SystemSettings>,
}

impl MemorySettingsRepository {
    pub fn new() -> Self {
        Self {
            table: Table::in_memory("settings"),
        }
    }

    pub async fn persistent(store: Arc<dyn SnapshotStore>) -> Result<Self, RepositoryError> {
        Ok(Self {
            table: Table::open("settings", store).await?,
        })
    }
}

impl Default for MemorySettingsRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SettingsRepository for MemorySettingsRepository {
    async fn load(&self) -> Result<SystemSettings, RepositoryError> {
        Ok(self.table.read(|settings| *settings).await)
    }

    async fn store(&self, settings: SystemSettings) -> Result<SystemSettings, RepositoryError> {
        self.table
            .write(|current| {
                *current = settings;
                Ok(settings)
            })
            .await
    }
}

pub struct MemorySessionRepository {
    table: Table<HashMap<SessionId, Session>>,
}

impl MemorySessionRepository {
    pub fn new() -> Self {
        Self {
            table: Table::in_memory("sessions"),
        }
    }

    pub async fn persistent(store: Arc<dyn SnapshotStore>) -> Result<Self, RepositoryError> {
        Ok(Self {
            table: Table::open("sessions", store).await?,
        })
    }
}

impl Default for MemorySessionRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionRepository for MemorySessionRepository {
    async fn create(&self, session: Session) -> Result<Session, RepositoryError> {
        self.table
            .write(|sessions| {
                sessions.insert(session.id, session.clone());
                Ok(session)
            })
            .await
    }

    async fn find(&self, id: SessionId) -> Result<Option<Session>, RepositoryError> {
        Ok(self.table.read(|sessions| sessions.get(&id).cloned()).await)
    }

    async fn remove(&self, id: SessionId) -> Result<Option<Session>, RepositoryError> {
        // 不存在时不触发快照写入
        if self.find(id).await?.is_none() {
            return Ok(None);
        }
        self.table.write(|sessions| Ok(sessions.remove(&id))).await
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Session>, RepositoryError> {
        Ok(self
            .table
            .read(|sessions| {
                let mut owned: Vec<Session> = sessions
                    .values()
                    .filter(|session| session.user_id == user_id)
                    .cloned()
                    .collect();
                owned.sort_by_key(|session| session.created_at);
                owned
            })
            .await)
    }

    async fn remove_for_user(&self, user_id: UserId) -> Result<Vec<Session>, RepositoryError> {
        self.table
            .write(|sessions| {
                let ids: Vec<SessionId> = sessions
                    .values()
                    .filter(|session| session.user_id == user_id)
                    .map(|session| session.id)
                    .collect();
                Ok(ids.into_iter().filter_map(|id| sessions.remove(&id)).collect())
            })
            .await
    }
}

/// 验证码只保存在内存中，重启后失效
pub struct MemoryVerificationCodeRepository {
    table: Table<HashMap<UserEmail, VerificationCode>>,
}

impl MemoryVerificationCodeRepository {
    pub fn new() -> Self {
        Self {
            table: Table::in_memory("verification_codes"),
        }
    }
}

impl Default for MemoryVerificationCodeRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VerificationCodeRepository for MemoryVerificationCodeRepository {
    async fn put(&self, code: VerificationCode) -> Result<(), RepositoryError> {
        self.table
            .write(|codes| {
                codes.insert(code.email.clone(), code);
                Ok(())
            })
            .await
    }

    async fn find(&self, email: &UserEmail) -> Result<Option<VerificationCode>, RepositoryError> {
        Ok(self.table.read(|codes| codes.get(email).cloned()).await)
    }

    async fn remove(&self, email: &UserEmail) -> Result<(), RepositoryError> {
        self.table
            .write(|codes| {
                codes.remove(email);
                Ok(())
            })
            .await
    }

    async fn purge_expired(&self, now: Timestamp) -> Result<usize, RepositoryError> {
        self.table
            .write(|codes| {
                let before = codes.len();
                codes.retain(|_, code| !code.is_expired(now));
                Ok(before - codes.len())
            })
            .await
    }
}
