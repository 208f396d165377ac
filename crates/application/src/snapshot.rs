use async_trait::async_trait;
use domain::RepositoryError;
use serde_json::Value;

/// 集合级快照持久化
///
/// 内存仓储在每次修改提交前把整个集合交给快照存储；写入失败时修改被丢弃。
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn load(&self, collection: &str) -> Result<Option<Value>, RepositoryError>;
    async fn persist(&self, collection: &str, snapshot: Value) -> Result<(), RepositoryError>;
}
