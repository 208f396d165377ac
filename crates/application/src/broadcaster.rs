use async_trait::async_trait;
use domain::ChatEvent;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("broadcast failed: {0}")]
    Failed(String),
}

impl BroadcastError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// 已提交领域事件的发布出口
///
/// 实现必须是非阻塞的：服务在持有写锁时调用它，以保证同一接收者
/// 看到的事件顺序与提交顺序一致。单个接收者的投递失败不得作为错误返回。
#[async_trait]
pub trait EventBroadcaster: Send + Sync {
    async fn broadcast(&self, event: ChatEvent) -> Result<(), BroadcastError>;
}
