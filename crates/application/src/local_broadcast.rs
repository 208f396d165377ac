// 进程内的简单广播器实现，主要用于测试和无连接场景
use async_trait::async_trait;
use domain::ChatEvent;
use tokio::sync::broadcast;

use crate::broadcaster::{BroadcastError, EventBroadcaster};

#[derive(Clone)]
pub struct LocalEventBroadcaster {
    sender: broadcast::Sender<ChatEvent>,
}

impl LocalEventBroadcaster {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1000);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.sender.subscribe()
    }
}

impl Default for LocalEventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBroadcaster for LocalEventBroadcaster {
    async fn broadcast(&self, event: ChatEvent) -> Result<(), BroadcastError> {
        // 没有订阅者时 send 返回错误，这不是故障
        let _ = self.sender.send(event);
        Ok(())
    }
}
