//! 消息处理服务
//!
//! 消息日志是全局共享的有序序列。发送与撤回都在日志锁内完成
//! “校验-写入-发布”，因此每个接收方看到的事件顺序与提交顺序一致，
//! 并发发送也只会得到一个全序。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use domain::{
    authorize_recall, Account, ChatEvent, DomainError, Message, MessageId, MessageView, Party,
    UserId, UserStatus,
};
use tokio::sync::Mutex;

use crate::{
    broadcaster::EventBroadcaster, clock::Clock, error::ApplicationError,
    repository::MessageRepository, services::directory_service::DirectoryService,
};

pub struct MessageServiceDependencies {
    pub message_repository: Arc<dyn MessageRepository>,
    pub directory: Arc<DirectoryService>,
    pub broadcaster: Arc<dyn EventBroadcaster>,
    pub clock: Arc<dyn Clock>,
    /// 不带 `since` 查询时返回的最大条数
    pub history_limit: usize,
}

pub struct MessageService {
    deps: MessageServiceDependencies,
    log_lock: Mutex<()>,
}

impl MessageService {
    pub fn new(deps: MessageServiceDependencies) -> Self {
        Self {
            deps,
            log_lock: Mutex::new(()),
        }
    }

    /// 发送消息
    ///
    /// 禁言状态在写入时按当前时间判定；时间戳由服务端分配并保证严格递增。
    pub async fn post(
        &self,
        author_id: UserId,
        content: String,
    ) -> Result<MessageView, ApplicationError> {
        Message::validate_content(&content)?;

        let _guard = self.log_lock.lock().await;
        // 持有目录锁直到发布完成，封禁或删除不会插在校验与追加之间
        let txn = self.deps.directory.begin().await;
        let author = txn.account(author_id).await?;
        if author.status != UserStatus::Active {
            return Err(DomainError::Unauthenticated.into());
        }

        let now = self.deps.clock.now();
        if let Some(remaining_minutes) = author.mute_remaining_minutes(now) {
            return Err(DomainError::Muted { remaining_minutes }.into());
        }

        let (seq, timestamp) = match self.deps.message_repository.latest().await? {
            Some(last) => (
                last.seq + 1,
                now.max(last.timestamp + Duration::microseconds(1)),
            ),
            None => (1, now),
        };
        let message = Message::new(MessageId::generate(), seq, &author, content, timestamp);
        let stored = self.deps.message_repository.append(message).await?;

        let view = MessageView::render(&stored, Some(&author));
        self.publish(ChatEvent::new_message(view.clone())).await;
        drop(txn);

        tracing::debug!(message_id = %stored.id, seq, author_id = %author_id, "message posted");
        Ok(view.for_viewer(author.role))
    }

    /// 撤回消息
    ///
    /// 依次检查消息是否存在、操作者是否有权限；已撤回的消息直接返回当前状态，
    /// 不会再次发布事件。
    pub async fn recall(
        &self,
        actor_id: UserId,
        message_id: MessageId,
    ) -> Result<MessageView, ApplicationError> {
        let _guard = self.log_lock.lock().await;
        let mut message = self
            .deps
            .message_repository
            .find_by_id(message_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("消息", message_id))?;

        let actor = self.deps.directory.require(actor_id).await?;
        let author = self.deps.directory.get_by_id(message.author_id).await?;
        let author_role = author
            .as_ref()
            .map_or(message.author.role, |account| account.role);
        authorize_recall(
            Party::new(actor.id, actor.role),
            message.author_id,
            author_role,
        )?;

        if !message.recall(actor_id) {
            tracing::debug!(message_id = %message_id, "message already recalled");
            return Ok(MessageView::render(&message, author.as_ref()).for_viewer(actor.role));
        }

        let stored = self.deps.message_repository.update(message).await?;
        let view = MessageView::render(&stored, author.as_ref());
        self.publish(ChatEvent::message_recalled(view.clone())).await;

        tracing::info!(message_id = %message_id, actor_id = %actor_id, "message recalled");
        Ok(view.for_viewer(actor.role))
    }

    /// 按到达顺序列出消息
    ///
    /// 指定 `since` 时返回其后的全部消息（可用 `limit` 截断），用于断线重连后的补齐；
    /// 否则返回最近的 `history_limit` 条。
    pub async fn list(
        &self,
        viewer_id: UserId,
        since: Option<MessageId>,
        limit: Option<usize>,
    ) -> Result<Vec<MessageView>, ApplicationError> {
        let viewer = self.deps.directory.require(viewer_id).await?;

        let messages = match since {
            Some(anchor_id) => {
                let anchor = self
                    .deps
                    .message_repository
                    .find_by_id(anchor_id)
                    .await?
                    .ok_or_else(|| ApplicationError::not_found("消息", anchor_id))?;
                self.deps
                    .message_repository
                    .list_after(anchor.seq, limit)
                    .await?
            }
            None => {
                let limit = limit.map_or(self.deps.history_limit, |limit| {
                    limit.min(self.deps.history_limit)
                });
                self.deps.message_repository.list_recent(limit).await?
            }
        };

        let authors = self.author_index().await?;
        Ok(messages
            .iter()
            .map(|message| {
                MessageView::render(message, authors.get(&message.author_id))
                    .for_viewer(viewer.role)
            })
            .collect())
    }

    async fn author_index(&self) -> Result<HashMap<UserId, Account>, ApplicationError> {
        Ok(self
            .deps
            .directory
            .list_all()
            .await?
            .into_iter()
            .map(|account| (account.id, account))
            .collect())
    }

    async fn publish(&self, event: ChatEvent) {
        let event_type = event.event_type();
        if let Err(err) = self.deps.broadcaster.broadcast(event).await {
            tracing::warn!(event_type, error = %err, "failed to publish event");
        }
    }
}
