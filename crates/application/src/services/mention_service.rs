//! 提及追踪服务
//!
//! 只存储用户主动标记为“已查看”的消息 id；未读提及每次都从消息日志
//! 和当前目录重新推导。

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use domain::{mentions_user, MentionCandidate, MessageId, MessageView, UserId};

use crate::{
    error::ApplicationError,
    repository::{MentionCheckRepository, MessageRepository},
    services::directory_service::DirectoryService,
};

pub struct MentionServiceDependencies {
    pub mention_repository: Arc<dyn MentionCheckRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub directory: Arc<DirectoryService>,
}

pub struct MentionService {
    deps: MentionServiceDependencies,
}

impl MentionService {
    pub fn new(deps: MentionServiceDependencies) -> Self {
        Self { deps }
    }

    /// 标记为已查看，返回合并后的集合
    pub async fn mark_checked(
        &self,
        user_id: UserId,
        message_ids: &[MessageId],
    ) -> Result<BTreeSet<MessageId>, ApplicationError> {
        self.deps.directory.require(user_id).await?;
        let checked = self
            .deps
            .mention_repository
            .add(user_id, message_ids)
            .await?;
        tracing::debug!(user_id = %user_id, added = message_ids.len(), total = checked.len(), "mentions checked");
        Ok(checked)
    }

    pub async fn list_checked(
        &self,
        user_id: UserId,
    ) -> Result<BTreeSet<MessageId>, ApplicationError> {
        Ok(self.deps.mention_repository.list(user_id).await?)
    }

    /// 提及该用户且尚未查看的消息，按到达顺序
    ///
    /// 自己发送的消息和已撤回的消息不计入。
    pub async fn unread_mentions(
        &self,
        user_id: UserId,
    ) -> Result<Vec<MessageView>, ApplicationError> {
        let account = self.deps.directory.require(user_id).await?;
        let checked = self.deps.mention_repository.list(user_id).await?;
        let candidate = MentionCandidate::from(&account);

        let unread: Vec<_> = self
            .deps
            .message_repository
            .list_all()
            .await?
            .into_iter()
            .filter(|message| {
                !message.recalled
                    && message.author_id != user_id
                    && !checked.contains(&message.id)
                    && mentions_user(&message.content, candidate)
            })
            .collect();
        if unread.is_empty() {
            return Ok(Vec::new());
        }

        let authors: HashMap<_, _> = self
            .deps
            .directory
            .list_all()
            .await?
            .into_iter()
            .map(|account| (account.id, account))
            .collect();
        Ok(unread
            .iter()
            .map(|message| {
                MessageView::render(message, authors.get(&message.author_id))
                    .for_viewer(account.role)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::services::test_support::TestApp;
    use domain::ErrorKind;

    #[tokio::test]
    async fn unread_mentions_follow_live_names_and_checks() {
        let app = TestApp::new();
        let admin = app.seed_admin().await;
        let bob = app.seed_member("bob").await;

        let by_marker = app
            .messages
            .post(admin.id, format!("hi @[{}:whoever]", bob.id))
            .await
            .unwrap();
        let by_name = app.messages.post(admin.id, "ping @bob".into()).await.unwrap();
        app.messages
            .post(admin.id, "mail me at x@bob.com".into())
            .await
            .unwrap();
        app.messages.post(bob.id, "@bob talking to myself".into()).await.unwrap();
        let recalled = app.messages.post(admin.id, "@bob oops".into()).await.unwrap();
        app.messages.recall(admin.id, recalled.id).await.unwrap();

        let unread = app.mentions.unread_mentions(bob.id).await.unwrap();
        assert_eq!(
            unread.iter().map(|m| m.id).collect::<Vec<_>>(),
            vec![by_marker.id, by_name.id]
        );

        app.mentions.mark_checked(bob.id, &[by_marker.id]).await.unwrap();
        let unread = app.mentions.unread_mentions(bob.id).await.unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].id, by_name.id);

        // 改名后裸提及按新名称匹配，结构化标记不受影响
        app.moderation
            .update_display_name(bob.id, bob.id, Some("Robert".into()))
            .await
            .unwrap();
        let renamed = app.messages.post(admin.id, "@Robert hi".into()).await.unwrap();
        let unread = app.mentions.unread_mentions(bob.id).await.unwrap();
        assert_eq!(
            unread.iter().map(|m| m.id).collect::<Vec<_>>(),
            vec![by_name.id, renamed.id]
        );
    }

    #[tokio::test]
    async fn mark_checked_is_an_idempotent_union() {
        let app = TestApp::new();
        let admin = app.seed_admin().await;
        let first = app.messages.post(admin.id, "a".into()).await.unwrap();
        let second = app.messages.post(admin.id, "b".into()).await.unwrap();

        app.mentions.mark_checked(admin.id, &[first.id]).await.unwrap();
        app.mentions
            .mark_checked(admin.id, &[first.id, second.id])
            .await
            .unwrap();
        let checked = app.mentions.mark_checked(admin.id, &[first.id]).await.unwrap();
        assert_eq!(checked.len(), 2);
        assert_eq!(app.mentions.list_checked(admin.id).await.unwrap(), checked);
    }

    #[tokio::test]
    async fn checks_are_dropped_with_the_account() {
        let app = TestApp::new();
        let admin = app.seed_admin().await;
        let bob = app.seed_member("bob").await;
        let message = app.messages.post(admin.id, "@bob".into()).await.unwrap();
        app.mentions.mark_checked(bob.id, &[message.id]).await.unwrap();

        app.moderation.delete_account(admin.id, bob.id).await.unwrap();
        assert!(app.mentions.list_checked(bob.id).await.unwrap().is_empty());

        let err = app
            .mentions
            .mark_checked(bob.id, &[message.id])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::NotFound));
    }
}
