//! 系统设置服务

use std::sync::Arc;

use domain::{require_admin, SystemSettings, UserId};
use tokio::sync::Mutex;

use crate::{
    error::ApplicationError, repository::SettingsRepository,
    services::directory_service::DirectoryService,
};

pub struct SettingsServiceDependencies {
    pub settings_repository: Arc<dyn SettingsRepository>,
    pub directory: Arc<DirectoryService>,
}

pub struct SettingsService {
    deps: SettingsServiceDependencies,
    update_lock: Mutex<()>,
}

impl SettingsService {
    pub fn new(deps: SettingsServiceDependencies) -> Self {
        Self {
            deps,
            update_lock: Mutex::new(()),
        }
    }

    /// 当前设置，供内部流程（注册等）读取
    pub async fn current(&self) -> Result<SystemSettings, ApplicationError> {
        Ok(self.deps.settings_repository.load().await?)
    }

    /// 匿名可见的设置，注册页据此决定是否展示
    pub async fn public_settings(&self) -> Result<SystemSettings, ApplicationError> {
        self.current().await
    }

    pub async fn get_settings(&self, actor_id: UserId) -> Result<SystemSettings, ApplicationError> {
        let actor = self.deps.directory.require(actor_id).await?;
        require_admin(actor.role)?;
        self.current().await
    }

    /// 整体替换设置；关闭注册时自动关闭审核
    pub async fn update_settings(
        &self,
        actor_id: UserId,
        registration_open: bool,
        require_approval: bool,
    ) -> Result<SystemSettings, ApplicationError> {
        let actor = self.deps.directory.require(actor_id).await?;
        require_admin(actor.role)?;

        let _guard = self.update_lock.lock().await;
        let settings = SystemSettings::new(registration_open, require_approval);
        let stored = self.deps.settings_repository.store(settings).await?;
        tracing::info!(
            actor_id = %actor_id,
            registration_open = stored.registration_open(),
            require_approval = stored.require_approval(),
            "settings updated"
        );
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use crate::services::test_support::TestApp;
    use domain::ErrorKind;

    #[tokio::test]
    async fn defaults_are_open_without_approval() {
        let app = TestApp::new();
        let settings = app.settings.public_settings().await.unwrap();
        assert!(settings.registration_open());
        assert!(!settings.require_approval());
    }

    #[tokio::test]
    async fn closing_registration_clears_approval() {
        let app = TestApp::new();
        let admin = app.seed_admin().await;

        let settings = app
            .settings
            .update_settings(admin.id, false, true)
            .await
            .unwrap();
        assert!(!settings.registration_open());
        assert!(!settings.require_approval());

        let settings = app
            .settings
            .update_settings(admin.id, true, true)
            .await
            .unwrap();
        assert!(settings.require_approval());
        assert_eq!(app.settings.get_settings(admin.id).await.unwrap(), settings);
    }

    #[tokio::test]
    async fn only_admin_can_change_settings() {
        let app = TestApp::new();
        app.seed_admin().await;
        let deputy = app.seed_deputy("dep").await;

        let err = app
            .settings
            .update_settings(deputy.id, false, false)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::PermissionDenied));
        let err = app.settings.get_settings(deputy.id).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::PermissionDenied));
    }
}
