//! 管理操作的权限矩阵
//!
//! 所有规则都是纯函数，只依赖操作者与目标的身份和角色，
//! 由应用层在同一临界区内读取最新状态后调用。

use chrono::Duration;

use crate::entities::user::Role;
use crate::errors::{DomainError, DomainResult};
use crate::value_objects::UserId;

/// 禁言时长下限（分钟）
pub const MUTE_MIN_MINUTES: i64 = 1;
/// 禁言时长上限（分钟），即 30 天
pub const MUTE_MAX_MINUTES: i64 = 43_200;

/// 需要权限判定的管理操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationAction {
    Mute,
    Ban,
    Delete,
    SetStatus,
    PromoteToDeputy,
    DemoteToMember,
    EditDisplayName,
}

impl ModerationAction {
    fn is_role_change(self) -> bool {
        matches!(self, Self::PromoteToDeputy | Self::DemoteToMember)
    }
}

/// 参与操作的一方
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Party {
    pub id: UserId,
    pub role: Role,
}

impl Party {
    pub fn new(id: UserId, role: Role) -> Self {
        Self { id, role }
    }
}

/// 判定 `actor` 能否对 `target` 执行 `action`
pub fn authorize_moderation(
    action: ModerationAction,
    actor: Party,
    target: Party,
) -> DomainResult<()> {
    if actor.id == target.id {
        return match action {
            ModerationAction::EditDisplayName => Ok(()),
            _ => Err(DomainError::permission_denied("不能对自己执行此操作")),
        };
    }

    if action.is_role_change() {
        return authorize_role_change(action, actor, target);
    }

    match target.role {
        Role::Admin => match action {
            ModerationAction::EditDisplayName => Err(DomainError::permission_denied(
                "只有管理员本人可以修改其显示名称",
            )),
            _ => Err(DomainError::permission_denied("该用户为管理员，无法操作")),
        },
        Role::DeputyAdmin => {
            if actor.role == Role::Admin {
                Ok(())
            } else {
                Err(DomainError::permission_denied(
                    "只有管理员可以对次管理员执行此操作",
                ))
            }
        }
        Role::Member => {
            if actor.role.is_moderator() {
                Ok(())
            } else {
                Err(DomainError::permission_denied("权限不足"))
            }
        }
    }
}

fn authorize_role_change(
    action: ModerationAction,
    actor: Party,
    target: Party,
) -> DomainResult<()> {
    if actor.role != Role::Admin {
        return Err(DomainError::permission_denied("只有管理员可以设置次管理员"));
    }
    match (action, target.role) {
        (_, Role::Admin) => Err(DomainError::permission_denied("不能修改管理员的角色")),
        (ModerationAction::PromoteToDeputy, Role::Member) => Ok(()),
        (ModerationAction::PromoteToDeputy, _) => {
            Err(DomainError::invalid_state("该用户已是次管理员"))
        }
        (ModerationAction::DemoteToMember, Role::DeputyAdmin) => Ok(()),
        _ => Err(DomainError::invalid_state("该用户不是次管理员")),
    }
}

/// 撤回权限：作者本人、管理员，或次管理员撤回非管理员的消息
pub fn authorize_recall(actor: Party, author_id: UserId, author_role: Role) -> DomainResult<()> {
    if actor.id == author_id {
        return Ok(());
    }
    match actor.role {
        Role::Admin => Ok(()),
        Role::DeputyAdmin if author_role != Role::Admin => Ok(()),
        _ => Err(DomainError::permission_denied("无权撤回该消息")),
    }
}

/// 仅管理员可执行的操作（审核、设置、添加用户）
pub fn require_admin(role: Role) -> DomainResult<()> {
    if role == Role::Admin {
        Ok(())
    } else {
        Err(DomainError::permission_denied("需要管理员权限"))
    }
}

/// 管理员或次管理员可执行的操作
pub fn require_moderator(role: Role) -> DomainResult<()> {
    if role.is_moderator() {
        Ok(())
    } else {
        Err(DomainError::permission_denied("需要管理权限"))
    }
}

/// 校验禁言时长并转换为 [`Duration`]
pub fn mute_duration(minutes: i64) -> DomainResult<Duration> {
    if !(MUTE_MIN_MINUTES..=MUTE_MAX_MINUTES).contains(&minutes) {
        return Err(DomainError::validation_error(
            "duration_minutes",
            format!("禁言时长必须在 {MUTE_MIN_MINUTES} 到 {MUTE_MAX_MINUTES} 分钟之间"),
        ));
    }
    Ok(Duration::minutes(minutes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    fn party(role: Role) -> Party {
        Party::new(UserId::generate(), role)
    }

    fn kind(result: DomainResult<()>) -> Option<ErrorKind> {
        result.err().map(|err| err.kind())
    }

    #[test]
    fn nobody_mutes_admin() {
        let admin = party(Role::Admin);
        for actor in [party(Role::Admin), party(Role::DeputyAdmin), party(Role::Member)] {
            let err = authorize_moderation(ModerationAction::Mute, actor, admin).unwrap_err();
            assert_eq!(err.to_string(), "该用户为管理员，无法操作");
        }
    }

    #[test]
    fn deputy_moderates_members_only() {
        let deputy = party(Role::DeputyAdmin);
        let member = party(Role::Member);
        let other_deputy = party(Role::DeputyAdmin);

        for action in [
            ModerationAction::Mute,
            ModerationAction::Ban,
            ModerationAction::Delete,
            ModerationAction::EditDisplayName,
        ] {
            assert!(authorize_moderation(action, deputy, member).is_ok());
            assert_eq!(
                kind(authorize_moderation(action, deputy, other_deputy)),
                Some(ErrorKind::PermissionDenied)
            );
            assert!(authorize_moderation(action, party(Role::Admin), deputy).is_ok());
        }
    }

    #[test]
    fn members_cannot_moderate() {
        let actor = party(Role::Member);
        let target = party(Role::Member);
        assert_eq!(
            kind(authorize_moderation(ModerationAction::Ban, actor, target)),
            Some(ErrorKind::PermissionDenied)
        );
        assert_eq!(
            kind(authorize_moderation(ModerationAction::EditDisplayName, actor, target)),
            Some(ErrorKind::PermissionDenied)
        );
    }

    #[test]
    fn self_targeting_only_for_display_name() {
        let admin = party(Role::Admin);
        assert!(authorize_moderation(ModerationAction::EditDisplayName, admin, admin).is_ok());
        for action in [
            ModerationAction::Mute,
            ModerationAction::Ban,
            ModerationAction::Delete,
            ModerationAction::SetStatus,
            ModerationAction::PromoteToDeputy,
            ModerationAction::DemoteToMember,
        ] {
            assert_eq!(
                kind(authorize_moderation(action, admin, admin)),
                Some(ErrorKind::PermissionDenied)
            );
        }
    }

    #[test]
    fn role_changes_are_admin_only() {
        let admin = party(Role::Admin);
        let deputy = party(Role::DeputyAdmin);
        let member = party(Role::Member);

        assert!(authorize_moderation(ModerationAction::PromoteToDeputy, admin, member).is_ok());
        assert!(authorize_moderation(ModerationAction::DemoteToMember, admin, deputy).is_ok());
        assert_eq!(
            kind(authorize_moderation(ModerationAction::PromoteToDeputy, deputy, member)),
            Some(ErrorKind::PermissionDenied)
        );
        assert_eq!(
            kind(authorize_moderation(ModerationAction::PromoteToDeputy, admin, deputy)),
            Some(ErrorKind::State)
        );
        assert_eq!(
            kind(authorize_moderation(ModerationAction::DemoteToMember, admin, member)),
            Some(ErrorKind::State)
        );
        assert_eq!(
            kind(authorize_moderation(
                ModerationAction::DemoteToMember,
                admin,
                party(Role::Admin)
            )),
            Some(ErrorKind::PermissionDenied)
        );
    }

    #[test]
    fn recall_rules() {
        let admin = party(Role::Admin);
        let deputy = party(Role::DeputyAdmin);
        let member = party(Role::Member);

        assert!(authorize_recall(member, member.id, Role::Member).is_ok());
        assert!(authorize_recall(admin, deputy.id, Role::DeputyAdmin).is_ok());
        assert!(authorize_recall(deputy, member.id, Role::Member).is_ok());
        assert!(authorize_recall(deputy, admin.id, Role::Admin).is_err());
        assert!(authorize_recall(member, deputy.id, Role::DeputyAdmin).is_err());
    }

    #[test]
    fn mute_duration_bounds() {
        assert!(mute_duration(0).is_err());
        assert!(mute_duration(MUTE_MAX_MINUTES + 1).is_err());
        assert_eq!(mute_duration(1).unwrap(), Duration::minutes(1));
        assert_eq!(mute_duration(MUTE_MAX_MINUTES).unwrap(), Duration::days(30));
    }
}
