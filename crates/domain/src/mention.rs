//! 消息提及解析
//!
//! 提及不做存储，每次都基于消息内容与当前的用户目录快照重新计算，
//! 因此显示名称修改后旧消息的匹配结果也会随之变化。
//!
//! 两种形式：
//! - 结构化标记 `@[<用户ID>:<任意名称>]`，按 ID 匹配；
//! - 裸提及 `@name`，与用户当前的显示名称或用户名精确匹配（区分大小写），
//!   `@` 前不能紧跟单词字符，名称后也不能紧跟单词字符。

use std::collections::HashSet;

use uuid::Uuid;

use crate::entities::user::Account;
use crate::value_objects::UserId;

/// 参与匹配的目录条目
#[derive(Debug, Clone, Copy)]
pub struct MentionCandidate<'a> {
    pub id: UserId,
    pub username: &'a str,
    pub display_name: Option<&'a str>,
}

impl<'a> From<&'a Account> for MentionCandidate<'a> {
    fn from(account: &'a Account) -> Self {
        Self {
            id: account.id,
            username: account.username.as_str(),
            display_name: account.display_name.as_deref(),
        }
    }
}

/// 计算消息提及的全部用户
pub fn extract_mentions<'a, I>(content: &str, directory: I) -> HashSet<UserId>
where
    I: IntoIterator<Item = MentionCandidate<'a>>,
{
    let markers = structured_marker_ids(content);
    directory
        .into_iter()
        .filter(|candidate| matches_candidate(content, &markers, candidate))
        .map(|candidate| candidate.id)
        .collect()
}

/// 判断消息是否提及了指定用户
pub fn mentions_user(content: &str, candidate: MentionCandidate<'_>) -> bool {
    let markers = structured_marker_ids(content);
    matches_candidate(content, &markers, &candidate)
}

fn matches_candidate(
    content: &str,
    markers: &HashSet<Uuid>,
    candidate: &MentionCandidate<'_>,
) -> bool {
    markers.contains(&candidate.id.0)
        || candidate
            .display_name
            .is_some_and(|name| contains_bare_mention(content, name))
        || contains_bare_mention(content, candidate.username)
}

/// 收集所有 `@[id:name]` 标记中的 ID，名称部分不能为空
fn structured_marker_ids(content: &str) -> HashSet<Uuid> {
    let mut ids = HashSet::new();
    let mut rest = content;
    while let Some(start) = rest.find("@[") {
        rest = &rest[start + 2..];
        let Some(end) = rest.find(']') else {
            break;
        };
        if let Some((id, name)) = rest[..end].split_once(':') {
            if !name.is_empty() {
                if let Ok(id) = Uuid::parse_str(id) {
                    ids.insert(id);
                }
            }
        }
    }
    ids
}

fn contains_bare_mention(content: &str, name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    let bytes = content.as_bytes();
    content.match_indices('@').any(|(idx, _)| {
        if idx > 0 && is_word_byte(bytes[idx - 1]) {
            return false;
        }
        match content[idx + 1..].strip_prefix(name) {
            Some(after) => !after.bytes().next().is_some_and(is_word_byte),
            None => false,
        }
    })
}

fn is_word_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate<'a>(id: UserId, username: &'a str, display_name: Option<&'a str>) -> MentionCandidate<'a> {
        MentionCandidate {
            id,
            username,
            display_name,
        }
    }

    #[test]
    fn structured_and_bare_mentions() {
        let alice = UserId::generate();
        let bob = UserId::generate();
        let carol = UserId::generate();
        let content = format!("hello @[{alice}:Alice] and @Bob");

        let found = extract_mentions(
            &content,
            [
                candidate(alice, "alice_w", Some("Alice W")),
                candidate(bob, "Bob", None),
                candidate(carol, "Carol", None),
            ],
        );
        assert_eq!(found, HashSet::from([alice, bob]));
    }

    #[test]
    fn email_is_not_a_mention() {
        let bob = candidate(UserId::generate(), "Bob", None);
        assert!(!mentions_user("email@Bob.com", bob));
        assert!(!mentions_user("ping @Bobby", bob));
        assert!(!mentions_user("ping @Bob_2", bob));
        assert!(mentions_user("@Bob.", bob));
        assert!(mentions_user("hi @Bob, welcome", bob));
        assert!(mentions_user("你好@Bob", bob));
    }

    #[test]
    fn bare_mentions_are_case_sensitive() {
        let bob = candidate(UserId::generate(), "Bob", None);
        assert!(!mentions_user("@bob", bob));
        assert!(!mentions_user("@BOB", bob));
    }

    #[test]
    fn display_name_is_matched_live() {
        let id = UserId::generate();
        let content = "thanks @Captain";
        assert!(mentions_user(content, candidate(id, "bob", Some("Captain"))));
        assert!(!mentions_user(content, candidate(id, "bob", Some("Admiral"))));
    }

    #[test]
    fn marker_keeps_matching_after_rename() {
        let id = UserId::generate();
        let content = format!("@[{id}:OldName] see above");
        assert!(mentions_user(&content, candidate(id, "renamed", Some("NewName"))));
    }

    #[test]
    fn malformed_markers_are_ignored() {
        let id = UserId::generate();
        let c = candidate(id, "zed", None);
        assert!(!mentions_user(&format!("@[{id}:]"), c));
        assert!(!mentions_user(&format!("@[{id}:name"), c));
        assert!(!mentions_user("@[not-a-uuid:zed]", c));
    }

    #[test]
    fn multibyte_names() {
        let c = candidate(UserId::generate(), "张三", None);
        assert!(mentions_user("请 @张三 看一下", c));
        assert!(mentions_user("@张三你好", c));
    }
}
