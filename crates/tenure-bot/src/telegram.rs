//! Minimal Telegram Bot API client: just the methods the bot uses.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use tenure_core::{ChatPlatform, PlatformError, PlatformMember};
use tenure_types::{ChatId, InviteToken, UserId};

/// Seconds a `getUpdates` call may be held open by the server.
pub const POLL_TIMEOUT_SECS: u64 = 30;

// -- Wire types --

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub chat_member: Option<ChatMemberUpdated>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

impl User {
    pub fn user_id(&self) -> UserId {
        UserId(self.id)
    }

    pub fn full_name(&self) -> String {
        match &self.last_name {
            Some(last) => format!("{} {}", self.first_name, last),
            None => self.first_name.clone(),
        }
    }

    pub fn handle(&self) -> String {
        self.username.as_deref().map_or_else(|| "-".to_string(), |u| format!("@{u}"))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
    pub new_chat_members: Option<Vec<User>>,
    pub left_chat_member: Option<User>,
    pub new_chat_title: Option<String>,
    pub new_chat_photo: Option<IgnoredAny>,
    pub delete_chat_photo: Option<bool>,
    pub group_chat_created: Option<bool>,
    pub pinned_message: Option<IgnoredAny>,
    pub migrate_to_chat_id: Option<i64>,
    pub migrate_from_chat_id: Option<i64>,
}

impl Message {
    pub fn chat_id(&self) -> ChatId {
        ChatId(self.chat.id)
    }

    /// Joins, leaves, renames and the like, posted by the platform itself.
    pub fn is_service_message(&self) -> bool {
        self.new_chat_members.is_some()
            || self.left_chat_member.is_some()
            || self.new_chat_title.is_some()
            || self.new_chat_photo.is_some()
            || self.delete_chat_photo.is_some()
            || self.group_chat_created.is_some()
            || self.pinned_message.is_some()
            || self.migrate_to_chat_id.is_some()
            || self.migrate_from_chat_id.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMember {
    pub status: String,
    pub user: User,
}

impl ChatMember {
    pub fn is_admin(&self) -> bool {
        matches!(self.status.as_str(), "creator" | "administrator")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatInviteLink {
    pub invite_link: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMemberUpdated {
    pub chat: Chat,
    pub new_chat_member: ChatMember,
    pub invite_link: Option<ChatInviteLink>,
}

// -- Client --

pub struct TelegramClient {
    http: reqwest::Client,
    base_url: String,
}

impl TelegramClient {
    pub fn new(api_url: &str, token: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 15))
            .build()?;
        Ok(Self {
            http,
            base_url: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
        })
    }

    async fn call<P, R>(&self, method: &str, params: &P) -> Result<R, PlatformError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, method);
        // Error bodies are JSON too, so the status code is not consulted
        let response: ApiResponse<R> = self
            .http
            .post(&url)
            .json(params)
            .send()
            .await
            .map_err(|e| PlatformError::Unavailable(format!("{method}: {}", e.without_url())))?
            .json()
            .await
            .map_err(|e| PlatformError::Unavailable(format!("{method}: {}", e.without_url())))?;

        match response {
            ApiResponse { ok: true, result: Some(result), .. } => Ok(result),
            ApiResponse { description, .. } => {
                let description = description.unwrap_or_else(|| "no description".into());
                debug!("{} rejected: {}", method, description);
                Err(PlatformError::Rejected(format!("{method}: {description}")))
            }
        }
    }

    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, PlatformError> {
        self.call(
            "getUpdates",
            &json!({
                "offset": offset,
                "timeout": POLL_TIMEOUT_SECS,
                "allowed_updates": ["message", "chat_member"],
            }),
        )
        .await
    }

    pub async fn send_message(&self, chat_id: ChatId, text: &str) -> Result<(), PlatformError> {
        self.call::<_, IgnoredAny>("sendMessage", &json!({ "chat_id": chat_id, "text": text }))
            .await
            .map(drop)
    }

    pub async fn delete_message(&self, chat_id: ChatId, message_id: i64) -> Result<(), PlatformError> {
        self.call::<_, IgnoredAny>(
            "deleteMessage",
            &json!({ "chat_id": chat_id, "message_id": message_id }),
        )
        .await
        .map(drop)
    }
}

#[async_trait]
impl ChatPlatform for TelegramClient {
    async fn create_invite_link(
        &self,
        chat_id: ChatId,
        name: &str,
        expires_at: DateTime<Utc>,
        member_limit: u32,
    ) -> Result<InviteToken, PlatformError> {
        let link: ChatInviteLink = self
            .call(
                "createChatInviteLink",
                &json!({
                    "chat_id": chat_id,
                    "name": name,
                    "expire_date": expires_at.timestamp(),
                    "member_limit": member_limit,
                }),
            )
            .await?;
        Ok(InviteToken::new(link.invite_link))
    }

    async fn revoke_invite_link(
        &self,
        chat_id: ChatId,
        token: &InviteToken,
    ) -> Result<(), PlatformError> {
        self.call::<_, IgnoredAny>(
            "revokeChatInviteLink",
            &json!({ "chat_id": chat_id, "invite_link": token }),
        )
        .await
        .map(drop)
    }

    async fn ban_member(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        until: DateTime<Utc>,
    ) -> Result<(), PlatformError> {
        self.call::<_, IgnoredAny>(
            "banChatMember",
            &json!({ "chat_id": chat_id, "user_id": user_id, "until_date": until.timestamp() }),
        )
        .await
        .map(drop)
    }

    async fn unban_member(&self, chat_id: ChatId, user_id: UserId) -> Result<(), PlatformError> {
        self.call::<_, IgnoredAny>(
            "unbanChatMember",
            &json!({ "chat_id": chat_id, "user_id": user_id, "only_if_banned": true }),
        )
        .await
        .map(drop)
    }

    /// The Bot API only enumerates administrators; ordinary members are
    /// learned from join events.
    async fn chat_members(&self, chat_id: ChatId) -> Result<Vec<PlatformMember>, PlatformError> {
        let members: Vec<ChatMember> = self
            .call("getChatAdministrators", &json!({ "chat_id": chat_id }))
            .await?;
        Ok(members
            .into_iter()
            .map(|m| PlatformMember {
                user_id: m.user.user_id(),
                is_bot: m.user.is_bot,
                is_admin: m.is_admin(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_join_message() {
        let raw = r#"{
            "update_id": 10,
            "message": {
                "message_id": 5,
                "chat": {"id": -100123, "type": "supergroup"},
                "from": {"id": 1, "is_bot": false, "first_name": "Ada"},
                "date": 1700000000,
                "new_chat_members": [
                    {"id": 2, "is_bot": false, "first_name": "Grace", "last_name": "Hopper", "username": "gh"},
                    {"id": 3, "is_bot": true, "first_name": "Helper"}
                ]
            }
        }"#;

        let update: Update = serde_json::from_str(raw).unwrap();
        let message = update.message.unwrap();
        let members = message.new_chat_members.as_ref().unwrap();

        assert!(message.is_service_message());
        assert_eq!(message.chat_id(), ChatId(-100123));
        assert_eq!(members[0].full_name(), "Grace Hopper");
        assert_eq!(members[0].handle(), "@gh");
        assert!(members[1].is_bot);
    }

    #[test]
    fn plain_text_is_not_a_service_message() {
        let raw = r#"{"message_id": 1, "chat": {"id": 1}, "text": "hello", "date": 0}"#;
        let message: Message = serde_json::from_str(raw).unwrap();
        assert!(!message.is_service_message());
    }

    #[test]
    fn parses_chat_member_update_with_link() {
        let raw = r#"{
            "update_id": 11,
            "chat_member": {
                "chat": {"id": -5},
                "from": {"id": 9, "is_bot": false, "first_name": "X"},
                "date": 0,
                "old_chat_member": {"status": "left", "user": {"id": 9, "is_bot": false, "first_name": "X"}},
                "new_chat_member": {"status": "member", "user": {"id": 9, "is_bot": false, "first_name": "X"}},
                "invite_link": {"invite_link": "https://t.me/+abc", "creator": {"id": 1, "is_bot": true, "first_name": "B"}}
            }
        }"#;

        let update: Update = serde_json::from_str(raw).unwrap();
        let change = update.chat_member.unwrap();
        assert_eq!(change.new_chat_member.status, "member");
        assert_eq!(change.invite_link.unwrap().invite_link, "https://t.me/+abc");
    }

    #[test]
    fn administrators_are_flagged() {
        let raw = r#"[
            {"status": "creator", "user": {"id": 1, "is_bot": false, "first_name": "Owner"}},
            {"status": "administrator", "user": {"id": 2, "is_bot": true, "first_name": "Bot"}},
            {"status": "member", "user": {"id": 3, "is_bot": false, "first_name": "M"}}
        ]"#;

        let members: Vec<ChatMember> = serde_json::from_str(raw).unwrap();
        let flags: Vec<bool> = members.iter().map(ChatMember::is_admin).collect();
        assert_eq!(flags, vec![true, true, false]);
    }

    #[test]
    fn error_envelope_has_no_result() {
        let raw = r#"{"ok": false, "error_code": 400, "description": "Bad Request: chat not found"}"#;
        let response: ApiResponse<IgnoredAny> = serde_json::from_str(raw).unwrap();
        assert!(!response.ok);
        assert!(response.result.is_none());
        assert_eq!(response.description.as_deref(), Some("Bad Request: chat not found"));
    }
}
