use async_trait::async_trait;
use chrono::{DateTime, Utc};

use tenure_types::{ChatId, InviteToken, UserId};

use crate::error::PlatformError;

/// A chat member as the platform reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformMember {
    pub user_id: UserId,
    pub is_bot: bool,
    /// Owners and administrators cannot be removed by the bot.
    pub is_admin: bool,
}

/// The messaging platform operations the registries depend on.
///
/// Timeouts and retries are the implementation's business; callers await
/// every call to completion before committing local state.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Mint an invite link for `chat` limited to `member_limit` joins.
    async fn create_invite_link(
        &self,
        chat_id: ChatId,
        name: &str,
        expires_at: DateTime<Utc>,
        member_limit: u32,
    ) -> Result<InviteToken, PlatformError>;

    async fn revoke_invite_link(
        &self,
        chat_id: ChatId,
        token: &InviteToken,
    ) -> Result<(), PlatformError>;

    /// Ban until `until`. Pair with [`ChatPlatform::unban_member`] to kick.
    async fn ban_member(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        until: DateTime<Utc>,
    ) -> Result<(), PlatformError>;

    async fn unban_member(&self, chat_id: ChatId, user_id: UserId) -> Result<(), PlatformError>;

    /// Every member the platform is willing to enumerate for `chat`.
    async fn chat_members(&self, chat_id: ChatId) -> Result<Vec<PlatformMember>, PlatformError>;
}
