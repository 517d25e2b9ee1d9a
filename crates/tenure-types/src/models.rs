use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ChatId, InviteToken, UserId};

/// Classification of an invite link at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Active,
    Expired,
    Exhausted,
}

/// An outstanding invite link as the registry sees it.
///
/// `uses` is whatever the platform last reported. `uses <= max_uses` is the
/// platform's rule, not ours: an overflowing record is classified as
/// exhausted rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteLink {
    /// Stored as the map key on disk.
    #[serde(skip)]
    pub token: InviteToken,

    #[serde(alias = "createdAt", with = "crate::timestamp")]
    pub created_at: DateTime<Utc>,

    #[serde(alias = "createdBy")]
    pub created_by: UserId,

    #[serde(alias = "expiresAt", with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,

    pub uses: u32,

    #[serde(alias = "maxUses")]
    pub max_uses: u32,
}

impl InviteLink {
    pub fn state(&self, now: DateTime<Utc>) -> LinkState {
        if now >= self.expires_at {
            LinkState::Expired
        } else if self.uses >= self.max_uses {
            LinkState::Exhausted
        } else {
            LinkState::Active
        }
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.state(now) == LinkState::Active
    }
}

/// A tracked member of a chat and the last time they were seen joining it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberRecord {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub joined_at: DateTime<Utc>,
}

impl MemberRecord {
    /// Whole days between joining and `now`.
    pub fn days_in_chat(&self, now: DateTime<Utc>) -> i64 {
        (now - self.joined_at).num_days()
    }
}

/// Join timestamp as written to the membership store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JoinedAt(#[serde(with = "crate::timestamp")] pub DateTime<Utc>);
