use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{info, warn};

use tenure_types::{ChatId, InviteLink, InviteToken, MemberRecord, UserId};

use crate::error::{CommandError, RegistryError};
use crate::invites::{InviteRegistry, RevokeAllReport};
use crate::members::{JoinOutcome, MembershipRegistry};
use crate::platform::ChatPlatform;
use crate::revocation::{PendingAction, Resolution, RevocationWorkflow};
use crate::sweep::{self, SweepReport};

/// Static policy the service enforces.
#[derive(Debug, Clone)]
pub struct Settings {
    pub admins: HashSet<UserId>,
    pub link_ttl: Duration,
    pub link_quota: u32,
    pub retention: Duration,
}

#[derive(Debug)]
pub enum RevokeReply {
    Revoked(InviteLink),
    AwaitingTarget,
}

#[derive(Debug, PartialEq, Eq)]
pub enum RevokeAllReply {
    NothingToDo,
    AwaitingConfirmation { active: usize },
}

/// Outcome of seeding a chat from the platform's member list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub seeded: usize,
    pub skipped_admins: usize,
    /// Members tracked in the chat afterwards.
    pub tracked: usize,
}

/// Result of feeding text to a pending revoke interaction.
#[derive(Debug)]
pub enum WorkflowOutcome {
    RevokedAll(RevokeAllReport),
    Revoked(Result<InviteLink, RegistryError>),
    Cancelled,
}

/// Owns all registry state. Cheap to clone; clones share state.
///
/// Every operation holds the state lock for its full duration, platform
/// calls included, so a sweep and a command never interleave.
#[derive(Clone)]
pub struct Service {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    settings: Settings,
    platform: Arc<dyn ChatPlatform>,
    state: Mutex<State>,
}

struct State {
    invites: InviteRegistry,
    members: MembershipRegistry,
    workflow: RevocationWorkflow,
}

impl Service {
    pub fn new(
        settings: Settings,
        platform: Arc<dyn ChatPlatform>,
        invites: InviteRegistry,
        members: MembershipRegistry,
    ) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                settings,
                platform,
                state: Mutex::new(State {
                    invites,
                    members,
                    workflow: RevocationWorkflow::new(),
                }),
            }),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub fn is_admin(&self, user_id: UserId) -> bool {
        self.inner.settings.admins.contains(&user_id)
    }

    fn require_admin(&self, user_id: UserId) -> Result<(), CommandError> {
        if self.is_admin(user_id) {
            Ok(())
        } else {
            warn!("Rejected admin command from {}", user_id);
            Err(CommandError::Forbidden(user_id))
        }
    }

    // -- Invite links --

    pub async fn issue_link(&self, admin: UserId, now: DateTime<Utc>) -> Result<InviteLink, CommandError> {
        self.require_admin(admin)?;
        let settings = &self.inner.settings;
        let mut state = self.inner.state.lock().await;

        let link = state
            .invites
            .issue(self.inner.platform.as_ref(), settings.link_ttl, settings.link_quota, admin, now)
            .await?;
        Ok(link)
    }

    pub async fn active_links(&self, admin: UserId, now: DateTime<Utc>) -> Result<Vec<InviteLink>, CommandError> {
        self.require_admin(admin)?;
        let state = self.inner.state.lock().await;
        Ok(state.invites.list_active(now).into_iter().cloned().collect())
    }

    /// Revoke `target` now, or wait for the admin's next message to name it.
    pub async fn revoke_link(
        &self,
        admin: UserId,
        target: Option<InviteToken>,
    ) -> Result<RevokeReply, CommandError> {
        self.require_admin(admin)?;
        let mut state = self.inner.state.lock().await;

        match target {
            Some(token) => {
                state.workflow.clear(admin);
                let link = state.invites.revoke(self.inner.platform.as_ref(), &token).await?;
                Ok(RevokeReply::Revoked(link))
            }
            None => {
                state.workflow.begin(admin, PendingAction::AwaitingRevokeTarget);
                Ok(RevokeReply::AwaitingTarget)
            }
        }
    }

    pub async fn revoke_all_links(&self, admin: UserId, now: DateTime<Utc>) -> Result<RevokeAllReply, CommandError> {
        self.require_admin(admin)?;
        let mut state = self.inner.state.lock().await;

        let active = state.invites.list_active(now).len();
        if active == 0 {
            state.workflow.clear(admin);
            return Ok(RevokeAllReply::NothingToDo);
        }

        state.workflow.begin(admin, PendingAction::AwaitingRevokeAllConfirmation);
        Ok(RevokeAllReply::AwaitingConfirmation { active })
    }

    /// Feed a plain text message from `user_id` to the revoke workflow.
    ///
    /// `None` when nothing was pending for that user.
    pub async fn handle_text(&self, user_id: UserId, text: &str, now: DateTime<Utc>) -> Option<WorkflowOutcome> {
        let mut state = self.inner.state.lock().await;
        let platform = self.inner.platform.as_ref();

        let outcome = match state.workflow.consume(user_id, text)? {
            Resolution::RevokeAll => {
                let report = state.invites.revoke_all(platform, now).await;
                info!("Revoked {} active links by user {}", report.processed, user_id);
                WorkflowOutcome::RevokedAll(report)
            }
            Resolution::Revoke(token) => WorkflowOutcome::Revoked(state.invites.revoke(platform, &token).await),
            Resolution::Cancel => {
                info!("Revoke-all cancelled by {}", user_id);
                WorkflowOutcome::Cancelled
            }
        };
        Some(outcome)
    }

    pub async fn record_link_use(&self, token: &InviteToken) -> Option<u32> {
        self.inner.state.lock().await.invites.record_use(token)
    }

    // -- Membership --

    pub async fn record_join(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        is_bot: bool,
        at: DateTime<Utc>,
    ) -> JoinOutcome {
        self.inner
            .state
            .lock()
            .await
            .members
            .record_join(chat_id, user_id, is_bot, at)
    }

    pub async fn member_count(&self, chat_id: ChatId) -> usize {
        self.inner.state.lock().await.members.count_for_chat(chat_id)
    }

    /// Total tracked in `chat_id` and up to `limit` of them.
    pub async fn sample_members(&self, chat_id: ChatId, limit: usize) -> (usize, Vec<MemberRecord>) {
        let state = self.inner.state.lock().await;
        (state.members.count_for_chat(chat_id), state.members.sample(chat_id, limit))
    }

    /// Track every current removable member of `chat_id` as joining `now`.
    ///
    /// Chat administrators are skipped since a sweep could never kick them.
    pub async fn init_members(&self, admin: UserId, chat_id: ChatId, now: DateTime<Utc>) -> Result<SeedReport, CommandError> {
        self.require_admin(admin)?;
        let mut state = self.inner.state.lock().await;

        let current = self.inner.platform.chat_members(chat_id).await?;
        let skipped_admins = current.iter().filter(|m| m.is_admin).count();
        let seeded = state.members.seed(
            chat_id,
            current.into_iter().filter(|m| !m.is_admin).map(|m| (m.user_id, m.is_bot)),
            now,
        );
        Ok(SeedReport {
            seeded,
            skipped_admins,
            tracked: state.members.count_for_chat(chat_id),
        })
    }

    // -- Sweep --

    /// Scheduled entry point.
    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let mut state = self.inner.state.lock().await;
        sweep::sweep(
            &mut state.members,
            self.inner.platform.as_ref(),
            self.inner.settings.retention,
            now,
        )
        .await
    }

    pub async fn manual_sweep(&self, admin: UserId, now: DateTime<Utc>) -> Result<SweepReport, CommandError> {
        self.require_admin(admin)?;
        info!("Manual sweep triggered by {}", admin);
        Ok(self.sweep(now).await)
    }
}
