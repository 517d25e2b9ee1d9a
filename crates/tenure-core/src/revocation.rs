//! Two-step revoke interactions.
//!
//! ```text
//! Idle ──revoke-all (links active)──> AwaitingRevokeAllConfirmation ──any text──> Idle
//! Idle ──revoke (no target)─────────> AwaitingRevokeTarget ──────────any text──> Idle
//! ```
//!
//! The next text from the same admin always consumes the pending action,
//! whatever it says. Starting a new request replaces an unconsumed one.

use std::collections::HashMap;

use tracing::debug;

use tenure_types::{InviteToken, UserId};

const CONFIRMATION: &str = "yes";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingAction {
    AwaitingRevokeAllConfirmation,
    AwaitingRevokeTarget,
}

/// What a consumed pending action asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    RevokeAll,
    Revoke(InviteToken),
    Cancel,
}

#[derive(Debug, Default)]
pub struct RevocationWorkflow {
    pending: HashMap<UserId, PendingAction>,
}

impl RevocationWorkflow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park `action` for `user_id`, returning whatever it displaced.
    pub fn begin(&mut self, user_id: UserId, action: PendingAction) -> Option<PendingAction> {
        let replaced = self.pending.insert(user_id, action);
        if let Some(old) = replaced {
            debug!("Pending {:?} for {} replaced by {:?}", old, user_id, action);
        }
        replaced
    }

    /// Drop any unconsumed action for `user_id`.
    pub fn clear(&mut self, user_id: UserId) -> Option<PendingAction> {
        let dropped = self.pending.remove(&user_id);
        if let Some(old) = dropped {
            debug!("Pending {:?} for {} dropped by a new request", old, user_id);
        }
        dropped
    }

    pub fn pending(&self, user_id: UserId) -> Option<PendingAction> {
        self.pending.get(&user_id).copied()
    }

    /// Consume the pending action for `user_id` against `input`.
    ///
    /// `None` means nothing was pending and `input` is an ordinary message.
    pub fn consume(&mut self, user_id: UserId, input: &str) -> Option<Resolution> {
        let action = self.pending.remove(&user_id)?;
        Some(resolve(action, input))
    }
}

fn resolve(action: PendingAction, input: &str) -> Resolution {
    match action {
        PendingAction::AwaitingRevokeAllConfirmation if is_confirmation(input) => Resolution::RevokeAll,
        PendingAction::AwaitingRevokeAllConfirmation => Resolution::Cancel,
        PendingAction::AwaitingRevokeTarget => Resolution::Revoke(InviteToken::new(input.trim())),
    }
}

pub fn is_confirmation(input: &str) -> bool {
    input.trim().eq_ignore_ascii_case(CONFIRMATION)
}
