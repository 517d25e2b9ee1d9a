//! In-memory [`ChatPlatform`] for tests and dry runs.
//!
//! Records every call and can be told to fail specific operations or
//! specific users.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use tenure_types::{ChatId, InviteToken, UserId};

use crate::error::PlatformError;
use crate::platform::{ChatPlatform, PlatformMember};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    CreateLink,
    RevokeLink,
    Ban,
    Unban,
    ListMembers,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    CreateLink { chat_id: ChatId, member_limit: u32 },
    RevokeLink { chat_id: ChatId, token: InviteToken },
    Ban { chat_id: ChatId, user_id: UserId, until: DateTime<Utc> },
    Unban { chat_id: ChatId, user_id: UserId },
    ListMembers { chat_id: ChatId },
}

#[derive(Default)]
struct MockState {
    calls: Vec<MockCall>,
    failing_ops: HashSet<MockOp>,
    failing_users: HashSet<UserId>,
    members: HashMap<ChatId, Vec<PlatformMember>>,
    minted: u32,
}

#[derive(Default)]
pub struct MockPlatform {
    state: Mutex<MockState>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call of `op` fail until [`MockPlatform::recover`].
    pub fn fail(&self, op: MockOp) {
        self.lock().failing_ops.insert(op);
    }

    pub fn recover(&self, op: MockOp) {
        self.lock().failing_ops.remove(&op);
    }

    /// Make ban/unban fail for this user only.
    pub fn fail_user(&self, user_id: UserId) {
        self.lock().failing_users.insert(user_id);
    }

    pub fn set_members(&self, chat_id: ChatId, members: Vec<PlatformMember>) {
        self.lock().members.insert(chat_id, members);
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    pub fn count(&self, op: MockOp) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.op() == op)
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn call(&self, call: MockCall, user_id: Option<UserId>) -> Result<MutexGuard<'_, MockState>, PlatformError> {
        let mut state = self.lock();
        let op = call.op();
        state.calls.push(call);

        if state.failing_ops.contains(&op) {
            return Err(PlatformError::Rejected(format!("{op:?} disabled")));
        }
        if user_id.is_some_and(|user_id| state.failing_users.contains(&user_id)) {
            return Err(PlatformError::Rejected("user is an administrator".into()));
        }
        Ok(state)
    }
}

impl MockCall {
    fn op(&self) -> MockOp {
        match self {
            Self::CreateLink { .. } => MockOp::CreateLink,
            Self::RevokeLink { .. } => MockOp::RevokeLink,
            Self::Ban { .. } => MockOp::Ban,
            Self::Unban { .. } => MockOp::Unban,
            Self::ListMembers { .. } => MockOp::ListMembers,
        }
    }
}

#[async_trait]
impl ChatPlatform for MockPlatform {
    async fn create_invite_link(
        &self,
        chat_id: ChatId,
        _name: &str,
        _expires_at: DateTime<Utc>,
        member_limit: u32,
    ) -> Result<InviteToken, PlatformError> {
        let mut state = self.call(MockCall::CreateLink { chat_id, member_limit }, None)?;
        state.minted += 1;
        Ok(InviteToken::new(format!("https://t.me/+mock{:04}", state.minted)))
    }

    async fn revoke_invite_link(
        &self,
        chat_id: ChatId,
        token: &InviteToken,
    ) -> Result<(), PlatformError> {
        let call = MockCall::RevokeLink { chat_id, token: token.clone() };
        self.call(call, None).map(drop)
    }

    async fn ban_member(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        until: DateTime<Utc>,
    ) -> Result<(), PlatformError> {
        self.call(MockCall::Ban { chat_id, user_id, until }, Some(user_id)).map(drop)
    }

    async fn unban_member(&self, chat_id: ChatId, user_id: UserId) -> Result<(), PlatformError> {
        self.call(MockCall::Unban { chat_id, user_id }, Some(user_id)).map(drop)
    }

    async fn chat_members(&self, chat_id: ChatId) -> Result<Vec<PlatformMember>, PlatformError> {
        let state = self.call(MockCall::ListMembers { chat_id }, None)?;
        Ok(state.members.get(&chat_id).cloned().unwrap_or_default())
    }
}
