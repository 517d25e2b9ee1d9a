use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Local, SubsecRound, Utc};
use tracing::{error, info, warn};

use tenure_store::JsonFile;
use tenure_types::{ChatId, InviteLink, InviteToken, UserId};

use crate::error::RegistryError;
use crate::platform::ChatPlatform;

type Links = BTreeMap<InviteToken, InviteLink>;

/// Outcome of revoking every active link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevokeAllReport {
    /// Links removed from the registry.
    pub processed: usize,
    /// Of those, how many the platform refused to revoke.
    pub remote_failures: usize,
}

/// Outstanding invite links for one chat, written through to a JSON file.
pub struct InviteRegistry {
    chat_id: ChatId,
    links: Links,
    store: JsonFile<Links>,
}

impl InviteRegistry {
    pub fn open(path: impl Into<PathBuf>, chat_id: ChatId) -> Self {
        let store = JsonFile::new(path);
        let mut links: Links = store.load();
        for (token, link) in links.iter_mut() {
            link.token = token.clone();
        }

        info!("Invite registry: {} links tracked for chat {}", links.len(), chat_id);
        Self { chat_id, links, store }
    }

    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn get(&self, token: &InviteToken) -> Option<&InviteLink> {
        self.links.get(token)
    }

    /// Mint a link on the platform and start tracking it.
    ///
    /// Nothing is recorded when the platform refuses.
    pub async fn issue(
        &mut self,
        platform: &dyn ChatPlatform,
        ttl: Duration,
        max_uses: u32,
        created_by: UserId,
        now: DateTime<Utc>,
    ) -> Result<InviteLink, RegistryError> {
        // The platform only deals in whole seconds
        let expires_at = (now + ttl).trunc_subsecs(0);
        let name = format!("one-time-{}", now.with_timezone(&Local).format("%Y%m%d-%H%M%S"));

        let token = platform
            .create_invite_link(self.chat_id, &name, expires_at, max_uses)
            .await?;

        let link = InviteLink {
            token: token.clone(),
            created_at: now,
            created_by,
            expires_at,
            uses: 0,
            max_uses,
        };

        if self.links.insert(token.clone(), link.clone()).is_some() {
            warn!("Platform reissued known token {}; replacing record", token);
        }
        self.persist();

        info!("Issued invite link {} (max uses {}, expires {})", token, max_uses, expires_at);
        Ok(link)
    }

    /// Links that can still admit someone at `now`, oldest first.
    pub fn list_active(&self, now: DateTime<Utc>) -> Vec<&InviteLink> {
        let mut active: Vec<&InviteLink> =
            self.links.values().filter(|link| link.is_active(now)).collect();
        active.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.token.cmp(&b.token)));
        active
    }

    /// Stop tracking `token`, revoking it on the platform first.
    ///
    /// A platform refusal does not block local removal: the link has usually
    /// expired or been revoked out from under us already.
    pub async fn revoke(
        &mut self,
        platform: &dyn ChatPlatform,
        token: &InviteToken,
    ) -> Result<InviteLink, RegistryError> {
        if !self.links.contains_key(token) {
            return Err(RegistryError::NotFound(token.clone()));
        }

        if let Err(e) = platform.revoke_invite_link(self.chat_id, token).await {
            warn!("Platform revoke of {} failed, dropping locally anyway: {}", token, e);
        }

        let link = self
            .links
            .remove(token)
            .ok_or_else(|| RegistryError::NotFound(token.clone()))?;
        self.persist();

        info!("Revoked invite link {}", token);
        Ok(link)
    }

    /// Revoke every link active at `now`; inactive ones are left alone.
    ///
    /// Persists once, after the loop. If the process dies mid-loop the file
    /// still lists every link, so the next run revokes some of them on the
    /// platform a second time. Platform revocation is idempotent, so that is
    /// accepted.
    pub async fn revoke_all(
        &mut self,
        platform: &dyn ChatPlatform,
        now: DateTime<Utc>,
    ) -> RevokeAllReport {
        let targets: Vec<InviteToken> =
            self.list_active(now).into_iter().map(|link| link.token.clone()).collect();

        let mut report = RevokeAllReport::default();
        for token in &targets {
            if let Err(e) = platform.revoke_invite_link(self.chat_id, token).await {
                error!("Error revoking link {}: {}", token, e);
                report.remote_failures += 1;
            }
            self.links.remove(token);
            report.processed += 1;
        }

        self.persist();
        info!(
            "Revoked {} active links ({} refused by platform)",
            report.processed, report.remote_failures
        );
        report
    }

    /// Count a join through `token`, as reported by the platform.
    ///
    /// Returns the new use count, or `None` when the link is not tracked.
    pub fn record_use(&mut self, token: &InviteToken) -> Option<u32> {
        let link = self.links.get_mut(token)?;
        link.uses = link.uses.saturating_add(1);
        let uses = link.uses;

        if uses > link.max_uses {
            warn!("Link {} used {} times, quota is {}", token, uses, link.max_uses);
        }
        self.persist();
        Some(uses)
    }

    fn persist(&self) {
        if let Err(e) = self.store.save(&self.links) {
            error!("Error saving invite links: {}", e);
        }
    }
}
