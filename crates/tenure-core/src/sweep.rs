use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use tenure_types::MemberRecord;

use crate::members::MembershipRegistry;
use crate::platform::ChatPlatform;

/// Length of the ban used to kick. Bans shorter than 30 seconds are
/// permanent on the platform.
pub const KICK_BAN_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepFailure {
    pub member: MemberRecord,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub started_at: DateTime<Utc>,
    pub removed: Vec<MemberRecord>,
    pub failed: Vec<SweepFailure>,
}

impl SweepReport {
    pub fn removed_count(&self) -> usize {
        self.removed.len()
    }

    pub fn error_count(&self) -> usize {
        self.failed.len()
    }
}

/// Kick every member whose membership is older than `retention`.
///
/// A member leaves the registry only once the platform confirmed the kick;
/// failed kicks stay put and are retried on the next sweep. The store is
/// written once, after the pass.
pub async fn sweep(
    members: &mut MembershipRegistry,
    platform: &dyn ChatPlatform,
    retention: Duration,
    now: DateTime<Utc>,
) -> SweepReport {
    info!("Starting expired member sweep (threshold {})", now - retention);

    let expired = members.expired_all(retention, now);
    let mut report = SweepReport {
        started_at: now,
        removed: Vec::new(),
        failed: Vec::new(),
    };

    for member in expired {
        info!("Member {} expired in chat {} (joined {})", member.user_id, member.chat_id, member.joined_at);

        match kick(platform, &member, now).await {
            Ok(()) => {
                members.evict(member.chat_id, member.user_id);
                info!("Removed expired member {} from chat {}", member.user_id, member.chat_id);
                report.removed.push(member);
            }
            Err(reason) => {
                warn!("Could not remove user {} from chat {}: {}", member.user_id, member.chat_id, reason);
                report.failed.push(SweepFailure { member, reason });
            }
        }
    }

    if !report.removed.is_empty() {
        members.persist();
    }

    info!(
        "Sweep completed: {} members removed, {} errors",
        report.removed_count(),
        report.error_count()
    );
    report
}

async fn kick(platform: &dyn ChatPlatform, member: &MemberRecord, now: DateTime<Utc>) -> Result<(), String> {
    let until = now + Duration::seconds(KICK_BAN_SECS);
    platform
        .ban_member(member.chat_id, member.user_id, until)
        .await
        .map_err(|e| e.to_string())?;
    // Lift the ban right away so the user may come back through a new link
    platform
        .unban_member(member.chat_id, member.user_id)
        .await
        .map_err(|e| e.to_string())
}
