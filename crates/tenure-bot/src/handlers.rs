use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use tracing::{error, info, warn};

use tenure_core::{
    CommandError, JoinOutcome, RegistryError, RevokeAllReply, RevokeReply, SeedReport, Service, SweepReport,
    WorkflowOutcome,
};
use tenure_types::{ChatId, InviteLink, InviteToken};

use crate::config::Config;
use crate::scheduler::next_run_after;
use crate::telegram::{ChatMemberUpdated, Message, TelegramClient, Update, User};

const DEBUG_SAMPLE: usize = 10;

const HELP: &str = "🤖 Group membership manager\n\n\
Commands:\n\
/link - Generate a one-time invite link (admin)\n\
/list_links - List active invite links (admin)\n\
/revoke [link] - Revoke an invite link (admin)\n\
/revoke_all - Revoke all active invite links (admin)\n\
/status - Tracked members and next cleanup\n\
/debug - Sample of tracked members\n\
/remove_now - Run the member cleanup now (admin)\n\
/init_members - Track current members from now (admin)";

/// A parsed `/command arg...` message.
#[derive(Debug, PartialEq, Eq)]
pub struct Command<'a> {
    pub name: &'a str,
    pub args: Vec<&'a str>,
}

impl<'a> Command<'a> {
    /// `None` for anything that is not a slash command.
    pub fn parse(text: &'a str) -> Option<Self> {
        let mut parts = text.split_whitespace();
        let head = parts.next()?.strip_prefix('/')?;
        // `/cmd@SomeBot` addresses a specific bot in groups
        let name = head.split('@').next().unwrap_or(head);
        if name.is_empty() {
            return None;
        }
        Some(Self { name, args: parts.collect() })
    }
}

/// Routes platform updates into the [`Service`] and turns results into replies.
#[derive(Clone)]
pub struct Bot {
    service: Service,
    telegram: Arc<TelegramClient>,
    config: Arc<Config>,
}

impl Bot {
    pub fn new(service: Service, telegram: Arc<TelegramClient>, config: Arc<Config>) -> Self {
        Self { service, telegram, config }
    }

    pub async fn handle_update(&self, update: Update) {
        if let Some(change) = update.chat_member {
            self.on_chat_member(change).await;
        } else if let Some(message) = update.message {
            self.on_message(message).await;
        }
    }

    async fn on_chat_member(&self, change: ChatMemberUpdated) {
        if change.new_chat_member.status != "member" {
            return;
        }
        let chat_id = ChatId(change.chat.id);
        let user = &change.new_chat_member.user;

        self.track_join(chat_id, user).await;

        if let Some(link) = change.invite_link {
            let token = InviteToken::new(link.invite_link);
            if let Some(uses) = self.service.record_link_use(&token).await {
                info!("Link {} now used {} times", token, uses);
            }
        }
    }

    async fn on_message(&self, message: Message) {
        let chat_id = message.chat_id();

        if let Some(joined) = &message.new_chat_members {
            for user in joined {
                self.track_join(chat_id, user).await;
            }
        }

        if chat_id == self.config.group_chat && message.is_service_message() {
            self.delete(chat_id, message.message_id).await;
            return;
        }

        let (Some(from), Some(text)) = (&message.from, &message.text) else {
            return;
        };

        match Command::parse(text) {
            Some(command) => {
                self.on_command(chat_id, from, &command).await;
                if chat_id == self.config.group_chat && !self.service.is_admin(from.user_id()) {
                    self.delete(chat_id, message.message_id).await;
                }
            }
            None => {
                if let Some(outcome) = self.service.handle_text(from.user_id(), text, Utc::now()).await {
                    self.reply(chat_id, &workflow_reply(outcome)).await;
                }
            }
        }
    }

    async fn track_join(&self, chat_id: ChatId, user: &User) {
        let outcome = self
            .service
            .record_join(chat_id, user.user_id(), user.is_bot, Utc::now())
            .await;

        // Telegram reports a join twice, as a chat_member update and a service message
        if let Some(notice) = join_notice(outcome, user, chat_id) {
            self.notify(&notice).await;
        }
    }

    async fn on_command(&self, chat_id: ChatId, from: &User, command: &Command<'_>) {
        let user_id = from.user_id();
        let now = Utc::now();

        let result = match command.name {
            "start" | "help" => Ok(HELP.to_string()),
            "link" => self.service.issue_link(user_id, now).await.map(|link| issued_reply(&link, &self.config)),
            "list_links" => self.service.active_links(user_id, now).await.map(|links| list_reply(&links)),
            "revoke" => {
                let target = command.args.first().map(|t| InviteToken::from(*t));
                self.service.revoke_link(user_id, target).await.map(revoke_reply)
            }
            "revoke_all" => self.service.revoke_all_links(user_id, now).await.map(revoke_all_reply),
            "status" => Ok(self.status_reply(chat_id).await),
            "debug" => Ok(self.debug_reply(chat_id, now).await),
            "remove_now" => {
                if self.service.is_admin(user_id) {
                    self.reply(chat_id, "🔄 Starting manual member removal...").await;
                    self.notify(&format!("🔄 Manual removal triggered by {}", from.full_name())).await;
                }
                match self.service.manual_sweep(user_id, now).await {
                    Ok(report) => {
                        self.report_sweep(&report).await;
                        Ok(format!("✅ Manual removal completed: {}", sweep_summary(&report)))
                    }
                    Err(e) => Err(e),
                }
            }
            "init_members" => self
                .service
                .init_members(user_id, chat_id, now)
                .await
                .map(|report| seed_reply(&report)),
            other => {
                info!("Ignoring unknown command /{} from {}", other, user_id);
                return;
            }
        };

        let text = match result {
            Ok(text) => {
                self.notify(&format!("/{} used by {} in chat {}", command.name, from.full_name(), chat_id))
                    .await;
                text
            }
            Err(e) => {
                warn!("/{} from {} failed: {}", command.name, user_id, e);
                error_reply(&e)
            }
        };
        self.reply(chat_id, &text).await;
    }

    async fn status_reply(&self, chat_id: ChatId) -> String {
        let count = self.service.member_count(chat_id).await;
        let next = next_run_after(&Local::now(), self.config.sweep_at);
        format!(
            "🤖 Bot Status:\n• Tracking {} members in this chat\n• Next cleanup: {}\n• Data file: {}",
            count,
            next.format("%Y-%m-%d %H:%M:%S"),
            self.config.members_path.display()
        )
    }

    async fn debug_reply(&self, chat_id: ChatId, now: DateTime<Utc>) -> String {
        let (total, sample) = self.service.sample_members(chat_id, DEBUG_SAMPLE).await;
        let mut text = format!("📊 Debug Info for Chat {chat_id}:\nMembers tracked: {total}\n\n");

        if sample.is_empty() {
            text.push_str("No members tracked in this chat yet.");
            return text;
        }
        for member in &sample {
            text.push_str(&format!(
                "👤 {}: {} ({} days ago)\n",
                member.user_id,
                member.joined_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
                member.days_in_chat(now)
            ));
        }
        if total > sample.len() {
            text.push_str(&format!("\n... and {} more members", total - sample.len()));
        }
        text
    }

    /// Run the retention sweep and post the outcome to the debug chat.
    pub async fn run_sweep(&self, trigger: &str) -> SweepReport {
        self.notify(&format!("🔄 Starting expired member removal job ({trigger})")).await;
        let report = self.service.sweep(Utc::now()).await;
        self.report_sweep(&report).await;
        report
    }

    async fn report_sweep(&self, report: &SweepReport) {
        for member in &report.removed {
            self.notify(&format!(
                "Removed member {} from chat {} (joined: {})",
                member.user_id,
                member.chat_id,
                member.joined_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
            ))
            .await;
        }
        for failure in &report.failed {
            self.notify(&format!("Failed to remove user {}: {}", failure.member.user_id, failure.reason))
                .await;
        }
        self.notify(&format!("✅ Removal job completed: {}", sweep_summary(report))).await;
    }

    async fn reply(&self, chat_id: ChatId, text: &str) {
        if let Err(e) = self.telegram.send_message(chat_id, text).await {
            error!("Failed to reply in chat {}: {}", chat_id, e);
        }
    }

    async fn delete(&self, chat_id: ChatId, message_id: i64) {
        match self.telegram.delete_message(chat_id, message_id).await {
            Ok(()) => info!("Deleted message {} in chat {}", message_id, chat_id),
            Err(e) => warn!("Could not delete message {} in chat {}: {}", message_id, chat_id, e),
        }
    }

    /// Mirror an operational event to the debug chat, if one is configured.
    pub async fn notify(&self, text: &str) {
        let Some(debug_chat) = self.config.debug_chat else {
            return;
        };
        let stamped = format!("🐛 {}: {}", Local::now().format("%Y-%m-%d %H:%M:%S"), text);
        if let Err(e) = self.telegram.send_message(debug_chat, &stamped).await {
            error!("Failed to send debug message: {}", e);
        }
    }
}

// -- Replies --

fn issued_reply(link: &InviteLink, config: &Config) -> String {
    format!(
        "🔗 One-time invite link generated:\n\n{}\n\n• Expires in: {} hours\n• Can be used by: {} user(s)",
        link.token, config.link_expire_hours, link.max_uses
    )
}

fn list_reply(links: &[InviteLink]) -> String {
    if links.is_empty() {
        return "No active invite links found.".to_string();
    }
    let entries: Vec<String> = links
        .iter()
        .map(|link| {
            format!(
                "• {}\n  Uses: {}/{}\n  Expires: {}",
                link.token,
                link.uses,
                link.max_uses,
                link.expires_at.with_timezone(&Local).format("%Y-%m-%d %H:%M")
            )
        })
        .collect();
    format!("🔗 Active Invite Links:\n\n{}", entries.join("\n\n"))
}

fn revoke_reply(reply: RevokeReply) -> String {
    match reply {
        RevokeReply::Revoked(_) => "✅ Link revoked successfully".to_string(),
        RevokeReply::AwaitingTarget => "Please send the invite link you want to revoke.".to_string(),
    }
}

fn revoke_all_reply(reply: RevokeAllReply) -> String {
    match reply {
        RevokeAllReply::NothingToDo => "No active links to revoke.".to_string(),
        RevokeAllReply::AwaitingConfirmation { active } => format!(
            "⚠️ This will revoke ALL {active} active invite links.\n\nType 'yes' to confirm or anything else to cancel."
        ),
    }
}

fn workflow_reply(outcome: WorkflowOutcome) -> String {
    match outcome {
        WorkflowOutcome::RevokedAll(report) => {
            format!("✅ Successfully revoked {} active invite links.", report.processed)
        }
        WorkflowOutcome::Cancelled => "❌ Operation cancelled.".to_string(),
        WorkflowOutcome::Revoked(Ok(_)) => "✅ Link revoked successfully".to_string(),
        WorkflowOutcome::Revoked(Err(e)) => error_reply(&CommandError::Registry(e)),
    }
}

fn join_notice(outcome: JoinOutcome, user: &User, chat_id: ChatId) -> Option<String> {
    (outcome == JoinOutcome::Tracked).then(|| {
        format!(
            "✅ New member tracked: {} ({}) in chat {}",
            user.full_name(),
            user.handle(),
            chat_id
        )
    })
}

fn seed_reply(report: &SeedReport) -> String {
    let mut text = format!("✅ Initialized {} members with current timestamp", report.seeded);
    if report.skipped_admins > 0 {
        text.push_str(&format!(
            "\n• Skipped {} administrators, who cannot be removed",
            report.skipped_admins
        ));
    }
    text.push_str("\n• Other members are tracked as they join");
    text
}

fn sweep_summary(report: &SweepReport) -> String {
    format!("{} members removed, {} errors", report.removed_count(), report.error_count())
}

fn error_reply(error: &CommandError) -> String {
    match error {
        CommandError::Forbidden(_) => "❌ Only admin can use this command".to_string(),
        CommandError::Registry(RegistryError::NotFound(_)) => "❌ Link not found in database".to_string(),
        CommandError::Registry(RegistryError::Platform(e)) | CommandError::Platform(e) => {
            format!("❌ Telegram error: {e}")
        }
    }
}
