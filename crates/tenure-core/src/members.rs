use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info};

use tenure_store::JsonFile;
use tenure_types::{ChatId, JoinedAt, MemberRecord, UserId};

type Chats = BTreeMap<ChatId, BTreeMap<UserId, JoinedAt>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Tracked,
    Rejoined,
    SkippedBot,
}

/// Per-chat join times, written through to a JSON file.
///
/// One timestamp per (chat, user); a rejoin overwrites it.
pub struct MembershipRegistry {
    chats: Chats,
    store: JsonFile<Chats>,
}

impl MembershipRegistry {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let store = JsonFile::new(path);
        let chats: Chats = store.load();
        info!("Membership registry: loaded data for {} chats", chats.len());
        Self { chats, store }
    }

    pub fn record_join(
        &mut self,
        chat_id: ChatId,
        user_id: UserId,
        is_bot: bool,
        at: DateTime<Utc>,
    ) -> JoinOutcome {
        if is_bot {
            debug!("Not tracking bot {} in chat {}", user_id, chat_id);
            return JoinOutcome::SkippedBot;
        }

        let previous = self.chats.entry(chat_id).or_default().insert(user_id, JoinedAt(at));
        self.persist();

        info!("Tracked member {} in chat {}", user_id, chat_id);
        match previous {
            Some(_) => JoinOutcome::Rejoined,
            None => JoinOutcome::Tracked,
        }
    }

    /// Upsert many members at `at`, persisting once. Returns how many were
    /// recorded (bots excluded).
    pub fn seed(
        &mut self,
        chat_id: ChatId,
        members: impl IntoIterator<Item = (UserId, bool)>,
        at: DateTime<Utc>,
    ) -> usize {
        let chat = self.chats.entry(chat_id).or_default();
        let mut recorded = 0;
        for (user_id, is_bot) in members {
            if is_bot {
                continue;
            }
            chat.insert(user_id, JoinedAt(at));
            recorded += 1;
        }
        if chat.is_empty() {
            self.chats.remove(&chat_id);
        }

        self.persist();
        info!("Seeded {} members in chat {}", recorded, chat_id);
        recorded
    }

    /// Members of `chat_id` who joined more than `threshold` before `now`.
    pub fn expired_members(
        &self,
        chat_id: ChatId,
        threshold: Duration,
        now: DateTime<Utc>,
    ) -> Vec<MemberRecord> {
        self.chats
            .get(&chat_id)
            .map(|members| expired_in(chat_id, members, threshold, now).collect())
            .unwrap_or_default()
    }

    /// [`MembershipRegistry::expired_members`] over every chat in one pass.
    pub fn expired_all(&self, threshold: Duration, now: DateTime<Utc>) -> Vec<MemberRecord> {
        self.chats
            .iter()
            .flat_map(|(&chat_id, members)| expired_in(chat_id, members, threshold, now))
            .collect()
    }

    /// Forget a member. Absent members are not an error.
    pub fn remove(&mut self, chat_id: ChatId, user_id: UserId) -> bool {
        let removed = self.evict(chat_id, user_id);
        if removed {
            self.persist();
        }
        removed
    }

    pub fn count_for_chat(&self, chat_id: ChatId) -> usize {
        self.chats.get(&chat_id).map_or(0, BTreeMap::len)
    }

    pub fn chat_count(&self) -> usize {
        self.chats.len()
    }

    /// Up to `limit` members of `chat_id`, ordered by user id.
    pub fn sample(&self, chat_id: ChatId, limit: usize) -> Vec<MemberRecord> {
        self.chats
            .get(&chat_id)
            .into_iter()
            .flatten()
            .take(limit)
            .map(|(&user_id, &JoinedAt(joined_at))| MemberRecord { chat_id, user_id, joined_at })
            .collect()
    }

    pub fn get(&self, chat_id: ChatId, user_id: UserId) -> Option<DateTime<Utc>> {
        self.chats.get(&chat_id)?.get(&user_id).map(|joined| joined.0)
    }

    /// Drop a record without writing the store. Callers batch the write.
    pub(crate) fn evict(&mut self, chat_id: ChatId, user_id: UserId) -> bool {
        let Some(members) = self.chats.get_mut(&chat_id) else {
            return false;
        };
        let removed = members.remove(&user_id).is_some();
        if members.is_empty() {
            self.chats.remove(&chat_id);
        }
        removed
    }

    pub(crate) fn persist(&self) {
        match self.store.save(&self.chats) {
            Ok(()) => debug!("Membership data saved for {} chats", self.chats.len()),
            Err(e) => error!("Error saving membership data: {}", e),
        }
    }
}

fn expired_in(
    chat_id: ChatId,
    members: &BTreeMap<UserId, JoinedAt>,
    threshold: Duration,
    now: DateTime<Utc>,
) -> impl Iterator<Item = MemberRecord> + '_ {
    members
        .iter()
        .filter(move |(_, joined)| now - joined.0 > threshold)
        .map(move |(&user_id, &JoinedAt(joined_at))| MemberRecord { chat_id, user_id, joined_at })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const CHAT: ChatId = ChatId(-42);

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, 2, 0, 0).unwrap()
    }

    fn registry(dir: &tempfile::TempDir) -> MembershipRegistry {
        MembershipRegistry::open(dir.path().join("member_join_dates.json"))
    }

    #[test]
    fn rejoin_overwrites_join_time() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = registry(&dir);
        let t1 = now() - Duration::days(3);
        let t2 = now();

        assert_eq!(reg.record_join(CHAT, UserId(1), false, t1), JoinOutcome::Tracked);
        assert_eq!(reg.record_join(CHAT, UserId(1), false, t2), JoinOutcome::Rejoined);

        assert_eq!(reg.count_for_chat(CHAT), 1);
        assert_eq!(reg.get(CHAT, UserId(1)), Some(t2));
    }

    #[test]
    fn bots_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = registry(&dir);

        assert_eq!(reg.record_join(CHAT, UserId(9), true, now()), JoinOutcome::SkippedBot);
        assert_eq!(reg.count_for_chat(CHAT), 0);
        assert_eq!(reg.chat_count(), 0);
    }

    #[test]
    fn expiry_threshold_is_strict() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = registry(&dir);
        reg.record_join(CHAT, UserId(31), false, now() - Duration::days(31));
        reg.record_join(CHAT, UserId(30), false, now() - Duration::days(30));
        reg.record_join(CHAT, UserId(29), false, now() - Duration::days(29));

        let expired = reg.expired_members(CHAT, Duration::days(30), now());
        let ids: Vec<UserId> = expired.iter().map(|m| m.user_id).collect();
        assert_eq!(ids, vec![UserId(31)]);
        assert_eq!(expired[0].joined_at, now() - Duration::days(31));
    }

    #[test]
    fn expired_all_spans_chats() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = registry(&dir);
        let old = now() - Duration::days(40);
        reg.record_join(ChatId(1), UserId(1), false, old);
        reg.record_join(ChatId(2), UserId(2), false, old);
        reg.record_join(ChatId(2), UserId(3), false, now());

        let expired = reg.expired_all(Duration::days(30), now());
        assert_eq!(expired.len(), 2);
        assert!(reg.expired_members(ChatId(3), Duration::days(30), now()).is_empty());
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = registry(&dir);
        reg.record_join(CHAT, UserId(1), false, now());

        assert!(reg.remove(CHAT, UserId(1)));
        assert!(!reg.remove(CHAT, UserId(1)));
        assert!(!reg.remove(ChatId(0), UserId(1)));
        assert_eq!(reg.chat_count(), 0);
    }

    #[test]
    fn seed_skips_bots_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = registry(&dir);

        let recorded = reg.seed(CHAT, [(UserId(1), false), (UserId(2), true), (UserId(3), false)], now());

        assert_eq!(recorded, 2);
        assert_eq!(registry(&dir).count_for_chat(CHAT), 2);
    }

    #[test]
    fn sample_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = registry(&dir);
        reg.seed(CHAT, (1..=15).map(|id| (UserId(id), false)), now());

        let sample = reg.sample(CHAT, 10);
        assert_eq!(sample.len(), 10);
        assert_eq!(sample[0].user_id, UserId(1));
        assert!(reg.sample(ChatId(0), 10).is_empty());
    }

    #[test]
    fn round_trip_through_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = registry(&dir);
        reg.record_join(ChatId(1), UserId(10), false, Utc::now());
        reg.record_join(ChatId(2), UserId(20), false, now());

        assert_eq!(registry(&dir).chats, reg.chats);
    }

    #[test]
    fn reads_legacy_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("member_join_dates.json"),
            r#"{"-1001": {"5": "2024-01-01T00:00:00.000001", "6": "2024-02-01T00:00:00Z"}}"#,
        )
        .unwrap();

        let reg = registry(&dir);
        assert_eq!(reg.count_for_chat(ChatId(-1001)), 2);
        assert_eq!(
            reg.get(ChatId(-1001), UserId(6)),
            Some(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap())
        );
    }
}
