use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use chrono::{Duration, NaiveTime};

use tenure_core::Settings;
use tenure_types::{ChatId, UserId};

const DEFAULT_API_URL: &str = "https://api.telegram.org";

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub api_url: String,
    pub admins: HashSet<UserId>,
    pub group_chat: ChatId,
    pub debug_chat: Option<ChatId>,
    pub link_expire_hours: i64,
    pub link_member_limit: u32,
    pub retention_days: i64,
    pub sweep_at: NaiveTime,
    pub invites_path: PathBuf,
    pub members_path: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| get(key).filter(|v| !v.trim().is_empty()).with_context(|| format!("{key} must be set"));
        let or_default = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let bot_token = required("TENURE_BOT_TOKEN")?;
        let group_chat = parse("TENURE_GROUP_CHAT_ID", &required("TENURE_GROUP_CHAT_ID")?)?;

        let admins = get("TENURE_ADMIN_IDS")
            .context("TENURE_ADMIN_IDS must be set (may be empty)")?
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| parse("TENURE_ADMIN_IDS", s))
            .collect::<Result<HashSet<UserId>>>()?;

        let debug_chat = match get("TENURE_DEBUG_CHAT_ID").filter(|v| !v.trim().is_empty()) {
            Some(raw) => Some(parse("TENURE_DEBUG_CHAT_ID", &raw)?),
            None => None,
        };

        let link_expire_hours: i64 = parse("TENURE_LINK_EXPIRE_HOURS", &or_default("TENURE_LINK_EXPIRE_HOURS", "24"))?;
        let link_member_limit: u32 = parse("TENURE_LINK_MEMBER_LIMIT", &or_default("TENURE_LINK_MEMBER_LIMIT", "1"))?;
        let retention_days: i64 = parse("TENURE_RETENTION_DAYS", &or_default("TENURE_RETENTION_DAYS", "30"))?;

        if link_expire_hours <= 0 {
            bail!("TENURE_LINK_EXPIRE_HOURS must be positive");
        }
        // Platform bounds for member_limit
        if !(1..=99_999).contains(&link_member_limit) {
            bail!("TENURE_LINK_MEMBER_LIMIT must be between 1 and 99999");
        }
        if retention_days <= 0 {
            bail!("TENURE_RETENTION_DAYS must be positive");
        }

        let sweep_raw = or_default("TENURE_SWEEP_AT", "02:00");
        let sweep_at = NaiveTime::parse_from_str(sweep_raw.trim(), "%H:%M")
            .with_context(|| format!("TENURE_SWEEP_AT must be HH:MM, got {sweep_raw:?}"))?;

        Ok(Self {
            bot_token,
            api_url: or_default("TENURE_API_URL", DEFAULT_API_URL),
            admins,
            group_chat,
            debug_chat,
            link_expire_hours,
            link_member_limit,
            retention_days,
            sweep_at,
            invites_path: or_default("TENURE_INVITES_PATH", "invite_links.json").into(),
            members_path: or_default("TENURE_MEMBERS_PATH", "member_join_dates.json").into(),
        })
    }

    pub fn settings(&self) -> Settings {
        Settings {
            admins: self.admins.clone(),
            link_ttl: Duration::hours(self.link_expire_hours),
            link_quota: self.link_member_limit,
            retention: Duration::days(self.retention_days),
        }
    }
}

fn parse<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("{key}: cannot parse {raw:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    const MINIMAL: &[(&str, &str)] = &[
        ("TENURE_BOT_TOKEN", "123:abc"),
        ("TENURE_GROUP_CHAT_ID", "-1001"),
        ("TENURE_ADMIN_IDS", "7, 8"),
    ];

    #[test]
    fn defaults_apply() {
        let config = Config::from_lookup(lookup(MINIMAL)).unwrap();

        assert_eq!(config.group_chat, ChatId(-1001));
        assert_eq!(config.admins, HashSet::from([UserId(7), UserId(8)]));
        assert_eq!(config.debug_chat, None);
        assert_eq!(config.sweep_at, NaiveTime::from_hms_opt(2, 0, 0).unwrap());
        assert_eq!(config.invites_path, PathBuf::from("invite_links.json"));

        let settings = config.settings();
        assert_eq!(settings.link_ttl, Duration::hours(24));
        assert_eq!(settings.link_quota, 1);
        assert_eq!(settings.retention, Duration::days(30));
    }

    #[test]
    fn empty_admin_list_is_allowed() {
        let mut pairs = MINIMAL.to_vec();
        pairs[2] = ("TENURE_ADMIN_IDS", "");
        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        assert!(config.admins.is_empty());
    }

    #[test]
    fn overrides_are_parsed() {
        let mut pairs = MINIMAL.to_vec();
        pairs.extend([
            ("TENURE_DEBUG_CHAT_ID", "555"),
            ("TENURE_RETENTION_DAYS", "1"),
            ("TENURE_SWEEP_AT", "23:45"),
            ("TENURE_LINK_MEMBER_LIMIT", "5"),
        ]);
        let config = Config::from_lookup(lookup(&pairs)).unwrap();

        assert_eq!(config.debug_chat, Some(ChatId(555)));
        assert_eq!(config.retention_days, 1);
        assert_eq!(config.sweep_at, NaiveTime::from_hms_opt(23, 45, 0).unwrap());
        assert_eq!(config.link_member_limit, 5);
    }

    #[test]
    fn invalid_values_are_rejected() {
        for (key, value) in [
            ("TENURE_ADMIN_IDS", "7,x"),
            ("TENURE_SWEEP_AT", "2am"),
            ("TENURE_LINK_MEMBER_LIMIT", "0"),
            ("TENURE_RETENTION_DAYS", "-3"),
        ] {
            let mut pairs = MINIMAL.to_vec();
            pairs.retain(|(k, _)| *k != key);
            pairs.push((key, value));
            assert!(Config::from_lookup(lookup(&pairs)).is_err(), "{key}={value} accepted");
        }
    }

    #[test]
    fn missing_token_is_rejected() {
        let pairs: Vec<_> = MINIMAL.iter().copied().filter(|(k, _)| *k != "TENURE_BOT_TOKEN").collect();
        assert!(Config::from_lookup(lookup(&pairs)).is_err());
    }
}
