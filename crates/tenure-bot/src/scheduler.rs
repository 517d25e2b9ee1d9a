use chrono::{DateTime, Duration, Local, NaiveTime, TimeZone};
use tracing::info;

use crate::handlers::Bot;

/// Next occurrence of wall-clock `at` strictly after `now`, in `now`'s zone.
///
/// Days on which `at` does not exist (DST gap) are skipped.
pub fn next_run_after<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> DateTime<Tz> {
    let tz = now.timezone();
    let mut date = now.date_naive();

    for _ in 0..3 {
        if let Some(candidate) = tz.from_local_datetime(&date.and_time(at)).earliest() {
            if candidate > *now {
                return candidate;
            }
        }
        date = match date.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }

    now.clone() + Duration::days(1)
}

/// Sweep once a day at `at` local time, forever.
pub async fn run_sweep_loop(bot: Bot, at: NaiveTime) {
    loop {
        let now = Local::now();
        let next = next_run_after(&now, at);
        info!("Next member sweep at {}", next.format("%Y-%m-%d %H:%M:%S"));

        let wait = (next - now).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;

        bot.run_sweep("scheduled").await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn later_today() {
        let now = Utc.with_ymd_and_hms(2025, 4, 1, 1, 0, 0).unwrap();
        assert_eq!(next_run_after(&now, at(2, 0)), Utc.with_ymd_and_hms(2025, 4, 1, 2, 0, 0).unwrap());
    }

    #[test]
    fn tomorrow_once_passed() {
        let now = Utc.with_ymd_and_hms(2025, 4, 1, 3, 0, 0).unwrap();
        assert_eq!(next_run_after(&now, at(2, 0)), Utc.with_ymd_and_hms(2025, 4, 2, 2, 0, 0).unwrap());
    }

    #[test]
    fn exact_instant_rolls_over() {
        let now = Utc.with_ymd_and_hms(2025, 12, 31, 2, 0, 0).unwrap();
        assert_eq!(next_run_after(&now, at(2, 0)), Utc.with_ymd_and_hms(2026, 1, 1, 2, 0, 0).unwrap());
    }

    #[test]
    fn respects_zone_of_now() {
        let zone = FixedOffset::east_opt(3 * 3600).unwrap();
        let now = zone.with_ymd_and_hms(2025, 4, 1, 1, 30, 0).unwrap();
        let next = next_run_after(&now, at(2, 0));

        assert_eq!(next, zone.with_ymd_and_hms(2025, 4, 1, 2, 0, 0).unwrap());
        assert_eq!(next.with_timezone(&Utc), Utc.with_ymd_and_hms(2025, 3, 31, 23, 0, 0).unwrap());
    }
}
