use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Days, NaiveTime, Utc, Weekday};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use rollcall_core::config::{ConfigError, ScheduleConfig};
use rollcall_core::errors::ApplicationError;
use rollcall_core::service::{CreateSessionRequest, SessionService};
use rollcall_core::session::Topic;

/// A validated recurring trigger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedEntry {
    pub weekday: Weekday,
    pub time: NaiveTime,
    pub topic: Topic,
}

pub fn resolve_entries(config: &ScheduleConfig) -> Result<Vec<ResolvedEntry>, ConfigError> {
    config
        .entries
        .iter()
        .map(|entry| {
            let (weekday, time) = entry.resolved()?;
            Ok(ResolvedEntry { weekday, time, topic: Topic(entry.topic.clone()) })
        })
        .collect()
}

/// Starts the recurring-trigger loop. Returns `None` when nothing is
/// scheduled, so an unconfigured deployment costs no task.
pub fn spawn(entries: Vec<ResolvedEntry>, service: Arc<SessionService>) -> Option<JoinHandle<()>> {
    if entries.is_empty() {
        return None;
    }
    info!(
        event_name = "schedule.started",
        correlation_id = "bootstrap",
        entry_count = entries.len(),
        "recurring roll-call schedule active"
    );
    Some(tokio::spawn(run(entries, service)))
}

async fn run(entries: Vec<ResolvedEntry>, service: Arc<SessionService>) {
    loop {
        let now = Utc::now();
        let due_at: Vec<DateTime<Utc>> = entries
            .iter()
            .map(|entry| next_occurrence(now, entry.weekday, entry.time))
            .collect();
        let Some(&fire_at) = due_at.iter().min() else {
            return;
        };

        let wait = (fire_at - now).to_std().unwrap_or(Duration::ZERO);
        tokio::time::sleep(wait).await;

        for (entry, at) in entries.iter().zip(&due_at) {
            if *at == fire_at {
                trigger(entry, &service).await;
            }
        }

        // Step past the trigger instant before recomputing occurrences.
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

async fn trigger(entry: &ResolvedEntry, service: &SessionService) {
    match service.create(CreateSessionRequest::for_topic(entry.topic.clone())).await {
        Ok(session_id) => {
            info!(
                event_name = "schedule.session_started",
                session_id = %session_id,
                topic = %entry.topic,
                "scheduled roll call started"
            );
        }
        Err(ApplicationError::SessionConflict { existing, .. }) => {
            info!(
                event_name = "schedule.session_skipped",
                topic = %entry.topic,
                existing_session_id = %existing,
                "scheduled roll call skipped; a session is already active"
            );
        }
        Err(error) => {
            warn!(
                event_name = "schedule.session_failed",
                topic = %entry.topic,
                error = %error,
                "scheduled roll call could not be started"
            );
        }
    }
}

/// Next instant at or after `now` matching the weekday and time-of-day (UTC).
fn next_occurrence(now: DateTime<Utc>, weekday: Weekday, time: NaiveTime) -> DateTime<Utc> {
    let days_ahead = (i64::from(weekday.num_days_from_monday())
        - i64::from(now.weekday().num_days_from_monday()))
    .rem_euclid(7) as u64;

    let candidate = (now.date_naive() + Days::new(days_ahead)).and_time(time).and_utc();
    if candidate <= now {
        candidate + chrono::Duration::days(7)
    } else {
        candidate
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveTime, TimeZone, Utc, Weekday};

    use rollcall_core::config::{ScheduleConfig, ScheduleEntry};
    use rollcall_core::session::Topic;

    use super::{next_occurrence, resolve_entries, ResolvedEntry};

    fn at(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).expect("time")
    }

    #[test]
    fn later_same_day_stays_on_that_day() {
        // 2026-01-07 is a Wednesday.
        let now = Utc.with_ymd_and_hms(2026, 1, 7, 12, 0, 0).single().expect("now");
        let next = next_occurrence(now, Weekday::Wed, at(18, 0));
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 7, 18, 0, 0).single().expect("next"));
    }

    #[test]
    fn earlier_same_day_rolls_to_next_week() {
        let now = Utc.with_ymd_and_hms(2026, 1, 7, 12, 0, 0).single().expect("now");
        let next = next_occurrence(now, Weekday::Wed, at(9, 0));
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 14, 9, 0, 0).single().expect("next"));
    }

    #[test]
    fn other_weekday_picks_the_nearest_future_occurrence() {
        let now = Utc.with_ymd_and_hms(2026, 1, 7, 12, 0, 0).single().expect("now");
        let next = next_occurrence(now, Weekday::Mon, at(9, 30));
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 12, 9, 30, 0).single().expect("next"));
    }

    #[test]
    fn exact_boundary_counts_as_passed() {
        let now = Utc.with_ymd_and_hms(2026, 1, 7, 9, 0, 0).single().expect("now");
        let next = next_occurrence(now, Weekday::Wed, at(9, 0));
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 14, 9, 0, 0).single().expect("next"));
    }

    #[test]
    fn resolve_entries_builds_typed_triggers() {
        let config = ScheduleConfig {
            entries: vec![ScheduleEntry {
                weekday: "mon".to_string(),
                time: "09:30".to_string(),
                topic: "C-standup".to_string(),
            }],
        };

        let resolved = resolve_entries(&config).expect("resolve");
        assert_eq!(
            resolved,
            vec![ResolvedEntry {
                weekday: Weekday::Mon,
                time: at(9, 30),
                topic: Topic("C-standup".to_string()),
            }]
        );
    }

    #[test]
    fn resolve_entries_surfaces_invalid_weekdays() {
        let config = ScheduleConfig {
            entries: vec![ScheduleEntry {
                weekday: "someday".to_string(),
                time: "09:30".to_string(),
                topic: "C-standup".to_string(),
            }],
        };

        assert!(resolve_entries(&config).is_err());
    }
}
