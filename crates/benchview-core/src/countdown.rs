use crate::event::{numeric_value, TimelineEvent};
use crate::EventStatus;
use chrono::{DateTime, Utc};

pub const COUNTDOWN_KEYS: &[&str] = &[
    "countdown",
    "timeout",
    "seconds",
    "wait_seconds",
    "duration",
    "benchmark_duration",
    "countdown_seconds",
    "timeout_seconds",
    "duration_seconds",
];

/// Only the first present key is consulted; a non-numeric value there means no countdown.
pub fn countdown_hint_secs(event: &TimelineEvent) -> Option<f64> {
    event
        .metadata_value(COUNTDOWN_KEYS)
        .and_then(numeric_value)
        .filter(|secs| *secs > 0.0)
}

/// Instant the hinted wait ends; changes whenever a merged update moves the timestamp or hint.
pub fn countdown_deadline(event: &TimelineEvent) -> Option<DateTime<Utc>> {
    let hint_ms = (countdown_hint_secs(event)? * 1000.0).round() as i64;
    Some(event.timestamp + chrono::Duration::milliseconds(hint_ms))
}

/// Whole seconds left, rounded up; `None` once expired, without a hint, or when not in progress.
pub fn remaining_seconds(event: &TimelineEvent, now: DateTime<Utc>) -> Option<u64> {
    if event.status != EventStatus::InProgress {
        return None;
    }
    let hint_ms = (countdown_hint_secs(event)? * 1000.0).round() as i64;
    let elapsed_ms = now
        .signed_duration_since(event.timestamp)
        .num_milliseconds()
        .max(0);
    let remaining_ms = hint_ms.saturating_sub(elapsed_ms).max(0);
    if remaining_ms == 0 {
        return None;
    }
    Some(((remaining_ms + 999) / 1000) as u64)
}

pub fn format_countdown(secs: u64) -> String {
    if secs >= 3600 {
        format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else {
        format!("{}:{:02}", secs / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap()
    }

    fn waiting(metadata_key: &str, value: serde_json::Value, age_secs: i64) -> TimelineEvent {
        TimelineEvent::new("wait", "info", now() - Duration::seconds(age_secs))
            .with_status(EventStatus::InProgress)
            .with_metadata(metadata_key, value)
    }

    #[test]
    fn expired_countdown_is_hidden() {
        let event = waiting("seconds", json!(5), 6);
        assert_eq!(remaining_seconds(&event, now()), None);
    }

    #[test]
    fn remaining_rounds_up_partial_seconds() {
        let event = waiting("timeout", json!(30), 10);
        assert_eq!(remaining_seconds(&event, now()), Some(20));
        let later = now() + Duration::milliseconds(500);
        assert_eq!(remaining_seconds(&event, later), Some(20));
        let near_end = now() + Duration::milliseconds(19_100);
        assert_eq!(remaining_seconds(&event, near_end), Some(1));
    }

    #[test]
    fn first_present_key_wins() {
        let event = waiting("duration", json!(600), 0).with_metadata("countdown", json!("45"));
        assert_eq!(countdown_hint_secs(&event), Some(45.0));
        assert_eq!(remaining_seconds(&event, now()), Some(45));
    }

    #[test]
    fn unreadable_first_key_is_not_skipped() {
        let event = waiting("seconds", json!(60), 0).with_metadata("countdown", json!("soon"));
        assert_eq!(countdown_hint_secs(&event), None);
        assert_eq!(remaining_seconds(&event, now()), None);
    }

    #[test]
    fn no_countdown_without_hint_or_outside_progress() {
        let no_hint = TimelineEvent::new("x", "info", now()).with_status(EventStatus::InProgress);
        assert_eq!(remaining_seconds(&no_hint, now()), None);

        let done = waiting("seconds", json!(60), 1).with_status(EventStatus::Completed);
        assert_eq!(remaining_seconds(&done, now()), None);

        let junk = waiting("seconds", json!("soon"), 1);
        assert_eq!(remaining_seconds(&junk, now()), None);
    }

    #[test]
    fn deadline_follows_timestamp_and_hint() {
        let event = waiting("seconds", json!(30), 10);
        assert_eq!(countdown_deadline(&event), Some(now() + Duration::seconds(20)));
        let extended = event.with_metadata("seconds", json!(300));
        assert_eq!(countdown_deadline(&extended), Some(now() + Duration::seconds(290)));
        let plain = TimelineEvent::new("x", "info", now());
        assert_eq!(countdown_deadline(&plain), None);
    }

    #[test]
    fn future_timestamps_do_not_extend_countdown() {
        let event = waiting("seconds", json!(10), -5);
        assert_eq!(remaining_seconds(&event, now()), Some(10));
    }

    #[test]
    fn formats_minutes_and_hours() {
        assert_eq!(format_countdown(5), "0:05");
        assert_eq!(format_countdown(125), "2:05");
        assert_eq!(format_countdown(3_725), "1:02:05");
    }
}
