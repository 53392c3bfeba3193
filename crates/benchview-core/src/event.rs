use crate::EventStatus;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub event_id: String,
    pub event_type: String,
    #[serde(default)]
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub status: EventStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaces_event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

impl TimelineEvent {
    pub fn new(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: event_type.into(),
            message: String::new(),
            timestamp,
            status: EventStatus::Pending,
            duration_ms: None,
            metadata: BTreeMap::new(),
            replaces_event_id: None,
            group: None,
        }
    }

    pub fn with_status(mut self, status: EventStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn replacing(mut self, event_id: impl Into<String>) -> Self {
        self.replaces_event_id = Some(event_id.into());
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn metadata_value(&self, keys: &[&str]) -> Option<&Value> {
        keys.iter()
            .filter_map(|key| self.metadata.get(*key))
            .find(|value| !value.is_null())
    }

    pub fn metadata_number(&self, keys: &[&str]) -> Option<f64> {
        keys.iter()
            .filter_map(|key| self.metadata.get(*key))
            .find_map(numeric_value)
    }

    pub fn is_parallel(&self) -> bool {
        match self.metadata.get("parallel") {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::String(text)) => matches!(
                text.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes"
            ),
            Some(Value::Number(number)) => number.as_u64().map(|n| n > 0).unwrap_or(false),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("event is not a JSON object")]
    NotAnObject,
    #[error("event is missing required field {0}")]
    MissingField(&'static str),
    #[error("event {event_id} has invalid timestamp: {raw}")]
    InvalidTimestamp { event_id: String, raw: String },
    #[error("event {event_id} has unknown status: {raw}")]
    InvalidStatus { event_id: String, raw: String },
    #[error("snapshot body has no events array")]
    MissingEvents,
}

#[derive(Debug, Clone, Default)]
pub struct NormalizeReport {
    pub events: Vec<TimelineEvent>,
    pub errors: Vec<NormalizeError>,
}

impl NormalizeReport {
    fn push_event(&mut self, event: TimelineEvent) {
        self.events.push(event);
    }

    fn push_error(&mut self, error: NormalizeError) {
        self.errors.push(error);
    }
}

pub fn normalize_event(raw: &Value) -> Result<TimelineEvent, NormalizeError> {
    let map = raw.as_object().ok_or(NormalizeError::NotAnObject)?;
    normalize_map(map)
}

pub(crate) fn normalize_map(map: &Map<String, Value>) -> Result<TimelineEvent, NormalizeError> {
    let event_id =
        string_field(map, &["event_id", "id"]).ok_or(NormalizeError::MissingField("event_id"))?;

    let raw_timestamp = map
        .get("timestamp")
        .or_else(|| map.get("created_at"))
        .filter(|value| !value.is_null())
        .ok_or(NormalizeError::MissingField("timestamp"))?;
    let timestamp =
        parse_timestamp(raw_timestamp).ok_or_else(|| NormalizeError::InvalidTimestamp {
            event_id: event_id.clone(),
            raw: raw_timestamp.to_string(),
        })?;

    let status = match map.get("status") {
        None | Some(Value::Null) => EventStatus::Pending,
        Some(Value::String(raw)) => {
            raw.parse::<EventStatus>()
                .map_err(|_| NormalizeError::InvalidStatus {
                    event_id: event_id.clone(),
                    raw: raw.clone(),
                })?
        }
        Some(other) => {
            return Err(NormalizeError::InvalidStatus {
                event_id,
                raw: other.to_string(),
            })
        }
    };

    let metadata = match map.get("metadata") {
        Some(Value::Object(entries)) => entries
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
        _ => BTreeMap::new(),
    };

    Ok(TimelineEvent {
        event_type: string_field(map, &["event_type", "type"]).unwrap_or_else(|| "info".to_string()),
        message: string_field(map, &["message", "description"]).unwrap_or_default(),
        timestamp,
        status,
        duration_ms: map
            .get("duration_ms")
            .and_then(numeric_value)
            .filter(|value| *value >= 0.0)
            .map(|value| value.round() as u64),
        metadata,
        replaces_event_id: string_field(map, &["replaces_event_id", "replaces"]),
        group: string_field(map, &["group"]),
        event_id,
    })
}

pub fn normalize_batch<'a, I>(values: I) -> NormalizeReport
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut report = NormalizeReport::default();
    for value in values {
        match normalize_event(value) {
            Ok(event) => report.push_event(event),
            Err(err) => report.push_error(err),
        }
    }
    report
}

/// Accepts `{"events": [...]}` or a bare array.
pub fn normalize_snapshot(body: &Value) -> Result<NormalizeReport, NormalizeError> {
    match body {
        Value::Array(items) => Ok(normalize_batch(items)),
        Value::Object(map) => match map.get("events") {
            Some(Value::Array(items)) => Ok(normalize_batch(items)),
            Some(Value::Null) => Ok(NormalizeReport::default()),
            _ => Err(NormalizeError::MissingEvents),
        },
        _ => Err(NormalizeError::MissingEvents),
    }
}

pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(raw) => {
            let raw = raw.trim();
            if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
                return Some(parsed.with_timezone(&Utc));
            }
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
                .map(|naive| Utc.from_utc_datetime(&naive))
        }
        Value::Number(number) => number
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    }
}

pub(crate) fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(raw) => raw.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|value| value.is_finite())
}

fn string_field(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match map.get(*key) {
        Some(Value::String(text)) if !text.trim().is_empty() => Some(text.clone()),
        Some(Value::Number(number)) => Some(number.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_full_event_with_aliases() {
        let raw = json!({
            "id": 42,
            "type": "step_started",
            "message": "Launching game",
            "timestamp": "2026-03-01T10:00:00Z",
            "status": "running",
            "duration_ms": "1500",
            "metadata": {"step": 3, "parallel": true},
            "replaces": "41",
            "group": "iteration-2"
        });

        let event = normalize_event(&raw).expect("normalize");
        assert_eq!(event.event_id, "42");
        assert_eq!(event.event_type, "step_started");
        assert_eq!(event.status, EventStatus::InProgress);
        assert_eq!(event.duration_ms, Some(1500));
        assert_eq!(event.replaces_event_id.as_deref(), Some("41"));
        assert_eq!(event.group.as_deref(), Some("iteration-2"));
        assert!(event.is_parallel());
        assert_eq!(event.metadata_number(&["step"]), Some(3.0));
    }

    #[test]
    fn defaults_optional_fields() {
        let raw = json!({
            "event_id": "e1",
            "timestamp": "2026-03-01T10:00:00",
            "metadata": "not-a-map"
        });

        let event = normalize_event(&raw).expect("normalize");
        assert_eq!(event.event_type, "info");
        assert_eq!(event.status, EventStatus::Pending);
        assert!(event.message.is_empty());
        assert!(event.metadata.is_empty());
        assert_eq!(
            event.timestamp,
            Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn accepts_epoch_millis_timestamps() {
        let raw = json!({"event_id": "e1", "timestamp": 1_700_000_000_000i64});
        let event = normalize_event(&raw).expect("normalize");
        assert_eq!(event.timestamp.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn batch_drops_malformed_records_and_keeps_the_rest() {
        let values = vec![
            json!({"event_id": "a", "timestamp": "2026-03-01T10:00:00Z"}),
            json!({"timestamp": "2026-03-01T10:00:01Z"}),
            json!({"event_id": "c", "timestamp": "yesterday"}),
            json!({"event_id": "d", "timestamp": "2026-03-01T10:00:03Z", "status": "exploded"}),
            json!("just a string"),
            json!({"event_id": "f", "timestamp": "2026-03-01T10:00:05Z", "status": null}),
        ];

        let report = normalize_batch(&values);
        let ids: Vec<&str> = report.events.iter().map(|e| e.event_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "f"]);
        assert_eq!(report.errors.len(), 4);
        assert!(matches!(
            report.errors[0],
            NormalizeError::MissingField("event_id")
        ));
        assert!(matches!(
            report.errors[1],
            NormalizeError::InvalidTimestamp { .. }
        ));
        assert!(matches!(report.errors[2], NormalizeError::InvalidStatus { .. }));
        assert!(matches!(report.errors[3], NormalizeError::NotAnObject));
    }

    #[test]
    fn snapshot_accepts_wrapped_and_bare_arrays() {
        let wrapped = json!({"events": [{"event_id": "a", "timestamp": "2026-03-01T10:00:00Z"}]});
        assert_eq!(normalize_snapshot(&wrapped).unwrap().events.len(), 1);

        let bare = json!([{"event_id": "a", "timestamp": "2026-03-01T10:00:00Z"}]);
        assert_eq!(normalize_snapshot(&bare).unwrap().events.len(), 1);

        let empty = json!({"events": null});
        assert!(normalize_snapshot(&empty).unwrap().events.is_empty());

        assert_eq!(
            normalize_snapshot(&json!({"items": []})).unwrap_err(),
            NormalizeError::MissingEvents
        );
    }
}
