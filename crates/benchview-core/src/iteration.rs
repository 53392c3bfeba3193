use crate::event::TimelineEvent;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

const ITERATION_KEYS: &[&str] = &["iteration", "current_iteration"];
const START_TYPES: &[&str] = &["iteration_started", "iteration_start", "iteration_begin"];
const END_TYPES: &[&str] = &[
    "iteration_completed",
    "iteration_complete",
    "iteration_finished",
    "iteration_ended",
    "iteration_end",
    "iteration_failed",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalSource {
    Metadata,
    EventId,
    Message,
    Group,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationSignal {
    pub iteration: u32,
    pub source: SignalSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationMarker {
    Start,
    End,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IterationBuckets {
    pub buckets: BTreeMap<u32, Vec<TimelineEvent>>,
    pub total: u32,
}

impl IterationBuckets {
    pub fn events(&self, iteration: u32) -> &[TimelineEvent] {
        self.buckets
            .get(&iteration)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn latest(&self) -> u32 {
        self.buckets.keys().next_back().copied().unwrap_or(1)
    }

    pub fn iteration_of(&self, event_id: &str) -> Option<u32> {
        self.buckets.iter().find_map(|(iteration, events)| {
            events
                .iter()
                .any(|event| event.event_id == event_id)
                .then_some(*iteration)
        })
    }
}

struct Patterns {
    number: Regex,
    start_text: Regex,
    end_text: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        number: Regex::new(r"(?i)iteration[\s_\-#:]*([0-9]+)").expect("valid regex"),
        start_text: Regex::new(
            r"(?i)\b(?:iteration[\s_\-#:]*[0-9]+\s+(?:started|starting|begins|began)|(?:starting|beginning|begin)\s+iteration)\b",
        )
        .expect("valid regex"),
        end_text: Regex::new(
            r"(?i)\biteration[\s_\-#:]*[0-9]+\s+(?:completed|complete|finished|done|ended)\b",
        )
        .expect("valid regex"),
    })
}

fn parse_iteration(text: &str) -> Option<u32> {
    patterns()
        .number
        .captures_iter(text)
        .filter_map(|captures| captures.get(1))
        .filter_map(|found| found.as_str().parse::<u32>().ok())
        .find(|value| *value >= 1)
}

/// First matching source wins: metadata, then event id, then message, then group.
pub fn iteration_signal(event: &TimelineEvent) -> Option<IterationSignal> {
    if let Some(value) = event.metadata_number(ITERATION_KEYS) {
        if value >= 1.0 && value.fract() == 0.0 && value <= f64::from(u32::MAX) {
            return Some(IterationSignal {
                iteration: value as u32,
                source: SignalSource::Metadata,
            });
        }
    }
    let textual = [
        (Some(event.event_id.as_str()), SignalSource::EventId),
        (Some(event.message.as_str()), SignalSource::Message),
        (event.group.as_deref(), SignalSource::Group),
    ];
    textual.into_iter().find_map(|(text, source)| {
        text.and_then(parse_iteration)
            .map(|iteration| IterationSignal { iteration, source })
    })
}

pub fn iteration_marker(event: &TimelineEvent) -> Option<IterationMarker> {
    let event_type = event.event_type.trim().to_ascii_lowercase();
    if START_TYPES.contains(&event_type.as_str()) {
        return Some(IterationMarker::Start);
    }
    if END_TYPES.contains(&event_type.as_str()) {
        return Some(IterationMarker::End);
    }
    let patterns = patterns();
    if patterns.end_text.is_match(&event.message) {
        return Some(IterationMarker::End);
    }
    if patterns.start_text.is_match(&event.message) {
        return Some(IterationMarker::Start);
    }
    None
}

pub fn classify_iterations(events: &[TimelineEvent]) -> IterationBuckets {
    let mut ordered = events.to_vec();
    ordered.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.event_id.cmp(&b.event_id))
    });

    let mut buckets: BTreeMap<u32, Vec<TimelineEvent>> = BTreeMap::new();
    let mut scope = 1u32;
    let mut highest_signal = 0u32;

    for event in ordered {
        let signal = iteration_signal(&event).map(|signal| signal.iteration);
        if let Some(iteration) = signal {
            highest_signal = highest_signal.max(iteration);
        }
        let bucket = match iteration_marker(&event) {
            Some(IterationMarker::Start) => {
                scope = signal.unwrap_or(scope);
                scope
            }
            Some(IterationMarker::End) => {
                let closed = signal.unwrap_or(scope);
                scope = closed.saturating_add(1);
                closed
            }
            None => signal.unwrap_or(scope),
        };
        buckets.entry(bucket).or_default().push(event);
    }

    let highest_bucket = buckets.keys().next_back().copied().unwrap_or(0);
    let produced = u32::try_from(buckets.len()).unwrap_or(u32::MAX);
    let total = produced.max(highest_bucket).max(highest_signal).max(1);
    IterationBuckets { buckets, total }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventStatus;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use serde_json::json;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn info(id: &str, secs: i64) -> TimelineEvent {
        TimelineEvent::new(id, "info", at(secs)).with_message("Waiting for benchmark window")
    }

    fn ids(events: &[TimelineEvent]) -> Vec<&str> {
        events.iter().map(|e| e.event_id.as_str()).collect()
    }

    #[test]
    fn carries_scope_across_unlabeled_events_after_sorting() {
        let start = TimelineEvent::new("s", "iteration_started", at(0))
            .with_metadata("iteration", json!(2));
        let end = TimelineEvent::new("e", "iteration_completed", at(3))
            .with_metadata("iteration", json!(2))
            .with_status(EventStatus::Completed);
        let shuffled = vec![info("i2", 2), end, start, info("i1", 1)];

        let buckets = classify_iterations(&shuffled);
        assert_eq!(buckets.buckets.len(), 1);
        assert_eq!(ids(buckets.events(2)), vec!["s", "i1", "i2", "e"]);
        assert_eq!(buckets.total, 2);
    }

    #[test]
    fn end_marker_advances_scope_for_following_events() {
        let events = vec![
            TimelineEvent::new("run", "run_started", at(0)),
            TimelineEvent::new("end1", "info", at(1)).with_message("Iteration 1 completed"),
            info("gap", 2),
            TimelineEvent::new("end2", "iteration_finished", at(3))
                .with_metadata("current_iteration", json!("2")),
            info("tail", 4),
        ];

        let buckets = classify_iterations(&events);
        assert_eq!(ids(buckets.events(1)), vec!["run", "end1"]);
        assert_eq!(ids(buckets.events(2)), vec!["gap", "end2"]);
        assert_eq!(ids(buckets.events(3)), vec!["tail"]);
        assert_eq!(buckets.total, 3);
        assert_eq!(buckets.latest(), 3);
    }

    #[test]
    fn signal_precedence_is_metadata_then_id_then_message_then_group() {
        let event = TimelineEvent::new("step-iteration_4", "info", at(0))
            .with_message("iteration 5 warmup")
            .with_group("iteration-6")
            .with_metadata("iteration", json!(3));
        assert_eq!(
            iteration_signal(&event),
            Some(IterationSignal {
                iteration: 3,
                source: SignalSource::Metadata
            })
        );

        let mut event = event;
        event.metadata.clear();
        assert_eq!(iteration_signal(&event).unwrap().source, SignalSource::EventId);
        assert_eq!(iteration_signal(&event).unwrap().iteration, 4);

        event.event_id = "evt-9".to_string();
        assert_eq!(iteration_signal(&event).unwrap().iteration, 5);

        event.message = "warming shaders".to_string();
        assert_eq!(
            iteration_signal(&event),
            Some(IterationSignal {
                iteration: 6,
                source: SignalSource::Group
            })
        );
    }

    #[test]
    fn defaults_to_first_bucket_without_signals() {
        let buckets = classify_iterations(&[info("a", 0), info("b", 1)]);
        assert_eq!(ids(buckets.events(1)), vec!["a", "b"]);
        assert_eq!(buckets.total, 1);

        let empty = classify_iterations(&[]);
        assert!(empty.buckets.is_empty());
        assert_eq!(empty.total, 1);
    }

    #[test]
    fn total_counts_highest_signal_even_without_bucket() {
        let events = vec![
            TimelineEvent::new("plan", "run_started", at(0))
                .with_message("Planned 1 of 3")
                .with_metadata("iteration", json!(1)),
            TimelineEvent::new("iteration-1-start", "iteration_started", at(1)),
            TimelineEvent::new("note", "info", at(2)).with_message("Queued iteration 3 assets"),
        ];

        let buckets = classify_iterations(&events);
        assert_eq!(buckets.iteration_of("note"), Some(3));
        assert_eq!(buckets.total, 3);
    }

    #[test]
    fn recognizes_text_markers_for_generic_events() {
        let start = TimelineEvent::new("a", "info", at(0)).with_message("Iteration 2 started");
        let begin = TimelineEvent::new("b", "info", at(0)).with_message("Starting iteration");
        let end = TimelineEvent::new("c", "info", at(0)).with_message("iteration #2 done");
        let plain = TimelineEvent::new("d", "info", at(0)).with_message("iteration 2 of 5");
        assert_eq!(iteration_marker(&start), Some(IterationMarker::Start));
        assert_eq!(iteration_marker(&begin), Some(IterationMarker::Start));
        assert_eq!(iteration_marker(&end), Some(IterationMarker::End));
        assert_eq!(iteration_marker(&plain), None);
    }

    #[test]
    fn zero_iteration_values_are_ignored() {
        let event = TimelineEvent::new("a", "info", at(0))
            .with_metadata("iteration", json!(0))
            .with_message("iteration 0 prep");
        assert_eq!(iteration_signal(&event), None);
    }
}
