use crate::event::TimelineEvent;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventLedger {
    events: BTreeMap<String, TimelineEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Inserted,
    Updated,
    Unchanged,
    RejectedRegression,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub rejected: Vec<String>,
}

impl MergeReport {
    pub fn changed(&self) -> bool {
        self.inserted > 0 || self.updated > 0
    }
}

impl EventLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn get(&self, event_id: &str) -> Option<&TimelineEvent> {
        self.events.get(event_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimelineEvent> {
        self.events.values()
    }

    pub fn apply(&mut self, incoming: TimelineEvent) -> ApplyOutcome {
        let Some(stored) = self.events.get_mut(&incoming.event_id) else {
            self.events.insert(incoming.event_id.clone(), incoming);
            return ApplyOutcome::Inserted;
        };
        if stored.status.is_terminal() && !incoming.status.is_terminal() {
            return ApplyOutcome::RejectedRegression;
        }
        if *stored == incoming {
            return ApplyOutcome::Unchanged;
        }
        *stored = incoming;
        ApplyOutcome::Updated
    }

    pub fn merge_batch<I>(&mut self, batch: I) -> MergeReport
    where
        I: IntoIterator<Item = TimelineEvent>,
    {
        let mut report = MergeReport::default();
        for event in batch {
            let event_id = event.event_id.clone();
            match self.apply(event) {
                ApplyOutcome::Inserted => report.inserted += 1,
                ApplyOutcome::Updated => report.updated += 1,
                ApplyOutcome::Unchanged => report.unchanged += 1,
                ApplyOutcome::RejectedRegression => report.rejected.push(event_id),
            }
        }
        report
    }
}

/// Returns a new ledger; `current` is left untouched so callers can swap entries wholesale.
pub fn merge<I>(current: &EventLedger, batch: I) -> (EventLedger, MergeReport)
where
    I: IntoIterator<Item = TimelineEvent>,
{
    let mut next = current.clone();
    let report = next.merge_batch(batch);
    (next, report)
}

pub fn displayed_events(ledger: &EventLedger) -> Vec<TimelineEvent> {
    let superseded: HashSet<&str> = ledger
        .iter()
        .filter_map(|event| {
            event
                .replaces_event_id
                .as_deref()
                .filter(|target| *target != event.event_id)
        })
        .collect();

    let mut displayed: Vec<TimelineEvent> = ledger
        .iter()
        .filter(|event| !superseded.contains(event.event_id.as_str()))
        .cloned()
        .collect();
    displayed.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.event_id.cmp(&b.event_id))
    });
    displayed
}
