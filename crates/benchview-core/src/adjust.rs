use crate::event::TimelineEvent;
use crate::{EventStatus, JobStatus};

pub fn adjusted_status(status: EventStatus, job: &JobStatus) -> EventStatus {
    match (job, status) {
        (JobStatus::Failed, EventStatus::Pending | EventStatus::InProgress) => EventStatus::Failed,
        (JobStatus::Completed, EventStatus::InProgress) => EventStatus::Completed,
        (JobStatus::Cancelled, EventStatus::InProgress) => EventStatus::Skipped,
        _ => status,
    }
}

/// Display-only transform; the caller's events are never modified.
pub fn adjust_status(events: &[TimelineEvent], job: &JobStatus) -> Vec<TimelineEvent> {
    events
        .iter()
        .map(|event| {
            let status = adjusted_status(event.status, job);
            if status == event.status {
                event.clone()
            } else {
                TimelineEvent {
                    status,
                    ..event.clone()
                }
            }
        })
        .collect()
}
