pub mod adjust;
pub mod countdown;
pub mod event;
pub mod iteration;
pub mod layout;
pub mod merge;
pub mod push_wire;
pub mod view;

pub use adjust::adjust_status;
pub use countdown::{countdown_deadline, countdown_hint_secs, remaining_seconds, COUNTDOWN_KEYS};
pub use event::{
    normalize_batch, normalize_event, normalize_snapshot, NormalizeError, NormalizeReport,
    TimelineEvent,
};
pub use iteration::{classify_iterations, IterationBuckets};
pub use layout::{grid_metrics, layout_snake, GridMetrics, SnakeLayout};
pub use merge::{displayed_events, merge, EventLedger, MergeReport};
pub use view::{flat_view, resolved_events, FlatView, IterationSelection};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
    Warning,
    Error,
}

impl Default for EventStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Pending => "pending",
            EventStatus::InProgress => "in_progress",
            EventStatus::Completed => "completed",
            EventStatus::Failed => "failed",
            EventStatus::Skipped => "skipped",
            EventStatus::Warning => "warning",
            EventStatus::Error => "error",
        }
    }

    /// Terminal statuses are sticky: a merge may never move an event out of one.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventStatus::Completed | EventStatus::Failed | EventStatus::Skipped
        )
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_lowercase();
        match normalized.as_str() {
            "pending" | "queued" | "waiting" => Ok(EventStatus::Pending),
            "in_progress" | "in-progress" | "inprogress" | "running" | "started" => {
                Ok(EventStatus::InProgress)
            }
            "completed" | "complete" | "success" | "succeeded" | "done" | "ok" => {
                Ok(EventStatus::Completed)
            }
            "failed" | "failure" => Ok(EventStatus::Failed),
            "skipped" | "cancelled" | "canceled" => Ok(EventStatus::Skipped),
            "warning" | "warn" => Ok(EventStatus::Warning),
            "error" => Ok(EventStatus::Error),
            other => Err(format!("Unknown event status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineGate {
    AwaitingPredecessor,
    Fetch,
}

impl Default for JobStatus {
    fn default() -> Self {
        Self::Running
    }
}

impl JobStatus {
    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Other(value) => value.as_str(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn timeline_gate(&self) -> TimelineGate {
        match self {
            JobStatus::Queued => TimelineGate::AwaitingPredecessor,
            _ => TimelineGate::Fetch,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for JobStatus {
    fn from(input: &str) -> Self {
        let normalized = input.trim().to_lowercase();
        match normalized.as_str() {
            "queued" | "pending" | "waiting" => JobStatus::Queued,
            "running" | "in_progress" | "in-progress" | "started" => JobStatus::Running,
            "completed" | "complete" | "succeeded" | "success" | "done" => JobStatus::Completed,
            "failed" | "failure" | "error" => JobStatus::Failed,
            "cancelled" | "canceled" | "aborted" => JobStatus::Cancelled,
            _ => JobStatus::Other(normalized),
        }
    }
}

impl Serialize for JobStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for JobStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(JobStatus::from(raw.as_str()))
    }
}
