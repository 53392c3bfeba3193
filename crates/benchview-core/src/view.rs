use crate::adjust::adjust_status;
use crate::event::TimelineEvent;
use crate::iteration::{classify_iterations, IterationBuckets};
use crate::layout::{grid_metrics, layout_snake, GridMetrics, SnakeLayout};
use crate::merge::{displayed_events, EventLedger};
use crate::JobStatus;

const STEP_KEYS: &[&str] = &["step", "step_number", "step_index"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationSelection {
    All,
    Latest,
    Iteration(u32),
}

impl Default for IterationSelection {
    fn default() -> Self {
        Self::Latest
    }
}

impl IterationSelection {
    pub fn resolve(self, buckets: &IterationBuckets) -> Option<u32> {
        match self {
            IterationSelection::All => None,
            IterationSelection::Latest => Some(buckets.latest()),
            IterationSelection::Iteration(n) => Some(n.clamp(1, buckets.total.max(1))),
        }
    }

    pub fn next(self, buckets: &IterationBuckets) -> Self {
        match self.resolve(buckets) {
            None => IterationSelection::Iteration(1),
            Some(n) if n >= buckets.total => IterationSelection::All,
            Some(n) => IterationSelection::Iteration(n + 1),
        }
    }

    pub fn previous(self, buckets: &IterationBuckets) -> Self {
        match self.resolve(buckets) {
            None => IterationSelection::Iteration(buckets.total.max(1)),
            Some(1) => IterationSelection::All,
            Some(n) => IterationSelection::Iteration(n - 1),
        }
    }

    pub fn label(self, buckets: &IterationBuckets) -> String {
        match self.resolve(buckets) {
            None => format!("all {} iterations", buckets.total),
            Some(n) => format!("iteration {n}/{}", buckets.total),
        }
    }
}

/// Displayed set with the job-level override applied, ready for either view.
pub fn resolved_events(ledger: &EventLedger, job: &JobStatus) -> Vec<TimelineEvent> {
    adjust_status(&displayed_events(ledger), job)
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlatView {
    pub iteration: Option<u32>,
    pub events: Vec<TimelineEvent>,
    pub metrics: GridMetrics,
    pub layout: SnakeLayout,
}

pub fn flat_view(
    events: &[TimelineEvent],
    selection: IterationSelection,
    available_width: u32,
    min_cell_width: u32,
) -> FlatView {
    let (iteration, selected) = match selection {
        IterationSelection::All => (None, events.to_vec()),
        _ => {
            let buckets = classify_iterations(events);
            let iteration = selection.resolve(&buckets);
            let selected = iteration
                .map(|n| buckets.events(n).to_vec())
                .unwrap_or_default();
            (iteration, selected)
        }
    };
    let metrics = grid_metrics(available_width, min_cell_width);
    let layout = layout_snake(&selected, metrics.cols);
    FlatView {
        iteration,
        events: selected,
        metrics,
        layout,
    }
}

pub fn bucketed_view(events: &[TimelineEvent]) -> IterationBuckets {
    classify_iterations(events)
}

pub fn node_label(event: &TimelineEvent) -> String {
    let kind = event.event_type.trim();
    let base = if kind.is_empty() || kind.eq_ignore_ascii_case("info") {
        if event.message.trim().is_empty() {
            "Info".to_string()
        } else {
            event.message.trim().to_string()
        }
    } else {
        humanize(kind)
    };
    match event.metadata_number(STEP_KEYS) {
        Some(step) if step >= 0.0 && step.fract() == 0.0 => format!("Step {step}: {base}"),
        _ => base,
    }
}

fn humanize(kind: &str) -> String {
    let spaced = kind.replace(['_', '-'], " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn format_duration_ms(ms: u64) -> String {
    if ms < 1_000 {
        return format!("{ms}ms");
    }
    let secs = ms / 1_000;
    if secs < 60 {
        return format!("{:.1}s", ms as f64 / 1_000.0);
    }
    if secs < 3_600 {
        return format!("{}m {:02}s", secs / 60, secs % 60);
    }
    format!("{}h {:02}m", secs / 3_600, (secs % 3_600) / 60)
}
