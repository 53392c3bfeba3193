use crate::cache::{CacheEntry, CachePin, TimelineCache};
use crate::poll::{TimelineSource, TransportError};
use crate::push::{push_loop, PushConfig, PushEvent};
use benchview_core::{JobStatus, NormalizeReport, TimelineEvent, TimelineGate};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub const DEFAULT_FAST_POLL: Duration = Duration::from_secs(2);
pub const DEFAULT_PUSH_LIVE_POLL: Duration = Duration::from_secs(15);
const PUSH_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArbiterConfig {
    pub fast_poll: Duration,
    pub push_live_poll: Duration,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            fast_poll: DEFAULT_FAST_POLL,
            push_live_poll: DEFAULT_PUSH_LIVE_POLL,
        }
    }
}

impl ArbiterConfig {
    pub fn poll_interval(&self, push_live: bool) -> Duration {
        if push_live {
            self.push_live_poll
        } else {
            self.fast_poll
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelinePhase {
    Loading,
    AwaitingPredecessor,
    Live,
    Settled,
}

impl TimelinePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimelinePhase::Loading => "loading",
            TimelinePhase::AwaitingPredecessor => "awaiting predecessor",
            TimelinePhase::Live => "live",
            TimelinePhase::Settled => "settled",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStatus {
    pub push_live: bool,
    pub push_error: Option<String>,
    pub last_poll_error: Option<String>,
    pub last_poll_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct TimelineState {
    pub job_id: String,
    pub job_status: JobStatus,
    pub phase: TimelinePhase,
    pub entry: Option<Arc<CacheEntry>>,
    pub transport: TransportStatus,
}

impl TimelineState {
    pub fn events(&self) -> &[TimelineEvent] {
        self.entry
            .as_ref()
            .map(|entry| entry.events.as_slice())
            .unwrap_or(&[])
    }

    /// Set when a poll failed but an earlier timeline is still on screen.
    pub fn holding_note(&self) -> Option<String> {
        match (&self.transport.last_poll_error, &self.entry) {
            (Some(err), Some(_)) => Some(format!("holding last timeline: {err}")),
            _ => None,
        }
    }
}

pub enum PushFeed {
    Disabled,
    WebSocket(PushConfig),
    Channel(mpsc::Receiver<PushEvent>),
}

pub struct ArbiterHandle {
    pub state: watch::Receiver<TimelineState>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl ArbiterHandle {
    pub fn current(&self) -> TimelineState {
        self.state.borrow().clone()
    }

    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ArbiterHandle {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

fn phase_for(job_status: &JobStatus, has_entry: bool, settled: bool) -> TimelinePhase {
    if settled {
        TimelinePhase::Settled
    } else if job_status.timeline_gate() == TimelineGate::AwaitingPredecessor {
        TimelinePhase::AwaitingPredecessor
    } else if has_entry {
        TimelinePhase::Live
    } else {
        TimelinePhase::Loading
    }
}

struct PushLink {
    rx: Option<mpsc::Receiver<PushEvent>>,
    stop: Option<watch::Sender<bool>>,
}

impl PushLink {
    fn start(feed: PushFeed) -> Self {
        match feed {
            PushFeed::Disabled => Self {
                rx: None,
                stop: None,
            },
            PushFeed::Channel(rx) => Self {
                rx: Some(rx),
                stop: None,
            },
            PushFeed::WebSocket(config) => {
                let (tx, rx) = mpsc::channel(PUSH_QUEUE_CAPACITY);
                let (stop_tx, stop_rx) = watch::channel(false);
                tokio::spawn(push_loop(config, tx, stop_rx));
                Self {
                    rx: Some(rx),
                    stop: Some(stop_tx),
                }
            }
        }
    }

    async fn recv(&mut self) -> Option<PushEvent> {
        match self.rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => std::future::pending().await,
        }
    }

    fn is_open(&self) -> bool {
        self.rx.is_some()
    }

    fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(true);
        }
        self.rx = None;
    }
}

impl Drop for PushLink {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Arbiter {
    job_id: String,
    source: Arc<dyn TimelineSource>,
    cache: TimelineCache,
    _pin: CachePin,
    config: ArbiterConfig,
    state: TimelineState,
    state_tx: watch::Sender<TimelineState>,
    settled: bool,
}

impl Arbiter {
    fn publish(&mut self) {
        self.state.phase = phase_for(
            &self.state.job_status,
            self.state.entry.is_some(),
            self.settled,
        );
        self.state_tx.send_replace(self.state.clone());
    }

    fn polling(&self) -> bool {
        !self.settled && self.state.job_status.timeline_gate() == TimelineGate::Fetch
    }

    /// Push only carries new events, so the wide interval applies once a snapshot has landed.
    fn next_poll_after(&self, from: Instant) -> Instant {
        let transport = &self.state.transport;
        let widened = transport.push_live && transport.last_poll_at.is_some();
        from + self.config.poll_interval(widened)
    }

    fn apply_poll(&mut self, result: Result<NormalizeReport, TransportError>) {
        match result {
            Ok(report) => {
                for err in &report.errors {
                    warn!(event = "timeline_event_dropped", job_id = %self.job_id, error = %err);
                }
                let job_status = self.state.job_status.clone();
                let (entry, merged) = self.cache.merge_into(&self.job_id, report.events, &job_status);
                debug!(
                    event = "timeline_poll_merged",
                    job_id = %self.job_id,
                    inserted = merged.inserted,
                    updated = merged.updated,
                    rejected = merged.rejected.len()
                );
                self.state.entry = Some(entry);
                self.state.transport.last_poll_error = None;
                self.state.transport.last_poll_at = Some(Utc::now());
                if job_status.is_terminal() {
                    info!(event = "timeline_settled", job_id = %self.job_id, status = %job_status);
                    self.settled = true;
                }
            }
            Err(err) => {
                warn!(event = "timeline_poll_error", job_id = %self.job_id, error = %err);
                self.state.transport.last_poll_error = Some(err.to_string());
            }
        }
    }

    fn apply_push(&mut self, event: Option<PushEvent>, push: &mut PushLink) -> bool {
        match event {
            Some(PushEvent::Connected) => {
                self.state.transport.push_live = true;
                self.state.transport.push_error = None;
                false
            }
            Some(PushEvent::Disconnected { reason }) => {
                self.state.transport.push_live = false;
                self.state.transport.push_error = Some(reason);
                true
            }
            Some(PushEvent::Events(events)) => {
                let job_status = self.state.job_status.clone();
                let (entry, merged) = self.cache.merge_into(&self.job_id, events, &job_status);
                if !merged.rejected.is_empty() {
                    debug!(
                        event = "push_regression_rejected",
                        job_id = %self.job_id,
                        rejected = merged.rejected.len()
                    );
                }
                self.state.entry = Some(entry);
                false
            }
            None => {
                push.stop();
                self.state.transport.push_live = false;
                true
            }
        }
    }

    fn apply_job_status(&mut self, job_status: JobStatus) -> bool {
        if job_status == self.state.job_status {
            return false;
        }
        info!(
            event = "job_status_changed",
            job_id = %self.job_id,
            from = %self.state.job_status,
            to = %job_status
        );
        let was_gated = self.state.job_status.timeline_gate() == TimelineGate::AwaitingPredecessor;
        self.state.job_status = job_status.clone();
        if let Some(entry) = self.cache.restatus(&self.job_id, &job_status) {
            self.state.entry = Some(entry);
        }
        was_gated || job_status.is_terminal()
    }
}

/// Serves a fresh cache entry synchronously, then drives poll and push for one job until shut down.
pub fn spawn_arbiter(
    job_id: impl Into<String>,
    source: Arc<dyn TimelineSource>,
    cache: TimelineCache,
    config: ArbiterConfig,
    mut job_status_rx: watch::Receiver<JobStatus>,
    feed: PushFeed,
) -> ArbiterHandle {
    let job_id = job_id.into();
    let pin = cache.pin(&job_id);
    let job_status = job_status_rx.borrow_and_update().clone();
    let cached = cache.get_fresh(&job_id);
    let settled = cached
        .as_ref()
        .is_some_and(|entry| entry.job_status.is_terminal());
    let (job_status, entry) = match cached {
        Some(entry) if settled => (entry.job_status.clone(), Some(entry)),
        Some(_) => {
            let entry = cache.restatus(&job_id, &job_status);
            (job_status, entry)
        }
        None => (job_status, None),
    };
    let served_from_cache = entry.is_some();
    let initial = TimelineState {
        job_id: job_id.clone(),
        job_status,
        phase: TimelinePhase::Loading,
        entry,
        transport: TransportStatus::default(),
    };
    let (state_tx, state_rx) = watch::channel(initial.clone());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut arbiter = Arbiter {
        job_id,
        source,
        cache,
        _pin: pin,
        config,
        state: initial,
        state_tx,
        settled,
    };
    arbiter.publish();

    let task = tokio::spawn(async move {
        run_arbiter(arbiter, job_status_rx, shutdown_rx, feed, served_from_cache).await;
    });

    ArbiterHandle {
        state: state_rx,
        shutdown: shutdown_tx,
        task: Some(task),
    }
}

async fn run_arbiter(
    mut arbiter: Arbiter,
    mut job_status_rx: watch::Receiver<JobStatus>,
    mut shutdown: watch::Receiver<bool>,
    feed: PushFeed,
    served_from_cache: bool,
) {
    let mut push = if arbiter.settled {
        PushLink::start(PushFeed::Disabled)
    } else {
        PushLink::start(feed)
    };
    let mut job_status_open = !arbiter.settled;
    let mut last_poll = Instant::now();
    let mut next_poll = if served_from_cache {
        arbiter.next_poll_after(last_poll)
    } else {
        last_poll
    };

    loop {
        let polling = arbiter.polling();
        tokio::select! {
            _ = shutdown.changed() => break,
            changed = job_status_rx.changed(), if job_status_open => {
                if changed.is_err() {
                    job_status_open = false;
                    continue;
                }
                let job_status = job_status_rx.borrow_and_update().clone();
                if arbiter.apply_job_status(job_status) {
                    next_poll = Instant::now();
                }
                arbiter.publish();
            }
            _ = tokio::time::sleep_until(next_poll), if polling => {
                let result = tokio::select! {
                    result = arbiter.source.fetch_timeline(&arbiter.job_id) => result,
                    _ = shutdown.changed() => break,
                };
                arbiter.apply_poll(result);
                last_poll = Instant::now();
                next_poll = arbiter.next_poll_after(last_poll);
                if arbiter.settled {
                    push.stop();
                    arbiter.state.transport.push_live = false;
                    job_status_open = false;
                }
                arbiter.publish();
            }
            event = push.recv(), if push.is_open() => {
                let was_live = arbiter.state.transport.push_live;
                let reschedule = arbiter.apply_push(event, &mut push);
                if reschedule || was_live != arbiter.state.transport.push_live {
                    next_poll = arbiter.next_poll_after(last_poll);
                }
                arbiter.publish();
            }
        }
    }
    debug!(event = "arbiter_stopped", job_id = %arbiter.job_id);
}
