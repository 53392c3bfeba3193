use async_trait::async_trait;
use benchview_core::{EventStatus, JobStatus, NormalizeReport, TimelineEvent};
use benchview_monitor::{
    spawn_arbiter, ArbiterConfig, ArbiterHandle, PushEvent, PushFeed, TimelineCache,
    TimelinePhase, TimelineSource, TimelineState, TransportError,
};
use chrono::{TimeZone, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};

type Response = Result<Vec<TimelineEvent>, String>;

struct FakeSource {
    responses: Mutex<Vec<Response>>,
    fetches: AtomicUsize,
}

impl FakeSource {
    fn new(responses: Vec<Response>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses),
            fetches: AtomicUsize::new(0),
        })
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TimelineSource for FakeSource {
    async fn fetch_timeline(&self, _job_id: &str) -> Result<NormalizeReport, TransportError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let response = {
            let mut responses = self.responses.lock().unwrap();
            if responses.len() > 1 {
                responses.remove(0)
            } else {
                responses.first().cloned().unwrap_or_else(|| Ok(Vec::new()))
            }
        };
        match response {
            Ok(events) => Ok(NormalizeReport {
                events,
                errors: Vec::new(),
            }),
            Err(reason) => Err(TransportError::Request {
                url: "fake://timeline".to_string(),
                reason,
            }),
        }
    }

    async fn fetch_job_status(&self, _job_id: &str) -> Result<JobStatus, TransportError> {
        Ok(JobStatus::Running)
    }
}

fn event(id: &str, status: EventStatus) -> TimelineEvent {
    TimelineEvent::new(id, "step", Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap())
        .with_status(status)
}

fn fast_config() -> ArbiterConfig {
    ArbiterConfig {
        fast_poll: Duration::from_millis(40),
        push_live_poll: Duration::from_secs(30),
    }
}

async fn wait_for<F>(handle: &mut ArbiterHandle, predicate: F) -> TimelineState
where
    F: Fn(&TimelineState) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            {
                let state = handle.state.borrow_and_update();
                if predicate(&state) {
                    return state.clone();
                }
            }
            handle.state.changed().await.expect("arbiter alive");
        }
    })
    .await
    .expect("state reached in time")
}

fn status_of(state: &TimelineState, id: &str) -> Option<EventStatus> {
    state
        .events()
        .iter()
        .find(|event| event.event_id == id)
        .map(|event| event.status)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn push_completion_survives_later_stale_polls() {
    let source = FakeSource::new(vec![Ok(vec![event("e1", EventStatus::InProgress)])]);
    let (push_tx, push_rx) = mpsc::channel(8);
    let (_status_tx, status_rx) = watch::channel(JobStatus::Running);
    let mut handle = spawn_arbiter(
        "run-1",
        source.clone(),
        TimelineCache::default(),
        fast_config(),
        status_rx,
        PushFeed::Channel(push_rx),
    );

    wait_for(&mut handle, |state| {
        status_of(state, "e1") == Some(EventStatus::InProgress)
    })
    .await;
    push_tx
        .send(PushEvent::Events(vec![event("e1", EventStatus::Completed)]))
        .await
        .unwrap();
    wait_for(&mut handle, |state| {
        status_of(state, "e1") == Some(EventStatus::Completed)
    })
    .await;

    let before = source.fetches();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(source.fetches() > before, "fast polling continues without push");
    assert_eq!(status_of(&handle.current(), "e1"), Some(EventStatus::Completed));
    handle.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn queued_job_waits_without_fetching() {
    let source = FakeSource::new(vec![Ok(vec![event("e1", EventStatus::Pending)])]);
    let (status_tx, status_rx) = watch::channel(JobStatus::Queued);
    let mut handle = spawn_arbiter(
        "run-1",
        source.clone(),
        TimelineCache::default(),
        fast_config(),
        status_rx,
        PushFeed::Disabled,
    );

    assert_eq!(handle.current().phase, TimelinePhase::AwaitingPredecessor);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(source.fetches(), 0);

    status_tx.send(JobStatus::Running).unwrap();
    let state = wait_for(&mut handle, |state| state.phase == TimelinePhase::Live).await;
    assert_eq!(state.events().len(), 1);
    assert!(source.fetches() >= 1);
    handle.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn terminal_job_is_fetched_once_then_settles() {
    let source = FakeSource::new(vec![Ok(vec![event("e1", EventStatus::InProgress)])]);
    let (_status_tx, status_rx) = watch::channel(JobStatus::Failed);
    let cache = TimelineCache::default();
    let mut handle = spawn_arbiter(
        "run-1",
        source.clone(),
        cache.clone(),
        fast_config(),
        status_rx,
        PushFeed::Disabled,
    );

    let state = wait_for(&mut handle, |state| state.phase == TimelinePhase::Settled).await;
    assert_eq!(status_of(&state, "e1"), Some(EventStatus::Failed));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(source.fetches(), 1);

    let cached = cache.get_fresh("run-1").expect("terminal entry cached");
    assert_eq!(cached.job_status, JobStatus::Failed);
    handle.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fresh_cache_is_served_before_any_fetch() {
    let cache = TimelineCache::new(Duration::from_secs(60));
    cache.merge_into(
        "run-1",
        vec![event("cached", EventStatus::Completed)],
        &JobStatus::Completed,
    );
    let source = FakeSource::new(vec![Err("offline".to_string())]);
    let (_status_tx, status_rx) = watch::channel(JobStatus::Completed);
    let handle = spawn_arbiter(
        "run-1",
        source.clone(),
        cache,
        fast_config(),
        status_rx,
        PushFeed::Disabled,
    );

    let state = handle.current();
    assert_eq!(state.phase, TimelinePhase::Settled);
    assert_eq!(status_of(&state, "cached"), Some(EventStatus::Completed));
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(source.fetches(), 0);
    handle.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn poll_failure_holds_last_timeline() {
    let source = FakeSource::new(vec![
        Ok(vec![event("e1", EventStatus::Completed)]),
        Err("connection reset".to_string()),
    ]);
    let (_status_tx, status_rx) = watch::channel(JobStatus::Running);
    let mut handle = spawn_arbiter(
        "run-1",
        source,
        TimelineCache::default(),
        fast_config(),
        status_rx,
        PushFeed::Disabled,
    );

    let state = wait_for(&mut handle, |state| state.holding_note().is_some()).await;
    assert_eq!(status_of(&state, "e1"), Some(EventStatus::Completed));
    assert!(state
        .holding_note()
        .unwrap()
        .contains("connection reset"));
    handle.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn live_push_widens_poll_interval() {
    let source = FakeSource::new(vec![Ok(vec![event("e1", EventStatus::InProgress)])]);
    let (push_tx, push_rx) = mpsc::channel(8);
    let (_status_tx, status_rx) = watch::channel(JobStatus::Running);
    let mut handle = spawn_arbiter(
        "run-1",
        source.clone(),
        TimelineCache::default(),
        fast_config(),
        status_rx,
        PushFeed::Channel(push_rx),
    );

    wait_for(&mut handle, |state| state.phase == TimelinePhase::Live).await;
    push_tx.send(PushEvent::Connected).await.unwrap();
    wait_for(&mut handle, |state| state.transport.push_live).await;

    let settled = source.fetches();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(source.fetches() <= settled + 1);

    push_tx
        .send(PushEvent::Disconnected {
            reason: "server restart".to_string(),
        })
        .await
        .unwrap();
    let state = wait_for(&mut handle, |state| !state.transport.push_live).await;
    assert_eq!(state.transport.push_error.as_deref(), Some("server restart"));
    let after = source.fetches();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(source.fetches() > after);
    handle.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn mounted_job_survives_cache_pruning() {
    let history: Vec<TimelineEvent> = (0..5)
        .map(|i| event(&format!("e{i}"), EventStatus::Completed))
        .collect();
    let source = FakeSource::new(vec![Ok(history)]);
    let (push_tx, push_rx) = mpsc::channel(8);
    let (_status_tx, status_rx) = watch::channel(JobStatus::Running);
    let cache = TimelineCache::default();
    let mut handle = spawn_arbiter(
        "run-1",
        source,
        cache.clone(),
        fast_config(),
        status_rx,
        PushFeed::Channel(push_rx),
    );

    wait_for(&mut handle, |state| state.events().len() == 5).await;
    push_tx.send(PushEvent::Connected).await.unwrap();
    wait_for(&mut handle, |state| state.transport.push_live).await;

    let long_after = Instant::now() + Duration::from_secs(60);
    assert_eq!(cache.prune_expired_at(long_after), 0);
    assert!(!cache.evict_if_live("run-1"));

    push_tx
        .send(PushEvent::Events(vec![event("e5", EventStatus::InProgress)]))
        .await
        .unwrap();
    let state = wait_for(&mut handle, |state| status_of(state, "e5").is_some()).await;
    assert_eq!(state.events().len(), 6);

    handle.shutdown().await;
    assert_eq!(cache.prune_expired_at(long_after), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn early_push_connect_keeps_fast_polling_until_first_snapshot() {
    let source = FakeSource::new(vec![
        Err("warming up".to_string()),
        Ok(vec![event("e1", EventStatus::Completed)]),
    ]);
    let (push_tx, push_rx) = mpsc::channel(8);
    push_tx.send(PushEvent::Connected).await.unwrap();
    let (_status_tx, status_rx) = watch::channel(JobStatus::Running);
    let mut handle = spawn_arbiter(
        "run-1",
        source.clone(),
        TimelineCache::default(),
        ArbiterConfig {
            fast_poll: Duration::from_millis(20),
            push_live_poll: Duration::from_secs(30),
        },
        status_rx,
        PushFeed::Channel(push_rx),
    );

    let state = wait_for(&mut handle, |state| state.phase == TimelinePhase::Live).await;
    assert!(state.transport.push_live);
    assert!(state.transport.last_poll_at.is_some());
    assert_eq!(status_of(&state, "e1"), Some(EventStatus::Completed));
    assert!(source.fetches() >= 2);
    handle.shutdown().await;
}
