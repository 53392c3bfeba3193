use benchview_core::push_wire::{decode_push_text, PushMessage, DEFAULT_MAX_FRAME_BYTES};
use benchview_core::view::{bucketed_view, node_label};
use benchview_core::{
    flat_view, merge, normalize_snapshot, resolved_events, EventLedger, EventStatus,
    IterationSelection, JobStatus, TimelineEvent,
};
use serde_json::json;

fn poll_snapshot() -> Vec<TimelineEvent> {
    let body = json!({
        "events": [
            {
                "event_id": "e0",
                "event_type": "run_started",
                "timestamp": "2026-03-01T10:00:00Z",
                "status": "completed"
            },
            {
                "event_id": "e1",
                "event_type": "benchmark_running",
                "timestamp": "2026-03-01T10:00:05Z",
                "status": "in_progress",
                "metadata": { "seconds": 60 }
            }
        ]
    });
    normalize_snapshot(&body).expect("snapshot").events
}

fn push_frames() -> Vec<TimelineEvent> {
    let text = concat!(
        r#"{"type":"timeline_event","job_id":"run-1","event_id":"e1","event_type":"benchmark_running","timestamp":"2026-03-01T10:00:05Z","status":"completed"}"#,
        "\n",
        r#"{"type":"heartbeat"}"#,
    );
    decode_push_text(text, DEFAULT_MAX_FRAME_BYTES)
        .frames
        .into_iter()
        .filter_map(|message| match message {
            PushMessage::Event { event, .. } => Some(event),
            _ => None,
        })
        .collect()
}

#[test]
fn poll_then_push_and_push_then_poll_agree() {
    let (after_poll, _) = merge(&EventLedger::new(), poll_snapshot());
    let (poll_first, _) = merge(&after_poll, push_frames());

    let (after_push, _) = merge(&EventLedger::new(), push_frames());
    let (push_first, report) = merge(&after_push, poll_snapshot());

    assert_eq!(poll_first, push_first);
    assert_eq!(poll_first.get("e1").unwrap().status, EventStatus::Completed);
    assert_eq!(report.rejected, vec!["e1".to_string()]);
}

#[test]
fn snapshot_flows_into_flat_view_with_job_override() {
    let (ledger, _) = merge(&EventLedger::new(), poll_snapshot());
    let events = resolved_events(&ledger, &JobStatus::Failed);
    assert_eq!(events[1].status, EventStatus::Failed);

    let view = flat_view(&events, IterationSelection::All, 80, 20);
    assert_eq!(view.layout.cols, 4);
    assert_eq!(view.layout.nodes.len(), 2);
    assert_eq!(view.layout.connectors.len(), 1);
    assert_eq!(node_label(&events[0]), "Run started");
}

#[test]
fn superseded_retry_disappears_from_buckets() {
    let body = json!([
        {
            "event_id": "start-1",
            "event_type": "iteration_started",
            "timestamp": "2026-03-01T10:00:00Z",
            "metadata": { "iteration": 1 }
        },
        {
            "event_id": "launch-a",
            "event_type": "game_launch",
            "timestamp": "2026-03-01T10:00:01Z",
            "status": "failed"
        },
        {
            "event_id": "launch-b",
            "event_type": "game_launch",
            "timestamp": "2026-03-01T10:00:02Z",
            "status": "completed",
            "replaces_event_id": "launch-a"
        }
    ]);
    let (ledger, _) = merge(
        &EventLedger::new(),
        normalize_snapshot(&body).expect("snapshot").events,
    );
    let buckets = bucketed_view(&resolved_events(&ledger, &JobStatus::Running));
    let ids: Vec<&str> = buckets
        .events(1)
        .iter()
        .map(|event| event.event_id.as_str())
        .collect();
    assert_eq!(ids, vec!["start-1", "launch-b"]);
    assert_eq!(ledger.len(), 3);
}
