use benchview_core::push_wire::{
    decode_push_text, encode_frame, PushMessage, SubscribeRequest, DEFAULT_MAX_FRAME_BYTES,
};
use benchview_core::TimelineEvent;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    Connected,
    Disconnected { reason: String },
    Events(Vec<TimelineEvent>),
}

#[derive(Debug, Clone)]
pub struct PushConfig {
    pub url: Url,
    pub job_id: String,
    pub client_id: String,
    pub max_frame_bytes: usize,
}

impl PushConfig {
    pub fn new(url: Url, job_id: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            url,
            job_id: job_id.into(),
            client_id: client_id.into(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

pub fn next_backoff(current: Duration) -> Duration {
    let next = current + current;
    if next > Duration::from_secs(10) {
        Duration::from_secs(10)
    } else {
        next
    }
}

/// Keeps only event messages addressed to `job_id`; bad lines are logged and dropped.
pub fn route_push_text(text: &str, job_id: &str, max_frame_bytes: usize) -> Vec<TimelineEvent> {
    let report = decode_push_text(text, max_frame_bytes);
    for err in report.errors {
        warn!(event = "push_decode_error", job_id, error = %err);
    }
    report
        .frames
        .into_iter()
        .filter_map(|message| match message {
            PushMessage::Event {
                job_id: target,
                event,
            } if target == job_id => Some(event),
            PushMessage::Subscribed { job_id: target } => {
                debug!(event = "push_subscribed", job_id = ?target);
                None
            }
            _ => None,
        })
        .collect()
}

async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => *shutdown.borrow(),
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

pub async fn push_loop(
    config: PushConfig,
    tx: mpsc::Sender<PushEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut backoff = Duration::from_secs(1);

    loop {
        if *shutdown.borrow() {
            return;
        }
        let connect = tokio::select! {
            result = connect_async(config.url.clone()) => result,
            _ = shutdown.changed() => return,
        };
        let mut ws = match connect {
            Ok((ws, _)) => ws,
            Err(err) => {
                warn!(event = "push_connect_error", job_id = %config.job_id, error = %err);
                let reason = err.to_string();
                if tx.send(PushEvent::Disconnected { reason }).await.is_err() {
                    return;
                }
                if sleep_or_shutdown(backoff, &mut shutdown).await {
                    return;
                }
                backoff = next_backoff(backoff);
                continue;
            }
        };
        backoff = Duration::from_secs(1);

        let subscribe = SubscribeRequest::new(config.job_id.clone(), config.client_id.clone());
        let sent = match encode_frame(&subscribe, config.max_frame_bytes) {
            Ok(frame) => ws.send(Message::Text(frame)).await.is_ok(),
            Err(err) => {
                warn!(event = "push_subscribe_encode_error", error = %err);
                false
            }
        };
        if !sent {
            let _ = ws.close(None).await;
            if sleep_or_shutdown(backoff, &mut shutdown).await {
                return;
            }
            backoff = next_backoff(backoff);
            continue;
        }

        info!(event = "push_connected", job_id = %config.job_id, url = %config.url);
        if tx.send(PushEvent::Connected).await.is_err() {
            let _ = ws.close(None).await;
            return;
        }

        let reason = loop {
            tokio::select! {
                inbound = ws.next() => match inbound {
                    Some(Ok(Message::Text(text))) => {
                        let events = route_push_text(&text, &config.job_id, config.max_frame_bytes);
                        if !events.is_empty() && tx.send(PushEvent::Events(events)).await.is_err() {
                            let _ = ws.close(None).await;
                            return;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break "closed by server".to_string(),
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(event = "push_read_error", job_id = %config.job_id, error = %err);
                        break err.to_string();
                    }
                },
                _ = shutdown.changed() => {
                    let _ = ws.close(None).await;
                    return;
                }
            }
        };

        if tx.send(PushEvent::Disconnected { reason }).await.is_err() {
            return;
        }
        if sleep_or_shutdown(backoff, &mut shutdown).await {
            return;
        }
        backoff = next_backoff(backoff);
    }
}
