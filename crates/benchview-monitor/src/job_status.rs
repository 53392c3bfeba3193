use crate::poll::TimelineSource;
use benchview_core::JobStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

pub async fn fetch_initial_status(source: &dyn TimelineSource, job_id: &str) -> JobStatus {
    match source.fetch_job_status(job_id).await {
        Ok(status) => status,
        Err(err) => {
            warn!(event = "job_status_fetch_error", job_id, error = %err);
            JobStatus::default()
        }
    }
}

/// Follows the parent job's status until it turns terminal or shutdown is signalled.
pub async fn job_status_loop(
    source: Arc<dyn TimelineSource>,
    job_id: String,
    interval: Duration,
    tx: watch::Sender<JobStatus>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if tx.borrow().is_terminal() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => return,
        }
        let fetched = tokio::select! {
            result = source.fetch_job_status(&job_id) => result,
            _ = shutdown.changed() => return,
        };
        match fetched {
            Ok(status) => {
                let changed = tx.send_if_modified(|current| {
                    if *current == status {
                        false
                    } else {
                        *current = status.clone();
                        true
                    }
                });
                if changed {
                    debug!(event = "job_status_observed", job_id = %job_id, status = %status);
                }
            }
            Err(err) => {
                warn!(event = "job_status_fetch_error", job_id = %job_id, error = %err);
            }
        }
    }
}
