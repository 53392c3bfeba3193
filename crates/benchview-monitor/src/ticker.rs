use benchview_core::{countdown_deadline, remaining_seconds, EventStatus, TimelineEvent};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

const TICK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountdownTick {
    pub event_id: String,
    pub remaining: Option<u64>,
}

struct Countdown {
    deadline: DateTime<Utc>,
    task: JoinHandle<()>,
}

pub struct CountdownTicker {
    tx: mpsc::Sender<CountdownTick>,
    tasks: HashMap<String, Countdown>,
}

impl CountdownTicker {
    pub fn new(tx: mpsc::Sender<CountdownTick>) -> Self {
        Self {
            tx,
            tasks: HashMap::new(),
        }
    }

    /// Starts a 1Hz task per in-flight countdown, restarts tasks whose deadline moved and aborts
    /// tasks whose event no longer qualifies. Returns the ids whose earlier ticks are now stale.
    pub fn sync(&mut self, events: &[TimelineEvent]) -> Vec<String> {
        let now = Utc::now();
        let wanted: HashMap<&str, (&TimelineEvent, DateTime<Utc>)> = events
            .iter()
            .filter(|event| event.status == EventStatus::InProgress)
            .filter(|event| remaining_seconds(event, now).is_some())
            .filter_map(|event| {
                let deadline = countdown_deadline(event)?;
                Some((event.event_id.as_str(), (event, deadline)))
            })
            .collect();

        let mut stale = Vec::new();
        self.tasks.retain(|event_id, countdown| {
            let keep = !countdown.task.is_finished()
                && wanted
                    .get(event_id.as_str())
                    .is_some_and(|(_, deadline)| *deadline == countdown.deadline);
            if !keep {
                countdown.task.abort();
                stale.push(event_id.clone());
            }
            keep
        });

        for (event_id, (event, deadline)) in wanted {
            if self.tasks.contains_key(event_id) {
                continue;
            }
            let task = tokio::spawn(run_countdown(event.clone(), self.tx.clone()));
            self.tasks.insert(event_id.to_string(), Countdown { deadline, task });
        }
        stale
    }

    pub fn active(&self) -> usize {
        self.tasks
            .values()
            .filter(|countdown| !countdown.task.is_finished())
            .count()
    }

    pub fn clear(&mut self) {
        for (_, countdown) in self.tasks.drain() {
            countdown.task.abort();
        }
    }
}

impl Drop for CountdownTicker {
    fn drop(&mut self) {
        self.clear();
    }
}

async fn run_countdown(event: TimelineEvent, tx: mpsc::Sender<CountdownTick>) {
    let mut interval = tokio::time::interval(TICK_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        let remaining = remaining_seconds(&event, Utc::now());
        let tick = CountdownTick {
            event_id: event.event_id.clone(),
            remaining,
        };
        if tx.send(tick).await.is_err() || remaining.is_none() {
            return;
        }
    }
}
