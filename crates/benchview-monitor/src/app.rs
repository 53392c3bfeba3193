use benchview_core::view::bucketed_view;
use benchview_core::{remaining_seconds, IterationSelection, TimelineEvent};
use benchview_monitor::job_status::{fetch_initial_status, job_status_loop};
use benchview_monitor::{
    spawn_arbiter, ArbiterHandle, CountdownTick, CountdownTicker, MonitorConfig, PushConfig,
    PushFeed, TimelineCache, TimelineSource, TimelineState,
};
use chrono::Utc;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    Grid,
    Buckets,
}

impl ViewMode {
    pub fn title(self) -> &'static str {
        match self {
            ViewMode::Grid => "Timeline",
            ViewMode::Buckets => "Iterations",
        }
    }
}

pub struct App {
    pub config: MonitorConfig,
    source: Arc<dyn TimelineSource>,
    pub cache: TimelineCache,
    pub job_index: usize,
    mounted_job: Option<String>,
    arbiter: Option<ArbiterHandle>,
    job_status_stop: Option<watch::Sender<bool>>,
    pub state: Option<TimelineState>,
    ticker: CountdownTicker,
    pub selection: IterationSelection,
    pub view_mode: ViewMode,
    pub selected_node: usize,
    pub show_help: bool,
    switch_requested: bool,
    quit: bool,
}

impl App {
    pub fn new(
        config: MonitorConfig,
        source: Arc<dyn TimelineSource>,
        cache: TimelineCache,
        tick_tx: mpsc::Sender<CountdownTick>,
    ) -> Self {
        Self {
            config,
            source,
            cache,
            job_index: 0,
            mounted_job: None,
            arbiter: None,
            job_status_stop: None,
            state: None,
            ticker: CountdownTicker::new(tick_tx),
            selection: IterationSelection::Latest,
            view_mode: ViewMode::Grid,
            selected_node: 0,
            show_help: false,
            switch_requested: false,
            quit: false,
        }
    }

    pub fn job_id(&self) -> &str {
        self.config
            .jobs
            .get(self.job_index)
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    pub fn take_switch_request(&mut self) -> bool {
        std::mem::take(&mut self.switch_requested)
    }

    pub fn events(&self) -> &[TimelineEvent] {
        self.state
            .as_ref()
            .map(TimelineState::events)
            .unwrap_or(&[])
    }

    pub async fn mount(&mut self) {
        let job_id = self.job_id().to_string();
        info!(event = "job_mounted", job_id = %job_id);

        let fresh_status = self
            .cache
            .get_fresh(&job_id)
            .map(|entry| entry.job_status.clone());
        let job_status_rx = match (&self.config.fixed_job_status, fresh_status) {
            (Some(fixed), _) => watch::channel(fixed.clone()).1,
            (None, cached) => {
                let initial = match cached {
                    Some(status) => status,
                    None => fetch_initial_status(self.source.as_ref(), &job_id).await,
                };
                let (tx, rx) = watch::channel(initial);
                let (stop_tx, stop_rx) = watch::channel(false);
                tokio::spawn(job_status_loop(
                    Arc::clone(&self.source),
                    job_id.clone(),
                    self.config.job_status_poll,
                    tx,
                    stop_rx,
                ));
                self.job_status_stop = Some(stop_tx);
                rx
            }
        };

        let feed = match &self.config.push_url {
            Some(url) => PushFeed::WebSocket(PushConfig::new(
                url.clone(),
                job_id.clone(),
                self.config.client_id.clone(),
            )),
            None => PushFeed::Disabled,
        };
        let handle = spawn_arbiter(
            job_id,
            Arc::clone(&self.source),
            self.cache.clone(),
            self.config.arbiter,
            job_status_rx,
            feed,
        );
        let state = handle.current();
        self.mounted_job = Some(state.job_id.clone());
        self.arbiter = Some(handle);
        self.apply_state(state);
    }

    pub async fn unmount(&mut self) {
        self.ticker.clear();
        if let Some(stop) = self.job_status_stop.take() {
            let _ = stop.send(true);
        }
        if let Some(handle) = self.arbiter.take() {
            handle.shutdown().await;
        }
        if let Some(job_id) = self.mounted_job.take() {
            self.cache.evict_if_live(&job_id);
        }
        self.state = None;
        self.selected_node = 0;
        self.selection = IterationSelection::Latest;
    }

    pub async fn state_changed(&mut self) -> TimelineState {
        let Some(handle) = self.arbiter.as_mut() else {
            return std::future::pending().await;
        };
        if handle.state.changed().await.is_err() {
            return std::future::pending().await;
        }
        handle.state.borrow_and_update().clone()
    }

    pub fn apply_state(&mut self, state: TimelineState) {
        let restarted = self.ticker.sync(state.events());
        if !restarted.is_empty() {
            debug!(event = "countdowns_resynced", count = restarted.len());
        }
        self.state = Some(state);
    }

    /// Ticks only wake the render loop; the value shown is always derived from the current event.
    pub fn apply_tick(&mut self, tick: CountdownTick) {
        if tick.remaining.is_none() {
            debug!(event = "countdown_expired", event_id = %tick.event_id);
        }
    }

    pub fn countdown_for(&self, event: &TimelineEvent) -> Option<u64> {
        remaining_seconds(event, Utc::now())
    }

    pub fn clamp_selection(&mut self, node_count: usize) {
        if node_count == 0 {
            self.selected_node = 0;
        } else if self.selected_node >= node_count {
            self.selected_node = node_count - 1;
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if self.show_help {
            self.show_help = false;
            return;
        }
        let buckets = bucketed_view(self.events());
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.quit = true,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.quit = true
            }
            KeyCode::Char('?') => self.show_help = true,
            KeyCode::Char('n') | KeyCode::Tab => self.step_job(1),
            KeyCode::Char('p') | KeyCode::BackTab => self.step_job(-1),
            KeyCode::Char(']') => {
                self.selection = self.selection.next(&buckets);
                self.selected_node = 0;
            }
            KeyCode::Char('[') => {
                self.selection = self.selection.previous(&buckets);
                self.selected_node = 0;
            }
            KeyCode::Char('a') => self.selection = IterationSelection::All,
            KeyCode::Char('L') => self.selection = IterationSelection::Latest,
            KeyCode::Char('v') => {
                self.view_mode = match self.view_mode {
                    ViewMode::Grid => ViewMode::Buckets,
                    ViewMode::Buckets => ViewMode::Grid,
                }
            }
            KeyCode::Right | KeyCode::Char('l') | KeyCode::Down | KeyCode::Char('j') => {
                self.selected_node = self.selected_node.saturating_add(1);
            }
            KeyCode::Left | KeyCode::Char('h') | KeyCode::Up | KeyCode::Char('k') => {
                self.selected_node = self.selected_node.saturating_sub(1);
            }
            KeyCode::Home | KeyCode::Char('g') => self.selected_node = 0,
            KeyCode::End | KeyCode::Char('G') => self.selected_node = usize::MAX,
            _ => {}
        }
    }

    fn step_job(&mut self, delta: isize) {
        let count = self.config.jobs.len();
        if count < 2 {
            return;
        }
        let next = (self.job_index as isize + delta).rem_euclid(count as isize) as usize;
        if next != self.job_index {
            self.job_index = next;
            self.switch_requested = true;
        }
    }
}
