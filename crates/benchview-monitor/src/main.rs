mod app;
mod theme;
mod ui;

use anyhow::{Context, Result};
use benchview_monitor::logging::init_logging;
use benchview_monitor::{HttpTimelineSource, MonitorConfig, TimelineCache, TimelineSource};
use crossterm::{
    event::{Event, EventStream, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures_util::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::{io, sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tracing::info;

const CACHE_PRUNE_INTERVAL: Duration = Duration::from_secs(30);
const TICK_QUEUE_CAPACITY: usize = 128;

#[tokio::main]
async fn main() -> Result<()> {
    let config = MonitorConfig::load().context("invalid configuration")?;
    let _log_guard = init_logging(&config);
    info!(
        event = "monitor_started",
        jobs = config.jobs.len(),
        api_base = %config.api_base,
        push = config.push_url.is_some()
    );

    let source: Arc<dyn TimelineSource> = Arc::new(
        HttpTimelineSource::new(&config.api_base, config.request_timeout)
            .context("failed to create timeline client")?,
    );
    let cache = TimelineCache::new(config.cache_ttl);
    let (tick_tx, tick_rx) = mpsc::channel(TICK_QUEUE_CAPACITY);
    let mut app = app::App::new(config, source, cache, tick_tx);
    app.mount().await;

    let mut terminal = setup_terminal()?;
    let result = run_app(&mut terminal, &mut app, tick_rx).await;
    app.unmount().await;
    restore_terminal(&mut terminal)?;

    if let Err(err) = result {
        eprintln!("benchview-monitor: {err:#}");
    }

    Ok(())
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut app::App,
    mut tick_rx: mpsc::Receiver<benchview_monitor::CountdownTick>,
) -> Result<()> {
    let mut events = EventStream::new();
    let mut prune_ticker = tokio::time::interval(CACHE_PRUNE_INTERVAL);

    loop {
        terminal.draw(|f| ui::render(f, app))?;

        tokio::select! {
            state = app.state_changed() => {
                app.apply_state(state);
            }
            Some(tick) = tick_rx.recv() => {
                app.apply_tick(tick);
            }
            _ = prune_ticker.tick() => {
                app.cache.prune_expired();
            }
            maybe_event = events.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key))) => {
                        if matches!(key.kind, KeyEventKind::Press | KeyEventKind::Repeat) {
                            app.handle_key(key);
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return Err(err).context("terminal input failed"),
                    None => break,
                }
            }
        }

        if app.should_quit() {
            break;
        }
        if app.take_switch_request() {
            app.unmount().await;
            app.mount().await;
        }
    }

    Ok(())
}
