use crate::app::{App, ViewMode};
use crate::theme::{self, icons};
use benchview_core::countdown::format_countdown;
use benchview_core::layout::{ConnectorPath, GridMetrics};
use benchview_core::view::{bucketed_view, format_duration_ms, node_label, FlatView};
use benchview_core::{flat_view, TimelineEvent};
use benchview_monitor::TimelinePhase;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

const NODE_HEIGHT: u16 = 4;
const ROW_HEIGHT: u16 = NODE_HEIGHT + 1;
const CONNECTOR_GAP: u16 = 3;

pub fn render(f: &mut Frame, app: &mut App) {
    let area = f.size();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Min(ROW_HEIGHT),
            Constraint::Length(6),
            Constraint::Length(1),
        ])
        .split(area);

    render_header(f, app, chunks[0]);
    let selected = match app.view_mode {
        ViewMode::Grid => render_grid(f, app, chunks[1]),
        ViewMode::Buckets => {
            render_buckets(f, app, chunks[1]);
            None
        }
    };
    render_detail(f, app, selected.as_ref(), chunks[2]);
    render_footer(f, chunks[3]);

    if app.show_help {
        render_help(f, area);
    }
}

fn render_header(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(Span::styled(" benchview ", theme::HEADER_STYLE));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let Some(state) = &app.state else {
        f.render_widget(Paragraph::new("mounting..."), inner);
        return;
    };

    let phase_color = match state.phase {
        TimelinePhase::Live => Color::Rgb(131, 165, 152),
        TimelinePhase::Settled => Color::Rgb(184, 187, 38),
        TimelinePhase::AwaitingPredecessor => Color::Rgb(250, 189, 47),
        TimelinePhase::Loading => theme::MUTED,
    };
    let job_line = Line::from(vec![
        Span::styled(
            format!("job {} ", state.job_id),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!("({}/{})  ", app.job_index + 1, app.config.jobs.len()),
            Style::default().fg(theme::MUTED),
        ),
        Span::raw(format!("status: {}  ", state.job_status)),
        Span::styled(state.phase.as_str(), Style::default().fg(phase_color)),
    ]);

    let transport = &state.transport;
    let push = if transport.push_live {
        "push: live".to_string()
    } else if app.config.push_url.is_none() {
        "push: off".to_string()
    } else {
        "push: reconnecting".to_string()
    };
    let widened = transport.push_live && transport.last_poll_at.is_some();
    let interval = app.config.arbiter.poll_interval(widened).as_secs();
    let last_poll = transport
        .last_poll_at
        .map(|at| at.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string());
    let mut spans = vec![Span::styled(
        format!("{push}  poll: {interval}s  last poll: {last_poll}"),
        Style::default().fg(theme::MUTED),
    )];
    if let Some(note) = state.holding_note() {
        spans.push(Span::styled(
            format!("  {note}"),
            Style::default().fg(theme::status_color(benchview_core::EventStatus::Warning)),
        ));
    }

    f.render_widget(Paragraph::new(vec![job_line, Line::from(spans)]), inner);
}

fn render_grid(f: &mut Frame, app: &mut App, area: Rect) -> Option<TimelineEvent> {
    let events = app.events().to_vec();
    let buckets = bucketed_view(&events);
    let block = Block::default().borders(Borders::ALL).title(format!(
        " {} | {} ",
        app.view_mode.title(),
        app.selection.label(&buckets)
    ));
    let inner = block.inner(area);
    f.render_widget(block, area);

    if let Some(message) = empty_message(app, &events) {
        f.render_widget(
            Paragraph::new(message).style(Style::default().fg(theme::MUTED)),
            inner,
        );
        return None;
    }

    let view = flat_view(
        &events,
        app.selection,
        u32::from(inner.width),
        u32::from(app.config.min_cell_width),
    );
    app.clamp_selection(view.layout.nodes.len());
    if view.layout.nodes.is_empty() {
        f.render_widget(
            Paragraph::new("no events in this iteration yet")
                .style(Style::default().fg(theme::MUTED)),
            inner,
        );
        return None;
    }

    let rows_fit = usize::from((inner.height / ROW_HEIGHT).max(1));
    let selected_row = view.layout.nodes[app.selected_node].position.row;
    let first_row = (selected_row + 1).saturating_sub(rows_fit);
    let visible = |row: usize| row >= first_row && row < first_row + rows_fit;
    let row_y = |row: usize| inner.y + ((row - first_row) as u16) * ROW_HEIGHT;

    for node in &view.layout.nodes {
        if !visible(node.position.row) {
            continue;
        }
        let rect = node_rect(&view.metrics, inner, node.position.col, row_y(node.position.row));
        if rect.bottom() > inner.bottom() {
            continue;
        }
        let event = &view.events[node.index];
        render_node(f, app, event, rect, node.index == app.selected_node);
    }

    render_connectors(f, &view, inner, first_row, rows_fit);

    view.events.get(app.selected_node).cloned()
}

fn empty_message(app: &App, events: &[TimelineEvent]) -> Option<String> {
    let state = app.state.as_ref()?;
    match state.phase {
        TimelinePhase::AwaitingPredecessor => {
            Some("waiting for the previous job to finish".to_string())
        }
        TimelinePhase::Loading => Some(
            state
                .transport
                .last_poll_error
                .as_ref()
                .map(|err| format!("loading timeline ({err})"))
                .unwrap_or_else(|| "loading timeline...".to_string()),
        ),
        _ if events.is_empty() => Some("no timeline events yet".to_string()),
        _ => None,
    }
}

fn node_rect(metrics: &GridMetrics, inner: Rect, col: usize, y: u16) -> Rect {
    let (x, width) = metrics.column_span(col);
    Rect::new(
        inner.x + x as u16,
        y,
        (width as u16).saturating_sub(CONNECTOR_GAP).max(1),
        NODE_HEIGHT,
    )
}

fn render_node(f: &mut Frame, app: &App, event: &TimelineEvent, rect: Rect, selected: bool) {
    let color = theme::status_color(event.status);
    let border = if selected {
        Style::default()
            .fg(theme::SELECTED_BORDER)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(color)
    };
    let block = Block::default().borders(Borders::ALL).border_style(border);
    let inner = block.inner(rect);
    f.render_widget(block, rect);

    let width = usize::from(inner.width);
    let title = Line::from(vec![
        Span::styled(
            format!("{} ", theme::status_icon(event.status)),
            Style::default().fg(color),
        ),
        Span::raw(ellipsize(&node_label(event), width.saturating_sub(2))),
    ]);

    let mut detail = vec![Span::styled(
        event.status.as_str().replace('_', " "),
        Style::default().fg(color),
    )];
    if let Some(remaining) = app.countdown_for(event) {
        detail.push(Span::raw(format!(" {}", format_countdown(remaining))));
    } else if let Some(ms) = event.duration_ms {
        detail.push(Span::styled(
            format!(" {}", format_duration_ms(ms)),
            Style::default().fg(theme::MUTED),
        ));
    }
    if event.is_parallel() {
        detail.push(Span::styled(format!(" {}", icons::PARALLEL), theme::BADGE_STYLE));
    }

    f.render_widget(Paragraph::new(vec![title, Line::from(detail)]), inner);
}

fn render_connectors(f: &mut Frame, view: &FlatView, inner: Rect, first_row: usize, rows_fit: usize) {
    let visible = |row: usize| row >= first_row && row < first_row + rows_fit;
    let row_y = |row: usize| inner.y + ((row - first_row) as u16) * ROW_HEIGHT;

    for connector in &view.layout.connectors {
        let style = Style::default().fg(theme::connector_color(connector.state));
        let (rect, glyph) = match connector.path {
            ConnectorPath::Horizontal {
                row,
                from_col,
                to_col,
            } => {
                if !visible(row) {
                    continue;
                }
                let left = from_col.min(to_col);
                let (x, width) = view.metrics.column_span(left);
                let gap_x = inner.x + ((x + width) as u16).saturating_sub(CONNECTOR_GAP);
                let glyph = if to_col > from_col { "──▶" } else { "◀──" };
                (Rect::new(gap_x, row_y(row) + 1, CONNECTOR_GAP, 1), glyph)
            }
            ConnectorPath::Turn { from_row, col, .. } => {
                if !visible(from_row) || !visible(from_row + 1) {
                    continue;
                }
                let node = node_rect(&view.metrics, inner, col, row_y(from_row));
                let x = node.x + node.width / 2;
                (Rect::new(x, node.bottom(), 1, 1), "▼")
            }
        };
        if rect.bottom() > inner.bottom() || rect.right() > inner.right() {
            continue;
        }
        f.render_widget(Paragraph::new(Span::styled(glyph, style)), rect);
    }
}

fn render_buckets(f: &mut Frame, app: &App, area: Rect) {
    let events = app.events();
    let buckets = bucketed_view(events);
    let block = Block::default().borders(Borders::ALL).title(format!(
        " {} | {} total ",
        app.view_mode.title(),
        buckets.total
    ));
    let inner = block.inner(area);
    f.render_widget(block, area);

    if let Some(message) = empty_message(app, events) {
        f.render_widget(
            Paragraph::new(message).style(Style::default().fg(theme::MUTED)),
            inner,
        );
        return;
    }

    let focused = app.selection.resolve(&buckets);
    let mut lines = Vec::new();
    for iteration in 1..=buckets.total {
        let bucket = buckets.events(iteration);
        let marker = if focused == Some(iteration) { "> " } else { "  " };
        lines.push(Line::from(Span::styled(
            format!("{marker}Iteration {iteration} ({} events)", bucket.len()),
            theme::HEADER_STYLE,
        )));
        for event in bucket {
            let color = theme::status_color(event.status);
            let mut spans = vec![
                Span::styled(
                    format!("    {} ", theme::status_icon(event.status)),
                    Style::default().fg(color),
                ),
                Span::raw(node_label(event)),
            ];
            if let Some(remaining) = app.countdown_for(event) {
                spans.push(Span::raw(format!("  {}", format_countdown(remaining))));
            }
            lines.push(Line::from(spans));
        }
    }
    f.render_widget(Paragraph::new(lines), inner);
}

fn render_detail(f: &mut Frame, app: &App, selected: Option<&TimelineEvent>, area: Rect) {
    let block = Block::default().borders(Borders::ALL).title(" Details ");
    let inner = block.inner(area);
    f.render_widget(block, area);

    let Some(event) = selected else {
        let hint = match app.view_mode {
            ViewMode::Grid => "select a node with the arrow keys",
            ViewMode::Buckets => "press v to return to the grid",
        };
        f.render_widget(
            Paragraph::new(hint).style(Style::default().fg(theme::MUTED)),
            inner,
        );
        return;
    };

    let mut summary = vec![
        Span::styled(node_label(event), Style::default().add_modifier(Modifier::BOLD)),
        Span::styled(
            format!("  {}", event.status),
            Style::default().fg(theme::status_color(event.status)),
        ),
        Span::styled(
            format!("  {}", event.timestamp.format("%H:%M:%S")),
            Style::default().fg(theme::MUTED),
        ),
    ];
    if let Some(ms) = event.duration_ms {
        summary.push(Span::raw(format!("  took {}", format_duration_ms(ms))));
    }
    if let Some(remaining) = app.countdown_for(event) {
        summary.push(Span::raw(format!("  {} left", format_countdown(remaining))));
    }

    let mut lines = vec![Line::from(summary)];
    if !event.message.is_empty() {
        lines.push(Line::from(event.message.clone()));
    }
    let mut facts = vec![format!("id {}", event.event_id)];
    if let Some(replaced) = &event.replaces_event_id {
        facts.push(format!("replaces {replaced}"));
    }
    if !event.metadata.is_empty() {
        facts.push(format!("{} metadata keys", event.metadata.len()));
    }
    lines.push(Line::from(Span::styled(
        facts.join("  "),
        Style::default().fg(theme::MUTED),
    )));

    f.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }), inner);
}

fn render_footer(f: &mut Frame, area: Rect) {
    let hints = "q quit  n/p job  [/] iteration  a all  L latest  v view  arrows select  ? help";
    f.render_widget(
        Paragraph::new(hints).style(Style::default().fg(theme::MUTED)),
        area,
    );
}

fn render_help(f: &mut Frame, area: Rect) {
    let width = area.width.min(56);
    let height = area.height.min(14);
    let popup = Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    );
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Help")
        .border_style(Style::default().fg(Color::Yellow));
    let inner = block.inner(popup);
    f.render_widget(Clear, popup);
    f.render_widget(block, popup);

    let rows = [
        ("n / Tab", "Next job"),
        ("p / S-Tab", "Previous job"),
        ("] / [", "Next / previous iteration"),
        ("a", "All iterations"),
        ("L", "Latest iteration"),
        ("v", "Toggle grid / iteration list"),
        ("arrows, hjkl", "Move node selection"),
        ("g / G", "First / last node"),
        ("q / Esc", "Quit"),
    ];
    let lines: Vec<Line> = rows
        .iter()
        .map(|(key, action)| {
            Line::from(vec![
                Span::styled(format!("{key:<14}"), Style::default().fg(Color::Cyan)),
                Span::raw(*action),
            ])
        })
        .collect();
    f.render_widget(Paragraph::new(lines), inner);
}

fn ellipsize(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    if max <= 3 {
        return text.chars().take(max).collect();
    }
    let mut out: String = text.chars().take(max - 3).collect();
    out.push_str("...");
    out
}
