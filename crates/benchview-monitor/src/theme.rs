use benchview_core::layout::ConnectorState;
use benchview_core::EventStatus;
use ratatui::style::{Color, Modifier, Style};

pub const HEADER_STYLE: Style = Style::new()
    .fg(Color::Rgb(142, 192, 124))
    .add_modifier(Modifier::BOLD);
pub const MUTED: Color = Color::Rgb(146, 131, 116);
pub const SELECTED_BORDER: Color = Color::Rgb(250, 189, 47);
pub const BADGE_STYLE: Style = Style::new()
    .fg(Color::Rgb(211, 134, 155))
    .add_modifier(Modifier::BOLD);

pub mod icons {
    pub const COMPLETED: &str = "x";
    pub const FAILED: &str = "!";
    pub const IN_PROGRESS: &str = ">";
    pub const PENDING: &str = ".";
    pub const SKIPPED: &str = "-";
    pub const WARNING: &str = "~";
    pub const PARALLEL: &str = "||";
}

pub fn status_color(status: EventStatus) -> Color {
    match status {
        EventStatus::Completed => Color::Rgb(184, 187, 38),
        EventStatus::Failed | EventStatus::Error => Color::Rgb(251, 73, 52),
        EventStatus::InProgress => Color::Rgb(131, 165, 152),
        EventStatus::Warning => Color::Rgb(250, 189, 47),
        EventStatus::Skipped => Color::Rgb(214, 93, 14),
        EventStatus::Pending => MUTED,
    }
}

pub fn status_icon(status: EventStatus) -> &'static str {
    match status {
        EventStatus::Completed => icons::COMPLETED,
        EventStatus::Failed | EventStatus::Error => icons::FAILED,
        EventStatus::InProgress => icons::IN_PROGRESS,
        EventStatus::Skipped => icons::SKIPPED,
        EventStatus::Warning => icons::WARNING,
        EventStatus::Pending => icons::PENDING,
    }
}

pub fn connector_color(state: ConnectorState) -> Color {
    match state {
        ConnectorState::Completed => Color::Rgb(184, 187, 38),
        ConnectorState::Failed => Color::Rgb(251, 73, 52),
        ConnectorState::InProgress => Color::Rgb(131, 165, 152),
        ConnectorState::Other => Color::Rgb(80, 73, 69),
    }
}
