use crate::event::TimelineEvent;
use crate::EventStatus;

pub const MIN_COLUMNS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridMetrics {
    pub cols: usize,
    pub available_width: u32,
    pub min_cell_width: u32,
}

impl GridMetrics {
    /// Base column width; the first `remainder()` columns are one unit wider so spans fill the width.
    pub fn cell_width(&self) -> u32 {
        self.available_width / self.divisor()
    }

    pub fn remainder(&self) -> u32 {
        self.available_width % self.divisor()
    }

    fn divisor(&self) -> u32 {
        self.cols.max(1) as u32
    }

    /// Returns `(x, width)` of a column.
    pub fn column_span(&self, col: usize) -> (u32, u32) {
        let col = col.min(self.cols.saturating_sub(1)) as u32;
        let base = self.cell_width();
        let extra = self.remainder();
        let x = col * base + col.min(extra);
        let width = base + u32::from(col < extra);
        (x, width)
    }
}

pub fn grid_metrics(available_width: u32, min_cell_width: u32) -> GridMetrics {
    let fitted = if min_cell_width == 0 {
        MIN_COLUMNS
    } else {
        (available_width / min_cell_width) as usize
    };
    GridMetrics {
        cols: fitted.max(MIN_COLUMNS),
        available_width,
        min_cell_width,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridPosition {
    pub row: usize,
    pub col: usize,
}

pub fn snake_position(index: usize, cols: usize) -> GridPosition {
    let cols = cols.max(1);
    let row = index / cols;
    let pos_in_row = index % cols;
    let col = if row % 2 == 0 {
        pos_in_row
    } else {
        cols - 1 - pos_in_row
    };
    GridPosition { row, col }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorState {
    Completed,
    Failed,
    InProgress,
    Other,
}

impl ConnectorState {
    pub fn from_status(status: EventStatus) -> Self {
        match status {
            EventStatus::Completed => ConnectorState::Completed,
            EventStatus::Failed => ConnectorState::Failed,
            EventStatus::InProgress => ConnectorState::InProgress,
            _ => ConnectorState::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorPath {
    Horizontal {
        row: usize,
        from_col: usize,
        to_col: usize,
    },
    Turn {
        from_row: usize,
        to_row: usize,
        col: usize,
        edge: Edge,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connector {
    pub from: usize,
    pub to: usize,
    pub path: ConnectorPath,
    pub state: ConnectorState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridNode {
    pub index: usize,
    pub event_id: String,
    pub position: GridPosition,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnakeLayout {
    pub cols: usize,
    pub rows: usize,
    pub nodes: Vec<GridNode>,
    pub connectors: Vec<Connector>,
}

pub fn layout_snake(events: &[TimelineEvent], cols: usize) -> SnakeLayout {
    let cols = cols.max(1);
    let nodes: Vec<GridNode> = events
        .iter()
        .enumerate()
        .map(|(index, event)| GridNode {
            index,
            event_id: event.event_id.clone(),
            position: snake_position(index, cols),
        })
        .collect();

    let connectors = nodes
        .windows(2)
        .map(|pair| {
            let (source, target) = (&pair[0], &pair[1]);
            let path = if source.position.row == target.position.row {
                ConnectorPath::Horizontal {
                    row: source.position.row,
                    from_col: source.position.col,
                    to_col: target.position.col,
                }
            } else {
                let edge = if source.position.row % 2 == 0 {
                    Edge::Right
                } else {
                    Edge::Left
                };
                ConnectorPath::Turn {
                    from_row: source.position.row,
                    to_row: target.position.row,
                    col: source.position.col,
                    edge,
                }
            };
            Connector {
                from: source.index,
                to: target.index,
                path,
                state: ConnectorState::from_status(events[source.index].status),
            }
        })
        .collect();

    SnakeLayout {
        cols,
        rows: events.len().div_ceil(cols),
        nodes,
        connectors,
    }
}
