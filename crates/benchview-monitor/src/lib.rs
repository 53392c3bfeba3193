pub mod arbiter;
pub mod cache;
pub mod config;
pub mod job_status;
pub mod logging;
pub mod poll;
pub mod push;
pub mod ticker;

pub use arbiter::{
    spawn_arbiter, ArbiterConfig, ArbiterHandle, PushFeed, TimelinePhase, TimelineState,
    TransportStatus,
};
pub use cache::{CacheEntry, CachePin, TimelineCache};
pub use config::MonitorConfig;
pub use poll::{HttpTimelineSource, TimelineSource, TransportError};
pub use push::{PushConfig, PushEvent};
pub use ticker::{CountdownTick, CountdownTicker};
