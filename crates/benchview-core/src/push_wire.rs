use crate::event::{normalize_map, NormalizeError, TimelineEvent};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub const DEFAULT_MAX_FRAME_BYTES: usize = 256 * 1024;
pub const CURRENT_PROTOCOL_VERSION: u16 = 1;

const CONTROL_TYPES: &[&str] = &["subscribed", "ping", "pong", "heartbeat"];
const ENVELOPE_TYPES: &[&str] = &["timeline_event", "event"];

#[derive(Debug, Clone, PartialEq)]
pub enum PushMessage {
    Event { job_id: String, event: TimelineEvent },
    Subscribed { job_id: Option<String> },
    Heartbeat,
}

impl PushMessage {
    pub fn job_id(&self) -> Option<&str> {
        match self {
            PushMessage::Event { job_id, .. } => Some(job_id.as_str()),
            PushMessage::Subscribed { job_id } => job_id.as_deref(),
            PushMessage::Heartbeat => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubscribeRequest {
    pub version: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub job_id: String,
    pub client_id: String,
}

impl SubscribeRequest {
    pub fn new(job_id: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            version: CURRENT_PROTOCOL_VERSION.to_string(),
            kind: "subscribe".to_string(),
            job_id: job_id.into(),
            client_id: client_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame exceeds max size: {size} > {max}")]
    OversizedFrame { size: usize, max: usize },
    #[error("frame encode failed: {0}")]
    Encode(String),
    #[error("frame decode failed: {0}")]
    Decode(String),
    #[error("unsupported protocol version {found}, max supported {supported}")]
    UnsupportedVersion { found: u16, supported: u16 },
    #[error("push message has no job id")]
    MissingJobId,
    #[error("push message carries malformed event: {0}")]
    Event(#[from] NormalizeError),
}

#[derive(Debug, Clone)]
pub struct DecodeReport<T> {
    pub frames: Vec<T>,
    pub errors: Vec<FrameError>,
}

impl<T> Default for DecodeReport<T> {
    fn default() -> Self {
        Self {
            frames: Vec::new(),
            errors: Vec::new(),
        }
    }
}

impl<T> DecodeReport<T> {
    fn push_frame(&mut self, frame: T) {
        self.frames.push(frame);
    }

    fn push_error(&mut self, error: FrameError) {
        self.errors.push(error);
    }
}

pub fn encode_frame<T: Serialize>(value: &T, max_frame_bytes: usize) -> Result<String, FrameError> {
    let encoded = serde_json::to_string(value).map_err(|err| FrameError::Encode(err.to_string()))?;
    if encoded.len() > max_frame_bytes {
        return Err(FrameError::OversizedFrame {
            size: encoded.len(),
            max: max_frame_bytes,
        });
    }
    Ok(encoded)
}

/// Decodes one inbound text frame, which may hold several newline-delimited messages.
pub fn decode_push_text(text: &str, max_frame_bytes: usize) -> DecodeReport<PushMessage> {
    let mut report = DecodeReport::default();
    for line in text.split('\n') {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        if line.len() > max_frame_bytes {
            report.push_error(FrameError::OversizedFrame {
                size: line.len(),
                max: max_frame_bytes,
            });
            continue;
        }
        match decode_push_message(line) {
            Ok(message) => report.push_frame(message),
            Err(err) => report.push_error(err),
        }
    }
    report
}

pub fn decode_push_message(line: &str) -> Result<PushMessage, FrameError> {
    let value: Value =
        serde_json::from_str(line).map_err(|err| FrameError::Decode(err.to_string()))?;
    let Value::Object(mut map) = value else {
        return Err(FrameError::Decode("push message is not an object".to_string()));
    };

    if let Some(raw_version) = map.get("version") {
        let found = message_version(raw_version)?;
        if found > CURRENT_PROTOCOL_VERSION {
            return Err(FrameError::UnsupportedVersion {
                found,
                supported: CURRENT_PROTOCOL_VERSION,
            });
        }
    }

    let job_id = job_id_field(&map);
    let kind = map
        .get("type")
        .and_then(Value::as_str)
        .map(|kind| kind.trim().to_ascii_lowercase());

    match kind.as_deref() {
        Some("subscribed") => return Ok(PushMessage::Subscribed { job_id }),
        Some(kind) if CONTROL_TYPES.contains(&kind) => return Ok(PushMessage::Heartbeat),
        Some(kind) if ENVELOPE_TYPES.contains(&kind) => {
            map.remove("type");
        }
        _ => {}
    }

    let job_id = job_id.ok_or(FrameError::MissingJobId)?;
    let event = match map.get("event") {
        Some(Value::Object(nested)) => normalize_map(nested)?,
        _ => normalize_map(&map)?,
    };
    Ok(PushMessage::Event { job_id, event })
}

/// Producers send the version either as a number or as a string such as "1" or "v1".
fn message_version(raw: &Value) -> Result<u16, FrameError> {
    let parsed = match raw {
        Value::Number(number) => number.as_u64().and_then(|value| u16::try_from(value).ok()),
        Value::String(text) => text.trim().trim_start_matches('v').parse::<u16>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| FrameError::Decode(format!("invalid message version: {raw}")))
}

fn job_id_field(map: &Map<String, Value>) -> Option<String> {
    ["job_id", "run_id"].iter().find_map(|key| match map.get(*key) {
        Some(Value::String(text)) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Some(Value::Number(number)) => Some(number.to_string()),
        _ => None,
    })
}
