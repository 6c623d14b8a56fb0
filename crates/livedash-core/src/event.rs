//! Stream Event wire types and frame decoding.
//!
//! Frames are JSON objects discriminated by a `type` field:
//! ```json
//! {"type": "execution_complete", "cardId": "abc123", "status": "success", "command": "run tests", "timestamp": "..."}
//! {"type": "log", "cardId": "abc123", "logType": "stdout", "content": "...", "timestamp": "..."}
//! ```

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Discriminant of a completion frame.
pub const COMPLETION_TAG: &str = "execution_complete";
/// Discriminant of a log frame.
pub const LOG_TAG: &str = "log";

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {0}")]
    Json(#[source] serde_json::Error),

    #[error("frame has no string `type` field")]
    MissingTag,

    #[error("unknown frame type: {0}")]
    UnknownKind(String),

    #[error("malformed {kind} frame: {source}")]
    Malformed {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// One decoded message from the push channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "execution_complete")]
    Completion(CompletionEvent),
    #[serde(rename = "log")]
    Log(LogEvent),
}

impl StreamEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Completion(_) => COMPLETION_TAG,
            Self::Log(_) => LOG_TAG,
        }
    }

    pub fn card_id(&self) -> &str {
        match self {
            Self::Completion(c) => &c.card_id,
            Self::Log(l) => &l.card_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Error,
}

/// Terminal event for a subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionEvent {
    pub card_id: String,
    pub status: ExecutionStatus,
    pub command: String,
    #[serde(default)]
    pub token_stats: Option<TokenStats>,
    #[serde(default)]
    pub cost_stats: Option<CostStats>,
    #[serde(default)]
    pub error: Option<String>,
    pub timestamp: String,
}

impl CompletionEvent {
    pub fn server_time(&self) -> Option<DateTime<Utc>> {
        parse_server_timestamp(&self.timestamp)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenStats {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostStats {
    #[serde(default)]
    pub total_cost: f64,
    #[serde(default)]
    pub plan_cost: f64,
    #[serde(default)]
    pub implement_cost: f64,
    #[serde(default)]
    pub test_cost: f64,
    #[serde(default)]
    pub review_cost: f64,
}

/// Non-terminal, repeatable log line for a subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    pub card_id: String,
    pub log_type: String,
    pub content: String,
    pub timestamp: String,
}

impl LogEvent {
    pub fn server_time(&self) -> Option<DateTime<Utc>> {
        parse_server_timestamp(&self.timestamp)
    }
}

/// Decode one raw text frame into a [`StreamEvent`].
pub fn decode_frame(frame: &str) -> Result<StreamEvent, DecodeError> {
    let value: serde_json::Value = serde_json::from_str(frame).map_err(DecodeError::Json)?;
    let kind = value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or(DecodeError::MissingTag)?;

    let kind: &'static str = match kind {
        COMPLETION_TAG => COMPLETION_TAG,
        LOG_TAG => LOG_TAG,
        other => return Err(DecodeError::UnknownKind(other.to_string())),
    };

    serde_json::from_value(value).map_err(|source| DecodeError::Malformed { kind, source })
}

/// Parse a server timestamp. Accepts RFC 3339, or a naive ISO-8601
/// datetime which is read as UTC. Display only; ordering never uses it.
pub fn parse_server_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

// ─── Tests ────────────────────────────────────────────────────────
