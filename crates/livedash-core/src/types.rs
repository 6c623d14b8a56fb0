use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

// ─── Subject ──────────────────────────────────────────────────────

/// Opaque identifier (task/card id) scoping one push-channel connection.
///
/// Never empty: construct through [`Subject::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Subject(String);

impl Subject {
    /// Parse a raw subject. Empty or whitespace-only input yields `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 characters, used in log lines.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─── Connection State ─────────────────────────────────────────────

/// Lifecycle of one Stream Connection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Initial state, or closed by the owner.
    #[default]
    Disconnected,
    /// Handshake in flight, or parked on an empty subject.
    Connecting,
    Connected,
    /// Disconnected unexpectedly; a reconnect is scheduled.
    Retrying,
    /// Disconnected with no further attempts (subject changed or attempt cap reached).
    Abandoned,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Retrying => "retrying",
            Self::Abandoned => "abandoned",
        }
    }

    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle signal emitted once per open/close transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkSignal {
    Opened,
    Closed,
}

// ─── Sequencing ───────────────────────────────────────────────────

/// Shared monotonic counter assigning local arrival order across both
/// update channels. Cloning shares the underlying counter.
#[derive(Debug, Clone, Default)]
pub struct SequenceClock {
    next: Arc<AtomicU64>,
}

impl SequenceClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next sequence number. The first value is 1, so 0 can
    /// mean "never applied".
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Last allocated value (0 if none).
    pub fn current(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }
}

/// A value stamped with its local arrival sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequenced<T> {
    pub seq: u64,
    pub event: T,
}

impl<T> Sequenced<T> {
    pub fn new(seq: u64, event: T) -> Self {
        Self { seq, event }
    }
}

// ─── Tests ────────────────────────────────────────────────────────
