//! livedash-core: pure data model for the live dashboard sync layer.
//! Stream Event wire types, metrics families, poll snapshots, the
//! reconnect policy state machine and the reconciler. No IO, no async.

pub mod event;
pub mod metrics;
pub mod reconcile;
pub mod reconnect;
pub mod types;

pub use event::{
    CompletionEvent, CostStats, DecodeError, ExecutionStatus, LogEvent, StreamEvent, TokenStats,
    decode_frame,
};
pub use metrics::{
    CostBreakdown, DashboardMetrics, ExecutionPerformance, Insight, InsightKind, PollSnapshot,
    TokenUsage,
};
pub use reconcile::{ExecutionState, ReconciledState, Reconciler, Stamped};
pub use reconnect::{ReconnectDecision, ReconnectPolicy, ReconnectTracker};
pub use types::{ConnectionState, LinkSignal, SequenceClock, Sequenced, Subject};
