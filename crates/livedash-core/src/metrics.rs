//! Aggregate metrics families and the immutable Poll Snapshot.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::ExecutionStatus;

// ─── Token usage ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub daily_usage: Vec<TokenDataPoint>,
    #[serde(default)]
    pub total_tokens: Option<u64>,
    #[serde(default)]
    pub total_cost: Option<f64>,
    #[serde(default)]
    pub period: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenDataPoint {
    pub day: String,
    pub tokens: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

// ─── Cost breakdown ───────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    #[serde(default)]
    pub by_model: Vec<ModelCost>,
    #[serde(default)]
    pub total_cost: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelCost {
    pub model: String,
    pub total_cost: f64,
    pub percentage: f64,
}

// ─── Execution performance ────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPerformance {
    #[serde(default)]
    pub avg_duration_ms: Option<f64>,
    #[serde(default)]
    pub p95_duration_ms: Option<f64>,
    #[serde(default)]
    pub success_rate: Option<f64>,
    #[serde(default)]
    pub recent_executions: Vec<RecentExecution>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecentExecution {
    pub command: String,
    /// Fractional milliseconds are accepted.
    pub duration_ms: Option<f64>,
    pub timestamp: String,
    pub status: Option<ExecutionStatus>,
}

// ─── Insights ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightKind {
    Warning,
    #[default]
    Info,
    Success,
    Tip,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Insight {
    #[serde(rename = "type")]
    pub kind: InsightKind,
    pub message: String,
    pub metric: Option<String>,
    /// String or number on the wire.
    pub value: Option<serde_json::Value>,
}

/// Envelope returned by the insights endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsightsEnvelope {
    #[serde(default)]
    pub insights: Vec<Insight>,
}

// ─── Poll Snapshot ────────────────────────────────────────────────

/// Immutable result of one metrics refresh cycle.
///
/// Each family is independently nullable: `None` means not loaded or failed.
/// `seq` is allocated when the tick started; `received_at` is the arrival
/// time of the combined result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollSnapshot {
    pub seq: u64,
    pub received_at: DateTime<Utc>,
    pub token_usage: Option<TokenUsage>,
    pub cost_breakdown: Option<CostBreakdown>,
    pub execution: Option<ExecutionPerformance>,
    pub insights: Vec<Insight>,
}

impl PollSnapshot {
    /// Snapshot published for a tick where any family failed.
    pub fn empty(seq: u64, received_at: DateTime<Utc>) -> Self {
        Self {
            seq,
            received_at,
            token_usage: None,
            cost_breakdown: None,
            execution: None,
            insights: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.token_usage.is_none()
            && self.cost_breakdown.is_none()
            && self.execution.is_none()
            && self.insights.is_empty()
    }
}

/// What the Poll Scheduler exposes outward: latest snapshot plus loading flag.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardMetrics {
    pub snapshot: Option<Arc<PollSnapshot>>,
    pub is_loading: bool,
}

impl Default for DashboardMetrics {
    fn default() -> Self {
        Self {
            snapshot: None,
            is_loading: true,
        }
    }
}
