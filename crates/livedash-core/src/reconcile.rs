//! Reconciliation of push-driven events with poll-driven snapshots.
//!
//! Every logical field is a last-writer-wins register keyed by the local
//! sequence number from [`SequenceClock`](crate::types::SequenceClock), never
//! by server time. A snapshot is stamped when its tick started, so a
//! completion that arrived after the fetch was issued outranks it and stays
//! overlaid until a newer snapshot lands.
//!
//! Pure and deterministic: callers own the clock and the IO.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{CompletionEvent, ExecutionStatus, LogEvent};
use crate::metrics::{
    CostBreakdown, ExecutionPerformance, Insight, PollSnapshot, RecentExecution, TokenUsage,
};
use crate::types::{ConnectionState, Sequenced};

/// Maximum number of log events retained in the tail.
pub const LOG_TAIL_CAPACITY: usize = 200;

// ─── Stamped register ─────────────────────────────────────────────

/// A value tagged with the sequence of the update that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Stamped<T> {
    seq: u64,
    value: Option<T>,
}

impl<T> Default for Stamped<T> {
    fn default() -> Self {
        Self { seq: 0, value: None }
    }
}

impl<T> Stamped<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `value` only if `seq` is newer than the current one.
    /// Returns whether the value was applied.
    pub fn apply(&mut self, seq: u64, value: T) -> bool {
        if seq <= self.seq {
            return false;
        }
        self.seq = seq;
        self.value = Some(value);
        true
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }
}

// ─── Execution state ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Running,
    Succeeded,
    Failed,
}

impl ExecutionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl From<ExecutionStatus> for ExecutionState {
    fn from(status: ExecutionStatus) -> Self {
        match status {
            ExecutionStatus::Success => Self::Succeeded,
            ExecutionStatus::Error => Self::Failed,
        }
    }
}

// ─── Reconciled output ────────────────────────────────────────────

/// Derived view state. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciledState {
    pub connection: ConnectionState,
    pub is_loading: bool,
    pub snapshot_seq: u64,
    pub snapshot_received_at: Option<DateTime<Utc>>,
    pub token_usage: Option<TokenUsage>,
    pub cost_breakdown: Option<CostBreakdown>,
    pub execution: Option<ExecutionPerformance>,
    pub insights: Vec<Insight>,
    pub executions: BTreeMap<String, ExecutionState>,
    pub last_completion: Option<CompletionEvent>,
    pub log_tail: Vec<LogEvent>,
}

// ─── Reconciler ───────────────────────────────────────────────────

/// Identity of a completion delivery: card, command and server timestamp.
type CompletionKey = (String, String, String);

fn completion_key(event: &CompletionEvent) -> CompletionKey {
    (
        event.card_id.clone(),
        event.command.clone(),
        event.timestamp.clone(),
    )
}

#[derive(Debug)]
pub struct Reconciler {
    connection: ConnectionState,
    is_loading: bool,
    snapshot: Stamped<Arc<PollSnapshot>>,
    /// Completions newer than the applied snapshot, oldest first.
    pending: Vec<Sequenced<CompletionEvent>>,
    completions: BTreeMap<String, Stamped<CompletionEvent>>,
    seen_completions: BTreeSet<CompletionKey>,
    executions: BTreeMap<String, Stamped<ExecutionState>>,
    log_tail: VecDeque<LogEvent>,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reconciler {
    /// Empty view state, loading until the first snapshot lands.
    pub fn new() -> Self {
        Self {
            connection: ConnectionState::default(),
            is_loading: true,
            snapshot: Stamped::new(),
            pending: Vec::new(),
            completions: BTreeMap::new(),
            seen_completions: BTreeSet::new(),
            executions: BTreeMap::new(),
            log_tail: VecDeque::new(),
        }
    }

    pub fn set_connection(&mut self, state: ConnectionState) -> bool {
        let changed = self.connection != state;
        self.connection = state;
        changed
    }

    pub fn set_loading(&mut self, is_loading: bool) -> bool {
        let changed = self.is_loading != is_loading;
        self.is_loading = is_loading;
        changed
    }

    /// Apply a poll snapshot. Ignored if an equal-or-newer snapshot is
    /// already applied. Pending completions older than the snapshot are
    /// considered reflected in it and dropped from the overlay.
    pub fn apply_snapshot(&mut self, snapshot: Arc<PollSnapshot>) -> bool {
        let seq = snapshot.seq;
        if !self.snapshot.apply(seq, snapshot) {
            return false;
        }
        self.pending.retain(|c| c.seq > seq);
        true
    }

    /// Apply a completion. A redelivery of any completion already applied
    /// (same card, command and server timestamp) is ignored, even if a
    /// newer completion for the card landed in between.
    pub fn apply_completion(&mut self, completion: Sequenced<CompletionEvent>) -> bool {
        let Sequenced { seq, event } = completion;
        let key = completion_key(&event);
        if self.seen_completions.contains(&key) {
            return false;
        }
        let slot = self.completions.entry(event.card_id.clone()).or_default();
        if !slot.apply(seq, event.clone()) {
            return false;
        }
        self.seen_completions.insert(key);

        self.executions
            .entry(event.card_id.clone())
            .or_default()
            .apply(seq, event.status.into());

        if seq > self.snapshot.seq() {
            self.pending.push(Sequenced::new(seq, event));
        }
        true
    }

    /// Apply a log event. A log marks its card as running unless the card
    /// already completed: trailing logs never reopen a finished execution.
    pub fn apply_log(&mut self, log: Sequenced<LogEvent>) -> bool {
        let Sequenced { seq, event } = log;
        let execution = self.executions.entry(event.card_id.clone()).or_default();
        if !execution.value().is_some_and(|s| s.is_terminal()) {
            execution.apply(seq, ExecutionState::Running);
        }

        if self.log_tail.len() == LOG_TAIL_CAPACITY {
            self.log_tail.pop_front();
        }
        self.log_tail.push_back(event);
        true
    }

    pub fn execution_state(&self, card_id: &str) -> Option<ExecutionState> {
        self.executions.get(card_id).and_then(|s| s.value().copied())
    }

    pub fn snapshot_seq(&self) -> u64 {
        self.snapshot.seq()
    }

    pub fn pending_completions(&self) -> usize {
        self.pending.len()
    }

    /// Latest snapshot overlaid with completions it does not yet reflect.
    pub fn state(&self) -> ReconciledState {
        let snapshot = self.snapshot.value();

        let mut pending_tokens: u64 = 0;
        let mut pending_cost: f64 = 0.0;
        for c in &self.pending {
            if let Some(t) = c.event.token_stats {
                pending_tokens = pending_tokens.saturating_add(t.total_tokens);
            }
            if let Some(cost) = c.event.cost_stats {
                pending_cost += cost.total_cost;
            }
        }

        let token_usage = snapshot.and_then(|s| s.token_usage.clone()).map(|mut t| {
            if pending_tokens > 0 {
                t.total_tokens = Some(t.total_tokens.unwrap_or(0).saturating_add(pending_tokens));
            }
            if pending_cost > 0.0 {
                t.total_cost = Some(t.total_cost.unwrap_or(0.0) + pending_cost);
            }
            t
        });

        let cost_breakdown = snapshot.and_then(|s| s.cost_breakdown.clone()).map(|mut c| {
            if pending_cost > 0.0 {
                c.total_cost = Some(c.total_cost.unwrap_or(0.0) + pending_cost);
            }
            c
        });

        let execution = snapshot.and_then(|s| s.execution.clone()).map(|mut e| {
            let overlay = self.pending.iter().rev().map(|c| RecentExecution {
                command: c.event.command.clone(),
                duration_ms: None,
                timestamp: c.event.timestamp.clone(),
                status: Some(c.event.status),
            });
            e.recent_executions = overlay.chain(e.recent_executions).collect();
            e
        });

        let last_completion = self
            .completions
            .values()
            .filter(|s| s.value().is_some())
            .max_by_key(|s| s.seq())
            .and_then(|s| s.value().cloned());

        ReconciledState {
            connection: self.connection,
            is_loading: self.is_loading,
            snapshot_seq: self.snapshot.seq(),
            snapshot_received_at: snapshot.map(|s| s.received_at),
            token_usage,
            cost_breakdown,
            execution,
            insights: snapshot.map(|s| s.insights.clone()).unwrap_or_default(),
            executions: self
                .executions
                .iter()
                .filter_map(|(id, s)| s.value().map(|v| (id.clone(), *v)))
                .collect(),
            last_completion,
            log_tail: self.log_tail.iter().cloned().collect(),
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────
