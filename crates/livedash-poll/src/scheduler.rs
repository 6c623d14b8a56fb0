//! Poll Scheduler: run all metrics fetches immediately, then every interval.
//!
//! Each tick fetches the four families concurrently and waits for all of
//! them. If any family fails the whole tick publishes an empty snapshot
//! (fail-together). Ticks are not serialized: a manual refresh may overlap
//! an automatic tick and whichever resolves last is the published snapshot.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use livedash_core::metrics::{DashboardMetrics, PollSnapshot};
use livedash_core::types::SequenceClock;

use crate::source::MetricsApi;

/// Default refresh interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Shortest interval accepted; `tokio::time::interval` rejects zero.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    /// Project whose metrics are requested.
    pub project: String,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            project: "current".to_string(),
        }
    }
}

/// Run one tick: fetch every family concurrently and combine the results.
///
/// `seq` should be allocated when the tick starts so the snapshot ranks
/// below any push event that arrived while the fetch was in flight.
pub async fn fetch_snapshot(api: &dyn MetricsApi, project: &str, seq: u64) -> PollSnapshot {
    let (tokens, costs, execution, insights) = tokio::join!(
        api.token_usage(project),
        api.cost_breakdown(project),
        api.execution_performance(project),
        api.insights(project),
    );
    let received_at = Utc::now();

    match (tokens, costs, execution, insights) {
        (Ok(token_usage), Ok(cost_breakdown), Ok(execution), Ok(insights)) => PollSnapshot {
            seq,
            received_at,
            token_usage: Some(token_usage),
            cost_breakdown: Some(cost_breakdown),
            execution: Some(execution),
            insights,
        },
        (tokens, costs, execution, insights) => {
            let failures = [tokens.err(), costs.err(), execution.err(), insights.err()];
            for err in failures.iter().flatten() {
                tracing::warn!(
                    family = err.family().map(|f| f.as_str()).unwrap_or("unknown"),
                    "metrics fetch failed: {err}"
                );
            }
            tracing::error!(
                seq,
                failed = failures.iter().flatten().count(),
                "failed to load dashboard metrics, publishing empty snapshot"
            );
            PollSnapshot::empty(seq, received_at)
        }
    }
}

// ─── PollScheduler ────────────────────────────────────────────────

pub struct PollScheduler {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    metrics: watch::Receiver<DashboardMetrics>,
    refresh_tx: mpsc::UnboundedSender<()>,
}

impl PollScheduler {
    /// Start polling. The first tick runs immediately.
    ///
    /// Must be called within a tokio runtime.
    pub fn start(config: PollConfig, api: Arc<dyn MetricsApi>, clock: SequenceClock) -> Self {
        let cancel = CancellationToken::new();
        let (metrics_tx, metrics) = watch::channel(DashboardMetrics::default());
        let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();

        let ticker = Ticker {
            config,
            api,
            clock,
            metrics: metrics_tx,
            refresh_rx,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(ticker.run());

        Self {
            cancel,
            task: Some(task),
            metrics,
            refresh_tx,
        }
    }

    /// Request an out-of-band tick. Runs concurrently with any tick in flight.
    pub fn refresh(&self) {
        if self.refresh_tx.send(()).is_err() {
            tracing::debug!("poll: refresh requested after stop, ignoring");
        }
    }

    pub fn metrics(&self) -> DashboardMetrics {
        self.metrics.borrow().clone()
    }

    pub fn is_loading(&self) -> bool {
        self.metrics.borrow().is_loading
    }

    pub fn subscribe(&self) -> watch::Receiver<DashboardMetrics> {
        self.metrics.clone()
    }

    /// Stop polling. After this returns no further snapshot is published;
    /// fetches already in flight run to completion and their results are
    /// discarded. Calling it again is a no-op.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if e.is_panic() {
                    tracing::error!("poll: scheduler task panicked: {e}");
                }
            }
            tracing::debug!("poll: stopped");
        }
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct Ticker {
    config: PollConfig,
    api: Arc<dyn MetricsApi>,
    clock: SequenceClock,
    metrics: watch::Sender<DashboardMetrics>,
    refresh_rx: mpsc::UnboundedReceiver<()>,
    cancel: CancellationToken,
}

impl Ticker {
    async fn run(mut self) {
        let mut interval = tokio::time::interval(self.config.interval.max(MIN_POLL_INTERVAL));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut in_flight: JoinSet<PollSnapshot> = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                Some(joined) = in_flight.join_next() => match joined {
                    Ok(snapshot) => self.publish(snapshot),
                    Err(e) => tracing::error!("poll: tick task failed: {e}"),
                },
                _ = interval.tick() => self.spawn_tick(&mut in_flight, "interval"),
                Some(()) = self.refresh_rx.recv() => self.spawn_tick(&mut in_flight, "manual"),
            }
        }

        in_flight.detach_all();
    }

    fn spawn_tick(&self, in_flight: &mut JoinSet<PollSnapshot>, trigger: &'static str) {
        let seq = self.clock.next();
        let api = Arc::clone(&self.api);
        let project = self.config.project.clone();
        tracing::debug!(seq, trigger, in_flight = in_flight.len(), "poll: tick");
        in_flight.spawn(async move { fetch_snapshot(api.as_ref(), &project, seq).await });
    }

    fn publish(&self, snapshot: PollSnapshot) {
        tracing::debug!(
            seq = snapshot.seq,
            empty = snapshot.is_empty(),
            "poll: publishing snapshot"
        );
        self.metrics.send_replace(DashboardMetrics {
            snapshot: Some(Arc::new(snapshot)),
            is_loading: false,
        });
    }
}

// ─── Tests ────────────────────────────────────────────────────────
