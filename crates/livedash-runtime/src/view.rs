//! `livedash watch`: the dashboard view.
//!
//! One subject stream and one poll scheduler share a sequence clock; every
//! update from either channel is applied to a [`Reconciler`] and each change
//! is printed as one JSON line of reconciled state.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use livedash_core::event::{CompletionEvent, LogEvent};
use livedash_core::metrics::DashboardMetrics;
use livedash_core::reconcile::{ReconciledState, Reconciler};
use livedash_core::types::{ConnectionState, LinkSignal, SequenceClock, Sequenced};
use livedash_poll::{HttpMetricsApi, PollScheduler};
use livedash_stream::{Dispatcher, SubjectStream};

use crate::cli::Cli;

/// Everything the view reacts to.
#[derive(Debug, Clone)]
pub enum ViewInput {
    Completion(Sequenced<CompletionEvent>),
    Log(Sequenced<LogEvent>),
    Connection(ConnectionState),
    Metrics(DashboardMetrics),
}

#[derive(Debug)]
pub struct DashboardView {
    reconciler: Reconciler,
    opened: u32,
}

impl Default for DashboardView {
    fn default() -> Self {
        Self::new()
    }
}

impl DashboardView {
    pub fn new() -> Self {
        Self {
            reconciler: Reconciler::new(),
            opened: 0,
        }
    }

    /// Apply one input. Returns true if the reconciled state changed.
    pub fn apply(&mut self, input: ViewInput) -> bool {
        match input {
            ViewInput::Completion(c) => self.reconciler.apply_completion(c),
            ViewInput::Log(l) => self.reconciler.apply_log(l),
            ViewInput::Connection(state) => self.reconciler.set_connection(state),
            ViewInput::Metrics(metrics) => {
                let loading = self.reconciler.set_loading(metrics.is_loading);
                let applied = match metrics.snapshot {
                    Some(snapshot) => self.reconciler.apply_snapshot(snapshot),
                    None => false,
                };
                if !applied && !loading {
                    tracing::debug!("view: ignoring stale metrics snapshot");
                }
                loading || applied
            }
        }
    }

    /// Track a link lifecycle signal. Returns true when a poll should be
    /// requested: the link reopened after a drop and may have missed events.
    pub fn on_link(&mut self, signal: LinkSignal) -> bool {
        match signal {
            LinkSignal::Opened => {
                self.opened += 1;
                self.opened > 1
            }
            LinkSignal::Closed => false,
        }
    }

    pub fn state(&self) -> ReconciledState {
        self.reconciler.state()
    }
}

/// Dispatcher factory feeding decoded events into the view.
fn view_dispatcher(tx: mpsc::UnboundedSender<ViewInput>) -> impl Fn() -> Dispatcher + Send + Sync {
    move || {
        let completions = tx.clone();
        let logs = tx.clone();
        Dispatcher::new()
            .on_completion(move |c| {
                let _ = completions.send(ViewInput::Completion(c));
            })
            .on_log(move |l| {
                let _ = logs.send(ViewInput::Log(l));
            })
    }
}

/// Wait for the next connection state, or forever once the sender is gone.
async fn next_connection_state(
    rx: &mut Option<watch::Receiver<ConnectionState>>,
) -> ConnectionState {
    if let Some(inner) = rx {
        if inner.changed().await.is_ok() {
            return *inner.borrow_and_update();
        }
        *rx = None;
    }
    std::future::pending().await
}

fn emit(state: &ReconciledState) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(state)?);
    Ok(())
}

pub async fn cmd_watch(args: &Cli, subject: &str, cancel: CancellationToken) -> anyhow::Result<()> {
    let clock = SequenceClock::new();
    let (input_tx, inputs) = mpsc::unbounded_channel();
    let (signal_tx, signals) = mpsc::unbounded_channel();

    let api = Arc::new(HttpMetricsApi::new(args.http_config())?);
    let mut stream = SubjectStream::new(
        args.stream_config(),
        clock.clone(),
        Some(signal_tx),
        view_dispatcher(input_tx),
    );
    let mut scheduler = PollScheduler::start(args.poll_config(), api, clock);
    stream.set_subject(subject).await;

    let short = stream.subject().map(|s| s.short().to_string()).unwrap_or_default();
    tracing::info!(subject = %short, project = %args.project, "watching");

    let mut view = DashboardView::new();
    view.apply(ViewInput::Connection(stream.state()));
    let mut channels = Channels {
        inputs,
        signals,
        connection: stream.subscribe_state(),
        metrics: scheduler.subscribe(),
    };

    let result = if cancel.is_cancelled() {
        Ok(())
    } else {
        drive(&mut view, &mut channels, &scheduler, &cancel).await
    };

    stream.clear().await;
    scheduler.stop().await;
    result
}

struct Channels {
    inputs: mpsc::UnboundedReceiver<ViewInput>,
    signals: mpsc::UnboundedReceiver<LinkSignal>,
    connection: Option<watch::Receiver<ConnectionState>>,
    metrics: watch::Receiver<DashboardMetrics>,
}

async fn drive(
    view: &mut DashboardView,
    ch: &mut Channels,
    scheduler: &PollScheduler,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    emit(&view.state())?;
    loop {
        let changed = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            Some(input) = ch.inputs.recv() => view.apply(input),
            Some(signal) = ch.signals.recv() => {
                if view.on_link(signal) {
                    tracing::debug!("view: link reopened, requesting metrics refresh");
                    scheduler.refresh();
                }
                false
            }
            state = next_connection_state(&mut ch.connection) => {
                view.apply(ViewInput::Connection(state))
            }
            res = ch.metrics.changed() => match res {
                Ok(()) => {
                    let latest = ch.metrics.borrow_and_update().clone();
                    view.apply(ViewInput::Metrics(latest))
                }
                Err(_) => return Ok(()),
            },
        };
        if changed {
            emit(&view.state())?;
        }
    }
}
