//! `livedash tail`: print raw push-channel events as JSON lines.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use livedash_core::event::StreamEvent;
use livedash_core::types::{SequenceClock, Sequenced};
use livedash_stream::{Dispatcher, LinkHooks, StreamConnection};

use crate::cli::Cli;

/// Dispatcher forwarding every event kind, re-tagged, into `tx`.
fn forwarding_dispatcher(tx: mpsc::UnboundedSender<Sequenced<StreamEvent>>) -> Dispatcher {
    let logs = tx.clone();
    Dispatcher::new()
        .on_completion(move |c| {
            let _ = tx.send(Sequenced::new(c.seq, StreamEvent::Completion(c.event)));
        })
        .on_log(move |l| {
            let _ = logs.send(Sequenced::new(l.seq, StreamEvent::Log(l.event)));
        })
}

pub async fn cmd_tail(args: &Cli, subject: &str, cancel: CancellationToken) -> anyhow::Result<()> {
    let subject = livedash_core::types::Subject::parse(subject)
        .ok_or_else(|| anyhow::anyhow!("subject must not be empty"))?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let hooks = LinkHooks {
        clock: SequenceClock::new(),
        ..LinkHooks::default()
    };
    let mut conn = StreamConnection::open(
        &args.stream_config(),
        Some(subject),
        forwarding_dispatcher(tx),
        hooks,
    );

    let result = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break Ok(()),
            Some(event) = rx.recv() => {
                if let Err(e) = serde_json::to_string(&event).map(|line| println!("{line}")) {
                    break Err(e.into());
                }
            }
        }
    };

    conn.close().await;
    result
}
