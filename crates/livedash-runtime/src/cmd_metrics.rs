//! `livedash metrics`: one poll tick, printed as JSON.

use livedash_core::types::SequenceClock;
use livedash_poll::{HttpMetricsApi, fetch_snapshot};

use crate::cli::Cli;

pub async fn cmd_metrics(args: &Cli) -> anyhow::Result<()> {
    let api = HttpMetricsApi::new(args.http_config())?;
    let seq = SequenceClock::new().next();
    let snapshot = fetch_snapshot(&api, &args.project, seq).await;

    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    if snapshot.is_empty() {
        anyhow::bail!("dashboard metrics unavailable for project {}", args.project);
    }
    Ok(())
}
