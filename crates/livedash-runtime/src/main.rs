//! livedash: live execution feed and metrics poller for the project dashboard.
//! Runs the push channel, the poll scheduler and reconciliation in-process
//! and writes JSON lines to stdout. Logs go to stderr.

use clap::Parser;

mod cli;
mod cmd_metrics;
mod cmd_tail;
mod shutdown;
mod view;

fn init_tracing() {
    let filter = std::env::var("LIVEDASH_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    init_tracing();

    match &args.command {
        cli::Command::Watch(opts) => {
            tracing::info!("livedash watch starting");
            let cancel = shutdown::on_signal();
            view::cmd_watch(&args, &opts.subject, cancel).await?;
        }
        cli::Command::Metrics => {
            cmd_metrics::cmd_metrics(&args).await?;
        }
        cli::Command::Tail(opts) => {
            let cancel = shutdown::on_signal();
            cmd_tail::cmd_tail(&args, &opts.subject, cancel).await?;
        }
    }

    Ok(())
}
