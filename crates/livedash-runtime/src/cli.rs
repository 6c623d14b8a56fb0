//! CLI definition using clap derive.

use std::time::Duration;

use clap::{Parser, Subcommand};

use livedash_core::reconnect::ReconnectPolicy;
use livedash_poll::source::DEFAULT_API_BASE;
use livedash_poll::{HttpMetricsConfig, PollConfig};
use livedash_stream::StreamConfig;

#[derive(Debug, Parser)]
#[command(name = "livedash", about = "Live execution feed and metrics for the project dashboard")]
pub struct Cli {
    /// Base URL of the metrics API
    #[arg(long, global = true, env = "LIVEDASH_API_URL", default_value = DEFAULT_API_BASE)]
    pub api_url: String,

    /// Base URL of the push channel (default: api-url with http swapped for ws)
    #[arg(long, global = true, env = "LIVEDASH_WS_URL")]
    pub ws_url: Option<String>,

    /// Project whose metrics are polled
    #[arg(long, global = true, env = "LIVEDASH_PROJECT", default_value = "current")]
    pub project: String,

    /// Poll interval in milliseconds
    #[arg(long, global = true, env = "LIVEDASH_POLL_INTERVAL_MS", default_value = "30000")]
    pub poll_interval_ms: u64,

    /// Delay before reconnecting a dropped push channel, in milliseconds
    #[arg(long, global = true, env = "LIVEDASH_RECONNECT_DELAY_MS", default_value = "5000")]
    pub reconnect_delay_ms: u64,

    /// Give up after this many consecutive closures (default: never)
    #[arg(long, global = true, env = "LIVEDASH_MAX_RECONNECT_ATTEMPTS")]
    pub max_reconnect_attempts: Option<u32>,

    /// Per-request timeout for metrics fetches, in milliseconds (default: none)
    #[arg(long, global = true, env = "LIVEDASH_REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Follow a subject's push channel and the metrics poller, printing reconciled state
    Watch(SubjectOpts),
    /// Run one metrics poll and print the snapshot
    Metrics,
    /// Print raw events from a subject's push channel
    Tail(SubjectOpts),
}

#[derive(Debug, clap::Args)]
pub struct SubjectOpts {
    /// Entity whose execution events are followed
    #[arg(long)]
    pub subject: String,
}

impl Cli {
    /// Push-channel base: `--ws-url` if given, else derived from `--api-url`.
    pub fn ws_base(&self) -> String {
        if let Some(url) = &self.ws_url {
            return url.clone();
        }
        if let Some(rest) = self.api_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.api_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.api_url.clone()
        }
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            base_url: self.ws_base(),
            reconnect: ReconnectPolicy {
                delay: Duration::from_millis(self.reconnect_delay_ms),
                max_attempts: self.max_reconnect_attempts,
            },
        }
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(self.poll_interval_ms),
            project: self.project.clone(),
        }
    }

    pub fn http_config(&self) -> HttpMetricsConfig {
        HttpMetricsConfig {
            base_url: self.api_url.clone(),
            request_timeout: self.request_timeout_ms.map(Duration::from_millis),
            ..HttpMetricsConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("livedash").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn ws_base_derived_from_api_url() {
        let cli = parse(&["--api-url", "https://dash.example.com", "metrics"]);
        assert_eq!(cli.ws_base(), "wss://dash.example.com");

        let cli = parse(&["--api-url", "http://127.0.0.1:9000", "metrics"]);
        assert_eq!(cli.ws_base(), "ws://127.0.0.1:9000");
    }

    #[test]
    fn explicit_ws_url_wins() {
        let cli = parse(&["metrics", "--ws-url", "ws://push:7000", "--api-url", "http://api:3001"]);
        assert_eq!(cli.ws_base(), "ws://push:7000");
    }

    #[test]
    fn reconnect_and_timeout_options() {
        let cli = parse(&[
            "watch",
            "--subject",
            "card-1",
            "--reconnect-delay-ms",
            "250",
            "--max-reconnect-attempts",
            "3",
            "--request-timeout-ms",
            "1500",
        ]);
        let stream = cli.stream_config();
        assert_eq!(stream.reconnect.delay, Duration::from_millis(250));
        assert_eq!(stream.reconnect.max_attempts, Some(3));
        assert_eq!(
            cli.http_config().request_timeout,
            Some(Duration::from_millis(1500))
        );
        match cli.command {
            Command::Watch(opts) => assert_eq!(opts.subject, "card-1"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn subject_is_required_for_tail() {
        assert!(Cli::try_parse_from(["livedash", "tail"]).is_err());
    }
}
