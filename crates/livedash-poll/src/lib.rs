//! livedash-poll: periodic refresh of aggregate dashboard metrics.
//! Fetches every metrics family concurrently per tick and publishes one
//! combined, immutable snapshot.

pub mod error;
pub mod scheduler;
pub mod source;

pub use error::FetchError;
pub use scheduler::{PollConfig, PollScheduler, fetch_snapshot};
pub use source::{HttpMetricsApi, HttpMetricsConfig, MetricsApi, MetricsFamily};
