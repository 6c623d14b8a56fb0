//! Error types for metrics fetches.

use thiserror::Error;

use crate::source::MetricsFamily;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("{family}: request failed: {source}")]
    Http {
        family: MetricsFamily,
        #[source]
        source: reqwest::Error,
    },

    #[error("{family}: server returned status {status}")]
    Status { family: MetricsFamily, status: u16 },

    #[error("{family}: undecodable response body: {source}")]
    Decode {
        family: MetricsFamily,
        #[source]
        source: reqwest::Error,
    },

    #[error("{family}: {message}")]
    Unavailable {
        family: MetricsFamily,
        message: String,
    },
}

impl FetchError {
    pub fn family(&self) -> Option<MetricsFamily> {
        match self {
            Self::Client(_) => None,
            Self::Http { family, .. }
            | Self::Status { family, .. }
            | Self::Decode { family, .. }
            | Self::Unavailable { family, .. } => Some(*family),
        }
    }
}
