//! Metrics API: the four read-only aggregate endpoints.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use livedash_core::metrics::{
    CostBreakdown, ExecutionPerformance, Insight, InsightsEnvelope, TokenUsage,
};

use crate::error::FetchError;

/// Default metrics API base URL.
pub const DEFAULT_API_BASE: &str = "http://localhost:3001";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricsFamily {
    TokenUsage,
    CostBreakdown,
    ExecutionPerformance,
    Insights,
}

impl MetricsFamily {
    pub const ALL: [Self; 4] = [
        Self::TokenUsage,
        Self::CostBreakdown,
        Self::ExecutionPerformance,
        Self::Insights,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TokenUsage => "token_usage",
            Self::CostBreakdown => "cost_breakdown",
            Self::ExecutionPerformance => "execution_performance",
            Self::Insights => "insights",
        }
    }

    pub fn path(self) -> &'static str {
        match self {
            Self::TokenUsage => "/api/metrics/token-usage",
            Self::CostBreakdown => "/api/metrics/cost-analysis",
            Self::ExecutionPerformance => "/api/metrics/execution-performance",
            Self::Insights => "/api/metrics/insights",
        }
    }
}

impl fmt::Display for MetricsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One independently callable fetch per metrics family.
#[async_trait]
pub trait MetricsApi: Send + Sync {
    async fn token_usage(&self, project: &str) -> Result<TokenUsage, FetchError>;
    async fn cost_breakdown(&self, project: &str) -> Result<CostBreakdown, FetchError>;
    async fn execution_performance(&self, project: &str)
    -> Result<ExecutionPerformance, FetchError>;
    async fn insights(&self, project: &str) -> Result<Vec<Insight>, FetchError>;
}

// ─── HTTP implementation ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpMetricsConfig {
    pub base_url: String,
    /// Window requested from the token usage endpoint.
    pub token_period: String,
    /// Bucket size requested from the token usage endpoint.
    pub token_group_by: String,
    /// Grouping requested from the cost analysis endpoint.
    pub cost_group_by: String,
    /// Per-request timeout. `None` lets a hung request delay the tick indefinitely.
    pub request_timeout: Option<Duration>,
}

impl Default for HttpMetricsConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_string(),
            token_period: "7d".to_string(),
            token_group_by: "day".to_string(),
            cost_group_by: "model".to_string(),
            request_timeout: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpMetricsApi {
    client: reqwest::Client,
    config: HttpMetricsConfig,
}

impl HttpMetricsApi {
    pub fn new(config: HttpMetricsConfig) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(FetchError::Client)?;
        Ok(Self { client, config })
    }

    fn url(&self, family: MetricsFamily) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), family.path())
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        family: MetricsFamily,
        query: &[(&str, &str)],
    ) -> Result<T, FetchError> {
        let response = self
            .client
            .get(self.url(family))
            .query(query)
            .send()
            .await
            .map_err(|source| FetchError::Http { family, source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                family,
                status: status.as_u16(),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|source| FetchError::Decode { family, source })
    }
}

#[async_trait]
impl MetricsApi for HttpMetricsApi {
    async fn token_usage(&self, project: &str) -> Result<TokenUsage, FetchError> {
        self.get_json(
            MetricsFamily::TokenUsage,
            &[
                ("project_id", project),
                ("period", self.config.token_period.as_str()),
                ("group_by", self.config.token_group_by.as_str()),
            ],
        )
        .await
    }

    async fn cost_breakdown(&self, project: &str) -> Result<CostBreakdown, FetchError> {
        self.get_json(
            MetricsFamily::CostBreakdown,
            &[("project_id", project), ("group_by", self.config.cost_group_by.as_str())],
        )
        .await
    }

    async fn execution_performance(
        &self,
        project: &str,
    ) -> Result<ExecutionPerformance, FetchError> {
        self.get_json(MetricsFamily::ExecutionPerformance, &[("project_id", project)])
            .await
    }

    async fn insights(&self, project: &str) -> Result<Vec<Insight>, FetchError> {
        let envelope: InsightsEnvelope = self
            .get_json(MetricsFamily::Insights, &[("project_id", project)])
            .await?;
        Ok(envelope.insights)
    }
}

// ─── Tests ────────────────────────────────────────────────────────
