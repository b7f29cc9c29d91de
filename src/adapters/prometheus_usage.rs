//! Prometheus Usage Source
//!
//! Derives claim utilisation from kubelet volume stats instead of an
//! annotation:
//!
//! ```text
//! 100 * kubelet_volume_stats_used_bytes / kubelet_volume_stats_capacity_bytes
//! ```

use crate::domain::ports::{ClaimId, UsageError, UsagePercent, UsageSource};
use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Configuration for the Prometheus usage source
#[derive(Debug, Clone)]
pub struct PrometheusConfig {
    /// Base URL, e.g. http://prometheus.monitoring:9090
    pub url: String,
    /// Per-query timeout
    pub timeout: Duration,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            url: "http://prometheus-operated.monitoring:9090".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

// =============================================================================
// API Response
// =============================================================================

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryData {
    result_type: String,
    result: Vec<VectorSample>,
}

#[derive(Debug, Deserialize)]
struct VectorSample {
    /// `[unix_time, "value"]`
    value: (f64, String),
}

/// Extract the first sample of an instant-vector response
fn parse_response(body: &str) -> Result<Option<f64>> {
    let response: QueryResponse = serde_json::from_str(body)
        .map_err(|e| Error::PrometheusResponseParse(e.to_string()))?;

    if response.status != "success" {
        return Err(Error::PrometheusQuery(
            response.error.unwrap_or_else(|| response.status.clone()),
        ));
    }

    let data = response
        .data
        .ok_or_else(|| Error::PrometheusResponseParse("missing data".into()))?;
    if data.result_type != "vector" {
        return Err(Error::PrometheusResponseParse(format!(
            "unexpected result type: {}",
            data.result_type
        )));
    }

    match data.result.first() {
        None => Ok(None),
        Some(sample) => sample
            .value
            .1
            .parse::<f64>()
            .map(Some)
            .map_err(|_| Error::PrometheusResponseParse(format!("invalid sample: {}", sample.value.1))),
    }
}

/// PromQL for a claim's utilisation percentage
pub fn usage_query(id: &ClaimId) -> String {
    let selector = format!(
        r#"{{namespace="{}",persistentvolumeclaim="{}"}}"#,
        id.namespace, id.name
    );
    format!(
        "100 * kubelet_volume_stats_used_bytes{sel} / kubelet_volume_stats_capacity_bytes{sel}",
        sel = selector
    )
}

const STATS_KEY: &str = "kubelet_volume_stats";

/// Map a query result onto the usage signal, flooring fractional percentages
fn to_usage(result: Result<Option<f64>>) -> std::result::Result<UsagePercent, UsageError> {
    match result {
        Ok(Some(value)) if value.is_finite() => Ok(UsagePercent(value.floor() as i64)),
        Ok(Some(value)) => Err(UsageError::Malformed {
            key: STATS_KEY.into(),
            value: value.to_string(),
        }),
        Ok(None) => Err(UsageError::Missing {
            key: STATS_KEY.into(),
        }),
        Err(e) => Err(UsageError::Unavailable(e.to_string())),
    }
}

// =============================================================================
// Usage Source
// =============================================================================

/// Usage source querying a Prometheus server
pub struct PrometheusUsageSource {
    config: PrometheusConfig,
    http: reqwest::Client,
}

impl PrometheusUsageSource {
    pub fn new(config: PrometheusConfig) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, http })
    }

    async fn query(&self, promql: &str) -> Result<Option<f64>> {
        let url = format!("{}/api/v1/query", self.config.url.trim_end_matches('/'));
        let body = self
            .http
            .get(&url)
            .query(&[("query", promql)])
            .send()
            .await?
            .text()
            .await?;
        parse_response(&body)
    }
}

#[async_trait]
impl UsageSource for PrometheusUsageSource {
    async fn usage(&self, claim: &PersistentVolumeClaim) -> std::result::Result<UsagePercent, UsageError> {
        let id = ClaimId::of(claim);
        let promql = usage_query(&id);
        debug!(pvc = %id, query = %promql, "Querying volume usage");

        to_usage(self.query(&promql).await)
    }

    fn source_name(&self) -> &str {
        "prometheus"
    }
}
