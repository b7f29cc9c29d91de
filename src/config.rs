//! Operator Configuration

use crate::adapters::{PrometheusConfig, CONTROLLER_NAME};
use crate::error::{Error, Result};
use crate::resize::DEFAULT_USAGE_ANNOTATION;
use std::net::SocketAddr;
use std::time::Duration;

/// Runtime configuration for the operator process
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// Health server bind address
    pub health_addr: SocketAddr,
    /// Metrics server bind address
    pub metrics_addr: SocketAddr,
    /// Delay between passes for an unchanged policy
    pub resync_interval: Duration,
    /// Delay before retrying a pass that failed transiently
    pub error_backoff: Duration,
    /// Annotation carrying the usage percentage
    pub usage_annotation: String,
    /// Query usage from Prometheus instead of the annotation
    pub prometheus: Option<PrometheusConfig>,
    /// Field manager recorded on patches
    pub field_manager: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            health_addr: SocketAddr::from(([0, 0, 0, 0], 8081)),
            metrics_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            resync_interval: Duration::from_secs(60),
            error_backoff: Duration::from_secs(15),
            usage_annotation: DEFAULT_USAGE_ANNOTATION.to_string(),
            prometheus: None,
            field_manager: CONTROLLER_NAME.to_string(),
        }
    }
}

impl OperatorConfig {
    /// Reject settings the controller cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.resync_interval.is_zero() {
            return Err(Error::Configuration(
                "resync interval must be greater than zero".into(),
            ));
        }
        if self.usage_annotation.trim().is_empty() {
            return Err(Error::Configuration("usage annotation must not be empty".into()));
        }
        if let Some(prometheus) = &self.prometheus {
            if !prometheus.url.starts_with("http://") && !prometheus.url.starts_with("https://") {
                return Err(Error::Configuration(format!(
                    "invalid Prometheus URL: {}",
                    prometheus.url
                )));
            }
        }
        Ok(())
    }
}
