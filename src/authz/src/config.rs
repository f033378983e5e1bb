//! Policy runtime configuration

use serde::{Deserialize, Serialize};

use crate::error::{AuthzError, Result};

/// Switches for the ambient parts of a [`Policy`](crate::policy::Policy).
/// None of them affects a verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyConfig {
    /// Send every decision to the audit sink
    pub enable_audit: bool,

    /// Collect decision counters and latency samples
    pub enable_metrics: bool,

    /// Keep the final context in audit entries; disable when context
    /// carries data that must not reach the audit trail
    pub include_context_in_audit: bool,

    /// Latency samples kept for percentile calculation
    pub metrics_sample_capacity: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            enable_audit: true,
            enable_metrics: true,
            include_context_in_audit: true,
            metrics_sample_capacity: 10_000,
        }
    }
}

impl PolicyConfig {
    /// Parse and validate a JSON configuration document. Missing fields take
    /// their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| AuthzError::Config(format!("Failed to parse policy config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that cannot be honored
    pub fn validate(&self) -> Result<()> {
        if self.enable_metrics && self.metrics_sample_capacity == 0 {
            return Err(AuthzError::Config(
                "metrics_sample_capacity must be greater than zero when metrics are enabled"
                    .to_string(),
            ));
        }
        Ok(())
    }
}
