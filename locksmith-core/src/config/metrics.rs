//! Metrics configuration

use anyhow::Result;
use std::env;

#[derive(Debug, Clone, Default)]
pub struct MetricsConfig {
    /// Expose the Prometheus scrape endpoint on :20000/metrics
    /// Env: METRICS
    /// Default: false
    pub enabled: bool,
}

impl MetricsConfig {
    pub fn apply_env_vars(&mut self) {
        if let Ok(enabled) = env::var("METRICS") {
            self.enabled = enabled.parse().unwrap_or(false);
        }
    }

    pub fn validate(&self) -> Result<()> {
        Ok(())
    }
}
