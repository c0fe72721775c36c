//! Runtime configuration.
//!
//! Locksmith is configured entirely through environment variables; the
//! variable names are the stable operational contract. Each concern has its
//! own config struct with defaults, an `apply_env_vars()` pass and a
//! `validate()` pass; [`Config::from_env`] chains the three.
//!
//! | Variable | Default | Effect |
//! |---|---|---|
//! | `PORT` | 9000 | Listen port |
//! | `LOG_LEVEL` | WARNING | Minimum logged severity |
//! | `LOG_OUTPUT_CONSOLE` | false | Human-readable instead of JSON logs |
//! | `METRICS` | false | Prometheus endpoint on :20000/metrics |
//! | `Q_TYPE` | multi | Queue layer mode (`single` is for tests) |
//! | `Q_CONCURRENCY` | 10 | Number of shard workers (multi only) |
//! | `Q_CAPACITY` | 100 | Per-shard queue capacity |
//! | `TLS` | false | Enable TLS |
//! | `TLS_CERT_PATH` | — | Server certificate (PEM) |
//! | `TLS_KEY_PATH` | — | Server private key (PEM) |
//! | `TLS_REQUIRE_CLIENT_CERT` | false | Enable mTLS |
//! | `TLS_CLIENT_CA_CERT_PATH` | — | CA pool for client verification |

pub mod logging;
pub mod metrics;
pub mod queue;
pub mod server;

pub use logging::{LogLevel, LoggingConfig};
pub use metrics::MetricsConfig;
pub use queue::{QueueConfig, QueueMode};
pub use server::ServerConfig;

use anyhow::Result;

/// Complete Locksmith configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
    pub queue: QueueConfig,
}

impl Config {
    /// Defaults overridden by environment variables, then validated.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_vars();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variables to configuration
    pub fn apply_env_vars(&mut self) {
        self.server.apply_env_vars();
        self.logging.apply_env_vars();
        self.metrics.apply_env_vars();
        self.queue.apply_env_vars();
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.logging.validate()?;
        self.metrics.validate()?;
        self.queue.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 9000);
        assert!(!config.server.tls);
        assert!(!config.metrics.enabled);
        assert_eq!(config.queue.mode, QueueMode::Multi);
        assert_eq!(config.queue.concurrency, 10);
        assert_eq!(config.queue.capacity, 100);
    }

    #[test]
    fn test_config_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }
}
