//! Queue layer configuration

use anyhow::{bail, Result};
use std::env;
use std::str::FromStr;

/// Queue layer mode. `Single` runs one shard worker and exists for tests
/// that need fully deterministic ordering across tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueMode {
    Single,
    #[default]
    Multi,
}

impl FromStr for QueueMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(Self::Single),
            "multi" => Ok(Self::Multi),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Queue layer mode
    /// Env: Q_TYPE (single | multi)
    /// Default: multi
    pub mode: QueueMode,

    /// Number of shard workers (multi mode only)
    /// Env: Q_CONCURRENCY
    /// Default: 10
    pub concurrency: usize,

    /// Buffered actions per shard; a full shard blocks submitters
    /// Env: Q_CAPACITY
    /// Default: 100
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { mode: QueueMode::Multi, concurrency: 10, capacity: 100 }
    }
}

impl QueueConfig {
    pub fn apply_env_vars(&mut self) {
        if let Ok(mode) = env::var("Q_TYPE") {
            if let Ok(parsed) = mode.parse() {
                self.mode = parsed;
            }
        }
        if let Ok(concurrency) = env::var("Q_CONCURRENCY") {
            if let Ok(c) = concurrency.parse() {
                self.concurrency = c;
            }
        }
        if let Ok(capacity) = env::var("Q_CAPACITY") {
            if let Ok(c) = capacity.parse() {
                self.capacity = c;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            bail!("Invalid Q_CONCURRENCY: must be at least 1");
        }
        if self.capacity == 0 {
            bail!("Invalid Q_CAPACITY: must be at least 1");
        }
        Ok(())
    }
}
