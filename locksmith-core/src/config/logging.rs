//! Logging configuration

use anyhow::Result;
use std::env;
use std::str::FromStr;

/// Minimum severity to log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Debug,
    Info,
    #[default]
    Warning,
    Error,
    Fatal,
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEBUG" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "WARNING" => Ok(Self::Warning),
            "ERROR" => Ok(Self::Error),
            "FATAL" => Ok(Self::Fatal),
            _ => Err(()),
        }
    }
}

impl LogLevel {
    /// The `log` crate has no Fatal level; FATAL shares the Error filter.
    pub fn to_filter(self) -> log::LevelFilter {
        match self {
            Self::Debug => log::LevelFilter::Debug,
            Self::Info => log::LevelFilter::Info,
            Self::Warning => log::LevelFilter::Warn,
            Self::Error | Self::Fatal => log::LevelFilter::Error,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    /// Minimum logged severity
    /// Env: LOG_LEVEL (DEBUG | INFO | WARNING | ERROR | FATAL)
    /// Default: WARNING
    pub level: LogLevel,

    /// Human-readable console output instead of JSON lines
    /// Env: LOG_OUTPUT_CONSOLE
    /// Default: false
    pub console: bool,
}

impl LoggingConfig {
    pub fn apply_env_vars(&mut self) {
        if let Ok(level) = env::var("LOG_LEVEL") {
            if let Ok(parsed) = level.parse() {
                self.level = parsed;
            }
        }
        if let Ok(console) = env::var("LOG_OUTPUT_CONSOLE") {
            self.console = console.parse().unwrap_or(false);
        }
    }

    pub fn validate(&self) -> Result<()> {
        Ok(())
    }
}
