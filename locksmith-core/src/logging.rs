//! Logger installation.
//!
//! The default output is one JSON object per line, ready for log shippers;
//! `LOG_OUTPUT_CONSOLE=true` switches to env_logger's human-readable format
//! for local runs.

use std::io::Write;

use crate::config::LoggingConfig;

/// Install the global logger. Safe to call more than once; later calls are
/// ignored, which keeps tests that share a process happy.
pub fn init(config: &LoggingConfig) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(config.level.to_filter());

    if !config.console {
        builder.format(|buf, record| {
            let line = serde_json::json!({
                "time": buf.timestamp().to_string(),
                "level": record.level().to_string().to_lowercase(),
                "target": record.target(),
                "message": record.args().to_string(),
            });
            writeln!(buf, "{}", line)
        });
    }

    let _ = builder.try_init();
}
