//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber:
//! - JSON or pretty console output
//! - Optional rolling JSON log files via tracing-appender
//! - `RUST_LOG` overrides of the configured level

pub mod logger;

pub use logger::{parse_log_level, LoggerImpl};
