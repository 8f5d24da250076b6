//! Structured logging setup, switched between a compact text formatter and
//! a JSON formatter by `--logformat`, level gated by `--loglevel` (§6). The
//! teacher prints directly with `println!`, fine for an interactive
//! downloader; a headless publisher instead logs per-job failures, prune
//! deletions, and publish steps the way the rest of the retrieval pack's
//! server-shaped crates do.

use crate::cli::{LogFormat, LogLevel};

pub fn init(format: LogFormat, level: LogLevel) {
    let filter = tracing_subscriber::EnvFilter::new(level_filter(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn level_filter(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    }
}
