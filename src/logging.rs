//! Structured logging init, grounded on `barter/src/logging.rs` in the teacher.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Installs default human-readable logging with an `EnvFilter` defaulting to `INFO`.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with(tracing_subscriber::fmt::layer())
        .init()
}

/// Installs JSON logging for log-aggregator ingestion (`SPEC_FULL.md` §10.1).
pub fn init_json_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
        .init()
}
