use thiserror::Error;

/// Top-level failure that prevents the process from starting or forces a non-zero exit.
///
/// Per-account and per-cycle failures are recovered locally by the owning component
/// (see [`crate::supervisor::SupervisorError`], [`crate::mirror::MirrorError`],
/// [`crate::strategy::StrategyTaskError`]) and never surface here.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("failed to initialise password-at-rest keyfile: {0}")]
    Crypto(#[from] crate::crypto::CryptoError),

    #[error("failed to open bar store: {0}")]
    DataSync(#[from] crate::datasync::DataSyncError),

    #[error("builder is missing required field(s)")]
    BuilderIncomplete,
}
