use std::path::PathBuf;
use thiserror::Error;

/// Failures from the bar store or a sync pass against the terminal (`spec.md` §4.F). Per §7
/// these are caught by the worker loop, logged, and do not stop the worker itself.
#[derive(Error, Debug)]
pub enum DataSyncError {
    #[error("failed to open bar store at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("bar store query failed: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("terminal gate error during data sync: {0}")]
    Gate(#[from] crate::gate::GateError),
}
