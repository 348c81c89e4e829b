//! The local bar store and Data Sync Worker (`spec.md` §4.F): the one subsystem that talks to a
//! terminal outside the Session Supervisor's per-cycle sweep, running on its own long-lived task
//! (`spec.md` §5 "two long-lived background tasks: the Core Loop and the Data Sync Worker").

mod error;
mod store;
mod worker;

pub use error::DataSyncError;
pub use store::BarStore;
pub use worker::{DataSyncWorker, SyncProgress, SyncTask, RATE_LIMIT};
