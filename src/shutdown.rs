//! Process-global stop signal, grounded on `src/shutdown.rs`'s `SyncShutdown`/`AsyncShutdown`
//! traits in the teacher. `spec.md` §5 requires every sleep point (Core Loop, strategy ticks,
//! Data Sync Worker pairs) to be cancellable from one shared signal, observed at loop heads.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Duration;

pub trait SyncShutdown {
    type Result;
    fn shutdown(&mut self) -> Self::Result;
}

pub trait AsyncShutdown {
    type Result;
    fn shutdown(&mut self) -> impl Future<Output = Self::Result> + Send;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
pub struct Shutdown;

/// The process-global stop signal (`spec.md` §5). `StopHandle::stop` is a one-shot broadcast:
/// every clone of `StopSignal` observes it at its next `sleep` or loop head.
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

/// Constructs a linked [`StopHandle`]/[`StopSignal`] pair.
pub fn stop_signal() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx }, StopSignal { rx })
}

impl StopHandle {
    /// Sets the global stop signal. The Core Loop and Data Sync Worker exit at their next sleep
    /// boundary; strategies are stopped in parallel with a 5s join (`spec.md` §5).
    pub fn stop(&self) {
        let _ = self.tx.send(true);
    }
}

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Sleeps for `duration` unless the stop signal fires first, in which case it returns early.
    /// Every suspension point in `spec.md` §5 goes through this so `stop()` is observed promptly.
    pub async fn sleep_or_stop(&mut self, duration: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.rx.changed() => {}
        }
    }

    /// Resolves once `stop()` is called. Lets a task blocked on something other than a timed
    /// sleep (e.g. a channel `recv`) race the stop signal in a `tokio::select!`.
    pub async fn stopped(&mut self) {
        let _ = self.rx.changed().await;
    }
}
