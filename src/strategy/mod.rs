//! The Strategy Runtime (`spec.md` §4.D): a user-authored strategy is a small lifecycle object
//! hosted on its own task, ticked on a heartbeat rather than a broker event stream, and speaking
//! only to the abstract [`crate::gateway::TradingGateway`] so the exact same strategy runs live
//! or inside [`crate::backtest`] unchanged.

pub mod error;
pub mod gateway;
pub mod params;
pub mod registry;

pub use error::StrategyTaskError;
pub use registry::{StrategyDescriptor, StrategyFactory, StrategyRegistry};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use crate::shutdown::{stop_signal, StopHandle};

/// The lifecycle hooks a strategy implements (`spec.md` §4.D). An instance is bound to exactly
/// one account, symbol, and timeframe for its whole life; `on_bar` is ticked once per heartbeat
/// interval rather than per broker tick.
#[async_trait]
pub trait Strategy: Send {
    /// Called once before the first heartbeat. A failure here aborts the task before it ever
    /// ticks (`spec.md` §4.D "Failure model").
    async fn on_init(&mut self) -> Result<(), StrategyTaskError>;

    /// Called once per heartbeat. A failure here is logged and the task continues to the next
    /// heartbeat rather than dying outright, unless the strategy chooses to return it anyway —
    /// the runtime itself never distinguishes recoverable from fatal `on_bar` errors, it only
    /// logs them (`spec.md` §7 "strategy exceptions never take down the process").
    async fn on_bar(&mut self, time: DateTime<Utc>) -> Result<(), StrategyTaskError>;

    /// Called once on shutdown, best-effort. Errors are logged, never propagated.
    async fn on_deinit(&mut self);
}

/// The default heartbeat period between `on_bar` ticks when a strategy instance does not
/// request a different one (`spec.md` §4.D default of one second).
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(1);

/// A running strategy task, returned by `spawn_strategy`. Dropping this without calling `stop`
/// leaves the task running — callers must explicitly stop it (`spec.md` §4.D "stopStrategy").
pub struct StrategyHandle {
    name: String,
    stop: StopHandle,
    join: JoinHandle<()>,
}

impl StrategyHandle {
    /// Signals the task to stop at its next heartbeat and waits up to 5s for it to actually
    /// finish (`spec.md` §5 "strategies are stopped in parallel with a 5s join"). A timeout is
    /// reported but does not retry or force-kill the task — the Core Loop only observes that the
    /// strategy is no longer considered running.
    #[instrument(skip(self), fields(strategy = %self.name))]
    pub async fn stop(self) -> Result<(), StrategyTaskError> {
        self.stop.stop();
        match tokio::time::timeout(Duration::from_secs(5), self.join).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_join_err)) => Err(StrategyTaskError::Panicked),
            Err(_elapsed) => {
                warn!("strategy task did not join within 5s");
                Err(StrategyTaskError::JoinTimeout)
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Spawns one strategy instance on its own task, running `on_init` then heartbeating `on_bar`
/// until stopped, then `on_deinit` (`spec.md` §4.D "Runtime behavior").
pub fn spawn_strategy(
    name: impl Into<String>,
    mut strategy: Box<dyn Strategy>,
    heartbeat: Duration,
) -> StrategyHandle {
    let name = name.into();
    let (stop_handle, mut stop_rx) = stop_signal();
    let task_name = name.clone();

    let join = tokio::spawn(async move {
        if let Err(err) = strategy.on_init().await {
            error!(strategy = %task_name, %err, "strategy on_init failed, task exiting");
            return;
        }
        info!(strategy = %task_name, "strategy started");

        while !stop_rx.is_stopped() {
            if let Err(err) = strategy.on_bar(Utc::now()).await {
                warn!(strategy = %task_name, %err, "strategy on_bar failed");
            }
            stop_rx.sleep_or_stop(heartbeat).await;
        }

        strategy.on_deinit().await;
        info!(strategy = %task_name, "strategy stopped");
    });

    StrategyHandle {
        name,
        stop: stop_handle,
        join,
    }
}
