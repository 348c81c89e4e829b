//! The Terminal Gate (`spec.md` §4.A): serializes every call to the process-global broker
//! terminal behind a single mutex. Callers acquire it only for the duration of one adapter
//! call — never across an `.await` into another subsystem (supervisor invariant 3, §3).
//!
//! The terminal adapter itself is an external collaborator we do not implement (`spec.md` §1
//! "out of scope: ... the terminal adapter itself — we specify only the narrow operations we
//! consume from it"). [`TerminalAdapter`] is that narrow contract; [`test_util::FakeTerminal`]
//! is the in-memory double the rest of the crate is tested against.

pub mod contract;
pub mod error;
pub mod test_util;

pub use contract::*;
pub use error::GateError;

use tokio::sync::Mutex;
use tracing::instrument;

/// A process-global broker terminal adapter, behind a single critical section. Generic over
/// `A` so the live binary wires a real adapter and tests wire [`test_util::FakeTerminal`].
#[derive(Debug)]
pub struct TerminalGate<A> {
    inner: Mutex<A>,
}

impl<A: TerminalAdapter> TerminalGate<A> {
    pub fn new(adapter: A) -> Self {
        Self {
            inner: Mutex::new(adapter),
        }
    }

    /// Acquires the critical section for a whole sequence of adapter calls — connect, refresh,
    /// mirror every follower in a group, shutdown — the way `spec.md` §5 describes the Session
    /// Supervisor's B-step acquiring the mutex "for the duration of one supervisor sweep".
    /// Every [`TerminalAdapter`] method is synchronous, so nothing `.await`s while the guard is
    /// held and no other task's work can interleave.
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, A> {
        self.inner.lock().await
    }

    /// A second `connect` silently supersedes the first (`spec.md` §4.A) — the adapter is a
    /// process-global singleton, not a per-caller handle.
    #[instrument(skip(self, password), fields(login = login))]
    pub async fn connect(
        &self,
        login: u64,
        password: &str,
        server: &str,
        path: &std::path::Path,
        timeout: std::time::Duration,
    ) -> ConnectOutcome {
        let mut adapter = self.inner.lock().await;
        adapter.connect(login, password, server, path, timeout)
    }

    pub async fn account_info(&self) -> Result<AccountInfoSnapshot, GateError> {
        let mut adapter = self.inner.lock().await;
        adapter.account_info()
    }

    /// Required before issuing orders or fetching ticks on unseen symbols (`spec.md` §4.A).
    pub async fn symbol_select(&self, symbol: &str, enable: bool) -> bool {
        let mut adapter = self.inner.lock().await;
        adapter.symbol_select(symbol, enable)
    }

    pub async fn symbol_info(&self, symbol: &str) -> Option<crate::model::SymbolInfo> {
        let mut adapter = self.inner.lock().await;
        adapter.symbol_info(symbol)
    }

    pub async fn symbol_info_tick(&self, symbol: &str) -> Option<Tick> {
        let mut adapter = self.inner.lock().await;
        adapter.symbol_info_tick(symbol)
    }

    pub async fn positions_get(
        &self,
        symbol: Option<&str>,
        magic: Option<i64>,
    ) -> Result<Vec<PositionRow>, GateError> {
        let mut adapter = self.inner.lock().await;
        adapter.positions_get(symbol, magic)
    }

    pub async fn orders_get(&self, symbol: Option<&str>) -> Result<Vec<PositionRow>, GateError> {
        let mut adapter = self.inner.lock().await;
        adapter.orders_get(symbol)
    }

    pub async fn copy_rates_range(
        &self,
        symbol: &str,
        timeframe: crate::model::bar::Timeframe,
        t0: chrono::DateTime<chrono::Utc>,
        t1: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<crate::model::Bar>, GateError> {
        let mut adapter = self.inner.lock().await;
        adapter.copy_rates_range(symbol, timeframe, t0, t1)
    }

    #[instrument(skip(self))]
    pub async fn order_send(&self, request: OrderRequest) -> TradeResult {
        let mut adapter = self.inner.lock().await;
        adapter.order_send(request)
    }

    pub async fn order_calc_margin(
        &self,
        action: OrderRequestAction,
        symbol: &str,
        volume: f64,
        price: Option<f64>,
    ) -> Option<f64> {
        let mut adapter = self.inner.lock().await;
        adapter.order_calc_margin(action, symbol, volume, price)
    }

    pub async fn shutdown(&self) {
        let mut adapter = self.inner.lock().await;
        adapter.shutdown();
    }
}
