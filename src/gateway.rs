//! The abstract `TradingGateway` a strategy is written against (`spec.md` §4.D): two
//! interchangeable implementations, [`crate::strategy::gateway::LiveTradingGateway`] and
//! [`crate::backtest::gateway::BacktestTradingGateway`], so the exact same strategy binary runs
//! unchanged live or in a backtest (`spec.md` §4.E "Strategy parity"). Grounded on
//! `examples/original_source/trading_gateway.py`'s abstract `TradingGateway`.

use crate::gate::{OrderRequestAction, PositionRow, TradeResult};
use crate::model::bar::Timeframe;
use crate::model::trade::OrderSide;
use crate::model::{Bar, SymbolInfo};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Errors a [`TradingGateway`] call can surface to a strategy (`spec.md` §4.D, §7: strategy
/// exceptions are caught and logged by the runtime, never propagated beyond task death).
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum GatewayError {
    #[error(transparent)]
    Gate(#[from] crate::gate::GateError),

    #[error("symbol {0} has no data available")]
    NoData(String),
}

/// The narrow surface a strategy is written against (`spec.md` §4.D). Both implementations are
/// bit-compatible on `order_send`'s synthetic receipt shape (`spec.md` §4.E).
#[async_trait]
pub trait TradingGateway: Send + Sync {
    async fn account_info(&self) -> Result<crate::gate::AccountInfoSnapshot, GatewayError>;

    async fn symbol_info(&self, symbol: &str) -> Result<SymbolInfo, GatewayError>;

    async fn symbol_info_tick(&self, symbol: &str) -> Result<crate::gate::Tick, GatewayError>;

    async fn copy_rates_from_pos(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: usize,
        count: usize,
    ) -> Result<Vec<Bar>, GatewayError>;

    async fn positions_get(&self, symbol: Option<&str>) -> Result<Vec<PositionRow>, GatewayError>;

    async fn order_send(
        &self,
        symbol: &str,
        side: OrderSide,
        volume: f64,
        comment: &str,
    ) -> Result<TradeResult, GatewayError>;

    async fn order_calc_margin(
        &self,
        action: OrderRequestAction,
        symbol: &str,
        volume: f64,
        price: Option<f64>,
    ) -> Result<Option<f64>, GatewayError>;

    async fn shutdown(&self);
}

/// A synthetic heartbeat tick, emitted to `on_bar` every strategy interval (`spec.md` §4.D).
/// Distinct from [`crate::backtest::data::MarketEvent`] — live strategies never see a backtest
/// `Market` event, only this poll-driven heartbeat.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Heartbeat {
    pub symbol_time: DateTime<Utc>,
}
