//! Wire contract between the Terminal Gate and the underlying broker adapter (`spec.md` §4.A,
//! §6). Grounded on `examples/original_source/trading_gateway.py`'s abstract `TradingGateway`
//! method set (`initialize`, `account_info`, `symbol_info`, `symbol_info_tick`,
//! `copy_rates_from_pos`, `positions_get`, `order_send`, `order_calc_margin`), translated into a
//! synchronous trait the async [`super::TerminalGate`] wraps one mutex around.

use crate::model::bar::Timeframe;
use crate::model::{Bar, SymbolInfo};
use chrono::{DateTime, Utc};
use std::path::Path;
use std::time::Duration;

use super::GateError;

/// One side of a market tick, as returned by `symbol_info_tick` (`spec.md` §4.A).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    pub bid: f64,
    pub ask: f64,
    pub time: DateTime<Utc>,
}

/// Account-level telemetry returned by `account_info` (`spec.md` §3 `Telemetry`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccountInfoSnapshot {
    pub balance: f64,
    pub equity: f64,
    pub profit: f64,
    pub margin_free: f64,
    pub margin_level: f64,
}

/// An open position or pending order row, as returned by `positions_get`/`orders_get`.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionRow {
    pub ticket: i64,
    pub symbol: String,
    pub side: crate::model::trade::OrderSide,
    pub volume: f64,
    pub price_open: f64,
    pub sl: f64,
    pub tp: f64,
    pub magic: i64,
    pub profit: f64,
    pub comment: String,
}

/// The action an [`OrderRequest`] performs (`spec.md` §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderRequestAction {
    Deal,
    Pending,
    SlTp,
    Remove,
    CloseBy,
}

/// A request to place, modify, or close a trade (`spec.md` §4.A, §6).
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub action: OrderRequestAction,
    pub symbol: String,
    pub side: crate::model::trade::OrderSide,
    pub volume: f64,
    pub price: Option<f64>,
    pub sl: f64,
    pub tp: f64,
    pub deviation_points: i32,
    pub magic: i64,
    pub comment: String,
    /// Set when the request targets an existing position/order (modify, close).
    pub ticket: Option<i64>,
}

impl OrderRequest {
    /// Convenience builder for a market open (`spec.md` §4.C mirror open sweep).
    pub fn market_open(
        symbol: impl Into<String>,
        side: crate::model::trade::OrderSide,
        volume: f64,
        magic: i64,
        comment: impl Into<String>,
        deviation_points: i32,
    ) -> Self {
        Self {
            action: OrderRequestAction::Deal,
            symbol: symbol.into(),
            side,
            volume,
            price: None,
            sl: 0.0,
            tp: 0.0,
            deviation_points,
            magic,
            comment: comment.into(),
            ticket: None,
        }
    }

    /// Convenience builder for a market close of an existing ticket.
    pub fn market_close(
        ticket: i64,
        symbol: impl Into<String>,
        opposite_side: crate::model::trade::OrderSide,
        volume: f64,
        magic: i64,
        comment: impl Into<String>,
        deviation_points: i32,
    ) -> Self {
        Self {
            action: OrderRequestAction::Deal,
            symbol: symbol.into(),
            side: opposite_side,
            volume,
            price: None,
            sl: 0.0,
            tp: 0.0,
            deviation_points,
            magic,
            comment: comment.into(),
            ticket: Some(ticket),
        }
    }

    /// Convenience builder for removing a pending order that no longer has a master counterpart
    /// (`spec.md` §4.C close sweep).
    pub fn remove_pending(
        ticket: i64,
        symbol: impl Into<String>,
        side: crate::model::trade::OrderSide,
    ) -> Self {
        Self {
            action: OrderRequestAction::Remove,
            symbol: symbol.into(),
            side,
            volume: 0.0,
            price: None,
            sl: 0.0,
            tp: 0.0,
            deviation_points: 0,
            magic: 0,
            comment: String::new(),
            ticket: Some(ticket),
        }
    }

    /// Convenience builder for a pending order open at the master's recorded price
    /// (`spec.md` §4.C open sweep).
    pub fn pending_open(
        symbol: impl Into<String>,
        side: crate::model::trade::OrderSide,
        volume: f64,
        price: f64,
        magic: i64,
        comment: impl Into<String>,
        deviation_points: i32,
    ) -> Self {
        Self {
            action: OrderRequestAction::Pending,
            symbol: symbol.into(),
            side,
            volume,
            price: Some(price),
            sl: 0.0,
            tp: 0.0,
            deviation_points,
            magic,
            comment: comment.into(),
            ticket: None,
        }
    }

    /// Convenience builder for an SL/TP modification, no volume change.
    pub fn modify_sl_tp(ticket: i64, symbol: impl Into<String>, sl: f64, tp: f64) -> Self {
        Self {
            action: OrderRequestAction::SlTp,
            symbol: symbol.into(),
            side: crate::model::trade::OrderSide::Buy,
            volume: 0.0,
            price: None,
            sl,
            tp,
            deviation_points: 0,
            magic: 0,
            comment: String::new(),
            ticket: Some(ticket),
        }
    }
}

/// Broker return codes (`spec.md` §6), a narrowed subset of MT5's `TRADE_RETCODE_*` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetCode {
    Done,
    Requote,
    Rejected,
    InvalidVolume,
    NoMoney,
    MarketClosed,
    Other(u32),
}

impl RetCode {
    pub fn is_success(self) -> bool {
        matches!(self, RetCode::Done)
    }
}

/// Result of [`super::TerminalGate::order_send`] (`spec.md` §6).
#[derive(Debug, Clone, PartialEq)]
pub struct TradeResult {
    pub retcode: RetCode,
    pub deal: i64,
    pub order: i64,
    pub price: f64,
    pub comment: String,
}

impl From<PositionRow> for crate::model::FollowerTrade {
    fn from(row: PositionRow) -> Self {
        crate::model::FollowerTrade {
            ticket: row.ticket,
            symbol: row.symbol,
            side: row.side,
            volume: row.volume,
            price_open: row.price_open,
            sl: row.sl,
            tp: row.tp,
            magic: row.magic,
            profit: row.profit,
            comment: row.comment,
        }
    }
}

/// Result of [`super::TerminalGate::connect`] (`spec.md` §4.A/§4.B).
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectOutcome {
    Connected,
    InvalidCredentials,
    TerminalUnreachable,
    Timeout,
}

/// The narrow surface of broker-terminal behaviour the rest of this crate depends on. A real
/// binary wires a platform-specific adapter; tests wire [`super::test_util::FakeTerminal`].
/// Deliberately synchronous — [`super::TerminalGate`] is the only async boundary, so an adapter
/// cannot itself yield mid-call and break the single-critical-section invariant.
pub trait TerminalAdapter: Send + 'static {
    fn connect(
        &mut self,
        login: u64,
        password: &str,
        server: &str,
        path: &Path,
        timeout: Duration,
    ) -> ConnectOutcome;

    fn account_info(&mut self) -> Result<AccountInfoSnapshot, GateError>;

    fn symbol_select(&mut self, symbol: &str, enable: bool) -> bool;

    fn symbol_info(&mut self, symbol: &str) -> Option<SymbolInfo>;

    fn symbol_info_tick(&mut self, symbol: &str) -> Option<Tick>;

    fn positions_get(
        &mut self,
        symbol: Option<&str>,
        magic: Option<i64>,
    ) -> Result<Vec<PositionRow>, GateError>;

    fn orders_get(&mut self, symbol: Option<&str>) -> Result<Vec<PositionRow>, GateError>;

    fn copy_rates_range(
        &mut self,
        symbol: &str,
        timeframe: Timeframe,
        t0: DateTime<Utc>,
        t1: DateTime<Utc>,
    ) -> Result<Vec<Bar>, GateError>;

    fn order_send(&mut self, request: OrderRequest) -> TradeResult;

    fn order_calc_margin(
        &mut self,
        action: OrderRequestAction,
        symbol: &str,
        volume: f64,
        price: Option<f64>,
    ) -> Option<f64>;

    fn shutdown(&mut self);
}
