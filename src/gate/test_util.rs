//! An in-memory [`TerminalAdapter`] double for exercising the Supervisor and Mirror Engine
//! without a real broker terminal. Not behind `#[cfg(test)]` so integration tests under
//! `tests/` can build on it too.

use super::{
    AccountInfoSnapshot, ConnectOutcome, GateError, OrderRequest, OrderRequestAction,
    PositionRow, RetCode, TerminalAdapter, Tick, TradeResult,
};
use crate::model::bar::Timeframe;
use crate::model::{Bar, SymbolInfo};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// A scripted broker double. Construct with [`FakeTerminal::new`], seed it with
/// [`FakeTerminal::with_symbol`]/[`FakeTerminal::with_position`]/[`FakeTerminal::with_bars`],
/// then hand it to a [`super::TerminalGate`]. `order_send` appends to `sent_orders` and applies
/// the scripted `next_retcode`/`next_ticket`, letting a test assert on exactly what was sent
/// without reimplementing a broker.
#[derive(Debug, Clone)]
pub struct FakeTerminal {
    pub connected: bool,
    pub connect_outcome: ConnectOutcome,
    pub account: AccountInfoSnapshot,
    pub symbols: HashMap<String, SymbolInfo>,
    pub ticks: HashMap<String, Tick>,
    pub positions: Vec<PositionRow>,
    pub orders: Vec<PositionRow>,
    pub bars: HashMap<(String, Timeframe), Vec<Bar>>,
    pub sent_orders: Vec<OrderRequest>,
    pub next_retcode: RetCode,
    pub next_ticket: i64,
    pub margin_per_lot: f64,
}

impl Default for FakeTerminal {
    fn default() -> Self {
        Self {
            connected: false,
            connect_outcome: ConnectOutcome::Connected,
            account: AccountInfoSnapshot {
                balance: 10_000.0,
                equity: 10_000.0,
                profit: 0.0,
                margin_free: 10_000.0,
                margin_level: 0.0,
            },
            symbols: HashMap::new(),
            ticks: HashMap::new(),
            positions: Vec::new(),
            orders: Vec::new(),
            bars: HashMap::new(),
            sent_orders: Vec::new(),
            next_retcode: RetCode::Done,
            next_ticket: 1,
            margin_per_lot: 1000.0,
        }
    }
}

impl FakeTerminal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_symbol(mut self, symbol: &str, info: SymbolInfo) -> Self {
        self.symbols.insert(symbol.to_string(), info);
        self
    }

    pub fn with_tick(mut self, symbol: &str, tick: Tick) -> Self {
        self.ticks.insert(symbol.to_string(), tick);
        self
    }

    pub fn with_position(mut self, position: PositionRow) -> Self {
        self.positions.push(position);
        self
    }

    pub fn with_bars(mut self, symbol: &str, timeframe: Timeframe, bars: Vec<Bar>) -> Self {
        self.bars.insert((symbol.to_string(), timeframe), bars);
        self
    }
}

impl TerminalAdapter for FakeTerminal {
    fn connect(
        &mut self,
        _login: u64,
        _password: &str,
        _server: &str,
        _path: &Path,
        _timeout: Duration,
    ) -> ConnectOutcome {
        if self.connect_outcome == ConnectOutcome::Connected {
            self.connected = true;
        }
        self.connect_outcome.clone()
    }

    fn account_info(&mut self) -> Result<AccountInfoSnapshot, GateError> {
        if !self.connected {
            return Err(GateError::NotConnected);
        }
        Ok(self.account)
    }

    fn symbol_select(&mut self, symbol: &str, _enable: bool) -> bool {
        self.symbols.contains_key(symbol)
    }

    fn symbol_info(&mut self, symbol: &str) -> Option<SymbolInfo> {
        self.symbols.get(symbol).copied()
    }

    fn symbol_info_tick(&mut self, symbol: &str) -> Option<Tick> {
        self.ticks.get(symbol).copied()
    }

    fn positions_get(
        &mut self,
        symbol: Option<&str>,
        magic: Option<i64>,
    ) -> Result<Vec<PositionRow>, GateError> {
        if !self.connected {
            return Err(GateError::NotConnected);
        }
        Ok(self
            .positions
            .iter()
            .filter(|p| symbol.map_or(true, |s| p.symbol == s))
            .filter(|p| magic.map_or(true, |m| p.magic == m))
            .cloned()
            .collect())
    }

    fn orders_get(&mut self, symbol: Option<&str>) -> Result<Vec<PositionRow>, GateError> {
        if !self.connected {
            return Err(GateError::NotConnected);
        }
        Ok(self
            .orders
            .iter()
            .filter(|o| symbol.map_or(true, |s| o.symbol == s))
            .cloned()
            .collect())
    }

    fn copy_rates_range(
        &mut self,
        symbol: &str,
        timeframe: Timeframe,
        t0: DateTime<Utc>,
        t1: DateTime<Utc>,
    ) -> Result<Vec<Bar>, GateError> {
        let bars = self
            .bars
            .get(&(symbol.to_string(), timeframe))
            .cloned()
            .unwrap_or_default();
        Ok(bars.into_iter().filter(|b| b.time >= t0 && b.time <= t1).collect())
    }

    fn order_send(&mut self, request: OrderRequest) -> TradeResult {
        let ticket = self.next_ticket;
        self.next_ticket += 1;

        let result = TradeResult {
            retcode: self.next_retcode,
            deal: ticket,
            order: ticket,
            price: request.price.unwrap_or(0.0),
            comment: "fake fill".to_string(),
        };

        if self.next_retcode.is_success() {
            match request.ticket {
                Some(existing) => {
                    self.positions.retain(|p| p.ticket != existing);
                }
                None => {
                    self.positions.push(PositionRow {
                        ticket,
                        symbol: request.symbol.clone(),
                        side: request.side,
                        volume: request.volume,
                        price_open: request.price.unwrap_or(0.0),
                        sl: request.sl,
                        tp: request.tp,
                        magic: request.magic,
                        profit: 0.0,
                        comment: request.comment.clone(),
                    });
                }
            }
        }

        self.sent_orders.push(request);
        result
    }

    fn order_calc_margin(
        &mut self,
        _action: OrderRequestAction,
        _symbol: &str,
        volume: f64,
        _price: Option<f64>,
    ) -> Option<f64> {
        Some(volume * self.margin_per_lot)
    }

    fn shutdown(&mut self) {
        self.connected = false;
    }
}
