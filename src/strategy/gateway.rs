//! `LiveTradingGateway` (`spec.md` §4.D): the `TradingGateway` implementation a live strategy
//! instance is constructed with, delegating every call straight through the shared
//! [`TerminalGate`] it was bound to at `startStrategy` time.

use crate::gate::{OrderRequest, OrderRequestAction, PositionRow, TerminalAdapter, TerminalGate, Tick, TradeResult};
use crate::gateway::{GatewayError, TradingGateway};
use crate::model::bar::Timeframe;
use crate::model::trade::OrderSide;
use crate::model::{Bar, SymbolInfo};
use async_trait::async_trait;
use std::sync::Arc;

/// Binds one strategy instance to the process-global terminal, under the account's own magic
/// number so its orders never collide with the Mirror Engine's mirrored tickets (`spec.md` §4.D
/// "Contract with the Mirror Engine").
pub struct LiveTradingGateway<A: TerminalAdapter> {
    gate: Arc<TerminalGate<A>>,
    magic: i64,
}

impl<A: TerminalAdapter> LiveTradingGateway<A> {
    pub fn new(gate: Arc<TerminalGate<A>>, magic: i64) -> Self {
        Self { gate, magic }
    }
}

#[async_trait]
impl<A: TerminalAdapter> TradingGateway for LiveTradingGateway<A> {
    async fn account_info(&self) -> Result<crate::gate::AccountInfoSnapshot, GatewayError> {
        Ok(self.gate.account_info().await?)
    }

    async fn symbol_info(&self, symbol: &str) -> Result<SymbolInfo, GatewayError> {
        self.gate
            .symbol_info(symbol)
            .await
            .ok_or_else(|| GatewayError::NoData(symbol.to_string()))
    }

    async fn symbol_info_tick(&self, symbol: &str) -> Result<Tick, GatewayError> {
        self.gate
            .symbol_info_tick(symbol)
            .await
            .ok_or_else(|| GatewayError::NoData(symbol.to_string()))
    }

    async fn copy_rates_from_pos(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: usize,
        count: usize,
    ) -> Result<Vec<Bar>, GatewayError> {
        // `spec.md` §4.A only specifies `copyRatesRange`; a strategy asking for the most recent
        // `count` bars maps onto the widest practicable range and is trimmed to `count` here.
        let t1 = chrono::Utc::now();
        let t0 = t1 - chrono::Duration::days(3650);
        let mut bars = self.gate.copy_rates_range(symbol, timeframe, t0, t1).await?;
        let keep = bars.len().saturating_sub(start);
        bars.truncate(keep);
        if bars.len() > count {
            bars.drain(0..bars.len() - count);
        }
        Ok(bars)
    }

    async fn positions_get(&self, symbol: Option<&str>) -> Result<Vec<PositionRow>, GatewayError> {
        Ok(self.gate.positions_get(symbol, Some(self.magic)).await?)
    }

    async fn order_send(
        &self,
        symbol: &str,
        side: OrderSide,
        volume: f64,
        comment: &str,
    ) -> Result<TradeResult, GatewayError> {
        let request = OrderRequest::market_open(symbol, side, volume, self.magic, comment, 200);
        Ok(self.gate.order_send(request).await)
    }

    async fn order_calc_margin(
        &self,
        action: OrderRequestAction,
        symbol: &str,
        volume: f64,
        price: Option<f64>,
    ) -> Result<Option<f64>, GatewayError> {
        Ok(self.gate.order_calc_margin(action, symbol, volume, price).await)
    }

    async fn shutdown(&self) {
        self.gate.shutdown().await
    }
}
