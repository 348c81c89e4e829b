//! `BacktestTradingGateway` (`spec.md` §4.E), grounded almost call-for-call on
//! `examples/original_source/backtest_gateway.py`'s `BacktestTradingGateway`: `account_info`
//! proxies to the Portfolio, `symbol_info` hardcodes point/digits, `symbol_info_tick` and
//! `copy_rates_from_pos` proxy to the `DataHandler`, `order_send` converts a deal request into a
//! `Signal` event and returns a synthetic `tradeDone` receipt, and `order_calc_margin` computes
//! `volume * 100000 * price / leverage`.

use super::data::HistoricDataHandler;
use super::portfolio::{Portfolio, SignalDirection, SignalEvent};
use crate::event::{BacktestEvent, MessageTransmitter, Tx};
use crate::gate::{
    AccountInfoSnapshot, OrderRequestAction, PositionRow, RetCode, Tick, TradeResult,
};
use crate::gateway::{GatewayError, TradingGateway};
use crate::model::bar::Timeframe;
use crate::model::trade::OrderSide;
use crate::model::SymbolInfo;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

const CONTRACT_UNITS: f64 = 100_000.0;

/// The strategy-facing gateway a backtest run wires up: reads flow from the shared
/// [`HistoricDataHandler`]/[`Portfolio`], writes flow out as [`SignalEvent`]s onto the
/// backtester's own event queue rather than mutating the Portfolio directly — mirroring the
/// live gateway's "order accepted now, fill arrives later" asynchrony (`spec.md` §4.E).
pub struct BacktestTradingGateway {
    data: Arc<Mutex<HistoricDataHandler>>,
    portfolio: Arc<Mutex<Portfolio>>,
    signal_tx: Mutex<Tx<BacktestEvent>>,
}

impl BacktestTradingGateway {
    pub fn new(
        data: Arc<Mutex<HistoricDataHandler>>,
        portfolio: Arc<Mutex<Portfolio>>,
        signal_tx: Tx<BacktestEvent>,
    ) -> Self {
        Self {
            data,
            portfolio,
            signal_tx: Mutex::new(signal_tx),
        }
    }

    /// `spec.md` §13: point size resolved per symbol, falling back to `1e-5`
    /// (JPY-quoted pairs use `1e-3` in the reference adapter).
    fn point_size(symbol: &str) -> f64 {
        if symbol.to_ascii_uppercase().contains("JPY") {
            0.001
        } else {
            0.00001
        }
    }
}

#[async_trait]
impl TradingGateway for BacktestTradingGateway {
    async fn account_info(&self) -> Result<AccountInfoSnapshot, GatewayError> {
        let portfolio = self.portfolio.lock().await;
        let profit: f64 = portfolio.positions.values().map(|p| p.profit).sum();
        Ok(AccountInfoSnapshot {
            balance: portfolio.cash,
            equity: portfolio.equity,
            profit,
            margin_free: portfolio.equity,
            margin_level: 0.0,
        })
    }

    async fn symbol_info(&self, symbol: &str) -> Result<SymbolInfo, GatewayError> {
        Ok(SymbolInfo {
            point: Self::point_size(symbol),
            digits: if symbol.to_ascii_uppercase().contains("JPY") { 3 } else { 5 },
            volume_min: 0.01,
            volume_max: 100.0,
            volume_step: 0.01,
            trade_mode: crate::model::symbol::TradeMode::Full,
        })
    }

    async fn symbol_info_tick(&self, symbol: &str) -> Result<Tick, GatewayError> {
        let data = self.data.lock().await;
        let Some(index) = data.symbol_index(symbol) else {
            return Err(GatewayError::NoData(symbol.to_string()));
        };
        let Some(bar) = data.latest_bar(index) else {
            return Err(GatewayError::NoData(symbol.to_string()));
        };
        Ok(Tick {
            bid: bar.close,
            ask: bar.close,
            time: bar.time,
        })
    }

    async fn copy_rates_from_pos(
        &self,
        symbol: &str,
        _timeframe: Timeframe,
        _start: usize,
        count: usize,
    ) -> Result<Vec<crate::model::Bar>, GatewayError> {
        let data = self.data.lock().await;
        let Some(index) = data.symbol_index(symbol) else {
            return Err(GatewayError::NoData(symbol.to_string()));
        };
        Ok(data.bars_from(index, count))
    }

    async fn positions_get(&self, symbol: Option<&str>) -> Result<Vec<PositionRow>, GatewayError> {
        let data = self.data.lock().await;
        let portfolio = self.portfolio.lock().await;

        let mut rows = Vec::new();
        for (&symbol_index, position) in &portfolio.positions {
            let Some(row_symbol) = data.symbol_name(symbol_index) else {
                continue;
            };
            if symbol.is_some_and(|want| want != row_symbol) {
                continue;
            }
            rows.push(PositionRow {
                ticket: symbol_index as i64,
                symbol: row_symbol.to_string(),
                side: position.direction,
                volume: position.volume,
                price_open: position.price_open,
                sl: 0.0,
                tp: 0.0,
                magic: 0,
                profit: position.profit,
                comment: String::new(),
            });
        }
        Ok(rows)
    }

    async fn order_send(
        &self,
        symbol: &str,
        side: OrderSide,
        volume: f64,
        _comment: &str,
    ) -> Result<TradeResult, GatewayError> {
        let data = self.data.lock().await;
        let Some(symbol_index) = data.symbol_index(symbol) else {
            return Err(GatewayError::NoData(symbol.to_string()));
        };
        drop(data);

        let direction = match side {
            OrderSide::Buy | OrderSide::BuyLimit | OrderSide::BuyStop => SignalDirection::Buy,
            OrderSide::Sell | OrderSide::SellLimit | OrderSide::SellStop => SignalDirection::Sell,
        };

        let _ = volume; // fixed-lot sizing happens in `Portfolio::on_signal`, not here
        self.signal_tx.lock().await.send(BacktestEvent::Signal(SignalEvent {
            symbol_index,
            direction,
            strength: 1.0,
        }));

        Ok(TradeResult {
            retcode: RetCode::Done,
            deal: 0,
            order: 0,
            price: 0.0,
            comment: "Request accepted by backtest engine".to_string(),
        })
    }

    async fn order_calc_margin(
        &self,
        _action: OrderRequestAction,
        _symbol: &str,
        volume: f64,
        price: Option<f64>,
    ) -> Result<Option<f64>, GatewayError> {
        let Some(price) = price else { return Ok(None) };
        let portfolio = self.portfolio.lock().await;
        if portfolio.leverage <= 0.0 {
            return Ok(None);
        }
        Ok(Some(volume * CONTRACT_UNITS * price / portfolio.leverage))
    }

    async fn shutdown(&self) {}
}

/// Issues a `Close` intent directly, bypassing `order_send`'s fixed-lot Buy/Sell mapping — used
/// by strategies that want to flatten rather than flip (`spec.md` §4.E `onSignal`).
pub async fn close_position(signal_tx: &Mutex<Tx<BacktestEvent>>, symbol_index: usize) {
    signal_tx.lock().await.send(BacktestEvent::Signal(SignalEvent {
        symbol_index,
        direction: SignalDirection::Close,
        strength: 1.0,
    }));
}
