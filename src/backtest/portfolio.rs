//! The backtest `Portfolio` (`spec.md` §4.E), grounded on the teacher's `src/portfolio/*`
//! (`allocator.rs`'s fixed-size placeholder policy, `portfolio.rs`'s position bookkeeping)
//! adapted to the spec's simplified single-fill-per-signal model.

use super::execution::{FillEvent, OrderEvent, OrderKind};
use crate::model::trade::OrderSide;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

const CONTRACT_SCALE: f64 = 100_000.0;

/// Strategy intent (`spec.md` §4.E event types). `Close` is resolved directly by the Portfolio
/// against its current mark-to-market price rather than round-tripping through the
/// `ExecutionHandler` — see [`Portfolio::on_signal`]'s doc comment for why.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum SignalDirection {
    Buy,
    Sell,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SignalEvent {
    pub symbol_index: usize,
    pub direction: SignalDirection,
    pub strength: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpenPosition {
    pub direction: OrderSide,
    pub volume: f64,
    pub price_open: f64,
    pub price_current: f64,
    pub profit: f64,
    pub open_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosedTrade {
    pub symbol_index: usize,
    pub direction: OrderSide,
    pub volume: f64,
    pub price_open: f64,
    pub price_close: f64,
    pub profit: f64,
    pub commission: f64,
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
}

fn position_profit(position: &OpenPosition, price_now: f64) -> f64 {
    let delta = match position.direction {
        OrderSide::Buy | OrderSide::BuyLimit | OrderSide::BuyStop => price_now - position.price_open,
        OrderSide::Sell | OrderSide::SellLimit | OrderSide::SellStop => position.price_open - price_now,
    };
    delta * position.volume * CONTRACT_SCALE
}

/// Ephemeral per-backtest bookkeeping (`spec.md` §3 "Backtest Portfolio").
#[derive(Debug, Clone)]
pub struct Portfolio {
    pub cash: f64,
    pub equity: f64,
    pub leverage: f64,
    pub positions: HashMap<usize, OpenPosition>,
    pub trade_history: Vec<ClosedTrade>,
}

impl Portfolio {
    /// `spec.md` §8 invariant 5: `equity == cash == initialCash` at start.
    pub fn new(initial_cash: f64, leverage: f64) -> Self {
        Self {
            cash: initial_cash,
            equity: initial_cash,
            leverage,
            positions: HashMap::new(),
            trade_history: Vec::new(),
        }
    }

    /// `spec.md` §4.E `onMarket`: recompute every open position's profit, then
    /// `equity = cash + Σ profit` (invariant 3).
    pub fn on_market(&mut self, symbol_index: usize, price_now: f64) {
        if let Some(position) = self.positions.get_mut(&symbol_index) {
            position.price_current = price_now;
            position.profit = position_profit(position, price_now);
        }
        self.recompute_equity();
    }

    /// `spec.md` §4.E `onSignal`: fixed 0.1 lot market order for `Buy`/`Sell` (placeholder
    /// sizing, richer sizing is future work per the spec). `Close` is resolved immediately
    /// against the position's last mark-to-market price rather than emitting an `Order` — doing
    /// so through `ExecutionHandler` would charge a second, un-spec'd commission on every
    /// round trip, which conflicts with `spec.md` §8 invariant 3 pinning cash's delta to
    /// exactly `fill.commission` on every `onFill` and with the single-commission round trip in
    /// scenario S6. A `Close` is a portfolio-level unwind, not a new broker order.
    pub fn on_signal(&mut self, signal: SignalEvent, time: DateTime<Utc>) -> Option<OrderEvent> {
        match signal.direction {
            SignalDirection::Buy => Some(OrderEvent {
                symbol_index: signal.symbol_index,
                kind: OrderKind::Mkt,
                direction: OrderSide::Buy,
                quantity: 0.1,
                price: None,
            }),
            SignalDirection::Sell => Some(OrderEvent {
                symbol_index: signal.symbol_index,
                kind: OrderKind::Mkt,
                direction: OrderSide::Sell,
                quantity: 0.1,
                price: None,
            }),
            SignalDirection::Close => {
                self.close_at_market(signal.symbol_index, time);
                None
            }
        }
    }

    fn close_at_market(&mut self, symbol_index: usize, time: DateTime<Utc>) {
        let Some(position) = self.positions.remove(&symbol_index) else {
            return;
        };
        let profit = position_profit(&position, position.price_current);
        self.cash += profit;
        self.trade_history.push(ClosedTrade {
            symbol_index,
            direction: position.direction,
            volume: position.volume,
            price_open: position.price_open,
            price_close: position.price_current,
            profit,
            commission: 0.0,
            open_time: position.open_time,
            close_time: time,
        });
        self.recompute_equity();
    }

    /// `spec.md` §4.E `onFill`: debit commission unconditionally (§8 invariant 3); if no open
    /// position exists for the symbol, open one at `fillPrice`; otherwise the "current policy"
    /// realizes the previous position and opens a new one at the fresh fill price
    /// (`spec.md` §9 Open Questions: close-and-reopen, not netting/averaging).
    pub fn on_fill(&mut self, fill: FillEvent, time: DateTime<Utc>) {
        self.cash -= fill.commission;

        if let Some(existing) = self.positions.remove(&fill.symbol_index) {
            let profit = position_profit(&existing, existing.price_current);
            self.cash += profit;
            self.trade_history.push(ClosedTrade {
                symbol_index: fill.symbol_index,
                direction: existing.direction,
                volume: existing.volume,
                price_open: existing.price_open,
                price_close: existing.price_current,
                profit,
                commission: fill.commission,
                open_time: existing.open_time,
                close_time: time,
            });
        }

        self.positions.insert(
            fill.symbol_index,
            OpenPosition {
                direction: fill.direction,
                volume: fill.quantity,
                price_open: fill.fill_price,
                price_current: fill.fill_price,
                profit: 0.0,
                open_time: time,
            },
        );

        self.recompute_equity();
    }

    fn recompute_equity(&mut self) {
        self.equity = self.cash + self.positions.values().map(|p| p.profit).sum::<f64>();
    }
}
