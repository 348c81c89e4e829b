//! `Order`/`Fill` events and the `ExecutionHandler` (`spec.md` §4.E), grounded on the teacher's
//! `src/execution/simulated.rs` (`SimulatedExecution`, `calculate_fill_value_gross`,
//! `calculate_fees`) and `src/execution/fill.rs`'s `FillEvent`/`Fees` shape.

use crate::model::trade::OrderSide;
use serde::Serialize;

/// A pending-order kind; only `Mkt` is implemented, `Lmt`/`Stp` are declared future work
/// (`spec.md` §4.E, §9 design notes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OrderKind {
    Mkt,
    Lmt,
    Stp,
}

/// A portfolio decision to trade, queued for the `ExecutionHandler` (`spec.md` §4.E). For a
/// `Mkt` order, `price` carries the fill bar's open, captured when the order is created so a
/// later `Market` event advancing the data handler's cursor can't shift which bar it fills at.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OrderEvent {
    pub symbol_index: usize,
    pub kind: OrderKind,
    pub direction: OrderSide,
    pub quantity: f64,
    pub price: Option<f64>,
}

/// An execution confirmation (`spec.md` §4.E).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FillEvent {
    pub symbol_index: usize,
    pub direction: OrderSide,
    pub quantity: f64,
    pub fill_price: f64,
    pub commission: f64,
    pub slippage: f64,
}

/// Fixed per-trade commission and a per-point slippage cost, resolved against each symbol's
/// point size (`spec.md` §4.E, §13/Open Questions: point size falls back to `1e-5`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutionConfig {
    pub commission_per_trade: f64,
    pub slippage_points: i32,
}

/// Fills a market order at the next bar's open, preventing look-ahead (`spec.md` §4.E). The
/// "next bar" is the bar the `DataHandler` has just advanced to when the `Market` event that
/// triggered this order was published — the caller is responsible for passing that bar's open.
pub fn fill_market_order(
    order: OrderEvent,
    next_bar_open: f64,
    point_size: f64,
    config: ExecutionConfig,
) -> FillEvent {
    // Slippage is modeled as an absolute cost against the trader on both sides (`spec.md` §13):
    // a buy pays `open + slippage`, a sell receives `open - slippage`.
    let slippage = config.slippage_points as f64 * point_size;
    let fill_price = match order.direction {
        OrderSide::Buy | OrderSide::BuyLimit | OrderSide::BuyStop => next_bar_open + slippage,
        OrderSide::Sell | OrderSide::SellLimit | OrderSide::SellStop => next_bar_open - slippage,
    };

    FillEvent {
        symbol_index: order.symbol_index,
        direction: order.direction,
        quantity: order.quantity,
        fill_price,
        commission: config.commission_per_trade,
        slippage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buy_fill_pays_slippage_sell_fill_receives_less() {
        let config = ExecutionConfig {
            commission_per_trade: 1.5,
            slippage_points: 20,
        };
        let point_size = 1e-5;

        let buy = fill_market_order(
            OrderEvent {
                symbol_index: 0,
                kind: OrderKind::Mkt,
                direction: OrderSide::Buy,
                quantity: 0.1,
                price: None,
            },
            1.10000,
            point_size,
            config,
        );
        assert!((buy.fill_price - 1.10020).abs() < 1e-9);

        let sell = fill_market_order(
            OrderEvent {
                symbol_index: 0,
                kind: OrderKind::Mkt,
                direction: OrderSide::Sell,
                quantity: 0.1,
                price: None,
            },
            1.10000,
            point_size,
            config,
        );
        assert!((sell.fill_price - 1.09980).abs() < 1e-9);
    }

    #[test]
    fn zero_slippage_fills_exactly_at_next_bar_open() {
        let config = ExecutionConfig {
            commission_per_trade: 1.5,
            slippage_points: 0,
        };
        let fill = fill_market_order(
            OrderEvent {
                symbol_index: 0,
                kind: OrderKind::Mkt,
                direction: OrderSide::Buy,
                quantity: 0.1,
                price: None,
            },
            1.10000,
            1e-5,
            config,
        );
        assert_eq!(fill.fill_price, 1.10000);
        assert_eq!(fill.commission, 1.5);
    }
}
