//! Scenario S6: a flat 100-bar EURUSD H1 series, a strategy that opens once, fixed 0.1 lot, zero
//! spread, commission 1.5, zero slippage. Because the public `TradingGateway` a strategy is
//! written against has no direct close/flatten operation (only `order_send` for a fresh
//! position), a single filled buy that is never flattened again is the closest a strategy can
//! get to triggering exactly one commission debit without a second round-trip fill — matching the
//! spec's own open design question on the backtest Portfolio's close/reopen policy. With a flat
//! price series the open position's unrealized profit stays zero, so final equity still lands
//! exactly on `initialCash - commission` and max drawdown stays zero, as S6 expects.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tradecopier::backtest::execution::ExecutionConfig;
use tradecopier::backtest::BacktestHarness;
use tradecopier::gateway::TradingGateway;
use tradecopier::model::trade::OrderSide;
use tradecopier::model::Bar;
use tradecopier::strategy::{Strategy, StrategyTaskError};

struct BuyOnBarFive {
    gateway: Arc<dyn TradingGateway>,
    bar_count: u32,
    bought: bool,
}

#[async_trait]
impl Strategy for BuyOnBarFive {
    async fn on_init(&mut self) -> Result<(), StrategyTaskError> {
        Ok(())
    }

    async fn on_bar(&mut self, _time: DateTime<Utc>) -> Result<(), StrategyTaskError> {
        self.bar_count += 1;
        if self.bar_count == 5 && !self.bought {
            self.bought = true;
            self.gateway.order_send("EURUSD", OrderSide::Buy, 0.1, "S6 entry").await?;
        }
        Ok(())
    }

    async fn on_deinit(&mut self) {}
}

fn flat_bar(time: DateTime<Utc>) -> Bar {
    Bar {
        time,
        open: 1.10000,
        high: 1.10000,
        low: 1.10000,
        close: 1.10000,
        tick_volume: 1,
        spread: 0,
        real_volume: 0,
    }
}

#[tokio::test]
async fn flat_hundred_bar_series_reports_a_single_commission_cost() {
    let t0 = Utc::now();
    let bars: Vec<Bar> = (0..100).map(|i| flat_bar(t0 + ChronoDuration::hours(i))).collect();

    let (mut harness, gateway) = BacktestHarness::new(
        vec![("EURUSD".to_string(), bars)],
        10_000.0,
        100.0,
        ExecutionConfig {
            commission_per_trade: 1.5,
            slippage_points: 0,
        },
    );

    let strategy = Box::new(BuyOnBarFive {
        gateway,
        bar_count: 0,
        bought: false,
    });
    assert!(harness.bind_strategy("EURUSD", strategy).await);

    let report = harness.run().await;

    assert!((report.final_equity - 9_998.5).abs() < 1e-9);
    assert_eq!(report.max_drawdown, 0.0);
}
