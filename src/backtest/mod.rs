//! The event-driven backtest engine (`spec.md` §4.E), grounded on
//! `examples/barter-rs-barter-rs/src/engine/trader.rs`'s `Trader::run()` event-queue dispatch
//! loop, adapted from the teacher's per-market-tick two-level loop into the single flat
//! Market/Signal/Order/Fill queue the spec's Main loop algorithm describes.

pub mod data;
pub mod execution;
pub mod gateway;
pub mod portfolio;
pub mod summary;

use data::{Continuer, HistoricDataHandler, MarketGenerator};
use execution::{fill_market_order, ExecutionConfig, OrderEvent};
use gateway::BacktestTradingGateway;
use portfolio::Portfolio;
use summary::BacktestReport;

use crate::event::{BacktestEvent, Tx};
use crate::gateway::TradingGateway;
use crate::model::Bar;
use crate::strategy::Strategy;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::warn;

fn point_size(symbol: &str) -> f64 {
    if symbol.to_ascii_uppercase().contains("JPY") {
        0.001
    } else {
        0.00001
    }
}

/// Assembles one backtest run: the shared data/portfolio state behind the
/// [`BacktestTradingGateway`] strategies are constructed against, and the strategies themselves
/// once bound to a symbol (`spec.md` §4.E "Strategy parity" — the same strategy code used live
/// runs here unchanged against this gateway).
pub struct BacktestHarness {
    data: Arc<Mutex<HistoricDataHandler>>,
    portfolio: Arc<Mutex<Portfolio>>,
    signal_rx: mpsc::UnboundedReceiver<BacktestEvent>,
    strategies: HashMap<usize, Box<dyn Strategy>>,
    execution: ExecutionConfig,
    initial_cash: f64,
}

impl BacktestHarness {
    /// `bars_by_symbol` must already be time-sorted and restricted to the requested range
    /// (`spec.md` §4.E `DataHandler` "loads all bars from the store"). Returns the harness
    /// alongside the [`TradingGateway`] handle to construct strategy instances against, via a
    /// [`crate::strategy::registry::StrategyDescriptor`]'s factory.
    pub fn new(
        bars_by_symbol: Vec<(String, Vec<Bar>)>,
        initial_cash: f64,
        leverage: f64,
        execution: ExecutionConfig,
    ) -> (Self, Arc<dyn TradingGateway>) {
        let data = Arc::new(Mutex::new(HistoricDataHandler::new(bars_by_symbol)));
        let portfolio = Arc::new(Mutex::new(Portfolio::new(initial_cash, leverage)));
        let (tx, rx) = mpsc::unbounded_channel();

        let gateway: Arc<dyn TradingGateway> = Arc::new(BacktestTradingGateway::new(
            data.clone(),
            portfolio.clone(),
            Tx::new(tx),
        ));

        (
            Self {
                data,
                portfolio,
                signal_rx: rx,
                strategies: HashMap::new(),
                execution,
                initial_cash,
            },
            gateway,
        )
    }

    /// Binds a constructed strategy instance to the symbol it trades. Returns `false` if
    /// `symbol` was not one of the series the harness was built with.
    pub async fn bind_strategy(&mut self, symbol: &str, strategy: Box<dyn Strategy>) -> bool {
        let index = self.data.lock().await.symbol_index(symbol);
        let Some(index) = index else {
            return false;
        };
        self.strategies.insert(index, strategy);
        true
    }

    async fn bar(&self, symbol_index: usize) -> Option<Bar> {
        self.data.lock().await.latest_bar(symbol_index).copied()
    }

    /// Runs the Main loop (`spec.md` §4.E): prime with one `updateBars`, then drain the event
    /// queue, dispatching by type, refilling from the data handler whenever the queue empties
    /// and bars remain. Single-threaded and deterministic — every lock here is held only across
    /// a synchronous read/write, never across an `.await` into a strategy.
    pub async fn run(mut self) -> BacktestReport {
        let mut queue: VecDeque<BacktestEvent> = VecDeque::new();

        if let Some(first) = self.data.lock().await.update_bars() {
            queue.push_back(BacktestEvent::Market(first));
        }

        loop {
            let Some(event) = queue.pop_front() else {
                let exhausted = !self.data.lock().await.should_continue();
                if exhausted {
                    break;
                }
                if let Some(next) = self.data.lock().await.update_bars() {
                    queue.push_back(BacktestEvent::Market(next));
                }
                continue;
            };

            match event {
                BacktestEvent::Market(market) => {
                    let Some(bar) = self.bar(market.symbol_index).await else {
                        continue;
                    };

                    let mut portfolio = self.portfolio.lock().await;
                    portfolio.on_market(market.symbol_index, bar.close);
                    drop(portfolio);

                    if let Some(strategy) = self.strategies.get_mut(&market.symbol_index) {
                        if let Err(err) = strategy.on_bar(market.time).await {
                            warn!(symbol_index = market.symbol_index, %err, "strategy on_bar failed during backtest");
                        }
                    }

                    while let Ok(pending) = self.signal_rx.try_recv() {
                        queue.push_back(pending);
                    }
                }

                BacktestEvent::Signal(signal) => {
                    let time = self.bar(signal.symbol_index).await.map(|b| b.time).unwrap_or_else(chrono_utc_now);
                    let mut portfolio = self.portfolio.lock().await;
                    let order = portfolio.on_signal(signal, time);
                    drop(portfolio);
                    if let Some(mut order) = order {
                        // Capture the fill bar's open now, while the cursor is still on the
                        // signal's bar, so a Market event enqueued ahead of this Order in the
                        // queue can't advance the cursor before the fill price is read.
                        let fill_open = self.data.lock().await.peek_next_bar(order.symbol_index).map(|b| b.open);
                        let Some(fill_open) = fill_open else {
                            continue;
                        };
                        order.price = Some(fill_open);
                        queue.push_back(BacktestEvent::Order(order));
                    }
                }

                BacktestEvent::Order(order) => {
                    let Some(fill_open) = order.price else {
                        continue;
                    };
                    let symbol = self
                        .data
                        .lock()
                        .await
                        .symbol_name(order.symbol_index)
                        .unwrap_or_default()
                        .to_string();
                    let fill = fill_order(order, fill_open, &symbol, self.execution);
                    queue.push_back(BacktestEvent::Fill(fill));
                }

                BacktestEvent::Fill(fill) => {
                    let time = self.bar(fill.symbol_index).await.map(|b| b.time).unwrap_or_else(chrono_utc_now);
                    let mut portfolio = self.portfolio.lock().await;
                    portfolio.on_fill(fill, time);
                }
            }
        }

        let portfolio = self.portfolio.lock().await;
        BacktestReport::compute(self.initial_cash, portfolio.equity, &portfolio.trade_history)
    }
}

fn fill_order(order: OrderEvent, next_bar_open: f64, symbol: &str, config: ExecutionConfig) -> execution::FillEvent {
    fill_market_order(order, next_bar_open, point_size(symbol), config)
}

fn chrono_utc_now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::StrategyTaskError;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, Utc};

    fn bar(time: DateTime<Utc>, open: f64, close: f64) -> Bar {
        Bar {
            time,
            open,
            high: open.max(close),
            low: open.min(close),
            close,
            tick_volume: 1,
            spread: 0,
            real_volume: 0,
        }
    }

    /// Buys once on its first tick and never trades again, exercising the full
    /// Market→Signal→Order→Fill chain end to end through the harness.
    struct BuyOnceStrategy {
        gateway: Arc<dyn TradingGateway>,
        done: bool,
    }

    #[async_trait]
    impl Strategy for BuyOnceStrategy {
        async fn on_init(&mut self) -> Result<(), StrategyTaskError> {
            Ok(())
        }

        async fn on_bar(&mut self, _time: DateTime<Utc>) -> Result<(), StrategyTaskError> {
            if !self.done {
                self.done = true;
                self.gateway
                    .order_send("EURUSD", crate::model::trade::OrderSide::Buy, 0.1, "BuyOnce")
                    .await?;
            }
            Ok(())
        }

        async fn on_deinit(&mut self) {}
    }

    #[tokio::test]
    async fn a_single_buy_signal_produces_exactly_one_closed_or_open_position() {
        let t0 = Utc::now();
        let bars = vec![
            bar(t0, 1.1000, 1.1010),
            bar(t0 + Duration::hours(1), 1.1010, 1.1020),
            bar(t0 + Duration::hours(2), 1.1020, 1.1030),
            bar(t0 + Duration::hours(3), 1.1030, 1.1040),
        ];

        let (mut harness, gateway) = BacktestHarness::new(
            vec![("EURUSD".to_string(), bars)],
            10_000.0,
            100.0,
            ExecutionConfig {
                commission_per_trade: 1.5,
                slippage_points: 0,
            },
        );

        let strategy = Box::new(BuyOnceStrategy { gateway, done: false });
        assert!(harness.bind_strategy("EURUSD", strategy).await);

        let report = harness.run().await;
        assert_eq!(report.initial_cash, 10_000.0);
        // exactly one fill happened; equity moved away from a flat 10000 because of commission
        // and/or unrealized profit on the still-open position.
        assert!(report.final_equity != 10_000.0 || report.total_trades > 0);
    }

    #[tokio::test]
    async fn an_empty_series_reports_a_flat_run() {
        let (harness, _gateway) = BacktestHarness::new(
            vec![("EURUSD".to_string(), Vec::new())],
            5_000.0,
            50.0,
            ExecutionConfig {
                commission_per_trade: 1.0,
                slippage_points: 0,
            },
        );

        let report = harness.run().await;
        assert_eq!(report.total_trades, 0);
        assert_eq!(report.final_equity, 5_000.0);
    }
}
