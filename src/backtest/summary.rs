//! The end-of-run backtest report (`spec.md` §4.E "At end, emit a report"), grounded on the
//! teacher's `src/statistic/summary/trading.rs` `TablePrinter` convention (a `prettytable::Table`
//! with `printstd()`), simplified to the metric set the spec names rather than the teacher's full
//! Sharpe/Sortino/Calmar tear sheet.

use super::portfolio::ClosedTrade;
use prettytable::Table;

/// Computed once from a finished run's cash/equity and closed-trade history
/// (`spec.md` §4.E "Main loop", final paragraph).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BacktestReport {
    pub initial_cash: f64,
    pub final_equity: f64,
    pub total_return_pct: f64,
    pub total_trades: usize,
    pub win_rate: f64,
    pub average_win: f64,
    pub average_loss: f64,
    pub profit_factor: f64,
    pub peak_equity: f64,
    pub max_drawdown: f64,
}

impl BacktestReport {
    /// `trade_history` is the Portfolio's realized trades in close order; `equity_curve` is the
    /// post-trade running equity after each one, used for the peak/drawdown calculation
    /// (`spec.md` §4.E "computed from the realized-trade cumulative P&L curve").
    pub fn compute(initial_cash: f64, final_equity: f64, trade_history: &[ClosedTrade]) -> Self {
        let total_trades = trade_history.len();
        let wins: Vec<f64> = trade_history
            .iter()
            .map(|t| t.profit - t.commission)
            .filter(|&pnl| pnl > 0.0)
            .collect();
        let losses: Vec<f64> = trade_history
            .iter()
            .map(|t| t.profit - t.commission)
            .filter(|&pnl| pnl <= 0.0)
            .collect();

        let win_rate = if total_trades > 0 {
            wins.len() as f64 / total_trades as f64
        } else {
            0.0
        };
        let average_win = if wins.is_empty() {
            0.0
        } else {
            wins.iter().sum::<f64>() / wins.len() as f64
        };
        let average_loss = if losses.is_empty() {
            0.0
        } else {
            losses.iter().sum::<f64>() / losses.len() as f64
        };

        let gross_profit: f64 = wins.iter().sum();
        let gross_loss: f64 = losses.iter().sum::<f64>().abs();
        let profit_factor = if gross_loss > 0.0 {
            gross_profit / gross_loss
        } else if gross_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let (peak_equity, max_drawdown) = equity_curve_drawdown(initial_cash, trade_history);

        let total_return_pct = if initial_cash != 0.0 {
            (final_equity - initial_cash) / initial_cash * 100.0
        } else {
            0.0
        };

        Self {
            initial_cash,
            final_equity,
            total_return_pct,
            total_trades,
            win_rate,
            average_win,
            average_loss,
            profit_factor,
            peak_equity,
            max_drawdown,
        }
    }

    pub fn print(&self) {
        let mut table = Table::new();
        table.set_titles(row!["Metric", "Value"]);
        table.add_row(row!["Initial cash", format!("{:.2}", self.initial_cash)]);
        table.add_row(row!["Final equity", format!("{:.2}", self.final_equity)]);
        table.add_row(row!["Total return %", format!("{:.2}", self.total_return_pct)]);
        table.add_row(row!["Total trades", self.total_trades.to_string()]);
        table.add_row(row!["Win rate", format!("{:.2}%", self.win_rate * 100.0)]);
        table.add_row(row!["Average win", format!("{:.2}", self.average_win)]);
        table.add_row(row!["Average loss", format!("{:.2}", self.average_loss)]);
        table.add_row(row!["Profit factor", format!("{:.3}", self.profit_factor)]);
        table.add_row(row!["Peak equity", format!("{:.2}", self.peak_equity)]);
        table.add_row(row!["Max drawdown", format!("{:.2}", self.max_drawdown)]);
        table.printstd();
    }
}

/// Walks the realized-trade cumulative equity curve (`initial_cash` plus running `profit -
/// commission`) to find the running peak and largest peak-to-trough drop.
fn equity_curve_drawdown(initial_cash: f64, trade_history: &[ClosedTrade]) -> (f64, f64) {
    let mut running = initial_cash;
    let mut peak = initial_cash;
    let mut max_drawdown = 0.0;

    for trade in trade_history {
        running += trade.profit - trade.commission;
        if running > peak {
            peak = running;
        }
        let drawdown = peak - running;
        if drawdown > max_drawdown {
            max_drawdown = drawdown;
        }
    }

    (peak, max_drawdown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::trade::OrderSide;
    use chrono::Utc;

    fn trade(profit: f64, commission: f64) -> ClosedTrade {
        ClosedTrade {
            symbol_index: 0,
            direction: OrderSide::Buy,
            volume: 0.1,
            price_open: 1.1,
            price_close: 1.1,
            profit,
            commission,
            open_time: Utc::now(),
            close_time: Utc::now(),
        }
    }

    #[test]
    fn a_single_losing_trade_matches_the_flat_series_scenario() {
        let report = BacktestReport::compute(10_000.0, 9_998.5, &[trade(0.0, 1.5)]);
        assert_eq!(report.total_trades, 1);
        assert_eq!(report.win_rate, 0.0);
        assert!((report.final_equity - 9998.5).abs() < 1e-9);
        assert_eq!(report.max_drawdown, 1.5);
    }

    #[test]
    fn profit_factor_is_zero_with_no_trades() {
        let report = BacktestReport::compute(10_000.0, 10_000.0, &[]);
        assert_eq!(report.profit_factor, 0.0);
        assert_eq!(report.max_drawdown, 0.0);
    }
}
