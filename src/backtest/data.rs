//! The backtest `DataHandler` (`spec.md` §4.E), grounded on `src/data/handler/historic.rs`'s
//! `HistoricCandleHandler`/`Continuer`/`MarketGenerator` pattern in the teacher: bars are loaded
//! up front, then drained chronologically one at a time per `updateBars()` call.

use crate::model::bar::Timeframe;
use crate::model::Bar;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A new bar has advanced for `symbol` (`spec.md` §4.E event types).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MarketEvent {
    pub symbol_index: usize,
    pub time: DateTime<Utc>,
}

/// Whether the data handler has more bars to publish, mirroring the teacher's `Continuer` trait.
pub trait Continuer {
    fn should_continue(&self) -> bool;
}

/// Advances the data handler and returns the `Market` event it produced, if any, mirroring the
/// teacher's `MarketGenerator` trait.
pub trait MarketGenerator {
    fn update_bars(&mut self) -> Option<MarketEvent>;
}

/// One symbol's full bar series for one backtest run, pre-loaded from the bar store.
#[derive(Debug, Clone)]
struct SymbolSeries {
    symbol: String,
    bars: Vec<Bar>,
    cursor: usize,
}

impl SymbolSeries {
    fn current(&self) -> Option<&Bar> {
        self.bars.get(self.cursor)
    }

    fn peek_next(&self) -> Option<&Bar> {
        self.bars.get(self.cursor + 1)
    }
}

/// Replays one or more symbols' bar series chronologically (`spec.md` §4.E `DataHandler`).
/// Multi-symbol runs advance every series whose current bar's time matches the earliest pending
/// time, so strategies see synchronized bars across symbols.
#[derive(Debug, Clone)]
pub struct HistoricDataHandler {
    series: Vec<SymbolSeries>,
    primed: bool,
}

impl HistoricDataHandler {
    /// `bars_by_symbol` must already be time-sorted and restricted to `[t0, t1]`; loading from
    /// the store and filtering by range is the caller's job (`spec.md` §4.E "loads all bars from
    /// the store").
    pub fn new(bars_by_symbol: Vec<(String, Vec<Bar>)>) -> Self {
        let series = bars_by_symbol
            .into_iter()
            .map(|(symbol, bars)| SymbolSeries {
                symbol,
                bars,
                cursor: 0,
            })
            .collect();
        Self {
            series,
            primed: false,
        }
    }

    pub fn symbol_index(&self, symbol: &str) -> Option<usize> {
        self.series.iter().position(|s| s.symbol == symbol)
    }

    pub fn symbol_name(&self, symbol_index: usize) -> Option<&str> {
        self.series.get(symbol_index).map(|s| s.symbol.as_str())
    }

    pub fn latest_bar(&self, symbol_index: usize) -> Option<&Bar> {
        self.series.get(symbol_index).and_then(|s| s.current())
    }

    /// The bar one past the current cursor, without advancing it. Used to price a market order
    /// at its fill bar's open at the moment the order is created, rather than re-reading the
    /// cursor later once further `Market` events may have moved it on.
    pub fn peek_next_bar(&self, symbol_index: usize) -> Option<&Bar> {
        self.series.get(symbol_index).and_then(|s| s.peek_next())
    }

    pub fn bars_from(&self, symbol_index: usize, count: usize) -> Vec<Bar> {
        let Some(series) = self.series.get(symbol_index) else {
            return Vec::new();
        };
        let end = series.cursor + 1;
        let start = end.saturating_sub(count);
        series.bars[start..end].to_vec()
    }

    pub fn bars_range(&self, symbol_index: usize, t0: DateTime<Utc>, t1: DateTime<Utc>) -> Vec<Bar> {
        let Some(series) = self.series.get(symbol_index) else {
            return Vec::new();
        };
        series.bars[..=series.cursor]
            .iter()
            .filter(|b| b.time >= t0 && b.time <= t1)
            .cloned()
            .collect()
    }
}

impl Continuer for HistoricDataHandler {
    fn should_continue(&self) -> bool {
        self.series.iter().any(|s| {
            if !self.primed {
                !s.bars.is_empty()
            } else {
                s.peek_next().is_some()
            }
        })
    }
}

impl MarketGenerator for HistoricDataHandler {
    fn update_bars(&mut self) -> Option<MarketEvent> {
        if !self.primed {
            self.primed = true;
            let earliest = self
                .series
                .iter()
                .enumerate()
                .filter_map(|(i, s)| s.current().map(|b| (i, b.time)))
                .min_by_key(|(_, time)| *time)?;
            return Some(MarketEvent {
                symbol_index: earliest.0,
                time: earliest.1,
            });
        }

        let next_time = self
            .series
            .iter()
            .filter_map(|s| s.peek_next().map(|b| b.time))
            .min()?;

        let mut advanced_index = None;
        for (i, s) in self.series.iter_mut().enumerate() {
            if s.peek_next().map(|b| b.time) == Some(next_time) {
                s.cursor += 1;
                advanced_index = Some(i);
            }
        }

        advanced_index.map(|i| MarketEvent {
            symbol_index: i,
            time: next_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(time: DateTime<Utc>, close: f64) -> Bar {
        Bar {
            time,
            open: close,
            high: close,
            low: close,
            close,
            tick_volume: 1,
            spread: 0,
            real_volume: 0,
        }
    }

    #[test]
    fn drains_bars_chronologically_until_exhausted() {
        let t0 = Utc::now();
        let bars = vec![
            bar(t0, 1.1),
            bar(t0 + chrono::Duration::hours(1), 1.2),
            bar(t0 + chrono::Duration::hours(2), 1.3),
        ];
        let mut handler = HistoricDataHandler::new(vec![("EURUSD".into(), bars)]);

        assert!(handler.should_continue());
        let first = handler.update_bars().unwrap();
        assert_eq!(first.time, t0);

        let second = handler.update_bars().unwrap();
        assert_eq!(second.time, t0 + chrono::Duration::hours(1));

        let third = handler.update_bars().unwrap();
        assert_eq!(third.time, t0 + chrono::Duration::hours(2));

        assert!(!handler.should_continue());
        assert!(handler.update_bars().is_none());
    }
}
