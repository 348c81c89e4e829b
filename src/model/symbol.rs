use serde::{Deserialize, Serialize};

/// Broker trade permission for a symbol, as surfaced by `symbol_info` (`spec.md` §3).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum TradeMode {
    Disabled,
    LongOnly,
    ShortOnly,
    Full,
}

/// Symbol metadata the Mirror Engine needs to clamp volume and resolve point size
/// (`spec.md` §3).
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub point: f64,
    pub digits: u32,
    pub volume_min: f64,
    pub volume_max: f64,
    pub volume_step: f64,
    pub trade_mode: TradeMode,
}

impl SymbolInfo {
    /// Clamps a desired volume into `[volume_min, volume_max]` on a `volume_step` grid, per
    /// `spec.md` §4.C "Volume resolution". Returns `None` if the rounded volume falls below
    /// `volume_min`, signalling the caller should skip the ticket.
    pub fn clamp_volume(&self, volume: f64) -> Option<f64> {
        if volume < self.volume_min - 1e-9 {
            return None;
        }

        let clamped = volume.min(self.volume_max);
        let stepped = if self.volume_step > 0.0 {
            (clamped / self.volume_step).round() * self.volume_step
        } else {
            clamped
        };

        if stepped < self.volume_min - 1e-9 {
            None
        } else {
            Some(stepped)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eurusd() -> SymbolInfo {
        SymbolInfo {
            point: 0.00001,
            digits: 5,
            volume_min: 0.01,
            volume_max: 100.0,
            volume_step: 0.01,
            trade_mode: TradeMode::Full,
        }
    }

    #[test]
    fn clamps_to_step_grid_within_bounds() {
        let info = eurusd();
        assert_eq!(info.clamp_volume(0.123), Some(0.12));
        assert_eq!(info.clamp_volume(1000.0), Some(100.0));
    }

    #[test]
    fn below_minimum_after_clamp_is_skipped() {
        let info = SymbolInfo {
            volume_min: 0.1,
            ..eurusd()
        };
        assert_eq!(info.clamp_volume(0.04), None);
    }
}
