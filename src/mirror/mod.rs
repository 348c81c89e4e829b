//! The Mirror Engine (`spec.md` §4.C): one follower's reconciliation cycle against its master's
//! trade snapshot. Runs entirely inside the Terminal Gate's critical section — the caller
//! ([`crate::supervisor`]) holds the adapter guard for the whole sequence, so every function
//! here takes `&mut impl TerminalAdapter` directly rather than going back through the async
//! [`crate::gate::TerminalGate`].

mod error;

pub use error::MirrorError;

use crate::gate::{OrderRequest, OrderRequestAction, TerminalAdapter};
use crate::model::follower::{CopyMode, FollowerConfig, VolumeMode};
use crate::model::trade::{mirror_close_comment, mirror_open_comment};
use crate::model::{FollowerTrade, MasterTrade, OrderSide};
use indexmap::IndexMap;
use tracing::warn;

/// Tally of what one follower cycle did, for logging and tests (`spec.md` §4.C).
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MirrorCycleReport {
    pub closed: u32,
    pub modified: u32,
    pub opened: u32,
    pub skipped_opens: u32,
}

/// Builds `mirrored: masterTicket → followerTrade` from a follower's own positions + orders
/// (`spec.md` §4.C step 1).
fn build_mirrored_index(
    follower_rows: Vec<FollowerTrade>,
    follower_magic: i64,
) -> IndexMap<i64, FollowerTrade> {
    let mut mirrored = IndexMap::new();
    for row in follower_rows {
        if let Some(master_ticket) = row.mirrored_master_ticket(follower_magic) {
            mirrored.insert(master_ticket, row);
        }
    }
    mirrored
}

/// Resolves the volume a follower should trade for one master ticket (`spec.md` §4.C "Volume
/// resolution"). Returns `None` when the clamped result falls below the symbol's minimum, in
/// which case the caller must skip the ticket.
fn resolve_volume(
    follower_config: &FollowerConfig,
    master_volume: f64,
    follower_equity: f64,
    master_equity: f64,
    symbol_info: &crate::model::SymbolInfo,
) -> Option<f64> {
    let raw = match follower_config.volume_mode {
        VolumeMode::Same => master_volume,
        VolumeMode::Fixed => {
            if follower_config.fixed_lot > 0.0 {
                follower_config.fixed_lot
            } else {
                0.01
            }
        }
        VolumeMode::EquityRatio => {
            if follower_equity > 0.0 && master_equity > 0.0 {
                master_volume * (follower_equity / master_equity)
            } else {
                master_volume
            }
        }
    };
    symbol_info.clamp_volume(raw)
}

/// Applies the forward/reverse SL/TP swap rule (`spec.md` §4.C step 3, open sweep).
fn expected_sl_tp(follower_config: &FollowerConfig, master: &MasterTrade) -> (f64, f64) {
    match follower_config.copy_mode {
        CopyMode::Forward => (master.sl, master.tp),
        CopyMode::Reverse => (master.tp, master.sl),
    }
}

/// Applies the reverse side mapping, or passes the side through unchanged in forward mode
/// (`spec.md` §4.C open sweep). Returns `None` when reverse mode has no defined mapping.
fn mapped_side(follower_config: &FollowerConfig, master_side: OrderSide) -> Option<OrderSide> {
    match follower_config.copy_mode {
        CopyMode::Forward => Some(master_side),
        CopyMode::Reverse => master_side.reverse_mapped(),
    }
}

/// Runs one follower's full reconciliation cycle: close sweep, SL/TP reconciliation, open sweep
/// (`spec.md` §4.C). `master_trades` must already be restricted to the one master this follower
/// tracks. Ordering between the three sweeps is load-bearing (`spec.md` §5) and must not change.
pub fn run_follower_cycle<A: TerminalAdapter>(
    adapter: &mut A,
    follower_config: &FollowerConfig,
    master_trades: &[MasterTrade],
    follower_equity: f64,
    master_equity: f64,
    follower_margin_free: f64,
) -> Result<MirrorCycleReport, MirrorError> {
    let mut report = MirrorCycleReport::default();

    let follower_rows: Vec<FollowerTrade> = adapter
        .positions_get(None, Some(follower_config.magic))?
        .into_iter()
        .chain(adapter.orders_get(None)?)
        .map(FollowerTrade::from)
        .filter(|row| row.magic == follower_config.magic)
        .collect();

    let mirrored = build_mirrored_index(follower_rows, follower_config.magic);

    let master_by_ticket: IndexMap<i64, &MasterTrade> =
        master_trades.iter().map(|t| (t.ticket, t)).collect();

    // Close sweep (`spec.md` §4.C step 2): mirrored tickets whose master is gone.
    for (master_ticket, follower_trade) in &mirrored {
        if master_by_ticket.contains_key(master_ticket) {
            continue;
        }

        if follower_trade.side.is_position() {
            let Some(tick) = adapter.symbol_info_tick(&follower_trade.symbol) else {
                warn!(symbol = %follower_trade.symbol, "no tick available, deferring close to next cycle");
                continue;
            };
            let opposite = follower_trade.side.opposite_position_side();
            let price = if opposite.is_buy_family() { tick.ask } else { tick.bid };
            let request = OrderRequest {
                price: Some(price),
                ..OrderRequest::market_close(
                    follower_trade.ticket,
                    &follower_trade.symbol,
                    opposite,
                    follower_trade.volume,
                    follower_config.magic,
                    mirror_close_comment(*master_ticket),
                    follower_config.slippage_points,
                )
            };
            let result = adapter.order_send(request);
            if result.retcode.is_success() {
                report.closed += 1;
            } else {
                warn!(ticket = follower_trade.ticket, comment = %result.comment, "close sweep order rejected, retrying next cycle");
            }
        } else {
            let result = adapter.order_send(OrderRequest::remove_pending(
                follower_trade.ticket,
                &follower_trade.symbol,
                follower_trade.side,
            ));
            if result.retcode.is_success() {
                report.closed += 1;
            } else {
                warn!(ticket = follower_trade.ticket, comment = %result.comment, "pending removal rejected, retrying next cycle");
            }
        }
    }

    // SL/TP reconciliation (`spec.md` §4.C step 3): mirrored tickets whose master still exists.
    for (master_ticket, follower_trade) in &mirrored {
        let Some(master) = master_by_ticket.get(master_ticket) else {
            continue;
        };
        let (expected_sl, expected_tp) = expected_sl_tp(follower_config, master);
        if (follower_trade.sl - expected_sl).abs() <= 1e-9
            && (follower_trade.tp - expected_tp).abs() <= 1e-9
        {
            continue;
        }

        let result = adapter.order_send(OrderRequest::modify_sl_tp(
            follower_trade.ticket,
            &follower_trade.symbol,
            expected_sl,
            expected_tp,
        ));
        if result.retcode.is_success() {
            report.modified += 1;
        } else {
            warn!(ticket = follower_trade.ticket, comment = %result.comment, "sl/tp modify rejected, retrying next cycle");
        }
    }

    // Open sweep (`spec.md` §4.C step 4): master tickets with no mirror yet.
    for master in master_trades {
        if mirrored.contains_key(&master.ticket) {
            continue;
        }
        if master.magic == follower_config.magic {
            continue; // prevents self-echo loops
        }

        let Some(side) = mapped_side(follower_config, master.side) else {
            report.skipped_opens += 1;
            continue;
        };

        let follower_symbol = follower_config.resolve_symbol(&master.symbol);

        if !adapter.symbol_select(&follower_symbol, true) {
            warn!(symbol = %follower_symbol, "symbol_select failed, skipping open");
            report.skipped_opens += 1;
            continue;
        }

        let Some(symbol_info) = adapter.symbol_info(&follower_symbol) else {
            report.skipped_opens += 1;
            continue;
        };

        let Some(volume) =
            resolve_volume(follower_config, master.volume, follower_equity, master_equity, &symbol_info)
        else {
            report.skipped_opens += 1;
            continue;
        };

        if follower_config.margin_check_enabled {
            let action = if side.is_position() {
                OrderRequestAction::Deal
            } else {
                OrderRequestAction::Pending
            };
            if let Some(required_margin) =
                adapter.order_calc_margin(action, &follower_symbol, volume, Some(master.price_open))
            {
                if required_margin > follower_margin_free {
                    warn!(
                        ticket = master.ticket,
                        required_margin,
                        follower_margin_free,
                        "pre-trade margin check failed, skipping open"
                    );
                    report.skipped_opens += 1;
                    continue;
                }
            }
        }

        let (sl, tp) = expected_sl_tp(follower_config, master);
        let comment = mirror_open_comment(master.ticket);

        let request = if side.is_position() {
            let Some(tick) = adapter.symbol_info_tick(&follower_symbol) else {
                report.skipped_opens += 1;
                continue;
            };
            let price = if side.is_buy_family() { tick.ask } else { tick.bid };
            OrderRequest {
                sl,
                tp,
                price: Some(price),
                ..OrderRequest::market_open(
                    &follower_symbol,
                    side,
                    volume,
                    follower_config.magic,
                    comment,
                    follower_config.slippage_points,
                )
            }
        } else {
            OrderRequest {
                sl,
                tp,
                ..OrderRequest::pending_open(
                    &follower_symbol,
                    side,
                    volume,
                    master.price_open,
                    follower_config.magic,
                    comment,
                    follower_config.slippage_points,
                )
            }
        };

        let result = adapter.order_send(request);
        if result.retcode.is_success() {
            report.opened += 1;
        } else {
            warn!(ticket = master.ticket, comment = %result.comment, "open sweep order rejected, retrying next cycle");
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::test_util::FakeTerminal;
    use crate::gate::{PositionRow, RetCode, Tick};
    use crate::model::symbol::TradeMode;
    use crate::model::SymbolInfo;

    fn eurusd_info() -> SymbolInfo {
        SymbolInfo {
            point: 0.00001,
            digits: 5,
            volume_min: 0.01,
            volume_max: 100.0,
            volume_step: 0.01,
            trade_mode: TradeMode::Full,
        }
    }

    fn follower_config() -> FollowerConfig {
        FollowerConfig {
            enabled: true,
            follow_master_id: crate::model::AccountId::master(1),
            magic: 42,
            copy_mode: CopyMode::Forward,
            volume_mode: VolumeMode::Same,
            fixed_lot: 0.01,
            default_symbol_rule: crate::model::SymbolRuleKind::None,
            default_symbol_text: String::new(),
            slippage_points: 200,
            symbol_overrides: Default::default(),
            margin_check_enabled: false,
        }
    }

    #[test]
    fn close_sweep_flattens_a_mirror_whose_master_ticket_is_gone() {
        let mut terminal = FakeTerminal::new()
            .with_symbol("EURUSD", eurusd_info())
            .with_tick(
                "EURUSD",
                Tick {
                    bid: 1.1000,
                    ask: 1.1002,
                    time: chrono::Utc::now(),
                },
            )
            .with_position(PositionRow {
                ticket: 501,
                symbol: "EURUSD".into(),
                side: OrderSide::Buy,
                volume: 0.1,
                price_open: 1.0950,
                sl: 0.0,
                tp: 0.0,
                magic: 42,
                profit: 0.0,
                comment: "F 1001".into(),
            });

        let report = run_follower_cycle(&mut terminal, &follower_config(), &[], 1000.0, 1000.0, 100_000.0).unwrap();
        assert_eq!(report.closed, 1);
        assert!(terminal.positions.is_empty());
    }

    #[test]
    fn open_sweep_is_idempotent_once_a_mirror_exists() {
        let master = MasterTrade {
            ticket: 2001,
            symbol: "EURUSD".into(),
            side: OrderSide::Buy,
            volume: 0.5,
            price_open: 1.0900,
            sl: 1.0800,
            tp: 1.1000,
            magic: 7,
        };

        let mut terminal = FakeTerminal::new()
            .with_symbol("EURUSD", eurusd_info())
            .with_tick(
                "EURUSD",
                Tick {
                    bid: 1.1000,
                    ask: 1.1002,
                    time: chrono::Utc::now(),
                },
            );

        // First cycle opens the mirror.
        let first = run_follower_cycle(&mut terminal, &follower_config(), std::slice::from_ref(&master), 1000.0, 1000.0, 100_000.0).unwrap();
        assert_eq!(first.opened, 1);
        assert_eq!(terminal.positions.len(), 1);
        assert_eq!(terminal.positions[0].comment, "F 2001");

        // Second cycle, unchanged master state: comment already present so it counts as
        // mirrored, and the open sweep emits zero new orders (`spec.md` §8 round-trip property).
        terminal.next_retcode = RetCode::Done;
        let second = run_follower_cycle(&mut terminal, &follower_config(), std::slice::from_ref(&master), 1000.0, 1000.0, 100_000.0).unwrap();
        assert_eq!(second.opened, 0);
        assert_eq!(terminal.positions.len(), 1);
    }

    #[test]
    fn self_echo_tickets_sharing_the_follower_magic_are_never_mirrored() {
        let master = MasterTrade {
            ticket: 3001,
            symbol: "EURUSD".into(),
            side: OrderSide::Buy,
            volume: 0.1,
            price_open: 1.09,
            sl: 0.0,
            tp: 0.0,
            magic: 42, // same as follower_config().magic
        };
        let mut terminal = FakeTerminal::new().with_symbol("EURUSD", eurusd_info());

        let report = run_follower_cycle(&mut terminal, &follower_config(), &[master], 1000.0, 1000.0, 100_000.0).unwrap();
        assert_eq!(report.opened, 0);
        assert!(terminal.positions.is_empty());
    }
}
