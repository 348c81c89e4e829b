//! End-to-end Mirror Engine scenarios against a scripted terminal, covering the reverse/suffix
//! open and the SL/TP reconciliation cases that the crate's own `mirror` unit tests don't already
//! exercise (forward-mirror-open and close-propagation are covered there).

use chrono::Utc;
use tradecopier::gate::test_util::FakeTerminal;
use tradecopier::gate::{PositionRow, Tick};
use tradecopier::mirror::run_follower_cycle;
use tradecopier::model::follower::{CopyMode, FollowerConfig, SymbolRuleKind, VolumeMode};
use tradecopier::model::symbol::TradeMode;
use tradecopier::model::{AccountId, MasterTrade, OrderSide, SymbolInfo};

fn eurusd_m_info() -> SymbolInfo {
    SymbolInfo {
        point: 0.00001,
        digits: 5,
        volume_min: 0.01,
        volume_max: 100.0,
        volume_step: 0.01,
        trade_mode: TradeMode::Full,
    }
}

fn reverse_suffix_follower() -> FollowerConfig {
    FollowerConfig {
        enabled: true,
        follow_master_id: AccountId::master(1),
        magic: 42,
        copy_mode: CopyMode::Reverse,
        volume_mode: VolumeMode::Fixed,
        fixed_lot: 0.20,
        default_symbol_rule: SymbolRuleKind::Suffix,
        default_symbol_text: ".m".into(),
        slippage_points: 200,
        symbol_overrides: Default::default(),
        margin_check_enabled: false,
    }
}

/// A pending `BuyLimit` master order mirrors as a reverse-mapped `SellStop` on the suffixed
/// follower symbol, at the follower's fixed lot, with SL/TP swapped.
#[tokio::test]
async fn reverse_mode_with_suffix_rule_opens_the_mapped_pending_order() {
    let master = MasterTrade {
        ticket: 7100,
        symbol: "EURUSD".into(),
        side: OrderSide::BuyLimit,
        volume: 0.50,
        price_open: 1.0900,
        sl: 1.0850,
        tp: 1.0970,
        magic: 1,
    };

    let mut terminal = FakeTerminal::new().with_symbol("EURUSD.m", eurusd_m_info());
    let config = reverse_suffix_follower();

    let report = run_follower_cycle(&mut terminal, &config, &[master], 1000.0, 1000.0, 100_000.0).unwrap();

    assert_eq!(report.opened, 1);
    assert_eq!(terminal.positions.len(), 1);

    let opened = &terminal.sent_orders[0];
    assert_eq!(opened.symbol, "EURUSD.m");
    assert_eq!(opened.side, OrderSide::SellStop);
    assert_eq!(opened.volume, 0.20);
    assert_eq!(opened.price, Some(1.0900));
    assert_eq!(opened.sl, 1.0970);
    assert_eq!(opened.tp, 1.0850);
    assert_eq!(opened.comment, "F 7100");
}

/// Once mirrored, editing the master's SL/TP produces exactly one `SLTP` modify under the
/// reverse mapping, and a following cycle with the same state produces none.
#[tokio::test]
async fn reverse_mode_sl_tp_edit_produces_exactly_one_modify_then_goes_quiet() {
    let config = reverse_suffix_follower();
    let mut terminal = FakeTerminal::new()
        .with_symbol("EURUSD.m", eurusd_m_info())
        .with_tick(
            "EURUSD.m",
            Tick {
                bid: 1.0999,
                ask: 1.1001,
                time: Utc::now(),
            },
        )
        .with_position(PositionRow {
            ticket: 501,
            symbol: "EURUSD.m".into(),
            side: OrderSide::Sell,
            volume: 0.20,
            price_open: 1.1000,
            // stale: reflects some earlier master sl/tp, not the (1.2000, 1.2100) edit below
            sl: 1.1200,
            tp: 1.1000,
            magic: 42,
            profit: 0.0,
            comment: "F 8002".into(),
        });

    let master = MasterTrade {
        ticket: 8002,
        symbol: "EURUSD".into(),
        side: OrderSide::Sell,
        volume: 0.20,
        price_open: 1.1000,
        sl: 1.2000,
        tp: 1.2100,
        magic: 1,
    };

    let first = run_follower_cycle(&mut terminal, &config, &[master.clone()], 1000.0, 1000.0, 100_000.0).unwrap();
    assert_eq!(first.modified, 1);
    assert_eq!(first.opened, 0);
    assert_eq!(first.closed, 0);

    let modify = terminal.sent_orders.last().unwrap();
    assert_eq!(modify.sl, 1.2100);
    assert_eq!(modify.tp, 1.2000);

    // the follower row now reflects the modify the Fake applied via order_send's sl/tp path...
    // but FakeTerminal's order_send only tracks open/close by ticket, not SL/TP edits in place,
    // so the test re-seeds the follower row with the now-reconciled values to assert idempotence.
    terminal.positions[0].sl = 1.2100;
    terminal.positions[0].tp = 1.2000;

    let second = run_follower_cycle(&mut terminal, &config, &[master], 1000.0, 1000.0, 100_000.0).unwrap();
    assert_eq!(second.modified, 0);
}
