//! Command execution against the Terminal Gate (`spec.md` §4.G step 1): the commands that act
//! directly on one or all accounts' own positions, independent of the Mirror Engine's per-cycle
//! reconciliation against a master. Each function connects under the target account's own
//! credentials, mirroring the connect-then-act shape of `crate::supervisor`'s per-account steps.

use crate::gate::{OrderRequest, PositionRow, TerminalAdapter, TerminalGate};
use crate::model::Account;
use std::time::Duration;
use tracing::warn;

const COMMAND_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

async fn connect<A: TerminalAdapter>(gate: &TerminalGate<A>, account: &Account) -> bool {
    let creds = &account.credentials;
    let outcome = gate
        .connect(creds.login, &creds.password, &creds.server, &creds.terminal_path, COMMAND_CONNECT_TIMEOUT)
        .await;
    outcome == crate::gate::ConnectOutcome::Connected
}

async fn close_one_position<A: TerminalAdapter>(gate: &TerminalGate<A>, position: &PositionRow) {
    let Some(tick) = gate.symbol_info_tick(&position.symbol).await else {
        warn!(ticket = position.ticket, "no tick available, cannot close");
        return;
    };
    let opposite = position.side.opposite_position_side();
    let price = if opposite.is_buy_family() { tick.ask } else { tick.bid };
    let request = OrderRequest {
        price: Some(price),
        ..OrderRequest::market_close(
            position.ticket,
            &position.symbol,
            opposite,
            position.volume,
            position.magic,
            "manual close",
            200,
        )
    };
    let result = gate.order_send(request).await;
    if !result.retcode.is_success() {
        warn!(ticket = position.ticket, comment = %result.comment, "manual close rejected");
    }
}

async fn remove_one_pending<A: TerminalAdapter>(gate: &TerminalGate<A>, order: &PositionRow) {
    let result = gate.order_send(OrderRequest::remove_pending(order.ticket, &order.symbol, order.side)).await;
    if !result.retcode.is_success() {
        warn!(ticket = order.ticket, comment = %result.comment, "pending removal rejected");
    }
}

/// Closes every open position and pending order under `account`'s own credentials
/// (`spec.md` §4.G `closeAllForcefully`/`stopAndClose`). A connect failure is logged and the
/// account is left untouched — the next Core Loop tick retries the connect through the
/// Supervisor as usual.
pub async fn close_all_for_account<A: TerminalAdapter>(gate: &TerminalGate<A>, account: &Account) {
    if !connect(gate, account).await {
        warn!(account = %account.id, "closeAllForcefully connect failed");
        return;
    }

    let positions = gate.positions_get(None, None).await.unwrap_or_default();
    let orders = gate.orders_get(None).await.unwrap_or_default();

    for position in &positions {
        close_one_position(gate, position).await;
    }
    for order in &orders {
        remove_one_pending(gate, order).await;
    }

    gate.shutdown().await;
}

/// Closes exactly one ticket under `account`'s credentials (`spec.md` §4.G `closeSingleTrade`).
pub async fn close_single_trade<A: TerminalAdapter>(gate: &TerminalGate<A>, account: &Account, ticket: i64) {
    if !connect(gate, account).await {
        warn!(account = %account.id, ticket, "closeSingleTrade connect failed");
        return;
    }

    let positions = gate.positions_get(None, None).await.unwrap_or_default();
    if let Some(position) = positions.iter().find(|p| p.ticket == ticket) {
        close_one_position(gate, position).await;
    } else {
        let orders = gate.orders_get(None).await.unwrap_or_default();
        match orders.iter().find(|o| o.ticket == ticket) {
            Some(order) => remove_one_pending(gate, order).await,
            None => warn!(account = %account.id, ticket, "ticket not found, nothing to close"),
        }
    }

    gate.shutdown().await;
}

/// Modifies SL/TP on exactly one ticket under `account`'s credentials (`spec.md` §4.G
/// `modifySLTP`). A `None` field leaves that side unchanged.
pub async fn modify_sl_tp<A: TerminalAdapter>(
    gate: &TerminalGate<A>,
    account: &Account,
    ticket: i64,
    sl: Option<f64>,
    tp: Option<f64>,
) {
    if !connect(gate, account).await {
        warn!(account = %account.id, ticket, "modifySLTP connect failed");
        return;
    }

    let positions = gate.positions_get(None, None).await.unwrap_or_default();
    match positions.iter().find(|p| p.ticket == ticket) {
        Some(position) => {
            let new_sl = sl.unwrap_or(position.sl);
            let new_tp = tp.unwrap_or(position.tp);
            let result = gate.order_send(OrderRequest::modify_sl_tp(ticket, &position.symbol, new_sl, new_tp)).await;
            if !result.retcode.is_success() {
                warn!(ticket, comment = %result.comment, "sl/tp modify rejected");
            }
        }
        None => warn!(account = %account.id, ticket, "ticket not found, cannot modify sl/tp"),
    }

    gate.shutdown().await;
}
