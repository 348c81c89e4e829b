//! The three UI-boundary queues (`spec.md` §4.H): `commandQueue` (UI → Core Loop), `logQueue`
//! (Core/B/C/D/F → UI), and `accountSnapshotQueue` (B/C/D → UI). The UI never calls into Core
//! directly — all interaction crosses through these, and the UI pushes its own volatile state
//! in rather than Core owning it (`spec.md` §4.H).

use crate::model::account::{AccountState, Telemetry};
use crate::model::AccountId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::mpsc;

pub type CommandReceiver = mpsc::UnboundedReceiver<Command>;
pub type CommandSender = mpsc::UnboundedSender<Command>;
pub type LogReceiver = mpsc::UnboundedReceiver<String>;
pub type SnapshotReceiver = mpsc::UnboundedReceiver<AccountSnapshot>;

/// One Core Loop command (`spec.md` §4.G step 1). The UI is the only producer; the Core Loop is
/// the sole consumer, draining at most one per tick.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CloseAllForcefully,
    CloseSingleTrade {
        account: AccountId,
        ticket: i64,
    },
    StopAndClose {
        account: AccountId,
    },
    ModifySlTp {
        account: AccountId,
        ticket: i64,
        sl: Option<f64>,
        tp: Option<f64>,
    },
    StartStrategy {
        account: AccountId,
        name: String,
        overrides: HashMap<String, String>,
    },
    StopStrategy {
        account: AccountId,
    },
    UpdateState(UiState),
}

/// The UI's entire volatile state, pushed via `updateState` (`spec.md` §4.G, §4.H): "the UI
/// pushes its entire volatile state (logged-in set, verified-password set, mapping,
/// pending-verify map) ... the Core treats these as inputs."
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UiState {
    pub logged_in: Vec<AccountId>,
    pub verified_passwords: Vec<AccountId>,
    pub mapping: HashMap<AccountId, AccountId>,
    pub pending_verify: Vec<AccountId>,
}

/// A delta-style telemetry update tagged with the account it describes (`spec.md` §4.H): "each
/// message is a delta-style dict tagged with account id and zero-or-more of the telemetry fields
/// plus a `status` label". Only fields that changed this cycle are set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub account: AccountId,
    pub status: Option<AccountState>,
    pub balance: Option<f64>,
    pub equity: Option<f64>,
    pub profit: Option<f64>,
    pub margin_free: Option<f64>,
    pub margin_level: Option<f64>,
    pub ping_ms: Option<u64>,
}

impl AccountSnapshot {
    pub fn new(account: AccountId) -> Self {
        Self {
            account,
            status: None,
            balance: None,
            equity: None,
            profit: None,
            margin_free: None,
            margin_level: None,
            ping_ms: None,
        }
    }

    pub fn with_status(mut self, status: AccountState) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_telemetry(mut self, telemetry: &Telemetry) -> Self {
        self.balance = Some(telemetry.balance);
        self.equity = Some(telemetry.equity);
        self.profit = Some(telemetry.profit);
        self.margin_free = Some(telemetry.margin_free);
        self.margin_level = Some(telemetry.margin_level);
        self.ping_ms = Some(telemetry.ping_ms);
        self
    }
}
