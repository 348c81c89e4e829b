//! The Session Supervisor (`spec.md` §4.B): moves every known account through its state machine
//! once per cycle, under the single Terminal Gate critical section (`spec.md` §5: "the Core
//! Loop's B-step acquires it for the duration of one supervisor sweep").

mod error;

pub use error::SupervisorError;

use crate::gate::{AccountInfoSnapshot, ConnectOutcome, TerminalAdapter, TerminalGate};
use crate::model::account::Telemetry;
use crate::model::trade::MasterTrade;
use crate::model::{Account, AccountId, AccountState, Credentials, FollowerConfig};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

/// Connect failures before an account is force-locked (`spec.md` §4.B states diagram).
pub const MAX_FAIL_COUNT: u32 = 10;

/// Outcome of one supervisor sweep, for logging and the account-snapshot queue
/// (`spec.md` §4.H).
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SupervisorReport {
    pub mirrored: HashMap<AccountId, crate::mirror::MirrorCycleReport>,
    pub newly_locked: Vec<AccountId>,
    pub newly_errored: Vec<AccountId>,
    /// Set when the global risk stop fired this cycle; the Core Loop is responsible for
    /// enqueuing the force-close-all self-command (`spec.md` §4.B step 5).
    pub risk_stop_triggered: bool,
}

/// Owns every known [`Account`] and its [`FollowerConfig`] (if any), and runs the per-cycle
/// algorithm against a single shared [`TerminalGate`].
pub struct Supervisor {
    pub accounts: IndexMap<AccountId, Account>,
    pub follower_configs: HashMap<AccountId, FollowerConfig>,
    /// Credentials awaiting one probe connect before they replace an account's live
    /// credentials (`spec.md` §4.B step 1, config-edit-while-logged-in case).
    pub pending_credentials: HashMap<AccountId, Credentials>,
    pub global_risk_stop_enabled: bool,
    pub global_risk_equity_threshold: f64,
    connect_timeout: Duration,
    /// Accounts whose next reconnect probe is deferred (SPEC_FULL §11 item 1: jittered backoff
    /// for accounts in `error` state, set by [`crate::core`] rather than computed here).
    retry_not_before: HashMap<AccountId, Instant>,
}

impl Supervisor {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            accounts: IndexMap::new(),
            follower_configs: HashMap::new(),
            pending_credentials: HashMap::new(),
            global_risk_stop_enabled: false,
            global_risk_equity_threshold: 0.0,
            connect_timeout,
            retry_not_before: HashMap::new(),
        }
    }

    /// Defers the next reconnect probe for `id` until `Instant::now() + delay`
    /// (SPEC_FULL §11 item 1). Has no effect on an account that is not currently in `error` —
    /// the next cycle that finds it logged in or locked just overwrites or ignores this.
    pub fn schedule_retry_backoff(&mut self, id: AccountId, delay: Duration) {
        self.retry_not_before.insert(id, Instant::now() + delay);
    }

    fn retry_due(&self, id: &AccountId) -> bool {
        self.retry_not_before.get(id).map_or(true, |not_before| Instant::now() >= *not_before)
    }

    /// Reconciles the UI's desired logged-in set against actual state (`spec.md` §4.G
    /// `updateState` step): attempts an initial connect for any account the UI wants logged in
    /// that is not yet connected, locked, or strategy-bound. Accounts deferred by
    /// [`Self::schedule_retry_backoff`] are skipped until their window opens. Returns the ids
    /// that newly landed in `error` this call, for the caller to schedule backoff on.
    #[instrument(skip(self, gate, desired_logged_in))]
    pub async fn sync_logged_in_set<A: TerminalAdapter>(
        &mut self,
        gate: &TerminalGate<A>,
        desired_logged_in: &[AccountId],
    ) -> Vec<AccountId> {
        let mut newly_errored = Vec::new();

        for id in desired_logged_in {
            let Some(account) = self.accounts.get(id) else { continue };
            if account.is_logged_in() || account.is_locked() || account.state == AccountState::StrategyRunning {
                continue;
            }
            if !self.retry_due(id) {
                continue;
            }

            let creds = account.credentials.clone();
            let outcome = {
                let mut adapter = gate.lock().await;
                adapter.connect(creds.login, &creds.password, &creds.server, &creds.terminal_path, self.connect_timeout)
            };

            let Some(account) = self.accounts.get_mut(id) else { continue };
            match outcome {
                ConnectOutcome::Connected => {
                    account.fail_count = 0;
                    account.state = AccountState::Connected;
                    info!(account = %id, "account connected");
                }
                ConnectOutcome::InvalidCredentials => {
                    account.state = AccountState::Locked;
                    account.fail_count = MAX_FAIL_COUNT;
                    warn!(account = %id, "invalid credentials, locking account");
                }
                ConnectOutcome::TerminalUnreachable | ConnectOutcome::Timeout => {
                    account.fail_count += 1;
                    if account.fail_count >= MAX_FAIL_COUNT {
                        account.state = AccountState::Locked;
                        warn!(account = %id, "account locked after repeated connect failures");
                    } else {
                        account.state = AccountState::Error;
                        newly_errored.push(id.clone());
                    }
                }
            }
        }

        newly_errored
    }

    pub fn add_account(&mut self, account: Account, follower_config: Option<FollowerConfig>) {
        if let Some(config) = follower_config {
            self.follower_configs.insert(account.id.clone(), config);
        }
        self.accounts.insert(account.id.clone(), account);
    }

    /// Runs the full per-cycle algorithm (`spec.md` §4.B "Per-cycle algorithm", steps 1-5).
    /// `dead_strategy_accounts` lets the Core Loop report strategy tasks that have died since
    /// the last cycle, without the Supervisor depending on `crate::strategy`'s task types.
    #[instrument(skip(self, gate, dead_strategy_accounts))]
    pub async fn run_cycle<A: TerminalAdapter>(
        &mut self,
        gate: &TerminalGate<A>,
        dead_strategy_accounts: &[AccountId],
    ) -> SupervisorReport {
        let mut report = SupervisorReport::default();
        let mut adapter = gate.lock().await;

        self.step1_pending_credentials(&mut adapter, &mut report);

        for id in dead_strategy_accounts {
            if let Some(account) = self.accounts.get_mut(id) {
                account.state = AccountState::Error;
                report.newly_errored.push(id.clone());
            }
        }

        let master_groups = self.build_master_groups();

        for (master_id, follower_ids) in master_groups {
            self.run_master_group(&mut *adapter, &master_id, &follower_ids, &mut report);
        }

        self.run_other_accounts(&mut *adapter, &mut report);

        drop(adapter);

        self.evaluate_global_risk_stop(&mut report);

        report
    }

    fn step1_pending_credentials<A: TerminalAdapter>(
        &mut self,
        adapter: &mut A,
        report: &mut SupervisorReport,
    ) {
        let pending: Vec<AccountId> = self.pending_credentials.keys().cloned().collect();
        for id in pending {
            let Some(account) = self.accounts.get(&id) else { continue };
            if !account.is_logged_in() {
                continue;
            }
            let Some(new_creds) = self.pending_credentials.remove(&id) else { continue };

            let outcome = adapter.connect(
                new_creds.login,
                &new_creds.password,
                &new_creds.server,
                &new_creds.terminal_path,
                self.connect_timeout,
            );

            let account = self.accounts.get_mut(&id).expect("checked above");
            match outcome {
                ConnectOutcome::Connected => {
                    account.credentials = new_creds;
                    account.fail_count = 0;
                    account.state = AccountState::Connected;
                    info!(account = %id, "pending credentials verified");
                }
                _ => {
                    account.state = AccountState::Locked;
                    account.fail_count = MAX_FAIL_COUNT;
                    report.newly_locked.push(id.clone());
                    warn!(account = %id, "pending credential probe failed, locking account");
                }
            }
        }
    }

    /// Master → [followers] index (`spec.md` §4.B step 2): enabled followers whose accounts are
    /// logged in and not strategy-bound.
    fn build_master_groups(&self) -> IndexMap<AccountId, Vec<AccountId>> {
        let mut groups: IndexMap<AccountId, Vec<AccountId>> = IndexMap::new();
        for (follower_id, config) in &self.follower_configs {
            if !config.enabled {
                continue;
            }
            let Some(follower_account) = self.accounts.get(follower_id) else { continue };
            if !follower_account.is_logged_in() {
                continue;
            }
            if follower_account.state == AccountState::StrategyRunning {
                continue;
            }
            groups
                .entry(config.follow_master_id.clone())
                .or_default()
                .push(follower_id.clone());
        }
        groups
    }

    fn run_master_group<A: TerminalAdapter>(
        &mut self,
        adapter: &mut A,
        master_id: &AccountId,
        follower_ids: &[AccountId],
        report: &mut SupervisorReport,
    ) {
        let Some(master) = self.accounts.get(master_id) else { return };
        if master.state == AccountState::StrategyRunning {
            return; // strategy-bound masters are not mirrored as masters
        }
        if master.fail_count >= MAX_FAIL_COUNT {
            if let Some(master) = self.accounts.get_mut(master_id) {
                master.state = AccountState::Locked;
            }
            report.newly_locked.push(master_id.clone());
            return;
        }

        let master_creds = master.credentials.clone();
        let outcome = adapter.connect(
            master_creds.login,
            &master_creds.password,
            &master_creds.server,
            &master_creds.terminal_path,
            self.connect_timeout,
        );

        let master_trades = match outcome {
            ConnectOutcome::Connected => {
                let snapshot = adapter.account_info().ok();
                let positions = adapter.positions_get(None, None).unwrap_or_default();
                let orders = adapter.orders_get(None).unwrap_or_default();
                let trades: Vec<MasterTrade> = positions
                    .into_iter()
                    .chain(orders)
                    .map(|row| MasterTrade {
                        ticket: row.ticket,
                        symbol: row.symbol,
                        side: row.side,
                        volume: row.volume,
                        price_open: row.price_open,
                        sl: row.sl,
                        tp: row.tp,
                        magic: row.magic,
                    })
                    .collect();

                if let Some(master) = self.accounts.get_mut(master_id) {
                    master.fail_count = 0;
                    master.state = AccountState::Connected;
                    master.telemetry = snapshot.map(|s| Telemetry {
                        balance: s.balance,
                        equity: s.equity,
                        profit: s.profit,
                        margin_free: s.margin_free,
                        margin_level: s.margin_level,
                        ping_ms: 0,
                        positions: trades.clone(),
                        follower_positions: Vec::new(),
                    });
                }
                Some(trades)
            }
            ConnectOutcome::InvalidCredentials => {
                if let Some(master) = self.accounts.get_mut(master_id) {
                    master.state = AccountState::Locked;
                    master.fail_count = MAX_FAIL_COUNT;
                }
                report.newly_locked.push(master_id.clone());
                None
            }
            ConnectOutcome::TerminalUnreachable | ConnectOutcome::Timeout => {
                if let Some(master) = self.accounts.get_mut(master_id) {
                    master.fail_count += 1;
                    if master.fail_count >= MAX_FAIL_COUNT {
                        master.state = AccountState::Locked;
                        report.newly_locked.push(master_id.clone());
                    } else {
                        master.state = AccountState::Error;
                        report.newly_errored.push(master_id.clone());
                    }
                }
                None
            }
        };

        let master_equity = self
            .accounts
            .get(master_id)
            .and_then(|m| m.telemetry.as_ref())
            .map(|t| t.equity)
            .unwrap_or(0.0);

        if let Some(master_trades) = master_trades {
            for follower_id in follower_ids {
                self.run_one_follower(adapter, follower_id, &master_trades, master_equity, report);
            }
        }

        adapter.shutdown();
    }

    fn run_one_follower<A: TerminalAdapter>(
        &mut self,
        adapter: &mut A,
        follower_id: &AccountId,
        master_trades: &[MasterTrade],
        master_equity: f64,
        report: &mut SupervisorReport,
    ) {
        let Some(follower) = self.accounts.get(follower_id) else { return };
        let Some(follower_config) = self.follower_configs.get(follower_id).cloned() else { return };

        let creds = follower.credentials.clone();
        let outcome = adapter.connect(
            creds.login,
            &creds.password,
            &creds.server,
            &creds.terminal_path,
            self.connect_timeout,
        );

        if outcome != ConnectOutcome::Connected {
            warn!(account = %follower_id, "follower connect failed, skipping mirror this cycle");
            return;
        }

        let follower_info = adapter.account_info().ok();
        let follower_equity = follower_info.map(|info| info.equity).unwrap_or(0.0);
        let follower_margin_free = follower_info.map(|info| info.margin_free).unwrap_or(0.0);

        match crate::mirror::run_follower_cycle(
            adapter,
            &follower_config,
            master_trades,
            follower_equity,
            master_equity,
            follower_margin_free,
        ) {
            Ok(mirror_report) => {
                report.mirrored.insert(follower_id.clone(), mirror_report);
                if let Some(follower) = self.accounts.get_mut(follower_id) {
                    follower.state = AccountState::Copying;
                }
            }
            Err(err) => {
                warn!(account = %follower_id, error = %err, "mirror cycle failed");
            }
        }
    }

    /// Other logged-in accounts: strategy hosts and idle-connected monitors
    /// (`spec.md` §4.B step 4).
    fn run_other_accounts<A: TerminalAdapter>(&mut self, adapter: &mut A, report: &mut SupervisorReport) {
        let master_ids: std::collections::HashSet<AccountId> = self
            .follower_configs
            .values()
            .filter(|c| c.enabled)
            .map(|c| c.follow_master_id.clone())
            .collect();

        let other_ids: Vec<AccountId> = self
            .accounts
            .iter()
            .filter(|(id, account)| {
                account.is_logged_in()
                    && !master_ids.contains(id)
                    && !self.follower_configs.contains_key(id)
            })
            .map(|(id, _)| id.clone())
            .collect();

        for id in other_ids {
            let Some(account) = self.accounts.get(&id) else { continue };
            let creds = account.credentials.clone();
            let outcome = adapter.connect(
                creds.login,
                &creds.password,
                &creds.server,
                &creds.terminal_path,
                self.connect_timeout,
            );

            if outcome == ConnectOutcome::Connected {
                let snapshot: Option<AccountInfoSnapshot> = adapter.account_info().ok();
                if let Some(account) = self.accounts.get_mut(&id) {
                    account.fail_count = 0;
                    account.telemetry = snapshot.map(|s| Telemetry {
                        balance: s.balance,
                        equity: s.equity,
                        profit: s.profit,
                        margin_free: s.margin_free,
                        margin_level: s.margin_level,
                        ping_ms: 0,
                        positions: Vec::new(),
                        follower_positions: Vec::new(),
                    });
                }
                adapter.shutdown();
            } else if let Some(account) = self.accounts.get_mut(&id) {
                account.fail_count += 1;
                if account.fail_count >= MAX_FAIL_COUNT {
                    account.state = AccountState::Locked;
                    report.newly_locked.push(id.clone());
                } else {
                    account.state = AccountState::Error;
                    report.newly_errored.push(id.clone());
                }
            }
        }
    }

    /// `spec.md` §4.B step 5: if enabled and total logged-in equity falls under the threshold,
    /// flags the report and disarms the stop (the UI re-arms explicitly).
    fn evaluate_global_risk_stop(&mut self, report: &mut SupervisorReport) {
        if !self.global_risk_stop_enabled {
            return;
        }

        let total_equity: f64 = self
            .accounts
            .values()
            .filter(|a| a.is_logged_in())
            .filter_map(|a| a.telemetry.as_ref())
            .map(|t| t.equity)
            .sum();

        if total_equity < self.global_risk_equity_threshold {
            warn!(total_equity, threshold = self.global_risk_equity_threshold, "global risk stop triggered");
            report.risk_stop_triggered = true;
            self.global_risk_stop_enabled = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::test_util::FakeTerminal;
    use crate::gate::{PositionRow, Tick};
    use crate::model::follower::{CopyMode, VolumeMode};
    use crate::model::symbol::TradeMode;
    use crate::model::{OrderSide, Role, SymbolInfo, SymbolRuleKind};
    use std::path::PathBuf;

    fn creds(login: u64) -> Credentials {
        Credentials {
            login,
            password: "pw".into(),
            server: "Demo".into(),
            terminal_path: PathBuf::from("/tmp/term"),
        }
    }

    fn follower_config(magic: i64) -> FollowerConfig {
        FollowerConfig {
            enabled: true,
            follow_master_id: AccountId::master(1),
            magic,
            copy_mode: CopyMode::Forward,
            volume_mode: VolumeMode::Same,
            fixed_lot: 0.01,
            default_symbol_rule: SymbolRuleKind::None,
            default_symbol_text: String::new(),
            slippage_points: 200,
            symbol_overrides: Default::default(),
            margin_check_enabled: false,
        }
    }

    #[tokio::test]
    async fn a_logged_in_followers_mirror_cycle_runs_against_its_master() {
        let mut master = Account::new(AccountId::master(1), creds(1), Role::Master);
        master.state = AccountState::Connected;

        let mut follower = Account::new(
            AccountId::slave(1),
            creds(2),
            Role::Follower {
                follow_master_id: AccountId::master(1),
            },
        );
        follower.state = AccountState::Connected;

        let mut supervisor = Supervisor::new(Duration::from_secs(1));
        supervisor.add_account(master, None);
        supervisor.add_account(follower, Some(follower_config(42)));

        let terminal = FakeTerminal::new()
            .with_symbol(
                "EURUSD",
                SymbolInfo {
                    point: 0.00001,
                    digits: 5,
                    volume_min: 0.01,
                    volume_max: 100.0,
                    volume_step: 0.01,
                    trade_mode: TradeMode::Full,
                },
            )
            .with_tick(
                "EURUSD",
                Tick {
                    bid: 1.1000,
                    ask: 1.1002,
                    time: chrono::Utc::now(),
                },
            )
            .with_position(PositionRow {
                ticket: 9001,
                symbol: "EURUSD".into(),
                side: OrderSide::Buy,
                volume: 0.2,
                price_open: 1.0950,
                sl: 0.0,
                tp: 0.0,
                magic: 1, // master's own magic, distinct from follower magic 42
                profit: 0.0,
                comment: String::new(),
            });
        let gate = TerminalGate::new(terminal);

        let report = supervisor.run_cycle(&gate, &[]).await;

        let mirror_report = report.mirrored.get(&AccountId::slave(1)).unwrap();
        assert_eq!(mirror_report.opened, 1);
        assert_eq!(
            supervisor.accounts.get(&AccountId::slave(1)).unwrap().state,
            AccountState::Copying
        );
    }

    #[tokio::test]
    async fn a_strategy_bound_follower_is_never_mirrored() {
        let mut master = Account::new(AccountId::master(1), creds(1), Role::Master);
        master.state = AccountState::Connected;

        let mut follower = Account::new(
            AccountId::slave(1),
            creds(2),
            Role::Follower {
                follow_master_id: AccountId::master(1),
            },
        );
        follower.state = AccountState::StrategyRunning;

        let mut supervisor = Supervisor::new(Duration::from_secs(1));
        supervisor.add_account(master, None);
        supervisor.add_account(follower, Some(follower_config(42)));

        let gate = TerminalGate::new(FakeTerminal::new());
        let report = supervisor.run_cycle(&gate, &[]).await;

        assert!(report.mirrored.is_empty());
    }

    #[tokio::test]
    async fn sync_logged_in_set_connects_an_account_the_ui_wants_logged_in() {
        let account = Account::new(AccountId::master(1), creds(1), Role::Master);
        let mut supervisor = Supervisor::new(Duration::from_secs(1));
        supervisor.add_account(account, None);

        let gate = TerminalGate::new(FakeTerminal::new());
        let errored = supervisor.sync_logged_in_set(&gate, &[AccountId::master(1)]).await;

        assert!(errored.is_empty());
        assert_eq!(supervisor.accounts.get(&AccountId::master(1)).unwrap().state, AccountState::Connected);
    }

    #[tokio::test]
    async fn a_backed_off_account_is_skipped_until_its_window_opens() {
        let account = Account::new(AccountId::master(1), creds(1), Role::Master);
        let mut supervisor = Supervisor::new(Duration::from_secs(1));
        supervisor.add_account(account, None);
        supervisor.schedule_retry_backoff(AccountId::master(1), Duration::from_secs(60));

        let gate = TerminalGate::new(FakeTerminal::new());
        let errored = supervisor.sync_logged_in_set(&gate, &[AccountId::master(1)]).await;

        assert!(errored.is_empty());
        assert_eq!(
            supervisor.accounts.get(&AccountId::master(1)).unwrap().state,
            AccountState::LoggedOut
        );
    }

    #[tokio::test]
    async fn a_failed_connect_lands_in_error_and_is_reported() {
        let account = Account::new(AccountId::master(1), creds(1), Role::Master);
        let mut supervisor = Supervisor::new(Duration::from_secs(1));
        supervisor.add_account(account, None);

        let terminal = FakeTerminal::new();
        let gate = TerminalGate::new(terminal);
        {
            let mut adapter = gate.lock().await;
            adapter.connect_outcome = crate::gate::ConnectOutcome::TerminalUnreachable;
        }

        let errored = supervisor.sync_logged_in_set(&gate, &[AccountId::master(1)]).await;

        assert_eq!(errored, vec![AccountId::master(1)]);
        assert_eq!(supervisor.accounts.get(&AccountId::master(1)).unwrap().state, AccountState::Error);
        assert_eq!(supervisor.accounts.get(&AccountId::master(1)).unwrap().fail_count, 1);
    }
}
