//! The Core Loop (`spec.md` §4.G): the single background scheduler that drains the command
//! queue, drives one Session Supervisor sweep, reconciles the UI's desired logged-in set,
//! evaluates the global risk stop, and sleeps `checkInterval` — the only scheduler in the
//! process besides the Data Sync Worker (`spec.md` §5).

mod commands;

use crate::event::{MessageTransmitter, Tx};
use crate::gate::{TerminalAdapter, TerminalGate};
use crate::gateway::TradingGateway;
use crate::model::{AccountId, AccountState};
use crate::queues::{AccountSnapshot, Command, CommandReceiver};
use crate::shutdown::StopSignal;
use crate::strategy::gateway::LiveTradingGateway;
use crate::strategy::params::merge_params;
use crate::strategy::{spawn_strategy, StrategyHandle, StrategyRegistry, DEFAULT_HEARTBEAT};
use crate::supervisor::Supervisor;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Default Core Loop tick interval (`spec.md` §5 "checkInterval, default 0.2s").
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(200);

/// Jitter bound applied to the reconnect backoff scheduled for an account that just landed in
/// `error` (SPEC_FULL §11 item 1): the deferred window is `checkInterval * (1 ± 20%)`, spread
/// out so a terminal-wide outage does not make every account retry in lockstep.
const JITTER_FRACTION: f64 = 0.2;

/// Everything a strategy needs bound at `startStrategy` time beyond its schema-merged
/// parameters: which account owns it, and the config layers that feed `merge_params`
/// (`spec.md` §4.D "Parameter merging").
pub struct StrategyConfig {
    pub strategy_globals: HashMap<String, HashMap<String, String>>,
    pub strategy_account_overrides: HashMap<(AccountId, String), HashMap<String, String>>,
}

/// Owns the Session Supervisor, the strategy registry and running instances, and the three
/// UI-boundary queues (`spec.md` §4.G, §4.H). Generic over the terminal adapter so the live
/// binary and tests share this one implementation.
pub struct CoreLoop<A: TerminalAdapter> {
    gate: Arc<TerminalGate<A>>,
    supervisor: Supervisor,
    registry: StrategyRegistry,
    /// Every account's configured magic number, including masters and strategy-only accounts,
    /// not just followers (`spec.md` §6 `AccountSection` carries `magic` unconditionally).
    magics: HashMap<AccountId, i64>,
    strategy_config: StrategyConfig,
    strategies: HashMap<AccountId, StrategyHandle>,
    commands: CommandReceiver,
    log: Tx<String>,
    snapshots: Tx<AccountSnapshot>,
    check_interval: Duration,
    /// The UI's desired logged-in set, last pushed via `updateState` (`spec.md` §4.G step 1).
    desired_logged_in: Vec<AccountId>,
}

impl<A: TerminalAdapter> CoreLoop<A> {
    pub fn new(
        gate: Arc<TerminalGate<A>>,
        supervisor: Supervisor,
        registry: StrategyRegistry,
        magics: HashMap<AccountId, i64>,
        strategy_config: StrategyConfig,
        commands: CommandReceiver,
        log: Tx<String>,
        snapshots: Tx<AccountSnapshot>,
        check_interval: Duration,
    ) -> Self {
        Self {
            gate,
            supervisor,
            registry,
            magics,
            strategy_config,
            strategies: HashMap::new(),
            commands,
            log,
            snapshots,
            check_interval,
            desired_logged_in: Vec::new(),
        }
    }

    /// Runs until `stop` fires, then joins every still-running strategy before returning
    /// (`spec.md` §5 "strategies are stopped in parallel with a 5s join").
    #[instrument(skip(self, stop))]
    pub async fn run(mut self, mut stop: StopSignal) {
        loop {
            if stop.is_stopped() {
                break;
            }

            if let Ok(command) = self.commands.try_recv() {
                self.handle_command(command).await;
            }

            let dead = self.reap_dead_strategies().await;

            let connect_errors = self.supervisor.sync_logged_in_set(&self.gate, &self.desired_logged_in).await;
            self.apply_backoff(&connect_errors);

            let report = self.supervisor.run_cycle(&self.gate, &dead).await;
            self.apply_backoff(&report.newly_errored);

            self.publish_snapshots();

            if report.risk_stop_triggered {
                self.log.send("global risk stop triggered, closing all positions".to_string());
                self.close_all_forcefully().await;
            }

            stop.sleep_or_stop(self.check_interval).await;
        }

        self.shutdown_strategies().await;
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::CloseAllForcefully => self.close_all_forcefully().await,
            Command::CloseSingleTrade { account, ticket } => {
                if let Some(acct) = self.supervisor.accounts.get(&account).cloned() {
                    commands::close_single_trade(&self.gate, &acct, ticket).await;
                }
            }
            Command::StopAndClose { account } => {
                self.stop_strategy(&account).await;
                if let Some(acct) = self.supervisor.accounts.get(&account).cloned() {
                    commands::close_all_for_account(&self.gate, &acct).await;
                }
            }
            Command::ModifySlTp { account, ticket, sl, tp } => {
                if let Some(acct) = self.supervisor.accounts.get(&account).cloned() {
                    commands::modify_sl_tp(&self.gate, &acct, ticket, sl, tp).await;
                }
            }
            Command::StartStrategy { account, name, overrides } => {
                self.start_strategy(account, name, overrides).await;
            }
            Command::StopStrategy { account } => {
                self.stop_strategy(&account).await;
            }
            Command::UpdateState(state) => {
                self.desired_logged_in = state.logged_in;
            }
        }
    }

    async fn close_all_forcefully(&mut self) {
        let logged_in: Vec<AccountId> = self
            .supervisor
            .accounts
            .values()
            .filter(|a| a.is_logged_in())
            .map(|a| a.id.clone())
            .collect();

        for id in logged_in {
            self.stop_strategy(&id).await;
            if let Some(account) = self.supervisor.accounts.get(&id).cloned() {
                commands::close_all_for_account(&self.gate, &account).await;
            }
        }
    }

    /// Instantiates and spawns one strategy instance bound to `account_id`, merging parameters
    /// in the precedence `spec.md` §4.D mandates (`strategy::params::merge_params`).
    async fn start_strategy(&mut self, account_id: AccountId, name: String, overrides: HashMap<String, String>) {
        let Some(descriptor) = self.registry.get(&name).cloned() else {
            warn!(account = %account_id, strategy = %name, "unknown strategy, ignoring startStrategy");
            return;
        };
        let Some(account) = self.supervisor.accounts.get(&account_id) else {
            warn!(account = %account_id, "unknown account, ignoring startStrategy");
            return;
        };
        if !account.is_logged_in() {
            warn!(account = %account_id, "account is not logged in, ignoring startStrategy");
            return;
        }

        self.stop_strategy(&account_id).await;

        let global = self.strategy_config.strategy_globals.get(&name);
        let per_account = self
            .strategy_config
            .strategy_account_overrides
            .get(&(account_id.clone(), name.clone()));

        let symbol = pick_str_param(per_account, global, "symbol").unwrap_or_else(|| "EURUSD".to_string());
        let timeframe = pick_str_param(per_account, global, "timeframe")
            .and_then(|raw| crate::model::bar::Timeframe::parse(&raw))
            .unwrap_or(crate::model::bar::Timeframe::M1);

        let params = merge_params(&name, &descriptor.schema, global, per_account, Some(&overrides));

        let magic = *self.magics.get(&account_id).unwrap_or(&0);
        let live_gateway: Arc<dyn TradingGateway> = Arc::new(LiveTradingGateway::new(self.gate.clone(), magic));
        let strategy = (descriptor.factory)(live_gateway, symbol, timeframe, params);
        let handle = spawn_strategy(name.clone(), strategy, DEFAULT_HEARTBEAT);
        self.strategies.insert(account_id.clone(), handle);

        if let Some(account) = self.supervisor.accounts.get_mut(&account_id) {
            account.state = AccountState::StrategyRunning;
        }
        info!(account = %account_id, strategy = %name, "strategy started");
    }

    /// Stops `account_id`'s strategy if it has one, joining with the 5s timeout
    /// (`spec.md` §4.D "Join with 5s timeout"). A no-op for an account without a running
    /// instance.
    async fn stop_strategy(&mut self, account_id: &AccountId) {
        if let Some(handle) = self.strategies.remove(account_id) {
            if let Err(err) = handle.stop().await {
                warn!(account = %account_id, %err, "strategy stop did not complete cleanly");
            }
        }
        if let Some(account) = self.supervisor.accounts.get_mut(account_id) {
            if account.state == AccountState::StrategyRunning {
                account.state = AccountState::Connected;
            }
        }
    }

    async fn shutdown_strategies(&mut self) {
        let ids: Vec<AccountId> = self.strategies.keys().cloned().collect();
        for id in ids {
            self.stop_strategy(&id).await;
        }
    }

    /// Removes and joins every strategy task that has already finished on its own — an
    /// unrequested death, distinct from an explicit `stopStrategy` (`spec.md` §4.D "Failure
    /// model": "a dead task observed by B triggers an error snapshot"). Returns the affected
    /// account ids for `Supervisor::run_cycle`.
    async fn reap_dead_strategies(&mut self) -> Vec<AccountId> {
        let dead_ids: Vec<AccountId> = self
            .strategies
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(id, _)| id.clone())
            .collect();

        for id in &dead_ids {
            if let Some(handle) = self.strategies.remove(id) {
                if let Err(err) = handle.stop().await {
                    warn!(account = %id, %err, "dead strategy task reported an error on join");
                }
            }
        }

        dead_ids
    }

    fn apply_backoff(&mut self, ids: &[AccountId]) {
        for id in ids {
            let delay = self.jittered_backoff();
            self.supervisor.schedule_retry_backoff(id.clone(), delay);
        }
    }

    fn jittered_backoff(&self) -> Duration {
        let fraction: f64 = rand::thread_rng().gen_range(-JITTER_FRACTION..=JITTER_FRACTION);
        let secs = (self.check_interval.as_secs_f64() * (1.0 + fraction)).max(0.0);
        Duration::from_secs_f64(secs)
    }

    /// Pushes one full snapshot per known account onto the snapshot queue (`spec.md` §4.H).
    fn publish_snapshots(&mut self) {
        for account in self.supervisor.accounts.values() {
            let mut snapshot = AccountSnapshot::new(account.id.clone()).with_status(account.state);
            if let Some(telemetry) = &account.telemetry {
                snapshot = snapshot.with_telemetry(telemetry);
            }
            self.snapshots.send(snapshot);
        }
    }
}

fn pick_str_param(
    per_account: Option<&HashMap<String, String>>,
    global: Option<&HashMap<String, String>>,
    key: &str,
) -> Option<String> {
    per_account
        .and_then(|m| m.get(key))
        .or_else(|| global.and_then(|m| m.get(key)))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::test_util::FakeTerminal;
    use crate::model::{Account, Credentials, Role};
    use crate::queues::UiState;
    use crate::strategy::params::{ParamSchema, ParamValue};
    use crate::strategy::registry::StrategyDescriptor;
    use crate::strategy::{Strategy, StrategyTaskError};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    struct CountingStrategy {
        ticks: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Strategy for CountingStrategy {
        async fn on_init(&mut self) -> Result<(), StrategyTaskError> {
            Ok(())
        }

        async fn on_bar(&mut self, _time: DateTime<Utc>) -> Result<(), StrategyTaskError> {
            self.ticks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn on_deinit(&mut self) {}
    }

    fn build_counting(
        _gateway: Arc<dyn TradingGateway>,
        _symbol: String,
        _timeframe: crate::model::bar::Timeframe,
        _params: HashMap<String, ParamValue>,
    ) -> Box<dyn Strategy> {
        Box::new(CountingStrategy {
            ticks: Arc::new(AtomicUsize::new(0)),
        })
    }

    fn creds(login: u64) -> Credentials {
        Credentials {
            login,
            password: "pw".into(),
            server: "Demo".into(),
            terminal_path: PathBuf::from("/tmp/term"),
        }
    }

    fn core_loop(supervisor: Supervisor, terminal: FakeTerminal) -> (CoreLoop<FakeTerminal>, mpsc::UnboundedSender<Command>) {
        let gate = Arc::new(TerminalGate::new(terminal));
        let mut registry = StrategyRegistry::new();
        registry.register(StrategyDescriptor {
            name: "Counter",
            description: "ticks a counter",
            schema: ParamSchema::new(),
            factory: build_counting,
        });

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (log_tx, _log_rx) = mpsc::unbounded_channel();
        let (snap_tx, _snap_rx) = mpsc::unbounded_channel();

        let core = CoreLoop::new(
            gate,
            supervisor,
            registry,
            HashMap::new(),
            StrategyConfig {
                strategy_globals: HashMap::new(),
                strategy_account_overrides: HashMap::new(),
            },
            cmd_rx,
            Tx::new(log_tx),
            Tx::new(snap_tx),
            Duration::from_millis(50),
        );
        (core, cmd_tx)
    }

    #[tokio::test]
    async fn update_state_feeds_the_desired_logged_in_set_into_reconnects() {
        let account = Account::new(AccountId::master(1), creds(1), Role::Master);
        let mut supervisor = Supervisor::new(Duration::from_secs(1));
        supervisor.add_account(account, None);

        let (mut core, _cmd_tx) = core_loop(supervisor, FakeTerminal::new());
        core.handle_command(Command::UpdateState(UiState {
            logged_in: vec![AccountId::master(1)],
            ..Default::default()
        }))
        .await;

        let errored = core.supervisor.sync_logged_in_set(&core.gate, &core.desired_logged_in).await;
        assert!(errored.is_empty());
        assert_eq!(core.supervisor.accounts.get(&AccountId::master(1)).unwrap().state, AccountState::Connected);
    }

    #[tokio::test]
    async fn start_strategy_then_stop_strategy_round_trips_cleanly() {
        let mut account = Account::new(AccountId::master(1), creds(1), Role::Master);
        account.state = AccountState::Connected;
        let mut supervisor = Supervisor::new(Duration::from_secs(1));
        supervisor.add_account(account, None);

        let (mut core, _cmd_tx) = core_loop(supervisor, FakeTerminal::new());

        core.handle_command(Command::StartStrategy {
            account: AccountId::master(1),
            name: "Counter".to_string(),
            overrides: HashMap::new(),
        })
        .await;
        assert_eq!(core.supervisor.accounts.get(&AccountId::master(1)).unwrap().state, AccountState::StrategyRunning);
        assert!(core.strategies.contains_key(&AccountId::master(1)));

        core.handle_command(Command::StopStrategy {
            account: AccountId::master(1),
        })
        .await;
        assert_eq!(core.supervisor.accounts.get(&AccountId::master(1)).unwrap().state, AccountState::Connected);
        assert!(!core.strategies.contains_key(&AccountId::master(1)));
    }

    #[tokio::test]
    async fn starting_a_strategy_for_an_account_that_is_not_logged_in_is_a_no_op() {
        let account = Account::new(AccountId::master(1), creds(1), Role::Master);
        let mut supervisor = Supervisor::new(Duration::from_secs(1));
        supervisor.add_account(account, None);

        let (mut core, _cmd_tx) = core_loop(supervisor, FakeTerminal::new());
        core.handle_command(Command::StartStrategy {
            account: AccountId::master(1),
            name: "Counter".to_string(),
            overrides: HashMap::new(),
        })
        .await;

        assert!(core.strategies.is_empty());
        assert_eq!(core.supervisor.accounts.get(&AccountId::master(1)).unwrap().state, AccountState::LoggedOut);
    }

    #[tokio::test]
    async fn close_all_forcefully_stops_strategies_and_closes_positions() {
        let mut account = Account::new(AccountId::master(1), creds(1), Role::Master);
        account.state = AccountState::Connected;
        let mut supervisor = Supervisor::new(Duration::from_secs(1));
        supervisor.add_account(account, None);

        let terminal = FakeTerminal::new()
            .with_symbol(
                "EURUSD",
                crate::model::SymbolInfo {
                    point: 0.00001,
                    digits: 5,
                    volume_min: 0.01,
                    volume_max: 100.0,
                    volume_step: 0.01,
                    trade_mode: crate::model::TradeMode::Full,
                },
            )
            .with_tick(
                "EURUSD",
                crate::gate::Tick {
                    bid: 1.1,
                    ask: 1.1002,
                    time: chrono::Utc::now(),
                },
            )
            .with_position(crate::gate::PositionRow {
                ticket: 1,
                symbol: "EURUSD".into(),
                side: crate::model::OrderSide::Buy,
                volume: 0.1,
                price_open: 1.09,
                sl: 0.0,
                tp: 0.0,
                magic: 7,
                profit: 0.0,
                comment: String::new(),
            });

        let (mut core, _cmd_tx) = core_loop(supervisor, terminal);
        core.handle_command(Command::StartStrategy {
            account: AccountId::master(1),
            name: "Counter".to_string(),
            overrides: HashMap::new(),
        })
        .await;
        assert!(core.strategies.contains_key(&AccountId::master(1)));

        core.handle_command(Command::CloseAllForcefully).await;

        assert!(core.strategies.is_empty());
        let adapter = core.gate.lock().await;
        assert_eq!(adapter.sent_orders.len(), 1);
    }

    #[test]
    fn jittered_backoff_stays_within_twenty_percent_of_check_interval() {
        let supervisor = Supervisor::new(Duration::from_secs(1));
        let (core, _cmd_tx) = core_loop(supervisor, FakeTerminal::new());

        for _ in 0..50 {
            let delay = core.jittered_backoff();
            assert!(delay >= Duration::from_millis(40));
            assert!(delay <= Duration::from_millis(60));
        }
    }
}
