//! Scenario S5: an account whose connect attempt comes back `invalidAuth` locks immediately and
//! stays locked across further cycles, with no further connect attempts or orders sent.

use std::path::PathBuf;
use std::time::Duration;
use tradecopier::gate::test_util::FakeTerminal;
use tradecopier::gate::{ConnectOutcome, TerminalGate};
use tradecopier::model::{Account, AccountId, AccountState, Credentials, Role};
use tradecopier::supervisor::{Supervisor, MAX_FAIL_COUNT};

fn creds() -> Credentials {
    Credentials {
        login: 2,
        password: "wrong-password".into(),
        server: "Demo".into(),
        terminal_path: PathBuf::from("/tmp/term"),
    }
}

#[tokio::test]
async fn invalid_auth_locks_immediately_and_stays_locked_for_ten_more_cycles() {
    let account = Account::new(AccountId::slave(2), creds(), Role::Master);
    let mut supervisor = Supervisor::new(Duration::from_secs(1));
    supervisor.add_account(account, None);

    let terminal = FakeTerminal::new();
    let gate = TerminalGate::new(terminal);
    {
        let mut adapter = gate.lock().await;
        adapter.connect_outcome = ConnectOutcome::InvalidCredentials;
    }

    let errored = supervisor.sync_logged_in_set(&gate, &[AccountId::slave(2)]).await;
    assert!(errored.is_empty()); // invalidAuth locks outright, it is not an "errored" retry case

    let slave2 = supervisor.accounts.get(&AccountId::slave(2)).unwrap();
    assert_eq!(slave2.state, AccountState::Locked);
    assert!(slave2.fail_count >= MAX_FAIL_COUNT);

    for _ in 0..10 {
        let report = supervisor.run_cycle(&gate, &[]).await;
        assert!(report.mirrored.is_empty());
        assert!(report.newly_locked.is_empty()); // already locked, not re-reported
        let errored = supervisor.sync_logged_in_set(&gate, &[AccountId::slave(2)]).await;
        assert!(errored.is_empty());

        let slave2 = supervisor.accounts.get(&AccountId::slave(2)).unwrap();
        assert_eq!(slave2.state, AccountState::Locked);
    }

    let adapter = gate.lock().await;
    assert!(adapter.sent_orders.is_empty());
}
