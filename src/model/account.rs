use crate::model::trade::{FollowerTrade, MasterTrade};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Logical identifier for an owned session against a broker login (`spec.md` §3: `master{n}` or
/// `slave{n}`).
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Display, Serialize, Deserialize)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn master(n: u32) -> Self {
        Self(format!("master{n}"))
    }

    pub fn slave(n: u32) -> Self {
        Self(format!("slave{n}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The role an [`Account`] plays this session. A follower's target master is carried alongside
/// so the Mirror Engine never has to look it up elsewhere.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum Role {
    Master,
    Follower { follow_master_id: AccountId },
    StrategyHost,
}

/// Plaintext password held only in memory, and the symmetric-ciphertext at-rest form
/// (`spec.md` §3, §6). The ciphertext is produced by [`crate::crypto`] using the process-bound
/// keyfile key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub login: u64,
    #[serde(skip_serializing)]
    pub password: String,
    pub server: String,
    pub terminal_path: PathBuf,
}

/// One of the states an [`Account`] moves through under [`crate::supervisor`]'s control
/// (`spec.md` §3).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum AccountState {
    LoggedOut,
    PendingVerify,
    Connected,
    Copying,
    StrategyRunning,
    Disabled,
    Error,
    Locked,
    ConfigIncomplete,
}

impl Default for AccountState {
    fn default() -> Self {
        Self::LoggedOut
    }
}

/// Telemetry refreshed once per Session Supervisor cycle (`spec.md` §3 "Derived runtime
/// telemetry").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    pub balance: f64,
    pub equity: f64,
    pub profit: f64,
    pub margin_free: f64,
    pub margin_level: f64,
    pub ping_ms: u64,
    pub positions: Vec<MasterTrade>,
    pub follower_positions: Vec<FollowerTrade>,
}

/// An owned session against a broker login (`spec.md` §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub credentials: Credentials,
    pub role: Role,
    pub state: AccountState,
    pub fail_count: u32,
    pub telemetry: Option<Telemetry>,
}

impl Account {
    pub fn new(id: AccountId, credentials: Credentials, role: Role) -> Self {
        Self {
            id,
            credentials,
            role,
            state: AccountState::LoggedOut,
            fail_count: 0,
            telemetry: None,
        }
    }

    pub fn is_master(&self) -> bool {
        matches!(self.role, Role::Master)
    }

    pub fn is_follower(&self) -> bool {
        matches!(self.role, Role::Follower { .. })
    }

    pub fn follow_master_id(&self) -> Option<&AccountId> {
        match &self.role {
            Role::Follower { follow_master_id } => Some(follow_master_id),
            _ => None,
        }
    }

    pub fn is_logged_in(&self) -> bool {
        matches!(
            self.state,
            AccountState::Connected | AccountState::Copying | AccountState::StrategyRunning
        )
    }

    /// Invariant 4 (`spec.md` §3): once `locked`, an account stays locked regardless of later
    /// successful probes, until an explicit re-login command clears it.
    pub fn is_locked(&self) -> bool {
        self.state == AccountState::Locked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn master_and_slave_ids_follow_naming_convention() {
        assert_eq!(AccountId::master(1).as_str(), "master1");
        assert_eq!(AccountId::slave(2).as_str(), "slave2");
    }

    #[test]
    fn new_account_starts_logged_out_with_no_failures() {
        let account = Account::new(
            AccountId::master(1),
            Credentials {
                login: 1,
                password: "pw".into(),
                server: "Demo-Server".into(),
                terminal_path: PathBuf::from("/opt/terminal64"),
            },
            Role::Master,
        );

        assert_eq!(account.state, AccountState::LoggedOut);
        assert_eq!(account.fail_count, 0);
        assert!(!account.is_locked());
        assert!(!account.is_logged_in());
    }
}
