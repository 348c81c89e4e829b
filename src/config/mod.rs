//! Ini-sectioned config file parsing (`spec.md` §6). The `ini` crate does the section/key
//! tokenising; every field extraction below is manual (the crate has no `serde` support) and
//! falls back to a documented default with a `tracing::warn!` on a parse failure, per
//! `spec.md` §7 "Parse/config error ... never abort startup."

mod parse;

pub use parse::ConfigError;

use crate::model::{
    follower::{CopyMode, FollowerConfig, SymbolRule, SymbolRuleKind, VolumeMode},
    Account, AccountId, Credentials, Role,
};
use ini::Ini;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Global risk stop settings from the `DEFAULT` section (`spec.md` §4.B step 5, §6).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlobalRiskStop {
    pub enabled: bool,
    pub equity_threshold: f64,
}

impl Default for GlobalRiskStop {
    fn default() -> Self {
        Self {
            enabled: false,
            equity_threshold: 0.0,
        }
    }
}

/// One `master{n}`/`slave{n}` section, before it has been turned into an [`Account`] +
/// [`FollowerConfig`] pair.
#[derive(Debug, Clone)]
pub struct AccountSection {
    pub id: AccountId,
    pub path: PathBuf,
    pub login: u64,
    /// Ciphertext as read from the file; the caller decrypts with the process keyfile.
    pub password_ciphertext: String,
    pub server: String,
    pub magic: i64,
    pub enabled: bool,
    pub follow_master_id: Option<AccountId>,
    pub copy_mode: CopyMode,
    pub default_symbol_rule: SymbolRuleKind,
    pub default_symbol_text: String,
    pub volume_mode: VolumeMode,
    pub fixed_lot: f64,
    pub symbol_map: HashMap<String, SymbolRule>,
    pub slippage_points: i32,
    pub margin_check_enabled: bool,
}

impl AccountSection {
    /// Builds the [`Account`] this section describes, given the already-decrypted password.
    pub fn to_account(&self, plaintext_password: String) -> Account {
        let role = match &self.follow_master_id {
            Some(master_id) => Role::Follower {
                follow_master_id: master_id.clone(),
            },
            None => Role::Master,
        };

        Account::new(
            self.id.clone(),
            Credentials {
                login: self.login,
                password: plaintext_password,
                server: self.server.clone(),
                terminal_path: self.path.clone(),
            },
            role,
        )
    }

    /// Builds the [`FollowerConfig`] this section describes. Only meaningful when
    /// `follow_master_id` is `Some` — masters still parse the same fields but the Core Loop
    /// never looks up a `FollowerConfig` for a master account.
    pub fn to_follower_config(&self) -> Option<FollowerConfig> {
        let follow_master_id = self.follow_master_id.clone()?;
        Some(FollowerConfig {
            enabled: self.enabled,
            follow_master_id,
            magic: self.magic,
            copy_mode: self.copy_mode,
            volume_mode: self.volume_mode,
            fixed_lot: self.fixed_lot,
            default_symbol_rule: self.default_symbol_rule,
            default_symbol_text: self.default_symbol_text.clone(),
            slippage_points: self.slippage_points,
            symbol_overrides: self.symbol_map.clone(),
            margin_check_enabled: self.margin_check_enabled,
        })
    }
}

/// A fully parsed config file (`spec.md` §6).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub check_interval: Duration,
    pub global_risk_stop: GlobalRiskStop,
    pub accounts: Vec<AccountSection>,
    /// `{strategyName}_Global` sections, raw `key -> value` (coerced by the strategy runtime
    /// against each strategy's own parameter schema, per `spec.md` §4.D).
    pub strategy_globals: HashMap<String, HashMap<String, String>>,
    /// `{accountId}_{strategyName}` sections.
    pub strategy_account_overrides: HashMap<(AccountId, String), HashMap<String, String>>,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(parse::parse(&ini))
    }
}
