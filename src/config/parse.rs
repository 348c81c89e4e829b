use super::{AccountSection, AppConfig, GlobalRiskStop};
use crate::model::{
    follower::{CopyMode, SymbolRule, SymbolRuleKind, VolumeMode},
    AccountId,
};
use ini::{Ini, Properties};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },
}

/// Extracts a field, falling back to `default` and logging a warning on a missing or
/// unparseable value (`spec.md` §7). Never returns an error — config parsing must not abort
/// startup.
fn field<T: std::str::FromStr>(section: &Properties, section_name: &str, key: &str, default: T) -> T {
    match section.get(key) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(section = section_name, key, raw, "unparseable config value, using default");
            default
        }),
    }
}

fn field_string(section: &Properties, key: &str, default: &str) -> String {
    section.get(key).map(str::to_string).unwrap_or_else(|| default.to_string())
}

fn parse_copy_mode(section: &Properties, section_name: &str) -> CopyMode {
    match section.get("copyMode") {
        Some("reverse") => CopyMode::Reverse,
        Some("forward") | None => CopyMode::Forward,
        Some(other) => {
            warn!(section = section_name, value = other, "unknown copyMode, defaulting to forward");
            CopyMode::Forward
        }
    }
}

fn parse_volume_mode(section: &Properties, section_name: &str) -> VolumeMode {
    match section.get("volumeMode") {
        Some("fixed") => VolumeMode::Fixed,
        Some("equityRatio") => VolumeMode::EquityRatio,
        Some("same") | None => VolumeMode::Same,
        Some(other) => {
            warn!(section = section_name, value = other, "unknown volumeMode, defaulting to same");
            VolumeMode::Same
        }
    }
}

fn parse_symbol_rule_kind(raw: Option<&str>, section_name: &str, key: &str) -> SymbolRuleKind {
    match raw {
        Some("prefix") => SymbolRuleKind::Prefix,
        Some("suffix") => SymbolRuleKind::Suffix,
        Some("replace") => SymbolRuleKind::Replace,
        Some("none") | None => SymbolRuleKind::None,
        Some(other) => {
            warn!(section = section_name, key, value = other, "unknown symbol rule, defaulting to none");
            SymbolRuleKind::None
        }
    }
}

/// Parses `symbol_map`'s `master->rule:text,master2->rule2:text2` format (`spec.md` §6).
fn parse_symbol_map(raw: &str, section_name: &str) -> HashMap<String, SymbolRule> {
    let mut map = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let Some((master_symbol, rule_and_text)) = entry.split_once("->") else {
            warn!(section = section_name, entry, "malformed symbol_map entry, skipping");
            continue;
        };
        let Some((rule, text)) = rule_and_text.split_once(':') else {
            warn!(section = section_name, entry, "malformed symbol_map entry, skipping");
            continue;
        };
        let kind = parse_symbol_rule_kind(Some(rule), section_name, "symbol_map");
        map.insert(
            master_symbol.trim().to_string(),
            SymbolRule {
                kind,
                text: text.trim().to_string(),
            },
        );
    }
    map
}

fn parse_account_section(name: &str, section: &Properties) -> AccountSection {
    let symbol_map = section
        .get("symbol_map")
        .map(|raw| parse_symbol_map(raw, name))
        .unwrap_or_default();

    let follow_master_id = section
        .get("followMasterId")
        .filter(|v| !v.is_empty())
        .map(|v| AccountId(v.to_string()));

    AccountSection {
        id: AccountId(name.to_string()),
        path: PathBuf::from(field_string(section, "path", "")),
        login: field(section, name, "login", 0u64),
        password_ciphertext: field_string(section, "password", ""),
        server: field_string(section, "server", ""),
        magic: field(section, name, "magic", 0i64),
        enabled: field(section, name, "enabled", false),
        follow_master_id,
        copy_mode: parse_copy_mode(section, name),
        default_symbol_rule: parse_symbol_rule_kind(section.get("defaultSymbolRule"), name, "defaultSymbolRule"),
        default_symbol_text: field_string(section, "defaultSymbolText", ""),
        volume_mode: parse_volume_mode(section, name),
        fixed_lot: field(section, name, "fixedLot", 0.01f64),
        symbol_map,
        slippage_points: field(section, name, "slippagePoints", 200i32),
        margin_check_enabled: field(section, name, "marginCheckEnabled", false),
    }
}

pub fn parse(ini: &Ini) -> AppConfig {
    let default_section = ini.section(None::<String>);

    let check_interval_secs = default_section
        .map(|s| field::<f64>(s, "DEFAULT", "checkInterval", 0.2))
        .unwrap_or(0.2);
    let check_interval = Duration::from_secs_f64(check_interval_secs.max(0.0));

    let global_risk_stop = GlobalRiskStop {
        enabled: default_section
            .map(|s| field(s, "DEFAULT", "globalRiskStopEnabled", false))
            .unwrap_or(false),
        equity_threshold: default_section
            .map(|s| field(s, "DEFAULT", "globalRiskEquityThreshold", 0.0))
            .unwrap_or(0.0),
    };

    let mut accounts = Vec::new();
    let mut strategy_globals: HashMap<String, HashMap<String, String>> = HashMap::new();
    let mut strategy_account_overrides: HashMap<(AccountId, String), HashMap<String, String>> =
        HashMap::new();

    for (section_name, section) in ini.iter() {
        let Some(section_name) = section_name else {
            continue;
        };

        if section_name.starts_with("master") || section_name.starts_with("slave") {
            accounts.push(parse_account_section(section_name, section));
        } else if let Some(strategy_name) = section_name.strip_suffix("_Global") {
            strategy_globals.insert(
                strategy_name.to_string(),
                section.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            );
        } else if let Some((account_id, strategy_name)) = split_account_strategy_section(section_name) {
            strategy_account_overrides.insert(
                (AccountId(account_id.to_string()), strategy_name.to_string()),
                section.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            );
        }
    }

    AppConfig {
        check_interval,
        global_risk_stop,
        accounts,
        strategy_globals,
        strategy_account_overrides,
    }
}

/// `{accountId}_{strategyName}` sections are distinguished from `{strategyName}_Global` by not
/// ending in `_Global` and by the account id prefix being a known `master{n}`/`slave{n}` shape.
fn split_account_strategy_section(section_name: &str) -> Option<(&str, &str)> {
    let idx = section_name.find('_')?;
    let (account_id, rest) = section_name.split_at(idx);
    let strategy_name = &rest[1..];
    if (account_id.starts_with("master") || account_id.starts_with("slave")) && !strategy_name.is_empty() {
        Some((account_id, strategy_name))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_symbol_map_entries() {
        let map = parse_symbol_map("EURUSD->suffix:.m, GBPUSD->replace:GBPUSD_ecn", "slave1");
        assert_eq!(map.get("EURUSD").unwrap().text, ".m");
        assert_eq!(map.get("GBPUSD").unwrap().kind, SymbolRuleKind::Replace);
    }

    #[test]
    fn splits_account_strategy_section_name() {
        assert_eq!(split_account_strategy_section("slave1_LotteryTicket"), Some(("slave1", "LotteryTicket")));
        assert_eq!(split_account_strategy_section("LotteryTicket_Global"), None);
        assert_eq!(split_account_strategy_section("master1"), None);
    }

    #[test]
    fn full_ini_round_trip_parses_accounts_and_strategy_sections() {
        let raw = r#"
[DEFAULT]
checkInterval = 0.5
globalRiskStopEnabled = true
globalRiskEquityThreshold = 500.0

[master1]
path = C:\terminal64.exe
login = 111
password = ciphertext-blob
server = Demo-Server
magic = 1
enabled = true

[slave1]
path = C:\terminal64_2.exe
login = 222
password = ciphertext-blob-2
server = Demo-Server-2
magic = 99
enabled = true
followMasterId = master1
copyMode = reverse
volumeMode = fixed
fixedLot = 0.2
defaultSymbolRule = suffix
defaultSymbolText = .m
symbol_map = EURUSD->replace:EURUSD_ecn

[LotteryTicket_Global]
risk_pct = 1.0

[slave1_LotteryTicket]
risk_pct = 2.0
"#;
        let ini = Ini::load_from_str(raw).unwrap();
        let config = parse(&ini);

        assert_eq!(config.check_interval, Duration::from_secs_f64(0.5));
        assert!(config.global_risk_stop.enabled);
        assert_eq!(config.global_risk_stop.equity_threshold, 500.0);
        assert_eq!(config.accounts.len(), 2);

        let slave1 = config
            .accounts
            .iter()
            .find(|a| a.id.as_str() == "slave1")
            .unwrap();
        assert_eq!(slave1.copy_mode, CopyMode::Reverse);
        assert_eq!(slave1.volume_mode, VolumeMode::Fixed);
        assert_eq!(slave1.fixed_lot, 0.2);
        assert_eq!(slave1.symbol_map.get("EURUSD").unwrap().kind, SymbolRuleKind::Replace);

        assert_eq!(
            config.strategy_globals.get("LotteryTicket").unwrap().get("risk_pct"),
            Some(&"1.0".to_string())
        );
        assert_eq!(
            config
                .strategy_account_overrides
                .get(&(AccountId("slave1".into()), "LotteryTicket".into()))
                .unwrap()
                .get("risk_pct"),
            Some(&"2.0".to_string())
        );
    }
}
