use crate::model::account::AccountId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How a mirrored order's side is derived from the master's (`spec.md` §3).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum CopyMode {
    Forward,
    Reverse,
}

/// How a mirrored order's volume is sized (`spec.md` §3, §4.C "Volume resolution").
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum VolumeMode {
    Same,
    Fixed,
    EquityRatio,
}

/// The kind of transform applied to a symbol when no per-master override matches.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum SymbolRuleKind {
    None,
    Prefix,
    Suffix,
    /// Only used inside the per-master override map (`spec.md` §3): replaces the symbol wholesale.
    Replace,
}

/// A single symbol mapping rule: either the follower's default, or a per-master override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolRule {
    pub kind: SymbolRuleKind,
    pub text: String,
}

impl SymbolRule {
    /// Applies this rule to a master symbol, producing the follower-side symbol.
    pub fn apply(&self, master_symbol: &str) -> String {
        match self.kind {
            SymbolRuleKind::None => master_symbol.to_string(),
            SymbolRuleKind::Prefix => format!("{}{}", self.text, master_symbol),
            SymbolRuleKind::Suffix => format!("{}{}", master_symbol, self.text),
            SymbolRuleKind::Replace => self.text.clone(),
        }
    }
}

/// Per-follower mirroring policy (`spec.md` §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowerConfig {
    pub enabled: bool,
    pub follow_master_id: AccountId,
    pub magic: i64,
    pub copy_mode: CopyMode,
    pub volume_mode: VolumeMode,
    pub fixed_lot: f64,
    pub default_symbol_rule: SymbolRuleKind,
    pub default_symbol_text: String,
    /// Default 200 points per `spec.md` §4.C.
    pub slippage_points: i32,
    /// Exact master-symbol override, keyed by the master's symbol name.
    pub symbol_overrides: HashMap<String, SymbolRule>,
    /// Optional pre-trade margin check (`SPEC_FULL.md` §11.3): skip an open if the follower's
    /// last-known `margin_free` is below the margin `orderCalcMargin` reports for it. Off by
    /// default — does not change behavior unless explicitly enabled.
    pub margin_check_enabled: bool,
}

impl FollowerConfig {
    /// Resolves the follower-side symbol for a master symbol, per `spec.md` §4.C "Open sweep":
    /// an exact override takes precedence, then the follower's default rule, else the master
    /// symbol unchanged.
    pub fn resolve_symbol(&self, master_symbol: &str) -> String {
        if let Some(rule) = self.symbol_overrides.get(master_symbol) {
            return rule.apply(master_symbol);
        }

        let default_rule = SymbolRule {
            kind: self.default_symbol_rule,
            text: self.default_symbol_text.clone(),
        };
        default_rule.apply(master_symbol)
    }
}
