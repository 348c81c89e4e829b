//! Strategy parameter schema and the merge precedence `spec.md` §4.D defines: `schema defaults` ←
//! `global section` ← `per-account section` ← `one-shot overrides`. Grounded on the teacher's
//! ini-to-typed-struct coercion convention in `crate::config::parse` (`field`/`field_string`):
//! an unparseable value falls back rather than aborting, with a warning.

use std::collections::HashMap;
use tracing::warn;

/// The declared type of one parameter, as named in a strategy's schema (`spec.md` §4.D).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ParamType {
    Int,
    Float,
    Bool,
    String,
}

/// A resolved parameter value, after type coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
}

impl ParamValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(v) => Some(v),
            _ => None,
        }
    }
}

/// One entry in a strategy's static parameter schema (`spec.md` §4.D: `name → {label, type,
/// default}`).
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub label: String,
    pub kind: ParamType,
    pub default: ParamValue,
}

pub type ParamSchema = HashMap<String, ParamSpec>;

fn coerce(kind: ParamType, raw: &str, strategy: &str, param: &str) -> Option<ParamValue> {
    match kind {
        ParamType::Int => raw.parse().ok().map(ParamValue::Int),
        ParamType::Float => raw.parse().ok().map(ParamValue::Float),
        ParamType::Bool => raw.parse().ok().map(ParamValue::Bool),
        ParamType::String => Some(ParamValue::String(raw.to_string())),
    }
    .or_else(|| {
        warn!(strategy, param, raw, "unparseable strategy parameter, keeping prior value");
        None
    })
}

/// Materializes the parameter map for one strategy instance in the precedence `spec.md` §4.D
/// mandates. Each layer is an optional raw `key -> string` map (as read straight out of the ini
/// file's `{strategyName}_Global` / `{accountId}_{strategyName}` sections, or the one-shot
/// `startStrategy` overrides); layers are applied in order, later wins.
pub fn merge_params(
    strategy_name: &str,
    schema: &ParamSchema,
    global: Option<&HashMap<String, String>>,
    per_account: Option<&HashMap<String, String>>,
    overrides: Option<&HashMap<String, String>>,
) -> HashMap<String, ParamValue> {
    let layers = [global, per_account, overrides];

    schema
        .iter()
        .map(|(name, spec)| {
            let mut value = spec.default.clone();
            for layer in layers.iter().flatten() {
                if let Some(raw) = layer.get(name) {
                    if let Some(coerced) = coerce(spec.kind, raw, strategy_name, name) {
                        value = coerced;
                    }
                }
            }
            (name.clone(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> ParamSchema {
        let mut schema = ParamSchema::new();
        schema.insert(
            "riskPct".to_string(),
            ParamSpec {
                label: "Risk %".to_string(),
                kind: ParamType::Float,
                default: ParamValue::Float(1.0),
            },
        );
        schema
    }

    #[test]
    fn later_layers_override_earlier_ones() {
        let global: HashMap<String, String> = [("riskPct".to_string(), "2.0".to_string())].into();
        let per_account: HashMap<String, String> = [("riskPct".to_string(), "3.0".to_string())].into();

        let merged = merge_params("LotteryTicket", &schema(), Some(&global), Some(&per_account), None);
        assert_eq!(merged["riskPct"], ParamValue::Float(3.0));
    }

    #[test]
    fn unparseable_override_falls_back_to_the_last_good_value() {
        let global: HashMap<String, String> = [("riskPct".to_string(), "2.0".to_string())].into();
        let overrides: HashMap<String, String> = [("riskPct".to_string(), "not-a-number".to_string())].into();

        let merged = merge_params("LotteryTicket", &schema(), Some(&global), None, Some(&overrides));
        assert_eq!(merged["riskPct"], ParamValue::Float(2.0));
    }

    #[test]
    fn missing_layers_fall_back_to_schema_default() {
        let merged = merge_params("LotteryTicket", &schema(), None, None, None);
        assert_eq!(merged["riskPct"], ParamValue::Float(1.0));
    }
}
