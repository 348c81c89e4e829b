//! An explicit strategy registration table (`spec.md` §9 Design Notes: "replace [dynamic
//! filesystem discovery] with an explicit registration table... keep the parameter schema as
//! data, not metaprogramming"), rather than the teacher's original source's directory-scanning
//! plugin loader.

use super::params::ParamSchema;
use super::Strategy;
use crate::gateway::TradingGateway;
use crate::model::bar::Timeframe;
use std::collections::HashMap;
use std::sync::Arc;

/// Builds one strategy instance bound to one account's gateway, symbol, and timeframe, with its
/// already-merged parameter map (`spec.md` §4.D `startStrategy`).
pub type StrategyFactory =
    fn(Arc<dyn TradingGateway>, String, Timeframe, HashMap<String, super::params::ParamValue>) -> Box<dyn Strategy>;

/// One entry in the registration table: a strategy's identity, its parameter schema (used both
/// to validate/merge `startStrategy` overrides and to describe the strategy to a UI), and the
/// factory that builds a fresh instance.
#[derive(Clone)]
pub struct StrategyDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub schema: ParamSchema,
    pub factory: StrategyFactory,
}

/// The process-wide table of strategies available to `startStrategy` (`spec.md` §4.D). Built
/// once at startup; there is no runtime discovery or reload.
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    entries: HashMap<String, StrategyDescriptor>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: StrategyDescriptor) {
        self.entries.insert(descriptor.name.to_string(), descriptor);
    }

    pub fn get(&self, name: &str) -> Option<&StrategyDescriptor> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::super::params::{ParamSpec, ParamType, ParamValue};
    use super::super::StrategyTaskError;
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    struct NoOpStrategy;

    #[async_trait]
    impl Strategy for NoOpStrategy {
        async fn on_init(&mut self) -> Result<(), StrategyTaskError> {
            Ok(())
        }

        async fn on_bar(&mut self, _time: DateTime<Utc>) -> Result<(), StrategyTaskError> {
            Ok(())
        }

        async fn on_deinit(&mut self) {}
    }

    fn build(
        _gateway: Arc<dyn TradingGateway>,
        _symbol: String,
        _timeframe: Timeframe,
        _params: HashMap<String, ParamValue>,
    ) -> Box<dyn Strategy> {
        Box::new(NoOpStrategy)
    }

    #[test]
    fn registered_strategies_are_retrievable_by_name() {
        let mut registry = StrategyRegistry::new();
        let mut schema = ParamSchema::new();
        schema.insert(
            "period".to_string(),
            ParamSpec {
                label: "Period".to_string(),
                kind: ParamType::Int,
                default: ParamValue::Int(14),
            },
        );
        registry.register(StrategyDescriptor {
            name: "NoOp",
            description: "does nothing",
            schema,
            factory: build,
        });

        assert!(registry.get("NoOp").is_some());
        assert!(registry.get("Missing").is_none());
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["NoOp"]);
    }
}
