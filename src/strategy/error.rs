use thiserror::Error;

/// Failures surfaced by one strategy task (`spec.md` §4.D "Failure model"). Per §7, these never
/// propagate to the Session Supervisor beyond the task dying — the Core Loop only observes that
/// the task is no longer running.
#[derive(Error, Debug)]
pub enum StrategyTaskError {
    #[error("on_init failed: {0}")]
    Init(String),

    #[error("on_bar failed: {0}")]
    Bar(String),

    #[error(transparent)]
    Gateway(#[from] crate::gateway::GatewayError),

    #[error("strategy task did not join within the 5s timeout")]
    JoinTimeout,

    #[error("strategy task panicked")]
    Panicked,

    #[error("no strategy registered under the name {0:?}")]
    UnknownStrategy(String),
}
