use thiserror::Error;

/// Failures from the Terminal Gate surface (`spec.md` §4.A, §7). These are per-call, not
/// process-fatal — callers log and continue the next supervisor cycle.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GateError {
    #[error("terminal is not connected")]
    NotConnected,

    #[error("symbol {0} is not available on this terminal")]
    UnknownSymbol(String),

    #[error("terminal call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("terminal adapter rejected the call: {0}")]
    AdapterRejected(String),
}
