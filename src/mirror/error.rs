use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MirrorError {
    #[error(transparent)]
    Gate(#[from] crate::gate::GateError),
}
