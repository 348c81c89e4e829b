use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SupervisorError {
    #[error("account {0} is unknown to the supervisor")]
    UnknownAccount(crate::model::AccountId),
}
