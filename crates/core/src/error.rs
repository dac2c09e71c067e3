use crate::account::AccountState;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Account {account} is not pending (currently {state})")]
    NotPending { account: String, state: AccountState },

    #[error("Validation failed: {0}")]
    Validation(String),
}
