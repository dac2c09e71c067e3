//! Account lifecycle model.
//!
//! An [`Account`] carries an explicit [`AccountState`] rather than being
//! tracked by which collection it lives in. The only legal transitions are
//! `Pending -> Verified` and `Pending -> Blocked`; both are applied through
//! [`Account::reclassify`].

use std::fmt;

use crate::error::CoreError;

/// Notification action that marks an account as verified. Every other
/// action value blocks the account, with the action kept as the reason.
pub const ACTION_ENTER: &str = "ENTER";

/// Block reason recorded when a job outlives the configured timeout.
pub const REASON_TIMEOUT: &str = "TIMEOUT";

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

/// Opaque account secret.
///
/// `Debug` and `Display` are redacted so the value never reaches a log line
/// by accident. Use [`Credential::expose`] where the raw value is required
/// (the job argument vector and the account files).
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

// ---------------------------------------------------------------------------
// State and outcome
// ---------------------------------------------------------------------------

/// Lifecycle state of an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountState {
    Pending,
    Verified,
    Blocked { reason: String },
}

impl AccountState {
    pub fn is_pending(&self) -> bool {
        matches!(self, AccountState::Pending)
    }
}

impl fmt::Display for AccountState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountState::Pending => f.write_str("pending"),
            AccountState::Verified => f.write_str("verified"),
            AccountState::Blocked { reason } => write!(f, "blocked ({reason})"),
        }
    }
}

/// Terminal result of verifying an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Verified,
    Blocked(String),
}

impl Outcome {
    /// Map a notification action tag to an outcome.
    ///
    /// `ENTER` is the only verifying action; any other value blocks and is
    /// retained verbatim as the reason.
    pub fn from_action(action: &str) -> Self {
        if action == ACTION_ENTER {
            Outcome::Verified
        } else {
            Outcome::Blocked(action.to_string())
        }
    }

    /// The state an account moves into when this outcome is applied.
    pub fn target_state(&self) -> AccountState {
        match self {
            Outcome::Verified => AccountState::Verified,
            Outcome::Blocked(reason) => AccountState::Blocked {
                reason: reason.clone(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// A single account known to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub name: String,
    pub credential: Credential,
    pub state: AccountState,
}

impl Account {
    /// Create an account in the `Pending` state.
    pub fn pending(name: impl Into<String>, credential: Credential) -> Self {
        Self {
            name: name.into(),
            credential,
            state: AccountState::Pending,
        }
    }

    /// Create an account already in a terminal state (loaded from the
    /// verified or blocked file).
    pub fn classified(name: impl Into<String>, credential: Credential, outcome: &Outcome) -> Self {
        Self {
            name: name.into(),
            credential,
            state: outcome.target_state(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state.is_pending()
    }

    /// Fails with [`CoreError::NotPending`] once the account is classified.
    pub fn check_reclassify(&self) -> Result<(), CoreError> {
        if self.is_pending() {
            Ok(())
        } else {
            Err(CoreError::NotPending {
                account: self.name.clone(),
                state: self.state.clone(),
            })
        }
    }

    /// Move a pending account into the outcome's terminal state.
    ///
    /// Fails without mutating when the account is already classified.
    pub fn reclassify(&mut self, outcome: &Outcome) -> Result<(), CoreError> {
        self.check_reclassify()?;
        self.state = outcome.target_state();
        Ok(())
    }
}

/// Validate an account name taken from a file row or a notification.
///
/// Names become CSV fields and job arguments, so they must be non-empty and
/// free of the record (`,`) and protocol (`:`) delimiters and line breaks.
pub fn validate_account_name(name: &str) -> Result<(), CoreError> {
    if name.is_empty() {
        return Err(CoreError::Validation(
            "Account name must not be empty".to_string(),
        ));
    }
    if name
        .chars()
        .any(|c| c == ',' || c == ':' || c == '\n' || c == '\r')
    {
        return Err(CoreError::Validation(format!(
            "Account name \"{name}\" contains a reserved delimiter"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn enter_action_verifies() {
        assert_eq!(Outcome::from_action("ENTER"), Outcome::Verified);
    }

    #[test]
    fn other_actions_block_with_reason() {
        assert_eq!(
            Outcome::from_action("BANNED_REASON"),
            Outcome::Blocked("BANNED_REASON".to_string())
        );
        // Matching is case-sensitive.
        assert_eq!(
            Outcome::from_action("enter"),
            Outcome::Blocked("enter".to_string())
        );
    }

    #[test]
    fn reclassify_pending_to_verified() {
        let mut account = Account::pending("alice", Credential::new("pw"));
        account.reclassify(&Outcome::Verified).unwrap();
        assert_eq!(account.state, AccountState::Verified);
    }

    #[test]
    fn reclassify_is_one_way() {
        let mut account = Account::pending("bob", Credential::new("pw"));
        account
            .reclassify(&Outcome::Blocked("LOCKED".to_string()))
            .unwrap();

        let err = account.reclassify(&Outcome::Verified).unwrap_err();
        assert_matches!(err, CoreError::NotPending { ref account, .. } if account == "bob");
        assert_eq!(
            account.state,
            AccountState::Blocked {
                reason: "LOCKED".to_string()
            }
        );
    }

    #[test]
    fn credential_is_redacted() {
        let credential = Credential::new("hunter2");
        assert_eq!(format!("{credential:?}"), "Credential(***)");
        assert_eq!(credential.to_string(), "***");
        assert_eq!(credential.expose(), "hunter2");
    }

    #[test]
    fn account_name_validation() {
        assert!(validate_account_name("player_one").is_ok());
        assert!(validate_account_name("someone@example.com").is_ok());
        assert_matches!(validate_account_name(""), Err(CoreError::Validation(_)));
        assert_matches!(validate_account_name("a,b"), Err(CoreError::Validation(_)));
        assert_matches!(validate_account_name("a:b"), Err(CoreError::Validation(_)));
    }
}
