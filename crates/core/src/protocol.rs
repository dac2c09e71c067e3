//! Control-channel message format.
//!
//! Each line on the control channel is `account:action[:arg]*`. The
//! listener parses lines with [`Notification::parse`]; parsing never
//! panics and rejects anything with fewer than two non-empty leading
//! fields.

use crate::account::{validate_account_name, Outcome};

/// Field separator within a notification line.
pub const FIELD_SEPARATOR: char = ':';

/// Error type for malformed notification lines.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("notification is empty")]
    Empty,

    #[error("notification has no action field: {0:?}")]
    MissingAction(String),

    #[error("invalid account in notification: {0}")]
    InvalidAccount(String),
}

/// Inbound notification reporting an account's outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub account: String,
    pub action: String,
    /// Trailing fields after the action. Accepted and logged, otherwise
    /// unused.
    pub args: Vec<String>,
}

impl Notification {
    /// Parse a single line (without or with its trailing newline).
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Err(ProtocolError::Empty);
        }

        let mut fields = line.split(FIELD_SEPARATOR);
        // `split` always yields at least one item.
        let account = fields.next().unwrap_or_default().trim();
        let action = match fields.next().map(str::trim) {
            Some(action) if !action.is_empty() => action,
            _ => return Err(ProtocolError::MissingAction(line.to_string())),
        };

        validate_account_name(account).map_err(|e| ProtocolError::InvalidAccount(e.to_string()))?;

        Ok(Self {
            account: account.to_string(),
            action: action.to_string(),
            args: fields.map(|f| f.trim().to_string()).collect(),
        })
    }

    /// Build a notification from an internal source (e.g. the job timeout
    /// reaper) rather than the wire.
    pub fn internal(account: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            action: action.into(),
            args: Vec::new(),
        }
    }

    pub fn outcome(&self) -> Outcome {
        Outcome::from_action(&self.action)
    }
}
