//! Line format of the account files: `account, credential[, reason]`.

use osverify_core::account::{validate_account_name, Credential};

/// One row of an account file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    pub account: String,
    pub credential: Credential,
    /// Block reason; only present in the blocked file.
    pub reason: Option<String>,
}

impl AccountRecord {
    /// Parse a single row. Returns `None` for blank lines and rows with
    /// fewer than two fields or an unusable account name.
    ///
    /// The reason column is everything after the second comma, so reasons
    /// that contain commas survive a reload.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let mut fields = line.splitn(3, ',');
        let account = fields.next()?.trim();
        let credential = fields.next()?.trim();
        if validate_account_name(account).is_err() {
            return None;
        }
        let reason = fields
            .next()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());

        Some(Self {
            account: account.to_string(),
            credential: Credential::new(credential),
            reason,
        })
    }

    /// Render the row with a trailing newline, ready to append.
    pub fn to_line(&self) -> String {
        match &self.reason {
            Some(reason) => format!(
                "{}, {}, {}\n",
                self.account,
                self.credential.expose(),
                reason
            ),
            None => format!("{}, {}\n", self.account, self.credential.expose()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_columns_with_whitespace() {
        let record = AccountRecord::parse("  alice ,  pw1  ").unwrap();
        assert_eq!(record.account, "alice");
        assert_eq!(record.credential.expose(), "pw1");
        assert_eq!(record.reason, None);
    }

    #[test]
    fn reason_keeps_embedded_commas() {
        let record = AccountRecord::parse("bob, pw2, LOCKED, by support").unwrap();
        assert_eq!(record.reason.as_deref(), Some("LOCKED, by support"));
    }

    #[test]
    fn skips_blank_and_short_rows() {
        assert!(AccountRecord::parse("").is_none());
        assert!(AccountRecord::parse("   ").is_none());
        assert!(AccountRecord::parse("only-account").is_none());
        assert!(AccountRecord::parse(", pw").is_none());
    }

    #[test]
    fn renders_rows_like_the_files() {
        let verified = AccountRecord {
            account: "alice".to_string(),
            credential: Credential::new("pw1"),
            reason: None,
        };
        assert_eq!(verified.to_line(), "alice, pw1\n");

        let blocked = AccountRecord {
            reason: Some("BANNED".to_string()),
            ..verified
        };
        assert_eq!(blocked.to_line(), "alice, pw1, BANNED\n");
    }
}
