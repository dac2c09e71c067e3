//! In-memory account store backed by the account files.
//!
//! [`AccountStore`] holds every known account with an explicit
//! [`AccountState`]. Accounts keep the order in which they were first
//! loaded, which is the order the dispatch loop admits them in.
//!
//! The store is not internally synchronised. The orchestrator owns it
//! behind a single lock together with the worker pool.

use std::collections::HashMap;

use osverify_core::account::{Account, AccountState, Credential, Outcome};
use osverify_core::error::CoreError;

use crate::error::DbError;
use crate::files::{append_record, read_records, AccountFiles};
use crate::records::AccountRecord;

/// Per-state account counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub pending: usize,
    pub verified: usize,
    pub blocked: usize,
}

/// Which terminal file a batch of records came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Verified,
    Blocked,
}

pub struct AccountStore {
    files: AccountFiles,
    accounts: Vec<Account>,
    /// Account name -> position in `accounts`.
    index: HashMap<String, usize>,
}

impl AccountStore {
    /// Create an empty store that appends to `files`.
    pub fn new(files: AccountFiles) -> Self {
        Self {
            files,
            accounts: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Load all three files: source first, then verified, then blocked.
    ///
    /// Accounts listed in the verified or blocked file are removed from the
    /// pending set, so a replay after a crash never re-admits an account
    /// that was already classified.
    pub async fn open(files: AccountFiles) -> Result<Self, DbError> {
        let mut store = Self::new(files);

        let source = read_records(&store.files.source).await?;
        store.load_source(source);

        let verified = read_records(&store.files.verified).await?;
        store.load_classified(Classification::Verified, verified);

        let blocked = read_records(&store.files.blocked).await?;
        store.load_classified(Classification::Blocked, blocked);

        Ok(store)
    }

    pub fn files(&self) -> &AccountFiles {
        &self.files
    }

    /// Add source rows as pending accounts. Returns how many were added.
    ///
    /// A name seen before keeps its first row.
    pub fn load_source(&mut self, records: Vec<AccountRecord>) -> usize {
        let mut added = 0;
        for record in records {
            if self.index.contains_key(&record.account) {
                tracing::debug!(account = %record.account, "Duplicate source row ignored");
                continue;
            }
            self.insert(Account::pending(record.account, record.credential));
            added += 1;
        }
        added
    }

    /// Apply rows from the verified or blocked file.
    ///
    /// Pending accounts move to the terminal state (drop-on-load). Unknown
    /// accounts are added directly in that state. Accounts already
    /// classified keep their first classification. Returns how many
    /// accounts were dropped from pending.
    pub fn load_classified(
        &mut self,
        classification: Classification,
        records: Vec<AccountRecord>,
    ) -> usize {
        let mut dropped = 0;
        for record in records {
            let outcome = match classification {
                Classification::Verified => Outcome::Verified,
                Classification::Blocked => Outcome::Blocked(record.reason.unwrap_or_default()),
            };

            match self.index.get(&record.account) {
                Some(&i) => {
                    let account = &mut self.accounts[i];
                    if account.reclassify(&outcome).is_ok() {
                        dropped += 1;
                    } else {
                        tracing::warn!(
                            account = %account.name,
                            state = %account.state,
                            "Account classified more than once, keeping first",
                        );
                    }
                }
                None => {
                    self.insert(Account::classified(record.account, record.credential, &outcome));
                }
            }
        }
        dropped
    }

    /// Reclassify a pending account and persist the record.
    ///
    /// The row is appended (and synced) before the in-memory state changes,
    /// so a failed write leaves the account pending. Unknown or
    /// already-classified accounts are rejected without touching any file.
    pub async fn reclassify(&mut self, name: &str, outcome: &Outcome) -> Result<(), DbError> {
        let i = *self
            .index
            .get(name)
            .ok_or_else(|| CoreError::AccountNotFound(name.to_string()))?;
        self.accounts[i].check_reclassify()?;

        let account = &self.accounts[i];
        let (path, reason) = match outcome {
            Outcome::Verified => (&self.files.verified, None),
            Outcome::Blocked(reason) => (&self.files.blocked, Some(reason.clone())),
        };
        let record = AccountRecord {
            account: account.name.clone(),
            credential: account.credential.clone(),
            reason,
        };
        append_record(path, &record).await?;

        self.accounts[i].reclassify(outcome)?;
        tracing::info!(account = %name, state = %self.accounts[i].state, "Account reclassified");
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Account> {
        self.index.get(name).map(|&i| &self.accounts[i])
    }

    pub fn state(&self, name: &str) -> Option<&AccountState> {
        self.get(name).map(|a| &a.state)
    }

    /// Credential of a pending account, `None` once classified or unknown.
    pub fn pending_credential(&self, name: &str) -> Option<&Credential> {
        self.get(name)
            .filter(|a| a.is_pending())
            .map(|a| &a.credential)
    }

    pub fn is_pending(&self, name: &str) -> bool {
        self.get(name).is_some_and(Account::is_pending)
    }

    /// Names of pending accounts in load order.
    pub fn pending_names(&self) -> Vec<String> {
        self.accounts
            .iter()
            .filter(|a| a.is_pending())
            .map(|a| a.name.clone())
            .collect()
    }

    pub fn counts(&self) -> StoreCounts {
        let mut counts = StoreCounts::default();
        for account in &self.accounts {
            match account.state {
                AccountState::Pending => counts.pending += 1,
                AccountState::Verified => counts.verified += 1,
                AccountState::Blocked { .. } => counts.blocked += 1,
            }
        }
        counts
    }

    fn insert(&mut self, account: Account) {
        self.index.insert(account.name.clone(), self.accounts.len());
        self.accounts.push(account);
    }
}
