//! Startup: load the account files into a store.

use osverify_db::{AccountFiles, AccountStore, DbError};

/// Load the source, verified, and blocked files, in that order.
///
/// Missing files are treated as empty. Accounts already present in the
/// verified or blocked file are dropped from the pending set, which is
/// what makes a re-run after a crash safe.
pub async fn load_accounts(files: AccountFiles) -> Result<AccountStore, DbError> {
    tracing::info!(
        source = %files.source.display(),
        verified = %files.verified.display(),
        blocked = %files.blocked.display(),
        "Loading account files",
    );

    let store = AccountStore::open(files).await?;
    let counts = store.counts();
    tracing::info!(
        pending = counts.pending,
        verified = counts.verified,
        blocked = counts.blocked,
        "Accounts loaded",
    );
    Ok(store)
}
