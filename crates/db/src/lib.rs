//! File-backed account persistence.
//!
//! Three line-oriented files hold the source (pending) accounts and the
//! append-only verified and blocked audit trails. [`AccountStore`] loads
//! them into memory and appends a row on every reclassification.

pub mod error;
pub mod files;
pub mod records;
pub mod store;

pub use error::DbError;
pub use files::AccountFiles;
pub use store::{AccountStore, Classification, StoreCounts};
