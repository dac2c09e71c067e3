//! Domain types shared by the `osverify` crates: the account state
//! machine, the control-channel message format, and the verification job
//! command line. No I/O lives here.

pub mod account;
pub mod error;
pub mod job;
pub mod protocol;
pub mod types;
