//! `osverify-worker` library crate.
//!
//! Re-exports internal modules for integration testing. The binary
//! entrypoint lives in `main.rs`.

pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod launcher;
pub mod listener;
pub mod logging;
pub mod pool;
pub mod supervisor;
pub mod timeout;
