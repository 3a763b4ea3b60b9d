pub mod bet;
pub mod chain;
pub mod client;
pub mod config;
pub mod deployment;
pub mod payload;
pub mod reporter;
pub mod submitter;
pub mod ui;
pub mod wallets;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
