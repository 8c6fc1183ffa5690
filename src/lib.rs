//! Portfolio Advisor: risk-gated trade and liquidity recommendations for
//! accounts held in a NEAR portfolio contract.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod data;
pub mod ledger;
pub mod strategy;
pub mod engine;
pub mod storage;
