//! Tender agents: automated bidders for reverse-price quotation sessions.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod auction;
pub mod config;
pub mod engine;
pub mod error;
pub mod storage;
pub mod strategy;
pub mod types;
