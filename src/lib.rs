//! QUORUM TRADER: replicated prediction-market decision engine
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod markets;
pub mod strategy;
pub mod consensus;
pub mod engine;
pub mod llm;
pub mod chain;
pub mod storage;
pub mod dashboard;
