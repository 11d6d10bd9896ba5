//! Mock market source for integration testing.
//!
//! Provides a deterministic `MarketSource` whose records and fetch status
//! are controllable from test code, all in-memory.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use quorum_trader::markets::MarketSource;
use quorum_trader::types::{FetchBatch, FetchStatus, RawBet};

pub const MARKET: &str = "omen_subgraph";

/// A mock market shared by every agent of a test.
///
/// Clones share state, so a test can change what the next fetch returns
/// after the agents were built.
#[derive(Clone)]
pub struct MockMarket {
    records: Arc<Mutex<Vec<RawBet>>>,
    status: Arc<Mutex<FetchStatus>>,
    fetches: Arc<AtomicUsize>,
}

impl MockMarket {
    pub fn new(records: Vec<RawBet>) -> Self {
        Self {
            records: Arc::new(Mutex::new(records)),
            status: Arc::new(Mutex::new(FetchStatus::Success)),
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set_status(&self, status: FetchStatus) {
        *self.status.lock().unwrap() = status;
    }

    pub fn set_records(&self, records: Vec<RawBet>) {
        *self.records.lock().unwrap() = records;
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketSource for MockMarket {
    async fn fetch_bets(&self) -> Result<FetchBatch> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let status = *self.status.lock().unwrap();
        let records = match status {
            FetchStatus::Success => self.records.lock().unwrap().clone(),
            _ => Vec::new(),
        };
        Ok(FetchBatch {
            status,
            market: MARKET.to_string(),
            records,
        })
    }

    fn name(&self) -> &str {
        MARKET
    }
}

/// A raw record opening two days after `now`.
pub fn raw_bet(id: &str, liquidity: f64, now: i64) -> RawBet {
    RawBet {
        id: id.to_string(),
        title: format!("Will application_id '{id}' be funded?"),
        collateral_token: "0xe91d153e0b41518a2ce8dd3d7944fa863463a97d".to_string(),
        creator: "0x89c5cc945dd550bcffb72fe42bff002429f46fec".to_string(),
        fee: 20_000_000_000_000_000,
        opening_timestamp: now + 2 * 24 * 60 * 60,
        outcome_slot_count: 2,
        outcome_token_amounts: vec![1_000, 1_000],
        outcome_token_marginal_prices: vec![0.5, 0.5],
        outcomes: vec!["Yes".to_string(), "No".to_string()],
        scaled_liquidity_measure: liquidity,
    }
}
