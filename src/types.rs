//! Shared types for the trader.
//!
//! These types form the data model used across all modules: the tracked
//! bet and its queue lifecycle, the raw records delivered by the market
//! data source, the oracle's answer, and the domain error enum.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::engine::rounds::{Event, Round};

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

/// One bet record as delivered by the market data source.
///
/// Field names follow the subgraph's camelCase schema so a fetched batch
/// can be deserialized as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBet {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub collateral_token: String,
    #[serde(default)]
    pub creator: String,
    #[serde(default)]
    pub fee: u128,
    /// Unix seconds after which the market stops accepting decisions.
    pub opening_timestamp: i64,
    #[serde(default = "default_slot_count")]
    pub outcome_slot_count: u32,
    #[serde(default)]
    pub outcome_token_amounts: Vec<u128>,
    #[serde(default)]
    pub outcome_token_marginal_prices: Vec<f64>,
    #[serde(default)]
    pub outcomes: Vec<String>,
    pub scaled_liquidity_measure: f64,
}

fn default_slot_count() -> u32 {
    2
}

/// Outcome of one fetch cycle against the market data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    Success,
    Partial,
    Failure,
}

impl fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchStatus::Success => write!(f, "success"),
            FetchStatus::Partial => write!(f, "partial"),
            FetchStatus::Failure => write!(f, "failure"),
        }
    }
}

/// A batch of raw bets plus the status of the fetch that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchBatch {
    pub status: FetchStatus,
    /// Market (creator / subgraph) the records belong to.
    pub market: String,
    pub records: Vec<RawBet>,
}

impl FetchBatch {
    pub fn success(market: &str, records: Vec<RawBet>) -> Self {
        Self {
            status: FetchStatus::Success,
            market: market.to_string(),
            records,
        }
    }

    pub fn failure(market: &str) -> Self {
        Self {
            status: FetchStatus::Failure,
            market: market.to_string(),
            records: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == FetchStatus::Success
    }
}

// ---------------------------------------------------------------------------
// Bet
// ---------------------------------------------------------------------------

/// Processing state of a bet within the registry's priority cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Fresh,
    ToProcess,
    /// Terminal: never selected, requeued or unblacklisted again.
    Expired,
}

impl QueueStatus {
    pub fn is_expired(self) -> bool {
        self == QueueStatus::Expired
    }

    pub fn is_fresh(self) -> bool {
        self == QueueStatus::Fresh
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueStatus::Fresh => write!(f, "FRESH"),
            QueueStatus::ToProcess => write!(f, "TO_PROCESS"),
            QueueStatus::Expired => write!(f, "EXPIRED"),
        }
    }
}

/// A prediction-market question tracked across periods.
///
/// Market-facing fields are refreshed on every fetch; the bookkeeping
/// fields below `scaled_liquidity_measure` are owned by this agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bet {
    pub id: String,
    pub market: String,
    pub title: String,
    #[serde(rename = "collateralToken")]
    pub collateral_token: String,
    pub creator: String,
    pub fee: u128,
    #[serde(rename = "openingTimestamp")]
    pub opening_timestamp: i64,
    #[serde(rename = "outcomeSlotCount")]
    pub outcome_slot_count: u32,
    #[serde(rename = "outcomeTokenAmounts")]
    pub outcome_token_amounts: Vec<u128>,
    #[serde(rename = "outcomeTokenMarginalPrices")]
    pub outcome_token_marginal_prices: Vec<f64>,
    pub outcomes: Vec<String>,
    #[serde(rename = "scaledLiquidityMeasure")]
    pub scaled_liquidity_measure: f64,
    pub queue_no: u32,
    /// Zero until the bet has been processed for the first time.
    pub processed_timestamp: i64,
    pub n_bets: u32,
    pub invested_amount: u128,
    pub queue_status: QueueStatus,
}

impl Bet {
    /// Build a freshly tracked bet from a fetched record.
    pub fn from_raw(raw: RawBet, market: &str) -> Self {
        Self {
            id: raw.id,
            market: market.to_string(),
            title: raw.title,
            collateral_token: raw.collateral_token,
            creator: raw.creator,
            fee: raw.fee,
            opening_timestamp: raw.opening_timestamp,
            outcome_slot_count: raw.outcome_slot_count,
            outcome_token_amounts: raw.outcome_token_amounts,
            outcome_token_marginal_prices: raw.outcome_token_marginal_prices,
            outcomes: raw.outcomes,
            scaled_liquidity_measure: raw.scaled_liquidity_measure,
            queue_no: 0,
            processed_timestamp: 0,
            n_bets: 0,
            invested_amount: 0,
            queue_status: QueueStatus::Fresh,
        }
    }

    /// Refresh the market-facing fields in place, keeping local bookkeeping.
    pub fn update_market_info(&mut self, raw: &RawBet) {
        self.fee = raw.fee;
        self.opening_timestamp = raw.opening_timestamp;
        self.outcome_token_amounts = raw.outcome_token_amounts.clone();
        self.outcome_token_marginal_prices = raw.outcome_token_marginal_prices.clone();
        self.scaled_liquidity_measure = raw.scaled_liquidity_measure;
    }

    /// Whether this bet has ever been sampled and processed.
    pub fn is_processed(&self) -> bool {
        self.processed_timestamp != 0
    }

    pub fn has_bets(&self) -> bool {
        self.n_bets > 0
    }

    /// Move the bet to the next (lower-priority) queue bucket.
    pub fn blacklist(&mut self, now: i64) {
        if self.queue_status.is_expired() {
            return;
        }
        self.queue_no += 1;
        self.processed_timestamp = now;
    }

    /// Retire the bet permanently.
    pub fn blacklist_forever(&mut self) {
        self.queue_status = QueueStatus::Expired;
    }

    /// Record a placed bet of `amount` at `now`.
    pub fn record_placement(&mut self, amount: u128, now: i64) {
        self.n_bets += 1;
        self.invested_amount += amount;
        self.processed_timestamp = now;
    }

    /// Helper to build a test/sample bet with sensible defaults.
    #[cfg(test)]
    pub fn sample(id: &str, liquidity: f64, opening_timestamp: i64) -> Self {
        Bet::from_raw(
            RawBet {
                id: id.to_string(),
                title: format!("Will application_id '{id}' be funded?"),
                collateral_token: "0xe91d153e0b41518a2ce8dd3d7944fa863463a97d".to_string(),
                creator: "0x89c5cc945dd550bcffb72fe42bff002429f46fec".to_string(),
                fee: 20_000_000_000_000_000,
                opening_timestamp,
                outcome_slot_count: 2,
                outcome_token_amounts: vec![500, 500],
                outcome_token_marginal_prices: vec![0.5, 0.5],
                outcomes: vec!["Yes".to_string(), "No".to_string()],
                scaled_liquidity_measure: liquidity,
            },
            "omen_subgraph",
        )
    }
}

impl fmt::Display for Bet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} (liq={:.2} | opens={} | queue={}/{} | n_bets={} | invested={})",
            self.id,
            self.title,
            self.scaled_liquidity_measure,
            self.opening_timestamp,
            self.queue_no,
            self.queue_status,
            self.n_bets,
            self.invested_amount,
        )
    }
}

// ---------------------------------------------------------------------------
// Prediction oracle
// ---------------------------------------------------------------------------

/// Bet direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Side {
    Yes,
    No,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Yes => write!(f, "YES"),
            Side::No => write!(f, "NO"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictionLabel {
    Yes,
    No,
    #[serde(rename = "ERROR")]
    Error,
}

/// The oracle's answer to a market question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub prediction: PredictionLabel,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
}

impl PredictionResponse {
    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            prediction: PredictionLabel::Error,
            confidence: 0.0,
            reasoning: reason.into(),
        }
    }

    /// Reject error answers and non-positive confidence.
    pub fn into_verdict(self) -> Result<Self, TraderError> {
        if self.prediction == PredictionLabel::Error {
            return Err(TraderError::Oracle(format!(
                "oracle returned ERROR: {}",
                self.reasoning
            )));
        }
        if !(self.confidence > 0.0) {
            return Err(TraderError::Oracle(format!(
                "non-positive confidence {}",
                self.confidence
            )));
        }
        Ok(self)
    }

    /// The side this answer argues for, if any.
    pub fn side(&self) -> Option<Side> {
        match self.prediction {
            PredictionLabel::Yes => Some(Side::Yes),
            PredictionLabel::No => Some(Side::No),
            PredictionLabel::Error => None,
        }
    }
}

impl fmt::Display for PredictionResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} conf={:.0}% ({})",
            self.prediction,
            self.confidence * 100.0,
            self.reasoning,
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for the trader.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TraderError {
    #[error("Market data fetch failed ({market}): {message}")]
    FetchFailure { market: String, message: String },

    #[error("Threshold not reached in {0}")]
    ThresholdNotReached(Round),

    #[error("Oracle error: {0}")]
    Oracle(String),

    #[error("{round} entered without required keys: {missing:?}")]
    PreconditionViolated { round: Round, missing: Vec<String> },

    #[error("{round} completed without guaranteed keys: {missing:?}")]
    PostconditionViolated { round: Round, missing: Vec<String> },

    #[error("No transition from {round} on {event}")]
    UnknownTransition { round: Round, event: Event },

    #[error("Payload does not belong to {round}")]
    PayloadMismatch { round: Round },

    #[error("Agent {0} is not a participant")]
    UnknownAgent(String),

    #[error("Period exceeded {0} rounds")]
    RoundLimitExceeded(usize),

    #[error("Configuration error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
