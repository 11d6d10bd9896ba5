//! On-chain collaborators: transaction preparation and shared randomness.
//!
//! The engine only needs prepared transaction hashes and a randomness
//! value per period; signing, broadcasting and settlement live behind
//! these traits. The dry-run implementations derive everything from
//! hashes of their inputs, so every agent computes the same answer.

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::types::{Bet, Side};

/// Builds the transactions the transaction-preparation rounds agree on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TxPreparer: Send + Sync {
    /// Whether transactions are mocked (no chain interaction at all).
    fn is_mocking(&self) -> bool;

    /// Subscription purchase, or `None` when no subscription is needed.
    async fn subscription_tx(&self) -> Result<Option<String>>;

    /// Whether the purchased subscription could be claimed.
    async fn claim_subscription(&self) -> Result<bool>;

    async fn bet_tx(&self, bet: &Bet, side: Side, amount: u128) -> Result<String>;

    /// Redemption of settled positions, or `None` when nothing is redeemable.
    async fn redeem_tx(&self) -> Result<Option<String>>;

    async fn wallet_balance(&self) -> Result<u128>;

    async fn token_balance(&self) -> Result<u128>;
}

/// Source of the consensus-derived randomness for each period.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RandomnessBeacon: Send + Sync {
    /// `(round_id, randomness)` for `period`, or `None` when unavailable.
    async fn beacon(&self, period: u64) -> Result<Option<(u64, String)>>;
}

fn hex_hash(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(b"|");
    }
    format!("0x{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// Dry run
// ---------------------------------------------------------------------------

/// Deterministic transaction preparer for local and dry-run trading.
#[derive(Debug, Clone)]
pub struct DryRunTxPreparer {
    pub mocking: bool,
    pub needs_subscription: bool,
    pub wallet_balance: u128,
    pub token_balance: u128,
}

impl DryRunTxPreparer {
    pub fn new(wallet_balance: u128) -> Self {
        Self {
            mocking: false,
            needs_subscription: false,
            wallet_balance,
            token_balance: 0,
        }
    }
}

#[async_trait]
impl TxPreparer for DryRunTxPreparer {
    fn is_mocking(&self) -> bool {
        self.mocking
    }

    async fn subscription_tx(&self) -> Result<Option<String>> {
        if !self.needs_subscription {
            return Ok(None);
        }
        Ok(Some(hex_hash(&["subscription"])))
    }

    async fn claim_subscription(&self) -> Result<bool> {
        Ok(true)
    }

    async fn bet_tx(&self, bet: &Bet, side: Side, amount: u128) -> Result<String> {
        let hash = hex_hash(&[&bet.id, &side.to_string(), &amount.to_string()]);
        debug!(bet_id = %bet.id, %side, amount, tx_hash = %hash, "Dry-run bet transaction");
        Ok(hash)
    }

    async fn redeem_tx(&self) -> Result<Option<String>> {
        Ok(None)
    }

    async fn wallet_balance(&self) -> Result<u128> {
        Ok(self.wallet_balance)
    }

    async fn token_balance(&self) -> Result<u128> {
        Ok(self.token_balance)
    }
}

/// Randomness derived from a shared salt and the period number.
#[derive(Debug, Clone)]
pub struct HashBeacon {
    salt: String,
}

impl HashBeacon {
    pub fn new(salt: &str) -> Self {
        Self {
            salt: salt.to_string(),
        }
    }
}

#[async_trait]
impl RandomnessBeacon for HashBeacon {
    async fn beacon(&self, period: u64) -> Result<Option<(u64, String)>> {
        let randomness = hex_hash(&[&self.salt, &period.to_string()]);
        Ok(Some((period + 1, randomness)))
    }
}
