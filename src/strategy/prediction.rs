//! Profitability rule for oracle answers and bet sizing.

use anyhow::Result;
use tracing::{info, warn};

use crate::config::StrategyConfig;
use crate::engine::payloads::PredictionVote;
use crate::types::{PredictionResponse, Side};

/// Profitable iff the oracle says Yes with confidence above the floor.
pub fn is_profitable(response: &PredictionResponse, min_confidence: f64) -> bool {
    response.side() == Some(Side::Yes) && response.confidence > min_confidence
}

/// Turn an oracle call result into this agent's prediction vote.
///
/// Oracle failures and rejected answers vote `Unprofitable`.
pub fn vote_for(result: Result<PredictionResponse>, min_confidence: f64) -> PredictionVote {
    let response = match result.and_then(|r| r.into_verdict().map_err(Into::into)) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "Oracle answer rejected, treating bet as unprofitable");
            return PredictionVote::Unprofitable;
        }
    };

    let profitable = is_profitable(&response, min_confidence);
    info!(
        prediction = ?response.prediction,
        confidence = response.confidence,
        profitable,
        "Prediction evaluated"
    );
    if profitable {
        PredictionVote::Done
    } else {
        PredictionVote::Unprofitable
    }
}

/// Amount to wager given the wallet balance, or `None` when the wallet
/// cannot cover the bet while keeping the floor balance.
pub fn bet_amount(cfg: &StrategyConfig, wallet_balance: u128) -> Option<u128> {
    let amount = u128::from(cfg.bet_amount);
    let required = amount.checked_add(u128::from(cfg.floor_balance))?;
    if amount == 0 || wallet_balance < required {
        return None;
    }
    Some(amount)
}
