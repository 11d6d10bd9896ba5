//! Payloads agents submit for each round.
//!
//! Every field is totally ordered (no floats) so the collector can break
//! ties on the payload itself.

use serde::Serialize;

use super::rounds::Round;

/// Outcome of the prediction round.
///
/// Declaration order fixes the tie-break: `Done` sorts before `Unprofitable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionVote {
    Done,
    Unprofitable,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    /// Yes/no/abstain vote for CheckBenchmarkingMode, Claim and HandleFailedTx.
    Voting { vote: Option<bool> },
    Randomness { round_id: u64, randomness: String },
    Sampling {
        bets_hash: Option<String>,
        index: Option<usize>,
        fetch_failed: bool,
    },
    /// Prepared transaction for Subscription and Redeem.
    TxPreparation {
        tx_submitter: String,
        tx_hash: Option<String>,
        mocking_mode: bool,
    },
    BetPlacement {
        /// `None` when the wallet cannot cover the bet, `Some("")` when the
        /// buy amount could not be computed.
        tx_hash: Option<String>,
        mocking_mode: bool,
        amount: u128,
        wallet_balance: Option<u128>,
        token_balance: Option<u128>,
    },
    Prediction { vote: PredictionVote },
    Blacklisting { bets_hash: Option<String> },
}

impl Payload {
    /// Whether this payload kind is the one `round` collects.
    pub fn belongs_to(&self, round: Round) -> bool {
        use Round::*;
        matches!(
            (self, round),
            (
                Payload::Voting { .. },
                CheckBenchmarkingModeRound | ClaimRound | HandleFailedTxRound
            ) | (
                Payload::Randomness { .. },
                RandomnessRound | BenchmarkingRandomnessRound
            ) | (Payload::Sampling { .. }, SamplingRound)
                | (Payload::TxPreparation { .. }, SubscriptionRound | RedeemRound)
                | (Payload::BetPlacement { .. }, BetPlacementRound)
                | (Payload::Prediction { .. }, PredictionRound)
                | (Payload::Blacklisting { .. }, BlacklistingRound)
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Voting { .. } => "voting",
            Payload::Randomness { .. } => "randomness",
            Payload::Sampling { .. } => "sampling",
            Payload::TxPreparation { .. } => "tx_preparation",
            Payload::BetPlacement { .. } => "bet_placement",
            Payload::Prediction { .. } => "prediction",
            Payload::Blacklisting { .. } => "blacklisting",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_round_membership() {
        let vote = Payload::Voting { vote: Some(true) };
        assert!(vote.belongs_to(Round::ClaimRound));
        assert!(vote.belongs_to(Round::CheckBenchmarkingModeRound));
        assert!(!vote.belongs_to(Round::SamplingRound));

        let tx = Payload::TxPreparation {
            tx_submitter: "agent_0".into(),
            tx_hash: None,
            mocking_mode: false,
        };
        assert!(tx.belongs_to(Round::RedeemRound));
        assert!(!tx.belongs_to(Round::BetPlacementRound));
    }

    #[test]
    fn test_no_payload_for_final_rounds() {
        let p = Payload::Blacklisting { bets_hash: None };
        for round in Round::ALL.iter().filter(|r| r.is_final()) {
            assert!(!p.belongs_to(*round));
        }
    }

    #[test]
    fn test_prediction_vote_order() {
        assert!(PredictionVote::Done < PredictionVote::Unprofitable);
    }

    #[test]
    fn test_payload_serializes_with_kind_tag() {
        let p = Payload::Prediction { vote: PredictionVote::Unprofitable };
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains("\"kind\":\"prediction\""));
        assert!(json.contains("unprofitable"));
    }
}
