//! The replicated round state machine.
//!
//! `RoundTransitionEngine` holds the active round, its collector and the
//! shared decision state. It does no IO: callers feed it submissions and
//! the current time, and it answers with the transition taken, if any.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::payloads::{Payload, PredictionVote};
use super::rounds::{Event, Round};
use crate::config::ConsensusConfig;
use crate::consensus::{DbKey, DbValue, SharedDecisionState, StateDiff, ThresholdCollector};
use crate::types::TraderError;

/// One edge taken by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub period: u64,
    pub from: Round,
    pub event: Event,
    pub to: Round,
    /// Unix seconds at which the transition happened.
    pub at: i64,
    /// The agreed payload, when the edge was taken on agreement.
    pub winner: Option<Payload>,
}

#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub round: Duration,
    pub redeem: Duration,
}

impl Timeouts {
    pub fn for_event(&self, event: Event) -> Option<Duration> {
        match event {
            Event::RoundTimeout => Some(self.round),
            Event::RedeemRoundTimeout => Some(self.redeem),
            _ => None,
        }
    }
}

impl From<&ConsensusConfig> for Timeouts {
    fn from(cfg: &ConsensusConfig) -> Self {
        Self {
            round: cfg.round_timeout(),
            redeem: cfg.redeem_round_timeout(),
        }
    }
}

pub struct RoundTransitionEngine {
    participants: Vec<String>,
    threshold: usize,
    timeouts: Timeouts,
    max_rounds_per_period: usize,
    round: Round,
    entered_at: i64,
    collector: ThresholdCollector<Payload>,
    state: SharedDecisionState,
    history: Vec<Transition>,
}

impl RoundTransitionEngine {
    pub fn new(
        participants: Vec<String>,
        cfg: &ConsensusConfig,
        now: i64,
    ) -> Result<Self, TraderError> {
        let threshold = cfg.threshold_for(participants.len());
        if participants.is_empty() || threshold == 0 || threshold > participants.len() {
            return Err(TraderError::Config(format!(
                "threshold {threshold} invalid for {} participants",
                participants.len()
            )));
        }
        let collector = ThresholdCollector::new(participants.iter().cloned(), threshold);
        Ok(Self {
            participants,
            threshold,
            timeouts: Timeouts::from(cfg),
            max_rounds_per_period: cfg.max_rounds_per_period,
            round: Round::INITIAL,
            entered_at: now,
            collector,
            state: SharedDecisionState::new(),
            history: Vec::new(),
        })
    }

    pub fn current_round(&self) -> Round {
        self.round
    }

    pub fn is_final(&self) -> bool {
        self.round.is_final()
    }

    pub fn state(&self) -> &SharedDecisionState {
        &self.state
    }

    pub fn period(&self) -> u64 {
        self.state.period()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn participants(&self) -> &[String] {
        &self.participants
    }

    /// Transitions taken in the current period.
    pub fn history(&self) -> &[Transition] {
        &self.history
    }

    pub fn entered_at(&self) -> i64 {
        self.entered_at
    }

    /// Unix second at which the active round times out, if it can.
    pub fn deadline(&self) -> Option<i64> {
        let event = self.round.timeout_event()?;
        let timeout = self.timeouts.for_event(event)?;
        Some(self.entered_at + timeout.as_secs() as i64)
    }

    pub fn submit(&mut self, agent: &str, payload: Payload) -> Result<(), TraderError> {
        if !payload.belongs_to(self.round) {
            return Err(TraderError::PayloadMismatch { round: self.round });
        }
        debug!(agent, round = %self.round, kind = payload.kind(), "Payload submitted");
        self.collector.submit(agent, payload)
    }

    /// Advance if the active round has an outcome at `now`.
    ///
    /// Agreement wins over a timeout that expired in the same step.
    pub fn process(&mut self, now: i64) -> Result<Option<Transition>, TraderError> {
        if self.round.is_final() {
            return Ok(None);
        }

        if let Some(winner) = self.collector.majority_value().cloned() {
            let votes = self.collector.submissions().clone();
            let (diff, event) = end_block(self.round, &winner, votes, &self.state);

            if event == Event::Done {
                let missing = self.state.missing_after(&diff, self.round.post_conditions());
                if !missing.is_empty() {
                    return Err(TraderError::PostconditionViolated {
                        round: self.round,
                        missing: names(&missing),
                    });
                }
            }
            self.state.apply(diff);
            return self.take(event, Some(winner), now).map(Some);
        }

        if !self.collector.majority_possible() && self.round.accepts(Event::NoMajority) {
            warn!(
                round = %self.round,
                submitted = self.collector.n_submitted(),
                "No majority possible"
            );
            return self.transition(Event::NoMajority, now).map(Some);
        }

        if let (Some(deadline), Some(event)) = (self.deadline(), self.round.timeout_event()) {
            if now >= deadline {
                warn!(round = %self.round, secs = now - self.entered_at, "Round timed out");
                return self.transition(event, now).map(Some);
            }
        }

        Ok(None)
    }

    /// Take the table edge for `event` and enter the next round.
    pub fn transition(&mut self, event: Event, now: i64) -> Result<Transition, TraderError> {
        self.take(event, None, now)
    }

    fn take(
        &mut self,
        event: Event,
        winner: Option<Payload>,
        now: i64,
    ) -> Result<Transition, TraderError> {
        let from = self.round;
        let to = from
            .next(event)
            .ok_or(TraderError::UnknownTransition { round: from, event })?;

        if self.history.len() >= self.max_rounds_per_period {
            return Err(TraderError::RoundLimitExceeded(self.max_rounds_per_period));
        }
        self.enter(to, now)?;

        let transition = Transition {
            period: self.state.period(),
            from,
            event,
            to,
            at: now,
            winner,
        };
        info!(
            period = transition.period,
            from = %from,
            event = %event,
            to = %to,
            "Round transition"
        );
        self.history.push(transition.clone());
        Ok(transition)
    }

    /// From a final round, continue into the next app of the period.
    ///
    /// Returns the round entered, or `None` when the period is over.
    pub fn chain_final(&mut self, now: i64) -> Result<Option<Round>, TraderError> {
        if !self.round.is_final() {
            return Ok(None);
        }
        match self.round.chained_start() {
            Some(next) => {
                debug!(from = %self.round, to = %next, "Chaining final round");
                self.enter(next, now)?;
                Ok(Some(next))
            }
            None => Ok(None),
        }
    }

    /// Keep only the cross-period keys and restart at the initial round.
    pub fn reset_for_next_period(&mut self, now: i64) {
        self.state.start_new_period();
        self.history.clear();
        self.round = Round::INITIAL;
        self.entered_at = now;
        self.collector.clear();
        info!(period = self.state.period(), "Starting new period");
    }

    fn enter(&mut self, round: Round, now: i64) -> Result<(), TraderError> {
        let missing = self.state.missing(round.pre_conditions());
        if !missing.is_empty() {
            return Err(TraderError::PreconditionViolated {
                round,
                missing: names(&missing),
            });
        }
        self.round = round;
        self.entered_at = now;
        self.collector.clear();
        Ok(())
    }
}

fn names(keys: &[DbKey]) -> Vec<String> {
    keys.iter().map(|k| k.name().to_string()).collect()
}

// ---------------------------------------------------------------------------
// End-of-round rules
// ---------------------------------------------------------------------------

fn participant_key(round: Round) -> Option<DbKey> {
    match round {
        Round::CheckBenchmarkingModeRound => Some(DbKey::ParticipantToBenchmarkingCheck),
        Round::RandomnessRound | Round::BenchmarkingRandomnessRound => {
            Some(DbKey::ParticipantToRandomness)
        }
        Round::SamplingRound => Some(DbKey::ParticipantToSampling),
        Round::SubscriptionRound | Round::ClaimRound => Some(DbKey::ParticipantToSubscription),
        Round::PredictionRound => Some(DbKey::ParticipantToPrediction),
        Round::BetPlacementRound => Some(DbKey::ParticipantToBetPlacement),
        Round::BlacklistingRound => Some(DbKey::ParticipantToBlacklist),
        Round::RedeemRound => Some(DbKey::ParticipantToRedeem),
        Round::HandleFailedTxRound => Some(DbKey::ParticipantToHandleFailedTx),
        _ => None,
    }
}

fn vote_event(round: Round, vote: Option<bool>) -> Event {
    match (round, vote) {
        (Round::CheckBenchmarkingModeRound, Some(true)) => Event::BenchmarkingEnabled,
        (Round::CheckBenchmarkingModeRound, Some(false)) => Event::BenchmarkingDisabled,
        (Round::ClaimRound, Some(true)) => Event::Done,
        (Round::ClaimRound, _) => Event::SubscriptionError,
        (Round::HandleFailedTxRound, Some(true)) => Event::Blacklist,
        (Round::HandleFailedTxRound, _) => Event::NoOp,
        _ => Event::None,
    }
}

/// Compute the agreed writes and the event for `round` given its winner.
fn end_block(
    round: Round,
    winner: &Payload,
    votes: BTreeMap<String, Payload>,
    state: &SharedDecisionState,
) -> (StateDiff, Event) {
    let mut diff = StateDiff::new();
    if let Some(key) = participant_key(round) {
        diff = diff.set(key, DbValue::Votes(votes));
    }

    let event = match winner {
        Payload::Voting { vote } => {
            if round == Round::CheckBenchmarkingModeRound {
                if let Some(enabled) = vote {
                    diff = diff.set(DbKey::BenchmarkingMode, DbValue::Flag(*enabled));
                }
            }
            vote_event(round, *vote)
        }

        Payload::Randomness { randomness, .. } => {
            if randomness.is_empty() {
                Event::None
            } else {
                diff = diff.set(DbKey::MostVotedRandomness, DbValue::Text(randomness.clone()));
                Event::Done
            }
        }

        Payload::Sampling {
            bets_hash,
            index,
            fetch_failed,
        } => match (fetch_failed, index) {
            (true, _) => Event::FetchError,
            (false, None) => Event::None,
            (false, Some(i)) => {
                diff = diff.set(DbKey::SampledBetIndex, DbValue::Index(*i));
                if let Some(hash) = bets_hash {
                    diff = diff.set(DbKey::BetsHash, DbValue::Text(hash.clone()));
                }
                if state.is_benchmarking() || state.contains(DbKey::ParticipantToSubscription) {
                    Event::BenchmarkingEnabled
                } else {
                    Event::Done
                }
            }
        },

        Payload::TxPreparation {
            tx_hash,
            mocking_mode,
            ..
        } => {
            diff = diff.set(DbKey::MockingMode, DbValue::Flag(*mocking_mode));
            if *mocking_mode {
                Event::MockTx
            } else {
                match tx_hash {
                    Some(hash) => {
                        diff = diff.set(DbKey::MostVotedTxHash, DbValue::Text(hash.clone()));
                        Event::Done
                    }
                    None if round == Round::SubscriptionRound => Event::NoSubscription,
                    None => Event::NoRedeeming,
                }
            }
        }

        Payload::BetPlacement {
            tx_hash,
            mocking_mode,
            wallet_balance,
            token_balance,
            ..
        } => {
            if let Some(balance) = wallet_balance {
                diff = diff.set(DbKey::WalletBalance, DbValue::Amount(*balance));
            }
            if let Some(balance) = token_balance {
                diff = diff.set(DbKey::TokenBalance, DbValue::Amount(*balance));
            }
            let mut history = state.tx_hashes_history().to_vec();
            let event = if *mocking_mode {
                Event::MockTx
            } else {
                match tx_hash.as_deref() {
                    None => Event::InsufficientBalance,
                    Some("") => Event::CalcBuyAmountFailed,
                    Some(hash) => {
                        history.push(hash.to_string());
                        diff = diff.set(DbKey::MostVotedTxHash, DbValue::Text(hash.to_string()));
                        Event::Done
                    }
                }
            };
            diff = diff.set(DbKey::TxHashesHistory, DbValue::Hashes(history));
            event
        }

        Payload::Prediction { vote } => {
            diff = diff.set(DbKey::MostVotedPrediction, DbValue::Prediction(*vote));
            match vote {
                PredictionVote::Done => Event::Done,
                PredictionVote::Unprofitable => Event::Unprofitable,
            }
        }

        Payload::Blacklisting { bets_hash } => match bets_hash {
            Some(hash) => {
                diff = diff.set(DbKey::BetsHash, DbValue::Text(hash.clone()));
                Event::Done
            }
            None => Event::None,
        },
    };

    (diff, event)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
