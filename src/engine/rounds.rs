//! Round and event catalogue plus the static transition table.
//!
//! Every agent must compute this table identically; it is expressed as
//! plain data (`row`) so the engine never dispatches through behaviour
//! objects to decide where to go next.

use serde::Serialize;
use std::fmt;

use crate::consensus::shared::DbKey;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Named outcome of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    Done,
    None,
    NoMajority,
    RoundTimeout,
    Unprofitable,
    FetchError,
    Tie,
    MechResponseError,
    InsufficientBalance,
    SlotsUnsupportedError,
    NoRedeeming,
    RedeemRoundTimeout,
    MockTx,
    MockMechRequest,
    Blacklist,
    NoOp,
    CalcBuyAmountFailed,
    BenchmarkingEnabled,
    BenchmarkingDisabled,
    BenchmarkingFinished,
    NewSimulatedResample,
    NoSubscription,
    SubscriptionError,
}

impl Event {
    /// Wire label shared by all agents.
    pub fn label(&self) -> &'static str {
        match self {
            Event::Done => "done",
            Event::None => "none",
            Event::NoMajority => "no_majority",
            Event::RoundTimeout => "round_timeout",
            Event::Unprofitable => "unprofitable",
            Event::FetchError => "fetch_error",
            Event::Tie => "tie",
            Event::MechResponseError => "mech_response_error",
            Event::InsufficientBalance => "insufficient_balance",
            Event::SlotsUnsupportedError => "slots_unsupported_error",
            Event::NoRedeeming => "no_redeeming",
            Event::RedeemRoundTimeout => "redeem_round_timeout",
            Event::MockTx => "mock_tx",
            Event::MockMechRequest => "mock_mech_request",
            Event::Blacklist => "blacklist",
            Event::NoOp => "no_op",
            Event::CalcBuyAmountFailed => "calc_buy_amount_failed",
            Event::BenchmarkingEnabled => "benchmarking_enabled",
            Event::BenchmarkingDisabled => "benchmarking_disabled",
            Event::BenchmarkingFinished => "benchmarking_finished",
            Event::NewSimulatedResample => "new_simulated_resample",
            Event::NoSubscription => "no_subscription",
            Event::SubscriptionError => "subscription_error",
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Event::RoundTimeout | Event::RedeemRoundTimeout)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Rounds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Round {
    CheckBenchmarkingModeRound,
    RandomnessRound,
    BenchmarkingRandomnessRound,
    SamplingRound,
    SubscriptionRound,
    ClaimRound,
    PredictionRound,
    BetPlacementRound,
    BlacklistingRound,
    RedeemRound,
    HandleFailedTxRound,
    // Final rounds
    FinishedDecisionMakerRound,
    FinishedWithoutDecisionRound,
    ImpossibleRound,
    BenchmarkingDoneRound,
    BenchmarkingModeDisabledRound,
    FinishedWithoutRedeemingRound,
    RefillRequiredRound,
    FinishedSubscriptionRound,
}

use Event as E;
use Round as R;

const CLAIM_ROW: &[(Event, Round)] = &[
    (E::Done, R::SamplingRound),
    (E::NoMajority, R::ClaimRound),
    (E::RoundTimeout, R::ClaimRound),
    (E::SubscriptionError, R::ClaimRound),
];

const HANDLE_FAILED_TX_ROW: &[(Event, Round)] = &[
    (E::NoOp, R::RedeemRound),
    (E::Blacklist, R::BlacklistingRound),
    (E::NoMajority, R::HandleFailedTxRound),
];

const RANDOMNESS_ROW: &[(Event, Round)] = &[
    (E::Done, R::SamplingRound),
    (E::RoundTimeout, R::RandomnessRound),
    (E::NoMajority, R::RandomnessRound),
    (E::None, R::ImpossibleRound),
];

const BENCHMARKING_RANDOMNESS_ROW: &[(Event, Round)] = &[
    (E::Done, R::SamplingRound),
    (E::RoundTimeout, R::BenchmarkingRandomnessRound),
    (E::NoMajority, R::BenchmarkingRandomnessRound),
    (E::None, R::ImpossibleRound),
];

const SUBSCRIPTION_ROW: &[(Event, Round)] = &[
    (E::Done, R::FinishedSubscriptionRound),
    (E::NoSubscription, R::SamplingRound),
    (E::SubscriptionError, R::SubscriptionRound),
    (E::NoMajority, R::SubscriptionRound),
    (E::RoundTimeout, R::SubscriptionRound),
    (E::None, R::SubscriptionRound),
    (E::MockTx, R::SamplingRound),
];

const SAMPLING_ROW: &[(Event, Round)] = &[
    (E::Done, R::SubscriptionRound),
    (E::BenchmarkingEnabled, R::PredictionRound),
    (E::None, R::FinishedWithoutDecisionRound),
    (E::FetchError, R::ImpossibleRound),
    (E::NoMajority, R::SamplingRound),
    (E::RoundTimeout, R::SamplingRound),
    (E::NewSimulatedResample, R::SamplingRound),
    (E::BenchmarkingFinished, R::BenchmarkingDoneRound),
];

const PREDICTION_ROW: &[(Event, Round)] = &[
    (E::Done, R::BetPlacementRound),
    (E::Unprofitable, R::BlacklistingRound),
    (E::RoundTimeout, R::PredictionRound),
    (E::NoMajority, R::PredictionRound),
];

const BET_PLACEMENT_ROW: &[(Event, Round)] = &[
    (E::Done, R::FinishedDecisionMakerRound),
    (E::InsufficientBalance, R::RefillRequiredRound),
    (E::NoMajority, R::BetPlacementRound),
    (E::RoundTimeout, R::BetPlacementRound),
    (E::None, R::ImpossibleRound),
    (E::MockTx, R::RedeemRound),
    (E::CalcBuyAmountFailed, R::HandleFailedTxRound),
];

const REDEEM_ROW: &[(Event, Round)] = &[
    (E::Done, R::FinishedDecisionMakerRound),
    (E::NoRedeeming, R::FinishedWithoutRedeemingRound),
    (E::RedeemRoundTimeout, R::FinishedWithoutRedeemingRound),
    (E::NoMajority, R::RedeemRound),
    (E::None, R::ImpossibleRound),
    (E::MockTx, R::SamplingRound),
];

const BLACKLISTING_ROW: &[(Event, Round)] = &[
    (E::Done, R::FinishedWithoutDecisionRound),
    (E::NoMajority, R::BlacklistingRound),
    (E::RoundTimeout, R::BlacklistingRound),
    (E::None, R::ImpossibleRound),
    (E::FetchError, R::ImpossibleRound),
    (E::MockTx, R::FinishedWithoutDecisionRound),
];

const CHECK_BENCHMARKING_ROW: &[(Event, Round)] = &[
    (E::BenchmarkingEnabled, R::BenchmarkingRandomnessRound),
    (E::BenchmarkingDisabled, R::BenchmarkingModeDisabledRound),
    (E::SubscriptionError, R::ImpossibleRound),
    (E::None, R::ImpossibleRound),
    (E::Done, R::ImpossibleRound),
    (E::NoMajority, R::CheckBenchmarkingModeRound),
    (E::RoundTimeout, R::CheckBenchmarkingModeRound),
];

impl Round {
    /// Entry point of every period.
    pub const INITIAL: Round = Round::CheckBenchmarkingModeRound;

    pub const ALL: [Round; 19] = [
        R::CheckBenchmarkingModeRound,
        R::RandomnessRound,
        R::BenchmarkingRandomnessRound,
        R::SamplingRound,
        R::SubscriptionRound,
        R::ClaimRound,
        R::PredictionRound,
        R::BetPlacementRound,
        R::BlacklistingRound,
        R::RedeemRound,
        R::HandleFailedTxRound,
        R::FinishedDecisionMakerRound,
        R::FinishedWithoutDecisionRound,
        R::ImpossibleRound,
        R::BenchmarkingDoneRound,
        R::BenchmarkingModeDisabledRound,
        R::FinishedWithoutRedeemingRound,
        R::RefillRequiredRound,
        R::FinishedSubscriptionRound,
    ];

    /// Outgoing edges of this round. Final rounds have none.
    pub fn row(&self) -> &'static [(Event, Round)] {
        match self {
            R::ClaimRound => CLAIM_ROW,
            R::HandleFailedTxRound => HANDLE_FAILED_TX_ROW,
            R::RandomnessRound => RANDOMNESS_ROW,
            R::BenchmarkingRandomnessRound => BENCHMARKING_RANDOMNESS_ROW,
            R::SubscriptionRound => SUBSCRIPTION_ROW,
            R::SamplingRound => SAMPLING_ROW,
            R::PredictionRound => PREDICTION_ROW,
            R::BetPlacementRound => BET_PLACEMENT_ROW,
            R::RedeemRound => REDEEM_ROW,
            R::BlacklistingRound => BLACKLISTING_ROW,
            R::CheckBenchmarkingModeRound => CHECK_BENCHMARKING_ROW,
            _ => &[],
        }
    }

    /// Look up `(self, event) -> next`.
    pub fn next(&self, event: Event) -> Option<Round> {
        self.row()
            .iter()
            .find(|(e, _)| *e == event)
            .map(|(_, next)| *next)
    }

    pub fn accepts(&self, event: Event) -> bool {
        self.next(event).is_some()
    }

    pub fn is_final(&self) -> bool {
        matches!(
            self,
            R::FinishedDecisionMakerRound
                | R::FinishedWithoutDecisionRound
                | R::ImpossibleRound
                | R::BenchmarkingDoneRound
                | R::BenchmarkingModeDisabledRound
                | R::FinishedWithoutRedeemingRound
                | R::RefillRequiredRound
                | R::FinishedSubscriptionRound
        )
    }

    /// The timeout event this round's row declares, if any.
    pub fn timeout_event(&self) -> Option<Event> {
        self.row()
            .iter()
            .map(|(e, _)| *e)
            .find(Event::is_timeout)
    }

    /// Keys that must exist in the shared state before this round runs.
    pub fn pre_conditions(&self) -> &'static [DbKey] {
        const RANDOMNESS_AND_SAMPLING: &[DbKey] =
            &[DbKey::MostVotedRandomness, DbKey::ParticipantToSampling];
        match self {
            R::BetPlacementRound | R::BlacklistingRound | R::ClaimRound | R::RedeemRound => {
                RANDOMNESS_AND_SAMPLING
            }
            R::SamplingRound => &[DbKey::MostVotedRandomness],
            _ => &[],
        }
    }

    /// Keys this round guarantees once it completes with agreement.
    pub fn post_conditions(&self) -> &'static [DbKey] {
        match self {
            R::RandomnessRound | R::BenchmarkingRandomnessRound => &[DbKey::MostVotedRandomness],
            R::BetPlacementRound => &[DbKey::TxHashesHistory],
            R::BlacklistingRound => &[DbKey::ParticipantToBlacklist],
            R::ClaimRound | R::SubscriptionRound => &[DbKey::ParticipantToSubscription],
            R::RedeemRound => &[DbKey::ParticipantToRedeem],
            R::SamplingRound => &[DbKey::ParticipantToSampling],
            _ => &[],
        }
    }

    /// Where the surrounding app continues after this final round within
    /// the same period. `None` ends the period.
    pub fn chained_start(&self) -> Option<Round> {
        match self {
            R::BenchmarkingModeDisabledRound => Some(R::RandomnessRound),
            R::FinishedSubscriptionRound => Some(R::ClaimRound),
            _ => None,
        }
    }

    /// Human-readable name and description for status endpoints.
    pub fn info(&self) -> (&'static str, &'static str) {
        match self {
            R::CheckBenchmarkingModeRound => (
                "Checking if the benchmarking mode is enabled",
                "Checks if the benchmarking mode is enabled",
            ),
            R::RandomnessRound => ("Gathering randomness", "Gathers randomness"),
            R::BenchmarkingRandomnessRound => (
                "Gathering randomness in benchmarking mode",
                "Gathers randomness in benchmarking mode",
            ),
            R::SamplingRound => ("Sampling a bet", "Samples a bet"),
            R::SubscriptionRound => ("Ordering a subscription", "Purchases a subscription"),
            R::ClaimRound => (
                "Preparing a claim transaction",
                "Prepares a claim transaction for the subscription the agent has purchased",
            ),
            R::PredictionRound => (
                "Predicting the bet's answer",
                "Asks the prediction oracle whether the sampled bet is profitable",
            ),
            R::BetPlacementRound => ("Placing a bet", "Attempting to place a bet on a market"),
            R::BlacklistingRound => (
                "Blacklisting the sampled bet",
                "Blacklists the sampled bet and updates the bets",
            ),
            R::RedeemRound => (
                "Preparing a redeem transaction",
                "Prepares a transaction to redeem the winnings",
            ),
            R::HandleFailedTxRound => ("Handling a failed transaction", "Handles a failed transaction"),
            R::FinishedDecisionMakerRound => (
                "Finished deciding",
                "A decision was reached and acted upon",
            ),
            R::FinishedWithoutDecisionRound => (
                "Finished without a decision",
                "No bet was acted upon in this period",
            ),
            R::ImpossibleRound => (
                "Impossible to reach a decision",
                "Represents that it is impossible to reach a decision with the given parametrization",
            ),
            R::BenchmarkingDoneRound => ("Benchmarking finished", "Benchmarking run is complete"),
            R::BenchmarkingModeDisabledRound => (
                "Benchmarking mode disabled",
                "Continues with the regular trading flow",
            ),
            R::FinishedWithoutRedeemingRound => (
                "Finished without redeeming",
                "Nothing was redeemed in this period",
            ),
            R::RefillRequiredRound => (
                "Refill required",
                "The wallet balance is too low to place the bet",
            ),
            R::FinishedSubscriptionRound => (
                "Subscription purchased",
                "Continues with claiming the subscription",
            ),
        }
    }
}

impl fmt::Display for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
