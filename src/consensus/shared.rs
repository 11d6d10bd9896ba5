//! Cross-round key/value store agreed on by every agent.
//!
//! Rounds never write here directly. They read an immutable snapshot and
//! hand back a [`StateDiff`] which the engine applies once a quorum agreed.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::engine::payloads::{Payload, PredictionVote};

/// Keys of the shared decision state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DbKey {
    BenchmarkingMode,
    ParticipantToBenchmarkingCheck,
    MostVotedRandomness,
    ParticipantToRandomness,
    ParticipantToSampling,
    SampledBetIndex,
    BetsHash,
    ParticipantToSubscription,
    ParticipantToPrediction,
    MostVotedPrediction,
    ParticipantToBetPlacement,
    TxHashesHistory,
    MostVotedTxHash,
    WalletBalance,
    TokenBalance,
    MockingMode,
    ParticipantToBlacklist,
    ParticipantToRedeem,
    ParticipantToHandleFailedTx,
}

/// Keys that survive into the next period.
pub const CROSS_PERIOD_KEYS: &[DbKey] = &[DbKey::TxHashesHistory, DbKey::ParticipantToBlacklist];

impl DbKey {
    pub fn name(&self) -> &'static str {
        match self {
            DbKey::BenchmarkingMode => "benchmarking_mode",
            DbKey::ParticipantToBenchmarkingCheck => "participant_to_benchmarking_check",
            DbKey::MostVotedRandomness => "most_voted_randomness",
            DbKey::ParticipantToRandomness => "participant_to_randomness",
            DbKey::ParticipantToSampling => "participant_to_sampling",
            DbKey::SampledBetIndex => "sampled_bet_index",
            DbKey::BetsHash => "bets_hash",
            DbKey::ParticipantToSubscription => "participant_to_subscription",
            DbKey::ParticipantToPrediction => "participant_to_prediction",
            DbKey::MostVotedPrediction => "most_voted_prediction",
            DbKey::ParticipantToBetPlacement => "participant_to_bet_placement",
            DbKey::TxHashesHistory => "tx_hashes_history",
            DbKey::MostVotedTxHash => "most_voted_tx_hash",
            DbKey::WalletBalance => "wallet_balance",
            DbKey::TokenBalance => "token_balance",
            DbKey::MockingMode => "mocking_mode",
            DbKey::ParticipantToBlacklist => "participant_to_blacklist",
            DbKey::ParticipantToRedeem => "participant_to_redeem",
            DbKey::ParticipantToHandleFailedTx => "participant_to_handle_failed_tx",
        }
    }
}

impl fmt::Display for DbKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Values stored under a [`DbKey`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbValue {
    Flag(bool),
    Index(usize),
    Amount(u128),
    Text(String),
    Hashes(Vec<String>),
    /// Full submission map of a completed round.
    Votes(BTreeMap<String, Payload>),
    Prediction(PredictionVote),
}

// ---------------------------------------------------------------------------
// Diff
// ---------------------------------------------------------------------------

/// Writes produced by a round's end-of-block logic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateDiff {
    writes: BTreeMap<DbKey, DbValue>,
}

impl StateDiff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: DbKey, value: DbValue) -> Self {
        self.writes.insert(key, value);
        self
    }

    pub fn contains(&self, key: DbKey) -> bool {
        self.writes.contains_key(&key)
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &DbKey> {
        self.writes.keys()
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Versioned snapshot of the shared decision state.
///
/// Cloning is cheap: the map is shared until the next `apply`.
#[derive(Debug, Clone, Default)]
pub struct SharedDecisionState {
    data: Arc<BTreeMap<DbKey, DbValue>>,
    version: u64,
    period: u64,
}

impl SharedDecisionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn period(&self) -> u64 {
        self.period
    }

    /// Number of diffs applied since the state was created.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn get(&self, key: DbKey) -> Option<&DbValue> {
        self.data.get(&key)
    }

    pub fn contains(&self, key: DbKey) -> bool {
        self.data.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Keys from `required` that are absent.
    pub fn missing(&self, required: &[DbKey]) -> Vec<DbKey> {
        required
            .iter()
            .filter(|k| !self.contains(**k))
            .copied()
            .collect()
    }

    /// Keys from `required` absent from both this state and `diff`.
    pub fn missing_after(&self, diff: &StateDiff, required: &[DbKey]) -> Vec<DbKey> {
        required
            .iter()
            .filter(|k| !self.contains(**k) && !diff.contains(**k))
            .copied()
            .collect()
    }

    /// Produce the next version with `diff` written over this one.
    pub fn apply(&mut self, diff: StateDiff) {
        if diff.is_empty() {
            return;
        }
        let data = Arc::make_mut(&mut self.data);
        data.extend(diff.writes);
        self.version += 1;
    }

    /// Drop everything except the cross-period keys and bump the period.
    pub fn start_new_period(&mut self) {
        let kept: BTreeMap<DbKey, DbValue> = self
            .data
            .iter()
            .filter(|(k, _)| CROSS_PERIOD_KEYS.contains(*k))
            .map(|(k, v)| (*k, v.clone()))
            .collect();
        self.data = Arc::new(kept);
        self.period += 1;
        self.version += 1;
    }

    // ---- typed accessors

    pub fn flag(&self, key: DbKey) -> Option<bool> {
        match self.get(key) {
            Some(DbValue::Flag(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn text(&self, key: DbKey) -> Option<&str> {
        match self.get(key) {
            Some(DbValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn amount(&self, key: DbKey) -> Option<u128> {
        match self.get(key) {
            Some(DbValue::Amount(a)) => Some(*a),
            _ => None,
        }
    }

    pub fn most_voted_randomness(&self) -> Option<&str> {
        self.text(DbKey::MostVotedRandomness)
    }

    pub fn sampled_bet_index(&self) -> Option<usize> {
        match self.get(DbKey::SampledBetIndex) {
            Some(DbValue::Index(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn bets_hash(&self) -> Option<&str> {
        self.text(DbKey::BetsHash)
    }

    pub fn most_voted_prediction(&self) -> Option<PredictionVote> {
        match self.get(DbKey::MostVotedPrediction) {
            Some(DbValue::Prediction(p)) => Some(*p),
            _ => None,
        }
    }

    pub fn tx_hashes_history(&self) -> &[String] {
        match self.get(DbKey::TxHashesHistory) {
            Some(DbValue::Hashes(h)) => h.as_slice(),
            _ => &[],
        }
    }

    pub fn votes(&self, key: DbKey) -> Option<&BTreeMap<String, Payload>> {
        match self.get(key) {
            Some(DbValue::Votes(v)) => Some(v),
            _ => None,
        }
    }

    pub fn is_benchmarking(&self) -> bool {
        self.flag(DbKey::BenchmarkingMode).unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_bumps_version_and_keeps_old_snapshot() {
        let mut state = SharedDecisionState::new();
        let before = state.clone();
        state.apply(StateDiff::new().set(DbKey::MostVotedRandomness, DbValue::Text("abc".into())));

        assert_eq!(state.version(), 1);
        assert_eq!(state.most_voted_randomness(), Some("abc"));
        assert!(before.is_empty());
        assert_eq!(before.version(), 0);
    }

    #[test]
    fn test_empty_diff_is_a_noop() {
        let mut state = SharedDecisionState::new();
        state.apply(StateDiff::new());
        assert_eq!(state.version(), 0);
    }

    #[test]
    fn test_new_period_keeps_cross_period_keys() {
        let mut state = SharedDecisionState::new();
        state.apply(
            StateDiff::new()
                .set(DbKey::TxHashesHistory, DbValue::Hashes(vec!["0x1".into()]))
                .set(DbKey::ParticipantToBlacklist, DbValue::Votes(BTreeMap::new()))
                .set(DbKey::MostVotedRandomness, DbValue::Text("seed".into()))
                .set(DbKey::SampledBetIndex, DbValue::Index(3)),
        );
        state.start_new_period();

        assert_eq!(state.period(), 1);
        assert_eq!(state.tx_hashes_history(), &["0x1".to_string()]);
        assert!(state.contains(DbKey::ParticipantToBlacklist));
        assert!(state.most_voted_randomness().is_none());
        assert!(state.sampled_bet_index().is_none());
    }

    #[test]
    fn test_missing_after_diff() {
        let state = SharedDecisionState::new();
        let diff = StateDiff::new().set(DbKey::ParticipantToSampling, DbValue::Votes(BTreeMap::new()));
        let missing = state.missing_after(
            &diff,
            &[DbKey::ParticipantToSampling, DbKey::MostVotedRandomness],
        );
        assert_eq!(missing, vec![DbKey::MostVotedRandomness]);
    }

    #[test]
    fn test_typed_accessor_rejects_wrong_variant() {
        let mut state = SharedDecisionState::new();
        state.apply(StateDiff::new().set(DbKey::SampledBetIndex, DbValue::Text("1".into())));
        assert!(state.sampled_bet_index().is_none());
    }
}
