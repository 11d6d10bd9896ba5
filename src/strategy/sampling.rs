//! Deterministic selection of the next bet to act on.
//!
//! Every agent holding the same registry, the same shared randomness and
//! the same timestamp must pick the same index. All orderings below are
//! therefore total (`f64::total_cmp`) and sorts are stable, so equal keys
//! fall back to registry order.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use tracing::{debug, info, warn};

use crate::config::SamplingConfig;
use crate::markets::LiquidityCache;
use crate::types::Bet;

pub const UNIX_DAY: i64 = 60 * 60 * 24;
pub const UNIX_WEEK: i64 = 7 * UNIX_DAY;

/// Seeded bet sampler plus the liquidity it observed on earlier picks.
pub struct SamplingEngine {
    cfg: SamplingConfig,
    liquidity: LiquidityCache,
}

impl SamplingEngine {
    pub fn new(cfg: SamplingConfig) -> Self {
        Self {
            cfg,
            liquidity: LiquidityCache::new(),
        }
    }

    pub fn config(&self) -> &SamplingConfig {
        &self.cfg
    }

    pub fn liquidity_cache(&self) -> &LiquidityCache {
        &self.liquidity
    }

    /// Rebet gate: one draw from a generator seeded by the shared randomness.
    ///
    /// Always false while no bet has ever been placed.
    pub fn should_rebet(&self, bets: &[Bet], seed: &str) -> bool {
        if !bets.iter().any(Bet::has_bets) {
            return false;
        }
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&Sha256::digest(seed.as_bytes()));
        let mut rng = ChaCha20Rng::from_seed(digest);
        let draw: f64 = rng.gen();
        draw <= self.cfg.rebet_chance
    }

    /// Whether `bet` may be sampled at `now` in the given rebet mode.
    pub fn processable(&self, bet: &Bet, now: i64, should_rebet: bool) -> bool {
        if bet.queue_status.is_expired() {
            return false;
        }

        let within_opening_range =
            bet.opening_timestamp <= now + self.cfg.sample_bets_closing_days * UNIX_DAY;
        let within_safe_range = now
            < bet.opening_timestamp - self.cfg.opening_margin - self.cfg.safe_voting_range;
        let within_ranges = within_opening_range && within_safe_range;

        // Rebet mode only considers bets already bet on, and vice versa.
        if should_rebet != bet.has_bets() {
            return false;
        }

        if !should_rebet {
            // A bet whose liquidity never moves is never picked again.
            return within_ranges
                && self
                    .liquidity
                    .has_changed(&bet.id, bet.scaled_liquidity_measure);
        }

        let lifetime = bet.opening_timestamp - now;
        let t_rebetting = lifetime.div_euclid(UNIX_WEEK) + UNIX_DAY;
        within_ranges && now >= bet.processed_timestamp + t_rebetting
    }

    /// Pick the next bet and return its index in `bets`.
    ///
    /// Records the pick's liquidity in the cache; placement bookkeeping is
    /// left to the caller.
    pub fn select(&mut self, bets: &[Bet], now: i64, seed: &str) -> Option<usize> {
        let should_rebet = self.should_rebet(bets, seed);
        info!(rebetting = should_rebet, "Rebet gate evaluated");

        let eligible: Vec<usize> = (0..bets.len())
            .filter(|&i| self.processable(&bets[i], now, should_rebet))
            .collect();

        if eligible.is_empty() {
            warn!(total = bets.len(), "No unprocessed bets available to sample from");
            return None;
        }

        let idx = pick(bets, &eligible);
        let bet = &bets[idx];
        if bet.scaled_liquidity_measure == 0.0 {
            warn!(bet_id = %bet.id, "Sampled bet has zero liquidity");
            return None;
        }

        self.liquidity.record(&bet.id, bet.scaled_liquidity_measure);
        info!(index = idx, eligible = eligible.len(), bet = %bet, "Sampled bet");
        Some(idx)
    }
}

/// Apply the priority chain to the eligible indices.
fn pick(bets: &[Bet], eligible: &[usize]) -> usize {
    let mut new_bets: Vec<usize> = eligible
        .iter()
        .copied()
        .filter(|&i| !bets[i].is_processed())
        .collect();

    if !new_bets.is_empty() {
        new_bets.sort_by(|&a, &b| by_liquidity_then_opening(&bets[b], &bets[a]));
        debug!(candidates = new_bets.len(), "Picking among never-processed bets");
        return new_bets[0];
    }

    let least_queue_no = eligible
        .iter()
        .map(|&i| bets[i].queue_no)
        .min()
        .unwrap_or_default();
    let mut priority_bets: Vec<usize> = eligible
        .iter()
        .copied()
        .filter(|&i| bets[i].queue_no == least_queue_no)
        .collect();

    priority_bets.sort_by(|&a, &b| retry_order(&bets[b], &bets[a]));
    debug!(
        candidates = priority_bets.len(),
        queue_no = least_queue_no,
        "Picking among previously processed bets"
    );
    priority_bets[0]
}

fn by_liquidity_then_opening(a: &Bet, b: &Bet) -> Ordering {
    a.scaled_liquidity_measure
        .total_cmp(&b.scaled_liquidity_measure)
        .then(a.opening_timestamp.cmp(&b.opening_timestamp))
}

/// Ascending composite key `(invested, -processed_ts, liquidity, opening)`.
fn retry_order(a: &Bet, b: &Bet) -> Ordering {
    a.invested_amount
        .cmp(&b.invested_amount)
        .then(b.processed_timestamp.cmp(&a.processed_timestamp))
        .then(by_liquidity_then_opening(a, b))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::QueueStatus;

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn test_select_is_deterministic() {
        let bets = vec![
            open_bet("a", 3.0, 2),
            open_bet("b", 3.0, 1),
            open_bet("c", 7.0, 5),
        ];
        let first = engine(0.5).select(&bets, NOW, "seed-1");
        let second = engine(0.5).select(&bets, NOW, "seed-1");
        assert_eq!(first, second);
        assert_eq!(first, Some(2));
    }

    #[test]
    fn test_higher_liquidity_wins_among_new_bets() {
        let bets = vec![open_bet("five", 5.0, 1), open_bet("ten", 10.0, 1)];
        assert_eq!(engine(0.5).select(&bets, NOW, "s"), Some(1));
    }

    #[test]
    fn test_later_opening_breaks_liquidity_tie() {
        let bets = vec![open_bet("a", 5.0, 3), open_bet("b", 5.0, 4)];
        assert_eq!(engine(0.5).select(&bets, NOW, "s"), Some(1));
    }

    #[test]
    fn test_identical_keys_keep_registry_order() {
        let bets = vec![open_bet("a", 5.0, 3), open_bet("b", 5.0, 3)];
        assert_eq!(engine(0.5).select(&bets, NOW, "s"), Some(0));
    }

    #[test]
    fn test_expired_bet_never_selected() {
        let mut bets = vec![open_bet("expired", 100.0, 2), open_bet("live", 1.0, 2)];
        bets[0].queue_status = QueueStatus::Expired;
        assert_eq!(engine(0.5).select(&bets, NOW, "s"), Some(1));

        bets[1].queue_status = QueueStatus::Expired;
        assert_eq!(engine(0.5).select(&bets, NOW, "s"), None);
    }

    #[test]
    fn test_least_recently_processed_wins_among_retries() {
        // Both already processed with equal investment; rebetting disabled
        // because neither has a placed bet.
        let mut bets = vec![open_bet("recent", 5.0, 2), open_bet("old", 5.0, 2)];
        bets[0].processed_timestamp = NOW - 100;
        bets[1].processed_timestamp = NOW - 1_000;
        assert_eq!(engine(0.5).select(&bets, NOW, "s"), Some(1));
    }

    #[test]
    fn test_least_recently_processed_wins_among_rebets() {
        let mut bets = vec![open_bet("recent", 5.0, 2), open_bet("old", 5.0, 2)];
        for bet in bets.iter_mut() {
            bet.record_placement(10, 0);
        }
        bets[0].processed_timestamp = NOW - 2 * UNIX_DAY;
        bets[1].processed_timestamp = NOW - 3 * UNIX_DAY;
        let mut sampler = engine(1.0);
        assert!(sampler.should_rebet(&bets, "s"));
        assert_eq!(sampler.select(&bets, NOW, "s"), Some(1));
    }

    #[test]
    fn test_higher_investment_wins_among_retries() {
        let mut bets = vec![open_bet("small", 9.0, 2), open_bet("big", 1.0, 2)];
        for bet in bets.iter_mut() {
            bet.processed_timestamp = NOW - 10;
        }
        bets[0].invested_amount = 1;
        bets[1].invested_amount = 2;
        assert_eq!(engine(0.5).select(&bets, NOW, "s"), Some(1));
    }

    #[test]
    fn test_lower_queue_bucket_wins_among_retries() {
        let mut bets = vec![open_bet("blacklisted", 9.0, 2), open_bet("fresh", 1.0, 2)];
        bets[0].blacklist(NOW - 50);
        bets[1].processed_timestamp = NOW - 10;
        assert_eq!(engine(0.5).select(&bets, NOW, "s"), Some(1));
    }

    #[test]
    fn test_new_bets_considered_across_all_queues() {
        let mut bets = vec![open_bet("processed", 9.0, 2), open_bet("new_in_queue_1", 1.0, 2)];
        bets[0].processed_timestamp = NOW - 10;
        bets[1].queue_no = 1;
        assert_eq!(engine(0.5).select(&bets, NOW, "s"), Some(1));
    }

    #[test]
    fn test_zero_liquidity_pick_is_rejected() {
        let bets = vec![open_bet("dry", 0.0, 2)];
        let mut sampler = engine(0.5);
        assert_eq!(sampler.select(&bets, NOW, "s"), None);
        assert!(sampler.liquidity_cache().is_empty());
    }

    #[test]
    fn test_unchanged_liquidity_is_skipped() {
        let bets = vec![open_bet("a", 4.0, 2)];
        let mut sampler = engine(0.5);
        assert_eq!(sampler.select(&bets, NOW, "s"), Some(0));
        assert_eq!(sampler.liquidity_cache().get("a"), Some(4.0));
        assert_eq!(sampler.select(&bets, NOW, "s"), None);

        let moved = vec![open_bet("a", 4.5, 2)];
        assert_eq!(sampler.select(&moved, NOW, "s"), Some(0));
    }

    #[test]
    fn test_time_windows() {
        let sampler = engine(0.5);
        let cfg = sampler.config().clone();

        let too_far = open_at("far", NOW + cfg.sample_bets_closing_days * UNIX_DAY + 1);
        assert!(!sampler.processable(&too_far, NOW, false));

        let edge = NOW + cfg.opening_margin + cfg.safe_voting_range;
        assert!(!sampler.processable(&open_at("edge", edge), NOW, false));
        assert!(sampler.processable(&open_at("inside", edge + 1), NOW, false));
    }

    #[test]
    fn test_rebet_mode_excludes_unbet_markets() {
        let mut sampler = engine(1.0);
        let mut bets = vec![open_bet("never", 50.0, 2), open_bet("bet", 1.0, 2)];
        bets[1].record_placement(5, NOW - 30 * UNIX_DAY);
        assert!(sampler.should_rebet(&bets, "s"));
        assert!(!sampler.processable(&bets[0], NOW, true));
        assert_eq!(sampler.select(&bets, NOW, "s"), Some(1));
    }

    #[test]
    fn test_rebet_waits_for_rebetting_window() {
        let sampler = engine(1.0);
        let mut bet = open_bet("bet", 1.0, 2);
        let lifetime = bet.opening_timestamp - NOW;
        let window = lifetime.div_euclid(UNIX_WEEK) + UNIX_DAY;

        bet.record_placement(5, NOW - window + 1);
        assert!(!sampler.processable(&bet, NOW, true));
        bet.processed_timestamp = NOW - window;
        assert!(sampler.processable(&bet, NOW, true));
    }

    #[test]
    fn test_rebet_gate_off_without_prior_bets() {
        let bets = vec![open_bet("a", 1.0, 2)];
        assert!(!engine(1.0).should_rebet(&bets, "anything"));
    }

    #[test]
    fn test_rebet_gate_depends_only_on_seed() {
        let mut bets = vec![open_bet("a", 1.0, 2)];
        bets[0].record_placement(1, 0);
        let sampler = engine(0.5);
        for seed in ["alpha", "beta", "gamma"] {
            assert_eq!(sampler.should_rebet(&bets, seed), sampler.should_rebet(&bets, seed));
        }
        assert!(engine(1.0).should_rebet(&bets, "alpha"));
    }

    // ---- helpers

    fn engine(rebet_chance: f64) -> SamplingEngine {
        SamplingEngine::new(SamplingConfig {
            rebet_chance,
            ..SamplingConfig::default()
        })
    }

    /// A never-processed bet opening `days` days after `NOW`.
    fn open_bet(id: &str, liquidity: f64, days: i64) -> Bet {
        Bet::sample(id, liquidity, NOW + days * UNIX_DAY)
    }

    fn open_at(id: &str, opening_timestamp: i64) -> Bet {
        Bet::sample(id, 1.0, opening_timestamp)
    }
}
