//! Agent-local set of tracked bets and their queue lifecycle.

use tracing::{debug, info, warn};

use crate::types::{Bet, FetchBatch, QueueStatus};

/// Ordered collection of tracked bets.
///
/// Order is insertion order and is part of the agreed state: the sampled
/// index refers to a position in this list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BetRegistry {
    bets: Vec<Bet>,
}

/// Per-status counts, for status reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct StatusCounts {
    pub fresh: usize,
    pub to_process: usize,
    pub expired: usize,
}

impl BetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bets(bets: Vec<Bet>) -> Self {
        Self { bets }
    }

    pub fn bets(&self) -> &[Bet] {
        &self.bets
    }

    pub fn get(&self, index: usize) -> Option<&Bet> {
        self.bets.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Bet> {
        self.bets.get_mut(index)
    }

    pub fn position(&self, bet_id: &str) -> Option<usize> {
        self.bets.iter().position(|b| b.id == bet_id)
    }

    pub fn len(&self) -> usize {
        self.bets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bets.is_empty()
    }

    pub fn clear(&mut self) {
        self.bets.clear();
    }

    /// Fold a fetched batch into the registry.
    ///
    /// Known ids get their market fields refreshed in place; new ids are
    /// appended with default bookkeeping. Anything short of a full success
    /// empties the registry instead.
    pub fn merge(&mut self, batch: FetchBatch) {
        if !batch.is_success() {
            warn!(
                market = %batch.market,
                status = %batch.status,
                dropped = self.bets.len(),
                "Fetch incomplete, clearing bet registry"
            );
            self.bets.clear();
            return;
        }

        let mut updated = 0usize;
        let mut inserted = 0usize;
        for raw in batch.records {
            match self.position(&raw.id) {
                Some(i) => {
                    self.bets[i].update_market_info(&raw);
                    updated += 1;
                }
                None => {
                    self.bets.push(Bet::from_raw(raw, &batch.market));
                    inserted += 1;
                }
            }
        }
        info!(market = %batch.market, updated, inserted, total = self.bets.len(), "Bets merged");
    }

    /// Restart the priority cycle: every live bet goes back to FRESH.
    pub fn requeue_all(&mut self) {
        for bet in self.bets.iter_mut().filter(|b| !b.queue_status.is_expired()) {
            bet.queue_status = QueueStatus::Fresh;
        }
        debug!(count = self.bets.len(), "Bets requeued");
    }

    /// Retire every bet whose opening time minus `opening_margin` has passed.
    pub fn expire_due(&mut self, now: i64, opening_margin: i64) {
        let mut expired = 0usize;
        for bet in self.bets.iter_mut() {
            if now >= bet.opening_timestamp - opening_margin && !bet.queue_status.is_expired() {
                bet.blacklist_forever();
                expired += 1;
            }
        }
        if expired > 0 {
            info!(expired, now, "Bets expired");
        }
    }

    /// Promote all live bets to TO_PROCESS, but only if every one of them
    /// is still FRESH.
    pub fn advance_freshness(&mut self, now: i64) {
        let all_fresh = self
            .bets
            .iter()
            .filter(|b| !b.queue_status.is_expired())
            .all(|b| b.queue_status.is_fresh());
        if !all_fresh {
            return;
        }
        let mut promoted = 0usize;
        for bet in self.bets.iter_mut().filter(|b| !b.queue_status.is_expired()) {
            bet.queue_status = QueueStatus::ToProcess;
            promoted += 1;
        }
        if promoted > 0 {
            debug!(promoted, now, "Fresh cohort promoted to TO_PROCESS");
        }
    }

    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for bet in &self.bets {
            match bet.queue_status {
                QueueStatus::Fresh => counts.fresh += 1,
                QueueStatus::ToProcess => counts.to_process += 1,
                QueueStatus::Expired => counts.expired += 1,
            }
        }
        counts
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
