//! Quorum collection of per-agent payloads for a single round.

use std::collections::{BTreeMap, BTreeSet};

use crate::types::TraderError;

/// Collects one payload per agent and reports the agreed value.
///
/// Submissions are keyed by agent id, so a second submission from the
/// same agent replaces the first. The winner is the payload with the most
/// votes; equal counts resolve to the smallest payload under `Ord`, which
/// keeps the result independent of arrival order.
#[derive(Debug, Clone)]
pub struct ThresholdCollector<P> {
    participants: BTreeSet<String>,
    threshold: usize,
    submissions: BTreeMap<String, P>,
}

impl<P: Ord + Clone> ThresholdCollector<P> {
    pub fn new<I, S>(participants: I, threshold: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            participants: participants.into_iter().map(Into::into).collect(),
            threshold,
            submissions: BTreeMap::new(),
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn n_participants(&self) -> usize {
        self.participants.len()
    }

    pub fn n_submitted(&self) -> usize {
        self.submissions.len()
    }

    pub fn submit(&mut self, agent: &str, payload: P) -> Result<(), TraderError> {
        if !self.participants.contains(agent) {
            return Err(TraderError::UnknownAgent(agent.to_string()));
        }
        self.submissions.insert(agent.to_string(), payload);
        Ok(())
    }

    /// Vote count per distinct payload, in payload order.
    pub fn tally(&self) -> BTreeMap<&P, usize> {
        let mut counts = BTreeMap::new();
        for payload in self.submissions.values() {
            *counts.entry(payload).or_insert(0) += 1;
        }
        counts
    }

    fn leader(&self) -> Option<(&P, usize)> {
        let mut best: Option<(&P, usize)> = None;
        for (payload, count) in self.tally() {
            // Strictly greater: the first (smallest) payload keeps a tie.
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((payload, count));
            }
        }
        best
    }

    pub fn threshold_reached(&self) -> bool {
        self.leader().is_some_and(|(_, count)| count >= self.threshold)
    }

    /// The agreed payload, once the threshold is reached.
    pub fn majority_value(&self) -> Option<&P> {
        match self.leader() {
            Some((payload, count)) if count >= self.threshold => Some(payload),
            _ => None,
        }
    }

    /// False once the agents still to submit cannot lift any payload to
    /// the threshold.
    pub fn majority_possible(&self) -> bool {
        let remaining = self.participants.len() - self.submissions.len();
        let leading = self.leader().map_or(0, |(_, c)| c);
        leading + remaining >= self.threshold
    }

    pub fn submissions(&self) -> &BTreeMap<String, P> {
        &self.submissions
    }

    pub fn clear(&mut self) {
        self.submissions.clear();
    }
}
