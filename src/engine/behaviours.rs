//! Per-round agent behaviours.
//!
//! An `Agent` owns its private bet registry and sampler and computes the
//! payload it submits for whatever round the engine is in. Everything an
//! agent derives must come from the shared state snapshot, the shared
//! timestamp and its collaborators, so honest agents submit identical
//! payloads.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::app::Transition;
use super::payloads::{Payload, PredictionVote};
use super::rounds::{Event, Round};
use crate::chain::{RandomnessBeacon, TxPreparer};
use crate::config::{AppConfig, StrategyConfig};
use crate::consensus::SharedDecisionState;
use crate::llm::PredictionOracle;
use crate::markets::{BetRegistry, MarketSource};
use crate::storage;
use crate::strategy::{bet_amount, vote_for, SamplingEngine};
use crate::types::{Bet, FetchBatch, Side};

/// External collaborators an agent acts through.
#[derive(Clone)]
pub struct Collaborators {
    pub market: Arc<dyn MarketSource>,
    pub oracle: Arc<dyn PredictionOracle>,
    pub chain: Arc<dyn TxPreparer>,
    pub beacon: Arc<dyn RandomnessBeacon>,
}

pub struct Agent {
    id: String,
    registry: BetRegistry,
    sampler: SamplingEngine,
    collab: Collaborators,
    bets_path: PathBuf,
    strategy: StrategyConfig,
    benchmarking: bool,
    /// Set at a checkpoint period; consumed by the next sampling pass.
    requeue_pending: bool,
    /// This period's successful sampling payload, resubmitted on re-entry
    /// until the period moves on to a prediction.
    sampled: Option<Payload>,
    /// This period's blacklisting payload and the registry it hashes,
    /// committed once the round agrees.
    blacklisted: Option<(Payload, BetRegistry)>,
}

impl Agent {
    pub fn new(id: &str, cfg: &AppConfig, collab: Collaborators) -> Self {
        let bets_path = cfg.agent.store_path.join(id).join(storage::BETS_FILENAME);
        Self {
            id: id.to_string(),
            registry: storage::read_bets(&bets_path),
            sampler: SamplingEngine::new(cfg.sampling.clone()),
            collab,
            bets_path,
            strategy: cfg.strategy.clone(),
            benchmarking: cfg.benchmarking.enabled,
            requeue_pending: false,
            sampled: None,
            blacklisted: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn registry(&self) -> &BetRegistry {
        &self.registry
    }

    pub fn bets_path(&self) -> &Path {
        &self.bets_path
    }

    /// Reset per-period caches. `checkpoint` requeues every bet on the
    /// next sampling pass.
    pub fn start_period(&mut self, checkpoint: bool) {
        self.sampled = None;
        self.blacklisted = None;
        if checkpoint {
            info!(agent = %self.id, "Checkpoint reached, bets will be requeued");
            self.requeue_pending = true;
        }
    }

    /// Compute this agent's payload for `round`, or `None` to abstain.
    pub async fn act(
        &mut self,
        round: Round,
        state: &SharedDecisionState,
        now: i64,
    ) -> Option<Payload> {
        match round {
            Round::CheckBenchmarkingModeRound => Some(Payload::Voting {
                vote: Some(self.benchmarking),
            }),
            Round::RandomnessRound | Round::BenchmarkingRandomnessRound => {
                self.randomness(state.period()).await
            }
            Round::SamplingRound => Some(self.sample(state, now).await),
            Round::SubscriptionRound => {
                let result = self.collab.chain.subscription_tx().await;
                self.tx_preparation(round, result)
            }
            Round::ClaimRound => {
                let claimed = match self.collab.chain.claim_subscription().await {
                    Ok(claimed) => Some(claimed),
                    Err(e) => {
                        warn!(agent = %self.id, error = %e, "Subscription claim failed");
                        None
                    }
                };
                Some(Payload::Voting { vote: claimed })
            }
            Round::PredictionRound => Some(self.predict(state).await),
            Round::BetPlacementRound => Some(self.place_bet(state).await),
            Round::BlacklistingRound => Some(self.blacklist(state, now)),
            Round::RedeemRound => {
                let result = self.collab.chain.redeem_tx().await;
                self.tx_preparation(round, result)
            }
            // A failed transaction always retires the sampled bet's slot.
            Round::HandleFailedTxRound => Some(Payload::Voting { vote: Some(true) }),
            _ => None,
        }
    }

    /// Apply an agreed outcome to the local registry.
    pub fn on_transition(&mut self, transition: &Transition, state: &SharedDecisionState, now: i64) {
        if transition.to == Round::PredictionRound {
            self.sampled = None;
        }

        if !matches!(transition.event, Event::Done | Event::MockTx) {
            return;
        }
        match transition.from {
            Round::BlacklistingRound => self.commit_blacklist(),
            Round::BetPlacementRound => self.record_placement(transition, state, now),
            _ => {}
        }
    }

    fn record_placement(&mut self, transition: &Transition, state: &SharedDecisionState, now: i64) {
        let Some(Payload::BetPlacement { amount, .. }) = &transition.winner else {
            return;
        };
        match state
            .sampled_bet_index()
            .and_then(|i| self.registry.get_mut(i))
        {
            Some(bet) => {
                bet.record_placement(*amount, now);
                info!(agent = %self.id, bet_id = %bet.id, amount, "Placement recorded");
            }
            None => warn!(agent = %self.id, "Placed bet is not in the registry"),
        }
        storage::store_bets(&self.registry, &self.bets_path);
    }

    // ---- rounds

    async fn randomness(&self, period: u64) -> Option<Payload> {
        match self.collab.beacon.beacon(period).await {
            Ok(Some((round_id, randomness))) => Some(Payload::Randomness {
                round_id,
                randomness,
            }),
            Ok(None) => Some(Payload::Randomness {
                round_id: 0,
                randomness: String::new(),
            }),
            Err(e) => {
                warn!(agent = %self.id, error = %e, "Randomness beacon unavailable");
                None
            }
        }
    }

    async fn sample(&mut self, state: &SharedDecisionState, now: i64) -> Payload {
        if let Some(payload) = &self.sampled {
            debug!(agent = %self.id, "Resubmitting this period's sample");
            return payload.clone();
        }

        self.registry = storage::read_bets(&self.bets_path);
        if std::mem::take(&mut self.requeue_pending) {
            self.registry.requeue_all();
        }

        let batch = match self.collab.market.fetch_bets().await {
            Ok(batch) => batch,
            Err(e) => {
                warn!(agent = %self.id, market = self.collab.market.name(), error = %e, "Market fetch failed");
                FetchBatch::failure(self.collab.market.name())
            }
        };
        let fetched = batch.is_success();
        self.registry.merge(batch);
        if !fetched {
            // The cleared registry only lives for this pass; the bet file keeps
            // its bookkeeping for the next successful fetch.
            return Payload::Sampling {
                bets_hash: None,
                index: None,
                fetch_failed: true,
            };
        }

        self.registry
            .expire_due(now, self.sampler.config().opening_margin);
        self.registry.advance_freshness(now);

        let seed = state.most_voted_randomness().unwrap_or_default();
        let index = self.sampler.select(self.registry.bets(), now, seed);
        storage::store_bets(&self.registry, &self.bets_path);

        let payload = Payload::Sampling {
            bets_hash: index.and_then(|_| storage::hash_bets(&self.registry)),
            index,
            fetch_failed: false,
        };
        if index.is_some() {
            self.sampled = Some(payload.clone());
        }
        payload
    }

    fn tx_preparation(
        &self,
        round: Round,
        result: anyhow::Result<Option<String>>,
    ) -> Option<Payload> {
        match result {
            Ok(tx_hash) => Some(Payload::TxPreparation {
                tx_submitter: round.to_string(),
                tx_hash,
                mocking_mode: self.collab.chain.is_mocking(),
            }),
            Err(e) => {
                warn!(agent = %self.id, round = %round, error = %e, "Transaction preparation failed");
                None
            }
        }
    }

    fn sampled_bet(&self, state: &SharedDecisionState) -> Option<&Bet> {
        state.sampled_bet_index().and_then(|i| self.registry.get(i))
    }

    async fn predict(&self, state: &SharedDecisionState) -> Payload {
        let Some(bet) = self.sampled_bet(state) else {
            warn!(agent = %self.id, "Sampled bet missing, voting unprofitable");
            return Payload::Prediction {
                vote: PredictionVote::Unprofitable,
            };
        };
        info!(agent = %self.id, question = %bet.title, "Making prediction");
        let result = self.collab.oracle.predict(&bet.title).await;
        Payload::Prediction {
            vote: vote_for(result, self.strategy.min_confidence),
        }
    }

    async fn place_bet(&self, state: &SharedDecisionState) -> Payload {
        let chain = &self.collab.chain;
        let wallet_balance = match chain.wallet_balance().await {
            Ok(balance) => Some(balance),
            Err(e) => {
                warn!(agent = %self.id, error = %e, "Wallet balance unavailable");
                None
            }
        };
        let token_balance = match chain.token_balance().await {
            Ok(balance) => Some(balance),
            Err(e) => {
                warn!(agent = %self.id, error = %e, "Token balance unavailable");
                None
            }
        };
        let amount = wallet_balance.and_then(|w| bet_amount(&self.strategy, w));

        // `None` reports an insufficient balance, `Some("")` a failed buy.
        let tx_hash = match (wallet_balance, amount, self.sampled_bet(state)) {
            (Some(balance), None, _) => {
                warn!(agent = %self.id, balance, "Insufficient balance to place a bet");
                None
            }
            (Some(_), Some(amount), Some(bet)) => {
                match chain.bet_tx(bet, Side::Yes, amount).await {
                    Ok(hash) => Some(hash),
                    Err(e) => {
                        warn!(agent = %self.id, bet_id = %bet.id, error = %e, "Bet transaction failed");
                        Some(String::new())
                    }
                }
            }
            _ => Some(String::new()),
        };

        Payload::BetPlacement {
            tx_hash,
            mocking_mode: chain.is_mocking(),
            amount: amount.unwrap_or_default(),
            wallet_balance,
            token_balance,
        }
    }

    /// Blacklist the sampled bet on a copy of the registry and hash it.
    ///
    /// The copy replaces the registry only once the round agrees, see
    /// `on_transition`.
    fn blacklist(&mut self, state: &SharedDecisionState, now: i64) -> Payload {
        if let Some((payload, _)) = &self.blacklisted {
            return payload.clone();
        }

        let mut pending = self.registry.clone();
        match state.sampled_bet_index().and_then(|i| pending.get_mut(i)) {
            Some(bet) => {
                bet.blacklist(now);
                debug!(agent = %self.id, bet_id = %bet.id, queue_no = bet.queue_no, "Blacklist proposed");
            }
            None => warn!(agent = %self.id, "Nothing to blacklist"),
        }

        let payload = Payload::Blacklisting {
            bets_hash: storage::hash_bets(&pending),
        };
        self.blacklisted = Some((payload.clone(), pending));
        payload
    }

    fn commit_blacklist(&mut self) {
        let Some((_, pending)) = &self.blacklisted else {
            warn!(agent = %self.id, "Blacklisting agreed without a local proposal");
            return;
        };
        self.registry = pending.clone();
        storage::store_bets(&self.registry, &self.bets_path);
        info!(agent = %self.id, "Bet blacklisted");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
