//! Full-period flows through the replicated engine.

use std::path::PathBuf;
use std::sync::Arc;

use quorum_trader::chain::{DryRunTxPreparer, HashBeacon, RandomnessBeacon};
use quorum_trader::config::AppConfig;
use quorum_trader::dashboard::DashboardState;
use quorum_trader::engine::{
    Agent, Clock, Collaborators, Event, FixedClock, PeriodReport, PeriodRunner, Round,
    RoundTransitionEngine,
};
use quorum_trader::llm::FixedOracle;
use quorum_trader::types::{
    FetchStatus, PredictionLabel, PredictionResponse, QueueStatus, TraderError,
};

use crate::mock_market::{raw_bet, MockMarket};

const T0: i64 = 1_700_000_000;
const WALLET: u128 = 1_000_000_000_000_000_000;

#[tokio::test]
async fn test_profitable_bet_is_placed() {
    let market = MockMarket::new(vec![raw_bet("a", 5.0, T0), raw_bet("b", 10.0, T0)]);
    let mut h = Harness::new(AppConfig::default(), |_| collab(&market, yes(0.9), dry_run()));

    let report = h.run().await.unwrap();
    assert_eq!(report.final_round, Round::FinishedDecisionMakerRound);
    assert_eq!(
        path(&report),
        vec![
            Round::BenchmarkingModeDisabledRound,
            Round::SamplingRound,
            Round::SubscriptionRound,
            Round::SamplingRound,
            Round::PredictionRound,
            Round::BetPlacementRound,
            Round::FinishedDecisionMakerRound,
        ]
    );
    assert_eq!(report.transitions[3].event, Event::NoSubscription);
    assert_eq!(report.transitions[4].event, Event::BenchmarkingEnabled);

    // Every agent recorded the placement on the same bet.
    let amount = u128::from(AppConfig::default().strategy.bet_amount);
    for agent in h.runner.agents() {
        let bet = agent.registry().get(1).unwrap();
        assert_eq!(bet.id, "b");
        assert_eq!(bet.n_bets, 1);
        assert_eq!(bet.invested_amount, amount);
        assert_eq!(agent.registry().get(0).unwrap().n_bets, 0);
    }

    // The runner reset the engine; the tx hash survived into the new period.
    let engine = h.runner.engine();
    assert_eq!(engine.period(), 1);
    assert_eq!(engine.current_round(), Round::INITIAL);
    assert_eq!(engine.state().tx_hashes_history().len(), 1);
    assert!(engine.state().sampled_bet_index().is_none());
    h.cleanup();
}

#[tokio::test]
async fn test_sampling_reentry_does_not_refetch() {
    let market = MockMarket::new(vec![raw_bet("a", 5.0, T0)]);
    let mut h = Harness::new(AppConfig::default(), |_| collab(&market, yes(0.9), dry_run()));

    let report = h.run().await.unwrap();
    assert_eq!(report.final_round, Round::FinishedDecisionMakerRound);
    assert_eq!(market.fetch_count(), 4);
    h.cleanup();
}

#[tokio::test]
async fn test_unprofitable_bet_is_blacklisted() {
    let market = MockMarket::new(vec![raw_bet("a", 5.0, T0)]);
    let mut h = Harness::new(AppConfig::default(), |_| collab(&market, yes(0.3), dry_run()));

    let report = h.run().await.unwrap();
    assert_eq!(report.final_round, Round::FinishedWithoutDecisionRound);
    assert!(path(&report).contains(&Round::BlacklistingRound));

    for agent in h.runner.agents() {
        let bet = agent.registry().get(0).unwrap();
        assert_eq!(bet.queue_no, 1);
        assert_eq!(bet.processed_timestamp, T0);
        assert_eq!(bet.n_bets, 0);
    }
    h.cleanup();
}

#[tokio::test]
async fn test_oracle_error_routes_to_blacklisting() {
    let market = MockMarket::new(vec![raw_bet("a", 5.0, T0)]);
    let oracle = || Arc::new(FixedOracle::new(PredictionResponse::error("model offline")));
    let mut h = Harness::new(AppConfig::default(), |_| collab(&market, oracle(), dry_run()));

    let report = h.run().await.unwrap();
    assert_eq!(report.final_round, Round::FinishedWithoutDecisionRound);
    let prediction = report
        .transitions
        .iter()
        .find(|t| t.from == Round::PredictionRound)
        .unwrap();
    assert_eq!(prediction.event, Event::Unprofitable);
    h.cleanup();
}

#[tokio::test]
async fn test_empty_market_finishes_without_decision() {
    let market = MockMarket::new(vec![]);
    let mut h = Harness::new(AppConfig::default(), |_| collab(&market, yes(0.9), dry_run()));

    let report = h.run().await.unwrap();
    assert_eq!(report.final_round, Round::FinishedWithoutDecisionRound);
    assert_eq!(report.transitions.last().unwrap().event, Event::None);
    h.cleanup();
}

#[tokio::test]
async fn test_failed_fetch_is_impossible() {
    let market = MockMarket::new(vec![raw_bet("a", 5.0, T0)]);
    market.set_status(FetchStatus::Partial);
    let mut h = Harness::new(AppConfig::default(), |_| collab(&market, yes(0.9), dry_run()));

    let report = h.run().await.unwrap();
    assert_eq!(report.final_round, Round::ImpossibleRound);
    assert_eq!(report.transitions.last().unwrap().event, Event::FetchError);
    assert!(h.runner.agents().iter().all(|a| a.registry().is_empty()));
    h.cleanup();
}

#[tokio::test]
async fn test_low_balance_requires_refill() {
    let market = MockMarket::new(vec![raw_bet("a", 5.0, T0)]);
    let poor = || Arc::new(DryRunTxPreparer::new(1));
    let mut h = Harness::new(AppConfig::default(), |_| collab(&market, yes(0.9), poor()));

    let report = h.run().await.unwrap();
    assert_eq!(report.final_round, Round::RefillRequiredRound);
    assert_eq!(report.transitions.last().unwrap().event, Event::InsufficientBalance);
    assert!(h.runner.agents().iter().all(|a| a.registry().get(0).unwrap().n_bets == 0));
    h.cleanup();
}

#[tokio::test]
async fn test_subscription_is_claimed_before_predicting() {
    let market = MockMarket::new(vec![raw_bet("a", 5.0, T0)]);
    let subscribing = || {
        let mut tx = DryRunTxPreparer::new(WALLET);
        tx.needs_subscription = true;
        Arc::new(tx)
    };
    let mut h = Harness::new(AppConfig::default(), |_| collab(&market, yes(0.9), subscribing()));

    let report = h.run().await.unwrap();
    assert_eq!(report.final_round, Round::FinishedDecisionMakerRound);
    assert_eq!(
        path(&report),
        vec![
            Round::BenchmarkingModeDisabledRound,
            Round::SamplingRound,
            Round::SubscriptionRound,
            Round::FinishedSubscriptionRound,
            Round::SamplingRound,
            Round::PredictionRound,
            Round::BetPlacementRound,
            Round::FinishedDecisionMakerRound,
        ]
    );
    // Subscription and bet both produced hashes; only the bet is history.
    assert_eq!(h.runner.engine().state().tx_hashes_history().len(), 1);
    h.cleanup();
}

#[tokio::test]
async fn test_benchmarking_mode_skips_subscription() {
    let market = MockMarket::new(vec![raw_bet("a", 5.0, T0)]);
    let mut cfg = AppConfig::default();
    cfg.benchmarking.enabled = true;
    let mut h = Harness::new(cfg, |_| collab(&market, yes(0.9), dry_run()));

    let report = h.run().await.unwrap();
    assert_eq!(
        path(&report),
        vec![
            Round::BenchmarkingRandomnessRound,
            Round::SamplingRound,
            Round::PredictionRound,
            Round::BetPlacementRound,
            Round::FinishedDecisionMakerRound,
        ]
    );
    h.cleanup();
}

#[tokio::test]
async fn test_mocked_transactions_loop_back_to_sampling() {
    let market = MockMarket::new(vec![raw_bet("a", 5.0, T0)]);
    let mocking = || {
        let mut tx = DryRunTxPreparer::new(WALLET);
        tx.mocking = true;
        Arc::new(tx)
    };
    let mut h = Harness::new(AppConfig::default(), |_| collab(&market, yes(0.9), mocking()));

    let report = h.run().await.unwrap();
    let rounds = path(&report);
    assert!(report.transitions.iter().any(|t| t.event == Event::MockTx && t.to == Round::RedeemRound));
    assert!(report.transitions.iter().any(|t| t.from == Round::RedeemRound && t.to == Round::SamplingRound));
    // The only bet was just placed, so the next sample finds nothing.
    assert_eq!(rounds.last(), Some(&Round::FinishedWithoutDecisionRound));
    assert!(h.runner.agents().iter().all(|a| a.registry().get(0).unwrap().n_bets == 1));
    assert!(h.runner.engine().state().tx_hashes_history().is_empty());
    h.cleanup();
}

#[tokio::test]
async fn test_dissenting_minority_is_outvoted() {
    let market = MockMarket::new(vec![raw_bet("a", 5.0, T0)]);
    let mut h = Harness::new(AppConfig::default(), |i| {
        let oracle = if i == 3 { yes(0.1) } else { yes(0.9) };
        collab(&market, oracle, dry_run())
    });

    let report = h.run().await.unwrap();
    assert_eq!(report.final_round, Round::FinishedDecisionMakerRound);
    let votes = report
        .transitions
        .iter()
        .find(|t| t.from == Round::PredictionRound)
        .unwrap();
    assert_eq!(votes.event, Event::Done);
    h.cleanup();
}

#[tokio::test]
async fn test_stalled_round_times_out_until_round_limit() {
    let market = MockMarket::new(vec![raw_bet("a", 5.0, T0)]);
    let mut cfg = AppConfig::default();
    cfg.consensus.max_rounds_per_period = 4;
    // Two of four beacons are down, so randomness never reaches 3 votes.
    let mut h = Harness::new(cfg, |i| {
        let mut c = collab(&market, yes(0.9), dry_run());
        if i >= 2 {
            c.beacon = Arc::new(DeadBeacon);
        }
        c
    });

    let err = h.run().await.unwrap_err();
    assert_eq!(err, TraderError::RoundLimitExceeded(4));
    // Each timeout advanced the clock by one round timeout.
    assert_eq!(h.clock.now(), T0 + 4 * 30);

    // The aborted period was reset; the next one starts cleanly.
    let engine = h.runner.engine();
    assert_eq!(engine.period(), 1);
    assert_eq!(engine.current_round(), Round::INITIAL);
    h.cleanup();
}

#[tokio::test]
async fn test_consecutive_periods_keep_cross_period_keys() {
    let market = MockMarket::new(vec![raw_bet("a", 5.0, T0)]);
    let mut cfg = AppConfig::default();
    cfg.sampling.rebet_chance = 0.0;
    let mut h = Harness::new(cfg, |_| collab(&market, yes(0.9), dry_run()));

    let first = h.run().await.unwrap();
    assert_eq!(first.final_round, Round::FinishedDecisionMakerRound);

    // Same liquidity and already bet on: nothing new to sample.
    h.clock.advance(60);
    let second = h.run().await.unwrap();
    assert_eq!(second.period, 1);
    assert_eq!(second.final_round, Round::FinishedWithoutDecisionRound);

    // A new market shows up and gets picked.
    market.set_records(vec![raw_bet("a", 5.0, T0), raw_bet("c", 2.0, T0)]);
    h.clock.advance(60);
    let third = h.run().await.unwrap();
    assert_eq!(third.final_round, Round::FinishedDecisionMakerRound);
    assert_eq!(h.runner.engine().state().tx_hashes_history().len(), 2);

    for agent in h.runner.agents() {
        let c = agent.registry().get(1).unwrap();
        assert_eq!(c.id, "c");
        assert_eq!(c.n_bets, 1);
        // "a" is already TO_PROCESS, so the mixed cohort is not promoted.
        assert_eq!(c.queue_status, QueueStatus::Fresh);
    }
    h.cleanup();
}

#[tokio::test]
async fn test_status_is_published() {
    let market = MockMarket::new(vec![raw_bet("a", 5.0, T0)]);
    let status = Arc::new(DashboardState::new());
    let mut h = Harness::new(AppConfig::default(), |_| collab(&market, yes(0.9), dry_run()))
        .with_status(status.clone());

    h.run().await.unwrap();
    let engine = status.engine.read().await;
    assert_eq!(engine.period, 1);
    assert_eq!(engine.current_round, Round::INITIAL);
    assert_eq!(engine.last_event, Some(Event::Done));
    assert_eq!(status.bets.read().await.to_process, 1);
    h.cleanup();
}

// ---- helpers

struct Harness {
    runner: PeriodRunner,
    clock: Arc<FixedClock>,
    dir: PathBuf,
}

impl Harness {
    fn new(mut cfg: AppConfig, collab_for: impl Fn(usize) -> Collaborators) -> Self {
        let dir = std::env::temp_dir().join(format!("trader_it_{}", uuid::Uuid::new_v4()));
        cfg.agent.store_path = dir.clone();
        let clock = Arc::new(FixedClock::new(T0));

        let ids: Vec<String> = (0..cfg.agent.n_agents).map(|i| format!("agent_{i}")).collect();
        let agents = ids
            .iter()
            .enumerate()
            .map(|(i, id)| Agent::new(id, &cfg, collab_for(i)))
            .collect();
        let engine = RoundTransitionEngine::new(ids, &cfg.consensus, clock.now()).unwrap();
        let runner = PeriodRunner::new(engine, agents, clock.clone(), cfg.agent.clone());
        Self { runner, clock, dir }
    }

    fn with_status(self, status: Arc<DashboardState>) -> Self {
        Self {
            runner: self.runner.with_status(status),
            ..self
        }
    }

    async fn run(&mut self) -> Result<PeriodReport, TraderError> {
        self.runner.run_period().await
    }

    fn cleanup(&self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

fn collab(
    market: &MockMarket,
    oracle: Arc<FixedOracle>,
    chain: Arc<DryRunTxPreparer>,
) -> Collaborators {
    Collaborators {
        market: Arc::new(market.clone()),
        oracle,
        chain,
        beacon: Arc::new(HashBeacon::new("integration")),
    }
}

fn yes(confidence: f64) -> Arc<FixedOracle> {
    Arc::new(FixedOracle::new(PredictionResponse {
        prediction: PredictionLabel::Yes,
        confidence,
        reasoning: "fixture".to_string(),
    }))
}

fn dry_run() -> Arc<DryRunTxPreparer> {
    Arc::new(DryRunTxPreparer::new(WALLET))
}

/// Rounds entered, in order, skipping self-loops.
fn path(report: &PeriodReport) -> Vec<Round> {
    let mut rounds: Vec<Round> = Vec::new();
    for t in &report.transitions {
        if t.from != t.to {
            rounds.push(t.to);
        }
    }
    rounds
}

struct DeadBeacon;

#[async_trait::async_trait]
impl RandomnessBeacon for DeadBeacon {
    async fn beacon(&self, _period: u64) -> anyhow::Result<Option<(u64, String)>> {
        anyhow::bail!("beacon unreachable")
    }
}
