//! Local period runner.
//!
//! Drives one `RoundTransitionEngine` with a set of in-process agents:
//! every agent acts on the active round, the payloads are submitted, and
//! the engine is processed until a period-ending final round is reached.
//! Time comes from a `Clock` so tests can run whole periods instantly.

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::app::{RoundTransitionEngine, Transition};
use super::behaviours::Agent;
use super::rounds::Round;
use crate::config::AgentConfig;
use crate::dashboard::DashboardState;
use crate::types::TraderError;

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Clock: Send + Sync {
    /// Current unix time in seconds.
    fn now(&self) -> i64;

    /// Wait until `deadline` (unix seconds) has passed.
    async fn sleep_until(&self, deadline: i64);
}

pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }

    async fn sleep_until(&self, deadline: i64) {
        let remaining = deadline - self.now();
        if remaining > 0 {
            tokio::time::sleep(std::time::Duration::from_secs(remaining as u64)).await;
        }
    }
}

/// Manually advanced clock; sleeping jumps straight to the deadline.
pub struct FixedClock {
    now: AtomicI64,
}

impl FixedClock {
    pub fn new(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

#[async_trait]
impl Clock for FixedClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }

    async fn sleep_until(&self, deadline: i64) {
        self.now.fetch_max(deadline, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Summary of one completed period.
#[derive(Debug, Clone, Serialize)]
pub struct PeriodReport {
    pub period: u64,
    pub final_round: Round,
    pub transitions: Vec<Transition>,
}

pub struct PeriodRunner {
    engine: RoundTransitionEngine,
    agents: Vec<Agent>,
    clock: Arc<dyn Clock>,
    settings: AgentConfig,
    status: Option<Arc<DashboardState>>,
}

impl PeriodRunner {
    pub fn new(
        engine: RoundTransitionEngine,
        agents: Vec<Agent>,
        clock: Arc<dyn Clock>,
        settings: AgentConfig,
    ) -> Self {
        Self {
            engine,
            agents,
            clock,
            settings,
            status: None,
        }
    }

    /// Publish progress to the health API.
    pub fn with_status(mut self, status: Arc<DashboardState>) -> Self {
        self.status = Some(status);
        self
    }

    pub fn engine(&self) -> &RoundTransitionEngine {
        &self.engine
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    /// Run rounds until the period ends, then reset the engine.
    ///
    /// A period aborted by an engine error is reset as well, so the next
    /// call starts cleanly.
    pub async fn run_period(&mut self) -> Result<PeriodReport, TraderError> {
        let period = self.engine.period();
        let checkpoint = self.settings.is_checkpoint(period);
        for agent in &mut self.agents {
            agent.start_period(checkpoint);
        }
        info!(period, agents = self.agents.len(), "Period started");

        let outcome = self.drive().await;
        let report = PeriodReport {
            period,
            final_round: self.engine.current_round(),
            transitions: self.engine.history().to_vec(),
        };
        match &outcome {
            Ok(()) => info!(
                period,
                final_round = %report.final_round,
                rounds = report.transitions.len(),
                "Period finished"
            ),
            Err(e) => warn!(period, round = %report.final_round, error = %e, "Period aborted"),
        }

        self.engine.reset_for_next_period(self.clock.now());
        self.publish(None).await;
        outcome.map(|()| report)
    }

    async fn drive(&mut self) -> Result<(), TraderError> {
        loop {
            if self.engine.is_final() {
                let now = self.clock.now();
                match self.engine.chain_final(now)? {
                    Some(_) => continue,
                    None => break,
                }
            }

            let round = self.engine.current_round();
            let now = self.clock.now();
            let snapshot = self.engine.state().clone();

            let payloads = join_all(
                self.agents
                    .iter_mut()
                    .map(|agent| agent.act(round, &snapshot, now)),
            )
            .await;
            for (agent, payload) in self.agents.iter().zip(payloads) {
                match payload {
                    Some(payload) => self.engine.submit(agent.id(), payload)?,
                    None => debug!(agent = agent.id(), round = %round, "Agent abstained"),
                }
            }

            let mut outcome = self.engine.process(now)?;
            if outcome.is_none() {
                let Some(deadline) = self.engine.deadline() else {
                    warn!(round = %round, "No agreement and no timeout");
                    return Err(TraderError::ThresholdNotReached(round));
                };
                self.clock.sleep_until(deadline).await;
                outcome = self.engine.process(self.clock.now())?;
            }

            if let Some(transition) = outcome {
                let now = self.clock.now();
                for agent in &mut self.agents {
                    agent.on_transition(&transition, self.engine.state(), now);
                }
                self.publish(Some(&transition)).await;
            }
        }
        Ok(())
    }

    async fn publish(&self, transition: Option<&Transition>) {
        let Some(status) = &self.status else {
            return;
        };
        status
            .record(
                self.engine.current_round(),
                self.engine.period(),
                self.engine.entered_at(),
                self.engine.history(),
                transition,
            )
            .await;
        if let Some(agent) = self.agents.first() {
            status.set_bet_counts(agent.registry().status_counts()).await;
        }
    }
}
