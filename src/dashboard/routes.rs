//! Health API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>`.

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::engine::app::Transition;
use crate::engine::rounds::{Event, Round};
use crate::markets::registry::StatusCounts;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Engine progress as last published by the period runner.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub current_round: Round,
    pub period: u64,
    pub entered_at: i64,
    pub last_transition_at: Option<i64>,
    pub last_event: Option<Event>,
    pub rounds_visited: Vec<Round>,
}

impl Default for EngineStatus {
    fn default() -> Self {
        Self {
            current_round: Round::INITIAL,
            period: 0,
            entered_at: 0,
            last_transition_at: None,
            last_event: None,
            rounds_visited: Vec::new(),
        }
    }
}

/// Shared state accessible by all route handlers.
#[derive(Default)]
pub struct DashboardState {
    pub engine: RwLock<EngineStatus>,
    pub bets: RwLock<StatusCounts>,
}

impl DashboardState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(
        &self,
        current_round: Round,
        period: u64,
        entered_at: i64,
        history: &[Transition],
        transition: Option<&Transition>,
    ) {
        let mut status = self.engine.write().await;
        status.current_round = current_round;
        status.period = period;
        status.entered_at = entered_at;
        status.rounds_visited = history
            .first()
            .map(|t| t.from)
            .into_iter()
            .chain(history.iter().map(|t| t.to))
            .collect();
        if let Some(t) = transition {
            status.last_transition_at = Some(t.at);
            status.last_event = Some(t.event);
        }
    }

    pub async fn set_bet_counts(&self, counts: StatusCounts) {
        *self.bets.write().await = counts;
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct HealthcheckResponse {
    pub current_round: Round,
    pub period: u64,
    pub seconds_since_last_transition: Option<i64>,
    pub last_event: Option<Event>,
    pub rounds_visited: Vec<Round>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoundInfo {
    pub id: Round,
    pub name: &'static str,
    pub description: &'static str,
    pub is_final: bool,
    pub transitions: Vec<TransitionInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransitionInfo {
    pub event: Event,
    pub next: Round,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

pub type AppState = Arc<DashboardState>;

/// GET /health
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// GET /healthcheck
pub async fn healthcheck(State(state): State<AppState>) -> Json<HealthcheckResponse> {
    let status = state.engine.read().await;
    let now = chrono::Utc::now().timestamp();
    Json(HealthcheckResponse {
        current_round: status.current_round,
        period: status.period,
        seconds_since_last_transition: status.last_transition_at.map(|at| now - at),
        last_event: status.last_event,
        rounds_visited: status.rounds_visited.clone(),
    })
}

/// GET /api/rounds
pub async fn get_rounds() -> Json<Vec<RoundInfo>> {
    let rounds = Round::ALL
        .iter()
        .map(|round| {
            let (name, description) = round.info();
            RoundInfo {
                id: *round,
                name,
                description,
                is_final: round.is_final(),
                transitions: round
                    .row()
                    .iter()
                    .map(|(event, next)| TransitionInfo {
                        event: *event,
                        next: *next,
                    })
                    .collect(),
            }
        })
        .collect();
    Json(rounds)
}

/// GET /api/bets
pub async fn get_bets(State(state): State<AppState>) -> Json<StatusCounts> {
    Json(state.bets.read().await.clone())
}
