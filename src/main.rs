//! QUORUM TRADER: replicated prediction-market decision engine
//!
//! Entry point. Loads configuration, initialises structured logging,
//! builds the configured number of in-process agents around one
//! transition engine, and runs one period per tick with graceful shutdown.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use quorum_trader::chain::{DryRunTxPreparer, HashBeacon};
use quorum_trader::config::{self, AppConfig};
use quorum_trader::dashboard::{self, DashboardState};
use quorum_trader::engine::{
    Agent, Clock, Collaborators, PeriodReport, PeriodRunner, RoundTransitionEngine, SystemClock,
};
use quorum_trader::llm::openai::OpenAiPredictor;
use quorum_trader::llm::{FixedOracle, PredictionOracle};
use quorum_trader::markets::feed::JsonFileFeed;
use quorum_trader::types::PredictionResponse;

const BANNER: &str = r#"
  ___  _   _  ___  ____  _   _ __  __
 / _ \| | | |/ _ \|  _ \| | | |  \/  |
| | | | | | | | | | |_) | | | | |\/| |
| |_| | |_| | |_| |  _ <| |_| | |  | |
 \__\_\\___/ \___/|_| \_\\___/|_|  |_|

  Replicated prediction-market trader
  v0.1.0
"#;

const MARKET_NAME: &str = "omen_subgraph";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = config::AppConfig::load("config.toml")?;
    init_logging();

    println!("{BANNER}");
    info!(
        agent_name = %cfg.agent.name,
        n_agents = cfg.agent.n_agents,
        threshold = cfg.consensus.threshold_for(cfg.agent.n_agents),
        period_interval_secs = cfg.agent.period_interval_secs,
        benchmarking = cfg.benchmarking.enabled,
        "QUORUM TRADER starting up"
    );

    // -- Initialise components -------------------------------------------

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let collab = build_collaborators(&cfg);
    let participants: Vec<String> = (0..cfg.agent.n_agents)
        .map(|i| format!("{}-{i}", cfg.agent.name))
        .collect();
    let agents: Vec<Agent> = participants
        .iter()
        .map(|id| Agent::new(id, &cfg, collab.clone()))
        .collect();

    let engine = RoundTransitionEngine::new(participants, &cfg.consensus, clock.now())?;
    let mut runner = PeriodRunner::new(engine, agents, clock, cfg.agent.clone());

    if cfg.dashboard.enabled {
        let status = Arc::new(DashboardState::new());
        dashboard::spawn_dashboard(status.clone(), cfg.dashboard.port);
        runner = runner.with_status(status);
    }

    // -- Main loop -------------------------------------------------------

    let period_interval = Duration::from_secs(cfg.agent.period_interval_secs);
    let mut interval = tokio::time::interval(period_interval);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = cfg.agent.period_interval_secs,
        "Entering main loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match runner.run_period().await {
                    Ok(report) => log_period_report(&report),
                    Err(e) => error!(error = %e, "Period failed, continuing to next"),
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    info!(
        periods = runner.engine().period(),
        tx_hashes = runner.engine().state().tx_hashes_history().len(),
        "QUORUM TRADER shut down cleanly."
    );
    Ok(())
}

fn build_collaborators(cfg: &AppConfig) -> Collaborators {
    let mut chain = DryRunTxPreparer::new(u128::from(cfg.chain.wallet_balance));
    chain.mocking = cfg.chain.mocking;
    chain.needs_subscription = cfg.chain.needs_subscription;

    Collaborators {
        market: Arc::new(JsonFileFeed::new(&cfg.market.feed_path, MARKET_NAME)),
        oracle: build_oracle(cfg),
        chain: Arc::new(chain),
        beacon: Arc::new(HashBeacon::new(&cfg.chain.beacon_salt)),
    }
}

/// The configured oracle, or one that rejects every bet when none is usable.
fn build_oracle(cfg: &AppConfig) -> Arc<dyn PredictionOracle> {
    let fallback = |reason: String| -> Arc<dyn PredictionOracle> {
        warn!(reason = %reason, "No usable prediction oracle, every bet will be unprofitable");
        Arc::new(FixedOracle::new(PredictionResponse::error(reason)))
    };

    if cfg.oracle.provider != "openai" {
        return fallback(format!("unsupported oracle provider {}", cfg.oracle.provider));
    }
    let key = match AppConfig::resolve_env(&cfg.oracle.api_key_env) {
        Ok(key) => key,
        Err(e) => return fallback(e.to_string()),
    };
    match OpenAiPredictor::new(
        key,
        Some(cfg.oracle.model.clone()),
        Some(cfg.oracle.max_tokens),
    ) {
        Ok(client) => {
            info!(model = %cfg.oracle.model, "OpenAI oracle initialised");
            Arc::new(client)
        }
        Err(e) => fallback(e.to_string()),
    }
}

fn log_period_report(report: &PeriodReport) {
    let path: Vec<String> = report
        .transitions
        .iter()
        .map(|t| format!("{}->{}", t.event, t.to))
        .collect();
    info!(
        period = report.period,
        final_round = %report.final_round,
        rounds = report.transitions.len(),
        path = %path.join(" "),
        "Period complete"
    );
}

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("quorum_trader=info"));

    let json_logging = std::env::var("TRADER_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
