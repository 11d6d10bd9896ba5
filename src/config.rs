//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys) are referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::types::TraderError;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub consensus: ConsensusConfig,
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub benchmarking: BenchmarkingConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
    /// Number of agents taking part in every round.
    pub n_agents: usize,
    /// Directory holding each agent's bet file.
    pub store_path: PathBuf,
    pub period_interval_secs: u64,
    /// Requeue every bet each time this many periods have run; 0 disables.
    #[serde(default)]
    pub checkpoint_interval_periods: u64,
}

impl AgentConfig {
    /// Whether `period` starts at a requeue checkpoint.
    pub fn is_checkpoint(&self, period: u64) -> bool {
        self.checkpoint_interval_periods > 0
            && period > 0
            && period % self.checkpoint_interval_periods == 0
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "trader-001".to_string(),
            n_agents: 4,
            store_path: PathBuf::from("data"),
            period_interval_secs: 300,
            checkpoint_interval_periods: 0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConsensusConfig {
    /// Explicit quorum; defaults to `2N/3 + 1` when unset.
    #[serde(default)]
    pub threshold: Option<usize>,
    pub round_timeout_secs: u64,
    pub redeem_round_timeout_secs: u64,
    pub max_rounds_per_period: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            threshold: None,
            round_timeout_secs: 30,
            redeem_round_timeout_secs: 60,
            max_rounds_per_period: 64,
        }
    }
}

impl ConsensusConfig {
    /// Quorum for `n_agents` participants.
    pub fn threshold_for(&self, n_agents: usize) -> usize {
        self.threshold.unwrap_or(n_agents * 2 / 3 + 1)
    }

    pub fn round_timeout(&self) -> Duration {
        Duration::from_secs(self.round_timeout_secs)
    }

    pub fn redeem_round_timeout(&self) -> Duration {
        Duration::from_secs(self.redeem_round_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SamplingConfig {
    /// Seconds before `openingTimestamp` at which a bet is retired.
    pub opening_margin: i64,
    /// Extra seconds of headroom required before the opening margin.
    pub safe_voting_range: i64,
    /// Only sample bets opening within this many days.
    pub sample_bets_closing_days: i64,
    /// Probability in `[0, 1]` of rebetting when a bet has been placed before.
    pub rebet_chance: f64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            opening_margin: 300,
            safe_voting_range: 600,
            sample_bets_closing_days: 10,
            rebet_chance: 0.6,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StrategyConfig {
    /// Oracle confidence strictly above this is profitable.
    pub min_confidence: f64,
    /// Wei placed per bet.
    pub bet_amount: u64,
    /// Wei that must remain in the wallet after placing a bet.
    pub floor_balance: u64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            bet_amount: 100_000_000_000_000_000,
            floor_balance: 0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct BenchmarkingConfig {
    pub enabled: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OracleConfig {
    pub provider: String,
    pub model: String,
    pub api_key_env: String,
    pub max_tokens: u32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4.1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            max_tokens: 1024,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MarketConfig {
    pub feed_path: PathBuf,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            feed_path: PathBuf::from("markets.json"),
        }
    }
}

/// Dry-run chain collaborators used by the local runner.
#[derive(Debug, Deserialize, Clone)]
pub struct ChainConfig {
    pub mocking: bool,
    pub needs_subscription: bool,
    /// Wallet balance reported in wei.
    pub wallet_balance: u64,
    pub beacon_salt: String,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            mocking: false,
            needs_subscription: false,
            wallet_balance: 1_000_000_000_000_000_000,
            beacon_salt: "quorum-trader".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8716,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {path}"))?;
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), TraderError> {
        let n = self.agent.n_agents;
        if n == 0 {
            return Err(TraderError::Config("n_agents must be at least 1".into()));
        }
        let threshold = self.consensus.threshold_for(n);
        if threshold == 0 || threshold > n {
            return Err(TraderError::Config(format!(
                "threshold {threshold} must be within 1..={n}"
            )));
        }
        if !(0.0..=1.0).contains(&self.sampling.rebet_chance) {
            return Err(TraderError::Config(format!(
                "rebet_chance {} must be within [0, 1]",
                self.sampling.rebet_chance
            )));
        }
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config() {
        // Requires config.toml in the working directory; skipped otherwise.
        let result = AppConfig::load("config.toml");
        if let Ok(cfg) = result {
            assert_eq!(cfg.agent.n_agents, 4);
            assert_eq!(cfg.consensus.round_timeout_secs, 30);
            assert_eq!(cfg.consensus.redeem_round_timeout_secs, 60);
            assert!(cfg.sampling.rebet_chance <= 1.0);
        }
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [sampling]
            opening_margin = 60
            safe_voting_range = 120
            sample_bets_closing_days = 3
            rebet_chance = 0.25
            "#,
        )
        .unwrap();
        assert_eq!(cfg.sampling.opening_margin, 60);
        assert_eq!(cfg.agent.n_agents, 4);
        assert_eq!(cfg.strategy.min_confidence, 0.5);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_default_threshold_is_two_thirds_plus_one() {
        let cfg = ConsensusConfig::default();
        assert_eq!(cfg.threshold_for(1), 1);
        assert_eq!(cfg.threshold_for(3), 3);
        assert_eq!(cfg.threshold_for(4), 3);
        assert_eq!(cfg.threshold_for(7), 5);
    }

    #[test]
    fn test_validate_rejects_threshold_above_agents() {
        let mut cfg = AppConfig::default();
        cfg.consensus.threshold = Some(5);
        assert!(matches!(cfg.validate(), Err(TraderError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_rebet_chance() {
        let mut cfg = AppConfig::default();
        cfg.sampling.rebet_chance = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_checkpoint_boundaries() {
        let mut cfg = AgentConfig::default();
        assert!(!cfg.is_checkpoint(10));
        cfg.checkpoint_interval_periods = 5;
        assert!(!cfg.is_checkpoint(0));
        assert!(!cfg.is_checkpoint(4));
        assert!(cfg.is_checkpoint(5));
        assert!(cfg.is_checkpoint(10));
    }

    #[test]
    fn test_timeouts_as_durations() {
        let cfg = ConsensusConfig::default();
        assert_eq!(cfg.round_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.redeem_round_timeout(), Duration::from_secs(60));
    }
}
