//! File-backed market source.
//!
//! Reads an array of raw bet records (subgraph schema) from a JSON file.
//! Used for local runs and dry-run deployments with no subgraph access.

use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{debug, warn};

use super::MarketSource;
use crate::types::{FetchBatch, RawBet, TraderError};

pub struct JsonFileFeed {
    path: PathBuf,
    name: String,
}

impl JsonFileFeed {
    pub fn new(path: impl Into<PathBuf>, name: &str) -> Self {
        Self {
            path: path.into(),
            name: name.to_string(),
        }
    }

    fn failure(&self, message: String) -> anyhow::Error {
        warn!(market = %self.name, %message, "Market feed fetch failed");
        TraderError::FetchFailure {
            market: self.name.clone(),
            message,
        }
        .into()
    }
}

#[async_trait]
impl MarketSource for JsonFileFeed {
    async fn fetch_bets(&self) -> Result<FetchBatch> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| self.failure(format!("unreadable {}: {e}", self.path.display())))?;

        let records: Vec<RawBet> = serde_json::from_str(&contents)
            .map_err(|e| self.failure(format!("malformed {}: {e}", self.path.display())))?;
        debug!(path = %self.path.display(), count = records.len(), "Market feed loaded");
        Ok(FetchBatch::success(&self.name, records))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
