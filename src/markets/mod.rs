//! Market data: the source collaborator and the agent-local bet registry.
//!
//! Defines the `MarketSource` trait that every market data feed implements,
//! plus the registry and liquidity cache the sampling round works on.

pub mod feed;
pub mod liquidity;
pub mod registry;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::FetchBatch;

pub use liquidity::LiquidityCache;
pub use registry::BetRegistry;

/// Abstraction over market data sources (subgraphs, files, mocks).
///
/// A failed or partial fetch is reported through `FetchBatch::status`
/// rather than as an error, so the registry can apply its reset policy.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketSource: Send + Sync {
    /// Fetch the current batch of open bets.
    async fn fetch_bets(&self) -> Result<FetchBatch>;

    /// Source name, recorded on every bet it creates.
    fn name(&self) -> &str;
}
