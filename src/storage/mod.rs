//! Persistence layer.
//!
//! Saves and loads each agent's bet registry to/from a JSON file, and
//! hashes the serialized form so agents can check they derived the same
//! bet set.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, error, info};

use crate::markets::BetRegistry;
use crate::types::Bet;

/// Default bets file name inside an agent's data directory.
pub const BETS_FILENAME: &str = "bets.json";

/// Canonical serialized form of the registry.
pub fn serialize_bets(registry: &BetRegistry) -> Result<String> {
    serde_json::to_string_pretty(registry.bets()).context("Failed to serialise bets")
}

/// Save the registry to a JSON file, creating parent directories.
pub fn save_bets(registry: &BetRegistry, path: &Path) -> Result<()> {
    let json = serialize_bets(registry)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, &json)
        .with_context(|| format!("Failed to write bets to {}", path.display()))?;

    debug!(path = %path.display(), count = registry.len(), "Bets saved");
    Ok(())
}

/// Load the registry from a JSON file.
/// Returns None if the file doesn't exist (fresh start).
pub fn load_bets(path: &Path) -> Result<Option<BetRegistry>> {
    if !path.exists() {
        info!(path = %path.display(), "No saved bets found, starting fresh");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read bets from {}", path.display()))?;
    let bets: Vec<Bet> = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse bets from {}", path.display()))?;

    debug!(path = %path.display(), count = bets.len(), "Bets loaded from disk");
    Ok(Some(BetRegistry::from_bets(bets)))
}

/// Like `load_bets`, but any failure yields an empty registry.
pub fn read_bets(path: &Path) -> BetRegistry {
    match load_bets(path) {
        Ok(Some(registry)) => registry,
        Ok(None) => BetRegistry::new(),
        Err(e) => {
            error!(error = %e, "Failed to read bets, continuing with none");
            BetRegistry::new()
        }
    }
}

/// Like `save_bets`, but failures are only logged.
pub fn store_bets(registry: &BetRegistry, path: &Path) {
    if let Err(e) = save_bets(registry, path) {
        error!(error = %e, "Failed to store bets");
    }
}

/// Hex SHA-256 of the serialized registry; `None` when it is empty.
pub fn hash_bets(registry: &BetRegistry) -> Option<String> {
    if registry.is_empty() {
        return None;
    }
    match serialize_bets(registry) {
        Ok(json) => Some(format!("{:x}", Sha256::digest(json.as_bytes()))),
        Err(e) => {
            error!(error = %e, "Failed to hash bets");
            None
        }
    }
}

/// Delete the bets file (for testing or reset).
pub fn delete_bets(path: &Path) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to delete bets file {}", path.display()))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
