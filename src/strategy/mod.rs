//! Decision strategy: which bet to sample and whether to place it.

pub mod prediction;
pub mod sampling;

pub use prediction::{bet_amount, is_profitable, vote_for};
pub use sampling::SamplingEngine;
