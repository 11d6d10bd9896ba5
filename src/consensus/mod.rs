//! Agreement primitives: quorum collection and the shared decision state.

pub mod collector;
pub mod shared;

pub use collector::ThresholdCollector;
pub use shared::{DbKey, DbValue, SharedDecisionState, StateDiff};
