//! Replicated decision engine.
//!
//! The round table, the payloads agents agree on, the transition engine
//! that applies agreed outcomes, the per-round agent behaviours and the
//! local runner that drives whole periods.

pub mod app;
pub mod behaviours;
pub mod payloads;
pub mod period;
pub mod rounds;

pub use app::{RoundTransitionEngine, Timeouts, Transition};
pub use behaviours::{Agent, Collaborators};
pub use payloads::{Payload, PredictionVote};
pub use period::{Clock, FixedClock, PeriodReport, PeriodRunner, SystemClock};
pub use rounds::{Event, Round};
