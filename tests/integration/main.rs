//! Integration tests: whole periods driven through several in-process
//! agents sharing one transition engine.

mod mock_market;
mod period_flow;
