//! # Turn executor
//!
//! Runs one operation against a [`ModelBackend`](crate::infrastructure::model::ModelBackend):
//!
//! 1. Truncate the initial content if the request would not fit.
//! 2. Stream a turn, forwarding every block start/delta/stop as an event.
//! 3. If the turn requested tools and more turns are allowed, dispatch each
//!    call, append the results as a tool turn, and go to 2.
//! 4. Otherwise parse the final answer and return the outcome.
//!
//! The last allowed turn, or the first turn that would overflow the context,
//! is sent in a forced-final mode (see [`FinalizeMode`]); tools requested on
//! that turn are not executed.

mod errors;
mod models;
mod runner;

pub use errors::EngineError;
pub use models::{FinalizeMode, RunOptions, RunOutcome, Task, UsageCallback};
pub use runner::Engine;
