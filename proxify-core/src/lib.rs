//! Moderation consensus engine for Proxify alerts.
//!
//! This crate holds everything that can be decided without I/O:
//! - **Model**: reports, votes, notifications (`model`, `notification`)
//! - **Quorum**: thresholds and their evaluation (`quorum`)
//! - **Transition**: pure function `(snapshot, vote) -> (outcome, effects)`
//! - **Effects**: the writes a transition asks a store to commit atomically
//!
//! Stores and the HTTP surface live in `proxify-server`.

pub mod effect;
pub mod error;
pub mod model;
pub mod notification;
pub mod quorum;
pub mod transition;

pub use effect::Effect;
pub use error::{ModerationError, Result};
pub use model::*;
pub use notification::*;
pub use quorum::{evaluate, Outcome, QuorumPolicy};
pub use transition::{plan_vote, VoteCommand, VoteOutcome, VotePlan, VoteSnapshot};
