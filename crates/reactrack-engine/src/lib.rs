//! Conversational turn orchestration.
//!
//! [`TurnController`] is the entry point: it resolves the sender's session,
//! runs resolved actions against the store, batches structured replies and
//! hands everything to the [`DeliveryScheduler`] for paced, ordered issuance.

pub mod actions;
pub mod batcher;
pub mod error;
pub mod scheduler;
pub mod sessions;
pub mod turn;

pub use actions::ActionHandler;
pub use batcher::batch;
pub use error::EngineError;
pub use scheduler::{
    DeliveryOutcome, DeliveryScheduler, DeliveryTicket, SchedulerConfig, UnitOutcome,
};
pub use sessions::{IdentityCache, Session};
pub use turn::{Reply, TurnController, TurnOutcome, FALLBACK_TEXT};
