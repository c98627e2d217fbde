//! Durable entity storage for the review workflow
//!
//! One JSON snapshot holds every table; schema constants, entity types,
//! and the store itself live in the submodules.

pub mod schema;
pub mod snapshot;
pub mod types;

pub use snapshot::{EntityStore, SharedEntityStore, StoreError, StoreResult};
pub use types::{
    Ballot, BiasPattern, Decision, DecisionScheme, Outcome, OutcomeType, PostedSummary,
    Retrospective, ReviewPhase, ReviewedItem, SchemeType, TriggerType, DEFAULT_BALLOT_THRESHOLD,
    MIN_RATIONALE_LEN,
};
