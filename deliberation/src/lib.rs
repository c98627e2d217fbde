//! Deliberation: a bias-resistant review workflow core
//!
//! This library provides:
//! - Blind ballot collection with anonymized authorship
//! - A threshold-gated, one-way reveal transition per reviewed item
//! - Outcome tracking and confidence calibration over review history
//! - Decision-scheme bookkeeping and retrospective analytics
//!
//! # Flow
//!
//! Reviewers submit independent ballots while an item is blinded; once
//! the ballot count reaches the item's threshold the phase controller
//! reveals everything at once and discussion opens. After the change
//! ships, outcomes are recorded and the calibration engine joins them
//! back to the ballots to score stated confidence against reality.
//!
//! ```ignore
//! use deliberation::{BallotDraft, Decision, ReviewWorkflow, WorkflowConfig};
//!
//! let workflow = ReviewWorkflow::new(WorkflowConfig::default());
//! workflow.init().await?;
//!
//! let ballots = workflow.ballots()?;
//! ballots.submit("owner/repo#123", BallotDraft::new(
//!     Decision::Approve, 4, "bounded retries, failure paths tested",
//! )).await?;
//!
//! let phase = workflow.phase()?;
//! if phase.can_reveal("owner/repo#123").await? {
//!     phase.reveal("owner/repo#123").await?;
//! }
//! ```
//!
//! All durable state lives in a single JSON snapshot owned by the entity
//! store; every component is a thin handle over it.

#![allow(clippy::uninlined_format_args)]

pub mod ballots;
pub mod calibration;
pub mod error;
pub mod events;
pub mod outcomes;
pub mod phase;
pub mod retrospective;
pub mod schemes;
pub mod store;
pub mod workflow;

// Re-export key error types
pub use error::{WorkflowError, WorkflowResult};

// Re-export key store types
pub use store::{
    Ballot, BiasPattern, Decision, DecisionScheme, EntityStore, Outcome, OutcomeType,
    PostedSummary, Retrospective, ReviewPhase, ReviewedItem, SchemeType, SharedEntityStore,
    StoreError, TriggerType, DEFAULT_BALLOT_THRESHOLD, MIN_RATIONALE_LEN,
};

// Re-export component types
pub use ballots::{rationale_advisories, BallotDraft, BallotManager, BallotSubmission};
pub use calibration::{CalibrationDataPoint, CalibrationEngine, CalibrationReport};
pub use outcomes::OutcomeTracker;
pub use phase::{PhaseController, RevealOutcome};
pub use retrospective::{ReflectionAnalytics, RetroFilter, RetrospectiveLog};
pub use schemes::SchemeRecorder;

// Re-export workflow facade
pub use workflow::{ReviewWorkflow, SharedReviewWorkflow, WorkflowConfig};

// Re-export event types
pub use events::{EventBus, ReviewEvent, SharedEventBus};
