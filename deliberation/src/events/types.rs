//! Event types for review-workflow notifications
//!
//! Published to the bus so the hosting panel can react without polling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{OutcomeType, TriggerType};

/// All review-workflow events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReviewEvent {
    /// A ballot was accepted for an item
    BallotSubmitted {
        reference: String,
        ballot_id: String,
        ballot_count: usize,
        threshold: u32,
        timestamp: DateTime<Utc>,
    },

    /// Ballot count reached the reveal threshold.
    ///
    /// Racing submissions may publish this more than once per item;
    /// subscribers must treat it as at-least-once.
    ThresholdReached {
        reference: String,
        ballot_count: usize,
        threshold: u32,
        timestamp: DateTime<Utc>,
    },

    /// An item transitioned to the revealed phase
    ItemRevealed {
        reference: String,
        ballots_revealed: usize,
        timestamp: DateTime<Utc>,
    },

    /// A downstream outcome was recorded
    OutcomeRecorded {
        item_ref: String,
        outcome_type: OutcomeType,
        detected_auto: bool,
        timestamp: DateTime<Utc>,
    },

    /// A retrospective was recorded
    RetrospectiveRecorded {
        item_ref: String,
        trigger_type: TriggerType,
        timestamp: DateTime<Utc>,
    },
}

impl ReviewEvent {
    /// Short name for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::BallotSubmitted { .. } => "ballot_submitted",
            Self::ThresholdReached { .. } => "threshold_reached",
            Self::ItemRevealed { .. } => "item_revealed",
            Self::OutcomeRecorded { .. } => "outcome_recorded",
            Self::RetrospectiveRecorded { .. } => "retrospective_recorded",
        }
    }

    /// When the event occurred
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::BallotSubmitted { timestamp, .. }
            | Self::ThresholdReached { timestamp, .. }
            | Self::ItemRevealed { timestamp, .. }
            | Self::OutcomeRecorded { timestamp, .. }
            | Self::RetrospectiveRecorded { timestamp, .. } => *timestamp,
        }
    }
}
