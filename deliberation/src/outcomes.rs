//! Outcome tracker: what actually happened after the decision
//!
//! Outcomes arrive from two directions: tooling that watched the change
//! land (detected_auto) and humans asserting what they saw. Only
//! user-confirmed outcomes feed calibration, so auto-detections start
//! unconfirmed and wait for a person to agree.

use tracing::{debug, info};

use crate::error::{WorkflowError, WorkflowResult};
use crate::events::{ReviewEvent, SharedEventBus};
use crate::store::{Outcome, OutcomeType, SharedEntityStore};

/// Records and corrects downstream outcomes for reviewed items
pub struct OutcomeTracker {
    store: SharedEntityStore,
    events: SharedEventBus,
}

impl OutcomeTracker {
    /// Create a new outcome tracker
    pub fn new(store: SharedEntityStore, events: SharedEventBus) -> Self {
        Self { store, events }
    }

    /// Record an outcome. `user_confirmed` starts as the negation of
    /// `detected_auto`: an outcome nobody's tooling detected was, by
    /// construction, asserted by a human.
    pub async fn record(
        &self,
        item_ref: &str,
        outcome_type: OutcomeType,
        detected_auto: bool,
        detection_details: Option<serde_json::Value>,
    ) -> WorkflowResult<Outcome> {
        if item_ref.trim().is_empty() {
            return Err(WorkflowError::validation("item reference is required"));
        }

        let outcome = Outcome::new(item_ref, outcome_type, detected_auto, detection_details);
        self.store.insert_outcome(&outcome).await?;

        self.events.publish(ReviewEvent::OutcomeRecorded {
            item_ref: item_ref.to_string(),
            outcome_type,
            detected_auto,
            timestamp: outcome.timestamp,
        });
        info!(item_ref, %outcome_type, detected_auto, "outcome recorded");

        Ok(outcome)
    }

    /// Confirm or retract an outcome, optionally correcting its type.
    /// Existence is the only validation; corrections may repeat and each
    /// overwrite replaces the previous flags in place.
    pub async fn confirm(
        &self,
        outcome_id: &str,
        confirmed: bool,
        new_outcome_type: Option<OutcomeType>,
    ) -> WorkflowResult<Outcome> {
        let Some(mut outcome) = self.store.get_outcome(outcome_id).await? else {
            return Err(WorkflowError::OutcomeNotFound {
                outcome_id: outcome_id.to_string(),
            });
        };

        outcome.user_confirmed = confirmed;
        if let Some(outcome_type) = new_outcome_type {
            outcome.outcome_type = outcome_type;
        }
        if self.store.update_outcome(&outcome).await? == 0 {
            // The row vanished between read and write; treat as missing.
            return Err(WorkflowError::OutcomeNotFound {
                outcome_id: outcome_id.to_string(),
            });
        }

        debug!(outcome_id, confirmed, "outcome confirmation updated");
        Ok(outcome)
    }

    /// Outcomes for an item, newest first
    pub async fn outcomes_for(&self, item_ref: &str) -> WorkflowResult<Vec<Outcome>> {
        Ok(self.store.outcomes_for(item_ref).await?)
    }
}
