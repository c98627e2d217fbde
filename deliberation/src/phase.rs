//! Phase controller: the blinded-to-revealed state machine
//!
//! Owns the one-way reveal transition and its threshold gate. Keeping
//! reveal here (rather than in the ballot manager) centralizes the
//! invariant that judgments become visible all at once or not at all.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::{WorkflowError, WorkflowResult};
use crate::events::{ReviewEvent, SharedEventBus};
use crate::store::{
    PostedSummary, ReviewPhase, ReviewedItem, SharedEntityStore, DEFAULT_BALLOT_THRESHOLD,
};

/// Caller-visible result of a reveal attempt.
///
/// Reveal failures are states, not errors: two callers racing across the
/// threshold both deserve a meaningful answer, and exactly one of them
/// gets `Revealed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealOutcome {
    /// This call performed the transition.
    Revealed { ballots_revealed: usize },
    /// The item was already revealed before this call.
    AlreadyRevealed,
    /// Not enough ballots yet; nothing changed.
    ThresholdNotMet { have: usize, need: u32 },
}

impl RevealOutcome {
    /// Whether the item is revealed after this call, regardless of who
    /// performed the transition.
    pub fn is_revealed(self) -> bool {
        matches!(self, Self::Revealed { .. } | Self::AlreadyRevealed)
    }
}

/// Controls phase transitions and publication markers for reviewed items
pub struct PhaseController {
    store: SharedEntityStore,
    events: SharedEventBus,
}

impl PhaseController {
    /// Create a new phase controller
    pub fn new(store: SharedEntityStore, events: SharedEventBus) -> Self {
        Self { store, events }
    }

    /// Initialize a reviewed item. Idempotent: repeat calls update the
    /// threshold and timestamp but never touch the phase, so exactly one
    /// row exists per reference however many times this runs.
    pub async fn initialize(&self, reference: &str, threshold: u32) -> WorkflowResult<ReviewedItem> {
        if reference.trim().is_empty() {
            return Err(WorkflowError::validation("reference is required"));
        }
        if threshold < 1 {
            return Err(WorkflowError::validation(
                "ballot threshold must be at least 1",
            ));
        }

        match self.store.get_item(reference).await? {
            Some(mut item) => {
                item.ballot_threshold = threshold;
                item.touch();
                // No native upsert: update, check the affected count,
                // fall back to insert if the row vanished underneath us.
                if self.store.update_item(&item).await? == 0 {
                    self.store.insert_item(&item).await?;
                }
                debug!(reference, threshold, "reviewed item re-initialized");
                Ok(item)
            }
            None => {
                let item = ReviewedItem::new(reference, threshold);
                self.store.insert_item(&item).await?;
                info!(reference, threshold, "reviewed item initialized");
                Ok(item)
            }
        }
    }

    /// Ensure an item row exists, creating one with the default threshold
    /// if needed. Used by lazy creation on first ballot.
    pub async fn ensure_item(&self, reference: &str) -> WorkflowResult<ReviewedItem> {
        match self.store.get_item(reference).await? {
            Some(item) => Ok(item),
            None => self.initialize(reference, DEFAULT_BALLOT_THRESHOLD).await,
        }
    }

    /// Whether ballots may be submitted for this reference. True when the
    /// item is still blinded or does not exist yet (first ballot creates
    /// it).
    pub async fn can_submit(&self, reference: &str) -> WorkflowResult<bool> {
        Ok(match self.store.get_item(reference).await? {
            Some(item) => item.phase.accepts_ballots(),
            None => true,
        })
    }

    /// Whether the item can be revealed: still blinded, and the ballot
    /// count has reached the stored threshold.
    pub async fn can_reveal(&self, reference: &str) -> WorkflowResult<bool> {
        let Some(item) = self.store.get_item(reference).await? else {
            return Ok(false);
        };
        if item.phase != ReviewPhase::Blinded {
            return Ok(false);
        }
        let count = self.store.ballot_count(reference).await?;
        Ok(count as u64 >= u64::from(item.ballot_threshold))
    }

    /// Reveal an item: flip every ballot and the item phase in one store
    /// operation. Re-checks the gate internally; callers may still consult
    /// `can_reveal` first for UI purposes.
    pub async fn reveal(&self, reference: &str) -> WorkflowResult<RevealOutcome> {
        let count = self.store.ballot_count(reference).await?;
        let Some(item) = self.store.get_item(reference).await? else {
            return Ok(RevealOutcome::ThresholdNotMet {
                have: count,
                need: DEFAULT_BALLOT_THRESHOLD,
            });
        };

        if item.phase == ReviewPhase::Revealed {
            return Ok(RevealOutcome::AlreadyRevealed);
        }
        if (count as u64) < u64::from(item.ballot_threshold) {
            return Ok(RevealOutcome::ThresholdNotMet {
                have: count,
                need: item.ballot_threshold,
            });
        }

        let ballots_revealed = self
            .store
            .reveal_ballots(reference)
            .await?
            .unwrap_or(0);

        self.events.publish(ReviewEvent::ItemRevealed {
            reference: reference.to_string(),
            ballots_revealed,
            timestamp: Utc::now(),
        });
        info!(reference, ballots_revealed, "item revealed");

        Ok(RevealOutcome::Revealed { ballots_revealed })
    }

    /// Record that a summary was posted externally. At most once per
    /// item: returns false (and changes nothing) when a marker is
    /// already present.
    pub async fn mark_posted(&self, reference: &str, external_ref: &str) -> WorkflowResult<bool> {
        if external_ref.trim().is_empty() {
            return Err(WorkflowError::validation("external reference is required"));
        }
        let mut item = self.ensure_item(reference).await?;
        if item.posted_summary_ref.is_some() {
            return Ok(false);
        }
        item.posted_summary_ref = Some(PostedSummary {
            external_ref: external_ref.to_string(),
            posted_at: Utc::now(),
        });
        item.touch();
        if self.store.update_item(&item).await? == 0 {
            self.store.insert_item(&item).await?;
        }
        debug!(reference, external_ref, "summary marked posted");
        Ok(true)
    }

    /// Whether a summary was already posted for this item
    pub async fn is_posted(&self, reference: &str) -> WorkflowResult<bool> {
        Ok(self
            .store
            .get_item(reference)
            .await?
            .is_some_and(|item| item.posted_summary_ref.is_some()))
    }

    /// Set or clear the first-pass deadline for an item
    pub async fn set_first_pass_deadline(
        &self,
        reference: &str,
        deadline: Option<DateTime<Utc>>,
    ) -> WorkflowResult<()> {
        let mut item = self.ensure_item(reference).await?;
        item.first_pass_deadline = deadline;
        item.touch();
        if self.store.update_item(&item).await? == 0 {
            self.store.insert_item(&item).await?;
        }
        Ok(())
    }
}
