//! Ballot manager: validated, anonymous-by-default judgment intake
//!
//! Ballots are accepted only while an item is blinded. Authorship is an
//! opaque generated pseudonym; the manager is never given a real
//! identity, so there is nothing to redact. Reveal is delegated to the
//! phase controller, which owns the one-way transition.

use std::sync::OnceLock;

use chrono::Utc;
use regex::Regex;
use tracing::{debug, info};

use crate::error::{WorkflowError, WorkflowResult};
use crate::events::{ReviewEvent, SharedEventBus};
use crate::store::{
    Ballot, Decision, ReviewedItem, SharedEntityStore, DEFAULT_BALLOT_THRESHOLD,
    MIN_RATIONALE_LEN,
};

/// Hedge/certainty words associated with low-information review comments.
/// Matching is advisory: the caller decides whether a flag blocks.
const HEDGE_PATTERN: &str =
    r"(?i)\b(obviously|clearly|trivial(?:ly)?|stupid|dumb|no[- ]?brainer|of course)\b";

fn hedge_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(HEDGE_PATTERN).expect("hedge pattern compiles"))
}

/// Advisory flags for a rationale. Empty when the text is clean. Never a
/// hard failure on its own; callers that want to enforce objective
/// language can treat a non-empty result as an error.
pub fn rationale_advisories(rationale: &str) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    let mut advisories = Vec::new();
    for found in hedge_regex().find_iter(rationale) {
        let term = found.as_str().to_lowercase();
        if seen.contains(&term) {
            continue;
        }
        advisories.push(format!(
            "rationale contains \"{}\"; prefer stating the specific observation",
            term
        ));
        seen.push(term);
    }
    advisories
}

/// A ballot as submitted by a reviewer, before ids and metadata exist.
#[derive(Debug, Clone)]
pub struct BallotDraft {
    pub decision: Decision,
    /// Stated confidence, integer 1 to 5.
    pub confidence: u8,
    pub rationale: String,
    /// Optional structured elaboration answers, passed through opaquely.
    pub nudge_responses: Option<serde_json::Value>,
}

impl BallotDraft {
    /// Convenience constructor without nudge responses
    pub fn new(decision: Decision, confidence: u8, rationale: impl Into<String>) -> Self {
        Self {
            decision,
            confidence,
            rationale: rationale.into(),
            nudge_responses: None,
        }
    }
}

/// Result of a successful submission: the stored ballot plus any
/// advisory flags on the rationale.
#[derive(Debug, Clone)]
pub struct BallotSubmission {
    pub ballot: Ballot,
    pub advisories: Vec<String>,
}

/// Validates and persists independent reviewer judgments
#[derive(Debug)]
pub struct BallotManager {
    store: SharedEntityStore,
    events: SharedEventBus,
}

impl BallotManager {
    /// Create a new ballot manager
    pub fn new(store: SharedEntityStore, events: SharedEventBus) -> Self {
        Self { store, events }
    }

    /// Submit a ballot for a reference. Validates the draft, re-checks
    /// the phase internally, creates the reviewed item lazily on first
    /// ballot, and generates the anonymous author identity.
    pub async fn submit(
        &self,
        reference: &str,
        draft: BallotDraft,
    ) -> WorkflowResult<BallotSubmission> {
        Self::validate(reference, &draft)?;

        let item = match self.store.get_item(reference).await? {
            Some(item) => item,
            None => {
                let item = ReviewedItem::new(reference, DEFAULT_BALLOT_THRESHOLD);
                self.store.insert_item(&item).await?;
                info!(reference, "reviewed item created on first ballot");
                item
            }
        };

        if !item.phase.accepts_ballots() {
            return Err(WorkflowError::SubmissionClosed {
                reference: reference.to_string(),
            });
        }

        let advisories = rationale_advisories(&draft.rationale);
        let ballot = Ballot::new(
            reference,
            draft.decision,
            draft.confidence,
            draft.rationale.trim(),
            Self::anonymous_author(),
            draft.nudge_responses,
        );
        self.store.insert_ballot(&ballot).await?;

        let count = self.store.ballot_count(reference).await?;
        debug!(reference, ballot_id = %ballot.id, count, "ballot stored");

        self.events.publish(ReviewEvent::BallotSubmitted {
            reference: reference.to_string(),
            ballot_id: ballot.id.clone(),
            ballot_count: count,
            threshold: item.ballot_threshold,
            timestamp: Utc::now(),
        });
        if count as u64 >= u64::from(item.ballot_threshold) {
            // May fire more than once when submissions race; subscribers
            // treat it as at-least-once.
            self.events.publish(ReviewEvent::ThresholdReached {
                reference: reference.to_string(),
                ballot_count: count,
                threshold: item.ballot_threshold,
                timestamp: Utc::now(),
            });
        }

        Ok(BallotSubmission { ballot, advisories })
    }

    /// Ballots for a reference, newest first
    pub async fn ballots_for(&self, reference: &str) -> WorkflowResult<Vec<Ballot>> {
        Ok(self.store.ballots_for(reference).await?)
    }

    fn validate(reference: &str, draft: &BallotDraft) -> WorkflowResult<()> {
        if reference.trim().is_empty() {
            return Err(WorkflowError::validation("reference is required"));
        }
        if !(1..=5).contains(&draft.confidence) {
            return Err(WorkflowError::validation(
                "confidence must be an integer between 1 and 5",
            ));
        }
        let rationale = draft.rationale.trim();
        if rationale.is_empty() {
            return Err(WorkflowError::validation("rationale is required"));
        }
        if rationale.chars().count() < MIN_RATIONALE_LEN {
            return Err(WorkflowError::validation(format!(
                "rationale must be at least {} characters",
                MIN_RATIONALE_LEN
            )));
        }
        Ok(())
    }

    /// Generated per submission; deliberately unrelated to any real
    /// identity the caller might know.
    fn anonymous_author() -> serde_json::Value {
        let id = uuid::Uuid::new_v4().simple().to_string();
        serde_json::json!({
            "anonId": format!("anon-{}", &id[..8]),
            "generatedAt": Utc::now(),
        })
    }
}
