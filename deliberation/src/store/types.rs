//! Persisted entity types for the review workflow
//!
//! These types are stored in the snapshot store. Field names and enum
//! wire values are a compatibility surface: snapshots written by earlier
//! deployments must keep deserializing, so every struct pins camelCase
//! field names and every enum pins its value set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default ballot threshold for newly initialized items.
///
/// Single source of truth; call sites must not restate the number.
pub const DEFAULT_BALLOT_THRESHOLD: u32 = 3;

/// Minimum trimmed rationale length accepted by ballot validation.
pub const MIN_RATIONALE_LEN: usize = 10;

fn default_ballot_threshold() -> u32 {
    DEFAULT_BALLOT_THRESHOLD
}

/// Phase of a reviewed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewPhase {
    /// Ballots are being collected; authorship and rationale stay hidden.
    Blinded,
    /// Ballots are visible and discussion is open. Terminal.
    Revealed,
}

impl ReviewPhase {
    /// Whether ballots may still be submitted in this phase.
    pub fn accepts_ballots(self) -> bool {
        matches!(self, Self::Blinded)
    }

    /// Whether `to` is a legal transition target. The only legal move is
    /// blinded to revealed; revealed never transitions again.
    pub fn can_transition_to(self, to: ReviewPhase) -> bool {
        self == Self::Blinded && to == Self::Revealed
    }
}

impl std::fmt::Display for ReviewPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blinded => write!(f, "blinded"),
            Self::Revealed => write!(f, "revealed"),
        }
    }
}

/// Reviewer decision on a ballot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
    /// Abstention; carries no falsifiable prediction and is excluded from
    /// calibration joins.
    Neutral,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Approve => write!(f, "approve"),
            Self::Reject => write!(f, "reject"),
            Self::Neutral => write!(f, "neutral"),
        }
    }
}

/// Downstream result of a reviewed change after it shipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeType {
    MergedClean,
    BugFound,
    Reverted,
    FollowupRequired,
}

impl std::fmt::Display for OutcomeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MergedClean => write!(f, "merged_clean"),
            Self::BugFound => write!(f, "bug_found"),
            Self::Reverted => write!(f, "reverted"),
            Self::FollowupRequired => write!(f, "followup_required"),
        }
    }
}

/// Aggregation rule used to turn ballots into one decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemeType {
    Consensus,
    TruthWins,
    Majority,
    ExpertVeto,
    Unanimous,
    Custom,
}

impl std::fmt::Display for SchemeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Consensus => write!(f, "consensus"),
            Self::TruthWins => write!(f, "truth_wins"),
            Self::Majority => write!(f, "majority"),
            Self::ExpertVeto => write!(f, "expert_veto"),
            Self::Unanimous => write!(f, "unanimous"),
            Self::Custom => write!(f, "custom"),
        }
    }
}

/// What prompted a retrospective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Manual,
    AutoBugFound,
    AutoRevert,
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::AutoBugFound => write!(f, "auto_bug_found"),
            Self::AutoRevert => write!(f, "auto_revert"),
        }
    }
}

/// Cognitive-bias pattern tags attachable to a retrospective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiasPattern {
    Groupthink,
    HiddenProfile,
    StatusBias,
    Overconfidence,
    Other,
}

impl BiasPattern {
    /// Wire value of this tag.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Groupthink => "groupthink",
            Self::HiddenProfile => "hidden_profile",
            Self::StatusBias => "status_bias",
            Self::Overconfidence => "overconfidence",
            Self::Other => "other",
        }
    }

    /// Parse a stored tag. Unknown tags yield `None`; aggregation skips
    /// them rather than failing the whole pass.
    pub fn parse_tag(tag: &str) -> Option<Self> {
        match tag {
            "groupthink" => Some(Self::Groupthink),
            "hidden_profile" => Some(Self::HiddenProfile),
            "status_bias" => Some(Self::StatusBias),
            "overconfidence" => Some(Self::Overconfidence),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

impl std::fmt::Display for BiasPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Marker for an externally posted review summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostedSummary {
    /// Opaque identifier of the external comment (never parsed).
    pub external_ref: String,
    /// When the summary was posted.
    pub posted_at: DateTime<Utc>,
}

/// One reviewed item, keyed by its reference string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewedItem {
    /// Opaque reference to the change under review, e.g. "owner/repo#123".
    /// Compared only for equality.
    pub reference: String,
    /// Current phase. Moves blinded to revealed exactly once.
    pub phase: ReviewPhase,
    /// Ballots required before reveal is allowed. Rows written before the
    /// field existed fall back to the default.
    #[serde(default = "default_ballot_threshold")]
    pub ballot_threshold: u32,
    /// Optional deadline for the independent first pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_pass_deadline: Option<DateTime<Utc>>,
    /// Set at most once, when a summary is posted externally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posted_summary_ref: Option<PostedSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReviewedItem {
    /// Create a fresh item in the blinded phase.
    pub fn new(reference: impl Into<String>, ballot_threshold: u32) -> Self {
        let now = Utc::now();
        Self {
            reference: reference.into(),
            phase: ReviewPhase::Blinded,
            ballot_threshold,
            first_pass_deadline: None,
            posted_summary_ref: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Update the last-modified stamp.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// An independent reviewer judgment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ballot {
    pub id: String,
    /// Reference of the reviewed item this ballot belongs to.
    pub reference: String,
    pub decision: Decision,
    /// Stated confidence, integer 1 to 5.
    pub confidence: u8,
    pub rationale: String,
    /// Opaque anonymized authorship blob. Semantically private until the
    /// item is revealed; the core never stores a real identity here.
    pub author_metadata: serde_json::Value,
    /// Optional structured elaboration answers, opaque to the core.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nudge_responses: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    /// Once true, never reverts.
    #[serde(default)]
    pub revealed: bool,
}

impl Ballot {
    /// Create a new unrevealed ballot with a generated id.
    pub fn new(
        reference: impl Into<String>,
        decision: Decision,
        confidence: u8,
        rationale: impl Into<String>,
        author_metadata: serde_json::Value,
        nudge_responses: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            reference: reference.into(),
            decision,
            confidence,
            rationale: rationale.into(),
            author_metadata,
            nudge_responses,
            created_at: Utc::now(),
            revealed: false,
        }
    }
}

/// A recorded downstream outcome for an item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub id: String,
    pub item_ref: String,
    pub outcome_type: OutcomeType,
    /// Whether tooling detected this outcome rather than a person.
    pub detected_auto: bool,
    /// Defaults to the negation of `detected_auto`: an outcome nobody's
    /// tooling detected was asserted by a human.
    pub user_confirmed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection_details: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl Outcome {
    /// Record a new outcome. `user_confirmed` starts as `!detected_auto`.
    pub fn new(
        item_ref: impl Into<String>,
        outcome_type: OutcomeType,
        detected_auto: bool,
        detection_details: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            item_ref: item_ref.into(),
            outcome_type,
            detected_auto,
            user_confirmed: !detected_auto,
            detection_details,
            timestamp: Utc::now(),
        }
    }
}

/// Record of which aggregation scheme was chosen for an item, and why.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionScheme {
    pub id: String,
    pub item_ref: String,
    pub scheme_type: SchemeType,
    pub rationale: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_name: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl DecisionScheme {
    pub fn new(
        item_ref: impl Into<String>,
        scheme_type: SchemeType,
        rationale: impl Into<String>,
        custom_name: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            item_ref: item_ref.into(),
            scheme_type,
            rationale: rationale.into(),
            custom_name,
            timestamp: Utc::now(),
        }
    }
}

/// A structured post-mortem for a reviewed item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Retrospective {
    pub id: String,
    pub item_ref: String,
    pub trigger_type: TriggerType,
    pub what_went_wrong: String,
    pub what_to_improve: String,
    /// Ordered, deduplicated tag list. Stored as raw strings so a tag this
    /// build doesn't know about survives round-trips and is skipped, not
    /// fatal, during aggregation.
    #[serde(default)]
    pub bias_patterns: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl Retrospective {
    /// Create a retrospective. Duplicate tags are dropped, first
    /// occurrence wins the position.
    pub fn new(
        item_ref: impl Into<String>,
        trigger_type: TriggerType,
        what_went_wrong: impl Into<String>,
        what_to_improve: impl Into<String>,
        bias_patterns: &[BiasPattern],
    ) -> Self {
        let mut tags: Vec<String> = Vec::with_capacity(bias_patterns.len());
        for pattern in bias_patterns {
            let tag = pattern.as_str().to_string();
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            item_ref: item_ref.into(),
            trigger_type,
            what_went_wrong: what_went_wrong.into(),
            what_to_improve: what_to_improve.into(),
            bias_patterns: tags,
            timestamp: Utc::now(),
        }
    }

    /// Tags of this row that parse as known bias patterns.
    pub fn known_patterns(&self) -> Vec<BiasPattern> {
        self.bias_patterns
            .iter()
            .filter_map(|tag| BiasPattern::parse_tag(tag))
            .collect()
    }
}
