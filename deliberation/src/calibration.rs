//! Calibration engine: stated confidence vs. what actually happened
//!
//! Joins ballots to user-confirmed outcomes and scores the result. A
//! neutral ballot carries no falsifiable prediction and is excluded;
//! an approve is right when the change merged clean; a reject is right
//! when the change later grew a bug or was reverted.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::WorkflowResult;
use crate::store::{Decision, Outcome, OutcomeType, SharedEntityStore};

/// One ballot joined to its confirmed outcome. Derived on demand, never
/// stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationDataPoint {
    pub item_ref: String,
    pub confidence: u8,
    pub decision: Decision,
    pub outcome_type: OutcomeType,
    pub outcome_success: bool,
}

/// Aggregate calibration metrics over a set of data points.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationReport {
    /// Number of joined data points.
    pub points: usize,
    /// Mean of (confidence/5 - success)^2; lower is better. Absent when
    /// there are no points.
    pub brier_score: Option<f64>,
    /// Fraction of points with confidence >= 4 that turned out wrong.
    pub overconfidence_rate: Option<f64>,
}

impl CalibrationReport {
    /// Compute a report from data points. Exposed so callers holding a
    /// filtered slice (one reviewer, one repo) can score it themselves.
    pub fn from_points(points: &[CalibrationDataPoint]) -> Self {
        if points.is_empty() {
            return Self {
                points: 0,
                brier_score: None,
                overconfidence_rate: None,
            };
        }

        let brier_sum: f64 = points
            .iter()
            .map(|p| {
                let stated = f64::from(p.confidence) / 5.0;
                let actual = if p.outcome_success { 1.0 } else { 0.0 };
                (stated - actual) * (stated - actual)
            })
            .sum();
        let overconfident = points
            .iter()
            .filter(|p| p.confidence >= 4 && !p.outcome_success)
            .count();

        Self {
            points: points.len(),
            brier_score: Some(brier_sum / points.len() as f64),
            overconfidence_rate: Some(overconfident as f64 / points.len() as f64),
        }
    }
}

/// Whether a decision counted as correct given the outcome. Neutral has
/// no answer.
fn decision_success(decision: Decision, outcome_type: OutcomeType) -> Option<bool> {
    match decision {
        Decision::Approve => Some(outcome_type == OutcomeType::MergedClean),
        Decision::Reject => Some(matches!(
            outcome_type,
            OutcomeType::BugFound | OutcomeType::Reverted
        )),
        Decision::Neutral => None,
    }
}

/// Joins ballots with confirmed outcomes into calibration data
pub struct CalibrationEngine {
    store: SharedEntityStore,
}

impl CalibrationEngine {
    /// Create a new calibration engine
    pub fn new(store: SharedEntityStore) -> Self {
        Self { store }
    }

    /// All calibration data points, ordered by ballot recency. Each
    /// ballot joins the most recent user-confirmed outcome for its
    /// reference; ballots with no confirmed outcome, and neutral
    /// ballots, produce nothing.
    pub async fn data_points(&self) -> WorkflowResult<Vec<CalibrationDataPoint>> {
        // Outcomes arrive newest-first; keep the first confirmed one per item.
        let mut latest_confirmed: HashMap<String, Outcome> = HashMap::new();
        for outcome in self.store.list_outcomes().await? {
            if outcome.user_confirmed && !latest_confirmed.contains_key(&outcome.item_ref) {
                latest_confirmed.insert(outcome.item_ref.clone(), outcome);
            }
        }

        let mut points = Vec::new();
        for ballot in self.store.list_ballots().await? {
            let Some(outcome) = latest_confirmed.get(&ballot.reference) else {
                continue;
            };
            let Some(outcome_success) = decision_success(ballot.decision, outcome.outcome_type)
            else {
                continue;
            };
            points.push(CalibrationDataPoint {
                item_ref: ballot.reference.clone(),
                confidence: ballot.confidence,
                decision: ballot.decision,
                outcome_type: outcome.outcome_type,
                outcome_success,
            });
        }
        Ok(points)
    }

    /// Data points plus aggregate metrics in one call
    pub async fn report(&self) -> WorkflowResult<CalibrationReport> {
        Ok(CalibrationReport::from_points(&self.data_points().await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Ballot, EntityStore};
    use chrono::{Duration, Utc};

    fn ballot(reference: &str, decision: Decision, confidence: u8) -> Ballot {
        Ballot::new(
            reference,
            decision,
            confidence,
            "calibration test rationale",
            serde_json::json!({}),
            None,
        )
    }

    fn outcome(item_ref: &str, outcome_type: OutcomeType, confirmed: bool) -> Outcome {
        let mut outcome = Outcome::new(item_ref, outcome_type, true, None);
        outcome.user_confirmed = confirmed;
        outcome
    }

    async fn engine_with(
        ballots: Vec<Ballot>,
        outcomes: Vec<Outcome>,
    ) -> CalibrationEngine {
        let store = EntityStore::in_memory().shared();
        for b in &ballots {
            store.insert_ballot(b).await.unwrap();
        }
        for o in &outcomes {
            store.insert_outcome(o).await.unwrap();
        }
        CalibrationEngine::new(store)
    }

    #[tokio::test]
    async fn test_approve_aligns_with_merged_clean() {
        let engine = engine_with(
            vec![ballot("a", Decision::Approve, 5)],
            vec![outcome("a", OutcomeType::MergedClean, true)],
        )
        .await;

        let points = engine.data_points().await.unwrap();
        assert_eq!(points.len(), 1);
        assert!(points[0].outcome_success);
    }

    #[tokio::test]
    async fn test_approve_misaligns_with_bug_found() {
        let engine = engine_with(
            vec![ballot("a", Decision::Approve, 5)],
            vec![outcome("a", OutcomeType::BugFound, true)],
        )
        .await;

        let points = engine.data_points().await.unwrap();
        assert_eq!(points.len(), 1);
        assert!(!points[0].outcome_success);
    }

    #[tokio::test]
    async fn test_reject_aligns_with_bug_or_revert() {
        for outcome_type in [OutcomeType::BugFound, OutcomeType::Reverted] {
            let engine = engine_with(
                vec![ballot("a", Decision::Reject, 3)],
                vec![outcome("a", outcome_type, true)],
            )
            .await;
            assert!(engine.data_points().await.unwrap()[0].outcome_success);
        }

        let engine = engine_with(
            vec![ballot("a", Decision::Reject, 3)],
            vec![outcome("a", OutcomeType::FollowupRequired, true)],
        )
        .await;
        assert!(!engine.data_points().await.unwrap()[0].outcome_success);
    }

    #[tokio::test]
    async fn test_neutral_always_excluded() {
        let engine = engine_with(
            vec![ballot("a", Decision::Neutral, 5)],
            vec![outcome("a", OutcomeType::MergedClean, true)],
        )
        .await;
        assert!(engine.data_points().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unconfirmed_outcomes_excluded() {
        let engine = engine_with(
            vec![ballot("a", Decision::Approve, 4)],
            vec![outcome("a", OutcomeType::MergedClean, false)],
        )
        .await;
        assert!(engine.data_points().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_most_recent_confirmed_outcome_wins() {
        let mut early = outcome("a", OutcomeType::MergedClean, true);
        early.timestamp = Utc::now() - Duration::hours(2);
        let mut late = outcome("a", OutcomeType::Reverted, true);
        late.timestamp = Utc::now() - Duration::hours(1);
        // A newer but unconfirmed correction does not participate
        let mut unconfirmed = outcome("a", OutcomeType::MergedClean, false);
        unconfirmed.timestamp = Utc::now();

        let engine = engine_with(
            vec![ballot("a", Decision::Approve, 4)],
            vec![early, late, unconfirmed],
        )
        .await;

        let points = engine.data_points().await.unwrap();
        assert_eq!(points[0].outcome_type, OutcomeType::Reverted);
        assert!(!points[0].outcome_success);
    }

    #[tokio::test]
    async fn test_points_ordered_by_ballot_recency() {
        let mut old = ballot("a", Decision::Approve, 2);
        old.created_at = Utc::now() - Duration::minutes(30);
        let new = ballot("b", Decision::Approve, 4);

        let engine = engine_with(
            vec![old, new],
            vec![
                outcome("a", OutcomeType::MergedClean, true),
                outcome("b", OutcomeType::MergedClean, true),
            ],
        )
        .await;

        let points = engine.data_points().await.unwrap();
        assert_eq!(points[0].item_ref, "b");
        assert_eq!(points[1].item_ref, "a");
    }

    #[tokio::test]
    async fn test_report_brier_and_overconfidence() {
        let engine = engine_with(
            vec![ballot("a", Decision::Approve, 5), ballot("b", Decision::Approve, 5)],
            vec![
                outcome("a", OutcomeType::MergedClean, true),
                outcome("b", OutcomeType::BugFound, true),
            ],
        )
        .await;

        let report = engine.report().await.unwrap();
        assert_eq!(report.points, 2);
        // Point a: (1.0 - 1.0)^2 = 0, point b: (1.0 - 0.0)^2 = 1
        assert!((report.brier_score.unwrap() - 0.5).abs() < f64::EPSILON);
        assert!((report.overconfidence_rate.unwrap() - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_empty_report() {
        let engine = engine_with(vec![], vec![]).await;
        let report = engine.report().await.unwrap();
        assert_eq!(report.points, 0);
        assert_eq!(report.brier_score, None);
        assert_eq!(report.overconfidence_rate, None);
    }

    #[test]
    fn test_low_confidence_wrong_is_not_overconfident() {
        let points = vec![CalibrationDataPoint {
            item_ref: "a".to_string(),
            confidence: 2,
            decision: Decision::Approve,
            outcome_type: OutcomeType::BugFound,
            outcome_success: false,
        }];
        let report = CalibrationReport::from_points(&points);
        assert!((report.overconfidence_rate.unwrap() - 0.0).abs() < f64::EPSILON);
    }
}
