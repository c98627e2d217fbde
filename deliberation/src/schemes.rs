//! Decision-scheme recorder: which aggregation rule was used, and why
//!
//! A scheme record is bookkeeping for retrospectives, not enforcement:
//! the core never applies the rule, it remembers the choice.

use tracing::debug;

use crate::error::{WorkflowError, WorkflowResult};
use crate::store::{DecisionScheme, SchemeType, SharedEntityStore};

/// Records aggregation-scheme choices per reviewed item
pub struct SchemeRecorder {
    store: SharedEntityStore,
}

impl SchemeRecorder {
    /// Create a new scheme recorder
    pub fn new(store: SharedEntityStore) -> Self {
        Self { store }
    }

    /// Record the scheme chosen for an item. Rationale is required;
    /// `custom_name` is required when (and only meaningful when) the
    /// scheme type is custom, though it is stored verbatim for any type.
    pub async fn record(
        &self,
        item_ref: &str,
        scheme_type: SchemeType,
        rationale: &str,
        custom_name: Option<String>,
    ) -> WorkflowResult<DecisionScheme> {
        if item_ref.trim().is_empty() {
            return Err(WorkflowError::validation("item reference is required"));
        }
        if rationale.trim().is_empty() {
            return Err(WorkflowError::validation("scheme rationale is required"));
        }
        if scheme_type == SchemeType::Custom
            && custom_name.as_deref().map_or(true, |name| name.trim().is_empty())
        {
            return Err(WorkflowError::validation(
                "custom scheme requires a custom name",
            ));
        }

        let scheme = DecisionScheme::new(item_ref, scheme_type, rationale.trim(), custom_name);
        self.store.insert_scheme(&scheme).await?;
        debug!(item_ref, %scheme_type, "decision scheme recorded");
        Ok(scheme)
    }

    /// Most recent scheme record for an item, if any
    pub async fn latest(&self, item_ref: &str) -> WorkflowResult<Option<DecisionScheme>> {
        Ok(self.store.schemes_for(item_ref).await?.into_iter().next())
    }

    /// All scheme records for an item, newest first
    pub async fn history(&self, item_ref: &str) -> WorkflowResult<Vec<DecisionScheme>> {
        Ok(self.store.schemes_for(item_ref).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EntityStore;
    use chrono::{Duration, Utc};

    fn recorder() -> SchemeRecorder {
        SchemeRecorder::new(EntityStore::in_memory().shared())
    }

    #[tokio::test]
    async fn test_record_and_latest() {
        let recorder = recorder();
        recorder
            .record("repo#1", SchemeType::Majority, "three of five approved", None)
            .await
            .unwrap();

        let latest = recorder.latest("repo#1").await.unwrap().unwrap();
        assert_eq!(latest.scheme_type, SchemeType::Majority);
        assert_eq!(latest.rationale, "three of five approved");
    }

    #[tokio::test]
    async fn test_latest_prefers_newest() {
        let recorder = recorder();
        let mut early = DecisionScheme::new("repo#1", SchemeType::Consensus, "initial pick", None);
        early.timestamp = Utc::now() - Duration::hours(1);
        recorder.store.insert_scheme(&early).await.unwrap();

        recorder
            .record("repo#1", SchemeType::ExpertVeto, "security lead vetoed", None)
            .await
            .unwrap();

        let latest = recorder.latest("repo#1").await.unwrap().unwrap();
        assert_eq!(latest.scheme_type, SchemeType::ExpertVeto);
        assert_eq!(recorder.history("repo#1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_latest_absent() {
        let recorder = recorder();
        assert!(recorder.latest("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rationale_required() {
        let recorder = recorder();
        let err = recorder
            .record("repo#1", SchemeType::Unanimous, "  ", None)
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_custom_requires_name() {
        let recorder = recorder();
        let err = recorder
            .record("repo#1", SchemeType::Custom, "house rule", None)
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let err = recorder
            .record("repo#1", SchemeType::Custom, "house rule", Some("  ".to_string()))
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let scheme = recorder
            .record(
                "repo#1",
                SchemeType::Custom,
                "house rule",
                Some("weighted-by-tenure".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(scheme.custom_name.as_deref(), Some("weighted-by-tenure"));
    }

    #[tokio::test]
    async fn test_custom_name_allowed_on_other_types() {
        let recorder = recorder();
        let scheme = recorder
            .record(
                "repo#1",
                SchemeType::Majority,
                "simple majority",
                Some("informal label".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(scheme.custom_name.as_deref(), Some("informal label"));
    }
}
