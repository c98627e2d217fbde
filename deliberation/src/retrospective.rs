//! Retrospectives and reflection analytics
//!
//! Post-mortems capture what went wrong and which bias patterns may have
//! contributed; the analytics pass aggregates scheme usage and bias
//! frequency across the whole history for team-level learning.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{WorkflowError, WorkflowResult};
use crate::events::{ReviewEvent, SharedEventBus};
use crate::store::{BiasPattern, Retrospective, SchemeType, SharedEntityStore, TriggerType};

/// Filters for retrospective queries. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct RetroFilter {
    pub item_ref: Option<String>,
    pub trigger_type: Option<TriggerType>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl RetroFilter {
    fn matches(&self, retro: &Retrospective) -> bool {
        if let Some(item_ref) = &self.item_ref {
            if &retro.item_ref != item_ref {
                return false;
            }
        }
        if let Some(trigger_type) = self.trigger_type {
            if retro.trigger_type != trigger_type {
                return false;
            }
        }
        if let Some(since) = self.since {
            if retro.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if retro.timestamp > until {
                return false;
            }
        }
        true
    }
}

/// Team-level aggregates across the full history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReflectionAnalytics {
    /// Decision-scheme rows grouped by scheme type.
    pub scheme_distribution: HashMap<SchemeType, usize>,
    pub total_retrospectives: usize,
    /// Tag occurrences flattened across every retrospective. Tags that no
    /// longer parse are skipped, never fatal.
    pub bias_frequency: HashMap<BiasPattern, usize>,
}

/// Records and aggregates retrospectives
pub struct RetrospectiveLog {
    store: SharedEntityStore,
    events: SharedEventBus,
}

impl RetrospectiveLog {
    /// Create a new retrospective log
    pub fn new(store: SharedEntityStore, events: SharedEventBus) -> Self {
        Self { store, events }
    }

    /// Record a retrospective. Both free-text fields are required.
    pub async fn record(
        &self,
        item_ref: &str,
        trigger_type: TriggerType,
        what_went_wrong: &str,
        what_to_improve: &str,
        bias_patterns: &[BiasPattern],
    ) -> WorkflowResult<Retrospective> {
        if item_ref.trim().is_empty() {
            return Err(WorkflowError::validation("item reference is required"));
        }
        if what_went_wrong.trim().is_empty() {
            return Err(WorkflowError::validation("what went wrong is required"));
        }
        if what_to_improve.trim().is_empty() {
            return Err(WorkflowError::validation("what to improve is required"));
        }

        let retro = Retrospective::new(
            item_ref,
            trigger_type,
            what_went_wrong.trim(),
            what_to_improve.trim(),
            bias_patterns,
        );
        self.store.insert_retrospective(&retro).await?;

        self.events.publish(ReviewEvent::RetrospectiveRecorded {
            item_ref: item_ref.to_string(),
            trigger_type,
            timestamp: retro.timestamp,
        });
        info!(item_ref, %trigger_type, "retrospective recorded");

        Ok(retro)
    }

    /// Retrospectives matching the filter, newest first
    pub async fn query(&self, filter: &RetroFilter) -> WorkflowResult<Vec<Retrospective>> {
        let mut retros = self.store.list_retrospectives().await?;
        retros.retain(|r| filter.matches(r));
        Ok(retros)
    }

    /// Aggregate scheme usage and bias-pattern frequency across history
    pub async fn analytics(&self) -> WorkflowResult<ReflectionAnalytics> {
        let mut scheme_distribution: HashMap<SchemeType, usize> = HashMap::new();
        for scheme in self.store.list_schemes().await? {
            *scheme_distribution.entry(scheme.scheme_type).or_insert(0) += 1;
        }

        let retros = self.store.list_retrospectives().await?;
        let mut bias_frequency: HashMap<BiasPattern, usize> = HashMap::new();
        for retro in &retros {
            for tag in &retro.bias_patterns {
                // Unknown tags (older builds, hand-edited snapshots) are
                // skipped rather than failing the aggregation.
                let Some(pattern) = BiasPattern::parse_tag(tag) else {
                    debug!(tag, "skipping unknown bias tag");
                    continue;
                };
                *bias_frequency.entry(pattern).or_insert(0) += 1;
            }
        }

        Ok(ReflectionAnalytics {
            scheme_distribution,
            total_retrospectives: retros.len(),
            bias_frequency,
        })
    }
}
