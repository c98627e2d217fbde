//! Workflow facade: wires the store, the event bus, and the components
//!
//! Callers (panel and command handlers) construct one `ReviewWorkflow`,
//! call `init()` once, and reach every component through it. Components
//! are cheap handles over the shared store; nothing else in the crate
//! keeps durable state.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::info;

use crate::ballots::BallotManager;
use crate::calibration::CalibrationEngine;
use crate::error::{WorkflowError, WorkflowResult};
use crate::events::{EventBus, ReviewEvent, SharedEventBus};
use crate::outcomes::OutcomeTracker;
use crate::phase::PhaseController;
use crate::retrospective::RetrospectiveLog;
use crate::schemes::SchemeRecorder;
use crate::store::{EntityStore, SharedEntityStore};

/// Configuration for the review workflow
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Snapshot file for the entity store.
    pub state_path: PathBuf,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            state_path: PathBuf::from(".deliberation/state.json"),
        }
    }
}

/// Shared reference to ReviewWorkflow
pub type SharedReviewWorkflow = Arc<ReviewWorkflow>;

/// Central entry point for the review workflow
pub struct ReviewWorkflow {
    config: WorkflowConfig,
    events: SharedEventBus,
    store: OnceCell<SharedEntityStore>,
}

impl ReviewWorkflow {
    /// Create a workflow handle. The store opens on `init()`, not here.
    pub fn new(config: WorkflowConfig) -> Self {
        Self {
            config,
            events: EventBus::new().shared(),
            store: OnceCell::new(),
        }
    }

    /// Create a workflow over an already-open store. Used by tests and
    /// embedders that manage the store lifecycle themselves.
    pub fn with_store(store: SharedEntityStore) -> Self {
        Self {
            config: WorkflowConfig::default(),
            events: EventBus::new().shared(),
            store: OnceCell::new_with(Some(store)),
        }
    }

    /// Create a shared reference to this workflow
    pub fn shared(self) -> SharedReviewWorkflow {
        Arc::new(self)
    }

    /// Open (or create) the snapshot store. Idempotent; concurrent calls
    /// share one open.
    pub async fn init(&self) -> WorkflowResult<()> {
        let path = self.config.state_path.clone();
        self.store
            .get_or_try_init(|| async move {
                let store = EntityStore::open(&path).await?;
                info!(path = %path.display(), "review workflow store opened");
                Ok::<_, WorkflowError>(store.shared())
            })
            .await?;
        Ok(())
    }

    fn store(&self) -> WorkflowResult<SharedEntityStore> {
        self.store
            .get()
            .cloned()
            .ok_or(WorkflowError::NotInitialized)
    }

    /// Subscribe to workflow events
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ReviewEvent> {
        self.events.subscribe()
    }

    /// The ballot manager
    pub fn ballots(&self) -> WorkflowResult<BallotManager> {
        Ok(BallotManager::new(self.store()?, self.events.clone()))
    }

    /// The phase controller
    pub fn phase(&self) -> WorkflowResult<PhaseController> {
        Ok(PhaseController::new(self.store()?, self.events.clone()))
    }

    /// The outcome tracker
    pub fn outcomes(&self) -> WorkflowResult<OutcomeTracker> {
        Ok(OutcomeTracker::new(self.store()?, self.events.clone()))
    }

    /// The calibration engine
    pub fn calibration(&self) -> WorkflowResult<CalibrationEngine> {
        Ok(CalibrationEngine::new(self.store()?))
    }

    /// The decision-scheme recorder
    pub fn schemes(&self) -> WorkflowResult<SchemeRecorder> {
        Ok(SchemeRecorder::new(self.store()?))
    }

    /// The retrospective log
    pub fn retrospectives(&self) -> WorkflowResult<RetrospectiveLog> {
        Ok(RetrospectiveLog::new(self.store()?, self.events.clone()))
    }

    /// Clear every table. The only bulk delete in the system.
    pub async fn reset(&self) -> WorkflowResult<()> {
        self.store()?.reset().await?;
        info!("review workflow state reset");
        Ok(())
    }
}
