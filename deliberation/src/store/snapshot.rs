//! Snapshot-backed entity store for the review workflow
//!
//! All entities live in one JSON snapshot that is rewritten in full after
//! every mutating call (write latency scales with store size; acceptable
//! at the thousands-of-rows scale this runs at). The store has no native
//! upsert and no multi-statement transactions: conditional writes go
//! through `update` (returning an affected-row count) with an `insert`
//! fallback, wrapped once as the `upsert` primitive.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::schema::{self, ALL_TABLES};
use super::types::{Ballot, DecisionScheme, Outcome, Retrospective, ReviewPhase, ReviewedItem};

/// Snapshot format version, stamped into the metadata slot.
const SCHEMA_VERSION: u32 = 1;

/// Metadata key holding the snapshot format version.
const META_SCHEMA_VERSION: &str = "schemaVersion";

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Row already exists: {table}/{key}")]
    RowExists { table: String, key: String },
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Shared reference to EntityStore
pub type SharedEntityStore = Arc<EntityStore>;

/// On-disk shape: one map per table plus a generic metadata slot.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    tables: BTreeMap<String, BTreeMap<String, Value>>,
    #[serde(default)]
    metadata: BTreeMap<String, Value>,
}

impl Snapshot {
    fn with_tables() -> Self {
        let mut snapshot = Self::default();
        snapshot.ensure_tables();
        snapshot
    }

    fn ensure_tables(&mut self) {
        for table in ALL_TABLES {
            self.tables.entry((*table).to_string()).or_default();
        }
        self.metadata
            .entry(META_SCHEMA_VERSION.to_string())
            .or_insert_with(|| Value::from(SCHEMA_VERSION));
    }

    fn table_mut(&mut self, table: &str) -> StoreResult<&mut BTreeMap<String, Value>> {
        self.tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))
    }

    fn table(&self, table: &str) -> StoreResult<&BTreeMap<String, Value>> {
        self.tables
            .get(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))
    }
}

/// Snapshot-backed persistent entity store
#[derive(Debug)]
pub struct EntityStore {
    path: Option<PathBuf>,
    state: RwLock<Snapshot>,
}

impl EntityStore {
    /// Open or create a store at the given path.
    ///
    /// An existing snapshot that fails to parse is moved aside (renamed
    /// with a timestamp suffix) and an empty store takes its place; the
    /// unreadable bytes stay on disk for manual recovery.
    pub async fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut snapshot = match tokio::fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str::<Snapshot>(&content) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "snapshot unreadable");
                    Self::quarantine(&path).await?;
                    Snapshot::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(e) => return Err(e.into()),
        };

        snapshot.ensure_tables();

        Ok(Self {
            path: Some(path),
            state: RwLock::new(snapshot),
        })
    }

    /// Create a store with no backing file. State lives and dies with the
    /// process; used by unit tests.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: RwLock::new(Snapshot::with_tables()),
        }
    }

    /// Create a shared reference to this store
    pub fn shared(self) -> SharedEntityStore {
        Arc::new(self)
    }

    /// Get the snapshot path, if file-backed
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Move an unreadable snapshot aside so a fresh one can be created.
    async fn quarantine(path: &Path) -> StoreResult<()> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("snapshot");
        let backup = path.with_file_name(format!("{}.corrupt-{}", name, Utc::now().timestamp()));
        tokio::fs::rename(path, &backup).await?;
        warn!(backup = %backup.display(), "corrupt snapshot backed up; starting empty");
        Ok(())
    }

    /// Write the full snapshot to disk: temp file, then atomic rename.
    async fn persist(&self, snapshot: &Snapshot) -> StoreResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let content = serde_json::to_string_pretty(snapshot)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let temp_path = path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, &content).await?;
        tokio::fs::rename(&temp_path, path).await?;
        Ok(())
    }

    // =========================================================================
    // Generic operations
    // =========================================================================

    /// Insert a row. Fails if the key is already present.
    async fn insert<T: Serialize>(&self, table: &str, key: &str, value: &T) -> StoreResult<()> {
        let row = serde_json::to_value(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let mut snapshot = self.state.write().await;
        let rows = snapshot.table_mut(table)?;
        if rows.contains_key(key) {
            return Err(StoreError::RowExists {
                table: table.to_string(),
                key: key.to_string(),
            });
        }
        rows.insert(key.to_string(), row);
        self.persist(&snapshot).await
    }

    /// Overwrite an existing row, returning the affected-row count (0 or 1).
    /// A miss is not an error; callers inspect the count.
    async fn update<T: Serialize>(&self, table: &str, key: &str, value: &T) -> StoreResult<usize> {
        let row = serde_json::to_value(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let mut snapshot = self.state.write().await;
        let rows = snapshot.table_mut(table)?;
        if !rows.contains_key(key) {
            return Ok(0);
        }
        rows.insert(key.to_string(), row);
        self.persist(&snapshot).await?;
        Ok(1)
    }

    /// The manual-upsert primitive: try the update path, check the
    /// affected-row count, fall back to insert. One lock, one snapshot
    /// write, so racing callers cannot observe the gap between the two.
    async fn upsert<T: Serialize>(&self, table: &str, key: &str, value: &T) -> StoreResult<()> {
        let row = serde_json::to_value(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let mut snapshot = self.state.write().await;
        let rows = snapshot.table_mut(table)?;
        let affected = if rows.contains_key(key) {
            rows.insert(key.to_string(), row.clone());
            1
        } else {
            0
        };
        if affected == 0 {
            rows.insert(key.to_string(), row);
        }
        self.persist(&snapshot).await
    }

    /// Get a row from a table
    async fn get<T: DeserializeOwned>(&self, table: &str, key: &str) -> StoreResult<Option<T>> {
        let snapshot = self.state.read().await;
        let rows = snapshot.table(table)?;
        match rows.get(key) {
            Some(row) => serde_json::from_value(row.clone())
                .map(Some)
                .map_err(|e| StoreError::Deserialization(e.to_string())),
            None => Ok(None),
        }
    }

    /// Delete a row, returning whether it existed
    async fn delete(&self, table: &str, key: &str) -> StoreResult<bool> {
        let mut snapshot = self.state.write().await;
        let rows = snapshot.table_mut(table)?;
        let existed = rows.remove(key).is_some();
        if existed {
            self.persist(&snapshot).await?;
        }
        Ok(existed)
    }

    /// List every row in a table. Rows that no longer deserialize are
    /// skipped rather than failing the listing.
    async fn list<T: DeserializeOwned>(&self, table: &str) -> StoreResult<Vec<T>> {
        let snapshot = self.state.read().await;
        let rows = snapshot.table(table)?;
        Ok(rows
            .values()
            .filter_map(|row| serde_json::from_value(row.clone()).ok())
            .collect())
    }

    // =========================================================================
    // Metadata slot
    // =========================================================================

    /// Store a value in the generic metadata slot
    pub async fn set_metadata<T: Serialize>(&self, key: &str, value: &T) -> StoreResult<()> {
        let entry = serde_json::to_value(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let mut snapshot = self.state.write().await;
        snapshot.metadata.insert(key.to_string(), entry);
        self.persist(&snapshot).await
    }

    /// Get a value from the generic metadata slot
    pub async fn get_metadata<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        let snapshot = self.state.read().await;
        match snapshot.metadata.get(key) {
            Some(entry) => serde_json::from_value(entry.clone())
                .map(Some)
                .map_err(|e| StoreError::Deserialization(e.to_string())),
            None => Ok(None),
        }
    }

    /// Clear every table and the metadata slot. The only bulk delete in
    /// the system; individual entities are never hard-deleted.
    pub async fn reset(&self) -> StoreResult<()> {
        let mut snapshot = self.state.write().await;
        for rows in snapshot.tables.values_mut() {
            rows.clear();
        }
        snapshot.metadata.clear();
        snapshot.ensure_tables();
        self.persist(&snapshot).await?;
        debug!("store reset");
        Ok(())
    }

    // =========================================================================
    // Reviewed items
    // =========================================================================

    /// Insert a new reviewed item
    pub async fn insert_item(&self, item: &ReviewedItem) -> StoreResult<()> {
        self.insert(schema::TABLE_ITEMS, &item.reference, item).await
    }

    /// Update an existing reviewed item, returning the affected-row count
    pub async fn update_item(&self, item: &ReviewedItem) -> StoreResult<usize> {
        self.update(schema::TABLE_ITEMS, &item.reference, item).await
    }

    /// Insert-or-replace a reviewed item
    pub async fn upsert_item(&self, item: &ReviewedItem) -> StoreResult<()> {
        self.upsert(schema::TABLE_ITEMS, &item.reference, item).await
    }

    /// Get a reviewed item by reference
    pub async fn get_item(&self, reference: &str) -> StoreResult<Option<ReviewedItem>> {
        self.get(schema::TABLE_ITEMS, reference).await
    }

    /// List all reviewed items, most recently created first
    pub async fn list_items(&self) -> StoreResult<Vec<ReviewedItem>> {
        let mut items: Vec<ReviewedItem> = self.list(schema::TABLE_ITEMS).await?;
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items)
    }

    // =========================================================================
    // Ballots
    // =========================================================================

    /// Insert a new ballot
    pub async fn insert_ballot(&self, ballot: &Ballot) -> StoreResult<()> {
        self.insert(schema::TABLE_BALLOTS, &ballot.id, ballot).await
    }

    /// Get a ballot by id
    pub async fn get_ballot(&self, ballot_id: &str) -> StoreResult<Option<Ballot>> {
        self.get(schema::TABLE_BALLOTS, ballot_id).await
    }

    /// All ballots for a reference, newest first
    pub async fn ballots_for(&self, reference: &str) -> StoreResult<Vec<Ballot>> {
        let mut ballots: Vec<Ballot> = self.list(schema::TABLE_BALLOTS).await?;
        ballots.retain(|b| b.reference == reference);
        ballots.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(ballots)
    }

    /// Count of ballots for a reference
    pub async fn ballot_count(&self, reference: &str) -> StoreResult<usize> {
        Ok(self.ballots_for(reference).await?.len())
    }

    /// All ballots, newest first
    pub async fn list_ballots(&self) -> StoreResult<Vec<Ballot>> {
        let mut ballots: Vec<Ballot> = self.list(schema::TABLE_BALLOTS).await?;
        ballots.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(ballots)
    }

    /// Reveal an item: set `revealed` on every ballot for the reference
    /// and flip the item phase, under one lock and one snapshot write so
    /// no partial state is ever observable. Returns the number of ballots
    /// now revealed, or `None` if the item does not exist.
    ///
    /// The phase only ever moves toward `Revealed` here; calling this on
    /// an already-revealed item is a no-op rewrite of the same state.
    pub async fn reveal_ballots(&self, reference: &str) -> StoreResult<Option<usize>> {
        let mut snapshot = self.state.write().await;

        let items = snapshot.table_mut(schema::TABLE_ITEMS)?;
        let Some(row) = items.get(reference) else {
            return Ok(None);
        };
        let mut item: ReviewedItem = serde_json::from_value(row.clone())
            .map_err(|e| StoreError::Deserialization(e.to_string()))?;
        item.phase = ReviewPhase::Revealed;
        item.touch();
        let row = serde_json::to_value(&item).map_err(|e| StoreError::Serialization(e.to_string()))?;
        items.insert(reference.to_string(), row);

        let ballots = snapshot.table_mut(schema::TABLE_BALLOTS)?;
        let mut revealed = 0usize;
        for row in ballots.values_mut() {
            let Ok(mut ballot) = serde_json::from_value::<Ballot>(row.clone()) else {
                continue;
            };
            if ballot.reference != reference {
                continue;
            }
            ballot.revealed = true;
            *row = serde_json::to_value(&ballot)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            revealed += 1;
        }

        self.persist(&snapshot).await?;
        Ok(Some(revealed))
    }

    // =========================================================================
    // Outcomes
    // =========================================================================

    /// Insert a new outcome
    pub async fn insert_outcome(&self, outcome: &Outcome) -> StoreResult<()> {
        self.insert(schema::TABLE_OUTCOMES, &outcome.id, outcome).await
    }

    /// Update an existing outcome, returning the affected-row count
    pub async fn update_outcome(&self, outcome: &Outcome) -> StoreResult<usize> {
        self.update(schema::TABLE_OUTCOMES, &outcome.id, outcome).await
    }

    /// Get an outcome by id
    pub async fn get_outcome(&self, outcome_id: &str) -> StoreResult<Option<Outcome>> {
        self.get(schema::TABLE_OUTCOMES, outcome_id).await
    }

    /// All outcomes for an item, newest first
    pub async fn outcomes_for(&self, item_ref: &str) -> StoreResult<Vec<Outcome>> {
        let mut outcomes: Vec<Outcome> = self.list(schema::TABLE_OUTCOMES).await?;
        outcomes.retain(|o| o.item_ref == item_ref);
        outcomes.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(outcomes)
    }

    /// All outcomes, newest first
    pub async fn list_outcomes(&self) -> StoreResult<Vec<Outcome>> {
        let mut outcomes: Vec<Outcome> = self.list(schema::TABLE_OUTCOMES).await?;
        outcomes.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(outcomes)
    }

    // =========================================================================
    // Decision schemes
    // =========================================================================

    /// Insert a new decision-scheme record
    pub async fn insert_scheme(&self, scheme: &DecisionScheme) -> StoreResult<()> {
        self.insert(schema::TABLE_SCHEMES, &scheme.id, scheme).await
    }

    /// All scheme records for an item, newest first
    pub async fn schemes_for(&self, item_ref: &str) -> StoreResult<Vec<DecisionScheme>> {
        let mut schemes: Vec<DecisionScheme> = self.list(schema::TABLE_SCHEMES).await?;
        schemes.retain(|s| s.item_ref == item_ref);
        schemes.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(schemes)
    }

    /// All scheme records, newest first
    pub async fn list_schemes(&self) -> StoreResult<Vec<DecisionScheme>> {
        let mut schemes: Vec<DecisionScheme> = self.list(schema::TABLE_SCHEMES).await?;
        schemes.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(schemes)
    }

    // =========================================================================
    // Retrospectives
    // =========================================================================

    /// Insert a new retrospective
    pub async fn insert_retrospective(&self, retro: &Retrospective) -> StoreResult<()> {
        self.insert(schema::TABLE_RETROSPECTIVES, &retro.id, retro).await
    }

    /// All retrospectives, newest first
    pub async fn list_retrospectives(&self) -> StoreResult<Vec<Retrospective>> {
        let mut retros: Vec<Retrospective> = self.list(schema::TABLE_RETROSPECTIVES).await?;
        retros.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(retros)
    }
}
