//! Local store seam.
//!
//! The engine reads and writes the on-device store only through
//! [`LocalStore`]. Applications own the store; their write paths must reset
//! an entity to `PendingUpload` whenever it changes after a sync, which
//! [`MemoryStore`] does in [`MemoryStore::edit`] and
//! [`MemoryStore::soft_delete`].

use crate::entity::{now_millis, LocalId, Record, SyncMetadata, SyncStatus, Syncable};
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use mealsync_protocol::{EntityKind, PullResponse};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

/// CRUD access to syncable rows plus the pull checkpoint.
///
/// Every write replaces a whole row, so an entity is never observed half
/// updated.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Lists every row of a kind, tombstones included.
    async fn list(&self, kind: EntityKind) -> SyncResult<Vec<Record>>;

    /// Lists rows of a kind with the given status.
    async fn list_by_status(&self, kind: EntityKind, status: SyncStatus) -> SyncResult<Vec<Record>>;

    /// Gets a row by local id.
    async fn get(&self, kind: EntityKind, id: LocalId) -> SyncResult<Option<Record>>;

    /// Finds a row by cloud id.
    async fn find_by_cloud_id(&self, kind: EntityKind, cloud_id: &str)
        -> SyncResult<Option<Record>>;

    /// Inserts a new row and returns its local id.
    async fn insert(&self, record: Record) -> SyncResult<LocalId>;

    /// Replaces an existing row.
    async fn update(&self, record: Record) -> SyncResult<()>;

    /// Physically removes a row.
    async fn purge(&self, kind: EntityKind, id: LocalId) -> SyncResult<()>;

    /// Reads the pull checkpoint (`None` before the first pull).
    async fn checkpoint(&self) -> SyncResult<Option<i64>>;

    /// Persists the pull checkpoint.
    async fn set_checkpoint(&self, checkpoint: Option<i64>) -> SyncResult<()>;

    /// Pulled payloads that could not be applied yet. They are retried on
    /// every pull until they apply or a newer copy replaces them.
    async fn deferred_changes(&self) -> SyncResult<PullResponse>;

    /// Replaces the deferred payloads. Persisted with the checkpoint.
    async fn set_deferred_changes(&self, changes: PullResponse) -> SyncResult<()>;
}

#[derive(Debug, Default)]
struct Tables {
    rows: BTreeMap<(EntityKind, LocalId), Record>,
    next_ids: HashMap<EntityKind, LocalId>,
    checkpoint: Option<i64>,
    deferred: PullResponse,
}

impl Tables {
    fn allocate_id(&mut self, kind: EntityKind) -> LocalId {
        let next = self.next_ids.entry(kind).or_insert(1);
        let id = *next;
        *next += 1;
        id
    }

    fn of_kind(&self, kind: EntityKind) -> impl Iterator<Item = &Record> {
        self.rows
            .range((kind, LocalId::MIN)..=(kind, LocalId::MAX))
            .map(|(_, record)| record)
    }
}

/// An in-memory local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every engine-facing write fail, for error-path tests.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> SyncResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(SyncError::Store("write rejected".into()))
        } else {
            Ok(())
        }
    }

    /// Application insert path: a new entity waiting for its first push.
    pub fn create<E: Syncable>(&self, entity: E) -> E {
        self.create_with(entity, SyncMetadata::new_local())
    }

    /// Application insert path for data that must never be pushed.
    pub fn create_local_only<E: Syncable>(&self, entity: E) -> E {
        self.create_with(entity, SyncMetadata::local_only())
    }

    fn create_with<E: Syncable>(&self, mut entity: E, meta: SyncMetadata) -> E {
        let now = now_millis();
        let mut tables = self.tables.write();
        let id = tables.allocate_id(E::KIND);
        entity.set_local_id(id);
        *entity.metadata_mut() = meta;
        entity.stamp(Some(now), now);
        tables.rows.insert((E::KIND, id), entity.clone().into_record());
        entity
    }

    /// Inserts an entity as-is, keeping its metadata and timestamps.
    ///
    /// A local id of 0 is replaced with a fresh one.
    pub fn seed<E: Syncable>(&self, mut entity: E) -> LocalId {
        let mut tables = self.tables.write();
        let id = if entity.local_id() == 0 {
            tables.allocate_id(E::KIND)
        } else {
            let next = tables.next_ids.entry(E::KIND).or_insert(1);
            *next = (*next).max(entity.local_id() + 1);
            entity.local_id()
        };
        entity.set_local_id(id);
        tables.rows.insert((E::KIND, id), entity.into_record());
        id
    }

    /// Application update path.
    ///
    /// Applies `change` and marks the entity `PendingUpload` (unless it is
    /// local-only). The update time always moves forward so the engine can
    /// tell that a row changed while a push was in flight.
    pub fn edit<E: Syncable>(&self, id: LocalId, change: impl FnOnce(&mut E)) -> SyncResult<E> {
        let mut tables = self.tables.write();
        let record = tables
            .rows
            .get_mut(&(E::KIND, id))
            .ok_or_else(|| SyncError::NotFound {
                kind: E::KIND,
                id: id.to_string(),
            })?;

        let mut entity = E::from_record(record.clone()).ok_or_else(|| SyncError::NotFound {
            kind: E::KIND,
            id: id.to_string(),
        })?;
        let meta_before = entity.metadata().clone();
        let updated_before = entity.updated_at();

        change(&mut entity);

        // Sync bookkeeping belongs to the engine.
        *entity.metadata_mut() = meta_before;
        entity.set_local_id(id);
        entity.metadata_mut().mark_modified();
        entity.stamp(None, now_millis().max(updated_before + 1));

        *record = entity.clone().into_record();
        Ok(entity)
    }

    /// Application delete path: leaves a tombstone for the next push.
    ///
    /// Local-only rows are never pushed, so they are removed at once.
    pub fn soft_delete(&self, kind: EntityKind, id: LocalId) -> SyncResult<()> {
        let mut tables = self.tables.write();
        let record = tables
            .rows
            .get_mut(&(kind, id))
            .ok_or_else(|| SyncError::NotFound {
                kind,
                id: id.to_string(),
            })?;
        if record.metadata().sync_status == SyncStatus::LocalOnly {
            tables.rows.remove(&(kind, id));
            return Ok(());
        }
        let updated_before = record.updated_at();
        record.metadata_mut().mark_deleted();
        record.stamp(None, now_millis().max(updated_before + 1));
        Ok(())
    }

    /// Reads an entity by local id.
    pub fn fetch<E: Syncable>(&self, id: LocalId) -> Option<E> {
        let tables = self.tables.read();
        tables
            .rows
            .get(&(E::KIND, id))
            .cloned()
            .and_then(E::from_record)
    }

    /// Reads every entity of a kind.
    pub fn all<E: Syncable>(&self) -> Vec<E> {
        let tables = self.tables.read();
        tables
            .of_kind(E::KIND)
            .cloned()
            .filter_map(E::from_record)
            .collect()
    }

    /// Number of rows of a kind, tombstones included.
    pub fn count(&self, kind: EntityKind) -> usize {
        self.tables.read().of_kind(kind).count()
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn list(&self, kind: EntityKind) -> SyncResult<Vec<Record>> {
        Ok(self.tables.read().of_kind(kind).cloned().collect())
    }

    async fn list_by_status(&self, kind: EntityKind, status: SyncStatus) -> SyncResult<Vec<Record>> {
        Ok(self
            .tables
            .read()
            .of_kind(kind)
            .filter(|record| record.metadata().sync_status == status)
            .cloned()
            .collect())
    }

    async fn get(&self, kind: EntityKind, id: LocalId) -> SyncResult<Option<Record>> {
        Ok(self.tables.read().rows.get(&(kind, id)).cloned())
    }

    async fn find_by_cloud_id(
        &self,
        kind: EntityKind,
        cloud_id: &str,
    ) -> SyncResult<Option<Record>> {
        Ok(self
            .tables
            .read()
            .of_kind(kind)
            .find(|record| record.cloud_id() == Some(cloud_id))
            .cloned())
    }

    async fn insert(&self, mut record: Record) -> SyncResult<LocalId> {
        self.check_writable()?;
        let mut tables = self.tables.write();
        let id = tables.allocate_id(record.kind());
        record.set_local_id(id);
        tables.rows.insert((record.kind(), id), record);
        Ok(id)
    }

    async fn update(&self, record: Record) -> SyncResult<()> {
        self.check_writable()?;
        let mut tables = self.tables.write();
        let key = (record.kind(), record.local_id());
        let existing = tables.rows.get_mut(&key).ok_or_else(|| SyncError::NotFound {
            kind: key.0,
            id: key.1.to_string(),
        })?;

        if record.metadata().version < existing.metadata().version {
            return Err(SyncError::Store(format!(
                "version regression on {} {}: {} -> {}",
                key.0,
                key.1,
                existing.metadata().version,
                record.metadata().version
            )));
        }

        *existing = record;
        Ok(())
    }

    async fn purge(&self, kind: EntityKind, id: LocalId) -> SyncResult<()> {
        self.check_writable()?;
        self.tables.write().rows.remove(&(kind, id));
        Ok(())
    }

    async fn checkpoint(&self) -> SyncResult<Option<i64>> {
        Ok(self.tables.read().checkpoint)
    }

    async fn set_checkpoint(&self, checkpoint: Option<i64>) -> SyncResult<()> {
        self.check_writable()?;
        self.tables.write().checkpoint = checkpoint;
        Ok(())
    }

    async fn deferred_changes(&self) -> SyncResult<PullResponse> {
        Ok(self.tables.read().deferred.clone())
    }

    async fn set_deferred_changes(&self, changes: PullResponse) -> SyncResult<()> {
        self.check_writable()?;
        self.tables.write().deferred = changes;
        Ok(())
    }
}
