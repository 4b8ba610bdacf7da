//! Local ↔ cloud identity mapping.
//!
//! The local store numbers rows with auto-increment integers while the
//! remote names them with cloud id strings. Plans refer to recipes and
//! profiles, so both directions are needed: cloud → local when a pulled plan
//! is materialized, local → cloud when a local plan is pushed.

use crate::entity::{LocalId, SyncStatus};
use crate::error::SyncResult;
use crate::store::LocalStore;
use mealsync_protocol::EntityKind;
use std::collections::HashMap;

/// Bidirectional `(kind, cloud_id) ↔ local_id` index.
#[derive(Debug, Clone, Default)]
pub struct IdMap {
    by_cloud: HashMap<(EntityKind, String), LocalId>,
    by_local: HashMap<(EntityKind, LocalId), String>,
}

impl IdMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the map from every row in the store that has a cloud id.
    pub async fn load<S: LocalStore + ?Sized>(store: &S) -> SyncResult<Self> {
        let mut map = Self::new();
        for kind in EntityKind::PULL_ORDER {
            for record in store.list(kind).await? {
                if record.metadata().sync_status == SyncStatus::LocalOnly {
                    continue;
                }
                if let Some(cloud_id) = record.cloud_id() {
                    map.insert(kind, cloud_id, record.local_id());
                }
            }
        }
        Ok(map)
    }

    /// Records a mapping, replacing any previous one for either side.
    pub fn insert(&mut self, kind: EntityKind, cloud_id: impl Into<String>, local_id: LocalId) {
        let cloud_id = cloud_id.into();
        if let Some(previous) = self.by_local.insert((kind, local_id), cloud_id.clone()) {
            self.by_cloud.remove(&(kind, previous));
        }
        self.by_cloud.insert((kind, cloud_id), local_id);
    }

    /// Local id for a cloud id.
    pub fn local_id(&self, kind: EntityKind, cloud_id: &str) -> Option<LocalId> {
        self.by_cloud.get(&(kind, cloud_id.to_string())).copied()
    }

    /// Cloud id for a local id.
    pub fn cloud_id(&self, kind: EntityKind, local_id: LocalId) -> Option<&str> {
        self.by_local.get(&(kind, local_id)).map(String::as_str)
    }

    /// Drops the mapping for a purged row.
    pub fn remove(&mut self, kind: EntityKind, local_id: LocalId) {
        if let Some(cloud_id) = self.by_local.remove(&(kind, local_id)) {
            self.by_cloud.remove(&(kind, cloud_id));
        }
    }

    /// Number of mapped entities.
    pub fn len(&self) -> usize {
        self.by_local.len()
    }

    /// Returns true if nothing is mapped.
    pub fn is_empty(&self) -> bool {
        self.by_local.is_empty()
    }
}
