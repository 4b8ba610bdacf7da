//! Versioned document storage with a monotonic server clock.
//!
//! Every accepted write is stamped with the clock. A pull returns the
//! documents stamped after the caller's checkpoint, in stamp order.

use chrono::Utc;
use mealsync_protocol::{
    CloudBaby, CloudPlan, CloudRecipe, ConflictInfo, EntityKind, PullResponse, PushRequest,
};
use parking_lot::RwLock;
use std::collections::HashMap;

/// A cloud payload the store can version.
trait Document: Clone {
    const KIND: EntityKind;

    fn cloud_id(&self) -> &str;
    fn version(&self) -> u32;
    fn set_version(&mut self, version: u32);
}

macro_rules! impl_document {
    ($ty:ty, $kind:expr) => {
        impl Document for $ty {
            const KIND: EntityKind = $kind;

            fn cloud_id(&self) -> &str {
                &self.cloud_id
            }

            fn version(&self) -> u32 {
                self.version
            }

            fn set_version(&mut self, version: u32) {
                self.version = version;
            }
        }
    };
}

impl_document!(CloudRecipe, EntityKind::Recipe);
impl_document!(CloudPlan, EntityKind::Plan);
impl_document!(CloudBaby, EntityKind::Baby);

#[derive(Debug, Clone)]
struct Stored<D> {
    doc: D,
    stamp: i64,
}

#[derive(Debug)]
struct Collection<D> {
    docs: HashMap<String, Stored<D>>,
}

impl<D: Document> Collection<D> {
    fn new() -> Self {
        Self {
            docs: HashMap::new(),
        }
    }

    fn version_of(&self, cloud_id: &str) -> Option<u32> {
        self.docs.get(cloud_id).map(|s| s.doc.version())
    }

    fn get(&self, cloud_id: &str) -> Option<D> {
        self.docs.get(cloud_id).map(|s| s.doc.clone())
    }

    fn since(&self, since: Option<i64>) -> impl Iterator<Item = &Stored<D>> {
        self.docs
            .values()
            .filter(move |s| since.map_or(true, |t| s.stamp > t))
    }

    /// Accepts a write if the document is new or the caller holds the
    /// current version. Returns the conflict otherwise.
    fn write(&mut self, mut doc: D, stamp: i64) -> Result<(), ConflictInfo> {
        let incoming = doc.version();
        if let Some(stored) = self.version_of(doc.cloud_id()) {
            if stored != incoming {
                return Err(ConflictInfo::new(
                    D::KIND,
                    doc.cloud_id(),
                    incoming,
                    stored,
                    format!("version mismatch: sent {incoming}, stored {stored}"),
                ));
            }
        }
        doc.set_version(incoming.saturating_add(1));
        self.docs
            .insert(doc.cloud_id().to_string(), Stored { doc, stamp });
        Ok(())
    }
}

/// A document selected by a pull.
enum Change {
    Recipe(CloudRecipe),
    Plan(CloudPlan),
    Baby(CloudBaby),
}

struct Inner {
    recipes: Collection<CloudRecipe>,
    plans: Collection<CloudPlan>,
    babies: Collection<CloudBaby>,
    clock: i64,
}

impl Inner {
    fn tick(&mut self) -> i64 {
        let now = Utc::now().timestamp_millis();
        self.clock = now.max(self.clock + 1);
        self.clock
    }
}

/// Outcome of applying a push batch.
#[derive(Debug, Clone, Default)]
pub struct WriteSummary {
    /// Number of documents written.
    pub accepted: usize,
    /// Documents rejected because of a version mismatch.
    pub conflicts: Vec<ConflictInfo>,
    /// Clock value after the batch.
    pub server_time: i64,
}

/// In-memory document store shared by the request handlers.
pub struct DocumentStore {
    inner: RwLock<Inner>,
}

impl DocumentStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                recipes: Collection::new(),
                plans: Collection::new(),
                babies: Collection::new(),
                clock: 0,
            }),
        }
    }

    /// Advances the clock and returns the new value.
    pub fn server_time(&self) -> i64 {
        self.inner.write().tick()
    }

    /// Applies every document of a push batch.
    ///
    /// Each document is checked on its own: a conflict on one does not
    /// prevent the others from being written.
    pub fn apply(&self, request: PushRequest) -> WriteSummary {
        let mut inner = self.inner.write();
        let mut summary = WriteSummary::default();

        for doc in request.recipes {
            let stamp = inner.tick();
            record(&mut summary, inner.recipes.write(doc, stamp));
        }
        for doc in request.babies {
            let stamp = inner.tick();
            record(&mut summary, inner.babies.write(doc, stamp));
        }
        for doc in request.plans {
            let stamp = inner.tick();
            record(&mut summary, inner.plans.write(doc, stamp));
        }

        summary.server_time = inner.tick();
        summary
    }

    /// Documents stamped after `since`, oldest first, at most `limit`.
    ///
    /// When the result is truncated `server_time` is the stamp of the last
    /// returned document, so a pull from that checkpoint picks up the rest.
    pub fn changes_since(&self, since: Option<i64>, limit: usize) -> PullResponse {
        let mut inner = self.inner.write();

        let mut changes: Vec<(i64, Change)> = Vec::new();
        changes.extend(
            inner
                .recipes
                .since(since)
                .map(|s| (s.stamp, Change::Recipe(s.doc.clone()))),
        );
        changes.extend(
            inner
                .babies
                .since(since)
                .map(|s| (s.stamp, Change::Baby(s.doc.clone()))),
        );
        changes.extend(
            inner
                .plans
                .since(since)
                .map(|s| (s.stamp, Change::Plan(s.doc.clone()))),
        );
        changes.sort_by_key(|(stamp, _)| *stamp);

        let truncated = changes.len() > limit;
        changes.truncate(limit);

        let server_time = match (truncated, changes.last()) {
            (true, Some((stamp, _))) => *stamp,
            _ => inner.tick(),
        };

        let mut response = PullResponse::empty(server_time);
        for (_, change) in changes {
            match change {
                Change::Recipe(doc) => response.recipes.push(doc),
                Change::Plan(doc) => response.plans.push(doc),
                Change::Baby(doc) => response.babies.push(doc),
            }
        }
        response
    }

    /// Stored version of a document.
    pub fn version_of(&self, kind: EntityKind, cloud_id: &str) -> Option<u32> {
        let inner = self.inner.read();
        match kind {
            EntityKind::Recipe => inner.recipes.version_of(cloud_id),
            EntityKind::Plan => inner.plans.version_of(cloud_id),
            EntityKind::Baby => inner.babies.version_of(cloud_id),
        }
    }

    /// Stored recipe.
    pub fn recipe(&self, cloud_id: &str) -> Option<CloudRecipe> {
        self.inner.read().recipes.get(cloud_id)
    }

    /// Stored plan.
    pub fn plan(&self, cloud_id: &str) -> Option<CloudPlan> {
        self.inner.read().plans.get(cloud_id)
    }

    /// Stored profile.
    pub fn baby(&self, cloud_id: &str) -> Option<CloudBaby> {
        self.inner.read().babies.get(cloud_id)
    }

    /// Number of stored documents of one kind, tombstones included.
    pub fn count(&self, kind: EntityKind) -> usize {
        let inner = self.inner.read();
        match kind {
            EntityKind::Recipe => inner.recipes.docs.len(),
            EntityKind::Plan => inner.plans.docs.len(),
            EntityKind::Baby => inner.babies.docs.len(),
        }
    }

    /// Total number of stored documents.
    pub fn len(&self) -> usize {
        EntityKind::PULL_ORDER.iter().map(|k| self.count(*k)).sum()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

fn record(summary: &mut WriteSummary, result: Result<(), ConflictInfo>) {
    match result {
        Ok(()) => summary.accepted += 1,
        Err(conflict) => summary.conflicts.push(conflict),
    }
}
