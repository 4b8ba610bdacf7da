//! The sync orchestrator.
//!
//! One cycle is pull, then push, then conflict resolution. Progress is
//! published on a per-engine watch channel; the result of a cycle is
//! returned as a [`SyncOutcome`] value and never as a panic.
//!
//! Each row is written atomically, but a cycle is not a transaction: a
//! cycle cancelled during push may have acknowledged part of the batch.
//! The remaining rows stay `PendingUpload` and go out with the next cycle.

use crate::config::SyncConfig;
use crate::entity::{now_millis, LocalId, Record, SyncStatus, Syncable};
use crate::error::{SyncError, SyncResult};
use crate::id_map::IdMap;
use crate::mapper::{
    assign_cloud_id, baby_from_cloud, baby_to_cloud, plan_to_cloud, recipe_to_cloud,
    BabyPrivateFields, CloudPayload, MappingError,
};
use crate::resolver::ConflictResolver;
use crate::state::{
    EntityError, SyncOutcome, SyncReport, SyncState, SyncStats, PROGRESS_PULL, PROGRESS_PUSH,
    PROGRESS_RESOLVE, PROGRESS_START,
};
use crate::store::LocalStore;
use crate::strategy::{self, Capability, ExecutionMode, StrategyError, StrategyResult, StrategySelector};
use crate::transport::RemoteClient;
use mealsync_protocol::{
    CloudBaby, CloudPlan, ConflictInfo, ConflictResolution, EntityKind, PullResponse, PushRequest,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What applying one pulled entity did.
enum PullApplied {
    Inserted,
    Updated,
    Unchanged,
    Purged,
    Skipped,
    Unmaterialized,
    Failed(MappingError),
}

/// The sync engine keeps the local store and the remote in step.
pub struct SyncEngine<R: RemoteClient, S: LocalStore> {
    config: SyncConfig,
    remote: Arc<R>,
    store: Arc<S>,
    resolver: ConflictResolver,
    selector: Arc<StrategySelector>,
    state: watch::Sender<SyncState>,
    stats: RwLock<SyncStats>,
    in_flight: tokio::sync::Mutex<()>,
    cancel_token: Mutex<CancellationToken>,
}

impl<R: RemoteClient, S: LocalStore> SyncEngine<R, S> {
    /// Creates a new sync engine.
    pub fn new(config: SyncConfig, remote: Arc<R>, store: Arc<S>) -> Self {
        let (state, _) = watch::channel(SyncState::Idle);
        Self {
            resolver: ConflictResolver::new(config.conflict_policy),
            config,
            remote,
            store,
            selector: Arc::new(StrategySelector::new()),
            state,
            stats: RwLock::new(SyncStats::default()),
            in_flight: tokio::sync::Mutex::new(()),
            cancel_token: Mutex::new(CancellationToken::new()),
        }
    }

    /// Shares a strategy selector with other components.
    pub fn with_selector(mut self, selector: Arc<StrategySelector>) -> Self {
        self.selector = selector;
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the strategy selector.
    pub fn selector(&self) -> &Arc<StrategySelector> {
        &self.selector
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        self.state.borrow().clone()
    }

    /// Subscribes to state changes.
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns a terminal state (`Success` or `Error`) to `Idle`.
    pub fn reset(&self) {
        self.state.send_if_modified(|state| {
            if state.is_terminal() {
                *state = SyncState::Idle;
                true
            } else {
                false
            }
        });
    }

    /// Cancels the in-flight cycle at its next await point.
    pub fn cancel(&self) {
        self.cancel_token.lock().cancel();
    }

    fn publish(&self, state: SyncState) {
        debug!(?state, "sync state");
        self.state.send_replace(state);
    }

    async fn with_timeout<T>(&self, call: impl Future<Output = SyncResult<T>>) -> SyncResult<T> {
        tokio::time::timeout(self.config.request_timeout, call)
            .await
            .map_err(|_| SyncError::Timeout)?
    }

    /// Runs one sync cycle.
    ///
    /// A call made while another cycle is running returns
    /// `SyncError::AlreadySyncing` at once and publishes nothing.
    pub async fn sync(&self) -> SyncOutcome {
        let Ok(_guard) = self.in_flight.try_lock() else {
            warn!("sync requested while a cycle is running");
            return SyncOutcome::error(SyncError::AlreadySyncing);
        };

        let token = CancellationToken::new();
        *self.cancel_token.lock() = token.clone();

        let start = Instant::now();
        info!(server = %self.config.server_url, "sync cycle started");
        self.publish(SyncState::Syncing {
            progress: PROGRESS_START,
        });

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => Err(SyncError::Cancelled),
            result = self.run_cycle() => result,
        };

        match result {
            Ok(mut report) => {
                report.duration = start.elapsed();
                let message = report.summary();
                info!(
                    pulled = report.pulled_total(),
                    pushed = report.pushed,
                    conflicts = report.conflicts.len(),
                    errors = report.entity_errors.len(),
                    duration_ms = report.duration.as_millis() as u64,
                    "sync cycle finished"
                );
                {
                    let mut stats = self.stats.write();
                    stats.cycles_completed += 1;
                    stats.entities_pulled += report.pulled_total() as u64;
                    stats.entities_pushed += report.pushed as u64;
                    stats.conflicts_encountered += report.conflicts.len() as u64;
                    stats.last_sync_time = Some(now_millis());
                    stats.last_error = None;
                }
                self.publish(SyncState::Success {
                    message: message.clone(),
                });
                SyncOutcome::Success { message, report }
            }
            Err(SyncError::Cancelled) => {
                info!("sync cycle cancelled");
                self.publish(SyncState::Idle);
                SyncOutcome::Cancelled
            }
            Err(cause) => {
                warn!(error = %cause, retryable = cause.is_retryable(), "sync cycle failed");
                let message = cause.to_string();
                self.stats.write().last_error = Some(message.clone());
                self.publish(SyncState::Error {
                    message: message.clone(),
                    cause: cause.clone(),
                });
                SyncOutcome::Error { message, cause }
            }
        }
    }

    /// Runs sync cycles until one succeeds, a failure is not retryable or
    /// the attempts in `RetryConfig` are used up.
    pub async fn sync_with_retry(&self) -> SyncOutcome {
        let retry = &self.config.retry;
        let mut attempt = 0;
        loop {
            let outcome = self.sync().await;
            let retryable = matches!(&outcome, SyncOutcome::Error { cause, .. } if cause.is_retryable());
            attempt += 1;
            if !retryable || attempt >= retry.max_attempts {
                return outcome;
            }

            let delay = retry.delay_for_attempt(attempt);
            debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying sync");
            self.stats.write().retries += 1;
            tokio::time::sleep(delay).await;
        }
    }

    /// Runs sync in an explicit execution mode.
    ///
    /// The local path makes no network call and reports an offline cycle.
    /// In `Hybrid` mode a failed remote cycle falls back to it, unless the
    /// cycle was cancelled or never started because another was running.
    pub async fn sync_with_mode(&self, mode: ExecutionMode) -> SyncOutcome {
        let result = strategy::execute_filtered(
            mode,
            || async { Ok::<_, SyncError>(SyncReport::offline()) },
            move || async move { self.sync().await.into_result() },
            |cause: &SyncError| {
                !matches!(cause, SyncError::Cancelled | SyncError::AlreadySyncing)
            },
        )
        .await;

        match result {
            StrategyResult::Success(report) => SyncOutcome::Success {
                message: report.summary(),
                report,
            },
            StrategyResult::Fallback { value, cause } => SyncOutcome::Success {
                message: format!("{} (remote failed: {cause})", value.summary()),
                report: value,
            },
            StrategyResult::Failure(StrategyError::Disabled) => {
                SyncOutcome::error(SyncError::RemoteDisabled)
            }
            StrategyResult::Failure(StrategyError::Failed(SyncError::Cancelled)) => {
                SyncOutcome::Cancelled
            }
            StrategyResult::Failure(StrategyError::Failed(cause)) => SyncOutcome::error(cause),
        }
    }

    /// Runs sync in the mode the selector holds for [`Capability::Sync`].
    pub async fn sync_selected(&self) -> SyncOutcome {
        self.sync_with_mode(self.selector.mode(Capability::Sync)).await
    }

    /// Syncs every `sync_interval` until `shutdown` is cancelled. Returns at
    /// once if no interval is configured.
    pub async fn run_periodic(self: Arc<Self>, shutdown: CancellationToken) {
        let Some(interval) = self.config.sync_interval else {
            debug!("no sync interval configured");
            return;
        };

        info!(interval_ms = interval.as_millis() as u64, "periodic sync started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            let outcome = self.sync_with_retry().await;
            debug!(success = outcome.is_success(), "periodic sync cycle done");
        }
        info!("periodic sync stopped");
    }

    /// Applies a user decision to a deferred conflict.
    pub async fn resolve_conflict(
        &self,
        kind: EntityKind,
        cloud_id: &str,
        resolution: ConflictResolution,
    ) -> SyncResult<()> {
        let _guard = self.in_flight.lock().await;

        let record = self
            .store
            .find_by_cloud_id(kind, cloud_id)
            .await?
            .ok_or_else(|| SyncError::NotFound {
                kind,
                id: cloud_id.to_string(),
            })?;
        let meta = record.metadata();
        let conflict = ConflictInfo::new(
            kind,
            cloud_id,
            meta.version,
            meta.conflict_version.unwrap_or(meta.version),
            "resolved by user",
        );
        info!(%kind, cloud_id, ?resolution, "applying user conflict decision");
        self.apply_resolution(resolution, &conflict, record).await
    }

    /// Stores a remote profile that had no local row, once its private
    /// fields are known. Returns the new local id.
    pub async fn adopt_profile(
        &self,
        cloud: &CloudBaby,
        private: BabyPrivateFields,
    ) -> SyncResult<LocalId> {
        let _guard = self.in_flight.lock().await;

        if let Some(existing) = self
            .store
            .find_by_cloud_id(EntityKind::Baby, &cloud.cloud_id)
            .await?
        {
            return Ok(existing.local_id());
        }
        let entity = baby_from_cloud(cloud, private, now_millis());
        let id = self.store.insert(entity.into_record()).await?;
        info!(cloud_id = %cloud.cloud_id, local_id = id, "profile adopted");
        Ok(id)
    }

    async fn run_cycle(&self) -> SyncResult<SyncReport> {
        let mut report = SyncReport::default();
        let mut ids = IdMap::load(self.store.as_ref()).await?;

        self.publish(SyncState::Syncing {
            progress: PROGRESS_PULL,
        });
        self.pull_phase(&mut ids, &mut report).await?;

        self.publish(SyncState::Syncing {
            progress: PROGRESS_PUSH,
        });
        let conflicts = self.push_phase(&mut ids, &mut report).await?;

        self.publish(SyncState::Syncing {
            progress: PROGRESS_RESOLVE,
        });
        for conflict in conflicts {
            let resolved = self.resolver.resolve(&conflict);
            match self
                .store
                .find_by_cloud_id(conflict.entity_type, &conflict.cloud_id)
                .await?
            {
                Some(record) => {
                    self.apply_resolution(resolved.resolution, &conflict, record)
                        .await?
                }
                None => warn!(
                    kind = %conflict.entity_type,
                    cloud_id = %conflict.cloud_id,
                    "conflict for an entity missing locally"
                ),
            }
            report.conflicts.push(resolved);
        }

        Ok(report)
    }

    async fn apply_resolution(
        &self,
        resolution: ConflictResolution,
        conflict: &ConflictInfo,
        mut record: Record,
    ) -> SyncResult<()> {
        let refetch = ConflictResolver::apply(resolution, conflict, &mut record);
        self.store.update(record).await?;
        if refetch {
            debug!("checkpoint cleared to refetch remote copy");
            self.store.set_checkpoint(None).await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------ pull

    async fn pull_phase(&self, ids: &mut IdMap, report: &mut SyncReport) -> SyncResult<()> {
        let checkpoint = self.store.checkpoint().await?;
        debug!(?checkpoint, "pulling remote changes");
        let response = self.with_timeout(self.remote.pull(checkpoint)).await?;
        let retained = self.store.deferred_changes().await?;
        let now = now_millis();

        *report.pulled.entry(EntityKind::Recipe).or_default() += response.recipes.len();
        *report.pulled.entry(EntityKind::Baby).or_default() += response.babies.len();
        *report.pulled.entry(EntityKind::Plan).or_default() += response.plans.len();

        // Payloads that cannot be applied now are kept and retried on the
        // next pull, because the checkpoint moves past them.
        let mut deferred = PullResponse::empty(response.server_time);

        // Plans last, so their references resolve.
        let recipes = supersede(retained.recipes, &response.recipes);
        self.apply_pulled(&recipes, ids, report, now, &mut deferred.recipes)
            .await?;
        let babies = supersede(retained.babies, &response.babies);
        let unmaterialized = self
            .apply_pulled(&babies, ids, report, now, &mut deferred.babies)
            .await?;
        report.unmaterialized_profiles.extend(unmaterialized);
        let plans = supersede(retained.plans, &response.plans);
        self.apply_pulled(&plans, ids, report, now, &mut deferred.plans)
            .await?;

        if !deferred.is_empty() {
            debug!(deferred = deferred.len(), "pulled changes kept for retry");
        }
        self.store.set_deferred_changes(deferred).await?;
        self.store.set_checkpoint(Some(response.server_time)).await?;
        report.server_time = Some(response.server_time);
        debug!(
            received = response.len(),
            inserted = report.inserted,
            updated = report.updated,
            server_time = response.server_time,
            "pull applied"
        );
        Ok(())
    }

    /// Applies one kind of pulled payloads.
    ///
    /// Payloads that fail to map, or that have no local row and cannot be
    /// created from the remote alone, are appended to `deferred`. The
    /// latter are also returned.
    async fn apply_pulled<P: CloudPayload + Clone>(
        &self,
        payloads: &[P],
        ids: &mut IdMap,
        report: &mut SyncReport,
        now: i64,
        deferred: &mut Vec<P>,
    ) -> SyncResult<Vec<P>> {
        let kind = <P::Entity as Syncable>::KIND;

        let mut unmaterialized = Vec::new();
        for payload in payloads {
            match self.apply_one(payload, ids, report, now).await? {
                PullApplied::Inserted => report.inserted += 1,
                PullApplied::Updated => report.updated += 1,
                PullApplied::Purged => report.purged += 1,
                PullApplied::Unmaterialized => {
                    debug!(%kind, cloud_id = payload.cloud_id(), "remote entity needs local data");
                    unmaterialized.push(payload.clone());
                    deferred.push(payload.clone());
                }
                PullApplied::Failed(error) => {
                    warn!(%kind, cloud_id = payload.cloud_id(), %error, "pulled entity not applied");
                    report.entity_errors.push(EntityError {
                        kind,
                        local_id: None,
                        cloud_id: Some(payload.cloud_id().to_string()),
                        error,
                    });
                    deferred.push(payload.clone());
                }
                PullApplied::Unchanged | PullApplied::Skipped => {}
            }
        }
        Ok(unmaterialized)
    }

    async fn apply_one<P: CloudPayload>(
        &self,
        payload: &P,
        ids: &mut IdMap,
        report: &mut SyncReport,
        now: i64,
    ) -> SyncResult<PullApplied> {
        let kind = <P::Entity as Syncable>::KIND;
        let cloud_id = payload.cloud_id();

        let Some(record) = self.store.find_by_cloud_id(kind, cloud_id).await? else {
            if payload.is_deleted() {
                return Ok(PullApplied::Skipped);
            }
            return match payload.to_local(None, ids, now) {
                Ok(entity) => {
                    let local_id = self.store.insert(entity.into_record()).await?;
                    ids.insert(kind, cloud_id, local_id);
                    Ok(PullApplied::Inserted)
                }
                Err(MappingError::ProfileRequiresLocalData { .. }) => Ok(PullApplied::Unmaterialized),
                Err(error) => Ok(PullApplied::Failed(error)),
            };
        };

        if payload.is_deleted() {
            return self.apply_tombstone(payload, record, ids, report).await;
        }

        let local_version = record.metadata().version;
        let status = record.metadata().sync_status;
        match status {
            SyncStatus::Conflict => self.raise_conflict_version(record, payload.version()).await,
            SyncStatus::PendingUpload if payload.version() > local_version => {
                let conflict = ConflictInfo::new(
                    kind,
                    cloud_id,
                    local_version,
                    payload.version(),
                    "remote changed while local edits were pending",
                );
                let resolved = self.resolver.resolve(&conflict);
                let applied = match resolved.resolution {
                    ConflictResolution::AcceptRemote => self.merge_pulled(payload, record, ids, now).await?,
                    resolution => {
                        let mut record = record;
                        ConflictResolver::apply(resolution, &conflict, &mut record);
                        self.store.update(record).await?;
                        PullApplied::Unchanged
                    }
                };
                report.conflicts.push(resolved);
                Ok(applied)
            }
            SyncStatus::Synced if payload.version() >= local_version => {
                self.merge_pulled(payload, record, ids, now).await
            }
            // Pending edits based on the current remote version win; older
            // remote copies are stale.
            _ => Ok(PullApplied::Unchanged),
        }
    }

    /// Applies a remote tombstone to a row that exists locally.
    ///
    /// Live local edits the remote has not seen are a conflict and go
    /// through the resolver; everything else is purged.
    async fn apply_tombstone<P: CloudPayload>(
        &self,
        payload: &P,
        mut record: Record,
        ids: &mut IdMap,
        report: &mut SyncReport,
    ) -> SyncResult<PullApplied> {
        let kind = <P::Entity as Syncable>::KIND;
        let cloud_id = payload.cloud_id();
        let meta = record.metadata();
        let local_version = meta.version;
        let status = meta.sync_status;
        let live_edits = status == SyncStatus::PendingUpload && !meta.is_deleted;

        match status {
            SyncStatus::Conflict => self.raise_conflict_version(record, payload.version()).await,
            SyncStatus::PendingUpload if live_edits && payload.version() > local_version => {
                let conflict = ConflictInfo::new(
                    kind,
                    cloud_id,
                    local_version,
                    payload.version(),
                    "deleted remotely while local edits were pending",
                );
                let resolved = self.resolver.resolve(&conflict);
                let applied = match resolved.resolution {
                    ConflictResolution::AcceptRemote => {
                        self.purge_row(kind, cloud_id, record.local_id(), ids).await?
                    }
                    resolution => {
                        ConflictResolver::apply(resolution, &conflict, &mut record);
                        self.store.update(record).await?;
                        PullApplied::Unchanged
                    }
                };
                report.conflicts.push(resolved);
                Ok(applied)
            }
            // Kept over this tombstone already; the next push revives it.
            SyncStatus::PendingUpload if live_edits => Ok(PullApplied::Unchanged),
            _ => self.purge_row(kind, cloud_id, record.local_id(), ids).await,
        }
    }

    async fn purge_row(
        &self,
        kind: EntityKind,
        cloud_id: &str,
        local_id: LocalId,
        ids: &mut IdMap,
    ) -> SyncResult<PullApplied> {
        self.store.purge(kind, local_id).await?;
        ids.remove(kind, local_id);
        debug!(%kind, cloud_id, local_id, "remote tombstone purged local row");
        Ok(PullApplied::Purged)
    }

    /// A row awaiting a user decision only tracks the newest remote version.
    async fn raise_conflict_version(
        &self,
        mut record: Record,
        remote_version: u32,
    ) -> SyncResult<PullApplied> {
        let meta = record.metadata_mut();
        let raised = meta.conflict_version.unwrap_or(0).max(remote_version);
        if meta.conflict_version != Some(raised) {
            meta.conflict_version = Some(raised);
            self.store.update(record).await?;
        }
        Ok(PullApplied::Unchanged)
    }

    async fn merge_pulled<P: CloudPayload>(
        &self,
        payload: &P,
        record: Record,
        ids: &IdMap,
        now: i64,
    ) -> SyncResult<PullApplied> {
        let kind = <P::Entity as Syncable>::KIND;
        let Some(existing) = <P::Entity as Syncable>::from_record(record.clone()) else {
            return Err(SyncError::Store(format!(
                "row for {kind} {} has the wrong kind",
                payload.cloud_id()
            )));
        };

        let merged = match payload.to_local(Some(&existing), ids, now) {
            Ok(merged) => merged,
            Err(error) => return Ok(PullApplied::Failed(error)),
        };

        let mut merged = merged.into_record();
        merged.metadata_mut().last_sync_time = record.metadata().last_sync_time;
        if merged == record {
            return Ok(PullApplied::Unchanged);
        }
        merged.metadata_mut().last_sync_time = Some(now);
        self.store.update(merged).await?;
        Ok(PullApplied::Updated)
    }

    // ------------------------------------------------------------------ push

    /// Pushes every pending row. Returns the conflicts the remote reported.
    async fn push_phase(
        &self,
        ids: &mut IdMap,
        report: &mut SyncReport,
    ) -> SyncResult<Vec<ConflictInfo>> {
        let mut request = PushRequest::default();
        let mut sent = Vec::new();

        for kind in EntityKind::PULL_ORDER {
            for mut record in self
                .store
                .list_by_status(kind, SyncStatus::PendingUpload)
                .await?
            {
                let local_id = record.local_id();
                if record.metadata().is_deleted && record.cloud_id().is_none() {
                    // The remote never saw it.
                    self.store.purge(kind, local_id).await?;
                    report.purged += 1;
                    continue;
                }

                // Persisted before sending so a retry reuses the same id.
                if assign_cloud_id(kind, record.metadata_mut()) {
                    self.store.update(record.clone()).await?;
                }
                if let Some(cloud_id) = record.cloud_id() {
                    ids.insert(kind, cloud_id, local_id);
                }

                match add_to_batch(&mut request, &record, ids) {
                    Ok(()) => sent.push(record),
                    Err(error) => {
                        warn!(%kind, local_id, %error, "pending entity not pushed");
                        report.entity_errors.push(EntityError {
                            kind,
                            local_id: Some(local_id),
                            cloud_id: record.cloud_id().map(str::to_string),
                            error,
                        });
                    }
                }
            }
        }

        if request.is_empty() {
            debug!("nothing to push");
            return Ok(Vec::new());
        }

        debug!(
            recipes = request.recipes.len(),
            plans = request.plans.len(),
            babies = request.babies.len(),
            "pushing local changes"
        );
        let response = self.with_timeout(self.remote.push(&request)).await?;
        if !response.success {
            return Err(SyncError::ServerRejected(
                response
                    .message
                    .unwrap_or_else(|| "push rejected".to_string()),
            ));
        }

        let conflicted: HashSet<(EntityKind, &str)> = response
            .conflicts
            .iter()
            .map(|c| (c.entity_type, c.cloud_id.as_str()))
            .collect();
        let sent_plans: HashMap<&str, &CloudPlan> = request
            .plans
            .iter()
            .map(|plan| (plan.cloud_id.as_str(), plan))
            .collect();
        let now = now_millis();

        for snapshot in &sent {
            let kind = snapshot.kind();
            let cloud_id = snapshot.cloud_id().unwrap_or_default();
            if conflicted.contains(&(kind, cloud_id)) {
                continue;
            }
            let Some(mut current) = self.store.get(kind, snapshot.local_id()).await? else {
                continue;
            };
            report.pushed += 1;

            if current.metadata().is_deleted {
                self.store.purge(kind, current.local_id()).await?;
                ids.remove(kind, current.local_id());
                report.purged += 1;
                continue;
            }

            if current.updated_at() != snapshot.updated_at() {
                // Edited while the push was in flight: the edit still has to go out.
                current
                    .metadata_mut()
                    .observe_version(snapshot.metadata().version.saturating_add(1));
            } else {
                current.metadata_mut().mark_pushed(now);
            }
            if let (Record::Plan(plan), Some(sent_plan)) = (&mut current, sent_plans.get(cloud_id)) {
                plan.cloud_recipe_id = Some(sent_plan.cloud_recipe_id.clone());
                plan.cloud_baby_id = sent_plan.cloud_baby_id.clone();
            }
            self.store.update(current).await?;
        }

        Ok(response.conflicts)
    }
}

/// Merges retained payloads with a fresh pull. A fresh copy replaces a
/// retained one with the same cloud id.
fn supersede<P: CloudPayload + Clone>(retained: Vec<P>, fresh: &[P]) -> Vec<P> {
    let fresh_ids: HashSet<&str> = fresh.iter().map(|payload| payload.cloud_id()).collect();
    retained
        .into_iter()
        .filter(|payload| !fresh_ids.contains(payload.cloud_id()))
        .chain(fresh.iter().cloned())
        .collect()
}

fn add_to_batch(request: &mut PushRequest, record: &Record, ids: &IdMap) -> Result<(), MappingError> {
    match record {
        Record::Recipe(recipe) => request.recipes.push(recipe_to_cloud(recipe)?),
        Record::Plan(plan) => request.plans.push(plan_to_cloud(plan, ids)?),
        Record::Baby(baby) => request.babies.push(baby_to_cloud(baby)?),
    }
    Ok(())
}
