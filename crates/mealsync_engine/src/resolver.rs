//! Conflict resolution.

use crate::entity::{Record, SyncStatus};
use mealsync_protocol::{ConflictInfo, ConflictPolicy, ConflictResolution};
use tracing::info;

/// A conflict together with the decision taken for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConflict {
    /// The conflict.
    pub conflict: ConflictInfo,
    /// The decision.
    pub resolution: ConflictResolution,
}

/// Decides version conflicts according to a [`ConflictPolicy`] and applies
/// the decision to the local row.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver {
    policy: ConflictPolicy,
}

impl ConflictResolver {
    /// Creates a resolver for a policy.
    pub fn new(policy: ConflictPolicy) -> Self {
        Self { policy }
    }

    /// Returns the policy.
    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Decides a conflict.
    pub fn resolve(&self, conflict: &ConflictInfo) -> ResolvedConflict {
        let resolution = self.policy.decide(conflict);
        info!(
            kind = %conflict.entity_type,
            cloud_id = %conflict.cloud_id,
            local_version = conflict.local_version,
            remote_version = conflict.remote_version,
            ?resolution,
            "conflict resolved"
        );
        ResolvedConflict {
            conflict: conflict.clone(),
            resolution,
        }
    }

    /// Applies a decision to the conflicting row.
    ///
    /// Returns true if the remote copy has to be fetched again, which is
    /// the case when local changes were discarded without a payload at
    /// hand.
    pub fn apply(resolution: ConflictResolution, conflict: &ConflictInfo, record: &mut Record) -> bool {
        let meta = record.metadata_mut();
        match resolution {
            ConflictResolution::AcceptRemote => {
                meta.sync_status = SyncStatus::Synced;
                meta.is_deleted = false;
                meta.conflict_version = None;
                true
            }
            ConflictResolution::KeepLocal => {
                meta.observe_version(conflict.remote_version);
                meta.sync_status = SyncStatus::PendingUpload;
                meta.conflict_version = None;
                false
            }
            ConflictResolution::Defer => {
                meta.sync_status = SyncStatus::Conflict;
                meta.conflict_version = Some(conflict.remote_version);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{PlanEntity, SyncMetadata, Syncable};
    use chrono::NaiveDate;
    use mealsync_protocol::EntityKind;

    fn conflicting_plan() -> (ConflictInfo, Record) {
        let mut plan = PlanEntity::new(
            1,
            NaiveDate::from_ymd_opt(2024, 3, 3).unwrap(),
            crate::entity::MealPeriod::Breakfast,
        );
        plan.meta = SyncMetadata::synced("plan_c", 3, 0);
        plan.meta.mark_modified();
        let conflict = ConflictInfo::new(EntityKind::Plan, "plan_c", 3, 4, "version mismatch");
        (conflict, plan.into_record())
    }

    #[test]
    fn resolution_is_deterministic_per_policy() {
        let (conflict, _) = conflicting_plan();
        for (policy, expected) in [
            (ConflictPolicy::RemoteWins, ConflictResolution::AcceptRemote),
            (ConflictPolicy::LocalWins, ConflictResolution::KeepLocal),
            (ConflictPolicy::Manual, ConflictResolution::Defer),
        ] {
            let resolver = ConflictResolver::new(policy);
            assert_eq!(resolver.resolve(&conflict).resolution, expected);
            assert_eq!(resolver.resolve(&conflict).resolution, expected);
        }
    }

    #[test]
    fn accept_remote_discards_pending_state() {
        let (conflict, mut record) = conflicting_plan();
        let refetch = ConflictResolver::apply(ConflictResolution::AcceptRemote, &conflict, &mut record);

        assert!(refetch);
        assert_eq!(record.metadata().sync_status, SyncStatus::Synced);
        assert_eq!(record.metadata().version, 3);
    }

    #[test]
    fn keep_local_rebases_version() {
        let (conflict, mut record) = conflicting_plan();
        let refetch = ConflictResolver::apply(ConflictResolution::KeepLocal, &conflict, &mut record);

        assert!(!refetch);
        assert_eq!(record.metadata().sync_status, SyncStatus::PendingUpload);
        assert_eq!(record.metadata().version, 4);
    }

    #[test]
    fn defer_parks_the_row() {
        let (conflict, mut record) = conflicting_plan();
        ConflictResolver::apply(ConflictResolution::Defer, &conflict, &mut record);

        assert_eq!(record.metadata().sync_status, SyncStatus::Conflict);
        assert_eq!(record.metadata().conflict_version, Some(4));
        assert_eq!(record.metadata().version, 3);
    }
}
