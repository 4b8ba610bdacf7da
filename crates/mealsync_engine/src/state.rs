//! Sync state, cycle outcomes and statistics.

use crate::entity::LocalId;
use crate::error::{SyncError, SyncResult};
use crate::mapper::MappingError;
use crate::resolver::ResolvedConflict;
use mealsync_protocol::{CloudBaby, EntityKind};
use std::collections::BTreeMap;
use std::time::Duration;

/// Progress published when a cycle starts.
pub const PROGRESS_START: u8 = 0;
/// Progress published when the pull phase starts.
pub const PROGRESS_PULL: u8 = 10;
/// Progress published when the push phase starts.
pub const PROGRESS_PUSH: u8 = 70;
/// Progress published when conflict resolution starts.
pub const PROGRESS_RESOLVE: u8 = 90;

/// The observable state of the sync engine.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SyncState {
    /// Not syncing.
    #[default]
    Idle,
    /// A cycle is running.
    Syncing {
        /// Progress in percent.
        progress: u8,
    },
    /// The last cycle succeeded.
    Success {
        /// Summary of the cycle.
        message: String,
    },
    /// The last cycle failed.
    Error {
        /// Human-readable message.
        message: String,
        /// Underlying error.
        cause: SyncError,
    },
}

impl SyncState {
    /// Returns true while a cycle is running.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Syncing { .. })
    }

    /// Returns true for `Success` and `Error`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncState::Success { .. } | SyncState::Error { .. })
    }
}

/// A per-entity failure that did not abort the cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityError {
    /// Entity kind.
    pub kind: EntityKind,
    /// Local id, when the entity exists locally.
    pub local_id: Option<LocalId>,
    /// Cloud id, when known.
    pub cloud_id: Option<String>,
    /// What went wrong.
    pub error: MappingError,
}

/// What a sync cycle did.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// Entities received from the remote, per kind.
    pub pulled: BTreeMap<EntityKind, usize>,
    /// Pulled entities inserted locally.
    pub inserted: usize,
    /// Pulled entities merged into existing rows.
    pub updated: usize,
    /// Local entities acknowledged by the remote.
    pub pushed: usize,
    /// Rows removed locally (tombstones).
    pub purged: usize,
    /// Conflicts and the decision taken for each.
    pub conflicts: Vec<ResolvedConflict>,
    /// Entities that were skipped because they could not be mapped.
    pub entity_errors: Vec<EntityError>,
    /// Remote profiles with no local row; they need their private fields
    /// supplied before they can be stored.
    pub unmaterialized_profiles: Vec<CloudBaby>,
    /// Server clock reported by the pull.
    pub server_time: Option<i64>,
    /// Wall time of the cycle.
    pub duration: Duration,
    /// True if no network call was made.
    pub offline: bool,
}

impl SyncReport {
    /// A report for a cycle that stayed on the device.
    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Self::default()
        }
    }

    /// Total number of entities received.
    pub fn pulled_total(&self) -> usize {
        self.pulled.values().sum()
    }

    /// Pulled count for one kind.
    pub fn pulled_of(&self, kind: EntityKind) -> usize {
        self.pulled.get(&kind).copied().unwrap_or(0)
    }

    /// One-line summary.
    pub fn summary(&self) -> String {
        if self.offline {
            return "local only, nothing synced".to_string();
        }
        format!(
            "pulled {}, pushed {}, {} conflict(s), {} error(s)",
            self.pulled_total(),
            self.pushed,
            self.conflicts.len(),
            self.entity_errors.len()
        )
    }
}

/// Result of a sync request.
#[derive(Debug, Clone)]
pub enum SyncOutcome {
    /// The cycle completed.
    Success {
        /// Summary.
        message: String,
        /// Details.
        report: SyncReport,
    },
    /// The cycle failed.
    Error {
        /// Human-readable message.
        message: String,
        /// Underlying error.
        cause: SyncError,
    },
    /// The cycle was cancelled.
    Cancelled,
}

impl SyncOutcome {
    pub(crate) fn error(cause: SyncError) -> Self {
        SyncOutcome::Error {
            message: cause.to_string(),
            cause,
        }
    }

    /// Returns true for `Success`.
    pub fn is_success(&self) -> bool {
        matches!(self, SyncOutcome::Success { .. })
    }

    /// The report of a successful cycle.
    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            SyncOutcome::Success { report, .. } => Some(report),
            _ => None,
        }
    }

    /// Converts into a `Result`.
    pub fn into_result(self) -> SyncResult<SyncReport> {
        match self {
            SyncOutcome::Success { report, .. } => Ok(report),
            SyncOutcome::Error { cause, .. } => Err(cause),
            SyncOutcome::Cancelled => Err(SyncError::Cancelled),
        }
    }
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Total number of sync cycles completed.
    pub cycles_completed: u64,
    /// Total number of entities pulled.
    pub entities_pulled: u64,
    /// Total number of entities pushed.
    pub entities_pushed: u64,
    /// Total number of conflicts encountered.
    pub conflicts_encountered: u64,
    /// Total number of retries.
    pub retries: u64,
    /// Completion time of the last successful cycle (epoch ms).
    pub last_sync_time: Option<i64>,
    /// Last error message.
    pub last_error: Option<String>,
}
