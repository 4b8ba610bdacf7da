//! Conflict reporting and resolution policies.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kinds of entity that take part in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// A recipe.
    Recipe,
    /// A scheduled meal.
    Plan,
    /// A child profile.
    Baby,
}

impl EntityKind {
    /// All kinds, in the order a pull applies them.
    ///
    /// Plans come last so their recipe and profile references resolve.
    pub const PULL_ORDER: [EntityKind; 3] = [EntityKind::Recipe, EntityKind::Baby, EntityKind::Plan];

    /// Wire name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Recipe => "recipe",
            EntityKind::Plan => "plan",
            EntityKind::Baby => "baby",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recipe" => Ok(EntityKind::Recipe),
            "plan" => Ok(EntityKind::Plan),
            "baby" => Ok(EntityKind::Baby),
            other => Err(format!("unknown entity kind: {other}")),
        }
    }
}

/// A version mismatch reported by the remote.
///
/// `local_version` is the version the client sent; `remote_version` is the
/// version the remote currently holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictInfo {
    /// Kind of the conflicting entity.
    pub entity_type: EntityKind,
    /// Remote identity of the entity.
    pub cloud_id: String,
    /// Version held by the client.
    pub local_version: u32,
    /// Version held by the remote.
    pub remote_version: u32,
    /// Human-readable reason.
    #[serde(default)]
    pub reason: String,
}

impl ConflictInfo {
    /// Creates a new conflict record.
    pub fn new(
        entity_type: EntityKind,
        cloud_id: impl Into<String>,
        local_version: u32,
        remote_version: u32,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            entity_type,
            cloud_id: cloud_id.into(),
            local_version,
            remote_version,
            reason: reason.into(),
        }
    }

    /// Returns true if the remote has moved past the client's version.
    pub fn remote_is_ahead(&self) -> bool {
        self.remote_version > self.local_version
    }
}

/// Decision taken for a single conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    /// Discard local pending changes; the remote copy replaces them.
    AcceptRemote,
    /// Keep local changes and re-push them against the remote version.
    KeepLocal,
    /// Park the entity until the user decides.
    Defer,
}

/// Policy for resolving conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// The remote is authoritative.
    #[default]
    RemoteWins,
    /// Local edits overwrite the remote.
    LocalWins,
    /// Every conflict is presented to the user.
    Manual,
}

impl ConflictPolicy {
    /// Returns true if this policy resolves conflicts without user input.
    pub fn auto_resolves(&self) -> bool {
        !matches!(self, ConflictPolicy::Manual)
    }

    /// Decides a conflict according to this policy.
    ///
    /// The decision depends only on the policy, so a given pair of versions
    /// always resolves the same way.
    pub fn decide(&self, _conflict: &ConflictInfo) -> ConflictResolution {
        match self {
            ConflictPolicy::RemoteWins => ConflictResolution::AcceptRemote,
            ConflictPolicy::LocalWins => ConflictResolution::KeepLocal,
            ConflictPolicy::Manual => ConflictResolution::Defer,
        }
    }
}
