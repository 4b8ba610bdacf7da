//! Protocol messages for sync.
//!
//! A pull is a `GET` with an optional `lastSyncTime` query parameter, so
//! only its response has a body type here.

use crate::cloud::{CloudBaby, CloudPlan, CloudRecipe};
use crate::conflict::ConflictInfo;
use serde::{Deserialize, Serialize};

/// Changes returned by the remote since a checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    /// Changed recipes.
    #[serde(default)]
    pub recipes: Vec<CloudRecipe>,
    /// Changed plans.
    #[serde(default)]
    pub plans: Vec<CloudPlan>,
    /// Changed profiles.
    #[serde(default)]
    pub babies: Vec<CloudBaby>,
    /// Server clock at the time of the pull (epoch ms).
    pub server_time: i64,
}

impl PullResponse {
    /// Creates an empty pull response.
    pub fn empty(server_time: i64) -> Self {
        Self {
            server_time,
            ..Default::default()
        }
    }

    /// Total number of entities in the response.
    pub fn len(&self) -> usize {
        self.recipes.len() + self.plans.len() + self.babies.len()
    }

    /// Returns true if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A batch of local changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    /// Pending recipes.
    #[serde(default)]
    pub recipes: Vec<CloudRecipe>,
    /// Pending plans.
    #[serde(default)]
    pub plans: Vec<CloudPlan>,
    /// Pending profiles.
    #[serde(default)]
    pub babies: Vec<CloudBaby>,
}

impl PushRequest {
    /// Total number of entities in the batch.
    pub fn len(&self) -> usize {
        self.recipes.len() + self.plans.len() + self.babies.len()
    }

    /// Returns true if there is nothing to push.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of a push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    /// Whether the batch was accepted.
    pub success: bool,
    /// Entities rejected because of a version mismatch.
    #[serde(default)]
    pub conflicts: Vec<ConflictInfo>,
    /// Server clock after the push (epoch ms).
    pub server_time: i64,
    /// Server message, set when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PushResponse {
    /// Creates a successful push response.
    pub fn success(server_time: i64) -> Self {
        Self {
            success: true,
            conflicts: Vec::new(),
            server_time,
            message: None,
        }
    }

    /// Creates a successful response carrying conflicts.
    pub fn with_conflicts(server_time: i64, conflicts: Vec<ConflictInfo>) -> Self {
        Self {
            conflicts,
            ..Self::success(server_time)
        }
    }

    /// Creates a rejected push response.
    pub fn rejected(server_time: i64, message: impl Into<String>) -> Self {
        Self {
            success: false,
            conflicts: Vec::new(),
            server_time,
            message: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{decode, encode, CloudNutrition, EntityKind};

    fn recipe(cloud_id: &str) -> CloudRecipe {
        CloudRecipe {
            cloud_id: cloud_id.into(),
            name: "Carrot puree".into(),
            min_age_months: 6,
            max_age_months: 12,
            ingredients: vec![],
            steps: vec!["Steam".into(), "Blend".into()],
            nutrition: CloudNutrition {
                calories: 40.0,
                protein: 1.0,
                fat: 0.2,
                carbohydrates: 9.0,
                fiber: Some(2.8),
                calcium: None,
                iron: None,
                zinc: None,
            },
            category: "puree".into(),
            is_built_in: false,
            image_url: None,
            created_at: 1,
            updated_at: 1,
            version: 1,
            is_deleted: false,
        }
    }

    #[test]
    fn pull_response_counts() {
        let mut response = PullResponse::empty(100);
        assert!(response.is_empty());

        response.recipes.push(recipe("recipe_a"));
        response.recipes.push(recipe("recipe_b"));
        assert_eq!(response.len(), 2);
    }

    #[test]
    fn pull_response_wire_shape() {
        let mut response = PullResponse::empty(1_700_000_000_000);
        response.recipes.push(recipe("recipe_a"));

        let json: serde_json::Value = serde_json::from_slice(&encode(&response).unwrap()).unwrap();
        assert_eq!(json["serverTime"], 1_700_000_000_000i64);
        assert_eq!(json["recipes"][0]["minAgeMonths"], 6);
        assert!(json["plans"].as_array().unwrap().is_empty());
    }

    #[test]
    fn push_response_with_conflicts() {
        let conflict = crate::ConflictInfo::new(EntityKind::Recipe, "recipe_a", 3, 4, "stale");
        let response = PushResponse::with_conflicts(7, vec![conflict.clone()]);

        let decoded: PushResponse = decode(&encode(&response).unwrap()).unwrap();
        assert!(decoded.success);
        assert_eq!(decoded.conflicts, vec![conflict]);
        assert_eq!(decoded.message, None);
    }

    #[test]
    fn rejected_push_carries_message() {
        let response = PushResponse::rejected(9, "quota exceeded");
        assert!(!response.success);
        assert_eq!(response.message.as_deref(), Some("quota exceeded"));
    }
}
