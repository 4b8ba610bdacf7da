//! Translation between local entities and their cloud representations.
//!
//! `*_to_cloud` redacts: it only emits what the remote may store. The way
//! back is a merge, because fields that never left the device have to come
//! from the existing local row. Every function here is pure.

use crate::entity::{
    BabyEntity, Ingredient, LocalId, Nutrition, NutritionGoal, PlanEntity, PreferenceItem,
    RecipeEntity, SyncMetadata, SyncStatus, Syncable,
};
use crate::id_map::IdMap;
use chrono::NaiveDate;
use mealsync_protocol::{
    CloudBaby, CloudIngredient, CloudNutrition, CloudNutritionGoal, CloudPlan,
    CloudPreferenceItem, CloudRecipe, EntityKind,
};
use thiserror::Error;
use uuid::Uuid;

/// A single entity could not be mapped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    /// The entity has not been given a cloud id yet.
    #[error("{kind} has no cloud id")]
    MissingCloudId {
        /// Entity kind.
        kind: EntityKind,
    },

    /// A foreign reference has no counterpart on the other side.
    #[error("{kind} references unknown {target} {reference}")]
    UnresolvedReference {
        /// Kind of the referring entity.
        kind: EntityKind,
        /// Kind of the referenced entity.
        target: EntityKind,
        /// The local or cloud id that could not be resolved.
        reference: String,
    },

    /// A field holds a value the local model cannot represent.
    #[error("invalid {field} on {kind}: {message}")]
    InvalidField {
        /// Entity kind.
        kind: EntityKind,
        /// Field name.
        field: &'static str,
        /// What was wrong.
        message: String,
    },

    /// A remote profile cannot be created without its local-only fields.
    #[error("profile {cloud_id} is unknown locally and carries no private fields")]
    ProfileRequiresLocalData {
        /// Cloud id of the profile.
        cloud_id: String,
    },
}

/// Generates a fresh cloud id of the form `<kind>_<uuid>`.
pub fn generate_cloud_id(kind: EntityKind) -> String {
    format!("{}_{}", kind.as_str(), Uuid::new_v4().simple())
}

/// Gives the entity a cloud id if it has none. Returns true if one was
/// assigned.
pub fn assign_cloud_id(kind: EntityKind, meta: &mut SyncMetadata) -> bool {
    if meta.cloud_id.is_some() {
        return false;
    }
    meta.cloud_id = Some(generate_cloud_id(kind));
    true
}

fn require_cloud_id(kind: EntityKind, meta: &SyncMetadata) -> Result<String, MappingError> {
    meta.cloud_id
        .clone()
        .ok_or(MappingError::MissingCloudId { kind })
}

fn merged_metadata(existing: &SyncMetadata, cloud_id: &str, remote_version: u32, now: i64) -> SyncMetadata {
    let mut meta = existing.clone();
    meta.cloud_id = Some(cloud_id.to_string());
    meta.sync_status = SyncStatus::Synced;
    meta.last_sync_time = Some(now);
    meta.observe_version(remote_version);
    meta.is_deleted = false;
    meta.conflict_version = None;
    meta
}

// ---------------------------------------------------------------- recipes

/// Maps a recipe to its cloud form.
pub fn recipe_to_cloud(entity: &RecipeEntity) -> Result<CloudRecipe, MappingError> {
    Ok(CloudRecipe {
        cloud_id: require_cloud_id(EntityKind::Recipe, &entity.meta)?,
        name: entity.name.clone(),
        min_age_months: entity.min_age_months,
        max_age_months: entity.max_age_months,
        ingredients: entity.ingredients.iter().map(ingredient_to_cloud).collect(),
        steps: entity.steps.clone(),
        nutrition: nutrition_to_cloud(&entity.nutrition),
        category: entity.category.clone(),
        is_built_in: entity.is_built_in,
        image_url: entity.image_url.clone(),
        created_at: entity.created_at,
        updated_at: entity.updated_at,
        version: entity.meta.version,
        is_deleted: entity.meta.is_deleted,
    })
}

/// Builds a new local recipe from the remote. Recipes hold no private data,
/// so no local counterpart is needed.
pub fn recipe_from_cloud(cloud: &CloudRecipe, now: i64) -> RecipeEntity {
    let mut entity = RecipeEntity::new(cloud.name.clone(), cloud.min_age_months, cloud.max_age_months);
    entity.meta = SyncMetadata::synced(cloud.cloud_id.clone(), cloud.version, now);
    apply_cloud_recipe(&mut entity, cloud);
    entity
}

/// Merges a remote recipe into the existing local row.
pub fn merge_recipe(cloud: &CloudRecipe, existing: &RecipeEntity, now: i64) -> RecipeEntity {
    let mut entity = existing.clone();
    apply_cloud_recipe(&mut entity, cloud);
    entity.meta = merged_metadata(&existing.meta, &cloud.cloud_id, cloud.version, now);
    entity
}

fn apply_cloud_recipe(entity: &mut RecipeEntity, cloud: &CloudRecipe) {
    entity.name = cloud.name.clone();
    entity.min_age_months = cloud.min_age_months;
    entity.max_age_months = cloud.max_age_months;
    entity.ingredients = cloud.ingredients.iter().map(ingredient_from_cloud).collect();
    entity.steps = cloud.steps.clone();
    entity.nutrition = nutrition_from_cloud(&cloud.nutrition);
    entity.category = cloud.category.clone();
    entity.is_built_in = cloud.is_built_in;
    entity.image_url = cloud.image_url.clone();
    entity.created_at = cloud.created_at;
    entity.updated_at = cloud.updated_at;
}

fn ingredient_to_cloud(ingredient: &Ingredient) -> CloudIngredient {
    CloudIngredient {
        name: ingredient.name.clone(),
        amount: ingredient.amount.clone(),
        unit: ingredient.unit.clone(),
    }
}

fn ingredient_from_cloud(ingredient: &CloudIngredient) -> Ingredient {
    Ingredient {
        name: ingredient.name.clone(),
        amount: ingredient.amount.clone(),
        unit: ingredient.unit.clone(),
    }
}

fn nutrition_to_cloud(n: &Nutrition) -> CloudNutrition {
    CloudNutrition {
        calories: n.calories,
        protein: n.protein,
        fat: n.fat,
        carbohydrates: n.carbohydrates,
        fiber: n.fiber,
        calcium: n.calcium,
        iron: n.iron,
        zinc: n.zinc,
    }
}

fn nutrition_from_cloud(n: &CloudNutrition) -> Nutrition {
    Nutrition {
        calories: n.calories,
        protein: n.protein,
        fat: n.fat,
        carbohydrates: n.carbohydrates,
        fiber: n.fiber,
        calcium: n.calcium,
        iron: n.iron,
        zinc: n.zinc,
    }
}

// ------------------------------------------------------------------ plans

/// Maps a plan to its cloud form.
///
/// Recipe and profile references are taken from the plan if it already
/// knows them, otherwise from `ids`.
pub fn plan_to_cloud(entity: &PlanEntity, ids: &IdMap) -> Result<CloudPlan, MappingError> {
    let cloud_id = require_cloud_id(EntityKind::Plan, &entity.meta)?;

    let cloud_recipe_id = match &entity.cloud_recipe_id {
        Some(id) => id.clone(),
        None => resolve_cloud(ids, EntityKind::Recipe, entity.recipe_id)?,
    };

    let cloud_baby_id = match (&entity.cloud_baby_id, entity.baby_id) {
        (Some(id), _) => Some(id.clone()),
        (None, Some(baby_id)) => Some(resolve_cloud(ids, EntityKind::Baby, baby_id)?),
        (None, None) => None,
    };

    Ok(CloudPlan {
        cloud_id,
        cloud_baby_id,
        cloud_recipe_id,
        planned_date: entity.planned_date.to_string(),
        meal_period: entity.meal_period.as_str().to_string(),
        status: entity.status.as_str().to_string(),
        notes: entity.notes.clone(),
        created_at: entity.created_at,
        updated_at: entity.updated_at,
        version: entity.meta.version,
        is_deleted: entity.meta.is_deleted,
    })
}

fn resolve_cloud(ids: &IdMap, target: EntityKind, local_id: LocalId) -> Result<String, MappingError> {
    ids.cloud_id(target, local_id)
        .map(str::to_string)
        .ok_or_else(|| MappingError::UnresolvedReference {
            kind: EntityKind::Plan,
            target,
            reference: local_id.to_string(),
        })
}

fn resolve_local(ids: &IdMap, target: EntityKind, cloud_id: &str) -> Result<LocalId, MappingError> {
    ids.local_id(target, cloud_id)
        .ok_or_else(|| MappingError::UnresolvedReference {
            kind: EntityKind::Plan,
            target,
            reference: cloud_id.to_string(),
        })
}

/// Builds a new local plan from the remote, resolving its references.
pub fn plan_from_cloud(cloud: &CloudPlan, ids: &IdMap, now: i64) -> Result<PlanEntity, MappingError> {
    let (planned_date, meal_period, status) = parse_plan_fields(cloud)?;
    let recipe_id = resolve_local(ids, EntityKind::Recipe, &cloud.cloud_recipe_id)?;

    let mut entity = PlanEntity::new(recipe_id, planned_date, meal_period);
    entity.status = status;
    entity.meta = SyncMetadata::synced(cloud.cloud_id.clone(), cloud.version, now);
    apply_plan_refs(&mut entity, cloud, ids)?;
    entity.notes = cloud.notes.clone();
    entity.created_at = cloud.created_at;
    entity.updated_at = cloud.updated_at;
    Ok(entity)
}

/// Merges a remote plan into the existing local row.
pub fn merge_plan(
    cloud: &CloudPlan,
    existing: &PlanEntity,
    ids: &IdMap,
    now: i64,
) -> Result<PlanEntity, MappingError> {
    let (planned_date, meal_period, status) = parse_plan_fields(cloud)?;

    let mut entity = existing.clone();
    entity.recipe_id = resolve_local(ids, EntityKind::Recipe, &cloud.cloud_recipe_id)?;
    apply_plan_refs(&mut entity, cloud, ids)?;
    entity.planned_date = planned_date;
    entity.meal_period = meal_period;
    entity.status = status;
    entity.notes = cloud.notes.clone();
    entity.created_at = cloud.created_at;
    entity.updated_at = cloud.updated_at;
    entity.meta = merged_metadata(&existing.meta, &cloud.cloud_id, cloud.version, now);
    Ok(entity)
}

fn apply_plan_refs(entity: &mut PlanEntity, cloud: &CloudPlan, ids: &IdMap) -> Result<(), MappingError> {
    entity.cloud_recipe_id = Some(cloud.cloud_recipe_id.clone());
    entity.baby_id = match &cloud.cloud_baby_id {
        Some(cloud_baby_id) => Some(resolve_local(ids, EntityKind::Baby, cloud_baby_id)?),
        None => None,
    };
    entity.cloud_baby_id = cloud.cloud_baby_id.clone();
    Ok(())
}

fn parse_plan_fields(
    cloud: &CloudPlan,
) -> Result<(NaiveDate, crate::entity::MealPeriod, crate::entity::PlanStatus), MappingError> {
    let invalid = |field: &'static str, message: String| MappingError::InvalidField {
        kind: EntityKind::Plan,
        field,
        message,
    };

    let planned_date = cloud
        .planned_date
        .parse::<NaiveDate>()
        .map_err(|e| invalid("plannedDate", format!("{}: {e}", cloud.planned_date)))?;
    let meal_period = cloud
        .meal_period
        .parse()
        .map_err(|e| invalid("mealPeriod", e))?;
    let status = cloud.status.parse().map_err(|e| invalid("status", e))?;

    Ok((planned_date, meal_period, status))
}

// --------------------------------------------------------------- profiles

/// Maps a profile to its redacted cloud form.
///
/// Name, birth date, allergies, weight and height are never emitted.
pub fn baby_to_cloud(entity: &BabyEntity) -> Result<CloudBaby, MappingError> {
    Ok(CloudBaby {
        cloud_id: require_cloud_id(EntityKind::Baby, &entity.meta)?,
        gender: entity.gender.clone(),
        preferences: entity.preferences.iter().map(preference_to_cloud).collect(),
        nutrition_goal: entity.nutrition_goal.as_ref().map(goal_to_cloud),
        avatar_url: entity.avatar_url.clone(),
        created_at: entity.created_at,
        updated_at: entity.updated_at,
        version: entity.meta.version,
        is_deleted: entity.meta.is_deleted,
    })
}

/// Merges a remote profile into the existing local row, keeping every
/// private field from `existing`.
pub fn merge_baby(cloud: &CloudBaby, existing: &BabyEntity, now: i64) -> BabyEntity {
    let mut entity = existing.clone();
    apply_cloud_baby(&mut entity, cloud);
    entity.meta = merged_metadata(&existing.meta, &cloud.cloud_id, cloud.version, now);
    entity
}

/// Fields of a profile that only ever live on the device.
#[derive(Debug, Clone, PartialEq)]
pub struct BabyPrivateFields {
    /// Name.
    pub name: String,
    /// Birth date.
    pub birth_date: NaiveDate,
    /// Allergies.
    pub allergies: Vec<String>,
    /// Weight in kg.
    pub weight: Option<f32>,
    /// Height in cm.
    pub height: Option<f32>,
}

/// Adopts a remote profile that has no local row, once the user has
/// supplied its private fields.
pub fn baby_from_cloud(cloud: &CloudBaby, private: BabyPrivateFields, now: i64) -> BabyEntity {
    let mut entity = BabyEntity::new(private.name, private.birth_date);
    entity.allergies = private.allergies;
    entity.weight = private.weight;
    entity.height = private.height;
    entity.meta = SyncMetadata::synced(cloud.cloud_id.clone(), cloud.version, now);
    apply_cloud_baby(&mut entity, cloud);
    entity
}

fn apply_cloud_baby(entity: &mut BabyEntity, cloud: &CloudBaby) {
    entity.gender = cloud.gender.clone();
    entity.preferences = cloud.preferences.iter().map(preference_from_cloud).collect();
    entity.nutrition_goal = cloud.nutrition_goal.as_ref().map(goal_from_cloud);
    entity.avatar_url = cloud.avatar_url.clone();
    entity.created_at = cloud.created_at;
    entity.updated_at = cloud.updated_at;
}

fn preference_to_cloud(item: &PreferenceItem) -> CloudPreferenceItem {
    CloudPreferenceItem {
        ingredient: item.ingredient.clone(),
        expiry_date: item.expiry_date.clone(),
    }
}

fn preference_from_cloud(item: &CloudPreferenceItem) -> PreferenceItem {
    PreferenceItem {
        ingredient: item.ingredient.clone(),
        expiry_date: item.expiry_date.clone(),
    }
}

fn goal_to_cloud(goal: &NutritionGoal) -> CloudNutritionGoal {
    CloudNutritionGoal {
        calories: goal.calories,
        protein: goal.protein,
        calcium: goal.calcium,
        iron: goal.iron,
    }
}

fn goal_from_cloud(goal: &CloudNutritionGoal) -> NutritionGoal {
    NutritionGoal {
        calories: goal.calories,
        protein: goal.protein,
        calcium: goal.calcium,
        iron: goal.iron,
    }
}

// ------------------------------------------------------------ dispatching

/// A cloud payload that can be applied to the local store.
///
/// Lets the orchestrator run one pull routine over all three kinds.
pub trait CloudPayload: Send + Sync {
    /// Local entity type.
    type Entity: Syncable;

    /// Remote identity.
    fn cloud_id(&self) -> &str;

    /// Remote version.
    fn version(&self) -> u32;

    /// Remote tombstone flag.
    fn is_deleted(&self) -> bool;

    /// Builds the local entity, merging into `existing` when there is one.
    fn to_local(
        &self,
        existing: Option<&Self::Entity>,
        ids: &IdMap,
        now: i64,
    ) -> Result<Self::Entity, MappingError>;
}

impl CloudPayload for CloudRecipe {
    type Entity = RecipeEntity;

    fn cloud_id(&self) -> &str {
        &self.cloud_id
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    fn to_local(
        &self,
        existing: Option<&RecipeEntity>,
        _ids: &IdMap,
        now: i64,
    ) -> Result<RecipeEntity, MappingError> {
        Ok(match existing {
            Some(existing) => merge_recipe(self, existing, now),
            None => recipe_from_cloud(self, now),
        })
    }
}

impl CloudPayload for CloudPlan {
    type Entity = PlanEntity;

    fn cloud_id(&self) -> &str {
        &self.cloud_id
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    fn to_local(
        &self,
        existing: Option<&PlanEntity>,
        ids: &IdMap,
        now: i64,
    ) -> Result<PlanEntity, MappingError> {
        match existing {
            Some(existing) => merge_plan(self, existing, ids, now),
            None => plan_from_cloud(self, ids, now),
        }
    }
}

impl CloudPayload for CloudBaby {
    type Entity = BabyEntity;

    fn cloud_id(&self) -> &str {
        &self.cloud_id
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    fn to_local(
        &self,
        existing: Option<&BabyEntity>,
        _ids: &IdMap,
        now: i64,
    ) -> Result<BabyEntity, MappingError> {
        match existing {
            Some(existing) => Ok(merge_baby(self, existing, now)),
            None => Err(MappingError::ProfileRequiresLocalData {
                cloud_id: self.cloud_id.clone(),
            }),
        }
    }
}
