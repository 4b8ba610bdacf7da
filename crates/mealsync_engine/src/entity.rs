//! Syncable entities and their sync metadata.
//!
//! Every entity that takes part in sync embeds a [`SyncMetadata`] and
//! implements [`Syncable`]. The store seam works on [`Record`], which wraps
//! the three concrete kinds.

use chrono::NaiveDate;
use mealsync_protocol::EntityKind;
use std::fmt;
use std::str::FromStr;

/// Store-assigned local identity (auto-increment).
pub type LocalId = i64;

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Sync status of a single entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncStatus {
    /// Never leaves the device.
    LocalOnly,
    /// Has local changes the remote has not seen.
    PendingUpload,
    /// Matches the remote as of `last_sync_time`.
    Synced,
    /// Waiting for a user decision on a version conflict.
    Conflict,
}

/// Sync bookkeeping carried by every syncable entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncMetadata {
    /// Remote identity; absent until the first push.
    pub cloud_id: Option<String>,
    /// Drives which entities a push selects.
    pub sync_status: SyncStatus,
    /// When this entity was last reconciled (epoch ms).
    pub last_sync_time: Option<i64>,
    /// Last remote-confirmed version, starting at 1.
    pub version: u32,
    /// Soft-delete tombstone.
    pub is_deleted: bool,
    /// Remote version a deferred conflict was raised against.
    pub conflict_version: Option<u32>,
}

impl SyncMetadata {
    /// Metadata for an entity created locally.
    pub fn new_local() -> Self {
        Self {
            cloud_id: None,
            sync_status: SyncStatus::PendingUpload,
            last_sync_time: None,
            version: 1,
            is_deleted: false,
            conflict_version: None,
        }
    }

    /// Metadata for an entity that must never be pushed.
    pub fn local_only() -> Self {
        Self {
            sync_status: SyncStatus::LocalOnly,
            ..Self::new_local()
        }
    }

    /// Metadata for an entity materialized from the remote.
    pub fn synced(cloud_id: impl Into<String>, version: u32, now: i64) -> Self {
        Self {
            cloud_id: Some(cloud_id.into()),
            sync_status: SyncStatus::Synced,
            last_sync_time: Some(now),
            version: version.max(1),
            is_deleted: false,
            conflict_version: None,
        }
    }

    /// Records a local edit.
    ///
    /// The version is left alone: it names the remote version the edit is
    /// based on, which is what the remote checks on push.
    pub fn mark_modified(&mut self) {
        if self.sync_status != SyncStatus::LocalOnly {
            self.sync_status = SyncStatus::PendingUpload;
        }
    }

    /// Turns the entity into a tombstone awaiting propagation.
    pub fn mark_deleted(&mut self) {
        self.is_deleted = true;
        self.mark_modified();
    }

    /// Applies a remote acknowledgement of a push.
    pub fn mark_pushed(&mut self, now: i64) {
        self.sync_status = SyncStatus::Synced;
        self.last_sync_time = Some(now);
        self.version = self.version.saturating_add(1);
        self.conflict_version = None;
    }

    /// Raises the version to at least `remote_version`.
    pub fn observe_version(&mut self, remote_version: u32) {
        self.version = self.version.max(remote_version);
    }
}

impl Default for SyncMetadata {
    fn default() -> Self {
        Self::new_local()
    }
}

/// Capability shared by every entity that takes part in sync.
pub trait Syncable: Clone + Send + Sync + 'static {
    /// Entity kind.
    const KIND: EntityKind;

    /// Store-assigned local id (0 before insert).
    fn local_id(&self) -> LocalId;

    /// Sets the local id.
    fn set_local_id(&mut self, id: LocalId);

    /// Sync metadata.
    fn metadata(&self) -> &SyncMetadata;

    /// Mutable sync metadata.
    fn metadata_mut(&mut self) -> &mut SyncMetadata;

    /// Last local or remote update time (epoch ms).
    fn updated_at(&self) -> i64;

    /// Sets the creation and update timestamps.
    fn stamp(&mut self, created_at: Option<i64>, updated_at: i64);

    /// Wraps the entity into a [`Record`].
    fn into_record(self) -> Record;

    /// Unwraps a [`Record`] of the matching kind.
    fn from_record(record: Record) -> Option<Self>;
}

/// Meal period of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MealPeriod {
    /// Breakfast.
    Breakfast,
    /// Lunch.
    Lunch,
    /// Dinner.
    Dinner,
    /// Snack.
    Snack,
}

impl MealPeriod {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            MealPeriod::Breakfast => "BREAKFAST",
            MealPeriod::Lunch => "LUNCH",
            MealPeriod::Dinner => "DINNER",
            MealPeriod::Snack => "SNACK",
        }
    }
}

impl FromStr for MealPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BREAKFAST" => Ok(MealPeriod::Breakfast),
            "LUNCH" => Ok(MealPeriod::Lunch),
            "DINNER" => Ok(MealPeriod::Dinner),
            "SNACK" => Ok(MealPeriod::Snack),
            other => Err(format!("unknown meal period: {other}")),
        }
    }
}

impl fmt::Display for MealPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PlanStatus {
    /// Scheduled.
    #[default]
    Planned,
    /// Served.
    Tried,
    /// Dropped.
    Skipped,
}

impl PlanStatus {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Planned => "PLANNED",
            PlanStatus::Tried => "TRIED",
            PlanStatus::Skipped => "SKIPPED",
        }
    }
}

impl FromStr for PlanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PLANNED" => Ok(PlanStatus::Planned),
            "TRIED" => Ok(PlanStatus::Tried),
            "SKIPPED" => Ok(PlanStatus::Skipped),
            other => Err(format!("unknown plan status: {other}")),
        }
    }
}

/// An ingredient line.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Ingredient {
    /// Name.
    pub name: String,
    /// Amount, free text.
    pub amount: Option<String>,
    /// Unit.
    pub unit: Option<String>,
}

/// Nutrition facts per serving.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Nutrition {
    /// Energy in kcal.
    pub calories: f32,
    /// Protein in grams.
    pub protein: f32,
    /// Fat in grams.
    pub fat: f32,
    /// Carbohydrates in grams.
    pub carbohydrates: f32,
    /// Fiber in grams.
    pub fiber: Option<f32>,
    /// Calcium in mg.
    pub calcium: Option<f32>,
    /// Iron in mg.
    pub iron: Option<f32>,
    /// Zinc in mg.
    pub zinc: Option<f32>,
}

/// A recipe.
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeEntity {
    /// Local id.
    pub id: LocalId,
    /// Name.
    pub name: String,
    /// Minimum age in months.
    pub min_age_months: u32,
    /// Maximum age in months.
    pub max_age_months: u32,
    /// Ingredients.
    pub ingredients: Vec<Ingredient>,
    /// Steps.
    pub steps: Vec<String>,
    /// Nutrition facts.
    pub nutrition: Nutrition,
    /// Category.
    pub category: String,
    /// Ships with the app.
    pub is_built_in: bool,
    /// Image URL.
    pub image_url: Option<String>,
    /// Cooking time; device-only.
    pub cooking_time_minutes: Option<u32>,
    /// Creation time (epoch ms).
    pub created_at: i64,
    /// Update time (epoch ms).
    pub updated_at: i64,
    /// Sync metadata.
    pub meta: SyncMetadata,
}

impl RecipeEntity {
    /// Creates an unsaved recipe.
    pub fn new(name: impl Into<String>, min_age_months: u32, max_age_months: u32) -> Self {
        Self {
            id: 0,
            name: name.into(),
            min_age_months,
            max_age_months,
            ingredients: Vec::new(),
            steps: Vec::new(),
            nutrition: Nutrition::default(),
            category: String::new(),
            is_built_in: false,
            image_url: None,
            cooking_time_minutes: None,
            created_at: 0,
            updated_at: 0,
            meta: SyncMetadata::new_local(),
        }
    }
}

/// A meal scheduled for a profile.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanEntity {
    /// Local id.
    pub id: LocalId,
    /// Local id of the profile.
    pub baby_id: Option<LocalId>,
    /// Local id of the recipe.
    pub recipe_id: LocalId,
    /// Day of the meal.
    pub planned_date: NaiveDate,
    /// Meal period.
    pub meal_period: MealPeriod,
    /// Progress.
    pub status: PlanStatus,
    /// Notes.
    pub notes: Option<String>,
    /// Custom meal time (`HH:mm`); device-only.
    pub meal_time: Option<String>,
    /// Cloud id of the profile, once known.
    pub cloud_baby_id: Option<String>,
    /// Cloud id of the recipe, once known.
    pub cloud_recipe_id: Option<String>,
    /// Creation time (epoch ms).
    pub created_at: i64,
    /// Update time (epoch ms).
    pub updated_at: i64,
    /// Sync metadata.
    pub meta: SyncMetadata,
}

impl PlanEntity {
    /// Creates an unsaved plan.
    pub fn new(recipe_id: LocalId, planned_date: NaiveDate, meal_period: MealPeriod) -> Self {
        Self {
            id: 0,
            baby_id: None,
            recipe_id,
            planned_date,
            meal_period,
            status: PlanStatus::Planned,
            notes: None,
            meal_time: None,
            cloud_baby_id: None,
            cloud_recipe_id: None,
            created_at: 0,
            updated_at: 0,
            meta: SyncMetadata::new_local(),
        }
    }

    /// Sets the profile the plan belongs to.
    pub fn for_baby(mut self, baby_id: LocalId) -> Self {
        self.baby_id = Some(baby_id);
        self
    }
}

/// A preferred ingredient.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PreferenceItem {
    /// Ingredient name.
    pub ingredient: String,
    /// Date after which the preference lapses.
    pub expiry_date: Option<String>,
}

/// Daily nutrition targets.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NutritionGoal {
    /// Energy in kcal.
    pub calories: f32,
    /// Protein in grams.
    pub protein: f32,
    /// Calcium in mg.
    pub calcium: f32,
    /// Iron in mg.
    pub iron: f32,
}

/// A child profile.
///
/// `name`, `birth_date`, `allergies`, `weight` and `height` never leave the
/// device.
#[derive(Debug, Clone, PartialEq)]
pub struct BabyEntity {
    /// Local id.
    pub id: LocalId,
    /// Name.
    pub name: String,
    /// Birth date.
    pub birth_date: NaiveDate,
    /// Known allergies.
    pub allergies: Vec<String>,
    /// Weight in kg.
    pub weight: Option<f32>,
    /// Height in cm.
    pub height: Option<f32>,
    /// Gender.
    pub gender: Option<String>,
    /// Preferred ingredients.
    pub preferences: Vec<PreferenceItem>,
    /// Nutrition targets.
    pub nutrition_goal: Option<NutritionGoal>,
    /// Avatar URL.
    pub avatar_url: Option<String>,
    /// Creation time (epoch ms).
    pub created_at: i64,
    /// Update time (epoch ms).
    pub updated_at: i64,
    /// Sync metadata.
    pub meta: SyncMetadata,
}

impl BabyEntity {
    /// Creates an unsaved profile.
    pub fn new(name: impl Into<String>, birth_date: NaiveDate) -> Self {
        Self {
            id: 0,
            name: name.into(),
            birth_date,
            allergies: Vec::new(),
            weight: None,
            height: None,
            gender: None,
            preferences: Vec::new(),
            nutrition_goal: None,
            avatar_url: None,
            created_at: 0,
            updated_at: 0,
            meta: SyncMetadata::new_local(),
        }
    }
}

macro_rules! impl_syncable {
    ($ty:ty, $kind:expr, $variant:ident) => {
        impl Syncable for $ty {
            const KIND: EntityKind = $kind;

            fn local_id(&self) -> LocalId {
                self.id
            }

            fn set_local_id(&mut self, id: LocalId) {
                self.id = id;
            }

            fn metadata(&self) -> &SyncMetadata {
                &self.meta
            }

            fn metadata_mut(&mut self) -> &mut SyncMetadata {
                &mut self.meta
            }

            fn updated_at(&self) -> i64 {
                self.updated_at
            }

            fn stamp(&mut self, created_at: Option<i64>, updated_at: i64) {
                if let Some(created_at) = created_at {
                    self.created_at = created_at;
                }
                self.updated_at = updated_at;
            }

            fn into_record(self) -> Record {
                Record::$variant(self)
            }

            fn from_record(record: Record) -> Option<Self> {
                match record {
                    Record::$variant(entity) => Some(entity),
                    _ => None,
                }
            }
        }
    };
}

impl_syncable!(RecipeEntity, EntityKind::Recipe, Recipe);
impl_syncable!(PlanEntity, EntityKind::Plan, Plan);
impl_syncable!(BabyEntity, EntityKind::Baby, Baby);

/// A stored row of any syncable kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// A recipe row.
    Recipe(RecipeEntity),
    /// A plan row.
    Plan(PlanEntity),
    /// A profile row.
    Baby(BabyEntity),
}

macro_rules! dispatch {
    ($self:expr, $entity:ident => $body:expr) => {
        match $self {
            Record::Recipe($entity) => $body,
            Record::Plan($entity) => $body,
            Record::Baby($entity) => $body,
        }
    };
}

impl Record {
    /// Kind of the wrapped entity.
    pub fn kind(&self) -> EntityKind {
        match self {
            Record::Recipe(_) => EntityKind::Recipe,
            Record::Plan(_) => EntityKind::Plan,
            Record::Baby(_) => EntityKind::Baby,
        }
    }

    /// Local id.
    pub fn local_id(&self) -> LocalId {
        dispatch!(self, e => e.local_id())
    }

    /// Sets the local id.
    pub fn set_local_id(&mut self, id: LocalId) {
        dispatch!(self, e => e.set_local_id(id))
    }

    /// Sync metadata.
    pub fn metadata(&self) -> &SyncMetadata {
        dispatch!(self, e => e.metadata())
    }

    /// Mutable sync metadata.
    pub fn metadata_mut(&mut self) -> &mut SyncMetadata {
        dispatch!(self, e => e.metadata_mut())
    }

    /// Update time (epoch ms).
    pub fn updated_at(&self) -> i64 {
        dispatch!(self, e => e.updated_at())
    }

    /// Sets the creation and update timestamps.
    pub fn stamp(&mut self, created_at: Option<i64>, updated_at: i64) {
        dispatch!(self, e => e.stamp(created_at, updated_at))
    }

    /// Remote identity, if assigned.
    pub fn cloud_id(&self) -> Option<&str> {
        self.metadata().cloud_id.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_local_metadata() {
        let meta = SyncMetadata::new_local();
        assert_eq!(meta.sync_status, SyncStatus::PendingUpload);
        assert_eq!(meta.cloud_id, None);
        assert_eq!(meta.version, 1);
        assert!(!meta.is_deleted);
    }

    #[test]
    fn edit_after_sync_goes_back_to_pending() {
        let mut meta = SyncMetadata::synced("recipe_1", 3, 100);
        meta.mark_modified();

        assert_eq!(meta.sync_status, SyncStatus::PendingUpload);
        assert_eq!(meta.version, 3);
        assert_eq!(meta.cloud_id.as_deref(), Some("recipe_1"));
    }

    #[test]
    fn local_only_stays_local_only() {
        let mut meta = SyncMetadata::local_only();
        meta.mark_modified();
        assert_eq!(meta.sync_status, SyncStatus::LocalOnly);

        meta.mark_deleted();
        assert!(meta.is_deleted);
        assert_eq!(meta.sync_status, SyncStatus::LocalOnly);
    }

    #[test]
    fn push_ack_bumps_version() {
        let mut meta = SyncMetadata::new_local();
        meta.cloud_id = Some("plan_1".into());
        meta.mark_pushed(42);

        assert_eq!(meta.sync_status, SyncStatus::Synced);
        assert_eq!(meta.version, 2);
        assert_eq!(meta.last_sync_time, Some(42));
    }

    #[test]
    fn observe_version_never_decreases() {
        let mut meta = SyncMetadata::synced("baby_1", 5, 0);
        meta.observe_version(3);
        assert_eq!(meta.version, 5);
        meta.observe_version(8);
        assert_eq!(meta.version, 8);
    }

    #[test]
    fn record_dispatch() {
        let mut record = RecipeEntity::new("Oat porridge", 6, 36).into_record();
        assert_eq!(record.kind(), EntityKind::Recipe);

        record.set_local_id(7);
        record.metadata_mut().cloud_id = Some("recipe_x".into());
        assert_eq!(record.local_id(), 7);
        assert_eq!(record.cloud_id(), Some("recipe_x"));

        assert!(PlanEntity::from_record(record.clone()).is_none());
        let recipe = RecipeEntity::from_record(record).unwrap();
        assert_eq!(recipe.name, "Oat porridge");
    }
}
