//! Cloud representations of syncable entities.
//!
//! These are the redacted, network-facing forms. Anything that must not
//! leave the device simply has no field here.

use serde::{Deserialize, Serialize};

/// Cloud form of a recipe. Recipes carry no sensitive data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudRecipe {
    /// Remote identity.
    pub cloud_id: String,
    /// Recipe name.
    pub name: String,
    /// Minimum suitable age in months.
    pub min_age_months: u32,
    /// Maximum suitable age in months.
    pub max_age_months: u32,
    /// Ingredient list.
    #[serde(default)]
    pub ingredients: Vec<CloudIngredient>,
    /// Preparation steps.
    #[serde(default)]
    pub steps: Vec<String>,
    /// Nutrition facts.
    pub nutrition: CloudNutrition,
    /// Category label.
    pub category: String,
    /// Whether the recipe ships with the app.
    #[serde(default)]
    pub is_built_in: bool,
    /// Image URL.
    #[serde(default)]
    pub image_url: Option<String>,
    /// Creation time (epoch ms).
    pub created_at: i64,
    /// Last update time (epoch ms).
    pub updated_at: i64,
    /// Entity version.
    pub version: u32,
    /// Tombstone flag.
    #[serde(default)]
    pub is_deleted: bool,
}

/// Cloud form of an ingredient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudIngredient {
    /// Ingredient name.
    pub name: String,
    /// Amount, free text.
    #[serde(default)]
    pub amount: Option<String>,
    /// Unit of the amount.
    #[serde(default)]
    pub unit: Option<String>,
}

/// Cloud form of nutrition facts.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudNutrition {
    /// Energy in kcal.
    pub calories: f32,
    /// Protein in grams.
    pub protein: f32,
    /// Fat in grams.
    pub fat: f32,
    /// Carbohydrates in grams.
    pub carbohydrates: f32,
    /// Fiber in grams.
    #[serde(default)]
    pub fiber: Option<f32>,
    /// Calcium in mg.
    #[serde(default)]
    pub calcium: Option<f32>,
    /// Iron in mg.
    #[serde(default)]
    pub iron: Option<f32>,
    /// Zinc in mg.
    #[serde(default)]
    pub zinc: Option<f32>,
}

/// Cloud form of a scheduled meal.
///
/// Local foreign keys never travel; the plan refers to its recipe and
/// profile by cloud id only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudPlan {
    /// Remote identity.
    pub cloud_id: String,
    /// Cloud id of the profile this plan belongs to.
    #[serde(default)]
    pub cloud_baby_id: Option<String>,
    /// Cloud id of the planned recipe.
    pub cloud_recipe_id: String,
    /// ISO-8601 date.
    pub planned_date: String,
    /// Meal period name (`BREAKFAST`, `LUNCH`, `DINNER`, `SNACK`).
    pub meal_period: String,
    /// Plan status name (`PLANNED`, `TRIED`, `SKIPPED`).
    pub status: String,
    /// Free-form notes.
    #[serde(default)]
    pub notes: Option<String>,
    /// Creation time (epoch ms).
    pub created_at: i64,
    /// Last update time (epoch ms).
    pub updated_at: i64,
    /// Entity version.
    pub version: u32,
    /// Tombstone flag.
    #[serde(default)]
    pub is_deleted: bool,
}

/// Cloud form of a child profile.
///
/// Deliberately carries no name, birth date, allergy list, weight or height.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudBaby {
    /// Remote identity.
    pub cloud_id: String,
    /// Gender.
    #[serde(default)]
    pub gender: Option<String>,
    /// Preferred ingredients.
    #[serde(default)]
    pub preferences: Vec<CloudPreferenceItem>,
    /// Nutrition targets.
    #[serde(default)]
    pub nutrition_goal: Option<CloudNutritionGoal>,
    /// Avatar URL.
    #[serde(default)]
    pub avatar_url: Option<String>,
    /// Creation time (epoch ms).
    pub created_at: i64,
    /// Last update time (epoch ms).
    pub updated_at: i64,
    /// Entity version.
    pub version: u32,
    /// Tombstone flag.
    #[serde(default)]
    pub is_deleted: bool,
}

/// A preferred ingredient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudPreferenceItem {
    /// Ingredient name.
    pub ingredient: String,
    /// Date after which the preference lapses.
    #[serde(default)]
    pub expiry_date: Option<String>,
}

/// Daily nutrition targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudNutritionGoal {
    /// Energy in kcal.
    pub calories: f32,
    /// Protein in grams.
    pub protein: f32,
    /// Calcium in mg.
    pub calcium: f32,
    /// Iron in mg.
    pub iron: f32,
}
