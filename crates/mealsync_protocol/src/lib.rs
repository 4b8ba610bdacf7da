//! # MealSync Sync Protocol
//!
//! Wire types and JSON codec for the MealSync sync protocol.
//!
//! This crate provides:
//! - Cloud payloads (`CloudRecipe`, `CloudPlan`, `CloudBaby`)
//! - Protocol messages (`PullResponse`, `PushRequest`, `PushResponse`)
//! - `ConflictInfo` as reported by the remote on push
//! - Conflict policies and resolutions
//! - JSON encoding/decoding
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cloud;
mod codec;
mod conflict;
mod messages;

pub use cloud::{
    CloudBaby, CloudIngredient, CloudNutrition, CloudNutritionGoal, CloudPlan,
    CloudPreferenceItem, CloudRecipe,
};
pub use codec::{decode, encode, CodecError, CodecResult};
pub use conflict::{ConflictInfo, ConflictPolicy, ConflictResolution, EntityKind};
pub use messages::{PullResponse, PushRequest, PushResponse};
