//! # MealSync Sync Engine
//!
//! Offline-first synchronization of recipes, meal plans and child profiles
//! between an on-device store and a remote document service.
//!
//! This crate provides:
//! - Sync orchestrator (idle → syncing → success / error)
//! - Entity mapper with redaction of device-only profile fields
//! - Local ↔ cloud id mapping
//! - Conflict detection and resolution policies
//! - Retry with exponential backoff, timeouts and cancellation
//! - HTTP remote abstraction and a loopback client for tests
//! - Local / remote / hybrid execution strategy selection
//!
//! ## Architecture
//!
//! A cycle is **pull-then-push**:
//! 1. Pull remote changes since the checkpoint and merge them locally
//!    (recipes, then profiles, then plans)
//! 2. Push every `PendingUpload` row in one batch
//! 3. Resolve the conflicts the remote reported
//!
//! ## Key Invariants
//!
//! - Entity versions never decrease
//! - At most one cycle runs per engine
//! - Local-only rows are never pushed
//! - Private profile fields never leave the device
//! - The checkpoint advances once per applied pull batch

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod entity;
mod error;
mod http;
mod id_map;
pub mod mapper;
mod resolver;
mod state;
mod store;
mod strategy;
mod transport;

pub use config::{RetryConfig, SyncConfig};
pub use engine::SyncEngine;
pub use entity::{
    now_millis, BabyEntity, Ingredient, LocalId, MealPeriod, Nutrition, NutritionGoal, PlanEntity,
    PlanStatus, PreferenceItem, RecipeEntity, Record, SyncMetadata, SyncStatus, Syncable,
};
pub use error::{SyncError, SyncResult};
pub use http::{HttpClient, HttpRemote, LoopbackClient, LoopbackServer};
pub use id_map::IdMap;
pub use mapper::{BabyPrivateFields, CloudPayload, MappingError};
pub use resolver::{ConflictResolver, ResolvedConflict};
pub use state::{
    EntityError, SyncOutcome, SyncReport, SyncState, SyncStats, PROGRESS_PULL, PROGRESS_PUSH,
    PROGRESS_RESOLVE, PROGRESS_START,
};
pub use store::{LocalStore, MemoryStore};
pub use strategy::{
    execute, execute_filtered, Capability, ExecutionMode, StrategyError, StrategyResult,
    StrategySelector,
};
pub use transport::{MockRemote, RemoteClient};
