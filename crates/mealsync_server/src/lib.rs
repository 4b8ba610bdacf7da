//! # MealSync Sync Server
//!
//! Reference in-memory sync server for MealSync.
//!
//! This crate provides:
//! - Pull and push endpoints (`GET /sync/pull`, `POST /sync/push`)
//! - A versioned document store with a monotonic server clock
//! - Optimistic-concurrency conflict detection
//!
//! # Protocol
//!
//! A document is accepted when it is new or when the client sends the
//! version the server holds; the stored version then becomes one more than
//! the client's. Any other version is reported back as a conflict and the
//! stored copy is left untouched.
//!
//! Every accepted write is stamped with the server clock. A pull returns the
//! documents stamped after the client's checkpoint together with a new
//! checkpoint (`serverTime`).

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod documents;
mod error;
mod handler;
mod server;

pub use config::ServerConfig;
pub use documents::{DocumentStore, WriteSummary};
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler};
pub use server::SyncServer;
