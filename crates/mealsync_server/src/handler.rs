//! Request handlers for sync endpoints.

use crate::config::ServerConfig;
use crate::documents::DocumentStore;
use crate::error::ServerResult;
use mealsync_protocol::{PullResponse, PushRequest, PushResponse};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Context for request handling.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Document store (shared across all handlers).
    pub documents: Arc<DocumentStore>,
    pulls: AtomicU64,
    pushes: AtomicU64,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(config: ServerConfig, documents: Arc<DocumentStore>) -> Self {
        Self {
            config,
            documents,
            pulls: AtomicU64::new(0),
            pushes: AtomicU64::new(0),
        }
    }

    /// Number of pull requests served.
    pub fn pull_count(&self) -> u64 {
        self.pulls.load(Ordering::Relaxed)
    }

    /// Number of push requests served.
    pub fn push_count(&self) -> u64 {
        self.pushes.load(Ordering::Relaxed)
    }
}

/// Handler for sync requests.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Handles a pull request.
    pub fn handle_pull(&self, last_sync_time: Option<i64>) -> ServerResult<PullResponse> {
        self.context.pulls.fetch_add(1, Ordering::Relaxed);
        let limit = self.context.config.max_pull_batch as usize;

        let response = self.context.documents.changes_since(last_sync_time, limit);
        debug!(
            since = ?last_sync_time,
            documents = response.len(),
            server_time = response.server_time,
            "pull served"
        );
        Ok(response)
    }

    /// Handles a push request.
    ///
    /// Batches over the configured limit are answered with `success: false`
    /// and nothing is written.
    pub fn handle_push(&self, request: PushRequest) -> ServerResult<PushResponse> {
        self.context.pushes.fetch_add(1, Ordering::Relaxed);
        let max = self.context.config.max_push_batch as usize;

        if request.len() > max {
            warn!(documents = request.len(), max, "push batch too large");
            return Ok(PushResponse::rejected(
                self.context.documents.server_time(),
                format!("too many documents: {} > {}", request.len(), max),
            ));
        }

        let summary = self.context.documents.apply(request);
        info!(
            accepted = summary.accepted,
            conflicts = summary.conflicts.len(),
            "push applied"
        );

        if summary.conflicts.is_empty() {
            Ok(PushResponse::success(summary.server_time))
        } else {
            Ok(PushResponse::with_conflicts(
                summary.server_time,
                summary.conflicts,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mealsync_protocol::{CloudBaby, EntityKind};

    fn baby(cloud_id: &str, version: u32) -> CloudBaby {
        CloudBaby {
            cloud_id: cloud_id.to_string(),
            gender: Some("female".to_string()),
            preferences: Vec::new(),
            nutrition_goal: None,
            avatar_url: None,
            created_at: 10,
            updated_at: 10,
            version,
            is_deleted: false,
        }
    }

    fn create_handler(config: ServerConfig) -> (RequestHandler, Arc<HandlerContext>) {
        let context = Arc::new(HandlerContext::new(config, Arc::new(DocumentStore::new())));
        (RequestHandler::new(Arc::clone(&context)), context)
    }

    #[test]
    fn pull_empty() {
        let (handler, context) = create_handler(ServerConfig::default());
        let response = handler.handle_pull(None).unwrap();

        assert!(response.is_empty());
        assert_eq!(context.pull_count(), 1);
    }

    #[test]
    fn push_then_pull() {
        let (handler, context) = create_handler(ServerConfig::default());
        let request = PushRequest {
            babies: vec![baby("baby_1", 1)],
            ..PushRequest::default()
        };

        let response = handler.handle_push(request).unwrap();
        assert!(response.success);
        assert!(response.conflicts.is_empty());
        assert_eq!(context.documents.version_of(EntityKind::Baby, "baby_1"), Some(2));

        let pulled = handler.handle_pull(None).unwrap();
        assert_eq!(pulled.babies.len(), 1);
        assert!(pulled.server_time >= response.server_time);
    }

    #[test]
    fn push_reports_conflicts() {
        let (handler, _) = create_handler(ServerConfig::default());
        let first = PushRequest {
            babies: vec![baby("baby_1", 1)],
            ..PushRequest::default()
        };
        handler.handle_push(first).unwrap();

        let stale = PushRequest {
            babies: vec![baby("baby_1", 1)],
            ..PushRequest::default()
        };
        let response = handler.handle_push(stale).unwrap();

        assert!(response.success);
        assert_eq!(response.conflicts.len(), 1);
        assert_eq!(response.conflicts[0].local_version, 1);
        assert_eq!(response.conflicts[0].remote_version, 2);
    }

    #[test]
    fn push_too_large() {
        let (handler, context) = create_handler(ServerConfig::new().with_max_push_batch(1));
        let request = PushRequest {
            babies: vec![baby("baby_1", 1), baby("baby_2", 1)],
            ..PushRequest::default()
        };

        let response = handler.handle_push(request).unwrap();
        assert!(!response.success);
        assert!(response.message.unwrap().contains("too many"));
        assert!(context.documents.is_empty());
        assert_eq!(context.push_count(), 1);
    }
}
