//! Main sync server.

use crate::config::ServerConfig;
use crate::documents::DocumentStore;
use crate::error::{ServerError, ServerResult};
use crate::handler::{HandlerContext, RequestHandler};
use mealsync_protocol::{decode, encode, EntityKind, PullResponse, PushRequest, PushResponse};
use std::sync::Arc;
use tracing::debug;

const PULL_PATH: &str = "/sync/pull";
const PUSH_PATH: &str = "/sync/push";
const CHECKPOINT_PARAM: &str = "lastSyncTime";

/// The sync server.
///
/// Holds the authoritative copy of every synced document and answers the
/// pull and push endpoints. It has no socket of its own: an HTTP front end
/// or an in-process transport forwards requests to [`SyncServer::handle_request`].
///
/// # Example
///
/// ```
/// use mealsync_server::{ServerConfig, SyncServer};
///
/// let server = SyncServer::new(ServerConfig::default());
/// let body = server.handle_request("GET", "/sync/pull", &[]).unwrap();
/// assert!(!body.is_empty());
/// ```
pub struct SyncServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
}

impl SyncServer {
    /// Creates a new sync server.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_documents(config, Arc::new(DocumentStore::new()))
    }

    /// Creates a sync server over an existing document store.
    pub fn with_documents(config: ServerConfig, documents: Arc<DocumentStore>) -> Self {
        let context = Arc::new(HandlerContext::new(config, documents));
        let handler = RequestHandler::new(Arc::clone(&context));

        Self { handler, context }
    }

    /// Handles a pull request.
    pub fn handle_pull(&self, last_sync_time: Option<i64>) -> Result<PullResponse, String> {
        self.handler
            .handle_pull(last_sync_time)
            .map_err(|e| e.to_string())
    }

    /// Handles a push request.
    pub fn handle_push(&self, request: PushRequest) -> Result<PushResponse, String> {
        self.handler.handle_push(request).map_err(|e| e.to_string())
    }

    /// Routes a raw request to its endpoint.
    ///
    /// - `GET /sync/pull[?lastSyncTime=<ms>]`
    /// - `POST /sync/push` with a JSON [`PushRequest`] body
    ///
    /// Errors carry the HTTP status in front of the message.
    pub fn handle_request(&self, method: &str, path: &str, body: &[u8]) -> Result<Vec<u8>, String> {
        debug!(method, path, bytes = body.len(), "request");
        self.route(method, path, body)
            .map_err(|e| format!("{} {}", e.status(), e))
    }

    fn route(&self, method: &str, path: &str, body: &[u8]) -> ServerResult<Vec<u8>> {
        let (route, query) = match path.split_once('?') {
            Some((route, query)) => (route, Some(query)),
            None => (path, None),
        };

        match (method, route) {
            ("GET", PULL_PATH) => {
                let since = parse_checkpoint(query)?;
                let response = self.handler.handle_pull(since)?;
                Ok(encode(&response)?)
            }
            ("POST", PUSH_PATH) => {
                let request: PushRequest = decode(body)?;
                let response = self.handler.handle_push(request)?;
                Ok(encode(&response)?)
            }
            (_, PULL_PATH) | (_, PUSH_PATH) => Err(ServerError::MethodNotAllowed {
                method: method.to_string(),
                path: route.to_string(),
            }),
            _ => Err(ServerError::NotFound(route.to_string())),
        }
    }

    /// Returns the stored version of a document.
    pub fn version_of(&self, kind: EntityKind, cloud_id: &str) -> Option<u32> {
        self.context.documents.version_of(kind, cloud_id)
    }

    /// Returns the number of stored documents of one kind.
    pub fn document_count(&self, kind: EntityKind) -> usize {
        self.context.documents.count(kind)
    }

    /// Returns the document store.
    pub fn documents(&self) -> &Arc<DocumentStore> {
        &self.context.documents
    }

    /// Returns the number of pull requests served.
    pub fn pull_count(&self) -> u64 {
        self.context.pull_count()
    }

    /// Returns the number of push requests served.
    pub fn push_count(&self) -> u64 {
        self.context.push_count()
    }
}

fn parse_checkpoint(query: Option<&str>) -> ServerResult<Option<i64>> {
    let Some(query) = query else {
        return Ok(None);
    };
    for pair in query.split('&') {
        if let Some((key, value)) = pair.split_once('=') {
            if key == CHECKPOINT_PARAM {
                return value.parse().map(Some).map_err(|_| {
                    ServerError::InvalidRequest(format!("{CHECKPOINT_PARAM} is not a number: {value}"))
                });
            }
        }
    }
    Ok(None)
}
