//! HTTP remote client.
//!
//! The actual HTTP library is abstracted behind [`HttpClient`] so the
//! engine does not pick one for the application. Bodies are JSON.

use crate::error::{SyncError, SyncResult};
use crate::transport::RemoteClient;
use async_trait::async_trait;
use mealsync_protocol::{decode, encode, PullResponse, PushRequest, PushResponse};
use parking_lot::RwLock;

/// HTTP client abstraction.
///
/// Implement this trait over reqwest, hyper or any other HTTP stack.
/// `Err` means no response was obtained; it is treated as retryable.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a GET request and returns the response body.
    async fn get(&self, url: &str) -> Result<Vec<u8>, String>;

    /// Sends a POST request with a JSON body and returns the response body.
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, String>;
}

/// Remote client speaking the sync protocol over HTTP.
///
/// - pull: `GET {base}/sync/pull?lastSyncTime={ms}`, parameter omitted on
///   the first pull
/// - push: `POST {base}/sync/push`
pub struct HttpRemote<C: HttpClient> {
    base_url: String,
    client: C,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpRemote<C> {
    /// Creates a new HTTP remote.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            last_error: RwLock::new(None),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the last transport error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// URL of the pull endpoint for a checkpoint.
    pub fn pull_url(&self, last_sync_time: Option<i64>) -> String {
        match last_sync_time {
            Some(checkpoint) => format!("{}/sync/pull?lastSyncTime={}", self.base_url, checkpoint),
            None => format!("{}/sync/pull", self.base_url),
        }
    }

    fn record<T>(&self, result: Result<T, String>) -> SyncResult<T> {
        match result {
            Ok(value) => {
                *self.last_error.write() = None;
                Ok(value)
            }
            Err(e) => {
                *self.last_error.write() = Some(e.clone());
                Err(SyncError::transport_retryable(e))
            }
        }
    }
}

#[async_trait]
impl<C: HttpClient> RemoteClient for HttpRemote<C> {
    async fn pull(&self, last_sync_time: Option<i64>) -> SyncResult<PullResponse> {
        let url = self.pull_url(last_sync_time);
        let body = self.record(self.client.get(&url).await)?;
        Ok(decode(&body)?)
    }

    async fn push(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        let url = format!("{}/sync/push", self.base_url);
        let body = encode(request)?;
        let response = self.record(self.client.post(&url, body).await)?;
        Ok(decode(&response)?)
    }
}

/// Trait for servers that can answer requests in-process.
pub trait LoopbackServer: Send + Sync {
    /// Handles a request. `path` includes the query string.
    fn handle(&self, method: &str, path: &str, body: &[u8]) -> Result<Vec<u8>, String>;
}

/// An HTTP client that routes requests directly to a server in the same
/// process.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }

    fn path(url: &str) -> &str {
        url.find("/sync/").map(|i| &url[i..]).unwrap_or(url)
    }
}

#[async_trait]
impl<S: LoopbackServer> HttpClient for LoopbackClient<S> {
    async fn get(&self, url: &str) -> Result<Vec<u8>, String> {
        self.server.handle("GET", Self::path(url), &[])
    }

    async fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, String> {
        self.server.handle("POST", Self::path(url), &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct TestClient {
        response: Mutex<Option<Vec<u8>>>,
        urls: Mutex<Vec<String>>,
    }

    impl TestClient {
        fn set_response(&self, body: Vec<u8>) {
            *self.response.lock() = Some(body);
        }

        fn reply(&self, url: &str) -> Result<Vec<u8>, String> {
            self.urls.lock().push(url.to_string());
            self.response
                .lock()
                .clone()
                .ok_or_else(|| "connection refused".to_string())
        }
    }

    #[async_trait]
    impl HttpClient for TestClient {
        async fn get(&self, url: &str) -> Result<Vec<u8>, String> {
            self.reply(url)
        }

        async fn post(&self, url: &str, _body: Vec<u8>) -> Result<Vec<u8>, String> {
            self.reply(url)
        }
    }

    #[test]
    fn pull_url_omits_missing_checkpoint() {
        let remote = HttpRemote::new("https://sync.example.com/", TestClient::default());
        assert_eq!(remote.base_url(), "https://sync.example.com");
        assert_eq!(remote.pull_url(None), "https://sync.example.com/sync/pull");
        assert_eq!(
            remote.pull_url(Some(1_700_000_000_000)),
            "https://sync.example.com/sync/pull?lastSyncTime=1700000000000"
        );
    }

    #[tokio::test]
    async fn pull_decodes_json() {
        let client = TestClient::default();
        client.set_response(encode(&PullResponse::empty(99)).unwrap());
        let remote = HttpRemote::new("https://sync.example.com", client);

        let response = remote.pull(Some(5)).await.unwrap();
        assert_eq!(response.server_time, 99);
        assert_eq!(
            remote.client.urls.lock().as_slice(),
            ["https://sync.example.com/sync/pull?lastSyncTime=5"]
        );
    }

    #[tokio::test]
    async fn client_failure_is_retryable() {
        let remote = HttpRemote::new("https://sync.example.com", TestClient::default());

        let err = remote.push(&PushRequest::default()).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(remote.last_error().as_deref(), Some("connection refused"));
    }

    #[tokio::test]
    async fn garbage_body_is_protocol_error() {
        let client = TestClient::default();
        client.set_response(b"<html>bad gateway</html>".to_vec());
        let remote = HttpRemote::new("https://sync.example.com", client);

        let err = remote.pull(None).await.unwrap_err();
        assert!(matches!(err, SyncError::Protocol(_)));
        assert_eq!(remote.last_error(), None);
    }

    struct EchoServer;

    impl LoopbackServer for EchoServer {
        fn handle(&self, method: &str, path: &str, _body: &[u8]) -> Result<Vec<u8>, String> {
            Ok(format!("{method} {path}").into_bytes())
        }
    }

    #[tokio::test]
    async fn loopback_strips_host() {
        let client = LoopbackClient::new(EchoServer);
        let body = client
            .get("memory://local/sync/pull?lastSyncTime=3")
            .await
            .unwrap();
        assert_eq!(body, b"GET /sync/pull?lastSyncTime=3");
    }
}
