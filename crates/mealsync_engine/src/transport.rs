//! Remote client abstraction for sync operations.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use mealsync_protocol::{PullResponse, PushRequest, PushResponse};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// A remote client handles network communication with the sync server.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, in-process loopback, mock for testing).
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Fetches every remote change newer than `last_sync_time`, or
    /// everything when it is `None`.
    async fn pull(&self, last_sync_time: Option<i64>) -> SyncResult<PullResponse>;

    /// Uploads a batch of local changes.
    async fn push(&self, request: &PushRequest) -> SyncResult<PushResponse>;
}

/// A scripted remote for testing.
///
/// Responses are sticky: once set they are returned for every call until
/// replaced. Queued failures are consumed first, one per call.
#[derive(Debug)]
pub struct MockRemote {
    connected: AtomicBool,
    pull_response: Mutex<Option<PullResponse>>,
    push_response: Mutex<Option<PushResponse>>,
    pull_failures: Mutex<VecDeque<SyncError>>,
    push_failures: Mutex<VecDeque<SyncError>>,
    delay: Mutex<Option<Duration>>,
    pull_calls: Mutex<Vec<Option<i64>>>,
    pushed: Mutex<Vec<PushRequest>>,
}

impl MockRemote {
    /// Creates a new mock remote.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            pull_response: Mutex::new(None),
            push_response: Mutex::new(None),
            pull_failures: Mutex::new(VecDeque::new()),
            push_failures: Mutex::new(VecDeque::new()),
            delay: Mutex::new(None),
            pull_calls: Mutex::new(Vec::new()),
            pushed: Mutex::new(Vec::new()),
        }
    }

    /// Sets the pull response.
    pub fn set_pull_response(&self, response: PullResponse) {
        *self.pull_response.lock() = Some(response);
    }

    /// Sets the push response.
    pub fn set_push_response(&self, response: PushResponse) {
        *self.push_response.lock() = Some(response);
    }

    /// Makes the next pull fail with `error`.
    pub fn fail_next_pull(&self, error: SyncError) {
        self.pull_failures.lock().push_back(error);
    }

    /// Makes the next push fail with `error`.
    pub fn fail_next_push(&self, error: SyncError) {
        self.push_failures.lock().push_back(error);
    }

    /// Delays every call by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Checkpoints passed to every pull so far.
    pub fn pull_calls(&self) -> Vec<Option<i64>> {
        self.pull_calls.lock().clone()
    }

    /// Every push request received so far.
    pub fn pushed(&self) -> Vec<PushRequest> {
        self.pushed.lock().clone()
    }

    async fn before_call(&self) -> SyncResult<()> {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if !self.connected.load(Ordering::SeqCst) {
            return Err(SyncError::transport_retryable("not connected"));
        }
        Ok(())
    }
}

impl Default for MockRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteClient for MockRemote {
    async fn pull(&self, last_sync_time: Option<i64>) -> SyncResult<PullResponse> {
        self.pull_calls.lock().push(last_sync_time);
        self.before_call().await?;

        let failure = self.pull_failures.lock().pop_front();
        if let Some(error) = failure {
            return Err(error);
        }
        self.pull_response
            .lock()
            .clone()
            .ok_or_else(|| SyncError::Protocol("no mock pull response set".into()))
    }

    async fn push(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        self.pushed.lock().push(request.clone());
        self.before_call().await?;

        let failure = self.push_failures.lock().pop_front();
        if let Some(error) = failure {
            return Err(error);
        }
        self.push_response
            .lock()
            .clone()
            .ok_or_else(|| SyncError::Protocol("no mock push response set".into()))
    }
}
