//! Transport layer abstraction for sync calls.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use pawlog_sync_protocol::{SyncRequest, SyncResponse};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A sync transport carries one sync call to the server.
///
/// This trait abstracts the network layer so the coordinator can run
/// against HTTP, an in-process server, or a scripted fake.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Sends the batch and checkpoint, returning the server's answer.
    async fn sync(&self, request: &SyncRequest) -> SyncResult<SyncResponse>;
}

#[async_trait]
impl<T: SyncTransport + ?Sized> SyncTransport for Arc<T> {
    async fn sync(&self, request: &SyncRequest) -> SyncResult<SyncResponse> {
        (**self).sync(request).await
    }
}

/// A scripted transport for testing.
///
/// Returns queued results in order and records every request it sees.
/// With an empty queue it answers with a protocol error.
#[derive(Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<SyncResult<SyncResponse>>>,
    requests: Mutex<Vec<SyncRequest>>,
    calls: AtomicUsize,
    delay: Mutex<Option<Duration>>,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a result.
    pub fn push_result(&self, result: SyncResult<SyncResponse>) {
        self.script.lock().push_back(result);
    }

    /// Queues a successful response.
    pub fn push_response(&self, response: SyncResponse) {
        self.push_result(Ok(response));
    }

    /// Makes every call wait this long before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Number of calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<SyncRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl SyncTransport for MockTransport {
    async fn sync(&self, request: &SyncRequest) -> SyncResult<SyncResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| Err(SyncError::Protocol("no mock response queued".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pawlog_sync_protocol::OwnerId;

    fn empty_response() -> SyncResponse {
        SyncResponse {
            inserted_count: 0,
            inserted: Vec::new(),
            duplicate_idempotency_keys: Vec::new(),
            rejected: Vec::new(),
            server_changes: Vec::new(),
            synced_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn mock_transport_replays_script_in_order() {
        let transport = MockTransport::new();
        transport.push_result(Err(SyncError::Timeout));
        transport.push_response(empty_response());

        let request = SyncRequest::new(OwnerId::new("pet"), None, Vec::new());
        assert!(matches!(
            transport.sync(&request).await,
            Err(SyncError::Timeout)
        ));
        assert!(transport.sync(&request).await.is_ok());
        assert!(matches!(
            transport.sync(&request).await,
            Err(SyncError::Protocol(_))
        ));
        assert_eq!(transport.calls(), 3);
        assert_eq!(transport.requests()[0].owner_id, OwnerId::new("pet"));
    }

    #[tokio::test]
    async fn shared_transport_delegates() {
        let transport = Arc::new(MockTransport::new());
        transport.push_response(empty_response());
        let request = SyncRequest::new(OwnerId::new("pet"), None, Vec::new());
        assert!(SyncTransport::sync(&transport, &request).await.is_ok());
        assert_eq!(transport.calls(), 1);
    }
}
