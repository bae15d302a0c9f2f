//! Scripted in-memory transport.
//!
//! Routes are keyed by canonical key. Requests can be held open with
//! [`MemoryTransport::hold`] to exercise in-flight behavior deterministically.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use pagewarp_core::Key;

use super::{Request, Response, Transport, TransportError};

#[derive(Debug, Clone)]
enum Reply {
    Page(Bytes),
    Status(u16, Bytes),
    Network(String),
}

#[derive(Debug, Default)]
pub struct MemoryTransport {
    routes: Mutex<HashMap<Key, Reply>>,
    gates: Mutex<HashMap<Key, Arc<Semaphore>>>,
    latency: Mutex<Option<Duration>>,
    requests: Mutex<Vec<Request>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `document` for `key`.
    pub fn page(&self, key: &str, document: impl Into<String>) -> &Self {
        self.routes.lock().insert(Key::from(key), Reply::Page(Bytes::from(document.into())));
        self
    }

    /// Answer `key` with a non-success status.
    pub fn status(&self, key: &str, status: u16) -> &Self {
        self.error_page(key, status, "")
    }

    /// Answer `key` with a non-success status and an error document.
    pub fn error_page(&self, key: &str, status: u16, document: impl Into<String>) -> &Self {
        let body = Bytes::from(document.into());
        self.routes.lock().insert(Key::from(key), Reply::Status(status, body));
        self
    }

    /// Fail `key` before any response arrives.
    pub fn network_error(&self, key: &str, message: &str) -> &Self {
        self.routes.lock().insert(Key::from(key), Reply::Network(message.to_string()));
        self
    }

    /// Delay every response by `latency`.
    pub fn latency(&self, latency: Duration) -> &Self {
        *self.latency.lock() = Some(latency);
        self
    }

    /// Keep requests for `key` open until [`release`](Self::release).
    pub fn hold(&self, key: &str) {
        self.gates.lock().insert(Key::from(key), Arc::new(Semaphore::new(0)));
    }

    /// Let held requests for `key` complete. No-op when not held.
    pub fn release(&self, key: &str) {
        if let Some(gate) = self.gates.lock().remove(key) {
            gate.close();
        }
    }

    /// Keys requested so far, in order.
    pub fn requested(&self) -> Vec<Key> {
        self.requests.lock().iter().map(|r| r.key.clone()).collect()
    }

    pub fn request_count(&self, key: &str) -> usize {
        self.requests.lock().iter().filter(|r| r.key.as_str() == key).count()
    }

    pub fn total_requests(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn last_request(&self) -> Option<Request> {
        self.requests.lock().last().cloned()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn get(&self, request: Request) -> Result<Response, TransportError> {
        tracing::trace!(key = %request.key, kind = %request.kind, "memory transport request");
        self.requests.lock().push(request.clone());

        let gate = self.gates.lock().get(&request.key).cloned();
        if let Some(gate) = gate {
            // closed on release
            let _ = gate.acquire().await;
        }

        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let reply = self.routes.lock().get(&request.key).cloned();
        match reply {
            Some(Reply::Page(body)) => Ok(Response { final_url: request.url, status: 200, body, fetch_ms: 0 }),
            Some(Reply::Status(status, body)) => Err(TransportError::Status { status, bytes: body.len() as u64 }),
            Some(Reply::Network(message)) => Err(TransportError::Network(message)),
            None => Err(TransportError::Status { status: 404, bytes: 0 }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagewarp_core::VisitKind;
    use url::Url;

    fn request(key: &str) -> Request {
        let url = Url::parse("https://example.com").unwrap().join(key).unwrap();
        Request::new(Key::from(key), url, VisitKind::Visit, "test")
    }

    #[tokio::test]
    async fn test_serves_routes() {
        let transport = MemoryTransport::new();
        transport.page("/about", "<title>About</title>").status("/gone", 410).error_page("/oops", 500, "oops");

        let response = transport.get(request("/about")).await.unwrap();
        assert_eq!(response.text(), "<title>About</title>");
        let gone = TransportError::Status { status: 410, bytes: 0 };
        assert_eq!(transport.get(request("/gone")).await.unwrap_err(), gone);
        let oops = TransportError::Status { status: 500, bytes: 4 };
        assert_eq!(transport.get(request("/oops")).await.unwrap_err(), oops);
        let missing = TransportError::Status { status: 404, bytes: 0 };
        assert_eq!(transport.get(request("/missing")).await.unwrap_err(), missing);
        assert_eq!(transport.total_requests(), 4);
    }

    #[tokio::test]
    async fn test_hold_and_release() {
        let transport = Arc::new(MemoryTransport::new());
        transport.page("/slow", "ok");
        transport.hold("/slow");

        let task = {
            let transport = Arc::clone(&transport);
            tokio::spawn(async move { transport.get(request("/slow")).await })
        };
        tokio::task::yield_now().await;
        assert!(!task.is_finished());

        transport.release("/slow");
        assert!(task.await.unwrap().is_ok());
        assert_eq!(transport.request_count("/slow"), 1);
    }
}
