//! Mock ReloadClient for unit testing
//!
//! Records every reload call in memory so tests can assert on how many
//! signals were sent and when, without a running endpoint.

use crate::error::ReloadError;
use crate::reload_trait::ReloadClientTrait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

/// Mock ReloadClient for testing
///
/// Call instants come from `tokio::time`, so they follow paused test time.
#[derive(Debug, Clone)]
pub struct MockReloadClient {
    endpoint: String,
    calls: Arc<Mutex<Vec<Instant>>>,
    failing: Arc<AtomicBool>,
}

impl MockReloadClient {
    /// Create a mock that answers every reload with `200`
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            calls: Arc::new(Mutex::new(Vec::new())),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a mock whose endpoint is unreachable
    pub fn unreachable(endpoint: impl Into<String>) -> Self {
        let mock = Self::new(endpoint);
        mock.set_failing(true);
        mock
    }

    /// Switch between answering and failing every call
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of reload calls received so far, failed ones included
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Instants at which reload calls were received
    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ReloadClientTrait for MockReloadClient {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn reload(&self) -> Result<u16, ReloadError> {
        self.calls.lock().unwrap().push(Instant::now());
        if self.failing.load(Ordering::SeqCst) {
            return Err(ReloadError::Unavailable(format!(
                "connection refused: {}",
                self.endpoint
            )));
        }
        Ok(200)
    }
}
