//! Reload endpoint client
//!
//! Sends the bodiless `POST /-/reload` that Prometheus-family servers (the
//! Thanos ruler among them) accept as a signal to re-read their rule files.

use crate::error::ReloadError;
use crate::reload_trait::ReloadClientTrait;
use reqwest::{Client, Url};
use std::time::Duration;
use tracing::debug;

/// Default reload endpoint of a Thanos ruler running in the same pod.
pub const DEFAULT_RELOAD_URL: &str = "http://localhost:10902/-/reload";

/// Upper bound for a single reload request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Reload endpoint client
#[derive(Debug, Clone)]
pub struct ReloadClient {
    client: Client,
    endpoint: Url,
}

impl ReloadClient {
    /// Create a new reload client
    ///
    /// # Arguments
    /// * `endpoint` - Full reload URL (e.g., "http://localhost:10902/-/reload")
    pub fn new(endpoint: &str) -> Result<Self, ReloadError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| ReloadError::InvalidEndpoint(format!("{endpoint}: {e}")))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(ReloadError::InvalidEndpoint(format!(
                "{endpoint}: unsupported scheme {}",
                endpoint.scheme()
            )));
        }

        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self { client, endpoint })
    }

    /// Send one reload signal.
    ///
    /// # Returns
    /// * `Ok(status)` - A response was received; the status code is not inspected
    /// * `Err(ReloadError)` - The request could not be sent or no response arrived
    pub async fn reload(&self) -> Result<u16, ReloadError> {
        debug!("Sending reload request to {}", self.endpoint);

        let response = self
            .client
            .post(self.endpoint.clone())
            .send()
            .await
            .map_err(classify_transport_error)?;

        // The response is dropped here, releasing its body whatever the status.
        let status = response.status().as_u16();
        debug!("Reload endpoint {} answered with status {}", self.endpoint, status);
        Ok(status)
    }
}

fn classify_transport_error(e: reqwest::Error) -> ReloadError {
    if e.is_timeout() {
        ReloadError::Timeout(e.to_string())
    } else if e.is_connect() {
        ReloadError::Unavailable(e.to_string())
    } else {
        ReloadError::Http(e)
    }
}

#[async_trait::async_trait]
impl ReloadClientTrait for ReloadClient {
    fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    async fn reload(&self) -> Result<u16, ReloadError> {
        ReloadClient::reload(self).await
    }
}
