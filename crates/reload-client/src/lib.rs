//! Reload Endpoint Client
//!
//! A small client for the `/-/reload` control endpoint exposed by the Thanos
//! ruler (and other Prometheus-family servers).
//!
//! # Example
//!
//! ```no_run
//! use reload_client::{ReloadClient, DEFAULT_RELOAD_URL};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ReloadClient::new(DEFAULT_RELOAD_URL)?;
//!
//! // Any response counts as a delivered signal
//! let status = client.reload().await?;
//! println!("reload endpoint answered {status}");
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
#[path = "trait.rs"]
pub mod reload_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::{ReloadClient, DEFAULT_RELOAD_URL, REQUEST_TIMEOUT};
pub use error::ReloadError;
pub use reload_trait::ReloadClientTrait;
#[cfg(feature = "test-util")]
pub use mock::MockReloadClient;
