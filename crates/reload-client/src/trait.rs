//! ReloadClient trait for mocking
//!
//! Abstracts the reload endpoint so the controller can be driven by a mock
//! in unit tests. The concrete `ReloadClient` implements this trait.

use crate::error::ReloadError;

/// Trait for reload endpoint operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ReloadClientTrait: Send + Sync {
    /// The endpoint reload requests are sent to
    fn endpoint(&self) -> &str;

    /// Send one reload signal.
    ///
    /// Returns the HTTP status code of whatever response came back. The status
    /// is informational: any response counts as a delivered signal.
    async fn reload(&self) -> Result<u16, ReloadError>;
}
