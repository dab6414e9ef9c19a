//! Local media acquisition seam
//!
//! Camera/microphone capture lives outside the core. The orchestrator only
//! asks for an opaque handle, reacts to success or failure, and hands the
//! handle back when the session ends.

use crate::types::{CallKind, MediaHandle};
use async_trait::async_trait;
use thiserror::Error;

/// Media acquisition errors
#[derive(Error, Debug, Clone)]
pub enum MediaError {
    /// The user denied the capture permission prompt
    #[error("capture permission denied: {0}")]
    PermissionDenied(String),

    /// No suitable capture device is available
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),
}

/// Provider of local audio-video capture
///
/// `acquire` may prompt the user and take arbitrarily long; the orchestrator
/// never blocks its dispatch loop on it. `release` is called exactly once
/// for every handle the core stops holding, including handles that resolve
/// after the session they were requested for has already ended.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Request local capture for a call kind
    async fn acquire(&self, kind: CallKind) -> Result<MediaHandle, MediaError>;

    /// Return a handle the core no longer holds
    fn release(&self, handle: MediaHandle);
}
