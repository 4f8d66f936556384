use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::SessionState;

/// Broad error category used for host-facing handling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ScanErrorCategory {
    /// Camera permission was refused.
    Permission,
    /// Camera could not be opened or failed while running.
    Camera,
    /// Flash/torch control failed.
    Flash,
    /// Decoder produced something the session could not accept.
    Decode,
    /// Invalid host configuration.
    Config,
    /// Internal bug or invariant break.
    Internal,
}

/// Stable scan error payload reported across the host boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("{category:?}:{code}: {message}")]
pub struct ScanError {
    /// High-level error category.
    pub category: ScanErrorCategory,
    /// Stable machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

/// Message carried by the error outcome when a denial is reported to the host.
pub const PERMISSION_NOT_GRANTED: &str = "PERMISSION_NOT_GRANTED";

impl ScanError {
    /// Construct a new scan error.
    pub fn new(
        category: ScanErrorCategory,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
        }
    }

    /// The user refused camera access.
    pub fn permission_denied() -> Self {
        Self::new(
            ScanErrorCategory::Permission,
            "permission_denied",
            "camera permission was denied",
        )
    }

    /// The camera could not be acquired or failed mid-session.
    pub fn camera_unavailable(message: impl Into<String>) -> Self {
        Self::new(ScanErrorCategory::Camera, "camera_unavailable", message)
    }

    /// A decode candidate arrived after the session had already resolved.
    pub fn candidate_after_resolution() -> Self {
        Self::new(
            ScanErrorCategory::Decode,
            "candidate_after_resolution",
            "decode candidate arrived after the session resolved",
        )
    }

    /// Any other input after the session had already resolved.
    pub fn session_resolved(action: impl Into<String>) -> Self {
        let action = action.into();
        Self::new(
            ScanErrorCategory::Internal,
            "session_resolved",
            format!("cannot run '{action}' after the session resolved"),
        )
    }

    /// Build a standard invalid-state-transition error.
    pub fn invalid_state(current: SessionState, action: impl Into<String>) -> Self {
        let action = action.into();
        Self::new(
            ScanErrorCategory::Internal,
            "invalid_state_transition",
            format!("cannot run '{action}' while session is in state {current:?}"),
        )
    }

    /// Internal failure such as a panicked worker thread.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ScanErrorCategory::Internal, "internal", message)
    }

    /// `true` when the session can continue or the host may retry.
    pub fn recoverable(&self) -> bool {
        matches!(
            self.category,
            ScanErrorCategory::Permission | ScanErrorCategory::Flash
        )
    }

    /// `true` for errors produced by input arriving after resolution.
    pub fn is_after_resolution(&self) -> bool {
        self.code == "session_resolved" || self.code == "candidate_after_resolution"
    }
}

/// Local, non-fatal flash control failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FlashError {
    /// The device lacks a flash unit or torch mode.
    #[error("flash is not supported by this camera")]
    Unsupported,
    /// The device configuration lock could not be acquired.
    #[error("could not lock camera configuration: {0}")]
    LockFailed(String),
    /// No camera is open.
    #[error("no camera is open")]
    NoDevice,
    /// The session is not scanning.
    #[error("session is not scanning")]
    SessionInactive,
    /// The worker running the flash change did not complete.
    #[error("flash change interrupted: {0}")]
    Interrupted(String),
}

impl From<FlashError> for ScanError {
    fn from(err: FlashError) -> Self {
        let code = match &err {
            FlashError::Unsupported => "flash_unsupported",
            FlashError::LockFailed(_) => "flash_lock_failed",
            FlashError::NoDevice => "flash_no_device",
            FlashError::SessionInactive => "flash_session_inactive",
            FlashError::Interrupted(_) => "flash_interrupted",
        };
        Self::new(ScanErrorCategory::Flash, code, err.to_string())
    }
}
