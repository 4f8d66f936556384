use serde::{Deserialize, Serialize};

use crate::types::CameraCapability;

/// Focus mode requested from the camera.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FocusMode {
    /// Continuous-picture autofocus.
    ContinuousPicture,
    /// Simple one-shot autofocus.
    Auto,
}

/// Focus configuration chosen once per camera acquisition.
///
/// Policy order: continuous autofocus, then simple autofocus with focus-state
/// callbacks suppressed, then no autofocus at all.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum FocusPlan {
    /// Continuous-picture autofocus, focus callbacks forwarded.
    Continuous,
    /// Simple autofocus; focus-state callbacks are suppressed because the
    /// hardware cannot honour them reliably.
    AutoWithCallbacksSuppressed,
    /// No usable autofocus (or the capability probe failed).
    #[default]
    Disabled,
}

impl FocusPlan {
    /// Pick the plan for a probed capability set.
    pub fn for_capability(capability: &CameraCapability) -> Self {
        if capability.supports_continuous_autofocus {
            Self::Continuous
        } else if capability.supports_auto_focus_mode {
            Self::AutoWithCallbacksSuppressed
        } else {
            Self::Disabled
        }
    }

    /// Pick the plan from a probe result; any probe failure disables autofocus.
    pub fn from_probe<E>(probe: &Result<CameraCapability, E>) -> Self {
        match probe {
            Ok(capability) => Self::for_capability(capability),
            Err(_) => Self::Disabled,
        }
    }

    /// Mode to program into the camera, `None` to leave it untouched.
    pub fn focus_mode(self) -> Option<FocusMode> {
        match self {
            Self::Continuous => Some(FocusMode::ContinuousPicture),
            Self::AutoWithCallbacksSuppressed => Some(FocusMode::Auto),
            Self::Disabled => None,
        }
    }

    /// Whether focus-state callbacks from the camera should reach the engine.
    pub fn forwards_focus_callbacks(self) -> bool {
        matches!(self, Self::Continuous)
    }
}
