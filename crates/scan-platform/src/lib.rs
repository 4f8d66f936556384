//! Platform collaborators for scan sessions.
//!
//! The session runtime depends only on the traits here; each platform backend
//! (ZXing view, AVFoundation session, simulated) provides its own implementation.

pub mod camera;
pub mod overlay;
pub mod permission;
pub mod simulated;

use std::sync::Arc;

pub use camera::{
    CameraHandle, CameraSurface, CameraSurfaceError, CandidateSink, ConfigurationLock,
    RelayoutOutcome,
};
pub use overlay::{OverlayCall, RecordingOverlay, ViewfinderOverlay};
pub use permission::{PermissionPrompt, PermissionReply, ScriptedPermissionPrompt};
pub use simulated::{CaptureQueryHook, SimulatedCamera, SurfaceCall};

/// Collaborators a scan session is wired to.
#[derive(Clone)]
pub struct ScanPlatform {
    pub camera: Arc<dyn CameraSurface>,
    pub permissions: Arc<dyn PermissionPrompt>,
    pub overlay: Arc<dyn ViewfinderOverlay>,
}

impl ScanPlatform {
    pub fn new(
        camera: Arc<dyn CameraSurface>,
        permissions: Arc<dyn PermissionPrompt>,
        overlay: Arc<dyn ViewfinderOverlay>,
    ) -> Self {
        Self {
            camera,
            permissions,
            overlay,
        }
    }
}
