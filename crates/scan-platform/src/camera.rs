use std::{collections::BTreeSet, sync::Arc};

use scan_core::{
    CameraCapability, CameraSelection, DecodeCandidate, DecoderEngine, FocusMode, NativeType,
    ScanError, ViewportBounds,
};
use thiserror::Error;

/// Opaque identifier for an opened camera device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CameraHandle(pub u64);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CameraSurfaceError {
    #[error("camera unavailable: {0}")]
    Unavailable(String),
    #[error("camera backend failure: {0}")]
    Backend(String),
    #[error("camera was closed")]
    Closed,
}

impl From<CameraSurfaceError> for ScanError {
    fn from(err: CameraSurfaceError) -> Self {
        ScanError::camera_unavailable(err.to_string())
    }
}

/// Result of asking a surface to fit a new viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayoutOutcome {
    /// Viewport updated in place; capture keeps running.
    Applied,
    /// The platform needs the capture pipeline closed and reopened.
    RestartRequired,
}

/// Push-based decode candidate callback. Each call carries one frame batch in decoder order.
pub type CandidateSink = Arc<dyn Fn(Vec<DecodeCandidate>) + Send + Sync>;

/// Platform camera backend (ZXing view, AVFoundation session, ...).
///
/// All methods may block on native calls; callers keep them off latency-critical threads.
pub trait CameraSurface: Send + Sync {
    fn engine(&self) -> DecoderEngine;

    fn open_camera(&self, selection: CameraSelection) -> Result<CameraHandle, CameraSurfaceError>;

    fn probe_capability(&self, handle: CameraHandle)
    -> Result<CameraCapability, CameraSurfaceError>;

    fn set_focus_mode(&self, handle: CameraHandle, mode: FocusMode)
    -> Result<(), CameraSurfaceError>;

    /// Enable or suppress focus-state callbacks from the device.
    fn set_focus_callbacks(&self, handle: CameraHandle, enabled: bool);

    fn start_capture(
        &self,
        handle: CameraHandle,
        accepted: &BTreeSet<NativeType>,
        sink: CandidateSink,
    ) -> Result<(), CameraSurfaceError>;

    fn is_capturing(&self, handle: CameraHandle) -> bool;

    fn stop_capture(&self, handle: CameraHandle);

    fn relayout(
        &self,
        handle: CameraHandle,
        bounds: ViewportBounds,
    ) -> Result<RelayoutOutcome, CameraSurfaceError>;

    fn close_camera(&self, handle: CameraHandle);

    fn lock_configuration(&self, handle: CameraHandle) -> Result<(), CameraSurfaceError>;

    fn unlock_configuration(&self, handle: CameraHandle);

    fn set_flash_mode(&self, handle: CameraHandle, on: bool);

    fn set_torch_mode(&self, handle: CameraHandle, on: bool);

    fn flash_mode(&self, handle: CameraHandle) -> bool;

    fn torch_mode(&self, handle: CameraHandle) -> bool;
}

/// Held device configuration lock, released on drop.
pub struct ConfigurationLock<'a> {
    surface: &'a dyn CameraSurface,
    handle: CameraHandle,
}

impl<'a> ConfigurationLock<'a> {
    pub fn acquire(
        surface: &'a dyn CameraSurface,
        handle: CameraHandle,
    ) -> Result<Self, CameraSurfaceError> {
        surface.lock_configuration(handle)?;
        Ok(Self { surface, handle })
    }
}

impl Drop for ConfigurationLock<'_> {
    fn drop(&mut self) {
        self.surface.unlock_configuration(self.handle);
    }
}
