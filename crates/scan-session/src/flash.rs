use scan_core::FlashError;
use scan_platform::ConfigurationLock;
use tracing::debug;

use crate::camera::CameraLifecycle;

/// Flash/torch control for the session's open camera.
#[derive(Clone)]
pub struct FlashController {
    camera: CameraLifecycle,
}

impl FlashController {
    pub fn new(camera: CameraLifecycle) -> Self {
        Self { camera }
    }

    /// Whether the open camera can show a flash toggle at all.
    pub fn is_available(&self) -> bool {
        self.camera
            .capability()
            .is_some_and(|capability| capability.has_torch)
    }

    /// Switch flash and torch together under the device configuration lock.
    ///
    /// Fails with `Unsupported` before touching the device unless it reports both a flash
    /// unit and torch mode. The lock is released on every path once acquired.
    pub fn set_flash(&self, on: bool) -> Result<(), FlashError> {
        let (handle, capability) = self.camera.open_device().ok_or(FlashError::NoDevice)?;
        if !capability.supports_flash_control() {
            return Err(FlashError::Unsupported);
        }

        let surface = self.camera.surface().as_ref();
        let _lock = ConfigurationLock::acquire(surface, handle)
            .map_err(|err| FlashError::LockFailed(err.to_string()))?;
        surface.set_flash_mode(handle, on);
        surface.set_torch_mode(handle, on);
        debug!(?handle, on, "flash updated");
        Ok(())
    }

    /// `true` when either flash or torch reads as active.
    pub fn is_on(&self) -> bool {
        let Some(handle) = self.camera.handle() else {
            return false;
        };
        let surface = self.camera.surface();
        surface.flash_mode(handle) || surface.torch_mode(handle)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use scan_core::{CameraCapability, CameraSelection, DecoderEngine};
    use scan_platform::{SimulatedCamera, SurfaceCall};

    use super::*;

    async fn open_flash(camera: &SimulatedCamera) -> FlashController {
        let lifecycle = CameraLifecycle::new(Arc::new(camera.clone()));
        lifecycle
            .open(CameraSelection::Back)
            .await
            .expect("open should work");
        FlashController::new(lifecycle)
    }

    #[tokio::test]
    async fn toggles_flash_and_torch_under_lock() {
        let camera = SimulatedCamera::new(DecoderEngine::AvFoundation);
        let flash = open_flash(&camera).await;

        flash.set_flash(true).expect("flash on should work");
        assert!(flash.is_on());

        let calls = camera.calls();
        let lock = calls
            .iter()
            .position(|call| matches!(call, SurfaceCall::Lock(_)))
            .expect("lock recorded");
        let torch = calls
            .iter()
            .position(|call| matches!(call, SurfaceCall::SetTorch(_, true)))
            .expect("torch recorded");
        let unlock = calls
            .iter()
            .position(|call| matches!(call, SurfaceCall::Unlock(_)))
            .expect("unlock recorded");
        assert!(lock < torch && torch < unlock);

        flash.set_flash(false).expect("flash off should work");
        assert!(!flash.is_on());
    }

    #[tokio::test]
    async fn unsupported_without_flash_unit() {
        let camera = SimulatedCamera::new(DecoderEngine::AvFoundation).with_capability(
            CameraCapability {
                has_flash: false,
                has_torch: true,
                ..CameraCapability::default()
            },
        );
        let flash = open_flash(&camera).await;

        assert_eq!(flash.set_flash(true), Err(FlashError::Unsupported));
        assert!(!flash.is_on());
        assert!(
            !camera
                .calls()
                .iter()
                .any(|call| matches!(call, SurfaceCall::Lock(_) | SurfaceCall::SetFlash(..)))
        );
        assert!(flash.is_available());
    }

    #[tokio::test]
    async fn lock_failure_mutates_nothing() {
        let camera = SimulatedCamera::new(DecoderEngine::ZXing).with_lock_failure("busy");
        let flash = open_flash(&camera).await;

        let err = flash.set_flash(true).expect_err("lock must fail");
        assert!(matches!(err, FlashError::LockFailed(_)));
        assert!(!flash.is_on());
        assert!(
            !camera
                .calls()
                .iter()
                .any(|call| matches!(call, SurfaceCall::SetFlash(..) | SurfaceCall::SetTorch(..)))
        );
    }

    #[tokio::test]
    async fn needs_an_open_camera() {
        let camera = SimulatedCamera::new(DecoderEngine::ZXing);
        let flash = FlashController::new(CameraLifecycle::new(Arc::new(camera)));
        assert_eq!(flash.set_flash(true), Err(FlashError::NoDevice));
        assert!(!flash.is_on());
        assert!(!flash.is_available());
    }
}
