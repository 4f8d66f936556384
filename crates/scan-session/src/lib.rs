//! Scan session runtime.
//!
//! Wires the pure session contract from `scan-core` to the platform collaborators from
//! `scan-platform`: it gates on camera permission, drives the camera lifecycle, controls
//! the flash, and resolves each session exactly once.

pub mod camera;
pub mod controller;
pub mod flash;
pub mod permission;

use scan_core::{EventStream, FlashError, ScanConfiguration, ScanOutcome, SessionState};
use scan_platform::ScanPlatform;
use tokio::task::JoinHandle;
use tracing::warn;

pub use camera::{CameraLifecycle, CameraState};
pub use controller::{AUTO_FLASH_DELAY, ScanSessionController};
pub use flash::FlashController;
pub use permission::PermissionGate;

/// Host-side handle for a session started with [`start_session`].
///
/// Dropping the handle dismisses a session that has not resolved yet.
pub struct ScanSessionHandle {
    controller: ScanSessionController,
    delivery: Option<JoinHandle<()>>,
}

impl ScanSessionHandle {
    pub fn controller(&self) -> &ScanSessionController {
        &self.controller
    }

    pub fn state(&self) -> SessionState {
        self.controller.state()
    }

    pub fn subscribe(&self) -> EventStream {
        self.controller.subscribe()
    }

    pub fn cancel(&self) {
        self.controller.cancel();
    }

    pub async fn toggle_flash(&self) -> Result<bool, FlashError> {
        self.controller.toggle_flash().await
    }

    /// Dismiss the session if it is still unresolved, then wait until the outcome
    /// callback has run.
    pub async fn finished(mut self) {
        self.controller.dismiss();
        let Some(delivery) = self.delivery.take() else {
            return;
        };
        if let Err(err) = delivery.await {
            warn!(error = %err, "outcome delivery task failed");
        }
    }
}

impl Drop for ScanSessionHandle {
    fn drop(&mut self) {
        self.controller.dismiss();
    }
}

/// Start a session on the current runtime and invoke `on_outcome` exactly once.
///
/// Must be called from within a tokio runtime.
pub fn start_session<F>(
    config: ScanConfiguration,
    platform: ScanPlatform,
    on_outcome: F,
) -> ScanSessionHandle
where
    F: FnOnce(ScanOutcome) + Send + 'static,
{
    let (controller, receiver) = ScanSessionController::new(config, platform);

    let starter = controller.clone();
    tokio::spawn(async move {
        if let Err(err) = starter.start().await {
            warn!(session = %starter.id(), error = %err, "session start rejected");
        }
    });

    let delivery = tokio::spawn(async move {
        match receiver.recv().await {
            Ok(outcome) => on_outcome(outcome),
            Err(err) => warn!(error = %err, "session ended without an outcome"),
        }
    });

    ScanSessionHandle {
        controller,
        delivery: Some(delivery),
    }
}
