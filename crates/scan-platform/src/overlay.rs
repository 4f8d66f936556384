use std::sync::{Arc, Mutex};

use scan_core::ViewportBounds;

/// Viewfinder chrome drawn over the camera preview.
pub trait ViewfinderOverlay: Send + Sync {
    fn start_animating(&self);

    fn stop_animating(&self);

    /// Rebuild the overlay for new bounds (rotation, resize).
    fn relayout(&self, bounds: ViewportBounds);

    /// Show or hide the "grant camera access" affordance.
    fn show_permission_affordance(&self, visible: bool);
}

#[derive(Debug, Clone, PartialEq)]
pub enum OverlayCall {
    StartAnimating,
    StopAnimating,
    Relayout(ViewportBounds),
    PermissionAffordance(bool),
}

/// Overlay that records every call, for tests and headless runs.
#[derive(Clone, Debug, Default)]
pub struct RecordingOverlay {
    calls: Arc<Mutex<Vec<OverlayCall>>>,
}

impl RecordingOverlay {
    pub fn calls(&self) -> Vec<OverlayCall> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, call: &OverlayCall) -> usize {
        self.calls().iter().filter(|seen| *seen == call).count()
    }

    fn record(&self, call: OverlayCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

impl ViewfinderOverlay for RecordingOverlay {
    fn start_animating(&self) {
        self.record(OverlayCall::StartAnimating);
    }

    fn stop_animating(&self) {
        self.record(OverlayCall::StopAnimating);
    }

    fn relayout(&self, bounds: ViewportBounds) {
        self.record(OverlayCall::Relayout(bounds));
    }

    fn show_permission_affordance(&self, visible: bool) {
        self.record(OverlayCall::PermissionAffordance(visible));
    }
}
