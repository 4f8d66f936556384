use std::{
    collections::BTreeSet,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use scan_core::{
    CameraCapability, CameraSelection, FocusPlan, NativeType, ScanError, ViewportBounds,
};
use scan_platform::{
    CameraHandle, CameraSurface, CameraSurfaceError, CandidateSink, RelayoutOutcome,
};
use tracing::{debug, info, warn};

/// Lifecycle of the capture device owned by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraState {
    Unopened,
    Opening,
    Open,
    Closed,
}

#[derive(Clone)]
struct CaptureRequest {
    accepted: BTreeSet<NativeType>,
    sink: CandidateSink,
}

struct OpenedDevice {
    handle: CameraHandle,
    capability: CameraCapability,
    focus_plan: FocusPlan,
}

struct LifecycleState {
    state: CameraState,
    selection: CameraSelection,
    device: Option<OpenedDevice>,
    capture: Option<CaptureRequest>,
    bounds: Option<ViewportBounds>,
}

/// Owns open/close/relayout of the capture device.
///
/// Surface calls are made without holding the internal lock, so a surface may invoke the
/// candidate sink synchronously.
#[derive(Clone)]
pub struct CameraLifecycle {
    surface: Arc<dyn CameraSurface>,
    inner: Arc<Mutex<LifecycleState>>,
}

impl CameraLifecycle {
    pub fn new(surface: Arc<dyn CameraSurface>) -> Self {
        Self {
            surface,
            inner: Arc::new(Mutex::new(LifecycleState {
                state: CameraState::Unopened,
                selection: CameraSelection::Default,
                device: None,
                capture: None,
                bounds: None,
            })),
        }
    }

    pub fn surface(&self) -> &Arc<dyn CameraSurface> {
        &self.surface
    }

    pub fn state(&self) -> CameraState {
        self.lock_inner().state
    }

    pub fn handle(&self) -> Option<CameraHandle> {
        self.open_device().map(|(handle, _)| handle)
    }

    /// Handle and capability of the open device.
    pub fn open_device(&self) -> Option<(CameraHandle, CameraCapability)> {
        let inner = self.lock_inner();
        match (inner.state, &inner.device) {
            (CameraState::Open, Some(device)) => Some((device.handle, device.capability)),
            _ => None,
        }
    }

    pub fn capability(&self) -> Option<CameraCapability> {
        self.open_device().map(|(_, capability)| capability)
    }

    pub fn focus_plan(&self) -> Option<FocusPlan> {
        self.lock_inner()
            .device
            .as_ref()
            .map(|device| device.focus_plan)
    }

    /// Whether a focus-state callback from the device should be acted on.
    pub fn forwards_focus_callbacks(&self) -> bool {
        self.focus_plan()
            .is_some_and(FocusPlan::forwards_focus_callbacks)
    }

    /// Acquire the camera, probe it, and apply the focus policy.
    ///
    /// A lifecycle opens once; after `close` it stays closed.
    pub async fn open(&self, selection: CameraSelection) -> Result<CameraCapability, ScanError> {
        let bounds = {
            let mut inner = self.lock_inner();
            match inner.state {
                CameraState::Unopened => {}
                CameraState::Closed => return Err(CameraSurfaceError::Closed.into()),
                CameraState::Opening | CameraState::Open => {
                    return Err(ScanError::camera_unavailable(format!(
                        "camera is already {:?}",
                        inner.state
                    )));
                }
            }
            inner.state = CameraState::Opening;
            inner.selection = selection;
            inner.bounds
        };

        let surface = self.surface.clone();
        let opened = tokio::task::spawn_blocking(move || {
            let device = open_and_configure(surface.as_ref(), selection)?;
            if let Some(bounds) = bounds {
                apply_initial_layout(surface.as_ref(), device.handle, bounds);
            }
            Ok::<_, CameraSurfaceError>(device)
        })
        .await
        .map_err(|err| ScanError::internal(format!("camera open worker failed: {err}")));

        let device = match opened {
            Ok(Ok(device)) => device,
            Ok(Err(err)) => {
                self.mark_closed_after_failure();
                return Err(err.into());
            }
            Err(err) => {
                self.mark_closed_after_failure();
                return Err(err);
            }
        };

        self.install(device).await
    }

    /// Start pushing decode candidates for `accepted` types into `sink`.
    ///
    /// Any capture already running on the device is stopped first.
    pub fn start_capture(
        &self,
        accepted: BTreeSet<NativeType>,
        sink: CandidateSink,
    ) -> Result<(), ScanError> {
        self.start_capture_while(accepted, sink, || true).map(|_| ())
    }

    /// Like [`Self::start_capture`], but `active` is checked immediately before the
    /// surface is told to start. Returns `Ok(false)` when `active` said no; nothing is
    /// started and the capture request is dropped.
    pub fn start_capture_while(
        &self,
        accepted: BTreeSet<NativeType>,
        sink: CandidateSink,
        active: impl Fn() -> bool,
    ) -> Result<bool, ScanError> {
        let handle = {
            let mut inner = self.lock_inner();
            let handle = match (inner.state, &inner.device) {
                (CameraState::Open, Some(device)) => device.handle,
                (state, _) => {
                    return Err(ScanError::camera_unavailable(format!(
                        "cannot start capture while camera is {state:?}"
                    )));
                }
            };
            inner.capture = Some(CaptureRequest {
                accepted: accepted.clone(),
                sink: sink.clone(),
            });
            handle
        };

        if self.surface.is_capturing(handle) {
            debug!(?handle, "restarting capture that was already running");
            self.surface.stop_capture(handle);
        }
        if !active() {
            debug!(?handle, "capture no longer wanted; not starting");
            self.lock_inner().capture = None;
            return Ok(false);
        }
        debug!(?handle, accepted = accepted.len(), "starting capture");
        self.surface.start_capture(handle, &accepted, sink)?;
        Ok(true)
    }

    /// Stop candidate delivery without releasing the device.
    pub fn stop_capture(&self) {
        let handle = {
            let mut inner = self.lock_inner();
            inner.capture = None;
            match (inner.state, &inner.device) {
                (CameraState::Open, Some(device)) => device.handle,
                _ => return,
            }
        };
        self.surface.stop_capture(handle);
    }

    /// Fit the capture viewport to new bounds.
    ///
    /// Restarts the pipeline only when the surface demands it; the candidate sink is
    /// carried over so the session keeps receiving candidates. Before the camera is open
    /// the bounds are remembered and applied on open.
    pub async fn reconfigure(&self, bounds: ViewportBounds) -> Result<(), ScanError> {
        let handle = {
            let mut inner = self.lock_inner();
            inner.bounds = Some(bounds);
            match (inner.state, &inner.device) {
                (CameraState::Open, Some(device)) => device.handle,
                _ => return Ok(()),
            }
        };

        let surface = self.surface.clone();
        let relayout = tokio::task::spawn_blocking(move || surface.relayout(handle, bounds))
            .await
            .map_err(|err| ScanError::internal(format!("camera relayout worker failed: {err}")))??;

        match relayout {
            RelayoutOutcome::Applied => Ok(()),
            RelayoutOutcome::RestartRequired => self.restart().await,
        }
    }

    async fn restart(&self) -> Result<(), ScanError> {
        let (old, selection, capture, bounds) = {
            let mut inner = self.lock_inner();
            if inner.state != CameraState::Open {
                return Ok(());
            }
            let Some(old) = inner.device.take() else {
                return Ok(());
            };
            inner.state = CameraState::Opening;
            (old.handle, inner.selection, inner.capture.clone(), inner.bounds)
        };
        info!(?old, "restarting capture pipeline for new layout");

        let surface = self.surface.clone();
        let restarted = tokio::task::spawn_blocking(move || {
            surface.stop_capture(old);
            surface.close_camera(old);
            let device = open_and_configure(surface.as_ref(), selection)?;
            if let Some(bounds) = bounds {
                apply_initial_layout(surface.as_ref(), device.handle, bounds);
            }
            if let Some(capture) = &capture
                && let Err(err) =
                    surface.start_capture(device.handle, &capture.accepted, capture.sink.clone())
            {
                surface.close_camera(device.handle);
                return Err(err);
            }
            Ok::<_, CameraSurfaceError>(device)
        })
        .await
        .map_err(|err| ScanError::internal(format!("camera restart worker failed: {err}")));

        match restarted {
            Ok(Ok(device)) => self.install(device).await.map(|_| ()),
            Ok(Err(err)) => {
                self.mark_closed_after_failure();
                Err(err.into())
            }
            Err(err) => {
                self.mark_closed_after_failure();
                Err(err)
            }
        }
    }

    /// Release the device. Idempotent; closing while opening releases the device as soon
    /// as the open completes.
    pub fn close(&self) {
        let handle = {
            let mut inner = self.lock_inner();
            let previous = inner.state;
            inner.state = CameraState::Closed;
            inner.capture = None;
            match previous {
                CameraState::Open => inner.device.take().map(|device| device.handle),
                CameraState::Unopened | CameraState::Opening | CameraState::Closed => None,
            }
        };

        if let Some(handle) = handle {
            debug!(?handle, "closing camera");
            self.surface.stop_capture(handle);
            self.surface.close_camera(handle);
        }
    }

    /// Store a freshly opened device unless `close` ran while it was opening.
    async fn install(&self, device: OpenedDevice) -> Result<CameraCapability, ScanError> {
        let stale = {
            let mut inner = self.lock_inner();
            if inner.state == CameraState::Opening {
                let capability = device.capability;
                info!(
                    handle = ?device.handle,
                    focus = ?device.focus_plan,
                    has_torch = capability.has_torch,
                    "camera open"
                );
                inner.state = CameraState::Open;
                inner.device = Some(device);
                return Ok(capability);
            }
            device.handle
        };

        debug!(handle = ?stale, "camera closed while opening; releasing device");
        let surface = self.surface.clone();
        let _ = tokio::task::spawn_blocking(move || {
            surface.stop_capture(stale);
            surface.close_camera(stale);
        })
        .await;
        Err(CameraSurfaceError::Closed.into())
    }

    fn mark_closed_after_failure(&self) {
        let mut inner = self.lock_inner();
        if inner.state == CameraState::Opening {
            inner.state = CameraState::Closed;
        }
        inner.device = None;
    }

    fn lock_inner(&self) -> MutexGuard<'_, LifecycleState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn open_and_configure(
    surface: &dyn CameraSurface,
    selection: CameraSelection,
) -> Result<OpenedDevice, CameraSurfaceError> {
    let handle = surface.open_camera(selection)?;

    let probe = surface.probe_capability(handle);
    let mut focus_plan = FocusPlan::from_probe(&probe);
    let capability = match probe {
        Ok(capability) => capability,
        Err(err) => {
            warn!(?handle, error = %err, "camera capability probe failed; autofocus disabled");
            CameraCapability::default()
        }
    };

    if let Some(mode) = focus_plan.focus_mode()
        && let Err(err) = surface.set_focus_mode(handle, mode)
    {
        warn!(?handle, ?mode, error = %err, "focus mode rejected; autofocus disabled");
        focus_plan = FocusPlan::Disabled;
    }
    surface.set_focus_callbacks(handle, focus_plan.forwards_focus_callbacks());

    Ok(OpenedDevice {
        handle,
        capability,
        focus_plan,
    })
}

fn apply_initial_layout(surface: &dyn CameraSurface, handle: CameraHandle, bounds: ViewportBounds) {
    match surface.relayout(handle, bounds) {
        Ok(RelayoutOutcome::Applied) => {}
        Ok(RelayoutOutcome::RestartRequired) => {
            debug!(?handle, "surface asked for restart on a fresh device; ignoring")
        }
        Err(err) => warn!(?handle, error = %err, "initial layout failed"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use scan_core::{DecodeCandidate, DecoderEngine, FocusMode};
    use scan_platform::{SimulatedCamera, SurfaceCall};

    use super::*;

    fn lifecycle(camera: &SimulatedCamera) -> CameraLifecycle {
        CameraLifecycle::new(Arc::new(camera.clone()))
    }

    fn counting_sink() -> (CandidateSink, Arc<AtomicUsize>) {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let sink: CandidateSink = Arc::new(move |batch: Vec<DecodeCandidate>| {
            counter.fetch_add(batch.len(), Ordering::SeqCst);
        });
        (sink, seen)
    }

    fn qr_only() -> BTreeSet<NativeType> {
        [NativeType::new("QR_CODE")].into_iter().collect()
    }

    #[tokio::test]
    async fn opens_with_continuous_autofocus() {
        let camera = SimulatedCamera::new(DecoderEngine::ZXing);
        let lifecycle = lifecycle(&camera);

        let capability = lifecycle
            .open(CameraSelection::Back)
            .await
            .expect("open should work");
        assert!(capability.supports_continuous_autofocus);
        assert_eq!(lifecycle.state(), CameraState::Open);
        assert_eq!(lifecycle.focus_plan(), Some(FocusPlan::Continuous));

        let handle = lifecycle.handle().expect("handle");
        let calls = camera.calls();
        assert!(calls.contains(&SurfaceCall::SetFocusMode(
            handle,
            FocusMode::ContinuousPicture
        )));
        assert!(calls.contains(&SurfaceCall::FocusCallbacks(handle, true)));
    }

    #[tokio::test]
    async fn falls_back_to_auto_focus_with_callbacks_suppressed() {
        let camera = SimulatedCamera::new(DecoderEngine::ZXing).with_capability(CameraCapability {
            supports_auto_focus_mode: true,
            ..CameraCapability::default()
        });
        let lifecycle = lifecycle(&camera);
        lifecycle
            .open(CameraSelection::Back)
            .await
            .expect("open should work");

        let handle = lifecycle.handle().expect("handle");
        assert_eq!(
            lifecycle.focus_plan(),
            Some(FocusPlan::AutoWithCallbacksSuppressed)
        );
        assert!(!lifecycle.forwards_focus_callbacks());
        assert!(
            camera
                .calls()
                .contains(&SurfaceCall::SetFocusMode(handle, FocusMode::Auto))
        );
        assert!(
            camera
                .calls()
                .contains(&SurfaceCall::FocusCallbacks(handle, false))
        );
    }

    #[tokio::test]
    async fn probe_failure_disables_focus_but_keeps_camera() {
        let camera =
            SimulatedCamera::new(DecoderEngine::AvFoundation).with_probe_failure("no parameters");
        let lifecycle = lifecycle(&camera);

        let capability = lifecycle
            .open(CameraSelection::Front)
            .await
            .expect("open should still work");
        assert_eq!(capability, CameraCapability::default());
        assert_eq!(lifecycle.focus_plan(), Some(FocusPlan::Disabled));
        assert!(
            !camera
                .calls()
                .iter()
                .any(|call| matches!(call, SurfaceCall::SetFocusMode(..)))
        );
    }

    #[tokio::test]
    async fn rejected_focus_mode_disables_focus() {
        let camera = SimulatedCamera::new(DecoderEngine::ZXing).with_focus_failure("unsupported");
        let lifecycle = lifecycle(&camera);
        lifecycle
            .open(CameraSelection::Back)
            .await
            .expect("open should work");
        assert_eq!(lifecycle.focus_plan(), Some(FocusPlan::Disabled));
    }

    #[tokio::test]
    async fn open_failure_leaves_camera_closed() {
        let camera = SimulatedCamera::new(DecoderEngine::ZXing).with_open_failure("in use");
        let lifecycle = lifecycle(&camera);

        let err = lifecycle
            .open(CameraSelection::Back)
            .await
            .expect_err("open must fail");
        assert_eq!(err.code, "camera_unavailable");
        assert_eq!(lifecycle.state(), CameraState::Closed);
    }

    #[tokio::test]
    async fn closed_lifecycle_does_not_reopen() {
        let camera = SimulatedCamera::new(DecoderEngine::ZXing);
        let lifecycle = lifecycle(&camera);
        lifecycle.close();

        lifecycle
            .open(CameraSelection::Back)
            .await
            .expect_err("closed lifecycle stays closed");
        assert!(
            !camera
                .calls()
                .iter()
                .any(|call| matches!(call, SurfaceCall::Open(_)))
        );
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let camera = SimulatedCamera::new(DecoderEngine::ZXing);
        let lifecycle = lifecycle(&camera);
        lifecycle
            .open(CameraSelection::Back)
            .await
            .expect("open should work");

        lifecycle.close();
        lifecycle.close();
        assert_eq!(lifecycle.state(), CameraState::Closed);
        let closes = camera
            .calls()
            .iter()
            .filter(|call| matches!(call, SurfaceCall::Close(_)))
            .count();
        assert_eq!(closes, 1);
        assert_eq!(camera.open_devices(), 0);
    }

    #[tokio::test]
    async fn restarts_capture_that_was_already_running() {
        let camera = SimulatedCamera::new(DecoderEngine::ZXing);
        let lifecycle = lifecycle(&camera);
        lifecycle
            .open(CameraSelection::Back)
            .await
            .expect("open should work");
        let (sink, _) = counting_sink();

        lifecycle
            .start_capture(qr_only(), sink.clone())
            .expect("first start");
        lifecycle.start_capture(qr_only(), sink).expect("second start");

        let handle = lifecycle.handle().expect("handle");
        assert!(camera.calls().contains(&SurfaceCall::StopCapture(handle)));
        assert!(camera.any_capturing());
    }

    #[tokio::test]
    async fn start_capture_requires_open_camera() {
        let camera = SimulatedCamera::new(DecoderEngine::ZXing);
        let lifecycle = lifecycle(&camera);
        let (sink, _) = counting_sink();
        let err = lifecycle
            .start_capture(qr_only(), sink)
            .expect_err("capture needs an open camera");
        assert_eq!(err.code, "camera_unavailable");
    }

    #[tokio::test]
    async fn relayout_in_place_keeps_pipeline() {
        let camera = SimulatedCamera::new(DecoderEngine::AvFoundation);
        let lifecycle = lifecycle(&camera);
        lifecycle
            .open(CameraSelection::Back)
            .await
            .expect("open should work");
        let handle = lifecycle.handle().expect("handle");

        lifecycle
            .reconfigure(ViewportBounds::sized(800.0, 400.0))
            .await
            .expect("relayout should work");
        assert_eq!(lifecycle.handle(), Some(handle));
        assert_eq!(camera.open_devices(), 1);
    }

    #[tokio::test]
    async fn restart_on_relayout_keeps_delivering_candidates() {
        let camera = SimulatedCamera::new(DecoderEngine::ZXing).with_restart_on_relayout();
        let lifecycle = lifecycle(&camera);
        lifecycle
            .open(CameraSelection::Back)
            .await
            .expect("open should work");
        let old = lifecycle.handle().expect("handle");
        let (sink, seen) = counting_sink();
        lifecycle
            .start_capture(qr_only(), sink)
            .expect("capture should start");

        lifecycle
            .reconfigure(ViewportBounds::sized(400.0, 800.0))
            .await
            .expect("restart should work");

        let new = lifecycle.handle().expect("handle after restart");
        assert_ne!(old, new);
        assert_eq!(lifecycle.state(), CameraState::Open);
        assert!(camera.calls().contains(&SurfaceCall::Close(old)));

        assert_eq!(camera.emit(vec![DecodeCandidate::new("A", "QR_CODE")]), 1);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_restart_releases_the_new_device() {
        let camera = SimulatedCamera::new(DecoderEngine::ZXing)
            .with_restart_on_relayout()
            .with_capture_failure_from(2, "pipeline busy");
        let lifecycle = lifecycle(&camera);
        lifecycle
            .open(CameraSelection::Back)
            .await
            .expect("open should work");
        let old = lifecycle.handle().expect("handle");
        let (sink, _) = counting_sink();
        lifecycle
            .start_capture(qr_only(), sink)
            .expect("first capture starts");

        let err = lifecycle
            .reconfigure(ViewportBounds::sized(400.0, 800.0))
            .await
            .expect_err("restart must fail");
        assert_eq!(err.code, "camera_unavailable");
        assert_eq!(lifecycle.state(), CameraState::Closed);
        assert_eq!(camera.open_devices(), 0);

        let closes: Vec<_> = camera
            .calls()
            .into_iter()
            .filter(|call| matches!(call, SurfaceCall::Close(_)))
            .collect();
        assert_eq!(closes.len(), 2);
        assert_eq!(closes[0], SurfaceCall::Close(old));
    }

    #[tokio::test]
    async fn inactive_check_skips_capture_start() {
        let camera = SimulatedCamera::new(DecoderEngine::ZXing);
        let lifecycle = lifecycle(&camera);
        lifecycle
            .open(CameraSelection::Back)
            .await
            .expect("open should work");
        let (sink, _) = counting_sink();

        let started = lifecycle
            .start_capture_while(qr_only(), sink, || false)
            .expect("skip is not an error");
        assert!(!started);
        assert!(!camera.any_capturing());
        assert!(
            !camera
                .calls()
                .iter()
                .any(|call| matches!(call, SurfaceCall::StartCapture(..)))
        );
    }

    #[tokio::test]
    async fn bounds_before_open_are_applied_on_open() {
        let camera = SimulatedCamera::new(DecoderEngine::ZXing);
        let lifecycle = lifecycle(&camera);
        let bounds = ViewportBounds::sized(320.0, 640.0);
        lifecycle
            .reconfigure(bounds)
            .await
            .expect("early bounds are stored");

        lifecycle
            .open(CameraSelection::Back)
            .await
            .expect("open should work");
        let handle = lifecycle.handle().expect("handle");
        assert!(camera.calls().contains(&SurfaceCall::Relayout(handle, bounds)));
    }
}
