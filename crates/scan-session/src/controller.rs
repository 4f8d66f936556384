use std::{
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use scan_core::{
    DecodeCandidate, EventStream, FlashError, FormatFilter, OutcomeError, OutcomeReceiver,
    OutcomeSlot, PermissionStatus, STRING_FLASH_OFF, STRING_FLASH_ON, ScanConfiguration,
    ScanError, ScanOutcome, ScanStateMachine, SessionChannels, SessionEvent, SessionInput,
    SessionState, ViewportBounds, first_candidate, normalize_candidate, normalize_fatal_error,
    normalize_permission_denial,
};
use scan_platform::{CandidateSink, ScanPlatform, ViewfinderOverlay};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::{
    camera::{CameraLifecycle, CameraState},
    flash::FlashController,
    permission::PermissionGate,
};

/// Delay between capture start and the automatic torch-on.
pub const AUTO_FLASH_DELAY: Duration = Duration::from_millis(150);

const EVENT_BUFFER: usize = 64;

struct SessionInner {
    id: Uuid,
    config: Arc<ScanConfiguration>,
    machine: Mutex<ScanStateMachine>,
    filter: FormatFilter,
    gate: PermissionGate,
    camera: CameraLifecycle,
    flash: FlashController,
    overlay: Arc<dyn ViewfinderOverlay>,
    outcome: OutcomeSlot,
    channels: SessionChannels,
    shutdown: CancellationToken,
    torn_down: AtomicBool,
    runtime: Option<Handle>,
}

/// One scan session: permission, camera, flash and first-match resolution.
///
/// Every transition runs inside one critical section over the state machine, so a decode
/// candidate racing a cancel can resolve the session only once. The winner tears the
/// camera down and then completes the outcome slot; the host receives exactly one
/// [`ScanOutcome`] through the [`OutcomeReceiver`] returned by [`Self::new`].
#[derive(Clone)]
pub struct ScanSessionController {
    inner: Arc<SessionInner>,
}

impl ScanSessionController {
    /// Create an idle session wired to `platform`.
    ///
    /// When called inside a tokio runtime, teardown triggered from UI actions runs on the
    /// runtime's blocking pool.
    pub fn new(config: ScanConfiguration, platform: ScanPlatform) -> (Self, OutcomeReceiver) {
        let filter = FormatFilter::for_engine(platform.camera.engine());
        let camera = CameraLifecycle::new(platform.camera);
        let (outcome, receiver) = OutcomeSlot::new();

        let inner = SessionInner {
            id: Uuid::new_v4(),
            config: Arc::new(config),
            machine: Mutex::new(ScanStateMachine::default()),
            filter,
            gate: PermissionGate::new(platform.permissions),
            flash: FlashController::new(camera.clone()),
            camera,
            overlay: platform.overlay,
            outcome,
            channels: SessionChannels::new(EVENT_BUFFER),
            shutdown: CancellationToken::new(),
            torn_down: AtomicBool::new(false),
            runtime: Handle::try_current().ok(),
        };
        debug!(
            session = %inner.id,
            formats = inner.filter.supported().len(),
            "scan session created"
        );

        (
            Self {
                inner: Arc::new(inner),
            },
            receiver,
        )
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock_machine().state()
    }

    pub fn config(&self) -> &ScanConfiguration {
        &self.inner.config
    }

    pub fn camera_state(&self) -> CameraState {
        self.inner.camera.state()
    }

    /// Subscribe to state, permission-affordance, flash and outcome events.
    pub fn subscribe(&self) -> EventStream {
        self.inner.channels.subscribe()
    }

    /// Begin the session: request permission, then open the camera and start capture.
    ///
    /// Returns the state reached once the permission flow settles.
    pub async fn start(&self) -> Result<SessionState, ScanError> {
        self.inner.transition(SessionInput::Start)?;
        self.inner.overlay.start_animating();
        self.acquire_permission().await
    }

    /// Ask for camera permission again after a denial.
    pub async fn retry_permission(&self) -> Result<SessionState, ScanError> {
        self.inner.transition(SessionInput::RetryPermission)?;
        self.inner.set_permission_affordance(false);
        self.acquire_permission().await
    }

    /// Open the system settings page so the user can grant camera access.
    pub fn open_settings(&self) {
        self.inner.gate.open_settings();
    }

    /// Feed one decoder frame batch. The first candidate in decoder order wins.
    pub fn on_decode_batch(&self, batch: Vec<DecodeCandidate>) {
        self.inner.on_decode_batch(batch);
    }

    /// The user cancelled the scan.
    pub fn cancel(&self) {
        self.inner.resolve_detached(ScanOutcome::Cancelled, "cancelled by user");
    }

    /// The user chose to enter the code by hand instead of scanning.
    pub fn manual_entry(&self) {
        self.inner
            .resolve_detached(ScanOutcome::Cancelled, "manual entry requested");
    }

    /// The surrounding UI went away.
    pub fn dismiss(&self) {
        self.inner.resolve_detached(ScanOutcome::Cancelled, "view dismissed");
    }

    /// A platform component hit a session-fatal error.
    pub fn fail(&self, message: impl Into<String>) {
        self.inner
            .resolve_detached(ScanOutcome::error(message), "fatal platform error");
    }

    /// Flip the flash. Failures are local; the session keeps scanning.
    pub async fn toggle_flash(&self) -> Result<bool, FlashError> {
        let inner = self.inner.clone();
        let result = tokio::task::spawn_blocking(move || {
            let on = !inner.flash.is_on();
            inner.set_flash_while_scanning(on)
        })
        .await
        .map_err(|err| FlashError::Interrupted(err.to_string()))?;

        if let Err(err) = &result {
            warn!(session = %self.inner.id, error = %err, "flash toggle failed");
        }
        result
    }

    pub fn is_flash_on(&self) -> bool {
        self.inner.flash.is_on()
    }

    /// Whether the UI should offer a flash toggle.
    pub fn flash_toggle_available(&self) -> bool {
        self.inner.flash.is_available()
    }

    /// Label for the flash toggle, describing the action it would perform.
    pub fn flash_label(&self) -> String {
        let key = if self.is_flash_on() {
            STRING_FLASH_OFF
        } else {
            STRING_FLASH_ON
        };
        self.inner.config.display_string(key).to_owned()
    }

    /// Re-lay-out the overlay and capture viewport, e.g. after rotation.
    ///
    /// Session state is unaffected unless the camera cannot be restarted, which is fatal.
    pub async fn reconfigure(&self, bounds: ViewportBounds) -> Result<(), ScanError> {
        {
            let machine = self.inner.lock_machine();
            if machine.state().is_terminal() {
                return Err(ScanError::session_resolved("reconfigure"));
            }
            self.inner.overlay.stop_animating();
            self.inner.overlay.relayout(bounds);
            self.inner.overlay.start_animating();
        }

        if let Err(err) = self.inner.camera.reconfigure(bounds).await {
            self.inner
                .resolve_detached(normalize_fatal_error(&err), "camera restart failed");
            return Err(err);
        }
        Ok(())
    }

    async fn acquire_permission(&self) -> Result<SessionState, ScanError> {
        let status = self.inner.gate.request_permission().await;
        match status {
            PermissionStatus::Denied if self.inner.config.report_permission_denial => {
                self.inner
                    .resolve_detached(normalize_permission_denial(), "permission denied");
            }
            PermissionStatus::Denied => {
                if self.inner.transition(SessionInput::PermissionDenied).is_ok() {
                    self.inner.set_permission_affordance(true);
                }
            }
            PermissionStatus::Granted => {
                if self.inner.transition(SessionInput::PermissionGranted).is_ok() {
                    self.begin_capture().await;
                }
            }
        }
        Ok(self.state())
    }

    async fn begin_capture(&self) {
        let config = self.inner.config.clone();
        if let Err(err) = self.inner.camera.open(config.camera_selection).await {
            self.inner
                .resolve_detached(normalize_fatal_error(&err), "camera open failed");
            return;
        }

        let accepted = self.inner.filter.resolve(&config.restricted_formats);
        let started = self.inner.camera.start_capture_while(
            accepted,
            self.candidate_sink(),
            || self.inner.lock_machine().state() == SessionState::Scanning,
        );
        match started {
            Ok(true) => {}
            Ok(false) => {
                debug!(session = %self.inner.id, "session resolved before capture start");
                return;
            }
            Err(err) => {
                self.inner
                    .resolve_detached(normalize_fatal_error(&err), "capture start failed");
                return;
            }
        }
        info!(session = %self.inner.id, "capture running");

        if config.auto_enable_flash {
            self.schedule_auto_flash();
        }
    }

    fn candidate_sink(&self) -> CandidateSink {
        let session = Arc::downgrade(&self.inner);
        Arc::new(move |batch: Vec<DecodeCandidate>| {
            if let Some(inner) = session.upgrade() {
                inner.on_decode_batch(batch);
            }
        })
    }

    fn schedule_auto_flash(&self) {
        let session = Arc::downgrade(&self.inner);
        let shutdown = self.inner.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = tokio::time::sleep(AUTO_FLASH_DELAY) => {
                    let Some(inner) = session.upgrade() else {
                        return;
                    };
                    let id = inner.id;
                    match tokio::task::spawn_blocking(move || inner.set_flash_while_scanning(true))
                        .await
                    {
                        Ok(Ok(_)) => debug!(session = %id, "auto flash enabled"),
                        Ok(Err(err)) => warn!(session = %id, error = %err, "auto flash failed"),
                        Err(err) => warn!(session = %id, error = %err, "auto flash worker failed"),
                    }
                }
            }
        });
    }
}

impl SessionInner {
    fn lock_machine(&self) -> MutexGuard<'_, ScanStateMachine> {
        self.machine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, input: SessionInput) -> Result<(), ScanError> {
        let mut machine = self.lock_machine();
        let from = machine.state();
        match machine.apply(&input) {
            Ok(events) => {
                info!(session = %self.id, ?from, to = ?machine.state(), "session transition");
                for event in events {
                    self.channels.emit(event);
                }
                Ok(())
            }
            Err(err) => {
                debug!(session = %self.id, error = %err, "transition rejected");
                Err(err)
            }
        }
    }

    /// Resolve inside the critical section. Returns the outcome only for the winner.
    fn try_resolve(&self, outcome: ScanOutcome, reason: &str) -> Option<ScanOutcome> {
        let mut machine = self.lock_machine();
        match machine.apply(&SessionInput::Resolve(outcome)) {
            Ok(events) => {
                for event in events {
                    self.channels.emit(event);
                }
                let outcome = machine.outcome().cloned();
                info!(
                    session = %self.id,
                    reason,
                    outcome = outcome.as_ref().map(ScanOutcome::kind),
                    "session resolved"
                );
                outcome
            }
            Err(err) if err.code == "candidate_after_resolution" => {
                trace!(session = %self.id, "dropping decode candidate after resolution");
                None
            }
            Err(err) => {
                debug!(session = %self.id, reason, error = %err, "resolution rejected");
                None
            }
        }
    }

    fn on_decode_batch(&self, batch: Vec<DecodeCandidate>) {
        let Some(candidate) = first_candidate(&batch) else {
            return;
        };
        let outcome = normalize_candidate(&self.filter, candidate);
        if let Some(outcome) = self.try_resolve(outcome, "decode candidate") {
            if batch.len() > 1 {
                trace!(session = %self.id, ignored = batch.len() - 1, "extra candidates in batch");
            }
            // Decoder callbacks already run off the UI thread; stop capture right here.
            self.finish(outcome);
        }
    }

    fn resolve_detached(self: &Arc<Self>, outcome: ScanOutcome, reason: &str) {
        let Some(outcome) = self.try_resolve(outcome, reason) else {
            return;
        };
        match &self.runtime {
            Some(runtime) => {
                let inner = self.clone();
                runtime.spawn_blocking(move || inner.finish(outcome));
            }
            None => self.finish(outcome),
        }
    }

    fn set_flash_while_scanning(&self, on: bool) -> Result<bool, FlashError> {
        let machine = self.lock_machine();
        if machine.state() != SessionState::Scanning {
            return Err(FlashError::SessionInactive);
        }
        self.flash.set_flash(on)?;
        drop(machine);

        self.channels.emit(SessionEvent::FlashChanged { on });
        Ok(on)
    }

    fn set_permission_affordance(&self, visible: bool) {
        self.overlay.show_permission_affordance(visible);
        self.channels
            .emit(SessionEvent::PermissionAffordance { visible });
    }

    /// Claim teardown. Only the first caller gets the resources to release.
    fn claim_teardown(&self) -> Option<Teardown> {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return None;
        }
        self.shutdown.cancel();
        Some(Teardown {
            id: self.id,
            camera: self.camera.clone(),
            flash: self.flash.clone(),
            overlay: self.overlay.clone(),
        })
    }

    fn finish(&self, outcome: ScanOutcome) {
        if let Some(teardown) = self.claim_teardown() {
            teardown.run();
        }
        deliver(self.id, &self.outcome, &self.channels, outcome);
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        let Some(outcome) = self.try_resolve(ScanOutcome::Cancelled, "session dropped") else {
            return;
        };
        let teardown = self.claim_teardown();
        let (detached, _) = OutcomeSlot::new();
        let slot = std::mem::replace(&mut self.outcome, detached);
        let channels = self.channels.clone();
        let id = self.id;
        let job = move || {
            if let Some(teardown) = teardown {
                teardown.run();
            }
            deliver(id, &slot, &channels, outcome);
        };

        match &self.runtime {
            Some(runtime) => {
                runtime.spawn_blocking(job);
            }
            None => job(),
        }
    }
}

/// Device-side resources released when a session ends.
struct Teardown {
    id: Uuid,
    camera: CameraLifecycle,
    flash: FlashController,
    overlay: Arc<dyn ViewfinderOverlay>,
}

impl Teardown {
    /// Stop capture, force the flash off, stop the overlay and release the camera.
    fn run(self) {
        self.camera.stop_capture();
        if self.flash.is_on()
            && let Err(err) = self.flash.set_flash(false)
        {
            warn!(session = %self.id, error = %err, "could not turn flash off during teardown");
        }
        self.overlay.stop_animating();
        self.camera.close();
        debug!(session = %self.id, "session torn down");
    }
}

fn deliver(id: Uuid, slot: &OutcomeSlot, channels: &SessionChannels, outcome: ScanOutcome) {
    match slot.complete(outcome.clone()) {
        Ok(()) => info!(session = %id, outcome = outcome.kind(), "scan outcome delivered"),
        Err(OutcomeError::ReceiverDropped) => {
            warn!(session = %id, "host dropped the outcome receiver")
        }
        Err(err) => warn!(session = %id, error = %err, "duplicate outcome suppressed"),
    }
    channels.emit(SessionEvent::Resolved(outcome));
}
