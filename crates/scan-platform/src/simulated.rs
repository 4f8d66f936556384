//! In-process camera surface that behaves like a ZXing view or an AVFoundation session.

use std::{
    collections::{BTreeSet, HashMap},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use scan_core::{
    CameraCapability, CameraSelection, DecodeCandidate, DecoderEngine, FocusMode, FormatFilter,
    NativeType, ViewportBounds,
};

use crate::camera::{CameraHandle, CameraSurface, CameraSurfaceError, CandidateSink, RelayoutOutcome};

/// Call recorded by [`SimulatedCamera`], in invocation order.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceCall {
    Open(CameraSelection),
    Probe(CameraHandle),
    SetFocusMode(CameraHandle, FocusMode),
    FocusCallbacks(CameraHandle, bool),
    StartCapture(CameraHandle, BTreeSet<NativeType>),
    StopCapture(CameraHandle),
    Relayout(CameraHandle, ViewportBounds),
    Close(CameraHandle),
    Lock(CameraHandle),
    Unlock(CameraHandle),
    SetFlash(CameraHandle, bool),
    SetTorch(CameraHandle, bool),
}

/// Callback run whenever the session asks whether a device is capturing.
pub type CaptureQueryHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone)]
struct SimulatedCameraConfig {
    engine: DecoderEngine,
    probe: Result<CameraCapability, String>,
    open_failure: Option<String>,
    lock_failure: Option<String>,
    focus_failure: Option<String>,
    capture_failure: Option<(usize, String)>,
    restart_on_relayout: bool,
    on_capture_query: Option<CaptureQueryHook>,
}

#[derive(Default)]
struct DeviceState {
    capturing: bool,
    accepted: BTreeSet<NativeType>,
    sink: Option<CandidateSink>,
    flash: bool,
    torch: bool,
    locked: bool,
}

#[derive(Default)]
struct SimState {
    next_handle: u64,
    capture_starts: usize,
    devices: HashMap<CameraHandle, DeviceState>,
    calls: Vec<SurfaceCall>,
}

/// Scriptable camera surface. Clones share the same device state.
#[derive(Clone)]
pub struct SimulatedCamera {
    config: Arc<SimulatedCameraConfig>,
    state: Arc<Mutex<SimState>>,
}

impl SimulatedCamera {
    /// Camera with flash, torch and continuous autofocus.
    pub fn new(engine: DecoderEngine) -> Self {
        Self {
            config: Arc::new(SimulatedCameraConfig {
                engine,
                probe: Ok(CameraCapability {
                    has_flash: true,
                    has_torch: true,
                    supports_continuous_autofocus: true,
                    supports_auto_focus_mode: true,
                }),
                open_failure: None,
                lock_failure: None,
                focus_failure: None,
                capture_failure: None,
                restart_on_relayout: false,
                on_capture_query: None,
            }),
            state: Arc::default(),
        }
    }

    pub fn with_capability(self, capability: CameraCapability) -> Self {
        self.reconfigured(|config| config.probe = Ok(capability))
    }

    pub fn with_probe_failure(self, message: impl Into<String>) -> Self {
        let message = message.into();
        self.reconfigured(|config| config.probe = Err(message))
    }

    pub fn with_open_failure(self, message: impl Into<String>) -> Self {
        let message = message.into();
        self.reconfigured(|config| config.open_failure = Some(message))
    }

    pub fn with_lock_failure(self, message: impl Into<String>) -> Self {
        let message = message.into();
        self.reconfigured(|config| config.lock_failure = Some(message))
    }

    pub fn with_focus_failure(self, message: impl Into<String>) -> Self {
        let message = message.into();
        self.reconfigured(|config| config.focus_failure = Some(message))
    }

    /// Fail the `nth` (1-based) capture start and every one after it.
    pub fn with_capture_failure_from(self, nth: usize, message: impl Into<String>) -> Self {
        let message = message.into();
        self.reconfigured(|config| config.capture_failure = Some((nth, message)))
    }

    /// Run `hook` each time capture state is queried, outside the device lock.
    pub fn with_capture_query_hook(self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        let hook: CaptureQueryHook = Arc::new(hook);
        self.reconfigured(|config| config.on_capture_query = Some(hook))
    }

    /// Every relayout asks for a pipeline restart.
    pub fn with_restart_on_relayout(self) -> Self {
        self.reconfigured(|config| config.restart_on_relayout = true)
    }

    fn reconfigured(self, apply: impl FnOnce(&mut SimulatedCameraConfig)) -> Self {
        let mut config = (*self.config).clone();
        apply(&mut config);
        Self {
            config: Arc::new(config),
            state: self.state,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Push one decoder frame batch to the capturing device.
    ///
    /// Candidates whose native type was not enabled are dropped, as a real decoder would.
    /// Returns how many candidates reached the sink.
    pub fn emit(&self, batch: Vec<DecodeCandidate>) -> usize {
        let (sink, batch) = {
            let state = self.lock_state();
            let Some(device) = state.devices.values().find(|device| device.capturing) else {
                return 0;
            };
            let Some(sink) = device.sink.clone() else {
                return 0;
            };
            let batch: Vec<_> = batch
                .into_iter()
                .filter(|candidate| device.accepted.contains(&candidate.native_type))
                .collect();
            (sink, batch)
        };

        if batch.is_empty() {
            return 0;
        }
        let delivered = batch.len();
        sink(batch);
        delivered
    }

    /// Emit a single candidate using the engine's native identifier for `format`.
    pub fn emit_format(&self, raw_content: &str, format: scan_core::BarcodeFormat) -> usize {
        let filter = FormatFilter::for_engine(self.config.engine);
        match filter.native_type_for(format) {
            Some(native) => self.emit(vec![DecodeCandidate::new(raw_content, native.clone())]),
            None => 0,
        }
    }

    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.lock_state().calls.clone()
    }

    /// Index of the first recorded call matching `predicate`.
    pub fn position(&self, predicate: impl Fn(&SurfaceCall) -> bool) -> Option<usize> {
        self.lock_state().calls.iter().position(predicate)
    }

    pub fn open_devices(&self) -> usize {
        self.lock_state().devices.len()
    }

    pub fn any_capturing(&self) -> bool {
        self.lock_state()
            .devices
            .values()
            .any(|device| device.capturing)
    }

    pub fn is_locked(&self, handle: CameraHandle) -> bool {
        self.lock_state()
            .devices
            .get(&handle)
            .is_some_and(|device| device.locked)
    }

    fn with_device<T>(
        &self,
        handle: CameraHandle,
        call: SurfaceCall,
        apply: impl FnOnce(&mut DeviceState) -> T,
    ) -> Option<T> {
        let mut state = self.lock_state();
        state.calls.push(call);
        state.devices.get_mut(&handle).map(apply)
    }
}

impl CameraSurface for SimulatedCamera {
    fn engine(&self) -> DecoderEngine {
        self.config.engine
    }

    fn open_camera(&self, selection: CameraSelection) -> Result<CameraHandle, CameraSurfaceError> {
        let mut state = self.lock_state();
        state.calls.push(SurfaceCall::Open(selection));
        if let Some(message) = &self.config.open_failure {
            return Err(CameraSurfaceError::Unavailable(message.clone()));
        }

        state.next_handle += 1;
        let handle = CameraHandle(state.next_handle);
        state.devices.insert(handle, DeviceState::default());
        Ok(handle)
    }

    fn probe_capability(
        &self,
        handle: CameraHandle,
    ) -> Result<CameraCapability, CameraSurfaceError> {
        let open = self
            .with_device(handle, SurfaceCall::Probe(handle), |_| ())
            .is_some();
        if !open {
            return Err(CameraSurfaceError::Closed);
        }
        self.config
            .probe
            .clone()
            .map_err(CameraSurfaceError::Backend)
    }

    fn set_focus_mode(
        &self,
        handle: CameraHandle,
        mode: FocusMode,
    ) -> Result<(), CameraSurfaceError> {
        self.with_device(handle, SurfaceCall::SetFocusMode(handle, mode), |_| ())
            .ok_or(CameraSurfaceError::Closed)?;
        match &self.config.focus_failure {
            Some(message) => Err(CameraSurfaceError::Backend(message.clone())),
            None => Ok(()),
        }
    }

    fn set_focus_callbacks(&self, handle: CameraHandle, enabled: bool) {
        self.with_device(handle, SurfaceCall::FocusCallbacks(handle, enabled), |_| ());
    }

    fn start_capture(
        &self,
        handle: CameraHandle,
        accepted: &BTreeSet<NativeType>,
        sink: CandidateSink,
    ) -> Result<(), CameraSurfaceError> {
        let failure = {
            let mut state = self.lock_state();
            state.capture_starts += 1;
            match &self.config.capture_failure {
                Some((nth, message)) if state.capture_starts >= *nth => {
                    state.calls.push(SurfaceCall::StartCapture(handle, accepted.clone()));
                    Some(message.clone())
                }
                _ => None,
            }
        };
        if let Some(message) = failure {
            return Err(CameraSurfaceError::Backend(message));
        }

        self.with_device(
            handle,
            SurfaceCall::StartCapture(handle, accepted.clone()),
            |device| {
                device.capturing = true;
                device.accepted = accepted.clone();
                device.sink = Some(sink);
            },
        )
        .ok_or(CameraSurfaceError::Closed)
    }

    fn is_capturing(&self, handle: CameraHandle) -> bool {
        if let Some(hook) = &self.config.on_capture_query {
            hook();
        }
        self.lock_state()
            .devices
            .get(&handle)
            .is_some_and(|device| device.capturing)
    }

    fn stop_capture(&self, handle: CameraHandle) {
        self.with_device(handle, SurfaceCall::StopCapture(handle), |device| {
            device.capturing = false;
            device.sink = None;
        });
    }

    fn relayout(
        &self,
        handle: CameraHandle,
        bounds: ViewportBounds,
    ) -> Result<RelayoutOutcome, CameraSurfaceError> {
        self.with_device(handle, SurfaceCall::Relayout(handle, bounds), |_| ())
            .ok_or(CameraSurfaceError::Closed)?;
        if self.config.restart_on_relayout {
            Ok(RelayoutOutcome::RestartRequired)
        } else {
            Ok(RelayoutOutcome::Applied)
        }
    }

    fn close_camera(&self, handle: CameraHandle) {
        let mut state = self.lock_state();
        state.calls.push(SurfaceCall::Close(handle));
        state.devices.remove(&handle);
    }

    fn lock_configuration(&self, handle: CameraHandle) -> Result<(), CameraSurfaceError> {
        let failure = self.config.lock_failure.clone();
        self.with_device(handle, SurfaceCall::Lock(handle), |device| match failure {
            Some(message) => Err(CameraSurfaceError::Backend(message)),
            None => {
                device.locked = true;
                Ok(())
            }
        })
        .unwrap_or(Err(CameraSurfaceError::Closed))
    }

    fn unlock_configuration(&self, handle: CameraHandle) {
        self.with_device(handle, SurfaceCall::Unlock(handle), |device| {
            device.locked = false;
        });
    }

    fn set_flash_mode(&self, handle: CameraHandle, on: bool) {
        self.with_device(handle, SurfaceCall::SetFlash(handle, on), |device| {
            device.flash = on;
        });
    }

    fn set_torch_mode(&self, handle: CameraHandle, on: bool) {
        self.with_device(handle, SurfaceCall::SetTorch(handle, on), |device| {
            device.torch = on;
        });
    }

    fn flash_mode(&self, handle: CameraHandle) -> bool {
        self.lock_state()
            .devices
            .get(&handle)
            .is_some_and(|device| device.flash)
    }

    fn torch_mode(&self, handle: CameraHandle) -> bool {
        self.lock_state()
            .devices
            .get(&handle)
            .is_some_and(|device| device.torch)
    }
}
