//! Core scan-session contract shared between the session runtime and platform backends.
//!
//! This crate defines the data model, the session transition table, the format filter,
//! the focus policy, and the single-fire outcome/event channel abstractions. It performs
//! no I/O and owns no threads.

/// Outcome slot and session event channel primitives.
pub mod channel;
/// Stable scan error types.
pub mod error;
/// Autofocus policy table.
pub mod focus;
/// Barcode format <-> native decoder type mapping.
pub mod format_filter;
/// Decode candidate and failure normalization into outcomes.
pub mod normalization;
/// Scan session state machine.
pub mod state_machine;
/// Host-facing data model.
pub mod types;

pub use channel::{EventStream, OutcomeError, OutcomeReceiver, OutcomeSlot, SessionChannels};
pub use error::{FlashError, PERMISSION_NOT_GRANTED, ScanError, ScanErrorCategory};
pub use focus::{FocusMode, FocusPlan};
pub use format_filter::{DecoderEngine, FormatFilter};
pub use normalization::{
    first_candidate, normalize_candidate, normalize_fatal_error, normalize_permission_denial,
};
pub use state_machine::{ScanStateMachine, SessionInput};
pub use types::{
    BarcodeFormat, CameraCapability, CameraSelection, DecodeCandidate, NativeType,
    PermissionStatus, STRING_CANCEL, STRING_FLASH_OFF, STRING_FLASH_ON, ScanConfiguration,
    ScanOutcome, SessionEvent, SessionState, UnknownFormatName, ViewportBounds,
};
