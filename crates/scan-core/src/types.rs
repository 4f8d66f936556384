use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Barcode symbology as exposed to the host application.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
#[serde(rename_all = "camelCase")]
pub enum BarcodeFormat {
    /// Aztec 2D code.
    Aztec,
    /// Code 39.
    Code39,
    /// Code 93.
    Code93,
    /// Code 128.
    Code128,
    /// Data Matrix 2D code.
    DataMatrix,
    /// EAN-8.
    Ean8,
    /// EAN-13.
    Ean13,
    /// Interleaved 2 of 5.
    Interleaved2of5,
    /// PDF417 stacked code.
    Pdf417,
    /// QR code.
    Qr,
    /// UPC-E.
    Upce,
    /// The decoder reported a symbology with no known mapping.
    #[default]
    Unknown,
}

impl BarcodeFormat {
    /// Every format that can appear in a restriction list, in declaration order.
    pub const KNOWN: [Self; 11] = [
        Self::Aztec,
        Self::Code39,
        Self::Code93,
        Self::Code128,
        Self::DataMatrix,
        Self::Ean8,
        Self::Ean13,
        Self::Interleaved2of5,
        Self::Pdf417,
        Self::Qr,
        Self::Upce,
    ];

    /// Stable lower-camel name shared with the host configuration.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Aztec => "aztec",
            Self::Code39 => "code39",
            Self::Code93 => "code93",
            Self::Code128 => "code128",
            Self::DataMatrix => "dataMatrix",
            Self::Ean8 => "ean8",
            Self::Ean13 => "ean13",
            Self::Interleaved2of5 => "interleaved2of5",
            Self::Pdf417 => "pdf417",
            Self::Qr => "qr",
            Self::Upce => "upce",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for BarcodeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a format name does not match any [`BarcodeFormat`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown barcode format '{0}'")]
pub struct UnknownFormatName(pub String);

impl FromStr for BarcodeFormat {
    type Err = UnknownFormatName;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        Self::KNOWN
            .into_iter()
            .chain([Self::Unknown])
            .find(|format| format.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownFormatName(trimmed.to_owned()))
    }
}

/// Which physical camera the session should open.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum CameraSelection {
    /// Rear-facing camera.
    Back,
    /// Front-facing camera.
    Front,
    /// Platform default (resolved to the back camera by current surfaces).
    #[default]
    Default,
}

impl CameraSelection {
    /// Map the integer camera code used by older host configurations.
    ///
    /// `1` selects the front camera, `-1` the platform default, anything else the back camera.
    pub fn from_legacy_code(code: i32) -> Self {
        match code {
            1 => Self::Front,
            -1 => Self::Default,
            _ => Self::Back,
        }
    }
}

/// Display string key for the cancel action.
pub const STRING_CANCEL: &str = "cancel";
/// Display string key for the "turn flash on" action.
pub const STRING_FLASH_ON: &str = "flash_on";
/// Display string key for the "turn flash off" action.
pub const STRING_FLASH_OFF: &str = "flash_off";

/// Host-supplied session configuration. Read-only once a session is created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanConfiguration {
    /// Allowed symbologies. Empty means no restriction.
    pub restricted_formats: BTreeSet<BarcodeFormat>,
    /// Camera to open.
    pub camera_selection: CameraSelection,
    /// Turn the torch on shortly after capture starts.
    pub auto_enable_flash: bool,
    /// Resolve with an error outcome on permission denial instead of waiting for a retry.
    pub report_permission_denial: bool,
    /// Host-provided UI strings keyed by action name.
    pub display_strings: BTreeMap<String, String>,
}

impl Default for ScanConfiguration {
    fn default() -> Self {
        let display_strings = [
            (STRING_CANCEL, "Cancel"),
            (STRING_FLASH_ON, "Flash on"),
            (STRING_FLASH_OFF, "Flash off"),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_owned(), value.to_owned()))
        .collect();

        Self {
            restricted_formats: BTreeSet::new(),
            camera_selection: CameraSelection::Default,
            auto_enable_flash: false,
            report_permission_denial: false,
            display_strings,
        }
    }
}

impl ScanConfiguration {
    /// Look up a display string, falling back to the key itself.
    pub fn display_string<'a>(&'a self, key: &'a str) -> &'a str {
        self.display_strings
            .get(key)
            .map(String::as_str)
            .unwrap_or(key)
    }
}

/// The single terminal result of a scan session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ScanOutcome {
    /// A barcode was decoded.
    Found {
        /// Decoded payload.
        raw_content: String,
        /// Mapped symbology, `Unknown` when the native type had no mapping.
        format: BarcodeFormat,
        /// Raw native type identifier when `format` is `Unknown`, otherwise empty.
        format_note: String,
    },
    /// The user left the scanner without a result.
    Cancelled,
    /// The session failed.
    Error {
        /// Human-readable failure description.
        message: String,
    },
}

impl ScanOutcome {
    /// Build an error outcome.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Short label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Found { .. } => "found",
            Self::Cancelled => "cancelled",
            Self::Error { .. } => "error",
        }
    }
}

/// Hardware capabilities reported by an opened camera.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CameraCapability {
    /// Device has a flash unit.
    pub has_flash: bool,
    /// Flash unit supports continuous torch mode.
    pub has_torch: bool,
    /// Continuous-picture autofocus is available.
    pub supports_continuous_autofocus: bool,
    /// Simple one-shot autofocus is available.
    pub supports_auto_focus_mode: bool,
}

impl CameraCapability {
    /// Flash can be driven only when both the flash unit and torch mode exist.
    pub fn supports_flash_control(&self) -> bool {
        self.has_flash && self.has_torch
    }
}

/// Lifecycle of a scan session, as observed by the host.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Created, `start` not yet called.
    #[default]
    Idle,
    /// Waiting on the OS permission prompt.
    AwaitingPermission,
    /// Permission was denied; the host may retry.
    PermissionDenied,
    /// Camera is capturing and decode candidates are accepted.
    Scanning,
    /// An outcome has been produced. Terminal.
    Resolved,
}

impl SessionState {
    /// `true` once no further transitions are possible.
    pub fn is_terminal(self) -> bool {
        self == Self::Resolved
    }
}

/// Result of a camera permission request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PermissionStatus {
    /// Access to the camera was granted.
    Granted,
    /// Access to the camera was refused.
    Denied,
}

/// Decoder-specific symbology identifier, for example `org.iso.QRCode` or `QR_CODE`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct NativeType(String);

impl NativeType {
    /// Wrap a raw identifier.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Raw identifier as reported by the decoder.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NativeType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A recognized payload pushed by the capture engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DecodeCandidate {
    /// Decoded payload, empty when the engine produced no string value.
    pub raw_content: String,
    /// Native symbology tag.
    pub native_type: NativeType,
}

impl DecodeCandidate {
    /// Build a candidate from a payload and native type.
    pub fn new(raw_content: impl Into<String>, native_type: impl Into<NativeType>) -> Self {
        Self {
            raw_content: raw_content.into(),
            native_type: native_type.into(),
        }
    }
}

/// Capture viewport in view coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct ViewportBounds {
    /// Left edge.
    pub x: f32,
    /// Top edge.
    pub y: f32,
    /// Width.
    pub width: f32,
    /// Height.
    pub height: f32,
}

impl ViewportBounds {
    /// Bounds anchored at the origin.
    pub fn sized(width: f32, height: f32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width,
            height,
        }
    }

    /// `true` when the viewport is taller than it is wide.
    pub fn is_portrait(&self) -> bool {
        self.height >= self.width
    }
}

/// Event fanned out to session observers (UI chrome, logging).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum SessionEvent {
    /// Session state transition.
    StateChanged {
        /// New state.
        state: SessionState,
    },
    /// Show or hide the "grant camera access" affordance.
    PermissionAffordance {
        /// Whether the affordance should be visible.
        visible: bool,
    },
    /// Flash/torch changed.
    FlashChanged {
        /// New flash state.
        on: bool,
    },
    /// The session produced its outcome.
    Resolved(ScanOutcome),
}
