//! Environment-backed configuration for `scan-smoke`.

use std::{collections::BTreeSet, env, error::Error, fmt};

use scan_core::{
    BarcodeFormat, CameraSelection, DecoderEngine, FormatFilter, NativeType, STRING_CANCEL,
    STRING_FLASH_OFF, STRING_FLASH_ON, ScanConfiguration,
};

const STRING_PREFIX: &str = "BARCODE_SCAN_STRING_";
const STRING_KEYS: [&str; 3] = [STRING_CANCEL, STRING_FLASH_ON, STRING_FLASH_OFF];

/// Runtime configuration for one smoke run.
#[derive(Debug, Clone, PartialEq)]
pub struct SmokeConfig {
    /// Session configuration handed to the controller.
    pub scan: ScanConfiguration,
    /// Decoder engine the simulated camera mimics.
    pub engine: DecoderEngine,
    /// Simulated decode candidate. Without one the run ends with a user cancel.
    pub payload: Option<SimulatedPayload>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedPayload {
    pub raw_content: String,
    pub native_type: NativeType,
}

impl SmokeConfig {
    /// Parse configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(mut lookup: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let restricted_formats = parse_formats("BARCODE_SCAN_RESTRICT_FORMATS", &mut lookup)?;
        let camera_selection = parse_camera("BARCODE_SCAN_CAMERA", &mut lookup)?;
        let auto_enable_flash = parse_bool("BARCODE_SCAN_AUTO_FLASH", &mut lookup)?;
        let report_permission_denial =
            parse_bool("BARCODE_SCAN_REPORT_PERMISSION_DENIAL", &mut lookup)?;
        let engine = parse_engine("BARCODE_SCAN_ENGINE", &mut lookup)?;

        let mut scan = ScanConfiguration {
            restricted_formats,
            camera_selection,
            auto_enable_flash,
            report_permission_denial,
            ..ScanConfiguration::default()
        };
        for key in STRING_KEYS {
            let env_key = format!("{STRING_PREFIX}{}", key.to_ascii_uppercase());
            if let Some(value) = optional_trimmed_env(&env_key, &mut lookup) {
                scan.display_strings.insert(key.to_owned(), value);
            }
        }

        let payload = match optional_trimmed_env("BARCODE_SCAN_PAYLOAD", &mut lookup) {
            None => None,
            Some(raw_content) => {
                let native_type =
                    match optional_trimmed_env("BARCODE_SCAN_PAYLOAD_TYPE", &mut lookup) {
                        Some(native) => NativeType::new(native),
                        None => default_native_type(engine)?,
                    };
                Some(SimulatedPayload {
                    raw_content,
                    native_type,
                })
            }
        };

        Ok(Self {
            scan,
            engine,
            payload,
        })
    }
}

/// Errors produced while parsing runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable could not be parsed.
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidValue { key, value, reason } => {
                write!(f, "invalid {key}='{value}': {reason}")
            }
        }
    }
}

impl Error for ConfigError {}

fn default_native_type(engine: DecoderEngine) -> Result<NativeType, ConfigError> {
    FormatFilter::for_engine(engine)
        .native_type_for(BarcodeFormat::Qr)
        .cloned()
        .ok_or_else(|| ConfigError::InvalidValue {
            key: "BARCODE_SCAN_PAYLOAD_TYPE",
            value: String::new(),
            reason: "engine has no qr mapping; set a native type".to_owned(),
        })
}

fn optional_trimmed_env<F>(key: &str, lookup: &mut F) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_formats<F>(key: &'static str, lookup: &mut F) -> Result<BTreeSet<BarcodeFormat>, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed_env(key, lookup) else {
        return Ok(BTreeSet::new());
    };
    value
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| {
            name.parse::<BarcodeFormat>()
                .map_err(|err| ConfigError::InvalidValue {
                    key,
                    value: value.clone(),
                    reason: err.to_string(),
                })
        })
        .collect()
}

fn parse_camera<F>(key: &'static str, lookup: &mut F) -> Result<CameraSelection, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed_env(key, lookup) else {
        return Ok(CameraSelection::default());
    };
    match value.to_ascii_lowercase().as_str() {
        "back" => Ok(CameraSelection::Back),
        "front" => Ok(CameraSelection::Front),
        "default" => Ok(CameraSelection::Default),
        other => other
            .parse::<i32>()
            .map(CameraSelection::from_legacy_code)
            .map_err(|_| ConfigError::InvalidValue {
                key,
                value: value.clone(),
                reason: "expected back, front, default or a legacy camera code".to_owned(),
            }),
    }
}

fn parse_bool<F>(key: &'static str, lookup: &mut F) -> Result<bool, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed_env(key, lookup) else {
        return Ok(false);
    };
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value,
            reason: "expected a boolean".to_owned(),
        }),
    }
}

fn parse_engine<F>(key: &'static str, lookup: &mut F) -> Result<DecoderEngine, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed_env(key, lookup) else {
        return Ok(DecoderEngine::ZXing);
    };
    match value.to_ascii_lowercase().as_str() {
        "zxing" => Ok(DecoderEngine::ZXing),
        "avfoundation" => Ok(DecoderEngine::AvFoundation),
        _ => Err(ConfigError::InvalidValue {
            key,
            value,
            reason: "expected zxing or avfoundation".to_owned(),
        }),
    }
}
