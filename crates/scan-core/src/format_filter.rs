//! Mapping between host barcode formats and decoder-native symbology identifiers.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::{BarcodeFormat, NativeType};

/// Capture/decoder engine family driving a camera surface.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DecoderEngine {
    /// AVFoundation metadata-object types (`org.iso.QRCode`, ...).
    AvFoundation,
    /// ZXing barcode format names (`QR_CODE`, ...).
    ZXing,
}

const AV_FOUNDATION_MAP: &[(BarcodeFormat, &str)] = &[
    (BarcodeFormat::Aztec, "org.iso.Aztec"),
    (BarcodeFormat::Code39, "org.iso.Code39"),
    (BarcodeFormat::Code93, "com.intermec.Code93"),
    (BarcodeFormat::Code128, "org.iso.Code128"),
    (BarcodeFormat::DataMatrix, "org.iso.DataMatrix"),
    (BarcodeFormat::Ean8, "org.gs1.EAN-8"),
    (BarcodeFormat::Ean13, "org.gs1.EAN-13"),
    (BarcodeFormat::Interleaved2of5, "org.ansi.Interleaved2of5"),
    (BarcodeFormat::Pdf417, "com.intermec.PDF417"),
    (BarcodeFormat::Qr, "org.iso.QRCode"),
    (BarcodeFormat::Upce, "org.gs1.UPC-E"),
];

const AV_FOUNDATION_UNMAPPED: &[&str] = &["org.iso.Code39Mod43", "org.gs1.ITF14", "face"];

const ZXING_MAP: &[(BarcodeFormat, &str)] = &[
    (BarcodeFormat::Aztec, "AZTEC"),
    (BarcodeFormat::Code39, "CODE_39"),
    (BarcodeFormat::Code93, "CODE_93"),
    (BarcodeFormat::Code128, "CODE_128"),
    (BarcodeFormat::DataMatrix, "DATA_MATRIX"),
    (BarcodeFormat::Ean8, "EAN_8"),
    (BarcodeFormat::Ean13, "EAN_13"),
    (BarcodeFormat::Interleaved2of5, "ITF"),
    (BarcodeFormat::Pdf417, "PDF_417"),
    (BarcodeFormat::Qr, "QR_CODE"),
    (BarcodeFormat::Upce, "UPC_E"),
];

const ZXING_UNMAPPED: &[&str] = &[
    "UPC_A",
    "CODABAR",
    "RSS_14",
    "RSS_EXPANDED",
    "MAXICODE",
    "UPC_EAN_EXTENSION",
];

/// Translates a format allow-list into the native types a decoder should accept,
/// and native types reported by the decoder back into [`BarcodeFormat`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatFilter {
    mappings: Vec<(BarcodeFormat, NativeType)>,
    supported: BTreeSet<NativeType>,
}

impl FormatFilter {
    /// Build a filter from an explicit mapping table.
    ///
    /// Every mapped native type is part of the supported set; `unmapped` adds types the
    /// decoder can read but that have no host-visible format.
    pub fn new<M, U>(mappings: M, unmapped: U) -> Self
    where
        M: IntoIterator<Item = (BarcodeFormat, NativeType)>,
        U: IntoIterator<Item = NativeType>,
    {
        let mappings: Vec<_> = mappings
            .into_iter()
            .filter(|(format, _)| *format != BarcodeFormat::Unknown)
            .collect();
        let supported = mappings
            .iter()
            .map(|(_, native)| native.clone())
            .chain(unmapped)
            .collect();

        Self {
            mappings,
            supported,
        }
    }

    /// Filter preloaded with the engine's native type table.
    pub fn for_engine(engine: DecoderEngine) -> Self {
        let (map, unmapped) = match engine {
            DecoderEngine::AvFoundation => (AV_FOUNDATION_MAP, AV_FOUNDATION_UNMAPPED),
            DecoderEngine::ZXing => (ZXING_MAP, ZXING_UNMAPPED),
        };
        Self::new(
            map.iter()
                .map(|(format, native)| (*format, NativeType::new(*native))),
            unmapped.iter().map(|native| NativeType::new(*native)),
        )
    }

    /// Full set of native types the decoder supports.
    pub fn supported(&self) -> &BTreeSet<NativeType> {
        &self.supported
    }

    /// Native types to enable for a restriction list.
    ///
    /// An empty list means no restriction. Formats with no native equivalent are dropped.
    pub fn resolve(&self, restricted: &BTreeSet<BarcodeFormat>) -> BTreeSet<NativeType> {
        if restricted.is_empty() {
            return self.supported.clone();
        }

        self.mappings
            .iter()
            .filter(|(format, _)| restricted.contains(format))
            .map(|(_, native)| native.clone())
            .collect()
    }

    /// Map a reported native type to a format plus a note.
    ///
    /// The note is empty for mapped types and carries the raw identifier otherwise.
    pub fn classify(&self, native: &NativeType) -> (BarcodeFormat, String) {
        match self.mappings.iter().find(|(_, mapped)| mapped == native) {
            Some((format, _)) => (*format, String::new()),
            None => (BarcodeFormat::Unknown, native.as_str().to_owned()),
        }
    }

    /// First native type mapped to `format`, if any.
    pub fn native_type_for(&self, format: BarcodeFormat) -> Option<&NativeType> {
        self.mappings
            .iter()
            .find(|(mapped, _)| *mapped == format)
            .map(|(_, native)| native)
    }
}
