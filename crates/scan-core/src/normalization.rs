use crate::{
    error::{PERMISSION_NOT_GRANTED, ScanError},
    format_filter::FormatFilter,
    types::{DecodeCandidate, ScanOutcome},
};

/// Canonical candidate of a decoder batch: the first element, in decoder order.
pub fn first_candidate(batch: &[DecodeCandidate]) -> Option<&DecodeCandidate> {
    batch.first()
}

/// Convert a decode candidate into a `Found` outcome using the filter's reverse mapping.
pub fn normalize_candidate(filter: &FormatFilter, candidate: &DecodeCandidate) -> ScanOutcome {
    let (format, format_note) = filter.classify(&candidate.native_type);
    ScanOutcome::Found {
        raw_content: candidate.raw_content.clone(),
        format,
        format_note,
    }
}

/// Convert a session-fatal error into an `Error` outcome.
pub fn normalize_fatal_error(error: &ScanError) -> ScanOutcome {
    ScanOutcome::error(error.message.clone())
}

/// Outcome used when the host asked for permission denials to be reported.
pub fn normalize_permission_denial() -> ScanOutcome {
    ScanOutcome::error(PERMISSION_NOT_GRANTED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        format_filter::DecoderEngine,
        types::{BarcodeFormat, NativeType},
    };

    #[test]
    fn takes_first_element_of_batch_without_sorting() {
        let batch = vec![
            DecodeCandidate::new("ZZZ", "QR_CODE"),
            DecodeCandidate::new("AAA", "CODE_128"),
        ];
        let first = first_candidate(&batch).expect("batch is not empty");
        assert_eq!(first.raw_content, "ZZZ");
        assert!(first_candidate(&[]).is_none());
    }

    #[test]
    fn maps_known_candidate_to_found_with_empty_note() {
        let filter = FormatFilter::for_engine(DecoderEngine::AvFoundation);
        let outcome = normalize_candidate(&filter, &DecodeCandidate::new("ABC", "org.iso.QRCode"));
        assert_eq!(
            outcome,
            ScanOutcome::Found {
                raw_content: "ABC".into(),
                format: BarcodeFormat::Qr,
                format_note: String::new(),
            }
        );
    }

    #[test]
    fn keeps_raw_native_type_as_note_for_unknown_candidates() {
        let filter = FormatFilter::for_engine(DecoderEngine::ZXing);
        let candidate = DecodeCandidate {
            raw_content: "0123456789012".into(),
            native_type: NativeType::new("UPC_A"),
        };
        assert_eq!(
            normalize_candidate(&filter, &candidate),
            ScanOutcome::Found {
                raw_content: "0123456789012".into(),
                format: BarcodeFormat::Unknown,
                format_note: "UPC_A".into(),
            }
        );
    }

    #[test]
    fn fatal_errors_keep_their_message() {
        let outcome = normalize_fatal_error(&ScanError::camera_unavailable("camera in use"));
        assert_eq!(outcome, ScanOutcome::error("camera in use"));
        assert_eq!(
            normalize_permission_denial(),
            ScanOutcome::error("PERMISSION_NOT_GRANTED")
        );
    }
}
