use crate::error::{MiraiError, Result};
use dicom_object::InMemDicomObject;

use super::tags::{get_non_empty_string, CONTENT_DATE, CONTENT_TIME};

/// Extracts a comparable acquisition key from ContentDate + ContentTime
///
/// The date (`YYYYMMDD`) and time (`HHMMSS[.ffffff]`) strings are
/// concatenated and read as one integer, so later acquisitions compare
/// greater. Fractional seconds are dropped.
pub fn extract_acquisition_key(dcm: &InMemDicomObject) -> Result<u64> {
    let date = get_non_empty_string(dcm, CONTENT_DATE)
        .ok_or_else(|| MiraiError::TagNotFound("ContentDate".to_string()))?;
    let time = get_non_empty_string(dcm, CONTENT_TIME)
        .ok_or_else(|| MiraiError::TagNotFound("ContentTime".to_string()))?;

    acquisition_key(&date, &time)
}

/// Builds the integer key from raw date and time strings
pub fn acquisition_key(date: &str, time: &str) -> Result<u64> {
    let whole_seconds = time.split('.').next().unwrap_or_default();
    let joined = format!("{}{}", date.trim(), whole_seconds.trim());

    if joined.is_empty() || !joined.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MiraiError::InvalidValue(format!(
            "acquisition date/time '{} {}' is not numeric",
            date, time
        )));
    }

    joined
        .parse::<u64>()
        .map_err(|e| MiraiError::InvalidValue(format!("acquisition key '{}': {}", joined, e)))
}
