use crate::error::{MiraiError, Result};
use crate::types::Laterality;
use dicom_object::InMemDicomObject;

use super::tags::{
    get_non_empty_string, FRAME_ANATOMY_SEQUENCE, FRAME_LATERALITY, IMAGE_LATERALITY,
    LATERALITY as LATERALITY_TAG, SHARED_FUNCTIONAL_GROUPS_SEQUENCE,
};

/// Extracts breast side from a DICOM header
///
/// # Algorithm
///
/// 1. ImageLaterality
/// 2. Laterality
/// 3. FrameLaterality in SharedFunctionalGroupsSequence
///
/// The first non-empty value decides; it must be "L" or "R".
pub fn extract_laterality(dcm: &InMemDicomObject) -> Result<Laterality> {
    let raw = get_non_empty_string(dcm, IMAGE_LATERALITY)
        .or_else(|| get_non_empty_string(dcm, LATERALITY_TAG))
        .or_else(|| extract_frame_laterality(dcm))
        .ok_or_else(|| MiraiError::TagNotFound("ImageLaterality".to_string()))?;

    Laterality::from_str(&raw)
        .ok_or_else(|| MiraiError::InvalidValue(format!("unsupported laterality '{}'", raw)))
}

/// Navigates: SharedFunctionalGroupsSequence[0] → FrameAnatomySequence[0] → FrameLaterality
fn extract_frame_laterality(dcm: &InMemDicomObject) -> Option<String> {
    dcm.element(SHARED_FUNCTIONAL_GROUPS_SEQUENCE)
        .ok()
        .and_then(|shared_seq| shared_seq.items())
        .and_then(|items| items.first())
        .and_then(|first_item| first_item.element(FRAME_ANATOMY_SEQUENCE).ok())
        .and_then(|frame_anatomy_seq| frame_anatomy_seq.items())
        .and_then(|items| items.first())
        .and_then(|first_item| get_non_empty_string(first_item, FRAME_LATERALITY))
}
