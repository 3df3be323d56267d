use dicom_core::Tag;
use dicom_object::InMemDicomObject;

// View/laterality tags
pub use dicom_dictionary_std::tags::{
    CODE_MEANING, FRAME_ANATOMY_SEQUENCE, FRAME_LATERALITY, IMAGE_LATERALITY, LATERALITY,
    SHARED_FUNCTIONAL_GROUPS_SEQUENCE, VIEW_CODE_SEQUENCE, VIEW_POSITION,
};

// Acquisition ordering tags
pub use dicom_dictionary_std::tags::{CONTENT_DATE, CONTENT_TIME};

// Pixel module tags
pub use dicom_dictionary_std::tags::PHOTOMETRIC_INTERPRETATION;

/// Helper to get string value from DICOM tag
///
/// Returns `None` if the tag is not present or cannot be converted to string
pub fn get_string_value(dcm: &InMemDicomObject, tag: Tag) -> Option<String> {
    dcm.element(tag)
        .ok()
        .and_then(|elem| elem.to_str().ok())
        .map(|s| s.trim().to_string())
}

/// Helper to get a non-empty string value from DICOM tag
pub fn get_non_empty_string(dcm: &InMemDicomObject, tag: Tag) -> Option<String> {
    get_string_value(dcm, tag).filter(|s| !s.is_empty())
}
