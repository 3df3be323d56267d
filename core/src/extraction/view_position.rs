use crate::error::{MiraiError, Result};
use crate::types::ViewPosition;
use dicom_object::InMemDicomObject;

use super::tags::{
    get_non_empty_string, CODE_MEANING, VIEW_CODE_SEQUENCE, VIEW_POSITION as VIEW_POSITION_TAG,
};

// Code meanings of the two screening views in ViewCodeSequence
const CC_MEANINGS: &[&str] = &["cranio-caudal", "caudal-cranial"];
const MLO_MEANINGS: &[&str] = &["medio-lateral oblique", "medial-lateral oblique"];

/// Extracts view position from a DICOM header
///
/// # Algorithm
///
/// 1. ViewPosition tag, which must read "CC" or "MLO" when present
/// 2. If absent, the first ViewCodeSequence item whose CodeMeaning names
///    one of the screening views
///
/// Supplementary views (XCCL, ML, spot compressions, ...) are errors: the
/// risk model was trained on the four screening views only.
pub fn extract_view_position(dcm: &InMemDicomObject) -> Result<ViewPosition> {
    if let Some(vp) = get_non_empty_string(dcm, VIEW_POSITION_TAG) {
        return ViewPosition::from_str(&vp)
            .ok_or_else(|| MiraiError::InvalidValue(format!("unsupported view position '{}'", vp)));
    }

    extract_from_view_code_sequence(dcm)
        .ok_or_else(|| MiraiError::TagNotFound("ViewPosition".to_string()))
}

fn extract_from_view_code_sequence(dcm: &InMemDicomObject) -> Option<ViewPosition> {
    let items = dcm.element(VIEW_CODE_SEQUENCE).ok()?.items()?;
    items
        .iter()
        .filter_map(|item| get_non_empty_string(item, CODE_MEANING))
        .find_map(|meaning| parse_code_meaning(&meaning))
}

fn parse_code_meaning(meaning: &str) -> Option<ViewPosition> {
    let meaning = meaning.trim().to_lowercase();
    if CC_MEANINGS.contains(&meaning.as_str()) {
        Some(ViewPosition::Cc)
    } else if MLO_MEANINGS.contains(&meaning.as_str()) {
        Some(ViewPosition::Mlo)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom_core::value::{DataSetSequence, PrimitiveValue};
    use dicom_core::{DataElement, VR};
    use rstest::rstest;

    fn view_code_sequence(meanings: &[&str]) -> DataElement<InMemDicomObject> {
        let items: Vec<InMemDicomObject> = meanings
            .iter()
            .map(|m| {
                InMemDicomObject::from_element_iter([DataElement::new(
                    CODE_MEANING,
                    VR::LO,
                    PrimitiveValue::from(*m),
                )])
            })
            .collect();
        DataElement::new(VIEW_CODE_SEQUENCE, VR::SQ, DataSetSequence::from(items))
    }

    #[rstest]
    #[case("CC", ViewPosition::Cc)]
    #[case("MLO", ViewPosition::Mlo)]
    #[case("mlo", ViewPosition::Mlo)]
    fn test_view_position_tag(#[case] value: &str, #[case] expected: ViewPosition) {
        let mut dcm = InMemDicomObject::new_empty();
        dcm.put(DataElement::new(
            VIEW_POSITION_TAG,
            VR::CS,
            PrimitiveValue::from(value),
        ));
        assert_eq!(extract_view_position(&dcm).unwrap(), expected);
    }

    #[rstest]
    #[case("XCCL")]
    #[case("ML")]
    #[case("LM")]
    fn test_supplementary_views_rejected(#[case] value: &str) {
        let mut dcm = InMemDicomObject::new_empty();
        dcm.put(DataElement::new(
            VIEW_POSITION_TAG,
            VR::CS,
            PrimitiveValue::from(value),
        ));
        // An explicit non-screening view must not fall through to the sequence
        dcm.put(view_code_sequence(&["cranio-caudal"]));
        assert!(matches!(
            extract_view_position(&dcm),
            Err(MiraiError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_fallback_to_view_code_sequence() {
        let mut dcm = InMemDicomObject::new_empty();
        dcm.put(view_code_sequence(&["unknown view", "medio-lateral oblique"]));
        assert_eq!(extract_view_position(&dcm).unwrap(), ViewPosition::Mlo);
    }

    #[test]
    fn test_missing_view_is_error() {
        let dcm = InMemDicomObject::new_empty();
        assert!(matches!(
            extract_view_position(&dcm),
            Err(MiraiError::TagNotFound(_))
        ));
    }
}
