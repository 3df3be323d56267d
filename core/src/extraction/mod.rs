pub mod acquisition;
pub mod laterality;
pub mod tags;
pub mod view_position;

pub use acquisition::{acquisition_key, extract_acquisition_key};
pub use laterality::extract_laterality;
pub use tags::*;
pub use view_position::extract_view_position;

use crate::error::Result;
use crate::types::MammogramView;
use dicom_object::InMemDicomObject;

/// Extracts the (side, view) slot a DICOM image belongs to
pub fn extract_mammogram_view(dcm: &InMemDicomObject) -> Result<MammogramView> {
    Ok(MammogramView::new(
        extract_laterality(dcm)?,
        extract_view_position(dcm)?,
    ))
}
