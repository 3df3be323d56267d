//! Core type definitions for exam processing
//!
//! - [`Laterality`]: Breast laterality (Left, Right)
//! - [`ViewPosition`]: Screening view positions (CC, MLO)
//! - [`MammogramView`]: Combined laterality and view position
//! - [`PhotometricInterpretation`]: Pixel polarity of a DICOM image

mod enums;
mod view;

pub use enums::{Laterality, PhotometricInterpretation, ViewPosition};
pub use view::{MammogramView, EXAM_SIZE, STANDARD_MAMMO_VIEWS};
