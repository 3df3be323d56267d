use thiserror::Error;

/// Result type for mirai operations
pub type Result<T> = std::result::Result<T, MiraiError>;

/// Error types for mirai operations
#[derive(Error, Debug)]
pub enum MiraiError {
    /// Exam does not hold exactly the expected number of usable images
    #[error("Require exactly {expected} images, instead we got {actual}")]
    InputCount { expected: usize, actual: usize },

    /// A single image could not be parsed or converted
    #[error("Image decode error: {0}")]
    ImageDecode(String),

    /// Missing or invalid configuration (snapshot paths, transformer specs, ...)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Remote snapshot download failure
    #[error("Failed to download {uri}: {message}")]
    Transfer { uri: String, message: String },

    /// Malformed calibrator state
    #[error("Calibration error: {0}")]
    Calibration(String),

    /// DICOM reading error
    #[error("DICOM error: {0}")]
    DicomError(String),

    /// Tag not found in DICOM file
    #[error("Tag not found: {0}")]
    TagNotFound(String),

    /// Invalid tag value
    #[error("Invalid tag value: {0}")]
    InvalidValue(String),

    /// Transform pipeline failure (shape mismatch, bad tensor layout)
    #[error("Transform error: {0}")]
    Transform(String),

    /// Model execution failure
    #[error("Inference error: {0}")]
    Inference(String),

    /// I/O error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Image codec error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Snapshot archive error
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl MiraiError {
    /// Returns whether this error only concerns a single image of an exam
    pub fn is_per_image(&self) -> bool {
        matches!(
            self,
            MiraiError::ImageDecode(_)
                | MiraiError::DicomError(_)
                | MiraiError::TagNotFound(_)
                | MiraiError::InvalidValue(_)
                | MiraiError::Image(_)
        )
    }
}

// Convert dicom-object errors
impl From<dicom_object::ReadError> for MiraiError {
    fn from(e: dicom_object::ReadError) -> Self {
        MiraiError::DicomError(format!("{}", e))
    }
}

impl From<dicom_core::value::ConvertValueError> for MiraiError {
    fn from(e: dicom_core::value::ConvertValueError) -> Self {
        MiraiError::InvalidValue(format!("{}", e))
    }
}

impl From<dicom_pixeldata::Error> for MiraiError {
    fn from(e: dicom_pixeldata::Error) -> Self {
        MiraiError::ImageDecode(format!("{}", e))
    }
}

impl From<ndarray::ShapeError> for MiraiError {
    fn from(e: ndarray::ShapeError) -> Self {
        MiraiError::Transform(format!("{}", e))
    }
}

impl From<ort::Error> for MiraiError {
    fn from(e: ort::Error) -> Self {
        MiraiError::Inference(format!("{}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_count_message() {
        let err = MiraiError::InputCount {
            expected: 4,
            actual: 3,
        };
        assert_eq!(
            err.to_string(),
            "Require exactly 4 images, instead we got 3"
        );
        assert!(!err.is_per_image());
    }

    #[test]
    fn test_per_image_classification() {
        assert!(MiraiError::ImageDecode("bad".into()).is_per_image());
        assert!(MiraiError::DicomError("bad".into()).is_per_image());
        assert!(!MiraiError::Configuration("bad".into()).is_per_image());
    }
}
