use super::pixels::{apply_window, to_pixel_array, PixelArray, Window, WindowMethod};
use crate::error::{MiraiError, Result};
use crate::extraction::{
    extract_acquisition_key, extract_mammogram_view, get_non_empty_string, get_string_value,
    PHOTOMETRIC_INTERPRETATION,
};
use crate::types::{MammogramView, PhotometricInterpretation};
use dicom_dictionary_std::tags;
use dicom_encoding::TransferSyntaxIndex;
use dicom_object::{DefaultDicomObject, FileMetaTableBuilder, InMemDicomObject};
use dicom_pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder};
use dicom_transfer_syntax_registry::TransferSyntaxRegistry;

/// Length of the Part 10 preamble preceding the `DICM` magic code
const PREAMBLE_LEN: usize = 128;
const MAGIC: &[u8; 4] = b"DICM";

const IMPLICIT_VR_LE: &str = "1.2.840.10008.1.2";
/// Digital Mammography X-Ray Image Storage - For Presentation
const MG_PRESENTATION_SOP_CLASS: &str = "1.2.840.10008.5.1.4.1.1.1.2";

/// Header fields used for view selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DicomHeader {
    pub view: MammogramView,
    /// ContentDate + ContentTime; `None` when missing or malformed
    pub acquisition_key: Option<u64>,
}

/// Parses a DICOM Part 10 stream
///
/// With `force`, streams that start directly at the magic code (no
/// preamble) are accepted as well, and anything else is read as a bare
/// implicit VR little endian dataset without file meta group.
pub fn read_dicom(bytes: &[u8], force: bool) -> Result<DefaultDicomObject> {
    let body = if bytes.len() >= PREAMBLE_LEN + MAGIC.len()
        && &bytes[PREAMBLE_LEN..PREAMBLE_LEN + MAGIC.len()] == MAGIC
    {
        &bytes[PREAMBLE_LEN..]
    } else if force && bytes.starts_with(MAGIC) {
        bytes
    } else if force {
        return read_raw_dataset(bytes);
    } else {
        return Err(MiraiError::DicomError(
            "missing DICM magic code after preamble".to_string(),
        ));
    };

    Ok(dicom_object::from_reader(body)?)
}

fn read_raw_dataset(bytes: &[u8]) -> Result<DefaultDicomObject> {
    let ts = TransferSyntaxRegistry.get(IMPLICIT_VR_LE).ok_or_else(|| {
        MiraiError::DicomError("implicit VR little endian is not registered".to_string())
    })?;
    let obj = InMemDicomObject::read_dataset_with_ts(bytes, ts)
        .map_err(|e| MiraiError::DicomError(format!("cannot read raw dataset: {}", e)))?;

    let sop_class = get_non_empty_string(&obj, tags::SOP_CLASS_UID)
        .unwrap_or_else(|| MG_PRESENTATION_SOP_CLASS.to_string());
    let sop_instance =
        get_non_empty_string(&obj, tags::SOP_INSTANCE_UID).unwrap_or_else(|| "2.25.0".to_string());
    obj.with_meta(
        FileMetaTableBuilder::new()
            .transfer_syntax(IMPLICIT_VR_LE)
            .media_storage_sop_class_uid(sop_class)
            .media_storage_sop_instance_uid(sop_instance),
    )
    .map_err(|e| MiraiError::DicomError(format!("cannot build file meta group: {}", e)))
}

/// Reads view/side and acquisition ordering from a parsed object
pub fn read_header(obj: &DefaultDicomObject) -> Result<DicomHeader> {
    Ok(DicomHeader {
        view: extract_mammogram_view(obj)?,
        acquisition_key: extract_acquisition_key(obj).ok(),
    })
}

/// Decodes the first frame and windows it into a pixel array
pub fn dicom_to_pixels(obj: &DefaultDicomObject, method: WindowMethod) -> Result<PixelArray> {
    let photometric = get_string_value(obj, PHOTOMETRIC_INTERPRETATION)
        .map(|s| PhotometricInterpretation::from_str(&s))
        .unwrap_or(PhotometricInterpretation::Unknown);
    let decoded = obj.decode_pixel_data()?;
    let grayscale = photometric.is_monochrome() || photometric == PhotometricInterpretation::Unknown;
    if decoded.samples_per_pixel() != 1 || !grayscale {
        return Err(MiraiError::ImageDecode(format!(
            "expected grayscale image, found {:?} with {} samples per pixel",
            photometric,
            decoded.samples_per_pixel()
        )));
    }

    let width = decoded.columns();
    let height = decoded.rows();
    let options = ConvertOptions::new().with_modality_lut(ModalityLutOption::Default);
    let mut values: Vec<f32> = decoded.to_vec_with_options(&options)?;
    values.truncate(width as usize * height as usize);

    let header_window = decoded
        .window()
        .ok()
        .flatten()
        .and_then(|w| w.first())
        .map(|w| Window {
            center: w.center,
            width: w.width,
        });
    apply_window(&mut values, method, header_window, photometric.is_inverted());
    to_pixel_array(width, height, values)
}
