use super::pixels::PixelArray;
use crate::error::{MiraiError, Result};
use crate::types::{Laterality, MammogramView, ViewPosition};
use image::{ImageBuffer, ImageFormat};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

fn filename_re() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"(?i)_(CC|MLO)_(L|R)$").expect("Failed to compile regex"))
}

/// Reads view and side from a `<anything>_<VIEW>_<SIDE>.png` file name
pub fn view_from_filename(name: &str) -> Result<MammogramView> {
    let stem = Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name);
    let caps = filename_re().captures(stem).ok_or_else(|| {
        MiraiError::InvalidValue(format!(
            "file name '{}' does not end in _<CC|MLO>_<L|R>",
            name
        ))
    })?;

    // Both groups are constrained by the pattern
    let view = ViewPosition::from_str(&caps[1])
        .ok_or_else(|| MiraiError::InvalidValue(format!("view '{}'", &caps[1])))?;
    let laterality = Laterality::from_str(&caps[2])
        .ok_or_else(|| MiraiError::InvalidValue(format!("side '{}'", &caps[2])))?;
    Ok(MammogramView::new(laterality, view))
}

/// Decodes a PNG into 16-bit grayscale pixel values
pub fn decode_png(bytes: &[u8]) -> Result<PixelArray> {
    let img = image::load_from_memory_with_format(bytes, ImageFormat::Png)?.to_luma16();
    let (width, height) = img.dimensions();
    let values = img.into_raw().into_iter().map(f32::from).collect();
    ImageBuffer::from_raw(width, height, values)
        .ok_or_else(|| MiraiError::ImageDecode("PNG buffer does not match dimensions".into()))
}
