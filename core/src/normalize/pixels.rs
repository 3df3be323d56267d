use crate::error::{MiraiError, Result};
use image::{ImageBuffer, Luma};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Grayscale pixel array shared by every backend, values in `[0, PIXEL_MAX]`
pub type PixelArray = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Upper bound of normalized pixel values (16-bit range)
pub const PIXEL_MAX: f32 = 65535.0;

/// Windowing applied when converting DICOM pixel values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowMethod {
    /// Stretch the image's own min/max to the full range
    #[default]
    Minmax,
    /// Use the header's VOI window, falling back to min/max when absent
    Auto,
}

impl FromStr for WindowMethod {
    type Err = MiraiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "minmax" => Ok(WindowMethod::Minmax),
            "auto" => Ok(WindowMethod::Auto),
            other => Err(MiraiError::Configuration(format!(
                "unknown window method '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for WindowMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowMethod::Minmax => write!(f, "minmax"),
            WindowMethod::Auto => write!(f, "auto"),
        }
    }
}

/// VOI window read from the header
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    pub center: f64,
    pub width: f64,
}

/// Maps values linearly so the smallest becomes 0 and the largest PIXEL_MAX
pub fn minmax_window(values: &mut [f32]) {
    let (min, max) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;
    for v in values.iter_mut() {
        *v = if range > 0.0 {
            (*v - min) / range * PIXEL_MAX
        } else {
            0.0
        };
    }
}

/// DICOM linear VOI function (PS3.3 C.11.2.1.2) scaled to PIXEL_MAX
pub fn voi_window(values: &mut [f32], window: Window) {
    let c = window.center - 0.5;
    let w = window.width - 1.0;
    let lower = c - w / 2.0;
    let upper = c + w / 2.0;
    let y_max = PIXEL_MAX as f64;

    for v in values.iter_mut() {
        let x = *v as f64;
        let y = if x <= lower {
            0.0
        } else if x > upper {
            y_max
        } else {
            ((x - c) / w + 0.5) * y_max
        };
        *v = y as f32;
    }
}

/// Applies the requested window, inverting MONOCHROME1 data afterwards
pub fn apply_window(
    values: &mut [f32],
    method: WindowMethod,
    header_window: Option<Window>,
    inverted: bool,
) {
    match (method, header_window) {
        (WindowMethod::Auto, Some(window)) if window.width > 1.0 => voi_window(values, window),
        _ => minmax_window(values),
    }
    if inverted {
        for v in values.iter_mut() {
            *v = PIXEL_MAX - *v;
        }
    }
}

/// Wraps row-major values into a pixel array
pub fn to_pixel_array(width: u32, height: u32, values: Vec<f32>) -> Result<PixelArray> {
    let expected = width as usize * height as usize;
    if values.len() < expected {
        return Err(MiraiError::ImageDecode(format!(
            "expected {} pixels for {}x{}, got {}",
            expected,
            width,
            height,
            values.len()
        )));
    }
    let mut values = values;
    values.truncate(expected);
    ImageBuffer::from_raw(width, height, values)
        .ok_or_else(|| MiraiError::ImageDecode("pixel buffer does not match dimensions".into()))
}
