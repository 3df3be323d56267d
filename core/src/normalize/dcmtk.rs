//! DCMTK `dcmj2pnm` conversion backend

use super::png::decode_png;
use super::pixels::PixelArray;
use crate::error::{MiraiError, Result};
use std::process::Command;

const DCMJ2PNM: &str = "dcmj2pnm";

/// Returns true when `dcmj2pnm` can be executed
pub fn is_dcmtk_installed() -> bool {
    Command::new(DCMJ2PNM)
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

/// Converts a DICOM stream to pixels through a 16-bit PNG written by DCMTK
pub fn dcmtk_to_pixels(dicom_bytes: &[u8]) -> Result<PixelArray> {
    let dir = tempfile::tempdir()?;
    let dicom_path = dir.path().join("image.dcm");
    let png_path = dir.path().join("image.png");
    std::fs::write(&dicom_path, dicom_bytes)?;

    let output = Command::new(DCMJ2PNM)
        .arg("+on2")
        .arg("--min-max-window")
        .arg(&dicom_path)
        .arg(&png_path)
        .output()?;
    if !output.status.success() {
        return Err(MiraiError::ImageDecode(format!(
            "{} exited with {}: {}",
            DCMJ2PNM,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let png = std::fs::read(&png_path)?;
    decode_png(&png)
}
