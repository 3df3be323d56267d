//! Exam ingestion
//!
//! Turns raw DICOM or PNG sources into one windowed pixel array per
//! (side, view) slot. Images that fail to parse or convert are logged and
//! skipped; the exam-level image count is enforced later by the runtime.

pub mod dcmtk;
pub mod dicom;
pub mod pixels;
pub mod png;

pub use dicom::{dicom_to_pixels, read_dicom, read_header, DicomHeader};
pub use pixels::{PixelArray, Window, WindowMethod, PIXEL_MAX};
pub use png::{decode_png, view_from_filename};

use crate::error::{MiraiError, Result};
use crate::logging::LogContext;
use crate::types::MammogramView;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Raw image bytes with the name they were submitted under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSource {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl ImageSource {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// Reads a source from disk, keeping the full path as its name
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        Ok(Self::new(path.to_string_lossy(), bytes))
    }
}

/// A selected image ready for the transform pipeline
#[derive(Debug, Clone)]
pub struct ExamImage {
    pub pixels: PixelArray,
    pub view: MammogramView,
    /// Name of the source the pixels came from
    pub source: String,
}

/// Per-request conversion options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Payload {
    /// Convert with DCMTK when it is installed
    pub dcmtk: bool,
    /// Accept DICOM streams without a preamble
    pub dcmread_force: bool,
    pub window_method: WindowMethod,
}

/// Slot chosen for a (side, view) pair during deduplication
struct Selected {
    view: MammogramView,
    index: usize,
    acquisition_key: Option<u64>,
}

/// Selects and converts the images of one exam
#[derive(Debug, Clone)]
pub struct ExamNormalizer {
    payload: Payload,
    use_dcmtk: bool,
    log: LogContext,
}

impl ExamNormalizer {
    /// Creates a normalizer, probing for DCMTK only when the payload asks for it
    pub fn new(payload: Payload, log: LogContext) -> Self {
        let use_dcmtk = payload.dcmtk && dcmtk::is_dcmtk_installed();
        Self::with_dcmtk(payload, use_dcmtk, log)
    }

    /// Creates a normalizer with an explicit DCMTK decision
    pub fn with_dcmtk(payload: Payload, use_dcmtk: bool, log: LogContext) -> Self {
        if use_dcmtk {
            debug!(target: log.target(), "Using dcmtk");
        } else {
            debug!(target: log.target(), "Using built-in DICOM decoder");
        }
        Self {
            payload,
            use_dcmtk,
            log,
        }
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Produces at most one image per (side, view), in first-encounter order
    pub fn normalize(&self, sources: &[ImageSource], is_dicom: bool) -> Vec<ExamImage> {
        if is_dicom {
            self.normalize_dicom(sources)
        } else {
            self.normalize_png(sources)
        }
    }

    fn normalize_dicom(&self, sources: &[ImageSource]) -> Vec<ExamImage> {
        let mut selected: Vec<Selected> = Vec::new();

        for (index, source) in sources.iter().enumerate() {
            let header = match read_dicom(&source.bytes, self.payload.dcmread_force)
                .and_then(|obj| read_header(&obj))
            {
                Ok(header) => header,
                Err(e) => {
                    warn!(target: self.log.target(), "Error reading DICOM {}: {}", source.name, e);
                    continue;
                }
            };

            match selected.iter_mut().find(|s| s.view == header.view) {
                None => selected.push(Selected {
                    view: header.view,
                    index,
                    acquisition_key: header.acquisition_key,
                }),
                Some(slot) => match (slot.acquisition_key, header.acquisition_key) {
                    (Some(prev), Some(cur)) => {
                        if cur > prev {
                            debug!(
                                target: self.log.target(),
                                "{} replaces {} for {} ({} > {})",
                                source.name, sources[slot.index].name, header.view, cur, prev
                            );
                            slot.index = index;
                            slot.acquisition_key = Some(cur);
                        }
                    }
                    _ => warn!(
                        target: self.log.target(),
                        "Error reading DICOM {}: duplicate {} without a comparable ContentDate/ContentTime",
                        source.name, header.view
                    ),
                },
            }
        }

        selected
            .into_iter()
            .filter_map(|slot| {
                let source = &sources[slot.index];
                match self.convert_dicom(source) {
                    Ok(pixels) => Some(ExamImage {
                        pixels,
                        view: slot.view,
                        source: source.name.clone(),
                    }),
                    Err(e) => {
                        warn!(target: self.log.target(), "{}: {}", source.name, e);
                        None
                    }
                }
            })
            .collect()
    }

    fn convert_dicom(&self, source: &ImageSource) -> Result<PixelArray> {
        if self.use_dcmtk {
            dcmtk::dcmtk_to_pixels(&source.bytes)
        } else {
            let obj = read_dicom(&source.bytes, self.payload.dcmread_force)?;
            dicom_to_pixels(&obj, self.payload.window_method)
        }
    }

    fn normalize_png(&self, sources: &[ImageSource]) -> Vec<ExamImage> {
        let mut selected: Vec<(MammogramView, &ImageSource)> = Vec::new();

        for source in sources {
            let view = match view_from_filename(&source.name) {
                Ok(view) => view,
                Err(e) => {
                    warn!(target: self.log.target(), "{}", e);
                    continue;
                }
            };
            match selected.iter_mut().find(|(v, _)| *v == view) {
                Some(slot) => slot.1 = source,
                None => selected.push((view, source)),
            }
        }

        selected
            .into_iter()
            .filter_map(|(view, source)| match decode_png(&source.bytes) {
                Ok(pixels) => Some(ExamImage {
                    pixels,
                    view,
                    source: source.name.clone(),
                }),
                Err(e) => {
                    warn!(target: self.log.target(), "{}: {}", source.name, e);
                    None
                }
            })
            .collect()
    }
}

/// Returns an error unless `images` holds exactly `expected` entries
pub fn require_count<T>(images: &[T], expected: usize) -> Result<()> {
    if images.len() == expected {
        Ok(())
    } else {
        Err(MiraiError::InputCount {
            expected,
            actual: images.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::dicom::fixtures::dicom_bytes;
    use super::png::fixtures::png_bytes;
    use super::*;
    use crate::types::{Laterality, ViewPosition, EXAM_SIZE};

    const PIXELS: Option<[u8; 4]> = Some([0, 10, 20, 30]);

    fn normalizer() -> ExamNormalizer {
        ExamNormalizer::with_dcmtk(Payload::default(), false, LogContext::named("test"))
    }

    fn dicom(name: &str, view: &str, side: &str, acquired: Option<(&str, &str)>) -> ImageSource {
        ImageSource::new(name, dicom_bytes(view, side, acquired, PIXELS, &format!("1.2.9.{}", name.len())))
    }

    #[test]
    fn test_dicom_exam() {
        let sources = vec![
            dicom("a", "CC", "L", None),
            dicom("b", "CC", "R", None),
            dicom("c", "MLO", "L", None),
            dicom("d", "MLO", "R", None),
        ];
        let images = normalizer().normalize(&sources, true);

        assert_eq!(images.len(), EXAM_SIZE);
        assert_eq!(
            images[3].view,
            MammogramView::new(Laterality::Right, ViewPosition::Mlo)
        );
        assert_eq!(images[0].pixels.dimensions(), (2, 2));
    }

    #[test]
    fn test_dicom_later_acquisition_wins() {
        let sources = vec![
            dicom("old", "CC", "L", Some(("20200101", "090000"))),
            dicom("other", "MLO", "L", None),
            dicom("new", "CC", "L", Some(("20200101", "100000.123"))),
            dicom("older", "CC", "L", Some(("20190101", "100000"))),
        ];
        let images = normalizer().normalize(&sources, true);

        assert_eq!(images.len(), 2);
        // Replacement keeps the slot of the image it replaces
        assert_eq!(images[0].source, "new");
        assert_eq!(images[1].source, "other");
    }

    #[test]
    fn test_dicom_tie_keeps_first() {
        let sources = vec![
            dicom("first", "CC", "L", Some(("20200101", "090000"))),
            dicom("second", "CC", "L", Some(("20200101", "090000"))),
        ];
        let images = normalizer().normalize(&sources, true);
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].source, "first");
    }

    #[test]
    fn test_dicom_duplicate_without_timestamp_is_skipped() {
        let sources = vec![
            dicom("first", "CC", "L", Some(("20200101", "090000"))),
            dicom("second", "CC", "L", None),
        ];
        let images = normalizer().normalize(&sources, true);
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].source, "first");
    }

    #[test]
    fn test_dicom_bad_images_are_skipped() {
        let sources = vec![
            ImageSource::new("garbage", b"not dicom".to_vec()),
            dicom("xccl", "XCCL", "L", None),
            ImageSource::new(
                "nopixels",
                dicom_bytes("MLO", "R", None, None, "1.2.9.99"),
            ),
            dicom("ok", "CC", "R", None),
        ];
        let images = normalizer().normalize(&sources, true);

        assert_eq!(images.len(), 1);
        assert_eq!(images[0].source, "ok");
    }

    #[test]
    fn test_png_exam() {
        let sources = vec![
            ImageSource::new("exam_1_CC_L.png", png_bytes(2, 2, 100)),
            ImageSource::new("exam_1_CC_R.png", png_bytes(2, 2, 200)),
            ImageSource::new("exam_1_MLO_L.png", png_bytes(2, 2, 300)),
            ImageSource::new("exam_1_MLO_R.png", png_bytes(2, 2, 400)),
            ImageSource::new("exam_2_CC_L.png", png_bytes(2, 2, 500)),
            ImageSource::new("notes.png", png_bytes(2, 2, 0)),
        ];
        let images = normalizer().normalize(&sources, false);

        assert_eq!(images.len(), 4);
        // Later duplicate overwrites in place
        assert_eq!(images[0].source, "exam_2_CC_L.png");
        assert_eq!(images[0].pixels.get_pixel(0, 0)[0], 500.0);
        assert_eq!(images[3].source, "exam_1_MLO_R.png");
    }

    #[test]
    fn test_require_count() {
        assert!(require_count(&[1, 2, 3, 4], EXAM_SIZE).is_ok());
        assert!(matches!(
            require_count(&[1, 2, 3], EXAM_SIZE),
            Err(MiraiError::InputCount {
                expected: 4,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_image_source_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan_MLO_R.png");
        std::fs::write(&path, png_bytes(1, 1, 7)).unwrap();

        let source = ImageSource::from_path(&path).unwrap();
        assert!(source.name.ends_with("scan_MLO_R.png"));
        assert_eq!(
            view_from_filename(&source.name).unwrap().view,
            ViewPosition::Mlo
        );
    }

    #[test]
    fn test_payload_defaults() {
        let payload: Payload = serde_json::from_str(r#"{"dcmtk": true}"#).unwrap();
        assert!(payload.dcmtk);
        assert!(!payload.dcmread_force);
        assert_eq!(payload.window_method, WindowMethod::Minmax);
    }
}
