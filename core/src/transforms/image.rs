use super::TransformSpec;
use crate::error::{MiraiError, Result};
use crate::normalize::{PixelArray, PIXEL_MAX};
use image::imageops::{self, FilterType};

/// Transforms applied to the 2D pixel array before tensor conversion
#[derive(Debug, Clone, PartialEq)]
pub enum ImageTransform {
    /// Resize to `height` x `width`
    Scale2d { height: u32, width: u32 },
    /// Mirror the image so the breast sits on the left edge
    AlignToLeft,
    /// Crop `height` x `width` around the image center
    CenterCrop2d { height: u32, width: u32 },
}

impl ImageTransform {
    /// Builds a transform from its spec; `img_size` is `[height, width]`
    pub fn from_spec(spec: &TransformSpec, img_size: [u32; 2]) -> Result<Self> {
        match spec.name.as_str() {
            "scale_2d" => Ok(ImageTransform::Scale2d {
                height: spec.get_or("h", img_size[0])?,
                width: spec.get_or("w", img_size[1])?,
            }),
            "align_to_left" => Ok(ImageTransform::AlignToLeft),
            "center_crop_2d" => Ok(ImageTransform::CenterCrop2d {
                height: spec.get_or("h", img_size[0])?,
                width: spec.get_or("w", img_size[1])?,
            }),
            other => Err(MiraiError::Configuration(format!(
                "unknown image transformer '{}'",
                other
            ))),
        }
    }

    pub fn apply(&self, img: PixelArray) -> Result<PixelArray> {
        match *self {
            ImageTransform::Scale2d { height, width } => {
                if img.dimensions() == (width, height) {
                    Ok(img)
                } else {
                    Ok(resize(img, width, height))
                }
            }
            ImageTransform::AlignToLeft => {
                if right_heavier(&img) {
                    Ok(imageops::flip_horizontal(&img))
                } else {
                    Ok(img)
                }
            }
            ImageTransform::CenterCrop2d { height, width } => {
                let (w, h) = img.dimensions();
                if width > w || height > h {
                    return Err(MiraiError::Transform(format!(
                        "cannot crop {}x{} out of {}x{}",
                        height, width, h, w
                    )));
                }
                let x = (w - width) / 2;
                let y = (h - height) / 2;
                Ok(imageops::crop_imm(&img, x, y, width, height).to_image())
            }
        }
    }
}

/// Bilinear resize of a `[0, PIXEL_MAX]` array.
///
/// `imageops` clamps `f32` samples to `[0, 1]`, so values are rescaled into
/// that range for the resize and back afterwards.
fn resize(mut img: PixelArray, width: u32, height: u32) -> PixelArray {
    img.pixels_mut().for_each(|px| px[0] /= PIXEL_MAX);
    let mut out = imageops::resize(&img, width, height, FilterType::Triangle);
    out.pixels_mut().for_each(|px| px[0] *= PIXEL_MAX);
    out
}

/// Whether the right half carries more intensity than the left half
fn right_heavier(img: &PixelArray) -> bool {
    let half = img.width() / 2;
    let (mut left, mut right) = (0f64, 0f64);
    for (x, _, px) in img.enumerate_pixels() {
        if x < half {
            left += px[0] as f64;
        } else if x >= img.width() - half {
            right += px[0] as f64;
        }
    }
    right > left
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma};

    fn ramp(width: u32, height: u32, left_bright: bool) -> PixelArray {
        ImageBuffer::from_fn(width, height, |x, _| {
            let v = if left_bright { width - x } else { x + 1 };
            Luma([v as f32])
        })
    }

    #[test]
    fn test_scale_2d() {
        let out = ImageTransform::Scale2d {
            height: 8,
            width: 6,
        }
        .apply(ramp(3, 4, true))
        .unwrap();
        assert_eq!(out.dimensions(), (6, 8));
    }

    #[test]
    fn test_scale_2d_keeps_intensities() {
        let flat: PixelArray = ImageBuffer::from_pixel(3, 4, Luma([7047.99]));
        let out = ImageTransform::Scale2d {
            height: 8,
            width: 6,
        }
        .apply(flat)
        .unwrap();
        for px in out.pixels() {
            assert!((px[0] - 7047.99).abs() < 0.1, "got {}", px[0]);
        }

        let gradient: PixelArray =
            ImageBuffer::from_fn(4, 2, |x, _| Luma([1000.0 * (x + 1) as f32]));
        let out = ImageTransform::Scale2d {
            height: 2,
            width: 8,
        }
        .apply(gradient)
        .unwrap();
        let row: Vec<f32> = (0..8).map(|x| out.get_pixel(x, 0)[0]).collect();
        assert!(row.windows(2).all(|w| w[0] <= w[1]), "{:?}", row);
        assert!(row[0] >= 999.0 && row[7] <= 4001.0, "{:?}", row);
        assert!(row[7] - row[0] > 2000.0, "{:?}", row);
    }

    #[test]
    fn test_align_to_left_flips_right_breast() {
        let out = ImageTransform::AlignToLeft.apply(ramp(4, 2, false)).unwrap();
        assert_eq!(out.get_pixel(0, 0)[0], 4.0);
        assert_eq!(out.get_pixel(3, 1)[0], 1.0);
    }

    #[test]
    fn test_align_to_left_keeps_left_breast() {
        let img = ramp(4, 2, true);
        let out = ImageTransform::AlignToLeft.apply(img.clone()).unwrap();
        assert_eq!(out, img);
    }

    #[test]
    fn test_center_crop() {
        let out = ImageTransform::CenterCrop2d {
            height: 2,
            width: 2,
        }
        .apply(ramp(4, 4, false))
        .unwrap();
        assert_eq!(out.dimensions(), (2, 2));
        assert_eq!(out.get_pixel(0, 0)[0], 2.0);

        let too_big = ImageTransform::CenterCrop2d {
            height: 5,
            width: 2,
        }
        .apply(ramp(4, 4, false));
        assert!(matches!(too_big, Err(MiraiError::Transform(_))));
    }
}
