//! Deterministic image → tensor pipeline
//!
//! Pipelines are described by textual specs of the form
//! `name[/key=value]*`, e.g. `scale_2d` or `center_crop_2d/h=1024/w=832`.
//! Image transformers run first on the pixel array, then the array becomes a
//! single-channel `(1, H, W)` tensor and the tensor transformers run in order.

pub mod image;
pub mod tensor;

pub use self::image::ImageTransform;
pub use self::tensor::TensorTransform;

use crate::config::MiraiConfig;
use crate::error::{MiraiError, Result};
use crate::normalize::PixelArray;
use ndarray::Array3;
use std::collections::BTreeMap;
use std::str::FromStr;

/// A parsed `name[/key=value]*` transformer entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformSpec {
    pub name: String,
    pub options: BTreeMap<String, String>,
}

impl TransformSpec {
    pub fn parse(spec: &str) -> Result<Self> {
        let mut parts = spec.trim().split('/');
        let name = parts.next().unwrap_or_default().trim();
        if name.is_empty() {
            return Err(MiraiError::Configuration(format!(
                "empty transformer name in '{}'",
                spec
            )));
        }

        let mut options = BTreeMap::new();
        for part in parts {
            let (key, value) = part.split_once('=').ok_or_else(|| {
                MiraiError::Configuration(format!(
                    "transformer option '{}' in '{}' is not key=value",
                    part, spec
                ))
            })?;
            options.insert(key.trim().to_string(), value.trim().to_string());
        }

        Ok(Self {
            name: name.to_string(),
            options,
        })
    }

    /// Parses option `key`, falling back to `default` when absent
    pub fn get_or<T: FromStr>(&self, key: &str, default: T) -> Result<T> {
        match self.options.get(key) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|_| {
                MiraiError::Configuration(format!(
                    "invalid value '{}' for option '{}' of '{}'",
                    raw, key, self.name
                ))
            }),
        }
    }
}

/// Composed image and tensor transformers, applied identically to every image
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Compose {
    image: Vec<ImageTransform>,
    tensor: Vec<TensorTransform>,
}

impl Compose {
    pub fn new(image: Vec<ImageTransform>, tensor: Vec<TensorTransform>) -> Self {
        Self { image, tensor }
    }

    /// Builds the test-time pipeline named by the configuration
    pub fn from_config(config: &MiraiConfig) -> Result<Self> {
        let image = config
            .test_image_transformers
            .iter()
            .map(|s| ImageTransform::from_spec(&TransformSpec::parse(s)?, config.img_size))
            .collect::<Result<Vec<_>>>()?;
        let tensor = config
            .test_tensor_transformers
            .iter()
            .map(|s| TensorTransform::from_spec(&TransformSpec::parse(s)?, config))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(image, tensor))
    }

    /// Produces a `(C, H, W)` tensor from one image
    pub fn apply(&self, pixels: &PixelArray) -> Result<Array3<f32>> {
        let mut img = pixels.clone();
        for t in &self.image {
            img = t.apply(img)?;
        }

        let (width, height) = img.dimensions();
        let mut tensor =
            Array3::from_shape_vec((1, height as usize, width as usize), img.into_raw())?;
        for t in &self.tensor {
            tensor = t.apply(tensor)?;
        }
        Ok(tensor)
    }
}
