use super::TransformSpec;
use crate::config::MiraiConfig;
use crate::error::{MiraiError, Result};
use ndarray::{Array3, Axis};

/// Transforms applied to the `(C, H, W)` tensor
#[derive(Debug, Clone, PartialEq)]
pub enum TensorTransform {
    /// Replicate a single channel `num_chan` times
    ForceNumChan2d { num_chan: usize },
    /// `(x - mean) / std`, per channel or broadcast from one value
    Normalize2d { mean: Vec<f32>, std: Vec<f32> },
}

impl TensorTransform {
    pub fn from_spec(spec: &TransformSpec, config: &MiraiConfig) -> Result<Self> {
        match spec.name.as_str() {
            "force_num_chan_2d" => Ok(TensorTransform::ForceNumChan2d {
                num_chan: spec.get_or("num_chan", config.num_chan)?,
            }),
            "normalize_2d" => {
                if config.img_mean.is_empty() || config.img_mean.len() != config.img_std.len() {
                    return Err(MiraiError::Configuration(format!(
                        "img_mean ({}) and img_std ({}) must be non-empty and of equal length",
                        config.img_mean.len(),
                        config.img_std.len()
                    )));
                }
                if config.img_std.iter().any(|&s| s == 0.0) {
                    return Err(MiraiError::Configuration("img_std contains zero".into()));
                }
                Ok(TensorTransform::Normalize2d {
                    mean: config.img_mean.clone(),
                    std: config.img_std.clone(),
                })
            }
            other => Err(MiraiError::Configuration(format!(
                "unknown tensor transformer '{}'",
                other
            ))),
        }
    }

    pub fn apply(&self, tensor: Array3<f32>) -> Result<Array3<f32>> {
        match self {
            TensorTransform::ForceNumChan2d { num_chan } => {
                let channels = tensor.len_of(Axis(0));
                if channels == *num_chan {
                    return Ok(tensor);
                }
                if channels != 1 {
                    return Err(MiraiError::Transform(format!(
                        "cannot force {} channels to {}",
                        channels, num_chan
                    )));
                }
                let views = vec![tensor.view(); *num_chan];
                Ok(ndarray::concatenate(Axis(0), &views)?)
            }
            TensorTransform::Normalize2d { mean, std } => {
                let channels = tensor.len_of(Axis(0));
                if mean.len() != 1 && mean.len() != channels {
                    return Err(MiraiError::Transform(format!(
                        "{} normalization values for {} channels",
                        mean.len(),
                        channels
                    )));
                }
                let mut tensor = tensor;
                for (c, mut plane) in tensor.axis_iter_mut(Axis(0)).enumerate() {
                    let i = if mean.len() == 1 { 0 } else { c };
                    let (m, s) = (mean[i], std[i]);
                    plane.mapv_inplace(|v| (v - m) / s);
                }
                Ok(tensor)
            }
        }
    }
}
