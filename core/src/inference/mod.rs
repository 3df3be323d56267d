//! Two-stage forward pass
//!
//! Stage 1 encodes every image of the exam independently; stage 2 reads the
//! per-image representations as a sequence and emits one logit per
//! prediction horizon. Both stages are opaque learned functions behind
//! [`ImageEncoder`] and [`RiskTransformer`].

pub mod device;
pub mod onnx;

pub use device::{rank_devices, DeviceCapabilities, DeviceKind, DevicePolicy};
pub use onnx::{OnnxExamModel, OnnxGraph, OnnxImageEncoder, OnnxRiskTransformer, TensorInput};

use crate::batch::Batch;
use crate::error::{MiraiError, Result};
use ndarray::{s, Array2, Array3, ArrayD, ArrayView2, ArrayView3, ArrayView4};
use std::collections::BTreeMap;

/// Raw outputs of a forward pass
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutput {
    /// `(B, K)` logits, one column per horizon
    pub logits: Array2<f32>,
    pub hidden: Option<ArrayD<f32>>,
    /// Diagnostic activations keyed by output name
    pub activations: BTreeMap<String, ArrayD<f32>>,
}

impl ModelOutput {
    pub fn from_logits(logits: Array2<f32>) -> Self {
        Self {
            logits,
            hidden: None,
            activations: BTreeMap::new(),
        }
    }
}

/// Stage 1: `(B*N, C, H, W)` images to `(B*N, D)` representations
pub trait ImageEncoder: Send + Sync {
    fn encode(
        &self,
        images: ArrayView4<f32>,
        risk_factors: Option<ArrayView2<f32>>,
    ) -> Result<Array2<f32>>;
}

/// Stage 2: `(B, N, repr_dim)` sequence plus exam annotations to logits
pub trait RiskTransformer: Send + Sync {
    fn forward(
        &self,
        img_x: ArrayView3<f32>,
        risk_factors: Option<ArrayView2<f32>>,
        batch: &Batch,
    ) -> Result<ModelOutput>;
}

/// A complete exam → logits model
pub trait ExamModel: Send + Sync {
    fn forward(&self, batch: &Batch, risk_factors: Option<ArrayView2<f32>>) -> Result<ModelOutput>;

    /// Per-horizon probabilities of the first exam in the batch
    fn predict_proba(
        &self,
        batch: &Batch,
        risk_factors: Option<ArrayView2<f32>>,
    ) -> Result<Vec<f64>> {
        let output = self.forward(batch, risk_factors)?;
        if output.logits.nrows() == 0 {
            return Err(MiraiError::Inference("model returned no logits".into()));
        }
        Ok(output.logits.row(0).iter().map(|&l| sigmoid(l)).collect())
    }
}

pub fn sigmoid(x: f32) -> f64 {
    1.0 / (1.0 + (-(x as f64)).exp())
}

/// Encoder and transformer run back to back
pub struct TwoStageModel {
    encoder: Box<dyn ImageEncoder>,
    transformer: Box<dyn RiskTransformer>,
    img_repr_dim: usize,
}

impl TwoStageModel {
    pub fn new(
        encoder: Box<dyn ImageEncoder>,
        transformer: Box<dyn RiskTransformer>,
        img_repr_dim: usize,
    ) -> Self {
        Self {
            encoder,
            transformer,
            img_repr_dim,
        }
    }
}

impl ExamModel for TwoStageModel {
    fn forward(&self, batch: &Batch, risk_factors: Option<ArrayView2<f32>>) -> Result<ModelOutput> {
        let (b, c, n, h, w) = batch.x.dim();

        // (B, C, N, H, W) -> (B, N, C, H, W) -> (B*N, C, H, W)
        let images = batch
            .x
            .view()
            .permuted_axes([0, 2, 1, 3, 4])
            .as_standard_layout()
            .into_owned()
            .into_shape_with_order((b * n, c, h, w))?;

        let per_image_risk = risk_factors
            .map(|rf| {
                if rf.nrows() != b {
                    return Err(MiraiError::Inference(format!(
                        "{} risk factor rows for a batch of {}",
                        rf.nrows(),
                        b
                    )));
                }
                Ok(Array2::from_shape_fn((b * n, rf.ncols()), |(i, j)| {
                    rf[[i / n, j]]
                }))
            })
            .transpose()?;

        let encoded = self
            .encoder
            .encode(images.view(), per_image_risk.as_ref().map(|rf| rf.view()))?;
        if encoded.nrows() != b * n || encoded.ncols() < self.img_repr_dim {
            return Err(MiraiError::Inference(format!(
                "encoder returned {:?}, expected ({}, >={})",
                encoded.dim(),
                b * n,
                self.img_repr_dim
            )));
        }

        let img_x: Array3<f32> = encoded
            .slice(s![.., ..self.img_repr_dim])
            .to_owned()
            .into_shape_with_order((b, n, self.img_repr_dim))?;

        self.transformer.forward(img_x.view(), risk_factors, batch)
    }
}
