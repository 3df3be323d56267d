//! Exam tensor assembly

use crate::error::{MiraiError, Result};
use crate::normalize::{require_count, ExamImage};
use crate::transforms::Compose;
use crate::types::EXAM_SIZE;
use ndarray::{stack, Array2, Array3, Array5, Axis};

/// Tensorized exam
///
/// `x` is `(1, C, N, H, W)`; the sequences are `(1, N)` and share the slot
/// order of `x`.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub x: Array5<f32>,
    pub view_seq: Array2<i64>,
    pub side_seq: Array2<i64>,
    pub time_seq: Array2<i64>,
}

impl Batch {
    /// Number of images per exam
    pub fn num_images(&self) -> usize {
        self.x.len_of(Axis(2))
    }
}

/// Transforms each image and stacks the results into a [`Batch`]
pub struct BatchCollator<'a> {
    transforms: &'a Compose,
}

impl<'a> BatchCollator<'a> {
    pub fn new(transforms: &'a Compose) -> Self {
        Self { transforms }
    }

    pub fn collate(&self, images: &[ExamImage]) -> Result<Batch> {
        require_count(images, EXAM_SIZE)?;

        let tensors = images
            .iter()
            .map(|img| self.transforms.apply(&img.pixels))
            .collect::<Result<Vec<Array3<f32>>>>()?;

        let first = tensors[0].dim();
        if let Some(bad) = tensors.iter().find(|t| t.dim() != first) {
            return Err(MiraiError::Transform(format!(
                "transform outputs differ in shape: {:?} vs {:?}",
                first,
                bad.dim()
            )));
        }

        // (N, C, H, W) -> (C, N, H, W) -> (1, C, N, H, W)
        let views: Vec<_> = tensors.iter().map(|t| t.view()).collect();
        let x = stack(Axis(0), &views)?
            .permuted_axes([1, 0, 2, 3])
            .as_standard_layout()
            .into_owned()
            .insert_axis(Axis(0));

        let n = images.len();
        let view_seq = Array2::from_shape_vec(
            (1, n),
            images.iter().map(|img| img.view.view.code()).collect(),
        )?;
        let side_seq = Array2::from_shape_vec(
            (1, n),
            images.iter().map(|img| img.view.laterality.code()).collect(),
        )?;

        Ok(Batch {
            x,
            view_seq,
            side_seq,
            time_seq: Array2::zeros((1, n)),
        })
    }
}
