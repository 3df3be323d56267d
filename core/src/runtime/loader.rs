use crate::config::{MiraiConfig, SnapshotLayout};
use crate::error::Result;
use crate::inference::device::SessionOptions;
use crate::inference::{ExamModel, OnnxExamModel, OnnxImageEncoder, OnnxRiskTransformer, TwoStageModel};
use std::sync::Arc;

/// Turns snapshot files into a runnable model
pub trait ModelLoader: Send + Sync {
    fn load(
        &self,
        layout: &SnapshotLayout,
        config: &MiraiConfig,
        options: &SessionOptions,
    ) -> Result<Arc<dyn ExamModel>>;
}

/// Loads ONNX graphs through ONNX Runtime
#[derive(Debug, Clone, Copy, Default)]
pub struct OnnxModelLoader;

impl ModelLoader for OnnxModelLoader {
    fn load(
        &self,
        layout: &SnapshotLayout,
        config: &MiraiConfig,
        options: &SessionOptions,
    ) -> Result<Arc<dyn ExamModel>> {
        match layout {
            SnapshotLayout::Full {
                encoder,
                transformer,
            } => {
                let encoder = OnnxImageEncoder::load(encoder, options)?;
                let transformer = OnnxRiskTransformer::load(transformer, options)?;
                Ok(Arc::new(TwoStageModel::new(
                    Box::new(encoder),
                    Box::new(transformer),
                    config.img_repr_dim,
                )))
            }
            SnapshotLayout::Single { snapshot } => Ok(Arc::new(OnnxExamModel::load(snapshot, options)?)),
        }
    }
}
