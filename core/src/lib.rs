pub mod batch;
pub mod calibration;
pub mod cli;
pub mod config;
pub mod error;
pub mod extraction;
pub mod inference;
pub mod logging;
pub mod normalize;
pub mod report;
pub mod runtime;
pub mod transforms;
pub mod types;

pub use batch::{Batch, BatchCollator};
pub use calibration::{Calibrator, FittedCalibration};
pub use cli::report::TextReport;
pub use config::{MiraiConfig, SnapshotLayout};
pub use error::{MiraiError, Result};
pub use inference::{
    sigmoid, DeviceCapabilities, DeviceKind, DevicePolicy, ExamModel, ImageEncoder, ModelOutput,
    RiskTransformer, TwoStageModel,
};
pub use logging::{LogContext, LoggingConfig};
pub use normalize::{ExamImage, ExamNormalizer, ImageSource, Payload, PixelArray, WindowMethod};
pub use report::PredictionReport;
pub use runtime::{LoadState, ModelLoader, ModelRuntime, SnapshotFetcher};
pub use transforms::Compose;
pub use types::*;
