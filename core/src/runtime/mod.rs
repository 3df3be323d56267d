//! Model lifecycle and the single-exam entry point
//!
//! A [`ModelRuntime`] owns the network and calibrator. Both start
//! [`LoadState::Unloaded`] and are loaded at most once, either lazily by the
//! first prediction or up front by [`ModelRuntime::initialize`]. Loading
//! takes `&mut self`; once initialized, [`ModelRuntime::predict`] only needs
//! `&self`, so an initialized runtime can sit behind an `Arc` and serve
//! several threads.

pub mod loader;
pub mod snapshot;

pub use loader::{ModelLoader, OnnxModelLoader};
pub use snapshot::{download_if_needed, HttpFetcher, SnapshotFetcher, SNAPSHOT_ARCHIVE};

use crate::batch::{Batch, BatchCollator};
use crate::calibration::{calibrate, Calibrator};
use crate::config::MiraiConfig;
use crate::error::{MiraiError, Result};
use crate::inference::device::{select_device, SessionOptions};
use crate::inference::{DeviceCapabilities, DeviceKind, DevicePolicy, ExamModel};
use crate::logging::LogContext;
use crate::normalize::{require_count, ExamImage, ExamNormalizer, ImageSource, Payload};
use crate::report::PredictionReport;
use crate::transforms::Compose;
use crate::types::EXAM_SIZE;
use log::debug;
use ndarray::ArrayView2;
use std::sync::Arc;

/// Lifecycle of a lazily loaded resource
#[derive(Debug)]
pub enum LoadState<T: ?Sized> {
    Unloaded,
    Loaded(Arc<T>),
}

impl<T: ?Sized> LoadState<T> {
    pub fn get(&self) -> Option<&Arc<T>> {
        match self {
            LoadState::Unloaded => None,
            LoadState::Loaded(value) => Some(value),
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadState::Loaded(_))
    }
}

impl<T: ?Sized> Default for LoadState<T> {
    fn default() -> Self {
        LoadState::Unloaded
    }
}

/// Trained model plus calibrator, ready to score exams
pub struct ModelRuntime {
    config: MiraiConfig,
    loader: Box<dyn ModelLoader>,
    fetcher: Box<dyn SnapshotFetcher>,
    capabilities: DeviceCapabilities,
    model: LoadState<dyn ExamModel>,
    calibrator: LoadState<Calibrator>,
    device: Option<DeviceKind>,
    log: LogContext,
}

impl ModelRuntime {
    /// Runtime backed by ONNX Runtime and HTTP snapshot downloads
    pub fn new(config: MiraiConfig, log: LogContext) -> Self {
        Self::with_collaborators(
            config,
            Box::new(OnnxModelLoader),
            Box::new(HttpFetcher),
            DeviceCapabilities::probe(),
            log,
        )
    }

    pub fn with_collaborators(
        config: MiraiConfig,
        loader: Box<dyn ModelLoader>,
        fetcher: Box<dyn SnapshotFetcher>,
        capabilities: DeviceCapabilities,
        log: LogContext,
    ) -> Self {
        Self {
            config: config.sanitize_paths(),
            loader,
            fetcher,
            capabilities,
            model: LoadState::Unloaded,
            calibrator: LoadState::Unloaded,
            device: None,
            log,
        }
    }

    pub fn config(&self) -> &MiraiConfig {
        &self.config
    }

    pub fn version(&self) -> &'static str {
        crate::report::MODEL_VERSION
    }

    fn device_policy(&self) -> DevicePolicy {
        DevicePolicy {
            prefer_gpu: self.config.cuda,
            accelerator_opt_in: self.config.accelerator_opt_in,
        }
    }

    /// Device the model runs on; resolved for good by the first load
    pub fn device(&self) -> DeviceKind {
        self.device
            .unwrap_or_else(|| select_device(self.device_policy(), self.capabilities))
    }

    pub fn is_initialized(&self) -> bool {
        self.model.is_loaded() && (self.config.calibrator_path.is_none() || self.calibrator.is_loaded())
    }

    /// Loads the model and calibrator before any shared use
    pub fn initialize(&mut self) -> Result<()> {
        self.load_model()?;
        self.load_calibrator()?;
        Ok(())
    }

    /// Returns the model, loading it on first use
    pub fn load_model(&mut self) -> Result<Arc<dyn ExamModel>> {
        if let Some(model) = self.model.get() {
            return Ok(Arc::clone(model));
        }

        let target = self.log.target();
        debug!(target: target, "Loading model...");
        let device = self.device();

        let layout = self.config.snapshot_layout()?;
        download_if_needed(
            &layout,
            self.config.remote_snapshot_uri.as_deref(),
            &self.config.cache_dir,
            self.fetcher.as_ref(),
            &self.log,
        )?;
        if let Some(missing) = layout.files().into_iter().find(|p| !p.exists()) {
            return Err(MiraiError::Configuration(format!(
                "snapshot {} not found",
                missing.display()
            )));
        }

        for flag in self.config.inert_flags() {
            debug!(target: target, "{} has no effect at inference time", flag);
        }

        let options = SessionOptions {
            device,
            intra_threads: self.config.intra_threads(),
        };
        debug!(
            target: target,
            "Inference with {} (intra-op threads: {:?})", device, options.intra_threads
        );
        let model = self.loader.load(&layout, &self.config, &options)?;

        self.device = Some(device);
        self.model = LoadState::Loaded(Arc::clone(&model));
        Ok(model)
    }

    /// Returns the calibrator, loading it on first use; `None` when not configured
    pub fn load_calibrator(&mut self) -> Result<Option<Arc<Calibrator>>> {
        let Some(path) = self.config.calibrator_path.as_ref() else {
            return Ok(None);
        };
        if let Some(calibrator) = self.calibrator.get() {
            return Ok(Some(Arc::clone(calibrator)));
        }

        debug!(target: self.log.target(), "Loading calibrator...");
        let calibrator = Arc::new(Calibrator::from_file(path)?);
        self.calibrator = LoadState::Loaded(Arc::clone(&calibrator));
        Ok(Some(calibrator))
    }

    /// Transforms the exam images and stacks them into a batch
    pub fn collate_batch(&self, images: &[ExamImage], transforms: &Compose) -> Result<Batch> {
        debug!(target: self.log.target(), "Collating batches...");
        BatchCollator::new(transforms).collate(images)
    }

    /// Runs the model on a batch and calibrates the per-year probabilities
    pub fn process_image_joint(
        &self,
        batch: &Batch,
        model: &dyn ExamModel,
        calibrator: Option<&Calibrator>,
        risk_factors: Option<&[f32]>,
    ) -> Result<Vec<f64>> {
        debug!(target: self.log.target(), "Getting predictions...");
        let risk_factors = risk_factors
            .map(|rf| ArrayView2::from_shape((1, rf.len()), rf))
            .transpose()?;

        let probs = model.predict_proba(batch, risk_factors)?;
        debug!(target: self.log.target(), "Raw probs: {:?}", probs);
        calibrate(calibrator, &probs)
    }

    /// Scores one exam with already loaded resources
    pub fn predict(&self, images: &[ExamImage], risk_factors: Option<&[f32]>) -> Result<Vec<f64>> {
        require_count(images, EXAM_SIZE)?;
        let model = self.model.get().ok_or_else(|| {
            MiraiError::Configuration("model not loaded; call initialize() first".to_string())
        })?;
        if self.config.calibrator_path.is_some() && !self.calibrator.is_loaded() {
            return Err(MiraiError::Configuration(
                "calibrator not loaded; call initialize() first".to_string(),
            ));
        }

        debug!(target: self.log.target(), "Processing images...");
        let transforms = Compose::from_config(&self.config)?;
        let batch = self.collate_batch(images, &transforms)?;
        self.process_image_joint(
            &batch,
            model.as_ref(),
            self.calibrator.get().map(|c| c.as_ref()),
            risk_factors,
        )
    }

    /// Scores one exam, loading the model and calibrator if needed
    pub fn process_exam(
        &mut self,
        images: &[ExamImage],
        risk_factors: Option<&[f32]>,
    ) -> Result<Vec<f64>> {
        require_count(images, EXAM_SIZE)?;
        self.initialize()?;
        self.predict(images, risk_factors)
    }

    /// Full pipeline from raw image sources to a report
    pub fn run_model(
        &mut self,
        sources: &[ImageSource],
        payload: Option<Payload>,
        is_dicom: bool,
    ) -> Result<PredictionReport> {
        let normalizer = ExamNormalizer::new(payload.unwrap_or_default(), self.log.clone());
        let images = normalizer.normalize(sources, is_dicom);

        let y = self.process_exam(&images, None)?;
        debug!(target: self.log.target(), "Raw Predictions: {:?}", y);
        Ok(PredictionReport::new(&y))
    }
}

#[cfg(test)]
mod tests {
    use super::snapshot::fakes::ZipFetcher;
    use super::*;
    use crate::config::SnapshotLayout;
    use crate::inference::mocks::FixedModel;
    use crate::inference::sigmoid;
    use crate::normalize::png::fixtures::png_bytes;
    use crate::normalize::PixelArray;
    use crate::types::{Laterality, MammogramView, ViewPosition};
    use image::{ImageBuffer, Luma};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const LOGITS: [f32; 5] = [-2.0, -1.0, 0.0, 1.0, 2.0];

    struct CountingLoader {
        loads: Arc<AtomicUsize>,
        options: Arc<Mutex<Option<SessionOptions>>>,
    }

    impl ModelLoader for CountingLoader {
        fn load(
            &self,
            _layout: &SnapshotLayout,
            _config: &MiraiConfig,
            options: &SessionOptions,
        ) -> Result<Arc<dyn ExamModel>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            *self.options.lock().unwrap() = Some(*options);
            Ok(Arc::new(FixedModel {
                logits: LOGITS.to_vec(),
            }))
        }
    }

    struct Harness {
        runtime: ModelRuntime,
        loads: Arc<AtomicUsize>,
        options: Arc<Mutex<Option<SessionOptions>>>,
        fetcher: ZipFetcher,
    }

    fn small_config(dir: &Path) -> MiraiConfig {
        MiraiConfig {
            model_name: "mirai_single".to_string(),
            snapshot: Some(dir.join("snapshots/model.onnx")),
            cache_dir: dir.join(".cache"),
            img_size: [8, 6],
            threads: Some(2),
            ..Default::default()
        }
    }

    fn harness(config: MiraiConfig, caps: DeviceCapabilities) -> Harness {
        let loads = Arc::new(AtomicUsize::new(0));
        let options = Arc::new(Mutex::new(None));
        let fetcher = ZipFetcher::new(&[("model.onnx", &b"graph"[..])]);
        let runtime = ModelRuntime::with_collaborators(
            config,
            Box::new(CountingLoader {
                loads: loads.clone(),
                options: options.clone(),
            }),
            Box::new(fetcher.clone()),
            caps,
            LogContext::named("test"),
        );
        Harness {
            runtime,
            loads,
            options,
            fetcher,
        }
    }

    fn exam() -> Vec<ExamImage> {
        [
            (Laterality::Left, ViewPosition::Cc),
            (Laterality::Right, ViewPosition::Cc),
            (Laterality::Left, ViewPosition::Mlo),
            (Laterality::Right, ViewPosition::Mlo),
        ]
        .into_iter()
        .map(|(laterality, view)| {
            let pixels: PixelArray = ImageBuffer::from_pixel(3, 4, Luma([1000.0]));
            ExamImage {
                pixels,
                view: MammogramView::new(laterality, view),
                source: format!("{}", view),
            }
        })
        .collect()
    }

    #[test]
    fn test_load_model_downloads_once() {
        let dir = tempfile::tempdir().unwrap();
        let config = MiraiConfig {
            remote_snapshot_uri: Some("https://example.org/snapshots.zip".to_string()),
            ..small_config(dir.path())
        };
        let mut h = harness(config, DeviceCapabilities::default());

        let first = h.runtime.load_model().unwrap();
        let second = h.runtime.load_model().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(h.loads.load(Ordering::SeqCst), 1);
        assert_eq!(h.fetcher.calls(), 1);
        assert!(dir.path().join("snapshots/model.onnx").exists());
    }

    #[test]
    fn test_missing_snapshot_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = harness(small_config(dir.path()), DeviceCapabilities::default());

        assert!(matches!(
            h.runtime.load_model(),
            Err(MiraiError::Configuration(_))
        ));
        assert_eq!(h.fetcher.calls(), 0);
        assert_eq!(h.loads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_load_calibrator_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calibrator.json");
        std::fs::write(&path, r#"{"0": {"kind": "identity"}}"#).unwrap();
        let config = MiraiConfig {
            calibrator_path: Some(path.clone()),
            ..small_config(dir.path())
        };
        let mut h = harness(config, DeviceCapabilities::default());

        let first = h.runtime.load_calibrator().unwrap().unwrap();
        std::fs::remove_file(&path).unwrap();
        let second = h.runtime.load_calibrator().unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_no_calibrator_configured() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = harness(small_config(dir.path()), DeviceCapabilities::default());
        assert!(h.runtime.load_calibrator().unwrap().is_none());
    }

    #[test]
    fn test_device_selection() {
        let dir = tempfile::tempdir().unwrap();
        let gpu = DeviceCapabilities {
            cuda: true,
            accelerator: false,
        };

        assert_eq!(
            harness(small_config(dir.path()), DeviceCapabilities::default())
                .runtime
                .device(),
            DeviceKind::Cpu
        );
        assert_eq!(
            harness(small_config(dir.path()), gpu).runtime.device(),
            DeviceKind::Cuda
        );
        let cpu_only = MiraiConfig {
            cuda: false,
            ..small_config(dir.path())
        };
        assert_eq!(harness(cpu_only, gpu).runtime.device(), DeviceKind::Cpu);
    }

    #[test]
    fn test_process_exam_uncalibrated_is_sigmoid() {
        let dir = tempfile::tempdir().unwrap();
        let config = small_config(dir.path());
        std::fs::create_dir_all(dir.path().join("snapshots")).unwrap();
        std::fs::write(dir.path().join("snapshots/model.onnx"), b"graph").unwrap();
        let mut h = harness(config, DeviceCapabilities::default());

        let y = h.runtime.process_exam(&exam(), None).unwrap();
        let expected: Vec<f64> = LOGITS.iter().map(|&l| sigmoid(l)).collect();
        assert_eq!(y, expected);

        let options = h.options.lock().unwrap().unwrap();
        assert_eq!(options.device, DeviceKind::Cpu);
        assert_eq!(options.intra_threads, Some(2));
    }

    #[test]
    fn test_process_exam_with_calibrator() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("snapshots")).unwrap();
        std::fs::write(dir.path().join("snapshots/model.onnx"), b"graph").unwrap();
        let path = dir.path().join("calibrator.json");
        std::fs::write(
            &path,
            r#"{"0": {"kind": "identity"}, "2": {"kind": "sigmoid", "a": 0.0, "b": 0.0}}"#,
        )
        .unwrap();
        let config = MiraiConfig {
            calibrator_path: Some(path),
            ..small_config(dir.path())
        };
        let mut h = harness(config, DeviceCapabilities::default());

        let y = h.runtime.process_exam(&exam(), None).unwrap();
        assert_eq!(y, vec![sigmoid(-2.0), 0.0, 0.5, 0.0, 0.0]);
    }

    #[test]
    fn test_process_exam_requires_four_images() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = harness(small_config(dir.path()), DeviceCapabilities::default());
        let mut images = exam();
        images.truncate(3);

        assert!(matches!(
            h.runtime.process_exam(&images, None),
            Err(MiraiError::InputCount {
                expected: 4,
                actual: 3
            })
        ));
        // Count is checked before anything is loaded
        assert_eq!(h.loads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_predict_requires_initialize() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("snapshots")).unwrap();
        std::fs::write(dir.path().join("snapshots/model.onnx"), b"graph").unwrap();
        let mut h = harness(small_config(dir.path()), DeviceCapabilities::default());

        assert!(matches!(
            h.runtime.predict(&exam(), None),
            Err(MiraiError::Configuration(_))
        ));
        h.runtime.initialize().unwrap();
        assert!(h.runtime.is_initialized());

        let runtime = Arc::new(h.runtime);
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let runtime = Arc::clone(&runtime);
                std::thread::spawn(move || runtime.predict(&exam(), None).unwrap())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().len(), LOGITS.len());
        }
    }

    #[test]
    fn test_run_model_png_exam() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("snapshots")).unwrap();
        std::fs::write(dir.path().join("snapshots/model.onnx"), b"graph").unwrap();
        let mut h = harness(small_config(dir.path()), DeviceCapabilities::default());

        let sources: Vec<ImageSource> = ["CC_L", "CC_R", "MLO_L", "MLO_R"]
            .iter()
            .map(|suffix| ImageSource::new(format!("exam_1_{}.png", suffix), png_bytes(6, 8, 1200)))
            .collect();
        let report = h.runtime.run_model(&sources, None, false).unwrap();

        assert_eq!(report.predictions.len(), 5);
        assert_eq!(report.get("Year 3"), Some(0.5));
        assert_eq!(report.get("Year 1"), Some(0.1192));
        assert!(report.predictions.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_run_model_too_few_images() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = harness(small_config(dir.path()), DeviceCapabilities::default());
        let sources = vec![
            ImageSource::new("exam_1_CC_L.png", png_bytes(2, 2, 1)),
            ImageSource::new("exam_1_CC_R.png", b"broken".to_vec()),
        ];

        assert!(matches!(
            h.runtime.run_model(&sources, None, false),
            Err(MiraiError::InputCount { actual: 1, .. })
        ));
    }
}
