//! Model configuration
//!
//! Mirrors the JSON configuration files shipped next to the trained
//! snapshots. Every field has a default so partial files load.

use crate::error::{MiraiError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Model name of the two-stage encoder + transformer network
pub const MIRAI_FULL: &str = "mirai_full";

/// Upper bound for the automatic thread count
const MAX_DEFAULT_THREADS: usize = 8;

/// Recognized configuration options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiraiConfig {
    /// `mirai_full` for the two-stage model, anything else for a single-file snapshot
    pub model_name: String,
    pub img_encoder_snapshot: Option<PathBuf>,
    pub transformer_snapshot: Option<PathBuf>,
    pub calibrator_path: Option<PathBuf>,
    /// Single-file model weights (non `mirai_full` models)
    pub snapshot: Option<PathBuf>,
    /// Zip archive holding the snapshots, fetched when local files are absent
    pub remote_snapshot_uri: Option<String>,
    /// Allow hardware acceleration; `false` pins inference to the CPU
    pub cuda: bool,
    /// Intra-op threads: >0 explicit, 0/unset automatic, <0 runtime default
    pub threads: Option<i32>,
    pub test_image_transformers: Vec<String>,
    pub test_tensor_transformers: Vec<String>,
    pub use_precomputed_hiddens: bool,
    pub freeze_image_encoder: bool,
    /// Target image size as `[height, width]`
    pub img_size: [u32; 2],
    pub img_mean: Vec<f32>,
    pub img_std: Vec<f32>,
    pub num_chan: usize,
    /// Per-image representation size kept from the encoder output
    pub img_repr_dim: usize,
    /// Opt in to the platform accelerator even though its operator coverage may be incomplete
    pub accelerator_opt_in: bool,
    /// Where remote snapshot archives are cached
    pub cache_dir: PathBuf,
}

impl Default for MiraiConfig {
    fn default() -> Self {
        Self {
            model_name: MIRAI_FULL.to_string(),
            img_encoder_snapshot: None,
            transformer_snapshot: None,
            calibrator_path: None,
            snapshot: None,
            remote_snapshot_uri: None,
            cuda: true,
            threads: None,
            test_image_transformers: vec!["scale_2d".to_string(), "align_to_left".to_string()],
            test_tensor_transformers: vec![
                "force_num_chan_2d".to_string(),
                "normalize_2d".to_string(),
            ],
            use_precomputed_hiddens: false,
            freeze_image_encoder: true,
            img_size: [2048, 1664],
            img_mean: vec![7047.99],
            img_std: vec![12005.5],
            num_chan: 3,
            img_repr_dim: 512,
            accelerator_opt_in: false,
            cache_dir: PathBuf::from("./.cache"),
        }
    }
}

/// Snapshot files a model is loaded from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotLayout {
    /// Separate image encoder and risk transformer graphs
    Full {
        encoder: PathBuf,
        transformer: PathBuf,
    },
    /// One graph from exam batch to logits
    Single { snapshot: PathBuf },
}

impl SnapshotLayout {
    /// All files that must exist before loading
    pub fn files(&self) -> Vec<&Path> {
        match self {
            SnapshotLayout::Full {
                encoder,
                transformer,
            } => vec![encoder.as_path(), transformer.as_path()],
            SnapshotLayout::Single { snapshot } => vec![snapshot.as_path()],
        }
    }

    /// Directory remote archives are extracted into
    pub fn destination_dir(&self) -> PathBuf {
        let anchor = match self {
            SnapshotLayout::Full { encoder, .. } => encoder,
            SnapshotLayout::Single { snapshot } => snapshot,
        };
        anchor
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn is_present(&self) -> bool {
        self.files().iter().all(|p| p.exists())
    }
}

impl MiraiConfig {
    /// Loads a configuration file and expands `~` in its paths
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            MiraiError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: MiraiConfig = serde_json::from_str(&contents)?;
        Ok(config.sanitize_paths())
    }

    /// Expands a leading `~` in every snapshot path
    ///
    /// Only expansion happens here; missing files surface when loading.
    pub fn sanitize_paths(mut self) -> Self {
        for path in [
            &mut self.img_encoder_snapshot,
            &mut self.transformer_snapshot,
            &mut self.calibrator_path,
            &mut self.snapshot,
        ]
        .into_iter()
        .flatten()
        {
            *path = expand_user(path);
        }
        self
    }

    pub fn is_full_model(&self) -> bool {
        self.model_name == MIRAI_FULL
    }

    /// Resolves which snapshot files this configuration points at
    pub fn snapshot_layout(&self) -> Result<SnapshotLayout> {
        if self.is_full_model() {
            match (&self.img_encoder_snapshot, &self.transformer_snapshot) {
                (Some(encoder), Some(transformer)) => Ok(SnapshotLayout::Full {
                    encoder: encoder.clone(),
                    transformer: transformer.clone(),
                }),
                _ => Err(MiraiError::Configuration(
                    "mirai_full requires img_encoder_snapshot and transformer_snapshot".to_string(),
                )),
            }
        } else {
            self.snapshot
                .clone()
                .map(|snapshot| SnapshotLayout::Single { snapshot })
                .ok_or_else(|| {
                    MiraiError::Configuration(format!(
                        "model '{}' requires a snapshot path",
                        self.model_name
                    ))
                })
        }
    }

    /// Number of intra-op threads to request, `None` to keep the runtime default
    pub fn intra_threads(&self) -> Option<usize> {
        resolve_threads(self.threads)
    }

    /// Training-time flags that are set but have no effect on exported graphs
    pub fn inert_flags(&self) -> Vec<&'static str> {
        let mut flags = Vec::new();
        if self.use_precomputed_hiddens {
            flags.push("use_precomputed_hiddens");
        }
        if self.freeze_image_encoder {
            flags.push("freeze_image_encoder");
        }
        flags
    }
}

/// Maps the configured thread count to an explicit request
pub fn resolve_threads(threads: Option<i32>) -> Option<usize> {
    match threads {
        Some(t) if t < 0 => None,
        Some(t) if t > 0 => Some(t as usize),
        _ => Some(default_threads()),
    }
}

fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(MAX_DEFAULT_THREADS)
}

/// Expands a leading `~` to the user's home directory
pub fn expand_user(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => path.to_path_buf(),
    }
}
