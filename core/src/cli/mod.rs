pub mod report;

use crate::config::MiraiConfig;
use crate::error::Result;
use crate::logging::{parse_level, LoggingConfig};
use crate::normalize::{Payload, WindowMethod};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Command-line arguments for mirai
#[derive(Parser, Debug)]
#[command(name = "mirai")]
#[command(about = "Breast cancer risk prediction from a four-view mammogram exam")]
#[command(version)]
pub struct Cli {
    /// Exam images: four DICOM files, or PNGs named <...>_<CC|MLO>_<L|R>.png
    #[arg(value_name = "FILE", required = true)]
    pub files: Vec<PathBuf>,

    /// Model configuration (JSON)
    #[arg(short, long, value_name = "CONFIG")]
    pub config: PathBuf,

    /// Intra-op threads: >0 explicit, 0 automatic, <0 runtime default
    #[arg(long, allow_negative_numbers = true)]
    pub threads: Option<i32>,

    /// Convert DICOM with DCMTK's dcmj2pnm when installed
    #[arg(long)]
    pub use_dcmtk: bool,

    /// Accept DICOM files without a preamble
    #[arg(long)]
    pub dcmread_force: bool,

    /// DICOM windowing when not using DCMTK
    #[arg(long, default_value = "minmax")]
    pub window_method: WindowMethod,

    /// Inputs are PNG files instead of DICOM
    #[arg(long)]
    pub use_pngs: bool,

    /// Log level (DEBUG, INFO, WARNING, ERROR)
    #[arg(long, default_value = "WARNING")]
    pub loglevel: String,

    /// Also append log records to this file
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Write the report here instead of stdout
    #[arg(short, long, value_name = "PATH")]
    pub output_path: Option<PathBuf>,

    /// Select and convert images, but skip inference
    #[arg(long)]
    pub dry_run: bool,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format
    Text,
    /// JSON format
    Json,
}

impl Cli {
    pub fn logging_config(&self) -> Result<LoggingConfig> {
        let config = LoggingConfig::new(parse_level(&self.loglevel)?);
        Ok(match &self.log_file {
            Some(path) => config.with_file(path),
            None => config,
        })
    }

    pub fn payload(&self) -> Payload {
        Payload {
            dcmtk: self.use_dcmtk,
            dcmread_force: self.dcmread_force,
            window_method: self.window_method,
        }
    }

    /// Applies command-line overrides on top of the file configuration
    pub fn apply_overrides(&self, mut config: MiraiConfig) -> MiraiConfig {
        if let Some(threads) = self.threads {
            config.threads = Some(threads);
        }
        config
    }

    pub fn is_dicom(&self) -> bool {
        !self.use_pngs
    }
}
