use crate::error::Result;
use ort::execution_providers::{CPUExecutionProvider, ExecutionProviderDispatch};
use ort::logging::LogLevel;
use ort::session::Session;
use std::fmt;
use std::path::Path;

/// Execution target for ONNX sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Cuda,
    /// Platform accelerator (CoreML)
    Accelerator,
    Cpu,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Cuda => write!(f, "cuda"),
            DeviceKind::Accelerator => write!(f, "accelerator"),
            DeviceKind::Cpu => write!(f, "cpu"),
        }
    }
}

/// Which non-CPU execution providers this build and host can use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceCapabilities {
    pub cuda: bool,
    pub accelerator: bool,
}

impl DeviceCapabilities {
    /// Asks ONNX Runtime which compiled-in providers are usable
    pub fn probe() -> Self {
        Self {
            cuda: cuda_available(),
            accelerator: accelerator_available(),
        }
    }
}

#[cfg(feature = "cuda")]
fn cuda_available() -> bool {
    use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};
    CUDAExecutionProvider::default()
        .is_available()
        .unwrap_or(false)
}

#[cfg(not(feature = "cuda"))]
fn cuda_available() -> bool {
    false
}

#[cfg(feature = "coreml")]
fn accelerator_available() -> bool {
    use ort::execution_providers::{CoreMLExecutionProvider, ExecutionProvider};
    CoreMLExecutionProvider::default()
        .is_available()
        .unwrap_or(false)
}

#[cfg(not(feature = "coreml"))]
fn accelerator_available() -> bool {
    false
}

/// Caller preferences for device selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DevicePolicy {
    pub prefer_gpu: bool,
    /// The accelerator lacks some operators; only used when opted in
    pub accelerator_opt_in: bool,
}

/// Orders usable devices by preference; the CPU is always last
pub fn rank_devices(policy: DevicePolicy, caps: DeviceCapabilities) -> Vec<DeviceKind> {
    let mut ranked = Vec::with_capacity(3);
    if policy.prefer_gpu {
        if caps.cuda {
            ranked.push(DeviceKind::Cuda);
        }
        if caps.accelerator && policy.accelerator_opt_in {
            ranked.push(DeviceKind::Accelerator);
        }
    }
    ranked.push(DeviceKind::Cpu);
    ranked
}

/// The preferred device for `policy`
pub fn select_device(policy: DevicePolicy, caps: DeviceCapabilities) -> DeviceKind {
    rank_devices(policy, caps)
        .first()
        .copied()
        .unwrap_or(DeviceKind::Cpu)
}

/// Session settings shared by every graph of a model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub device: DeviceKind,
    /// `None` keeps the ONNX Runtime default
    pub intra_threads: Option<usize>,
}

fn execution_providers(device: DeviceKind) -> Vec<ExecutionProviderDispatch> {
    let mut providers = Vec::new();
    match device {
        #[cfg(feature = "cuda")]
        DeviceKind::Cuda => {
            providers.push(ort::execution_providers::CUDAExecutionProvider::default().build());
        }
        #[cfg(feature = "coreml")]
        DeviceKind::Accelerator => {
            providers.push(ort::execution_providers::CoreMLExecutionProvider::default().build());
        }
        _ => {}
    }
    // CPU fallback for operators the accelerator lacks
    providers.push(CPUExecutionProvider::default().build());
    providers
}

/// Opens an ONNX graph with the given device and thread settings
pub fn build_session(path: &Path, options: &SessionOptions) -> Result<Session> {
    let mut builder = Session::builder()?.with_log_level(LogLevel::Error)?;
    if let Some(threads) = options.intra_threads {
        builder = builder.with_intra_threads(threads)?;
    }
    builder = builder.with_execution_providers(execution_providers(options.device))?;
    Ok(builder.commit_from_file(path)?)
}
