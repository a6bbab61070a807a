//! Noise suppression kernel interface
//!
//! The kernel is an opaque collaborator: it accepts exactly one frame of
//! `frame_size()` samples in the int16 amplitude range, denoises it in place
//! and returns a speech confidence in [0, 1]. Whether the kernel is linked
//! statically, loaded dynamically or runs in-process is hidden behind this
//! trait.

use std::env;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised across the kernel lifecycle
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KernelError {
    #[error("Kernel allocation failed: {0}")]
    Allocation(String),

    #[error("Invalid kernel model: {0}")]
    InvalidModel(String),

    #[error("Kernel frame size mismatch: expected {expected} samples, got {actual}")]
    FrameSize { expected: usize, actual: usize },

    #[error("Kernel processing failed: {0}")]
    Processing(&'static str),

    #[error("Kernel not initialized")]
    NotReady,
}

impl KernelError {
    /// Short static description, safe to carry through real-time diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            KernelError::Allocation(_) => "allocation",
            KernelError::InvalidModel(_) => "invalid-model",
            KernelError::FrameSize { .. } => "frame-size",
            KernelError::Processing(reason) => reason,
            KernelError::NotReady => "not-ready",
        }
    }
}

/// Resource used to build a kernel (delivered with the `Init` message)
#[derive(Debug, Clone, Default, PartialEq)]
pub enum KernelResource {
    /// Weights compiled into the kernel
    #[default]
    Builtin,
    /// Serialized model weights
    ModelBytes(Vec<u8>),
}

impl KernelResource {
    /// Resolve the kernel resource from the environment.
    ///
    /// `DENOISE_MODEL_PATH` points at a model file; when unset the built-in
    /// weights are used. Reads the file, so call this from the control thread.
    pub fn from_env() -> Result<Self, KernelError> {
        match env::var("DENOISE_MODEL_PATH") {
            Ok(path) if !path.trim().is_empty() => {
                let path = PathBuf::from(path.trim());
                fs::read(&path).map(KernelResource::ModelBytes).map_err(|e| {
                    KernelError::InvalidModel(format!("{}: {}", path.display(), e))
                })
            }
            _ => Ok(KernelResource::Builtin),
        }
    }
}

/// Common interface for noise suppression kernels
///
/// Lifecycle: `init` once (allocates everything), any number of
/// `process_frame` calls, then `destroy`. `process_frame` must not allocate
/// and must run in bounded time.
pub trait NoiseKernel: Send {
    /// Exact number of samples per `process_frame` call
    fn frame_size(&self) -> usize;

    /// Allocate kernel state and working memory
    fn init(&mut self) -> Result<(), KernelError>;

    /// Optional warm-up pass after `init`. Kernels that need one override this.
    fn warm_up(&mut self) -> Result<(), KernelError> {
        Ok(())
    }

    /// Denoise one frame in place, returning speech confidence in [0, 1]
    fn process_frame(&mut self, frame: &mut [f32]) -> Result<f32, KernelError>;

    /// Release kernel state. The kernel must be re-initialized before reuse.
    fn destroy(&mut self);

    /// Human-readable kernel name for logs
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_is_static() {
        assert_eq!(KernelError::Processing("nan-output").kind(), "nan-output");
        assert_eq!(
            KernelError::FrameSize {
                expected: 480,
                actual: 256
            }
            .kind(),
            "frame-size"
        );
        assert_eq!(KernelError::Allocation("oom".into()).kind(), "allocation");
    }

    #[test]
    fn test_default_resource_is_builtin() {
        assert_eq!(KernelResource::default(), KernelResource::Builtin);
    }
}
