//! Control-side errors

use thiserror::Error;

use crate::dsp::kernel::KernelError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    #[error("Kernel initialization failed: {0}")]
    Kernel(#[from] KernelError),

    #[error("Kernel initialization timed out after {attempts} attempt(s) of {timeout_ms} ms")]
    InitTimeout { attempts: u32, timeout_ms: u64 },

    #[error("Failed to spawn init thread: {0}")]
    Spawn(String),

    #[error("Control queue full of pending {0} messages")]
    QueueFull(&'static str),

    #[error("Audio side disconnected")]
    Disconnected,
}
