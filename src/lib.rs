//! Voice Denoise Core - real-time speech denoising pipeline
//!
//! Reblocks host quanta into kernel frames around an RNNoise-style kernel:
//! Quantum In → Scale → Frame Assembler → Input Gain → Kernel → VAD/Output Gain
//! → Output Drain (priming) → Inverse Scale → Quantum Out

pub mod audio;
pub mod config;
pub mod dsp;
pub mod error;

#[cfg(feature = "python")]
pub mod python;

// Re-export main types
pub use audio::{
    build_stream, DenoiserControl, DiagnosticEvent, DiagnosticRecord, DiagnosticsLog,
    MetricsSnapshot, Phase, RealtimeDenoiser, RecorderTaps, StreamParts,
};
pub use config::PipelineConfig;
pub use dsp::{
    EngineAdapter, EngineState, KernelError, KernelResource, NoiseKernel, RnnoiseKernel,
    Settings, SettingsPatch,
};
pub use error::PipelineError;

#[cfg(feature = "python")]
use pyo3::prelude::*;

/// Python module initialization
#[cfg(feature = "python")]
#[pymodule]
fn voice_denoise_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<python::PyDenoiser>()?;
    Ok(())
}
