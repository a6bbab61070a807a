//! Real-time pipeline, control path and diagnostics

pub mod assembler;
pub mod buffer;
pub mod clock;
pub mod control;
pub mod controller;
pub mod diagnostics;
pub mod drain;
pub mod metrics;
pub mod processor;

pub use assembler::{AssemblerError, FrameAssembler};
pub use buffer::{RecorderTaps, TapPoint, TapReader};
pub use control::ControlMessage;
pub use controller::{build_stream, DenoiserControl, StreamParts};
pub use diagnostics::{
    DiagnosticEvent, DiagnosticRecord, DiagnosticsLog, FrameReport, FrameStatus,
};
pub use drain::{DrainError, DrainStatus, OutputDrainBuffer};
pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use processor::{Phase, RealtimeDenoiser};
