//! Deterministic kernels and helpers shared by the integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use voice_denoise_core::{
    build_stream, KernelError, NoiseKernel, PipelineConfig, RealtimeDenoiser, StreamParts,
};

/// Leaves samples untouched and reports a fixed confidence.
///
/// Counts frames and checks every frame has exactly `frame_size` samples.
pub struct IdentityKernel {
    pub frame_size: usize,
    pub confidence: f32,
    pub frames: Arc<AtomicUsize>,
    pub bad_frames: Arc<AtomicUsize>,
}

impl IdentityKernel {
    pub fn new(frame_size: usize, confidence: f32) -> Self {
        Self {
            frame_size,
            confidence,
            frames: Arc::new(AtomicUsize::new(0)),
            bad_frames: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl NoiseKernel for IdentityKernel {
    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn init(&mut self) -> Result<(), KernelError> {
        Ok(())
    }

    fn process_frame(&mut self, frame: &mut [f32]) -> Result<f32, KernelError> {
        if frame.len() != self.frame_size {
            self.bad_frames.fetch_add(1, Ordering::SeqCst);
        }
        self.frames.fetch_add(1, Ordering::SeqCst);
        Ok(self.confidence)
    }

    fn destroy(&mut self) {}

    fn name(&self) -> &'static str {
        "identity"
    }
}

/// Fails during `init`
pub struct FailingInitKernel {
    pub frame_size: usize,
}

impl NoiseKernel for FailingInitKernel {
    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn init(&mut self) -> Result<(), KernelError> {
        Err(KernelError::Allocation("simulated out of memory".into()))
    }

    fn process_frame(&mut self, _frame: &mut [f32]) -> Result<f32, KernelError> {
        Err(KernelError::NotReady)
    }

    fn destroy(&mut self) {}

    fn name(&self) -> &'static str {
        "failing-init"
    }
}

/// Identity for `good_frames` frames, then fails every call
pub struct FailAfterKernel {
    pub frame_size: usize,
    pub good_frames: usize,
    processed: usize,
}

impl FailAfterKernel {
    pub fn new(frame_size: usize, good_frames: usize) -> Self {
        Self {
            frame_size,
            good_frames,
            processed: 0,
        }
    }
}

impl NoiseKernel for FailAfterKernel {
    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn init(&mut self) -> Result<(), KernelError> {
        Ok(())
    }

    fn process_frame(&mut self, _frame: &mut [f32]) -> Result<f32, KernelError> {
        if self.processed >= self.good_frames {
            return Err(KernelError::Processing("simulated kernel fault"));
        }
        self.processed += 1;
        Ok(0.9)
    }

    fn destroy(&mut self) {}

    fn name(&self) -> &'static str {
        "fail-after"
    }
}

/// Default pipeline geometry (480-sample frames, 128-sample quanta) with
/// per-frame diagnostics and a short init timeout
pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        diagnostics_interval_frames: 1,
        diagnostics_capacity: 4096,
        init_timeout_ms: 2_000,
        ..PipelineConfig::default()
    }
}

pub fn stream(config: PipelineConfig) -> StreamParts {
    build_stream(config).expect("valid test config")
}

/// Feed `input` through `processor` in `quantum`-sized calls
pub fn run(processor: &mut RealtimeDenoiser, input: &[f32], quantum: usize) -> Vec<f32> {
    let mut output = vec![0.0f32; input.len()];
    for (chunk, out) in input.chunks(quantum).zip(output.chunks_mut(quantum)) {
        processor.process(chunk, out);
    }
    output
}

/// Ramp with distinct, exactly representable values
pub fn ramp(len: usize) -> Vec<f32> {
    (0..len).map(|i| ((i % 4096) as f32 - 2048.0) / 4096.0).collect()
}

/// Full-scale square-ish tone (exact in both host and kernel range)
pub fn tone(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| if (i / 24) % 2 == 0 { 0.999 } else { -0.999 })
        .collect()
}

/// Smallest RNNoise weights nnnoiseless accepts: one-neuron hidden layers,
/// every weight zero
pub fn zero_model_bytes() -> Vec<u8> {
    // (inputs, neurons, activation, weights + biases)
    let layers: [(u8, u8, u8, usize); 6] = [
        (42, 1, 0, 42 + 1),
        (1, 1, 1, 3 + 3 + 3),
        (44, 1, 2, 3 * 44 + 3 + 3),
        (44, 1, 1, 3 * 44 + 3 + 3),
        (1, 22, 1, 22 + 22),
        (1, 1, 1, 1 + 1),
    ];
    let mut bytes = Vec::new();
    for (inputs, neurons, activation, len) in layers {
        bytes.extend_from_slice(&[inputs, neurons, activation]);
        bytes.resize(bytes.len() + len, 0);
    }
    bytes
}
