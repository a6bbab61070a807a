//! RNNoise kernel backed by nnnoiseless
//!
//! RNNoise processes exactly 480 samples (10ms at 48kHz) per call, expects
//! samples in the int16 amplitude range and returns a voice activity
//! probability that doubles as the frame confidence.

use nnnoiseless::{DenoiseState, RnnModel};

use super::kernel::{KernelError, KernelResource, NoiseKernel};

/// RNNoise frame size (10ms at 48kHz)
pub const RNNOISE_FRAME_SIZE: usize = 480;

/// RNNoise kernel with up-front allocated state and a single scratch frame
pub struct RnnoiseKernel {
    resource: KernelResource,
    state: Option<Box<DenoiseState<'static>>>,
    /// Copy of the noisy frame; nnnoiseless reads and writes separate buffers
    scratch: Vec<f32>,
}

impl RnnoiseKernel {
    /// Create an uninitialized kernel for the given weights
    pub fn new(resource: KernelResource) -> Self {
        Self {
            resource,
            state: None,
            scratch: Vec::new(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }
}

impl Default for RnnoiseKernel {
    fn default() -> Self {
        Self::new(KernelResource::Builtin)
    }
}

impl NoiseKernel for RnnoiseKernel {
    fn frame_size(&self) -> usize {
        RNNOISE_FRAME_SIZE
    }

    fn init(&mut self) -> Result<(), KernelError> {
        let state = match &self.resource {
            KernelResource::Builtin => DenoiseState::new(),
            KernelResource::ModelBytes(bytes) => {
                let model = RnnModel::from_bytes(bytes).ok_or_else(|| {
                    KernelError::InvalidModel(format!(
                        "{} bytes are not RNNoise weights",
                        bytes.len()
                    ))
                })?;
                DenoiseState::from_model(model)
            }
        };

        let mut scratch = Vec::new();
        scratch
            .try_reserve_exact(RNNOISE_FRAME_SIZE)
            .map_err(|e| KernelError::Allocation(e.to_string()))?;
        scratch.resize(RNNOISE_FRAME_SIZE, 0.0);

        self.state = Some(state);
        self.scratch = scratch;
        Ok(())
    }

    fn process_frame(&mut self, frame: &mut [f32]) -> Result<f32, KernelError> {
        if frame.len() != RNNOISE_FRAME_SIZE {
            return Err(KernelError::FrameSize {
                expected: RNNOISE_FRAME_SIZE,
                actual: frame.len(),
            });
        }
        let state = self.state.as_mut().ok_or(KernelError::NotReady)?;

        self.scratch.copy_from_slice(frame);
        let vad = state.process_frame(frame, &self.scratch);

        if !vad.is_finite() {
            return Err(KernelError::Processing("non-finite confidence"));
        }
        Ok(vad.clamp(0.0, 1.0))
    }

    fn destroy(&mut self) {
        self.state = None;
        self.scratch = Vec::new();
    }

    fn name(&self) -> &'static str {
        match self.resource {
            KernelResource::Builtin => "rnnoise",
            KernelResource::ModelBytes(_) => "rnnoise-custom",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_size_matches_nnnoiseless() {
        assert_eq!(RNNOISE_FRAME_SIZE, DenoiseState::<'static>::FRAME_SIZE);
    }

    #[test]
    fn test_process_before_init_is_not_ready() {
        let mut kernel = RnnoiseKernel::default();
        let mut frame = [0.0f32; RNNOISE_FRAME_SIZE];
        assert_eq!(kernel.process_frame(&mut frame), Err(KernelError::NotReady));
    }

    #[test]
    fn test_silence_stays_silent() {
        let mut kernel = RnnoiseKernel::default();
        kernel.init().unwrap();
        let mut frame = [0.0f32; RNNOISE_FRAME_SIZE];
        for _ in 0..10 {
            let confidence = kernel.process_frame(&mut frame).unwrap();
            assert!((0.0..=1.0).contains(&confidence));
        }
        assert!(frame.iter().all(|s| s.abs() < 1e-3));
    }

    #[test]
    fn test_rejects_partial_frame() {
        let mut kernel = RnnoiseKernel::default();
        kernel.init().unwrap();
        let mut short = [0.0f32; 128];
        assert_eq!(
            kernel.process_frame(&mut short),
            Err(KernelError::FrameSize {
                expected: 480,
                actual: 128
            })
        );
    }

    #[test]
    fn test_garbage_model_bytes_fail_init() {
        let mut kernel = RnnoiseKernel::new(KernelResource::ModelBytes(vec![1, 2, 3]));
        assert!(matches!(kernel.init(), Err(KernelError::InvalidModel(_))));
        assert!(!kernel.is_initialized());
    }

    /// Smallest weights file nnnoiseless accepts: one-neuron hidden layers,
    /// all weights zero.
    fn zero_model_bytes() -> Vec<u8> {
        fn layer(bytes: &mut Vec<u8>, inputs: u8, neurons: u8, activation: u8, len: usize) {
            bytes.extend_from_slice(&[inputs, neurons, activation]);
            bytes.resize(bytes.len() + len, 0);
        }
        let mut bytes = Vec::new();
        layer(&mut bytes, 42, 1, 0, 42 + 1); // input dense
        layer(&mut bytes, 1, 1, 1, 3 + 3 + 3); // vad gru
        layer(&mut bytes, 44, 1, 2, 3 * 44 + 3 + 3); // noise gru
        layer(&mut bytes, 44, 1, 1, 3 * 44 + 3 + 3); // denoise gru
        layer(&mut bytes, 1, 22, 1, 22 + 22); // denoise output
        layer(&mut bytes, 1, 1, 1, 1 + 1); // vad output
        bytes
    }

    #[test]
    fn test_custom_model_bytes_init_and_process() {
        let mut kernel = RnnoiseKernel::new(KernelResource::ModelBytes(zero_model_bytes()));
        assert_eq!(kernel.name(), "rnnoise-custom");
        kernel.init().unwrap();
        assert!(kernel.is_initialized());

        let mut frame: Vec<f32> = (0..RNNOISE_FRAME_SIZE)
            .map(|i| ((i % 48) as f32 - 24.0) * 400.0)
            .collect();
        for _ in 0..5 {
            let confidence = kernel.process_frame(&mut frame).unwrap();
            // Zero weights put the vad output at sigmoid(0)
            assert!((0.4..=0.6).contains(&confidence), "confidence {}", confidence);
        }
        assert!(frame.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_truncated_model_bytes_fail_init() {
        let mut bytes = zero_model_bytes();
        bytes.pop();
        let mut kernel = RnnoiseKernel::new(KernelResource::ModelBytes(bytes));
        assert!(matches!(kernel.init(), Err(KernelError::InvalidModel(_))));
    }

    #[test]
    fn test_destroy_releases_state() {
        let mut kernel = RnnoiseKernel::default();
        kernel.init().unwrap();
        kernel.destroy();
        assert!(!kernel.is_initialized());
        let mut frame = [0.0f32; RNNOISE_FRAME_SIZE];
        assert_eq!(kernel.process_frame(&mut frame), Err(KernelError::NotReady));
    }
}
