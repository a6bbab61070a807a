//! Engine adapter: owns one kernel handle and its lifecycle
//!
//! All memory (kernel state + one frame-sized working buffer) is allocated in
//! [`EngineAdapter::initialize`], which runs on the control thread. The real-time
//! thread only calls [`EngineAdapter::process_frame`], which never allocates.
//!
//! States: Uninitialized -> Ready on successful init; Ready -> Failed on any
//! processing error. Failed is terminal for the handle; recovery means
//! building a new adapter.

use serde::Serialize;
use std::fmt;

use super::gain::GainStage;
use super::kernel::{KernelError, NoiseKernel};

/// Kernel handle lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Uninitialized,
    Ready,
    Failed,
}

impl EngineState {
    /// Encoding for lock-free metering
    pub fn as_u8(self) -> u8 {
        match self {
            EngineState::Uninitialized => 0,
            EngineState::Ready => 1,
            EngineState::Failed => 2,
        }
    }

    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => EngineState::Ready,
            2 => EngineState::Failed,
            _ => EngineState::Uninitialized,
        }
    }
}

/// Kernel wrapper handed from the control thread to the real-time thread
pub struct EngineAdapter {
    kernel: Option<Box<dyn NoiseKernel>>,
    state: EngineState,
    /// Frame-sized working buffer (gain-applied input, then denoised output)
    work: Vec<f32>,
    /// Initialization failure, kept for the control side
    init_error: Option<KernelError>,
}

impl EngineAdapter {
    /// Empty adapter with no kernel
    pub fn uninitialized() -> Self {
        Self {
            kernel: None,
            state: EngineState::Uninitialized,
            work: Vec::new(),
            init_error: None,
        }
    }

    /// Adapter that failed before a kernel could be constructed
    pub fn failed(error: KernelError) -> Self {
        Self {
            kernel: None,
            state: EngineState::Failed,
            work: Vec::new(),
            init_error: Some(error),
        }
    }

    /// Initialize `kernel` for frames of `frame_size` samples.
    ///
    /// Never panics: any failure yields an adapter in the Failed state with
    /// the cause available through [`EngineAdapter::init_error`].
    pub fn initialize(mut kernel: Box<dyn NoiseKernel>, frame_size: usize) -> Self {
        if kernel.frame_size() != frame_size {
            return Self::failed(KernelError::FrameSize {
                expected: frame_size,
                actual: kernel.frame_size(),
            });
        }

        let mut work = Vec::new();
        if let Err(e) = work.try_reserve_exact(frame_size) {
            return Self::failed(KernelError::Allocation(e.to_string()));
        }
        work.resize(frame_size, 0.0);

        let prepared = kernel.init().and_then(|_| kernel.warm_up());
        match prepared {
            Ok(()) => Self {
                kernel: Some(kernel),
                state: EngineState::Ready,
                work,
                init_error: None,
            },
            Err(e) => {
                kernel.destroy();
                Self::failed(e)
            }
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == EngineState::Ready
    }

    pub fn init_error(&self) -> Option<&KernelError> {
        self.init_error.as_ref()
    }

    pub fn kernel_name(&self) -> Option<&'static str> {
        self.kernel.as_ref().map(|k| k.name())
    }

    /// Run one frame through input gain and the kernel.
    ///
    /// On success the denoised samples are available from [`EngineAdapter::output`]
    /// and the kernel confidence is returned. On error the adapter moves to
    /// Failed and is never invoked again.
    pub fn process_frame(&mut self, frame: &[f32], gain: &GainStage) -> Result<f32, KernelError> {
        if self.state != EngineState::Ready {
            return Err(KernelError::NotReady);
        }
        let Some(kernel) = self.kernel.as_mut() else {
            self.state = EngineState::Failed;
            return Err(KernelError::NotReady);
        };
        if frame.len() != self.work.len() {
            self.state = EngineState::Failed;
            return Err(KernelError::FrameSize {
                expected: self.work.len(),
                actual: frame.len(),
            });
        }

        // Scaling by 2^15 is exact, so gaining here matches gaining the host
        // samples before conversion
        self.work.copy_from_slice(frame);
        gain.apply_input(&mut self.work);

        match kernel.process_frame(&mut self.work) {
            Ok(confidence) => Ok(confidence),
            Err(e) => {
                self.state = EngineState::Failed;
                Err(e)
            }
        }
    }

    /// Denoised samples of the last successful frame
    pub fn output(&self) -> &[f32] {
        &self.work
    }

    /// Release the kernel. Call off the real-time thread.
    pub fn destroy(&mut self) {
        if let Some(mut kernel) = self.kernel.take() {
            kernel.destroy();
        }
        self.state = EngineState::Uninitialized;
        self.work = Vec::new();
    }
}

impl Drop for EngineAdapter {
    fn drop(&mut self) {
        if let Some(kernel) = self.kernel.as_mut() {
            kernel.destroy();
        }
    }
}

impl fmt::Debug for EngineAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineAdapter")
            .field("kernel", &self.kernel_name())
            .field("state", &self.state)
            .field("frame_size", &self.work.len())
            .field("init_error", &self.init_error)
            .finish()
    }
}
