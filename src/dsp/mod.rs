//! Digital Signal Processing components

pub mod engine;
pub mod gain;
pub mod kernel;
pub mod rnnoise;
pub mod scaler;
pub mod util;

pub use engine::{EngineAdapter, EngineState};
pub use gain::{GainStage, Settings, SettingsPatch};
pub use kernel::{KernelError, KernelResource, NoiseKernel};
pub use rnnoise::{RnnoiseKernel, RNNOISE_FRAME_SIZE};
