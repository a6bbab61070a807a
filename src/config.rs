//! Pipeline configuration

use serde::{Deserialize, Serialize};
use std::env;

use crate::dsp::rnnoise::RNNOISE_FRAME_SIZE;
use crate::error::PipelineError;

/// Host sample rate the kernel is trained for
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Default host quantum (Web Audio style render quantum)
pub const DEFAULT_MAX_QUANTUM: usize = 128;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub sample_rate: u32,
    /// Kernel frame size in samples
    pub frame_size: usize,
    /// Largest quantum the host will deliver per callback
    pub max_quantum: usize,
    /// Frames of processed output to accumulate before releasing audio
    pub priming_frames: usize,
    /// Emit a frame report every N processed frames
    pub diagnostics_interval_frames: u64,
    /// Emit an activity record every N callbacks
    pub activity_interval_callbacks: u64,
    /// Confidence above which a frame counts as voice
    pub voice_threshold: f32,
    pub control_capacity: usize,
    pub diagnostics_capacity: usize,
    /// Per-tap recorder capacity in samples
    pub tap_capacity_samples: usize,
    pub init_timeout_ms: u64,
    /// Additional attempts after the first init times out
    pub init_retries: u32,
    /// Records kept by the control-side diagnostics log
    pub history_limit: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            frame_size: RNNOISE_FRAME_SIZE,
            max_quantum: DEFAULT_MAX_QUANTUM,
            priming_frames: 2,
            diagnostics_interval_frames: 100,
            activity_interval_callbacks: 50,
            voice_threshold: 0.2,
            control_capacity: 32,
            diagnostics_capacity: 256,
            tap_capacity_samples: DEFAULT_SAMPLE_RATE as usize * 2,
            init_timeout_ms: 10_000,
            init_retries: 1,
            history_limit: 1000,
        }
    }
}

impl PipelineConfig {
    /// Defaults with `DENOISE_*` environment overrides applied.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = env_override("DENOISE_MAX_QUANTUM") {
            config.max_quantum = v;
        }
        if let Some(v) = env_override("DENOISE_DIAGNOSTICS_INTERVAL") {
            config.diagnostics_interval_frames = v;
        }
        if let Some(v) = env_override("DENOISE_INIT_TIMEOUT_MS") {
            config.init_timeout_ms = v;
        }
        if let Some(v) = env_override("DENOISE_INIT_RETRIES") {
            config.init_retries = v;
        }
        config
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        let checks: [(&str, bool); 9] = [
            ("sample_rate", self.sample_rate > 0),
            ("frame_size", self.frame_size > 0),
            ("max_quantum", self.max_quantum > 0),
            ("priming_frames", self.priming_frames > 0),
            ("diagnostics_interval_frames", self.diagnostics_interval_frames > 0),
            ("activity_interval_callbacks", self.activity_interval_callbacks > 0),
            ("control_capacity", self.control_capacity > 0),
            ("diagnostics_capacity", self.diagnostics_capacity > 0),
            ("tap_capacity_samples", self.tap_capacity_samples > 0),
        ];
        if let Some((name, _)) = checks.iter().find(|(_, ok)| !ok) {
            return Err(PipelineError::InvalidConfig(format!("{} must be non-zero", name)));
        }
        if !(0.0..=1.0).contains(&self.voice_threshold) {
            return Err(PipelineError::InvalidConfig(format!(
                "voice_threshold {} outside [0, 1]",
                self.voice_threshold
            )));
        }
        // After priming, the drain must cover any quantum while up to
        // frame_size - 1 samples still wait in the assembler
        let needed = self.frame_size + self.max_quantum - 1;
        if self.priming_samples() < needed {
            return Err(PipelineError::InvalidConfig(format!(
                "priming of {} samples cannot cover a {}-sample quantum (needs {}); raise priming_frames",
                self.priming_samples(),
                self.max_quantum,
                needed
            )));
        }
        Ok(())
    }

    /// Startup silence in samples
    pub fn priming_samples(&self) -> usize {
        self.frame_size * self.priming_frames
    }

    pub fn priming_latency_ms(&self) -> f32 {
        self.priming_samples() as f32 * 1000.0 / self.sample_rate as f32
    }
}

fn env_override<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("Ignoring {}={:?}: not a valid number", name, raw);
            None
        }
    }
}
