//! Gain staging around the kernel: input gain before processing, and a
//! VAD-compensated output gain after.
//!
//! Confidence models over-suppress frames they consider non-speech. When the
//! kernel reports confidence below [`VAD_COMPENSATION_THRESHOLD`], the output
//! is boosted by `vad_compensation` on top of `output_gain`.

use serde::{Deserialize, Serialize};

/// Confidence below which the VAD compensation factor is applied
pub const VAD_COMPENSATION_THRESHOLD: f32 = 0.1;

/// Input gain bounds (x)
pub const INPUT_GAIN_RANGE: (f32, f32) = (0.5, 8.0);
/// VAD compensation bounds (x)
pub const VAD_COMPENSATION_RANGE: (f32, f32) = (1.0, 4.0);
/// Output gain bounds (x)
pub const OUTPUT_GAIN_RANGE: (f32, f32) = (0.5, 3.0);

/// User-facing gain settings. Always a complete snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub input_gain: f32,
    pub vad_compensation: f32,
    pub output_gain: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            input_gain: 1.0,
            vad_compensation: 2.0,
            output_gain: 1.0,
        }
    }
}

impl Settings {
    /// Clamp every field to its documented bounds.
    ///
    /// Non-finite values fall back to the default for that field rather than
    /// being rejected.
    pub fn clamped(self) -> Self {
        let defaults = Settings::default();
        Self {
            input_gain: clamp_or(self.input_gain, INPUT_GAIN_RANGE, defaults.input_gain),
            vad_compensation: clamp_or(
                self.vad_compensation,
                VAD_COMPENSATION_RANGE,
                defaults.vad_compensation,
            ),
            output_gain: clamp_or(self.output_gain, OUTPUT_GAIN_RANGE, defaults.output_gain),
        }
    }

    /// Merge a partial update into this snapshot, then clamp.
    pub fn merged(self, patch: SettingsPatch) -> Self {
        Self {
            input_gain: patch.input_gain.unwrap_or(self.input_gain),
            vad_compensation: patch.vad_compensation.unwrap_or(self.vad_compensation),
            output_gain: patch.output_gain.unwrap_or(self.output_gain),
        }
        .clamped()
    }
}

/// Partial settings update. `None` fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(default)]
    pub input_gain: Option<f32>,
    #[serde(default)]
    pub vad_compensation: Option<f32>,
    #[serde(default)]
    pub output_gain: Option<f32>,
}

#[inline]
fn clamp_or(value: f32, (min, max): (f32, f32), fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        fallback
    }
}

/// Gain stage state owned by the real-time thread.
///
/// Holds the latest settings snapshot. The snapshot is replaced only between
/// callbacks (when control messages are applied), so every frame sees one
/// consistent set of gains.
#[derive(Debug, Clone, Copy, Default)]
pub struct GainStage {
    settings: Settings,
}

impl GainStage {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Replace the settings snapshot
    pub fn apply(&mut self, settings: Settings) {
        self.settings = settings;
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    pub fn input_gain(&self) -> f32 {
        self.settings.input_gain
    }

    /// Multiply a frame by the input gain (pre-kernel)
    pub fn apply_input(&self, frame: &mut [f32]) {
        let gain = self.settings.input_gain;
        if gain != 1.0 {
            for sample in frame.iter_mut() {
                *sample *= gain;
            }
        }
    }

    /// Compensation factor chosen for a given kernel confidence
    #[inline]
    pub fn compensation_for(&self, confidence: f32) -> f32 {
        if confidence < VAD_COMPENSATION_THRESHOLD {
            self.settings.vad_compensation
        } else {
            1.0
        }
    }

    /// Total post-kernel gain: VAD compensation x output gain
    #[inline]
    pub fn output_gain_for(&self, confidence: f32) -> f32 {
        self.compensation_for(confidence) * self.settings.output_gain
    }
}
