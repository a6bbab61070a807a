//! Lock-free pipeline meters shared between the audio callback and the
//! control side.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};

use crate::dsp::engine::EngineState;

/// Meters written by the real-time thread, read anywhere.
///
/// Floats are stored as their bit pattern in `AtomicU32`.
#[derive(Debug)]
pub struct PipelineMetrics {
    callbacks: AtomicU64,
    frames: AtomicU64,
    last_confidence: AtomicU32,
    activity_rms: AtomicU32,
    primed: AtomicBool,
    enabled: AtomicBool,
    operational: AtomicBool,
    engine_state: AtomicU8,
    underruns: AtomicU64,
    overflows: AtomicU64,
    pending_input: AtomicU32,
    pending_output: AtomicU32,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            callbacks: AtomicU64::new(0),
            frames: AtomicU64::new(0),
            last_confidence: AtomicU32::new(0.0_f32.to_bits()),
            activity_rms: AtomicU32::new(0.0_f32.to_bits()),
            primed: AtomicBool::new(false),
            enabled: AtomicBool::new(false),
            operational: AtomicBool::new(false),
            engine_state: AtomicU8::new(EngineState::Uninitialized.as_u8()),
            underruns: AtomicU64::new(0),
            overflows: AtomicU64::new(0),
            pending_input: AtomicU32::new(0),
            pending_output: AtomicU32::new(0),
        }
    }

    // Writers (real-time thread)

    pub(crate) fn record_callback(&self, pending_input: usize, pending_output: usize, primed: bool) {
        self.callbacks.fetch_add(1, Ordering::Relaxed);
        self.pending_input
            .store(pending_input as u32, Ordering::Relaxed);
        self.pending_output
            .store(pending_output as u32, Ordering::Relaxed);
        self.primed.store(primed, Ordering::Relaxed);
    }

    pub(crate) fn record_frame(&self, confidence: f32) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        self.last_confidence
            .store(confidence.to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn record_activity(&self, rms: f32) {
        self.activity_rms.store(rms.to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub(crate) fn set_operational(&self, operational: bool) {
        self.operational.store(operational, Ordering::Relaxed);
    }

    pub(crate) fn set_engine_state(&self, state: EngineState) {
        self.engine_state.store(state.as_u8(), Ordering::Relaxed);
    }

    pub(crate) fn record_underrun(&self) {
        self.underruns.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_overflow(&self) {
        self.overflows.fetch_add(1, Ordering::Relaxed);
    }

    // Readers

    pub fn callbacks(&self) -> u64 {
        self.callbacks.load(Ordering::Relaxed)
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn last_confidence(&self) -> f32 {
        f32::from_bits(self.last_confidence.load(Ordering::Relaxed))
    }

    pub fn activity_rms(&self) -> f32 {
        f32::from_bits(self.activity_rms.load(Ordering::Relaxed))
    }

    pub fn is_primed(&self) -> bool {
        self.primed.load(Ordering::Relaxed)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn is_operational(&self) -> bool {
        self.operational.load(Ordering::Relaxed)
    }

    pub fn engine_state(&self) -> EngineState {
        EngineState::from_u8(self.engine_state.load(Ordering::Relaxed))
    }

    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    pub fn overflows(&self) -> u64 {
        self.overflows.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of the callback-side meters. Counters owned by
    /// other components are left at zero for the caller to fill.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            callbacks: self.callbacks(),
            frames_processed: self.frames_processed(),
            last_confidence: self.last_confidence(),
            activity_rms: self.activity_rms(),
            primed: self.is_primed(),
            enabled: self.is_enabled(),
            operational: self.is_operational(),
            engine_state: self.engine_state(),
            underruns: self.underruns(),
            overflows: self.overflows(),
            pending_input: self.pending_input.load(Ordering::Relaxed) as usize,
            pending_output: self.pending_output.load(Ordering::Relaxed) as usize,
            dropped_events: 0,
            dropped_control_messages: 0,
            tap_samples_dropped: 0,
        }
    }
}

/// Serializable view of the pipeline meters
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub callbacks: u64,
    pub frames_processed: u64,
    pub last_confidence: f32,
    pub activity_rms: f32,
    pub primed: bool,
    pub enabled: bool,
    pub operational: bool,
    pub engine_state: EngineState,
    pub underruns: u64,
    pub overflows: u64,
    pub pending_input: usize,
    pub pending_output: usize,
    pub dropped_events: u64,
    pub dropped_control_messages: u64,
    pub tap_samples_dropped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_meters_round_trip_through_bits() {
        let metrics = PipelineMetrics::new();
        metrics.record_frame(0.73);
        metrics.record_activity(0.125);
        assert_eq!(metrics.last_confidence(), 0.73);
        assert_eq!(metrics.activity_rms(), 0.125);
        assert_eq!(metrics.frames_processed(), 1);
    }

    #[test]
    fn test_snapshot_reflects_state() {
        let metrics = PipelineMetrics::new();
        metrics.set_enabled(true);
        metrics.set_engine_state(EngineState::Failed);
        metrics.record_callback(32, 960, true);
        metrics.record_underrun();

        let snap = metrics.snapshot();
        assert!(snap.enabled);
        assert!(snap.primed);
        assert_eq!(snap.engine_state, EngineState::Failed);
        assert_eq!(snap.pending_input, 32);
        assert_eq!(snap.pending_output, 960);
        assert_eq!(snap.underruns, 1);
        assert_eq!(snap.callbacks, 1);
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let json = serde_json::to_string(&PipelineMetrics::new().snapshot()).unwrap();
        assert!(json.contains("\"framesProcessed\":0"));
        assert!(json.contains("\"engineState\":\"uninitialized\""));
    }
}
