//! Out-of-band diagnostics
//!
//! The audio callback pushes small `Copy` records into a lock-free SPSC ring;
//! a full ring drops the record and bumps a counter, nothing else. The control
//! side drains the ring into a [`DiagnosticsLog`], which keeps bounded history,
//! writes log lines and derives the UI activity level.

use ringbuf::{HeapConsumer, HeapProducer, HeapRb};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::clock::now_micros;
use super::metrics::MetricsSnapshot;
use crate::dsp::gain::Settings;
use crate::dsp::util::linear_to_db;

/// Log target for everything derived from the diagnostics stream
pub const LOG_TARGET: &str = "denoise";

/// Speech classification of a processed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FrameStatus {
    Voice,
    Maybe,
    Noise,
}

impl FrameStatus {
    pub fn classify(confidence: f32) -> Self {
        if confidence > 0.5 {
            FrameStatus::Voice
        } else if confidence > 0.2 {
            FrameStatus::Maybe
        } else {
            FrameStatus::Noise
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FrameStatus::Voice => "VOICE",
            FrameStatus::Maybe => "MAYBE",
            FrameStatus::Noise => "NOISE",
        }
    }
}

/// Which accumulator an overflow was detected in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BufferKind {
    Input,
    Output,
}

/// Periodic per-frame statistics. RMS values are in host range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameReport {
    pub frame_index: u64,
    pub input_rms: f32,
    pub output_rms: f32,
    pub confidence: f32,
    pub input_gain: f32,
    /// Compensation factor actually applied to this frame
    pub vad_compensation: f32,
    pub output_gain: f32,
    pub status: FrameStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DiagnosticEvent {
    /// An engine was installed and the stream is operational
    Ready,
    #[serde(rename_all = "camelCase")]
    EngineFailed {
        frame_index: u64,
        reason: &'static str,
    },
    /// `Init` arrived while already operational
    InitRejected,
    Frame(FrameReport),
    #[serde(rename_all = "camelCase")]
    Activity {
        callback_index: u64,
        rms: f32,
        peak: f32,
    },
    #[serde(rename_all = "camelCase")]
    VoiceDetected { frame_index: u64, confidence: f32 },
    SettingsUpdated { settings: Settings },
    #[serde(rename_all = "camelCase")]
    Underrun {
        callback_index: u64,
        available: usize,
        requested: usize,
    },
    #[serde(rename_all = "camelCase")]
    Overflow {
        callback_index: u64,
        buffer: BufferKind,
        len: usize,
    },
}

/// Timestamped diagnostic event
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticRecord {
    pub timestamp_us: u64,
    #[serde(flatten)]
    pub event: DiagnosticEvent,
}

/// Create the diagnostics sink with room for `capacity` records
pub fn diagnostics_channel(capacity: usize) -> (DiagnosticsEmitter, DiagnosticsReceiver) {
    let (producer, consumer) = HeapRb::<DiagnosticRecord>::new(capacity.max(1)).split();
    let dropped = Arc::new(AtomicU64::new(0));
    (
        DiagnosticsEmitter {
            producer,
            dropped: Arc::clone(&dropped),
        },
        DiagnosticsReceiver { consumer, dropped },
    )
}

/// Real-time side of the diagnostics sink
pub struct DiagnosticsEmitter {
    producer: HeapProducer<DiagnosticRecord>,
    dropped: Arc<AtomicU64>,
}

impl DiagnosticsEmitter {
    /// Timestamp and push `event`. Never blocks; drops the event when full.
    pub fn emit(&mut self, event: DiagnosticEvent) {
        let record = DiagnosticRecord {
            timestamp_us: now_micros(),
            event,
        };
        if self.producer.push(record).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Control side of the diagnostics sink
pub struct DiagnosticsReceiver {
    consumer: HeapConsumer<DiagnosticRecord>,
    dropped: Arc<AtomicU64>,
}

impl DiagnosticsReceiver {
    pub fn try_next(&mut self) -> Option<DiagnosticRecord> {
        self.consumer.pop()
    }

    /// Move every pending record into `out`
    pub fn drain_into(&mut self, out: &mut Vec<DiagnosticRecord>) -> usize {
        let before = out.len();
        out.extend(self.consumer.pop_iter());
        out.len() - before
    }

    pub fn len(&self) -> usize {
        self.consumer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumer.is_empty()
    }

    /// Events lost because the ring was full
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Map an RMS level to the 0..100 meter scale (-60 dBFS floor)
pub fn activity_level_from_rms(rms: f32) -> f32 {
    let db = linear_to_db(rms, 1e-6);
    (((db + 60.0) / 60.0) * 100.0).clamp(0.0, 100.0)
}

/// Control-side sink: bounded history, log output and derived meters
#[derive(Debug)]
pub struct DiagnosticsLog {
    history: VecDeque<DiagnosticRecord>,
    limit: usize,
    activity_level: f32,
    frames_processed: u64,
    voice_detections: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DiagnosticsExport<'a> {
    metrics: &'a MetricsSnapshot,
    activity_level: f32,
    frames_processed: u64,
    voice_detections: u64,
    events: &'a VecDeque<DiagnosticRecord>,
}

impl DiagnosticsLog {
    pub fn new(limit: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(limit.min(1024)),
            limit: limit.max(1),
            activity_level: 0.0,
            frames_processed: 0,
            voice_detections: 0,
        }
    }

    /// Log `record`, update the derived meters and append it to history
    pub fn record(&mut self, record: DiagnosticRecord) {
        match record.event {
            DiagnosticEvent::Ready => {
                log::info!(target: LOG_TARGET, "engine ready, stream operational");
            }
            DiagnosticEvent::EngineFailed {
                frame_index,
                reason,
            } => {
                log::error!(
                    target: LOG_TARGET,
                    "engine failed at frame {}: {}; passing audio through",
                    frame_index,
                    reason
                );
            }
            DiagnosticEvent::InitRejected => {
                log::warn!(target: LOG_TARGET, "init rejected: engine already installed");
            }
            DiagnosticEvent::Frame(report) => {
                self.frames_processed = self.frames_processed.max(report.frame_index);
                log::debug!(
                    target: LOG_TARGET,
                    "frame {} {}: confidence {:.3}, in {:.5}, out {:.5}, gains {:.2}/{:.2}/{:.2}",
                    report.frame_index,
                    report.status.as_str(),
                    report.confidence,
                    report.input_rms,
                    report.output_rms,
                    report.input_gain,
                    report.vad_compensation,
                    report.output_gain
                );
            }
            DiagnosticEvent::Activity { rms, .. } => {
                let level = activity_level_from_rms(rms);
                self.activity_level = self.activity_level * 0.7 + level * 0.3;
                log::trace!(
                    target: LOG_TARGET,
                    "activity rms {:.5}, level {:.1}",
                    rms,
                    self.activity_level
                );
            }
            DiagnosticEvent::VoiceDetected {
                frame_index,
                confidence,
            } => {
                self.voice_detections += 1;
                log::info!(
                    target: LOG_TARGET,
                    "voice detected at frame {} (confidence {:.3})",
                    frame_index,
                    confidence
                );
            }
            DiagnosticEvent::SettingsUpdated { settings } => {
                log::info!(
                    target: LOG_TARGET,
                    "settings applied: input {:.2}x, vad compensation {:.2}x, output {:.2}x",
                    settings.input_gain,
                    settings.vad_compensation,
                    settings.output_gain
                );
            }
            DiagnosticEvent::Underrun {
                callback_index,
                available,
                requested,
            } => {
                log::warn!(
                    target: LOG_TARGET,
                    "output underrun at callback {}: {} of {} samples available",
                    callback_index,
                    available,
                    requested
                );
            }
            DiagnosticEvent::Overflow {
                callback_index,
                buffer,
                len,
            } => {
                log::warn!(
                    target: LOG_TARGET,
                    "{:?} accumulator overflow at callback {} ({} samples)",
                    buffer,
                    callback_index,
                    len
                );
            }
        }

        if self.history.len() == self.limit {
            self.history.pop_front();
        }
        self.history.push_back(record);
    }

    /// Drain `receiver` into the log. Returns the number of records consumed.
    pub fn consume(&mut self, receiver: &mut DiagnosticsReceiver) -> usize {
        let mut count = 0;
        while let Some(record) = receiver.try_next() {
            self.record(record);
            count += 1;
        }
        count
    }

    pub fn history(&self) -> impl Iterator<Item = &DiagnosticRecord> {
        self.history.iter()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Smoothed activity level, 0..100
    pub fn activity_level(&self) -> f32 {
        self.activity_level
    }

    /// Highest frame index seen in a frame report
    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn voice_detections(&self) -> u64 {
        self.voice_detections
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.activity_level = 0.0;
        self.frames_processed = 0;
        self.voice_detections = 0;
    }

    /// Export history and `metrics` as pretty-printed JSON
    pub fn to_json(&self, metrics: &MetricsSnapshot) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&DiagnosticsExport {
            metrics,
            activity_level: self.activity_level,
            frames_processed: self.frames_processed,
            voice_detections: self.voice_detections,
            events: &self.history,
        })
    }
}
