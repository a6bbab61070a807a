//! Real-time denoiser: the per-callback processing object
//!
//! Owned by the audio thread. Every call to [`RealtimeDenoiser::process`]
//! first applies all pending control messages, then runs one quantum through
//!
//! scale -> assemble -> (per frame: input gain -> kernel -> output gain) ->
//! drain -> inverse scale
//!
//! Nothing here blocks, locks or allocates once the object is built.

use std::sync::Arc;

use super::assembler::FrameAssembler;
use super::buffer::TapWriters;
use super::control::{ControlMessage, ControlReceiver, RetireSender};
use super::diagnostics::{
    BufferKind, DiagnosticEvent, DiagnosticsEmitter, FrameReport, FrameStatus,
};
use super::drain::{DrainStatus, OutputDrainBuffer};
use super::metrics::PipelineMetrics;
use crate::config::PipelineConfig;
use crate::dsp::engine::{EngineAdapter, EngineState};
use crate::dsp::gain::{GainStage, Settings};
use crate::dsp::scaler::{self, PCM_SCALE};
use crate::dsp::util::{peak, rms};

/// Message-handling mode of the callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No usable engine yet; audio passes through untouched
    Initializing,
    /// An engine was installed; frames go through the kernel while enabled
    Operational,
}

/// Per-frame work: everything downstream of the assembler.
///
/// Kept apart from the assembler so the frame callback can borrow it mutably
/// while the assembler is mid-push.
struct FrameStage {
    engine: EngineAdapter,
    gain: GainStage,
    drain: OutputDrainBuffer,
    emitter: DiagnosticsEmitter,
    metrics: Arc<PipelineMetrics>,
    frame_index: u64,
    diagnostics_interval: u64,
    voice_threshold: f32,
    voice_active: bool,
    failure_reported: bool,
    callback_index: u64,
}

impl FrameStage {
    fn on_frame(&mut self, frame: &[f32]) {
        self.frame_index += 1;

        match self.engine.process_frame(frame, &self.gain) {
            Ok(confidence) => {
                let total_gain = self.gain.output_gain_for(confidence);
                if self
                    .drain
                    .append_scaled(self.engine.output(), total_gain)
                    .is_err()
                {
                    self.report_output_overflow();
                }
                self.metrics.record_frame(confidence);

                let is_voice = confidence > self.voice_threshold;
                if is_voice && !self.voice_active {
                    self.emitter.emit(DiagnosticEvent::VoiceDetected {
                        frame_index: self.frame_index,
                        confidence,
                    });
                }
                self.voice_active = is_voice;

                if self.frame_index % self.diagnostics_interval == 0 {
                    self.report_frame(frame, confidence, total_gain);
                }
            }
            Err(error) => {
                if !self.failure_reported {
                    self.failure_reported = true;
                    self.metrics.set_engine_state(self.engine.state());
                    self.emitter.emit(DiagnosticEvent::EngineFailed {
                        frame_index: self.frame_index,
                        reason: error.kind(),
                    });
                }
                // Bypass: the unprocessed frame keeps the stream continuous
                if self.drain.append(frame).is_err() {
                    self.report_output_overflow();
                }
            }
        }
    }

    fn report_frame(&mut self, frame: &[f32], confidence: f32, total_gain: f32) {
        let settings = self.gain.settings();
        let report = FrameReport {
            frame_index: self.frame_index,
            // Level the kernel saw, after input gain
            input_rms: rms(frame) * settings.input_gain / PCM_SCALE,
            output_rms: rms(self.engine.output()) * total_gain / PCM_SCALE,
            confidence,
            input_gain: settings.input_gain,
            vad_compensation: self.gain.compensation_for(confidence),
            output_gain: settings.output_gain,
            status: FrameStatus::classify(confidence),
        };
        self.emitter.emit(DiagnosticEvent::Frame(report));
    }

    fn report_output_overflow(&mut self) {
        self.metrics.record_overflow();
        self.emitter.emit(DiagnosticEvent::Overflow {
            callback_index: self.callback_index,
            buffer: BufferKind::Output,
            len: self.drain.len(),
        });
    }
}

pub struct RealtimeDenoiser {
    phase: Phase,
    enabled: bool,
    control: ControlReceiver,
    retire: RetireSender,
    assembler: FrameAssembler,
    stage: FrameStage,
    taps: TapWriters,
    /// Kernel-range copy of the current quantum
    scaled: Vec<f32>,
    activity_interval: u64,
}

impl RealtimeDenoiser {
    pub(crate) fn new(
        config: &PipelineConfig,
        control: ControlReceiver,
        retire: RetireSender,
        emitter: DiagnosticsEmitter,
        taps: TapWriters,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            phase: Phase::Initializing,
            enabled: false,
            control,
            retire,
            assembler: FrameAssembler::new(config.frame_size, config.max_quantum),
            stage: FrameStage {
                engine: EngineAdapter::uninitialized(),
                gain: GainStage::default(),
                drain: OutputDrainBuffer::new(
                    config.frame_size,
                    config.priming_frames,
                    config.max_quantum,
                ),
                emitter,
                metrics,
                frame_index: 0,
                diagnostics_interval: config.diagnostics_interval_frames.max(1),
                voice_threshold: config.voice_threshold,
                voice_active: false,
                failure_reported: false,
                callback_index: 0,
            },
            taps,
            scaled: vec![0.0; config.max_quantum],
            activity_interval: config.activity_interval_callbacks.max(1),
        }
    }

    /// Process one host quantum. `input` and `output` are expected to have
    /// the same length; any excess output is zeroed.
    pub fn process(&mut self, input: &[f32], output: &mut [f32]) {
        self.stage.callback_index += 1;
        self.poll_control();

        let n = input.len().min(output.len());
        output[n..].fill(0.0);
        let (input, output) = (&input[..n], &mut output[..n]);

        self.taps.pre.write(input);

        if self.enabled && self.phase == Phase::Operational {
            self.process_frames(input, output);
        } else {
            output.copy_from_slice(input);
        }

        self.taps.post.write(output);

        if self.stage.callback_index % self.activity_interval == 0 {
            let level = rms(input);
            self.stage.metrics.record_activity(level);
            self.stage.emitter.emit(DiagnosticEvent::Activity {
                callback_index: self.stage.callback_index,
                rms: level,
                peak: peak(input),
            });
        }

        self.stage.metrics.record_callback(
            self.assembler.len(),
            self.stage.drain.len(),
            self.stage.drain.is_primed(),
        );
    }

    fn process_frames(&mut self, input: &[f32], output: &mut [f32]) {
        let n = input.len();
        if n > self.scaled.len() {
            debug_assert!(
                false,
                "input accumulator overflow: quantum of {} exceeds max quantum {}",
                n,
                self.scaled.len()
            );
            self.degrade_on_input_overflow(input, output);
            return;
        }

        let scaled = &mut self.scaled[..n];
        scaler::to_kernel_range(input, scaled);

        let stage = &mut self.stage;
        if self
            .assembler
            .push(scaled, |frame| stage.on_frame(frame))
            .is_err()
        {
            self.degrade_on_input_overflow(input, output);
            return;
        }

        match self.stage.drain.drain(output) {
            DrainStatus::Drained | DrainStatus::Priming => {}
            DrainStatus::Underrun { available } => {
                self.stage.metrics.record_underrun();
                self.stage.emitter.emit(DiagnosticEvent::Underrun {
                    callback_index: self.stage.callback_index,
                    available,
                    requested: n,
                });
            }
        }
        scaler::to_host_range_in_place(output);
    }

    fn degrade_on_input_overflow(&mut self, input: &[f32], output: &mut [f32]) {
        self.stage.metrics.record_overflow();
        self.stage.emitter.emit(DiagnosticEvent::Overflow {
            callback_index: self.stage.callback_index,
            buffer: BufferKind::Input,
            len: self.assembler.len() + input.len(),
        });
        output.copy_from_slice(input);
    }

    /// Apply every pending control message in arrival order
    pub fn poll_control(&mut self) {
        while let Some(message) = self.control.try_next() {
            match self.phase {
                Phase::Initializing => self.handle_initializing(message),
                Phase::Operational => self.handle_operational(message),
            }
        }
    }

    fn handle_initializing(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::Init(engine) => {
                let ready = engine.is_ready();
                let reason = engine.init_error().map(|e| e.kind()).unwrap_or("not-ready");
                self.install_engine(engine);
                if ready {
                    self.phase = Phase::Operational;
                    self.stage.metrics.set_operational(true);
                    self.reset_stream();
                    self.stage.emitter.emit(DiagnosticEvent::Ready);
                } else {
                    self.stage.failure_reported = true;
                    self.stage.emitter.emit(DiagnosticEvent::EngineFailed {
                        frame_index: self.stage.frame_index,
                        reason,
                    });
                }
            }
            ControlMessage::Destroy => self.teardown_engine(),
            other => self.handle_common(other),
        }
    }

    fn handle_operational(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::Init(engine) if self.stage.engine.is_ready() => {
                self.retire.retire(engine);
                self.stage.emitter.emit(DiagnosticEvent::InitRejected);
            }
            ControlMessage::Init(engine) => {
                // The installed engine failed; start over with the new one
                self.leave_operational();
                self.handle_initializing(ControlMessage::Init(engine));
            }
            ControlMessage::Destroy => {
                self.teardown_engine();
                self.leave_operational();
            }
            other => self.handle_common(other),
        }
    }

    /// Messages handled the same way in both phases
    fn handle_common(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::Enable(settings) => {
                self.stage.gain.apply(settings);
                self.enabled = true;
                self.stage.metrics.set_enabled(true);
                self.reset_stream();
            }
            ControlMessage::Disable => {
                self.enabled = false;
                self.stage.metrics.set_enabled(false);
            }
            ControlMessage::UpdateSettings(settings) => {
                self.stage.gain.apply(settings);
                self.stage
                    .emitter
                    .emit(DiagnosticEvent::SettingsUpdated { settings });
            }
            ControlMessage::Init(_) | ControlMessage::Destroy => {}
        }
    }

    fn install_engine(&mut self, engine: EngineAdapter) {
        let state = engine.state();
        let previous = std::mem::replace(&mut self.stage.engine, engine);
        self.retire.retire(previous);
        self.stage.failure_reported = false;
        self.stage.metrics.set_engine_state(state);
    }

    fn teardown_engine(&mut self) {
        let previous = std::mem::replace(&mut self.stage.engine, EngineAdapter::uninitialized());
        self.retire.retire(previous);
        self.stage.failure_reported = false;
        self.stage
            .metrics
            .set_engine_state(EngineState::Uninitialized);
    }

    fn leave_operational(&mut self) {
        self.phase = Phase::Initializing;
        self.stage.metrics.set_operational(false);
        self.reset_stream();
    }

    /// Empty both accumulators and re-arm priming
    fn reset_stream(&mut self) {
        self.assembler.reset();
        self.stage.drain.reset();
        self.stage.voice_active = false;
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_primed(&self) -> bool {
        self.stage.drain.is_primed()
    }

    /// Samples waiting in the input accumulator
    pub fn pending_input(&self) -> usize {
        self.assembler.len()
    }

    /// Samples waiting in the output accumulator
    pub fn pending_output(&self) -> usize {
        self.stage.drain.len()
    }

    pub fn engine_state(&self) -> EngineState {
        self.stage.engine.state()
    }

    pub fn settings(&self) -> Settings {
        self.stage.gain.settings()
    }

    /// Frames handed to the engine since construction
    pub fn frames_processed(&self) -> u64 {
        self.stage.frame_index
    }
}
