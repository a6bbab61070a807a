//! Control-side handle and stream construction
//!
//! [`build_stream`] wires the real-time processor to its control handle and
//! recorder taps. The processor moves to the audio thread; the handle stays
//! with whatever drives the UI or API. They only talk through the control
//! channel, the diagnostics ring and the shared meters.

use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::buffer::RecorderTaps;
use super::clock;
use super::control::{control_channel, retire_channel, ControlMessage, ControlSender, SendOutcome};
use super::diagnostics::{diagnostics_channel, DiagnosticRecord, DiagnosticsLog, DiagnosticsReceiver};
use super::metrics::{MetricsSnapshot, PipelineMetrics};
use super::processor::RealtimeDenoiser;
use crate::config::PipelineConfig;
use crate::dsp::engine::EngineAdapter;
use crate::dsp::gain::{Settings, SettingsPatch};
use crate::dsp::kernel::{KernelResource, NoiseKernel};
use crate::dsp::rnnoise::RnnoiseKernel;
use crate::error::PipelineError;

/// Engines retired by the callback that can wait for collection
const RETIRE_CAPACITY: usize = 4;

/// Everything produced by [`build_stream`]
pub struct StreamParts {
    /// Goes to the audio thread
    pub processor: RealtimeDenoiser,
    /// Stays on the control thread
    pub control: DenoiserControl,
    /// Handed to the recorder
    pub taps: RecorderTaps,
}

/// Build a processor, its control handle and the recorder taps
pub fn build_stream(config: PipelineConfig) -> Result<StreamParts, PipelineError> {
    config.validate()?;

    // Pin the clock epoch here so the audio thread never initializes it
    clock::now_micros();

    let (sender, receiver) = control_channel(config.control_capacity);
    let (retire, retired) = retire_channel(RETIRE_CAPACITY);
    let (emitter, diagnostics) = diagnostics_channel(config.diagnostics_capacity);
    let (writers, taps) = RecorderTaps::create(config.tap_capacity_samples);
    let metrics = Arc::new(PipelineMetrics::new());

    let processor = RealtimeDenoiser::new(
        &config,
        receiver,
        retire,
        emitter,
        writers,
        Arc::clone(&metrics),
    );

    let tap_dropped = [taps.pre.dropped_counter(), taps.post.dropped_counter()];
    let control = DenoiserControl {
        config,
        sender,
        retired,
        diagnostics,
        metrics,
        tap_dropped,
        settings: Settings::default(),
    };

    log::debug!(
        "Denoise stream built: frame {} samples, max quantum {}, priming {} samples",
        control.config.frame_size,
        control.config.max_quantum,
        control.config.priming_samples()
    );

    Ok(StreamParts {
        processor,
        control,
        taps,
    })
}

/// Control-thread handle for one stream
pub struct DenoiserControl {
    config: PipelineConfig,
    sender: ControlSender,
    retired: Receiver<EngineAdapter>,
    diagnostics: DiagnosticsReceiver,
    metrics: Arc<PipelineMetrics>,
    tap_dropped: [Arc<AtomicU64>; 2],
    settings: Settings,
}

impl DenoiserControl {
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Build and initialize an RNNoise kernel, then hand it to the stream
    pub fn init(&mut self, resource: KernelResource) -> Result<(), PipelineError> {
        self.init_with(move || -> Box<dyn NoiseKernel> {
            Box::new(RnnoiseKernel::new(resource.clone()))
        })
    }

    /// Build a kernel with `factory`, initialize it off the calling thread and
    /// hand it to the stream.
    ///
    /// Each attempt waits up to `init_timeout_ms`; timed-out attempts are
    /// retried `init_retries` times. A kernel that fails to initialize is
    /// still delivered so the stream records the failure, and the error is
    /// returned.
    pub fn init_with<F>(&mut self, factory: F) -> Result<(), PipelineError>
    where
        F: Fn() -> Box<dyn NoiseKernel> + Send + Sync + 'static,
    {
        self.collect_retired();

        let factory = Arc::new(factory);
        let timeout = Duration::from_millis(self.config.init_timeout_ms);
        let attempts = self.config.init_retries.saturating_add(1);

        for attempt in 1..=attempts {
            let started = clock::now_micros();
            let (tx, rx) = crossbeam_channel::bounded(1);
            let factory = Arc::clone(&factory);
            let frame_size = self.config.frame_size;

            thread::Builder::new()
                .name("denoise-init".into())
                .spawn(move || {
                    let engine = EngineAdapter::initialize(factory(), frame_size);
                    // Receiver is gone if this attempt already timed out
                    let _ = tx.send(engine);
                })
                .map_err(|e| PipelineError::Spawn(e.to_string()))?;

            match rx.recv_timeout(timeout) {
                Ok(engine) => {
                    let error = engine.init_error().cloned();
                    let name = engine.kernel_name().unwrap_or("kernel");
                    self.send(ControlMessage::Init(engine))?;
                    return match error {
                        None => {
                            log::info!(
                                "{} initialized in {} ms (attempt {}/{})",
                                name,
                                clock::micros_since(started) / 1000,
                                attempt,
                                attempts
                            );
                            Ok(())
                        }
                        Some(e) => {
                            log::error!("Kernel initialization failed: {}", e);
                            Err(PipelineError::Kernel(e))
                        }
                    };
                }
                Err(RecvTimeoutError::Timeout) => {
                    log::warn!(
                        "Kernel initialization timed out after {} ms (attempt {}/{})",
                        self.config.init_timeout_ms,
                        attempt,
                        attempts
                    );
                }
                Err(RecvTimeoutError::Disconnected) => {
                    log::warn!(
                        "Kernel init thread exited without a result (attempt {}/{})",
                        attempt,
                        attempts
                    );
                }
            }
        }

        log::error!("Kernel initialization gave up after {} attempt(s)", attempts);
        Err(PipelineError::InitTimeout {
            attempts,
            timeout_ms: self.config.init_timeout_ms,
        })
    }

    /// Start processing with the current settings
    pub fn enable(&mut self) -> Result<(), PipelineError> {
        self.collect_retired();
        self.send(ControlMessage::Enable(self.settings))?;
        log::info!("Noise suppression enabled");
        Ok(())
    }

    pub fn disable(&mut self) -> Result<(), PipelineError> {
        self.send(ControlMessage::Disable)?;
        log::info!("Noise suppression disabled");
        Ok(())
    }

    /// Merge `patch` into the current settings (clamped) and push the result
    pub fn update_settings(&mut self, patch: SettingsPatch) -> Result<Settings, PipelineError> {
        let settings = self.settings.merged(patch);
        self.send(ControlMessage::UpdateSettings(settings))?;
        self.settings = settings;
        log::info!(
            "Settings updated: input {:.2}x, vad compensation {:.2}x, output {:.2}x",
            settings.input_gain,
            settings.vad_compensation,
            settings.output_gain
        );
        Ok(settings)
    }

    /// Restore default settings and push them
    pub fn reset_settings(&mut self) -> Result<Settings, PipelineError> {
        let settings = Settings::default();
        self.send(ControlMessage::UpdateSettings(settings))?;
        self.settings = settings;
        log::info!("Settings reset to defaults");
        Ok(settings)
    }

    /// Tear down the engine; the stream passes audio through until the next init
    pub fn destroy(&mut self) -> Result<(), PipelineError> {
        self.send(ControlMessage::Destroy)?;
        log::info!("Engine destroy requested");
        Ok(())
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        let mut snapshot = self.metrics.snapshot();
        snapshot.dropped_events = self.diagnostics.dropped_count();
        snapshot.dropped_control_messages = self.sender.dropped_count();
        snapshot.tap_samples_dropped = self
            .tap_dropped
            .iter()
            .map(|c| c.load(std::sync::atomic::Ordering::Relaxed))
            .sum();
        snapshot
    }

    /// Move pending diagnostic records into `out`
    pub fn poll_diagnostics(&mut self, out: &mut Vec<DiagnosticRecord>) -> usize {
        self.diagnostics.drain_into(out)
    }

    /// Drain pending diagnostics straight into `log`
    pub fn poll_into(&mut self, log: &mut DiagnosticsLog) -> usize {
        log.consume(&mut self.diagnostics)
    }

    /// A diagnostics log sized from the configuration
    pub fn new_log(&self) -> DiagnosticsLog {
        DiagnosticsLog::new(self.config.history_limit)
    }

    /// Release engines the callback has retired. Returns how many were freed.
    pub fn collect_retired(&mut self) -> usize {
        let mut count = 0;
        for mut engine in self.retired.try_iter() {
            engine.destroy();
            count += 1;
        }
        if count > 0 {
            log::debug!("Released {} retired engine(s)", count);
        }
        count
    }

    fn send(&self, message: ControlMessage) -> Result<(), PipelineError> {
        let kind = message.kind();
        match self.sender.send(message) {
            SendOutcome::Queued => Ok(()),
            SendOutcome::QueuedWithCoalescing => {
                log::debug!("Control queue full; coalesced settings to queue {}", kind);
                Ok(())
            }
            SendOutcome::Full => {
                log::warn!("Control queue full of lifecycle messages; {} refused", kind);
                Err(PipelineError::QueueFull(kind))
            }
            SendOutcome::Disconnected => {
                log::warn!("Audio side is gone; {} not delivered", kind);
                Err(PipelineError::Disconnected)
            }
        }
    }
}
