//! Python bindings
//!
//! `Denoiser` owns both halves of a stream in one object so scripts can run
//! the real-time path offline: control calls queue messages, `process` runs
//! the callback over a whole buffer quantum by quantum.

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use crate::audio::controller::{build_stream, DenoiserControl};
use crate::audio::diagnostics::DiagnosticsLog;
use crate::audio::processor::{Phase, RealtimeDenoiser};
use crate::config::PipelineConfig;
use crate::dsp::gain::SettingsPatch;
use crate::dsp::kernel::KernelResource;
use crate::error::PipelineError;

fn to_py_err(e: PipelineError) -> PyErr {
    match e {
        PipelineError::InvalidConfig(msg) => PyErr::new::<PyValueError, _>(msg),
        other => PyErr::new::<PyRuntimeError, _>(other.to_string()),
    }
}

/// Python-exposed denoiser
#[pyclass(name = "Denoiser", unsendable)]
pub struct PyDenoiser {
    processor: RealtimeDenoiser,
    control: DenoiserControl,
    log: DiagnosticsLog,
    max_quantum: usize,
}

#[pymethods]
impl PyDenoiser {
    #[new]
    #[pyo3(signature = (max_quantum=None))]
    fn new(max_quantum: Option<usize>) -> PyResult<Self> {
        let mut config = PipelineConfig::from_env();
        if let Some(q) = max_quantum {
            config.max_quantum = q;
        }
        let max_quantum = config.max_quantum;
        let parts = build_stream(config).map_err(to_py_err)?;
        let log = parts.control.new_log();
        Ok(Self {
            processor: parts.processor,
            control: parts.control,
            log,
            max_quantum,
        })
    }

    /// Initialize RNNoise, optionally from a model file
    #[pyo3(signature = (model_path=None))]
    fn init(&mut self, model_path: Option<&str>) -> PyResult<()> {
        let resource = match model_path {
            Some(path) => std::fs::read(path)
                .map(KernelResource::ModelBytes)
                .map_err(|e| PyErr::new::<PyValueError, _>(format!("{}: {}", path, e)))?,
            None => KernelResource::from_env().map_err(|e| to_py_err(e.into()))?,
        };
        let result = self.control.init(resource).map_err(to_py_err);
        self.processor.poll_control();
        result
    }

    fn enable(&mut self) -> PyResult<()> {
        self.control.enable().map_err(to_py_err)
    }

    fn disable(&mut self) -> PyResult<()> {
        self.control.disable().map_err(to_py_err)
    }

    fn destroy(&mut self) -> PyResult<()> {
        self.control.destroy().map_err(to_py_err)?;
        self.processor.poll_control();
        self.control.collect_retired();
        Ok(())
    }

    /// Update gains; omitted values are kept. Returns the applied
    /// (input_gain, vad_compensation, output_gain).
    #[pyo3(signature = (input_gain=None, vad_compensation=None, output_gain=None))]
    fn update_settings(
        &mut self,
        input_gain: Option<f32>,
        vad_compensation: Option<f32>,
        output_gain: Option<f32>,
    ) -> PyResult<(f32, f32, f32)> {
        let settings = self
            .control
            .update_settings(SettingsPatch {
                input_gain,
                vad_compensation,
                output_gain,
            })
            .map_err(to_py_err)?;
        Ok((
            settings.input_gain,
            settings.vad_compensation,
            settings.output_gain,
        ))
    }

    fn reset_settings(&mut self) -> PyResult<()> {
        self.control.reset_settings().map_err(to_py_err).map(|_| ())
    }

    /// Run `samples` through the callback in max-quantum chunks
    fn process(&mut self, samples: Vec<f32>) -> Vec<f32> {
        let mut output = vec![0.0f32; samples.len()];
        for (input, out) in samples
            .chunks(self.max_quantum)
            .zip(output.chunks_mut(self.max_quantum))
        {
            self.processor.process(input, out);
        }
        self.control.collect_retired();
        output
    }

    fn is_operational(&self) -> bool {
        self.processor.phase() == Phase::Operational
    }

    fn is_enabled(&self) -> bool {
        self.processor.is_enabled()
    }

    fn is_primed(&self) -> bool {
        self.processor.is_primed()
    }

    /// Current meters as a JSON string
    fn metrics(&self) -> PyResult<String> {
        serde_json::to_string(&self.control.metrics())
            .map_err(|e| PyErr::new::<PyRuntimeError, _>(e.to_string()))
    }

    /// Smoothed 0..100 activity level
    fn activity_level(&mut self) -> f32 {
        self.control.poll_into(&mut self.log);
        self.log.activity_level()
    }

    /// Drain pending diagnostics; returns the full history and meters as JSON
    fn drain_diagnostics(&mut self) -> PyResult<String> {
        self.control.poll_into(&mut self.log);
        self.log
            .to_json(&self.control.metrics())
            .map_err(|e| PyErr::new::<PyRuntimeError, _>(e.to_string()))
    }
}
