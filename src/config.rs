use crate::digitizer_params::{processing_parameters_for_model, timestamp_period_for_model};
use crate::event::PACKED_SAMPLES_PER_ELEMENT;
use crate::fetch::FetchPolicy;
use crate::gate::ProcessingParameters;
use crate::marker::{MarkerTag, TRIGGER_MARKER_ELEMENTS};
use crate::utils::align_up;
use crate::{Mode, Result};
use confique::Config;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Config, Debug, Clone)]
pub struct Conf {
    #[config(nested)]
    pub acquisition: AcquisitionSettings,
    #[config(nested)]
    pub zero_suppress: ZeroSuppressSettings,
    #[config(nested)]
    pub readout: ReadoutSettings,
    #[config(nested)]
    pub output: OutputSettings,
}

#[derive(Config, Debug, Clone)]
pub struct AcquisitionSettings {
    #[config(env = "AQMD_MODEL")]
    pub model: String,
    #[config(default = "Normal")]
    pub mode: Mode,
    /// Record size in samples.
    pub record_size: usize,
    /// Sample rate in Hz.
    pub sample_rate: f64,
    /// Trigger tag every record must carry. Follows the mode when unset.
    pub trigger_kind: Option<TriggerKind>,
    /// Trigger delay in seconds.
    #[config(default = 0.0)]
    pub trigger_delay: f64,
    #[config(default = false)]
    pub channel2_enabled: bool,
    #[config(default = false)]
    pub channel_interleaving: bool,
}

#[derive(Config, Debug, Clone)]
pub struct ZeroSuppressSettings {
    #[config(default = 0)]
    pub pre_gate_samples: i32,
    #[config(default = 0)]
    pub post_gate_samples: i32,
    pub storage_block_samples: Option<i32>,
    pub processing_block_samples: Option<i32>,
}

#[derive(Config, Debug, Clone)]
pub struct ReadoutSettings {
    #[config(default = "MarkersCh1")]
    pub marker_stream: String,
    #[config(default = "StreamCh1")]
    pub sample_stream: String,
    #[config(default = 5)]
    pub max_records_at_once: usize,
    #[config(default = 1)]
    pub estimated_gates_per_record: usize,
    #[config(default = 100)]
    pub data_wait_ms: u64,
    #[config(default = 3)]
    pub fetch_attempts: u32,
    /// Stream granularity in elements, for the alignment overhead of buffers.
    #[config(default = 1)]
    pub marker_grain_elements: usize,
    #[config(default = 1)]
    pub sample_grain_elements: usize,
    /// Run duration in seconds.
    #[config(env = "AQMD_RUN_DURATION", default = 300)]
    pub run_duration: u64,
}

#[derive(Config, Debug, Clone)]
pub struct OutputSettings {
    #[config(env = "AQMD_OUTPUT_DIR", default = "./")]
    pub output_dir: String,
    #[config(default = "aqmd_stream.log")]
    pub log_file: String,
    #[config(default = "StreamingRecords.log")]
    pub record_file: String,
}

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerKind {
    Normal,
    Averager,
}

impl Conf {
    /// Load from a TOML file, `AQMD_*` environment variables taking precedence.
    pub fn load(path: &Path) -> std::result::Result<Self, confique::Error> {
        Conf::builder().env().file(path).load()
    }

    /// Configured trigger kind, or the one implied by the mode.
    pub fn trigger_kind(&self) -> TriggerKind {
        self.acquisition
            .trigger_kind
            .unwrap_or(match self.acquisition.mode {
                Mode::Normal => TriggerKind::Normal,
                Mode::ZeroSuppress => TriggerKind::Averager,
            })
    }

    pub fn expected_trigger_tag(&self) -> MarkerTag {
        match self.trigger_kind() {
            TriggerKind::Normal => MarkerTag::TriggerNormal,
            TriggerKind::Averager => MarkerTag::TriggerAverager,
        }
    }

    /// Digitizer samples are 16-bit and packed by two, averaged samples
    /// fill a whole element.
    pub fn samples_per_element(&self) -> usize {
        match self.trigger_kind() {
            TriggerKind::Normal => PACKED_SAMPLES_PER_ELEMENT,
            TriggerKind::Averager => 1,
        }
    }

    pub fn record_elements(&self) -> usize {
        self.acquisition.record_size / self.samples_per_element()
    }

    pub fn sample_interval(&self) -> f64 {
        1.0 / self.acquisition.sample_rate
    }

    pub fn timestamp_period(&self) -> Result<f64> {
        timestamp_period_for_model(
            &self.acquisition.model,
            self.acquisition.channel_interleaving,
        )
    }

    /// Zero-suppress parameters of the configured model, block sizes
    /// overridden by the configuration when set.
    pub fn processing_parameters(&self) -> Result<ProcessingParameters> {
        let zs = &self.zero_suppress;
        let mut params = processing_parameters_for_model(
            &self.acquisition.model,
            self.acquisition.channel2_enabled,
            zs.pre_gate_samples,
            zs.post_gate_samples,
        )?;
        if let Some(samples) = zs.storage_block_samples {
            params.storage_block_samples = samples;
        }
        if let Some(samples) = zs.processing_block_samples {
            params.processing_block_samples = samples;
        }
        Ok(params)
    }

    /// Trigger marker plus the estimated gates, aligned on a trigger marker.
    pub fn estimated_marker_elements_per_record(&self) -> Result<usize> {
        let elements = match self.acquisition.mode {
            Mode::Normal => TRIGGER_MARKER_ELEMENTS,
            Mode::ZeroSuppress => {
                let gates = self.readout.estimated_gates_per_record as i64;
                align_up(16 + gates * 4, TRIGGER_MARKER_ELEMENTS as i64)? as usize
            }
        };
        Ok(elements)
    }

    pub fn marker_elements_to_fetch(&self) -> Result<usize> {
        Ok(self.readout.max_records_at_once * self.estimated_marker_elements_per_record()?)
    }

    pub fn marker_buffer_size(&self) -> Result<usize> {
        Ok(self.marker_elements_to_fetch()? + self.readout.marker_grain_elements - 1)
    }

    pub fn acquisition_elements(&self) -> usize {
        self.readout.max_records_at_once * self.record_elements()
    }

    /// Useful size, plus unfolding and alignment overheads.
    pub fn sample_buffer_size(&self) -> usize {
        let elements = self.acquisition_elements();
        elements + elements / 2 + self.readout.sample_grain_elements - 1
    }

    pub fn data_wait(&self) -> Duration {
        Duration::from_millis(self.readout.data_wait_ms)
    }

    pub fn run_duration(&self) -> Duration {
        Duration::from_secs(self.readout.run_duration)
    }

    /// Exact fetches wait for one record duration between attempts.
    pub fn fetch_policy(&self) -> FetchPolicy {
        let record_ms =
            (self.acquisition.record_size as f64 * self.sample_interval() * 1000.0) as u64;
        FetchPolicy {
            attempts: self.readout.fetch_attempts,
            wait: Duration::from_millis(record_ms.max(1)),
        }
    }
}
