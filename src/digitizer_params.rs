use crate::gate::ProcessingParameters;
use crate::{Error, Result};
use log::info;

/// Model families and their timestamp period in seconds.
const TIMESTAMP_PERIODS: &[(&str, f64)] = &[
    ("SA108", 1e-9),
    ("SA120", 1e-9),
    ("SA220", 500e-12),
    ("SA230", 250e-12),
    ("SA240", 250e-12),
    ("SA217", 250e-12),
    ("SA248", 125e-12),
];

/// Models with the averager and zero-suppress options.
const ZERO_SUPPRESS_MODELS: &[&str] = &["SA220"];

const ZERO_SUPPRESS_BLOCK_SAMPLES: i32 = 16;

/// Strip the form factor suffix (P for PCIe, E for PXIe) of a model name.
fn model_family(model: &str) -> Option<&str> {
    model
        .strip_suffix('P')
        .or_else(|| model.strip_suffix('E'))
}

/// Timestamp period of `model`, in seconds.
///
/// The SA120 timestamps on the interleaved sampling clock when channel
/// interleaving is enabled.
pub fn timestamp_period_for_model(model: &str, channel_interleaving: bool) -> Result<f64> {
    let family = model_family(model).ok_or_else(|| Error::UnsupportedModel(model.to_string()))?;
    if family == "SA120" && channel_interleaving {
        return Ok(500e-12);
    }
    TIMESTAMP_PERIODS
        .iter()
        .find(|(name, _)| *name == family)
        .map(|&(_, period)| period)
        .ok_or_else(|| Error::UnsupportedModel(model.to_string()))
}

/// Zero-suppress processing parameters of `model`.
///
/// Processing and storage blocks hold 16 samples per channel, so they double
/// when channel 2 is disabled and channel 1 combines both ADCs.
pub fn processing_parameters_for_model(
    model: &str,
    channel2_enabled: bool,
    pre_gate_samples: i32,
    post_gate_samples: i32,
) -> Result<ProcessingParameters> {
    let supported = model_family(model).is_some_and(|family| ZERO_SUPPRESS_MODELS.contains(&family));
    if !supported {
        return Err(Error::UnsupportedModel(format!(
            "averager with zero-suppress not supported on {model}"
        )));
    }

    let combine_factor = if channel2_enabled { 1 } else { 2 };
    let block_samples = ZERO_SUPPRESS_BLOCK_SAMPLES * combine_factor;
    Ok(ProcessingParameters::new(
        block_samples,
        block_samples,
        timestamp_period_for_model(model, false)?,
        pre_gate_samples,
        post_gate_samples,
    ))
}

pub fn log_parameters(model: &str, params: &ProcessingParameters) {
    let param_log = [
        format!("StorageBlockSamples: {}", params.storage_block_samples),
        format!("ProcessingBlockSamples: {}", params.processing_block_samples),
        format!("TimestampPeriod: {:e} s", params.timestamp_period),
        format!("PreGateSamples: {}", params.pre_gate_samples),
        format!("PostGateSamples: {}", params.post_gate_samples),
    ]
    .join("\n");
    info!("{model} processing parameters:\n{param_log}");
}
