use crate::gate::ProcessingParameters;
use crate::marker::MarkerTag;
use crate::record::RecordDescriptor;
use crate::utils::align_up;
use crate::{Error, Result};
use ndarray::{Array1, Array2};

/// Number of 16-bit samples packed in one element of a normal-mode sample stream.
pub const PACKED_SAMPLES_PER_ELEMENT: usize = 2;

/// Valid samples of one gate, with the pre and post-gate samples around it.
#[derive(Debug, Clone, PartialEq)]
pub struct GateData {
    /// Index in the record of the first sample above threshold.
    pub start_index: i64,
    /// Index in the record of the first sample below threshold minus hysteresis.
    pub stop_index: i64,
    /// Index in the record of the first valid sample stored for the gate.
    pub data_start_index: i64,
    /// One past the index of the last valid sample stored for the gate.
    pub data_stop_index: i64,
    pub samples: Array1<i32>,
}

impl GateData {
    pub fn pre_gate_samples(&self) -> i64 {
        self.start_index - self.data_start_index
    }

    /// Actual post-gate samples. Negative when the record ended inside the gate.
    pub fn post_gate_samples(&self) -> i64 {
        self.data_stop_index - self.stop_index
    }
}

/// A zero-suppressed record rebuilt from its gates.
#[derive(Debug, Clone, PartialEq)]
pub struct UnpackedRecord {
    pub gates: Vec<GateData>,
    /// Record size once invalid pre-record samples are removed.
    pub actual_record_size: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Waveform {
    /// 16-bit digitizer samples.
    Samples(Array1<i16>),
    /// 32-bit averaged samples.
    Averages(Array1<i32>),
    Gates(UnpackedRecord),
}

/// A validated record, ready to be written out.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordEvent {
    pub record_index: u32,
    pub tag: MarkerTag,
    /// Absolute time of the first sample of the record.
    pub initial_x_time: f64,
    /// Absolute time of the trigger.
    pub trigger_time: f64,
    pub waveform: Waveform,
}

/// Split the packed elements of `n_records` consecutive records into one row
/// of 16-bit samples per record, low half of each element first.
pub fn unpack_normal_records(
    elements: &[i32],
    n_records: usize,
    record_elements: usize,
) -> Result<Array2<i16>> {
    let needed = n_records * record_elements;
    if elements.len() < needed {
        return Err(Error::Truncated {
            needed,
            available: elements.len(),
        });
    }

    let record_samples = record_elements * PACKED_SAMPLES_PER_ELEMENT;
    Ok(Array2::from_shape_fn(
        (n_records, record_samples),
        |(record, sample)| {
            let packed = elements[record * record_elements + sample / PACKED_SAMPLES_PER_ELEMENT];
            if sample % PACKED_SAMPLES_PER_ELEMENT == 0 {
                (packed & 0xffff) as i16
            } else {
                ((packed >> 16) & 0xffff) as i16
            }
        },
    ))
}

/// Split the elements of `n_records` consecutive averaged records into one
/// row per record, each element holding one 32-bit average.
pub fn unpack_averaged_records(
    elements: &[i32],
    n_records: usize,
    record_elements: usize,
) -> Result<Array2<i32>> {
    let needed = n_records * record_elements;
    if elements.len() < needed {
        return Err(Error::Truncated {
            needed,
            available: elements.len(),
        });
    }
    Array2::from_shape_vec((n_records, record_elements), elements[..needed].to_vec())
        .map_err(|e| Error::InvalidArgument(e.to_string()))
}

/// Rebuild the gates of a zero-suppressed record from the 32-bit samples
/// stored in memory for it.
///
/// `samples` starts with the first stored sample of the record.
pub fn unpack_gates(
    record: &RecordDescriptor,
    samples: &[i32],
    params: &ProcessingParameters,
    record_size: i64,
) -> Result<UnpackedRecord> {
    let pre_gate = i64::from(params.pre_gate_samples);
    let post_gate = i64::from(params.post_gate_samples);

    let mut actual_record_size = record_size;
    let mut next_gate_offset = 0i64;
    let mut gates = Vec::with_capacity(record.gates().len());

    for gate in record.gates() {
        let start_index = gate.start_marker().start_sample_index(params);
        let stop_index = gate.stop_marker().stop_sample_index(params);

        let mut leading_samples_to_skip = gate.start_marker().suppressed_sample_count();
        if start_index < pre_gate {
            // pre-gate samples acquired before the record started are invalid,
            // and they are stored by whole processing blocks
            let invalid_stored_samples = align_up(
                pre_gate - start_index,
                i64::from(params.processing_block_samples),
            )?;
            actual_record_size = (record_size - invalid_stored_samples).max(0);
            leading_samples_to_skip = invalid_stored_samples;
        }

        let data_start_index = (start_index - pre_gate).max(0);
        let data_stop_index = (stop_index + post_gate).min(actual_record_size);
        let first = next_gate_offset + leading_samples_to_skip;
        let count = (data_stop_index - data_start_index).max(0);

        let gate_samples = usize::try_from(first)
            .ok()
            .zip(usize::try_from(count).ok())
            .and_then(|(first, count)| samples.get(first..first + count))
            .ok_or(Error::Truncated {
                needed: usize::try_from(first + count).unwrap_or(usize::MAX),
                available: samples.len(),
            })?;

        gates.push(GateData {
            start_index,
            stop_index,
            data_start_index,
            data_stop_index,
            samples: Array1::from(gate_samples.to_vec()),
        });

        next_gate_offset += gate.stored_sample_count(params, record.record_stop_marker())?;
    }

    Ok(UnpackedRecord {
        gates,
        actual_record_size,
    })
}
