use crate::gate::{GateMarker, ProcessingParameters, RecordStopMarker};
use crate::marker::TriggerMarker;
use crate::{Error, Result};

/// A record: its trigger marker, the gates it contains in acquisition order,
/// and the marker that closed it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordDescriptor {
    trigger: TriggerMarker,
    gates: Vec<GateMarker>,
    record_stop: RecordStopMarker,
}

impl RecordDescriptor {
    pub fn new(trigger: TriggerMarker) -> Self {
        Self {
            trigger,
            ..Default::default()
        }
    }

    pub fn trigger_marker(&self) -> &TriggerMarker {
        &self.trigger
    }

    pub fn record_stop_marker(&self) -> &RecordStopMarker {
        &self.record_stop
    }

    /// Set the record-stop marker. Gate-stop markers are refused.
    pub fn set_record_stop_marker(&mut self, record_stop: RecordStopMarker) -> Result<()> {
        if !record_stop.is_record_stop() {
            return Err(Error::NotRecordStop);
        }
        self.record_stop = record_stop;
        Ok(())
    }

    pub fn add_gate(&mut self, gate: GateMarker) {
        self.gates.push(gate);
    }

    pub fn gates(&self) -> &[GateMarker] {
        &self.gates
    }

    /// Number of samples stored in memory for all gates of the record.
    pub fn stored_sample_count(&self, params: &ProcessingParameters) -> Result<i64> {
        self.gates.iter().try_fold(0i64, |total, gate| {
            Ok(total + gate.stored_sample_count(params, &self.record_stop)?)
        })
    }
}

/// Number of samples stored in memory for every record of `records`.
pub fn stored_sample_count_for_records(
    records: &[RecordDescriptor],
    params: &ProcessingParameters,
) -> Result<i64> {
    records.iter().try_fold(0i64, |total, record| {
        Ok(total + record.stored_sample_count(params)?)
    })
}
