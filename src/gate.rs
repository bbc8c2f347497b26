//! Zero-suppression gate markers.
//!
//! A gate describes data samples stored in memory in the following way:
//!
//! ```text
//! +---------+----------+--------------------+-----------+---------+
//! | padding | pre gate |        gate        | post gate | padding |
//! +---------+----------+--------------------+-----------+---------+
//!                      ^                    ^
//!                    start                 stop
//! ```
//!
//! The leading padding is the part of the first processing block before the
//! start sample. The trailing padding fills the last processing block and the
//! storage alignment (512-bit).

use crate::marker::{tag_byte, MarkerTag};
use crate::utils::align_up;
use crate::{Error, Result};
use serde::Deserialize;

/// Per-model processing and storage parameters.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ProcessingParameters {
    /// Number of samples in a memory block.
    pub storage_block_samples: i32,
    /// Number of samples in a processing block.
    pub processing_block_samples: i32,
    /// Timestamp period in seconds.
    pub timestamp_period: f64,
    pub pre_gate_samples: i32,
    pub post_gate_samples: i32,
}

impl ProcessingParameters {
    pub fn new(
        storage_block_samples: i32,
        processing_block_samples: i32,
        timestamp_period: f64,
        pre_gate_samples: i32,
        post_gate_samples: i32,
    ) -> Self {
        Self {
            storage_block_samples,
            processing_block_samples,
            timestamp_period,
            pre_gate_samples,
            post_gate_samples,
        }
    }
}

/// Block position encoded in a 64-bit gate marker: bits 24..31 of element 0
/// are the low byte, bits 0..23 of element 1 the upper 24 bits.
pub fn extract_position(element0: i32, element1: i32) -> i64 {
    let low = i64::from((element0 as u32 >> 24) & 0xff);
    let high = i64::from(element1 as u32 & 0x00ff_ffff) << 8;
    high | low
}

fn checked_block_index(element0: i32, element1: i32) -> Result<i64> {
    let index = extract_position(element0, element1);
    if index < 1 {
        return Err(Error::InvalidBlockIndex {
            index,
            element0: element0 as u32,
            element1: element1 as u32,
        });
    }
    Ok(index)
}

/// Gate start marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateStartMarker {
    block_index: i64,
    start_sample_index: i32,
}

impl GateStartMarker {
    /// Build a start marker from a raw 64-bit marker, `element0` being the
    /// least significant half.
    pub fn new(element0: i32, element1: i32) -> Result<Self> {
        let tag = tag_byte(element0);
        if tag != MarkerTag::GateStartCst as u8 {
            return Err(Error::UnexpectedTag {
                expected: "gate start",
                found: tag,
            });
        }
        Ok(Self {
            block_index: checked_block_index(element0, element1)?,
            start_sample_index: (element1 >> 24) & 0xff,
        })
    }

    /// Number of leading suppressed samples in the first block of the gate.
    pub fn suppressed_sample_count(&self) -> i64 {
        i64::from(self.start_sample_index)
    }

    /// Index in the record of the first sample above the zero-suppress threshold.
    pub fn start_sample_index(&self, params: &ProcessingParameters) -> i64 {
        (self.block_index - 1) * i64::from(params.processing_block_samples)
            + self.suppressed_sample_count()
    }

    pub fn block_index(&self) -> i64 {
        self.block_index
    }
}

/// Stop marker, closing either a gate or a whole record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopMarker {
    block_index: i64,
    gate_end_index: i32,
    tag: MarkerTag,
}

pub type GateStopMarker = StopMarker;
pub type RecordStopMarker = StopMarker;

impl StopMarker {
    /// Build a stop marker from a raw 64-bit marker, `element0` being the
    /// least significant half.
    pub fn new(element0: i32, element1: i32) -> Result<Self> {
        let tag = match MarkerTag::from_byte(tag_byte(element0)) {
            Some(tag @ (MarkerTag::GateStopCst | MarkerTag::RecordStop)) => tag,
            _ => {
                return Err(Error::UnexpectedTag {
                    expected: "gate stop or record stop",
                    found: tag_byte(element0),
                })
            }
        };
        Ok(Self {
            block_index: checked_block_index(element0, element1)?,
            gate_end_index: (element1 >> 24) & 0xff,
            tag,
        })
    }

    /// Number of trailing suppressed samples in the last block of the gate.
    pub fn suppressed_sample_count(&self, params: &ProcessingParameters) -> i64 {
        i64::from(params.processing_block_samples - self.gate_end_index)
            - i64::from(self.is_record_stop())
    }

    /// Index in the record of the first sample below threshold minus hysteresis.
    pub fn stop_sample_index(&self, params: &ProcessingParameters) -> i64 {
        (self.block_index - 1) * i64::from(params.processing_block_samples)
            - self.suppressed_sample_count(params)
    }

    /// True when the gate is cut by the end of the record.
    pub fn is_record_stop(&self) -> bool {
        self.tag == MarkerTag::RecordStop
    }

    pub fn block_index(&self) -> i64 {
        self.block_index
    }

    pub fn tag(&self) -> MarkerTag {
        self.tag
    }
}

/// Implicit record stop used when a record carries no explicit one.
impl Default for StopMarker {
    fn default() -> Self {
        Self {
            block_index: 1,
            gate_end_index: 0,
            tag: MarkerTag::RecordStop,
        }
    }
}

/// A gate: one start marker followed by one stop marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateMarker {
    start: GateStartMarker,
    stop: GateStopMarker,
}

impl GateMarker {
    /// Pair `start` and `stop`.
    ///
    /// A stop block before the start block means the block counter wrapped
    /// around; that is reported as an error.
    pub fn new(start: GateStartMarker, stop: GateStopMarker) -> Result<Self> {
        if stop.block_index() < start.block_index() {
            return Err(Error::BlockIndexWraparound {
                start: start.block_index(),
                stop: stop.block_index(),
            });
        }
        Ok(Self { start, stop })
    }

    pub fn start_marker(&self) -> &GateStartMarker {
        &self.start
    }

    pub fn stop_marker(&self) -> &GateStopMarker {
        &self.stop
    }

    /// Number of samples stored in memory for this gate, padding included.
    ///
    /// Pre and post-gate samples acquired after `record_stop` are not stored.
    pub fn stored_sample_count(
        &self,
        params: &ProcessingParameters,
        record_stop: &RecordStopMarker,
    ) -> Result<i64> {
        let gate_blocks = self.stop.block_index() - self.start.block_index();
        let post_gate_record_blocks = record_stop.block_index() - self.stop.block_index();

        if post_gate_record_blocks < 0 {
            return Err(Error::RecordStopBeforeGateStop {
                record_stop: record_stop.block_index(),
                gate_stop: self.stop.block_index(),
            });
        }

        let block_samples = i64::from(params.processing_block_samples);
        let gate_samples = gate_blocks * block_samples;
        let post_gate_record_samples = post_gate_record_blocks * block_samples;
        let additional_samples = post_gate_record_samples
            .min(i64::from(params.pre_gate_samples) + i64::from(params.post_gate_samples));

        align_up(
            gate_samples + additional_samples,
            i64::from(params.storage_block_samples),
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Raw 64-bit gate marker with the given tag, block index and payload byte.
    pub(crate) fn gate_words(tag: MarkerTag, block_index: u32, payload: u8) -> [i32; 2] {
        let element0 = (tag as u32) | ((block_index & 0xff) << 24);
        let element1 = ((block_index >> 8) & 0x00ff_ffff) | (u32::from(payload) << 24);
        [element0 as i32, element1 as i32]
    }

    fn params(pre: i32, post: i32) -> ProcessingParameters {
        ProcessingParameters::new(16, 16, 500e-12, pre, post)
    }

    fn gate(start: u32, stop: u32) -> GateMarker {
        let [s0, s1] = gate_words(MarkerTag::GateStartCst, start, 0);
        let [e0, e1] = gate_words(MarkerTag::GateStopCst, stop, 0);
        GateMarker::new(
            GateStartMarker::new(s0, s1).unwrap(),
            StopMarker::new(e0, e1).unwrap(),
        )
        .unwrap()
    }

    fn record_stop(block: u32) -> RecordStopMarker {
        let [r0, r1] = gate_words(MarkerTag::RecordStop, block, 0);
        StopMarker::new(r0, r1).unwrap()
    }

    #[test]
    fn position_spans_both_elements() {
        let [e0, e1] = gate_words(MarkerTag::GateStartCst, 0x0012_3456, 0xab);
        assert_eq!(extract_position(e0, e1), 0x0012_3456);

        let start = GateStartMarker::new(e0, e1).unwrap();
        assert_eq!(start.block_index(), 0x0012_3456);
        assert_eq!(start.suppressed_sample_count(), 0xab);
    }

    #[test]
    fn zero_block_index_is_invalid() {
        let [e0, e1] = gate_words(MarkerTag::GateStartCst, 0, 3);
        assert!(matches!(
            GateStartMarker::new(e0, e1),
            Err(Error::InvalidBlockIndex { index: 0, .. })
        ));
        let [e0, e1] = gate_words(MarkerTag::RecordStop, 0, 3);
        assert!(matches!(
            StopMarker::new(e0, e1),
            Err(Error::InvalidBlockIndex { index: 0, .. })
        ));
    }

    #[test]
    fn wrong_tags_are_rejected() {
        let [e0, e1] = gate_words(MarkerTag::GateStopCst, 2, 0);
        assert!(matches!(
            GateStartMarker::new(e0, e1),
            Err(Error::UnexpectedTag { found: 0x05, .. })
        ));
        let [e0, e1] = gate_words(MarkerTag::DummyGate, 2, 0);
        assert!(matches!(
            StopMarker::new(e0, e1),
            Err(Error::UnexpectedTag { found: 0x08, .. })
        ));
    }

    #[test]
    fn sample_indices() {
        let p = params(0, 0);
        let [s0, s1] = gate_words(MarkerTag::GateStartCst, 3, 5);
        let start = GateStartMarker::new(s0, s1).unwrap();
        assert_eq!(start.start_sample_index(&p), 2 * 16 + 5);

        let [e0, e1] = gate_words(MarkerTag::GateStopCst, 6, 10);
        let stop = StopMarker::new(e0, e1).unwrap();
        assert!(!stop.is_record_stop());
        assert_eq!(stop.suppressed_sample_count(&p), 6);
        assert_eq!(stop.stop_sample_index(&p), 5 * 16 - 6);

        let [r0, r1] = gate_words(MarkerTag::RecordStop, 6, 10);
        let stop = StopMarker::new(r0, r1).unwrap();
        assert!(stop.is_record_stop());
        assert_eq!(stop.suppressed_sample_count(&p), 5);
    }

    #[test]
    fn implicit_record_stop() {
        let stop = StopMarker::default();
        assert!(stop.is_record_stop());
        assert_eq!(stop.block_index(), 1);
    }

    #[test]
    fn stop_before_start_is_wraparound() {
        let [s0, s1] = gate_words(MarkerTag::GateStartCst, 9, 0);
        let [e0, e1] = gate_words(MarkerTag::GateStopCst, 4, 0);
        let result = GateMarker::new(
            GateStartMarker::new(s0, s1).unwrap(),
            StopMarker::new(e0, e1).unwrap(),
        );
        assert!(matches!(
            result,
            Err(Error::BlockIndexWraparound { start: 9, stop: 4 })
        ));
    }

    #[test]
    fn stored_samples_without_padding() {
        let count = gate(2, 5)
            .stored_sample_count(&params(0, 0), &record_stop(10))
            .unwrap();
        assert_eq!(count, 48);
    }

    #[test]
    fn stored_samples_include_pre_and_post_gate() {
        // 48 gate samples + 8 + 12 padding, aligned to 16
        let count = gate(2, 5)
            .stored_sample_count(&params(8, 12), &record_stop(10))
            .unwrap();
        assert_eq!(count, 80);
    }

    #[test]
    fn stored_samples_are_bounded_by_record_stop() {
        // only one block left before the record stop
        let count = gate(2, 5)
            .stored_sample_count(&params(40, 40), &record_stop(6))
            .unwrap();
        assert_eq!(count, 64);

        // gate ending on the record stop stores no extra samples
        let count = gate(2, 5)
            .stored_sample_count(&params(40, 40), &record_stop(5))
            .unwrap();
        assert_eq!(count, 48);
    }

    #[test]
    fn storage_alignment_rounds_up() {
        let p = ProcessingParameters::new(32, 16, 500e-12, 0, 0);
        let count = gate(2, 5).stored_sample_count(&p, &record_stop(10)).unwrap();
        assert_eq!(count, 64);
    }

    #[test]
    fn record_stop_before_gate_stop_fails() {
        assert!(matches!(
            gate(2, 5).stored_sample_count(&params(0, 0), &record_stop(4)),
            Err(Error::RecordStopBeforeGateStop {
                record_stop: 4,
                gate_stop: 5
            })
        ));
    }
}
