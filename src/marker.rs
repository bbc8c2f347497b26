//! Marker tags and the trigger marker layout.
//!
//! Every marker starts with a 32-bit element whose low byte is the tag; the
//! tag alone decides how many elements the marker occupies and how the rest
//! of its payload is laid out.

use crate::{ArraySegment, Error, Result};

/// Stream of 32-bit marker elements.
pub type MarkerStream<'a> = ArraySegment<'a, i32>;

/// Number of elements of a trigger marker (512 bits).
pub const TRIGGER_MARKER_ELEMENTS: usize = 16;

/// Number of elements of gate start, gate stop, record stop and dummy markers (64 bits).
pub const GATE_MARKER_ELEMENTS: usize = 2;

/// Tag values of marker packets.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarkerTag {
    #[default]
    None = 0x00,
    TriggerNormal = 0x01,
    TriggerAverager = 0x02,
    GateStartCst = 0x04,
    GateStopCst = 0x05,
    DummyGate = 0x08,
    RecordStop = 0x0a,
}

impl MarkerTag {
    /// Decode a tag byte. Unknown values yield `None` in the `Option` sense.
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::None),
            0x01 => Some(Self::TriggerNormal),
            0x02 => Some(Self::TriggerAverager),
            0x04 => Some(Self::GateStartCst),
            0x05 => Some(Self::GateStopCst),
            0x08 => Some(Self::DummyGate),
            0x0a => Some(Self::RecordStop),
            _ => None,
        }
    }

    pub fn is_trigger(self) -> bool {
        matches!(self, Self::TriggerNormal | Self::TriggerAverager)
    }
}

/// Raw tag byte of a marker header element.
pub fn tag_byte(header: i32) -> u8 {
    (header as u32 & 0xff) as u8
}

/// Extract the tag of a marker header element, `None` for unknown values.
pub fn extract_tag(header: i32) -> Option<MarkerTag> {
    MarkerTag::from_byte(tag_byte(header))
}

/// Fail with `Truncated` unless `stream` holds at least `needed` elements.
pub(crate) fn ensure_available(stream: &MarkerStream<'_>, needed: usize) -> Result<()> {
    if stream.size() < needed {
        return Err(Error::Truncated {
            needed,
            available: stream.size(),
        });
    }
    Ok(())
}

/// A decoded trigger marker.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TriggerMarker {
    pub tag: MarkerTag,
    /// Time between trigger and the next sampling instant, in sample intervals,
    /// within `]-1, 0]`. Trigger delay is not included.
    pub trigger_time_samples: f64,
    /// Absolute index (since module init/reset) of the first sample of the record.
    pub absolute_sample_index: u64,
    pub record_index: u32,
}

impl TriggerMarker {
    pub const RECORD_INDEX_MASK: u32 = 0x00ff_ffff;

    /// Decode the three significant elements of a trigger marker.
    pub fn from_elements(header: i32, low: i32, high: i32) -> Result<Self> {
        let header = header as u32;
        let low = low as u32;
        let high = high as u32;

        let tag = MarkerTag::from_byte((header & 0xff) as u8)
            .filter(|tag| tag.is_trigger())
            .ok_or(Error::UnexpectedTag {
                expected: "trigger",
                found: (header & 0xff) as u8,
            })?;

        let timestamp_low = u64::from((low >> 8) & 0x00ff_ffff);
        let timestamp_high = u64::from(high) << 24;

        Ok(Self {
            tag,
            trigger_time_samples: -(f64::from(low & 0xff) / 256.0),
            absolute_sample_index: timestamp_high | timestamp_low,
            record_index: (header >> 8) & Self::RECORD_INDEX_MASK,
        })
    }

    /// Expect a trigger marker at the front of `stream`, decode it and consume it.
    ///
    /// The stream is left untouched on failure.
    pub fn decode(stream: &mut MarkerStream<'_>) -> Result<Self> {
        if stream.is_empty() {
            return Err(Error::EmptyStream);
        }
        let tag = tag_byte(stream[0]);
        if !MarkerTag::from_byte(tag).is_some_and(MarkerTag::is_trigger) {
            return Err(Error::UnexpectedTag {
                expected: "trigger",
                found: tag,
            });
        }
        ensure_available(stream, TRIGGER_MARKER_ELEMENTS)?;

        let marker = Self::from_elements(stream[0], stream[1], stream[2])?;
        stream.pop_front(TRIGGER_MARKER_ELEMENTS)?;
        Ok(marker)
    }

    /// Encode the significant elements back into raw marker words.
    ///
    /// `trigger_time_samples` is quantised to 1/256 of a sample.
    pub fn to_elements(&self) -> [i32; 3] {
        let header = (self.tag as u32) | ((self.record_index & Self::RECORD_INDEX_MASK) << 8);
        let fraction = ((-self.trigger_time_samples * 256.0).round() as u32) & 0xff;
        let low = fraction | (((self.absolute_sample_index & 0x00ff_ffff) as u32) << 8);
        let high = (self.absolute_sample_index >> 24) as u32;
        [header as i32, low as i32, high as i32]
    }

    /// Absolute time of the first sample of the record.
    pub fn initial_x_time(&self, timestamp_period: f64) -> f64 {
        self.absolute_sample_index as f64 * timestamp_period
    }

    /// Time between the first sample of the record and the trigger event.
    pub fn initial_x_offset(&self, sample_period: f64, trigger_delay: f64) -> f64 {
        self.trigger_time_samples * sample_period + trigger_delay
    }

    /// Absolute time of the trigger event.
    pub fn trigger_time(&self, timestamp_period: f64, sample_period: f64, trigger_delay: f64) -> f64 {
        self.initial_x_time(timestamp_period) + self.initial_x_offset(sample_period, trigger_delay)
    }
}
