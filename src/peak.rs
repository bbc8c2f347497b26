//! Peak-list marker stream.
//!
//! Every marker of the peak stream occupies 8 elements (256 bits), whatever
//! its tag.

use crate::marker::{tag_byte, MarkerStream};
use crate::utils::{expand_sign_i64, scale_signed};
use crate::{Error, Result};

pub const PEAK_MARKER_ELEMENTS: usize = 8;

pub const PEAK_TRIGGER_TAG: u8 = 0x11;
pub const PEAK_PULSE_TAG: u8 = 0x14;
pub const PEAK_ALIGNMENT_TAG: u8 = 0x1f;

// (integer bits, fractional bits) of the fixed-point pulse fields
const PEAK_X_FORMAT: (u32, u32) = (14, 8);
const PEAK_Y_FORMAT: (u32, u32) = (17, 3);
const COM_X_FORMAT: (u32, u32) = (16, 8);
const COM_Y_FORMAT: (u32, u32) = (16, 1);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakTrigger {
    pub record_index: u32,
    /// Sub-sample position of the trigger, within `]-1, 0]`.
    pub subsample_position: f64,
    pub trigger_sample_index: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pulse {
    pub record_index: u32,
    /// Relative to the first sample of the record. Negative when the pulse
    /// started before the trigger.
    pub timestamp: i64,
    /// Width in samples.
    pub width: u32,
    pub overflow: bool,
    pub overrange_samples: u32,
    /// Relative to the baseline, in ADC code squared.
    pub sum_of_squares: i64,
    /// Peak timestamp relative to the first pulse sample.
    pub peak_x: f64,
    /// Peak value in 16-bit ADC code.
    pub peak_y: f64,
    /// Centre of mass relative to the first pulse sample.
    pub center_of_mass_x: f64,
    /// Centre of mass value relative to the baseline.
    pub center_of_mass_y: f64,
}

/// A marker of the peak-list stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PeakMarker {
    Trigger(PeakTrigger),
    Pulse(Pulse),
    Alignment,
}

impl PeakMarker {
    /// Decode the marker at the front of `stream` and consume it.
    ///
    /// The stream is left untouched on failure.
    pub fn decode(stream: &mut MarkerStream<'_>) -> Result<Self> {
        if stream.is_empty() {
            return Err(Error::EmptyStream);
        }
        let tag = tag_byte(stream[0]);
        if !matches!(tag, PEAK_TRIGGER_TAG | PEAK_PULSE_TAG | PEAK_ALIGNMENT_TAG) {
            return Err(Error::UnexpectedTag {
                expected: "peak-list",
                found: tag,
            });
        }
        if stream.size() < PEAK_MARKER_ELEMENTS {
            return Err(Error::Truncated {
                needed: PEAK_MARKER_ELEMENTS,
                available: stream.size(),
            });
        }

        let items: [u32; PEAK_MARKER_ELEMENTS] = std::array::from_fn(|i| stream[i] as u32);
        let marker = match tag {
            PEAK_TRIGGER_TAG => Self::Trigger(decode_trigger(&items)),
            PEAK_PULSE_TAG => Self::Pulse(decode_pulse(&items)),
            _ => Self::Alignment,
        };
        stream.pop_front(PEAK_MARKER_ELEMENTS)?;
        Ok(marker)
    }
}

fn decode_trigger(items: &[u32; PEAK_MARKER_ELEMENTS]) -> PeakTrigger {
    let [header, low, high, ..] = *items;
    PeakTrigger {
        record_index: (header >> 8) & 0x00ff_ffff,
        subsample_position: -(f64::from(low & 0xff) / 256.0),
        trigger_sample_index: (u64::from(high) << 24) | u64::from((low >> 8) & 0x00ff_ffff),
    }
}

fn decode_pulse(items: &[u32; PEAK_MARKER_ELEMENTS]) -> Pulse {
    let [header, item1, item2, item3, item4, item5, item6, item7] = *items;

    let unsigned_timestamp = i64::from(item1) | (i64::from(item2 & 0xffff) << 32);
    let sum_of_squares = (i64::from(item4) << 16) | i64::from((item3 >> 16) & 0xffff);

    let peak_x = item5 & 0x00ff_ffff;
    let peak_y = ((item5 >> 24) & 0xff) | ((item6 & 0xffff) << 8);
    let com_x = ((item6 >> 16) & 0xffff) | ((item7 & 0xff) << 16);
    let com_y = (item7 >> 8) & 0x00ff_ffff;

    Pulse {
        record_index: (header >> 8) & 0x00ff_ffff,
        timestamp: expand_sign_i64(unsigned_timestamp, 48),
        width: (item2 >> 16) & 0x7fff,
        overflow: (item2 >> 31) & 0x01 != 0,
        overrange_samples: item3 & 0x7fff,
        sum_of_squares,
        peak_x: scale_fixed(peak_x, PEAK_X_FORMAT),
        peak_y: scale_fixed(peak_y, PEAK_Y_FORMAT),
        center_of_mass_x: scale_fixed(com_x, COM_X_FORMAT),
        center_of_mass_y: scale_fixed(com_y, COM_Y_FORMAT),
    }
}

fn scale_fixed(raw: u32, (integer_bits, fraction_bits): (u32, u32)) -> f64 {
    scale_signed(raw as i32, integer_bits, fraction_bits)
}

/// Decode every marker of `stream`, draining it.
///
/// On failure the stream stops on the offending marker, and markers decoded
/// before it are lost to the caller.
pub fn decode_peak_markers(stream: &mut MarkerStream<'_>) -> Result<Vec<PeakMarker>> {
    let mut markers = Vec::with_capacity(stream.size() / PEAK_MARKER_ELEMENTS);
    while !stream.is_empty() {
        markers.push(PeakMarker::decode(stream)?);
    }
    Ok(markers)
}
