use crate::{Error, Result};
use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

/// Size in bytes of one stream element.
pub const ELEMENT_BYTES: usize = std::mem::size_of::<i32>();

/// Divide `value` by `divider`, rounding up.
pub fn ceil_div(value: i64, divider: i64) -> Result<i64> {
    if divider <= 0 {
        return Err(Error::InvalidArgument(format!(
            "divider must be positive; got {divider}"
        )));
    }
    if value > 0 && value > i64::MAX - divider + 1 {
        return Err(Error::InvalidArgument(
            "integer overflow in ceil_div".to_string(),
        ));
    }
    Ok((value + if value > 0 { divider - 1 } else { 0 }) / divider)
}

/// Align `value` to the next integer multiple of `grain`.
pub fn align_up(value: i64, grain: i64) -> Result<i64> {
    if grain > 0 && value > i64::MAX - (grain - 1) {
        return Err(Error::InvalidArgument(
            "aligned up value exceeds the numeric limit".to_string(),
        ));
    }
    Ok(ceil_div(value, grain)? * grain)
}

/// Sign-extend the low `bits` bits of `value`.
pub fn expand_sign_i32(value: i32, bits: u32) -> i32 {
    assert!(bits > 0 && bits < 32, "invalid sign expansion width {bits}");
    if value >= 1 << (bits - 1) {
        (i64::from(value) - (1i64 << bits)) as i32
    } else {
        value
    }
}

/// Sign-extend the low `bits` bits of `value`.
pub fn expand_sign_i64(value: i64, bits: u32) -> i64 {
    assert!(bits > 0 && bits < 64, "invalid sign expansion width {bits}");
    if value >= 1i64 << (bits - 1) {
        value - (1i64 << bits)
    } else {
        value
    }
}

/// Convert a signed fixed-point value into floating point.
pub fn scale_signed(value: i32, integer_bits: u32, fraction_bits: u32) -> f64 {
    let scale = 1.0 / f64::from(1u32 << fraction_bits);
    f64::from(expand_sign_i32(value, integer_bits + fraction_bits)) * scale
}

/// Tracks the volume of elements read from a stream, with both
/// *all-time* counters and a *sliding 1 s window* rate.
#[derive(Debug)]
pub struct Counter {
    /// All-time total elements
    pub total_elements: usize,
    /// All-time number of non-empty fetches
    pub n_fetches: usize,
    /// Time when this counter was created or last reset
    pub t_begin: Instant,

    window: Duration,
    fetches: VecDeque<(Instant, usize)>,
    elements_in_window: usize,
}

impl Default for Counter {
    fn default() -> Self {
        Counter {
            total_elements: 0,
            n_fetches: 0,
            t_begin: Instant::now(),
            window: Duration::from_secs(1),
            fetches: VecDeque::new(),
            elements_in_window: 0,
        }
    }
}

impl Counter {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_elements * ELEMENT_BYTES
    }

    /// Long-term average rate since t_begin, in MB/s
    pub fn average_rate(&self) -> f64 {
        let secs = self.t_begin.elapsed().as_secs_f64().max(1e-6);
        (self.total_bytes() as f64 / secs) / (1024.0 * 1024.0)
    }

    /// Sliding-window rate over the last second, in MB/s
    pub fn rate(&self) -> f64 {
        let secs = self.window.as_secs_f64().max(1e-6);
        ((self.elements_in_window * ELEMENT_BYTES) as f64 / secs) / (1024.0 * 1024.0)
    }

    /// Record a fetch of `elements` elements. Empty fetches are ignored.
    pub fn increment(&mut self, elements: usize) {
        if elements == 0 {
            return;
        }
        let now = Instant::now();

        self.total_elements += elements;
        self.n_fetches += 1;

        self.fetches.push_back((now, elements));
        self.elements_in_window += elements;

        while let Some(&(ts, n)) = self.fetches.front() {
            if now.duration_since(ts) > self.window {
                self.fetches.pop_front();
                self.elements_in_window -= n;
            } else {
                break;
            }
        }
    }

    pub fn reset(&mut self) {
        self.total_elements = 0;
        self.n_fetches = 0;
        self.t_begin = Instant::now();

        self.fetches.clear();
        self.elements_in_window = 0;
    }
}
