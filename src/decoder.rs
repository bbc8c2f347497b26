//! Incremental decoder for the marker stream.
//!
//! The decoder is meant to be driven by a streaming loop which keeps feeding
//! freshly fetched marker elements and takes complete records out of the
//! queue whenever enough of them are available:
//!
//! ```ignore
//! let mut decoder = MarkerStreamDecoder::new(Mode::ZeroSuppress);
//! loop {
//!     let mut stream = fetch_available(&mut driver, "MarkersCh1", max, &mut buffer)?;
//!     while !stream.is_empty() {
//!         decoder.decode_next(&mut stream)?;
//!     }
//!     if decoder.available_count() > 0 {
//!         for record in decoder.take(decoder.available_count())? {
//!             // ...
//!         }
//!     }
//! }
//! ```

use crate::gate::{GateMarker, GateStartMarker, StopMarker};
use crate::marker::{
    ensure_available, extract_tag, tag_byte, MarkerStream, MarkerTag, TriggerMarker,
    GATE_MARKER_ELEMENTS,
};
use crate::record::RecordDescriptor;
use crate::{Error, Result};
use log::trace;
use serde::Deserialize;
use std::collections::VecDeque;

/// Decoding mode, fixed for the lifetime of a decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Mode {
    /// ZeroSuppress disabled: the stream only carries trigger markers.
    Normal,
    ZeroSuppress,
}

/// ZeroSuppress decoding state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    ExpectTrigger,
    ExpectGate,
    ExpectAlign,
}

#[derive(Debug)]
pub struct MarkerStreamDecoder {
    mode: Mode,
    state: State,
    current: RecordDescriptor,
    queue: VecDeque<RecordDescriptor>,
}

impl MarkerStreamDecoder {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            state: State::ExpectTrigger,
            current: RecordDescriptor::default(),
            queue: VecDeque::new(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Decode the next marker of `stream`, removing it from the stream.
    ///
    /// At most one logical marker is consumed per call (leading dummy gates
    /// aside). A marker is either consumed whole or not at all.
    pub fn decode_next(&mut self, stream: &mut MarkerStream<'_>) -> Result<()> {
        if stream.is_empty() {
            return Err(Error::EmptyStream);
        }
        match self.mode {
            Mode::Normal => self.decode_next_normal(stream),
            Mode::ZeroSuppress => self.decode_next_zero_suppress(stream),
        }
    }

    /// Number of complete records waiting in the queue.
    pub fn available_count(&self) -> usize {
        self.queue.len()
    }

    /// Remove the oldest complete record from the queue.
    pub fn pop(&mut self) -> Result<RecordDescriptor> {
        self.queue.pop_front().ok_or(Error::EmptyQueue)
    }

    /// Remove the `count` oldest complete records from the queue.
    ///
    /// The queue is left untouched on failure.
    pub fn take(&mut self, count: usize) -> Result<Vec<RecordDescriptor>> {
        if count == 0 {
            return Err(Error::InvalidTakeCount(count));
        }
        if count > self.queue.len() {
            return Err(Error::QueueUnderflow {
                requested: count,
                available: self.queue.len(),
            });
        }
        Ok(self.queue.drain(..count).collect())
    }

    fn decode_next_normal(&mut self, stream: &mut MarkerStream<'_>) -> Result<()> {
        let trigger = TriggerMarker::decode(stream)?;
        trace!("record #{} decoded", trigger.record_index);
        self.queue.push_back(RecordDescriptor::new(trigger));
        Ok(())
    }

    fn decode_next_zero_suppress(&mut self, stream: &mut MarkerStream<'_>) -> Result<()> {
        match self.state {
            State::ExpectTrigger | State::ExpectAlign => {
                while extract_tag(stream[0]) == Some(MarkerTag::DummyGate) {
                    ensure_available(stream, GATE_MARKER_ELEMENTS)?;
                    stream.pop_front(GATE_MARKER_ELEMENTS)?;
                    if stream.is_empty() {
                        return Ok(());
                    }
                }

                self.current = RecordDescriptor::new(TriggerMarker::decode(stream)?);
                self.state = State::ExpectGate;
                trace!(
                    "record #{} started",
                    self.current.trigger_marker().record_index
                );
            }
            State::ExpectGate => {
                let record_complete = match extract_tag(stream[0]) {
                    Some(MarkerTag::GateStartCst) => {
                        ensure_available(stream, 2 * GATE_MARKER_ELEMENTS)?;
                        let start = GateStartMarker::new(stream[0], stream[1])?;
                        let stop = StopMarker::new(stream[2], stream[3])?;
                        let gate = GateMarker::new(start, stop)?;
                        stream.pop_front(2 * GATE_MARKER_ELEMENTS)?;

                        self.current.add_gate(gate);
                        if stop.is_record_stop() {
                            self.current.set_record_stop_marker(stop)?;
                        }
                        stop.is_record_stop()
                    }
                    Some(MarkerTag::RecordStop) => {
                        ensure_available(stream, GATE_MARKER_ELEMENTS)?;
                        let stop = StopMarker::new(stream[0], stream[1])?;
                        stream.pop_front(GATE_MARKER_ELEMENTS)?;

                        self.current.set_record_stop_marker(stop)?;
                        true
                    }
                    _ => {
                        return Err(Error::UnexpectedTag {
                            expected: "gate start or record stop",
                            found: tag_byte(stream[0]),
                        })
                    }
                };

                if record_complete {
                    let record = std::mem::take(&mut self.current);
                    trace!(
                        "record #{} complete with {} gates",
                        record.trigger_marker().record_index,
                        record.gates().len()
                    );
                    self.queue.push_back(record);
                    self.state = State::ExpectAlign;
                }
            }
        }
        Ok(())
    }
}
