//! Replay of captured streams.
//!
//! A capture is a file of little-endian 32-bit elements, exactly as fetched
//! from one stream of the instrument.

use crate::fetch::{FetchReport, StreamDriver};
use crate::utils::ELEMENT_BYTES;
use crate::{Error, Result};
use log::{debug, info};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Default)]
struct Capture {
    elements: Vec<i32>,
    position: usize,
    arrived: usize,
}

impl Capture {
    fn available(&self) -> usize {
        self.arrived.min(self.elements.len()) - self.position
    }
}

/// Stream driver serving captured streams.
#[derive(Debug)]
pub struct ReplayDriver {
    captures: HashMap<String, Capture>,
    first_valid: usize,
    burst: usize,
}

impl Default for ReplayDriver {
    fn default() -> Self {
        Self {
            captures: HashMap::new(),
            first_valid: 0,
            burst: usize::MAX,
        }
    }
}

impl ReplayDriver {
    pub fn new() -> Self {
        Default::default()
    }

    /// Place delivered data at `offset` in the caller buffer, when it fits.
    pub fn with_first_valid(mut self, offset: usize) -> Self {
        self.first_valid = offset;
        self
    }

    /// Make at most `elements` new elements available on each fetch call,
    /// instead of the whole capture at once.
    pub fn with_burst(mut self, elements: usize) -> Self {
        self.burst = elements.max(1);
        self
    }

    pub fn add_stream(&mut self, name: &str, elements: Vec<i32>) {
        debug!("replaying {} elements on {name}", elements.len());
        self.captures.insert(
            name.to_string(),
            Capture {
                elements,
                ..Default::default()
            },
        );
    }

    /// Load the capture of stream `name` from `path`.
    pub fn load_stream(&mut self, name: &str, path: &Path) -> Result<()> {
        let bytes = std::fs::read(path)?;
        if bytes.len() % ELEMENT_BYTES != 0 {
            return Err(Error::InvalidArgument(format!(
                "{}: size {} is not a multiple of {ELEMENT_BYTES} bytes",
                path.display(),
                bytes.len()
            )));
        }
        let elements = bytes
            .chunks_exact(ELEMENT_BYTES)
            .map(|chunk| i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect::<Vec<_>>();
        info!(
            "loaded {} elements for {name} from {}",
            elements.len(),
            path.display()
        );
        self.add_stream(name, elements);
        Ok(())
    }

    fn capture_mut(&mut self, name: &str) -> Result<&mut Capture> {
        self.captures
            .get_mut(name)
            .ok_or_else(|| Error::Driver(format!("unknown stream {name}")))
    }
}

impl StreamDriver for ReplayDriver {
    fn fetch_int32(
        &mut self,
        stream: &str,
        requested: usize,
        buffer: &mut [i32],
    ) -> Result<FetchReport> {
        let burst = self.burst;
        let first_valid = self.first_valid;
        let capture = self.capture_mut(stream)?;
        capture.arrived = capture.arrived.saturating_add(burst);

        let available = capture.available();
        if requested > available {
            return Ok(FetchReport {
                actual: 0,
                remaining: available,
                first_valid: 0,
            });
        }
        if requested > buffer.len() {
            return Err(Error::BufferTooSmall {
                requested,
                capacity: buffer.len(),
            });
        }

        let first_valid = first_valid.min(buffer.len() - requested);
        let start = capture.position;
        buffer[first_valid..first_valid + requested]
            .copy_from_slice(&capture.elements[start..start + requested]);
        capture.position += requested;

        Ok(FetchReport {
            actual: requested,
            remaining: available - requested,
            first_valid,
        })
    }

    fn end_of_stream(&self, stream: &str) -> bool {
        self.captures
            .get(stream)
            .map_or(true, |capture| capture.position >= capture.elements.len())
    }
}
