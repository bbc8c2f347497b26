//! Fetching stream elements from the instrument driver.

use crate::{ArraySegment, Error, Result};
use log::{debug, warn};
use std::time::Duration;

/// What the driver reports after a fetch call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FetchReport {
    /// Number of elements delivered into the caller buffer.
    pub actual: usize,
    /// Number of elements still available in the stream after the call.
    pub remaining: usize,
    /// Offset of the first delivered element in the caller buffer.
    pub first_valid: usize,
}

/// Access to the data streams of an acquisition.
///
/// A request for more elements than the stream holds delivers nothing and
/// reports the number of elements actually available in `remaining`.
pub trait StreamDriver {
    fn fetch_int32(
        &mut self,
        stream: &str,
        requested: usize,
        buffer: &mut [i32],
    ) -> Result<FetchReport>;

    /// True when `stream` will never deliver any more data.
    fn end_of_stream(&self, _stream: &str) -> bool {
        false
    }
}

impl<D: StreamDriver + ?Sized> StreamDriver for &mut D {
    fn fetch_int32(
        &mut self,
        stream: &str,
        requested: usize,
        buffer: &mut [i32],
    ) -> Result<FetchReport> {
        (**self).fetch_int32(stream, requested, buffer)
    }

    fn end_of_stream(&self, stream: &str) -> bool {
        (**self).end_of_stream(stream)
    }
}

/// Elements returned by a fetch, and what was left behind in the stream.
#[derive(Debug, Clone, Copy)]
pub struct Fetched<'a> {
    pub segment: ArraySegment<'a, i32>,
    pub remaining: usize,
}

/// Retry policy of [`fetch_exact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPolicy {
    pub attempts: u32,
    pub wait: Duration,
}

fn check_capacity(requested: usize, buffer: &[i32]) -> Result<()> {
    if buffer.len() < requested {
        return Err(Error::BufferTooSmall {
            requested,
            capacity: buffer.len(),
        });
    }
    Ok(())
}

fn segment(buffer: &[i32], report: FetchReport) -> Result<Fetched<'_>> {
    Ok(Fetched {
        segment: ArraySegment::new(buffer, report.first_valid, report.actual)?,
        remaining: report.remaining,
    })
}

/// Fetch whatever `stream` holds, up to `max_elements`.
///
/// The returned segment is empty when nothing is ready yet.
pub fn fetch_available<'b, D: StreamDriver + ?Sized>(
    driver: &mut D,
    stream: &str,
    max_elements: usize,
    buffer: &'b mut [i32],
) -> Result<Fetched<'b>> {
    check_capacity(max_elements, buffer)?;

    let mut report = driver.fetch_int32(stream, max_elements, buffer)?;
    if report.actual == 0 && report.remaining > 0 {
        // fewer elements available than requested
        if max_elements <= report.remaining {
            return Err(Error::FetchInconsistent {
                requested: max_elements,
                remaining: report.remaining,
            });
        }
        let available = report.remaining;
        report = driver.fetch_int32(stream, available, buffer)?;
    }

    if report.actual > 0 {
        debug!(
            "fetched {} elements from {stream}, remaining {}",
            report.actual, report.remaining
        );
    }
    segment(buffer, report)
}

/// Fetch exactly `nbr_elements` from `stream`, waiting for them if needed.
pub fn fetch_exact<'b, D: StreamDriver + ?Sized>(
    driver: &mut D,
    stream: &str,
    nbr_elements: usize,
    buffer: &'b mut [i32],
    policy: &FetchPolicy,
) -> Result<Fetched<'b>> {
    if nbr_elements == 0 {
        return Ok(Fetched {
            segment: ArraySegment::empty(buffer),
            remaining: 0,
        });
    }
    check_capacity(nbr_elements, buffer)?;

    let mut delivered = None;
    for attempt in 1..=policy.attempts {
        let report = driver.fetch_int32(stream, nbr_elements, buffer)?;

        if report.actual == nbr_elements {
            delivered = Some(report);
            break;
        }
        if report.actual == 0 && report.remaining < nbr_elements {
            warn!(
                "{stream}: {} of {nbr_elements} elements ready (attempt {attempt}/{}), waiting {:?}",
                report.remaining, policy.attempts, policy.wait
            );
            std::thread::sleep(policy.wait);
            continue;
        }
        return Err(Error::FetchMismatch {
            requested: nbr_elements,
            fetched: report.actual,
        });
    }

    let report = delivered.ok_or_else(|| Error::FetchAttemptsExhausted {
        stream: stream.to_string(),
        attempts: policy.attempts,
    })?;
    debug!(
        "fetched {} elements from {stream}, remaining {}",
        report.actual, report.remaining
    );
    segment(buffer, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Driver answering with scripted reports, filling delivered elements
    /// with their index.
    #[derive(Default)]
    struct Scripted {
        reports: VecDeque<FetchReport>,
        requests: Vec<usize>,
    }

    impl Scripted {
        fn new(reports: &[FetchReport]) -> Self {
            Self {
                reports: reports.iter().copied().collect(),
                requests: Vec::new(),
            }
        }
    }

    impl StreamDriver for Scripted {
        fn fetch_int32(
            &mut self,
            _stream: &str,
            requested: usize,
            buffer: &mut [i32],
        ) -> Result<FetchReport> {
            self.requests.push(requested);
            let report = self
                .reports
                .pop_front()
                .ok_or_else(|| Error::Driver("no more scripted reports".to_string()))?;
            for i in 0..report.actual {
                buffer[report.first_valid + i] = i as i32;
            }
            Ok(report)
        }
    }

    fn report(actual: usize, remaining: usize, first_valid: usize) -> FetchReport {
        FetchReport {
            actual,
            remaining,
            first_valid,
        }
    }

    fn quick() -> FetchPolicy {
        FetchPolicy {
            attempts: 3,
            wait: Duration::from_millis(1),
        }
    }

    #[test]
    fn available_returns_requested_volume() {
        let mut driver = Scripted::new(&[report(8, 4, 2)]);
        let mut buffer = vec![0; 16];
        let fetched = fetch_available(&mut driver, "MarkersCh1", 8, &mut buffer).unwrap();
        assert_eq!(fetched.segment.size(), 8);
        assert_eq!(fetched.segment.offset(), 2);
        assert_eq!(fetched.segment[7], 7);
        assert_eq!(fetched.remaining, 4);
        assert_eq!(driver.requests, vec![8]);
    }

    #[test]
    fn available_rerequests_what_remains() {
        let mut driver = Scripted::new(&[report(0, 5, 0), report(5, 0, 1)]);
        let mut buffer = vec![0; 16];
        let fetched = fetch_available(&mut driver, "MarkersCh1", 8, &mut buffer).unwrap();
        assert_eq!(fetched.segment.size(), 5);
        assert_eq!(driver.requests, vec![8, 5]);
    }

    #[test]
    fn available_may_be_empty() {
        let mut driver = Scripted::new(&[report(0, 0, 0)]);
        let mut buffer = vec![0; 16];
        let fetched = fetch_available(&mut driver, "MarkersCh1", 8, &mut buffer).unwrap();
        assert!(fetched.segment.is_empty());
    }

    #[test]
    fn available_detects_inconsistent_driver() {
        let mut driver = Scripted::new(&[report(0, 8, 0)]);
        let mut buffer = vec![0; 16];
        assert!(matches!(
            fetch_available(&mut driver, "MarkersCh1", 8, &mut buffer),
            Err(Error::FetchInconsistent {
                requested: 8,
                remaining: 8
            })
        ));
    }

    #[test]
    fn buffer_must_hold_the_request() {
        let mut driver = Scripted::default();
        let mut buffer = vec![0; 4];
        assert!(matches!(
            fetch_available(&mut driver, "MarkersCh1", 8, &mut buffer),
            Err(Error::BufferTooSmall {
                requested: 8,
                capacity: 4
            })
        ));
        assert!(matches!(
            fetch_exact(&mut driver, "StreamCh1", 8, &mut buffer, &quick()),
            Err(Error::BufferTooSmall { .. })
        ));
        assert!(driver.requests.is_empty());
    }

    #[test]
    fn exact_with_zero_elements_does_not_call_driver() {
        let mut driver = Scripted::default();
        let mut buffer = vec![0; 4];
        let fetched = fetch_exact(&mut driver, "StreamCh1", 0, &mut buffer, &quick()).unwrap();
        assert!(fetched.segment.is_empty());
        assert!(driver.requests.is_empty());
    }

    #[test]
    fn exact_waits_for_data() {
        let mut driver = Scripted::new(&[report(0, 3, 0), report(0, 6, 0), report(10, 0, 0)]);
        let mut buffer = vec![0; 16];
        let fetched = fetch_exact(&mut driver, "StreamCh1", 10, &mut buffer, &quick()).unwrap();
        assert_eq!(fetched.segment.size(), 10);
        assert_eq!(driver.requests, vec![10, 10, 10]);
    }

    #[test]
    fn exact_gives_up_after_attempts() {
        let mut driver = Scripted::new(&[report(0, 3, 0), report(0, 3, 0), report(0, 3, 0)]);
        let mut buffer = vec![0; 16];
        let err = fetch_exact(&mut driver, "StreamCh1", 10, &mut buffer, &quick()).unwrap_err();
        assert!(matches!(
            err,
            Error::FetchAttemptsExhausted { ref stream, attempts: 3 } if stream == "StreamCh1"
        ));
        assert_eq!(
            err.to_string(),
            "failed to fetch requested data from StreamCh1 after 3 attempts"
        );
    }

    #[test]
    fn exact_refuses_partial_delivery() {
        let mut driver = Scripted::new(&[report(4, 0, 0)]);
        let mut buffer = vec![0; 16];
        assert!(matches!(
            fetch_exact(&mut driver, "StreamCh1", 10, &mut buffer, &quick()),
            Err(Error::FetchMismatch {
                requested: 10,
                fetched: 4
            })
        ));
    }
}
