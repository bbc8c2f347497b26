use crate::event::{
    unpack_averaged_records, unpack_gates, unpack_normal_records, RecordEvent, Waveform,
};
use crate::fetch::{fetch_available, fetch_exact, FetchPolicy, StreamDriver};
use crate::gate::ProcessingParameters;
use crate::marker::{MarkerTag, TriggerMarker};
use crate::record::stored_sample_count_for_records;
use crate::writer::RecordWriter;
use crate::{Conf, Counter, Error, MarkerStreamDecoder, Mode, TriggerKind};
use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{tick, unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, info};
use std::io::Write;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How samples of a record are laid out in the sample stream.
#[derive(Debug, Clone, Copy)]
enum Layout {
    Packed { record_elements: usize },
    Averaged { record_elements: usize },
    ZeroSuppressed(ProcessingParameters),
}

/// Totals of a finished session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSummary {
    pub records: u64,
    pub marker_bytes: usize,
    pub sample_bytes: usize,
    pub elapsed: Duration,
}

impl SessionSummary {
    /// Average data rate in MB/s.
    pub fn data_rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64().max(1e-6);
        ((self.marker_bytes + self.sample_bytes) as f64 / secs) / (1024.0 * 1024.0)
    }
}

/// Streaming readout of one acquisition: fetch markers, decode records,
/// fetch their samples and hand them over to a consumer.
pub struct StreamingSession<D: StreamDriver> {
    driver: D,
    config: Conf,
    layout: Layout,
    decoder: MarkerStreamDecoder,
    timing: Timing,
    validator: RecordValidator,
    fetch_policy: FetchPolicy,
    marker_elements_to_fetch: usize,
    marker_buffer: Vec<i32>,
    sample_buffer: Vec<i32>,
    pub marker_counter: Counter,
    pub sample_counter: Counter,
}

impl<D: StreamDriver> StreamingSession<D> {
    pub fn new(driver: D, config: Conf) -> Result<Self> {
        let mode = config.acquisition.mode;
        let record_elements = config.record_elements();
        let layout = match (mode, config.trigger_kind()) {
            (Mode::Normal, TriggerKind::Normal) => Layout::Packed { record_elements },
            (Mode::Normal, TriggerKind::Averager) => Layout::Averaged { record_elements },
            (Mode::ZeroSuppress, _) => Layout::ZeroSuppressed(config.processing_parameters()?),
        };
        let timestamp_period = match layout {
            Layout::ZeroSuppressed(params) => params.timestamp_period,
            Layout::Packed { .. } | Layout::Averaged { .. } => config.timestamp_period()?,
        };
        let marker_elements_to_fetch = config.marker_elements_to_fetch()?;

        Ok(Self {
            layout,
            decoder: MarkerStreamDecoder::new(mode),
            timing: Timing {
                timestamp_period,
                sample_interval: config.sample_interval(),
                trigger_delay: config.acquisition.trigger_delay,
            },
            validator: RecordValidator::new(config.expected_trigger_tag(), mode == Mode::Normal),
            fetch_policy: config.fetch_policy(),
            marker_elements_to_fetch,
            marker_buffer: vec![0; config.marker_buffer_size()?],
            sample_buffer: vec![0; config.sample_buffer_size()],
            marker_counter: Counter::new(),
            sample_counter: Counter::new(),
            driver,
            config,
        })
    }

    pub fn processing_parameters(&self) -> Option<&ProcessingParameters> {
        match &self.layout {
            Layout::ZeroSuppressed(params) => Some(params),
            Layout::Packed { .. } | Layout::Averaged { .. } => None,
        }
    }

    /// Run until the configured duration elapses or the marker stream ends.
    pub fn run(&mut self, tx: &Sender<RecordEvent>) -> Result<SessionSummary> {
        let ticker = tick(Duration::from_secs(1));
        let run_duration = self.config.run_duration();
        let t_begin = Instant::now();
        self.marker_counter.reset();
        self.sample_counter.reset();

        while t_begin.elapsed() < run_duration {
            if !self.wait_for_records(t_begin, run_duration)? {
                break;
            }
            self.process_records(tx)?;

            if ticker.try_recv().is_ok() {
                info!(
                    "{} records, markers {:.2} MB/s, samples {:.2} MB/s",
                    self.validator.records_checked(),
                    self.marker_counter.rate(),
                    self.sample_counter.rate()
                );
            }
        }

        let summary = SessionSummary {
            records: self.validator.records_checked(),
            marker_bytes: self.marker_counter.total_bytes(),
            sample_bytes: self.sample_counter.total_bytes(),
            elapsed: t_begin.elapsed(),
        };
        info!("Total sample data read: {} bytes", summary.sample_bytes);
        info!("Total marker data read: {} bytes", summary.marker_bytes);
        info!(
            "{} records in {:.1} s, data rate {:.2} MB/s",
            summary.records,
            summary.elapsed.as_secs_f64(),
            summary.data_rate()
        );
        for (stream, counter) in [
            (&self.config.readout.marker_stream, &self.marker_counter),
            (&self.config.readout.sample_stream, &self.sample_counter),
        ] {
            info!(
                "{stream}: {} fetches, average {:.2} MB/s",
                counter.n_fetches,
                counter.average_rate()
            );
        }
        Ok(summary)
    }

    /// Fetch and decode markers until at least one record is complete.
    ///
    /// Returns false when the run is over before that happens.
    fn wait_for_records(&mut self, t_begin: Instant, run_duration: Duration) -> Result<bool> {
        let stream_name = &self.config.readout.marker_stream;

        while self.decoder.available_count() == 0 {
            if t_begin.elapsed() >= run_duration {
                return Ok(false);
            }

            let fetched = fetch_available(
                &mut self.driver,
                stream_name,
                self.marker_elements_to_fetch,
                &mut self.marker_buffer,
            )?;
            self.marker_counter.increment(fetched.segment.size());

            let mut markers = fetched.segment;
            if markers.is_empty() {
                if self.driver.end_of_stream(stream_name) {
                    info!("end of {stream_name} reached");
                    return Ok(false);
                }
                debug!("waiting for data");
                thread::sleep(self.config.data_wait());
                continue;
            }

            while !markers.is_empty() {
                self.decoder.decode_next(&mut markers)?;
            }
        }
        Ok(true)
    }

    /// Take the decoded records, fetch their samples and send them out.
    fn process_records(&mut self, tx: &Sender<RecordEvent>) -> Result<()> {
        let count = self
            .config
            .readout
            .max_records_at_once
            .min(self.decoder.available_count());
        let records = self.decoder.take(count)?;

        let sample_elements = match &self.layout {
            Layout::Packed { record_elements } | Layout::Averaged { record_elements } => {
                count * record_elements
            }
            Layout::ZeroSuppressed(params) => {
                let stored = stored_sample_count_for_records(&records, params)?;
                usize::try_from(stored).context("negative stored sample count")?
            }
        };

        let fetched = fetch_exact(
            &mut self.driver,
            &self.config.readout.sample_stream,
            sample_elements,
            &mut self.sample_buffer,
            &self.fetch_policy,
        )?;
        self.sample_counter.increment(fetched.segment.size());
        let mut samples = fetched.segment;

        match self.layout {
            Layout::Packed { record_elements } => {
                let waveforms = unpack_normal_records(samples.as_slice(), count, record_elements)?;
                for (record, waveform) in records.iter().zip(waveforms.outer_iter()) {
                    let trigger = record.trigger_marker();
                    self.validator.check(trigger, self.timing.timestamp_period)?;
                    let event = self
                        .timing
                        .record_event(trigger, Waveform::Samples(waveform.to_owned()));
                    send(tx, event)?;
                }
            }
            Layout::Averaged { record_elements } => {
                let averages = unpack_averaged_records(samples.as_slice(), count, record_elements)?;
                for (record, averages) in records.iter().zip(averages.outer_iter()) {
                    let trigger = record.trigger_marker();
                    self.validator.check(trigger, self.timing.timestamp_period)?;
                    let event = self
                        .timing
                        .record_event(trigger, Waveform::Averages(averages.to_owned()));
                    send(tx, event)?;
                }
            }
            Layout::ZeroSuppressed(params) => {
                let record_size = self.config.acquisition.record_size as i64;
                for record in &records {
                    let trigger = record.trigger_marker();
                    self.validator.check(trigger, self.timing.timestamp_period)?;
                    let unpacked = unpack_gates(record, samples.as_slice(), &params, record_size)?;
                    let event = self.timing.record_event(trigger, Waveform::Gates(unpacked));
                    samples.pop_front(record.stored_sample_count(&params)? as usize)?;
                    send(tx, event)?;
                }
            }
        }
        Ok(())
    }
}

/// Time base of the records.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Timing {
    timestamp_period: f64,
    sample_interval: f64,
    trigger_delay: f64,
}

impl Timing {
    fn record_event(&self, trigger: &TriggerMarker, waveform: Waveform) -> RecordEvent {
        RecordEvent {
            record_index: trigger.record_index,
            tag: trigger.tag,
            initial_x_time: trigger.initial_x_time(self.timestamp_period),
            trigger_time: trigger.trigger_time(
                self.timestamp_period,
                self.sample_interval,
                self.trigger_delay,
            ),
            waveform,
        }
    }
}

/// Consistency checks of the records read during a session.
///
/// Records must carry the expected tag and consecutive indices. When
/// `check_time` is set, the time of their first sample must also increase,
/// starting from a strictly positive time.
#[derive(Debug, Clone)]
pub struct RecordValidator {
    expected_tag: MarkerTag,
    check_time: bool,
    next_record_index: u64,
    min_x_time: f64,
}

impl RecordValidator {
    pub fn new(expected_tag: MarkerTag, check_time: bool) -> Self {
        Self {
            expected_tag,
            check_time,
            next_record_index: 0,
            min_x_time: 0.0,
        }
    }

    /// Number of records accepted so far.
    pub fn records_checked(&self) -> u64 {
        self.next_record_index
    }

    pub fn check(&mut self, trigger: &TriggerMarker, timestamp_period: f64) -> Result<(), Error> {
        if trigger.tag != self.expected_tag {
            return Err(Error::UnexpectedTriggerTag {
                expected: self.expected_tag as u8,
                found: trigger.tag as u8,
            });
        }

        let expected = self.next_record_index & u64::from(TriggerMarker::RECORD_INDEX_MASK);
        if expected != u64::from(trigger.record_index) {
            return Err(Error::UnexpectedRecordIndex {
                expected: self.next_record_index,
                found: trigger.record_index,
            });
        }

        if self.check_time {
            let x_time = trigger.initial_x_time(timestamp_period);
            if x_time <= self.min_x_time {
                return Err(Error::NonIncreasingTime {
                    previous: self.min_x_time,
                    current: x_time,
                });
            }
            self.min_x_time = x_time;
        }

        self.next_record_index += 1;
        Ok(())
    }
}

fn send(tx: &Sender<RecordEvent>, event: RecordEvent) -> Result<()> {
    tx.send(event)
        .map_err(|_| anyhow!("record writer thread has stopped"))
}

/// Write every record received on `rx` until all senders are gone.
pub fn record_writing<W: Write>(
    rx: Receiver<RecordEvent>,
    mut writer: RecordWriter<W>,
) -> Result<usize> {
    loop {
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => writer.append_record(&event)?,
            Err(RecvTimeoutError::Timeout) => writer.flush()?,
            Err(RecvTimeoutError::Disconnected) => {
                writer.flush()?;
                break;
            }
        }
    }
    Ok(writer.records_written)
}

/// Start the writer thread. Dropping the returned sender stops it.
pub fn spawn_writer<W: Write + Send + 'static>(
    writer: RecordWriter<W>,
) -> (Sender<RecordEvent>, JoinHandle<Result<usize>>) {
    let (tx, rx) = unbounded();
    let handle = thread::spawn(move || record_writing(rx, writer));
    (tx, handle)
}
