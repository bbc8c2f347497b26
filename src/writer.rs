use crate::event::{GateData, RecordEvent, Waveform};
use crate::Conf;
use crate::Mode;
use anyhow::{Context, Result};
use ndarray::Array1;
use std::fmt::Display;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Records with at most this many samples are written out in full.
const FULL_RECORD_SAMPLES: usize = 16;

/// Text log of the records read during a session.
pub struct RecordWriter<W: Write> {
    out: W,
    pub records_written: usize,
}

impl RecordWriter<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("creating record file {}", path.display()))?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> RecordWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            records_written: 0,
        }
    }

    pub fn write_header(&mut self, config: &Conf) -> Result<()> {
        let acq = &config.acquisition;
        writeln!(self.out, "model             : {}", acq.model)?;
        writeln!(self.out, "record size       : {}", acq.record_size)?;
        writeln!(self.out, "sample rate       : {}", acq.sample_rate)?;
        writeln!(self.out, "mode              : {:?}", acq.mode)?;
        if acq.mode == Mode::ZeroSuppress {
            writeln!(
                self.out,
                "pre-gate samples  : {}",
                config.zero_suppress.pre_gate_samples
            )?;
            writeln!(
                self.out,
                "post-gate samples : {}",
                config.zero_suppress.post_gate_samples
            )?;
        }
        writeln!(self.out)?;
        Ok(())
    }

    pub fn append_record(&mut self, record: &RecordEvent) -> Result<()> {
        writeln!(self.out, "# record index      : {}", record.record_index)?;
        writeln!(self.out, " * Time of Sample #0: {:.12e}", record.initial_x_time)?;
        writeln!(self.out, " * Time of Trigger  : {:.12e}", record.trigger_time)?;

        match &record.waveform {
            Waveform::Samples(samples) => self.write_samples(samples)?,
            Waveform::Averages(averages) => self.write_samples(averages)?,
            Waveform::Gates(unpacked) => {
                for gate in &unpacked.gates {
                    self.write_gate(gate)?;
                }
                writeln!(
                    self.out,
                    "actual record size: {}",
                    unpacked.actual_record_size
                )?;
            }
        }
        writeln!(self.out)?;

        self.records_written += 1;
        Ok(())
    }

    /// Small records in full, otherwise the first five and last two samples.
    fn write_samples<T: Display>(&mut self, samples: &Array1<T>) -> Result<()> {
        let n = samples.len();
        write!(self.out, "Samples({n}) = [ ")?;
        if n <= FULL_RECORD_SAMPLES {
            for sample in samples {
                write!(self.out, "{sample} ")?;
            }
        } else {
            for sample in samples.iter().take(5) {
                write!(self.out, "{sample} ")?;
            }
            write!(self.out, "... {} {} ", samples[n - 2], samples[n - 1])?;
        }
        writeln!(self.out, "]")?;
        Ok(())
    }

    fn write_gate(&mut self, gate: &GateData) -> Result<()> {
        let values = gate
            .samples
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(
            self.out,
            " - Gate samples=#{}..{}, pre-gate=#{}, post-gate=#{}, data samples(#{}..{})=[{}]",
            gate.start_index,
            gate.stop_index - 1,
            gate.pre_gate_samples(),
            gate.post_gate_samples(),
            gate.data_start_index,
            gate.data_stop_index - 1,
            values
        )?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush().context("flushing record file")
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
