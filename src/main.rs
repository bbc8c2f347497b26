use anyhow::{anyhow, Context, Result};
use aqmd_stream::*;
use clap::Parser;
use log::{debug, info, LevelFilter};
use simplelog::{ColorChoice, CombinedLogger, TermLogger, TerminalMode, WriteLogger};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

#[derive(Parser, Debug)]
#[command(version, about = "Read out records from captured AqMD3 marker and sample streams")]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Captured marker stream
    #[arg(long)]
    markers: PathBuf,

    /// Captured sample stream
    #[arg(long, required_unless_present = "peaks")]
    samples: Option<PathBuf>,

    /// Output directory, overrides the one in the configuration
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Elements made available per fetch call, a whole number of trigger markers
    #[arg(long, value_parser = parse_burst)]
    burst: Option<usize>,

    /// Decode the marker capture as a peak list
    #[arg(long)]
    peaks: bool,

    /// More output, repeat for even more
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Bursts must not split a marker between two fetches.
fn parse_burst(value: &str) -> std::result::Result<usize, String> {
    let elements: usize = value
        .parse()
        .map_err(|e| format!("invalid burst size {value}: {e}"))?;
    if elements == 0 || elements % TRIGGER_MARKER_ELEMENTS != 0 {
        return Err(format!(
            "burst size must be a positive multiple of {TRIGGER_MARKER_ELEMENTS} elements, got {elements}"
        ));
    }
    Ok(elements)
}

fn log_file_name(base: &str) -> String {
    let now = OffsetDateTime::now_utc();
    format!(
        "{:04}{:02}{:02}_{:02}{:02}{:02}_{base}",
        now.year(),
        u8::from(now.month()),
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}

fn init_logging(verbose: u8, log_path: &Path) -> Result<()> {
    let term_level = match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let log_file = File::create(log_path)
        .with_context(|| format!("creating log file {}", log_path.display()))?;
    CombinedLogger::init(vec![
        TermLogger::new(
            term_level,
            simplelog::Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ),
        WriteLogger::new(LevelFilter::Debug, simplelog::Config::default(), log_file),
    ])?;
    Ok(())
}

fn report_peaks(config: &Conf, markers: &Path) -> Result<()> {
    let stream = config.readout.marker_stream.as_str();
    let mut driver = ReplayDriver::new();
    driver.load_stream(stream, markers)?;

    let max = config.marker_elements_to_fetch()?;
    let mut buffer = vec![0; config.marker_buffer_size()?];
    let (mut triggers, mut pulses) = (0usize, 0usize);

    while !driver.end_of_stream(stream) {
        let fetched = fetch_available(&mut driver, stream, max, &mut buffer)?;
        let mut segment = fetched.segment;
        for marker in decode_peak_markers(&mut segment)? {
            match marker {
                PeakMarker::Trigger(trigger) => {
                    triggers += 1;
                    debug!("{trigger:?}");
                }
                PeakMarker::Pulse(pulse) => {
                    pulses += 1;
                    debug!("{pulse:?}");
                }
                PeakMarker::Alignment => {}
            }
        }
    }
    info!("{triggers} triggers, {pulses} pulses");
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = Conf::load(&args.config)
        .with_context(|| format!("loading configuration {}", args.config.display()))?;
    if let Some(dir) = &args.output_dir {
        config.output.output_dir = dir.display().to_string();
    }

    let output_dir = PathBuf::from(&config.output.output_dir);
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("creating output directory {}", output_dir.display()))?;
    init_logging(
        args.verbose,
        &output_dir.join(log_file_name(&config.output.log_file)),
    )?;

    info!(
        "{} in {:?} mode, {} samples per record",
        config.acquisition.model, config.acquisition.mode, config.acquisition.record_size
    );

    if args.peaks {
        return report_peaks(&config, &args.markers);
    }

    let samples = args
        .samples
        .as_deref()
        .ok_or_else(|| anyhow!("a sample capture is needed to read out records"))?;
    let mut driver = ReplayDriver::new();
    if let Some(burst) = args.burst {
        driver = driver.with_burst(burst);
    }
    driver.load_stream(&config.readout.marker_stream, &args.markers)?;
    driver.load_stream(&config.readout.sample_stream, samples)?;

    let mut writer = RecordWriter::create(&output_dir.join(&config.output.record_file))?;
    writer.write_header(&config)?;

    let mut session = StreamingSession::new(driver, config.clone())?;
    if let Some(params) = session.processing_parameters() {
        log_parameters(&config.acquisition.model, params);
    }

    let (tx, writer_handle) = spawn_writer(writer);
    let result = session.run(&tx);
    drop(tx);

    let written = writer_handle
        .join()
        .map_err(|_| anyhow!("record writer thread panicked"))??;
    result?;
    info!("{written} records written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bursts_hold_whole_trigger_markers() {
        assert_eq!(parse_burst("16"), Ok(16));
        assert_eq!(parse_burst("48"), Ok(48));
        assert!(parse_burst("0").is_err());
        assert!(parse_burst("10").is_err());
        assert!(parse_burst("sixteen").is_err());
    }

    #[test]
    fn burst_is_checked_on_the_command_line() {
        let args = Args::try_parse_from([
            "aqmd_stream",
            "--markers",
            "m.bin",
            "--samples",
            "s.bin",
            "--burst",
            "32",
        ])
        .unwrap();
        assert_eq!(args.burst, Some(32));

        assert!(Args::try_parse_from([
            "aqmd_stream",
            "--markers",
            "m.bin",
            "--samples",
            "s.bin",
            "--burst",
            "20",
        ])
        .is_err());
    }
}
