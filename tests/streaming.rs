use aqmd_stream::*;
use crossbeam_channel::unbounded;
use std::path::PathBuf;

fn load_conf(name: &str, toml: &str) -> Conf {
    let path: PathBuf =
        std::env::temp_dir().join(format!("aqmd_stream_{name}_{}.toml", std::process::id()));
    std::fs::write(&path, toml).unwrap();
    let conf = Conf::load(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    conf
}

fn trigger(tag: MarkerTag, record_index: u32, sample_index: u64) -> Vec<i32> {
    let marker = TriggerMarker {
        tag,
        trigger_time_samples: -0.5,
        absolute_sample_index: sample_index,
        record_index,
    };
    let mut words = vec![0; TRIGGER_MARKER_ELEMENTS];
    words[..3].copy_from_slice(&marker.to_elements());
    words
}

fn gate_marker(tag: MarkerTag, block_index: u32, payload: u8) -> Vec<i32> {
    let element0 = (tag as u32) | ((block_index & 0xff) << 24);
    let element1 = ((block_index >> 8) & 0x00ff_ffff) | (u32::from(payload) << 24);
    vec![element0 as i32, element1 as i32]
}

fn dummy_gates(count: usize) -> Vec<i32> {
    (0..count)
        .flat_map(|_| [MarkerTag::DummyGate as i32, 0])
        .collect()
}

fn run(driver: ReplayDriver, conf: Conf) -> (anyhow::Result<SessionSummary>, Vec<RecordEvent>) {
    let mut session = StreamingSession::new(driver, conf).unwrap();
    let (tx, rx) = unbounded();
    let summary = session.run(&tx);
    drop(tx);
    (summary, rx.iter().collect())
}

const NORMAL_TOML: &str = r#"
[acquisition]
model = "SA220P"
record_size = 32
sample_rate = 1.0e9

[readout]
max_records_at_once = 2
run_duration = 10
"#;

/// Three records of 16 packed elements, record `r` holding samples
/// `100 * r, 100 * r + 1, ...`.
fn normal_capture() -> (Vec<i32>, Vec<i32>) {
    let markers = (0..3)
        .flat_map(|r| trigger(MarkerTag::TriggerNormal, r, 1000 * (u64::from(r) + 1)))
        .collect();
    let samples = (0..3)
        .flat_map(|r| {
            (0..16).map(move |e| {
                let low = 100 * r + 2 * e;
                low | ((low + 1) << 16)
            })
        })
        .collect();
    (markers, samples)
}

#[test]
fn normal_mode_session_reads_every_record() {
    let conf = load_conf("normal", NORMAL_TOML);
    let (markers, samples) = normal_capture();
    let mut driver = ReplayDriver::new();
    driver.add_stream("MarkersCh1", markers);
    driver.add_stream("StreamCh1", samples);

    let (summary, events) = run(driver, conf);
    let summary = summary.unwrap();
    assert_eq!(summary.records, 3);
    assert_eq!(summary.marker_bytes, 48 * ELEMENT_BYTES);
    assert_eq!(summary.sample_bytes, 48 * ELEMENT_BYTES);

    assert_eq!(events.len(), 3);
    let indices: Vec<u32> = events.iter().map(|e| e.record_index).collect();
    assert_eq!(indices, vec![0, 1, 2]);

    let Waveform::Samples(waveform) = &events[1].waveform else {
        panic!("normal records carry plain samples");
    };
    assert_eq!(waveform.len(), 32);
    assert_eq!(waveform[0], 100);
    assert_eq!(waveform[1], 101);
    assert_eq!(waveform[31], 131);

    // 2000 timestamps of 500 ps
    assert!((events[1].initial_x_time - 1e-6).abs() < 1e-15);
    assert!(events[1].trigger_time < events[1].initial_x_time);
}

#[test]
fn slow_streams_are_waited_for() {
    let conf = load_conf("burst", NORMAL_TOML);
    let (markers, samples) = normal_capture();
    let mut driver = ReplayDriver::new().with_burst(16).with_first_valid(3);
    driver.add_stream("MarkersCh1", markers);
    driver.add_stream("StreamCh1", samples);

    let (summary, events) = run(driver, conf);
    assert_eq!(summary.unwrap().records, 3);
    let Waveform::Samples(last) = &events[2].waveform else {
        panic!("normal records carry plain samples");
    };
    assert_eq!(last[0], 200);
}

#[test]
fn record_index_gap_stops_the_session() {
    let conf = load_conf("gap", NORMAL_TOML);
    let (_, samples) = normal_capture();
    let markers = [0, 2, 3]
        .into_iter()
        .flat_map(|r| trigger(MarkerTag::TriggerNormal, r, 1000 * (u64::from(r) + 1)))
        .collect();
    let mut driver = ReplayDriver::new();
    driver.add_stream("MarkersCh1", markers);
    driver.add_stream("StreamCh1", samples);

    let (summary, events) = run(driver, conf);
    let err = summary.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::UnexpectedRecordIndex {
            expected: 1,
            found: 2
        })
    ));
    assert_eq!(events.len(), 1);
}

const AVERAGER_TOML: &str = r#"
[acquisition]
model = "SA120P"
record_size = 4
sample_rate = 1.0e9
trigger_kind = "Averager"

[readout]
max_records_at_once = 2
run_duration = 10
"#;

#[test]
fn averaged_records_keep_32_bit_samples() {
    let conf = load_conf("averager", AVERAGER_TOML);
    let markers = (0..2)
        .flat_map(|r| trigger(MarkerTag::TriggerAverager, r, 1000 * (u64::from(r) + 1)))
        .collect();
    let samples: Vec<i32> = (1..=8).map(|i| i * 100_000).collect();
    let mut driver = ReplayDriver::new();
    driver.add_stream("MarkersCh1", markers);
    driver.add_stream("StreamCh1", samples);

    let (summary, events) = run(driver, conf);
    let summary = summary.unwrap();
    assert_eq!(summary.records, 2);
    assert_eq!(summary.sample_bytes, 8 * ELEMENT_BYTES);

    let averages: Vec<Vec<i32>> = events
        .iter()
        .map(|event| match &event.waveform {
            Waveform::Averages(averages) => averages.to_vec(),
            other => panic!("averaged records carry 32-bit samples, got {other:?}"),
        })
        .collect();
    assert_eq!(
        averages,
        vec![
            vec![100_000, 200_000, 300_000, 400_000],
            vec![500_000, 600_000, 700_000, 800_000],
        ]
    );
}

const ZERO_SUPPRESS_TOML: &str = r#"
[acquisition]
model = "SA220P"
mode = "ZeroSuppress"
record_size = 64
sample_rate = 2.0e9
channel2_enabled = true

[readout]
max_records_at_once = 5
run_duration = 10
"#;

#[test]
fn zero_suppress_session_rebuilds_gates() {
    let conf = load_conf("zs", ZERO_SUPPRESS_TOML);

    // record 0: one gate over block 2, record stop in block 5
    let mut markers = trigger(MarkerTag::TriggerAverager, 0, 4096);
    markers.extend(gate_marker(MarkerTag::GateStartCst, 2, 0));
    markers.extend(gate_marker(MarkerTag::GateStopCst, 3, 16));
    markers.extend(gate_marker(MarkerTag::RecordStop, 5, 0));
    markers.extend(dummy_gates(5));
    // record 1: gate from sample 4 to sample 8 of block 1
    markers.extend(trigger(MarkerTag::TriggerAverager, 1, 8192));
    markers.extend(gate_marker(MarkerTag::GateStartCst, 1, 4));
    markers.extend(gate_marker(MarkerTag::GateStopCst, 2, 8));
    markers.extend(gate_marker(MarkerTag::RecordStop, 4, 0));
    markers.extend(dummy_gates(5));
    assert_eq!(markers.len(), 64);

    let samples: Vec<i32> = (100..116).chain(200..216).collect();
    let mut driver = ReplayDriver::new();
    driver.add_stream("MarkersCh1", markers);
    driver.add_stream("StreamCh1", samples);

    let (summary, events) = run(driver, conf);
    let summary = summary.unwrap();
    assert_eq!(summary.records, 2);
    assert_eq!(summary.sample_bytes, 32 * ELEMENT_BYTES);
    assert_eq!(events.len(), 2);

    let Waveform::Gates(first) = &events[0].waveform else {
        panic!("zero-suppressed records carry gates");
    };
    assert_eq!(first.actual_record_size, 64);
    assert_eq!(first.gates.len(), 1);
    assert_eq!(first.gates[0].start_index, 16);
    assert_eq!(first.gates[0].stop_index, 32);
    assert_eq!(first.gates[0].samples.to_vec(), (100..116).collect::<Vec<_>>());

    let Waveform::Gates(second) = &events[1].waveform else {
        panic!("zero-suppressed records carry gates");
    };
    let gate = &second.gates[0];
    assert_eq!((gate.start_index, gate.stop_index), (4, 8));
    assert_eq!(gate.samples.to_vec(), vec![204, 205, 206, 207]);
}

#[test]
fn written_records_follow_the_session() {
    let conf = load_conf("writer", NORMAL_TOML);
    let (markers, samples) = normal_capture();
    let mut driver = ReplayDriver::new();
    driver.add_stream("MarkersCh1", markers);
    driver.add_stream("StreamCh1", samples);

    let mut writer = RecordWriter::new(Vec::new());
    writer.write_header(&conf).unwrap();

    let mut session = StreamingSession::new(driver, conf).unwrap();
    let (tx, rx) = unbounded();
    session.run(&tx).unwrap();
    drop(tx);

    assert_eq!(record_writing(rx, writer).unwrap(), 3);
}
