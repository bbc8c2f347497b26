//! Readout of AqMD3 digitizer data streams.
//!
//! Marker streams are decoded into record descriptors, whose samples are
//! then read from the matching sample stream and rebuilt into records.

mod acquisition;
mod config;
mod decoder;
mod digitizer_params;
mod error;
mod event;
mod fetch;
mod gate;
mod marker;
mod peak;
mod record;
mod replay;
mod segment;
mod utils;
mod writer;

pub use acquisition::{
    record_writing, spawn_writer, RecordValidator, SessionSummary, StreamingSession,
};
pub use config::{
    AcquisitionSettings, Conf, OutputSettings, ReadoutSettings, TriggerKind, ZeroSuppressSettings,
};
pub use decoder::{MarkerStreamDecoder, Mode, State};
pub use digitizer_params::{
    log_parameters, processing_parameters_for_model, timestamp_period_for_model,
};
pub use error::{Error, Result};
pub use event::{
    unpack_averaged_records, unpack_gates, unpack_normal_records, GateData, RecordEvent,
    UnpackedRecord, Waveform, PACKED_SAMPLES_PER_ELEMENT,
};
pub use fetch::{fetch_available, fetch_exact, FetchPolicy, FetchReport, Fetched, StreamDriver};
pub use gate::{
    extract_position, GateMarker, GateStartMarker, GateStopMarker, ProcessingParameters,
    RecordStopMarker, StopMarker,
};
pub use marker::{
    extract_tag, tag_byte, MarkerStream, MarkerTag, TriggerMarker, GATE_MARKER_ELEMENTS,
    TRIGGER_MARKER_ELEMENTS,
};
pub use peak::{
    decode_peak_markers, PeakMarker, PeakTrigger, Pulse, PEAK_ALIGNMENT_TAG, PEAK_MARKER_ELEMENTS,
    PEAK_PULSE_TAG, PEAK_TRIGGER_TAG,
};
pub use record::{stored_sample_count_for_records, RecordDescriptor};
pub use replay::ReplayDriver;
pub use segment::ArraySegment;
pub use utils::{
    align_up, ceil_div, expand_sign_i32, expand_sign_i64, scale_signed, Counter, ELEMENT_BYTES,
};
pub use writer::RecordWriter;
