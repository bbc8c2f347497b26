use thiserror::Error;

/// Result alias used by the decoding core and the fetch layer.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while viewing, fetching or decoding marker and sample streams.
///
/// Every variant is fatal for the current acquisition: the stream is assumed
/// corrupted past the point of failure and nothing is retried internally.
#[derive(Debug, Error)]
pub enum Error {
    #[error("array segment exceeds array size: offset={offset}, count={count}, array size={len}")]
    SegmentOutOfRange {
        offset: usize,
        count: usize,
        len: usize,
    },

    #[error("cannot pop {requested} elements out from a segment of {available}")]
    PopOverflow { requested: usize, available: usize },

    #[error("marker needs {needed} elements but only {available} are available")]
    Truncated { needed: usize, available: usize },

    #[error("cannot decode markers from an empty stream")]
    EmptyStream,

    #[error("expected {expected} marker, got tag 0x{found:02x}")]
    UnexpectedTag { expected: &'static str, found: u8 },

    #[error(
        "block index must be strictly positive, got {index} (marker[0]=0x{element0:08x}, marker[1]=0x{element1:08x})"
    )]
    InvalidBlockIndex {
        index: i64,
        element0: u32,
        element1: u32,
    },

    #[error("gate start block index {start} exceeds stop block index {stop}")]
    BlockIndexWraparound { start: i64, stop: i64 },

    #[error("block index of record-stop {record_stop} is smaller than block index of gate-stop {gate_stop}")]
    RecordStopBeforeGateStop { record_stop: i64, gate_stop: i64 },

    #[error("expected record-stop marker")]
    NotRecordStop,

    #[error("number of record descriptors to take must be strictly positive, got {0}")]
    InvalidTakeCount(usize),

    #[error("cannot take {requested} record descriptors, only {available} are available")]
    QueueUnderflow { requested: usize, available: usize },

    #[error("cannot pop record descriptor from empty queue")]
    EmptyQueue,

    #[error("buffer of {capacity} elements is smaller than the {requested} elements to fetch")]
    BufferTooSmall { requested: usize, capacity: usize },

    #[error("number of fetched elements is different than requested: requested={requested}, fetched={fetched}")]
    FetchMismatch { requested: usize, fetched: usize },

    #[error("fetch failed to read {requested} elements when it reports {remaining} available elements")]
    FetchInconsistent { requested: usize, remaining: usize },

    #[error("failed to fetch requested data from {stream} after {attempts} attempts")]
    FetchAttemptsExhausted { stream: String, attempts: u32 },

    #[error("unexpected record index: expected={expected}, got {found}")]
    UnexpectedRecordIndex { expected: u64, found: u32 },

    #[error("unexpected trigger tag: expected 0x{expected:02x}, got 0x{found:02x}")]
    UnexpectedTriggerTag { expected: u8, found: u8 },

    #[error("initial x-time not increasing: minimum expected={previous}, got {current}")]
    NonIncreasingTime { previous: f64, current: f64 },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unsupported instrument model: {0}")]
    UnsupportedModel(String),

    #[error("driver error: {0}")]
    Driver(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
