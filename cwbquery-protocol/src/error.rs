#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("record too short: expected {expected}, actual {actual}")]
    RecordTooShort { expected: usize, actual: usize },

    #[error("illegal channel name: {0:?}")]
    IllegalChannelName(String),

    #[error("invalid record length exponent: {0}")]
    InvalidRecordLength(u8),

    #[error("invalid start time: {0}")]
    InvalidStartTime(String),

    #[error("invalid NSCL: {0:?} (expected 12 characters NNSSSSSCCCLL)")]
    InvalidNscl(String),

    #[error("invalid duration: {0} (must be a positive number of seconds)")]
    InvalidDuration(f64),

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("miniseed error: {0}")]
    Miniseed(#[from] miniseed_rs::MseedError),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
