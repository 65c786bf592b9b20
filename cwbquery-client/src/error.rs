use std::time::Duration;

/// Errors that can occur during CWB client operations.
///
/// Failures inside an active reply never surface here; they end the reply
/// and are reported through [`StreamEnd`](crate::StreamEnd).
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// TCP or socket I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Query protocol error (bad duration, undecodable record, etc.).
    #[error("protocol error: {0}")]
    Protocol(#[from] cwbquery_rs_protocol::ProtocolError),

    /// Operation exceeded the configured timeout duration.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// A bounded [`RetryPolicy`](crate::RetryPolicy) ran out of attempts.
    #[error("connect failed after {attempts} attempts")]
    ConnectFailed {
        /// Number of connection attempts made.
        attempts: u32,
    },

    /// No open connection.
    #[error("disconnected")]
    Disconnected,
}

/// Convenience alias for `Result<T, ClientError>`.
pub type Result<T> = std::result::Result<T, ClientError>;
