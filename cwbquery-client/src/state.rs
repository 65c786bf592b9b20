use std::time::Duration;

use crate::retry::RetryPolicy;

/// Client connection state machine.
///
/// Transitions: `Disconnected` → `Connected` → `Streaming` → `Connected`
/// (end of reply) or `Disconnected` (connection lost), and any state →
/// `Closed` on [`close()`](crate::CwbDataClient::close).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientState {
    /// No open socket.
    Disconnected,
    /// Socket open and idle; ready for a query.
    Connected,
    /// A query was sent and its reply is being read.
    Streaming,
    /// Closed by the caller. A new query reconnects.
    Closed,
}

impl ClientState {
    /// Returns the state name as a static string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connected => "Connected",
            Self::Streaming => "Streaming",
            Self::Closed => "Closed",
        }
    }
}

/// Why the last reply stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamEnd {
    /// The server sent `<EOR>`. The connection stays open for reuse.
    Sentinel,
    /// The server closed the connection on a chunk boundary.
    Closed,
    /// The server closed the connection part way through a chunk or record.
    Truncated {
        /// Bytes of the incomplete chunk or record that did arrive.
        received: usize,
    },
    /// A read failed or timed out.
    Failed,
}

impl StreamEnd {
    /// True only for a reply terminated by `<EOR>`.
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Sentinel)
    }
}

/// Configuration for [`CwbDataClient`](crate::CwbDataClient) connections.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Timeout for a single TCP connection attempt. Default: 10 seconds.
    pub connect_timeout: Duration,
    /// Timeout for each chunk read. `None` waits as long as the server takes.
    /// A timeout ends the reply with [`StreamEnd::Failed`]. Default: `None`.
    pub read_timeout: Option<Duration>,
    /// Connect retry policy. Default: unbounded, 20 seconds apart.
    pub retry: RetryPolicy,
    /// Log per-batch summaries at debug instead of info. Default: `false`.
    pub quiet: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: None,
            retry: RetryPolicy::default(),
            quiet: false,
        }
    }
}
