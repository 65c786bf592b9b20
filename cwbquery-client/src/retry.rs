use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::error::{ClientError, Result};
use crate::state::ClientConfig;

/// Fixed-delay connect retry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay between failed attempts. Default: 20 seconds.
    pub delay: Duration,
    /// Maximum number of attempts. 0 = unlimited. Default: 0.
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// Retry forever without waiting. Intended for tests.
    pub fn immediate() -> Self {
        Self {
            delay: Duration::ZERO,
            max_attempts: 0,
        }
    }

    fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts > 0 && attempt >= self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(20),
            max_attempts: 0,
        }
    }
}

/// Why a single connection attempt failed.
#[derive(Debug)]
pub(crate) enum ConnectFailure {
    /// Name lookup failed or returned no address.
    Unresolved(io::Error),
    /// The host actively refused the connection.
    Refused,
    /// Anything else, including connect timeouts.
    Other(ClientError),
}

/// Connect to `host:port`, retrying on every failure per `config.retry`.
///
/// With an unbounded policy this only returns once connected.
pub(crate) async fn connect_with_retry(
    host: &str,
    port: u16,
    config: &ClientConfig,
) -> Result<Connection> {
    let policy = &config.retry;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        debug!(host, port, attempt, "connecting");

        match try_connect(host, port, config).await {
            Ok(connection) => {
                if attempt > 1 {
                    info!(host, port, attempt, "connected after retry");
                }
                return Ok(connection);
            }
            Err(ConnectFailure::Unresolved(e)) => {
                warn!(host, error = %e, "cannot resolve the host");
            }
            Err(ConnectFailure::Refused) => {
                warn!(
                    host,
                    port,
                    retry_in = ?policy.delay,
                    "connection refused: either the server is down or there is a network problem"
                );
            }
            Err(ConnectFailure::Other(e)) => {
                warn!(host, port, error = %e, "error opening socket to server");
            }
        }

        if policy.exhausted(attempt) {
            warn!(host, port, attempts = attempt, "giving up");
            return Err(ClientError::ConnectFailed { attempts: attempt });
        }

        tokio::time::sleep(policy.delay).await;
    }
}

pub(crate) async fn try_connect(
    host: &str,
    port: u16,
    config: &ClientConfig,
) -> std::result::Result<Connection, ConnectFailure> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(ConnectFailure::Unresolved)?
        .collect();
    if addrs.is_empty() {
        return Err(ConnectFailure::Unresolved(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no addresses for {host}"),
        )));
    }

    match Connection::connect(&addrs[..], config.connect_timeout, config.read_timeout).await {
        Ok(connection) => Ok(connection),
        Err(ClientError::Io(e)) if e.kind() == io::ErrorKind::ConnectionRefused => {
            Err(ConnectFailure::Refused)
        }
        Err(e) => Err(ConnectFailure::Other(e)),
    }
}
