use chrono::{DateTime, Utc};
use cwbquery_rs_protocol::QueryCommand;
use tracing::{debug, info};

use crate::connection::Connection;
use crate::error::Result;
use crate::state::ClientConfig;

/// List the channels that have data in a time window.
///
/// One-shot: connects once (no retry), sends the list query and returns
/// everything the server writes before closing, decoded lossily as UTF-8.
pub async fn list_channels(
    addr: &str,
    begin: DateTime<Utc>,
    duration: f64,
    config: &ClientConfig,
) -> Result<String> {
    let cmd = QueryCommand::list_channels(begin, duration)?;

    info!(addr, %begin, duration, "listing channels");
    let mut connection = Connection::connect(addr, config.connect_timeout, config.read_timeout).await?;
    connection.send_raw(&cmd.to_bytes()).await?;
    let body = connection.read_to_end().await?;
    debug!(len = body.len(), "channel list received");

    Ok(String::from_utf8_lossy(&body).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use crate::mock::{MockConfig, MockServer};
    use chrono::TimeZone;

    fn begin() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2010, 2, 25, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn list_returns_server_text() {
        let listing = b"NZWEL  HHZ10 2010/02/25 00:00:00\nNZKHZ  HHZ10 2010/02/25 00:00:00\n";
        let server = MockServer::start(MockConfig {
            close_after_reply: true,
            ..MockConfig::single(listing.to_vec())
        })
        .await;

        let text = list_channels(&server.addr().to_string(), begin(), 86400.0, &ClientConfig::default())
            .await
            .unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.starts_with("NZWEL  HHZ10"));

        assert_eq!(
            server.received()[0],
            b"'-b' '2010/02/25 00:00:00' '-d' '86400' '-lsc'\n".to_vec()
        );
    }

    #[tokio::test]
    async fn list_rejects_bad_duration() {
        let result = list_channels("127.0.0.1:1", begin(), -5.0, &ClientConfig::default()).await;
        assert!(matches!(result, Err(ClientError::Protocol(_))));
    }
}
