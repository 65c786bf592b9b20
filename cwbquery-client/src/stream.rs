use futures_core::Stream;

use crate::CwbDataClient;
use crate::batch::ChannelBatch;

/// Convert a queried [`CwbDataClient`] into a [`Stream`] of batches.
///
/// Call [`query()`](CwbDataClient::query) first. Empty batches are not
/// yielded, so a reply with no data is an empty stream. The client is
/// closed politely once the reply is exhausted.
pub fn batch_stream(mut client: CwbDataClient) -> impl Stream<Item = ChannelBatch> {
    async_stream::stream! {
        while client.has_next() {
            let batch = client.next_batch().await;
            if !batch.is_empty() {
                yield batch;
            }
        }
        client.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockConfig, MockServer};
    use crate::retry::RetryPolicy;
    use crate::state::ClientConfig;
    use chrono::{DateTime, TimeZone, Utc};
    use cwbquery_rs_protocol::chunk::write_end_of_response;
    use cwbquery_rs_protocol::{Nscl, RecordHeader};
    use std::pin::pin;
    use tokio_stream::StreamExt;

    fn begin() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2010, 2, 25, 4, 38, 37).unwrap()
    }

    fn record(nscl: &str) -> Vec<u8> {
        RecordHeader::new(Nscl::from_compact(nscl).unwrap(), begin())
            .encode()
            .unwrap()
    }

    async fn queried_client(reply: Vec<u8>) -> (CwbDataClient, MockServer) {
        let server = MockServer::start(MockConfig::single(reply)).await;
        let config = ClientConfig {
            retry: RetryPolicy::immediate(),
            ..ClientConfig::default()
        };
        let mut client = CwbDataClient::with_config(&server.host(), server.port(), config);
        client.query(begin(), 60.0, "NZ").await.unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn stream_yields_batches() {
        let reply = [
            record("NZWEL  HHZ10"),
            record("NZWEL  HHZ10"),
            record("NZWEL  HHN10"),
            record("NZKHZ  HHZ10"),
            write_end_of_response(),
        ]
        .concat();
        let (client, _server) = queried_client(reply).await;

        let stream = pin!(batch_stream(client));
        let batches: Vec<_> = stream.collect().await;
        let lens: Vec<_> = batches.iter().map(ChannelBatch::len).collect();
        assert_eq!(lens, vec![2, 1, 1]);
        assert_eq!(
            batches[2].nscl().unwrap(),
            &Nscl::from_compact("NZKHZ  HHZ10").unwrap()
        );
    }

    #[tokio::test]
    async fn empty_reply_is_empty_stream() {
        let (client, _server) = queried_client(write_end_of_response()).await;

        let mut stream = pin!(client.into_stream());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn stream_closes_client() {
        let (client, server) = queried_client(write_end_of_response()).await;

        let stream = pin!(batch_stream(client));
        let _: Vec<_> = stream.collect().await;

        tokio::time::timeout(std::time::Duration::from_secs(5), server.disconnected())
            .await
            .unwrap();
        assert_eq!(server.received().last().unwrap(), &b"\n".to_vec());
    }
}
