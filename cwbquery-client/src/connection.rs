use std::future::Future;
use std::time::Duration;

use cwbquery_rs_protocol::chunk::CLOSE_TERMINATOR;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::{debug, trace, warn};

use crate::error::{ClientError, Result};

/// Outcome of filling a buffer from the socket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fill {
    /// The whole buffer was filled.
    Full,
    /// The peer closed after this many bytes (less than the buffer).
    Short(usize),
    /// The peer closed before any byte arrived.
    Eof,
}

pub struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
    read_timeout: Option<Duration>,
}

impl Connection {
    pub async fn connect(
        addr: impl ToSocketAddrs,
        connect_timeout: Duration,
        read_timeout: Option<Duration>,
    ) -> Result<Self> {
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ClientError::Timeout(connect_timeout))?
            .map_err(ClientError::Io)?;

        stream.set_nodelay(true).ok();
        if let Ok(peer) = stream.peer_addr() {
            debug!(%peer, "TCP connected");
        }

        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
            read_timeout,
        })
    }

    pub async fn send_raw(&mut self, data: &[u8]) -> Result<()> {
        trace!(len = data.len(), "sending");
        self.writer.write_all(data).await.map_err(ClientError::Io)?;
        self.writer.flush().await.map_err(ClientError::Io)?;
        Ok(())
    }

    /// Fill `buf` completely unless the peer closes first.
    pub async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<Fill> {
        let len = buf.len();
        let reader = &mut self.reader;
        let fill = async move {
            let mut filled = 0;
            while filled < len {
                let n = reader.read(&mut buf[filled..]).await?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            Ok::<_, std::io::Error>(filled)
        };

        let filled = with_timeout(self.read_timeout, fill).await?;
        Ok(match filled {
            n if n == len => Fill::Full,
            0 => Fill::Eof,
            n => Fill::Short(n),
        })
    }

    /// Read until the peer closes.
    pub async fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let reader = &mut self.reader;
        with_timeout(self.read_timeout, reader.read_to_end(&mut out)).await?;
        Ok(out)
    }

    /// Send the close terminator, then shut the socket down.
    ///
    /// Errors are logged and swallowed; the socket is released either way.
    pub async fn close(mut self) {
        if let Err(e) = self.send_raw(CLOSE_TERMINATOR).await {
            debug!(error = %e, "close terminator not sent");
        }
        if let Err(e) = self.writer.shutdown().await {
            warn!(error = %e, "socket shutdown failed");
        }
    }
}

async fn with_timeout<T>(
    limit: Option<Duration>,
    fut: impl Future<Output = std::io::Result<T>>,
) -> Result<T> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| {
                warn!(timeout = ?limit, "read timeout");
                ClientError::Timeout(limit)
            })?
            .map_err(ClientError::Io),
        None => fut.await.map_err(ClientError::Io),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    async fn setup_pair(read_timeout: Option<Duration>) -> (Connection, OwnedWriteHalf, OwnedReadHalf) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (conn, server_accept) = tokio::join!(
            async {
                Connection::connect(addr, Duration::from_secs(5), read_timeout)
                    .await
                    .unwrap()
            },
            async { listener.accept().await.unwrap() }
        );

        let (server_read, server_write) = server_accept.0.into_split();
        (conn, server_write, server_read)
    }

    #[tokio::test]
    async fn read_full_chunk() {
        let (mut conn, mut server_write, _server_read) = setup_pair(None).await;

        server_write.write_all(&[0x42; 512]).await.unwrap();
        server_write.flush().await.unwrap();

        let mut buf = [0u8; 512];
        assert_eq!(conn.read_chunk(&mut buf).await.unwrap(), Fill::Full);
        assert_eq!(buf, [0x42; 512]);
    }

    #[tokio::test]
    async fn read_chunk_across_writes() {
        let (mut conn, mut server_write, _server_read) = setup_pair(None).await;

        let server_task = tokio::spawn(async move {
            server_write.write_all(&[1u8; 200]).await.unwrap();
            server_write.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
            server_write.write_all(&[2u8; 312]).await.unwrap();
            server_write.flush().await.unwrap();
        });

        let mut buf = [0u8; 512];
        assert_eq!(conn.read_chunk(&mut buf).await.unwrap(), Fill::Full);
        assert_eq!(buf[199], 1);
        assert_eq!(buf[200], 2);

        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn read_short_chunk() {
        let (mut conn, mut server_write, server_read) = setup_pair(None).await;

        server_write.write_all(&[7u8; 100]).await.unwrap();
        server_write.shutdown().await.unwrap();
        drop(server_write);
        drop(server_read);

        let mut buf = [0u8; 512];
        assert_eq!(conn.read_chunk(&mut buf).await.unwrap(), Fill::Short(100));
    }

    #[tokio::test]
    async fn read_eof() {
        let (mut conn, server_write, server_read) = setup_pair(None).await;
        drop(server_write);
        drop(server_read);

        let mut buf = [0u8; 512];
        assert_eq!(conn.read_chunk(&mut buf).await.unwrap(), Fill::Eof);
    }

    #[tokio::test]
    async fn read_timeout_triggers() {
        let (mut conn, _server_write, _server_read) =
            setup_pair(Some(Duration::from_millis(50))).await;

        let mut buf = [0u8; 512];
        let result = conn.read_chunk(&mut buf).await;
        assert!(matches!(result, Err(ClientError::Timeout(_))));
    }

    #[tokio::test]
    async fn read_to_end_collects() {
        let (mut conn, mut server_write, _server_read) = setup_pair(None).await;

        server_write.write_all(b"NZWEL  HHZ10\n").await.unwrap();
        server_write.write_all(b"NZKHZ  HHZ10\n").await.unwrap();
        server_write.shutdown().await.unwrap();

        let body = conn.read_to_end().await.unwrap();
        assert_eq!(body, b"NZWEL  HHZ10\nNZKHZ  HHZ10\n");
    }

    #[tokio::test]
    async fn close_sends_terminator() {
        let (conn, _server_write, mut server_read) = setup_pair(None).await;

        conn.close().await;

        let mut buf = Vec::new();
        server_read.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"\n");
    }

    #[tokio::test]
    async fn close_after_peer_gone_does_not_panic() {
        let (conn, server_write, server_read) = setup_pair(None).await;
        drop(server_write);
        drop(server_read);
        tokio::time::sleep(Duration::from_millis(10)).await;

        conn.close().await;
    }

    #[tokio::test]
    async fn connect_timeout() {
        // Non-routable address
        let result = Connection::connect(
            "192.0.2.1:2061",
            Duration::from_millis(50),
            None,
        )
        .await;
        assert!(matches!(
            result,
            Err(ClientError::Timeout(_)) | Err(ClientError::Io(_))
        ));
    }
}
