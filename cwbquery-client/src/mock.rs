use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::Notify;

/// Scripted CWB query server for tests.
///
/// Every received query (a message ending in `\t` or `\n`) is answered
/// with the next entry of `replies`, shared across connections.
pub struct MockConfig {
    pub replies: Vec<Vec<u8>>,
    /// Close the socket right after writing a reply.
    pub close_after_reply: bool,
    pub max_connections: usize,
}

impl MockConfig {
    pub fn single(reply: Vec<u8>) -> Self {
        Self {
            replies: vec![reply],
            close_after_reply: false,
            max_connections: 1,
        }
    }
}

#[derive(Default)]
struct Shared {
    replies: Mutex<VecDeque<Vec<u8>>>,
    received: Mutex<Vec<Vec<u8>>>,
    connections: Mutex<usize>,
    disconnected: Notify,
}

pub struct MockServer {
    addr: SocketAddr,
    shared: Arc<Shared>,
}

impl MockServer {
    pub async fn start(config: MockConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self::serve(listener, config)
    }

    /// Start on a fixed address, e.g. one a client is already retrying.
    pub async fn start_on(addr: SocketAddr, config: MockConfig) -> Self {
        let listener = TcpListener::bind(addr).await.unwrap();
        Self::serve(listener, config)
    }

    fn serve(listener: TcpListener, config: MockConfig) -> Self {
        let addr = listener.local_addr().unwrap();
        let shared = Arc::new(Shared {
            replies: Mutex::new(config.replies.iter().cloned().collect()),
            ..Shared::default()
        });

        let task_shared = Arc::clone(&shared);
        tokio::spawn(async move {
            for _ in 0..config.max_connections {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                *task_shared.connections.lock().unwrap() += 1;
                let conn_shared = Arc::clone(&task_shared);
                let close_after_reply = config.close_after_reply;
                tokio::spawn(async move {
                    Self::handle_connection(stream, conn_shared, close_after_reply).await;
                });
            }
        });

        Self { addr, shared }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Raw messages received so far, terminators included.
    pub fn received(&self) -> Vec<Vec<u8>> {
        self.shared.received.lock().unwrap().clone()
    }

    pub fn connections(&self) -> usize {
        *self.shared.connections.lock().unwrap()
    }

    /// Wait until a client connection has been closed by the peer.
    pub async fn disconnected(&self) {
        self.shared.disconnected.notified().await;
    }

    async fn handle_connection(
        stream: tokio::net::TcpStream,
        shared: Arc<Shared>,
        close_after_reply: bool,
    ) {
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let mut message = Vec::new();

        loop {
            let byte = match reader.read_u8().await {
                Ok(b) => b,
                Err(_) => break,
            };
            message.push(byte);
            if byte != b'\t' && byte != b'\n' {
                continue;
            }

            let msg = std::mem::take(&mut message);
            let is_query = msg.len() > 1;
            shared.received.lock().unwrap().push(msg);
            if !is_query {
                // close terminator
                continue;
            }

            let reply = shared.replies.lock().unwrap().pop_front();
            if let Some(reply) = reply {
                if write_half.write_all(&reply).await.is_err() {
                    break;
                }
                let _ = write_half.flush().await;
            }
            if close_after_reply {
                let _ = write_half.shutdown().await;
                break;
            }
        }

        shared.disconnected.notify_one();
    }
}
