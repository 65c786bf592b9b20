use chrono::{DateTime, Utc};
use cwbquery_rs_protocol::chunk::{self, CHUNK_LEN, Chunk};
use cwbquery_rs_protocol::record::declared_len;
use cwbquery_rs_protocol::{Nscl, QueryCommand, Record};
use futures_core::Stream;
use tracing::{debug, info, trace, warn};

use crate::batch::ChannelBatch;
use crate::connection::{Connection, Fill};
use crate::error::{ClientError, Result};
use crate::retry;
use crate::state::{ClientConfig, ClientState, StreamEnd};

/// Result of pulling one record off the wire.
enum Pulled {
    Record(Record),
    Discarded,
    End(StreamEnd),
}

/// Async client for CWB/Edge archive queries.
///
/// Sends one miniSEED query at a time and hands the reply back as
/// [`ChannelBatch`]es: each batch is the run of consecutive records for one
/// channel, ended by the first record of the next channel or by the end of
/// the reply.
///
/// # Example
///
/// ```no_run
/// # async fn example() -> cwbquery_rs_client::Result<()> {
/// use chrono::{TimeZone, Utc};
/// use cwbquery_rs_client::CwbDataClient;
///
/// let mut client = CwbDataClient::new("cwb.geonet.org.nz", 2061);
/// let begin = Utc.with_ymd_and_hms(2010, 2, 25, 4, 38, 37).unwrap();
/// client.query(begin, 60.0, "NZWEL..HHZ..").await?;
///
/// while client.has_next() {
///     let batch = client.next_batch().await;
///     if let Some(nscl) = batch.nscl() {
///         println!("{nscl}: {} records", batch.len());
///     }
/// }
/// client.close().await;
/// # Ok(())
/// # }
/// ```
pub struct CwbDataClient {
    host: String,
    port: u16,
    config: ClientConfig,
    connection: Option<Connection>,
    state: ClientState,
    pending: Vec<Record>,
    last_nscl: Option<Nscl>,
    attempted: bool,
    end: Option<StreamEnd>,
}

impl CwbDataClient {
    /// Create a client for `host:port` with default configuration.
    ///
    /// No connection is made until [`connect()`](Self::connect) or
    /// [`query()`](Self::query).
    pub fn new(host: &str, port: u16) -> Self {
        Self::with_config(host, port, ClientConfig::default())
    }

    /// Create a client with a custom [`ClientConfig`].
    pub fn with_config(host: &str, port: u16, config: ClientConfig) -> Self {
        Self {
            host: host.to_owned(),
            port,
            config,
            connection: None,
            state: ClientState::Disconnected,
            pending: Vec::new(),
            last_nscl: None,
            attempted: false,
            end: None,
        }
    }

    // -- Accessors --

    /// Returns the server host name this client connects to.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the server port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the current client state.
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Returns the configuration used for this client.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Why the current reply stopped, `None` while it is still being read.
    pub fn end_reason(&self) -> Option<StreamEnd> {
        self.end
    }

    /// Log batch summaries at debug instead of info.
    pub fn set_quiet(&mut self, quiet: bool) {
        self.config.quiet = quiet;
    }

    // -- Connection --

    /// Open the connection if none is open, retrying per
    /// [`ClientConfig::retry`].
    ///
    /// With the default unbounded policy this returns only once connected.
    pub async fn connect(&mut self) -> Result<()> {
        if self.connection.is_some() {
            return Ok(());
        }
        info!(host = %self.host, port = self.port, "connecting");
        let connection = retry::connect_with_retry(&self.host, self.port, &self.config).await?;
        self.connection = Some(connection);
        self.state = ClientState::Connected;
        Ok(())
    }

    // -- Query --

    /// Send a miniSEED query for `duration` seconds from `begin`.
    ///
    /// `selector` is passed through unvalidated. Reuses the open connection
    /// unless a previous reply was left unfinished. Resets batch state, so
    /// [`has_next()`](Self::has_next) is true afterwards.
    pub async fn query(&mut self, begin: DateTime<Utc>, duration: f64, selector: &str) -> Result<()> {
        let cmd = QueryCommand::mini_seed(begin, duration, selector)?;

        if self.state == ClientState::Streaming {
            debug!("abandoning unfinished reply");
            self.drop_connection();
        }
        self.connect().await?;

        self.pending.clear();
        self.last_nscl = None;
        self.attempted = false;
        self.end = None;

        debug!(%begin, duration, selector, "query");
        let connection = self.connection.as_mut().ok_or(ClientError::Disconnected)?;
        if let Err(e) = connection.send_raw(&cmd.to_bytes()).await {
            warn!(error = %e, "sending query failed");
            self.drop_connection();
            return Err(e);
        }

        self.state = ClientState::Streaming;
        Ok(())
    }

    /// Whether [`next_batch()`](Self::next_batch) may return more data.
    ///
    /// True after a query until the first `next_batch()` call, so a reply
    /// with no data still yields one empty batch. After that, true while
    /// records are buffered for the next batch.
    pub fn has_next(&self) -> bool {
        !self.attempted || !self.pending.is_empty()
    }

    /// Read the next channel batch.
    ///
    /// Returns an empty batch once the reply is exhausted. Network failures
    /// end the reply early instead of returning an error; see
    /// [`end_reason()`](Self::end_reason).
    pub async fn next_batch(&mut self) -> ChannelBatch {
        self.attempted = true;

        let mut records = Vec::new();
        if self.state == ClientState::Streaming {
            records = self.read_until_boundary().await;
        }
        // Last channel of the reply.
        if records.is_empty() {
            records = std::mem::take(&mut self.pending);
        }

        let batch = ChannelBatch::new(records);
        self.log_summary(&batch);
        batch
    }

    /// Consume this client and return a [`Stream`] of non-empty batches.
    ///
    /// Call [`query()`](Self::query) first. The stream ends with the reply;
    /// the connection is closed when the stream is dropped.
    pub fn into_stream(self) -> impl Stream<Item = ChannelBatch> {
        crate::stream::batch_stream(self)
    }

    /// Send the close terminator and release the socket.
    ///
    /// Never fails; a failed terminator write is only logged. Buffered
    /// records are discarded.
    pub async fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            debug!(host = %self.host, port = self.port, state = self.state.as_str(), "closing");
            connection.close().await;
        }
        self.pending.clear();
        self.attempted = true;
        self.state = ClientState::Closed;
    }

    // -- Read loop --

    /// Accumulate records until the channel changes or the reply ends.
    ///
    /// Returns the completed batch on a channel change, or an empty vec when
    /// the reply ended (pending records are then the final batch).
    async fn read_until_boundary(&mut self) -> Vec<Record> {
        loop {
            let record = match self.pull_record().await {
                Pulled::Record(record) => record,
                Pulled::Discarded => continue,
                Pulled::End(end) => {
                    self.finish(end);
                    return Vec::new();
                }
            };

            if !record.is_data() {
                trace!(
                    nscl = %record.nscl().to_dotted(),
                    quality = %record.quality(),
                    "skipping non-data record"
                );
                continue;
            }

            let nscl = record.nscl().clone();
            match &self.last_nscl {
                Some(last) if *last != nscl => {
                    let completed = std::mem::replace(&mut self.pending, vec![record]);
                    self.last_nscl = Some(nscl);
                    return completed;
                }
                _ => {
                    self.pending.push(record);
                    self.last_nscl = Some(nscl);
                }
            }
        }
    }

    /// Read one chunk, and the rest of the record if it declares more.
    ///
    /// The declared length is read before the record is validated, so an
    /// undecodable record is discarded whole and the next read starts on a
    /// record boundary.
    async fn pull_record(&mut self) -> Pulled {
        let Some(connection) = self.connection.as_mut() else {
            return Pulled::End(StreamEnd::Failed);
        };

        let mut buf = vec![0u8; CHUNK_LEN];
        match connection.read_chunk(&mut buf).await {
            Ok(Fill::Full) => {}
            Ok(Fill::Eof) => return Pulled::End(StreamEnd::Closed),
            Ok(Fill::Short(received)) => return Pulled::End(StreamEnd::Truncated { received }),
            Err(e) => {
                warn!(error = %e, "read failed, ending reply");
                return Pulled::End(StreamEnd::Failed);
            }
        }

        let declared = match chunk::classify(&buf) {
            Ok(Chunk::EndOfResponse) => return Pulled::End(StreamEnd::Sentinel),
            Ok(Chunk::Record(head)) => declared_len(head),
            Err(e) => Err(e),
        };
        let block_len = match declared {
            Ok(len) => len,
            Err(e) => {
                warn!(error = %e, "discarding chunk with unreadable record length");
                return Pulled::Discarded;
            }
        };

        if block_len > CHUNK_LEN {
            trace!(block_len, "reading record extension");
            buf.resize(block_len, 0);
            match connection.read_chunk(&mut buf[CHUNK_LEN..]).await {
                Ok(Fill::Full) => {}
                Ok(Fill::Eof) => {
                    return Pulled::End(StreamEnd::Truncated {
                        received: CHUNK_LEN,
                    });
                }
                Ok(Fill::Short(n)) => {
                    return Pulled::End(StreamEnd::Truncated {
                        received: CHUNK_LEN + n,
                    });
                }
                Err(e) => {
                    warn!(error = %e, "read failed in record extension, ending reply");
                    return Pulled::End(StreamEnd::Failed);
                }
            }
        }

        match Record::decode(&buf) {
            Ok(record) => Pulled::Record(record),
            Err(e) => {
                warn!(error = %e, block_len, "discarding undecodable record");
                Pulled::Discarded
            }
        }
    }

    fn finish(&mut self, end: StreamEnd) {
        match end {
            StreamEnd::Sentinel => {
                debug!("end of reply");
                self.state = ClientState::Connected;
            }
            StreamEnd::Closed => {
                warn!("server closed the connection before end of reply");
                self.drop_connection();
            }
            StreamEnd::Truncated { received } => {
                warn!(received, "truncated reply");
                self.drop_connection();
            }
            StreamEnd::Failed => self.drop_connection(),
        }
        self.end = Some(end);
    }

    fn drop_connection(&mut self) {
        self.connection = None;
        self.state = ClientState::Disconnected;
    }

    fn log_summary(&self, batch: &ChannelBatch) {
        let (Some(nscl), Some((start, end))) = (batch.nscl(), batch.time_span()) else {
            debug!("empty batch");
            return;
        };
        let records = batch.len();
        let samples = batch.num_samples();
        let nscl = nscl.to_dotted();
        if self.config.quiet {
            debug!(%nscl, records, samples, %start, %end, "batch");
        } else {
            info!(%nscl, records, samples, %start, %end, "batch");
        }
    }
}
