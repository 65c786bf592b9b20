//! Async CWB/Edge archive client.
//!
//! Query a continuous waveform archive for a time window and channel
//! selector, and receive the miniSEED reply grouped into per-channel
//! batches.

mod batch;
mod client;
mod connection;
pub mod error;
mod list;
#[cfg(test)]
mod mock;
mod retry;
mod state;
mod stream;

pub use batch::ChannelBatch;
pub use client::CwbDataClient;
pub use error::{ClientError, Result};
pub use list::list_channels;
pub use retry::RetryPolicy;
pub use state::{ClientConfig, ClientState, StreamEnd};
pub use stream::batch_stream;
