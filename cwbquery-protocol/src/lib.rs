//! CWB/Edge query protocol types, commands, and miniSEED record headers.
//!
//! This crate provides the I/O-free layer of the query protocol used by
//! the client crate: channel identities, reply chunking, record header
//! decoding and query command formatting.

pub mod chunk;
pub mod command;
pub mod error;
pub mod nscl;
pub mod record;

pub use chunk::{CHUNK_LEN, Chunk};
pub use command::QueryCommand;
pub use error::{ProtocolError, Result};
pub use nscl::Nscl;
pub use record::{Record, RecordHeader};
