//! Reply chunking for the CWB query protocol.
//!
//! A data reply is a run of 512-byte chunks. Each chunk is either the start
//! of a miniSEED record or the `<EOR>` end-of-response marker.

use crate::error::{ProtocolError, Result};

/// Size of one reply chunk.
pub const CHUNK_LEN: usize = 512;

/// End-of-response marker at offset 0 of the final chunk.
pub const END_OF_RESPONSE: &[u8; 5] = b"<EOR>";

/// Written by the client before it closes the socket.
pub const CLOSE_TERMINATOR: &[u8] = b"\n";

/// A classified reply chunk borrowing the input buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Chunk<'a> {
    /// The server has finished this reply.
    EndOfResponse,
    /// First `CHUNK_LEN` bytes of a record.
    Record(&'a [u8]),
}

/// Classify exactly one chunk.
pub fn classify(data: &[u8]) -> Result<Chunk<'_>> {
    if data.len() < CHUNK_LEN {
        return Err(ProtocolError::RecordTooShort {
            expected: CHUNK_LEN,
            actual: data.len(),
        });
    }
    if is_end_of_response(data) {
        Ok(Chunk::EndOfResponse)
    } else {
        Ok(Chunk::Record(&data[..CHUNK_LEN]))
    }
}

pub fn is_end_of_response(data: &[u8]) -> bool {
    data.starts_with(END_OF_RESPONSE)
}

/// Build the 512-byte end-of-response chunk (space padded).
pub fn write_end_of_response() -> Vec<u8> {
    let mut chunk = vec![b' '; CHUNK_LEN];
    chunk[..END_OF_RESPONSE.len()].copy_from_slice(END_OF_RESPONSE);
    chunk
}
