//! Transport abstraction and chunk decoding

use std::io;

use thiserror::Error;

/// Byte-level channel to a gauge.
///
/// Only these four primitives are used by the session and the capture worker.
/// There is no framing: callers poll `bytes_available` and treat zero as the
/// end of a reply.
pub trait Transport: Send {
    /// Write all bytes to the device
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Get number of bytes available to read without blocking
    fn bytes_available(&mut self) -> io::Result<usize>;

    /// Read whatever is currently pending
    fn read_available(&mut self) -> io::Result<Vec<u8>>;

    /// Release the underlying device
    fn close(&mut self) -> io::Result<()>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write(bytes)
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        (**self).bytes_available()
    }

    fn read_available(&mut self) -> io::Result<Vec<u8>> {
        (**self).read_available()
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

/// A chunk contained a byte outside 7-bit ASCII
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("non-ASCII byte {byte:#04x} at offset {offset}")]
pub struct DecodeError {
    /// The offending byte
    pub byte: u8,
    /// Its position in the chunk
    pub offset: usize,
}

/// Decode one chunk of gauge output as ASCII text.
///
/// The whole chunk is rejected on the first non-ASCII byte; callers skip it
/// and keep reading.
pub fn decode_chunk(bytes: &[u8]) -> Result<String, DecodeError> {
    match bytes.iter().position(|b| !b.is_ascii()) {
        Some(offset) => Err(DecodeError {
            byte: bytes[offset],
            offset,
        }),
        None => Ok(bytes.iter().map(|&b| b as char).collect()),
    }
}
