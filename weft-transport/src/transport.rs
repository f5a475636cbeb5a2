//! The transport contract.

use crate::config::TransportConfig;
use crate::error::{TransportError, TransportErrorKind};
use bytes::{Bytes, BytesMut};

/// A duplex byte stream with explicit lifecycle.
///
/// `read` may return fewer bytes than requested; an empty result signals end
/// of stream. [`Transport::read_all`] loops until exactly the requested
/// length is available or fails with `END_OF_FILE`.
pub trait Transport: Send {
    /// Returns whether the transport is ready for I/O.
    fn is_open(&self) -> bool;

    /// Opens the underlying stream.
    fn open(&mut self) -> Result<(), TransportError>;

    /// Closes the underlying stream.
    fn close(&mut self) -> Result<(), TransportError>;

    /// Reads up to `max_len` bytes. An empty result signals end of stream;
    /// `read(0)` always returns an empty result.
    fn read(&mut self, max_len: usize) -> Result<Bytes, TransportError>;

    /// Queues or writes `data` in full.
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Pushes any buffered writes down to the underlying stream.
    fn flush(&mut self) -> Result<(), TransportError>;

    /// Configuration governing this stack.
    fn config(&self) -> &TransportConfig;

    /// Validates a header-declared size against the remaining per-message
    /// read budget, before any allocation.
    fn check_read_budget(&self, declared: usize) -> Result<(), TransportError>;

    /// Resets the per-message read budget at a message boundary. Transports
    /// without cumulative accounting ignore this.
    fn reset_read_budget(&mut self) {}

    /// Reads exactly `len` bytes or fails with `END_OF_FILE`.
    fn read_all(&mut self, len: usize) -> Result<Bytes, TransportError> {
        let mut out = BytesMut::with_capacity(len);
        while out.len() < len {
            let chunk = self.read(len - out.len())?;
            if chunk.is_empty() {
                return Err(TransportError::new(
                    TransportErrorKind::EndOfFile,
                    format!("short read: expected {} bytes, got {}", len, out.len()),
                ));
            }
            out.extend_from_slice(&chunk);
        }
        Ok(out.freeze())
    }
}

impl Transport for Box<dyn Transport> {
    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn open(&mut self) -> Result<(), TransportError> {
        (**self).open()
    }

    fn close(&mut self) -> Result<(), TransportError> {
        (**self).close()
    }

    fn read(&mut self, max_len: usize) -> Result<Bytes, TransportError> {
        (**self).read(max_len)
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        (**self).write(data)
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        (**self).flush()
    }

    fn config(&self) -> &TransportConfig {
        (**self).config()
    }

    fn check_read_budget(&self, declared: usize) -> Result<(), TransportError> {
        (**self).check_read_budget(declared)
    }

    fn reset_read_budget(&mut self) {
        (**self).reset_read_budget()
    }

    fn read_all(&mut self, len: usize) -> Result<Bytes, TransportError> {
        (**self).read_all(len)
    }
}

/// Builds a per-connection transport stack around an accepted raw transport.
pub trait TransportFactory: Send + Sync {
    fn create(&self, inner: Box<dyn Transport>) -> Box<dyn Transport>;
}

/// Factory that hands the raw transport through unchanged.
#[derive(Debug, Default)]
pub struct IdentityTransportFactory;

impl TransportFactory for IdentityTransportFactory {
    fn create(&self, inner: Box<dyn Transport>) -> Box<dyn Transport> {
        inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::MemoryBuffer;

    #[test]
    fn test_read_all_exact() {
        let mut buf = MemoryBuffer::from_bytes(b"hello world");
        let chunk = buf.read_all(5).unwrap();
        assert_eq!(&chunk[..], b"hello");
    }

    #[test]
    fn test_read_all_short_fails_eof() {
        let mut buf = MemoryBuffer::from_bytes(b"abc");
        let err = buf.read_all(4).unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::EndOfFile);
        assert!(err.message.contains("expected 4"));
        assert!(err.message.contains("got 3"));
    }

    #[test]
    fn test_read_all_zero_is_empty() {
        let mut buf = MemoryBuffer::new();
        assert!(buf.read_all(0).unwrap().is_empty());
    }

    #[test]
    fn test_identity_factory_passes_through() {
        let factory = IdentityTransportFactory;
        let mut trans = factory.create(Box::new(MemoryBuffer::from_bytes(b"xyz")));
        assert_eq!(&trans.read(3).unwrap()[..], b"xyz");
    }
}
