//! In-memory transport.

use crate::config::TransportConfig;
use crate::error::{TransportError, TransportErrorKind};
use crate::transport::Transport;
use bytes::{Bytes, BytesMut};

/// A finite byte buffer with a read cursor.
///
/// Writes append, reads consume from the front and never block. Used as the
/// bottom of test stacks and as the scratch target for encoders.
#[derive(Debug, Default)]
pub struct MemoryBuffer {
    buf: BytesMut,
    config: TransportConfig,
}

impl MemoryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: TransportConfig) -> Self {
        Self {
            buf: BytesMut::new(),
            config,
        }
    }

    /// Creates a buffer pre-seeded with readable data.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self {
            buf: BytesMut::from(data),
            config: TransportConfig::default(),
        }
    }

    /// Snapshot of the unread contents.
    pub fn bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.buf)
    }

    /// Number of unread bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Discards all contents.
    pub fn reset(&mut self) {
        self.buf.clear();
    }
}

impl Transport for MemoryBuffer {
    fn is_open(&self) -> bool {
        true
    }

    fn open(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn read(&mut self, max_len: usize) -> Result<Bytes, TransportError> {
        let n = max_len.min(self.buf.len());
        Ok(self.buf.split_to(n).freeze())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.buf.extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn config(&self) -> &TransportConfig {
        &self.config
    }

    fn check_read_budget(&self, declared: usize) -> Result<(), TransportError> {
        if declared > self.config.max_message_size {
            return Err(TransportError::new(
                TransportErrorKind::SizeLimit,
                format!(
                    "declared size {} exceeds maximum message size {}",
                    declared, self.config.max_message_size
                ),
            ));
        }
        Ok(())
    }
}
