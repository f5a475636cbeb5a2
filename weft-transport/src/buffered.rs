//! Buffered transport.

use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::transport::{Transport, TransportFactory};
use bytes::{Bytes, BytesMut};

/// Default capacity of the read and write buffers (4 KiB).
pub const DEFAULT_BUFFER_CAPACITY: usize = 4 * 1024;

/// Wraps a transport with fixed-capacity read and write buffers.
///
/// Reads top up from the underlying transport only when the local buffer is
/// empty; writes coalesce until the buffer fills, then pass through.
#[derive(Debug)]
pub struct BufferedTransport<T: Transport> {
    inner: T,
    read_buf: BytesMut,
    write_buf: BytesMut,
    read_capacity: usize,
    write_capacity: usize,
}

impl<T: Transport> BufferedTransport<T> {
    pub fn new(inner: T) -> Self {
        Self::with_capacity(inner, DEFAULT_BUFFER_CAPACITY, DEFAULT_BUFFER_CAPACITY)
    }

    pub fn with_capacity(inner: T, read_capacity: usize, write_capacity: usize) -> Self {
        Self {
            inner,
            read_buf: BytesMut::with_capacity(read_capacity),
            write_buf: BytesMut::with_capacity(write_capacity),
            read_capacity,
            write_capacity,
        }
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl<T: Transport> Transport for BufferedTransport<T> {
    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    fn open(&mut self) -> Result<(), TransportError> {
        self.inner.open()
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.inner.close()
    }

    fn read(&mut self, max_len: usize) -> Result<Bytes, TransportError> {
        if max_len == 0 {
            return Ok(Bytes::new());
        }
        if self.read_buf.is_empty() {
            let chunk = self.inner.read(self.read_capacity)?;
            self.read_buf.extend_from_slice(&chunk);
        }
        let n = max_len.min(self.read_buf.len());
        Ok(self.read_buf.split_to(n).freeze())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.write_buf.extend_from_slice(data);
        if self.write_buf.len() >= self.write_capacity {
            let buffered = self.write_buf.split();
            self.inner.write(&buffered)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        if !self.write_buf.is_empty() {
            let buffered = self.write_buf.split();
            self.inner.write(&buffered)?;
        }
        self.inner.flush()
    }

    fn config(&self) -> &TransportConfig {
        self.inner.config()
    }

    fn check_read_budget(&self, declared: usize) -> Result<(), TransportError> {
        self.inner.check_read_budget(declared)
    }

    fn reset_read_budget(&mut self) {
        self.inner.reset_read_budget()
    }
}

/// Wraps accepted transports in [`BufferedTransport`].
#[derive(Debug, Default)]
pub struct BufferedTransportFactory;

impl TransportFactory for BufferedTransportFactory {
    fn create(&self, inner: Box<dyn Transport>) -> Box<dyn Transport> {
        Box::new(BufferedTransport::new(inner))
    }
}
