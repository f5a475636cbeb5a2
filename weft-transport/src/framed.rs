//! Length-prefixed framing.

use crate::config::{ReadBudget, TransportConfig};
use crate::error::{TransportError, TransportErrorKind};
use crate::transport::{Transport, TransportFactory};
use bytes::{Bytes, BytesMut};

/// Wraps a transport with a 4-byte big-endian length prefix per logical
/// message.
///
/// Writes accumulate in memory; one `flush` emits exactly one frame. On
/// read, a whole frame is pulled in before any byte is served, so a reader
/// never observes a partial message. The write buffer is cleared *before*
/// the underlying write is attempted: a failing write leaves the transport
/// usable for the next frame.
#[derive(Debug)]
pub struct FramedTransport<T: Transport> {
    inner: T,
    read_buf: BytesMut,
    write_buf: BytesMut,
    budget: ReadBudget,
}

impl<T: Transport> FramedTransport<T> {
    pub fn new(inner: T) -> Self {
        let budget = ReadBudget::new(inner.config().max_message_size);
        Self {
            inner,
            read_buf: BytesMut::new(),
            write_buf: BytesMut::new(),
            budget,
        }
    }

    /// Prepends bytes to the read buffer, to be served by the next read.
    pub fn put_back(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let mut buf = BytesMut::with_capacity(data.len() + self.read_buf.len());
        buf.extend_from_slice(data);
        buf.extend_from_slice(&self.read_buf);
        self.read_buf = buf;
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    fn read_frame(&mut self) -> Result<(), TransportError> {
        let header = self.inner.read_all(4)?;
        let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;

        if len > self.inner.config().max_frame_size {
            return Err(TransportError::new(
                TransportErrorKind::SizeLimit,
                format!(
                    "frame size {} exceeds maximum {}",
                    len,
                    self.inner.config().max_frame_size
                ),
            ));
        }
        // A frame is one logical message; both this layer's budget and the
        // underlying transport's start fresh.
        self.budget.reset();
        self.inner.reset_read_budget();
        self.budget.check_declared(len)?;
        self.budget.consume(len)?;

        let payload = self.inner.read_all(len)?;
        self.read_buf = BytesMut::from(&payload[..]);
        Ok(())
    }
}

impl<T: Transport> Transport for FramedTransport<T> {
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
            self.read_frame()?;
        }
        let n = max_len.min(self.read_buf.len());
        Ok(self.read_buf.split_to(n).freeze())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.write_buf.extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        // Detach the frame first so a throwing write cannot corrupt the
        // next one.
        let frame = self.write_buf.split();
        if frame.len() > self.inner.config().max_frame_size {
            return Err(TransportError::new(
                TransportErrorKind::SizeLimit,
                format!(
                    "frame size {} exceeds maximum {}",
                    frame.len(),
                    self.inner.config().max_frame_size
                ),
            ));
        }
        let len = (frame.len() as u32).to_be_bytes();
        self.inner.write(&len)?;
        self.inner.write(&frame)?;
        self.inner.flush()
    }

    fn config(&self) -> &TransportConfig {
        self.inner.config()
    }

    fn check_read_budget(&self, declared: usize) -> Result<(), TransportError> {
        // A frame was read whole under the budget already; headers inside it
        // may still not declare more than the message allows.
        if declared > self.inner.config().max_message_size {
            return Err(TransportError::new(
                TransportErrorKind::SizeLimit,
                format!(
                    "declared size {} exceeds maximum message size {}",
                    declared,
                    self.inner.config().max_message_size
                ),
            ));
        }
        Ok(())
    }

    fn reset_read_budget(&mut self) {
        self.budget.reset();
        self.inner.reset_read_budget();
    }
}

/// Wraps accepted transports in [`FramedTransport`].
#[derive(Debug, Default)]
pub struct FramedTransportFactory;

impl TransportFactory for FramedTransportFactory {
    fn create(&self, inner: Box<dyn Transport>) -> Box<dyn Transport> {
        Box::new(FramedTransport::new(inner))
    }
}
