//! In-process duplex pipe.

use crate::config::TransportConfig;
use crate::error::{TransportError, TransportErrorKind};
use crate::transport::Transport;
use bytes::{Bytes, BytesMut};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

#[derive(Debug, Default)]
struct ChannelState {
    data: BytesMut,
    closed: bool,
}

/// One direction of a pipe: a shared buffer plus a wakeup for readers.
#[derive(Debug, Default)]
struct Channel {
    state: Mutex<ChannelState>,
    readable: Condvar,
}

impl Channel {
    fn push(&self, data: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TransportError::new(
                TransportErrorKind::NotOpen,
                "pipe peer is closed",
            ));
        }
        state.data.extend_from_slice(data);
        self.readable.notify_one();
        Ok(())
    }

    fn pull(&self, max_len: usize) -> Bytes {
        let mut state = self.state.lock();
        loop {
            if !state.data.is_empty() {
                let n = max_len.min(state.data.len());
                return state.data.split_to(n).freeze();
            }
            if state.closed {
                return Bytes::new();
            }
            self.readable.wait(&mut state);
        }
    }

    fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.readable.notify_all();
    }
}

/// One end of an in-process duplex pipe.
///
/// Reads block until the peer writes or closes; draining a closed pipe
/// yields end of stream. Both ends are `Send`, so a connection can be
/// driven from two threads.
#[derive(Debug)]
pub struct Pipe {
    incoming: Arc<Channel>,
    outgoing: Arc<Channel>,
    config: TransportConfig,
    open: bool,
}

impl Pipe {
    /// Creates two connected pipe ends.
    pub fn pair() -> (Pipe, Pipe) {
        Self::pair_with_config(TransportConfig::default())
    }

    pub fn pair_with_config(config: TransportConfig) -> (Pipe, Pipe) {
        let a = Arc::new(Channel::default());
        let b = Arc::new(Channel::default());
        (
            Pipe {
                incoming: a.clone(),
                outgoing: b.clone(),
                config: config.clone(),
                open: true,
            },
            Pipe {
                incoming: b,
                outgoing: a,
                config,
                open: true,
            },
        )
    }
}

impl Transport for Pipe {
    fn is_open(&self) -> bool {
        self.open
    }

    fn open(&mut self) -> Result<(), TransportError> {
        if self.open {
            Ok(())
        } else {
            Err(TransportError::new(
                TransportErrorKind::NotOpen,
                "pipe was closed",
            ))
        }
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.open = false;
        self.incoming.close();
        self.outgoing.close();
        Ok(())
    }

    fn read(&mut self, max_len: usize) -> Result<Bytes, TransportError> {
        if max_len == 0 {
            return Ok(Bytes::new());
        }
        if !self.open {
            return Err(TransportError::new(
                TransportErrorKind::NotOpen,
                "pipe is closed",
            ));
        }
        Ok(self.incoming.pull(max_len))
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::new(
                TransportErrorKind::NotOpen,
                "pipe is closed",
            ));
        }
        self.outgoing.push(data)
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

impl Drop for Pipe {
    fn drop(&mut self) {
        self.incoming.close();
        self.outgoing.close();
    }
}
