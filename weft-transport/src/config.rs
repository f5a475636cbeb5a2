//! Transport configuration and per-message read budget.

use crate::error::{TransportError, TransportErrorKind};
use crate::{DEFAULT_MAX_FRAME_SIZE, DEFAULT_MAX_MESSAGE_SIZE};
use std::time::Duration;

/// Configuration shared by a transport stack.
///
/// Wrapping transports delegate to the configuration of the transport they
/// wrap, so one configuration governs a whole stack.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Upper bound on the cumulative bytes read per logical message.
    pub max_message_size: usize,
    /// Upper bound on a single frame payload.
    pub max_frame_size: usize,
    /// Receive timeout for socket transports.
    pub recv_timeout: Option<Duration>,
    /// Send timeout for socket transports.
    pub send_timeout: Option<Duration>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            recv_timeout: None,
            send_timeout: None,
        }
    }
}

impl TransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    pub fn with_recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = Some(timeout);
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = Some(timeout);
        self
    }

    /// Builds a timeout from separate seconds and microseconds parts, the
    /// granularity socket timeouts are configured with.
    pub fn timeout_parts(seconds: u64, microseconds: u32) -> Duration {
        Duration::new(seconds, microseconds.saturating_mul(1_000))
    }
}

/// Running countdown of the bytes a single message may still consume.
///
/// Declared sizes are checked against the remaining budget *before* the
/// corresponding buffer is allocated, so a hostile length prefix cannot
/// trigger a huge allocation.
#[derive(Debug, Clone)]
pub struct ReadBudget {
    max: usize,
    remaining: usize,
}

impl ReadBudget {
    pub fn new(max_message_size: usize) -> Self {
        Self {
            max: max_message_size,
            remaining: max_message_size,
        }
    }

    /// Resets the budget at a message boundary.
    pub fn reset(&mut self) {
        self.remaining = self.max;
    }

    /// Returns the bytes still available for the current message.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Validates a header-declared size without consuming it.
    pub fn check_declared(&self, declared: usize) -> Result<(), TransportError> {
        if declared > self.remaining {
            return Err(TransportError::new(
                TransportErrorKind::SizeLimit,
                format!(
                    "declared size {} exceeds remaining message budget {}",
                    declared, self.remaining
                ),
            ));
        }
        Ok(())
    }

    /// Consumes `n` bytes of budget, failing once the message exceeds it.
    pub fn consume(&mut self, n: usize) -> Result<(), TransportError> {
        if n > self.remaining {
            self.remaining = 0;
            return Err(TransportError::new(
                TransportErrorKind::SizeLimit,
                format!("message exceeded maximum size {}", self.max),
            ));
        }
        self.remaining -= n;
        Ok(())
    }
}
