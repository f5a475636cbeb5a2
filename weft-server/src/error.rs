//! Server error types.

use thiserror::Error;
use weft_transport::TransportError;

/// Failures surfaced by the accept loop itself. Per-connection failures are
/// logged and do not abort the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("runtime error: {0}")]
    Runtime(#[from] weft_protocol::Error),
}
