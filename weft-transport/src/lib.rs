//! # weft-transport
//!
//! Composable blocking byte transports for the weft RPC runtime.
//!
//! A [`Transport`] owns a duplex byte stream and exposes
//! `open`/`close`/`read`/`write`/`flush`. Transports compose by wrapping:
//!
//! - [`FramedTransport`] adds a 4-byte big-endian length prefix per logical
//!   message, so a reader never observes a partial message.
//! - [`BufferedTransport`] coalesces small writes and satisfies reads from a
//!   local buffer.
//! - [`SaslTransport`] runs a SASL negotiation on open and, when the
//!   mechanism negotiated integrity or confidentiality, wraps every payload.
//! - [`MemoryBuffer`] and [`Pipe`] back the stack with process-local bytes
//!   for tests and in-process plumbing.
//!
//! Every transport carries a [`TransportConfig`] with a per-message size
//! budget; declared sizes are validated against the budget before any
//! allocation happens.

pub mod buffered;
pub mod config;
pub mod error;
pub mod framed;
pub mod mem;
pub mod pipe;
pub mod pool;
pub mod sasl;
pub mod socket;
pub mod transport;

pub use buffered::{BufferedTransport, BufferedTransportFactory};
pub use config::{ReadBudget, TransportConfig};
pub use error::{TransportError, TransportErrorKind};
pub use framed::{FramedTransport, FramedTransportFactory};
pub use mem::MemoryBuffer;
pub use pipe::Pipe;
pub use pool::{FailureOracle, MemoryFailureOracle, SocketPool};
pub use sasl::{
    CredentialStore, PlainClient, PlainServer, Qop, SaslMechanism, SaslRole, SaslStatus,
    SaslTransport,
};
pub use socket::{TcpServerTransport, TcpTransport};
pub use transport::{IdentityTransportFactory, Transport, TransportFactory};

/// Default per-message size budget (16 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Default maximum size of a single frame (16 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;
