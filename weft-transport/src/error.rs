//! Transport error types.

use std::fmt;
use std::io;
use thiserror::Error;

/// Stable transport error codes.
///
/// These codes are part of the protocol contract shared with peers in other
/// languages and must remain stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    Unknown,
    NotOpen,
    AlreadyOpen,
    TimedOut,
    EndOfFile,
    NegativeSize,
    SizeLimit,
    InvalidClientType,
    CorruptedData,
}

impl TransportErrorKind {
    /// Returns the numeric code used on the wire and in logs.
    pub fn code(self) -> i32 {
        match self {
            TransportErrorKind::Unknown => 0,
            TransportErrorKind::NotOpen => 1,
            TransportErrorKind::AlreadyOpen => 2,
            TransportErrorKind::TimedOut => 3,
            TransportErrorKind::EndOfFile => 4,
            TransportErrorKind::NegativeSize => 5,
            TransportErrorKind::SizeLimit => 6,
            TransportErrorKind::InvalidClientType => 7,
            TransportErrorKind::CorruptedData => 8,
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportErrorKind::Unknown => write!(f, "unknown"),
            TransportErrorKind::NotOpen => write!(f, "not open"),
            TransportErrorKind::AlreadyOpen => write!(f, "already open"),
            TransportErrorKind::TimedOut => write!(f, "timed out"),
            TransportErrorKind::EndOfFile => write!(f, "end of file"),
            TransportErrorKind::NegativeSize => write!(f, "negative size"),
            TransportErrorKind::SizeLimit => write!(f, "size limit"),
            TransportErrorKind::InvalidClientType => write!(f, "invalid client type"),
            TransportErrorKind::CorruptedData => write!(f, "corrupted data"),
        }
    }
}

/// An I/O-layer failure: connection refused, timed out, short read, framing
/// size violation. Always fatal to the connection.
#[derive(Debug, Error)]
#[error("transport error ({kind}): {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransportErrorKind::TimedOut,
            io::ErrorKind::UnexpectedEof => TransportErrorKind::EndOfFile,
            io::ErrorKind::NotConnected => TransportErrorKind::NotOpen,
            _ => TransportErrorKind::Unknown,
        };
        TransportError::new(kind, err.to_string())
    }
}
