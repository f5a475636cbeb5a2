//! Protocol and application error types.

use crate::protocol::Protocol;
use crate::ttype::TType;
use std::fmt;
use thiserror::Error;
use weft_transport::TransportError;

/// Stable protocol error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolErrorKind {
    Unknown,
    InvalidData,
    NegativeSize,
    SizeLimit,
    BadVersion,
    NotImplemented,
    DepthLimit,
}

impl ProtocolErrorKind {
    pub fn code(self) -> i32 {
        match self {
            ProtocolErrorKind::Unknown => 0,
            ProtocolErrorKind::InvalidData => 1,
            ProtocolErrorKind::NegativeSize => 2,
            ProtocolErrorKind::SizeLimit => 3,
            ProtocolErrorKind::BadVersion => 4,
            ProtocolErrorKind::NotImplemented => 5,
            ProtocolErrorKind::DepthLimit => 6,
        }
    }
}

impl fmt::Display for ProtocolErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolErrorKind::Unknown => write!(f, "unknown"),
            ProtocolErrorKind::InvalidData => write!(f, "invalid data"),
            ProtocolErrorKind::NegativeSize => write!(f, "negative size"),
            ProtocolErrorKind::SizeLimit => write!(f, "size limit"),
            ProtocolErrorKind::BadVersion => write!(f, "bad version"),
            ProtocolErrorKind::NotImplemented => write!(f, "not implemented"),
            ProtocolErrorKind::DepthLimit => write!(f, "depth limit"),
        }
    }
}

/// Malformed wire data: unknown type tag, missing syntax character, bad
/// version, negative size. Fatal to the message being read.
#[derive(Debug, Error)]
#[error("protocol error ({kind}): {message}")]
pub struct ProtocolError {
    pub kind: ProtocolErrorKind,
    pub message: String,
}

impl ProtocolError {
    pub fn new(kind: ProtocolErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Stable application error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApplicationErrorKind {
    Unknown,
    UnknownMethod,
    InvalidMessageType,
    WrongMethodName,
    BadSequenceId,
    MissingResult,
    InternalError,
    ProtocolError,
    InvalidTransform,
    InvalidProtocol,
    UnsupportedClientType,
}

impl ApplicationErrorKind {
    pub fn code(self) -> i32 {
        match self {
            ApplicationErrorKind::Unknown => 0,
            ApplicationErrorKind::UnknownMethod => 1,
            ApplicationErrorKind::InvalidMessageType => 2,
            ApplicationErrorKind::WrongMethodName => 3,
            ApplicationErrorKind::BadSequenceId => 4,
            ApplicationErrorKind::MissingResult => 5,
            ApplicationErrorKind::InternalError => 6,
            ApplicationErrorKind::ProtocolError => 7,
            ApplicationErrorKind::InvalidTransform => 8,
            ApplicationErrorKind::InvalidProtocol => 9,
            ApplicationErrorKind::UnsupportedClientType => 10,
        }
    }

    /// Decodes a wire code, mapping anything unrecognized to `Unknown`.
    pub fn from_code(code: i32) -> ApplicationErrorKind {
        match code {
            1 => ApplicationErrorKind::UnknownMethod,
            2 => ApplicationErrorKind::InvalidMessageType,
            3 => ApplicationErrorKind::WrongMethodName,
            4 => ApplicationErrorKind::BadSequenceId,
            5 => ApplicationErrorKind::MissingResult,
            6 => ApplicationErrorKind::InternalError,
            7 => ApplicationErrorKind::ProtocolError,
            8 => ApplicationErrorKind::InvalidTransform,
            9 => ApplicationErrorKind::InvalidProtocol,
            10 => ApplicationErrorKind::UnsupportedClientType,
            _ => ApplicationErrorKind::Unknown,
        }
    }
}

impl fmt::Display for ApplicationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplicationErrorKind::Unknown => write!(f, "unknown application error"),
            ApplicationErrorKind::UnknownMethod => write!(f, "unknown method"),
            ApplicationErrorKind::InvalidMessageType => write!(f, "invalid message type"),
            ApplicationErrorKind::WrongMethodName => write!(f, "wrong method name"),
            ApplicationErrorKind::BadSequenceId => write!(f, "bad sequence id"),
            ApplicationErrorKind::MissingResult => write!(f, "missing result"),
            ApplicationErrorKind::InternalError => write!(f, "internal error"),
            ApplicationErrorKind::ProtocolError => write!(f, "protocol error"),
            ApplicationErrorKind::InvalidTransform => write!(f, "invalid transform"),
            ApplicationErrorKind::InvalidProtocol => write!(f, "invalid protocol"),
            ApplicationErrorKind::UnsupportedClientType => write!(f, "unsupported client type"),
        }
    }
}

/// A semantic error raised by the service or the runtime itself.
///
/// Unlike the other families this one has a wire representation: it is a
/// struct with field 1 `message` (string) and field 2 `type` (i32),
/// serialized into the body of an `EXCEPTION` reply. The connection stays
/// usable after one is exchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("application error ({kind}): {message}")]
pub struct ApplicationError {
    pub kind: ApplicationErrorKind,
    pub message: String,
}

impl ApplicationError {
    pub fn new(kind: ApplicationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Serializes this error as its Thrift struct form.
    pub fn write_to(&self, protocol: &mut dyn Protocol) -> Result<(), Error> {
        protocol.write_struct_begin("TApplicationException")?;
        if !self.message.is_empty() {
            protocol.write_field_begin("message", TType::String, 1)?;
            protocol.write_string(&self.message)?;
            protocol.write_field_end()?;
        }
        protocol.write_field_begin("type", TType::I32, 2)?;
        protocol.write_i32(self.kind.code())?;
        protocol.write_field_end()?;
        protocol.write_field_stop()?;
        protocol.write_struct_end()?;
        Ok(())
    }

    /// Reads the Thrift struct form, skipping unknown fields.
    pub fn read_from(protocol: &mut dyn Protocol) -> Result<ApplicationError, Error> {
        let mut kind = ApplicationErrorKind::Unknown;
        let mut message = String::new();

        protocol.read_struct_begin()?;
        loop {
            let field = protocol.read_field_begin()?;
            if field.field_type == TType::Stop {
                break;
            }
            match (field.id, field.field_type) {
                (1, TType::String) => message = protocol.read_string()?,
                (2, TType::I32) => kind = ApplicationErrorKind::from_code(protocol.read_i32()?),
                (_, ftype) => protocol.skip(ftype)?,
            }
            protocol.read_field_end()?;
        }
        protocol.read_struct_end()?;

        Ok(ApplicationError { kind, message })
    }
}

/// Any failure the runtime can surface, split into the three disjoint
/// families of the wire contract.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Application(#[from] ApplicationError),
}
