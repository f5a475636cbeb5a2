//! # weft-protocol
//!
//! Typed-token wire protocols for the weft RPC runtime.
//!
//! A [`Protocol`] is a stateful cursor over a [`weft_transport::Transport`]:
//! generated serializers drive it with `write_struct_begin` /
//! `write_field_begin(name, type, id)` / one `write_*` per primitive and the
//! matching `*_end` calls, and symmetric readers. Two encodings are
//! provided:
//!
//! - [`JsonProtocol`]: the bidirectional JSON encoding, bit-compatible with
//!   peers in other languages.
//! - [`SimpleJsonProtocol`]: a write-only, human-readable JSON rendering.
//!
//! Errors come in three disjoint families ([`Error`]): transport failures,
//! malformed wire data ([`ProtocolError`]) and application-level errors
//! ([`ApplicationError`]), the last of which is itself wire-encodable and
//! travels in `EXCEPTION` replies.

pub mod error;
pub mod json;
pub mod protocol;
pub mod simple_json;
pub mod ttype;

pub use error::{
    ApplicationError, ApplicationErrorKind, Error, ProtocolError, ProtocolErrorKind,
};
pub use json::{JsonProtocol, JsonProtocolFactory, JSON_PROTOCOL_VERSION};
pub use protocol::{
    skip_binary, FieldHeader, ListHeader, MapHeader, MessageHeader, Protocol, ProtocolFactory,
    SetHeader, MAX_SKIP_DEPTH,
};
pub use simple_json::{SimpleJsonProtocol, SimpleJsonProtocolFactory};
pub use ttype::{MessageKind, TType};
