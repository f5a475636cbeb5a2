//! Wire type codes.

use crate::error::{ProtocolError, ProtocolErrorKind};
use std::fmt;

/// Tag identifying a Thrift logical type.
///
/// The numeric values are the protocol contract and appear in struct field
/// headers and container element headers on binary-framed encodings; the
/// JSON encoding uses the short textual tags instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TType {
    Stop = 0,
    Void = 1,
    Bool = 2,
    Byte = 3,
    Double = 4,
    I16 = 6,
    I32 = 8,
    I64 = 10,
    String = 11,
    Struct = 12,
    Map = 13,
    Set = 14,
    List = 15,
}

impl TType {
    /// Decodes a wire type code.
    pub fn from_code(code: u8) -> Result<TType, ProtocolError> {
        match code {
            0 => Ok(TType::Stop),
            1 => Ok(TType::Void),
            2 => Ok(TType::Bool),
            3 => Ok(TType::Byte),
            4 => Ok(TType::Double),
            6 => Ok(TType::I16),
            8 => Ok(TType::I32),
            10 => Ok(TType::I64),
            11 => Ok(TType::String),
            12 => Ok(TType::Struct),
            13 => Ok(TType::Map),
            14 => Ok(TType::Set),
            15 => Ok(TType::List),
            _ => Err(ProtocolError::new(
                ProtocolErrorKind::InvalidData,
                format!("invalid type code {}", code),
            )),
        }
    }

    /// The short tag used by the JSON encoding.
    pub fn json_tag(self) -> Result<&'static str, ProtocolError> {
        match self {
            TType::Bool => Ok("tf"),
            TType::Byte => Ok("i8"),
            TType::I16 => Ok("i16"),
            TType::I32 => Ok("i32"),
            TType::I64 => Ok("i64"),
            TType::Double => Ok("dbl"),
            TType::String => Ok("str"),
            TType::Struct => Ok("rec"),
            TType::Map => Ok("map"),
            TType::Set => Ok("set"),
            TType::List => Ok("lst"),
            TType::Stop | TType::Void => Err(ProtocolError::new(
                ProtocolErrorKind::InvalidData,
                format!("type {} has no JSON tag", self),
            )),
        }
    }

    /// Recovers a type from its JSON tag. Dispatches on the first character,
    /// disambiguating on the second where needed (`i8`/`i16`/`i32`/`i64`,
    /// `st` vs `se`).
    pub fn from_json_tag(tag: &str) -> Result<TType, ProtocolError> {
        let mut chars = tag.chars();
        let invalid = || {
            ProtocolError::new(
                ProtocolErrorKind::InvalidData,
                format!("unrecognized type tag {:?}", tag),
            )
        };
        match (chars.next(), chars.next()) {
            (Some('t'), _) => Ok(TType::Bool),
            (Some('i'), Some('8')) => Ok(TType::Byte),
            (Some('i'), Some('1')) => Ok(TType::I16),
            (Some('i'), Some('3')) => Ok(TType::I32),
            (Some('i'), Some('6')) => Ok(TType::I64),
            (Some('d'), _) => Ok(TType::Double),
            (Some('s'), Some('t')) => Ok(TType::String),
            (Some('s'), Some('e')) => Ok(TType::Set),
            (Some('r'), _) => Ok(TType::Struct),
            (Some('m'), _) => Ok(TType::Map),
            (Some('l'), _) => Ok(TType::List),
            _ => Err(invalid()),
        }
    }

    /// Whether this type is a container (`map`, `set`, `list`).
    pub fn is_container(self) -> bool {
        matches!(self, TType::Map | TType::Set | TType::List)
    }
}

impl fmt::Display for TType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TType::Stop => "STOP",
            TType::Void => "VOID",
            TType::Bool => "BOOL",
            TType::Byte => "BYTE",
            TType::Double => "DOUBLE",
            TType::I16 => "I16",
            TType::I32 => "I32",
            TType::I64 => "I64",
            TType::String => "STRING",
            TType::Struct => "STRUCT",
            TType::Map => "MAP",
            TType::Set => "SET",
            TType::List => "LIST",
        };
        write!(f, "{}", name)
    }
}

/// Message envelope kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    Call = 1,
    Reply = 2,
    Exception = 3,
    Oneway = 4,
}

impl MessageKind {
    pub fn from_code(code: i32) -> Result<MessageKind, ProtocolError> {
        match code {
            1 => Ok(MessageKind::Call),
            2 => Ok(MessageKind::Reply),
            3 => Ok(MessageKind::Exception),
            4 => Ok(MessageKind::Oneway),
            _ => Err(ProtocolError::new(
                ProtocolErrorKind::InvalidData,
                format!("invalid message type {}", code),
            )),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::Call => "CALL",
            MessageKind::Reply => "REPLY",
            MessageKind::Exception => "EXCEPTION",
            MessageKind::Oneway => "ONEWAY",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_codes_are_stable() {
        assert_eq!(TType::Stop as u8, 0);
        assert_eq!(TType::Void as u8, 1);
        assert_eq!(TType::Bool as u8, 2);
        assert_eq!(TType::Byte as u8, 3);
        assert_eq!(TType::Double as u8, 4);
        assert_eq!(TType::I16 as u8, 6);
        assert_eq!(TType::I32 as u8, 8);
        assert_eq!(TType::I64 as u8, 10);
        assert_eq!(TType::String as u8, 11);
        assert_eq!(TType::Struct as u8, 12);
        assert_eq!(TType::Map as u8, 13);
        assert_eq!(TType::Set as u8, 14);
        assert_eq!(TType::List as u8, 15);
    }

    #[test]
    fn test_json_tag_round_trip() {
        let types = [
            TType::Bool,
            TType::Byte,
            TType::I16,
            TType::I32,
            TType::I64,
            TType::Double,
            TType::String,
            TType::Struct,
            TType::Map,
            TType::Set,
            TType::List,
        ];
        for t in types {
            let tag = t.json_tag().unwrap();
            assert_eq!(TType::from_json_tag(tag).unwrap(), t);
        }
    }

    #[test]
    fn test_str_vs_set_disambiguation() {
        assert_eq!(TType::from_json_tag("str").unwrap(), TType::String);
        assert_eq!(TType::from_json_tag("set").unwrap(), TType::Set);
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let err = TType::from_json_tag("xyz").unwrap_err();
        assert_eq!(err.kind, ProtocolErrorKind::InvalidData);
        assert!(err.message.contains("xyz"));
    }

    #[test]
    fn test_stop_has_no_tag() {
        assert!(TType::Stop.json_tag().is_err());
        assert!(TType::Void.json_tag().is_err());
    }

    #[test]
    fn test_message_kind_codes() {
        assert_eq!(MessageKind::from_code(1).unwrap(), MessageKind::Call);
        assert_eq!(MessageKind::from_code(2).unwrap(), MessageKind::Reply);
        assert_eq!(MessageKind::from_code(3).unwrap(), MessageKind::Exception);
        assert_eq!(MessageKind::from_code(4).unwrap(), MessageKind::Oneway);
        assert!(MessageKind::from_code(0).is_err());
        assert!(MessageKind::from_code(5).is_err());
    }

    #[test]
    fn test_is_container() {
        assert!(TType::Map.is_container());
        assert!(TType::Set.is_container());
        assert!(TType::List.is_container());
        assert!(!TType::String.is_container());
        assert!(!TType::Struct.is_container());
    }
}
