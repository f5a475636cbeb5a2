//! The typed-token protocol contract.

use crate::error::{Error, ProtocolError, ProtocolErrorKind};
use crate::ttype::{MessageKind, TType};
use weft_transport::Transport;

/// Maximum nesting depth accepted while skipping unknown values.
pub const MAX_SKIP_DEPTH: usize = 64;

/// Message envelope: `(name, kind, seqid)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    pub name: String,
    pub kind: MessageKind,
    pub seq_id: i32,
}

impl MessageHeader {
    pub fn new(name: impl Into<String>, kind: MessageKind, seq_id: i32) -> Self {
        Self {
            name: name.into(),
            kind,
            seq_id,
        }
    }
}

/// Field header: `(name, type, id)`. A `field_type` of [`TType::Stop`]
/// terminates the enclosing struct. Encodings that do not carry field names
/// on the wire leave `name` empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldHeader {
    pub name: Option<String>,
    pub field_type: TType,
    pub id: i16,
}

impl FieldHeader {
    pub fn new(name: Option<String>, field_type: TType, id: i16) -> Self {
        Self {
            name,
            field_type,
            id,
        }
    }

    /// The header that terminates a struct.
    pub fn stop() -> Self {
        Self {
            name: None,
            field_type: TType::Stop,
            id: 0,
        }
    }

    pub fn is_stop(&self) -> bool {
        self.field_type == TType::Stop
    }
}

/// Map header: `(keyType, valType, size)`. `size` counts entries, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapHeader {
    pub key_type: TType,
    pub value_type: TType,
    pub size: usize,
}

/// List header: `(elemType, size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListHeader {
    pub element_type: TType,
    pub size: usize,
}

/// Set header: `(elemType, size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetHeader {
    pub element_type: TType,
    pub size: usize,
}

/// A stateful cursor that emits or consumes a sequence of typed tokens over
/// a transport.
///
/// Every `*_begin` has exactly one matching `*_end`; generated serializers
/// drive this surface and the encodings keep whatever state they need (the
/// JSON encodings keep a context stack) to render separators and quoting.
pub trait Protocol: Send {
    // Write surface.
    fn write_message_begin(
        &mut self,
        name: &str,
        kind: MessageKind,
        seq_id: i32,
    ) -> Result<(), Error>;
    fn write_message_end(&mut self) -> Result<(), Error>;
    fn write_struct_begin(&mut self, name: &str) -> Result<(), Error>;
    fn write_struct_end(&mut self) -> Result<(), Error>;
    fn write_field_begin(&mut self, name: &str, field_type: TType, id: i16) -> Result<(), Error>;
    fn write_field_end(&mut self) -> Result<(), Error>;
    fn write_field_stop(&mut self) -> Result<(), Error>;
    fn write_map_begin(
        &mut self,
        key_type: TType,
        value_type: TType,
        size: usize,
    ) -> Result<(), Error>;
    fn write_map_end(&mut self) -> Result<(), Error>;
    fn write_list_begin(&mut self, element_type: TType, size: usize) -> Result<(), Error>;
    fn write_list_end(&mut self) -> Result<(), Error>;
    fn write_set_begin(&mut self, element_type: TType, size: usize) -> Result<(), Error>;
    fn write_set_end(&mut self) -> Result<(), Error>;
    fn write_bool(&mut self, value: bool) -> Result<(), Error>;
    fn write_byte(&mut self, value: i8) -> Result<(), Error>;
    fn write_i16(&mut self, value: i16) -> Result<(), Error>;
    fn write_i32(&mut self, value: i32) -> Result<(), Error>;
    fn write_i64(&mut self, value: i64) -> Result<(), Error>;
    fn write_double(&mut self, value: f64) -> Result<(), Error>;
    fn write_string(&mut self, value: &str) -> Result<(), Error>;
    fn write_binary(&mut self, value: &[u8]) -> Result<(), Error>;

    // Read surface.
    fn read_message_begin(&mut self) -> Result<MessageHeader, Error>;
    fn read_message_end(&mut self) -> Result<(), Error>;
    fn read_struct_begin(&mut self) -> Result<(), Error>;
    fn read_struct_end(&mut self) -> Result<(), Error>;
    fn read_field_begin(&mut self) -> Result<FieldHeader, Error>;
    fn read_field_end(&mut self) -> Result<(), Error>;
    fn read_map_begin(&mut self) -> Result<MapHeader, Error>;
    fn read_map_end(&mut self) -> Result<(), Error>;
    fn read_list_begin(&mut self) -> Result<ListHeader, Error>;
    fn read_list_end(&mut self) -> Result<(), Error>;
    fn read_set_begin(&mut self) -> Result<SetHeader, Error>;
    fn read_set_end(&mut self) -> Result<(), Error>;
    fn read_bool(&mut self) -> Result<bool, Error>;
    fn read_byte(&mut self) -> Result<i8, Error>;
    fn read_i16(&mut self) -> Result<i16, Error>;
    fn read_i32(&mut self) -> Result<i32, Error>;
    fn read_i64(&mut self) -> Result<i64, Error>;
    fn read_double(&mut self) -> Result<f64, Error>;
    fn read_string(&mut self) -> Result<String, Error>;
    fn read_binary(&mut self) -> Result<Vec<u8>, Error>;

    /// Pushes buffered output down through the transport stack.
    fn flush(&mut self) -> Result<(), Error>;

    /// Consumes exactly one well-formed value of `field_type` without
    /// materializing it. Used to step over unknown fields.
    fn skip(&mut self, field_type: TType) -> Result<(), Error> {
        self.skip_within(field_type, MAX_SKIP_DEPTH)
    }

    /// Depth-bounded skip.
    fn skip_within(&mut self, field_type: TType, depth: usize) -> Result<(), Error> {
        if depth == 0 {
            return Err(ProtocolError::new(
                ProtocolErrorKind::DepthLimit,
                "maximum skip depth exceeded",
            )
            .into());
        }
        match field_type {
            TType::Bool => self.read_bool().map(|_| ()),
            TType::Byte => self.read_byte().map(|_| ()),
            TType::I16 => self.read_i16().map(|_| ()),
            TType::I32 => self.read_i32().map(|_| ()),
            TType::I64 => self.read_i64().map(|_| ()),
            TType::Double => self.read_double().map(|_| ()),
            TType::String => self.read_string().map(|_| ()),
            TType::Struct => {
                self.read_struct_begin()?;
                loop {
                    let field = self.read_field_begin()?;
                    if field.is_stop() {
                        break;
                    }
                    self.skip_within(field.field_type, depth - 1)?;
                    self.read_field_end()?;
                }
                self.read_struct_end()
            }
            TType::Map => {
                let header = self.read_map_begin()?;
                for _ in 0..header.size {
                    self.skip_within(header.key_type, depth - 1)?;
                    self.skip_within(header.value_type, depth - 1)?;
                }
                self.read_map_end()
            }
            TType::Set => {
                let header = self.read_set_begin()?;
                for _ in 0..header.size {
                    self.skip_within(header.element_type, depth - 1)?;
                }
                self.read_set_end()
            }
            TType::List => {
                let header = self.read_list_begin()?;
                for _ in 0..header.size {
                    self.skip_within(header.element_type, depth - 1)?;
                }
                self.read_list_end()
            }
            TType::Stop | TType::Void => Err(ProtocolError::new(
                ProtocolErrorKind::InvalidData,
                format!("cannot skip type {}", field_type),
            )
            .into()),
        }
    }
}

/// Builds a protocol per connection around a transport stack.
pub trait ProtocolFactory: Send + Sync {
    fn create(&self, transport: Box<dyn Transport>) -> Box<dyn Protocol>;
}

/// Consumes one binary-encoded value of `field_type` directly off a
/// transport, without a protocol instance.
///
/// Primitive widths: bool/byte 1, i16 2, i32 4, i64/double 8; strings are a
/// 4-byte big-endian length followed by that many bytes; structs read field
/// headers until STOP; containers read their binary headers and recurse.
pub fn skip_binary<T: Transport + ?Sized>(
    transport: &mut T,
    field_type: TType,
) -> Result<(), Error> {
    skip_binary_within(transport, field_type, MAX_SKIP_DEPTH)
}

fn skip_binary_within<T: Transport + ?Sized>(
    transport: &mut T,
    field_type: TType,
    depth: usize,
) -> Result<(), Error> {
    if depth == 0 {
        return Err(ProtocolError::new(
            ProtocolErrorKind::DepthLimit,
            "maximum skip depth exceeded",
        )
        .into());
    }
    match field_type {
        TType::Bool | TType::Byte => {
            transport.read_all(1)?;
            Ok(())
        }
        TType::I16 => {
            transport.read_all(2)?;
            Ok(())
        }
        TType::I32 => {
            transport.read_all(4)?;
            Ok(())
        }
        TType::I64 | TType::Double => {
            transport.read_all(8)?;
            Ok(())
        }
        TType::String => {
            let raw = transport.read_all(4)?;
            let len = i32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
            if len < 0 {
                return Err(ProtocolError::new(
                    ProtocolErrorKind::NegativeSize,
                    format!("negative string length {}", len),
                )
                .into());
            }
            transport.check_read_budget(len as usize)?;
            transport.read_all(len as usize)?;
            Ok(())
        }
        TType::Struct => {
            loop {
                let tag = transport.read_all(1)?;
                let next = TType::from_code(tag[0])?;
                if next == TType::Stop {
                    return Ok(());
                }
                transport.read_all(2)?; // field id
                skip_binary_within(transport, next, depth - 1)?;
            }
        }
        TType::Map => {
            let header = transport.read_all(6)?;
            let key_type = TType::from_code(header[0])?;
            let value_type = TType::from_code(header[1])?;
            let size = read_binary_size(&header[2..6], transport)?;
            for _ in 0..size {
                skip_binary_within(transport, key_type, depth - 1)?;
                skip_binary_within(transport, value_type, depth - 1)?;
            }
            Ok(())
        }
        TType::Set | TType::List => {
            let header = transport.read_all(5)?;
            let element_type = TType::from_code(header[0])?;
            let size = read_binary_size(&header[1..5], transport)?;
            for _ in 0..size {
                skip_binary_within(transport, element_type, depth - 1)?;
            }
            Ok(())
        }
        TType::Stop | TType::Void => Err(ProtocolError::new(
            ProtocolErrorKind::InvalidData,
            format!("cannot skip type {}", field_type),
        )
        .into()),
    }
}

fn read_binary_size<T: Transport + ?Sized>(raw: &[u8], transport: &T) -> Result<usize, Error> {
    let size = i32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
    if size < 0 {
        return Err(ProtocolError::new(
            ProtocolErrorKind::NegativeSize,
            format!("negative container size {}", size),
        )
        .into());
    }
    transport.check_read_budget(size as usize)?;
    Ok(size as usize)
}
