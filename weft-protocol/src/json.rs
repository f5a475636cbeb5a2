//! Bidirectional JSON encoding.
//!
//! Wire shapes:
//!
//! - message: `[1,"name",typeCode,seqid,body]` (leading `1` is the version)
//! - struct: `{"<fieldId>":{"<typeTag>":value},...}`
//! - list/set: `["<elemTag>",size,elem0,elem1,...]`
//! - map: `["<kTag>","<vTag>",size,{"k0":v0,...}]`
//!
//! Type tags are the closed set `tf i8 i16 i32 i64 dbl str rec map lst set`.
//! Numbers in object-key position (struct field ids, map keys) are quoted;
//! a stack of contexts tracks separators and quoting. `NaN` and the
//! infinities are encoded as the quoted strings `"NaN"`, `"Infinity"` and
//! `"-Infinity"`.

use crate::error::{Error, ProtocolError, ProtocolErrorKind};
use crate::protocol::{
    FieldHeader, ListHeader, MapHeader, MessageHeader, Protocol, ProtocolFactory, SetHeader,
};
use crate::ttype::{MessageKind, TType};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use weft_transport::Transport;

/// Version tag leading every message array.
pub const JSON_PROTOCOL_VERSION: i64 = 1;

/// Separator and quoting state for one level of JSON nesting.
///
/// Modeled as a tagged variant with an explicit transition table rather
/// than the polymorphic context objects of other runtimes.
#[derive(Debug, Clone, Copy)]
enum JsonContext {
    /// Top level: nothing between values.
    Base,
    /// Array body: `,` between elements, no forced quoting.
    List { first: bool },
    /// Object body: alternates `:` and `,`; key positions quote numbers.
    Pair { first: bool, colon: bool },
}

impl JsonContext {
    /// Advances the context for the next value and returns the separator
    /// that belongs before it, if any.
    fn advance(&mut self) -> Option<u8> {
        match self {
            JsonContext::Base => None,
            JsonContext::List { first } => {
                if *first {
                    *first = false;
                    None
                } else {
                    Some(b',')
                }
            }
            JsonContext::Pair { first, colon } => {
                if *first {
                    *first = false;
                    *colon = true;
                    None
                } else {
                    let sep = if *colon { b':' } else { b',' };
                    *colon = !*colon;
                    Some(sep)
                }
            }
        }
    }

    /// Whether the value at the current position must be quoted if numeric.
    /// Valid immediately after [`advance`](Self::advance).
    fn escape_num(&self) -> bool {
        matches!(self, JsonContext::Pair { colon: true, .. })
    }
}

/// Renders `value` as a quoted JSON string with the standard escape table.
/// UTF-8 multi-byte sequences pass through raw.
pub(crate) fn quote_json_bytes(value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len() + 2);
    out.push(b'"');
    for &b in value {
        match b {
            b'"' => out.extend_from_slice(b"\\\""),
            b'\\' => out.extend_from_slice(b"\\\\"),
            0x08 => out.extend_from_slice(b"\\b"),
            0x0C => out.extend_from_slice(b"\\f"),
            0x0A => out.extend_from_slice(b"\\n"),
            0x0D => out.extend_from_slice(b"\\r"),
            0x09 => out.extend_from_slice(b"\\t"),
            b if b < 0x20 => {
                out.extend_from_slice(format!("\\u{:04x}", b).as_bytes());
            }
            b => out.push(b),
        }
    }
    out.push(b'"');
    out
}

/// The bidirectional JSON protocol.
pub struct JsonProtocol<T: Transport> {
    trans: T,
    write_stack: Vec<JsonContext>,
    read_stack: Vec<JsonContext>,
    lookahead: Option<u8>,
}

impl<T: Transport> JsonProtocol<T> {
    pub fn new(trans: T) -> Self {
        Self {
            trans,
            write_stack: vec![JsonContext::Base],
            read_stack: vec![JsonContext::Base],
            lookahead: None,
        }
    }

    pub fn into_inner(self) -> T {
        self.trans
    }

    pub fn inner(&self) -> &T {
        &self.trans
    }

    pub fn inner_mut(&mut self) -> &mut T {
        &mut self.trans
    }

    // --- write side ---

    fn write_separator(&mut self) -> Result<(), Error> {
        let sep = self
            .write_stack
            .last_mut()
            .map(JsonContext::advance)
            .unwrap_or(None);
        if let Some(sep) = sep {
            self.trans.write(&[sep])?;
        }
        Ok(())
    }

    fn write_escapes(&self) -> bool {
        self.write_stack
            .last()
            .map(JsonContext::escape_num)
            .unwrap_or(false)
    }

    fn write_object_begin(&mut self) -> Result<(), Error> {
        self.write_separator()?;
        self.trans.write(b"{")?;
        self.write_stack.push(JsonContext::Pair {
            first: true,
            colon: false,
        });
        Ok(())
    }

    fn write_object_end(&mut self) -> Result<(), Error> {
        self.pop_write_context()?;
        self.trans.write(b"}")?;
        Ok(())
    }

    fn write_array_begin(&mut self) -> Result<(), Error> {
        self.write_separator()?;
        self.trans.write(b"[")?;
        self.write_stack.push(JsonContext::List { first: true });
        Ok(())
    }

    fn write_array_end(&mut self) -> Result<(), Error> {
        self.pop_write_context()?;
        self.trans.write(b"]")?;
        Ok(())
    }

    fn pop_write_context(&mut self) -> Result<(), Error> {
        if self.write_stack.len() <= 1 {
            return Err(ProtocolError::new(
                ProtocolErrorKind::InvalidData,
                "unbalanced write context stack",
            )
            .into());
        }
        self.write_stack.pop();
        Ok(())
    }

    fn write_json_integer(&mut self, value: i64) -> Result<(), Error> {
        self.write_separator()?;
        let escape = self.write_escapes();
        if escape {
            self.trans.write(b"\"")?;
        }
        self.trans.write(value.to_string().as_bytes())?;
        if escape {
            self.trans.write(b"\"")?;
        }
        Ok(())
    }

    fn write_json_double(&mut self, value: f64) -> Result<(), Error> {
        self.write_separator()?;
        if value.is_nan() {
            self.trans.write(b"\"NaN\"")?;
            return Ok(());
        }
        if value.is_infinite() {
            if value.is_sign_positive() {
                self.trans.write(b"\"Infinity\"")?;
            } else {
                self.trans.write(b"\"-Infinity\"")?;
            }
            return Ok(());
        }
        let escape = self.write_escapes();
        if escape {
            self.trans.write(b"\"")?;
        }
        self.trans.write(format!("{:?}", value).as_bytes())?;
        if escape {
            self.trans.write(b"\"")?;
        }
        Ok(())
    }

    fn write_json_string(&mut self, value: &[u8]) -> Result<(), Error> {
        self.write_separator()?;
        self.write_quoted(value)
    }

    fn write_quoted(&mut self, value: &[u8]) -> Result<(), Error> {
        let out = quote_json_bytes(value);
        self.trans.write(&out)?;
        Ok(())
    }

    // --- read side ---

    fn read_byte_raw(&mut self) -> Result<u8, Error> {
        if let Some(b) = self.lookahead.take() {
            return Ok(b);
        }
        let chunk = self.trans.read_all(1)?;
        Ok(chunk[0])
    }

    /// One-byte lookahead; `None` at a clean end of stream.
    fn peek_byte(&mut self) -> Result<Option<u8>, Error> {
        if let Some(b) = self.lookahead {
            return Ok(Some(b));
        }
        let chunk = self.trans.read(1)?;
        if chunk.is_empty() {
            return Ok(None);
        }
        self.lookahead = Some(chunk[0]);
        Ok(Some(chunk[0]))
    }

    fn read_syntax_char(&mut self, expected: u8) -> Result<(), Error> {
        let b = self.read_byte_raw()?;
        if b != expected {
            return Err(ProtocolError::new(
                ProtocolErrorKind::InvalidData,
                format!("expected {:?}, got {:?}", expected as char, b as char),
            )
            .into());
        }
        Ok(())
    }

    fn read_separator(&mut self) -> Result<(), Error> {
        let sep = self
            .read_stack
            .last_mut()
            .map(JsonContext::advance)
            .unwrap_or(None);
        if let Some(sep) = sep {
            self.read_syntax_char(sep)?;
        }
        Ok(())
    }

    fn read_escapes(&self) -> bool {
        self.read_stack
            .last()
            .map(JsonContext::escape_num)
            .unwrap_or(false)
    }

    fn read_object_begin(&mut self) -> Result<(), Error> {
        self.read_separator()?;
        self.read_syntax_char(b'{')?;
        self.read_stack.push(JsonContext::Pair {
            first: true,
            colon: false,
        });
        Ok(())
    }

    fn read_object_end(&mut self) -> Result<(), Error> {
        self.read_syntax_char(b'}')?;
        self.pop_read_context()
    }

    fn read_array_begin(&mut self) -> Result<(), Error> {
        self.read_separator()?;
        self.read_syntax_char(b'[')?;
        self.read_stack.push(JsonContext::List { first: true });
        Ok(())
    }

    fn read_array_end(&mut self) -> Result<(), Error> {
        self.read_syntax_char(b']')?;
        self.pop_read_context()
    }

    fn pop_read_context(&mut self) -> Result<(), Error> {
        if self.read_stack.len() <= 1 {
            return Err(ProtocolError::new(
                ProtocolErrorKind::InvalidData,
                "unbalanced read context stack",
            )
            .into());
        }
        self.read_stack.pop();
        Ok(())
    }

    fn read_hex4(&mut self) -> Result<u16, Error> {
        let mut value: u16 = 0;
        for _ in 0..4 {
            let b = self.read_byte_raw()?;
            let digit = (b as char).to_digit(16).ok_or_else(|| {
                ProtocolError::new(
                    ProtocolErrorKind::InvalidData,
                    format!("invalid hex digit {:?}", b as char),
                )
            })?;
            value = value << 4 | digit as u16;
        }
        Ok(value)
    }

    /// Reads a JSON string; `with_separator` controls whether the context
    /// separator is consumed first (false when the caller already did).
    fn read_json_string(&mut self, with_separator: bool) -> Result<Vec<u8>, Error> {
        if with_separator {
            self.read_separator()?;
        }
        self.read_syntax_char(b'"')?;
        let mut out = Vec::new();
        loop {
            let b = self.read_byte_raw()?;
            match b {
                b'"' => break,
                b'\\' => {
                    let esc = self.read_byte_raw()?;
                    match esc {
                        b'"' => out.push(b'"'),
                        b'\\' => out.push(b'\\'),
                        b'/' => out.push(b'/'),
                        b'b' => out.push(0x08),
                        b'f' => out.push(0x0C),
                        b'n' => out.push(0x0A),
                        b'r' => out.push(0x0D),
                        b't' => out.push(0x09),
                        b'u' => {
                            let unit = self.read_hex4()?;
                            let ch = if (0xD800..0xDC00).contains(&unit) {
                                self.read_syntax_char(b'\\')?;
                                self.read_syntax_char(b'u')?;
                                let low = self.read_hex4()?;
                                if !(0xDC00..0xE000).contains(&low) {
                                    return Err(ProtocolError::new(
                                        ProtocolErrorKind::InvalidData,
                                        "expected low surrogate",
                                    )
                                    .into());
                                }
                                let cp = 0x10000
                                    + ((unit as u32 - 0xD800) << 10)
                                    + (low as u32 - 0xDC00);
                                char::from_u32(cp)
                            } else if (0xDC00..0xE000).contains(&unit) {
                                None
                            } else {
                                char::from_u32(unit as u32)
                            };
                            let ch = ch.ok_or_else(|| {
                                ProtocolError::new(
                                    ProtocolErrorKind::InvalidData,
                                    "invalid unicode escape",
                                )
                            })?;
                            let mut buf = [0u8; 4];
                            out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                        }
                        other => {
                            return Err(ProtocolError::new(
                                ProtocolErrorKind::InvalidData,
                                format!("invalid escape character {:?}", other as char),
                            )
                            .into());
                        }
                    }
                }
                b => out.push(b),
            }
        }
        Ok(out)
    }

    fn read_numeric_chars(&mut self) -> Result<String, Error> {
        let mut out = String::new();
        while let Some(b) = self.peek_byte()? {
            if b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E') {
                out.push(self.read_byte_raw()? as char);
            } else {
                break;
            }
        }
        if out.is_empty() {
            return Err(ProtocolError::new(
                ProtocolErrorKind::InvalidData,
                "expected numeric data",
            )
            .into());
        }
        Ok(out)
    }

    fn read_json_integer(&mut self) -> Result<i64, Error> {
        self.read_separator()?;
        let escape = self.read_escapes();
        if escape {
            self.read_syntax_char(b'"')?;
        }
        let digits = self.read_numeric_chars()?;
        if escape {
            self.read_syntax_char(b'"')?;
        }
        digits.parse::<i64>().map_err(|_| {
            ProtocolError::new(
                ProtocolErrorKind::InvalidData,
                format!("invalid integer {:?}", digits),
            )
            .into()
        })
    }

    fn read_json_double(&mut self) -> Result<f64, Error> {
        self.read_separator()?;
        if self.peek_byte()? == Some(b'"') {
            let raw = self.read_json_string(false)?;
            let text = String::from_utf8(raw).map_err(|_| {
                ProtocolError::new(ProtocolErrorKind::InvalidData, "invalid UTF-8 in double")
            })?;
            return match text.as_str() {
                "NaN" => Ok(f64::NAN),
                "Infinity" => Ok(f64::INFINITY),
                "-Infinity" => Ok(f64::NEG_INFINITY),
                _ => {
                    if !self.read_escapes() {
                        return Err(ProtocolError::new(
                            ProtocolErrorKind::InvalidData,
                            "numeric data unexpectedly quoted",
                        )
                        .into());
                    }
                    text.parse::<f64>().map_err(|_| {
                        ProtocolError::new(
                            ProtocolErrorKind::InvalidData,
                            format!("invalid double {:?}", text),
                        )
                        .into()
                    })
                }
            };
        }
        let digits = self.read_numeric_chars()?;
        digits.parse::<f64>().map_err(|_| {
            ProtocolError::new(
                ProtocolErrorKind::InvalidData,
                format!("invalid double {:?}", digits),
            )
            .into()
        })
    }

    fn read_type_tag(&mut self) -> Result<TType, Error> {
        let raw = self.read_json_string(true)?;
        let tag = std::str::from_utf8(&raw).map_err(|_| {
            ProtocolError::new(ProtocolErrorKind::InvalidData, "invalid UTF-8 in type tag")
        })?;
        Ok(TType::from_json_tag(tag)?)
    }

    fn read_container_size(&mut self) -> Result<usize, Error> {
        let size = self.read_json_integer()?;
        if size < 0 {
            return Err(ProtocolError::new(
                ProtocolErrorKind::NegativeSize,
                format!("negative container size {}", size),
            )
            .into());
        }
        self.trans.check_read_budget(size as usize)?;
        Ok(size as usize)
    }

    fn check_integer_limits(value: i64, bits: u32) -> Result<i64, Error> {
        let min = -(1i64 << (bits - 1));
        let max = (1i64 << (bits - 1)) - 1;
        if value < min || value > max {
            return Err(ProtocolError::new(
                ProtocolErrorKind::InvalidData,
                format!("i{} requires {} <= number <= {}", bits, min, max),
            )
            .into());
        }
        Ok(value)
    }
}

impl<T: Transport> Protocol for JsonProtocol<T> {
    fn write_message_begin(
        &mut self,
        name: &str,
        kind: MessageKind,
        seq_id: i32,
    ) -> Result<(), Error> {
        self.write_stack.clear();
        self.write_stack.push(JsonContext::Base);
        self.write_array_begin()?;
        self.write_json_integer(JSON_PROTOCOL_VERSION)?;
        self.write_json_string(name.as_bytes())?;
        self.write_json_integer(kind as i64)?;
        self.write_json_integer(seq_id as i64)
    }

    fn write_message_end(&mut self) -> Result<(), Error> {
        self.write_array_end()
    }

    fn write_struct_begin(&mut self, _name: &str) -> Result<(), Error> {
        self.write_object_begin()
    }

    fn write_struct_end(&mut self) -> Result<(), Error> {
        self.write_object_end()
    }

    fn write_field_begin(&mut self, _name: &str, field_type: TType, id: i16) -> Result<(), Error> {
        self.write_json_integer(id as i64)?;
        self.write_object_begin()?;
        let tag = field_type.json_tag()?;
        self.write_json_string(tag.as_bytes())
    }

    fn write_field_end(&mut self) -> Result<(), Error> {
        self.write_object_end()
    }

    fn write_field_stop(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn write_map_begin(
        &mut self,
        key_type: TType,
        value_type: TType,
        size: usize,
    ) -> Result<(), Error> {
        self.write_array_begin()?;
        let key_tag = key_type.json_tag()?;
        self.write_json_string(key_tag.as_bytes())?;
        let value_tag = value_type.json_tag()?;
        self.write_json_string(value_tag.as_bytes())?;
        self.write_json_integer(size as i64)?;
        self.write_object_begin()
    }

    fn write_map_end(&mut self) -> Result<(), Error> {
        self.write_object_end()?;
        self.write_array_end()
    }

    fn write_list_begin(&mut self, element_type: TType, size: usize) -> Result<(), Error> {
        self.write_array_begin()?;
        let tag = element_type.json_tag()?;
        self.write_json_string(tag.as_bytes())?;
        self.write_json_integer(size as i64)
    }

    fn write_list_end(&mut self) -> Result<(), Error> {
        self.write_array_end()
    }

    fn write_set_begin(&mut self, element_type: TType, size: usize) -> Result<(), Error> {
        self.write_list_begin(element_type, size)
    }

    fn write_set_end(&mut self) -> Result<(), Error> {
        self.write_array_end()
    }

    fn write_bool(&mut self, value: bool) -> Result<(), Error> {
        self.write_json_integer(if value { 1 } else { 0 })
    }

    fn write_byte(&mut self, value: i8) -> Result<(), Error> {
        self.write_json_integer(value as i64)
    }

    fn write_i16(&mut self, value: i16) -> Result<(), Error> {
        self.write_json_integer(value as i64)
    }

    fn write_i32(&mut self, value: i32) -> Result<(), Error> {
        self.write_json_integer(value as i64)
    }

    fn write_i64(&mut self, value: i64) -> Result<(), Error> {
        self.write_json_integer(value)
    }

    fn write_double(&mut self, value: f64) -> Result<(), Error> {
        self.write_json_double(value)
    }

    fn write_string(&mut self, value: &str) -> Result<(), Error> {
        self.write_json_string(value.as_bytes())
    }

    fn write_binary(&mut self, value: &[u8]) -> Result<(), Error> {
        let encoded = BASE64.encode(value);
        self.write_json_string(encoded.as_bytes())
    }

    fn read_message_begin(&mut self) -> Result<MessageHeader, Error> {
        self.trans.reset_read_budget();
        self.read_stack.clear();
        self.read_stack.push(JsonContext::Base);
        self.lookahead = None;

        self.read_array_begin()?;
        let version = self.read_json_integer()?;
        if version != JSON_PROTOCOL_VERSION {
            return Err(ProtocolError::new(
                ProtocolErrorKind::BadVersion,
                "Message contained bad version",
            )
            .into());
        }
        let raw_name = self.read_json_string(true)?;
        let name = String::from_utf8(raw_name).map_err(|_| {
            ProtocolError::new(ProtocolErrorKind::InvalidData, "invalid UTF-8 in method name")
        })?;
        let kind = MessageKind::from_code(self.read_json_integer()? as i32)?;
        let seq_id = self.read_json_integer()? as i32;
        Ok(MessageHeader { name, kind, seq_id })
    }

    fn read_message_end(&mut self) -> Result<(), Error> {
        self.read_array_end()
    }

    fn read_struct_begin(&mut self) -> Result<(), Error> {
        self.read_object_begin()
    }

    fn read_struct_end(&mut self) -> Result<(), Error> {
        self.read_object_end()
    }

    fn read_field_begin(&mut self) -> Result<FieldHeader, Error> {
        if self.peek_byte()? == Some(b'}') {
            return Ok(FieldHeader::stop());
        }
        let id = Self::check_integer_limits(self.read_json_integer()?, 16)? as i16;
        self.read_object_begin()?;
        let field_type = self.read_type_tag()?;
        // The wire carries no field name; leave it empty.
        Ok(FieldHeader::new(None, field_type, id))
    }

    fn read_field_end(&mut self) -> Result<(), Error> {
        self.read_object_end()
    }

    fn read_map_begin(&mut self) -> Result<MapHeader, Error> {
        self.read_array_begin()?;
        let key_type = self.read_type_tag()?;
        let value_type = self.read_type_tag()?;
        let size = self.read_container_size()?;
        self.read_object_begin()?;
        Ok(MapHeader {
            key_type,
            value_type,
            size,
        })
    }

    fn read_map_end(&mut self) -> Result<(), Error> {
        self.read_object_end()?;
        self.read_array_end()
    }

    fn read_list_begin(&mut self) -> Result<ListHeader, Error> {
        self.read_array_begin()?;
        let element_type = self.read_type_tag()?;
        let size = self.read_container_size()?;
        Ok(ListHeader { element_type, size })
    }

    fn read_list_end(&mut self) -> Result<(), Error> {
        self.read_array_end()
    }

    fn read_set_begin(&mut self) -> Result<SetHeader, Error> {
        let header = self.read_list_begin()?;
        Ok(SetHeader {
            element_type: header.element_type,
            size: header.size,
        })
    }

    fn read_set_end(&mut self) -> Result<(), Error> {
        self.read_array_end()
    }

    fn read_bool(&mut self) -> Result<bool, Error> {
        Ok(self.read_json_integer()? != 0)
    }

    fn read_byte(&mut self) -> Result<i8, Error> {
        Ok(Self::check_integer_limits(self.read_json_integer()?, 8)? as i8)
    }

    fn read_i16(&mut self) -> Result<i16, Error> {
        Ok(Self::check_integer_limits(self.read_json_integer()?, 16)? as i16)
    }

    fn read_i32(&mut self) -> Result<i32, Error> {
        Ok(Self::check_integer_limits(self.read_json_integer()?, 32)? as i32)
    }

    fn read_i64(&mut self) -> Result<i64, Error> {
        self.read_json_integer()
    }

    fn read_double(&mut self) -> Result<f64, Error> {
        self.read_json_double()
    }

    fn read_string(&mut self) -> Result<String, Error> {
        let raw = self.read_json_string(true)?;
        String::from_utf8(raw).map_err(|_| {
            ProtocolError::new(ProtocolErrorKind::InvalidData, "invalid UTF-8 in string").into()
        })
    }

    fn read_binary(&mut self) -> Result<Vec<u8>, Error> {
        let mut raw = self.read_json_string(true)?;
        // Tolerate unpadded peers.
        while raw.len() % 4 != 0 {
            raw.push(b'=');
        }
        BASE64.decode(&raw).map_err(|_| {
            ProtocolError::new(ProtocolErrorKind::InvalidData, "invalid base64 data").into()
        })
    }

    fn flush(&mut self) -> Result<(), Error> {
        self.trans.flush()?;
        Ok(())
    }
}

/// Builds [`JsonProtocol`]s per connection.
#[derive(Debug, Default)]
pub struct JsonProtocolFactory;

impl ProtocolFactory for JsonProtocolFactory {
    fn create(&self, transport: Box<dyn Transport>) -> Box<dyn Protocol> {
        Box::new(JsonProtocol::new(transport))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::quickcheck;
    use weft_transport::{MemoryBuffer, TransportConfig};

    fn writer() -> JsonProtocol<MemoryBuffer> {
        JsonProtocol::new(MemoryBuffer::new())
    }

    fn reader(wire: &[u8]) -> JsonProtocol<MemoryBuffer> {
        JsonProtocol::new(MemoryBuffer::from_bytes(wire))
    }

    fn wire_of(protocol: JsonProtocol<MemoryBuffer>) -> Vec<u8> {
        protocol.into_inner().bytes().to_vec()
    }

    #[test]
    fn test_message_envelope_wire_shape() {
        let mut p = writer();
        p.write_message_begin("ping", MessageKind::Call, 42).unwrap();
        p.write_struct_begin("ping_args").unwrap();
        p.write_field_stop().unwrap();
        p.write_struct_end().unwrap();
        p.write_message_end().unwrap();

        assert_eq!(wire_of(p), b"[1,\"ping\",1,42,{}]");
    }

    #[test]
    fn test_message_envelope_round_trip() {
        let mut p = reader(b"[1,\"ping\",1,42,{}]");
        let header = p.read_message_begin().unwrap();
        assert_eq!(header.name, "ping");
        assert_eq!(header.kind, MessageKind::Call);
        assert_eq!(header.seq_id, 42);

        p.read_struct_begin().unwrap();
        assert!(p.read_field_begin().unwrap().is_stop());
        p.read_struct_end().unwrap();
        p.read_message_end().unwrap();
    }

    #[test]
    fn test_bad_version_rejected() {
        let mut p = reader(b"[2,\"ping\",1,42,{}]");
        let err = p.read_message_begin().unwrap_err();
        match err {
            Error::Protocol(e) => {
                assert_eq!(e.kind, ProtocolErrorKind::BadVersion);
                assert_eq!(e.message, "Message contained bad version");
            }
            other => panic!("expected protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_map_of_i32_to_string_wire_shape() {
        let mut p = writer();
        p.write_map_begin(TType::I32, TType::String, 2).unwrap();
        p.write_i32(1).unwrap();
        p.write_string("a").unwrap();
        p.write_i32(2).unwrap();
        p.write_string("b").unwrap();
        p.write_map_end().unwrap();

        assert_eq!(wire_of(p), b"[\"i32\",\"str\",2,{\"1\":\"a\",\"2\":\"b\"}]");
    }

    #[test]
    fn test_map_round_trip() {
        let wire = b"[\"i32\",\"str\",2,{\"1\":\"a\",\"2\":\"b\"}]";
        let mut p = reader(wire);
        let header = p.read_map_begin().unwrap();
        assert_eq!(header.key_type, TType::I32);
        assert_eq!(header.value_type, TType::String);
        assert_eq!(header.size, 2);

        let mut entries = Vec::new();
        for _ in 0..header.size {
            let k = p.read_i32().unwrap();
            let v = p.read_string().unwrap();
            entries.push((k, v));
        }
        p.read_map_end().unwrap();
        assert_eq!(entries, vec![(1, "a".to_owned()), (2, "b".to_owned())]);
    }

    #[test]
    fn test_struct_field_ids_are_quoted_keys() {
        let mut p = writer();
        p.write_struct_begin("wide").unwrap();
        for id in [1i16, 13, 127, 32767] {
            p.write_field_begin("f", TType::I32, id).unwrap();
            p.write_i32(id as i32).unwrap();
            p.write_field_end().unwrap();
        }
        p.write_field_stop().unwrap();
        p.write_struct_end().unwrap();

        let wire = wire_of(p);
        let text = String::from_utf8(wire.clone()).unwrap();
        assert!(text.contains("\"32767\":{\"i32\":32767}"));
        assert!(text.contains("\"1\":{\"i32\":1}"));

        let mut p = reader(&wire);
        p.read_struct_begin().unwrap();
        let mut seen = Vec::new();
        loop {
            let field = p.read_field_begin().unwrap();
            if field.is_stop() {
                break;
            }
            assert_eq!(field.field_type, TType::I32);
            assert!(field.name.is_none());
            seen.push(field.id);
            assert_eq!(p.read_i32().unwrap(), field.id as i32);
            p.read_field_end().unwrap();
        }
        p.read_struct_end().unwrap();
        assert_eq!(seen, vec![1, 13, 127, 32767]);
    }

    #[test]
    fn test_empty_struct_is_braces() {
        let mut p = writer();
        p.write_struct_begin("empty").unwrap();
        p.write_field_stop().unwrap();
        p.write_struct_end().unwrap();
        assert_eq!(wire_of(p), b"{}");
    }

    #[test]
    fn test_empty_containers() {
        let mut p = writer();
        p.write_list_begin(TType::I32, 0).unwrap();
        p.write_list_end().unwrap();
        assert_eq!(wire_of(p), b"[\"i32\",0]");

        let mut p = writer();
        p.write_map_begin(TType::String, TType::String, 0).unwrap();
        p.write_map_end().unwrap();
        assert_eq!(wire_of(p), b"[\"str\",\"str\",0,{}]");
    }

    #[test]
    fn test_bool_encodes_as_integer() {
        let mut p = writer();
        p.write_list_begin(TType::Bool, 2).unwrap();
        p.write_bool(true).unwrap();
        p.write_bool(false).unwrap();
        p.write_list_end().unwrap();
        assert_eq!(wire_of(p), b"[\"tf\",2,1,0]");

        let mut p = reader(b"[\"tf\",2,1,0]");
        let header = p.read_list_begin().unwrap();
        assert_eq!(header.size, 2);
        assert!(p.read_bool().unwrap());
        assert!(!p.read_bool().unwrap());
        p.read_list_end().unwrap();
    }

    #[test]
    fn test_double_specials_round_trip() {
        let mut p = writer();
        p.write_list_begin(TType::Double, 3).unwrap();
        p.write_double(f64::NAN).unwrap();
        p.write_double(f64::INFINITY).unwrap();
        p.write_double(f64::NEG_INFINITY).unwrap();
        p.write_list_end().unwrap();
        let wire = wire_of(p);
        assert_eq!(wire, b"[\"dbl\",3,\"NaN\",\"Infinity\",\"-Infinity\"]");

        let mut p = reader(&wire);
        p.read_list_begin().unwrap();
        assert!(p.read_double().unwrap().is_nan());
        assert_eq!(p.read_double().unwrap(), f64::INFINITY);
        assert_eq!(p.read_double().unwrap(), f64::NEG_INFINITY);
        p.read_list_end().unwrap();
    }

    #[test]
    fn test_finite_double_round_trip() {
        let mut p = writer();
        p.write_list_begin(TType::Double, 2).unwrap();
        p.write_double(3.25).unwrap();
        p.write_double(-0.001).unwrap();
        p.write_list_end().unwrap();
        let wire = wire_of(p);

        let mut p = reader(&wire);
        p.read_list_begin().unwrap();
        assert_eq!(p.read_double().unwrap(), 3.25);
        assert_eq!(p.read_double().unwrap(), -0.001);
        p.read_list_end().unwrap();
    }

    #[test]
    fn test_unquoted_double_in_value_position_accepted() {
        let mut p = reader(b"[\"dbl\",1,2.5]");
        p.read_list_begin().unwrap();
        assert_eq!(p.read_double().unwrap(), 2.5);
    }

    #[test]
    fn test_quoted_double_in_value_position_rejected() {
        let mut p = reader(b"[\"dbl\",1,\"2.5\"]");
        p.read_list_begin().unwrap();
        let err = p.read_double().unwrap_err();
        match err {
            Error::Protocol(e) => {
                assert_eq!(e.kind, ProtocolErrorKind::InvalidData);
                assert!(e.message.contains("unexpectedly quoted"));
            }
            other => panic!("expected protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_string_escapes_round_trip() {
        let tricky = "a\"b\\c\nd\te\u{8}f\u{c}g\rh/i\u{1}j";
        let mut p = writer();
        p.write_list_begin(TType::String, 1).unwrap();
        p.write_string(tricky).unwrap();
        p.write_list_end().unwrap();
        let wire = wire_of(p);

        let mut p = reader(&wire);
        p.read_list_begin().unwrap();
        assert_eq!(p.read_string().unwrap(), tricky);
        p.read_list_end().unwrap();
    }

    #[test]
    fn test_utf8_passes_through_raw() {
        let text = "héllo 世界 𝄞";
        let mut p = writer();
        p.write_list_begin(TType::String, 1).unwrap();
        p.write_string(text).unwrap();
        p.write_list_end().unwrap();
        let wire = wire_of(p);
        // Multi-byte sequences are not escaped on the wire.
        assert!(String::from_utf8(wire.clone()).unwrap().contains("世界"));

        let mut p = reader(&wire);
        p.read_list_begin().unwrap();
        assert_eq!(p.read_string().unwrap(), text);
    }

    #[test]
    fn test_unicode_escapes_decoded() {
        // "A" and the surrogate pair for U+1D11E.
        let mut p = reader(b"[\"str\",1,\"\\u0041\\uD834\\uDD1E\"]");
        p.read_list_begin().unwrap();
        assert_eq!(p.read_string().unwrap(), "A\u{1D11E}");
    }

    #[test]
    fn test_binary_round_trip() {
        let blob: Vec<u8> = (0u8..=255).collect();
        let mut p = writer();
        p.write_list_begin(TType::String, 1).unwrap();
        p.write_binary(&blob).unwrap();
        p.write_list_end().unwrap();
        let wire = wire_of(p);

        let mut p = reader(&wire);
        p.read_list_begin().unwrap();
        assert_eq!(p.read_binary().unwrap(), blob);
    }

    #[test]
    fn test_unpadded_base64_accepted() {
        // "aGk" is unpadded base64 for "hi".
        let mut p = reader(b"[\"str\",1,\"aGk\"]");
        p.read_list_begin().unwrap();
        assert_eq!(p.read_binary().unwrap(), b"hi");
    }

    #[test]
    fn test_unknown_field_skipped_to_next_sibling() {
        // Struct with field 1 (i32) and unknown field 7 (string); a reader
        // that only knows field 1 skips 7 and lands on the stop cleanly.
        let mut p = writer();
        p.write_struct_begin("s").unwrap();
        p.write_field_begin("known", TType::I32, 1).unwrap();
        p.write_i32(5).unwrap();
        p.write_field_end().unwrap();
        p.write_field_begin("future", TType::String, 7).unwrap();
        p.write_string("x").unwrap();
        p.write_field_end().unwrap();
        p.write_field_stop().unwrap();
        p.write_struct_end().unwrap();
        let wire = wire_of(p);

        let mut p = reader(&wire);
        p.read_struct_begin().unwrap();
        let mut known = None;
        loop {
            let field = p.read_field_begin().unwrap();
            if field.is_stop() {
                break;
            }
            match field.id {
                1 => known = Some(p.read_i32().unwrap()),
                _ => p.skip(field.field_type).unwrap(),
            }
            p.read_field_end().unwrap();
        }
        p.read_struct_end().unwrap();
        assert_eq!(known, Some(5));
        // The cursor sits exactly past the struct.
        assert!(p.inner().is_empty());
    }

    #[test]
    fn test_skip_consumes_same_bytes_as_full_read() {
        let build = || {
            let mut p = writer();
            p.write_struct_begin("s").unwrap();
            p.write_field_begin("m", TType::Map, 1).unwrap();
            p.write_map_begin(TType::String, TType::List, 1).unwrap();
            p.write_string("k").unwrap();
            p.write_list_begin(TType::I64, 3).unwrap();
            for v in [1i64, 2, 3] {
                p.write_i64(v).unwrap();
            }
            p.write_list_end().unwrap();
            p.write_map_end().unwrap();
            p.write_field_end().unwrap();
            p.write_field_stop().unwrap();
            p.write_struct_end().unwrap();
            wire_of(p)
        };
        let wire = build();

        let mut p = reader(&wire);
        p.skip(TType::Struct).unwrap();
        assert!(p.inner().is_empty());
    }

    #[test]
    fn test_nested_struct_in_field() {
        let mut p = writer();
        p.write_struct_begin("outer").unwrap();
        p.write_field_begin("inner", TType::Struct, 1).unwrap();
        p.write_struct_begin("inner").unwrap();
        p.write_field_begin("v", TType::I64, 2).unwrap();
        p.write_i64(-9).unwrap();
        p.write_field_end().unwrap();
        p.write_field_stop().unwrap();
        p.write_struct_end().unwrap();
        p.write_field_end().unwrap();
        p.write_field_stop().unwrap();
        p.write_struct_end().unwrap();
        let wire = wire_of(p);
        assert_eq!(&wire[..], b"{\"1\":{\"rec\":{\"2\":{\"i64\":-9}}}}");

        let mut p = reader(&wire);
        p.read_struct_begin().unwrap();
        let field = p.read_field_begin().unwrap();
        assert_eq!(field.field_type, TType::Struct);
        p.read_struct_begin().unwrap();
        let inner = p.read_field_begin().unwrap();
        assert_eq!(inner.id, 2);
        assert_eq!(p.read_i64().unwrap(), -9);
        p.read_field_end().unwrap();
        assert!(p.read_field_begin().unwrap().is_stop());
        p.read_struct_end().unwrap();
        p.read_field_end().unwrap();
        assert!(p.read_field_begin().unwrap().is_stop());
        p.read_struct_end().unwrap();
    }

    #[test]
    fn test_i8_range_enforced() {
        let mut p = reader(b"[\"i8\",1,200]");
        p.read_list_begin().unwrap();
        let err = p.read_byte().unwrap_err();
        match err {
            Error::Protocol(e) => assert!(e.message.contains("i8 requires")),
            other => panic!("expected protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_container_size_limit_enforced_before_allocation() {
        let config = TransportConfig::default().with_max_message_size(16);
        let trans = MemoryBuffer::with_config(config);
        // Seed after construction so the config applies.
        let mut p = JsonProtocol::new(trans);
        p.inner_mut().write(b"[\"i32\",1000000]").unwrap();
        let err = p.read_list_begin().unwrap_err();
        match err {
            Error::Transport(e) => {
                assert_eq!(e.kind, weft_transport::TransportErrorKind::SizeLimit)
            }
            other => panic!("expected transport error, got {:?}", other),
        }
    }

    #[test]
    fn test_negative_container_size_rejected() {
        let mut p = reader(b"[\"i32\",-1]");
        let err = p.read_list_begin().unwrap_err();
        match err {
            Error::Protocol(e) => assert_eq!(e.kind, ProtocolErrorKind::NegativeSize),
            other => panic!("expected protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_wire_is_valid_json() {
        let mut p = writer();
        p.write_message_begin("compute", MessageKind::Reply, 7).unwrap();
        p.write_struct_begin("result").unwrap();
        p.write_field_begin("values", TType::Map, 0).unwrap();
        p.write_map_begin(TType::I64, TType::Double, 2).unwrap();
        p.write_i64(10).unwrap();
        p.write_double(0.5).unwrap();
        p.write_i64(-4).unwrap();
        p.write_double(2.0).unwrap();
        p.write_map_end().unwrap();
        p.write_field_end().unwrap();
        p.write_field_stop().unwrap();
        p.write_struct_end().unwrap();
        p.write_message_end().unwrap();
        let wire = wire_of(p);

        let value: serde_json::Value = serde_json::from_slice(&wire).unwrap();
        let array = value.as_array().unwrap();
        assert_eq!(array[0], serde_json::json!(1));
        assert_eq!(array[1], serde_json::json!("compute"));
        assert_eq!(array[2], serde_json::json!(2));
        assert_eq!(array[3], serde_json::json!(7));
        // Map keys are quoted in object-key position.
        assert_eq!(
            array[4]["0"]["map"],
            serde_json::json!(["i64", "dbl", 2, { "10": 0.5, "-4": 2.0 }])
        );
    }

    quickcheck! {
        fn prop_primitive_struct_round_trip(
            flag: bool,
            small: i8,
            medium: i16,
            word: i32,
            wide: i64,
            text: String
        ) -> bool {
            let mut p = writer();
            p.write_struct_begin("s").unwrap();
            p.write_field_begin("flag", TType::Bool, 1).unwrap();
            p.write_bool(flag).unwrap();
            p.write_field_end().unwrap();
            p.write_field_begin("small", TType::Byte, 2).unwrap();
            p.write_byte(small).unwrap();
            p.write_field_end().unwrap();
            p.write_field_begin("medium", TType::I16, 3).unwrap();
            p.write_i16(medium).unwrap();
            p.write_field_end().unwrap();
            p.write_field_begin("word", TType::I32, 4).unwrap();
            p.write_i32(word).unwrap();
            p.write_field_end().unwrap();
            p.write_field_begin("wide", TType::I64, 5).unwrap();
            p.write_i64(wide).unwrap();
            p.write_field_end().unwrap();
            p.write_field_begin("text", TType::String, 6).unwrap();
            p.write_string(&text).unwrap();
            p.write_field_end().unwrap();
            p.write_field_stop().unwrap();
            p.write_struct_end().unwrap();
            let wire = wire_of(p);

            let mut p = reader(&wire);
            p.read_struct_begin().unwrap();
            let mut ok = true;
            loop {
                let field = p.read_field_begin().unwrap();
                if field.is_stop() {
                    break;
                }
                ok &= match field.id {
                    1 => p.read_bool().unwrap() == flag,
                    2 => p.read_byte().unwrap() == small,
                    3 => p.read_i16().unwrap() == medium,
                    4 => p.read_i32().unwrap() == word,
                    5 => p.read_i64().unwrap() == wide,
                    6 => p.read_string().unwrap() == text,
                    _ => false,
                };
                p.read_field_end().unwrap();
            }
            p.read_struct_end().unwrap();
            ok
        }

        fn prop_skip_positions_cursor_like_full_read(values: Vec<i32>) -> bool {
            // A struct holding a list field, followed by a sentinel field;
            // skipping the list must land exactly on the sentinel.
            let mut p = writer();
            p.write_struct_begin("s").unwrap();
            p.write_field_begin("list", TType::List, 1).unwrap();
            p.write_list_begin(TType::I32, values.len()).unwrap();
            for v in &values {
                p.write_i32(*v).unwrap();
            }
            p.write_list_end().unwrap();
            p.write_field_end().unwrap();
            p.write_field_begin("sentinel", TType::I32, 2).unwrap();
            p.write_i32(424_242).unwrap();
            p.write_field_end().unwrap();
            p.write_field_stop().unwrap();
            p.write_struct_end().unwrap();
            let wire = wire_of(p);

            let mut p = reader(&wire);
            p.read_struct_begin().unwrap();
            let field = p.read_field_begin().unwrap();
            p.skip(field.field_type).unwrap();
            p.read_field_end().unwrap();
            let sentinel = p.read_field_begin().unwrap();
            let ok = sentinel.id == 2 && p.read_i32().unwrap() == 424_242;
            p.read_field_end().unwrap();
            p.read_field_begin().unwrap().is_stop() && ok
        }

        fn prop_message_envelope_round_trip(name: String, seq_id: i32) -> bool {
            // Method names come from IDL identifiers; keep the generator
            // within that alphabet.
            let name: String = name
                .chars()
                .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
                .collect();

            let mut p = writer();
            p.write_message_begin(&name, MessageKind::Oneway, seq_id).unwrap();
            p.write_struct_begin("args").unwrap();
            p.write_field_stop().unwrap();
            p.write_struct_end().unwrap();
            p.write_message_end().unwrap();
            let wire = wire_of(p);

            let mut p = reader(&wire);
            let header = p.read_message_begin().unwrap();
            header.name == name && header.kind == MessageKind::Oneway && header.seq_id == seq_id
        }
    }
}
