//! Write-only "simple" JSON encoding.
//!
//! Drops the per-field type tags and field ids of the wire encoding in
//! favor of human readability: structs become `{ fieldName: value, ... }`,
//! lists and sets become plain arrays, maps become objects with stringified
//! scalar keys. The output is not self-describing, so it cannot be read
//! back; every read method fails with a not-implemented error.

use crate::error::{Error, ProtocolError, ProtocolErrorKind};
use crate::json::quote_json_bytes;
use crate::protocol::{
    FieldHeader, ListHeader, MapHeader, MessageHeader, Protocol, ProtocolFactory, SetHeader,
};
use crate::ttype::{MessageKind, TType};
use weft_transport::Transport;

/// Separator and quoting state for one level of nesting.
#[derive(Debug, Clone, Copy)]
enum SimpleContext {
    Base,
    /// Array body.
    List { first: bool },
    /// Struct body; keys are field names, so values never force quoting.
    Struct { first: bool, colon: bool },
    /// Map body; keys must be scalars and are emitted as strings.
    Map { first: bool, colon: bool },
}

impl SimpleContext {
    fn advance(&mut self) -> Option<u8> {
        match self {
            SimpleContext::Base => None,
            SimpleContext::List { first } => {
                if *first {
                    *first = false;
                    None
                } else {
                    Some(b',')
                }
            }
            SimpleContext::Struct { first, colon } | SimpleContext::Map { first, colon } => {
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

    /// Map keys are stringified; struct keys are already strings.
    fn escape_num(&self) -> bool {
        matches!(self, SimpleContext::Map { colon: true, .. })
    }
}

/// The write-only simple JSON protocol.
pub struct SimpleJsonProtocol<T: Transport> {
    trans: T,
    write_stack: Vec<SimpleContext>,
}

impl<T: Transport> SimpleJsonProtocol<T> {
    pub fn new(trans: T) -> Self {
        Self {
            trans,
            write_stack: vec![SimpleContext::Base],
        }
    }

    pub fn into_inner(self) -> T {
        self.trans
    }

    pub fn inner(&self) -> &T {
        &self.trans
    }

    fn write_separator(&mut self) -> Result<(), Error> {
        let sep = self
            .write_stack
            .last_mut()
            .map(SimpleContext::advance)
            .unwrap_or(None);
        if let Some(sep) = sep {
            self.trans.write(&[sep])?;
        }
        Ok(())
    }

    fn escapes(&self) -> bool {
        self.write_stack
            .last()
            .map(SimpleContext::escape_num)
            .unwrap_or(false)
    }

    fn pop_context(&mut self) -> Result<(), Error> {
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

    fn write_literal(&mut self, literal: &str) -> Result<(), Error> {
        self.write_separator()?;
        if self.escapes() {
            self.trans.write(b"\"")?;
            self.trans.write(literal.as_bytes())?;
            self.trans.write(b"\"")?;
        } else {
            self.trans.write(literal.as_bytes())?;
        }
        Ok(())
    }

    fn not_implemented<R>(what: &str) -> Result<R, Error> {
        Err(ProtocolError::new(
            ProtocolErrorKind::NotImplemented,
            format!("SimpleJSON protocol is write-only: {} is not implemented", what),
        )
        .into())
    }
}

impl<T: Transport> Protocol for SimpleJsonProtocol<T> {
    fn write_message_begin(
        &mut self,
        _name: &str,
        _kind: MessageKind,
        _seq_id: i32,
    ) -> Result<(), Error> {
        self.write_stack.clear();
        self.write_stack.push(SimpleContext::Base);
        Ok(())
    }

    fn write_message_end(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn write_struct_begin(&mut self, _name: &str) -> Result<(), Error> {
        self.write_separator()?;
        self.trans.write(b"{")?;
        self.write_stack.push(SimpleContext::Struct {
            first: true,
            colon: false,
        });
        Ok(())
    }

    fn write_struct_end(&mut self) -> Result<(), Error> {
        self.pop_context()?;
        self.trans.write(b"}")?;
        Ok(())
    }

    fn write_field_begin(&mut self, name: &str, _field_type: TType, _id: i16) -> Result<(), Error> {
        self.write_string(name)
    }

    fn write_field_end(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn write_field_stop(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn write_map_begin(
        &mut self,
        key_type: TType,
        _value_type: TType,
        _size: usize,
    ) -> Result<(), Error> {
        if key_type.is_container() {
            return Err(ProtocolError::new(
                ProtocolErrorKind::InvalidData,
                format!("map keys of type {} are not supported", key_type),
            )
            .into());
        }
        self.write_separator()?;
        self.trans.write(b"{")?;
        self.write_stack.push(SimpleContext::Map {
            first: true,
            colon: false,
        });
        Ok(())
    }

    fn write_map_end(&mut self) -> Result<(), Error> {
        self.pop_context()?;
        self.trans.write(b"}")?;
        Ok(())
    }

    fn write_list_begin(&mut self, _element_type: TType, _size: usize) -> Result<(), Error> {
        self.write_separator()?;
        self.trans.write(b"[")?;
        self.write_stack.push(SimpleContext::List { first: true });
        Ok(())
    }

    fn write_list_end(&mut self) -> Result<(), Error> {
        self.pop_context()?;
        self.trans.write(b"]")?;
        Ok(())
    }

    fn write_set_begin(&mut self, element_type: TType, size: usize) -> Result<(), Error> {
        self.write_list_begin(element_type, size)
    }

    fn write_set_end(&mut self) -> Result<(), Error> {
        self.write_list_end()
    }

    fn write_bool(&mut self, value: bool) -> Result<(), Error> {
        self.write_literal(if value { "true" } else { "false" })
    }

    fn write_byte(&mut self, value: i8) -> Result<(), Error> {
        self.write_literal(&value.to_string())
    }

    fn write_i16(&mut self, value: i16) -> Result<(), Error> {
        self.write_literal(&value.to_string())
    }

    fn write_i32(&mut self, value: i32) -> Result<(), Error> {
        self.write_literal(&value.to_string())
    }

    fn write_i64(&mut self, value: i64) -> Result<(), Error> {
        self.write_literal(&value.to_string())
    }

    fn write_double(&mut self, value: f64) -> Result<(), Error> {
        if value.is_nan() {
            return self.write_json_raw(b"\"NaN\"");
        }
        if value.is_infinite() {
            return self.write_json_raw(if value.is_sign_positive() {
                &b"\"Infinity\""[..]
            } else {
                &b"\"-Infinity\""[..]
            });
        }
        self.write_literal(&format!("{:?}", value))
    }

    fn write_string(&mut self, value: &str) -> Result<(), Error> {
        self.write_separator()?;
        let quoted = quote_json_bytes(value.as_bytes());
        self.trans.write(&quoted)?;
        Ok(())
    }

    fn write_binary(&mut self, value: &[u8]) -> Result<(), Error> {
        // Lossy by design; this encoding is for human consumption.
        let text = String::from_utf8_lossy(value).into_owned();
        self.write_string(&text)
    }

    fn read_message_begin(&mut self) -> Result<MessageHeader, Error> {
        Self::not_implemented("read_message_begin")
    }

    fn read_message_end(&mut self) -> Result<(), Error> {
        Self::not_implemented("read_message_end")
    }

    fn read_struct_begin(&mut self) -> Result<(), Error> {
        Self::not_implemented("read_struct_begin")
    }

    fn read_struct_end(&mut self) -> Result<(), Error> {
        Self::not_implemented("read_struct_end")
    }

    fn read_field_begin(&mut self) -> Result<FieldHeader, Error> {
        Self::not_implemented("read_field_begin")
    }

    fn read_field_end(&mut self) -> Result<(), Error> {
        Self::not_implemented("read_field_end")
    }

    fn read_map_begin(&mut self) -> Result<MapHeader, Error> {
        Self::not_implemented("read_map_begin")
    }

    fn read_map_end(&mut self) -> Result<(), Error> {
        Self::not_implemented("read_map_end")
    }

    fn read_list_begin(&mut self) -> Result<ListHeader, Error> {
        Self::not_implemented("read_list_begin")
    }

    fn read_list_end(&mut self) -> Result<(), Error> {
        Self::not_implemented("read_list_end")
    }

    fn read_set_begin(&mut self) -> Result<SetHeader, Error> {
        Self::not_implemented("read_set_begin")
    }

    fn read_set_end(&mut self) -> Result<(), Error> {
        Self::not_implemented("read_set_end")
    }

    fn read_bool(&mut self) -> Result<bool, Error> {
        Self::not_implemented("read_bool")
    }

    fn read_byte(&mut self) -> Result<i8, Error> {
        Self::not_implemented("read_byte")
    }

    fn read_i16(&mut self) -> Result<i16, Error> {
        Self::not_implemented("read_i16")
    }

    fn read_i32(&mut self) -> Result<i32, Error> {
        Self::not_implemented("read_i32")
    }

    fn read_i64(&mut self) -> Result<i64, Error> {
        Self::not_implemented("read_i64")
    }

    fn read_double(&mut self) -> Result<f64, Error> {
        Self::not_implemented("read_double")
    }

    fn read_string(&mut self) -> Result<String, Error> {
        Self::not_implemented("read_string")
    }

    fn read_binary(&mut self) -> Result<Vec<u8>, Error> {
        Self::not_implemented("read_binary")
    }

    fn flush(&mut self) -> Result<(), Error> {
        self.trans.flush()?;
        Ok(())
    }
}

impl<T: Transport> SimpleJsonProtocol<T> {
    fn write_json_raw(&mut self, raw: &[u8]) -> Result<(), Error> {
        self.write_separator()?;
        self.trans.write(raw)?;
        Ok(())
    }
}

/// Builds [`SimpleJsonProtocol`]s per connection.
#[derive(Debug, Default)]
pub struct SimpleJsonProtocolFactory;

impl ProtocolFactory for SimpleJsonProtocolFactory {
    fn create(&self, transport: Box<dyn Transport>) -> Box<dyn Protocol> {
        Box::new(SimpleJsonProtocol::new(transport))
    }
}
