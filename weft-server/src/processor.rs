//! The processor contract and standard error replies.

use weft_protocol::{
    ApplicationError, ApplicationErrorKind, Error, MessageKind, Protocol, TType,
};

/// Reads one message from the input protocol, dispatches it, and writes the
/// reply to the output protocol.
///
/// Implementations are provided by generated code. The return value reports
/// whether the connection should keep processing: `false` ends the
/// per-connection loop cleanly.
pub trait Processor: Send + Sync {
    fn process(
        &self,
        input: &mut dyn Protocol,
        output: &mut dyn Protocol,
    ) -> Result<bool, Error>;
}

/// Writes an `EXCEPTION` reply carrying `error` for the message named
/// `name` with sequence id `seq_id`.
pub fn reply_application_error(
    output: &mut dyn Protocol,
    name: &str,
    seq_id: i32,
    error: &ApplicationError,
) -> Result<(), Error> {
    output.write_message_begin(name, MessageKind::Exception, seq_id)?;
    error.write_to(output)?;
    output.write_message_end()?;
    output.flush()
}

/// Standard handling for a call whose method name is not known: drain the
/// argument struct, finish the message, and reply `UNKNOWN_METHOD`.
pub fn reply_unknown_method(
    input: &mut dyn Protocol,
    output: &mut dyn Protocol,
    name: &str,
    seq_id: i32,
) -> Result<(), Error> {
    input.skip(TType::Struct)?;
    input.read_message_end()?;
    let error = ApplicationError::new(
        ApplicationErrorKind::UnknownMethod,
        format!("Unknown method '{}'", name),
    );
    reply_application_error(output, name, seq_id, &error)
}
