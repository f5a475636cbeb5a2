//! # weft-client
//!
//! Blocking RPC client for the weft runtime.
//!
//! [`RpcClient`] owns an input/output protocol pair, allocates sequence ids,
//! and handles the reply envelope: `EXCEPTION` bodies decode into
//! [`ApplicationError`]s, and replies with the wrong sequence id or method
//! name are rejected before any result bytes are read. Generated service
//! clients drive it with closures that write the argument struct and read
//! the result struct.

use weft_protocol::{
    ApplicationError, ApplicationErrorKind, Error, JsonProtocol, MessageKind, Protocol,
};
use weft_transport::{FramedTransport, TcpTransport, Transport, TransportConfig};

/// A blocking RPC client over one connection.
pub struct RpcClient {
    input: Box<dyn Protocol>,
    output: Box<dyn Protocol>,
    seq_id: i32,
}

impl RpcClient {
    pub fn new(input: Box<dyn Protocol>, output: Box<dyn Protocol>) -> Self {
        Self {
            input,
            output,
            seq_id: 0,
        }
    }

    /// Connects a framed JSON stack over TCP, the default wire pairing.
    pub fn connect_framed_json(host: &str, port: u16) -> Result<RpcClient, Error> {
        Self::connect_framed_json_with_config(host, port, TransportConfig::default())
    }

    pub fn connect_framed_json_with_config(
        host: &str,
        port: u16,
        config: TransportConfig,
    ) -> Result<RpcClient, Error> {
        let mut socket = TcpTransport::with_config(host, port, config);
        socket.open()?;
        let write_half = socket.try_clone()?;
        let input = JsonProtocol::new(FramedTransport::new(socket));
        let output = JsonProtocol::new(FramedTransport::new(write_half));
        tracing::debug!("connected to {}:{}", host, port);
        Ok(RpcClient::new(Box::new(input), Box::new(output)))
    }

    fn next_seq_id(&mut self) -> i32 {
        self.seq_id = self.seq_id.wrapping_add(1);
        self.seq_id
    }

    /// Performs one call: writes the envelope and arguments, flushes, then
    /// reads and validates the reply envelope before handing the body to
    /// `read_result`.
    pub fn call<A, R>(&mut self, name: &str, write_args: A, read_result: R) -> Result<R::Output, Error>
    where
        A: FnOnce(&mut dyn Protocol) -> Result<(), Error>,
        R: ResultReader,
    {
        let seq_id = self.next_seq_id();
        self.output
            .write_message_begin(name, MessageKind::Call, seq_id)?;
        write_args(self.output.as_mut())?;
        self.output.write_message_end()?;
        self.output.flush()?;
        self.receive(name, seq_id, read_result)
    }

    /// Sends a `ONEWAY` message; no reply is read.
    pub fn send_oneway<A>(&mut self, name: &str, write_args: A) -> Result<(), Error>
    where
        A: FnOnce(&mut dyn Protocol) -> Result<(), Error>,
    {
        let seq_id = self.next_seq_id();
        self.output
            .write_message_begin(name, MessageKind::Oneway, seq_id)?;
        write_args(self.output.as_mut())?;
        self.output.write_message_end()?;
        self.output.flush()
    }

    fn receive<R>(&mut self, name: &str, seq_id: i32, read_result: R) -> Result<R::Output, Error>
    where
        R: ResultReader,
    {
        let header = self.input.read_message_begin()?;

        if header.kind == MessageKind::Exception {
            let error = ApplicationError::read_from(self.input.as_mut())?;
            self.input.read_message_end()?;
            return Err(error.into());
        }
        if header.kind != MessageKind::Reply {
            return Err(ApplicationError::new(
                ApplicationErrorKind::InvalidMessageType,
                format!("expected reply, got {} message", header.kind),
            )
            .into());
        }
        if header.seq_id != seq_id {
            return Err(ApplicationError::new(
                ApplicationErrorKind::BadSequenceId,
                format!(
                    "reply sequence id {} does not match request {}",
                    header.seq_id, seq_id
                ),
            )
            .into());
        }
        if header.name != name {
            return Err(ApplicationError::new(
                ApplicationErrorKind::WrongMethodName,
                format!("reply names method '{}', expected '{}'", header.name, name),
            )
            .into());
        }

        let result = read_result.read(self.input.as_mut())?;
        self.input.read_message_end()?;
        Ok(result)
    }
}

/// Reads a call's result struct off the input protocol.
pub trait ResultReader {
    type Output;

    fn read(self, input: &mut dyn Protocol) -> Result<Self::Output, Error>;
}

impl<F, O> ResultReader for F
where
    F: FnOnce(&mut dyn Protocol) -> Result<O, Error>,
{
    type Output = O;

    fn read(self, input: &mut dyn Protocol) -> Result<O, Error> {
        self(input)
    }
}
