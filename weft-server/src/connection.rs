//! Per-connection plumbing shared by the servers.

use crate::error::ServerError;
use crate::processor::Processor;
use weft_protocol::{Error, Protocol, ProtocolFactory};
use weft_transport::{TcpTransport, TransportErrorKind, TransportFactory};

/// Builds the input/output protocol pair for an accepted connection.
///
/// The raw connection is cloned so the input and output stacks own
/// independent handles to the same socket.
pub(crate) fn build_protocols(
    client: TcpTransport,
    input_transports: &dyn TransportFactory,
    output_transports: &dyn TransportFactory,
    input_protocols: &dyn ProtocolFactory,
    output_protocols: &dyn ProtocolFactory,
) -> Result<(Box<dyn Protocol>, Box<dyn Protocol>), ServerError> {
    let write_half = client.try_clone()?;
    let input = input_transports.create(Box::new(client));
    let output = output_transports.create(Box::new(write_half));
    Ok((input_protocols.create(input), output_protocols.create(output)))
}

/// Runs the per-connection message loop until the processor stops, the
/// client disconnects, or the connection errors.
pub(crate) fn run_connection(
    processor: &dyn Processor,
    input: &mut dyn Protocol,
    output: &mut dyn Protocol,
) {
    loop {
        match processor.process(input, output) {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!("processor ended the connection");
                return;
            }
            Err(Error::Transport(e)) if e.kind == TransportErrorKind::EndOfFile => {
                tracing::debug!("client disconnected");
                return;
            }
            Err(Error::Transport(e)) => {
                tracing::warn!("connection transport error: {}", e);
                return;
            }
            Err(e) => {
                // Protocol state is unrecoverable once a message is
                // malformed; close this connection, keep the server up.
                tracing::warn!("connection aborted: {}", e);
                return;
            }
        }
    }
}
