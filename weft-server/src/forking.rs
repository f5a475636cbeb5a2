//! Process-per-connection server.

use crate::connection::{build_protocols, run_connection};
use crate::error::ServerError;
use crate::processor::Processor;
use crate::simple::StopHandle;
use std::sync::Arc;
use weft_protocol::ProtocolFactory;
use weft_transport::{TcpServerTransport, Transport, TransportFactory};

/// Forks one child process per accepted connection.
///
/// The child runs the connection loop to completion and exits; the parent
/// closes its copy of the connection immediately and reaps finished
/// children without blocking on each accept iteration. Child failures are
/// not propagated to the parent.
pub struct ForkingServer<P: Processor> {
    server_transport: TcpServerTransport,
    processor: Arc<P>,
    input_transports: Box<dyn TransportFactory>,
    output_transports: Box<dyn TransportFactory>,
    input_protocols: Box<dyn ProtocolFactory>,
    output_protocols: Box<dyn ProtocolFactory>,
    stop: StopHandle,
    children: Vec<libc::pid_t>,
}

impl<P: Processor> ForkingServer<P> {
    pub fn new(
        server_transport: TcpServerTransport,
        processor: P,
        input_transports: Box<dyn TransportFactory>,
        output_transports: Box<dyn TransportFactory>,
        input_protocols: Box<dyn ProtocolFactory>,
        output_protocols: Box<dyn ProtocolFactory>,
    ) -> Self {
        Self {
            server_transport,
            processor: Arc::new(processor),
            input_transports,
            output_transports,
            input_protocols,
            output_protocols,
            stop: StopHandle::default(),
            children: Vec::new(),
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn listen(&mut self) -> Result<(), ServerError> {
        self.server_transport.listen()?;
        Ok(())
    }

    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.server_transport.local_addr()
    }

    /// Accepts connections until stopped, forking per connection.
    pub fn serve(&mut self) -> Result<(), ServerError> {
        if self.server_transport.local_addr().is_none() {
            self.server_transport.listen()?;
        }

        while !self.stop.is_stopped() {
            self.reap_children();

            let mut client = match self.server_transport.accept() {
                Ok(client) => client,
                Err(e) => {
                    if self.stop.is_stopped() {
                        break;
                    }
                    tracing::error!("accept failed: {}", e);
                    continue;
                }
            };
            let peer = client.peer_addr();

            match unsafe { libc::fork() } {
                -1 => {
                    let err = std::io::Error::last_os_error();
                    tracing::error!("fork failed: {}", err);
                    let _ = client.close();
                }
                0 => {
                    // Child: serve this connection, then exit without
                    // unwinding through the parent's state.
                    let status = match build_protocols(
                        client,
                        self.input_transports.as_ref(),
                        self.output_transports.as_ref(),
                        self.input_protocols.as_ref(),
                        self.output_protocols.as_ref(),
                    ) {
                        Ok((mut input, mut output)) => {
                            run_connection(
                                self.processor.as_ref(),
                                input.as_mut(),
                                output.as_mut(),
                            );
                            0
                        }
                        Err(_) => 1,
                    };
                    unsafe { libc::_exit(status) };
                }
                pid => {
                    tracing::info!("forked child {} for {:?}", pid, peer);
                    self.children.push(pid);
                    // Parent: release its handle on the connection.
                    let _ = client.close();
                }
            }
        }

        self.server_transport.close()?;
        self.reap_children();
        Ok(())
    }

    /// Number of children not yet reaped.
    pub fn active_children(&self) -> usize {
        self.children.len()
    }

    fn reap_children(&mut self) {
        self.children.retain(|&pid| {
            let mut status = 0;
            match unsafe { libc::waitpid(pid, &mut status, libc::WNOHANG) } {
                0 => true, // still running
                _ => false,
            }
        });
    }
}
