//! Single-threaded accept-loop server.

use crate::connection::{build_protocols, run_connection};
use crate::error::ServerError;
use crate::processor::Processor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use weft_protocol::ProtocolFactory;
use weft_transport::{TcpServerTransport, TransportFactory};

/// Cooperative stop signal for a serving loop.
///
/// Stopping takes effect at the loop's next iteration; in-flight work runs
/// to completion.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Serves connections sequentially on the accepting thread.
///
/// One pair of input/output protocols is built per accepted connection and
/// reused for every message on it. Transport failures close the connection
/// and the loop keeps accepting.
pub struct SimpleServer<P: Processor> {
    server_transport: TcpServerTransport,
    processor: Arc<P>,
    input_transports: Box<dyn TransportFactory>,
    output_transports: Box<dyn TransportFactory>,
    input_protocols: Box<dyn ProtocolFactory>,
    output_protocols: Box<dyn ProtocolFactory>,
    stop: StopHandle,
}

impl<P: Processor> SimpleServer<P> {
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
        }
    }

    /// A handle that stops the accept loop at its next iteration.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Binds the listening transport. Separate from [`serve`](Self::serve)
    /// so callers can learn the bound address before serving.
    pub fn listen(&mut self) -> Result<(), ServerError> {
        self.server_transport.listen()?;
        Ok(())
    }

    /// The bound address once listening.
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.server_transport.local_addr()
    }

    /// Accepts and serves connections until stopped.
    pub fn serve(&mut self) -> Result<(), ServerError> {
        if self.server_transport.local_addr().is_none() {
            self.server_transport.listen()?;
        }

        while !self.stop.is_stopped() {
            let client = match self.server_transport.accept() {
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
            tracing::info!("client connected: {:?}", peer);

            match build_protocols(
                client,
                self.input_transports.as_ref(),
                self.output_transports.as_ref(),
                self.input_protocols.as_ref(),
                self.output_protocols.as_ref(),
            ) {
                Ok((mut input, mut output)) => {
                    run_connection(self.processor.as_ref(), input.as_mut(), output.as_mut());
                    tracing::info!("client disconnected: {:?}", peer);
                }
                Err(e) => {
                    tracing::warn!("failed to build connection stack: {}", e);
                }
            }
        }

        self.server_transport.close()?;
        Ok(())
    }
}
