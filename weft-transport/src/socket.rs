//! TCP transports.

use crate::config::{ReadBudget, TransportConfig};
use crate::error::{TransportError, TransportErrorKind};
use crate::transport::Transport;
use bytes::Bytes;
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};

/// A blocking TCP transport.
#[derive(Debug)]
pub struct TcpTransport {
    addr: Option<String>,
    stream: Option<TcpStream>,
    config: TransportConfig,
    budget: ReadBudget,
}

impl TcpTransport {
    /// Creates an unopened transport for `host:port`.
    pub fn new(host: &str, port: u16) -> Self {
        Self::with_config(host, port, TransportConfig::default())
    }

    pub fn with_config(host: &str, port: u16, config: TransportConfig) -> Self {
        let budget = ReadBudget::new(config.max_message_size);
        Self {
            addr: Some(format!("{}:{}", host, port)),
            stream: None,
            config,
            budget,
        }
    }

    /// Wraps an already-connected stream, e.g. an accepted connection.
    pub fn from_stream(stream: TcpStream, config: TransportConfig) -> Result<Self, TransportError> {
        stream.set_read_timeout(config.recv_timeout)?;
        stream.set_write_timeout(config.send_timeout)?;
        let budget = ReadBudget::new(config.max_message_size);
        Ok(Self {
            addr: None,
            stream: Some(stream),
            config,
            budget,
        })
    }

    /// Clones the underlying stream so input and output stacks can be built
    /// over the same connection.
    pub fn try_clone(&self) -> Result<Self, TransportError> {
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| {
                TransportError::new(TransportErrorKind::NotOpen, "transport is not open")
            })?
            .try_clone()?;
        Ok(Self {
            addr: self.addr.clone(),
            stream: Some(stream),
            config: self.config.clone(),
            budget: ReadBudget::new(self.config.max_message_size),
        })
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.as_ref().and_then(|s| s.peer_addr().ok())
    }

    fn stream_mut(&mut self) -> Result<&mut TcpStream, TransportError> {
        self.stream.as_mut().ok_or_else(|| {
            TransportError::new(TransportErrorKind::NotOpen, "transport is not open")
        })
    }
}

impl Transport for TcpTransport {
    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn open(&mut self) -> Result<(), TransportError> {
        if self.stream.is_some() {
            return Err(TransportError::new(
                TransportErrorKind::AlreadyOpen,
                "transport is already open",
            ));
        }
        let addr = self.addr.clone().ok_or_else(|| {
            TransportError::new(TransportErrorKind::NotOpen, "no address to connect to")
        })?;
        let target = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                TransportError::new(
                    TransportErrorKind::NotOpen,
                    format!("could not resolve {}", addr),
                )
            })?;
        let stream = TcpStream::connect(target)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(self.config.recv_timeout)?;
        stream.set_write_timeout(self.config.send_timeout)?;
        self.budget.reset();
        self.stream = Some(stream);
        tracing::debug!("connected to {}", addr);
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        Ok(())
    }

    fn read(&mut self, max_len: usize) -> Result<Bytes, TransportError> {
        if max_len == 0 {
            return Ok(Bytes::new());
        }
        let stream = self.stream_mut()?;
        let mut buf = vec![0u8; max_len];
        let n = stream.read(&mut buf).map_err(|e| {
            if matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            ) {
                TransportError::new(TransportErrorKind::TimedOut, "read timed out")
            } else {
                TransportError::from(e)
            }
        })?;
        buf.truncate(n);
        self.budget.consume(n)?;
        Ok(Bytes::from(buf))
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let stream = self.stream_mut()?;
        stream.write_all(data).map_err(|e| {
            if matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            ) {
                TransportError::new(TransportErrorKind::TimedOut, "write timed out")
            } else {
                TransportError::from(e)
            }
        })
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        self.stream_mut()?.flush()?;
        Ok(())
    }

    fn config(&self) -> &TransportConfig {
        &self.config
    }

    fn check_read_budget(&self, declared: usize) -> Result<(), TransportError> {
        self.budget.check_declared(declared)
    }

    fn reset_read_budget(&mut self) {
        self.budget.reset();
    }
}

/// A listening TCP socket that yields accepted [`TcpTransport`]s.
#[derive(Debug)]
pub struct TcpServerTransport {
    bind_addr: String,
    listener: Option<TcpListener>,
    config: TransportConfig,
}

impl TcpServerTransport {
    pub fn new(bind_addr: impl Into<String>) -> Self {
        Self::with_config(bind_addr, TransportConfig::default())
    }

    pub fn with_config(bind_addr: impl Into<String>, config: TransportConfig) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            listener: None,
            config,
        }
    }

    /// Binds the listening socket.
    pub fn listen(&mut self) -> Result<(), TransportError> {
        if self.listener.is_some() {
            return Err(TransportError::new(
                TransportErrorKind::AlreadyOpen,
                "server transport is already listening",
            ));
        }
        let listener = TcpListener::bind(&self.bind_addr)?;
        tracing::info!("listening on {}", listener.local_addr()?);
        self.listener = Some(listener);
        Ok(())
    }

    /// Blocks until a client connects.
    pub fn accept(&mut self) -> Result<TcpTransport, TransportError> {
        let listener = self.listener.as_ref().ok_or_else(|| {
            TransportError::new(TransportErrorKind::NotOpen, "server transport is not listening")
        })?;
        let (stream, addr) = listener.accept()?;
        stream.set_nodelay(true)?;
        tracing::debug!("accepted connection from {}", addr);
        TcpTransport::from_stream(stream, self.config.clone())
    }

    /// The bound address, useful when listening on port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    pub fn close(&mut self) -> Result<(), TransportError> {
        self.listener = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_connect_read_write() {
        let mut server = TcpServerTransport::new("127.0.0.1:0");
        server.listen().unwrap();
        let addr = server.local_addr().unwrap();

        let echo = thread::spawn(move || {
            let mut conn = server.accept().unwrap();
            let data = conn.read_all(5).unwrap();
            conn.write(&data).unwrap();
            conn.flush().unwrap();
        });

        let mut client = TcpTransport::new("127.0.0.1", addr.port());
        client.open().unwrap();
        client.write(b"hello").unwrap();
        client.flush().unwrap();
        assert_eq!(&client.read_all(5).unwrap()[..], b"hello");
        client.close().unwrap();
        echo.join().unwrap();
    }

    #[test]
    fn test_open_twice_fails() {
        let mut server = TcpServerTransport::new("127.0.0.1:0");
        server.listen().unwrap();
        let addr = server.local_addr().unwrap();

        let accept = thread::spawn(move || {
            let _conn = server.accept().unwrap();
        });

        let mut client = TcpTransport::new("127.0.0.1", addr.port());
        client.open().unwrap();
        let err = client.open().unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::AlreadyOpen);
        client.close().unwrap();
        accept.join().unwrap();
    }

    #[test]
    fn test_unopened_io_fails_not_open() {
        let mut client = TcpTransport::new("127.0.0.1", 1);
        let err = client.read(1).unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::NotOpen);
        let err = client.write(b"x").unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::NotOpen);
    }

    #[test]
    fn test_recv_timeout_surfaces_timed_out() {
        let mut server = TcpServerTransport::new("127.0.0.1:0");
        server.listen().unwrap();
        let addr = server.local_addr().unwrap();

        let hold = thread::spawn(move || {
            let conn = server.accept().unwrap();
            // Hold the connection open without writing.
            thread::sleep(std::time::Duration::from_millis(200));
            drop(conn);
        });

        let config =
            TransportConfig::default().with_recv_timeout(TransportConfig::timeout_parts(0, 50_000));
        let mut client = TcpTransport::with_config("127.0.0.1", addr.port(), config);
        client.open().unwrap();
        let err = client.read(1).unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::TimedOut);
        hold.join().unwrap();
    }
}
