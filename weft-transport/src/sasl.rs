//! SASL-wrapped transport.
//!
//! Negotiation frames are `status(u8) || length(i32 be) || payload`. After a
//! successful negotiation the transport carries data frames of
//! `length(i32 be) || payload`; when the mechanism negotiated integrity or
//! confidentiality every payload passes through the mechanism's
//! `wrap`/`unwrap`.

use crate::config::TransportConfig;
use crate::error::{TransportError, TransportErrorKind};
use crate::transport::Transport;
use bytes::{Bytes, BytesMut};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Negotiation frame statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaslStatus {
    Start,
    Ok,
    Bad,
    Error,
    Complete,
}

impl SaslStatus {
    pub fn code(self) -> u8 {
        match self {
            SaslStatus::Start => 1,
            SaslStatus::Ok => 2,
            SaslStatus::Bad => 3,
            SaslStatus::Error => 4,
            SaslStatus::Complete => 5,
        }
    }

    pub fn from_code(code: i8) -> Option<Self> {
        match code {
            1 => Some(SaslStatus::Start),
            2 => Some(SaslStatus::Ok),
            3 => Some(SaslStatus::Bad),
            4 => Some(SaslStatus::Error),
            5 => Some(SaslStatus::Complete),
            _ => None,
        }
    }
}

/// Quality of protection negotiated by a mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qop {
    /// Authentication only; payloads pass through untouched.
    Auth,
    /// Integrity protection; payloads are wrapped.
    AuthInt,
    /// Confidentiality protection; payloads are wrapped.
    AuthConf,
}

impl Qop {
    pub fn wraps(self) -> bool {
        !matches!(self, Qop::Auth)
    }
}

/// One side of a SASL mechanism.
///
/// `evaluate` consumes the peer's challenge or response (empty on the
/// client's first turn) and produces the bytes to send back. Once
/// `is_complete` reports true, `qop` determines whether data payloads go
/// through `wrap`/`unwrap`.
pub trait SaslMechanism: Send {
    fn name(&self) -> &str;

    fn evaluate(&mut self, input: &[u8]) -> Result<Vec<u8>, TransportError>;

    fn is_complete(&self) -> bool;

    fn qop(&self) -> Qop {
        Qop::Auth
    }

    fn wrap(&mut self, data: &[u8]) -> Result<Vec<u8>, TransportError> {
        let _ = data;
        Err(TransportError::new(
            TransportErrorKind::Unknown,
            format!("mechanism {} does not support wrapping", self.name()),
        ))
    }

    fn unwrap(&mut self, data: &[u8]) -> Result<Vec<u8>, TransportError> {
        let _ = data;
        Err(TransportError::new(
            TransportErrorKind::Unknown,
            format!("mechanism {} does not support unwrapping", self.name()),
        ))
    }
}

/// Which side of the negotiation this transport plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaslRole {
    Client,
    Server,
}

/// Wraps a transport with SASL negotiation and optional per-frame
/// protection.
pub struct SaslTransport<T: Transport> {
    inner: T,
    mechanism: Box<dyn SaslMechanism>,
    role: SaslRole,
    read_buf: BytesMut,
    write_buf: BytesMut,
    negotiated: bool,
    wraps: bool,
}

impl<T: Transport> SaslTransport<T> {
    pub fn new(inner: T, mechanism: Box<dyn SaslMechanism>, role: SaslRole) -> Self {
        Self {
            inner,
            mechanism,
            role,
            read_buf: BytesMut::new(),
            write_buf: BytesMut::new(),
            negotiated: false,
            wraps: false,
        }
    }

    pub fn client(inner: T, mechanism: Box<dyn SaslMechanism>) -> Self {
        Self::new(inner, mechanism, SaslRole::Client)
    }

    pub fn server(inner: T, mechanism: Box<dyn SaslMechanism>) -> Self {
        Self::new(inner, mechanism, SaslRole::Server)
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    fn send_message(&mut self, status: SaslStatus, payload: &[u8]) -> Result<(), TransportError> {
        let mut frame = BytesMut::with_capacity(5 + payload.len());
        frame.extend_from_slice(&[status.code()]);
        frame.extend_from_slice(&(payload.len() as i32).to_be_bytes());
        frame.extend_from_slice(payload);
        self.inner.write(&frame)?;
        self.inner.flush()
    }

    fn receive_message(&mut self) -> Result<(SaslStatus, Bytes), TransportError> {
        let header = self.inner.read_all(5)?;
        let status_byte = header[0] as i8;
        let status = SaslStatus::from_code(status_byte).ok_or_else(|| {
            TransportError::new(
                TransportErrorKind::CorruptedData,
                format!("Invalid status {}", status_byte),
            )
        })?;
        let len = i32::from_be_bytes([header[1], header[2], header[3], header[4]]);
        let payload = self.read_sized_payload(len)?;
        Ok((status, payload))
    }

    fn read_sized_payload(&mut self, len: i32) -> Result<Bytes, TransportError> {
        if len < 0 || len as usize > self.inner.config().max_frame_size {
            return Err(TransportError::new(
                TransportErrorKind::SizeLimit,
                format!("Invalid payload header length: {}", len),
            ));
        }
        self.inner.check_read_budget(len as usize)?;
        self.inner.read_all(len as usize)
    }

    fn negotiate_client(&mut self) -> Result<(), TransportError> {
        let name = self.mechanism.name().to_owned();
        tracing::debug!("starting SASL negotiation, mechanism {}", name);
        self.send_message(SaslStatus::Start, name.as_bytes())?;

        let initial = self.mechanism.evaluate(&[])?;
        self.send_message(SaslStatus::Ok, &initial)?;

        loop {
            let (status, payload) = self.receive_message()?;
            match status {
                SaslStatus::Ok => {
                    let response = self.mechanism.evaluate(&payload)?;
                    self.send_message(SaslStatus::Ok, &response)?;
                }
                SaslStatus::Complete => {
                    if !payload.is_empty() {
                        self.mechanism.evaluate(&payload)?;
                    }
                    if !self.mechanism.is_complete() {
                        return Err(TransportError::new(
                            TransportErrorKind::CorruptedData,
                            "peer reported completion before the mechanism completed",
                        ));
                    }
                    return Ok(());
                }
                SaslStatus::Bad | SaslStatus::Error => {
                    return Err(TransportError::new(
                        TransportErrorKind::CorruptedData,
                        format!(
                            "peer indicated failure: {}",
                            String::from_utf8_lossy(&payload)
                        ),
                    ));
                }
                SaslStatus::Start => {
                    return Err(TransportError::new(
                        TransportErrorKind::CorruptedData,
                        format!("Invalid negotiation status {}", status.code()),
                    ));
                }
            }
        }
    }

    fn negotiate_server(&mut self) -> Result<(), TransportError> {
        let (status, payload) = self.receive_message()?;
        if status != SaslStatus::Start {
            return Err(TransportError::new(
                TransportErrorKind::CorruptedData,
                format!("Invalid negotiation status {}", status.code()),
            ));
        }
        let requested = String::from_utf8_lossy(&payload).into_owned();
        if requested != self.mechanism.name() {
            let message = format!("Unsupported mechanism {}", requested);
            self.send_message(SaslStatus::Bad, message.as_bytes())?;
            return Err(TransportError::new(
                TransportErrorKind::CorruptedData,
                message,
            ));
        }
        tracing::debug!("negotiating SASL mechanism {}", requested);

        loop {
            let (status, payload) = self.receive_message()?;
            if status != SaslStatus::Ok {
                return Err(TransportError::new(
                    TransportErrorKind::CorruptedData,
                    format!("Invalid negotiation status {}", status.code()),
                ));
            }
            match self.mechanism.evaluate(&payload) {
                Ok(challenge) => {
                    if self.mechanism.is_complete() {
                        self.send_message(SaslStatus::Complete, &challenge)?;
                        return Ok(());
                    }
                    self.send_message(SaslStatus::Ok, &challenge)?;
                }
                Err(err) => {
                    self.send_message(SaslStatus::Bad, err.message.as_bytes())?;
                    return Err(err);
                }
            }
        }
    }

    fn read_data_frame(&mut self) -> Result<(), TransportError> {
        let header = self.inner.read_all(4)?;
        let len = i32::from_be_bytes([header[0], header[1], header[2], header[3]]);
        let payload = self.read_sized_payload(len)?;
        let data = if self.wraps {
            self.mechanism.unwrap(&payload)?
        } else {
            payload.to_vec()
        };
        self.read_buf.extend_from_slice(&data);
        Ok(())
    }
}

impl<T: Transport> Transport for SaslTransport<T> {
    fn is_open(&self) -> bool {
        self.negotiated && self.inner.is_open()
    }

    fn open(&mut self) -> Result<(), TransportError> {
        if self.negotiated {
            return Err(TransportError::new(
                TransportErrorKind::AlreadyOpen,
                "SASL transport is already open",
            ));
        }
        if !self.inner.is_open() {
            self.inner.open()?;
        }
        match self.role {
            SaslRole::Client => self.negotiate_client()?,
            SaslRole::Server => self.negotiate_server()?,
        }
        self.negotiated = true;
        self.wraps = self.mechanism.qop().wraps();
        tracing::debug!(
            "SASL negotiation complete, qop {:?}",
            self.mechanism.qop()
        );
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.negotiated = false;
        self.inner.close()
    }

    fn read(&mut self, max_len: usize) -> Result<Bytes, TransportError> {
        if max_len == 0 {
            return Ok(Bytes::new());
        }
        if !self.negotiated {
            return Err(TransportError::new(
                TransportErrorKind::NotOpen,
                "SASL negotiation has not completed",
            ));
        }
        if self.read_buf.is_empty() {
            self.read_data_frame()?;
        }
        let n = max_len.min(self.read_buf.len());
        Ok(self.read_buf.split_to(n).freeze())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if !self.negotiated {
            return Err(TransportError::new(
                TransportErrorKind::NotOpen,
                "SASL negotiation has not completed",
            ));
        }
        self.write_buf.extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        let payload = self.write_buf.split();
        let framed = if self.wraps {
            self.mechanism.wrap(&payload)?
        } else {
            payload.to_vec()
        };
        self.inner.write(&(framed.len() as i32).to_be_bytes())?;
        self.inner.write(&framed)?;
        self.inner.flush()
    }

    fn config(&self) -> &TransportConfig {
        self.inner.config()
    }

    fn check_read_budget(&self, declared: usize) -> Result<(), TransportError> {
        self.inner.check_read_budget(declared)
    }

    fn reset_read_budget(&mut self) {
        self.inner.reset_read_budget()
    }
}

/// Validates PLAIN credentials against `user -> sha256(password)` digests,
/// so plaintext passwords are never held by the server.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    digests: HashMap<String, String>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user with a plaintext password, storing only its digest.
    pub fn add_user(&mut self, username: impl Into<String>, password: &str) {
        self.digests
            .insert(username.into(), Self::digest(password));
    }

    /// Registers a user with a pre-computed lowercase hex digest.
    pub fn add_digest(&mut self, username: impl Into<String>, digest: impl Into<String>) {
        self.digests.insert(username.into(), digest.into());
    }

    pub fn validate(&self, username: &str, password: &str) -> bool {
        self.digests
            .get(username)
            .map(|expected| *expected == Self::digest(password))
            .unwrap_or(false)
    }

    fn digest(password: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(password.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Client side of the PLAIN mechanism (RFC 4616).
pub struct PlainClient {
    authzid: Option<String>,
    username: String,
    password: String,
    complete: bool,
}

impl PlainClient {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            authzid: None,
            username: username.into(),
            password: password.into(),
            complete: false,
        }
    }

    pub fn with_authzid(mut self, authzid: impl Into<String>) -> Self {
        self.authzid = Some(authzid.into());
        self
    }
}

impl SaslMechanism for PlainClient {
    fn name(&self) -> &str {
        "PLAIN"
    }

    fn evaluate(&mut self, _input: &[u8]) -> Result<Vec<u8>, TransportError> {
        if self.complete {
            return Ok(Vec::new());
        }
        if self.username.contains('\0') || self.password.contains('\0') {
            return Err(TransportError::new(
                TransportErrorKind::CorruptedData,
                "PLAIN credentials must not contain NUL",
            ));
        }
        let mut response = Vec::new();
        if let Some(authzid) = &self.authzid {
            response.extend_from_slice(authzid.as_bytes());
        }
        response.push(0);
        response.extend_from_slice(self.username.as_bytes());
        response.push(0);
        response.extend_from_slice(self.password.as_bytes());
        self.complete = true;
        Ok(response)
    }

    fn is_complete(&self) -> bool {
        self.complete
    }
}

/// Server side of the PLAIN mechanism.
pub struct PlainServer {
    store: CredentialStore,
    authorized: Option<String>,
}

impl PlainServer {
    pub fn new(store: CredentialStore) -> Self {
        Self {
            store,
            authorized: None,
        }
    }

    /// The username that authenticated, once complete.
    pub fn authorized_user(&self) -> Option<&str> {
        self.authorized.as_deref()
    }
}

impl SaslMechanism for PlainServer {
    fn name(&self) -> &str {
        "PLAIN"
    }

    fn evaluate(&mut self, input: &[u8]) -> Result<Vec<u8>, TransportError> {
        if self.authorized.is_some() {
            return Ok(Vec::new());
        }
        let mut parts = input.split(|&b| b == 0);
        let (_authzid, username, password) = match (parts.next(), parts.next(), parts.next()) {
            (Some(a), Some(u), Some(p)) if parts.next().is_none() => (a, u, p),
            _ => {
                return Err(TransportError::new(
                    TransportErrorKind::CorruptedData,
                    "malformed PLAIN response",
                ));
            }
        };
        let username = String::from_utf8_lossy(username).into_owned();
        let password = String::from_utf8_lossy(password).into_owned();
        if !self.store.validate(&username, &password) {
            return Err(TransportError::new(
                TransportErrorKind::CorruptedData,
                "PLAIN authentication failed",
            ));
        }
        self.authorized = Some(username);
        Ok(Vec::new())
    }

    fn is_complete(&self) -> bool {
        self.authorized.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::MemoryBuffer;
    use crate::pipe::Pipe;
    use std::thread;

    fn store() -> CredentialStore {
        let mut store = CredentialStore::new();
        store.add_user("alice", "wonderland");
        store
    }

    #[test]
    fn test_credential_store() {
        let store = store();
        assert!(store.validate("alice", "wonderland"));
        assert!(!store.validate("alice", "looking-glass"));
        assert!(!store.validate("bob", "wonderland"));
    }

    #[test]
    fn test_plain_negotiation_over_pipe() {
        let (client_end, server_end) = Pipe::pair();

        let server = thread::spawn(move || {
            let mut trans =
                SaslTransport::server(server_end, Box::new(PlainServer::new(store())));
            trans.open().unwrap();
            let got = trans.read_all(5).unwrap();
            assert_eq!(&got[..], b"hello");
            trans.write(b"world").unwrap();
            trans.flush().unwrap();
        });

        let mut trans = SaslTransport::client(
            client_end,
            Box::new(PlainClient::new("alice", "wonderland")),
        );
        trans.open().unwrap();
        assert!(trans.is_open());
        trans.write(b"hello").unwrap();
        trans.flush().unwrap();
        assert_eq!(&trans.read_all(5).unwrap()[..], b"world");
        server.join().unwrap();
    }

    #[test]
    fn test_plain_bad_password_rejected() {
        let (client_end, server_end) = Pipe::pair();

        let server = thread::spawn(move || {
            let mut trans =
                SaslTransport::server(server_end, Box::new(PlainServer::new(store())));
            trans.open().unwrap_err()
        });

        let mut trans = SaslTransport::client(
            client_end,
            Box::new(PlainClient::new("alice", "wrong")),
        );
        let client_err = trans.open().unwrap_err();
        assert!(client_err.message.contains("peer indicated failure"));

        let server_err = server.join().unwrap();
        assert!(server_err.message.contains("authentication failed"));
    }

    #[test]
    fn test_invalid_status_byte() {
        let mut wire = MemoryBuffer::new();
        wire.write(&[0xFF, 0x00, 0x00, 0x00, 0x05]).unwrap();

        let mut trans = SaslTransport::server(wire, Box::new(PlainServer::new(store())));
        let err = trans.open().unwrap_err();
        assert_eq!(err.message, "Invalid status -1");
    }

    #[test]
    fn test_negative_payload_length() {
        let mut wire = MemoryBuffer::new();
        wire.write(&[0x01, 0xFF, 0xFF, 0xFF, 0xFF]).unwrap();

        let mut trans = SaslTransport::server(wire, Box::new(PlainServer::new(store())));
        let err = trans.open().unwrap_err();
        assert_eq!(err.message, "Invalid payload header length: -1");
    }

    #[test]
    fn test_oversized_payload_length() {
        let mut wire = MemoryBuffer::new();
        wire.write(&[0x01, 0x64, 0x00, 0x00, 0x00]).unwrap();

        let mut trans = SaslTransport::server(wire, Box::new(PlainServer::new(store())));
        let err = trans.open().unwrap_err();
        assert_eq!(err.message, "Invalid payload header length: 1677721600");
    }

    /// Toy integrity mechanism: completes immediately and wraps payloads by
    /// rotating every byte.
    struct RotMechanism {
        complete: bool,
    }

    impl SaslMechanism for RotMechanism {
        fn name(&self) -> &str {
            "ROT"
        }

        fn evaluate(&mut self, _input: &[u8]) -> Result<Vec<u8>, TransportError> {
            self.complete = true;
            Ok(Vec::new())
        }

        fn is_complete(&self) -> bool {
            self.complete
        }

        fn qop(&self) -> Qop {
            Qop::AuthInt
        }

        fn wrap(&mut self, data: &[u8]) -> Result<Vec<u8>, TransportError> {
            Ok(data.iter().map(|b| b.wrapping_add(1)).collect())
        }

        fn unwrap(&mut self, data: &[u8]) -> Result<Vec<u8>, TransportError> {
            Ok(data.iter().map(|b| b.wrapping_sub(1)).collect())
        }
    }

    #[test]
    fn test_qop_wraps_payloads() {
        let (client_end, server_end) = Pipe::pair();

        let server = thread::spawn(move || {
            let mut trans =
                SaslTransport::server(server_end, Box::new(RotMechanism { complete: false }));
            trans.open().unwrap();
            let got = trans.read_all(6).unwrap();
            assert_eq!(&got[..], b"secret");
        });

        let mut trans =
            SaslTransport::client(client_end, Box::new(RotMechanism { complete: false }));
        trans.open().unwrap();
        trans.write(b"secret").unwrap();
        trans.flush().unwrap();
        server.join().unwrap();
    }

    #[test]
    fn test_reads_exact_lengths_across_frame_pieces() {
        let (client_end, server_end) = Pipe::pair();

        let server = thread::spawn(move || {
            let mut trans =
                SaslTransport::server(server_end, Box::new(PlainServer::new(store())));
            trans.open().unwrap();
            // One frame, consumed by the peer in three exact reads.
            trans.write(b"abcdefgh").unwrap();
            trans.flush().unwrap();
        });

        let mut trans = SaslTransport::client(
            client_end,
            Box::new(PlainClient::new("alice", "wonderland")),
        );
        trans.open().unwrap();
        assert_eq!(&trans.read_all(3).unwrap()[..], b"abc");
        assert_eq!(&trans.read_all(2).unwrap()[..], b"de");
        assert_eq!(&trans.read_all(3).unwrap()[..], b"fgh");
        server.join().unwrap();
    }
}
