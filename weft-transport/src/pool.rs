//! Socket pool with a pluggable host failure cache.

use crate::config::TransportConfig;
use crate::error::{TransportError, TransportErrorKind};
use crate::socket::TcpTransport;
use crate::transport::Transport;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// A failure detector for pool members.
///
/// Implementations may be backed by a shared cross-process cache; writes are
/// best-effort and must never block connection progress. When no cache is
/// available every lookup is a miss.
pub trait FailureOracle: Send + Sync {
    /// Records a failed connection attempt observed at `at`.
    fn mark_down(&self, host: &str, port: u16, at: Instant);

    /// Clears failure state after a successful connection.
    fn mark_up(&self, host: &str, port: u16);

    /// Whether the host should currently be skipped.
    fn is_down(&self, host: &str, port: u16, now: Instant) -> bool;
}

#[derive(Debug, Clone, Copy)]
struct FailureEntry {
    last_failure: Instant,
    consecutive: u32,
}

/// In-memory failure cache.
///
/// A host is considered down once it accumulates `min_consecutive` failures,
/// until `retry_after` has elapsed since the last one. Concurrent writers of
/// the same key race benignly; the decision uses the failure timestamp, not
/// the counter.
#[derive(Debug)]
pub struct MemoryFailureOracle {
    entries: Mutex<HashMap<(String, u16), FailureEntry>>,
    retry_after: Duration,
    min_consecutive: u32,
}

impl MemoryFailureOracle {
    pub fn new(retry_after: Duration, min_consecutive: u32) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            retry_after,
            min_consecutive: min_consecutive.max(1),
        }
    }
}

impl Default for MemoryFailureOracle {
    fn default() -> Self {
        Self::new(Duration::from_secs(60), 3)
    }
}

impl FailureOracle for MemoryFailureOracle {
    fn mark_down(&self, host: &str, port: u16, at: Instant) {
        let mut entries = self.entries.lock();
        let entry = entries
            .entry((host.to_owned(), port))
            .or_insert(FailureEntry {
                last_failure: at,
                consecutive: 0,
            });
        entry.last_failure = at;
        entry.consecutive = entry.consecutive.saturating_add(1);
    }

    fn mark_up(&self, host: &str, port: u16) {
        self.entries.lock().remove(&(host.to_owned(), port));
    }

    fn is_down(&self, host: &str, port: u16, now: Instant) -> bool {
        let entries = self.entries.lock();
        match entries.get(&(host.to_owned(), port)) {
            Some(entry) => {
                entry.consecutive >= self.min_consecutive
                    && now.duration_since(entry.last_failure) < self.retry_after
            }
            None => false,
        }
    }
}

/// Picks a healthy host from a fixed member list and connects to it.
pub struct SocketPool {
    hosts: Vec<(String, u16)>,
    oracle: Box<dyn FailureOracle>,
    config: TransportConfig,
    next: usize,
}

impl SocketPool {
    pub fn new(hosts: Vec<(String, u16)>, oracle: Box<dyn FailureOracle>) -> Self {
        Self::with_config(hosts, oracle, TransportConfig::default())
    }

    pub fn with_config(
        hosts: Vec<(String, u16)>,
        oracle: Box<dyn FailureOracle>,
        config: TransportConfig,
    ) -> Self {
        Self {
            hosts,
            oracle,
            config,
            next: 0,
        }
    }

    /// Connects to the next host that the oracle does not report down,
    /// recording the outcome of each attempt.
    pub fn connect(&mut self) -> Result<TcpTransport, TransportError> {
        if self.hosts.is_empty() {
            return Err(TransportError::new(
                TransportErrorKind::NotOpen,
                "socket pool has no members",
            ));
        }

        let now = Instant::now();
        let count = self.hosts.len();
        let mut last_error = None;

        for offset in 0..count {
            let (host, port) = self.hosts[(self.next + offset) % count].clone();
            if self.oracle.is_down(&host, port, now) {
                tracing::debug!("skipping {}:{}, marked down", host, port);
                continue;
            }
            let mut transport = TcpTransport::with_config(&host, port, self.config.clone());
            match transport.open() {
                Ok(()) => {
                    self.oracle.mark_up(&host, port);
                    self.next = (self.next + offset + 1) % count;
                    return Ok(transport);
                }
                Err(err) => {
                    tracing::debug!("connection to {}:{} failed: {}", host, port, err);
                    self.oracle.mark_down(&host, port, Instant::now());
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            TransportError::new(
                TransportErrorKind::NotOpen,
                "all pool members are marked down",
            )
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::TcpServerTransport;
    use std::thread;

    #[test]
    fn test_oracle_requires_consecutive_failures() {
        let oracle = MemoryFailureOracle::new(Duration::from_secs(60), 3);
        let now = Instant::now();

        oracle.mark_down("db1", 7401, now);
        oracle.mark_down("db1", 7401, now);
        assert!(!oracle.is_down("db1", 7401, now));

        oracle.mark_down("db1", 7401, now);
        assert!(oracle.is_down("db1", 7401, now));
    }

    #[test]
    fn test_oracle_recovers_after_retry_window() {
        let oracle = MemoryFailureOracle::new(Duration::from_millis(10), 1);
        let then = Instant::now();
        oracle.mark_down("db1", 7401, then);
        assert!(oracle.is_down("db1", 7401, then));
        assert!(!oracle.is_down("db1", 7401, then + Duration::from_millis(11)));
    }

    #[test]
    fn test_oracle_mark_up_clears_state() {
        let oracle = MemoryFailureOracle::new(Duration::from_secs(60), 1);
        let now = Instant::now();
        oracle.mark_down("db1", 7401, now);
        oracle.mark_up("db1", 7401);
        assert!(!oracle.is_down("db1", 7401, now));
    }

    #[test]
    fn test_empty_pool_misses_every_lookup() {
        let oracle = MemoryFailureOracle::default();
        assert!(!oracle.is_down("anything", 1, Instant::now()));
    }

    #[test]
    fn test_pool_skips_dead_member() {
        let mut server = TcpServerTransport::new("127.0.0.1:0");
        server.listen().unwrap();
        let addr = server.local_addr().unwrap();

        let accept = thread::spawn(move || {
            let _conn = server.accept().unwrap();
        });

        // First member refuses connections; the pool falls through to the
        // live one and records the failure.
        let oracle = MemoryFailureOracle::new(Duration::from_secs(60), 1);
        let mut pool = SocketPool::new(
            vec![
                ("127.0.0.1".to_owned(), 1),
                ("127.0.0.1".to_owned(), addr.port()),
            ],
            Box::new(oracle),
        );

        let transport = pool.connect().unwrap();
        assert!(transport.is_open());
        accept.join().unwrap();
    }
}
