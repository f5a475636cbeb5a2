//! # weft-server
//!
//! Blocking RPC servers for the weft runtime.
//!
//! A server ties a listening transport to a [`Processor`] and a pair of
//! transport/protocol factories. Per accepted connection it builds one
//! input/output protocol pair and loops `processor.process(in, out)` until
//! the processor stops or the transport errors. Replies go out in the exact
//! order requests arrived on a connection; `ONEWAY` messages produce no
//! reply.
//!
//! Two scheduling models are provided, both single-threaded per
//! connection: [`SimpleServer`] serves connections sequentially on the
//! accepting thread, [`ForkingServer`] forks one process per connection.

mod connection;
pub mod error;
pub mod forking;
pub mod processor;
pub mod simple;

pub use error::ServerError;
pub use forking::ForkingServer;
pub use processor::{reply_application_error, reply_unknown_method, Processor};
pub use simple::{SimpleServer, StopHandle};
