//! weft - demo RPC server
//!
//! Serves a small framed-JSON RPC service with two methods, written the way
//! generated code drives the runtime: `echo(message: string) -> string` and
//! `add(a: i32, b: i32) -> i32`. Unknown methods get the standard
//! UNKNOWN_METHOD exception reply.

use clap::Parser;
use tracing_subscriber::EnvFilter;
use weft_protocol::{Error, JsonProtocolFactory, MessageHeader, MessageKind, Protocol, TType};
use weft_server::{reply_unknown_method, ForkingServer, Processor, ServerError, SimpleServer};
use weft_transport::{
    BufferedTransportFactory, FramedTransportFactory, TcpServerTransport, TransportFactory,
};

#[derive(Debug, Parser)]
#[command(name = "weft", about = "Demo RPC server for the weft runtime")]
struct Args {
    /// Address to bind to.
    #[arg(long, default_value = "127.0.0.1:9090")]
    bind: String,

    /// Fork one process per connection instead of serving sequentially.
    #[arg(long)]
    fork: bool,

    /// Use buffered instead of framed transports.
    #[arg(long)]
    buffered: bool,
}

/// The demo service, shaped like generated dispatch code.
struct DemoProcessor;

impl DemoProcessor {
    fn handle_echo(
        &self,
        header: &MessageHeader,
        input: &mut dyn Protocol,
        output: &mut dyn Protocol,
    ) -> Result<(), Error> {
        let mut message = String::new();
        input.read_struct_begin()?;
        loop {
            let field = input.read_field_begin()?;
            if field.is_stop() {
                break;
            }
            match (field.id, field.field_type) {
                (1, TType::String) => message = input.read_string()?,
                (_, ftype) => input.skip(ftype)?,
            }
            input.read_field_end()?;
        }
        input.read_struct_end()?;
        input.read_message_end()?;

        output.write_message_begin(&header.name, MessageKind::Reply, header.seq_id)?;
        output.write_struct_begin("echo_result")?;
        output.write_field_begin("success", TType::String, 0)?;
        output.write_string(&message)?;
        output.write_field_end()?;
        output.write_field_stop()?;
        output.write_struct_end()?;
        output.write_message_end()?;
        output.flush()
    }

    fn handle_add(
        &self,
        header: &MessageHeader,
        input: &mut dyn Protocol,
        output: &mut dyn Protocol,
    ) -> Result<(), Error> {
        let mut a = 0;
        let mut b = 0;
        input.read_struct_begin()?;
        loop {
            let field = input.read_field_begin()?;
            if field.is_stop() {
                break;
            }
            match (field.id, field.field_type) {
                (1, TType::I32) => a = input.read_i32()?,
                (2, TType::I32) => b = input.read_i32()?,
                (_, ftype) => input.skip(ftype)?,
            }
            input.read_field_end()?;
        }
        input.read_struct_end()?;
        input.read_message_end()?;

        output.write_message_begin(&header.name, MessageKind::Reply, header.seq_id)?;
        output.write_struct_begin("add_result")?;
        output.write_field_begin("success", TType::I32, 0)?;
        output.write_i32(a.wrapping_add(b))?;
        output.write_field_end()?;
        output.write_field_stop()?;
        output.write_struct_end()?;
        output.write_message_end()?;
        output.flush()
    }
}

impl Processor for DemoProcessor {
    fn process(&self, input: &mut dyn Protocol, output: &mut dyn Protocol) -> Result<bool, Error> {
        let header = input.read_message_begin()?;
        tracing::debug!("request {} (seq {})", header.name, header.seq_id);
        match header.name.as_str() {
            "echo" => self.handle_echo(&header, input, output)?,
            "add" => self.handle_add(&header, input, output)?,
            _ => reply_unknown_method(input, output, &header.name, header.seq_id)?,
        }
        Ok(true)
    }
}

fn transport_factory(buffered: bool) -> Box<dyn TransportFactory> {
    if buffered {
        Box::new(BufferedTransportFactory)
    } else {
        Box::new(FramedTransportFactory)
    }
}

fn main() -> Result<(), ServerError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    tracing::info!("starting weft demo server on {}", args.bind);

    let server_transport = TcpServerTransport::new(args.bind);
    if args.fork {
        let mut server = ForkingServer::new(
            server_transport,
            DemoProcessor,
            transport_factory(args.buffered),
            transport_factory(args.buffered),
            Box::new(JsonProtocolFactory),
            Box::new(JsonProtocolFactory),
        );
        server.serve()
    } else {
        let mut server = SimpleServer::new(
            server_transport,
            DemoProcessor,
            transport_factory(args.buffered),
            transport_factory(args.buffered),
            Box::new(JsonProtocolFactory),
            Box::new(JsonProtocolFactory),
        );
        server.serve()
    }
}
