pub mod channel;
pub mod client;
pub mod interface;
pub mod mock;
pub mod parser;
pub mod protocol;
pub mod receiver;
pub mod transport;

pub use channel::CommandChannel;
pub use client::{OsaClient, OsaClientBuilder};
pub use interface::SpectrumAnalyzer;
pub use mock::{ScriptedResponse, ScriptedTransport};
pub use parser::parse_trace_payload;
pub use protocol::{OsaCommand, SENTINEL, TRACE_QUERY};
pub use receiver::{DecodePolicy, ResponseReceiver};
pub use transport::{
    Connection, ConnectionConfig, DeviceEndpoint, InstrumentStream, TcpTransport, Transport,
};
