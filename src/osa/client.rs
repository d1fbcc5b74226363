use super::channel::{CommandChannel, DEFAULT_SETTLE_DELAY};
use super::interface::SpectrumAnalyzer;
use super::parser::parse_trace_payload;
use super::protocol::{setup_sequence, TRACE_QUERY};
use super::receiver::{DecodePolicy, ResponseReceiver, DEFAULT_CHUNK_SIZE};
use super::transport::{
    Connection, ConnectionConfig, DeviceEndpoint, InstrumentStream, TcpTransport, Transport,
};
use crate::error::OsaError;
use crate::types::{RawResponse, SweepRequest, Trace};
use log::{debug, info};
use std::time::Duration;

/// Builder for [`OsaClient`].
///
/// Nothing is connected at build time; the client opens a fresh connection
/// for every sweep.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use rusty_osa::{OsaClient, SpectrumAnalyzer, SweepRequest};
///
/// let mut client = OsaClient::builder()
///     .address("168.176.118.23")
///     .port(10001)
///     .read_timeout(Duration::from_secs(20))
///     .build()?;
///
/// client.configure(&SweepRequest::new(600.0, 1100.0))?;
/// let trace = client.acquire_trace()?;
/// println!("{} samples", trace.len());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct OsaClientBuilder {
    address: Option<String>,
    port: Option<u16>,
    config: ConnectionConfig,
    settle_delay: Duration,
    chunk_size: usize,
    chunk_delay: Duration,
    decode_policy: DecodePolicy,
}

impl Default for OsaClientBuilder {
    fn default() -> Self {
        Self {
            address: None,
            port: None,
            config: ConnectionConfig::default(),
            settle_delay: DEFAULT_SETTLE_DELAY,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_delay: Duration::ZERO,
            decode_policy: DecodePolicy::default(),
        }
    }
}

impl OsaClientBuilder {
    pub fn address(mut self, addr: &str) -> Self {
        self.address = Some(addr.to_string());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the full connection configuration
    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Silence that ends a response
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config.write_timeout = timeout;
        self
    }

    /// Pause after every command
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    pub fn chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    pub fn decode_policy(mut self, policy: DecodePolicy) -> Self {
        self.decode_policy = policy;
        self
    }

    /// Build a client that talks TCP
    pub fn build(self) -> Result<OsaClient<TcpTransport>, OsaError> {
        self.build_with_transport(TcpTransport)
    }

    /// Build a client on top of any transport
    pub fn build_with_transport<T: Transport>(self, transport: T) -> Result<OsaClient<T>, OsaError> {
        let address = self
            .address
            .ok_or_else(|| OsaError::InvalidAddress("Address must be specified".to_string()))?;
        let port = self
            .port
            .ok_or_else(|| OsaError::InvalidAddress("Port must be specified".to_string()))?;

        Ok(OsaClient {
            transport,
            endpoint: DeviceEndpoint::new(address, port).with_config(self.config),
            channel: CommandChannel::new(self.settle_delay),
            receiver: ResponseReceiver::new(self.chunk_size, self.decode_policy)
                .with_chunk_delay(self.chunk_delay),
            pending: None,
        })
    }
}

/// A sweep that has been started and whose trace has not been read yet
struct PendingSweep<S: InstrumentStream> {
    connection: Connection<S>,
    request: SweepRequest,
}

/// Client for an optical spectrum analyzer reachable over a byte stream.
///
/// Every acquisition uses its own connection: [`SpectrumAnalyzer::configure`]
/// opens it and sends the setup sequence, [`SpectrumAnalyzer::acquire_trace`]
/// queries the trace and closes it. A connection is never reused, so a wedged
/// link only costs one sweep.
pub struct OsaClient<T: Transport = TcpTransport> {
    transport: T,
    endpoint: DeviceEndpoint,
    channel: CommandChannel,
    receiver: ResponseReceiver,
    pending: Option<PendingSweep<T::Stream>>,
}

impl OsaClient<TcpTransport> {
    /// TCP client with default timeouts and pacing
    pub fn new(addr: &str, port: u16) -> Result<Self, OsaError> {
        Self::builder().address(addr).port(port).build()
    }

    /// Start configuring a client; pick the transport at build time
    pub fn builder() -> OsaClientBuilder {
        OsaClientBuilder::default()
    }
}

impl<T: Transport> OsaClient<T> {
    pub fn endpoint(&self) -> &DeviceEndpoint {
        &self.endpoint
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send `command` and collect whatever the instrument says until it goes quiet
    pub fn query(
        &self,
        connection: &mut Connection<T::Stream>,
        command: &str,
    ) -> Result<RawResponse, OsaError> {
        self.channel.send(connection, command)?;
        self.receiver.receive(connection)
    }

    /// Configure, sweep and read back one trace
    pub fn single_trace(&mut self, request: &SweepRequest) -> Result<Trace, OsaError> {
        self.configure(request)?;
        self.acquire_trace()
    }
}

impl<T: Transport> SpectrumAnalyzer for OsaClient<T> {
    fn configure(&mut self, request: &SweepRequest) -> Result<(), OsaError> {
        request.validate()?;
        self.abort();

        let mut connection = Connection::open(&mut self.transport, &self.endpoint)?;
        self.channel
            .send_all(&mut connection, &setup_sequence(request))?;
        debug!("Sweep initiated over {}", connection.peer());

        self.pending = Some(PendingSweep {
            connection,
            request: request.clone(),
        });
        Ok(())
    }

    fn acquire_trace(&mut self) -> Result<Trace, OsaError> {
        let PendingSweep {
            mut connection,
            request,
        } = self.pending.take().ok_or(OsaError::NotConnected)?;

        let raw = self.query(&mut connection, TRACE_QUERY)?;
        connection.close();

        debug!(
            "Response head: {:?}",
            raw.text().chars().take(40).collect::<String>()
        );
        let samples = parse_trace_payload(raw.text())?;
        info!("Parsed {} samples", samples.len());

        Ok(Trace::from_samples(&request.range, samples))
    }

    fn abort(&mut self) {
        if let Some(mut stale) = self.pending.take() {
            debug!("Discarding unfinished sweep");
            stale.connection.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::osa::mock::{ScriptedResponse, ScriptedTransport};

    fn scripted_client(script: Vec<ScriptedResponse>) -> OsaClient<ScriptedTransport> {
        OsaClient::builder()
            .address("127.0.0.1")
            .port(10001)
            .settle_delay(Duration::ZERO)
            .build_with_transport(ScriptedTransport::new(script))
            .unwrap()
    }

    #[test]
    fn test_builder_requires_address_and_port() {
        assert!(OsaClient::<TcpTransport>::builder().port(10001).build().is_err());
        assert!(OsaClient::<TcpTransport>::builder().address("127.0.0.1").build().is_err());
    }

    #[test]
    fn test_single_trace_sends_full_sequence() {
        let mut client = scripted_client(vec![ScriptedResponse::trace(&[1.1, 2.2, 3.3])]);
        let log = client.transport().log();

        let trace = client.single_trace(&SweepRequest::new(600.0, 1100.0)).unwrap();
        assert_eq!(trace.samples(), &[1.1, 2.2, 3.3]);
        assert_eq!(trace.wavelengths(), &[600.0, 850.0, 1100.0]);

        let log = log.lock();
        assert_eq!(log.commands.len(), 12);
        assert_eq!(log.commands[0], "open \"anonymous\"");
        assert_eq!(log.commands[10], ":init");
        assert_eq!(log.commands[11], ":TRACE:Y? TRA");
        assert_eq!((log.opens, log.closes), (1, 1));
    }

    #[test]
    fn test_connection_closed_on_protocol_error() {
        let mut client = scripted_client(vec![ScriptedResponse::text("no data here")]);
        let log = client.transport().log();

        let err = client
            .single_trace(&SweepRequest::new(600.0, 1100.0))
            .unwrap_err();
        assert!(matches!(err, OsaError::MissingSentinel));
        let log = log.lock();
        assert_eq!((log.opens, log.closes), (1, 1));
    }

    #[test]
    fn test_acquire_without_configure() {
        let mut client = scripted_client(vec![]);
        assert!(matches!(
            client.acquire_trace(),
            Err(OsaError::NotConnected)
        ));
    }

    #[test]
    fn test_reconfigure_closes_stale_connection() {
        let mut client = scripted_client(vec![
            ScriptedResponse::trace(&[1.0]),
            ScriptedResponse::trace(&[2.0]),
        ]);
        let log = client.transport().log();
        let request = SweepRequest::new(600.0, 1100.0);

        client.configure(&request).unwrap();
        client.configure(&request).unwrap();
        assert_eq!(log.lock().opens, 2);
        assert_eq!(log.lock().closes, 1);

        let trace = client.acquire_trace().unwrap();
        assert_eq!(trace.samples(), &[2.0]);
        assert_eq!(log.lock().closes, 2);
    }

    #[test]
    fn test_invalid_request_never_connects() {
        let mut client = scripted_client(vec![ScriptedResponse::trace(&[1.0])]);
        let log = client.transport().log();

        assert!(client.configure(&SweepRequest::new(1100.0, 600.0)).is_err());
        assert_eq!(log.lock().opens, 0);
    }

    #[test]
    fn test_refused_connection_surfaces() {
        let mut client = scripted_client(vec![ScriptedResponse::Refuse]);
        let err = client
            .configure(&SweepRequest::new(600.0, 1100.0))
            .unwrap_err();
        assert!(err.is_connection());
    }
}
