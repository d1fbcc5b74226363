use crate::error::OsaError;
use log::{debug, info, warn};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

/// Connection timeouts for the instrument link.
///
/// The read timeout doubles as the idle timeout that ends a response: the
/// instrument never announces the length of a trace, it just stops sending.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use rusty_osa::ConnectionConfig;
///
/// let config = ConnectionConfig {
///     read_timeout: Duration::from_secs(5),
///     ..Default::default()
/// };
/// assert_eq!(config.connect_timeout, Duration::from_secs(20));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    /// Timeout for establishing the TCP connection
    pub connect_timeout: Duration,
    /// Read inactivity after which a response is considered complete
    pub read_timeout: Duration,
    /// Timeout for writing a command
    pub write_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(20),
            read_timeout: Duration::from_secs(20),
            write_timeout: Duration::from_secs(5),
        }
    }
}

/// Where the instrument lives and how long to wait for it
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceEndpoint {
    pub host: String,
    pub port: u16,
    pub config: ConnectionConfig,
}

impl DeviceEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            config: ConnectionConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn label(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, OsaError> {
        self.label()
            .parse()
            .map_err(|_| OsaError::InvalidAddress(self.host.clone()))
    }
}

/// Byte stream to an instrument
pub trait InstrumentStream: Read + Write {
    /// Release the underlying link. Called at most once per stream.
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl InstrumentStream for TcpStream {
    fn close(&mut self) -> io::Result<()> {
        self.shutdown(Shutdown::Both)
    }
}

/// Opens fresh instrument streams. One stream serves exactly one iteration.
pub trait Transport {
    type Stream: InstrumentStream;

    fn open(&mut self, endpoint: &DeviceEndpoint) -> Result<Self::Stream, OsaError>;
}

/// Plain TCP socket transport
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport;

impl Transport for TcpTransport {
    type Stream = TcpStream;

    fn open(&mut self, endpoint: &DeviceEndpoint) -> Result<TcpStream, OsaError> {
        let label = endpoint.label();
        let socket_addr = endpoint.socket_addr()?;

        debug!("Connecting to instrument at {label}");

        let stream = TcpStream::connect_timeout(&socket_addr, endpoint.config.connect_timeout)
            .map_err(|e| {
                warn!("Failed to connect to {label}: {e}");
                if e.kind() == io::ErrorKind::TimedOut {
                    OsaError::ConnectTimeout(label.clone())
                } else {
                    OsaError::connection(e, format!("Failed to connect to {label}"))
                }
            })?;

        stream
            .set_read_timeout(Some(endpoint.config.read_timeout))
            .map_err(|e| OsaError::connection(e, "Setting read timeout"))?;
        stream
            .set_write_timeout(Some(endpoint.config.write_timeout))
            .map_err(|e| OsaError::connection(e, "Setting write timeout"))?;

        Ok(stream)
    }
}

/// An open stream scoped to one iteration. Closed on drop.
pub struct Connection<S: InstrumentStream> {
    stream: Option<S>,
    peer: String,
}

impl<S: InstrumentStream> Connection<S> {
    /// Open a connection through `transport`
    pub fn open<T>(transport: &mut T, endpoint: &DeviceEndpoint) -> Result<Self, OsaError>
    where
        T: Transport<Stream = S>,
    {
        let stream = transport.open(endpoint)?;
        info!("Connection established with device at {}", endpoint.label());
        Ok(Self::from_stream(stream, endpoint.label()))
    }

    pub fn from_stream(stream: S, peer: impl Into<String>) -> Self {
        Self {
            stream: Some(stream),
            peer: peer.into(),
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    pub fn stream_mut(&mut self) -> Result<&mut S, OsaError> {
        self.stream.as_mut().ok_or(OsaError::NotConnected)
    }

    /// Close the stream. Safe to call repeatedly; never fails.
    pub fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.close() {
                debug!("Ignoring error while closing {}: {e}", self.peer);
            }
            info!("Connection to {} closed", self.peer);
        }
    }
}

impl<S: InstrumentStream> Drop for Connection<S> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::osa::mock::{ScriptedResponse, ScriptedTransport};
    use std::net::TcpListener;

    #[test]
    fn test_endpoint_resolution() {
        let endpoint = DeviceEndpoint::new("127.0.0.1", 10001);
        assert_eq!(endpoint.label(), "127.0.0.1:10001");
        assert_eq!(endpoint.socket_addr().unwrap().port(), 10001);
    }

    #[test]
    fn test_invalid_address_rejected() {
        let endpoint = DeviceEndpoint::new("not an address", 10001);
        assert!(matches!(
            endpoint.socket_addr(),
            Err(OsaError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut transport = ScriptedTransport::new(vec![ScriptedResponse::text("ready,1")]);
        let log = transport.log();
        let endpoint = DeviceEndpoint::new("127.0.0.1", 10001);

        let mut connection = Connection::open(&mut transport, &endpoint).unwrap();
        assert!(connection.is_open());
        connection.close();
        connection.close();
        drop(connection);

        assert_eq!(log.lock().opens, 1);
        assert_eq!(log.lock().closes, 1);
    }

    #[test]
    fn test_closed_connection_reports_not_connected() {
        let mut transport = ScriptedTransport::new(vec![ScriptedResponse::text("ready,1")]);
        let endpoint = DeviceEndpoint::new("127.0.0.1", 10001);

        let mut connection = Connection::open(&mut transport, &endpoint).unwrap();
        connection.close();
        assert!(matches!(
            connection.stream_mut(),
            Err(OsaError::NotConnected)
        ));
    }

    #[test]
    fn test_tcp_transport_connects_to_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let endpoint = DeviceEndpoint::new("127.0.0.1", port);

        let mut connection = Connection::open(&mut TcpTransport, &endpoint).unwrap();
        let (_peer, _) = listener.accept().unwrap();
        assert!(connection.is_open());
        connection.close();
        assert!(!connection.is_open());
    }

    #[test]
    fn test_tcp_transport_refused_is_connection_error() {
        // Bind then drop to get a port with nothing listening
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let endpoint = DeviceEndpoint::new("127.0.0.1", port).with_config(ConnectionConfig {
            connect_timeout: Duration::from_secs(1),
            ..Default::default()
        });

        let err = TcpTransport.open(&endpoint).unwrap_err();
        assert!(err.is_connection());
    }
}
