use super::protocol::{OsaCommand, TERMINATOR};
use super::transport::{Connection, InstrumentStream};
use crate::error::OsaError;
use log::debug;
use std::thread;
use std::time::Duration;

/// Default pause after each command. The firmware drops or merges commands
/// that arrive closer together than this.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(200);

/// Writes terminated command lines and paces them
#[derive(Debug, Clone)]
pub struct CommandChannel {
    settle_delay: Duration,
}

impl Default for CommandChannel {
    fn default() -> Self {
        Self::new(DEFAULT_SETTLE_DELAY)
    }
}

impl CommandChannel {
    pub fn new(settle_delay: Duration) -> Self {
        Self { settle_delay }
    }

    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    /// Write `command` plus CRLF, then wait out the settle delay
    pub fn send<S: InstrumentStream>(
        &self,
        connection: &mut Connection<S>,
        command: &str,
    ) -> Result<(), OsaError> {
        let stream = connection.stream_mut()?;
        let line = format!("{command}{TERMINATOR}");

        debug!("-> {command}");
        stream
            .write_all(line.as_bytes())
            .and_then(|_| stream.flush())
            .map_err(|e| OsaError::connection(e, format!("Writing command '{command}'")))?;

        if !self.settle_delay.is_zero() {
            thread::sleep(self.settle_delay);
        }
        Ok(())
    }

    pub fn send_command<S: InstrumentStream>(
        &self,
        connection: &mut Connection<S>,
        command: &OsaCommand,
    ) -> Result<(), OsaError> {
        self.send(connection, &command.to_string())
    }

    /// Send each command in order without waiting for acknowledgements
    pub fn send_all<S: InstrumentStream>(
        &self,
        connection: &mut Connection<S>,
        commands: &[OsaCommand],
    ) -> Result<(), OsaError> {
        commands
            .iter()
            .try_for_each(|command| self.send_command(connection, command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::osa::mock::{ScriptedResponse, ScriptedTransport};
    use crate::osa::transport::DeviceEndpoint;
    use std::io;
    use std::time::Instant;

    struct BrokenPipe;

    impl io::Read for BrokenPipe {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Ok(0)
        }
    }

    impl io::Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl InstrumentStream for BrokenPipe {}

    fn open_scripted() -> (Connection<crate::osa::mock::ScriptedStream>, ScriptedTransport) {
        let mut transport = ScriptedTransport::new(vec![ScriptedResponse::text("")]);
        let connection =
            Connection::open(&mut transport, &DeviceEndpoint::new("127.0.0.1", 10001)).unwrap();
        (connection, transport)
    }

    #[test]
    fn test_send_appends_crlf() {
        let (mut connection, transport) = open_scripted();
        let channel = CommandChannel::new(Duration::ZERO);

        channel.send(&mut connection, "*RST").unwrap();
        channel
            .send_command(&mut connection, &OsaCommand::ClearStatus)
            .unwrap();
        drop(connection);

        let log = transport.log();
        let log = log.lock();
        assert_eq!(log.commands, vec!["*RST", "*CLS"]);
        assert_eq!(log.unterminated_writes, 0);
    }

    #[test]
    fn test_settle_delay_applied_per_command() {
        let (mut connection, _transport) = open_scripted();
        let channel = CommandChannel::new(Duration::from_millis(20));

        let started = Instant::now();
        channel
            .send_all(
                &mut connection,
                &[OsaCommand::Reset, OsaCommand::ClearStatus, OsaCommand::Initiate],
            )
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn test_send_on_closed_connection_fails() {
        let (mut connection, _transport) = open_scripted();
        connection.close();

        let result = CommandChannel::new(Duration::ZERO).send(&mut connection, "*RST");
        assert!(matches!(result, Err(OsaError::NotConnected)));
    }

    #[test]
    fn test_write_failure_is_connection_error() {
        let mut connection = Connection::from_stream(BrokenPipe, "broken");
        let err = CommandChannel::new(Duration::ZERO)
            .send(&mut connection, "*RST")
            .unwrap_err();
        assert!(err.is_connection());
    }
}
