//! Scripted in-memory instrument.
//!
//! Each `open` consumes the next [`ScriptedResponse`] from the script. The
//! response bytes become readable once the trace query has been written, and
//! the stream then either goes silent (idle timeout) or reports end of stream,
//! which is how the real analyzer behaves on the wire.

use super::protocol::TRACE_QUERY;
use super::transport::{DeviceEndpoint, InstrumentStream, Transport};
use crate::error::OsaError;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::Arc;

/// Greeting and login echo that precede the payload on a real link
const LOGIN_ECHO: &str = "AUTHENTICATE CRAM-MD5.\r\nready\r\n";

/// What the stream does once its scripted chunks are exhausted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// Reads time out, as when the instrument stops talking
    Idle,
    /// Reads return zero bytes, as when the peer closes the socket
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedResponse {
    /// Chunks delivered in order after the trace query
    Chunks {
        chunks: Vec<Vec<u8>>,
        end: StreamEnd,
    },
    /// `open` fails with connection refused
    Refuse,
}

impl ScriptedResponse {
    /// A single chunk of text followed by silence
    pub fn text(text: impl Into<String>) -> Self {
        Self::bytes(text.into().into_bytes())
    }

    pub fn bytes(bytes: Vec<u8>) -> Self {
        ScriptedResponse::Chunks {
            chunks: vec![bytes],
            end: StreamEnd::Idle,
        }
    }

    pub fn chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        ScriptedResponse::Chunks {
            chunks: chunks.into_iter().map(|c| c.as_ref().to_vec()).collect(),
            end: StreamEnd::Idle,
        }
    }

    /// Login echo and sentinel followed by comma separated samples
    pub fn trace(samples: &[f64]) -> Self {
        let payload: Vec<String> = samples.iter().map(|v| v.to_string()).collect();
        Self::text(format!("{LOGIN_ECHO}{}\r\n", payload.join(",")))
    }

    /// End with a closed socket instead of silence
    pub fn with_eof(self) -> Self {
        match self {
            ScriptedResponse::Chunks { chunks, .. } => ScriptedResponse::Chunks {
                chunks,
                end: StreamEnd::Eof,
            },
            other => other,
        }
    }
}

/// Everything the scripted instrument observed
#[derive(Debug, Default)]
pub struct TransportLog {
    pub opens: usize,
    pub closes: usize,
    pub refused: usize,
    /// Commands in the order written, without terminators
    pub commands: Vec<String>,
    /// Number of commands written that lacked the CRLF terminator
    pub unterminated_writes: usize,
}

pub type SharedTransportLog = Arc<Mutex<TransportLog>>;

/// Transport that replays a fixed script of responses
pub struct ScriptedTransport {
    script: VecDeque<ScriptedResponse>,
    fallback: Option<ScriptedResponse>,
    log: SharedTransportLog,
}

impl ScriptedTransport {
    pub fn new(script: Vec<ScriptedResponse>) -> Self {
        Self {
            script: script.into(),
            fallback: None,
            log: Arc::default(),
        }
    }

    /// Serve the same response on every open
    pub fn repeating(response: ScriptedResponse) -> Self {
        Self::new(Vec::new()).with_fallback(response)
    }

    /// Response served once the script runs out
    pub fn with_fallback(mut self, response: ScriptedResponse) -> Self {
        self.fallback = Some(response);
        self
    }

    pub fn log(&self) -> SharedTransportLog {
        self.log.clone()
    }
}

impl Transport for ScriptedTransport {
    type Stream = ScriptedStream;

    fn open(&mut self, endpoint: &DeviceEndpoint) -> Result<ScriptedStream, OsaError> {
        let next = self.script.pop_front().or_else(|| self.fallback.clone());
        match next {
            Some(ScriptedResponse::Chunks { chunks, end }) => {
                self.log.lock().opens += 1;
                Ok(ScriptedStream {
                    pending: chunks.into(),
                    end,
                    queried: false,
                    line: Vec::new(),
                    log: self.log.clone(),
                })
            }
            Some(ScriptedResponse::Refuse) | None => {
                self.log.lock().refused += 1;
                Err(OsaError::connection(
                    io::Error::from(io::ErrorKind::ConnectionRefused),
                    format!("Failed to connect to {}", endpoint.label()),
                ))
            }
        }
    }
}

#[derive(Debug)]
pub struct ScriptedStream {
    pending: VecDeque<Vec<u8>>,
    end: StreamEnd,
    queried: bool,
    line: Vec<u8>,
    log: SharedTransportLog,
}

impl ScriptedStream {
    fn record_line(&mut self, terminated: bool) {
        let command = String::from_utf8_lossy(&self.line).into_owned();
        self.line.clear();
        if command == TRACE_QUERY {
            self.queried = true;
        }
        let mut log = self.log.lock();
        if !terminated {
            log.unterminated_writes += 1;
        }
        log.commands.push(command);
    }
}

impl Read for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.queried {
            return Err(io::Error::from(io::ErrorKind::WouldBlock));
        }
        match self.pending.pop_front() {
            Some(mut chunk) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    self.pending.push_front(chunk.split_off(n));
                }
                Ok(n)
            }
            None => match self.end {
                StreamEnd::Idle => Err(io::Error::from(io::ErrorKind::TimedOut)),
                StreamEnd::Eof => Ok(0),
            },
        }
    }
}

impl Write for ScriptedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for &byte in buf {
            self.line.push(byte);
            if self.line.ends_with(b"\r\n") {
                self.line.truncate(self.line.len() - 2);
                self.record_line(true);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl InstrumentStream for ScriptedStream {
    fn close(&mut self) -> io::Result<()> {
        if !self.line.is_empty() {
            self.record_line(false);
        }
        self.log.lock().closes += 1;
        Ok(())
    }
}
