use super::transport::{Connection, InstrumentStream};
use crate::error::OsaError;
use crate::types::RawResponse;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::thread;
use std::time::Duration;

pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// How bytes that are not valid UTF-8 are handled when decoding a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodePolicy {
    /// Drop invalid sequences
    #[default]
    Ignore,
    /// Substitute U+FFFD for invalid sequences
    Replace,
    /// Fail the whole response
    Strict,
}

impl DecodePolicy {
    pub fn decode(&self, bytes: &[u8]) -> Result<String, OsaError> {
        match self {
            DecodePolicy::Ignore => Ok(bytes.utf8_chunks().map(|chunk| chunk.valid()).collect()),
            DecodePolicy::Replace => Ok(String::from_utf8_lossy(bytes).into_owned()),
            DecodePolicy::Strict => std::str::from_utf8(bytes)
                .map(str::to_owned)
                .map_err(|e| OsaError::Decode(e.to_string())),
        }
    }
}

/// Reassembles a response whose end is only signalled by silence.
///
/// Reads keep going until the peer closes the stream or a read runs into the
/// stream's read timeout. Both are normal termination.
#[derive(Debug, Clone)]
pub struct ResponseReceiver {
    chunk_size: usize,
    /// Pause after each chunk so slow instruments can refill the socket
    chunk_delay: Duration,
    decode_policy: DecodePolicy,
}

impl Default for ResponseReceiver {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_delay: Duration::ZERO,
            decode_policy: DecodePolicy::default(),
        }
    }
}

impl ResponseReceiver {
    pub fn new(chunk_size: usize, decode_policy: DecodePolicy) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            decode_policy,
            ..Default::default()
        }
    }

    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    pub fn decode_policy(&self) -> DecodePolicy {
        self.decode_policy
    }

    pub fn receive<S: InstrumentStream>(
        &self,
        connection: &mut Connection<S>,
    ) -> Result<RawResponse, OsaError> {
        let stream = connection.stream_mut()?;
        let mut received = Vec::new();
        let mut chunk = vec![0u8; self.chunk_size];

        loop {
            match stream.read(&mut chunk) {
                Ok(0) => {
                    debug!("Stream closed by instrument");
                    break;
                }
                Ok(n) => {
                    received.extend_from_slice(&chunk[..n]);
                    if !self.chunk_delay.is_zero() {
                        thread::sleep(self.chunk_delay);
                    }
                }
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    debug!("Read idle timeout, stopping reception");
                    break;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(OsaError::connection(e, "Reading response")),
            }
        }

        info!("Received data length: {}", received.len());
        let text = self.decode_policy.decode(&received)?;
        Ok(RawResponse::new(text, received.len()))
    }
}
