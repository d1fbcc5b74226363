use thiserror::Error;

#[derive(Error, Debug)]
pub enum OsaError {
    #[error("Connection error ({context}): {source}")]
    Connection {
        #[source]
        source: std::io::Error,
        context: String,
    },
    #[error("Connection to {0} timed out")]
    ConnectTimeout(String),
    #[error("Not connected")]
    NotConnected,
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Protocol error: missing sentinel")]
    MissingSentinel,
    #[error("Protocol error: malformed sample {0:?}")]
    MalformedSample(String),
    #[error("Protocol error: undecodable response ({0})")]
    Decode(String),
    #[error("Invalid sweep request: {0}")]
    InvalidRequest(String),
    #[error("Acquisition session already complete")]
    SessionComplete,
    #[error("Giving up after {0} consecutive failed iterations")]
    TooManyFailures(u32),
    #[error("Plot error: {0}")]
    Plot(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OsaError {
    /// Wrap an I/O failure on the instrument link with a short description
    pub fn connection(source: std::io::Error, context: impl Into<String>) -> Self {
        OsaError::Connection {
            source,
            context: context.into(),
        }
    }

    /// Response content could not be interpreted; the sweep is worth retrying
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            OsaError::MissingSentinel | OsaError::MalformedSample(_) | OsaError::Decode(_)
        )
    }

    /// The instrument link itself failed (open, write or read)
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            OsaError::Connection { .. }
                | OsaError::ConnectTimeout(_)
                | OsaError::NotConnected
                | OsaError::InvalidAddress(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(OsaError::MissingSentinel.is_protocol());
        assert!(OsaError::MalformedSample("x".to_string()).is_protocol());
        assert!(!OsaError::MissingSentinel.is_connection());

        let refused = OsaError::connection(
            std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
            "Connecting",
        );
        assert!(refused.is_connection());
        assert!(!refused.is_protocol());
        assert!(OsaError::NotConnected.is_connection());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            OsaError::MissingSentinel.to_string(),
            "Protocol error: missing sentinel"
        );
        assert_eq!(
            OsaError::MalformedSample("abc".to_string()).to_string(),
            "Protocol error: malformed sample \"abc\""
        );
    }
}
