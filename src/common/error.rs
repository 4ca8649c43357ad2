// Error types and error handling

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Protocol(String),
    InvalidParty(String),
    InvalidChunk(String),
    Timeout,
    ConnectionLost,
    SessionExpired(String),
    SerializationError(String),
    DeserializationError(String),
    ConfigError(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Protocol(e) => write!(f, "Protocol error: {}", e),
            Error::InvalidParty(e) => write!(f, "Invalid party: {}", e),
            Error::InvalidChunk(e) => write!(f, "Invalid chunk: {}", e),
            Error::Timeout => write!(f, "Transfer timeout"),
            Error::ConnectionLost => write!(f, "Connection lost"),
            Error::SessionExpired(e) => write!(f, "Session expired: {}", e),
            Error::SerializationError(e) => write!(f, "Serialization error: {}", e),
            Error::DeserializationError(e) => write!(f, "Deserialization error: {}", e),
            Error::ConfigError(e) => write!(f, "Configuration error: {}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
