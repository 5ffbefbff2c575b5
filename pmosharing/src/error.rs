//! Types d'erreurs pour pmosharing

use pmodaap::DaapError;

/// Erreurs du moteur de partage côté client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Resource error: {0}")]
    Resource(String),

    #[error("mDNS support unavailable")]
    MdnsUnavailable,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl From<DaapError> for Error {
    fn from(err: DaapError) -> Self {
        match err {
            DaapError::Network(msg) => Error::Network(msg),
            DaapError::Protocol(msg) => Error::Protocol(msg),
            DaapError::Resource(msg) => Error::Resource(msg),
            DaapError::MdnsUnavailable => Error::MdnsUnavailable,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Persistence(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Resource(err.to_string())
    }
}

/// Type Result spécialisé pour pmosharing
pub type Result<T> = std::result::Result<T, Error>;
