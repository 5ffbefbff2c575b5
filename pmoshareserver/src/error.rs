//! Types d'erreurs pour pmoshareserver

use pmodaap::DaapError;

/// Erreurs du moteur de partage côté serveur.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Resource error: {0}")]
    Resource(String),

    #[error("mDNS support unavailable")]
    MdnsUnavailable,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Transcode error: {0}")]
    Transcode(String),
}

impl From<DaapError> for Error {
    fn from(err: DaapError) -> Self {
        match err {
            DaapError::Network(msg) | DaapError::Protocol(msg) => Error::Network(msg),
            DaapError::Resource(msg) => Error::Resource(msg),
            DaapError::MdnsUnavailable => Error::MdnsUnavailable,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Resource(err.to_string())
    }
}

/// Type Result spécialisé pour pmoshareserver
pub type Result<T> = std::result::Result<T, Error>;
