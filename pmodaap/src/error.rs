use thiserror::Error;

/// Erreurs remontées par la bibliothèque DAAP.
#[derive(Debug, Error)]
pub enum DaapError {
    /// Echec de connexion ou d'un appel réseau.
    #[error("DAAP network error: {0}")]
    Network(String),

    /// Réponse inattendue du serveur (databases/playlists/items vides).
    #[error("DAAP protocol error: {0}")]
    Protocol(String),

    /// Ressource locale indisponible (port serveur, etc.).
    #[error("Resource error: {0}")]
    Resource(String),

    /// Les bibliothèques mDNS ne sont pas disponibles sur ce système.
    #[error("mDNS support unavailable")]
    MdnsUnavailable,
}
