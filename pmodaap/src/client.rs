//! Accès client à un serveur DAAP distant.
//!
//! Le codec fourni expose une API bloquante : connexion, snapshot initial,
//! puis `update()` (long-poll) suivi de re-fetchs en mode delta. Toutes les
//! méthodes prennent `&self` : la bibliothèque gère son propre verrouillage
//! interne, ce qui permet en particulier d'appeler `disconnect()` pendant
//! qu'un `update()` est bloqué (fermeture de socket = réveil du long-poll).

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use crate::error::DaapError;

/// Identifiant DAAP (items, playlists, bases).
pub type DaapId = u32;

/// Base de données annoncée par le serveur distant.
#[derive(Debug, Clone)]
pub struct RemoteDatabase {
    pub db_id: DaapId,
    pub name: String,
}

/// Item tel que reçu du serveur distant.
///
/// Tous les champs sont optionnels hormis l'identifiant : un serveur peut ne
/// renvoyer qu'un sous-ensemble de la liste `meta` demandée. Les chaînes
/// peuvent contenir des octets NUL, nettoyés côté moteur.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteItem {
    pub item_id: DaapId,
    pub name: Option<String>,
    pub format: Option<String>,
    pub mediakind: Option<u32>,
    pub itemkind: Option<u8>,
    /// daap.songtime, en millisecondes.
    pub duration_ms: Option<i64>,
    pub size: Option<i64>,
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub year: Option<i32>,
    pub track: Option<i32>,
    pub show: Option<String>,
    pub season_number: Option<i32>,
    pub episode_id: Option<String>,
    pub episode_number: Option<i32>,
}

/// Playlist telle que reçue du serveur distant.
///
/// `item_id` et `name` restent optionnels : la règle de visibilité du moteur
/// exige la présence des deux.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemotePlaylist {
    pub item_id: Option<DaapId>,
    pub name: Option<String>,
    pub base_playlist: bool,
    pub podcast: bool,
}

/// Résultat d'un fetch items : ajouts/modifications + suppressions.
#[derive(Debug, Clone, Default)]
pub struct ItemDelta {
    pub added: HashMap<DaapId, RemoteItem>,
    pub deleted: Vec<DaapId>,
}

/// Résultat d'un fetch playlists.
#[derive(Debug, Clone, Default)]
pub struct PlaylistDelta {
    pub added: HashMap<DaapId, RemotePlaylist>,
    pub deleted: Vec<DaapId>,
}

/// Connexion client vers un serveur DAAP.
pub trait DaapClient: Send + Sync {
    /// Ouvre la connexion et la session DAAP.
    fn connect(&self) -> Result<(), DaapError>;

    /// Ferme la session. Peut être appelé pendant qu'un `update()` est
    /// bloqué dans un autre thread : le long-poll est alors interrompu.
    fn disconnect(&self) -> Result<(), DaapError>;

    /// Adresse pair effective de la connexion, disponible après `connect()`.
    ///
    /// Utilisée pour construire les URLs de streaming sans re-résolution de
    /// nom.
    fn peer_addr(&self) -> Option<IpAddr>;

    /// Le serveur accepte-t-il les requêtes `update` (deltas) ?
    fn supports_update(&self) -> bool;

    /// Liste des bases partagées. Une liste vide est une erreur de protocole
    /// pour le moteur.
    fn databases(&self, update: bool) -> Result<Vec<RemoteDatabase>, DaapError>;

    /// Playlists de la base principale.
    fn playlists(&self, update: bool) -> Result<PlaylistDelta, DaapError>;

    /// Items de la base principale (`playlist_id = None`) ou d'une playlist.
    fn items(
        &self,
        meta: &[&str],
        playlist_id: Option<DaapId>,
        update: bool,
    ) -> Result<ItemDelta, DaapError>;

    /// Long-poll : bloque jusqu'à ce que le serveur signale un changement.
    fn update(&self) -> Result<(), DaapError>;

    /// URL de streaming pour un item, dans le format annoncé.
    fn file_url(&self, item_id: DaapId, format: Option<&str>) -> String;
}

/// Fabrique de clients (`make_client(host, port)` de la bibliothèque).
pub trait ClientFactory: Send + Sync {
    fn make_client(&self, host: &str, port: u16) -> Arc<dyn DaapClient>;
}
