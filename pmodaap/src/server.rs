//! Contrat côté serveur : le codec fourni sert le catalogue du moteur.
//!
//! Le serveur possède sa socket et ses sessions ; il remet chaque requête
//! prête au thread contrôleur via un canal (l'équivalent du couple
//! `fileno()`/`select`), puis rappelle le [`ServerBackend`] pour produire
//! playlists, items, révisions et flux de fichiers.

use std::collections::HashMap;
use std::fs::File;
use std::io::Cursor;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::client::DaapId;
use crate::error::DaapError;

/// Session DAAP côté serveur.
pub type SessionId = u64;

/// Enregistrement exporté ou sa pierre tombale.
///
/// Une pierre tombale conserve la révision de la suppression pour que les
/// clients en retard observent la disparition.
#[derive(Debug, Clone)]
pub enum Entry<T> {
    Live(T),
    Tombstone { revision: u64 },
}

impl<T> Entry<T> {
    pub fn is_live(&self) -> bool {
        matches!(self, Entry::Live(_))
    }

    pub fn revision(&self) -> u64
    where
        T: Revisioned,
    {
        match self {
            Entry::Live(record) => record.revision(),
            Entry::Tombstone { revision } => *revision,
        }
    }

    pub fn as_live(&self) -> Option<&T> {
        match self {
            Entry::Live(record) => Some(record),
            Entry::Tombstone { .. } => None,
        }
    }
}

/// Tout enregistrement estampillé d'une révision.
pub trait Revisioned {
    fn revision(&self) -> u64;
}

/// Item exporté, prêt à être encodé en DMAP.
#[derive(Debug, Clone, PartialEq)]
pub struct DaapItem {
    pub item_id: DaapId,
    pub name: String,
    pub format: String,
    pub mediakind: u32,
    pub itemkind: Option<u8>,
    /// daap.songtime, en millisecondes.
    pub duration_ms: i64,
    pub size: i64,
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub year: i32,
    pub track: i32,
    pub show: Option<String>,
    pub season_number: Option<i32>,
    pub episode_id: Option<String>,
    pub episode_number: Option<i32>,
    /// dmap.containeritemid (= item_id).
    pub container_item_id: DaapId,
    /// dmap.persistentid (= identifiant hôte).
    pub persistent_id: i64,
    /// Chemin du média sur disque, hors encodage DMAP.
    pub path: PathBuf,
    pub cover_art: Option<PathBuf>,
    pub revision: u64,
}

impl Revisioned for DaapItem {
    fn revision(&self) -> u64 {
        self.revision
    }
}

/// Playlist/flux exporté.
#[derive(Debug, Clone, PartialEq)]
pub struct DaapPlaylist {
    pub playlist_id: DaapId,
    pub name: String,
    pub item_count: usize,
    pub parent_container_id: DaapId,
    pub persistent_id: i64,
    pub podcast: bool,
    pub revision: u64,
}

impl Revisioned for DaapPlaylist {
    fn revision(&self) -> u64 {
        self.revision
    }
}

/// Flux retourné par `get_file` : fichier sur disque ou contenu généré
/// (manifeste HLS, chunk transcodé).
#[derive(Debug)]
pub enum FileStream {
    File(File),
    Memory(Cursor<Vec<u8>>),
}

/// Moniteur de connexion pour les long-polls.
///
/// Le serveur garde le [`ConnectionHandle`] tant que la connexion HTTP est
/// ouverte ; le watcher du catalogue bloque sur [`ConnectionMonitor::wait_closed`]
/// et se réveille à la fermeture.
pub struct ConnectionMonitor {
    closed: Receiver<()>,
}

pub struct ConnectionHandle {
    _keep: Sender<()>,
}

impl ConnectionMonitor {
    pub fn new() -> (ConnectionHandle, ConnectionMonitor) {
        let (tx, rx) = bounded::<()>(1);
        (ConnectionHandle { _keep: tx }, ConnectionMonitor { closed: rx })
    }

    /// Bloque jusqu'à fermeture de la connexion.
    pub fn wait_closed(&self) {
        // Le canal n'est jamais alimenté : seule la fermeture réveille.
        let _ = self.closed.recv();
    }
}

/// Catalogue interrogé par le serveur DAAP.
pub trait ServerBackend: Send + Sync {
    /// Snapshot des playlists exportées (pierres tombales comprises).
    fn get_playlists(&self) -> HashMap<DaapId, Entry<DaapPlaylist>>;

    /// Items de la bibliothèque (`None`) ou d'une playlist.
    fn get_items(&self, playlist_id: Option<DaapId>) -> HashMap<DaapId, Entry<DaapItem>>;

    /// Long-poll : bloque jusqu'à `revision > old_revision` ou jusqu'à un
    /// réveil dirigé vers cette session (fermeture de connexion).
    fn get_revision(&self, session: SessionId, old_revision: u64, monitor: ConnectionMonitor)
        -> u64;

    /// Résout un flux pour un item.
    ///
    /// `ext` vaut `ts`/`m3u8` (transcodage), `coverart`, ou l'extension du
    /// fichier (streaming direct). Retourne `None` quand aucun flux n'est
    /// disponible (item inconnu, job périmé, arrêt en cours).
    #[allow(clippy::too_many_arguments)]
    fn get_file(
        &self,
        item_id: DaapId,
        generation: u64,
        ext: &str,
        session: SessionId,
        request_path: &dyn Fn(u64) -> String,
        offset: u64,
        chunk: Option<u64>,
    ) -> Option<(FileStream, String)>;
}

/// Requête prête à être servie, remise au thread contrôleur.
#[derive(Debug)]
pub struct ServerRequest {
    pub session: SessionId,
}

/// Serveur DAAP fourni par la bibliothèque.
pub trait DaapServer: Send {
    /// Adresse effective d'écoute (port éphémère résolu).
    fn server_address(&self) -> SocketAddr;

    /// Change le nom annoncé dans les réponses serveur.
    fn set_name(&mut self, name: &str);

    /// Nombre de sessions actives.
    fn session_count(&self) -> usize;

    /// Callback de fin de session (déconnexion d'un client).
    fn set_finished_callback(&mut self, callback: Box<dyn Fn(SessionId) + Send + Sync>);

    /// Canal des requêtes prêtes ; le contrôleur le passe dans son select.
    fn requests(&self) -> Receiver<ServerRequest>;

    /// Sert une requête remise par [`DaapServer::requests`].
    fn handle_request(&mut self, request: ServerRequest);
}

/// Fabrique de serveurs (`make_server(catalog, name)` de la bibliothèque).
pub trait ServerFactory: Send + Sync {
    /// Instancie un serveur lié à un port éphémère.
    ///
    /// `DaapError::Resource` quand la socket ne peut pas être liée.
    fn make_server(
        &self,
        backend: Arc<dyn ServerBackend>,
        name: &str,
    ) -> Result<Box<dyn DaapServer>, DaapError>;
}
