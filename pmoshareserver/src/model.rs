//! Vue du modèle hôte (items, playlists, flux) consommée par le catalogue.
//!
//! Le moteur ne possède pas la base d'objets de l'application : il reçoit
//! des évènements (listes complètes ou diffs) et interroge le modèle via
//! [`HostModel`] pour l'amorçage et les comptes d'items.

use std::path::PathBuf;

use pmosharing::{FileType, ItemKind};

/// Identifiant d'un objet du modèle hôte.
pub type HostId = i64;

/// Préfixes des flux artificiels, jamais exportés ni marqués podcast.
pub const ERSATZ_FEED_PREFIXES: &[&str] = &["dtv:manualFeed", "dtv:searchDownloads", "dtv:search"];

/// Item de la bibliothèque hôte, tel que transmis par les évènements.
#[derive(Debug, Clone, Default)]
pub struct HostItem {
    pub id: HostId,
    /// Titre de l'objet en base.
    pub title: Option<String>,
    /// Nom affiché (les infos d'onglets utilisent `name`, la base `title`).
    pub name: Option<String>,
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    /// -1 = inconnu (sentinelle du modèle hôte).
    pub year: Option<i32>,
    pub track: Option<i32>,
    /// Durée en dixièmes de seconde.
    pub duration: Option<i64>,
    pub size: Option<i64>,
    /// Format déclaré, avec ou sans point initial.
    pub file_format: Option<String>,
    pub file_type: FileType,
    pub kind: Option<ItemKind>,
    pub show: Option<String>,
    pub season_number: Option<i32>,
    pub episode_id: Option<String>,
    pub episode_number: Option<i32>,
    pub video_path: PathBuf,
    pub thumbnail: Option<PathBuf>,
    pub feed_id: Option<HostId>,
    pub feed_url: Option<String>,
    pub is_file_item: bool,
}

/// Playlist ou flux du modèle hôte.
#[derive(Debug, Clone)]
pub struct HostPlaylist {
    pub id: HostId,
    pub title: Option<String>,
    pub name: Option<String>,
    pub is_folder: bool,
    /// URL d'origine pour les flux ; sert au filtre ersatz.
    pub url: Option<String>,
}

/// Variante d'une playlist exportée.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistKind {
    Playlist,
    Feed,
}

impl HostPlaylist {
    /// Un flux `dtv:` est un artefact interne, jamais exporté.
    pub fn is_ersatz(&self) -> bool {
        self.url
            .as_deref()
            .map(|url| url.starts_with("dtv:"))
            .unwrap_or(false)
    }
}

impl HostItem {
    /// L'item vient-il d'un vrai flux podcast ? Les flux manuels et de
    /// recherche ne comptent pas, ni les items fichiers.
    pub fn is_from_podcast(&self) -> bool {
        let Some(feed_url) = self.feed_url.as_deref() else {
            return false;
        };
        let ersatz = ERSATZ_FEED_PREFIXES
            .iter()
            .any(|prefix| feed_url.starts_with(prefix));
        self.feed_id.is_some() && !ersatz && !self.is_file_item
    }
}

/// Accès au modèle hôte : amorçage et suivi des scopes d'items.
pub trait HostModel: Send + Sync {
    /// Playlists sauvegardées de l'utilisateur.
    fn saved_playlists(&self) -> Vec<HostPlaylist>;

    /// Tous les flux, artefacts compris (filtrés par l'appelant).
    fn feeds(&self) -> Vec<HostPlaylist>;

    /// Items d'une playlist sauvegardée.
    fn playlist_items(&self, playlist_id: HostId) -> Vec<HostId>;

    /// Items téléchargés d'un flux.
    fn feed_items(&self, feed_id: HostId) -> Vec<HostId>;

    /// Commence à suivre un scope : la bibliothèque (`None`) ou une
    /// playlist/flux. Le modèle répondra par `item_list` puis des
    /// `items_changed`.
    fn track_items(&self, scope: Option<(HostId, PlaylistKind)>);

    /// Arrête le suivi d'un scope.
    fn stop_tracking_items(&self, scope: Option<(HostId, PlaylistKind)>);
}
