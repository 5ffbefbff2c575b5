//! Modèle des items miroir et conversion depuis les champs DAAP.

use pmodaap::dmap;
use pmodaap::{DaapId, RemoteItem};

/// Facteur entre la durée locale (dixièmes de seconde) et le fil DAAP
/// (millisecondes).
pub const DURATION_SCALE: i64 = 1000;

/// Type de média d'un item partagé. Audio en l'absence d'information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FileType {
    #[default]
    Audio,
    Video,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Audio => "audio",
            FileType::Video => "video",
        }
    }

    pub fn parse(value: &str) -> Option<FileType> {
        match value {
            "audio" => Some(FileType::Audio),
            "video" => Some(FileType::Video),
            _ => None,
        }
    }

    /// com.apple.itunes.mediakind → type local. Audio par défaut quand le
    /// serveur n'envoie rien d'exploitable.
    pub fn from_mediakind(mediakind: Option<u32>) -> FileType {
        match mediakind {
            Some(dmap::MEDIAKIND_TV) | Some(dmap::MEDIAKIND_MOVIE) | Some(dmap::MEDIAKIND_VIDEO) => {
                FileType::Video
            }
            _ => FileType::Audio,
        }
    }
}

/// Genre d'item transporté par le tag propriétaire `miKD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Movie,
    Show,
    Clip,
    Podcast,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Movie => "movie",
            ItemKind::Show => "show",
            ItemKind::Clip => "clip",
            ItemKind::Podcast => "podcast",
        }
    }

    pub fn parse(value: &str) -> Option<ItemKind> {
        match value {
            "movie" => Some(ItemKind::Movie),
            "show" => Some(ItemKind::Show),
            "clip" => Some(ItemKind::Clip),
            "podcast" => Some(ItemKind::Podcast),
            _ => None,
        }
    }

    /// Décode le bitmask ; une combinaison inconnue est ignorée.
    pub fn from_bitmask(bits: u8) -> Option<ItemKind> {
        match bits {
            dmap::ITEMKIND_MOVIE => Some(ItemKind::Movie),
            dmap::ITEMKIND_PODCAST => Some(ItemKind::Podcast),
            dmap::ITEMKIND_SHOW => Some(ItemKind::Show),
            dmap::ITEMKIND_CLIP => Some(ItemKind::Clip),
            _ => None,
        }
    }

    pub fn to_bitmask(self) -> u8 {
        match self {
            ItemKind::Movie => dmap::ITEMKIND_MOVIE,
            ItemKind::Podcast => dmap::ITEMKIND_PODCAST,
            ItemKind::Show => dmap::ITEMKIND_SHOW,
            ItemKind::Clip => dmap::ITEMKIND_CLIP,
        }
    }
}

/// Item miroir d'un média distant, indexé par `(share_id, daap_id)`.
#[derive(Debug, Clone, PartialEq)]
pub struct SharingItem {
    pub daap_id: DaapId,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub genre: Option<String>,
    pub year: Option<i32>,
    pub track: Option<i32>,
    /// Durée en dixièmes de seconde.
    pub duration: Option<i64>,
    pub size: Option<i64>,
    pub file_format: Option<String>,
    pub file_type: FileType,
    pub kind: Option<ItemKind>,
    pub show: Option<String>,
    pub season_number: Option<i32>,
    pub episode_id: Option<String>,
    pub episode_number: Option<i32>,
    pub host: String,
    pub port: u16,
    pub address: String,
    /// URL de streaming construite par le client DAAP.
    pub video_path: String,
}

/// Retire tous les octets NUL d'une chaîne reçue du réseau.
pub fn scrub_nuls(value: &str) -> String {
    if value.contains('\0') {
        value.replace('\0', "")
    } else {
        value.to_string()
    }
}

fn scrub_opt(value: &Option<String>) -> Option<String> {
    value.as_deref().map(scrub_nuls)
}

impl SharingItem {
    /// Construit un item local à partir des champs DAAP reçus.
    ///
    /// `video_path` est l'URL de streaming obtenue du client pour cet item ;
    /// `address` l'adresse pair effective de la connexion.
    pub fn from_remote(
        remote: &RemoteItem,
        video_path: &str,
        host: &str,
        port: u16,
        address: &str,
    ) -> SharingItem {
        SharingItem {
            daap_id: remote.item_id,
            title: scrub_opt(&remote.name),
            artist: scrub_opt(&remote.artist),
            album: scrub_opt(&remote.album),
            album_artist: scrub_opt(&remote.album_artist),
            genre: scrub_opt(&remote.genre),
            year: remote.year,
            track: remote.track,
            duration: remote.duration_ms.map(|ms| ms / DURATION_SCALE),
            size: remote.size,
            file_format: scrub_opt(&remote.format),
            file_type: FileType::from_mediakind(remote.mediakind),
            kind: remote.itemkind.and_then(ItemKind::from_bitmask),
            show: scrub_opt(&remote.show),
            season_number: remote.season_number,
            episode_id: scrub_opt(&remote.episode_id),
            episode_number: remote.episode_number,
            host: host.to_string(),
            port,
            address: address.to_string(),
            video_path: video_path.to_string(),
        }
    }
}
