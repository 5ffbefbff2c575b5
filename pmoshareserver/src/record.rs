//! Construction des enregistrements DAAP exportés depuis le modèle hôte.

use std::path::Path;

use pmodaap::dmap;
use pmodaap::{DaapId, DaapItem, DaapPlaylist};
use pmosharing::{FileType, DURATION_SCALE};

use crate::model::{HostItem, HostPlaylist, PlaylistKind};

/// Extensions servables sans transcodage (sans le point).
pub const SUPPORTED_FORMATS: &[&str] = &[
    "mp3", "m4a", "aac", "ogg", "flac", "wav", "mp4", "m4v", "mov", "avi", "mkv", "webm",
];

/// Vignettes par défaut de l'application : jamais exportées en cover art.
const DEFAULT_THUMBNAILS: &[&str] = &["thumb-default-audio.png", "thumb-default-video.png"];

/// Remplace la sentinelle -1 du modèle hôte par 0.
fn sentinel(value: Option<i32>) -> i32 {
    match value {
        Some(-1) | None => 0,
        Some(value) => value,
    }
}

fn strip_dot(format: &str) -> &str {
    format.strip_prefix('.').unwrap_or(format)
}

fn format_supported(format: &str) -> bool {
    SUPPORTED_FORMATS.contains(&strip_dot(format))
}

/// daap.songformat : format déclaré s'il est servable, sinon l'extension du
/// fichier, sinon un défaut selon le type de média. Toujours sans point.
fn song_format(item: &HostItem) -> String {
    if let Some(declared) = item.file_format.as_deref() {
        if format_supported(declared) {
            return strip_dot(declared).to_string();
        }
    }
    if let Some(ext) = item.video_path.extension().and_then(|ext| ext.to_str()) {
        if format_supported(ext) {
            return ext.to_string();
        }
    }
    match item.file_type {
        FileType::Video => "mp4".to_string(),
        FileType::Audio => "mp3".to_string(),
    }
}

fn is_default_thumbnail(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| DEFAULT_THUMBNAILS.contains(&name))
        .unwrap_or(false)
}

/// Construit l'enregistrement DAAP d'un item, estampillé `revision`.
pub fn build_item_record(item: &HostItem, revision: u64) -> DaapItem {
    let item_id = item.id as DaapId;

    // dmap.itemname : titre en base, sinon nom d'affichage.
    let name = item
        .title
        .clone()
        .or_else(|| item.name.clone())
        .unwrap_or_default();

    // Un item issu d'un vrai flux podcast est marqué comme tel, sinon le
    // genre déclaré par les métadonnées est conservé.
    let itemkind = if item.is_from_podcast() {
        Some(dmap::ITEMKIND_PODCAST)
    } else {
        item.kind.map(|kind| kind.to_bitmask())
    };

    let mediakind = match item.file_type {
        FileType::Video => dmap::MEDIAKIND_VIDEO,
        FileType::Audio => dmap::MEDIAKIND_AUDIO,
    };

    let cover_art = item
        .thumbnail
        .as_ref()
        .filter(|path| !is_default_thumbnail(path))
        .cloned();

    DaapItem {
        item_id,
        name,
        format: song_format(item),
        mediakind,
        itemkind,
        duration_ms: item.duration.map(|d| d * DURATION_SCALE).unwrap_or(0),
        size: item.size.unwrap_or(0),
        artist: item.artist.clone(),
        album_artist: item.album_artist.clone(),
        album: item.album.clone(),
        genre: item.genre.clone(),
        year: sentinel(item.year),
        track: sentinel(item.track),
        show: item.show.clone(),
        season_number: item.season_number,
        episode_id: item.episode_id.clone(),
        episode_number: item.episode_number,
        container_item_id: item_id,
        persistent_id: item.id,
        path: item.video_path.clone(),
        cover_art,
        revision,
    }
}

/// Construit l'enregistrement DAAP d'une playlist ou d'un flux.
pub fn build_playlist_record(
    playlist: &HostPlaylist,
    kind: PlaylistKind,
    item_count: usize,
    revision: u64,
) -> DaapPlaylist {
    let name = playlist
        .title
        .clone()
        .or_else(|| playlist.name.clone())
        .unwrap_or_default();

    DaapPlaylist {
        playlist_id: playlist.id as DaapId,
        name,
        item_count,
        parent_container_id: 0,
        persistent_id: playlist.id,
        podcast: kind == PlaylistKind::Feed,
        revision,
    }
}
