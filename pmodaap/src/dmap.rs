//! Constantes DMAP/DAAP utilisées de part et d'autre du moteur.
//!
//! La table de correspondance tag ↔ attribut est partagée entre l'import
//! (client) et l'export (serveur) ; voir `pmosharing::item` et
//! `pmoshareserver::record`.

use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::Mutex;

pub const ITEM_KIND: &str = "dmap.itemkind";
pub const ITEM_ID: &str = "dmap.itemid";
pub const ITEM_NAME: &str = "dmap.itemname";
pub const CONTAINER_ITEM_ID: &str = "dmap.containeritemid";
pub const PARENT_CONTAINER_ID: &str = "dmap.parentcontainerid";
pub const PERSISTENT_ID: &str = "dmap.persistentid";
pub const ITEM_COUNT: &str = "dmap.itemcount";
pub const BASE_PLAYLIST: &str = "daap.baseplaylist";

pub const SONG_FORMAT: &str = "daap.songformat";
pub const SONG_TIME: &str = "daap.songtime";
pub const SONG_SIZE: &str = "daap.songsize";
pub const SONG_ARTIST: &str = "daap.songartist";
pub const SONG_ALBUM_ARTIST: &str = "daap.songalbumartist";
pub const SONG_ALBUM: &str = "daap.songalbum";
pub const SONG_GENRE: &str = "daap.songgenre";
pub const SONG_YEAR: &str = "daap.songyear";
pub const SONG_TRACK_NUMBER: &str = "daap.songtracknumber";
pub const SONG_USER_RATING: &str = "daap.songuserrating";

pub const MEDIAKIND: &str = "com.apple.itunes.mediakind";
pub const SERIES_NAME: &str = "com.apple.itunes.series-name";
pub const SEASON_NUM: &str = "com.apple.itunes.season-num";
pub const EPISODE_NUM_STR: &str = "com.apple.itunes.episode-num-str";
pub const EPISODE_SORT: &str = "com.apple.itunes.episode-sort";
pub const PODCAST_PLAYLIST: &str = "com.apple.itunes.is-podcast-playlist";

/// Tag propriétaire transportant le genre d'item (film, podcast, ...).
pub const MIRO_ITEM_KIND: &str = "org.participatoryculture.miro.itemkind";

/// Liste `meta` demandée pour chaque requête items.
pub const DAAP_META: &[&str] = &[
    ITEM_KIND,
    ITEM_ID,
    ITEM_NAME,
    CONTAINER_ITEM_ID,
    PARENT_CONTAINER_ID,
    SONG_TIME,
    SONG_SIZE,
    SONG_FORMAT,
    SONG_ARTIST,
    SONG_ALBUM_ARTIST,
    SONG_ALBUM,
    SONG_GENRE,
    SONG_YEAR,
    SONG_TRACK_NUMBER,
    SONG_USER_RATING,
    MIRO_ITEM_KIND,
    MEDIAKIND,
    SERIES_NAME,
    SEASON_NUM,
    EPISODE_NUM_STR,
    EPISODE_SORT,
];

// com.apple.itunes.mediakind (valeurs iTunes)
pub const MEDIAKIND_AUDIO: u32 = 1;
pub const MEDIAKIND_MOVIE: u32 = 2;
pub const MEDIAKIND_PODCAST: u32 = 4;
pub const MEDIAKIND_AUDIOBOOK: u32 = 8;
pub const MEDIAKIND_MUSICVIDEO: u32 = 32;
pub const MEDIAKIND_TV: u32 = 64;
/// "Home video" générique, envoyé par certains serveurs.
pub const MEDIAKIND_VIDEO: u32 = 2_097_152;

// Bitmask org.participatoryculture.miro.itemkind
pub const ITEMKIND_MOVIE: u8 = 1 << 0;
pub const ITEMKIND_PODCAST: u8 = 1 << 1;
pub const ITEMKIND_SHOW: u8 = 1 << 2;
pub const ITEMKIND_CLIP: u8 = 1 << 3;

/// Types de valeurs DMAP, pour l'enregistrement de tags personnalisés.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmapType {
    Ubyte,
    Byte,
    Ushort,
    Short,
    Uint,
    Int,
    Ulong,
    Long,
    Str,
    Date,
    Version,
    List,
}

#[derive(Debug, Clone)]
pub struct MetaEntry {
    pub code: &'static str,
    pub dmap_type: DmapType,
}

lazy_static! {
    static ref CUSTOM_META: Mutex<HashMap<&'static str, MetaEntry>> = Mutex::new(HashMap::new());
}

/// Déclare un tag DMAP non standard auprès du codec.
///
/// Idempotent : ré-enregistrer le même tag écrase l'entrée précédente.
pub fn register_meta(tag: &'static str, code: &'static str, dmap_type: DmapType) {
    CUSTOM_META
        .lock()
        .unwrap()
        .insert(tag, MetaEntry { code, dmap_type });
}

/// Retourne l'entrée enregistrée pour un tag personnalisé.
pub fn registered_meta(tag: &str) -> Option<MetaEntry> {
    CUSTOM_META.lock().unwrap().get(tag).cloned()
}
