//! Base miroir SQLite d'un partage distant.
//!
//! Une base par partage, nommée `sharing-db-<n>` dans le répertoire de
//! support, supprimée à la destruction du partage. Toutes les écritures
//! viennent du thread de la boucle d'évènements.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use pmodaap::DaapId;

use crate::error::Result;
use crate::item::{FileType, ItemKind, SharingItem};

/// Clé de playlist dans la table relationnelle : identifiant DAAP pour les
/// playlists réelles, nom réservé pour les playlists virtuelles.
pub const VIRTUAL_PODCAST: &str = "podcast";
pub const VIRTUAL_PLAYLIST: &str = "playlist";

pub fn playlist_key(playlist_id: DaapId) -> String {
    playlist_id.to_string()
}

/// Magasin des items miroir et des appartenances aux playlists.
pub struct ShareStore {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl ShareStore {
    /// Ouvre (ou crée) la base au chemin donné.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS sharing_items (
                daap_id INTEGER PRIMARY KEY,
                title TEXT,
                artist TEXT,
                album TEXT,
                album_artist TEXT,
                genre TEXT,
                year INTEGER,
                track INTEGER,
                duration INTEGER,
                size INTEGER,
                file_format TEXT,
                file_type TEXT NOT NULL,
                kind TEXT,
                show TEXT,
                season_number INTEGER,
                episode_id TEXT,
                episode_number INTEGER,
                host TEXT NOT NULL,
                port INTEGER NOT NULL,
                address TEXT NOT NULL,
                video_path TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS playlist_items (
                playlist_key TEXT NOT NULL,
                item_id INTEGER NOT NULL,
                PRIMARY KEY (playlist_key, item_id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_playlist_items_item
             ON playlist_items(item_id)",
            [],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insère ou met à jour un item miroir.
    pub fn upsert_item(&self, item: &SharingItem) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO sharing_items (
                daap_id, title, artist, album, album_artist, genre, year,
                track, duration, size, file_format, file_type, kind, show,
                season_number, episode_id, episode_number, host, port,
                address, video_path
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                       ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)",
            params![
                item.daap_id,
                item.title,
                item.artist,
                item.album,
                item.album_artist,
                item.genre,
                item.year,
                item.track,
                item.duration,
                item.size,
                item.file_format,
                item.file_type.as_str(),
                item.kind.map(|k| k.as_str()),
                item.show,
                item.season_number,
                item.episode_id,
                item.episode_number,
                item.host,
                item.port,
                item.address,
                item.video_path,
            ],
        )?;
        Ok(())
    }

    /// Supprime un item ; retourne `false` quand il n'existait pas.
    pub fn remove_item(&self, daap_id: DaapId) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute(
            "DELETE FROM sharing_items WHERE daap_id = ?1",
            params![daap_id],
        )?;
        conn.execute(
            "DELETE FROM playlist_items WHERE item_id = ?1",
            params![daap_id],
        )?;
        Ok(removed > 0)
    }

    pub fn get_item(&self, daap_id: DaapId) -> Result<Option<SharingItem>> {
        let conn = self.conn.lock().unwrap();
        let item = conn
            .query_row(
                "SELECT daap_id, title, artist, album, album_artist, genre,
                        year, track, duration, size, file_format, file_type,
                        kind, show, season_number, episode_id, episode_number,
                        host, port, address, video_path
                 FROM sharing_items WHERE daap_id = ?1",
                params![daap_id],
                |row| {
                    Ok(SharingItem {
                        daap_id: row.get(0)?,
                        title: row.get(1)?,
                        artist: row.get(2)?,
                        album: row.get(3)?,
                        album_artist: row.get(4)?,
                        genre: row.get(5)?,
                        year: row.get(6)?,
                        track: row.get(7)?,
                        duration: row.get(8)?,
                        size: row.get(9)?,
                        file_format: row.get(10)?,
                        file_type: FileType::parse(&row.get::<_, String>(11)?)
                            .unwrap_or(FileType::Audio),
                        kind: row
                            .get::<_, Option<String>>(12)?
                            .as_deref()
                            .and_then(ItemKind::parse),
                        show: row.get(13)?,
                        season_number: row.get(14)?,
                        episode_id: row.get(15)?,
                        episode_number: row.get(16)?,
                        host: row.get(17)?,
                        port: row.get(18)?,
                        address: row.get(19)?,
                        video_path: row.get(20)?,
                    })
                },
            )
            .optional()?;
        Ok(item)
    }

    pub fn item_count(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sharing_items", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Remplace l'appartenance complète d'une playlist.
    pub fn set_playlist_items(&self, key: &str, items: &HashSet<DaapId>) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM playlist_items WHERE playlist_key = ?1",
            params![key],
        )?;
        for item_id in items {
            tx.execute(
                "INSERT OR IGNORE INTO playlist_items (playlist_key, item_id) VALUES (?1, ?2)",
                params![key, item_id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn playlist_items(&self, key: &str) -> Result<HashSet<DaapId>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT item_id FROM playlist_items WHERE playlist_key = ?1")?;
        let rows = stmt.query_map(params![key], |row| row.get::<_, DaapId>(0))?;
        let mut items = HashSet::new();
        for row in rows {
            items.insert(row?);
        }
        Ok(items)
    }

    pub fn remove_playlist(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM playlist_items WHERE playlist_key = ?1",
            params![key],
        )?;
        Ok(())
    }

    /// Vide la base (déconnexion du partage).
    pub fn purge(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM sharing_items", [])?;
        conn.execute("DELETE FROM playlist_items", [])?;
        Ok(())
    }
}
