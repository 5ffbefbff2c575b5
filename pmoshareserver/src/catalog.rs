//! Catalogue publié au serveur DAAP local.
//!
//! Toutes les structures (items, playlists, appartenances, suppressions par
//! playlist) vivent sous un seul verrou avec le compteur de révision et sa
//! condition variable. Chaque mutation commence par avancer la révision et
//! réveiller les long-polls ; les clients en retard observent les
//! suppressions via les pierres tombales.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use tracing::{debug, warn};

use pmodaap::dmap;
use pmodaap::{
    ConnectionMonitor, DaapId, DaapItem, DaapPlaylist, Entry, FileStream, ServerBackend, SessionId,
};

use crate::model::{HostId, HostItem, HostModel, HostPlaylist, PlaylistKind};
use crate::record::{build_item_record, build_playlist_record};
use crate::transcode::{TranscodeJob, TranscoderBackend};

/// Types de médias exportés, pilotés par la configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShareTypes {
    pub audio: bool,
    pub video: bool,
    pub feed: bool,
}

impl ShareTypes {
    pub fn from_config(config: &pmoconfig::Config) -> ShareTypes {
        ShareTypes {
            audio: config.share_audio().unwrap_or(true),
            video: config.share_video().unwrap_or(true),
            feed: config.share_feed().unwrap_or(false),
        }
    }

    fn allows_mediakind(&self, mediakind: u32) -> bool {
        if mediakind == dmap::MEDIAKIND_AUDIO {
            self.audio
        } else {
            self.video
        }
    }

    /// Un item est servable si son mediakind est partagé et, pour un item de
    /// podcast, si le partage des flux est actif.
    fn allows(&self, item: &DaapItem) -> bool {
        let podcast = item
            .itemkind
            .is_some_and(|kind| kind & dmap::ITEMKIND_PODCAST != 0);
        if podcast && !self.feed {
            return false;
        }
        self.allows_mediakind(item.mediakind)
    }
}

struct CatalogState {
    revision: u64,
    directed: Option<SessionId>,
    share_types: ShareTypes,
    items: HashMap<DaapId, Entry<DaapItem>>,
    playlists: HashMap<DaapId, Entry<DaapPlaylist>>,
    playlist_kinds: HashMap<DaapId, PlaylistKind>,
    playlist_item_map: HashMap<DaapId, Vec<DaapId>>,
    deleted_item_map: HashMap<DaapId, Vec<DaapId>>,
}

struct TranscodeTable {
    in_shutdown: bool,
    jobs: HashMap<SessionId, TranscodeJob>,
}

struct CatalogInner {
    host: Arc<dyn HostModel>,
    config: Arc<pmoconfig::Config>,
    transcoder: Arc<dyn TranscoderBackend>,
    state: Mutex<CatalogState>,
    revision_cv: Condvar,
    transcode: Mutex<TranscodeTable>,
}

/// Catalogue du partage sortant. Clonable : toutes les copies partagent le
/// même état.
#[derive(Clone)]
pub struct ServerCatalog {
    inner: Arc<CatalogInner>,
}

impl ServerCatalog {
    pub fn new(
        host: Arc<dyn HostModel>,
        config: Arc<pmoconfig::Config>,
        transcoder: Arc<dyn TranscoderBackend>,
    ) -> ServerCatalog {
        let share_types = ShareTypes::from_config(&config);
        ServerCatalog {
            inner: Arc::new(CatalogInner {
                host,
                config,
                transcoder,
                state: Mutex::new(CatalogState {
                    revision: 1,
                    directed: None,
                    share_types,
                    items: HashMap::new(),
                    playlists: HashMap::new(),
                    playlist_kinds: HashMap::new(),
                    playlist_item_map: HashMap::new(),
                    deleted_item_map: HashMap::new(),
                }),
                revision_cv: Condvar::new(),
                transcode: Mutex::new(TranscodeTable {
                    in_shutdown: false,
                    jobs: HashMap::new(),
                }),
            }),
        }
    }

    pub fn revision(&self) -> u64 {
        self.inner.state.lock().unwrap().revision
    }

    pub fn share_types(&self) -> ShareTypes {
        self.inner.state.lock().unwrap().share_types
    }

    /// Appartenance courante d'une playlist exportée.
    pub fn playlist_membership(&self, playlist_id: DaapId) -> Vec<DaapId> {
        self.inner
            .state
            .lock()
            .unwrap()
            .playlist_item_map
            .get(&playlist_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Items retirés d'une playlist depuis son dernier remplacement complet,
    /// servis aux clients qui demandent un delta.
    pub fn playlist_deleted_items(&self, playlist_id: DaapId) -> Vec<DaapId> {
        self.inner
            .state
            .lock()
            .unwrap()
            .deleted_item_map
            .get(&playlist_id)
            .cloned()
            .unwrap_or_default()
    }

    // Verrou déjà acquis.
    fn update_revision(inner: &CatalogInner, state: &mut CatalogState, directed: Option<SessionId>) {
        state.revision += 1;
        state.directed = directed;
        inner.revision_cv.notify_all();
    }

    // ------------------------------------------------------------------
    // Amorçage
    // ------------------------------------------------------------------

    /// Amorce le catalogue : playlists sauvegardées et flux non artificiels,
    /// avec leurs appartenances.
    pub fn populate(&self) {
        let inner = &self.inner;
        let playlists: Vec<HostPlaylist> = inner
            .host
            .saved_playlists()
            .into_iter()
            .filter(|playlist| !playlist.is_folder)
            .collect();
        let feeds: Vec<HostPlaylist> = inner
            .host
            .feeds()
            .into_iter()
            .filter(|feed| !feed.is_folder && !feed.is_ersatz())
            .collect();

        let seeded: Vec<(HostPlaylist, PlaylistKind, Vec<HostId>)> = playlists
            .into_iter()
            .map(|playlist| {
                let items = inner.host.playlist_items(playlist.id);
                (playlist, PlaylistKind::Playlist, items)
            })
            .chain(feeds.into_iter().map(|feed| {
                let items = inner.host.feed_items(feed.id);
                (feed, PlaylistKind::Feed, items)
            }))
            .collect();

        let mut state = inner.state.lock().unwrap();
        Self::update_revision(inner, &mut state, None);
        let revision = state.revision;
        for (playlist, kind, items) in seeded {
            let record = build_playlist_record(&playlist, kind, items.len(), revision);
            let playlist_id = record.playlist_id;
            state.playlists.insert(playlist_id, Entry::Live(record));
            state.playlist_kinds.insert(playlist_id, kind);
            state
                .playlist_item_map
                .insert(playlist_id, items.iter().map(|id| *id as DaapId).collect());
            state.deleted_item_map.insert(playlist_id, Vec::new());
        }
    }

    /// Amorce puis s'abonne aux scopes d'items : bibliothèque d'abord, puis
    /// chaque playlist exportée.
    pub fn start_tracking(&self) {
        self.populate();
        self.inner.host.track_items(None);
        let scopes: Vec<(HostId, PlaylistKind)> = {
            let state = self.inner.state.lock().unwrap();
            state
                .playlist_kinds
                .iter()
                .map(|(playlist_id, kind)| (*playlist_id as HostId, *kind))
                .collect()
        };
        for (playlist_id, kind) in scopes {
            self.inner.host.track_items(Some((playlist_id, kind)));
        }
    }

    pub fn stop_tracking(&self) {
        let scopes: Vec<(HostId, PlaylistKind)> = {
            let state = self.inner.state.lock().unwrap();
            state
                .playlist_kinds
                .iter()
                .map(|(playlist_id, kind)| (*playlist_id as HostId, *kind))
                .collect()
        };
        for (playlist_id, kind) in scopes {
            self.inner.host.stop_tracking_items(Some((playlist_id, kind)));
        }
        self.inner.host.stop_tracking_items(None);
    }

    // ------------------------------------------------------------------
    // Ingestion des évènements du modèle hôte
    // ------------------------------------------------------------------

    /// Remplacement complet d'un scope : la bibliothèque (`None`) ou une
    /// playlist. Pour la bibliothèque, les items absents deviennent des
    /// pierres tombales.
    pub fn item_list(&self, playlist_id: Option<DaapId>, items: Vec<HostItem>) {
        let inner = &self.inner;
        let mut state = inner.state.lock().unwrap();
        Self::update_revision(inner, &mut state, None);
        let revision = state.revision;

        match playlist_id {
            Some(playlist_id) => {
                if let Some(Entry::Live(playlist)) = state.playlists.get_mut(&playlist_id) {
                    playlist.revision = revision;
                }
                let member_ids: Vec<DaapId> =
                    items.iter().map(|item| item.id as DaapId).collect();
                // Aligner la révision des items membres pour que le fetch de
                // la playlist soit cohérent.
                for member_id in &member_ids {
                    if let Some(Entry::Live(record)) = state.items.get_mut(member_id) {
                        record.revision = revision;
                    }
                    // Item de podcast non téléchargé : pas encore exporté.
                }
                state.playlist_item_map.insert(playlist_id, member_ids);
                state.deleted_item_map.insert(playlist_id, Vec::new());
            }
            None => {
                let new_ids: HashSet<DaapId> =
                    items.iter().map(|item| item.id as DaapId).collect();
                let stale: Vec<DaapId> = state
                    .items
                    .keys()
                    .filter(|item_id| !new_ids.contains(item_id))
                    .copied()
                    .collect();
                for item in &items {
                    state
                        .items
                        .insert(item.id as DaapId, Entry::Live(build_item_record(item, revision)));
                }
                for item_id in stale {
                    state.items.insert(item_id, Entry::Tombstone { revision });
                }
            }
        }
    }

    /// Diff d'un scope. Pour la bibliothèque, les retraits deviennent des
    /// pierres tombales ; pour une playlist, l'appartenance est ajustée et
    /// les items précédemment retirés de cette playlist sont restaurés.
    pub fn items_changed(
        &self,
        playlist_id: Option<DaapId>,
        added: Vec<HostItem>,
        changed: Vec<HostItem>,
        removed: Vec<HostId>,
    ) {
        let inner = &self.inner;
        let mut state = inner.state.lock().unwrap();
        Self::update_revision(inner, &mut state, None);
        let revision = state.revision;

        for host_id in &removed {
            let item_id = *host_id as DaapId;
            match playlist_id {
                Some(playlist_id) => {
                    if let Some(Entry::Live(playlist)) = state.playlists.get_mut(&playlist_id) {
                        playlist.revision = revision;
                    }
                    if let Some(members) = state.playlist_item_map.get_mut(&playlist_id) {
                        members.retain(|member| *member != item_id);
                    }
                    if let Some(deleted) = state.deleted_item_map.get_mut(&playlist_id) {
                        deleted.push(item_id);
                    }
                }
                None => {
                    state.items.insert(item_id, Entry::Tombstone { revision });
                }
            }
        }

        match playlist_id {
            Some(playlist_id) => {
                let added_ids: Vec<DaapId> =
                    added.iter().map(|item| item.id as DaapId).collect();
                if let Some(Entry::Live(playlist)) = state.playlists.get_mut(&playlist_id) {
                    playlist.revision = revision;
                }
                // Restaurer ce qui avait été retiré puis remis.
                if let Some(deleted) = state.deleted_item_map.get_mut(&playlist_id) {
                    deleted.retain(|item_id| !added_ids.contains(item_id));
                }
                if let Some(members) = state.playlist_item_map.get_mut(&playlist_id) {
                    for item_id in &added_ids {
                        if !members.contains(item_id) {
                            members.push(*item_id);
                        }
                    }
                }
                // Le contenu des items ne change pas ici : seule leur
                // révision avance. Les items de flux pas encore téléchargés
                // sont ignorés.
                for item in added.iter().chain(changed.iter()) {
                    if let Some(Entry::Live(record)) = state.items.get_mut(&(item.id as DaapId)) {
                        record.revision = revision;
                    }
                }
            }
            None => {
                for item in added.iter().chain(changed.iter()) {
                    state
                        .items
                        .insert(item.id as DaapId, Entry::Live(build_item_record(item, revision)));
                }
            }
        }
    }

    /// Nouvelles playlists ou nouveaux flux ; les dossiers sont ignorés.
    pub fn playlist_added(&self, playlists: Vec<HostPlaylist>, kind: PlaylistKind) {
        let inner = &self.inner;
        let seeded: Vec<(HostPlaylist, usize)> = playlists
            .into_iter()
            .filter(|playlist| !playlist.is_folder)
            .map(|playlist| {
                let count = match kind {
                    PlaylistKind::Playlist => inner.host.playlist_items(playlist.id).len(),
                    PlaylistKind::Feed => inner.host.feed_items(playlist.id).len(),
                };
                (playlist, count)
            })
            .collect();

        {
            let mut state = inner.state.lock().unwrap();
            Self::update_revision(inner, &mut state, None);
            let revision = state.revision;
            for (playlist, count) in &seeded {
                let record = build_playlist_record(playlist, kind, *count, revision);
                let playlist_id = record.playlist_id;
                state.playlists.insert(playlist_id, Entry::Live(record));
                state.playlist_kinds.insert(playlist_id, kind);
                state.playlist_item_map.insert(playlist_id, Vec::new());
                state.deleted_item_map.insert(playlist_id, Vec::new());
            }
        }

        for (playlist, _) in &seeded {
            inner.host.track_items(Some((playlist.id, kind)));
        }
    }

    /// Playlists renommées ou modifiées : reconstruction des
    /// enregistrements connus.
    pub fn playlist_changed(&self, playlists: Vec<HostPlaylist>, kind: PlaylistKind) {
        let inner = &self.inner;
        let rebuilt: Vec<(HostPlaylist, usize)> = playlists
            .into_iter()
            .filter(|playlist| !playlist.is_folder)
            .map(|playlist| {
                let count = match kind {
                    PlaylistKind::Playlist => inner.host.playlist_items(playlist.id).len(),
                    PlaylistKind::Feed => inner.host.feed_items(playlist.id).len(),
                };
                (playlist, count)
            })
            .collect();

        let mut state = inner.state.lock().unwrap();
        Self::update_revision(inner, &mut state, None);
        let revision = state.revision;
        for (playlist, count) in rebuilt {
            let playlist_id = playlist.id as DaapId;
            // Clé absente : dossier ou playlist inconnue, ignorée.
            if state.playlists.contains_key(&playlist_id) {
                state.playlists.insert(
                    playlist_id,
                    Entry::Live(build_playlist_record(&playlist, kind, count, revision)),
                );
            }
        }
    }

    /// Playlists supprimées : pierre tombale + oubli des appartenances.
    pub fn playlist_removed(&self, removed: Vec<HostId>) {
        let inner = &self.inner;
        let mut scopes: Vec<(HostId, PlaylistKind)> = Vec::new();
        {
            let mut state = inner.state.lock().unwrap();
            Self::update_revision(inner, &mut state, None);
            let revision = state.revision;
            for host_id in removed {
                let playlist_id = host_id as DaapId;
                if !state.playlists.contains_key(&playlist_id) {
                    // Dossier jamais exporté.
                    continue;
                }
                state
                    .playlists
                    .insert(playlist_id, Entry::Tombstone { revision });
                if state.playlist_item_map.remove(&playlist_id).is_none() {
                    debug!(playlist_id, "cannot delete playlist_item_map entry");
                }
                if state.deleted_item_map.remove(&playlist_id).is_none() {
                    debug!(playlist_id, "cannot delete deleted_item_map entry");
                }
                if let Some(kind) = state.playlist_kinds.remove(&playlist_id) {
                    scopes.push((host_id, kind));
                }
            }
        }
        for (playlist_id, kind) in scopes {
            inner.host.stop_tracking_items(Some((playlist_id, kind)));
        }
    }

    /// Flux ajoutés : les artefacts `dtv:` ne sont jamais exportés.
    pub fn feed_added(&self, feeds: Vec<HostPlaylist>) {
        let feeds = feeds.into_iter().filter(|feed| !feed.is_ersatz()).collect();
        self.playlist_added(feeds, PlaylistKind::Feed);
    }

    pub fn feed_changed(&self, feeds: Vec<HostPlaylist>) {
        let feeds = feeds.into_iter().filter(|feed| !feed.is_ersatz()).collect();
        self.playlist_changed(feeds, PlaylistKind::Feed);
    }

    pub fn feed_removed(&self, removed: Vec<HostId>) {
        self.playlist_removed(removed);
    }

    // ------------------------------------------------------------------
    // Réaction à la configuration
    // ------------------------------------------------------------------

    /// Recalcule les types partagés. Si l'ensemble effectif change, avance
    /// la révision puis estampille tous les enregistrements : chaque client
    /// observera la bascule du filtre.
    pub fn on_config_changed(&self, event: &pmoconfig::ConfigEvent) {
        if !(event.is(pmoconfig::SHARE_AUDIO)
            || event.is(pmoconfig::SHARE_VIDEO)
            || event.is(pmoconfig::SHARE_FEED))
        {
            return;
        }
        let inner = &self.inner;
        let share_types = ShareTypes::from_config(&inner.config);

        let mut state = inner.state.lock().unwrap();
        let share_types_orig = state.share_types;
        state.share_types = share_types;
        if share_types_orig != share_types {
            Self::update_revision(inner, &mut state, None);
        }
        let revision = state.revision;
        for entry in state.playlists.values_mut() {
            match entry {
                Entry::Live(playlist) => playlist.revision = revision,
                Entry::Tombstone { revision: r } => *r = revision,
            }
        }
        for entry in state.items.values_mut() {
            match entry {
                Entry::Live(item) => item.revision = revision,
                Entry::Tombstone { revision: r } => *r = revision,
            }
        }
    }

    // ------------------------------------------------------------------
    // Sessions & arrêt
    // ------------------------------------------------------------------

    /// Fin de session côté serveur : le job de transcodage éventuel est
    /// arrêté.
    pub fn finished(&self, session: SessionId) {
        let job = self.inner.transcode.lock().unwrap().jobs.remove(&session);
        if let Some(mut job) = job {
            job.shutdown();
        }
    }

    /// Arrêt global : le drapeau est posé sous le verrou de transcodage en
    /// même temps que les jobs sont arrêtés, fermant la fenêtre où un
    /// nouveau job pourrait se créer.
    pub fn shutdown(&self) {
        let mut table = self.inner.transcode.lock().unwrap();
        table.in_shutdown = true;
        for job in table.jobs.values_mut() {
            job.shutdown();
        }
        table.jobs.clear();
    }
}

impl ServerBackend for ServerCatalog {
    fn get_playlists(&self) -> HashMap<DaapId, Entry<DaapPlaylist>> {
        let state = self.inner.state.lock().unwrap();
        let send_podcast = state.share_types.feed;
        state
            .playlists
            .iter()
            .map(|(playlist_id, entry)| {
                let entry = match entry {
                    Entry::Live(playlist) if playlist.podcast && !send_podcast => {
                        Entry::Tombstone {
                            revision: state.revision,
                        }
                    }
                    other => other.clone(),
                };
                (*playlist_id, entry)
            })
            .collect()
    }

    fn get_items(&self, playlist_id: Option<DaapId>) -> HashMap<DaapId, Entry<DaapItem>> {
        let state = self.inner.state.lock().unwrap();
        let revision = state.revision;
        let filtered = |entry: &Entry<DaapItem>| -> Entry<DaapItem> {
            match entry {
                Entry::Live(item) if !state.share_types.allows(item) => {
                    // L'id survit : les clients en retard voient la bascule.
                    Entry::Tombstone { revision }
                }
                other => other.clone(),
            }
        };

        match playlist_id {
            None => state
                .items
                .iter()
                .map(|(item_id, entry)| (*item_id, filtered(entry)))
                .collect(),
            Some(playlist_id) => {
                let Some(members) = state.playlist_item_map.get(&playlist_id) else {
                    return HashMap::new();
                };
                state
                    .items
                    .iter()
                    .map(|(item_id, entry)| {
                        if members.contains(item_id) {
                            (*item_id, filtered(entry))
                        } else {
                            (*item_id, Entry::Tombstone { revision })
                        }
                    })
                    .collect()
            }
        }
    }

    fn get_revision(
        &self,
        session: SessionId,
        old_revision: u64,
        monitor: ConnectionMonitor,
    ) -> u64 {
        // Watcher : la fermeture de la connexion débloque l'attente par un
        // réveil dirigé vers cette session.
        {
            let inner = self.inner.clone();
            let spawned = thread::Builder::new()
                .name("revision watcher".to_string())
                .spawn(move || {
                    monitor.wait_closed();
                    let mut state = inner.state.lock().unwrap();
                    debug!(session, "long-poll connection closed, directed wakeup");
                    state.revision += 1;
                    state.directed = Some(session);
                    inner.revision_cv.notify_all();
                });
            if spawned.is_err() {
                warn!(session, "cannot spawn revision watcher");
            }
        }

        let mut state = self.inner.state.lock().unwrap();
        let mut old_revision = old_revision;
        while state.revision == old_revision {
            state = self.inner.revision_cv.wait(state).unwrap();
            // Réveil réel ou dirigé vers nous : on rend la révision.
            if state.directed.is_none() || state.directed == Some(session) {
                break;
            }
            // Réveil dirigé ailleurs : se recaler et attendre encore.
            old_revision = state.revision;
        }
        state.revision
    }

    fn get_file(
        &self,
        item_id: DaapId,
        generation: u64,
        ext: &str,
        session: SessionId,
        request_path: &dyn Fn(u64) -> String,
        offset: u64,
        chunk: Option<u64>,
    ) -> Option<(FileStream, String)> {
        let item = {
            let state = self.inner.state.lock().unwrap();
            match state.items.get(&item_id) {
                Some(Entry::Live(item)) => item.clone(),
                _ => return None,
            }
        };
        let filename = item
            .path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();

        match ext {
            "ts" | "m3u8" => {
                // Décision sous verrou ; l'ancien job est sorti de la table
                // et arrêté dehors.
                let (mut job, old_job, need_create) = {
                    let mut table = self.inner.transcode.lock().unwrap();
                    if table.in_shutdown {
                        return None;
                    }
                    match table.jobs.remove(&session) {
                        Some(existing) if existing.item_id() != item_id => (
                            TranscodeJob::new(&item.path, item_id, generation, chunk),
                            Some(existing),
                            true,
                        ),
                        Some(existing) => {
                            if generation < existing.generation() {
                                // Une requête plus récente a déjà pris la main.
                                debug!(item_id, "transcode request out of order");
                                table.jobs.insert(session, existing);
                                return None;
                            }
                            let seek = chunk.is_some_and(|chunk| existing.is_seek(chunk));
                            if generation > existing.generation() || seek {
                                (
                                    TranscodeJob::new(&item.path, item_id, generation, chunk),
                                    Some(existing),
                                    true,
                                )
                            } else {
                                (existing, None, false)
                            }
                        }
                        None => (
                            TranscodeJob::new(&item.path, item_id, generation, chunk),
                            None,
                            true,
                        ),
                    }
                };

                if let Some(mut old_job) = old_job {
                    old_job.shutdown();
                }
                if need_create {
                    if let Err(error) = job.start(self.inner.transcoder.as_ref(), request_path) {
                        warn!(item_id, %error, "cannot start transcode pipeline");
                        return None;
                    }
                }

                let stream = match ext {
                    "m3u8" => job.playlist(offset),
                    _ => job.next_chunk(),
                };
                let stream = match stream {
                    Ok(stream) => stream,
                    Err(error) => {
                        warn!(item_id, %error, "transcode read failed");
                        None
                    }
                };

                {
                    let mut table = self.inner.transcode.lock().unwrap();
                    if table.in_shutdown || table.jobs.contains_key(&session) {
                        // Supplanté pendant la lecture : ce job est périmé.
                        job.shutdown();
                        return None;
                    }
                    table.jobs.insert(session, job);
                }

                stream.map(|stream| (stream, filename))
            }
            "coverart" => {
                let cover_art = item.cover_art.as_ref()?;
                match File::open(cover_art) {
                    Ok(mut file) => {
                        if file.seek(SeekFrom::Start(offset)).is_err() {
                            return None;
                        }
                        Some((FileStream::File(file), filename))
                    }
                    Err(error) => {
                        warn!(item_id, %error, "cannot open cover art");
                        None
                    }
                }
            }
            _ => {
                // Streaming direct : un job de transcodage en attente pour la
                // session devient caduc.
                let job = self.inner.transcode.lock().unwrap().jobs.remove(&session);
                if let Some(mut job) = job {
                    job.shutdown();
                }
                match File::open(&item.path) {
                    Ok(mut file) => {
                        if file.seek(SeekFrom::Start(offset)).is_err() {
                            return None;
                        }
                        Some((FileStream::File(file), filename))
                    }
                    Err(error) => {
                        warn!(item_id, %error, "cannot open media file");
                        None
                    }
                }
            }
        }
    }
}
