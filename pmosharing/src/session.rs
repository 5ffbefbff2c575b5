//! Session cliente d'un partage : thread réseau + continuations backend.
//!
//! Un thread dédié possède tout le dialogue avec la connexion DAAP ; le
//! thread de la boucle d'évènements possède toutes les mutations de la base
//! miroir et les notifications UI. Chaque opération bloquante poste
//! exactement une continuation (résultat ou erreur) sur la boucle avant que
//! le thread client n'enchaîne sur l'appel suivant, ce qui garantit l'ordre
//! d'application des mises à jour.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::thread;

use tracing::{debug, warn};

use pmodaap::dmap::DAAP_META;
use pmodaap::{DaapClient, DaapId, RemoteItem, RemotePlaylist};

use crate::error::{Error, Result};
use crate::item::{scrub_nuls, SharingItem};
use crate::messages::{PlaylistTabInfo, SharingMessage};
use crate::share::Share;
use crate::store::{playlist_key, VIRTUAL_PLAYLIST, VIRTUAL_PODCAST};

/// Etats de la machine de session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    SnapshotApplying,
    Idle,
    Updating,
    UpdateApplying,
    Disconnecting,
    Failed,
}

/// Résultat immuable d'un snapshot ou d'un delta, collecté en une passe sur
/// le thread client puis consommé sur la boucle d'évènements.
#[derive(Debug, Default)]
pub struct ClientUpdateResult {
    pub update: bool,
    pub items: HashMap<DaapId, RemoteItem>,
    pub item_paths: HashMap<DaapId, String>,
    pub deleted_items: Vec<DaapId>,
    pub playlists: HashMap<DaapId, RemotePlaylist>,
    pub deleted_playlists: Vec<DaapId>,
    pub playlist_items: HashMap<DaapId, HashSet<DaapId>>,
    pub playlist_deleted_items: HashMap<DaapId, Vec<DaapId>>,
}

impl ClientUpdateResult {
    /// Collecte databases, playlists, items et appartenances depuis le
    /// client. Les chaînes sont nettoyées de leurs octets NUL et la base
    /// playlist du serveur est écartée d'emblée.
    pub fn fetch(client: &dyn DaapClient, update: bool) -> Result<Self> {
        let mut result = ClientUpdateResult {
            update,
            ..Default::default()
        };

        if client.databases(update)?.is_empty() {
            return Err(Error::Protocol("cannot get database".to_string()));
        }

        let playlist_delta = client.playlists(update)?;
        result.deleted_playlists = playlist_delta.deleted;
        for (playlist_id, mut data) in playlist_delta.added {
            if data.base_playlist {
                continue;
            }
            data.name = data.name.as_deref().map(scrub_nuls);
            result.playlists.insert(playlist_id, data);
        }

        let item_delta = client.items(DAAP_META, None, update)?;
        result.deleted_items = item_delta.deleted;
        for (item_id, data) in item_delta.added {
            let url = client.file_url(item_id, data.format.as_deref());
            result.item_paths.insert(item_id, url);
            result.items.insert(item_id, data);
        }

        for playlist_id in result.playlists.keys() {
            let delta = client.items(DAAP_META, Some(*playlist_id), update)?;
            result
                .playlist_items
                .insert(*playlist_id, delta.added.keys().copied().collect());
            result
                .playlist_deleted_items
                .insert(*playlist_id, delta.deleted);
        }

        Ok(result)
    }
}

/// Suivi des playlists annoncées par le serveur distant.
#[derive(Debug, Default)]
pub struct PlaylistTracker {
    playlist_data: HashMap<DaapId, RemotePlaylist>,
    playlist_items: HashMap<DaapId, HashSet<DaapId>>,
}

impl PlaylistTracker {
    /// Applique un delta : données de playlists puis appartenances, en mode
    /// ensembliste (ajouts moins suppressions depuis le snapshot).
    pub fn update(&mut self, result: &ClientUpdateResult) {
        for (playlist_id, data) in &result.playlists {
            if !self.playlist_data.contains_key(playlist_id) {
                self.playlist_items.insert(*playlist_id, HashSet::new());
            }
            self.playlist_data.insert(*playlist_id, data.clone());
        }
        for playlist_id in &result.deleted_playlists {
            if self.playlist_data.remove(playlist_id).is_none() {
                debug!(playlist_id, "deleted playlist was not tracked");
            }
            self.playlist_items.remove(playlist_id);
        }
        for (playlist_id, item_ids) in &result.playlist_items {
            if let Some(set) = self.playlist_items.get_mut(playlist_id) {
                set.extend(item_ids.iter().copied());
            }
        }
        for (playlist_id, item_ids) in &result.playlist_deleted_items {
            if let Some(set) = self.playlist_items.get_mut(playlist_id) {
                for item_id in item_ids {
                    set.remove(item_id);
                }
            }
        }
    }

    fn playlist_data_valid(data: &RemotePlaylist) -> bool {
        data.item_id.is_some() && data.name.as_deref().is_some_and(|name| !name.is_empty())
    }

    /// Playlists actuellement visibles : au moins un item, et les champs
    /// `dmap.itemid` et `dmap.itemname` présents.
    pub fn current_playlists(&self) -> HashMap<DaapId, RemotePlaylist> {
        self.playlist_data
            .iter()
            .filter(|(playlist_id, data)| {
                self.playlist_items
                    .get(playlist_id)
                    .is_some_and(|items| !items.is_empty())
                    && Self::playlist_data_valid(data)
            })
            .map(|(playlist_id, data)| (*playlist_id, data.clone()))
            .collect()
    }

    /// Union des items appartenant à une playlist podcast.
    pub fn items_in_podcasts(&self) -> HashSet<DaapId> {
        let mut union = HashSet::new();
        for (playlist_id, data) in &self.playlist_data {
            if data.podcast {
                if let Some(items) = self.playlist_items.get(playlist_id) {
                    union.extend(items.iter().copied());
                }
            }
        }
        union
    }

    /// Union des items appartenant à une playlist non-podcast.
    pub fn items_in_playlists(&self) -> HashSet<DaapId> {
        let mut union = HashSet::new();
        for (playlist_id, data) in &self.playlist_data {
            if !data.podcast {
                if let Some(items) = self.playlist_items.get(playlist_id) {
                    union.extend(items.iter().copied());
                }
            }
        }
        union
    }

    pub fn playlist_items(&self) -> &HashMap<DaapId, HashSet<DaapId>> {
        &self.playlist_items
    }
}

struct SessionInner {
    client: Option<Arc<dyn DaapClient>>,
    address: Option<IpAddr>,
    state: SessionState,
    playlists: PlaylistTracker,
    current_item_ids: HashSet<DaapId>,
    current_playlist_ids: HashSet<DaapId>,
}

/// Suivi d'un partage connecté.
pub struct ClientSession {
    share: Arc<Share>,
    inner: Mutex<SessionInner>,
}

impl ClientSession {
    /// Crée la session et démarre son thread client.
    pub fn start(share: Arc<Share>) -> Arc<ClientSession> {
        let session = Arc::new(ClientSession {
            share: share.clone(),
            inner: Mutex::new(SessionInner {
                client: None,
                address: None,
                state: SessionState::Connecting,
                playlists: PlaylistTracker::default(),
                current_item_ids: HashSet::new(),
                current_playlist_ids: HashSet::new(),
            }),
        });

        share.update_started();

        let runner = session.clone();
        let title = format!(
            "Sharing Client {} @ ({}, {})",
            share.name(),
            share.host(),
            share.port()
        );
        if thread::Builder::new()
            .name(title)
            .spawn(move || runner.runloop())
            .is_err()
        {
            warn!(share_id = share.share_id(), "cannot spawn client thread");
        }

        session
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().unwrap().state
    }

    fn set_state(&self, state: SessionState) {
        self.inner.lock().unwrap().state = state;
    }

    fn thread_client(&self) -> Option<Arc<dyn DaapClient>> {
        self.inner.lock().unwrap().client.clone()
    }

    // ------------------------------------------------------------------
    // Thread client
    // ------------------------------------------------------------------

    fn runloop(self: Arc<Self>) {
        let success = self.run_connect();
        let supports_update = self
            .thread_client()
            .map(|client| client.supports_update())
            .unwrap_or(false);
        debug!(
            share_id = self.share.share_id(),
            supports_update, "client connected"
        );
        // Sans support update, la boucle n'aurait rien à attendre.
        if !success || !supports_update {
            return;
        }
        loop {
            if !self.run_update() {
                break;
            }
        }
    }

    /// Exécute l'opération bloquante puis poste la continuation idoine.
    fn run_connect(self: &Arc<Self>) -> bool {
        match self.client_connect() {
            Ok(result) => {
                let session = self.clone();
                self.share.context().event_loop.call(
                    "client connect callback",
                    move || session.client_connect_callback(result),
                );
                true
            }
            Err(err) => {
                let session = self.clone();
                self.share.context().event_loop.call(
                    "client connect error callback",
                    move || session.client_connect_error_callback(err),
                );
                false
            }
        }
    }

    fn run_update(self: &Arc<Self>) -> bool {
        match self.client_update() {
            Ok(result) => {
                let session = self.clone();
                self.share.context().event_loop.call(
                    "client update callback",
                    move || session.client_update_callback(result),
                );
                true
            }
            Err(err) => {
                let session = self.clone();
                self.share.context().event_loop.call(
                    "client update error callback",
                    move || session.client_update_error_callback(err),
                );
                false
            }
        }
    }

    fn client_connect(&self) -> Result<ClientUpdateResult> {
        let client = self
            .share
            .context()
            .client_factory
            .make_client(self.share.host(), self.share.port());
        {
            let mut inner = self.inner.lock().unwrap();
            inner.client = Some(client.clone());
            inner.state = SessionState::Connecting;
        }

        client.connect()?;

        // L'adresse pair sert aux URLs de streaming : pas de nouvelle
        // résolution de nom après la connexion initiale.
        let address = client
            .peer_addr()
            .ok_or_else(|| Error::Network("no peer address after connect".to_string()))?;
        self.inner.lock().unwrap().address = Some(address);

        ClientUpdateResult::fetch(client.as_ref(), false)
    }

    fn client_update(&self) -> Result<ClientUpdateResult> {
        let client = self.thread_client().ok_or(Error::Cancelled)?;
        self.set_state(SessionState::Updating);
        client.update()?;
        ClientUpdateResult::fetch(client.as_ref(), true)
    }

    // ------------------------------------------------------------------
    // Continuations (boucle d'évènements)
    // ------------------------------------------------------------------

    fn client_connect_callback(self: Arc<Self>, mut result: ClientUpdateResult) {
        if self.inner.lock().unwrap().client.is_none() {
            debug!(share_id = self.share.share_id(), "snapshot after disconnect discarded");
            return;
        }
        // Le premier delta du serveur peut annoncer des absences fantômes :
        // aucune suppression n'est appliquée sur le snapshot.
        result.deleted_items.clear();
        result.deleted_playlists.clear();
        result.playlist_deleted_items.clear();

        self.set_state(SessionState::SnapshotApplying);
        self.update_sharing_items(&result);
        self.update_playlists(&result);
        // Le snapshot est appliqué avant de déclarer le montage terminé.
        self.share.update_finished(true);
        self.set_state(SessionState::Idle);
    }

    fn client_update_callback(self: Arc<Self>, result: ClientUpdateResult) {
        if self.inner.lock().unwrap().client.is_none() {
            debug!(share_id = self.share.share_id(), "update after disconnect discarded");
            return;
        }
        self.set_state(SessionState::UpdateApplying);
        self.update_sharing_items(&result);
        self.update_playlists(&result);
        self.set_state(SessionState::Idle);
    }

    fn client_connect_error_callback(self: Arc<Self>, err: Error) {
        self.client_connect_update_error(err, false);
    }

    fn client_update_error_callback(self: Arc<Self>, err: Error) {
        self.client_connect_update_error(err, true);
    }

    fn client_connect_update_error(&self, err: Error, update: bool) {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.client.is_none() {
                // Une déconnexion a déjà fait le ménage.
                return;
            }
            inner.state = SessionState::Failed;
        }
        warn!(share_id = self.share.share_id(), error = %err, update,
              "client session failed");
        if !update {
            self.share.update_finished(false);
        }
        if !self.share.has_stale_timer() {
            self.share.stop_tracking();
        }
        self.share
            .context()
            .messages
            .broadcast(SharingMessage::SharingConnectFailed {
                share_id: self.share.share_id(),
            });
    }

    /// Applique items ajoutés/modifiés puis suppressions sur la base miroir.
    fn update_sharing_items(&self, result: &ClientUpdateResult) {
        let store = match self.share.store() {
            Ok(store) => store,
            Err(_) => return,
        };
        let host = self.share.host().to_string();
        let port = self.share.port();
        let address = self
            .inner
            .lock()
            .unwrap()
            .address
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| host.clone());

        for (item_id, data) in &result.items {
            let video_path = result
                .item_paths
                .get(item_id)
                .cloned()
                .unwrap_or_default();
            let item = SharingItem::from_remote(data, &video_path, &host, port, &address);
            if let Err(error) = store.upsert_item(&item) {
                warn!(item_id, %error, "cannot store sharing item");
                continue;
            }
            self.inner.lock().unwrap().current_item_ids.insert(*item_id);
        }

        for item_id in &result.deleted_items {
            match store.remove_item(*item_id) {
                Ok(true) => {
                    self.inner.lock().unwrap().current_item_ids.remove(item_id);
                }
                Ok(false) => {
                    warn!(item_id, "deleted item not found");
                }
                Err(error) => {
                    warn!(item_id, %error, "cannot delete sharing item");
                }
            }
        }
    }

    /// Fusionne le delta de playlists, persiste les appartenances et émet un
    /// unique message d'onglets.
    fn update_playlists(&self, result: &ClientUpdateResult) {
        let store = match self.share.store() {
            Ok(store) => store,
            Err(_) => return,
        };
        let share_id = self.share.share_id();

        let mut inner = self.inner.lock().unwrap();
        let old_playlist_items = inner.playlists.playlist_items().clone();
        inner.playlists.update(result);

        let mut playlist_items_changed = false;
        let new_playlist_items = inner.playlists.playlist_items().clone();
        for playlist_id in old_playlist_items.keys() {
            if !new_playlist_items.contains_key(playlist_id) {
                if let Err(error) = store.remove_playlist(&playlist_key(*playlist_id)) {
                    warn!(playlist_id, %error, "cannot remove playlist membership");
                }
                playlist_items_changed = true;
            }
        }
        for (playlist_id, item_ids) in &new_playlist_items {
            if old_playlist_items.get(playlist_id) != Some(item_ids) {
                if let Err(error) = store.set_playlist_items(&playlist_key(*playlist_id), item_ids)
                {
                    warn!(playlist_id, %error, "cannot store playlist membership");
                }
                playlist_items_changed = true;
            }
        }

        let current = inner.playlists.current_playlists();
        let mut added = Vec::new();
        let mut changed = Vec::new();
        for (playlist_id, data) in &current {
            let info = PlaylistTabInfo {
                share_id,
                playlist_id: *playlist_id,
                name: data.name.clone().unwrap_or_default(),
                podcast: data.podcast,
            };
            if !inner.current_playlist_ids.contains(playlist_id) {
                inner.current_playlist_ids.insert(*playlist_id);
                added.push(info);
            } else if result.playlists.contains_key(playlist_id) {
                changed.push(info);
            }
        }
        let current_ids: HashSet<DaapId> = current.keys().copied().collect();
        let removed: Vec<DaapId> = inner
            .current_playlist_ids
            .difference(&current_ids)
            .copied()
            .collect();
        inner.current_playlist_ids = current_ids;

        if playlist_items_changed || !added.is_empty() || !changed.is_empty() || !removed.is_empty()
        {
            self.update_virtual_playlists(&store, &inner.playlists);
        }
        drop(inner);

        self.share
            .context()
            .messages
            .broadcast(SharingMessage::PlaylistTabsChanged {
                share_id,
                added,
                changed,
                removed,
            });
    }

    /// Recalcule les deux playlists virtuelles depuis les appartenances.
    fn update_virtual_playlists(&self, store: &crate::store::ShareStore, tracker: &PlaylistTracker) {
        if let Err(error) = store.set_playlist_items(VIRTUAL_PODCAST, &tracker.items_in_podcasts())
        {
            warn!(%error, "cannot store podcast virtual playlist");
        }
        if let Err(error) =
            store.set_playlist_items(VIRTUAL_PLAYLIST, &tracker.items_in_playlists())
        {
            warn!(%error, "cannot store playlist virtual playlist");
        }
    }

    // ------------------------------------------------------------------
    // Déconnexion
    // ------------------------------------------------------------------

    /// Déconnecte la session. La référence client est retirée d'abord : les
    /// continuations en vol qui la trouvent absente s'abandonnent.
    pub fn client_disconnect(self: &Arc<Self>) {
        let client = {
            let mut inner = self.inner.lock().unwrap();
            inner.state = SessionState::Disconnecting;
            inner.client.take()
        };
        let Some(client) = client else {
            return;
        };

        let session = self.clone();
        let session_on_error = self.clone();
        self.share.context().event_loop.call_in_thread(
            "DAAP client disconnect",
            move || client.disconnect().map_err(Error::from),
            move |_| session.client_disconnect_callback(),
            move |_| session_on_error.client_disconnect_callback(),
        );
    }

    /// Après déconnexion (réussie ou non) : retire tous les onglets de
    /// playlists observés pour ce partage.
    fn client_disconnect_callback(&self) {
        let removed: Vec<DaapId> = {
            let mut inner = self.inner.lock().unwrap();
            inner.current_playlist_ids.drain().collect()
        };
        self.share
            .context()
            .messages
            .broadcast(SharingMessage::PlaylistTabsChanged {
                share_id: self.share.share_id(),
                added: vec![],
                changed: vec![],
                removed,
            });
    }
}
