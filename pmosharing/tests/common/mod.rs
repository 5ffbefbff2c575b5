#![allow(dead_code)]

//! Clients DAAP simulés et petits utilitaires d'attente pour les tests.

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::{select, unbounded, Receiver, Sender};

use pmodaap::{
    ClientFactory, DaapClient, DaapError, DaapId, ItemDelta, PlaylistDelta, RemoteDatabase,
    RemoteItem, RemotePlaylist,
};
use pmosharing::SharingMessage;

/// Initialise le logging des tests, piloté par `RUST_LOG`. Sans effet si un
/// subscriber est déjà en place.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Contenu servi par un [`MockClient`] : bibliothèque principale +
/// appartenances par playlist.
#[derive(Debug, Clone, Default)]
pub struct Library {
    pub items: ItemDelta,
    pub playlists: PlaylistDelta,
    pub playlist_items: HashMap<DaapId, ItemDelta>,
}

struct MockState {
    connected: bool,
    disconnected: bool,
    snapshot: Library,
    pending: Option<Library>,
}

/// Client DAAP scripté : sert un snapshot, puis les deltas poussés par le
/// test via le canal retourné par [`MockClient::new`]. `disconnect()`
/// interrompt un `update()` bloqué, comme la fermeture de socket du vrai
/// client.
pub struct MockClient {
    supports_update: bool,
    fail_connect: bool,
    connect_gate: Option<Receiver<()>>,
    state: Mutex<MockState>,
    updates: Receiver<Library>,
    disconnect_tx: Sender<()>,
    disconnect_rx: Receiver<()>,
}

impl MockClient {
    pub fn new(snapshot: Library, supports_update: bool) -> (Arc<MockClient>, Sender<Library>) {
        let (update_tx, update_rx) = unbounded::<Library>();
        let (disconnect_tx, disconnect_rx) = unbounded::<()>();
        let client = Arc::new(MockClient {
            supports_update,
            fail_connect: false,
            connect_gate: None,
            state: Mutex::new(MockState {
                connected: false,
                disconnected: false,
                snapshot,
                pending: None,
            }),
            updates: update_rx,
            disconnect_tx,
            disconnect_rx,
        });
        (client, update_tx)
    }

    /// Client minimal qui accepte une connexion de test.
    pub fn ok() -> Arc<MockClient> {
        Self::new(Library::default(), false).0
    }

    /// Client dont la connexion échoue.
    pub fn failing() -> Arc<MockClient> {
        let (client, _tx) = Self::new(Library::default(), false);
        let inner = Arc::into_inner(client).unwrap();
        Arc::new(MockClient {
            fail_connect: true,
            ..inner
        })
    }

    /// Client dont `connect()` bloque jusqu'à libération de la barrière.
    pub fn gated(snapshot: Library, supports_update: bool) -> (Arc<MockClient>, Sender<()>) {
        let (gate_tx, gate_rx) = unbounded::<()>();
        let (client, _update_tx) = Self::new(snapshot, supports_update);
        let inner = Arc::into_inner(client).unwrap();
        (
            Arc::new(MockClient {
                connect_gate: Some(gate_rx),
                ..inner
            }),
            gate_tx,
        )
    }

    pub fn is_disconnected(&self) -> bool {
        self.state.lock().unwrap().disconnected
    }

    fn library(&self, update: bool) -> Result<Library, DaapError> {
        let state = self.state.lock().unwrap();
        if state.disconnected {
            return Err(DaapError::Network("connection closed".to_string()));
        }
        if update {
            state
                .pending
                .clone()
                .ok_or_else(|| DaapError::Protocol("no pending update".to_string()))
        } else {
            Ok(state.snapshot.clone())
        }
    }
}

impl DaapClient for MockClient {
    fn connect(&self) -> Result<(), DaapError> {
        if let Some(gate) = &self.connect_gate {
            let _ = gate.recv();
        }
        if self.fail_connect {
            return Err(DaapError::Network("connection refused".to_string()));
        }
        self.state.lock().unwrap().connected = true;
        Ok(())
    }

    fn disconnect(&self) -> Result<(), DaapError> {
        {
            let mut state = self.state.lock().unwrap();
            state.connected = false;
            state.disconnected = true;
        }
        let _ = self.disconnect_tx.send(());
        Ok(())
    }

    fn peer_addr(&self) -> Option<IpAddr> {
        Some("10.0.0.9".parse().unwrap())
    }

    fn supports_update(&self) -> bool {
        self.supports_update
    }

    fn databases(&self, _update: bool) -> Result<Vec<RemoteDatabase>, DaapError> {
        if self.state.lock().unwrap().disconnected {
            return Err(DaapError::Network("connection closed".to_string()));
        }
        Ok(vec![RemoteDatabase {
            db_id: 1,
            name: "library".to_string(),
        }])
    }

    fn playlists(&self, update: bool) -> Result<PlaylistDelta, DaapError> {
        Ok(self.library(update)?.playlists)
    }

    fn items(
        &self,
        _meta: &[&str],
        playlist_id: Option<DaapId>,
        update: bool,
    ) -> Result<ItemDelta, DaapError> {
        let library = self.library(update)?;
        Ok(match playlist_id {
            None => library.items,
            Some(playlist_id) => library
                .playlist_items
                .get(&playlist_id)
                .cloned()
                .unwrap_or_default(),
        })
    }

    fn update(&self) -> Result<(), DaapError> {
        if self.state.lock().unwrap().disconnected {
            return Err(DaapError::Network("connection closed".to_string()));
        }
        select! {
            recv(self.updates) -> library => match library {
                Ok(library) => {
                    self.state.lock().unwrap().pending = Some(library);
                    Ok(())
                }
                Err(_) => Err(DaapError::Network("connection closed".to_string())),
            },
            recv(self.disconnect_rx) -> _ => {
                Err(DaapError::Network("connection closed".to_string()))
            }
        }
    }

    fn file_url(&self, item_id: DaapId, format: Option<&str>) -> String {
        format!(
            "daap://10.0.0.9:3689/object/{item_id}.{}",
            format.unwrap_or("mp3")
        )
    }
}

/// Fabrique servant des clients scriptés dans l'ordre.
pub struct QueueFactory {
    clients: Mutex<VecDeque<Arc<dyn DaapClient>>>,
    calls: AtomicUsize,
}

impl QueueFactory {
    pub fn new(clients: Vec<Arc<dyn DaapClient>>) -> Arc<QueueFactory> {
        Arc::new(QueueFactory {
            clients: Mutex::new(clients.into()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn push(&self, client: Arc<dyn DaapClient>) {
        self.clients.lock().unwrap().push_back(client);
    }

    /// Nombre de clients déjà fabriqués.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ClientFactory for QueueFactory {
    fn make_client(&self, _host: &str, _port: u16) -> Arc<dyn DaapClient> {
        let client = self
            .clients
            .lock()
            .unwrap()
            .pop_front()
            .expect("no scripted client left");
        self.calls.fetch_add(1, Ordering::SeqCst);
        client
    }
}

pub fn remote_item(item_id: DaapId, name: &str, format: &str, mediakind: u32) -> RemoteItem {
    RemoteItem {
        item_id,
        name: Some(name.to_string()),
        format: Some(format.to_string()),
        mediakind: Some(mediakind),
        duration_ms: Some(240_000),
        size: Some(1_000_000),
        artist: Some("Artiste".to_string()),
        ..Default::default()
    }
}

pub fn remote_playlist(item_id: DaapId, name: &str, podcast: bool) -> RemotePlaylist {
    RemotePlaylist {
        item_id: Some(item_id),
        name: Some(name.to_string()),
        base_playlist: false,
        podcast,
    }
}

/// Scrute `predicate` toutes les 10 ms jusqu'au timeout.
pub fn wait_until(timeout: Duration, predicate: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    predicate()
}

/// Attend le premier message satisfaisant `predicate`, en jetant les autres.
pub fn wait_message(
    rx: &Receiver<SharingMessage>,
    timeout: Duration,
    predicate: impl Fn(&SharingMessage) -> bool,
) -> Option<SharingMessage> {
    let deadline = Instant::now() + timeout;
    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        match rx.recv_timeout(remaining) {
            Ok(message) if predicate(&message) => return Some(message),
            Ok(_) => continue,
            Err(_) => break,
        }
    }
    None
}
