#![allow(dead_code)]

//! Modèle hôte, transcodeur, serveur et pile mDNS simulés pour les tests.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};

use pmodaap::{
    DaapError, DaapId, DaapServer, MdnsBrowse, MdnsEvent, MdnsRegistration, MdnsStack,
    ServerBackend, ServerFactory, ServerRequest, SessionId,
};
use pmoshareserver::{
    HostId, HostItem, HostModel, HostPlaylist, PlaylistKind, ServerCatalog, TranscodePipeline,
    TranscoderBackend,
};
use pmosharing::FileType;

/// Initialise le logging des tests, piloté par `RUST_LOG`. Sans effet si un
/// subscriber est déjà en place.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ----------------------------------------------------------------------
// Modèle hôte
// ----------------------------------------------------------------------

#[derive(Default)]
pub struct MockHost {
    pub playlists: Vec<HostPlaylist>,
    pub feeds: Vec<HostPlaylist>,
    pub memberships: HashMap<HostId, Vec<HostId>>,
    pub tracked: Mutex<Vec<Option<(HostId, PlaylistKind)>>>,
    pub untracked: Mutex<Vec<Option<(HostId, PlaylistKind)>>>,
}

impl MockHost {
    pub fn empty() -> Arc<MockHost> {
        Arc::new(MockHost::default())
    }
}

impl HostModel for MockHost {
    fn saved_playlists(&self) -> Vec<HostPlaylist> {
        self.playlists.clone()
    }

    fn feeds(&self) -> Vec<HostPlaylist> {
        self.feeds.clone()
    }

    fn playlist_items(&self, playlist_id: HostId) -> Vec<HostId> {
        self.memberships.get(&playlist_id).cloned().unwrap_or_default()
    }

    fn feed_items(&self, feed_id: HostId) -> Vec<HostId> {
        self.memberships.get(&feed_id).cloned().unwrap_or_default()
    }

    fn track_items(&self, scope: Option<(HostId, PlaylistKind)>) {
        self.tracked.lock().unwrap().push(scope);
    }

    fn stop_tracking_items(&self, scope: Option<(HostId, PlaylistKind)>) {
        self.untracked.lock().unwrap().push(scope);
    }
}

pub fn host_playlist(id: HostId, title: &str) -> HostPlaylist {
    HostPlaylist {
        id,
        title: Some(title.to_string()),
        name: None,
        is_folder: false,
        url: None,
    }
}

pub fn host_feed(id: HostId, title: &str, url: &str) -> HostPlaylist {
    HostPlaylist {
        id,
        title: Some(title.to_string()),
        name: None,
        is_folder: false,
        url: Some(url.to_string()),
    }
}

pub fn host_item(id: HostId, title: &str, file_type: FileType) -> HostItem {
    let ext = match file_type {
        FileType::Audio => "mp3",
        FileType::Video => "mp4",
    };
    HostItem {
        id,
        title: Some(title.to_string()),
        artist: Some("Artiste".to_string()),
        duration: Some(1830),
        size: Some(2_000_000),
        file_format: Some(ext.to_string()),
        file_type,
        video_path: PathBuf::from(format!("/media/{id}.{ext}")),
        ..Default::default()
    }
}

// ----------------------------------------------------------------------
// Transcodeur
// ----------------------------------------------------------------------

#[derive(Default)]
pub struct TranscodeLog {
    /// (item, chunk de départ) de chaque pipeline démarré.
    pub started: Mutex<Vec<(DaapId, u64)>>,
    pub shutdowns: AtomicUsize,
}

impl TranscodeLog {
    pub fn shutdown_count(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

pub struct MockTranscoder {
    pub log: Arc<TranscodeLog>,
}

impl MockTranscoder {
    pub fn new() -> (Arc<MockTranscoder>, Arc<TranscodeLog>) {
        let log = Arc::new(TranscodeLog::default());
        (Arc::new(MockTranscoder { log: log.clone() }), log)
    }
}

struct MockPipeline {
    log: Arc<TranscodeLog>,
    first_chunk_url: String,
}

impl TranscodePipeline for MockPipeline {
    fn playlist(&mut self) -> pmoshareserver::Result<Vec<u8>> {
        Ok(format!("#EXTM3U\n{}\n", self.first_chunk_url).into_bytes())
    }

    fn next_chunk(&mut self) -> pmoshareserver::Result<Option<Vec<u8>>> {
        Ok(Some(vec![0x47; 188]))
    }

    fn shutdown(&mut self) {
        self.log.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

impl TranscoderBackend for MockTranscoder {
    fn needs_transcode(&self, _path: &Path) -> bool {
        true
    }

    fn start(
        &self,
        _path: &Path,
        item_id: DaapId,
        start_chunk: u64,
        request_path: &dyn Fn(u64) -> String,
    ) -> pmoshareserver::Result<Box<dyn TranscodePipeline>> {
        self.log.started.lock().unwrap().push((item_id, start_chunk));
        Ok(Box::new(MockPipeline {
            log: self.log.clone(),
            first_chunk_url: request_path(start_chunk),
        }))
    }
}

// ----------------------------------------------------------------------
// Configuration et catalogue
// ----------------------------------------------------------------------

pub fn test_config() -> (tempfile::TempDir, Arc<pmoconfig::Config>) {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(pmoconfig::Config::load_config(dir.path().to_str().unwrap()).unwrap());
    (dir, config)
}

pub fn make_catalog(
    host: Arc<MockHost>,
    config: Arc<pmoconfig::Config>,
) -> (ServerCatalog, Arc<TranscodeLog>) {
    let (transcoder, log) = MockTranscoder::new();
    (ServerCatalog::new(host, config, transcoder), log)
}

// ----------------------------------------------------------------------
// Serveur DAAP
// ----------------------------------------------------------------------

pub struct MockServerHandle {
    pub name: Arc<Mutex<String>>,
    pub requests_tx: Sender<ServerRequest>,
    pub handled: Arc<Mutex<Vec<SessionId>>>,
}

struct MockServer {
    name: Arc<Mutex<String>>,
    address: SocketAddr,
    requests_rx: Receiver<ServerRequest>,
    handled: Arc<Mutex<Vec<SessionId>>>,
}

impl DaapServer for MockServer {
    fn server_address(&self) -> SocketAddr {
        self.address
    }

    fn set_name(&mut self, name: &str) {
        *self.name.lock().unwrap() = name.to_string();
    }

    fn session_count(&self) -> usize {
        0
    }

    fn set_finished_callback(&mut self, _callback: Box<dyn Fn(SessionId) + Send + Sync>) {}

    fn requests(&self) -> Receiver<ServerRequest> {
        self.requests_rx.clone()
    }

    fn handle_request(&mut self, request: ServerRequest) {
        self.handled.lock().unwrap().push(request.session);
    }
}

#[derive(Default)]
pub struct MockServerFactory {
    pub fail: bool,
    pub made: Mutex<Vec<MockServerHandle>>,
}

impl MockServerFactory {
    pub fn working() -> Arc<MockServerFactory> {
        Arc::new(MockServerFactory::default())
    }

    pub fn failing() -> Arc<MockServerFactory> {
        Arc::new(MockServerFactory {
            fail: true,
            made: Mutex::new(Vec::new()),
        })
    }

    pub fn made_count(&self) -> usize {
        self.made.lock().unwrap().len()
    }
}

impl ServerFactory for MockServerFactory {
    fn make_server(
        &self,
        _backend: Arc<dyn ServerBackend>,
        name: &str,
    ) -> Result<Box<dyn DaapServer>, DaapError> {
        if self.fail {
            return Err(DaapError::Resource("cannot bind server port".to_string()));
        }
        let (requests_tx, requests_rx) = unbounded::<ServerRequest>();
        let name = Arc::new(Mutex::new(name.to_string()));
        let handled = Arc::new(Mutex::new(Vec::new()));
        self.made.lock().unwrap().push(MockServerHandle {
            name: name.clone(),
            requests_tx,
            handled: handled.clone(),
        });
        Ok(Box::new(MockServer {
            name,
            address: "127.0.0.1:3689".parse().unwrap(),
            requests_rx,
            handled,
        }))
    }
}

// ----------------------------------------------------------------------
// mDNS
// ----------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RegistrationRecord {
    pub requested: String,
    pub port: u16,
}

pub struct MockMdns {
    /// Suffixe ajouté au nom demandé (simulation de collision).
    pub assigned_suffix: String,
    pub registrations: Mutex<Vec<RegistrationRecord>>,
    unregistered: Arc<AtomicUsize>,
    browse_tx: Mutex<Option<Sender<MdnsEvent>>>,
}

impl MockMdns {
    pub fn new(assigned_suffix: &str) -> Arc<MockMdns> {
        Arc::new(MockMdns {
            assigned_suffix: assigned_suffix.to_string(),
            registrations: Mutex::new(Vec::new()),
            unregistered: Arc::new(AtomicUsize::new(0)),
            browse_tx: Mutex::new(None),
        })
    }

    pub fn registration_count(&self) -> usize {
        self.registrations.lock().unwrap().len()
    }

    pub fn unregistered_count(&self) -> usize {
        self.unregistered.load(Ordering::SeqCst)
    }
}

impl MdnsStack for MockMdns {
    fn available(&self) -> bool {
        true
    }

    fn browse(&self) -> Result<MdnsBrowse, DaapError> {
        let (tx, rx) = unbounded::<MdnsEvent>();
        *self.browse_tx.lock().unwrap() = Some(tx);
        Ok(MdnsBrowse::new(rx))
    }

    fn register(&self, name: &str, port: u16) -> Result<MdnsRegistration, DaapError> {
        self.registrations.lock().unwrap().push(RegistrationRecord {
            requested: name.to_string(),
            port,
        });
        let assigned = format!("{}{}", name, self.assigned_suffix);
        let (tx, rx) = unbounded::<String>();
        let _ = tx.send(assigned);
        let unregistered = self.unregistered.clone();
        // tx reste vivant dans la closure : le canal du nom attribué ne se
        // ferme qu'au retrait de l'annonce.
        Ok(MdnsRegistration::new(
            rx,
            Box::new(move || {
                drop(tx);
                unregistered.fetch_add(1, Ordering::SeqCst);
            }),
        ))
    }
}

// ----------------------------------------------------------------------
// Client DAAP (jamais sollicité côté serveur)
// ----------------------------------------------------------------------

pub struct PanicClientFactory;

impl pmodaap::ClientFactory for PanicClientFactory {
    fn make_client(&self, _host: &str, _port: u16) -> Arc<dyn pmodaap::DaapClient> {
        unreachable!("server-side tests never open DAAP client connections");
    }
}

// ----------------------------------------------------------------------
// Attente
// ----------------------------------------------------------------------

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
