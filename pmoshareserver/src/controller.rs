//! Contrôleur du serveur DAAP : socket, thread serveur, annonce mDNS,
//! réaction à la configuration et sérialisation des requêtes frontend.
//!
//! Le thread serveur boucle sur trois canaux : requêtes prêtes du serveur,
//! commandes Quit/Nop du contrôleur, et le nom attribué par l'enregistrement
//! mDNS. Les commandes sont accompagnées d'une poignée de main
//! (`reload_done`) pour que enable/disable soient synchrones.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{never, select, unbounded, Receiver, RecvError, Sender};
use tracing::{debug, info, warn};

use pmodaap::{DaapServer, MdnsRegistration, MdnsStack, ServerBackend, ServerFactory, ServerRequest};
use pmosharing::{DiscoveryTracker, EventLoop};

use crate::catalog::ServerCatalog;

enum ControllerCommand {
    Quit,
    Nop,
}

/// Equivalent de threading.Event : poignée de main entre threads.
struct Event {
    flag: Mutex<bool>,
    cv: Condvar,
}

impl Event {
    fn new() -> Event {
        Event {
            flag: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    fn set(&self) {
        let mut flag = self.flag.lock().unwrap();
        *flag = true;
        self.cv.notify_all();
    }

    fn clear(&self) {
        *self.flag.lock().unwrap() = false;
    }

    fn wait(&self) {
        let mut flag = self.flag.lock().unwrap();
        while !*flag {
            flag = self.cv.wait(flag).unwrap();
        }
    }
}

struct ControllerState {
    sharing: bool,
    discoverable: bool,
    /// Nom effectivement enregistré (peut différer du nom demandé).
    name: String,
    mdns_present: bool,
    command_tx: Option<Sender<ControllerCommand>>,
    thread: Option<JoinHandle<()>>,
    server_address: Option<SocketAddr>,
}

/// Callbacks d'un widget frontend intéressé par l'état du partage.
pub struct InterestCallbacks {
    pub start: Box<dyn Fn(bool) + Send + Sync>,
    pub end: Box<dyn Fn(bool) + Send + Sync>,
}

struct FrontendState {
    volatile: bool,
    callbacks: HashMap<String, InterestCallbacks>,
}

struct ControllerInner {
    config: Arc<pmoconfig::Config>,
    catalog: ServerCatalog,
    tracker: Arc<DiscoveryTracker>,
    mdns: Arc<dyn MdnsStack>,
    server_factory: Arc<dyn ServerFactory>,
    event_loop: EventLoop,
    server: Mutex<Option<Box<dyn DaapServer>>>,
    registration: Mutex<Option<MdnsRegistration>>,
    state: Mutex<ControllerState>,
    reload_done: Event,
    frontend: Mutex<FrontendState>,
    config_quit: Mutex<Option<Sender<()>>>,
}

/// Publication de la bibliothèque locale en DAAP.
#[derive(Clone)]
pub struct ServerController {
    inner: Arc<ControllerInner>,
}

impl ServerController {
    pub fn new(
        config: Arc<pmoconfig::Config>,
        catalog: ServerCatalog,
        tracker: Arc<DiscoveryTracker>,
        mdns: Arc<dyn MdnsStack>,
        server_factory: Arc<dyn ServerFactory>,
        event_loop: EventLoop,
    ) -> ServerController {
        let mdns_present = mdns.available();
        ServerController {
            inner: Arc::new(ControllerInner {
                config,
                catalog,
                tracker,
                mdns,
                server_factory,
                event_loop,
                server: Mutex::new(None),
                registration: Mutex::new(None),
                state: Mutex::new(ControllerState {
                    sharing: false,
                    discoverable: false,
                    name: String::new(),
                    mdns_present,
                    command_tx: None,
                    thread: None,
                    server_address: None,
                }),
                reload_done: Event::new(),
                frontend: Mutex::new(FrontendState {
                    volatile: false,
                    callbacks: HashMap::new(),
                }),
                config_quit: Mutex::new(None),
            }),
        }
    }

    /// Amorce le catalogue, applique la configuration et installe le
    /// watcher de reconfiguration.
    pub fn start(&self) {
        self.inner.catalog.start_tracking();
        self.start_config_watcher();
        self.reconfigure();

        // Si la découverte est inactive, le callback d'enregistrement mDNS
        // ne viendra jamais relancer le tracker : on le fait ici.
        let state = self.inner.state.lock().unwrap();
        if !state.mdns_present || !state.discoverable {
            drop(state);
            self.inner.tracker.resume();
        }
    }

    fn start_config_watcher(&self) {
        let events = self.inner.config.subscribe();
        let (quit_tx, quit_rx) = unbounded::<()>();
        *self.inner.config_quit.lock().unwrap() = Some(quit_tx);

        let controller = self.clone();
        let spawned = thread::Builder::new()
            .name("Sharing Config Watcher".to_string())
            .spawn(move || loop {
                select! {
                    recv(quit_rx) -> _ => return,
                    recv(events) -> event => match event {
                        Ok(event) => {
                            if event.is(pmoconfig::SHARE_MEDIA)
                                || event.is(pmoconfig::SHARE_DISCOVERABLE)
                                || event.is(pmoconfig::SHARE_NAME)
                            {
                                debug!(key = %event.key, "reconfigure: configuration change");
                                controller.reconfigure();
                            } else {
                                controller.inner.catalog.on_config_changed(&event);
                            }
                        }
                        Err(_) => return,
                    },
                }
            });
        if spawned.is_err() {
            warn!("cannot spawn config watcher thread");
        }
    }

    /// Applique l'état voulu par la configuration : partage on/off,
    /// annonce mDNS, nom de service.
    pub fn reconfigure(&self) {
        let sharing_wanted = self.inner.config.is_sharing_enabled().unwrap_or(false);
        let discoverable_wanted = self.inner.config.is_discoverable().unwrap_or(false);
        let name_wanted = self.inner.config.share_name().unwrap_or_default();

        let (sharing_now, name_now) = {
            let state = self.inner.state.lock().unwrap();
            (state.sharing, state.name.clone())
        };
        let name_changed = name_wanted != name_now;

        if sharing_wanted != sharing_now {
            if sharing_wanted {
                if !self.enable_sharing() {
                    // L'annonce n'a plus de sens sans serveur.
                    self.inner.state.lock().unwrap().discoverable = false;
                    self.sharing_set_complete(sharing_wanted);
                    return;
                }
            } else {
                if self.inner.state.lock().unwrap().discoverable {
                    self.disable_discover();
                }
                self.disable_sharing();
            }
        }

        if !self.inner.state.lock().unwrap().sharing {
            self.sharing_set_complete(sharing_wanted);
            return;
        }

        // Changement de nom : dépublier, suspendre le tracker pour qu'il ne
        // voie pas notre propre nom transitoire, renommer le serveur. La
        // republication ci-dessous relancera le tracker via le callback
        // d'enregistrement.
        if name_changed && self.inner.state.lock().unwrap().discoverable {
            self.disable_discover();
            self.inner.tracker.pause();
            if let Some(server) = self.inner.server.lock().unwrap().as_mut() {
                server.set_name(&name_wanted);
            }
        }

        let discoverable_now = self.inner.state.lock().unwrap().discoverable;
        if discoverable_wanted != discoverable_now {
            if discoverable_wanted {
                self.enable_discover();
            } else {
                self.disable_discover();
            }
        }

        self.sharing_set_complete(sharing_wanted);
    }

    // ------------------------------------------------------------------
    // Serveur
    // ------------------------------------------------------------------

    fn enable_sharing(&self) -> bool {
        // Les bibliothèques mDNS ont pu disparaître depuis l'activation :
        // dans le doute on n'allume rien.
        if !self.inner.state.lock().unwrap().mdns_present {
            self.inner.state.lock().unwrap().sharing = false;
            return false;
        }

        let name = self.inner.config.share_name().unwrap_or_default();
        let backend: Arc<dyn ServerBackend> = Arc::new(self.inner.catalog.clone());
        let mut server = match self.inner.server_factory.make_server(backend, &name) {
            Ok(server) => server,
            Err(error) => {
                warn!(%error, "cannot start DAAP server");
                self.inner.state.lock().unwrap().sharing = false;
                return false;
            }
        };

        // Fin de session cliente → arrêt du job de transcodage, posté sur la
        // boucle d'évènements.
        {
            let catalog = self.inner.catalog.clone();
            let event_loop = self.inner.event_loop.clone();
            server.set_finished_callback(Box::new(move |session| {
                let catalog = catalog.clone();
                event_loop.call("daap logout notification", move || {
                    catalog.finished(session);
                });
            }));
        }

        let requests = server.requests();
        let address = server.server_address();
        let (command_tx, command_rx) = unbounded::<ControllerCommand>();
        {
            let mut state = self.inner.state.lock().unwrap();
            state.command_tx = Some(command_tx);
            state.server_address = Some(address);
            state.name = name;
        }
        *self.inner.server.lock().unwrap() = Some(server);

        let inner = self.inner.clone();
        let join = thread::Builder::new()
            .name("DAAP Server Thread".to_string())
            .spawn(move || server_thread(inner, command_rx, requests));
        match join {
            Ok(join) => self.inner.state.lock().unwrap().thread = Some(join),
            Err(_) => {
                warn!("cannot spawn DAAP server thread");
                *self.inner.server.lock().unwrap() = None;
                self.inner.state.lock().unwrap().sharing = false;
                return false;
            }
        }

        debug!("waiting for server to start ...");
        self.inner.reload_done.wait();
        self.inner.reload_done.clear();
        debug!("server started.");

        self.inner.state.lock().unwrap().sharing = true;
        true
    }

    fn disable_sharing(&self) {
        let (command_tx, join) = {
            let mut state = self.inner.state.lock().unwrap();
            state.sharing = false;
            state.server_address = None;
            (state.command_tx.take(), state.thread.take())
        };
        if let Some(command_tx) = command_tx {
            debug!("waiting for server to stop ...");
            if command_tx.send(ControllerCommand::Quit).is_ok() {
                self.inner.reload_done.wait();
                self.inner.reload_done.clear();
            }
            debug!("server stopped.");
        }
        if let Some(join) = join {
            let _ = join.join();
        }
    }

    // ------------------------------------------------------------------
    // Annonce mDNS
    // ------------------------------------------------------------------

    fn enable_discover(&self) -> bool {
        let name = self.inner.config.share_name().unwrap_or_default();
        // Le serveur doit exister : sans lui, aucun port à annoncer.
        let Some(address) = self.inner.state.lock().unwrap().server_address else {
            warn!("enable_discover without a running server");
            return false;
        };
        let registration = match self.inner.mdns.register(&name, address.port()) {
            Ok(registration) => registration,
            Err(error) => {
                warn!(%error, "mDNS registration failed");
                return false;
            }
        };
        *self.inner.registration.lock().unwrap() = Some(registration);
        self.inner.state.lock().unwrap().discoverable = true;

        // Recharger la boucle serveur pour qu'elle prenne en compte le canal
        // d'enregistrement.
        debug!("enabling discover ...");
        if self.send_command(ControllerCommand::Nop) {
            self.inner.reload_done.wait();
            self.inner.reload_done.clear();
        }
        debug!("discover enabled.");
        true
    }

    fn disable_discover(&self) {
        self.inner.state.lock().unwrap().discoverable = false;
        debug!("disabling discover ...");
        if self.send_command(ControllerCommand::Nop) {
            self.inner.reload_done.wait();
            self.inner.reload_done.clear();
        }
        // Un changement de nom interrompu ne doit pas laisser le tracker en
        // pause.
        self.inner.tracker.resume();
        debug!("discover disabled.");
    }

    fn send_command(&self, command: ControllerCommand) -> bool {
        let state = self.inner.state.lock().unwrap();
        match &state.command_tx {
            Some(command_tx) => command_tx.send(command).is_ok(),
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Etat
    // ------------------------------------------------------------------

    pub fn is_sharing(&self) -> bool {
        self.inner.state.lock().unwrap().sharing
    }

    pub fn is_discoverable(&self) -> bool {
        self.inner.state.lock().unwrap().discoverable
    }

    /// Nom effectivement enregistré.
    pub fn name(&self) -> String {
        self.inner.state.lock().unwrap().name.clone()
    }

    pub fn server_address(&self) -> Option<SocketAddr> {
        self.inner.state.lock().unwrap().server_address
    }

    pub fn session_count(&self) -> usize {
        if !self.inner.state.lock().unwrap().sharing {
            return 0;
        }
        self.inner
            .server
            .lock()
            .unwrap()
            .as_ref()
            .map(|server| server.session_count())
            .unwrap_or(0)
    }

    /// Arrêt global : rien n'est interrompu par les erreurs des
    /// sous-composants.
    pub fn shutdown(&self) {
        let (sharing, discoverable) = {
            let state = self.inner.state.lock().unwrap();
            (state.sharing, state.discoverable)
        };
        if sharing {
            if discoverable {
                self.disable_discover();
            }
            self.disable_sharing();
        }
        self.inner.catalog.shutdown();
        if let Some(quit_tx) = self.inner.config_quit.lock().unwrap().take() {
            let _ = quit_tx.send(());
        }
    }

    // ------------------------------------------------------------------
    // Sérialisation des requêtes frontend
    // ------------------------------------------------------------------

    /// Enregistre les callbacks start/end d'un widget sous un tag.
    pub fn register_interest(&self, tag: &str, callbacks: InterestCallbacks) {
        self.inner
            .frontend
            .lock()
            .unwrap()
            .callbacks
            .insert(tag.to_string(), callbacks);
    }

    pub fn unregister_interest(&self, tag: &str) {
        self.inner.frontend.lock().unwrap().callbacks.remove(tag);
    }

    /// Demande frontend de basculer le partage. Refusée (retour `false`)
    /// tant qu'une bascule précédente est en cours.
    pub fn set_sharing_enabled(&self, value: bool) -> bool {
        {
            let mut frontend = self.inner.frontend.lock().unwrap();
            if frontend.volatile {
                debug!(value, "refusing to set sharing while a toggle is in flight");
                return false;
            }
            frontend.volatile = true;
            for callbacks in frontend.callbacks.values() {
                (callbacks.start)(value);
            }
        }
        // L'écriture de la configuration déclenche la reconfiguration, qui
        // terminera par sharing_set_complete().
        if let Err(error) = self.inner.config.set_sharing_enabled(value) {
            warn!(%error, "cannot write sharing configuration");
            self.sharing_set_complete(value);
        }
        true
    }

    fn sharing_set_complete(&self, value: bool) {
        let mut frontend = self.inner.frontend.lock().unwrap();
        if !frontend.volatile {
            return;
        }
        for callbacks in frontend.callbacks.values() {
            (callbacks.end)(value);
        }
        frontend.volatile = false;
    }
}

fn mdns_register_callback(inner: &Arc<ControllerInner>, name: &str) {
    info!(name, "mDNS registration confirmed");
    inner.state.lock().unwrap().name = name.to_string();
    // Le tracker doit filtrer le nom réellement attribué, puis reprendre.
    inner.tracker.set_local_name(name);
    inner.tracker.resume();
}

fn server_thread(
    inner: Arc<ControllerInner>,
    commands: Receiver<ControllerCommand>,
    requests: Receiver<ServerRequest>,
) {
    enum Woken {
        Command(Result<ControllerCommand, RecvError>),
        Request(Result<ServerRequest, RecvError>),
        Assigned(Result<String, RecvError>),
    }

    // Signaler le démarrage à l'appelant.
    inner.reload_done.set();
    let mut requests = requests;

    loop {
        let assigned = inner
            .registration
            .lock()
            .unwrap()
            .as_ref()
            .map(|registration| registration.assigned().clone())
            .unwrap_or_else(never);

        let woken = select! {
            recv(commands) -> command => Woken::Command(command),
            recv(requests) -> request => Woken::Request(request),
            recv(assigned) -> name => Woken::Assigned(name),
        };

        match woken {
            Woken::Command(Ok(ControllerCommand::Quit)) | Woken::Command(Err(_)) => {
                // Lâcher le serveur ferme sa socket et ses sessions.
                *inner.server.lock().unwrap() = None;
                inner.reload_done.set();
                return;
            }
            Woken::Command(Ok(ControllerCommand::Nop)) => {
                debug!("sharing: reload");
                let discoverable = inner.state.lock().unwrap().discoverable;
                if !discoverable {
                    if let Some(registration) = inner.registration.lock().unwrap().take() {
                        registration.unregister();
                    }
                }
                inner.reload_done.set();
            }
            Woken::Request(Ok(request)) => {
                if let Some(server) = inner.server.lock().unwrap().as_mut() {
                    server.handle_request(request);
                }
            }
            Woken::Request(Err(_)) => {
                // Canal de requêtes fermé : ne plus le scruter.
                requests = never();
            }
            Woken::Assigned(Ok(name)) => mdns_register_callback(&inner, &name),
            Woken::Assigned(Err(_)) => {
                // Handle mort : l'oublier pour ne pas boucler dessus.
                inner.registration.lock().unwrap().take();
            }
        }
    }
}
