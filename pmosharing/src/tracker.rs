//! Suivi des partages annoncés sur le réseau local.
//!
//! Un thread de browse reçoit les évènements mDNS et les rejoue sur la
//! boucle d'évènements, où vit tout l'état. Les commandes Quit/Pause/Resume
//! arrivent par canal ; `pause()` est synchrone, le retour garantit que plus
//! aucun évènement ne sera traité.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, never, select, unbounded, Receiver, RecvError, Sender};
use tracing::{debug, info, warn};

use pmodaap::dmap::{self, DmapType};
use pmodaap::{DaapError, MdnsEvent, MdnsStack};

use crate::error::Error;
use crate::messages::SharingMessage;
use crate::share::{share_id_for, Share, SharingContext};

/// Fenêtre de grâce entre un `removed` et le retrait effectif d'un partage
/// connecté ; un `added` dans l'intervalle annule le retrait.
pub const STALE_SHARE_GRACE: Duration = Duration::from_secs(2);

enum TrackerCommand {
    Quit,
    Pause(Sender<()>),
    Resume,
}

struct TrackerInner {
    name_to_id: HashMap<String, i64>,
    shares: HashMap<i64, Arc<Share>>,
}

/// Ecoute mDNS et maintient l'ensemble des partages annoncés.
pub struct DiscoveryTracker {
    ctx: Arc<SharingContext>,
    mdns: Arc<dyn MdnsStack>,
    inner: Mutex<TrackerInner>,
    control: Mutex<Option<Sender<TrackerCommand>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    local_name: Mutex<String>,
}

impl DiscoveryTracker {
    pub fn new(ctx: Arc<SharingContext>, mdns: Arc<dyn MdnsStack>) -> Arc<DiscoveryTracker> {
        // Tag propriétaire transportant le genre d'item.
        dmap::register_meta(dmap::MIRO_ITEM_KIND, "miKD", DmapType::Ubyte);

        Arc::new(DiscoveryTracker {
            ctx,
            mdns,
            inner: Mutex::new(TrackerInner {
                name_to_id: HashMap::new(),
                shares: HashMap::new(),
            }),
            control: Mutex::new(None),
            thread: Mutex::new(None),
            local_name: Mutex::new(String::new()),
        })
    }

    /// Nom sous lequel notre propre partage est annoncé, filtré du browse.
    pub fn set_local_name(&self, name: &str) {
        *self.local_name.lock().unwrap() = name.to_string();
    }

    /// Démarre le thread de browse. Sans pile mDNS le thread tourne quand
    /// même pour servir pause/resume, mais ne reçoit aucun évènement.
    pub fn start(self: &Arc<Self>) {
        let (tx, rx) = unbounded::<TrackerCommand>();
        *self.control.lock().unwrap() = Some(tx);

        let browse = match self.mdns.browse() {
            Ok(browse) => Some(browse),
            Err(DaapError::MdnsUnavailable) => {
                info!("mDNS unavailable, discovery disabled");
                None
            }
            Err(err) => {
                warn!(error = %err, "mDNS browse failed, discovery disabled");
                None
            }
        };

        let tracker = self.clone();
        let join = thread::Builder::new()
            .name("mDNS Browser Thread".to_string())
            .spawn(move || tracker.browse_loop(rx, browse))
            .expect("failed to spawn mDNS browser thread");
        *self.thread.lock().unwrap() = Some(join);
    }

    fn browse_loop(
        self: Arc<Self>,
        control: Receiver<TrackerCommand>,
        browse: Option<pmodaap::MdnsBrowse>,
    ) {
        enum Woken {
            Command(Result<TrackerCommand, RecvError>),
            Event(Result<MdnsEvent, RecvError>),
        }

        // Le browse reste détenu par ce thread : le lâcher l'arrête.
        let mut events: Receiver<MdnsEvent> = match &browse {
            Some(browse) => browse.events().clone(),
            None => never(),
        };
        // Démarrage en pause : le gestionnaire de partage fait resume() une
        // fois son propre nom connu.
        let mut paused = true;

        loop {
            let woken = select! {
                recv(control) -> command => Woken::Command(command),
                recv(events) -> event => Woken::Event(event),
            };
            match woken {
                Woken::Command(Ok(TrackerCommand::Quit)) | Woken::Command(Err(_)) => return,
                Woken::Command(Ok(TrackerCommand::Pause(ack))) => {
                    paused = true;
                    let _ = ack.send(());
                }
                Woken::Command(Ok(TrackerCommand::Resume)) => paused = false,
                Woken::Event(Ok(event)) if !paused => {
                    let tracker = self.clone();
                    self.ctx.event_loop.call("mdns callback", move || {
                        tracker.handle_mdns_event(event);
                    });
                }
                Woken::Event(Ok(_)) => debug!("mdns event dropped while paused"),
                Woken::Event(Err(_)) => {
                    // Browse terminé : on continue à servir les commandes.
                    events = never();
                }
            }
        }
    }

    /// Pause synchrone : au retour, la boucle de browse est quiescente.
    pub fn pause(&self) {
        let control = self.control.lock().unwrap().clone();
        if let Some(tx) = control {
            let (ack_tx, ack_rx) = bounded::<()>(1);
            if tx.send(TrackerCommand::Pause(ack_tx)).is_ok() {
                let _ = ack_rx.recv();
            }
        }
    }

    pub fn resume(&self) {
        let control = self.control.lock().unwrap().clone();
        if let Some(tx) = control {
            let _ = tx.send(TrackerCommand::Resume);
        }
    }

    /// Arrête le thread de browse.
    pub fn stop(&self) {
        let control = self.control.lock().unwrap().take();
        if let Some(tx) = control {
            let _ = tx.send(TrackerCommand::Quit);
        }
        if let Some(join) = self.thread.lock().unwrap().take() {
            let _ = join.join();
        }
    }

    pub fn get_share(&self, share_id: i64) -> Option<Arc<Share>> {
        self.inner.lock().unwrap().shares.get(&share_id).cloned()
    }

    /// Démarre le suivi des items d'un partage (connexion + snapshot).
    pub fn track_share(&self, share_id: i64) {
        match self.get_share(share_id) {
            Some(share) => share.start_tracking(),
            None => warn!(share_id, "track_share: unknown share"),
        }
    }

    pub fn stop_tracking_share(&self, share_id: i64) {
        match self.get_share(share_id) {
            Some(share) => share.stop_tracking(),
            None => warn!(share_id, "stop_tracking_share: unknown share"),
        }
    }

    /// Point d'entrée des évènements mDNS, exécuté sur la boucle
    /// d'évènements.
    pub fn handle_mdns_event(self: &Arc<Self>, event: MdnsEvent) {
        // Notre propre annonce ne doit jamais apparaître comme un partage.
        if event.fullname == *self.local_name.lock().unwrap() {
            return;
        }
        debug!(
            added = event.added,
            fullname = %event.fullname,
            host = %event.host,
            port = event.port,
            "mdns event"
        );
        if event.added {
            self.handle_added(event);
        } else {
            self.handle_removed(event);
        }
    }

    fn handle_added(self: &Arc<Self>, event: MdnsEvent) {
        // L'identité suit (host, port) : un renommage conserve share_id.
        let share_id = share_id_for(&event.host, event.port);

        let mut inner = self.inner.lock().unwrap();
        inner.name_to_id.insert(event.fullname.clone(), share_id);

        if let Some(share) = inner.shares.get(&share_id).cloned() {
            drop(inner);
            if share.is_mounted() {
                // Renommage d'un partage connecté : pas de retrait d'onglet.
                share.cancel_stale_timer();
                share.set_name(&event.fullname);
                share.send_tabs_changed();
            } else {
                share.set_name(&event.fullname);
                if share.is_available() {
                    debug!(share_id, "share already registered and available");
                    share.cancel_stale_timer();
                    share.send_tabs_changed();
                }
            }
            return;
        }

        let share = match Share::new(
            self.ctx.clone(),
            share_id,
            &event.fullname,
            &event.host,
            event.port,
        ) {
            Ok(share) => share,
            Err(err) => {
                warn!(share_id, error = %err, "cannot create share");
                return;
            }
        };
        let connect_uuid = share.stamp_connect_uuid();
        inner.shares.insert(share_id, share.clone());
        drop(inner);

        self.try_to_add(&share, connect_uuid);
    }

    /// Connexion de test hors boucle : connect → databases → disconnect.
    /// Les deux continuations retrouvent le partage *courant* par son id et
    /// revérifient le jeton `connect_uuid` : un partage supprimé puis recréé
    /// entre-temps porte un jeton neuf et le callback périmé s'abandonne.
    fn try_to_add(self: &Arc<Self>, share: &Arc<Share>, connect_uuid: uuid::Uuid) {
        let factory = self.ctx.client_factory.clone();
        let host = share.host().to_string();
        let port = share.port();
        let share_id = share.share_id();

        let tracker_on_success = self.clone();
        let tracker_on_error = self.clone();

        self.ctx.event_loop.call_in_thread(
            "DAAP test connect",
            move || {
                let client = factory.make_client(&host, port);
                client.connect()?;
                if client.databases(false)?.is_empty() {
                    return Err(Error::Protocol("test connect: no databases".to_string()));
                }
                let _ = client.disconnect();
                Ok(())
            },
            move |_| {
                debug!(share_id, "test connect success");
                let Some(share) = tracker_on_success.get_share(share_id) else {
                    return;
                };
                if !share.connect_uuid_matches(connect_uuid) {
                    return;
                }
                share.clear_connect_uuid();
                share.set_available(true);
                tracker_on_success
                    .ctx
                    .messages
                    .broadcast(SharingMessage::ShareTabsChanged {
                        added: vec![share.tab_info()],
                        changed: vec![],
                        removed: vec![],
                    });
            },
            move |_| {
                debug!(share_id, "test connect failure");
                let Some(share) = tracker_on_error.get_share(share_id) else {
                    return;
                };
                if !share.connect_uuid_matches(connect_uuid) {
                    return;
                }
                share.clear_connect_uuid();
            },
        );
    }

    fn handle_removed(self: &Arc<Self>, event: MdnsEvent) {
        let mut inner = self.inner.lock().unwrap();
        let Some(share_id) = inner.name_to_id.remove(&event.fullname) else {
            // Déjà traité par ailleurs.
            debug!(fullname = %event.fullname, "removal for unknown name");
            return;
        };
        if inner.name_to_id.values().any(|id| *id == share_id) {
            debug!("out of order add/remove during rename?");
            return;
        }
        let Some(share) = inner.shares.get(&share_id).cloned() else {
            return;
        };

        if !share.is_tracking() {
            inner.shares.remove(&share_id);
            drop(inner);
            let available = share.is_available();
            let name = share.name();
            share.destroy();
            // Sans test connect réussi, aucun onglet n'a jamais existé.
            if available {
                self.ctx
                    .messages
                    .broadcast(SharingMessage::SharingDisappeared { share_id, name });
            }
        } else {
            drop(inner);
            // Partage connecté : fenêtre de grâce avant retrait.
            let tracker = self.clone();
            let guard = self.ctx.event_loop.call_later(
                STALE_SHARE_GRACE,
                "share tab removal timeout",
                move || tracker.remove_timeout_callback(share_id),
            );
            share.set_stale_timer(guard);
        }
    }

    fn remove_timeout_callback(self: &Arc<Self>, share_id: i64) {
        let share = self.inner.lock().unwrap().shares.remove(&share_id);
        let Some(share) = share else {
            return;
        };
        let name = share.name();
        share.cancel_stale_timer();
        share.stop_tracking();
        share.destroy();
        self.ctx
            .messages
            .broadcast(SharingMessage::SharingDisappeared { share_id, name });
    }
}
