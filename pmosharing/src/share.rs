//! Partage distant : identité stable, base miroir, cycle de vie.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};
use uuid::Uuid;

use pmodaap::ClientFactory;

use crate::error::{Error, Result};
use crate::eventloop::{EventLoop, TimerGuard};
use crate::messages::{MessageBus, ShareTabInfo, SharingMessage};
use crate::session::ClientSession;
use crate::store::ShareStore;

/// Nombre d'emplacements `sharing-db-<n>` sondés avant d'abandonner.
const DB_SLOT_CANDIDATES: u32 = 300;

/// Contexte du moteur, partagé par tous les composants.
///
/// Porte en particulier l'ensemble des chemins de bases en usage : chaque
/// [`Share`] doit posséder un chemin distinct, et les emplacements sont
/// relâchés à la destruction.
pub struct SharingContext {
    pub event_loop: EventLoop,
    pub messages: MessageBus,
    pub client_factory: Arc<dyn ClientFactory>,
    pub support_dir: PathBuf,
    used_db_paths: Mutex<HashSet<PathBuf>>,
}

impl SharingContext {
    pub fn new(
        event_loop: EventLoop,
        messages: MessageBus,
        client_factory: Arc<dyn ClientFactory>,
        support_dir: PathBuf,
    ) -> Arc<Self> {
        Arc::new(Self {
            event_loop,
            messages,
            client_factory,
            support_dir,
            used_db_paths: Mutex::new(HashSet::new()),
        })
    }

    /// Construit le contexte depuis la configuration (répertoire de support).
    pub fn from_config(
        config: &pmoconfig::Config,
        event_loop: EventLoop,
        messages: MessageBus,
        client_factory: Arc<dyn ClientFactory>,
    ) -> Result<Arc<Self>> {
        let support_dir = config
            .support_directory()
            .map_err(|e| Error::Resource(e.to_string()))?;
        Ok(Self::new(event_loop, messages, client_factory, support_dir))
    }

    fn claim_db_path(&self, path: &PathBuf) -> bool {
        self.used_db_paths.lock().unwrap().insert(path.clone())
    }

    fn release_db_path(&self, path: &PathBuf) {
        self.used_db_paths.lock().unwrap().remove(path);
    }
}

/// Identifiant stable d'un partage, dérivé de `(host, port)`.
///
/// Le nom annoncé peut changer (renommage) sans changer l'identité. FNV-1a
/// fixe plutôt qu'un hachage salé : la valeur doit être la même d'un
/// processus à l'autre. Toujours strictement positif.
pub fn share_id_for(host: &str, port: u16) -> i64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = FNV_OFFSET;
    for byte in host.as_bytes().iter().chain(port.to_be_bytes().iter()) {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }

    let id = (hash & 0x7fff_ffff_ffff_ffff) as i64;
    if id == 0 {
        1
    } else {
        id
    }
}

struct ShareState {
    name: String,
    available: bool,
    mounted: bool,
    is_updating: bool,
    connect_uuid: Option<Uuid>,
    stale_timer: Option<TimerGuard>,
}

/// Poignée d'un partage distant actif.
pub struct Share {
    share_id: i64,
    host: String,
    port: u16,
    ctx: Arc<SharingContext>,
    db_path: PathBuf,
    store: Mutex<Option<Arc<ShareStore>>>,
    session: Mutex<Option<Arc<ClientSession>>>,
    state: Mutex<ShareState>,
}

impl Share {
    /// Crée le partage et lui alloue une base miroir inutilisée.
    pub fn new(
        ctx: Arc<SharingContext>,
        share_id: i64,
        name: &str,
        host: &str,
        port: u16,
    ) -> Result<Arc<Share>> {
        let (db_path, store) = Self::find_unused_db(&ctx)?;

        Ok(Arc::new(Share {
            share_id,
            host: host.to_string(),
            port,
            ctx,
            db_path,
            store: Mutex::new(Some(Arc::new(store))),
            session: Mutex::new(None),
            state: Mutex::new(ShareState {
                name: name.to_string(),
                available: false,
                mounted: false,
                is_updating: false,
                connect_uuid: None,
                stale_timer: None,
            }),
        }))
    }

    /// Sonde les emplacements `sharing-db-<n>` dans l'ordre et réclame le
    /// premier libre. Les fichiers orphelins d'une instance précédente sont
    /// supprimés puis réutilisés.
    fn find_unused_db(ctx: &Arc<SharingContext>) -> Result<(PathBuf, ShareStore)> {
        for i in 0..DB_SLOT_CANDIDATES {
            let candidate = ctx.support_dir.join(format!("sharing-db-{i}"));
            if !ctx.claim_db_path(&candidate) {
                continue;
            }
            if candidate.exists() {
                if let Err(err) = std::fs::remove_file(&candidate) {
                    warn!(path = %candidate.display(), error = %err,
                          "find_unused_db: error removing stale database");
                    ctx.release_db_path(&candidate);
                    continue;
                }
            }
            match ShareStore::open(&candidate) {
                Ok(store) => return Ok((candidate, store)),
                Err(err) => {
                    warn!(path = %candidate.display(), error = %err,
                          "find_unused_db: cannot open database");
                    ctx.release_db_path(&candidate);
                }
            }
        }
        Err(Error::Resource(
            "no unused database path for share".to_string(),
        ))
    }

    pub fn context(&self) -> &Arc<SharingContext> {
        &self.ctx
    }

    pub fn share_id(&self) -> i64 {
        self.share_id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn name(&self) -> String {
        self.state.lock().unwrap().name.clone()
    }

    pub fn set_name(&self, name: &str) {
        self.state.lock().unwrap().name = name.to_string();
    }

    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }

    pub fn is_available(&self) -> bool {
        self.state.lock().unwrap().available
    }

    pub fn set_available(&self, available: bool) {
        self.state.lock().unwrap().available = available;
    }

    pub fn is_mounted(&self) -> bool {
        self.state.lock().unwrap().mounted
    }

    pub fn is_updating(&self) -> bool {
        self.state.lock().unwrap().is_updating
    }

    /// Le partage a-t-il une session cliente active ?
    pub fn is_tracking(&self) -> bool {
        self.session.lock().unwrap().is_some()
    }

    // ------------------------------------------------------------------
    // Jeton de connexion de test
    // ------------------------------------------------------------------

    /// Pose un nouveau jeton et le retourne ; les callbacks du test connect
    /// ne s'appliquent que si le jeton n'a pas changé entre-temps.
    pub fn stamp_connect_uuid(&self) -> Uuid {
        let uuid = Uuid::new_v4();
        self.state.lock().unwrap().connect_uuid = Some(uuid);
        uuid
    }

    pub fn connect_uuid_matches(&self, uuid: Uuid) -> bool {
        self.state.lock().unwrap().connect_uuid == Some(uuid)
    }

    pub fn clear_connect_uuid(&self) {
        self.state.lock().unwrap().connect_uuid = None;
    }

    // ------------------------------------------------------------------
    // Timer de péremption (debounce remove/add)
    // ------------------------------------------------------------------

    pub fn set_stale_timer(&self, guard: TimerGuard) {
        let mut state = self.state.lock().unwrap();
        if let Some(old) = state.stale_timer.take() {
            old.cancel();
        }
        state.stale_timer = Some(guard);
    }

    pub fn cancel_stale_timer(&self) {
        if let Some(guard) = self.state.lock().unwrap().stale_timer.take() {
            guard.cancel();
        }
    }

    pub fn has_stale_timer(&self) -> bool {
        self.state.lock().unwrap().stale_timer.is_some()
    }

    // ------------------------------------------------------------------
    // Cycle de vie
    // ------------------------------------------------------------------

    /// Magasin miroir ; `NotFound` après destruction.
    pub fn store(&self) -> Result<Arc<ShareStore>> {
        self.store
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::NotFound(format!("share {} destroyed", self.share_id)))
    }

    /// Démarre le suivi des items. Idempotent.
    pub fn start_tracking(self: &Arc<Self>) {
        let mut session = self.session.lock().unwrap();
        if session.is_none() {
            *session = Some(ClientSession::start(self.clone()));
        }
    }

    /// Arrête le suivi : déconnecte la session, purge la base miroir et
    /// signale l'onglet démonté.
    pub fn stop_tracking(&self) {
        let session = self.session.lock().unwrap().take();
        if let Some(session) = session {
            session.client_disconnect();
            if let Ok(store) = self.store() {
                if let Err(err) = store.purge() {
                    warn!(share_id = self.share_id, error = %err,
                          "stop_tracking: purge failed");
                }
            }
            {
                let mut state = self.state.lock().unwrap();
                state.mounted = false;
                state.is_updating = false;
            }
            self.send_tabs_changed();
        }
    }

    /// Libère la base miroir et son emplacement. Dernière étape de vie.
    pub fn destroy(&self) {
        self.cancel_stale_timer();
        let store = self.store.lock().unwrap().take();
        drop(store);
        if self.db_path.exists() {
            if let Err(err) = std::fs::remove_file(&self.db_path) {
                warn!(path = %self.db_path.display(), error = %err,
                      "destroy: cannot delete share database");
            }
        }
        self.ctx.release_db_path(&self.db_path);
        debug!(share_id = self.share_id, "share destroyed");
    }

    // ------------------------------------------------------------------
    // Etat de mise à jour (affiché dans l'onglet)
    // ------------------------------------------------------------------

    pub fn update_started(&self) {
        self.state.lock().unwrap().is_updating = true;
        self.send_tabs_changed();
    }

    /// Fin d'une connexion ou d'un snapshot. Le snapshot est appliqué avant
    /// cet appel : l'onglet ne peut pas apparaître monté et vide.
    pub fn update_finished(&self, success: bool) {
        {
            let mut state = self.state.lock().unwrap();
            state.mounted = success;
            state.is_updating = false;
        }
        self.send_tabs_changed();
    }

    pub fn tab_info(&self) -> ShareTabInfo {
        let state = self.state.lock().unwrap();
        ShareTabInfo {
            share_id: self.share_id,
            name: state.name.clone(),
            host: self.host.clone(),
            port: self.port,
            available: state.available,
            mounted: state.mounted,
            is_updating: state.is_updating,
        }
    }

    pub fn send_tabs_changed(&self) {
        self.ctx.messages.broadcast(SharingMessage::ShareTabsChanged {
            added: vec![],
            changed: vec![self.tab_info()],
            removed: vec![],
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::MessageBus;
    use pmodaap::{ClientFactory, DaapClient};

    struct NoClientFactory;

    impl ClientFactory for NoClientFactory {
        fn make_client(&self, _host: &str, _port: u16) -> Arc<dyn DaapClient> {
            unreachable!("tests never connect");
        }
    }

    fn test_context() -> (tempfile::TempDir, Arc<SharingContext>) {
        let dir = tempfile::tempdir().unwrap();
        let ctx = SharingContext::new(
            EventLoop::start(),
            MessageBus::new(),
            Arc::new(NoClientFactory),
            dir.path().to_path_buf(),
        );
        (dir, ctx)
    }

    #[test]
    fn test_share_id_is_stable_and_positive() {
        let a = share_id_for("music.local", 3689);
        let b = share_id_for("music.local", 3689);
        assert_eq!(a, b);
        assert!(a > 0);

        // Le port fait partie de l'identité
        assert_ne!(a, share_id_for("music.local", 3690));
        assert_ne!(a, share_id_for("other.local", 3689));
    }

    #[test]
    fn test_distinct_shares_get_distinct_db_paths() {
        let (_dir, ctx) = test_context();

        let s1 = Share::new(ctx.clone(), 1, "Un", "a.local", 3689).unwrap();
        let s2 = Share::new(ctx.clone(), 2, "Deux", "b.local", 3689).unwrap();
        let s3 = Share::new(ctx.clone(), 3, "Trois", "c.local", 3689).unwrap();

        assert_ne!(s1.db_path(), s2.db_path());
        assert_ne!(s2.db_path(), s3.db_path());
        assert_ne!(s1.db_path(), s3.db_path());

        ctx.event_loop.shutdown();
    }

    #[test]
    fn test_destroy_releases_db_slot() {
        let (_dir, ctx) = test_context();

        let s1 = Share::new(ctx.clone(), 1, "Un", "a.local", 3689).unwrap();
        let first_path = s1.db_path().clone();
        s1.destroy();
        assert!(!first_path.exists());

        // Le premier emplacement redevient disponible
        let s2 = Share::new(ctx.clone(), 2, "Deux", "b.local", 3689).unwrap();
        assert_eq!(s2.db_path(), &first_path);

        ctx.event_loop.shutdown();
    }

    #[test]
    fn test_stale_file_is_reclaimed() {
        let (dir, ctx) = test_context();

        // Reste d'une instance précédente
        let stale = dir.path().join("sharing-db-0");
        std::fs::write(&stale, b"leftover").unwrap();

        let share = Share::new(ctx.clone(), 1, "Un", "a.local", 3689).unwrap();
        assert_eq!(share.db_path(), &stale);
        // Le fichier a été remplacé par une base neuve
        assert!(share.store().unwrap().item_count().unwrap() == 0);

        ctx.event_loop.shutdown();
    }

    #[test]
    fn test_connect_uuid_fencing() {
        let (_dir, ctx) = test_context();
        let share = Share::new(ctx.clone(), 1, "Un", "a.local", 3689).unwrap();

        let first = share.stamp_connect_uuid();
        assert!(share.connect_uuid_matches(first));

        // Ré-enregistrement : nouveau jeton, l'ancien ne s'applique plus
        let second = share.stamp_connect_uuid();
        assert!(!share.connect_uuid_matches(first));
        assert!(share.connect_uuid_matches(second));

        share.clear_connect_uuid();
        assert!(!share.connect_uuid_matches(second));

        ctx.event_loop.shutdown();
    }

    #[test]
    fn test_update_finished_reports_mount_state() {
        let (_dir, ctx) = test_context();
        let share = Share::new(ctx.clone(), 1, "Un", "a.local", 3689).unwrap();
        let rx = ctx.messages.subscribe();

        share.update_started();
        assert!(share.is_updating());

        share.update_finished(true);
        assert!(share.is_mounted());
        assert!(!share.is_updating());

        // Deux TabsChanged : démarrage puis fin
        let mut seen = 0;
        while let Ok(message) = rx.try_recv() {
            if matches!(message, SharingMessage::ShareTabsChanged { .. }) {
                seen += 1;
            }
        }
        assert_eq!(seen, 2);

        ctx.event_loop.shutdown();
    }
}
