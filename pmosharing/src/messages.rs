//! Messages à destination du frontend.

use std::sync::{Arc, Mutex};

use crossbeam_channel::{unbounded, Receiver, Sender};
use pmodaap::DaapId;

/// Etat d'un onglet de partage distant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareTabInfo {
    pub share_id: i64,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub available: bool,
    pub mounted: bool,
    pub is_updating: bool,
}

/// Etat d'un onglet playlist au sein d'un partage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistTabInfo {
    pub share_id: i64,
    pub playlist_id: DaapId,
    pub name: String,
    pub podcast: bool,
}

/// Messages émis par le moteur de partage.
#[derive(Debug, Clone)]
pub enum SharingMessage {
    /// L'onglet d'un partage est apparu ou a changé (nom, flags).
    ShareTabsChanged {
        added: Vec<ShareTabInfo>,
        changed: Vec<ShareTabInfo>,
        removed: Vec<i64>,
    },
    /// Les playlists visibles d'un partage connecté ont changé.
    PlaylistTabsChanged {
        share_id: i64,
        added: Vec<PlaylistTabInfo>,
        changed: Vec<PlaylistTabInfo>,
        removed: Vec<DaapId>,
    },
    /// Le test ou la connexion à un partage a échoué.
    SharingConnectFailed { share_id: i64 },
    /// Un partage annoncé a disparu du réseau.
    SharingDisappeared { share_id: i64, name: String },
}

/// Bus de diffusion des messages moteur → frontend.
#[derive(Clone, Default)]
pub struct MessageBus {
    subscribers: Arc<Mutex<Vec<Sender<SharingMessage>>>>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn subscribe(&self) -> Receiver<SharingMessage> {
        let (tx, rx) = unbounded::<SharingMessage>();
        {
            let mut subscribers = self.subscribers.lock().unwrap();
            subscribers.push(tx);
        }
        rx
    }

    pub fn broadcast(&self, message: SharingMessage) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| tx.send(message.clone()).is_ok());
    }
}
