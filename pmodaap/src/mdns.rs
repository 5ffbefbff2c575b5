//! Façade mDNS (_daap._tcp).
//!
//! L'implémentation réelle (Avahi, Bonjour) vit derrière [`MdnsStack`]. Une
//! pile indisponible est définitive pour le processus : le partage reste
//! fonctionnel sur le port local mais sans annonce, et la découverte ne
//! produit aucun évènement.

use crossbeam_channel::Receiver;

use crate::error::DaapError;

/// Evènement de browse : apparition ou disparition d'un service annoncé.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MdnsEvent {
    pub added: bool,
    pub fullname: String,
    pub host: String,
    pub port: u16,
}

/// Session de browse active. Lâcher le handle arrête le browse.
pub struct MdnsBrowse {
    events: Receiver<MdnsEvent>,
}

impl MdnsBrowse {
    pub fn new(events: Receiver<MdnsEvent>) -> Self {
        Self { events }
    }

    pub fn events(&self) -> &Receiver<MdnsEvent> {
        &self.events
    }
}

/// Enregistrement de service actif.
///
/// Le nom effectivement attribué (après résolution de collision) arrive sur
/// [`MdnsRegistration::assigned`].
pub struct MdnsRegistration {
    assigned: Receiver<String>,
    unregister: Option<Box<dyn FnOnce() + Send>>,
}

impl MdnsRegistration {
    pub fn new(assigned: Receiver<String>, unregister: Box<dyn FnOnce() + Send>) -> Self {
        Self {
            assigned,
            unregister: Some(unregister),
        }
    }

    pub fn assigned(&self) -> &Receiver<String> {
        &self.assigned
    }

    /// Retire l'annonce du réseau.
    pub fn unregister(mut self) {
        if let Some(unregister) = self.unregister.take() {
            unregister();
        }
    }
}

/// Pile mDNS injectée dans le moteur.
pub trait MdnsStack: Send + Sync {
    /// Les bibliothèques mDNS sont-elles utilisables sur ce système ?
    fn available(&self) -> bool;

    /// Démarre un browse `_daap._tcp`.
    ///
    /// `DaapError::MdnsUnavailable` quand la pile est absente.
    fn browse(&self) -> Result<MdnsBrowse, DaapError>;

    /// Annonce `(name, port)` ; le nom réellement attribué est remis sur le
    /// canal du handle.
    fn register(&self, name: &str, port: u16) -> Result<MdnsRegistration, DaapError>;
}
