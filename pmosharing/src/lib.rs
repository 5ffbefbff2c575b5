//! # pmosharing - Consommation des partages DAAP du réseau local
//!
//! Côté entrant du moteur de partage :
//!
//! - [`tracker::DiscoveryTracker`] écoute les annonces mDNS, débounce les
//!   renommages et valide chaque partage par une connexion de test
//! - [`share::Share`] porte l'identité stable d'un partage et sa base miroir
//! - [`session::ClientSession`] suit un partage connecté : snapshot initial
//!   puis long-polls, traduits en [`item::SharingItem`] locaux
//! - [`eventloop::EventLoop`] est le thread unique qui possède les bases
//!   miroir et les messages UI
//!
//! Le codec DAAP et la pile mDNS sont injectés via les traits de `pmodaap`.

pub mod error;
pub mod eventloop;
pub mod item;
pub mod messages;
pub mod session;
pub mod share;
pub mod store;
pub mod tracker;

pub use error::{Error, Result};
pub use eventloop::{EventLoop, TimerGuard};
pub use item::{FileType, ItemKind, SharingItem, DURATION_SCALE};
pub use messages::{MessageBus, PlaylistTabInfo, ShareTabInfo, SharingMessage};
pub use session::{ClientSession, ClientUpdateResult, PlaylistTracker, SessionState};
pub use share::{share_id_for, Share, SharingContext};
pub use store::{ShareStore, VIRTUAL_PLAYLIST, VIRTUAL_PODCAST};
pub use tracker::{DiscoveryTracker, STALE_SHARE_GRACE};
