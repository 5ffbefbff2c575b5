//! # pmodaap - Contrat de la bibliothèque DAAP
//!
//! Ce crate définit la frontière entre le moteur de partage et la
//! bibliothèque DAAP fournie (codec DMAP, framing HTTP, sessions). Le codec
//! lui-même n'est pas implémenté ici : le moteur consomme les traits
//! [`DaapClient`], [`DaapServer`] et [`MdnsStack`], et les tests utilisent
//! des implémentations en mémoire.
//!
//! ## Architecture
//!
//! - [`dmap`] : constantes de tags DMAP, mediakind/itemkind, enregistrement
//!   de tags personnalisés
//! - [`client`] : accès client à un serveur DAAP distant (snapshot + deltas)
//! - [`server`] : contrat côté serveur (catalogue interrogé par le codec)
//! - [`mdns`] : façade mDNS (browse + enregistrement de service)

pub mod client;
pub mod dmap;
pub mod mdns;
pub mod server;

mod error;

pub use client::{ClientFactory, DaapClient, DaapId, ItemDelta, PlaylistDelta, RemoteDatabase, RemoteItem, RemotePlaylist};
pub use error::DaapError;
pub use mdns::{MdnsBrowse, MdnsEvent, MdnsRegistration, MdnsStack};
pub use server::{
    ConnectionHandle, ConnectionMonitor, DaapItem, DaapPlaylist, DaapServer, Entry, FileStream,
    ServerBackend, ServerFactory, ServerRequest, SessionId,
};
