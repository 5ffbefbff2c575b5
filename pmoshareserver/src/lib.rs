//! # pmoshareserver - Publication de la bibliothèque locale en DAAP
//!
//! Côté sortant du moteur de partage :
//!
//! - [`catalog::ServerCatalog`] maintient les enregistrements exportés sous
//!   une révision monotone, sert les long-polls et les flux de fichiers
//! - [`record`] construit les enregistrements DAAP depuis le modèle hôte
//! - [`transcode`] gère l'état de transcodage par session (le pipeline média
//!   est une boîte noire)
//! - [`controller::ServerController`] possède le serveur, son thread, et
//!   coordonne annonce mDNS, configuration et requêtes frontend
//!
//! Le codec serveur DAAP et la pile mDNS sont injectés via les traits de
//! `pmodaap`.

pub mod catalog;
pub mod controller;
pub mod error;
pub mod model;
pub mod record;
pub mod transcode;

pub use catalog::{ServerCatalog, ShareTypes};
pub use controller::{InterestCallbacks, ServerController};
pub use error::{Error, Result};
pub use model::{HostId, HostItem, HostModel, HostPlaylist, PlaylistKind, ERSATZ_FEED_PREFIXES};
pub use record::{build_item_record, build_playlist_record, SUPPORTED_FORMATS};
pub use transcode::{TranscodeJob, TranscodePipeline, TranscoderBackend};
