//! Etat de transcodage par session : le pipeline média est une boîte noire
//! qui produit un manifeste HLS et des chunks MPEG-TS.
//!
//! La table `session → TranscodeJob` détient l'unique référence de chaque
//! job ; un remplacement (changement d'item, génération plus récente, seek
//! hors fenêtre) arrête l'ancien job hors du verrou.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use pmodaap::{DaapId, FileStream};

use crate::error::Result;

/// Tolérance de chunks au-delà de la position courante avant qu'une requête
/// ne soit traitée comme un seek.
const CHUNK_WINDOW: u64 = 3;

/// Pipeline de transcodage démarré pour un média.
pub trait TranscodePipeline: Send {
    /// Manifeste HLS courant.
    fn playlist(&mut self) -> Result<Vec<u8>>;

    /// Chunk TS suivant ; `None` en fin de flux.
    fn next_chunk(&mut self) -> Result<Option<Vec<u8>>>;

    /// Arrêt immédiat du pipeline.
    fn shutdown(&mut self);
}

/// Fabrique de pipelines (la boîte noire média).
pub trait TranscoderBackend: Send + Sync {
    /// Le média nécessite-t-il un transcodage pour être servi ?
    fn needs_transcode(&self, path: &Path) -> bool;

    /// Démarre un pipeline sur `path` à partir de `start_chunk`.
    /// `request_path` construit l'URL d'un chunk pour le manifeste.
    fn start(
        &self,
        path: &Path,
        item_id: DaapId,
        start_chunk: u64,
        request_path: &dyn Fn(u64) -> String,
    ) -> Result<Box<dyn TranscodePipeline>>;
}

/// Job de transcodage d'une session.
pub struct TranscodeJob {
    item_id: DaapId,
    generation: u64,
    path: PathBuf,
    start_chunk: u64,
    current_chunk: u64,
    pipeline: Option<Box<dyn TranscodePipeline>>,
}

impl TranscodeJob {
    /// Prépare un job sans démarrer le pipeline (création sous verrou, le
    /// démarrage se fait ensuite hors verrou via [`TranscodeJob::start`]).
    pub fn new(path: &Path, item_id: DaapId, generation: u64, chunk: Option<u64>) -> TranscodeJob {
        let start_chunk = chunk.unwrap_or(0);
        TranscodeJob {
            item_id,
            generation,
            path: path.to_path_buf(),
            start_chunk,
            current_chunk: start_chunk,
            pipeline: None,
        }
    }

    pub fn item_id(&self) -> DaapId {
        self.item_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_started(&self) -> bool {
        self.pipeline.is_some()
    }

    /// Une requête pour `chunk` sort-elle de la fenêtre courante ?
    pub fn is_seek(&self, chunk: u64) -> bool {
        chunk < self.start_chunk || chunk > self.current_chunk + CHUNK_WINDOW
    }

    /// Démarre le pipeline.
    pub fn start(
        &mut self,
        backend: &dyn TranscoderBackend,
        request_path: &dyn Fn(u64) -> String,
    ) -> Result<()> {
        let pipeline = backend.start(&self.path, self.item_id, self.start_chunk, request_path)?;
        self.pipeline = Some(pipeline);
        Ok(())
    }

    /// Manifeste HLS, positionné à `offset`.
    pub fn playlist(&mut self, offset: u64) -> Result<Option<FileStream>> {
        let Some(pipeline) = self.pipeline.as_mut() else {
            return Ok(None);
        };
        let data = pipeline.playlist()?;
        let mut cursor = Cursor::new(data);
        cursor.set_position(offset);
        Ok(Some(FileStream::Memory(cursor)))
    }

    /// Chunk TS suivant de la fenêtre.
    pub fn next_chunk(&mut self) -> Result<Option<FileStream>> {
        let Some(pipeline) = self.pipeline.as_mut() else {
            return Ok(None);
        };
        match pipeline.next_chunk()? {
            Some(data) => {
                self.current_chunk += 1;
                Ok(Some(FileStream::Memory(Cursor::new(data))))
            }
            None => Ok(None),
        }
    }

    /// Arrête le pipeline s'il tourne.
    pub fn shutdown(&mut self) {
        if let Some(mut pipeline) = self.pipeline.take() {
            pipeline.shutdown();
        }
    }
}
