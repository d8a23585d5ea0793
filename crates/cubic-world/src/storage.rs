//! Chunk persistence.
//!
//! A backend stores one blob per chunk in the `CBCK` format together with the
//! lifecycle state the chunk had when saved (capped at `BlockGenerated`).
//! Loading strips light: it is recomputed once the chunk is lit again.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use cubic_voxel::{ChunkData, ChunkPos, ChunkSerError};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::chunk::Chunk;
use crate::error::StorageError;
use crate::state::ChunkState;

/// Load/save backend for chunks.
pub trait ChunkStorage: Send + Sync {
    /// The state stored for `pos`, or `Empty` if nothing is stored.
    fn state_in_storage(&self, pos: ChunkPos) -> Result<ChunkState, StorageError>;

    /// Fills `chunk`'s block data from storage. Does not change its state.
    fn load_chunk(&self, chunk: &Chunk) -> Result<(), StorageError>;

    /// Persists `chunk`'s block data and current state.
    fn save_chunk(&self, chunk: &Chunk) -> Result<(), StorageError>;
}

/// Serializes a chunk with its persisted state.
pub fn encode_chunk(chunk: &Chunk) -> Vec<u8> {
    let state = chunk.state().persisted();
    chunk.peek_blocks().serialize_with_state(state.bits())
}

/// Decodes a stored blob into unlit block data and its stable state.
pub fn decode_chunk(pos: ChunkPos, bytes: &[u8]) -> Result<(ChunkData, ChunkState), StorageError> {
    let (mut data, bits) = ChunkData::deserialize_with_state(bytes)
        .map_err(|source| StorageError::Corrupt { pos, source })?;
    let state = ChunkState::from_bits(bits)
        .filter(|s| s.is_stable())
        .ok_or(StorageError::Corrupt {
            pos,
            source: ChunkSerError::InvalidState(bits),
        })?;
    data.clear_light();
    data.compact();
    Ok((data, state.persisted()))
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Keeps serialized chunks in a hash map. Useful for tests and for sessions
/// that should survive eviction but not process exit.
#[derive(Default)]
pub struct MemoryStorage {
    blobs: Mutex<FxHashMap<ChunkPos, Vec<u8>>>,
    loads: AtomicUsize,
    saves: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored chunks.
    pub fn len(&self) -> usize {
        self.blobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, pos: ChunkPos) -> bool {
        self.blobs.lock().contains_key(&pos)
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::Relaxed)
    }
}

impl ChunkStorage for MemoryStorage {
    fn state_in_storage(&self, pos: ChunkPos) -> Result<ChunkState, StorageError> {
        match self.blobs.lock().get(&pos) {
            Some(bytes) => decode_chunk(pos, bytes).map(|(_, state)| state),
            None => Ok(ChunkState::Empty),
        }
    }

    fn load_chunk(&self, chunk: &Chunk) -> Result<(), StorageError> {
        let pos = chunk.position();
        let (data, _) = {
            let blobs = self.blobs.lock();
            let bytes = blobs.get(&pos).ok_or(StorageError::Missing(pos))?;
            decode_chunk(pos, bytes)?
        };
        chunk.replace_blocks(data);
        self.loads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn save_chunk(&self, chunk: &Chunk) -> Result<(), StorageError> {
        let bytes = encode_chunk(chunk);
        self.blobs.lock().insert(chunk.position(), bytes);
        self.saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// On disk
// ---------------------------------------------------------------------------

/// One file per chunk, `c.<x>.<y>.<z>.cbck`, under a save directory.
///
/// Writes go to a temporary file that is renamed over the target.
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Uses `dir`, creating it on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File path for the chunk at `pos`.
    pub fn chunk_path(&self, pos: ChunkPos) -> PathBuf {
        self.dir.join(format!("c.{}.{}.{}.cbck", pos.x, pos.y, pos.z))
    }

    fn read(&self, pos: ChunkPos) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.chunk_path(pos);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }
}

impl ChunkStorage for FileStorage {
    fn state_in_storage(&self, pos: ChunkPos) -> Result<ChunkState, StorageError> {
        match self.read(pos)? {
            Some(bytes) => decode_chunk(pos, &bytes).map(|(_, state)| state),
            None => Ok(ChunkState::Empty),
        }
    }

    fn load_chunk(&self, chunk: &Chunk) -> Result<(), StorageError> {
        let pos = chunk.position();
        let bytes = self.read(pos)?.ok_or(StorageError::Missing(pos))?;
        let (data, state) = decode_chunk(pos, &bytes)?;
        chunk.replace_blocks(data);
        debug!(%pos, %state, bytes = bytes.len(), "loaded chunk from disk");
        Ok(())
    }

    fn save_chunk(&self, chunk: &Chunk) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| StorageError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let pos = chunk.position();
        let path = self.chunk_path(pos);
        let tmp_path = path.with_extension("tmp");
        let bytes = encode_chunk(chunk);
        std::fs::write(&tmp_path, &bytes).map_err(|source| StorageError::Io {
            path: tmp_path.clone(),
            source,
        })?;
        std::fs::rename(&tmp_path, &path).map_err(|source| StorageError::Io {
            path: path.clone(),
            source,
        })?;
        debug!(%pos, bytes = bytes.len(), "saved chunk to disk");
        Ok(())
    }
}
