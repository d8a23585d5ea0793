use std::path::PathBuf;

use cubic_terrain::GenerationError;
use cubic_voxel::{ChunkPos, ChunkSerError};
use thiserror::Error;

use crate::state::ChunkState;

/// Errors raised by a [`ChunkStorage`](crate::storage::ChunkStorage) backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt chunk data at {pos}: {source}")]
    Corrupt {
        pos: ChunkPos,
        #[source]
        source: ChunkSerError,
    },
    #[error("no stored chunk at {0}")]
    Missing(ChunkPos),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised while advancing a chunk through a lifecycle stage.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    /// A lifecycle ordering rule was broken. Always a bug.
    #[error("lifecycle invariant violated: {0}")]
    Invariant(String),
    /// The stage panicked; the chunk was put back in its entry state.
    #[error("stage panicked: {0}")]
    Panicked(String),
}

/// Errors returned by the public world API.
#[derive(Debug, Error)]
pub enum WorldError {
    #[error("chunk {pos} is not ready (state {state})")]
    ChunkNotReady { pos: ChunkPos, state: ChunkState },
    #[error("unknown block: {0}")]
    UnknownBlock(String),
}
