use std::ops::Deref;
use std::sync::Arc;

use crate::chunk::Chunk;

/// Keeps a chunk from being evicted or recycled while held.
///
/// Obtained from [`ChunkManager::pin`](crate::ChunkManager::pin); the pin is
/// released on drop.
pub struct PinGuard {
    chunk: Arc<Chunk>,
}

impl PinGuard {
    pub(crate) fn new(chunk: Arc<Chunk>) -> Self {
        chunk.pin();
        Self { chunk }
    }

    /// The pinned chunk.
    pub fn chunk(&self) -> &Arc<Chunk> {
        &self.chunk
    }
}

impl Deref for PinGuard {
    type Target = Chunk;

    fn deref(&self) -> &Chunk {
        &self.chunk
    }
}

impl Drop for PinGuard {
    fn drop(&mut self) {
        self.chunk.unpin();
    }
}
