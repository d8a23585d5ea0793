//! Free list of evicted chunks.
//!
//! Chunks are recycled rather than freed: [`ChunkPool::acquire`] pops the most
//! recently released chunk and resets it for its new position. The pool is
//! bounded; releases beyond the bound drop the chunk instead.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use cubic_voxel::ChunkPos;
use parking_lot::Mutex;
use tracing::{error, trace};

use crate::chunk::Chunk;

/// Pool of reusable chunk records.
pub struct ChunkPool {
    free: Mutex<Vec<Arc<Chunk>>>,
    max_pooled: usize,
    allocated: AtomicU64,
    reused: AtomicU64,
}

impl ChunkPool {
    /// Creates an empty pool keeping at most `max_pooled` free chunks.
    pub fn new(max_pooled: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            max_pooled,
            allocated: AtomicU64::new(0),
            reused: AtomicU64::new(0),
        }
    }

    /// A blank `Empty` chunk positioned at `pos`, recycled when possible.
    pub fn acquire(&self, pos: ChunkPos) -> Arc<Chunk> {
        let recycled = self.free.lock().pop();
        match recycled {
            Some(chunk) => {
                chunk.reset(pos);
                self.reused.fetch_add(1, Ordering::Relaxed);
                trace!(%pos, "reused pooled chunk");
                chunk
            }
            None => {
                self.allocated.fetch_add(1, Ordering::Relaxed);
                Arc::new(Chunk::new(pos))
            }
        }
    }

    /// Returns an evicted chunk to the pool.
    ///
    /// The chunk must be unpinned, clean, and no longer referenced elsewhere.
    /// Returns `false` if it was dropped instead of pooled.
    pub fn release(&self, chunk: Arc<Chunk>) -> bool {
        let pins = chunk.pin_count();
        let dirty = chunk.is_dirty();
        debug_assert_eq!(pins, 0, "releasing pinned chunk {}", chunk.position());
        debug_assert!(!dirty, "releasing dirty chunk {}", chunk.position());
        if pins > 0 || dirty {
            error!(
                pos = %chunk.position(),
                pins,
                dirty,
                "refusing to pool chunk still in use"
            );
            return false;
        }
        // Outside holders of the Arc would observe the reset; let them keep
        // the old record and free it when they drop it.
        if Arc::strong_count(&chunk) > 1 {
            return false;
        }

        let mut free = self.free.lock();
        if free.len() >= self.max_pooled {
            return false;
        }
        free.push(chunk);
        true
    }

    /// Number of chunks waiting for reuse.
    pub fn len(&self) -> usize {
        self.free.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Chunks created because the pool was empty.
    pub fn allocated(&self) -> u64 {
        self.allocated.load(Ordering::Relaxed)
    }

    /// Chunks handed out from the free list.
    pub fn reused(&self) -> u64 {
        self.reused.load(Ordering::Relaxed)
    }
}

impl Default for ChunkPool {
    fn default() -> Self {
        Self::new(1024)
    }
}
