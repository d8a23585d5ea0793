//! Per-chunk RNG derivation.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use cubic_voxel::ChunkPos;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Combines the world seed and a chunk position into one well-mixed seed.
pub fn derive_chunk_seed(world_seed: u64, pos: ChunkPos) -> u64 {
    let mut hasher = DefaultHasher::new();
    world_seed.hash(&mut hasher);
    pos.hash(&mut hasher);
    hasher.finish()
}

/// A deterministic RNG for one chunk.
///
/// The same `(world_seed, pos)` pair always yields the same sequence,
/// regardless of which thread generates the chunk or in what order.
pub fn chunk_rng(world_seed: u64, pos: ChunkPos) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(derive_chunk_seed(world_seed, pos))
}
