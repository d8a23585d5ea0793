//! Structure placement (trees) layered on top of generated terrain.
//!
//! Structures are planned per chunk from that chunk's own grid, but the
//! resulting placements may reach into the 26 surrounding chunks. The chunk
//! loader applies them once every neighbor has terrain.

use cubic_voxel::{BlockId, BlockRegistry, CHUNK_SIZE, ChunkData, ChunkPos};
use glam::IVec3;
use rand::Rng;

use crate::generator::GenerationError;
use crate::seed::chunk_rng;

/// One block to write, in world coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockPlacement {
    /// World block coordinate.
    pub pos: IVec3,
    /// Block to place. Only overwrites air.
    pub block: BlockId,
}

/// Plans structures for one chunk.
pub trait StructureGenerator: Send + Sync {
    /// Placements for the chunk at `origin`, whose terrain grid is `data`.
    ///
    /// Every placement must lie within the chunk or its 26 neighbors.
    fn structures(&self, origin: ChunkPos, data: &ChunkData) -> Vec<BlockPlacement>;
}

/// Places nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoStructures;

impl StructureGenerator for NoStructures {
    fn structures(&self, _origin: ChunkPos, _data: &ChunkData) -> Vec<BlockPlacement> {
        Vec::new()
    }
}

/// Oak-style trees: a `log` trunk of 4..=6 blocks topped by a `leaves`
/// canopy of radius 2, grown on grass with air above.
#[derive(Clone, Debug)]
pub struct TreeGenerator {
    seed: u64,
    log: BlockId,
    leaves: BlockId,
    grass: BlockId,
    attempts: u32,
    chance: f64,
}

/// Leaves extend this far from the trunk horizontally.
const CANOPY_RADIUS: i32 = 2;

impl TreeGenerator {
    /// Creates a tree generator with the default density.
    pub fn new(seed: u64, registry: &BlockRegistry) -> Result<Self, GenerationError> {
        let id = |name: &str| {
            registry
                .lookup_by_name(name)
                .ok_or_else(|| GenerationError::MissingBlock(name.to_string()))
        };
        Ok(Self {
            seed,
            log: id("log")?,
            leaves: id("leaves")?,
            grass: id("grass")?,
            attempts: 4,
            chance: 0.5,
        })
    }

    /// Overrides how many columns are tried per chunk and the chance each
    /// valid column grows a tree.
    #[must_use]
    pub fn with_density(mut self, attempts: u32, chance: f64) -> Self {
        self.attempts = attempts;
        self.chance = chance.clamp(0.0, 1.0);
        self
    }

    /// Highest local Y of a grass cell with air above in column `(x, z)`.
    ///
    /// Grass on the top layer counts: the cell above it is in the chunk
    /// above, and placements only ever fill air.
    fn grass_surface(&self, data: &ChunkData, x: usize, z: usize) -> Option<usize> {
        (0..CHUNK_SIZE).rev().find(|&y| {
            data.get(x, y, z).id() == self.grass && (y + 1 == CHUNK_SIZE || data.get(x, y + 1, z).is_air())
        })
    }

    fn tree(&self, base: IVec3, height: i32, out: &mut Vec<BlockPlacement>) {
        for dy in 1..=height {
            out.push(BlockPlacement {
                pos: base + IVec3::new(0, dy, 0),
                block: self.log,
            });
        }
        let top = base.y + height;
        for y in (top - 2)..=(top + 1) {
            let radius = if y > top - 1 { 1 } else { CANOPY_RADIUS };
            for dz in -radius..=radius {
                for dx in -radius..=radius {
                    let corner = dx.abs() == radius && dz.abs() == radius;
                    let trunk = dx == 0 && dz == 0 && y <= top;
                    if (corner && radius == CANOPY_RADIUS) || trunk {
                        continue;
                    }
                    out.push(BlockPlacement {
                        pos: IVec3::new(base.x + dx, y, base.z + dz),
                        block: self.leaves,
                    });
                }
            }
        }
    }
}

impl StructureGenerator for TreeGenerator {
    fn structures(&self, origin: ChunkPos, data: &ChunkData) -> Vec<BlockPlacement> {
        let mut out = Vec::new();
        if data.is_uniform() {
            return out;
        }
        let mut rng = chunk_rng(self.seed, origin);
        for _ in 0..self.attempts {
            let x = rng.random_range(0..CHUNK_SIZE);
            let z = rng.random_range(0..CHUNK_SIZE);
            let height = rng.random_range(4..=6);
            let grow = rng.random_bool(self.chance);
            if !grow {
                continue;
            }
            if let Some(y) = self.grass_surface(data, x, z) {
                let base = origin.origin() + IVec3::new(x as i32, y as i32, z as i32);
                self.tree(base, height, &mut out);
            }
        }
        out
    }
}
