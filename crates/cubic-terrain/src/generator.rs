//! Terrain generator contract and the built-in generators.

use cubic_voxel::{BlockData, BlockId, BlockRegistry, CHUNK_SIZE, ChunkData, ChunkPos};
use thiserror::Error;
use tracing::debug;

use crate::heightmap::{HeightmapParams, HeightmapSampler};

/// Errors raised by a terrain generator.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// A block the generator needs is not in the registry.
    #[error("terrain block '{0}' is not registered")]
    MissingBlock(String),
    /// The generator could not produce the chunk.
    #[error("terrain generation failed at {pos}: {reason}")]
    Failed {
        /// Chunk that failed.
        pos: ChunkPos,
        /// Human-readable cause.
        reason: String,
    },
}

/// Produces the raw block grid of one chunk.
///
/// Implementations must be deterministic for a fixed seed and must not
/// depend on any other chunk.
pub trait TerrainGenerator: Send + Sync {
    /// Generates the grid for the chunk whose minimum corner is `origin`.
    fn generate_terrain(&self, origin: ChunkPos) -> Result<ChunkData, GenerationError>;
}

// ---------------------------------------------------------------------------
// Flat
// ---------------------------------------------------------------------------

/// Fills every cell with world Y below `ground_y` with one block, air above.
#[derive(Clone, Debug)]
pub struct FlatTerrain {
    /// First world Y that is air.
    pub ground_y: i32,
    /// Block below the ground line.
    pub block: BlockId,
}

impl FlatTerrain {
    /// Creates a flat generator.
    pub fn new(ground_y: i32, block: BlockId) -> Self {
        Self { ground_y, block }
    }
}

impl TerrainGenerator for FlatTerrain {
    fn generate_terrain(&self, origin: ChunkPos) -> Result<ChunkData, GenerationError> {
        let size = CHUNK_SIZE as i32;
        let solid = BlockData::new(self.block);
        if origin.y + size <= self.ground_y {
            return Ok(ChunkData::new(solid));
        }
        if origin.y >= self.ground_y {
            return Ok(ChunkData::new_air());
        }
        let mut data = ChunkData::new_air();
        for y in 0..(self.ground_y - origin.y) as usize {
            for z in 0..CHUNK_SIZE {
                for x in 0..CHUNK_SIZE {
                    data.set(x, y, z, solid);
                }
            }
        }
        Ok(data)
    }
}

// ---------------------------------------------------------------------------
// Heightmap
// ---------------------------------------------------------------------------

/// Block ids used by [`HeightmapTerrain`].
#[derive(Clone, Copy, Debug)]
pub struct TerrainBlocks {
    /// Deep fill.
    pub stone: BlockId,
    /// Sub-surface layer.
    pub dirt: BlockId,
    /// Surface above sea level.
    pub grass: BlockId,
    /// Surface at or below sea level.
    pub sand: BlockId,
    /// Fills air up to sea level.
    pub water: BlockId,
    /// World floor.
    pub bedrock: BlockId,
}

impl TerrainBlocks {
    /// Looks up the standard block names.
    pub fn from_registry(registry: &BlockRegistry) -> Result<Self, GenerationError> {
        let id = |name: &str| {
            registry
                .lookup_by_name(name)
                .ok_or_else(|| GenerationError::MissingBlock(name.to_string()))
        };
        Ok(Self {
            stone: id("stone")?,
            dirt: id("dirt")?,
            grass: id("grass")?,
            sand: id("sand")?,
            water: id("water")?,
            bedrock: id("bedrock")?,
        })
    }
}

/// Rolling hills from an fBm heightmap: stone, a dirt layer, grass on top,
/// sand and water at or below sea level, bedrock at the floor.
pub struct HeightmapTerrain {
    sampler: HeightmapSampler,
    blocks: TerrainBlocks,
    sea_level: i32,
    floor_y: i32,
}

/// Dirt thickness under the surface block.
const DIRT_DEPTH: i32 = 3;

impl HeightmapTerrain {
    /// Creates a generator around `sea_level`. Everything at or below
    /// `sea_level - 64` is bedrock.
    pub fn new(seed: u64, sea_level: i32, blocks: TerrainBlocks) -> Self {
        Self::with_params(
            HeightmapParams {
                seed,
                ..Default::default()
            },
            sea_level,
            blocks,
        )
    }

    /// Creates a generator with explicit noise parameters.
    pub fn with_params(params: HeightmapParams, sea_level: i32, blocks: TerrainBlocks) -> Self {
        Self {
            sampler: HeightmapSampler::new(params),
            blocks,
            sea_level,
            floor_y: sea_level - 64,
        }
    }

    /// Surface height of world column `(x, z)`.
    pub fn surface_height(&self, x: i32, z: i32) -> i32 {
        self.sea_level + self.sampler.sample(x as f64, z as f64).round() as i32
    }

    fn block_at(&self, y: i32, surface: i32) -> BlockId {
        if y <= self.floor_y {
            self.blocks.bedrock
        } else if y < surface - DIRT_DEPTH {
            self.blocks.stone
        } else if y < surface {
            self.blocks.dirt
        } else if y == surface {
            if surface > self.sea_level {
                self.blocks.grass
            } else {
                self.blocks.sand
            }
        } else if y <= self.sea_level {
            self.blocks.water
        } else {
            BlockId::AIR
        }
    }
}

impl TerrainGenerator for HeightmapTerrain {
    fn generate_terrain(&self, origin: ChunkPos) -> Result<ChunkData, GenerationError> {
        let size = CHUNK_SIZE as i32;
        let amplitude = self.sampler.max_amplitude().ceil() as i32;
        let top = origin.y + size - 1;

        // Entirely above the highest possible surface and the sea.
        if origin.y > self.sea_level + amplitude {
            return Ok(ChunkData::new_air());
        }
        // Entirely bedrock.
        if top <= self.floor_y {
            return Ok(ChunkData::new(BlockData::new(self.blocks.bedrock)));
        }

        let mut data = ChunkData::new_air();
        for z in 0..CHUNK_SIZE {
            for x in 0..CHUNK_SIZE {
                let surface = self.surface_height(origin.x + x as i32, origin.z + z as i32);
                for y in 0..CHUNK_SIZE {
                    let id = self.block_at(origin.y + y as i32, surface);
                    if !id.is_air() {
                        data.set(x, y, z, BlockData::new(id));
                    }
                }
            }
        }
        data.compact();
        debug!(
            x = origin.x,
            y = origin.y,
            z = origin.z,
            non_air = data.count_non_air(),
            "generated terrain"
        );
        Ok(data)
    }
}
