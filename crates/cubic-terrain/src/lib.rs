//! Terrain generation: the generator contracts consumed by the chunk loader,
//! a noise heightmap generator, a flat generator and tree placement.

mod generator;
mod heightmap;
mod seed;
mod structures;

pub use generator::{FlatTerrain, GenerationError, HeightmapTerrain, TerrainBlocks, TerrainGenerator};
pub use heightmap::{HeightmapParams, HeightmapSampler};
pub use seed::{chunk_rng, derive_chunk_seed};
pub use structures::{BlockPlacement, NoStructures, StructureGenerator, TreeGenerator};
