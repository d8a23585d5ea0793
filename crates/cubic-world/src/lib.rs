//! Chunk lifecycle management: the chunk state machine, the background
//! loader that drives chunks through it, neighbor-aware eviction, chunk
//! pooling, persistence and meshing glue.

pub mod chunk;
pub mod error;
mod loader;
pub mod manager;
pub mod mesh;
pub mod pin;
pub mod pool;
pub mod state;
pub mod storage;
pub mod strategy;
pub mod streaming;
mod world;

pub use chunk::Chunk;
pub use error::{LoadError, StorageError, WorldError};
pub use manager::{ChunkManager, ManagerConfig};
pub use mesh::{ChunkMesh, FaceQuad};
pub use pin::PinGuard;
pub use pool::ChunkPool;
pub use state::{ChunkState, ParseStateError};
pub use storage::{ChunkStorage, FileStorage, MemoryStorage};
pub use strategy::ChunkStrategy;
pub use streaming::{ViewerTracker, relevant_positions};
pub use world::LoadFailure;
