//! Block catalog, packed per-cell block data, uniform-or-dense chunk storage and
//! the chunk wire format.

pub mod block;
pub mod chunk;
pub mod chunk_serial;
pub mod pos;
pub mod registry;
pub mod rle;
pub mod visibility;

pub use block::{BlockData, BlockId, LightChannel};
pub use chunk::{CHUNK_SIZE, CHUNK_VOLUME, ChunkData};
pub use chunk_serial::ChunkSerError;
pub use pos::{ChunkPos, FACE_OFFSETS, Face, NEIGHBOR_OFFSETS, local_coords};
pub use registry::{BlockDef, BlockRegistry, RegistryError};
pub use rle::RleError;
pub use visibility::FaceVisibility;
