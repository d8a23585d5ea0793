//! Chunk lifecycle states.
//!
//! States are ordered and interleave stable resting states with transient
//! loading states. The discriminants are distinct bits so a state fits in a
//! `u16` on disk and in an atomic.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Lifecycle state of a chunk.
#[repr(u16)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChunkState {
    /// No data. Stable.
    Empty = 1,
    /// Querying storage.
    StorageLoading = 2,
    /// Storage data read, state not yet committed.
    StorageLoaded = 4,
    /// Running the terrain generator.
    TerrainLoading = 8,
    /// Raw terrain present. Stable.
    TerrainGenerated = 16,
    /// Placing structures.
    BlockLoading = 32,
    /// Terrain plus structures. Stable.
    BlockGenerated = 64,
    /// Running light propagation.
    LightLoading = 128,
    /// Lit. Stable.
    Lighting = 256,
    /// Computing face visibility.
    DrawLoading = 512,
    /// Ready for meshing. Stable.
    Drawable = 1024,
}

/// Error for an unrecognised state name.
#[derive(Debug, Error)]
#[error("unknown chunk state: {0}")]
pub struct ParseStateError(pub String);

impl ChunkState {
    /// Every state in ascending order.
    pub const ALL: [ChunkState; 11] = [
        ChunkState::Empty,
        ChunkState::StorageLoading,
        ChunkState::StorageLoaded,
        ChunkState::TerrainLoading,
        ChunkState::TerrainGenerated,
        ChunkState::BlockLoading,
        ChunkState::BlockGenerated,
        ChunkState::LightLoading,
        ChunkState::Lighting,
        ChunkState::DrawLoading,
        ChunkState::Drawable,
    ];

    /// The state's bit value.
    pub const fn bits(self) -> u16 {
        self as u16
    }

    /// Inverse of [`ChunkState::bits`].
    pub fn from_bits(bits: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.bits() == bits)
    }

    /// `true` for the resting states a chunk may stay in indefinitely.
    pub fn is_stable(self) -> bool {
        matches!(
            self,
            ChunkState::Empty
                | ChunkState::TerrainGenerated
                | ChunkState::BlockGenerated
                | ChunkState::Lighting
                | ChunkState::Drawable
        )
    }

    /// `true` for transient mid-transition states.
    pub fn is_loading(self) -> bool {
        !self.is_stable()
    }

    /// The highest stable state not above `self`.
    ///
    /// For a loading state this is the state the chunk reverts to if the
    /// stage fails.
    pub fn stable_floor(self) -> ChunkState {
        match self {
            ChunkState::Empty
            | ChunkState::StorageLoading
            | ChunkState::StorageLoaded
            | ChunkState::TerrainLoading => ChunkState::Empty,
            ChunkState::TerrainGenerated | ChunkState::BlockLoading => ChunkState::TerrainGenerated,
            ChunkState::BlockGenerated | ChunkState::LightLoading => ChunkState::BlockGenerated,
            ChunkState::Lighting | ChunkState::DrawLoading => ChunkState::Lighting,
            ChunkState::Drawable => ChunkState::Drawable,
        }
    }

    /// The state recorded when saving: lighting and drawability depend on
    /// neighbors, so nothing above `BlockGenerated` is persisted.
    pub fn persisted(self) -> ChunkState {
        self.stable_floor().min(ChunkState::BlockGenerated)
    }
}

impl fmt::Display for ChunkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl FromStr for ChunkState {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|state| format!("{state:?}").eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ParseStateError(s.to_string()))
    }
}
