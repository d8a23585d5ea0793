//! Block storage for one 16×16×16 chunk.
//!
//! A chunk whose cells are all identical is held as a single representative
//! value. The first write of a differing value expands it to a dense array;
//! [`ChunkData::compact`] collapses it back when it becomes uniform again.

use crate::block::{BlockData, BlockId, LightChannel};

/// Side length of a chunk in blocks.
pub const CHUNK_SIZE: usize = 16;

/// Total number of cells in a chunk (16³).
pub const CHUNK_VOLUME: usize = CHUNK_SIZE * CHUNK_SIZE * CHUNK_SIZE;

/// Uniform-or-dense block grid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChunkData {
    /// Every cell holds the same value.
    Uniform(BlockData),
    /// One value per cell, x varying fastest.
    Dense(Box<[BlockData; CHUNK_VOLUME]>),
}

impl ChunkData {
    /// A uniform chunk filled with `fill`.
    pub fn new(fill: BlockData) -> Self {
        ChunkData::Uniform(fill)
    }

    /// A uniform chunk of unlit air.
    pub fn new_air() -> Self {
        ChunkData::Uniform(BlockData::AIR)
    }

    /// Builds a chunk from cells in index order. Collapses to uniform when possible.
    ///
    /// Returns `None` if `cells` does not hold exactly [`CHUNK_VOLUME`] entries.
    pub fn from_cells(cells: &[BlockData]) -> Option<Self> {
        let dense: Box<[BlockData; CHUNK_VOLUME]> = cells.to_vec().into_boxed_slice().try_into().ok()?;
        let mut data = ChunkData::Dense(dense);
        data.compact();
        Some(data)
    }

    /// Returns the cell at `(x, y, z)`. Each coordinate must be in `0..16`.
    pub fn get(&self, x: usize, y: usize, z: usize) -> BlockData {
        match self {
            ChunkData::Uniform(value) => *value,
            ChunkData::Dense(cells) => cells[Self::linear_index(x, y, z)],
        }
    }

    /// Writes the cell at `(x, y, z)` and returns the previous value.
    ///
    /// A uniform chunk expands to dense storage on the first differing write.
    pub fn set(&mut self, x: usize, y: usize, z: usize, value: BlockData) -> BlockData {
        let index = Self::linear_index(x, y, z);
        if let ChunkData::Uniform(current) = self {
            if *current == value {
                return value;
            }
            self.expand();
        }
        match self {
            ChunkData::Dense(cells) => std::mem::replace(&mut cells[index], value),
            ChunkData::Uniform(_) => unreachable!("expanded above"),
        }
    }

    /// Replaces only the block id at `(x, y, z)`, keeping its light.
    pub fn set_block(&mut self, x: usize, y: usize, z: usize, id: BlockId) -> BlockData {
        let current = self.get(x, y, z);
        self.set(x, y, z, current.with_id(id))
    }

    /// Replaces one light channel at `(x, y, z)`. Returns `true` if it changed.
    pub fn set_light(&mut self, x: usize, y: usize, z: usize, channel: LightChannel, level: u8) -> bool {
        let current = self.get(x, y, z);
        if current.light(channel) == level {
            return false;
        }
        self.set(x, y, z, current.with_light(channel, level));
        true
    }

    /// Resets every cell to `value`, releasing dense storage.
    pub fn fill(&mut self, value: BlockData) {
        *self = ChunkData::Uniform(value);
    }

    /// Zeroes both light channels of every cell, keeping block ids.
    pub fn clear_light(&mut self) {
        match self {
            ChunkData::Uniform(value) => *value = value.unlit(),
            ChunkData::Dense(cells) => cells.iter_mut().for_each(|c| *c = c.unlit()),
        }
    }

    /// Converts uniform storage to dense storage in place.
    pub fn expand(&mut self) {
        if let ChunkData::Uniform(value) = *self {
            *self = ChunkData::Dense(Box::new([value; CHUNK_VOLUME]));
        }
    }

    /// Collapses dense storage whose cells are all equal back to uniform.
    ///
    /// Scans every cell; call before serialization, not after every write.
    pub fn compact(&mut self) {
        if let ChunkData::Dense(cells) = self {
            let first = cells[0];
            if cells.iter().all(|&c| c == first) {
                *self = ChunkData::Uniform(first);
            }
        }
    }

    /// `true` when held as a single value.
    pub fn is_uniform(&self) -> bool {
        matches!(self, ChunkData::Uniform(_))
    }

    /// The shared value of a uniform chunk.
    pub fn uniform_value(&self) -> Option<BlockData> {
        match self {
            ChunkData::Uniform(value) => Some(*value),
            ChunkData::Dense(_) => None,
        }
    }

    /// `true` when every cell is air, regardless of light.
    pub fn is_all_air(&self) -> bool {
        match self {
            ChunkData::Uniform(value) => value.is_air(),
            ChunkData::Dense(cells) => cells.iter().all(|c| c.is_air()),
        }
    }

    /// Number of non-air cells.
    pub fn count_non_air(&self) -> usize {
        match self {
            ChunkData::Uniform(value) if value.is_air() => 0,
            ChunkData::Uniform(_) => CHUNK_VOLUME,
            ChunkData::Dense(cells) => cells.iter().filter(|c| !c.is_air()).count(),
        }
    }

    /// Iterates all cells in index order (x fastest, then y, then z).
    pub fn cells(&self) -> impl Iterator<Item = BlockData> + '_ {
        (0..CHUNK_VOLUME).map(move |i| match self {
            ChunkData::Uniform(value) => *value,
            ChunkData::Dense(cells) => cells[i],
        })
    }

    /// Converts `(x, y, z)` to a linear index (x varies fastest).
    pub fn linear_index(x: usize, y: usize, z: usize) -> usize {
        debug_assert!(x < CHUNK_SIZE && y < CHUNK_SIZE && z < CHUNK_SIZE);
        x + y * CHUNK_SIZE + z * CHUNK_SIZE * CHUNK_SIZE
    }

    /// Inverse of [`ChunkData::linear_index`].
    pub fn coords_of(index: usize) -> (usize, usize, usize) {
        (
            index % CHUNK_SIZE,
            (index / CHUNK_SIZE) % CHUNK_SIZE,
            index / (CHUNK_SIZE * CHUNK_SIZE),
        )
    }
}

impl Default for ChunkData {
    fn default() -> Self {
        Self::new_air()
    }
}
