//! A 3×3×3 window of chunk grids addressed in one coordinate space.
//!
//! Coordinates are relative to the center chunk's origin, so the center covers
//! `0..16` on every axis and the full window covers `-16..32`. Slots may be
//! empty (unloaded neighbor); reads there return `None` and writes are skipped.

use cubic_voxel::{BlockData, BlockRegistry, CHUNK_SIZE, ChunkData, LightChannel};
use glam::IVec3;

const SIZE: i32 = CHUNK_SIZE as i32;

/// Mutable view over up to 27 chunk grids centred on one chunk.
pub struct ChunkCluster<'a> {
    slots: [Option<&'a mut ChunkData>; 27],
    registry: &'a BlockRegistry,
    /// Bit per chunk offset in the 5×5×5 block around the center whose mesh
    /// saw a light change.
    touched: u128,
}

impl<'a> ChunkCluster<'a> {
    /// An empty cluster. Fill it with [`ChunkCluster::insert`].
    pub fn new(registry: &'a BlockRegistry) -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
            registry,
            touched: 0,
        }
    }

    /// Places a chunk grid at `offset` (chunk units, each component in `-1..=1`).
    pub fn insert(&mut self, offset: IVec3, data: &'a mut ChunkData) {
        debug_assert!(offset.abs().max_element() <= 1, "offset {offset} outside cluster");
        self.slots[slot_index(offset)] = Some(data);
    }

    /// Chunk offset of slot `index`. Inverse of the internal slot layout.
    pub fn slot_offset(index: usize) -> IVec3 {
        let i = index as i32;
        IVec3::new(i % 3 - 1, (i / 3) % 3 - 1, i / 9 - 1)
    }

    /// The block registry used for transparency and emission.
    pub fn registry(&self) -> &'a BlockRegistry {
        self.registry
    }

    /// `true` if the chunk at `offset` is present.
    pub fn is_loaded(&self, offset: IVec3) -> bool {
        offset.abs().max_element() <= 1 && self.slots[slot_index(offset)].is_some()
    }

    /// The center chunk grid.
    pub fn center(&self) -> Option<&ChunkData> {
        self.slots[13].as_deref()
    }

    /// Cell at cluster coordinate `p`, or `None` if outside or unloaded.
    pub fn get(&self, p: IVec3) -> Option<BlockData> {
        let (slot, (x, y, z)) = locate(p)?;
        self.slots[slot].as_deref().map(|c| c.get(x, y, z))
    }

    /// Light level of `channel` at `p`.
    pub fn light(&self, p: IVec3, channel: LightChannel) -> Option<u8> {
        self.get(p).map(|cell| cell.light(channel))
    }

    /// `Some(true)` if light passes through `p`, `None` if `p` is not loaded.
    pub fn is_transparent(&self, p: IVec3) -> Option<bool> {
        self.get(p).map(|cell| self.registry.is_transparent(cell.id()))
    }

    /// Light emitted by the block at `p`; 0 when unloaded.
    pub fn emission(&self, p: IVec3) -> u8 {
        self.get(p).map_or(0, |cell| self.registry.emission(cell.id()))
    }

    /// Writes one light channel. Returns `true` if the stored value changed.
    pub fn set_light(&mut self, p: IVec3, channel: LightChannel, level: u8) -> bool {
        let Some((slot, (x, y, z))) = locate(p) else {
            return false;
        };
        let Some(chunk) = self.slots[slot].as_deref_mut() else {
            return false;
        };
        let changed = chunk.set_light(x, y, z, channel, level.min(BlockData::MAX_LIGHT));
        if changed {
            self.mark_cell(Self::slot_offset(slot), (x, y, z));
        }
        changed
    }

    /// Replaces the whole cell at `p`. Returns the previous value.
    pub fn set(&mut self, p: IVec3, value: BlockData) -> Option<BlockData> {
        let (slot, (x, y, z)) = locate(p)?;
        let chunk = self.slots[slot].as_deref_mut()?;
        let old = chunk.set(x, y, z, value);
        self.mark_cell(Self::slot_offset(slot), (x, y, z));
        Some(old)
    }

    /// Overwrites every cell of the center chunk and marks it and all neighbors.
    pub fn fill_center(&mut self, value: BlockData) {
        if let Some(center) = self.slots[13].as_deref_mut() {
            center.fill(value);
            for dz in -1..=1 {
                for dy in -1..=1 {
                    for dx in -1..=1 {
                        self.mark(IVec3::new(dx, dy, dz));
                    }
                }
            }
        }
    }

    /// Chunk offsets (relative to the center, each component in `-2..=2`)
    /// whose meshes were affected by writes through this cluster.
    pub fn touched(&self) -> impl Iterator<Item = IVec3> + '_ {
        (0..125).filter(|i| self.touched & (1u128 << i) != 0).map(|i| {
            let i = i as i32;
            IVec3::new(i % 5 - 2, (i / 5) % 5 - 2, i / 25 - 2)
        })
    }

    /// Marks the owning chunk plus every chunk sharing a face, edge or corner
    /// with the cell.
    fn mark_cell(&mut self, owner: IVec3, (x, y, z): (usize, usize, usize)) {
        let max = CHUNK_SIZE - 1;
        let spread = |l: usize| -> (i32, i32) {
            match l {
                0 => (-1, 0),
                l if l == max => (0, 1),
                _ => (0, 0),
            }
        };
        let (x0, x1) = spread(x);
        let (y0, y1) = spread(y);
        let (z0, z1) = spread(z);
        for dz in z0..=z1 {
            for dy in y0..=y1 {
                for dx in x0..=x1 {
                    self.mark(owner + IVec3::new(dx, dy, dz));
                }
            }
        }
    }

    fn mark(&mut self, offset: IVec3) {
        let o = offset + IVec3::splat(2);
        let bit = o.x + o.y * 5 + o.z * 25;
        self.touched |= 1u128 << bit;
    }
}

fn slot_index(offset: IVec3) -> usize {
    ((offset.x + 1) + (offset.y + 1) * 3 + (offset.z + 1) * 9) as usize
}

/// Splits a cluster coordinate into slot index and local cell coordinates.
fn locate(p: IVec3) -> Option<(usize, (usize, usize, usize))> {
    let chunk = IVec3::new(p.x.div_euclid(SIZE), p.y.div_euclid(SIZE), p.z.div_euclid(SIZE));
    if chunk.abs().max_element() > 1 {
        return None;
    }
    let local = (
        p.x.rem_euclid(SIZE) as usize,
        p.y.rem_euclid(SIZE) as usize,
        p.z.rem_euclid(SIZE) as usize,
    );
    Some((slot_index(chunk), local))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_offset_roundtrip() {
        for i in 0..27 {
            assert_eq!(slot_index(ChunkCluster::slot_offset(i)), i);
        }
        assert_eq!(ChunkCluster::slot_offset(13), IVec3::ZERO);
    }

    #[test]
    fn test_unloaded_slot_reads_none() {
        let registry = BlockRegistry::new();
        let mut center = ChunkData::new_air();
        let mut cluster = ChunkCluster::new(&registry);
        cluster.insert(IVec3::ZERO, &mut center);
        assert!(cluster.get(IVec3::new(3, 3, 3)).is_some());
        assert!(cluster.get(IVec3::new(-1, 3, 3)).is_none());
        assert!(cluster.get(IVec3::new(40, 0, 0)).is_none());
        assert!(!cluster.set_light(IVec3::new(16, 0, 0), LightChannel::Block, 5));
    }

    #[test]
    fn test_interior_write_touches_only_owner() {
        let registry = BlockRegistry::new();
        let mut center = ChunkData::new_air();
        let mut cluster = ChunkCluster::new(&registry);
        cluster.insert(IVec3::ZERO, &mut center);
        assert!(cluster.set_light(IVec3::new(5, 5, 5), LightChannel::Block, 7));
        assert_eq!(cluster.touched().collect::<Vec<_>>(), vec![IVec3::ZERO]);
    }

    #[test]
    fn test_corner_write_touches_eight_chunks() {
        let registry = BlockRegistry::new();
        let mut center = ChunkData::new_air();
        let mut cluster = ChunkCluster::new(&registry);
        cluster.insert(IVec3::ZERO, &mut center);
        cluster.set_light(IVec3::new(0, 15, 0), LightChannel::Sky, 3);
        let touched: Vec<IVec3> = cluster.touched().collect();
        assert_eq!(touched.len(), 8);
        assert!(touched.contains(&IVec3::new(-1, 1, -1)));
        assert!(touched.contains(&IVec3::new(0, 0, 0)));
        assert!(!touched.contains(&IVec3::new(1, 0, 0)));
    }

    #[test]
    fn test_neighbor_edge_write_reaches_second_ring() {
        let registry = BlockRegistry::new();
        let mut east = ChunkData::new_air();
        let mut cluster = ChunkCluster::new(&registry);
        cluster.insert(IVec3::X, &mut east);
        cluster.set_light(IVec3::new(31, 4, 4), LightChannel::Block, 2);
        let touched: Vec<IVec3> = cluster.touched().collect();
        assert_eq!(touched, vec![IVec3::new(1, 0, 0), IVec3::new(2, 0, 0)]);
    }
}
