//! Per-chunk face visibility summary.
//!
//! A mesher uses this to skip chunks that cannot contribute geometry: an
//! all-air chunk, or a solid chunk whose every neighbor hides it.

use crate::chunk::{CHUNK_SIZE, ChunkData};
use crate::pos::Face;
use crate::registry::BlockRegistry;

/// Which boundary layers of a chunk are fully opaque, plus emptiness.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FaceVisibility {
    /// `opaque[face]` is `true` when every cell of that boundary layer blocks light.
    pub opaque: [bool; 6],
    /// Every cell is air.
    pub empty: bool,
    /// Every cell is opaque.
    pub solid: bool,
}

impl FaceVisibility {
    /// Scans `data` and builds its summary.
    pub fn compute(data: &ChunkData, registry: &BlockRegistry) -> Self {
        if let Some(value) = data.uniform_value() {
            let opaque = registry.is_opaque(value.id());
            return Self {
                opaque: [opaque; 6],
                empty: value.is_air(),
                solid: opaque,
            };
        }

        let mut opaque = [true; 6];
        let mut empty = true;
        let mut solid = true;
        let max = CHUNK_SIZE - 1;

        for z in 0..CHUNK_SIZE {
            for y in 0..CHUNK_SIZE {
                for x in 0..CHUNK_SIZE {
                    let cell = data.get(x, y, z);
                    empty &= cell.is_air();
                    if registry.is_opaque(cell.id()) {
                        continue;
                    }
                    solid = false;
                    let on_face = [x == max, x == 0, y == max, y == 0, z == max, z == 0];
                    for (flag, hit) in opaque.iter_mut().zip(on_face) {
                        if hit {
                            *flag = false;
                        }
                    }
                }
            }
        }

        Self {
            opaque,
            empty,
            solid,
        }
    }

    /// `true` if the given boundary layer is fully opaque.
    pub fn is_opaque(&self, face: Face) -> bool {
        self.opaque[face.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockData;
    use crate::registry::BlockDef;

    fn registry() -> BlockRegistry {
        let mut registry = BlockRegistry::new();
        registry.register(BlockDef::opaque("stone")).unwrap();
        registry.register(BlockDef::transparent("glass", true)).unwrap();
        registry
    }

    #[test]
    fn test_air_chunk_is_empty() {
        let vis = FaceVisibility::compute(&ChunkData::new_air(), &registry());
        assert!(vis.empty);
        assert!(!vis.solid);
        assert_eq!(vis.opaque, [false; 6]);
    }

    #[test]
    fn test_stone_chunk_is_solid() {
        let registry = registry();
        let stone = registry.lookup_by_name("stone").unwrap();
        let vis = FaceVisibility::compute(&ChunkData::new(BlockData::new(stone)), &registry);
        assert!(vis.solid);
        assert!(!vis.empty);
        assert!(Face::ALL.iter().all(|&f| vis.is_opaque(f)));
    }

    #[test]
    fn test_hole_on_top_face_only() {
        let registry = registry();
        let stone = BlockData::new(registry.lookup_by_name("stone").unwrap());
        let mut data = ChunkData::new(stone);
        data.set(8, 15, 8, BlockData::AIR);
        let vis = FaceVisibility::compute(&data, &registry);
        assert!(!vis.solid);
        assert!(!vis.empty);
        assert!(!vis.is_opaque(Face::PosY));
        assert!(vis.is_opaque(Face::NegY));
        assert!(vis.is_opaque(Face::PosX));
    }

    #[test]
    fn test_glass_corner_opens_three_faces() {
        let registry = registry();
        let stone = BlockData::new(registry.lookup_by_name("stone").unwrap());
        let glass = BlockData::new(registry.lookup_by_name("glass").unwrap());
        let mut data = ChunkData::new(stone);
        data.set(0, 0, 0, glass);
        let vis = FaceVisibility::compute(&data, &registry);
        assert_eq!(vis.opaque, [true, false, true, false, true, false]);
    }
}
