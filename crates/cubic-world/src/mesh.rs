//! Face-list meshes built from a snapshot of a chunk and the boundary layers
//! of its six face neighbors.
//!
//! The snapshot is owned, so building never holds a chunk lock.

use cubic_voxel::{BlockData, BlockId, BlockRegistry, CHUNK_SIZE, ChunkData, Face};

/// One visible block face.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FaceQuad {
    /// Block position inside the chunk.
    pub local: [u8; 3],
    pub face: Face,
    pub block: BlockId,
    /// Block light of the cell the face looks into.
    pub block_light: u8,
    /// Sky light of the cell the face looks into.
    pub sky_light: u8,
}

/// The visible faces of one chunk.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChunkMesh {
    pub quads: Vec<FaceQuad>,
    /// Chunk version the mesh was built from.
    pub version: u64,
}

impl ChunkMesh {
    pub fn is_empty(&self) -> bool {
        self.quads.is_empty()
    }

    /// Number of quads facing `face`.
    pub fn count(&self, face: Face) -> usize {
        self.quads.iter().filter(|q| q.face == face).count()
    }
}

// ---------------------------------------------------------------------------
// Boundary data
// ---------------------------------------------------------------------------

/// The 16×16 layer of a neighbor that touches the center chunk.
#[derive(Clone, Debug)]
pub struct BoundarySlice {
    cells: Vec<BlockData>,
}

impl BoundarySlice {
    /// Copies the layer of `neighbor` adjacent to the center, where `face` is
    /// the center's face pointing at `neighbor`.
    pub fn extract(neighbor: &ChunkData, face: Face) -> Self {
        let layer = match face {
            Face::PosX | Face::PosY | Face::PosZ => 0,
            Face::NegX | Face::NegY | Face::NegZ => CHUNK_SIZE - 1,
        };
        let mut cells = Vec::with_capacity(CHUNK_SIZE * CHUNK_SIZE);
        for v in 0..CHUNK_SIZE {
            for u in 0..CHUNK_SIZE {
                let (x, y, z) = match face {
                    Face::PosX | Face::NegX => (layer, u, v),
                    Face::PosY | Face::NegY => (u, layer, v),
                    Face::PosZ | Face::NegZ => (u, v, layer),
                };
                cells.push(neighbor.get(x, y, z));
            }
        }
        Self { cells }
    }

    /// The neighbor cell across `face` from center cell `(x, y, z)`.
    fn across(&self, face: Face, x: usize, y: usize, z: usize) -> BlockData {
        let (u, v) = match face {
            Face::PosX | Face::NegX => (y, z),
            Face::PosY | Face::NegY => (x, z),
            Face::PosZ | Face::NegZ => (x, y),
        };
        self.cells[v * CHUNK_SIZE + u]
    }
}

/// Owned input for [`build_mesh`].
#[derive(Clone, Debug)]
pub struct MeshInput {
    pub center: ChunkData,
    /// Boundary layers indexed by [`Face::index`]; `None` where the neighbor
    /// is not loaded.
    pub faces: [Option<BoundarySlice>; 6],
    pub version: u64,
}

/// Emits one quad per block face that borders a cell it can be seen from.
///
/// Air exposes a face; a transparent block hides faces only against the same
/// block; an opaque block shows faces toward transparent neighbors. Faces
/// toward unloaded neighbors count as exposed.
pub fn build_mesh(input: &MeshInput, registry: &BlockRegistry) -> ChunkMesh {
    let mut mesh = ChunkMesh {
        quads: Vec::new(),
        version: input.version,
    };
    if input.center.is_all_air() {
        return mesh;
    }

    let last = CHUNK_SIZE as i32 - 1;
    for z in 0..CHUNK_SIZE {
        for y in 0..CHUNK_SIZE {
            for x in 0..CHUNK_SIZE {
                let cell = input.center.get(x, y, z);
                if cell.is_air() {
                    continue;
                }
                let self_transparent = registry.is_transparent(cell.id());

                for face in Face::ALL {
                    let n = glam::IVec3::new(x as i32, y as i32, z as i32) + face.offset();
                    let inside = n.cmpge(glam::IVec3::ZERO).all() && n.cmple(glam::IVec3::splat(last)).all();
                    let neighbor = if inside {
                        Some(input.center.get(n.x as usize, n.y as usize, n.z as usize))
                    } else {
                        input.faces[face.index()]
                            .as_ref()
                            .map(|slice| slice.across(face, x, y, z))
                    };

                    let visible = match neighbor {
                        None => true,
                        Some(other) if other.is_air() => true,
                        Some(other) if self_transparent => other.id() != cell.id(),
                        Some(other) => registry.is_transparent(other.id()),
                    };
                    if !visible {
                        continue;
                    }

                    let lit = neighbor.unwrap_or(BlockData::AIR);
                    mesh.quads.push(FaceQuad {
                        local: [x as u8, y as u8, z as u8],
                        face,
                        block: cell.id(),
                        block_light: lit.block_light(),
                        sky_light: lit.sky_light(),
                    });
                }
            }
        }
    }
    mesh
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(center: ChunkData) -> MeshInput {
        MeshInput {
            center,
            faces: Default::default(),
            version: 7,
        }
    }

    fn id(registry: &BlockRegistry, name: &str) -> BlockData {
        BlockData::new(registry.lookup_by_name(name).unwrap())
    }

    #[test]
    fn test_empty_chunk_has_no_quads() {
        let registry = BlockRegistry::with_defaults();
        let mesh = build_mesh(&input(ChunkData::new_air()), &registry);
        assert!(mesh.is_empty());
        assert_eq!(mesh.version, 7);
    }

    #[test]
    fn test_single_block_has_six_faces() {
        let registry = BlockRegistry::with_defaults();
        let mut center = ChunkData::new(BlockData::AIR.with_sky_light(15));
        center.set(8, 8, 8, id(&registry, "stone"));
        let mesh = build_mesh(&input(center), &registry);
        assert_eq!(mesh.quads.len(), 6);
        for face in Face::ALL {
            assert_eq!(mesh.count(face), 1);
        }
        assert!(mesh.quads.iter().all(|q| q.sky_light == 15));
    }

    #[test]
    fn test_adjacent_opaque_blocks_hide_shared_faces() {
        let registry = BlockRegistry::with_defaults();
        let mut center = ChunkData::new_air();
        center.set(4, 4, 4, id(&registry, "stone"));
        center.set(5, 4, 4, id(&registry, "dirt"));
        let mesh = build_mesh(&input(center), &registry);
        assert_eq!(mesh.quads.len(), 10);
    }

    #[test]
    fn test_same_transparent_blocks_merge() {
        let registry = BlockRegistry::with_defaults();
        let mut center = ChunkData::new_air();
        center.set(4, 4, 4, id(&registry, "glass"));
        center.set(5, 4, 4, id(&registry, "glass"));
        center.set(4, 5, 4, id(&registry, "water"));
        let mesh = build_mesh(&input(center), &registry);
        // glass-glass hidden both ways; glass-water visible both ways.
        assert_eq!(mesh.quads.len(), 6 + 6 + 6 - 2);
    }

    #[test]
    fn test_solid_chunk_hidden_by_opaque_neighbors() {
        let registry = BlockRegistry::with_defaults();
        let stone = ChunkData::new(id(&registry, "stone"));
        let mut faces: [Option<BoundarySlice>; 6] = Default::default();
        for face in Face::ALL {
            faces[face.index()] = Some(BoundarySlice::extract(&stone, face));
        }
        let mesh = build_mesh(
            &MeshInput {
                center: stone.clone(),
                faces,
                version: 0,
            },
            &registry,
        );
        assert!(mesh.is_empty());

        // Without neighbors every boundary face is exposed.
        let open = build_mesh(&input(stone), &registry);
        assert_eq!(open.quads.len(), 6 * CHUNK_SIZE * CHUNK_SIZE);
    }

    #[test]
    fn test_boundary_slice_reads_touching_layer() {
        let registry = BlockRegistry::with_defaults();
        let mut neighbor = ChunkData::new_air();
        // The +X neighbor's x = 0 layer touches the center's x = 15 layer.
        neighbor.set(0, 3, 9, id(&registry, "stone"));
        neighbor.set(15, 3, 9, id(&registry, "dirt"));
        let slice = BoundarySlice::extract(&neighbor, Face::PosX);
        assert_eq!(slice.across(Face::PosX, 15, 3, 9), id(&registry, "stone"));
        assert!(slice.across(Face::PosX, 15, 4, 9).is_air());
    }
}
