//! Chunk positions and neighbor offsets.
//!
//! A [`ChunkPos`] is the world-space block coordinate of a chunk's minimum
//! corner, so every component is a multiple of [`CHUNK_SIZE`].

use std::fmt;

use glam::IVec3;
use serde::{Deserialize, Serialize};

use crate::chunk::CHUNK_SIZE;

const SIZE: i32 = CHUNK_SIZE as i32;

/// Chunk-aligned lattice point identifying one chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkPos {
    /// World X of the chunk origin.
    pub x: i32,
    /// World Y of the chunk origin.
    pub y: i32,
    /// World Z of the chunk origin.
    pub z: i32,
}

impl ChunkPos {
    /// Creates a position from chunk-aligned world coordinates.
    ///
    /// Each component must be a multiple of 16.
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        debug_assert!(
            x.rem_euclid(SIZE) == 0 && y.rem_euclid(SIZE) == 0 && z.rem_euclid(SIZE) == 0,
            "chunk position ({x}, {y}, {z}) is not chunk aligned"
        );
        Self { x, y, z }
    }

    /// Creates a position from chunk-grid indices (world coordinate / 16).
    pub fn from_grid(cx: i32, cy: i32, cz: i32) -> Self {
        Self {
            x: cx * SIZE,
            y: cy * SIZE,
            z: cz * SIZE,
        }
    }

    /// The chunk containing the given world block coordinate.
    pub fn containing(block: IVec3) -> Self {
        Self {
            x: block.x.div_euclid(SIZE) * SIZE,
            y: block.y.div_euclid(SIZE) * SIZE,
            z: block.z.div_euclid(SIZE) * SIZE,
        }
    }

    /// Chunk-grid indices of this position.
    pub fn grid(self) -> IVec3 {
        IVec3::new(
            self.x.div_euclid(SIZE),
            self.y.div_euclid(SIZE),
            self.z.div_euclid(SIZE),
        )
    }

    /// World coordinate of the chunk's minimum corner.
    pub fn origin(self) -> IVec3 {
        IVec3::new(self.x, self.y, self.z)
    }

    /// The chunk `offset` chunks away (offset is in chunk units).
    pub fn offset(self, offset: IVec3) -> Self {
        Self {
            x: self.x + offset.x * SIZE,
            y: self.y + offset.y * SIZE,
            z: self.z + offset.z * SIZE,
        }
    }

    /// Offset in chunk units from `self` to `other`.
    pub fn delta(self, other: ChunkPos) -> IVec3 {
        other.grid() - self.grid()
    }

    /// The six face-adjacent chunks.
    pub fn face_neighbors(self) -> impl Iterator<Item = ChunkPos> {
        FACE_OFFSETS.into_iter().map(move |o| self.offset(o))
    }

    /// All 26 surrounding chunks (faces, edges and corners).
    pub fn neighbors(self) -> impl Iterator<Item = ChunkPos> {
        NEIGHBOR_OFFSETS.into_iter().map(move |o| self.offset(o))
    }

    /// `true` if `other` is one of the 26 surrounding chunks.
    pub fn is_neighbor(self, other: ChunkPos) -> bool {
        let d = self.delta(other);
        d != IVec3::ZERO && d.x.abs() <= 1 && d.y.abs() <= 1 && d.z.abs() <= 1
    }
}

impl fmt::Display for ChunkPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Local coordinates of a world block inside its chunk, each in `0..16`.
pub fn local_coords(block: IVec3) -> (usize, usize, usize) {
    (
        block.x.rem_euclid(SIZE) as usize,
        block.y.rem_euclid(SIZE) as usize,
        block.z.rem_euclid(SIZE) as usize,
    )
}

/// The six axis-aligned faces of a chunk or block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Face {
    /// +X
    PosX = 0,
    /// −X
    NegX = 1,
    /// +Y
    PosY = 2,
    /// −Y
    NegY = 3,
    /// +Z
    PosZ = 4,
    /// −Z
    NegZ = 5,
}

impl Face {
    /// All faces in discriminant order.
    pub const ALL: [Face; 6] = [
        Face::PosX,
        Face::NegX,
        Face::PosY,
        Face::NegY,
        Face::PosZ,
        Face::NegZ,
    ];

    /// Returns the opposite face.
    pub fn opposite(self) -> Face {
        match self {
            Face::PosX => Face::NegX,
            Face::NegX => Face::PosX,
            Face::PosY => Face::NegY,
            Face::NegY => Face::PosY,
            Face::PosZ => Face::NegZ,
            Face::NegZ => Face::PosZ,
        }
    }

    /// Unit offset pointing out of this face.
    pub fn offset(self) -> IVec3 {
        FACE_OFFSETS[self as usize]
    }

    /// Index usable for per-face arrays.
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Face offsets, indexed by [`Face`] discriminant.
pub const FACE_OFFSETS: [IVec3; 6] = [
    IVec3::new(1, 0, 0),
    IVec3::new(-1, 0, 0),
    IVec3::new(0, 1, 0),
    IVec3::new(0, -1, 0),
    IVec3::new(0, 0, 1),
    IVec3::new(0, 0, -1),
];

/// The 26 offsets of a 3×3×3 neighborhood, excluding the center.
pub const NEIGHBOR_OFFSETS: [IVec3; 26] = neighbor_offsets();

const fn neighbor_offsets() -> [IVec3; 26] {
    let mut out = [IVec3::ZERO; 26];
    let mut i = 0;
    let mut dz = -1;
    while dz <= 1 {
        let mut dy = -1;
        while dy <= 1 {
            let mut dx = -1;
            while dx <= 1 {
                if !(dx == 0 && dy == 0 && dz == 0) {
                    out[i] = IVec3::new(dx, dy, dz);
                    i += 1;
                }
                dx += 1;
            }
            dy += 1;
        }
        dz += 1;
    }
    out
}
