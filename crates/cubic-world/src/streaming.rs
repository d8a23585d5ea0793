//! Keeps the chunks around a moving viewer relevant.
//!
//! The relevant set is a vertical cylinder of chunk positions centered on the
//! viewer's chunk, ordered nearest first so the loader works outward.

use cubic_voxel::ChunkPos;
use glam::{IVec3, Vec3};
use tracing::debug;

use crate::manager::ChunkManager;
use crate::state::ChunkState;

/// Chunk positions within `view` chunks horizontally and `vertical` chunks
/// vertically of `center`, nearest first.
///
/// Ties in distance are broken by position so the order is stable.
pub fn relevant_positions(center: ChunkPos, view: u32, vertical: u32) -> Vec<ChunkPos> {
    let r = view as i32;
    let v = vertical as i32;
    let mut out = Vec::new();
    for dy in -v..=v {
        for dz in -r..=r {
            for dx in -r..=r {
                if dx * dx + dz * dz <= r * r {
                    out.push(IVec3::new(dx, dy, dz));
                }
            }
        }
    }
    let mut positions: Vec<(i32, ChunkPos)> = out
        .into_iter()
        .map(|d| (d.length_squared(), center.offset(d)))
        .collect();
    positions.sort_unstable();
    positions.into_iter().map(|(_, pos)| pos).collect()
}

/// Re-issues the relevant set when the viewer enters a new chunk.
#[derive(Clone, Debug)]
pub struct ViewerTracker {
    last: Option<ChunkPos>,
    view: u32,
    vertical: u32,
    target: ChunkState,
}

impl ViewerTracker {
    pub fn new(view: u32, vertical: u32, target: ChunkState) -> Self {
        Self {
            last: None,
            view,
            vertical,
            target,
        }
    }

    /// The chunk the viewer was last seen in.
    pub fn current(&self) -> Option<ChunkPos> {
        self.last
    }

    /// Requests the relevant set around `viewer` if it moved to another
    /// chunk since the last call. Returns whether a request was issued.
    pub fn update(&mut self, manager: &ChunkManager, viewer: Vec3) -> bool {
        let pos = ChunkPos::containing(viewer.floor().as_ivec3());
        if self.last == Some(pos) {
            return false;
        }
        self.last = Some(pos);
        let positions = relevant_positions(pos, self.view, self.vertical);
        debug!(%pos, count = positions.len(), "viewer entered chunk");
        manager.request_relevant_set(positions, self.target);
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use cubic_terrain::{FlatTerrain, NoStructures};
    use cubic_voxel::BlockRegistry;

    use super::*;
    use crate::manager::ManagerConfig;
    use crate::storage::MemoryStorage;

    #[test]
    fn test_cylinder_shape() {
        let center = ChunkPos::new(0, 0, 0);
        let positions = relevant_positions(center, 2, 1);
        // 13 columns within radius 2, three layers.
        assert_eq!(positions.len(), 13 * 3);
        assert_eq!(positions[0], center);
        assert!(!positions.contains(&ChunkPos::from_grid(2, 0, 2)));
        assert!(positions.contains(&ChunkPos::from_grid(2, 1, 0)));
    }

    #[test]
    fn test_nearest_first() {
        let center = ChunkPos::from_grid(5, -1, 3);
        let positions = relevant_positions(center, 3, 2);
        let dist = |p: &ChunkPos| center.delta(*p).length_squared();
        assert!(positions.windows(2).all(|w| dist(&w[0]) <= dist(&w[1])));
    }

    #[test]
    fn test_zero_radius_is_center() {
        let center = ChunkPos::from_grid(1, 2, 3);
        assert_eq!(relevant_positions(center, 0, 0), vec![center]);
    }

    #[test]
    fn test_tracker_requests_on_chunk_change_only() {
        let registry = Arc::new(BlockRegistry::with_defaults());
        let stone = registry.lookup_by_name("stone").unwrap();
        let manager = ChunkManager::new(
            registry,
            Arc::new(FlatTerrain::new(0, stone)),
            Arc::new(NoStructures),
            Arc::new(MemoryStorage::new()),
            ManagerConfig::default(),
        );
        let mut tracker = ViewerTracker::new(1, 0, ChunkState::TerrainGenerated);

        assert!(tracker.update(&manager, Vec3::new(1.0, 1.0, 1.0)));
        assert!(!tracker.update(&manager, Vec3::new(15.5, 2.0, 3.0)));
        assert!(tracker.update(&manager, Vec3::new(16.0, 2.0, 3.0)));
        assert_eq!(tracker.current(), Some(ChunkPos::new(16, 0, 0)));

        assert!(manager.wait_idle(Duration::from_secs(30)));
        assert_eq!(manager.state(ChunkPos::new(16, 0, 0)), ChunkState::TerrainGenerated);
        assert_eq!(manager.state(ChunkPos::new(32, 0, 0)), ChunkState::TerrainGenerated);
    }
}
