//! Flood-fill light propagation for block light and sky light.
//!
//! Both channels are 4-bit levels stored in each cell's [`BlockData`]. Light
//! spreads by BFS with -1 decay per face step through transparent cells, and a
//! cell holding level 1 does not spread further. Sky light additionally keeps
//! level 15 while travelling straight down through open air.
//!
//! Propagation works on a [`ChunkCluster`] so light crosses chunk boundaries.
//! Cells in unloaded neighbors are skipped; they are recomputed when that
//! neighbor is lit.

use std::collections::VecDeque;

use cubic_voxel::{BlockData, CHUNK_SIZE, FACE_OFFSETS, LightChannel};
use glam::IVec3;
use tracing::trace;

use crate::cluster::ChunkCluster;

const SIZE: i32 = CHUNK_SIZE as i32;
const MAX: u8 = BlockData::MAX_LIGHT;

/// Counters from one propagation run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LightStats {
    /// Queue entries processed by the BFS passes (additions and removals).
    pub bfs_steps: u64,
    /// Light writes that changed a stored value.
    pub cells_changed: u64,
}

impl std::ops::AddAssign for LightStats {
    fn add_assign(&mut self, rhs: Self) {
        self.bfs_steps += rhs.bfs_steps;
        self.cells_changed += rhs.cells_changed;
    }
}

/// Stateless light solver. Holds only the open-sky threshold.
#[derive(Clone, Copy, Debug)]
pub struct LightPropagator {
    /// World Y at or above which an all-air chunk is lit by sky directly, and
    /// above which a missing upper neighbor counts as open sky.
    pub open_sky_y: i32,
}

impl LightPropagator {
    /// Creates a propagator with the given open-sky threshold.
    pub fn new(open_sky_y: i32) -> Self {
        Self { open_sky_y }
    }

    /// Full rebuild of both channels for the center chunk of `cluster`.
    ///
    /// `origin_y` is the world Y of the center chunk's origin.
    pub fn light_chunk(&self, cluster: &mut ChunkCluster<'_>, origin_y: i32) -> LightStats {
        let mut stats = LightStats::default();
        self.rebuild_sky(cluster, origin_y, &mut stats);
        self.rebuild_block(cluster, &mut stats);
        trace!(
            origin_y,
            bfs_steps = stats.bfs_steps,
            cells_changed = stats.cells_changed,
            "lit chunk"
        );
        stats
    }

    /// Incremental update after the cell at `p` changed from `old` to `new`.
    ///
    /// The new block id must already be stored at `p`; its light nibbles still
    /// hold the values from before the edit.
    pub fn on_block_set(
        &self,
        cluster: &mut ChunkCluster<'_>,
        p: IVec3,
        old: BlockData,
        new: BlockData,
    ) -> LightStats {
        let mut stats = LightStats::default();
        for channel in LightChannel::ALL {
            self.update_channel(cluster, p, old, new, channel, &mut stats);
        }
        stats
    }

    fn update_channel(
        &self,
        cluster: &mut ChunkCluster<'_>,
        p: IVec3,
        old: BlockData,
        new: BlockData,
        channel: LightChannel,
        stats: &mut LightStats,
    ) {
        let registry = cluster.registry();
        let emission = |b: BlockData| match channel {
            LightChannel::Block => registry.emission(b.id()),
            LightChannel::Sky => 0,
        };
        let old_transparent = registry.is_transparent(old.id());
        let new_transparent = registry.is_transparent(new.id());
        let new_emission = emission(new);
        if old_transparent && new_transparent && emission(old) == new_emission {
            return;
        }

        let Some(old_level) = cluster.light(p, channel) else {
            return;
        };
        let mut add: VecDeque<IVec3> = VecDeque::new();

        if old_level > 0 && (!new_transparent || old_level > new_emission) {
            self.remove(cluster, p, old_level, channel, &mut add, stats);
        }

        if new_emission > 1 {
            if cluster.set_light(p, channel, new_emission) {
                stats.cells_changed += 1;
            }
            add.push_back(p);
        }

        if new_transparent {
            for offset in FACE_OFFSETS {
                let n = p + offset;
                if cluster.light(n, channel).is_some_and(|l| l > 0) {
                    add.push_back(n);
                }
            }
        }

        self.drain(cluster, &mut add, channel, stats);
    }

    /// Removal BFS from `p`, which held `level` before the edit.
    ///
    /// Cells whose light came from the removed source are cleared; cells lit
    /// from elsewhere are pushed onto `add` for re-propagation.
    fn remove(
        &self,
        cluster: &mut ChunkCluster<'_>,
        p: IVec3,
        level: u8,
        channel: LightChannel,
        add: &mut VecDeque<IVec3>,
        stats: &mut LightStats,
    ) {
        let mut queue: VecDeque<(IVec3, u8)> = VecDeque::new();
        if cluster.set_light(p, channel, 0) {
            stats.cells_changed += 1;
        }
        queue.push_back((p, level));

        while let Some((q, lvl)) = queue.pop_front() {
            stats.bfs_steps += 1;
            for offset in FACE_OFFSETS {
                let n = q + offset;
                let Some(nl) = cluster.light(n, channel) else {
                    continue;
                };
                if nl == 0 {
                    continue;
                }
                let straight_down =
                    channel == LightChannel::Sky && offset.y == -1 && lvl == MAX && nl == MAX;
                if nl < lvl || straight_down {
                    if cluster.set_light(n, channel, 0) {
                        stats.cells_changed += 1;
                    }
                    queue.push_back((n, nl));
                    if channel == LightChannel::Block {
                        let e = cluster.emission(n);
                        if e > 1 {
                            cluster.set_light(n, channel, e);
                            add.push_back(n);
                        }
                    }
                } else {
                    add.push_back(n);
                }
            }
        }
    }

    /// Addition BFS: spreads each queued cell's current level to its neighbors.
    fn drain(
        &self,
        cluster: &mut ChunkCluster<'_>,
        queue: &mut VecDeque<IVec3>,
        channel: LightChannel,
        stats: &mut LightStats,
    ) {
        while let Some(q) = queue.pop_front() {
            stats.bfs_steps += 1;
            let Some(level) = cluster.light(q, channel) else {
                continue;
            };
            if level <= 1 {
                continue;
            }
            for offset in FACE_OFFSETS {
                let n = q + offset;
                if cluster.is_transparent(n) != Some(true) {
                    continue;
                }
                let next = if channel == LightChannel::Sky && offset.y == -1 && level == MAX {
                    MAX
                } else {
                    level - 1
                };
                if cluster.light(n, channel).is_some_and(|l| l < next) {
                    cluster.set_light(n, channel, next);
                    stats.cells_changed += 1;
                    queue.push_back(n);
                }
            }
        }
    }

    fn rebuild_block(&self, cluster: &mut ChunkCluster<'_>, stats: &mut LightStats) {
        let channel = LightChannel::Block;
        let mut queue = VecDeque::new();
        for p in center_cells() {
            let e = cluster.emission(p);
            let target = if e > 1 { e } else { 0 };
            if cluster.set_light(p, channel, target) {
                stats.cells_changed += 1;
            }
            if target > 0 {
                queue.push_back(p);
            }
        }
        seed_from_faces(cluster, channel, &mut queue);
        self.drain(cluster, &mut queue, channel, stats);
    }

    fn rebuild_sky(&self, cluster: &mut ChunkCluster<'_>, origin_y: i32, stats: &mut LightStats) {
        let channel = LightChannel::Sky;
        let Some(center) = cluster.center() else {
            return;
        };

        if origin_y >= self.open_sky_y && center.is_all_air() && center.is_uniform() {
            let lit = BlockData::AIR.with_sky_light(MAX);
            if center.uniform_value() != Some(lit) {
                cluster.fill_center(lit);
                stats.cells_changed += CHUNK_SIZE.pow(3) as u64;
            }
            return;
        }

        for p in center_cells() {
            if cluster.set_light(p, channel, 0) {
                stats.cells_changed += 1;
            }
        }

        let mut queue = VecDeque::new();
        let above_loaded = cluster.is_loaded(IVec3::Y);
        for z in 0..SIZE {
            for x in 0..SIZE {
                let exposed = if above_loaded {
                    (SIZE..2 * SIZE).all(|y| cluster.is_transparent(IVec3::new(x, y, z)) == Some(true))
                } else {
                    origin_y >= self.open_sky_y
                };
                if !exposed {
                    continue;
                }
                for y in (0..SIZE).rev() {
                    let p = IVec3::new(x, y, z);
                    if cluster.is_transparent(p) != Some(true) {
                        break;
                    }
                    if cluster.set_light(p, channel, MAX) {
                        stats.cells_changed += 1;
                    }
                    queue.push_back(p);
                }
            }
        }

        seed_from_faces(cluster, channel, &mut queue);
        self.drain(cluster, &mut queue, channel, stats);
    }
}

/// Every cell of the center chunk, in cluster coordinates.
fn center_cells() -> impl Iterator<Item = IVec3> {
    (0..SIZE).flat_map(|z| (0..SIZE).flat_map(move |y| (0..SIZE).map(move |x| IVec3::new(x, y, z))))
}

/// Queues lit neighbor cells that touch the center chunk's six faces.
fn seed_from_faces(cluster: &ChunkCluster<'_>, channel: LightChannel, queue: &mut VecDeque<IVec3>) {
    for offset in FACE_OFFSETS {
        if !cluster.is_loaded(offset) {
            continue;
        }
        for a in 0..SIZE {
            for b in 0..SIZE {
                let n = face_cell(offset, a, b);
                if cluster.light(n, channel).is_some_and(|l| l > 1) {
                    queue.push_back(n);
                }
            }
        }
    }
}

/// Cell `(a, b)` of the neighbor layer just outside the center along `offset`.
fn face_cell(offset: IVec3, a: i32, b: i32) -> IVec3 {
    let layer = |d: i32| if d > 0 { SIZE } else { -1 };
    match (offset.x, offset.y, offset.z) {
        (dx, 0, 0) => IVec3::new(layer(dx), a, b),
        (0, dy, 0) => IVec3::new(a, layer(dy), b),
        (0, 0, dz) => IVec3::new(a, b, layer(dz)),
        _ => unreachable!("face offsets are axis aligned"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
