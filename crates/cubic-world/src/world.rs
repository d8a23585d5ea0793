//! State shared by the manager handle and the loader thread.
//!
//! Lock order: the chunk map lock is never held while waiting on a block
//! lock, and block locks of several chunks are always taken in ascending
//! position order.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;

use cubic_lighting::{ChunkCluster, LightPropagator};
use cubic_terrain::{StructureGenerator, TerrainGenerator};
use cubic_voxel::{BlockId, BlockRegistry, ChunkData, ChunkPos, Face};
use glam::IVec3;
use parking_lot::{Mutex, RwLockWriteGuard};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, warn};

use crate::chunk::Chunk;
use crate::error::{LoadError, StorageError, WorldError};
use crate::mesh::{BoundarySlice, MeshInput, build_mesh};
use crate::pin::PinGuard;
use crate::pool::ChunkPool;
use crate::state::ChunkState;
use crate::storage::ChunkStorage;
use crate::strategy::chunk_demand;

/// Upper bound on eviction passes per loader cycle.
const MAX_EVICTION_PASSES: usize = 16;

/// A stage failure kept for inspection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadFailure {
    pub pos: ChunkPos,
    /// Loading state of the stage that failed.
    pub stage: ChunkState,
    pub message: String,
}

pub(crate) struct World {
    chunks: Mutex<FxHashMap<ChunkPos, Arc<Chunk>>>,
    pub(crate) pool: ChunkPool,
    pub(crate) registry: Arc<BlockRegistry>,
    pub(crate) terrain: Arc<dyn TerrainGenerator>,
    pub(crate) structures: Arc<dyn StructureGenerator>,
    pub(crate) storage: Arc<dyn ChunkStorage>,
    pub(crate) propagator: LightPropagator,
    /// Chunks whose mesh must be (re)built by `update`.
    to_update: Mutex<FxHashSet<ChunkPos>>,
    failures: Mutex<VecDeque<LoadFailure>>,
    max_failures: usize,
    /// Loader tasks submitted but not yet fully processed.
    pub(crate) pending: AtomicUsize,
}

impl World {
    pub(crate) fn new(
        registry: Arc<BlockRegistry>,
        terrain: Arc<dyn TerrainGenerator>,
        structures: Arc<dyn StructureGenerator>,
        storage: Arc<dyn ChunkStorage>,
        propagator: LightPropagator,
        max_pooled: usize,
        max_failures: usize,
    ) -> Self {
        Self {
            chunks: Mutex::new(FxHashMap::default()),
            pool: ChunkPool::new(max_pooled),
            registry,
            terrain,
            structures,
            storage,
            propagator,
            to_update: Mutex::new(FxHashSet::default()),
            failures: Mutex::new(VecDeque::new()),
            max_failures,
            pending: AtomicUsize::new(0),
        }
    }

    // -----------------------------------------------------------------------
    // Lookup and pinning
    // -----------------------------------------------------------------------

    pub(crate) fn chunk(&self, pos: ChunkPos) -> Option<Arc<Chunk>> {
        self.chunks.lock().get(&pos).cloned()
    }

    pub(crate) fn get_or_create(&self, pos: ChunkPos) -> Arc<Chunk> {
        let mut chunks = self.chunks.lock();
        Arc::clone(chunks.entry(pos).or_insert_with(|| self.pool.acquire(pos)))
    }

    /// Pins the chunk at `pos` if it is loaded.
    ///
    /// The pin is taken outside the map lock and confirmed afterwards, so a
    /// concurrent eviction either sees the pin or wins and the pin is undone.
    pub(crate) fn pin(&self, pos: ChunkPos) -> Option<PinGuard> {
        let chunk = self.chunk(pos)?;
        let guard = PinGuard::new(chunk);
        self.is_current(pos, guard.chunk()).then_some(guard)
    }

    /// Pins the chunk at `pos`, creating an `Empty` one if needed.
    pub(crate) fn pin_or_create(&self, pos: ChunkPos) -> PinGuard {
        loop {
            let guard = PinGuard::new(self.get_or_create(pos));
            if self.is_current(pos, guard.chunk()) {
                return guard;
            }
        }
    }

    fn is_current(&self, pos: ChunkPos, chunk: &Arc<Chunk>) -> bool {
        self.chunks
            .lock()
            .get(&pos)
            .is_some_and(|c| Arc::ptr_eq(c, chunk))
    }

    pub(crate) fn loaded_positions(&self) -> Vec<ChunkPos> {
        let mut positions: Vec<ChunkPos> = self.chunks.lock().keys().copied().collect();
        positions.sort();
        positions
    }

    pub(crate) fn loaded_count(&self) -> usize {
        self.chunks.lock().len()
    }

    // -----------------------------------------------------------------------
    // Demand and eviction
    // -----------------------------------------------------------------------

    /// Highest state any loaded neighbor requires of the chunk at `pos`.
    pub(crate) fn neighbor_demand(&self, pos: ChunkPos) -> ChunkState {
        demand_locked(&self.chunks.lock(), pos)
    }

    /// Saves if dirty, then removes the chunk and returns it to the pool.
    ///
    /// Refused while the chunk is pinned, mid-stage, or required by a
    /// neighbor.
    pub(crate) fn try_unload(&self, pos: ChunkPos) -> bool {
        let Some(chunk) = self.chunk(pos) else {
            return false;
        };
        if chunk.pin_count() > 0 || chunk.state().is_loading() {
            return false;
        }
        if self.neighbor_demand(pos) > ChunkState::Empty {
            return false;
        }
        if chunk.is_dirty()
            && chunk.state() >= ChunkState::TerrainGenerated
            && let Err(e) = self.save(&chunk)
        {
            warn!(%pos, error = %e, "failed to save chunk before eviction");
            return false;
        }

        {
            let mut chunks = self.chunks.lock();
            if !chunks.get(&pos).is_some_and(|c| Arc::ptr_eq(c, &chunk)) {
                return false;
            }
            if chunk.pin_count() > 0
                || chunk.is_dirty()
                || chunk.state().is_loading()
                || demand_locked(&chunks, pos) > ChunkState::Empty
            {
                return false;
            }
            chunks.remove(&pos);
        }

        self.to_update.lock().remove(&pos);
        chunk.clear_render();
        chunk.clear_neighbors();
        debug!(%pos, state = %chunk.state(), "evicted chunk");
        self.pool.release(chunk);
        true
    }

    /// Drops a lit chunk back to `BlockGenerated`, releasing render data and
    /// neighbor links.
    pub(crate) fn downgrade(&self, chunk: &Chunk) {
        let pos = chunk.position();
        chunk.set_state(ChunkState::BlockGenerated);
        chunk.clear_render();
        chunk.clear_neighbors();
        self.to_update.lock().remove(&pos);
        debug!(%pos, "downgraded chunk to BlockGenerated");
    }

    /// Downgrades or evicts every unpinned chunk holding more than is
    /// required of it, repeating until nothing changes.
    pub(crate) fn evict_unwanted(&self) -> usize {
        let mut total = 0;
        for _ in 0..MAX_EVICTION_PASSES {
            let mut changed = 0;
            for pos in self.loaded_positions() {
                let decision = {
                    let Some(chunk) = self.chunk(pos) else {
                        continue;
                    };
                    let state = chunk.state();
                    if chunk.pin_count() > 0 || state.is_loading() {
                        continue;
                    }
                    let required = chunk.wanted().max(self.neighbor_demand(pos));
                    if required == ChunkState::Empty {
                        Eviction::Unload
                    } else if state >= ChunkState::Lighting && required <= ChunkState::BlockGenerated {
                        self.downgrade(&chunk);
                        Eviction::Downgraded
                    } else {
                        Eviction::Keep
                    }
                };
                match decision {
                    Eviction::Unload if self.try_unload(pos) => changed += 1,
                    Eviction::Downgraded => changed += 1,
                    _ => {}
                }
            }
            total += changed;
            if changed == 0 {
                break;
            }
        }
        total
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    pub(crate) fn save(&self, chunk: &Chunk) -> Result<(), StorageError> {
        let version = chunk.version();
        self.storage.save_chunk(chunk)?;
        chunk.mark_saved(version);
        Ok(())
    }

    /// Saves every dirty chunk with generated data.
    ///
    /// Keeps going past failures and returns the first one.
    pub(crate) fn flush(&self) -> Result<usize, StorageError> {
        let mut saved = 0;
        let mut first_error = None;
        for pos in self.loaded_positions() {
            let Some(chunk) = self.chunk(pos) else {
                continue;
            };
            if !chunk.is_dirty() || chunk.state().stable_floor() < ChunkState::TerrainGenerated {
                continue;
            }
            match self.save(&chunk) {
                Ok(()) => saved += 1,
                Err(e) => {
                    warn!(%pos, error = %e, "failed to save chunk");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(saved),
        }
    }

    // -----------------------------------------------------------------------
    // Clusters and edits
    // -----------------------------------------------------------------------

    /// Locks `center` and, when `neighbor_min` is set, every loaded neighbor
    /// at or above that state, then runs `f` on the resulting cluster.
    ///
    /// Drawable chunks whose cells changed are queued for remeshing.
    pub(crate) fn with_cluster<R>(
        &self,
        center: &Arc<Chunk>,
        neighbor_min: Option<ChunkState>,
        f: impl FnOnce(&mut ChunkCluster<'_>) -> R,
    ) -> R {
        let center_pos = center.position();
        let mut pins = Vec::with_capacity(27);
        pins.push(PinGuard::new(Arc::clone(center)));
        if let Some(min) = neighbor_min {
            for npos in center_pos.neighbors() {
                if let Some(pin) = self.pin(npos)
                    && pin.state().stable_floor() >= min
                {
                    pins.push(pin);
                }
            }
        }
        pins.sort_by_key(|pin| pin.position());

        let mut locked: Vec<(IVec3, RwLockWriteGuard<'_, ChunkData>)> = pins
            .iter()
            .map(|pin| (center_pos.delta(pin.position()), pin.blocks_mut()))
            .collect();
        let (result, touched) = {
            let mut cluster = ChunkCluster::new(self.registry.as_ref());
            for (offset, data) in locked.iter_mut() {
                cluster.insert(*offset, &mut **data);
            }
            let result = f(&mut cluster);
            let touched: Vec<IVec3> = cluster.touched().collect();
            (result, touched)
        };
        drop(locked);

        for offset in touched {
            if let Some(chunk) = self.chunk(center_pos.offset(offset))
                && chunk.state() == ChunkState::Drawable
            {
                self.request_remesh(&chunk);
            }
        }
        result
    }

    /// Writes `block` at world coordinate `at`, keeping light consistent in
    /// the owning chunk and its loaded neighbors.
    ///
    /// With `only_air`, non-air cells are left alone. Returns whether a cell
    /// changed. Callers check readiness; this only requires the chunk to be
    /// loaded.
    pub(crate) fn edit_block(&self, at: IVec3, block: BlockId, only_air: bool) -> Result<bool, WorldError> {
        let pos = ChunkPos::containing(at);
        let center = self.pin(pos).ok_or(WorldError::ChunkNotReady {
            pos,
            state: ChunkState::Empty,
        })?;
        // A downgraded chunk keeps its light, and lit neighbors hold light
        // that came from it.
        let lit = center.state().stable_floor() >= ChunkState::BlockGenerated
            || pos.neighbors().any(|npos| {
                self.chunk(npos)
                    .is_some_and(|n| n.state().stable_floor() >= ChunkState::Lighting)
            });
        let local = at - pos.origin();

        let changed = self.with_cluster(
            center.chunk(),
            lit.then_some(ChunkState::BlockGenerated),
            |cluster| {
                let Some(old) = cluster.get(local) else {
                    return false;
                };
                if old.id() == block || (only_air && !old.is_air()) {
                    return false;
                }
                let new = old.with_id(block);
                cluster.set(local, new);
                if lit {
                    self.propagator.on_block_set(cluster, local, old, new);
                }
                true
            },
        );
        if changed {
            center.mark_dirty();
        }
        Ok(changed)
    }

    // -----------------------------------------------------------------------
    // Meshing
    // -----------------------------------------------------------------------

    pub(crate) fn request_remesh(&self, chunk: &Chunk) {
        chunk.mark_mesh_dirty();
        self.to_update.lock().insert(chunk.position());
    }

    pub(crate) fn add_to_update(&self, pos: ChunkPos) {
        if let Some(chunk) = self.chunk(pos) {
            self.request_remesh(&chunk);
        }
    }

    pub(crate) fn remove_from_update(&self, pos: ChunkPos) {
        self.to_update.lock().remove(&pos);
    }

    pub(crate) fn update_queue(&self) -> Vec<ChunkPos> {
        let mut queue: Vec<ChunkPos> = self.to_update.lock().iter().copied().collect();
        queue.sort();
        queue
    }

    /// Rebuilds the mesh of a queued chunk if it is dirty. Returns whether a
    /// mesh was built.
    pub(crate) fn update_chunk(&self, pos: ChunkPos) -> bool {
        let Some(chunk) = self.pin(pos) else {
            self.remove_from_update(pos);
            return false;
        };
        if chunk.state() != ChunkState::Drawable {
            self.remove_from_update(pos);
            return false;
        }

        let rebuilt = chunk.take_mesh_dirty();
        if rebuilt {
            let input = self.mesh_input(&chunk);
            let mesh = build_mesh(&input, &self.registry);
            if chunk.state() == ChunkState::Drawable {
                debug!(%pos, quads = mesh.quads.len(), version = mesh.version, "built chunk mesh");
                chunk.set_mesh(Some(Arc::new(mesh)));
            }
        }

        let mut queue = self.to_update.lock();
        if !chunk.is_mesh_dirty() {
            queue.remove(&pos);
        }
        rebuilt
    }

    fn mesh_input(&self, chunk: &Chunk) -> MeshInput {
        let version = chunk.version();
        let center = chunk.blocks().clone();
        let faces = Face::ALL.map(|face| {
            let neighbor = self.chunk(chunk.neighbor(face.offset())?)?;
            if neighbor.state().stable_floor() < ChunkState::BlockGenerated {
                return None;
            }
            let data = neighbor.blocks();
            Some(BoundarySlice::extract(&data, face))
        });
        MeshInput {
            center,
            faces,
            version,
        }
    }

    // -----------------------------------------------------------------------
    // Failures
    // -----------------------------------------------------------------------

    pub(crate) fn record_failure(&self, pos: ChunkPos, stage: ChunkState, error: &LoadError) {
        warn!(%pos, %stage, error = %error, "chunk stage failed");
        let mut failures = self.failures.lock();
        if failures.len() >= self.max_failures {
            failures.pop_front();
        }
        failures.push_back(LoadFailure {
            pos,
            stage,
            message: error.to_string(),
        });
    }

    pub(crate) fn recent_failures(&self) -> Vec<LoadFailure> {
        self.failures.lock().iter().cloned().collect()
    }
}

enum Eviction {
    Keep,
    Unload,
    Downgraded,
}

fn demand_locked(chunks: &FxHashMap<ChunkPos, Arc<Chunk>>, pos: ChunkPos) -> ChunkState {
    pos.neighbors()
        .filter_map(|npos| chunks.get(&npos))
        .map(|c| chunk_demand(c.state(), c.wanted()))
        .max()
        .unwrap_or(ChunkState::Empty)
}

#[cfg(test)]
mod tests {
    use cubic_terrain::{FlatTerrain, NoStructures};
    use cubic_voxel::BlockData;

    use super::*;
    use crate::storage::MemoryStorage;

    fn world() -> World {
        let registry = Arc::new(BlockRegistry::with_defaults());
        let stone = registry.lookup_by_name("stone").unwrap();
        World::new(
            registry,
            Arc::new(FlatTerrain::new(0, stone)),
            Arc::new(NoStructures),
            Arc::new(MemoryStorage::new()),
            LightPropagator::new(0),
            8,
            4,
        )
    }

    fn generated(world: &World, pos: ChunkPos, state: ChunkState) -> Arc<Chunk> {
        let chunk = world.get_or_create(pos);
        chunk.replace_blocks(world.terrain.generate_terrain(pos).unwrap());
        chunk.set_state(state);
        chunk
    }

    #[test]
    fn test_pin_missing_chunk() {
        let world = world();
        assert!(world.pin(ChunkPos::new(0, 0, 0)).is_none());
        let guard = world.pin_or_create(ChunkPos::new(0, 0, 0));
        assert_eq!(guard.pin_count(), 1);
        assert_eq!(world.loaded_count(), 1);
    }

    #[test]
    fn test_pinned_chunk_is_not_unloaded() {
        let world = world();
        let guard = world.pin_or_create(ChunkPos::new(0, 0, 0));
        assert!(!world.try_unload(ChunkPos::new(0, 0, 0)));
        drop(guard);
        assert!(world.try_unload(ChunkPos::new(0, 0, 0)));
        assert_eq!(world.pool.len(), 1);
    }

    #[test]
    fn test_lit_neighbor_blocks_unload() {
        let world = world();
        let center = ChunkPos::new(0, 0, 0);
        let neighbor = ChunkPos::new(16, 16, 0);
        generated(&world, center, ChunkState::Drawable);
        generated(&world, neighbor, ChunkState::BlockGenerated);
        assert_eq!(world.neighbor_demand(neighbor), ChunkState::BlockGenerated);
        assert!(!world.try_unload(neighbor));
    }

    #[test]
    fn test_dirty_chunk_saved_on_unload() {
        let world = world();
        let pos = ChunkPos::new(0, -16, 0);
        let chunk = generated(&world, pos, ChunkState::BlockGenerated);
        chunk.mark_dirty();
        drop(chunk);
        assert!(world.try_unload(pos));
        assert_eq!(
            world.storage.state_in_storage(pos).unwrap(),
            ChunkState::BlockGenerated
        );
    }

    #[test]
    fn test_eviction_downgrades_then_unloads() {
        let world = world();
        let a = ChunkPos::new(0, 0, 0);
        let b = ChunkPos::new(16, 0, 0);
        generated(&world, a, ChunkState::Drawable);
        generated(&world, b, ChunkState::Drawable).set_wanted(ChunkState::Drawable);

        world.evict_unwanted();

        // `a` is not wanted but `b` still needs it at BlockGenerated.
        assert_eq!(world.chunk(a).unwrap().state(), ChunkState::BlockGenerated);
        assert_eq!(world.chunk(b).unwrap().state(), ChunkState::Drawable);

        world.chunk(b).unwrap().set_wanted(ChunkState::Empty);
        world.evict_unwanted();
        assert_eq!(world.loaded_count(), 0);
    }

    #[test]
    fn test_edit_unlit_chunk_marks_dirty() {
        let world = world();
        let pos = ChunkPos::new(0, 0, 0);
        let chunk = generated(&world, pos, ChunkState::BlockGenerated);
        let glass = world.registry.lookup_by_name("glass").unwrap();

        assert!(world.edit_block(IVec3::new(3, 4, 5), glass, false).unwrap());
        assert!(chunk.is_dirty());
        assert_eq!(chunk.blocks().get(3, 4, 5).id(), glass);
        assert!(!world.edit_block(IVec3::new(3, 4, 5), BlockId::AIR, true).unwrap());
    }

    #[test]
    fn test_edit_lit_chunk_updates_light() {
        let world = world();
        let pos = ChunkPos::new(0, 0, 0);
        let chunk = generated(&world, pos, ChunkState::BlockGenerated);
        world.with_cluster(&chunk, None, |cluster| world.propagator.light_chunk(cluster, pos.y));
        chunk.set_state(ChunkState::Lighting);

        let glowstone = world.registry.lookup_by_name("glowstone").unwrap();
        world.edit_block(IVec3::new(8, 8, 8), glowstone, false).unwrap();
        let blocks = chunk.blocks();
        assert_eq!(blocks.get(8, 8, 9).block_light(), 14);
        assert_eq!(blocks.get(8, 8, 12).block_light(), 11);
        assert_eq!(blocks.get(0, 15, 0).sky_light(), BlockData::MAX_LIGHT);
    }

    #[test]
    fn test_edit_downgraded_chunk_clears_light_in_lit_neighbor() {
        let world = world();
        let a = ChunkPos::new(0, 0, 0);
        let b = ChunkPos::new(16, 0, 0);
        let chunk_a = generated(&world, a, ChunkState::BlockGenerated);
        let chunk_b = generated(&world, b, ChunkState::BlockGenerated);
        let torch = world.registry.lookup_by_name("torch").unwrap();
        chunk_a.blocks_mut().set(15, 8, 8, BlockData::new(torch));
        for chunk in [&chunk_a, &chunk_b] {
            world.with_cluster(chunk, Some(ChunkState::BlockGenerated), |cluster| {
                world.propagator.light_chunk(cluster, chunk.position().y)
            });
            chunk.set_state(ChunkState::Lighting);
        }
        assert_eq!(chunk_b.blocks().get(0, 8, 8).block_light(), 13);

        world.downgrade(&chunk_a);
        assert!(world.edit_block(IVec3::new(15, 8, 8), BlockId::AIR, false).unwrap());
        assert_eq!(chunk_a.blocks().get(15, 8, 8).block_light(), 0);
        assert_eq!(chunk_a.blocks().get(12, 8, 8).block_light(), 0);
        assert_eq!(chunk_b.blocks().get(0, 8, 8).block_light(), 0);
        assert_eq!(chunk_b.blocks().get(3, 8, 8).block_light(), 0);
    }

    #[test]
    fn test_edit_drawable_chunk_queues_remesh() {
        let world = world();
        let pos = ChunkPos::new(0, 0, 0);
        let chunk = generated(&world, pos, ChunkState::Drawable);
        let stone = world.registry.lookup_by_name("stone").unwrap();
        world.edit_block(IVec3::new(1, 1, 1), stone, false).unwrap();
        assert!(chunk.is_mesh_dirty());
        assert_eq!(world.update_queue(), vec![pos]);

        assert!(world.update_chunk(pos));
        assert_eq!(chunk.mesh().unwrap().quads.len(), 6);
        assert!(world.update_queue().is_empty());
    }

    #[test]
    fn test_failure_log_is_bounded() {
        let world = world();
        for i in 0..6 {
            world.record_failure(
                ChunkPos::new(i * 16, 0, 0),
                ChunkState::TerrainLoading,
                &LoadError::Invariant("test".into()),
            );
        }
        let failures = world.recent_failures();
        assert_eq!(failures.len(), 4);
        assert_eq!(failures[0].pos, ChunkPos::new(32, 0, 0));
    }
}
