//! The public chunk manager.
//!
//! The manager owns the chunk map and a single background loader thread.
//! Requests from the main thread are queued to the loader; reads, pins and
//! block edits happen directly on the calling thread.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Sender, unbounded};
use cubic_config::Config;
use cubic_lighting::LightPropagator;
use cubic_terrain::{StructureGenerator, TerrainGenerator};
use cubic_voxel::{BlockData, BlockId, BlockRegistry, ChunkPos, local_coords};
use glam::IVec3;
use tracing::{debug, error, info, warn};

use crate::chunk::Chunk;
use crate::error::{StorageError, WorldError};
use crate::loader::{LoaderTask, spawn_loader};
use crate::pin::PinGuard;
use crate::state::ChunkState;
use crate::storage::ChunkStorage;
use crate::world::{LoadFailure, World};

/// Tuning for a [`ChunkManager`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManagerConfig {
    /// World Y at or above which open air receives full sky light.
    pub open_sky_y: i32,
    /// Evicted chunks kept for reuse.
    pub max_pooled_chunks: usize,
    /// Stage failures retained for [`ChunkManager::recent_failures`].
    pub max_recorded_failures: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            open_sky_y: 64,
            max_pooled_chunks: 1024,
            max_recorded_failures: 64,
        }
    }
}

impl From<&Config> for ManagerConfig {
    fn from(config: &Config) -> Self {
        Self {
            open_sky_y: config.world.open_sky_y,
            max_pooled_chunks: config.pool.max_pooled_chunks,
            ..Self::default()
        }
    }
}

/// Owns every loaded chunk and drives them through their lifecycle.
pub struct ChunkManager {
    world: Arc<World>,
    tasks: Sender<LoaderTask>,
    loader: Option<JoinHandle<()>>,
}

impl ChunkManager {
    /// Creates the manager and starts the `chunk-loader` thread.
    pub fn new(
        registry: Arc<BlockRegistry>,
        terrain: Arc<dyn TerrainGenerator>,
        structures: Arc<dyn StructureGenerator>,
        storage: Arc<dyn ChunkStorage>,
        config: ManagerConfig,
    ) -> Self {
        let world = Arc::new(World::new(
            registry,
            terrain,
            structures,
            storage,
            LightPropagator::new(config.open_sky_y),
            config.max_pooled_chunks,
            config.max_recorded_failures,
        ));
        let (tasks, receiver) = unbounded();
        let loader = spawn_loader(Arc::clone(&world), receiver);
        info!(open_sky_y = config.open_sky_y, max_pooled = config.max_pooled_chunks, "chunk manager started");
        Self {
            world,
            tasks,
            loader: Some(loader),
        }
    }

    pub fn registry(&self) -> &BlockRegistry {
        &self.world.registry
    }

    // -----------------------------------------------------------------------
    // Chunk access
    // -----------------------------------------------------------------------

    /// The chunk at `pos`, creating an `Empty` one if none is loaded.
    ///
    /// An unwanted `Empty` chunk is evicted on the loader's next pass.
    pub fn get_chunk(&self, pos: ChunkPos) -> Arc<Chunk> {
        self.world.get_or_create(pos)
    }

    /// The chunk at `pos` if loaded.
    pub fn chunk(&self, pos: ChunkPos) -> Option<Arc<Chunk>> {
        self.world.chunk(pos)
    }

    /// Current state of the chunk at `pos`; `Empty` when not loaded.
    pub fn state(&self, pos: ChunkPos) -> ChunkState {
        self.world
            .chunk(pos)
            .map_or(ChunkState::Empty, |chunk| chunk.state())
    }

    /// Prevents the chunk at `pos` from being evicted while the guard lives.
    pub fn pin(&self, pos: ChunkPos) -> Option<PinGuard> {
        self.world.pin(pos)
    }

    pub fn loaded_count(&self) -> usize {
        self.world.loaded_count()
    }

    /// Loaded positions in ascending order.
    pub fn loaded_positions(&self) -> Vec<ChunkPos> {
        self.world.loaded_positions()
    }

    pub fn pooled_count(&self) -> usize {
        self.world.pool.len()
    }

    // -----------------------------------------------------------------------
    // Lifecycle requests
    // -----------------------------------------------------------------------

    /// Queues `target` as the chunk's wanted state and the work to reach it.
    ///
    /// The wanted state is recorded by the loader, in order with relevant set
    /// requests. A lower target leaves the data alone; it only lets the chunk
    /// be downgraded later.
    pub fn request_chunk_state(&self, pos: ChunkPos, target: ChunkState) {
        self.send(LoaderTask::Advance {
            pos,
            target: stable_target(target),
        });
    }

    /// Makes `positions` the relevant set: each is advanced to `target`, and
    /// chunks outside the set that no neighbor requires are downgraded or
    /// evicted.
    ///
    /// Positions are processed in the order given.
    pub fn request_relevant_set(&self, positions: impl IntoIterator<Item = ChunkPos>, target: ChunkState) {
        let positions: Vec<ChunkPos> = positions.into_iter().collect();
        debug!(count = positions.len(), %target, "relevant set requested");
        self.send(LoaderTask::Relevant {
            positions,
            target: stable_target(target),
        });
    }

    /// Evicts the chunk at `pos` now if it is unpinned and no neighbor needs
    /// it, saving it first when dirty.
    pub fn try_unload(&self, pos: ChunkPos) -> bool {
        self.world.try_unload(pos)
    }

    fn send(&self, task: LoaderTask) {
        self.world.pending.fetch_add(1, Ordering::SeqCst);
        if self.tasks.send(task).is_err() {
            self.world.pending.fetch_sub(1, Ordering::SeqCst);
            warn!("chunk loader is not running; request dropped");
        }
    }

    /// `true` when every queued request has been processed.
    pub fn is_idle(&self) -> bool {
        self.world.pending.load(Ordering::SeqCst) == 0
    }

    /// Blocks until the loader is idle or `timeout` passes. Returns whether
    /// it became idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.is_idle() {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        true
    }

    /// The most recent stage failures, oldest first.
    pub fn recent_failures(&self) -> Vec<LoadFailure> {
        self.world.recent_failures()
    }

    // -----------------------------------------------------------------------
    // Blocks
    // -----------------------------------------------------------------------

    /// The block at world coordinate `at`, if its chunk has generated blocks.
    pub fn block_at(&self, at: IVec3) -> Option<BlockData> {
        let chunk = self.world.chunk(ChunkPos::containing(at))?;
        if chunk.state().stable_floor() < ChunkState::BlockGenerated {
            return None;
        }
        let (x, y, z) = local_coords(at);
        Some(chunk.blocks().get(x, y, z))
    }

    /// Places `block` at world coordinate `at`.
    ///
    /// The chunk must be at a stable state of at least `BlockGenerated`.
    /// Light updates incrementally across chunk borders, and affected
    /// drawable chunks are queued for remeshing.
    pub fn set_block(&self, at: IVec3, block: BlockId) -> Result<(), WorldError> {
        let pos = ChunkPos::containing(at);
        let state = self.state(pos);
        if state.is_loading() || state < ChunkState::BlockGenerated {
            return Err(WorldError::ChunkNotReady { pos, state });
        }
        if self.world.registry.lookup(block).is_none() {
            return Err(WorldError::UnknownBlock(format!("id {}", block.0)));
        }
        self.world.edit_block(at, block, false)?;
        Ok(())
    }

    /// [`ChunkManager::set_block`] by block name.
    pub fn set_block_by_name(&self, at: IVec3, name: &str) -> Result<(), WorldError> {
        let block = self
            .world
            .registry
            .lookup_by_name(name)
            .ok_or_else(|| WorldError::UnknownBlock(name.to_string()))?;
        self.set_block(at, block)
    }

    // -----------------------------------------------------------------------
    // Per-frame update
    // -----------------------------------------------------------------------

    /// Rebuilds the meshes of queued drawable chunks. Returns how many were
    /// built.
    ///
    /// A panic while meshing one chunk is logged and the rest continue.
    pub fn update(&self) -> usize {
        let mut built = 0;
        for pos in self.world.update_queue() {
            match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| self.world.update_chunk(pos))) {
                Ok(true) => built += 1,
                Ok(false) => {}
                Err(_) => {
                    error!(%pos, "mesh rebuild panicked");
                    self.world.remove_from_update(pos);
                }
            }
        }
        built
    }

    /// Queues the chunk at `pos` for a mesh rebuild on the next update.
    pub fn add_chunk_to_update(&self, pos: ChunkPos) {
        self.world.add_to_update(pos);
    }

    pub fn remove_chunk_to_update(&self, pos: ChunkPos) {
        self.world.remove_from_update(pos);
    }

    /// Number of chunks waiting for a mesh rebuild.
    pub fn pending_updates(&self) -> usize {
        self.world.update_queue().len()
    }

    // -----------------------------------------------------------------------
    // Persistence and shutdown
    // -----------------------------------------------------------------------

    /// Saves every dirty chunk. Returns how many were written.
    pub fn flush(&self) -> Result<usize, StorageError> {
        self.world.flush()
    }

    /// Stops the loader thread and saves dirty chunks. Idempotent.
    pub fn shutdown(&mut self) {
        let Some(loader) = self.loader.take() else {
            return;
        };
        self.send(LoaderTask::Shutdown);
        if loader.join().is_err() {
            error!("chunk loader thread panicked during shutdown");
        }
        match self.world.flush() {
            Ok(saved) => info!(saved, "chunk manager shut down"),
            Err(e) => error!(error = %e, "failed to save chunks at shutdown"),
        }
    }
}

impl Drop for ChunkManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Loading states are not valid targets; use the stable state below them.
fn stable_target(target: ChunkState) -> ChunkState {
    if target.is_loading() {
        warn!(%target, "loading state requested as target; using its stable floor");
    }
    target.stable_floor()
}

#[cfg(test)]
mod tests {
    use cubic_terrain::{FlatTerrain, NoStructures};

    use super::*;
    use crate::storage::MemoryStorage;

    const WAIT: Duration = Duration::from_secs(30);

    fn manager() -> ChunkManager {
        let registry = Arc::new(BlockRegistry::with_defaults());
        let stone = registry.lookup_by_name("stone").unwrap();
        ChunkManager::new(
            registry,
            Arc::new(FlatTerrain::new(0, stone)),
            Arc::new(NoStructures),
            Arc::new(MemoryStorage::new()),
            ManagerConfig {
                open_sky_y: 0,
                ..ManagerConfig::default()
            },
        )
    }

    #[test]
    fn test_config_conversion() {
        let mut config = Config::default();
        config.world.open_sky_y = 100;
        config.pool.max_pooled_chunks = 7;
        let manager_config = ManagerConfig::from(&config);
        assert_eq!(manager_config.open_sky_y, 100);
        assert_eq!(manager_config.max_pooled_chunks, 7);
    }

    #[test]
    fn test_request_reaches_target() {
        let manager = manager();
        let pos = ChunkPos::new(0, -16, 0);
        manager.request_chunk_state(pos, ChunkState::TerrainGenerated);
        assert!(manager.wait_idle(WAIT));
        assert_eq!(manager.state(pos), ChunkState::TerrainGenerated);
        assert_eq!(manager.block_at(IVec3::new(0, -1, 0)), None, "not block-generated yet");
    }

    #[test]
    fn test_lower_request_keeps_data() {
        let manager = manager();
        let pos = ChunkPos::new(0, 0, 0);
        manager.request_chunk_state(pos, ChunkState::BlockGenerated);
        assert!(manager.wait_idle(WAIT));
        manager.request_chunk_state(pos, ChunkState::TerrainGenerated);
        assert!(manager.wait_idle(WAIT));
        let chunk = manager.chunk(pos).unwrap();
        assert_eq!(chunk.state(), ChunkState::BlockGenerated);
        assert_eq!(chunk.wanted(), ChunkState::TerrainGenerated);
    }

    #[test]
    fn test_set_block_rejects_unready_chunk() {
        let manager = manager();
        let err = manager.set_block(IVec3::new(1, 1, 1), BlockId(1)).unwrap_err();
        assert!(matches!(
            err,
            WorldError::ChunkNotReady {
                state: ChunkState::Empty,
                ..
            }
        ));
    }

    #[test]
    fn test_set_block_rejects_unknown_block() {
        let manager = manager();
        manager.request_chunk_state(ChunkPos::new(0, 0, 0), ChunkState::BlockGenerated);
        assert!(manager.wait_idle(WAIT));
        let err = manager.set_block(IVec3::new(1, 1, 1), BlockId(9999)).unwrap_err();
        assert!(matches!(err, WorldError::UnknownBlock(_)));
        let err = manager.set_block_by_name(IVec3::new(1, 1, 1), "unobtainium").unwrap_err();
        assert!(matches!(err, WorldError::UnknownBlock(_)));
    }

    #[test]
    fn test_loading_target_is_floored() {
        assert_eq!(stable_target(ChunkState::LightLoading), ChunkState::BlockGenerated);
        assert_eq!(stable_target(ChunkState::Drawable), ChunkState::Drawable);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let mut manager = manager();
        manager.shutdown();
        manager.shutdown();
        manager.request_chunk_state(ChunkPos::new(0, 0, 0), ChunkState::TerrainGenerated);
        assert!(manager.is_idle());
    }
}
