//! End-to-end lifecycle behavior of the chunk manager and its loader thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use cubic_terrain::{FlatTerrain, GenerationError, NoStructures, TerrainGenerator};
use cubic_voxel::{BlockId, BlockRegistry, ChunkData, ChunkPos, Face};
use cubic_world::{
    Chunk, ChunkManager, ChunkState, ChunkStorage, ManagerConfig, MemoryStorage, StorageError, relevant_positions,
};
use glam::IVec3;

const WAIT: Duration = Duration::from_secs(60);

fn manager_with(ground_y: i32, storage: Arc<dyn ChunkStorage>, open_sky_y: i32) -> ChunkManager {
    let registry = Arc::new(BlockRegistry::with_defaults());
    let stone = registry.lookup_by_name("stone").unwrap();
    ChunkManager::new(
        registry,
        Arc::new(FlatTerrain::new(ground_y, stone)),
        Arc::new(NoStructures),
        storage,
        ManagerConfig {
            open_sky_y,
            ..ManagerConfig::default()
        },
    )
}

fn manager(ground_y: i32) -> ChunkManager {
    manager_with(ground_y, Arc::new(MemoryStorage::new()), 0)
}

/// Fails the first `failures` storage lookups, then defers to memory.
struct FlakyStorage {
    inner: MemoryStorage,
    failures: AtomicUsize,
}

impl FlakyStorage {
    fn new(failures: usize) -> Self {
        Self {
            inner: MemoryStorage::new(),
            failures: AtomicUsize::new(failures),
        }
    }
}

impl ChunkStorage for FlakyStorage {
    fn state_in_storage(&self, pos: ChunkPos) -> Result<ChunkState, StorageError> {
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(StorageError::Unavailable("disk offline".to_string()));
        }
        self.inner.state_in_storage(pos)
    }

    fn load_chunk(&self, chunk: &Chunk) -> Result<(), StorageError> {
        self.inner.load_chunk(chunk)
    }

    fn save_chunk(&self, chunk: &Chunk) -> Result<(), StorageError> {
        self.inner.save_chunk(chunk)
    }
}

/// Flat terrain that panics when asked for one particular chunk.
struct PanicsAt {
    inner: FlatTerrain,
    at: ChunkPos,
}

impl TerrainGenerator for PanicsAt {
    fn generate_terrain(&self, origin: ChunkPos) -> Result<ChunkData, GenerationError> {
        assert_ne!(origin, self.at, "terrain exploded at {origin}");
        self.inner.generate_terrain(origin)
    }
}

#[test]
fn test_states_never_go_backwards_while_advancing() {
    let manager = manager(0);
    let pos = ChunkPos::new(0, 0, 0);
    manager.request_chunk_state(pos, ChunkState::Drawable);

    let mut seen = vec![ChunkState::Empty];
    while !manager.is_idle() {
        let state = manager.state(pos).stable_floor();
        if seen.last() != Some(&state) {
            seen.push(state);
        }
        std::thread::yield_now();
    }
    seen.push(manager.state(pos));
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{seen:?}");
    assert_eq!(manager.state(pos), ChunkState::Drawable);
}

#[test]
fn test_drawable_set_has_sufficient_neighbors() {
    let manager = manager(0);
    let center = ChunkPos::new(0, 0, 0);
    let relevant = relevant_positions(center, 1, 0);
    manager.request_relevant_set(relevant.clone(), ChunkState::Drawable);
    assert!(manager.wait_idle(WAIT));

    for &pos in &relevant {
        assert_eq!(manager.state(pos), ChunkState::Drawable, "{pos}");
        for npos in pos.neighbors() {
            assert!(manager.state(npos) >= ChunkState::BlockGenerated, "{npos} under {pos}");
        }
    }
    // Nothing beyond one ring around the relevant set stays loaded.
    for pos in manager.loaded_positions() {
        assert!(
            relevant.iter().any(|&r| r == pos || r.is_neighbor(pos)),
            "{pos} loaded outside the relevant ring"
        );
    }
    assert!(manager.recent_failures().is_empty());
}

#[test]
fn test_edited_chunk_survives_unload_and_reload() {
    let storage = Arc::new(MemoryStorage::new());
    let manager = manager_with(8, storage.clone(), 0);
    let pos = ChunkPos::new(0, 0, 0);
    let glass = manager.registry().lookup_by_name("glass").unwrap();

    manager.request_chunk_state(pos, ChunkState::BlockGenerated);
    assert!(manager.wait_idle(WAIT));
    manager.set_block(IVec3::new(3, 10, 5), glass).unwrap();
    manager.set_block(IVec3::new(2, 3, 2), BlockId::AIR).unwrap();
    assert!(manager.chunk(pos).unwrap().is_dirty());
    let saved: Vec<BlockId> = manager.chunk(pos).unwrap().blocks().cells().map(|cell| cell.id()).collect();

    assert!(manager.try_unload(pos));
    assert!(manager.chunk(pos).is_none());
    assert!(storage.contains(pos));
    assert_eq!(storage.len(), 1, "only the edited chunk is saved");

    manager.request_chunk_state(pos, ChunkState::BlockGenerated);
    assert!(manager.wait_idle(WAIT));
    assert_eq!(manager.state(pos), ChunkState::BlockGenerated);
    assert_eq!(storage.load_count(), 1);
    let reloaded: Vec<BlockId> = manager.chunk(pos).unwrap().blocks().cells().map(|cell| cell.id()).collect();
    assert_eq!(reloaded, saved);
    assert_eq!(manager.block_at(IVec3::new(3, 10, 5)).unwrap().id(), glass);
    assert!(manager.block_at(IVec3::new(2, 3, 2)).unwrap().is_air());
    assert!(!manager.chunk(pos).unwrap().is_dirty());
}

#[test]
fn test_repeated_relevant_set_is_stable() {
    let storage = Arc::new(MemoryStorage::new());
    let manager = manager_with(0, storage.clone(), 0);
    let relevant = relevant_positions(ChunkPos::new(0, 0, 0), 1, 0);

    manager.request_relevant_set(relevant.clone(), ChunkState::Lighting);
    assert!(manager.wait_idle(WAIT));
    let loaded = manager.loaded_positions();
    let states: Vec<ChunkState> = loaded.iter().map(|&p| manager.state(p)).collect();
    let pooled = manager.pooled_count();

    manager.request_relevant_set(relevant, ChunkState::Lighting);
    assert!(manager.wait_idle(WAIT));
    assert_eq!(manager.loaded_positions(), loaded);
    let again: Vec<ChunkState> = loaded.iter().map(|&p| manager.state(p)).collect();
    assert_eq!(again, states);
    assert_eq!(manager.pooled_count(), pooled);
    assert_eq!(storage.save_count(), 0);
}

#[test]
fn test_pooled_chunk_is_reused_blank() {
    let manager = manager(64);
    let pos = ChunkPos::new(0, 0, 0);
    manager.request_chunk_state(pos, ChunkState::TerrainGenerated);
    assert!(manager.wait_idle(WAIT));

    let original = Arc::as_ptr(&manager.chunk(pos).unwrap());
    assert!(manager.try_unload(pos));
    assert_eq!(manager.pooled_count(), 1);

    let reused = manager.get_chunk(ChunkPos::new(256, 0, 0));
    assert_eq!(Arc::as_ptr(&reused), original);
    assert_eq!(reused.position(), ChunkPos::new(256, 0, 0));
    assert_eq!(reused.state(), ChunkState::Empty);
    assert_eq!(reused.pin_count(), 0);
    assert!(reused.peek_blocks().is_all_air());
    assert!(reused.mesh().is_none());
    assert_eq!(manager.pooled_count(), 0);
}

#[test]
fn test_pinned_chunk_is_not_unloaded() {
    let manager = manager(0);
    let pos = ChunkPos::new(0, 0, 0);
    manager.request_chunk_state(pos, ChunkState::TerrainGenerated);
    assert!(manager.wait_idle(WAIT));

    let guard = manager.pin(pos).unwrap();
    assert!(!manager.try_unload(pos));
    drop(guard);
    assert!(manager.try_unload(pos));
}

#[test]
fn test_storage_failure_is_recorded_and_retryable() {
    let manager = manager_with(0, Arc::new(FlakyStorage::new(1)), 0);
    let pos = ChunkPos::new(0, 0, 0);

    manager.request_chunk_state(pos, ChunkState::TerrainGenerated);
    assert!(manager.wait_idle(WAIT));
    assert_eq!(manager.state(pos), ChunkState::Empty);
    let failures = manager.recent_failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].pos, pos);
    assert_eq!(failures[0].stage, ChunkState::StorageLoading);
    assert!(failures[0].message.contains("disk offline"));

    manager.request_chunk_state(pos, ChunkState::TerrainGenerated);
    assert!(manager.wait_idle(WAIT));
    assert_eq!(manager.state(pos), ChunkState::TerrainGenerated);
}

#[test]
fn test_torch_lights_and_remeshes() {
    let manager = manager(0);
    let pos = ChunkPos::new(0, 0, 0);
    manager.request_chunk_state(pos, ChunkState::Drawable);
    assert!(manager.wait_idle(WAIT));
    manager.update();
    assert_eq!(manager.block_at(IVec3::new(8, 4, 9)).unwrap().block_light(), 0);

    let torch = manager.registry().lookup_by_name("torch").unwrap();
    manager.set_block(IVec3::new(8, 4, 8), torch).unwrap();
    assert_eq!(manager.block_at(IVec3::new(8, 4, 8)).unwrap().block_light(), 14);
    assert_eq!(manager.block_at(IVec3::new(8, 4, 9)).unwrap().block_light(), 13);
    assert_eq!(manager.block_at(IVec3::new(8, 4, 12)).unwrap().block_light(), 10);

    assert!(manager.pending_updates() >= 1);
    assert!(manager.update() >= 1);
    let mesh = manager.chunk(pos).unwrap().mesh().unwrap();
    assert_eq!(mesh.quads.len(), 6);
    assert_eq!(mesh.count(Face::PosY), 1);
    assert_eq!(manager.pending_updates(), 0);
}

#[test]
fn test_open_sky_is_uniformly_lit() {
    let manager = manager(-64);
    let pos = ChunkPos::new(0, 32, 0);
    manager.request_chunk_state(pos, ChunkState::Lighting);
    assert!(manager.wait_idle(WAIT));

    let chunk = manager.chunk(pos).unwrap();
    let blocks = chunk.blocks();
    assert!(blocks.cells().all(|cell| cell.is_air() && cell.sky_light() == 15));
}

#[test]
fn test_panicking_chunk_does_not_stop_the_relevant_set() {
    let registry = Arc::new(BlockRegistry::with_defaults());
    let stone = registry.lookup_by_name("stone").unwrap();
    let broken = ChunkPos::new(0, 0, 0);
    let manager = ChunkManager::new(
        registry,
        Arc::new(PanicsAt {
            inner: FlatTerrain::new(0, stone),
            at: broken,
        }),
        Arc::new(NoStructures),
        Arc::new(MemoryStorage::new()),
        ManagerConfig::default(),
    );
    let rest = [ChunkPos::new(160, 0, 0), ChunkPos::new(320, 0, 0)];

    manager.request_relevant_set([broken, rest[0], rest[1]], ChunkState::TerrainGenerated);
    assert!(manager.wait_idle(WAIT));
    assert_eq!(manager.state(broken), ChunkState::Empty);
    for pos in rest {
        assert_eq!(manager.state(pos), ChunkState::TerrainGenerated, "{pos}");
    }
    let failures = manager.recent_failures();
    assert!(
        failures.iter().any(|f| f.pos == broken
            && f.stage == ChunkState::TerrainLoading
            && f.message.contains("terrain exploded")),
        "{failures:?}"
    );

    let later = ChunkPos::new(480, 0, 0);
    manager.request_chunk_state(later, ChunkState::TerrainGenerated);
    assert!(manager.wait_idle(WAIT));
    assert_eq!(manager.state(later), ChunkState::TerrainGenerated);
}

#[test]
fn test_request_after_relevant_set_keeps_its_target() {
    let manager = manager(0);
    manager.request_relevant_set(relevant_positions(ChunkPos::new(0, 0, 0), 1, 0), ChunkState::Drawable);
    let far = ChunkPos::new(1600, 0, 0);
    manager.request_chunk_state(far, ChunkState::TerrainGenerated);

    assert!(manager.wait_idle(WAIT));
    assert_eq!(manager.state(far), ChunkState::TerrainGenerated);
    assert_eq!(manager.chunk(far).unwrap().wanted(), ChunkState::TerrainGenerated);
}

#[test]
fn test_torch_removed_from_downgraded_chunk_leaves_no_light() {
    let manager = manager(0);
    let a = ChunkPos::new(0, 0, 0);
    let b = ChunkPos::new(16, 0, 0);
    let torch = manager.registry().lookup_by_name("torch").unwrap();

    manager.request_relevant_set([a, b], ChunkState::Lighting);
    assert!(manager.wait_idle(WAIT));
    manager.set_block(IVec3::new(15, 8, 8), torch).unwrap();
    assert_eq!(manager.block_at(IVec3::new(16, 8, 8)).unwrap().block_light(), 13);

    manager.request_relevant_set([b], ChunkState::Lighting);
    assert!(manager.wait_idle(WAIT));
    assert_eq!(manager.state(a), ChunkState::BlockGenerated);
    manager.set_block(IVec3::new(15, 8, 8), BlockId::AIR).unwrap();

    manager.request_relevant_set([a, b], ChunkState::Lighting);
    assert!(manager.wait_idle(WAIT));
    assert_eq!(manager.state(a), ChunkState::Lighting);
    for at in [(15, 8, 8), (12, 8, 8), (16, 8, 8), (19, 8, 8), (15, 8, 12)] {
        let at = IVec3::from(at);
        assert_eq!(manager.block_at(at).unwrap().block_light(), 0, "{at}");
    }
}
