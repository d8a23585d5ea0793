//! The per-position chunk record shared between the main thread and the
//! loader.
//!
//! Lifecycle fields are atomics so state can be read without locking. Block
//! data sits behind a reader-writer lock; multi-chunk writers always take
//! those locks in ascending [`ChunkPos`] order.
//!
//! Dirtiness is tracked by version: every edit bumps `version`, a save
//! records the version it wrote, and the chunk is dirty while the two differ.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, AtomicU64, Ordering};

use cubic_voxel::{BlockData, ChunkData, ChunkPos, FaceVisibility, NEIGHBOR_OFFSETS};
use glam::IVec3;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::mesh::ChunkMesh;
use crate::state::ChunkState;
use crate::strategy::ChunkStrategy;

/// One loaded (or pooled) chunk.
pub struct Chunk {
    position: RwLock<ChunkPos>,
    state: AtomicU16,
    wanted: AtomicU16,
    storage_checked: AtomicBool,
    pins: AtomicU32,
    version: AtomicU64,
    saved_version: AtomicU64,
    mesh_dirty: AtomicBool,
    blocks: RwLock<ChunkData>,
    neighbors: Mutex<[Option<ChunkPos>; 26]>,
    visibility: Mutex<Option<FaceVisibility>>,
    mesh: Mutex<Option<Arc<ChunkMesh>>>,
}

impl Chunk {
    /// A blank `Empty` chunk at `pos`.
    pub fn new(pos: ChunkPos) -> Self {
        Self {
            position: RwLock::new(pos),
            state: AtomicU16::new(ChunkState::Empty.bits()),
            wanted: AtomicU16::new(ChunkState::Empty.bits()),
            storage_checked: AtomicBool::new(false),
            pins: AtomicU32::new(0),
            version: AtomicU64::new(0),
            saved_version: AtomicU64::new(0),
            mesh_dirty: AtomicBool::new(false),
            blocks: RwLock::new(ChunkData::new_air()),
            neighbors: Mutex::new([None; 26]),
            visibility: Mutex::new(None),
            mesh: Mutex::new(None),
        }
    }

    /// Returns every field to its freshly constructed value at a new position.
    pub(crate) fn reset(&self, pos: ChunkPos) {
        debug_assert_eq!(self.pin_count(), 0, "resetting a pinned chunk");
        *self.position.write() = pos;
        self.blocks.write().fill(BlockData::AIR);
        self.state.store(ChunkState::Empty.bits(), Ordering::SeqCst);
        self.wanted.store(ChunkState::Empty.bits(), Ordering::SeqCst);
        self.storage_checked.store(false, Ordering::SeqCst);
        self.version.store(0, Ordering::SeqCst);
        self.saved_version.store(0, Ordering::SeqCst);
        self.mesh_dirty.store(false, Ordering::SeqCst);
        *self.neighbors.lock() = [None; 26];
        self.clear_render();
    }

    pub fn position(&self) -> ChunkPos {
        *self.position.read()
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    pub fn state(&self) -> ChunkState {
        ChunkState::from_bits(self.state.load(Ordering::SeqCst)).unwrap_or(ChunkState::Empty)
    }

    pub(crate) fn set_state(&self, state: ChunkState) {
        self.state.store(state.bits(), Ordering::SeqCst);
    }

    /// The strategy bound to the current state.
    pub fn strategy(&self) -> ChunkStrategy {
        ChunkStrategy::of(self.state())
    }

    /// The state most recently requested for this chunk.
    pub fn wanted(&self) -> ChunkState {
        ChunkState::from_bits(self.wanted.load(Ordering::SeqCst)).unwrap_or(ChunkState::Empty)
    }

    pub(crate) fn set_wanted(&self, state: ChunkState) {
        self.wanted.store(state.bits(), Ordering::SeqCst);
    }

    /// Whether storage was already asked about this chunk and had nothing.
    pub fn storage_checked(&self) -> bool {
        self.storage_checked.load(Ordering::SeqCst)
    }

    pub(crate) fn set_storage_checked(&self, checked: bool) {
        self.storage_checked.store(checked, Ordering::SeqCst);
    }

    // -----------------------------------------------------------------------
    // Pins
    // -----------------------------------------------------------------------

    pub fn pin_count(&self) -> u32 {
        self.pins.load(Ordering::SeqCst)
    }

    pub(crate) fn pin(&self) {
        self.pins.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn unpin(&self) {
        let previous = self.pins.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(previous > 0, "unpin without matching pin");
    }

    // -----------------------------------------------------------------------
    // Versioning
    // -----------------------------------------------------------------------

    /// Incremented on every edit.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Records an edit that storage has not seen yet.
    pub fn mark_dirty(&self) {
        self.version.fetch_add(1, Ordering::SeqCst);
    }

    /// `true` while edits exist that were not saved.
    pub fn is_dirty(&self) -> bool {
        self.version.load(Ordering::SeqCst) != self.saved_version.load(Ordering::SeqCst)
    }

    /// Records that the data as of `version` is persisted.
    pub(crate) fn mark_saved(&self, version: u64) {
        self.saved_version.fetch_max(version, Ordering::SeqCst);
    }

    pub fn is_mesh_dirty(&self) -> bool {
        self.mesh_dirty.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_mesh_dirty(&self) {
        self.mesh_dirty.store(true, Ordering::SeqCst);
    }

    pub(crate) fn take_mesh_dirty(&self) -> bool {
        self.mesh_dirty.swap(false, Ordering::SeqCst)
    }

    // -----------------------------------------------------------------------
    // Block data
    // -----------------------------------------------------------------------

    /// Shared access to the block grid.
    ///
    /// An `Empty` chunk has no meaningful data; reading it is a bug.
    pub fn blocks(&self) -> RwLockReadGuard<'_, ChunkData> {
        debug_assert!(
            self.state() != ChunkState::Empty,
            "reading blocks of empty chunk {}",
            self.position()
        );
        self.blocks.read()
    }

    /// Shared access regardless of state, for storage and diagnostics.
    pub fn peek_blocks(&self) -> RwLockReadGuard<'_, ChunkData> {
        self.blocks.read()
    }

    pub(crate) fn blocks_mut(&self) -> RwLockWriteGuard<'_, ChunkData> {
        self.blocks.write()
    }

    /// Swaps in a whole new grid (terrain output or storage load).
    ///
    /// The new data counts as persisted-equivalent, so the chunk is clean
    /// afterwards.
    pub fn replace_blocks(&self, data: ChunkData) {
        *self.blocks.write() = data;
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        self.mark_saved(version);
    }

    // -----------------------------------------------------------------------
    // Neighbors and render data
    // -----------------------------------------------------------------------

    /// Positions of the 26 neighbors linked by the last stage that needed
    /// them, in `NEIGHBOR_OFFSETS` order.
    pub fn neighbors(&self) -> [Option<ChunkPos>; 26] {
        *self.neighbors.lock()
    }

    /// The linked neighbor at `offset`, if the chunk is currently linked.
    pub fn neighbor(&self, offset: IVec3) -> Option<ChunkPos> {
        let index = NEIGHBOR_OFFSETS.iter().position(|&o| o == offset)?;
        self.neighbors.lock()[index]
    }

    pub(crate) fn set_neighbors(&self, links: [Option<ChunkPos>; 26]) {
        *self.neighbors.lock() = links;
    }

    pub(crate) fn clear_neighbors(&self) {
        *self.neighbors.lock() = [None; 26];
    }

    pub fn visibility(&self) -> Option<FaceVisibility> {
        *self.visibility.lock()
    }

    pub(crate) fn set_visibility(&self, visibility: Option<FaceVisibility>) {
        *self.visibility.lock() = visibility;
    }

    /// The most recently built mesh, if any.
    pub fn mesh(&self) -> Option<Arc<ChunkMesh>> {
        self.mesh.lock().clone()
    }

    pub(crate) fn set_mesh(&self, mesh: Option<Arc<ChunkMesh>>) {
        *self.mesh.lock() = mesh;
    }

    /// Drops the mesh and visibility summary.
    pub(crate) fn clear_render(&self) {
        self.set_mesh(None);
        self.set_visibility(None);
        self.mesh_dirty.store(false, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunk")
            .field("position", &self.position())
            .field("state", &self.state())
            .field("wanted", &self.wanted())
            .field("pins", &self.pin_count())
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use cubic_voxel::BlockId;

    use super::*;

    #[test]
    fn test_new_chunk_is_blank() {
        let chunk = Chunk::new(ChunkPos::new(16, 0, -32));
        assert_eq!(chunk.position(), ChunkPos::new(16, 0, -32));
        assert_eq!(chunk.state(), ChunkState::Empty);
        assert_eq!(chunk.strategy(), ChunkStrategy::Empty);
        assert!(!chunk.is_dirty());
        assert!(chunk.peek_blocks().is_all_air());
    }

    #[test]
    fn test_edit_makes_dirty_until_saved() {
        let chunk = Chunk::new(ChunkPos::new(0, 0, 0));
        chunk.mark_dirty();
        assert!(chunk.is_dirty());
        let saved_at = chunk.version();
        chunk.mark_dirty();
        chunk.mark_saved(saved_at);
        assert!(chunk.is_dirty(), "edit after the save point stays dirty");
        chunk.mark_saved(chunk.version());
        assert!(!chunk.is_dirty());
    }

    #[test]
    fn test_replace_blocks_is_clean() {
        let chunk = Chunk::new(ChunkPos::new(0, 0, 0));
        chunk.mark_dirty();
        chunk.replace_blocks(ChunkData::new(BlockData::new(BlockId(1))));
        assert!(!chunk.is_dirty());
        assert_eq!(chunk.peek_blocks().get(0, 0, 0).id(), BlockId(1));
    }

    #[test]
    fn test_reset_clears_everything() {
        let chunk = Chunk::new(ChunkPos::new(0, 0, 0));
        chunk.set_state(ChunkState::Drawable);
        chunk.set_wanted(ChunkState::Drawable);
        chunk.set_storage_checked(true);
        chunk.blocks_mut().set(1, 1, 1, BlockData::new(BlockId(3)));
        chunk.mark_dirty();
        chunk.mark_mesh_dirty();
        chunk.set_neighbors([Some(ChunkPos::new(16, 0, 0)); 26]);
        chunk.set_mesh(Some(Arc::new(ChunkMesh::default())));

        chunk.reset(ChunkPos::new(256, 0, 0));

        assert_eq!(chunk.position(), ChunkPos::new(256, 0, 0));
        assert_eq!(chunk.state(), ChunkState::Empty);
        assert_eq!(chunk.wanted(), ChunkState::Empty);
        assert!(!chunk.storage_checked());
        assert!(!chunk.is_dirty());
        assert!(!chunk.is_mesh_dirty());
        assert!(chunk.neighbors().iter().all(Option::is_none));
        assert!(chunk.mesh().is_none());
        assert_eq!(chunk.peek_blocks().uniform_value(), Some(BlockData::AIR));
    }

    #[test]
    fn test_neighbor_link_by_offset() {
        let pos = ChunkPos::new(0, 0, 0);
        let chunk = Chunk::new(pos);
        assert_eq!(chunk.neighbor(IVec3::X), None);

        let mut links = [None; 26];
        for (link, offset) in links.iter_mut().zip(NEIGHBOR_OFFSETS) {
            *link = Some(pos.offset(offset));
        }
        chunk.set_neighbors(links);
        assert_eq!(chunk.neighbor(IVec3::X), Some(ChunkPos::new(16, 0, 0)));
        assert_eq!(chunk.neighbor(IVec3::new(-1, 1, -1)), Some(ChunkPos::new(-16, 16, -16)));
        assert_eq!(chunk.neighbor(IVec3::ZERO), None, "the chunk is not its own neighbor");

        chunk.clear_neighbors();
        assert_eq!(chunk.neighbor(IVec3::X), None);
    }

    #[test]
    fn test_take_mesh_dirty() {
        let chunk = Chunk::new(ChunkPos::new(0, 0, 0));
        chunk.mark_mesh_dirty();
        assert!(chunk.take_mesh_dirty());
        assert!(!chunk.take_mesh_dirty());
    }
}
