//! The background loader thread and the stage driver it runs.
//!
//! A stage runs in three steps. `init` advances and pins all 26 neighbors to
//! the stage's minimum state and links them. `load` does the stage's work.
//! `finish` runs after the exit state is committed. Any error, or a panic,
//! before commit puts the chunk back in the stable state it started from and
//! is recorded as a failure for that chunk and stage.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::Ordering;
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::Receiver;
use cubic_voxel::{ChunkPos, Face, FaceVisibility, NEIGHBOR_OFFSETS};
use rustc_hash::FxHashSet;
use tracing::{debug, error, info, trace, warn};

use crate::chunk::Chunk;
use crate::error::LoadError;
use crate::pin::PinGuard;
use crate::state::ChunkState;
use crate::strategy::{ChunkStrategy, StageSpec, next_stage};
use crate::world::World;

/// Work submitted to the loader thread.
#[derive(Debug)]
pub(crate) enum LoaderTask {
    /// Advance one chunk to at least `target`.
    Advance { pos: ChunkPos, target: ChunkState },
    /// Replace the relevant set; everything outside it may be evicted.
    Relevant {
        positions: Vec<ChunkPos>,
        target: ChunkState,
    },
    Shutdown,
}

pub(crate) fn spawn_loader(world: std::sync::Arc<World>, tasks: Receiver<LoaderTask>) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("chunk-loader".into())
        .spawn(move || run(&world, &tasks))
        .expect("Failed to spawn chunk loader thread")
}

/// Blocks for a task, drains whatever else is queued, processes the batch,
/// then runs eviction.
fn run(world: &World, tasks: &Receiver<LoaderTask>) {
    info!("chunk loader started");
    while let Ok(first) = tasks.recv() {
        let mut batch = vec![first];
        batch.extend(tasks.try_iter());
        let count = batch.len();
        let mut shutdown = false;

        for task in batch {
            match task {
                LoaderTask::Shutdown => shutdown = true,
                task => guarded("task", || handle(world, task)),
            }
        }
        guarded("eviction", || {
            let changed = world.evict_unwanted();
            if changed > 0 {
                debug!(changed, loaded = world.loaded_count(), "eviction pass");
            }
        });

        world.pending.fetch_sub(count, Ordering::SeqCst);
        if shutdown {
            break;
        }
    }
    info!("chunk loader stopped");
}

fn guarded(what: &str, f: impl FnOnce()) {
    if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(f)) {
        let message = panic_message(panic.as_ref());
        error!(what, %message, "chunk loader panicked; continuing");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

fn handle(world: &World, task: LoaderTask) {
    match task {
        LoaderTask::Advance { pos, target } => {
            world.get_or_create(pos).set_wanted(target);
            if let Err(e) = advance(world, pos, target) {
                debug!(%pos, %target, error = %e, "advance failed");
            }
        }
        LoaderTask::Relevant { positions, target } => apply_relevant(world, positions, target),
        LoaderTask::Shutdown => {}
    }
}

fn apply_relevant(world: &World, positions: Vec<ChunkPos>, target: ChunkState) {
    let started = Instant::now();
    let relevant: FxHashSet<ChunkPos> = positions.iter().copied().collect();
    for pos in world.loaded_positions() {
        if !relevant.contains(&pos)
            && let Some(chunk) = world.chunk(pos)
        {
            chunk.set_wanted(ChunkState::Empty);
        }
    }
    for &pos in &positions {
        world.get_or_create(pos).set_wanted(target);
    }

    let mut failed = 0;
    for &pos in &positions {
        if advance(world, pos, target).is_err() {
            failed += 1;
        }
    }
    info!(
        relevant = positions.len(),
        failed,
        loaded = world.loaded_count(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "applied relevant set"
    );
}

/// Runs stages on the chunk at `pos` until it reaches `target`.
pub(crate) fn advance(world: &World, pos: ChunkPos, target: ChunkState) -> Result<(), LoadError> {
    let chunk = world.pin_or_create(pos);
    loop {
        let state = chunk.state();
        if state >= target {
            return Ok(());
        }
        let stage = next_stage(state, chunk.storage_checked());
        debug_assert!(stage.is_some(), "chunk {pos} in {state} cannot advance toward {target}");
        let Some(stage) = stage else {
            return Err(LoadError::Invariant(format!(
                "chunk {pos} in {state} cannot advance toward {target}"
            )));
        };
        run_stage(world, &chunk, stage)?;
    }
}

/// Restores the entry state unless the stage committed.
struct StageGuard<'a> {
    chunk: &'a Chunk,
    entry: ChunkState,
    committed: bool,
}

impl<'a> StageGuard<'a> {
    fn enter(chunk: &'a Chunk, loading: ChunkState) -> Self {
        let entry = chunk.state();
        chunk.set_state(loading);
        Self {
            chunk,
            entry,
            committed: false,
        }
    }

    fn commit(&mut self, exit: ChunkState) {
        self.chunk.set_state(exit);
        self.committed = true;
    }
}

impl Drop for StageGuard<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.chunk.set_state(self.entry);
        }
    }
}

fn run_stage(world: &World, chunk: &PinGuard, stage: &StageSpec) -> Result<(), LoadError> {
    let pos = chunk.position();
    let started = Instant::now();
    let mut guard = StageGuard::enter(chunk, stage.loading);

    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| -> Result<ChunkState, LoadError> {
        let pins = init(world, chunk, stage)?;
        let exit = load(world, chunk, stage)?;
        drop(pins);
        Ok(exit)
    }))
    .unwrap_or_else(|panic| Err(LoadError::Panicked(panic_message(panic.as_ref()))));

    let exit = match outcome {
        Ok(exit) => exit,
        Err(e) => {
            drop(guard);
            world.record_failure(pos, stage.loading, &e);
            return Err(e);
        }
    };

    guard.commit(exit);
    drop(guard);
    finish(world, chunk, stage);
    trace!(
        %pos,
        stage = ?stage.strategy,
        state = %exit,
        elapsed_us = started.elapsed().as_micros() as u64,
        "stage complete"
    );
    Ok(())
}

/// Advances and pins every neighbor the stage depends on, then links them.
fn init(world: &World, chunk: &Chunk, stage: &StageSpec) -> Result<Vec<PinGuard>, LoadError> {
    let Some(min) = stage.neighbor_min else {
        return Ok(Vec::new());
    };
    let pos = chunk.position();
    let mut links = [None; 26];
    let mut pins = Vec::with_capacity(NEIGHBOR_OFFSETS.len());
    for (link, offset) in links.iter_mut().zip(NEIGHBOR_OFFSETS) {
        let npos = pos.offset(offset);
        let pin = world.pin_or_create(npos);
        advance(world, npos, min)?;
        *link = Some(npos);
        pins.push(pin);
    }

    if let Some(low) = pins.iter().find(|pin| pin.state().stable_floor() < min) {
        let message = format!("neighbor {} of {pos} is {}, below {min}", low.position(), low.state());
        debug_assert!(low.state().stable_floor() >= min, "{message}");
        return Err(LoadError::Invariant(message));
    }
    chunk.set_neighbors(links);
    Ok(pins)
}

/// The stage's work. Returns the state to commit.
fn load(world: &World, chunk: &PinGuard, stage: &StageSpec) -> Result<ChunkState, LoadError> {
    let pos = chunk.position();
    match stage.strategy {
        ChunkStrategy::Storage => {
            let stored = world.storage.state_in_storage(pos)?;
            if stored == ChunkState::Empty {
                chunk.set_storage_checked(true);
                return Ok(ChunkState::Empty);
            }
            world.storage.load_chunk(chunk)?;
            chunk.set_state(ChunkState::StorageLoaded);
            if stored >= ChunkState::BlockGenerated {
                let visibility = FaceVisibility::compute(&chunk.blocks(), &world.registry);
                chunk.set_visibility(Some(visibility));
            }
            debug!(%pos, state = %stored, "restored chunk from storage");
            Ok(stored)
        }
        ChunkStrategy::TerrainGenerated => {
            let data = world.terrain.generate_terrain(pos)?;
            chunk.replace_blocks(data);
            Ok(ChunkState::TerrainGenerated)
        }
        ChunkStrategy::BlockGenerated => {
            place_structures(world, chunk);
            Ok(ChunkState::BlockGenerated)
        }
        ChunkStrategy::Lighting => {
            let stats = world.with_cluster(chunk.chunk(), Some(ChunkState::BlockGenerated), |cluster| {
                world.propagator.light_chunk(cluster, pos.y)
            });
            trace!(%pos, bfs_steps = stats.bfs_steps, cells_changed = stats.cells_changed, "lit chunk");
            Ok(ChunkState::Lighting)
        }
        ChunkStrategy::Drawable => {
            let visibility = FaceVisibility::compute(&chunk.blocks(), &world.registry);
            chunk.set_visibility(Some(visibility));
            Ok(ChunkState::Drawable)
        }
        ChunkStrategy::Empty => Ok(ChunkState::Empty),
    }
}

/// Plans this chunk's structures and writes them into air cells of the chunk
/// and its neighbors.
fn place_structures(world: &World, chunk: &Chunk) {
    let pos = chunk.position();
    let placements = {
        let blocks = chunk.blocks();
        world.structures.structures(pos, &blocks)
    };
    let mut placed = 0usize;
    for placement in placements {
        let owner = ChunkPos::containing(placement.pos);
        let reachable = owner == pos || pos.is_neighbor(owner);
        debug_assert!(reachable, "structure at {} escapes neighborhood of {pos}", placement.pos);
        if !reachable {
            warn!(%pos, at = %placement.pos, "skipping structure block outside neighborhood");
            continue;
        }
        match world.edit_block(placement.pos, placement.block, true) {
            Ok(true) => placed += 1,
            Ok(false) => {}
            Err(e) => debug!(%pos, error = %e, "structure block not placed"),
        }
    }
    if placed > 0 {
        trace!(%pos, placed, "placed structure blocks");
    }
}

/// Post-commit work: a drawable chunk joins the mesh queue unless it cannot
/// contribute geometry, and its drawable face neighbors refresh their
/// boundary faces.
fn finish(world: &World, chunk: &Chunk, stage: &StageSpec) {
    if stage.strategy != ChunkStrategy::Drawable {
        return;
    }
    let pos = chunk.position();
    if needs_mesh(world, chunk) {
        world.request_remesh(chunk);
    } else {
        trace!(%pos, "chunk has no visible geometry; mesh skipped");
    }
    for face in Face::ALL {
        if let Some(npos) = chunk.neighbor(face.offset())
            && let Some(neighbor) = world.chunk(npos)
            && neighbor.state() == ChunkState::Drawable
        {
            world.request_remesh(&neighbor);
        }
    }
}

/// `false` for an all-air chunk, or a solid chunk whose six linked face
/// neighbors all present an opaque face toward it.
fn needs_mesh(world: &World, chunk: &Chunk) -> bool {
    let Some(visibility) = chunk.visibility() else {
        return true;
    };
    if visibility.empty {
        return false;
    }
    if !visibility.solid {
        return true;
    }
    !Face::ALL.into_iter().all(|face| {
        let Some(neighbor) = chunk.neighbor(face.offset()).and_then(|npos| world.chunk(npos)) else {
            return false;
        };
        if neighbor.state().stable_floor() < ChunkState::BlockGenerated {
            return false;
        }
        let summary = neighbor
            .visibility()
            .unwrap_or_else(|| FaceVisibility::compute(&neighbor.blocks(), &world.registry));
        summary.is_opaque(face.opposite())
    })
}
