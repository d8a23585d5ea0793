//! Headless demo that streams a voxel world around a viewer walking along +X.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p cubic-demo -- --ticks 32 --view-distance 3`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use cubic_config::{CliArgs, Config, default_config_dir};
use cubic_terrain::{HeightmapTerrain, TerrainBlocks, TreeGenerator};
use cubic_voxel::BlockRegistry;
use cubic_world::{ChunkManager, ChunkState, ChunkStorage, FileStorage, ManagerConfig, MemoryStorage, ViewerTracker};
use glam::{IVec3, Vec3};
use tracing::{error, info, warn};

/// Blocks the viewer moves per tick.
const STEP: f32 = 4.0;

/// How long one tick waits for the loader to catch up.
const TICK_BUDGET: Duration = Duration::from_secs(10);

fn main() {
    let args = CliArgs::parse();

    let config_dir = args.config.clone().unwrap_or_else(default_config_dir);

    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config
        .debug
        .log_dir
        .clone()
        .unwrap_or_else(|| config_dir.join("logs"));
    cubic_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    if let Err(message) = run(&config, args.ticks) {
        error!(%message, "demo failed");
        std::process::exit(1);
    }
}

fn run(config: &Config, ticks: u32) -> Result<(), String> {
    let registry = Arc::new(BlockRegistry::with_defaults());
    let blocks = TerrainBlocks::from_registry(&registry).map_err(|e| e.to_string())?;
    let terrain = Arc::new(HeightmapTerrain::new(config.world.seed, config.world.sea_level, blocks));
    let trees = Arc::new(TreeGenerator::new(config.world.seed, &registry).map_err(|e| e.to_string())?);

    let storage: Arc<dyn ChunkStorage> = match &config.world.save_dir {
        Some(dir) => {
            info!(dir = %dir.display(), "saving chunks to disk");
            Arc::new(FileStorage::new(dir.clone()))
        }
        None => Arc::new(MemoryStorage::new()),
    };

    let target: ChunkState = config.streaming.target_state.parse().unwrap_or_else(|e| {
        warn!(error = %e, "invalid streaming target; using Drawable");
        ChunkState::Drawable
    });

    let mut manager = ChunkManager::new(
        Arc::clone(&registry),
        terrain.clone(),
        trees,
        storage,
        ManagerConfig::from(config),
    );
    let mut tracker = ViewerTracker::new(
        config.streaming.view_distance,
        config.streaming.vertical_view_distance,
        target,
    );

    let started = Instant::now();
    let mut viewer = Vec3::new(8.0, (terrain.surface_height(8, 8) + 2) as f32, 8.0);
    let mut meshes = 0;
    for tick in 0..ticks {
        if tracker.update(&manager, viewer) && !manager.wait_idle(TICK_BUDGET) {
            warn!(tick, "loader fell behind");
        }
        meshes += manager.update();

        viewer.x += STEP;
        let (x, z) = (viewer.x.floor() as i32, viewer.z.floor() as i32);
        viewer.y = (terrain.surface_height(x, z) + 2) as f32;
    }
    manager.wait_idle(TICK_BUDGET);
    meshes += manager.update();

    place_torch(&manager, &terrain, viewer);
    meshes += manager.update();

    let failures = manager.recent_failures();
    for failure in &failures {
        warn!(pos = %failure.pos, stage = %failure.stage, message = %failure.message, "load failure");
    }
    info!(
        ticks,
        loaded = manager.loaded_count(),
        pooled = manager.pooled_count(),
        meshes,
        failures = failures.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "walk finished"
    );

    manager.shutdown();
    Ok(())
}

/// Places a torch on the surface under the viewer and reports the light
/// next to it.
fn place_torch(manager: &ChunkManager, terrain: &HeightmapTerrain, viewer: Vec3) {
    let (x, z) = (viewer.x.floor() as i32, viewer.z.floor() as i32);
    let at = IVec3::new(x, terrain.surface_height(x, z) + 1, z);
    match manager.set_block_by_name(at, "torch") {
        Ok(()) => {
            let beside = at + IVec3::X;
            let light = manager.block_at(beside).map(|b| b.block_light());
            info!(x = at.x, y = at.y, z = at.z, ?light, "placed torch");
        }
        Err(e) => warn!(x = at.x, y = at.y, z = at.z, error = %e, "could not place torch"),
    }
}
