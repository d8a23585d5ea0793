//! The lifecycle transition table.
//!
//! Each stage is one row of [`STAGES`]: the states it starts from, the
//! loading state it holds while working, the stable state it commits, and the
//! minimum state it needs from all 26 neighbors before its work can run.
//! The loader dispatches on [`ChunkStrategy`]; every other question about
//! ordering is answered from this table.

use crate::state::ChunkState;

/// Behaviour bound to a chunk in a given state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChunkStrategy {
    /// No data and no work.
    Empty,
    /// Restores a saved chunk.
    Storage,
    /// Runs the terrain generator.
    TerrainGenerated,
    /// Places structures, possibly into neighbors.
    BlockGenerated,
    /// Propagates block and sky light.
    Lighting,
    /// Computes face visibility and registers for meshing.
    Drawable,
}

/// One row of the transition table.
#[derive(Clone, Copy, Debug)]
pub struct StageSpec {
    /// Strategy that performs the stage.
    pub strategy: ChunkStrategy,
    /// States the stage may start from.
    pub entry: &'static [ChunkState],
    /// Transient state held while the stage runs.
    pub loading: ChunkState,
    /// Committed state, or `None` when it is decided by the stage (storage).
    pub exit: Option<ChunkState>,
    /// Minimum state every one of the 26 neighbors must reach first.
    pub neighbor_min: Option<ChunkState>,
}

/// The lifecycle stages in pipeline order.
pub const STAGES: [StageSpec; 5] = [
    StageSpec {
        strategy: ChunkStrategy::Storage,
        entry: &[ChunkState::Empty],
        loading: ChunkState::StorageLoading,
        exit: None,
        neighbor_min: None,
    },
    StageSpec {
        strategy: ChunkStrategy::TerrainGenerated,
        entry: &[ChunkState::Empty],
        loading: ChunkState::TerrainLoading,
        exit: Some(ChunkState::TerrainGenerated),
        neighbor_min: None,
    },
    StageSpec {
        strategy: ChunkStrategy::BlockGenerated,
        entry: &[ChunkState::TerrainGenerated],
        loading: ChunkState::BlockLoading,
        exit: Some(ChunkState::BlockGenerated),
        neighbor_min: Some(ChunkState::TerrainGenerated),
    },
    StageSpec {
        strategy: ChunkStrategy::Lighting,
        entry: &[ChunkState::BlockGenerated],
        loading: ChunkState::LightLoading,
        exit: Some(ChunkState::Lighting),
        neighbor_min: Some(ChunkState::BlockGenerated),
    },
    StageSpec {
        strategy: ChunkStrategy::Drawable,
        entry: &[ChunkState::Lighting],
        loading: ChunkState::DrawLoading,
        exit: Some(ChunkState::Drawable),
        neighbor_min: Some(ChunkState::BlockGenerated),
    },
];

impl ChunkStrategy {
    /// The strategy bound to a chunk in `state`.
    pub fn of(state: ChunkState) -> ChunkStrategy {
        match state {
            ChunkState::Empty => ChunkStrategy::Empty,
            ChunkState::StorageLoading | ChunkState::StorageLoaded => ChunkStrategy::Storage,
            ChunkState::TerrainLoading | ChunkState::TerrainGenerated => ChunkStrategy::TerrainGenerated,
            ChunkState::BlockLoading | ChunkState::BlockGenerated => ChunkStrategy::BlockGenerated,
            ChunkState::LightLoading | ChunkState::Lighting => ChunkStrategy::Lighting,
            ChunkState::DrawLoading | ChunkState::Drawable => ChunkStrategy::Drawable,
        }
    }

    /// The table row for this strategy, if it runs a stage.
    pub fn stage(self) -> Option<&'static StageSpec> {
        STAGES.iter().find(|s| s.strategy == self)
    }
}

/// The stage that moves a chunk on from `state`, or `None` at the end of the
/// pipeline or mid-stage.
///
/// An `Empty` chunk is first checked against storage; once storage reported
/// nothing (`storage_checked`), terrain generation follows.
pub fn next_stage(state: ChunkState, storage_checked: bool) -> Option<&'static StageSpec> {
    if state == ChunkState::Empty && !storage_checked {
        return ChunkStrategy::Storage.stage();
    }
    STAGES
        .iter()
        .find(|s| s.strategy != ChunkStrategy::Storage && s.entry.contains(&state))
}

/// What a chunk currently in `state` requires of each of its neighbors to
/// stay valid.
///
/// Lit and drawable chunks keep their neighbors at `BlockGenerated`; a stage
/// in progress keeps its own minimum. Generated chunks need nothing once
/// their structures are placed.
pub fn neighbor_demand(state: ChunkState) -> ChunkState {
    match state {
        ChunkState::Lighting | ChunkState::Drawable => ChunkState::BlockGenerated,
        s if s.is_loading() => STAGES
            .iter()
            .find(|stage| stage.loading == s)
            .and_then(|stage| stage.neighbor_min)
            .unwrap_or(ChunkState::Empty),
        _ => ChunkState::Empty,
    }
}

/// What reaching `target` will require of each neighbor along the way.
pub fn target_demand(target: ChunkState) -> ChunkState {
    STAGES
        .iter()
        .filter(|stage| stage.exit.is_some_and(|exit| exit <= target))
        .filter_map(|stage| stage.neighbor_min)
        .max()
        .unwrap_or(ChunkState::Empty)
}

/// Combined demand of a chunk in `state` that still wants to reach `wanted`.
pub fn chunk_demand(state: ChunkState, wanted: ChunkState) -> ChunkState {
    let pending = if state < wanted {
        target_demand(wanted)
    } else {
        ChunkState::Empty
    };
    neighbor_demand(state).max(pending)
}
