//! Block light and sky light flood fill across a chunk and its 26 neighbors.

pub mod cluster;
pub mod propagator;

pub use cluster::ChunkCluster;
pub use propagator::{LightPropagator, LightStats};
