//! Block registry: maps compact [`BlockId`] values to [`BlockDef`] metadata.
//!
//! The registry is built once at startup and shared read-only (behind an `Arc`)
//! by the generator, the lighting code and the chunk manager. Air is always
//! id 0 so that zeroed chunk memory is empty space.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::block::{BlockData, BlockId};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Catalog entry for one block type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDef {
    /// Unique name, e.g. `"stone"`.
    pub name: String,
    /// Whether entities collide with this block.
    #[serde(default = "default_solid")]
    pub solid: bool,
    /// Whether light and visibility pass through.
    #[serde(default)]
    pub transparent: bool,
    /// Emitted block light (0 = none, 15 = max).
    #[serde(default)]
    pub light_emission: u8,
}

fn default_solid() -> bool {
    true
}

impl BlockDef {
    /// An opaque, solid, non-emitting block.
    pub fn opaque(name: &str) -> Self {
        Self {
            name: name.to_string(),
            solid: true,
            transparent: false,
            light_emission: 0,
        }
    }

    /// A transparent block; `solid` controls collision only.
    pub fn transparent(name: &str, solid: bool) -> Self {
        Self {
            name: name.to_string(),
            solid,
            transparent: true,
            light_emission: 0,
        }
    }

    /// Same definition with the given light emission.
    #[must_use]
    pub fn emitting(mut self, level: u8) -> Self {
        self.light_emission = level.min(BlockData::MAX_LIGHT);
        self
    }
}

/// Errors raised while building a registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A block with the same name is already registered.
    #[error("duplicate block name: {0}")]
    DuplicateName(String),
    /// All 65 536 ids are taken.
    #[error("block registry is full (max 65536 types)")]
    RegistryFull,
    /// A name lookup found no block.
    #[error("unknown block name: {0}")]
    UnknownName(String),
    /// A RON catalog could not be parsed.
    #[error("failed to parse block catalog: {0}")]
    Parse(#[from] ron::error::SpannedError),
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Maps [`BlockId`] → [`BlockDef`] with O(1) lookup in both directions.
#[derive(Clone, Debug)]
pub struct BlockRegistry {
    /// Dense array where `index == BlockId.0`.
    defs: Vec<BlockDef>,
    name_to_id: HashMap<String, BlockId>,
}

impl BlockRegistry {
    /// Creates a registry holding only air (id 0).
    pub fn new() -> Self {
        let mut name_to_id = HashMap::new();
        name_to_id.insert("air".to_string(), BlockId::AIR);
        Self {
            defs: vec![BlockDef::transparent("air", false)],
            name_to_id,
        }
    }

    /// The built-in block catalog.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let defaults = [
            BlockDef::opaque("stone"),
            BlockDef::opaque("dirt"),
            BlockDef::opaque("grass"),
            BlockDef::opaque("sand"),
            BlockDef::transparent("water", false),
            BlockDef::opaque("log"),
            BlockDef::transparent("leaves", true),
            BlockDef::transparent("glass", true),
            BlockDef::opaque("glowstone").emitting(15),
            BlockDef::transparent("torch", false).emitting(14),
            BlockDef::opaque("bedrock"),
        ];
        for def in defaults {
            // Names above are unique and far below the id limit.
            let _ = registry.register(def);
        }
        registry
    }

    /// Builds a registry from a RON list of block definitions.
    ///
    /// Air is always id 0; an `air` entry in the list is skipped. The rest
    /// receive ids in list order starting at 1.
    ///
    /// ```ron
    /// [
    ///     (name: "stone"),
    ///     (name: "glass", transparent: true),
    ///     (name: "lamp", light_emission: 15),
    /// ]
    /// ```
    pub fn from_ron(source: &str) -> Result<Self, RegistryError> {
        let defs: Vec<BlockDef> = ron::from_str(source)?;
        let mut registry = Self::new();
        for def in defs.into_iter().filter(|d| d.name != "air") {
            registry.register(def)?;
        }
        Ok(registry)
    }

    /// Registers a new block type and returns its id.
    ///
    /// # Errors
    ///
    /// [`RegistryError::DuplicateName`] if the name is taken,
    /// [`RegistryError::RegistryFull`] if every id is in use.
    pub fn register(&mut self, mut def: BlockDef) -> Result<BlockId, RegistryError> {
        if self.name_to_id.contains_key(&def.name) {
            return Err(RegistryError::DuplicateName(def.name));
        }
        if self.defs.len() > u16::MAX as usize {
            return Err(RegistryError::RegistryFull);
        }
        def.light_emission = def.light_emission.min(BlockData::MAX_LIGHT);

        let id = BlockId(self.defs.len() as u16);
        self.name_to_id.insert(def.name.clone(), id);
        self.defs.push(def);
        Ok(id)
    }

    /// Definition for `id`, or `None` if it was never registered.
    pub fn lookup(&self, id: BlockId) -> Option<&BlockDef> {
        self.defs.get(id.0 as usize)
    }

    /// Definition for `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not produced by this registry.
    pub fn get(&self, id: BlockId) -> &BlockDef {
        &self.defs[id.0 as usize]
    }

    /// Id of the named block.
    pub fn lookup_by_name(&self, name: &str) -> Option<BlockId> {
        self.name_to_id.get(name).copied()
    }

    /// Id of the named block, as an error when missing.
    pub fn require(&self, name: &str) -> Result<BlockId, RegistryError> {
        self.lookup_by_name(name)
            .ok_or_else(|| RegistryError::UnknownName(name.to_string()))
    }

    /// `true` if light passes through `id`. Unknown ids count as transparent.
    pub fn is_transparent(&self, id: BlockId) -> bool {
        self.lookup(id).is_none_or(|def| def.transparent)
    }

    /// `true` if `id` blocks light.
    pub fn is_opaque(&self, id: BlockId) -> bool {
        !self.is_transparent(id)
    }

    /// Light emitted by `id`; 0 for unknown ids.
    pub fn emission(&self, id: BlockId) -> u8 {
        self.lookup(id).map_or(0, |def| def.light_emission)
    }

    /// Number of registered types, including air.
    pub fn len(&self) -> usize {
        self.defs.len()
    }

    /// `true` if only air is registered.
    pub fn is_empty(&self) -> bool {
        self.defs.len() <= 1
    }
}

impl Default for BlockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
