//! Packed per-cell block data.
//!
//! Every cell of a chunk stores a [`BlockData`]: the block id plus two 4-bit
//! light channels, packed into a single `u32`.

use serde::{Deserialize, Serialize};

/// Catalog identifier of a block type. `BlockId(0)` is always air.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub u16);

impl BlockId {
    /// The air block.
    pub const AIR: Self = Self(0);

    /// Returns `true` for air.
    pub fn is_air(self) -> bool {
        self.0 == 0
    }
}

/// Which of the two light channels an operation targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LightChannel {
    /// Light emitted by blocks such as torches and glowstone.
    Block,
    /// Sunlight entering from above.
    Sky,
}

impl LightChannel {
    /// Both channels, block first.
    pub const ALL: [LightChannel; 2] = [LightChannel::Block, LightChannel::Sky];
}

const ID_MASK: u32 = 0x0000_FFFF;
const BLOCK_LIGHT_SHIFT: u32 = 16;
const SKY_LIGHT_SHIFT: u32 = 20;
const NIBBLE: u32 = 0xF;

/// One cell of a chunk: bits 0..16 block id, 16..20 block light, 20..24 sky light.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockData(u32);

impl BlockData {
    /// Unlit air.
    pub const AIR: Self = Self(0);

    /// Highest level either light channel can hold.
    pub const MAX_LIGHT: u8 = 15;

    /// Unlit cell of the given block.
    pub const fn new(id: BlockId) -> Self {
        Self(id.0 as u32)
    }

    /// Reinterprets a raw packed value. Bits above 24 are discarded.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw & 0x00FF_FFFF)
    }

    /// The raw packed value.
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Block id of this cell.
    pub fn id(self) -> BlockId {
        BlockId((self.0 & ID_MASK) as u16)
    }

    /// `true` when the cell holds air.
    pub fn is_air(self) -> bool {
        self.0 & ID_MASK == 0
    }

    /// Block light level (0..=15).
    pub fn block_light(self) -> u8 {
        ((self.0 >> BLOCK_LIGHT_SHIFT) & NIBBLE) as u8
    }

    /// Sky light level (0..=15).
    pub fn sky_light(self) -> u8 {
        ((self.0 >> SKY_LIGHT_SHIFT) & NIBBLE) as u8
    }

    /// Level of the given channel.
    pub fn light(self, channel: LightChannel) -> u8 {
        match channel {
            LightChannel::Block => self.block_light(),
            LightChannel::Sky => self.sky_light(),
        }
    }

    /// Same cell with a different block id; light is kept.
    #[must_use]
    pub fn with_id(self, id: BlockId) -> Self {
        Self((self.0 & !ID_MASK) | id.0 as u32)
    }

    /// Same cell with the block light replaced. Levels above 15 are clamped.
    #[must_use]
    pub fn with_block_light(self, level: u8) -> Self {
        self.with_nibble(BLOCK_LIGHT_SHIFT, level)
    }

    /// Same cell with the sky light replaced. Levels above 15 are clamped.
    #[must_use]
    pub fn with_sky_light(self, level: u8) -> Self {
        self.with_nibble(SKY_LIGHT_SHIFT, level)
    }

    /// Same cell with the given channel replaced.
    #[must_use]
    pub fn with_light(self, channel: LightChannel, level: u8) -> Self {
        match channel {
            LightChannel::Block => self.with_block_light(level),
            LightChannel::Sky => self.with_sky_light(level),
        }
    }

    /// Same block with both channels dark.
    #[must_use]
    pub fn unlit(self) -> Self {
        Self(self.0 & ID_MASK)
    }

    fn with_nibble(self, shift: u32, level: u8) -> Self {
        debug_assert!(level <= Self::MAX_LIGHT, "light level {level} out of range");
        let level = level.min(Self::MAX_LIGHT) as u32;
        Self((self.0 & !(NIBBLE << shift)) | (level << shift))
    }
}

impl From<BlockId> for BlockData {
    fn from(id: BlockId) -> Self {
        Self::new(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unlit_air() {
        let cell = BlockData::default();
        assert!(cell.is_air());
        assert_eq!(cell.block_light(), 0);
        assert_eq!(cell.sky_light(), 0);
        assert_eq!(cell, BlockData::AIR);
    }

    #[test]
    fn test_channels_are_independent() {
        let cell = BlockData::new(BlockId(42))
            .with_block_light(9)
            .with_sky_light(3);
        assert_eq!(cell.id(), BlockId(42));
        assert_eq!(cell.block_light(), 9);
        assert_eq!(cell.sky_light(), 3);

        let cell = cell.with_block_light(0);
        assert_eq!(cell.block_light(), 0);
        assert_eq!(cell.sky_light(), 3);
        assert_eq!(cell.id(), BlockId(42));
    }

    #[test]
    fn test_with_id_keeps_light() {
        let cell = BlockData::AIR.with_sky_light(15).with_id(BlockId(7));
        assert_eq!(cell.id(), BlockId(7));
        assert_eq!(cell.sky_light(), 15);
    }

    #[test]
    fn test_max_block_id_does_not_bleed_into_light() {
        let cell = BlockData::new(BlockId(u16::MAX));
        assert_eq!(cell.block_light(), 0);
        assert_eq!(cell.sky_light(), 0);
        assert!(!cell.is_air());
    }

    #[test]
    fn test_unlit_strips_both_channels() {
        let cell = BlockData::new(BlockId(3)).with_light(LightChannel::Sky, 12);
        assert_eq!(cell.unlit(), BlockData::new(BlockId(3)));
    }

    #[test]
    fn test_from_raw_masks_high_bits() {
        let cell = BlockData::from_raw(0xFF00_0001);
        assert_eq!(cell.raw(), 1);
    }
}
