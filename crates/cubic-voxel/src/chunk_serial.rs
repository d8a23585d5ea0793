//! Binary serialization for [`ChunkData`].
//!
//! The CBCK format carries one chunk's cell grid plus the lifecycle state it
//! was saved in. It is what the world's chunk storage writes to disk.
//!
//! ## Binary Layout
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 4 | Magic bytes `"CBCK"` |
//! | 4 | 1 | Format version (`u8`, currently 1) |
//! | 5 | 2 | Saved state bits (`u16`, little-endian) |
//! | 7 | 1 | Encoding: `0` uniform, `1` run-length |
//! | 8 | 4 | Uniform: the single cell value (`u32` LE) |
//! | 8 | 4 + R×6 | RLE: run count (`u32` LE), then R × (`u16` count, `u32` value) |
//!
//! Cells are ordered x fastest, then y, then z.

use crate::block::BlockData;
use crate::chunk::{CHUNK_VOLUME, ChunkData};
use crate::rle::{self, RleError};

/// Magic bytes identifying the CBCK format.
const MAGIC: [u8; 4] = *b"CBCK";

/// Current format version.
const FORMAT_VERSION: u8 = 1;

const ENCODING_UNIFORM: u8 = 0;
const ENCODING_RLE: u8 = 1;

const HEADER_LEN: usize = 8;

/// Errors raised while decoding a chunk.
#[derive(Debug, thiserror::Error)]
pub enum ChunkSerError {
    /// The data does not start with `CBCK`.
    #[error("invalid magic bytes")]
    InvalidMagic,
    /// The format version is not supported.
    #[error("unsupported format version: {0}")]
    UnsupportedVersion(u8),
    /// The data is shorter than its header declares.
    #[error("data truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Minimum expected byte count.
        expected: usize,
        /// Actual byte count.
        actual: usize,
    },
    /// Unknown encoding byte.
    #[error("invalid encoding: {0}")]
    InvalidEncoding(u8),
    /// The saved state bits do not name a stable lifecycle state.
    #[error("invalid stored state: {0:#06x}")]
    InvalidState(u16),
    /// The run-length payload is malformed.
    #[error(transparent)]
    Rle(#[from] RleError),
}

impl ChunkData {
    /// Serializes the grid together with `state` (a lifecycle state's bit value).
    pub fn serialize_with_state(&self, state: u16) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + 4);
        buf.extend_from_slice(&MAGIC);
        buf.push(FORMAT_VERSION);
        buf.extend_from_slice(&state.to_le_bytes());

        match self {
            ChunkData::Uniform(value) => {
                buf.push(ENCODING_UNIFORM);
                buf.extend_from_slice(&value.raw().to_le_bytes());
            }
            ChunkData::Dense(cells) => {
                let runs = rle::rle_encode(cells.iter().map(|c| c.raw()));
                buf.push(ENCODING_RLE);
                buf.extend_from_slice(&(runs.len() as u32).to_le_bytes());
                rle::rle_to_bytes(&runs, &mut buf);
            }
        }
        buf
    }

    /// Decodes a grid and its saved state bits.
    ///
    /// The state is returned raw; the caller validates it against its own
    /// lifecycle enum.
    pub fn deserialize_with_state(data: &[u8]) -> Result<(Self, u16), ChunkSerError> {
        if data.len() < 4 || data[0..4] != MAGIC {
            return Err(ChunkSerError::InvalidMagic);
        }
        if data.len() < HEADER_LEN {
            return Err(ChunkSerError::Truncated {
                expected: HEADER_LEN,
                actual: data.len(),
            });
        }
        let version = data[4];
        if version != FORMAT_VERSION {
            return Err(ChunkSerError::UnsupportedVersion(version));
        }
        let state = u16::from_le_bytes([data[5], data[6]]);
        let body = &data[HEADER_LEN..];

        let chunk = match data[7] {
            ENCODING_UNIFORM => {
                let raw = read_u32(body, HEADER_LEN)?;
                ChunkData::Uniform(BlockData::from_raw(raw))
            }
            ENCODING_RLE => {
                let run_count = read_u32(body, HEADER_LEN)? as usize;
                let runs = rle::rle_from_bytes(&body[4..], run_count)?;
                let cells = rle::rle_decode(&runs, CHUNK_VOLUME)?;
                let cells: Vec<BlockData> = cells.into_iter().map(BlockData::from_raw).collect();
                // rle_decode guarantees CHUNK_VOLUME entries.
                ChunkData::from_cells(&cells).ok_or(ChunkSerError::Truncated {
                    expected: CHUNK_VOLUME,
                    actual: cells.len(),
                })?
            }
            other => return Err(ChunkSerError::InvalidEncoding(other)),
        };
        Ok((chunk, state))
    }
}

fn read_u32(body: &[u8], offset: usize) -> Result<u32, ChunkSerError> {
    match body.get(..4) {
        Some(b) => Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]])),
        None => Err(ChunkSerError::Truncated {
            expected: offset + 4,
            actual: offset + body.len(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
