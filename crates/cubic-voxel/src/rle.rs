//! Run-length encoding of packed block cells.
//!
//! Terrain chunks are dominated by long runs (air above, stone below), so the
//! chunk wire format stores dense grids as `(count, value)` runs.

/// `count` consecutive cells holding `value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RleRun {
    /// Run length (1..=65535).
    pub count: u16,
    /// Raw [`BlockData`](crate::BlockData) value.
    pub value: u32,
}

/// Encoded size of one run in bytes.
pub const RUN_BYTES: usize = 6;

/// Errors raised while decoding runs.
#[derive(Debug, thiserror::Error)]
pub enum RleError {
    /// Decoded length does not match the expected cell count.
    #[error("RLE length mismatch: expected {expected}, got {actual}")]
    LengthMismatch {
        /// Expected number of cells.
        expected: usize,
        /// Number of cells the runs expand to.
        actual: usize,
    },
    /// Fewer bytes than `run_count` runs require.
    #[error("RLE data truncated: {run_count} runs need {needed} bytes, got {actual}")]
    Truncated {
        /// Declared number of runs.
        run_count: usize,
        /// Bytes required.
        needed: usize,
        /// Bytes available.
        actual: usize,
    },
}

/// Encodes values into runs. Runs are capped at `u16::MAX`.
pub fn rle_encode(values: impl IntoIterator<Item = u32>) -> Vec<RleRun> {
    let mut runs: Vec<RleRun> = Vec::new();
    for value in values {
        match runs.last_mut() {
            Some(run) if run.value == value && run.count < u16::MAX => run.count += 1,
            _ => runs.push(RleRun { count: 1, value }),
        }
    }
    runs
}

/// Expands runs, failing unless they cover exactly `expected_len` cells.
pub fn rle_decode(runs: &[RleRun], expected_len: usize) -> Result<Vec<u32>, RleError> {
    let actual: usize = runs.iter().map(|r| r.count as usize).sum();
    if actual != expected_len {
        return Err(RleError::LengthMismatch {
            expected: expected_len,
            actual,
        });
    }
    let mut out = Vec::with_capacity(expected_len);
    for run in runs {
        out.extend(std::iter::repeat_n(run.value, run.count as usize));
    }
    Ok(out)
}

/// Writes runs as `count: u16 LE` + `value: u32 LE`.
pub fn rle_to_bytes(runs: &[RleRun], buf: &mut Vec<u8>) {
    buf.reserve(runs.len() * RUN_BYTES);
    for run in runs {
        buf.extend_from_slice(&run.count.to_le_bytes());
        buf.extend_from_slice(&run.value.to_le_bytes());
    }
}

/// Reads `run_count` runs from the front of `data`.
pub fn rle_from_bytes(data: &[u8], run_count: usize) -> Result<Vec<RleRun>, RleError> {
    let needed = run_count * RUN_BYTES;
    if data.len() < needed {
        return Err(RleError::Truncated {
            run_count,
            needed,
            actual: data.len(),
        });
    }
    Ok(data[..needed]
        .chunks_exact(RUN_BYTES)
        .map(|b| RleRun {
            count: u16::from_le_bytes([b[0], b[1]]),
            value: u32::from_le_bytes([b[2], b[3], b[4], b[5]]),
        })
        .collect())
}
