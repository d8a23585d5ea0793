//! Multi-octave fractal Brownian motion (fBm) heightmap sampler.
//!
//! Composites octaves of simplex noise so terrain has features at several
//! spatial frequencies.

use noise::{NoiseFn, Simplex};

/// Configuration for the fBm surface height.
#[derive(Clone, Debug)]
pub struct HeightmapParams {
    /// World seed.
    pub seed: u64,
    /// Number of noise octaves to composite.
    pub octaves: u32,
    /// Frequency multiplier between successive octaves.
    pub lacunarity: f64,
    /// Amplitude multiplier between successive octaves.
    pub persistence: f64,
    /// Frequency of the first octave, in cycles per block.
    pub base_frequency: f64,
    /// Amplitude of the first octave, in blocks.
    pub amplitude: f64,
}

impl Default for HeightmapParams {
    fn default() -> Self {
        Self {
            seed: 0,
            octaves: 4,
            lacunarity: 2.0,
            persistence: 0.5,
            base_frequency: 0.01,
            amplitude: 16.0,
        }
    }
}

/// Samples surface height offsets with fBm over simplex noise.
pub struct HeightmapSampler {
    noise: Simplex,
    params: HeightmapParams,
}

impl HeightmapSampler {
    /// Creates a sampler with the given parameters.
    pub fn new(params: HeightmapParams) -> Self {
        let noise = Simplex::new(params.seed as u32);
        Self { noise, params }
    }

    /// Height offset at world column `(x, z)`, in blocks.
    ///
    /// The result lies within `±max_amplitude()`.
    pub fn sample(&self, x: f64, z: f64) -> f64 {
        let mut total = 0.0;
        let mut frequency = self.params.base_frequency;
        let mut amplitude = self.params.amplitude;

        for _ in 0..self.params.octaves {
            total += self.noise.get([x * frequency, z * frequency]) * amplitude;
            frequency *= self.params.lacunarity;
            amplitude *= self.params.persistence;
        }

        total
    }

    /// Geometric sum of all octave amplitudes.
    pub fn max_amplitude(&self) -> f64 {
        let mut sum = 0.0;
        let mut amp = self.params.amplitude;
        for _ in 0..self.params.octaves {
            sum += amp;
            amp *= self.params.persistence;
        }
        sum
    }

    /// The sampler's parameters.
    pub fn params(&self) -> &HeightmapParams {
        &self.params
    }
}
