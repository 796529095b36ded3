//! Synthetic signal generation.
//!
//! Deterministic generators used by the idle source, the demo and tests.

use std::f32::consts::PI;

use super::loader::AudioData;

/// Linear congruential generator for reproducible noise.
#[derive(Debug, Clone)]
pub struct Lcg {
    state: u64,
}

impl Lcg {
    const A: u64 = 6364136223846793005;
    const C: u64 = 1442695040888963407;

    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Next value in `[0, 1)`.
    pub fn next_unit(&mut self) -> f32 {
        self.state = self.state.wrapping_mul(Self::A).wrapping_add(Self::C);
        // High bits have the longest period
        (self.state >> 40) as f32 / (1u64 << 24) as f32
    }

    /// Next value in `[-1, 1)`.
    pub fn next_signed(&mut self) -> f32 {
        self.next_unit() * 2.0 - 1.0
    }
}

/// Generate a sine wave.
///
/// # Arguments
/// * `frequency` - Frequency in Hz
/// * `sample_rate` - Sample rate in Hz
/// * `duration` - Duration in seconds
/// * `amplitude` - Amplitude (0.0 to 1.0)
pub fn generate_sine(frequency: f32, sample_rate: u32, duration: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = (duration * sample_rate as f32) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            amplitude * (2.0 * PI * frequency * t).sin()
        })
        .collect()
}

/// Generate white noise from a seeded [`Lcg`].
pub fn generate_white_noise(
    sample_rate: u32,
    duration: f32,
    amplitude: f32,
    seed: u64,
) -> Vec<f32> {
    let num_samples = (duration * sample_rate as f32) as usize;
    let mut rng = Lcg::new(seed);
    (0..num_samples)
        .map(|_| amplitude * rng.next_signed())
        .collect()
}

/// Generate a stereo clip of two sines, the classic Lissajous figure.
///
/// The right channel is shifted by `phase` radians.
pub fn generate_lissajous_clip(
    freq_left: f32,
    freq_right: f32,
    phase: f32,
    sample_rate: u32,
    duration: f32,
) -> AudioData {
    let left = generate_sine(freq_left, sample_rate, duration, 0.8);
    let samples = left
        .into_iter()
        .enumerate()
        .flat_map(|(i, l)| {
            let t = i as f32 / sample_rate as f32;
            let r = 0.8 * (2.0 * PI * freq_right * t + phase).sin();
            [l, r]
        })
        .collect();

    AudioData {
        samples,
        sample_rate,
        channels: 2,
    }
}
