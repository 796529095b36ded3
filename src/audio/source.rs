//! Per-frame sample providers for the scope.

use std::f64::consts::TAU;

use super::loader::AudioData;
use super::synth::Lcg;

/// Chance that [`IdleNoise`] draws new values on a given frame.
pub const IDLE_REFRESH_PROBABILITY: f32 = 0.15;

/// Supplies one stereo frame of samples per rendered frame.
///
/// Both buffers have the scope's `fft_size` length. Implementations must
/// fill them with values in `[-1, 1]`.
pub trait SignalSource {
    fn fill(&mut self, timestamp_seconds: f64, left: &mut [f32], right: &mut [f32]);
}

/// Sparse random noise shown while nothing is playing.
///
/// New values are drawn on roughly 15% of frames; the rest repeat the last
/// draw, which gives the idle trail its flicker.
#[derive(Debug, Clone)]
pub struct IdleNoise {
    rng: Lcg,
    left: Vec<f32>,
    right: Vec<f32>,
}

impl IdleNoise {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Lcg::new(seed),
            left: Vec::new(),
            right: Vec::new(),
        }
    }

    fn refresh(&mut self, left_len: usize, right_len: usize) {
        self.left.resize(left_len, 0.0);
        self.right.resize(right_len, 0.0);
        for v in self.left.iter_mut().chain(self.right.iter_mut()) {
            *v = self.rng.next_signed();
        }
    }
}

impl Default for IdleNoise {
    fn default() -> Self {
        Self::new(0x5eed)
    }
}

impl SignalSource for IdleNoise {
    fn fill(&mut self, _timestamp_seconds: f64, left: &mut [f32], right: &mut [f32]) {
        let stale = self.left.len() != left.len() || self.right.len() != right.len();
        if stale || self.rng.next_unit() < IDLE_REFRESH_PROBABILITY {
            self.refresh(left.len(), right.len());
        }
        left.copy_from_slice(&self.left);
        right.copy_from_slice(&self.right);
    }
}

/// Two sines, left on X and right on Y.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LissajousSource {
    pub freq_left: f64,
    pub freq_right: f64,
    /// Phase offset of the right channel in radians.
    pub phase: f64,
    pub amplitude: f32,
    pub sample_rate: u32,
}

impl Default for LissajousSource {
    fn default() -> Self {
        Self {
            freq_left: 220.0,
            freq_right: 330.0,
            phase: std::f64::consts::FRAC_PI_2,
            amplitude: 0.8,
            sample_rate: 44100,
        }
    }
}

impl SignalSource for LissajousSource {
    fn fill(&mut self, timestamp_seconds: f64, left: &mut [f32], right: &mut [f32]) {
        let rate = self.sample_rate.max(1) as f64;
        let amplitude = self.amplitude.clamp(0.0, 1.0);
        for (i, (l, r)) in left.iter_mut().zip(right.iter_mut()).enumerate() {
            let t = timestamp_seconds + i as f64 / rate;
            *l = amplitude * (TAU * self.freq_left * t).sin() as f32;
            *r = amplitude * (TAU * self.freq_right * t + self.phase).sin() as f32;
        }
    }
}

/// Windows of a decoded clip, starting at `timestamp * sample_rate`.
#[derive(Debug, Clone)]
pub struct ClipSource {
    audio: AudioData,
}

impl ClipSource {
    pub fn new(audio: AudioData) -> Self {
        Self { audio }
    }

    pub fn audio(&self) -> &AudioData {
        &self.audio
    }

    /// First frame of the window shown at `timestamp_seconds`.
    pub fn start_frame(&self, timestamp_seconds: f64) -> usize {
        (timestamp_seconds.max(0.0) * self.audio.sample_rate as f64) as usize
    }
}

impl SignalSource for ClipSource {
    fn fill(&mut self, timestamp_seconds: f64, left: &mut [f32], right: &mut [f32]) {
        let start = self.start_frame(timestamp_seconds);
        self.audio.stereo_window(start, left, right);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::synth::generate_lissajous_clip;

    fn in_range(samples: &[f32]) -> bool {
        samples.iter().all(|v| (-1.0..=1.0).contains(v))
    }

    #[test]
    fn test_idle_noise_is_reproducible() {
        let mut a = IdleNoise::new(42);
        let mut b = IdleNoise::new(42);
        let (mut la, mut ra) = (vec![0.0; 64], vec![0.0; 64]);
        let (mut lb, mut rb) = (vec![0.0; 64], vec![0.0; 64]);
        for frame in 0..20 {
            let t = frame as f64 / 60.0;
            a.fill(t, &mut la, &mut ra);
            b.fill(t, &mut lb, &mut rb);
            assert_eq!(la, lb);
            assert_eq!(ra, rb);
            assert!(in_range(&la) && in_range(&ra));
        }
    }

    #[test]
    fn test_idle_noise_mostly_holds() {
        let mut noise = IdleNoise::new(1);
        let (mut left, mut right) = (vec![0.0; 16], vec![0.0; 16]);
        noise.fill(0.0, &mut left, &mut right);

        let mut changes = 0;
        let mut previous = left.clone();
        for frame in 1..=1000 {
            noise.fill(frame as f64, &mut left, &mut right);
            if left != previous {
                changes += 1;
                previous.copy_from_slice(&left);
            }
        }
        assert!((50..=300).contains(&changes), "{} refreshes", changes);
    }

    #[test]
    fn test_idle_noise_follows_length_change() {
        let mut noise = IdleNoise::default();
        let (mut left, mut right) = (vec![0.0; 8], vec![0.0; 8]);
        noise.fill(0.0, &mut left, &mut right);

        let (mut left, mut right) = (vec![0.0; 32], vec![0.0; 32]);
        noise.fill(0.0, &mut left, &mut right);
        assert!(left.iter().any(|&v| v != 0.0));
    }

    #[test]
    fn test_lissajous_source_phase() {
        let mut source = LissajousSource::default();
        let (mut left, mut right) = ([0.0; 4], [0.0; 4]);
        source.fill(0.0, &mut left, &mut right);
        assert!(left[0].abs() < 1e-6);
        assert!((right[0] - 0.8).abs() < 1e-6);
        assert!(in_range(&left) && in_range(&right));
    }

    #[test]
    fn test_clip_source_windows_by_timestamp() {
        let clip = generate_lissajous_clip(100.0, 150.0, 0.0, 1000, 1.0);
        let mut source = ClipSource::new(clip.clone());
        assert_eq!(source.start_frame(0.25), 250);

        let (mut left, mut right) = ([0.0; 8], [0.0; 8]);
        source.fill(0.25, &mut left, &mut right);
        assert_eq!(left[0], clip.samples[500]);
        assert_eq!(right[0], clip.samples[501]);

        // Past the end
        source.fill(5.0, &mut left, &mut right);
        assert_eq!(left, [0.0; 8]);
        assert_eq!(right, [0.0; 8]);
    }
}
