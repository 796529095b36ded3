//! Oscilloscope parameters and the sample buffer layout they imply.

use serde::{Deserialize, Serialize};
use wgpu::PrimitiveTopology;

/// Largest accepted `fft_size`, the Web Audio analyser maximum.
pub const MAX_FFT_SIZE: u32 = 32768;

/// Byte alignment of the right channel inside the sample buffer.
pub const CHANNEL_ALIGNMENT: u64 = 4;

const SAMPLE_BYTES: u64 = std::mem::size_of::<f32>() as u64;

/// How samples are connected on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawMode {
    /// One square of `point_size` pixels per sample pair.
    Points,
    /// Consecutive samples joined by one-pixel lines.
    LineStrip,
}

impl DrawMode {
    pub fn topology(self) -> PrimitiveTopology {
        match self {
            DrawMode::Points => PrimitiveTopology::TriangleStrip,
            DrawMode::LineStrip => PrimitiveTopology::LineStrip,
        }
    }

    /// Points are instanced quads, so samples advance per instance.
    pub fn instance_divisor(self) -> u32 {
        match self {
            DrawMode::Points => 1,
            DrawMode::LineStrip => 0,
        }
    }

    /// Value of the `point_mode` uniform.
    pub fn point_mode(self) -> f32 {
        match self {
            DrawMode::Points => 1.0,
            DrawMode::LineStrip => 0.0,
        }
    }
}

/// Rejected parameter values.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Fade rate {0} is outside (0, 1]")]
    FadeRate(f32),
    #[error("FFT size {0} is outside 1..={MAX_FFT_SIZE}")]
    FftSize(u32),
    #[error("Point size {0} must be a finite value of at least 1")]
    PointSize(f32),
    #[error("Point colour {0:?} must have finite components in [0, 1]")]
    PointColor([f32; 3]),
    #[error("Viewport size must be at least 1 pixel")]
    ViewportSize,
    #[error("Viewport size {size} exceeds the device limit of {limit} pixels")]
    ViewportTooLarge { size: u32, limit: u32 },
}

/// Drawing parameters, changed only through `reconfigure`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeParams {
    /// Samples per channel per frame.
    pub fft_size: u32,
    /// Edge length of a point in pixels.
    pub point_size: f32,
    pub point_color: [f32; 3],
    /// Fraction of the trail removed each frame, in (0, 1].
    pub fade_rate: f32,
    pub flip_x: bool,
    pub flip_y: bool,
    pub draw_mode: DrawMode,
}

impl Default for ScopeParams {
    fn default() -> Self {
        Self {
            fft_size: 256,
            point_size: 5.0,
            point_color: [1.0, 0.0, 1.0],
            fade_rate: 0.01,
            flip_x: false,
            flip_y: false,
            draw_mode: DrawMode::Points,
        }
    }
}

impl ScopeParams {
    pub fn validate(&self) -> Result<(), ValidationError> {
        // Written to reject NaN as well
        if !(self.fade_rate > 0.0 && self.fade_rate <= 1.0) {
            return Err(ValidationError::FadeRate(self.fade_rate));
        }
        if self.fft_size == 0 || self.fft_size > MAX_FFT_SIZE {
            return Err(ValidationError::FftSize(self.fft_size));
        }
        if !(self.point_size.is_finite() && self.point_size >= 1.0) {
            return Err(ValidationError::PointSize(self.point_size));
        }
        if !self
            .point_color
            .iter()
            .all(|c| c.is_finite() && (0.0..=1.0).contains(c))
        {
            return Err(ValidationError::PointColor(self.point_color));
        }
        Ok(())
    }
}

/// Byte layout of one sample frame in the vertex buffer.
///
/// Left channel at offset 0, right channel at the first aligned offset past
/// it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelLayout {
    pub fft_size: u32,
    /// Bytes per channel.
    pub half_size: u64,
    pub right_offset: u64,
    pub total_size: u64,
}

impl ChannelLayout {
    pub fn for_fft_size(fft_size: u32) -> Self {
        let half_size = fft_size as u64 * SAMPLE_BYTES;
        let right_offset = half_size.div_ceil(CHANNEL_ALIGNMENT) * CHANNEL_ALIGNMENT;
        Self {
            fft_size,
            half_size,
            right_offset,
            total_size: right_offset + half_size,
        }
    }
}
