//! Offline rendering: drive the scope headlessly and write PNG frames.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::audio::{AudioError, SignalSource};
use crate::scope::{ScopeError, ScopeParams, ScopeRenderer};

/// Pipeline configuration for rendering a PNG sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Edge length of the square output in pixels.
    pub size: u32,
    pub fps: u32,
    pub frames: u32,
    pub scope: ScopeParams,
    /// Hex colour, overrides `scope.point_color` when set.
    pub color: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            size: 512,
            fps: 60,
            frames: 60,
            scope: ScopeParams::default(),
            color: None,
        }
    }
}

impl PipelineConfig {
    /// Load a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(json: &str) -> Result<Self, PipelineError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Scope parameters with the colour override applied.
    pub fn resolved_params(&self) -> Result<ScopeParams, PipelineError> {
        let mut params = self.scope.clone();
        if let Some(hex) = &self.color {
            params.point_color =
                parse_hex_color(hex).ok_or_else(|| PipelineError::InvalidColor(hex.clone()))?;
        }
        Ok(params)
    }

    /// Timestamp of frame `index` in seconds.
    pub fn frame_time(&self, index: u32) -> f64 {
        index as f64 / self.fps.max(1) as f64
    }
}

/// Errors that can occur during pipeline execution.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Scope error: {0}")]
    Scope(#[from] ScopeError),
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("Invalid color: {0}")]
    InvalidColor(String),
    #[error("Readback of {actual} bytes does not fit a {size}x{size} frame")]
    FrameSize { size: u32, actual: usize },
}

/// Parse hex color to RGB floats (accepts 6-char RGB or 8-char RGBA, alpha is ignored).
pub fn parse_hex_color(hex: &str) -> Option<[f32; 3]> {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 && hex.len() != 8 {
        return None;
    }
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let r = u8::from_str_radix(hex.get(0..2)?, 16).ok()? as f32 / 255.0;
    let g = u8::from_str_radix(hex.get(2..4)?, 16).ok()? as f32 / 255.0;
    let b = u8::from_str_radix(hex.get(4..6)?, 16).ok()? as f32 / 255.0;
    Some([r, g, b])
}

/// File name of frame `index`.
pub fn frame_file_name(index: u32) -> String {
    format!("frame_{:05}.png", index)
}

/// Render `config.frames` frames from `source` into `out_dir`.
///
/// Returns the written paths in frame order. The directory is created if
/// missing.
pub async fn render_frames<S: SignalSource>(
    source: &mut S,
    config: &PipelineConfig,
    out_dir: &Path,
) -> Result<Vec<PathBuf>, PipelineError> {
    let params = config.resolved_params()?;
    fs::create_dir_all(out_dir)?;

    let mut renderer = ScopeRenderer::headless(config.size).await?;
    let fft_size = params.fft_size as usize;
    renderer.reconfigure(params)?;

    let mut left = vec![0.0f32; fft_size];
    let mut right = vec![0.0f32; fft_size];
    let mut written = Vec::with_capacity(config.frames as usize);

    log::info!(
        "Rendering {} frames at {}x{} into {}",
        config.frames,
        config.size,
        config.size,
        out_dir.display()
    );

    for index in 0..config.frames {
        let time = config.frame_time(index);
        source.fill(time, &mut left, &mut right);
        renderer.render(time, &left, &right)?;

        let pixels = renderer.read_pixels()?;
        let actual = pixels.len();
        let image = image::RgbaImage::from_raw(config.size, config.size, pixels).ok_or(
            PipelineError::FrameSize {
                size: config.size,
                actual,
            },
        )?;

        let path = out_dir.join(frame_file_name(index));
        image.save(&path)?;
        log::debug!("Wrote {}", path.display());
        written.push(path);
    }

    log::info!("Rendered {} frames", written.len());
    Ok(written)
}
