//! Phobz Scope Core
//!
//! GPU XY oscilloscope: the left audio channel drives X, the right drives Y,
//! and every frame fades into a trail of the previous ones.
//!
//! # Features
//!
//! - Buffer, shader program and vertex layout wrappers over wgpu
//! - WGSL programs compiled and reflected with naga
//! - Copy-based feedback trail through the visible surface
//! - Headless rendering with pixel readback
//! - Signal sources: idle noise, Lissajous sines, decoded clips (Symphonia)
//! - Offline PNG sequence rendering

pub mod audio;
pub mod gpu;
pub mod pipeline;
pub mod scope;

// Re-export commonly used types
pub use audio::{load_audio, AudioData, ClipSource, IdleNoise, LissajousSource, SignalSource};
pub use gpu::{GpuContext, ShaderLibrary};
pub use pipeline::{parse_hex_color, render_frames, PipelineConfig, PipelineError};
pub use scope::{DrawMode, ScopeError, ScopeParams, ScopeRenderer, ValidationError};
