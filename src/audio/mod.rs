//! Signals that drive the scope.
//!
//! This module provides:
//! - Audio file loading via Symphonia (WAV, MP3, FLAC, AAC)
//! - Deterministic synthetic generators
//! - [`SignalSource`] implementations that fill one stereo frame at a time

pub mod loader;
pub mod source;
pub mod synth;

pub use loader::{load_audio, AudioData, AudioError};
pub use source::{ClipSource, IdleNoise, LissajousSource, SignalSource};
pub use synth::{generate_lissajous_clip, generate_sine, generate_white_noise, Lcg};
