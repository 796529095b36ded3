//! Audio clip loading using Symphonia.
//!
//! Decodes a whole file into interleaved `f32` samples so that the scope can
//! take arbitrary stereo windows of it.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use thiserror::Error;

/// Errors that can occur during audio loading.
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Failed to open audio file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to decode audio: {0}")]
    DecodeError(#[from] SymphoniaError),

    #[error("No audio track found in file")]
    NoAudioTrack,

    #[error("Unknown sample rate")]
    UnknownSampleRate,
}

/// A decoded audio clip.
#[derive(Debug, Clone)]
pub struct AudioData {
    /// Interleaved audio samples (f32, normalized to -1.0..1.0)
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: usize,
}

impl AudioData {
    /// Duration of the audio in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / (self.sample_rate as f64 * self.channels as f64)
    }

    /// Number of frames (samples per channel).
    pub fn num_frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels
    }

    /// Copy `left.len()` frames starting at `start_frame` into the two
    /// channel buffers.
    ///
    /// Mono clips feed both channels; channels past the second are ignored.
    /// Values are clamped to `[-1, 1]` and frames past the end are zero.
    pub fn stereo_window(&self, start_frame: usize, left: &mut [f32], right: &mut [f32]) {
        let frames = self.num_frames();
        let right_channel = if self.channels >= 2 { 1 } else { 0 };

        for (i, (l, r)) in left.iter_mut().zip(right.iter_mut()).enumerate() {
            let frame = start_frame.saturating_add(i);
            if frame >= frames {
                *l = 0.0;
                *r = 0.0;
                continue;
            }
            let base = frame * self.channels;
            *l = self.samples[base].clamp(-1.0, 1.0);
            *r = self.samples[base + right_channel].clamp(-1.0, 1.0);
        }
    }
}

/// Load audio from a file path.
///
/// Supports WAV, MP3, FLAC, and AAC formats. The audio is decoded to
/// interleaved f32 samples normalized to the range -1.0..1.0.
///
/// # Example
///
/// ```no_run
/// use phobz_scope::audio::loader::load_audio;
/// use std::path::Path;
///
/// let audio = load_audio(Path::new("song.flac")).unwrap();
/// println!("Duration: {:.2}s", audio.duration());
/// println!("Channels: {}", audio.channels);
/// ```
pub fn load_audio(path: &Path) -> Result<AudioData, AudioError> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(AudioError::NoAudioTrack)?;

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or(AudioError::UnknownSampleRate)?;
    let channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(2);

    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let samples = decode_track(format.as_mut(), decoder.as_mut(), track_id)?;
    log::debug!(
        "Loaded {} ({} Hz, {} channels, {} samples)",
        path.display(),
        sample_rate,
        channels,
        samples.len()
    );

    Ok(AudioData {
        samples,
        sample_rate,
        channels,
    })
}

fn decode_track(
    format: &mut dyn FormatReader,
    decoder: &mut dyn Decoder,
    track_id: u32,
) -> Result<Vec<f32>, AudioError> {
    let mut samples = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            // Corrupt packets are skipped
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(e.into()),
        };

        let buf = sample_buf.get_or_insert_with(|| {
            SampleBuffer::new(decoded.capacity() as u64, *decoded.spec())
        });
        buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buf.samples());
    }

    Ok(samples)
}
