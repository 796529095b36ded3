//! Integration tests for signal sources and clip loading.

use phobz_scope::audio::synth::{generate_lissajous_clip, generate_sine};
use phobz_scope::audio::{
    load_audio, AudioData, AudioError, ClipSource, IdleNoise, LissajousSource, SignalSource,
};
use phobz_scope::scope::check_samples;
use phobz_scope::scope::Channel;
use std::io::Write;

/// Write 16-bit PCM WAV data.
fn write_wav(path: &std::path::Path, samples: &[f32], sample_rate: u32, channels: u16) {
    let mut file = std::fs::File::create(path).unwrap();

    let data_size = (samples.len() * 2) as u32;
    let block_align = channels * 2;
    let byte_rate = sample_rate * block_align as u32;

    file.write_all(b"RIFF").unwrap();
    file.write_all(&(36 + data_size).to_le_bytes()).unwrap();
    file.write_all(b"WAVE").unwrap();

    file.write_all(b"fmt ").unwrap();
    file.write_all(&16u32.to_le_bytes()).unwrap();
    file.write_all(&1u16.to_le_bytes()).unwrap(); // PCM
    file.write_all(&channels.to_le_bytes()).unwrap();
    file.write_all(&sample_rate.to_le_bytes()).unwrap();
    file.write_all(&byte_rate.to_le_bytes()).unwrap();
    file.write_all(&block_align.to_le_bytes()).unwrap();
    file.write_all(&16u16.to_le_bytes()).unwrap();

    file.write_all(b"data").unwrap();
    file.write_all(&data_size.to_le_bytes()).unwrap();
    for &sample in samples {
        let int_sample = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
        file.write_all(&int_sample.to_le_bytes()).unwrap();
    }
}

fn assert_scope_ready(left: &[f32], right: &[f32], fft_size: usize) {
    check_samples(Channel::Left, left, fft_size).unwrap();
    check_samples(Channel::Right, right, fft_size).unwrap();
}

#[test]
fn test_every_source_fills_valid_frames() {
    let clip = generate_lissajous_clip(110.0, 165.0, 0.3, 8000, 0.5);
    let mut sources: Vec<Box<dyn SignalSource>> = vec![
        Box::new(IdleNoise::new(9)),
        Box::new(LissajousSource::default()),
        Box::new(ClipSource::new(clip)),
    ];

    for fft_size in [1, 4, 256, 1000] {
        let mut left = vec![0.0; fft_size];
        let mut right = vec![0.0; fft_size];
        for source in sources.iter_mut() {
            for frame in 0..10 {
                source.fill(frame as f64 / 30.0, &mut left, &mut right);
                assert_scope_ready(&left, &right, fft_size);
            }
        }
    }
}

#[test]
fn test_loud_clip_is_clamped() {
    let samples: Vec<f32> = generate_sine(50.0, 1000, 0.2, 1.0)
        .into_iter()
        .flat_map(|s| [s * 3.0, -s * 3.0])
        .collect();
    let mut source = ClipSource::new(AudioData {
        samples,
        sample_rate: 1000,
        channels: 2,
    });

    let mut left = vec![0.0; 64];
    let mut right = vec![0.0; 64];
    source.fill(0.0, &mut left, &mut right);
    assert_scope_ready(&left, &right, 64);
    assert!(left.iter().any(|&v| v == 1.0));
}

#[test]
fn test_wav_clip_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clip.wav");

    let clip = generate_lissajous_clip(200.0, 300.0, 0.0, 8000, 0.25);
    write_wav(&path, &clip.samples, clip.sample_rate, 2);

    let loaded = load_audio(&path).unwrap();
    assert_eq!(loaded.sample_rate, 8000);
    assert_eq!(loaded.channels, 2);
    assert_eq!(loaded.num_frames(), clip.num_frames());

    let mut source = ClipSource::new(loaded);
    let mut left = vec![0.0; 32];
    let mut right = vec![0.0; 32];
    source.fill(0.1, &mut left, &mut right);

    let start = 800;
    for i in 0..32 {
        let expected_left = clip.samples[(start + i) * 2];
        let expected_right = clip.samples[(start + i) * 2 + 1];
        assert!((left[i] - expected_left).abs() < 1e-3);
        assert!((right[i] - expected_right).abs() < 1e-3);
    }
}

#[test]
fn test_mono_wav_drives_both_axes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mono.wav");
    write_wav(&path, &generate_sine(100.0, 8000, 0.1, 0.5), 8000, 1);

    let mut source = ClipSource::new(load_audio(&path).unwrap());
    let mut left = vec![0.0; 128];
    let mut right = vec![0.0; 128];
    source.fill(0.0, &mut left, &mut right);
    assert_eq!(left, right);
    assert!(left.iter().any(|&v| v != 0.0));
}

#[test]
fn test_load_garbage_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("noise.wav");
    std::fs::write(&path, b"definitely not audio").unwrap();

    let err = load_audio(&path).unwrap_err();
    assert!(matches!(err, AudioError::DecodeError(_)));
}
