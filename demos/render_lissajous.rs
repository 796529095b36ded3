//! Example: Render a Lissajous figure to a PNG sequence.
//!
//! Draws either two synthetic sines or, when a path is given, the opening
//! seconds of an audio file.
//!
//! Run with:
//!     cargo run --example render_lissajous --features tokio [audio-file] [config.json]

use anyhow::Context;
use phobz_scope::audio::{load_audio, ClipSource, LissajousSource};
use phobz_scope::pipeline::{render_frames, PipelineConfig};
use std::path::{Path, PathBuf};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let audio_path = args.next().map(PathBuf::from);
    let config = match args.next() {
        Some(path) => PipelineConfig::load(Path::new(&path))
            .with_context(|| format!("loading config {}", path))?,
        None => PipelineConfig {
            frames: 120,
            ..Default::default()
        },
    };

    println!("Phobz Scope - Lissajous Example");
    println!("===============================\n");
    println!("  Size: {}x{}", config.size, config.size);
    println!("  FPS: {}", config.fps);
    println!("  Frames: {}", config.frames);
    println!("  FFT size: {}\n", config.scope.fft_size);

    let output_dir = Path::new("lissajous_frames");
    let written = match audio_path {
        Some(path) => {
            let audio =
                load_audio(&path).with_context(|| format!("decoding {}", path.display()))?;
            println!(
                "Rendering {} ({:.2}s, {} channels)...",
                path.display(),
                audio.duration(),
                audio.channels
            );
            let mut source = ClipSource::new(audio);
            render_frames(&mut source, &config, output_dir).await?
        }
        None => {
            println!("Rendering synthetic 220/330 Hz figure...");
            let mut source = LissajousSource::default();
            render_frames(&mut source, &config, output_dir).await?
        }
    };

    println!("\nDone! Wrote {} frames to {}", written.len(), output_dir.display());
    println!(
        "Assemble with: ffmpeg -framerate {} -i {}/frame_%05d.png scope.mp4",
        config.fps,
        output_dir.display()
    );

    Ok(())
}
