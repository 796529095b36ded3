//! Benchmarks for the oscilloscope render loop.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use phobz_scope::audio::{LissajousSource, SignalSource};
use phobz_scope::gpu::OffscreenSurface;
use phobz_scope::scope::{DrawMode, ScopeParams, ScopeRenderer};

fn create_renderer(size: u32) -> Option<ScopeRenderer<OffscreenSurface>> {
    match pollster::block_on(ScopeRenderer::headless(size)) {
        Ok(r) => Some(r),
        Err(e) => {
            eprintln!("Skipping GPU benchmarks: {}", e);
            None
        }
    }
}

fn bench_fft_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("Scope Render");

    let Some(mut renderer) = create_renderer(512) else {
        return;
    };
    let mut source = LissajousSource::default();

    for fft_size in [256u32, 2048, 16384] {
        for mode in [DrawMode::Points, DrawMode::LineStrip] {
            let params = ScopeParams {
                fft_size,
                draw_mode: mode,
                ..Default::default()
            };
            if renderer.reconfigure(params).is_err() {
                continue;
            }

            let mut left = vec![0.0f32; fft_size as usize];
            let mut right = vec![0.0f32; fft_size as usize];
            let mut time = 0.0;

            group.bench_function(BenchmarkId::new(format!("{:?}", mode), fft_size), |b| {
                b.iter(|| {
                    time += 1.0 / 60.0;
                    source.fill(time, &mut left, &mut right);
                    black_box(renderer.render(time, &left, &right)).ok();
                });
            });
        }
    }

    group.finish();
}

fn bench_readback(c: &mut Criterion) {
    let mut group = c.benchmark_group("Readback");

    for size in [256u32, 512, 1024] {
        let Some(mut renderer) = create_renderer(size) else {
            continue;
        };
        if renderer.reconfigure(ScopeParams::default()).is_err() {
            continue;
        }
        let left = vec![0.0f32; 256];
        let right = vec![0.0f32; 256];

        group.bench_with_input(BenchmarkId::new("render_and_read", size), &size, |b, _| {
            b.iter(|| {
                renderer.render(0.0, &left, &right).ok();
                black_box(renderer.read_pixels().ok());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fft_sizes, bench_readback);
criterion_main!(benches);
