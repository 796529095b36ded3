//! Render loop driver for the XY oscilloscope.
//!
//! [`ScopeRenderer`] owns every GPU resource of the visualization: the two
//! shader programs, the sample and quad buffers with their vertex layouts,
//! the frame compositor and the visible surface. It moves from unconfigured
//! to configured on the first [`reconfigure`](ScopeRenderer::reconfigure);
//! [`render`](ScopeRenderer::render) additionally needs a prior
//! [`resize`](ScopeRenderer::resize).
//!
//! The left channel drives X and the right channel drives Y.

mod params;

pub use params::{
    ChannelLayout, DrawMode, ScopeParams, ValidationError, CHANNEL_ALIGNMENT, MAX_FFT_SIZE,
};

use std::fmt;

use wgpu::{BlendState, BufferUsages, PrimitiveTopology, RenderPipeline};

use crate::gpu::buffer::{BufferError, GpuBuffer};
use crate::gpu::compositor::{CompositeError, DrawPass, FrameCompositor, FRAMEBUFFER_FORMAT};
use crate::gpu::context::{GpuContext, GpuError};
use crate::gpu::program::{ProgramError, ShaderProgram};
use crate::gpu::shaders::{ShaderLibrary, FADE_FS, FADE_VS, POINT_FS, POINT_VS};
use crate::gpu::surface::{OffscreenSurface, ScopeSurface, SurfaceError};
use crate::gpu::textures::{ReadbackBuffer, ReadbackError};
use crate::gpu::vertex_layout::{ComponentType, LayoutError, VertexAttributeSpec, VertexLayout};

const POINT_UNIFORMS: [&str; 6] = [
    "point_color",
    "point_size",
    "flip_x",
    "flip_y",
    "viewport_size",
    "point_mode",
];
const FADE_UNIFORMS: [&str; 1] = ["fade_rate"];
const UNIFORM_BLOCK: (&str, u32) = ("params", 0);

/// Full-viewport triangle strip, interleaved `pos.xy, uv.xy`.
///
/// UVs put v = 0 at the top, matching wgpu's texture origin.
#[rustfmt::skip]
const QUAD_VERTICES: [f32; 16] = [
    -1.0,  1.0, 0.0, 0.0,
     1.0,  1.0, 1.0, 0.0,
    -1.0, -1.0, 0.0, 1.0,
     1.0, -1.0, 1.0, 1.0,
];
const QUAD_STRIDE: u64 = 16;

/// Which half of a sample frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Left,
    Right,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Left => write!(f, "left"),
            Channel::Right => write!(f, "right"),
        }
    }
}

/// Errors raised by [`ScopeRenderer`].
#[derive(Debug, thiserror::Error)]
pub enum ScopeError {
    #[error("Invalid parameters: {0}")]
    Validation(#[from] ValidationError),
    #[error("Renderer has not been configured")]
    NotConfigured,
    #[error("Renderer has not been sized")]
    NotSized,
    #[error("{channel} channel has {actual} samples, expected {expected}")]
    SampleLength {
        channel: Channel,
        expected: usize,
        actual: usize,
    },
    #[error("{channel} channel sample {index} is {value}, outside [-1, 1]")]
    SampleRange {
        channel: Channel,
        index: usize,
        value: f32,
    },
    #[error("GPU error: {0}")]
    Gpu(#[from] GpuError),
    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),
    #[error("Program error: {0}")]
    Program(#[from] ProgramError),
    #[error("Vertex layout error: {0}")]
    Layout(#[from] LayoutError),
    #[error("Surface error: {0}")]
    Surface(#[from] SurfaceError),
    #[error("Compositor error: {0}")]
    Composite(#[from] CompositeError),
    #[error("Readback error: {0}")]
    Readback(#[from] ReadbackError),
}

/// Check one channel of a sample frame.
pub fn check_samples(channel: Channel, samples: &[f32], expected: usize) -> Result<(), ScopeError> {
    if samples.len() != expected {
        return Err(ScopeError::SampleLength {
            channel,
            expected,
            actual: samples.len(),
        });
    }
    match samples
        .iter()
        .position(|v| !(v.is_finite() && (-1.0..=1.0).contains(v)))
    {
        Some(index) => Err(ScopeError::SampleRange {
            channel,
            index,
            value: samples[index],
        }),
        None => Ok(()),
    }
}

/// Point pass state built by `reconfigure`.
struct PointPass {
    params: ScopeParams,
    channels: ChannelLayout,
    layout: VertexLayout,
    pipeline: RenderPipeline,
}

/// Drives the oscilloscope on a surface.
pub struct ScopeRenderer<S: ScopeSurface> {
    ctx: GpuContext,
    surface: S,
    point_program: ShaderProgram,
    fade_program: ShaderProgram,
    samples: GpuBuffer,
    // Source of quad_layout
    _quad: GpuBuffer,
    quad_layout: VertexLayout,
    fade_pipeline: RenderPipeline,
    compositor: FrameCompositor,
    point_pass: Option<PointPass>,
}

impl<S: ScopeSurface> ScopeRenderer<S> {
    /// Compile the programs and allocate static resources.
    pub fn init(ctx: GpuContext, surface: S) -> Result<Self, ScopeError> {
        Self::init_with_library(ctx, surface, &ShaderLibrary::builtin())
    }

    /// Like [`init`](Self::init) with shader sources taken from `library`.
    pub fn init_with_library(
        ctx: GpuContext,
        surface: S,
        library: &ShaderLibrary,
    ) -> Result<Self, ScopeError> {
        let compositor = FrameCompositor::new(&ctx.device, surface.format());

        let point_program = ShaderProgram::compile(
            &ctx,
            library,
            POINT_VS,
            POINT_FS,
            &POINT_UNIFORMS,
            &[UNIFORM_BLOCK],
            &[],
        )?;
        let fade_program = ShaderProgram::compile(
            &ctx,
            library,
            FADE_VS,
            FADE_FS,
            &FADE_UNIFORMS,
            &[UNIFORM_BLOCK],
            &[compositor.feedback_layout()],
        )?;

        let mut quad = GpuBuffer::new(&ctx.device, &ctx.queue, "quad");
        quad.set_data(bytemuck::cast_slice(&QUAD_VERTICES), BufferUsages::VERTEX)?;
        let quad_layout = VertexLayout::build(
            "quad",
            &[
                (
                    "pos",
                    VertexAttributeSpec::new(&quad, 2, ComponentType::Float).stride(QUAD_STRIDE),
                ),
                (
                    "uv",
                    VertexAttributeSpec::new(&quad, 2, ComponentType::Float)
                        .stride(QUAD_STRIDE)
                        .offset(8),
                ),
            ],
        )?;
        let fade_pipeline = fade_program.build_pipeline(
            &ctx.device,
            &quad_layout,
            PrimitiveTopology::TriangleStrip,
            FRAMEBUFFER_FORMAT,
            Some(BlendState::REPLACE),
        );

        let samples = GpuBuffer::new(&ctx.device, &ctx.queue, "samples");

        Ok(Self {
            ctx,
            surface,
            point_program,
            fade_program,
            samples,
            _quad: quad,
            quad_layout,
            fade_pipeline,
            compositor,
            point_pass: None,
        })
    }

    /// Apply new drawing parameters.
    ///
    /// Nothing is changed when validation fails. Otherwise the sample buffer
    /// is reallocated, the point layout and pipeline rebuilt, all uniforms
    /// written and the off-screen target cleared.
    pub fn reconfigure(&mut self, params: ScopeParams) -> Result<(), ScopeError> {
        params.validate()?;
        self.point_pass = None;

        let channels = ChannelLayout::for_fft_size(params.fft_size);
        self.samples
            .allocate(channels.total_size, BufferUsages::VERTEX)?;

        let divisor = params.draw_mode.instance_divisor();
        let layout = VertexLayout::build(
            "points",
            &[
                (
                    "x",
                    VertexAttributeSpec::new(&self.samples, 1, ComponentType::Float)
                        .divisor(divisor),
                ),
                (
                    "y",
                    VertexAttributeSpec::new(&self.samples, 1, ComponentType::Float)
                        .offset(channels.right_offset)
                        .divisor(divisor),
                ),
            ],
        )?;
        let pipeline = self.point_program.build_pipeline(
            &self.ctx.device,
            &layout,
            params.draw_mode.topology(),
            FRAMEBUFFER_FORMAT,
            Some(BlendState::REPLACE),
        );

        self.point_program.set_uniform("point_size", params.point_size)?;
        self.point_program.set_uniform("point_color", params.point_color)?;
        self.point_program.set_uniform("flip_x", params.flip_x)?;
        self.point_program.set_uniform("flip_y", params.flip_y)?;
        self.point_program
            .set_uniform("point_mode", params.draw_mode.point_mode())?;
        self.fade_program.set_uniform("fade_rate", params.fade_rate)?;

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("reconfigure_encoder"),
            });
        self.compositor.clear(&mut encoder);
        self.ctx.queue.submit(std::iter::once(encoder.finish()));

        log::debug!(
            "Reconfigured scope: fft_size={} mode={:?} fade_rate={}",
            params.fft_size,
            params.draw_mode,
            params.fade_rate
        );

        self.point_pass = Some(PointPass {
            params,
            channels,
            layout,
            pipeline,
        });
        Ok(())
    }

    /// Resize the visible surface and feedback textures to `size x size`.
    pub fn resize(&mut self, size: u32) -> Result<(), ScopeError> {
        if size == 0 {
            return Err(ValidationError::ViewportSize.into());
        }
        let limit = self.ctx.device.limits().max_texture_dimension_2d;
        if size > limit {
            return Err(ValidationError::ViewportTooLarge { size, limit }.into());
        }
        self.surface.resize(&self.ctx.device, size);
        self.compositor.resize(&self.ctx.device, size);
        self.point_program.set_uniform("viewport_size", size as f32)?;
        log::debug!("Resized scope to {}x{}", size, size);
        Ok(())
    }

    /// Draw one frame from a pair of channels and present it.
    pub fn render(
        &mut self,
        timestamp_seconds: f64,
        left: &[f32],
        right: &[f32],
    ) -> Result<(), ScopeError> {
        let point_pass = self.point_pass.as_ref().ok_or(ScopeError::NotConfigured)?;
        if self.compositor.size().is_none() {
            return Err(ScopeError::NotSized);
        }

        let fft_size = point_pass.params.fft_size;
        check_samples(Channel::Left, left, fft_size as usize)?;
        check_samples(Channel::Right, right, fft_size as usize)?;

        self.samples.set_sub_data(bytemuck::cast_slice(left), 0)?;
        self.samples
            .set_sub_data(bytemuck::cast_slice(right), point_pass.channels.right_offset)?;

        let frame = self.surface.acquire()?;
        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("scope_frame_encoder"),
            });

        let (vertices, instances) = match point_pass.params.draw_mode {
            DrawMode::Points => (0..4, 0..fft_size),
            DrawMode::LineStrip => (0..fft_size, 0..1),
        };
        let point = DrawPass {
            program: &self.point_program,
            layout: &point_pass.layout,
            pipeline: &point_pass.pipeline,
            vertices,
            instances,
        };
        let fade = DrawPass {
            program: &self.fade_program,
            layout: &self.quad_layout,
            pipeline: &self.fade_pipeline,
            vertices: 0..4,
            instances: 0..1,
        };
        self.compositor
            .composite(&self.ctx.device, &mut encoder, &point, &fade, &frame)?;

        self.ctx.queue.submit(std::iter::once(encoder.finish()));
        frame.present();

        log::trace!("Rendered frame at {:.3}s", timestamp_seconds);
        Ok(())
    }

    /// Current parameters, `None` before the first `reconfigure`.
    pub fn params(&self) -> Option<&ScopeParams> {
        self.point_pass.as_ref().map(|p| &p.params)
    }

    pub fn channel_layout(&self) -> Option<ChannelLayout> {
        self.point_pass.as_ref().map(|p| p.channels)
    }

    /// Current viewport edge length, `None` before the first `resize`.
    pub fn size(&self) -> Option<u32> {
        self.compositor.size()
    }

    pub fn context(&self) -> &GpuContext {
        &self.ctx
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }
}

impl ScopeRenderer<OffscreenSurface> {
    /// Create a renderer on a headless GPU context, sized `size x size`.
    pub async fn headless(size: u32) -> Result<Self, ScopeError> {
        let ctx = GpuContext::new().await?;
        let mut renderer = Self::init(ctx, OffscreenSurface::default())?;
        renderer.resize(size)?;
        Ok(renderer)
    }

    /// Read the last presented frame as tightly packed RGBA bytes.
    pub fn read_pixels(&self) -> Result<Vec<u8>, ScopeError> {
        let texture = self.surface.texture().ok_or(ScopeError::NotSized)?;
        let readback = ReadbackBuffer::new(&self.ctx.device, texture.width(), texture.height());

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback_encoder"),
            });
        readback.copy_from(&mut encoder, texture);
        self.ctx.queue.submit(std::iter::once(encoder.finish()));

        Ok(readback.read_pixels(&self.ctx.device)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_samples_length() {
        let err = check_samples(Channel::Right, &[0.0; 3], 4).unwrap_err();
        assert!(matches!(
            err,
            ScopeError::SampleLength {
                channel: Channel::Right,
                expected: 4,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_check_samples_range() {
        assert!(check_samples(Channel::Left, &[1.0, -1.0, 0.0, 0.5], 4).is_ok());

        let err = check_samples(Channel::Left, &[0.0, 1.5], 2).unwrap_err();
        assert!(matches!(err, ScopeError::SampleRange { index: 1, .. }));

        let err = check_samples(Channel::Left, &[f32::NAN], 1).unwrap_err();
        assert!(matches!(err, ScopeError::SampleRange { index: 0, .. }));
    }

    #[test]
    fn test_quad_covers_viewport() {
        let corners: Vec<_> = QUAD_VERTICES.chunks(4).map(|v| (v[0], v[1])).collect();
        assert_eq!(
            corners,
            [(-1.0, 1.0), (1.0, 1.0), (-1.0, -1.0), (1.0, -1.0)]
        );
        // Top-left of clip space samples the top-left texel
        assert_eq!(&QUAD_VERTICES[2..4], &[0.0, 0.0]);
    }

    #[tokio::test]
    async fn test_render_requires_configuration() {
        let mut renderer = match ScopeRenderer::headless(16).await {
            Ok(renderer) => renderer,
            Err(_) => return,
        };

        assert!(renderer.params().is_none());
        assert!(matches!(
            renderer.render(0.0, &[0.0; 4], &[0.0; 4]),
            Err(ScopeError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn test_render_requires_size() {
        let ctx = match GpuContext::new().await {
            Ok(ctx) => ctx,
            Err(_) => return,
        };

        let mut renderer = ScopeRenderer::init(ctx, OffscreenSurface::default()).unwrap();
        renderer
            .reconfigure(ScopeParams {
                fft_size: 4,
                ..Default::default()
            })
            .unwrap();
        assert!(matches!(
            renderer.render(0.0, &[0.0; 4], &[0.0; 4]),
            Err(ScopeError::NotSized)
        ));
        assert!(matches!(
            renderer.resize(0),
            Err(ScopeError::Validation(ValidationError::ViewportSize))
        ));
    }
}
