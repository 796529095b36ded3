//! Frame compositor: the trail feedback loop.
//!
//! Each frame runs, in this order:
//!
//! 1. point pass: samples drawn over the write texture (`LoadOp::Load`),
//!    which still holds the faded composite of the previous frame;
//! 2. blit of the write texture to the visible surface, linear filtering;
//! 3. GPU copy of the visible surface into the read texture;
//! 4. fade pass: the read texture, scaled by `1 - fade_rate`, replaces the
//!    contents of the write texture.
//!
//! The trail therefore goes through the presented pixels and lags one frame
//! behind the points. Swapping the order or sampling the write texture
//! directly changes what ends up on screen.

use std::ops::Range;

use wgpu::util::{TextureBlitter, TextureBlitterBuilder};
use wgpu::{
    BindGroup, BindGroupLayout, CommandEncoder, Device, RenderPipeline, Sampler, TextureFormat,
    TextureView,
};

use super::layouts::create_feedback_layout;
use super::program::ShaderProgram;
use super::surface::SurfaceFrame;
use super::textures::RenderTarget;
use super::vertex_layout::VertexLayout;

/// Format of the off-screen write texture.
pub const FRAMEBUFFER_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;

/// Bind group index of the feedback texture and sampler in the fade pass.
pub const FEEDBACK_GROUP: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum CompositeError {
    #[error("Compositor has not been sized")]
    NotSized,
    #[error("Surface is {surface}x{surface} but the feedback textures are {feedback}x{feedback}")]
    SizeMismatch { surface: u32, feedback: u32 },
}

/// Everything needed to issue one draw.
pub struct DrawPass<'a> {
    pub program: &'a ShaderProgram,
    pub layout: &'a VertexLayout,
    pub pipeline: &'a RenderPipeline,
    pub vertices: Range<u32>,
    pub instances: Range<u32>,
}

struct FeedbackTargets {
    size: u32,
    write: RenderTarget,
    read: RenderTarget,
    fade_bind_group: BindGroup,
}

/// Owns the write/read texture pair and runs the per-frame protocol.
pub struct FrameCompositor {
    surface_format: TextureFormat,
    feedback_layout: BindGroupLayout,
    sampler: Sampler,
    blitter: TextureBlitter,
    targets: Option<FeedbackTargets>,
}

impl FrameCompositor {
    /// Create an unsized compositor presenting to `surface_format`.
    pub fn new(device: &Device, surface_format: TextureFormat) -> Self {
        let feedback_layout = create_feedback_layout(device);

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("feedback_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Linear,
            ..Default::default()
        });

        let blitter = TextureBlitterBuilder::new(device, surface_format)
            .sample_type(wgpu::FilterMode::Linear)
            .build();

        Self {
            surface_format,
            feedback_layout,
            sampler,
            blitter,
            targets: None,
        }
    }

    /// Layout the fade program expects at [`FEEDBACK_GROUP`].
    pub fn feedback_layout(&self) -> &BindGroupLayout {
        &self.feedback_layout
    }

    pub fn size(&self) -> Option<u32> {
        self.targets.as_ref().map(|t| t.size)
    }

    /// Reallocate both textures as zeroed `size x size` squares.
    ///
    /// Any existing trail is discarded.
    pub fn resize(&mut self, device: &Device, size: u32) {
        let write = RenderTarget::for_feedback_write(device, size, FRAMEBUFFER_FORMAT);
        let read = RenderTarget::for_feedback_read(device, size, self.surface_format);

        let fade_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("feedback_bind_group"),
            layout: &self.feedback_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(read.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        log::debug!("Resized feedback textures to {}x{}", size, size);
        self.targets = Some(FeedbackTargets {
            size,
            write,
            read,
            fade_bind_group,
        });
    }

    /// Clear the write texture to opaque black. No-op when unsized.
    pub fn clear(&self, encoder: &mut CommandEncoder) {
        if let Some(targets) = &self.targets {
            let _pass = begin_pass(
                encoder,
                "clear_pass",
                targets.write.view(),
                wgpu::LoadOp::Clear(wgpu::Color::BLACK),
            );
        }
    }

    /// Record one frame of the feedback protocol.
    ///
    /// The caller must have uploaded the current samples already.
    pub fn composite(
        &self,
        device: &Device,
        encoder: &mut CommandEncoder,
        point: &DrawPass<'_>,
        fade: &DrawPass<'_>,
        surface: &SurfaceFrame,
    ) -> Result<(), CompositeError> {
        let targets = self.targets.as_ref().ok_or(CompositeError::NotSized)?;
        let surface_size = surface.texture().width();
        if surface_size != targets.size || surface.texture().height() != targets.size {
            return Err(CompositeError::SizeMismatch {
                surface: surface_size,
                feedback: targets.size,
            });
        }

        {
            let mut pass = begin_pass(
                encoder,
                "point_pass",
                targets.write.view(),
                wgpu::LoadOp::Load,
            );
            point.program.use_program(&mut pass, point.pipeline);
            point.layout.use_layout(&mut pass);
            pass.draw(point.vertices.clone(), point.instances.clone());
            point.layout.unuse();
            point.program.unuse();
        }

        self.blitter
            .copy(device, encoder, targets.write.view(), surface.view());

        let extent = wgpu::Extent3d {
            width: targets.size,
            height: targets.size,
            depth_or_array_layers: 1,
        };
        encoder.copy_texture_to_texture(
            wgpu::TexelCopyTextureInfo {
                texture: surface.texture(),
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyTextureInfo {
                texture: targets.read.texture(),
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            extent,
        );

        {
            let mut pass = begin_pass(
                encoder,
                "fade_pass",
                targets.write.view(),
                wgpu::LoadOp::Load,
            );
            fade.program.use_program(&mut pass, fade.pipeline);
            pass.set_bind_group(FEEDBACK_GROUP, &targets.fade_bind_group, &[]);
            fade.layout.use_layout(&mut pass);
            pass.draw(fade.vertices.clone(), fade.instances.clone());
            fade.layout.unuse();
            fade.program.unuse();
        }

        Ok(())
    }
}

fn begin_pass<'e>(
    encoder: &'e mut CommandEncoder,
    label: &str,
    view: &TextureView,
    load: wgpu::LoadOp<wgpu::Color>,
) -> wgpu::RenderPass<'e> {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            depth_slice: None,
            ops: wgpu::Operations {
                load,
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
        multiview_mask: None,
    })
}
