//! Render pipeline builders for GPU rendering.
//!
//! Programs compile their stages into separate shader modules, so the
//! builder takes the vertex and fragment modules independently.

use wgpu::{
    BindGroupLayout, BlendState, ColorTargetState, Device, PipelineLayout, PrimitiveTopology,
    RenderPipeline, ShaderModule, TextureFormat, VertexBufferLayout,
};

/// Entry point every vertex module must export.
pub const VERTEX_ENTRY: &str = "vs_main";
/// Entry point every fragment module must export.
pub const FRAGMENT_ENTRY: &str = "fs_main";

/// Builder for creating render pipelines with common patterns.
pub struct RenderPipelineBuilder<'a> {
    label: &'a str,
    layout: Option<&'a PipelineLayout>,
    vertex: &'a ShaderModule,
    fragment: &'a ShaderModule,
    vertex_buffers: &'a [VertexBufferLayout<'a>],
    topology: PrimitiveTopology,
    format: TextureFormat,
    blend: Option<BlendState>,
}

impl<'a> RenderPipelineBuilder<'a> {
    /// Create a new render pipeline builder for a vertex/fragment pair.
    pub fn new(label: &'a str, vertex: &'a ShaderModule, fragment: &'a ShaderModule) -> Self {
        Self {
            label,
            layout: None,
            vertex,
            fragment,
            vertex_buffers: &[],
            topology: PrimitiveTopology::TriangleList,
            format: TextureFormat::Rgba8Unorm,
            blend: Some(BlendState::REPLACE),
        }
    }

    /// Set the pipeline layout.
    pub fn layout(mut self, layout: &'a PipelineLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    /// Set vertex buffer layouts.
    pub fn vertex_buffers(mut self, buffers: &'a [VertexBufferLayout<'a>]) -> Self {
        self.vertex_buffers = buffers;
        self
    }

    pub fn topology(mut self, topology: PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    /// Set the texture format.
    pub fn format(mut self, format: TextureFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the blend state.
    pub fn blend(mut self, blend: Option<BlendState>) -> Self {
        self.blend = blend;
        self
    }

    /// Build the render pipeline.
    pub fn build(self, device: &Device) -> RenderPipeline {
        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(self.label),
            layout: self.layout,
            vertex: wgpu::VertexState {
                module: self.vertex,
                entry_point: Some(VERTEX_ENTRY),
                buffers: self.vertex_buffers,
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: self.fragment,
                entry_point: Some(FRAGMENT_ENTRY),
                targets: &[Some(ColorTargetState {
                    format: self.format,
                    blend: self.blend,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: self.topology,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        })
    }
}

/// Create a pipeline layout from bind group layouts.
pub fn create_pipeline_layout(
    device: &Device,
    label: &str,
    layouts: &[&BindGroupLayout],
) -> PipelineLayout {
    device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: layouts,
        immediate_size: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::GpuContext;

    #[tokio::test]
    async fn test_pipeline_layout_creation() {
        let ctx = match GpuContext::new().await {
            Ok(ctx) => ctx,
            Err(_) => return,
        };

        let bind_group_layout =
            ctx.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("test"),
                    entries: &[],
                });

        let _layout = create_pipeline_layout(&ctx.device, "test_layout", &[&bind_group_layout]);
    }
}
