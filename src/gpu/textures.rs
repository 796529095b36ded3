//! Texture management for GPU rendering.

use wgpu::{Device, Texture, TextureFormat, TextureUsages, TextureView};

/// Errors raised while reading pixels back to the CPU.
#[derive(Debug, thiserror::Error)]
pub enum ReadbackError {
    #[error("Failed to map readback buffer: {0}")]
    Map(#[from] wgpu::BufferAsyncError),
    #[error("Device poll failed: {0}")]
    Poll(#[from] wgpu::PollError),
    #[error("Readback callback was dropped before completing")]
    Disconnected,
}

/// A render target that owns both texture and view.
/// The texture must outlive its view, so we keep them together.
pub struct RenderTarget {
    texture: Texture,
    view: TextureView,
}

impl RenderTarget {
    /// Create a new render target with the specified usage flags.
    ///
    /// New textures are zero-initialized.
    pub fn new(
        device: &Device,
        label: &str,
        width: u32,
        height: u32,
        format: TextureFormat,
        usage: TextureUsages,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }

    /// Target the point and fade passes draw into. Blitted to the surface.
    pub fn for_feedback_write(device: &Device, size: u32, format: TextureFormat) -> Self {
        Self::new(
            device,
            "feedback_write",
            size,
            size,
            format,
            TextureUsages::RENDER_ATTACHMENT | TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_SRC,
        )
    }

    /// Copy of the visible surface, sampled by the fade pass.
    pub fn for_feedback_read(device: &Device, size: u32, format: TextureFormat) -> Self {
        Self::new(
            device,
            "feedback_read",
            size,
            size,
            format,
            TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
        )
    }

    /// Off-screen stand-in for a window surface (can be copied to CPU).
    pub fn for_surface(device: &Device, size: u32, format: TextureFormat) -> Self {
        Self::new(
            device,
            "offscreen_surface",
            size,
            size,
            format,
            TextureUsages::RENDER_ATTACHMENT | TextureUsages::COPY_SRC | TextureUsages::TEXTURE_BINDING,
        )
    }

    /// Get the texture view for rendering or sampling.
    pub fn view(&self) -> &TextureView {
        &self.view
    }

    /// Get the underlying texture (for copy operations).
    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    pub fn width(&self) -> u32 {
        self.texture.width()
    }

    pub fn height(&self) -> u32 {
        self.texture.height()
    }
}

/// Readback buffer for copying GPU texture data to CPU.
pub struct ReadbackBuffer {
    buffer: wgpu::Buffer,
    width: u32,
    height: u32,
    padded_row_bytes: u32,
    unpadded_row_bytes: u32,
}

impl ReadbackBuffer {
    /// Create a new readback buffer sized for the given dimensions.
    pub fn new(device: &Device, width: u32, height: u32) -> Self {
        let bytes_per_pixel = 4u32;
        let unpadded_row_bytes = width * bytes_per_pixel;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_row_bytes = unpadded_row_bytes.div_ceil(align) * align;

        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback_buffer"),
            size: (padded_row_bytes * height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        Self {
            buffer,
            width,
            height,
            padded_row_bytes,
            unpadded_row_bytes,
        }
    }

    /// Get the padded bytes per row (for texture copy).
    pub fn padded_row_bytes(&self) -> u32 {
        self.padded_row_bytes
    }

    /// Record a copy of `texture` into this buffer.
    pub fn copy_from(&self, encoder: &mut wgpu::CommandEncoder, texture: &Texture) {
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(self.padded_row_bytes),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
    }

    /// Read pixels from the mapped buffer, removing row padding.
    ///
    /// Blocks until the GPU has finished all submitted work.
    pub fn read_pixels(&self, device: &wgpu::Device) -> Result<Vec<u8>, ReadbackError> {
        let buffer_slice = self.buffer.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            // Receiver outlives the poll below
            let _ = sender.send(result);
        });
        device.poll(wgpu::PollType::wait_indefinitely())?;
        receiver.recv().map_err(|_| ReadbackError::Disconnected)??;

        let pixels = {
            let data = buffer_slice.get_mapped_range();
            let mut pixels = Vec::with_capacity((self.width * self.height * 4) as usize);
            for row in 0..self.height {
                let start = (row * self.padded_row_bytes) as usize;
                let end = start + self.unpadded_row_bytes as usize;
                pixels.extend_from_slice(&data[start..end]);
            }
            pixels
        };
        self.buffer.unmap();
        Ok(pixels)
    }
}
