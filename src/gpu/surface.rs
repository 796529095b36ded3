//! The visible surface the compositor blits into and copies back from.
//!
//! [`WindowSurface`] wraps a presentable `wgpu::Surface`; [`OffscreenSurface`]
//! is a plain texture standing in for it in headless rendering and tests.
//! Both must allow render attachment and copy-source use, since the
//! feedback loop reads the presented pixels back.

use wgpu::{Device, Surface, SurfaceTexture, Texture, TextureFormat, TextureUsages, TextureView};

use super::context::{GpuContext, GpuError};
use super::textures::RenderTarget;

/// Usage every visible surface must support.
pub const REQUIRED_SURFACE_USAGE: TextureUsages =
    TextureUsages::RENDER_ATTACHMENT.union(TextureUsages::COPY_SRC);

#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    #[error("Surface has not been sized")]
    Unsized,
    #[error("Failed to acquire surface texture: {0}")]
    Acquire(#[from] wgpu::SurfaceError),
}

/// One acquired frame of a visible surface.
pub struct SurfaceFrame {
    texture: Texture,
    view: TextureView,
    output: Option<SurfaceTexture>,
}

impl SurfaceFrame {
    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    pub fn view(&self) -> &TextureView {
        &self.view
    }

    /// Present the frame. Off-screen frames are kept as they are.
    pub fn present(self) {
        if let Some(output) = self.output {
            output.present();
        }
    }
}

/// A square surface the renderer can draw to and copy from.
pub trait ScopeSurface {
    fn format(&self) -> TextureFormat;

    /// Current edge length in pixels, `None` before the first resize.
    fn size(&self) -> Option<u32>;

    fn resize(&mut self, device: &Device, size: u32);

    fn acquire(&mut self) -> Result<SurfaceFrame, SurfaceError>;
}

/// Texture-backed surface for headless rendering.
pub struct OffscreenSurface {
    format: TextureFormat,
    target: Option<RenderTarget>,
}

impl OffscreenSurface {
    pub fn new(format: TextureFormat) -> Self {
        Self {
            format,
            target: None,
        }
    }

    /// Texture holding the last presented frame.
    pub fn texture(&self) -> Option<&Texture> {
        self.target.as_ref().map(RenderTarget::texture)
    }
}

impl Default for OffscreenSurface {
    fn default() -> Self {
        Self::new(TextureFormat::Rgba8Unorm)
    }
}

impl ScopeSurface for OffscreenSurface {
    fn format(&self) -> TextureFormat {
        self.format
    }

    fn size(&self) -> Option<u32> {
        self.target.as_ref().map(RenderTarget::width)
    }

    fn resize(&mut self, device: &Device, size: u32) {
        self.target = Some(RenderTarget::for_surface(device, size, self.format));
    }

    fn acquire(&mut self) -> Result<SurfaceFrame, SurfaceError> {
        let target = self.target.as_ref().ok_or(SurfaceError::Unsized)?;
        Ok(SurfaceFrame {
            texture: target.texture().clone(),
            view: target.view().clone(),
            output: None,
        })
    }
}

/// Presentable window surface.
pub struct WindowSurface {
    surface: Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    configured: bool,
}

impl WindowSurface {
    /// Wrap `surface`, checking it can serve as the feedback loop's source.
    pub fn new(ctx: &GpuContext, surface: Surface<'static>) -> Result<Self, GpuError> {
        let caps = surface.get_capabilities(&ctx.adapter);
        if caps.formats.is_empty() {
            return Err(GpuError::InsufficientCapability(
                "surface is not supported by the adapter".to_string(),
            ));
        }
        if !caps.usages.contains(REQUIRED_SURFACE_USAGE) {
            return Err(GpuError::InsufficientCapability(format!(
                "surface usages {:?} lack {:?}",
                caps.usages, REQUIRED_SURFACE_USAGE
            )));
        }

        let format = choose_format(&caps.formats).ok_or_else(|| {
            GpuError::InsufficientCapability(format!(
                "no 8-bit RGBA/BGRA surface format in {:?}",
                caps.formats
            ))
        })?;
        log::info!("Using surface format {:?}", format);

        let config = wgpu::SurfaceConfiguration {
            usage: REQUIRED_SURFACE_USAGE,
            format,
            width: 1,
            height: 1,
            present_mode: wgpu::PresentMode::AutoVsync,
            desired_maximum_frame_latency: 1,
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
        };

        Ok(Self {
            surface,
            config,
            configured: false,
        })
    }
}

/// Pick a plain 8-bit colour format, preferring non-sRGB ones.
pub fn choose_format(formats: &[TextureFormat]) -> Option<TextureFormat> {
    let eight_bit = |f: &&TextureFormat| {
        matches!(
            f.remove_srgb_suffix(),
            TextureFormat::Rgba8Unorm | TextureFormat::Bgra8Unorm
        )
    };
    if let Some(format) = formats.iter().filter(eight_bit).find(|f| !f.is_srgb()) {
        return Some(*format);
    }
    let format = formats.iter().find(eight_bit).copied()?;
    log::warn!(
        "Surface only offers {:?}; trail colours will be gamma encoded",
        format
    );
    Some(format)
}

impl ScopeSurface for WindowSurface {
    fn format(&self) -> TextureFormat {
        self.config.format
    }

    fn size(&self) -> Option<u32> {
        self.configured.then_some(self.config.width)
    }

    fn resize(&mut self, device: &Device, size: u32) {
        self.config.width = size;
        self.config.height = size;
        self.surface.configure(device, &self.config);
        self.configured = true;
    }

    fn acquire(&mut self) -> Result<SurfaceFrame, SurfaceError> {
        if !self.configured {
            return Err(SurfaceError::Unsized);
        }
        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        Ok(SurfaceFrame {
            texture: output.texture.clone(),
            view,
            output: Some(output),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choose_format_prefers_linear() {
        let formats = [
            TextureFormat::Bgra8UnormSrgb,
            TextureFormat::Bgra8Unorm,
            TextureFormat::Rgba16Float,
        ];
        assert_eq!(choose_format(&formats), Some(TextureFormat::Bgra8Unorm));
    }

    #[test]
    fn test_choose_format_falls_back_to_srgb() {
        let formats = [TextureFormat::Rgba16Float, TextureFormat::Rgba8UnormSrgb];
        assert_eq!(choose_format(&formats), Some(TextureFormat::Rgba8UnormSrgb));
        assert_eq!(choose_format(&[TextureFormat::Rgba16Float]), None);
    }

    #[tokio::test]
    async fn test_offscreen_surface_requires_resize() {
        let ctx = match GpuContext::new().await {
            Ok(ctx) => ctx,
            Err(_) => return,
        };

        let mut surface = OffscreenSurface::default();
        assert_eq!(surface.size(), None);
        assert!(matches!(surface.acquire(), Err(SurfaceError::Unsized)));

        surface.resize(&ctx.device, 32);
        assert_eq!(surface.size(), Some(32));
        let frame = surface.acquire().unwrap();
        assert!(frame.texture().usage().contains(REQUIRED_SURFACE_USAGE));
        frame.present();
    }
}
