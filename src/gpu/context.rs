//! GPU context initialization and management.

use std::sync::Arc;
use wgpu::{Adapter, Device, Instance, Queue, Surface, SurfaceTarget};

/// Errors that can occur while acquiring GPU resources.
#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("No suitable GPU adapter found")]
    NoAdapter,
    #[error("Failed to request device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),
    #[error("Failed to create surface: {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),
    #[error("Surface does not meet the required capability: {0}")]
    InsufficientCapability(String),
}

/// GPU context holding device and queue for rendering.
pub struct GpuContext {
    pub instance: Instance,
    pub adapter: Arc<Adapter>,
    pub device: Arc<Device>,
    pub queue: Arc<Queue>,
}

impl GpuContext {
    /// Create a new GPU context for headless rendering.
    ///
    /// Prefers Metal on macOS, falls back to other backends.
    pub async fn new() -> Result<Self, GpuError> {
        let instance = Self::create_instance();
        Self::request(instance, None).await
    }

    /// Create a GPU context able to present to `target`.
    ///
    /// The returned surface is unconfigured; wrap it in a
    /// [`WindowSurface`](super::surface::WindowSurface) to use it.
    pub async fn with_surface(
        target: impl Into<SurfaceTarget<'static>>,
    ) -> Result<(Self, Surface<'static>), GpuError> {
        let instance = Self::create_instance();
        let surface = instance.create_surface(target)?;
        let ctx = Self::request(instance, Some(&surface)).await?;
        Ok((ctx, surface))
    }

    fn create_instance() -> Instance {
        Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::METAL | wgpu::Backends::VULKAN | wgpu::Backends::GL,
            ..Default::default()
        })
    }

    async fn request(instance: Instance, surface: Option<&Surface<'_>>) -> Result<Self, GpuError> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: surface,
            })
            .await
            .map_err(|_| GpuError::NoAdapter)?;

        let info = adapter.get_info();
        log::info!("Using GPU adapter {} ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("phobz-scope"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
                experimental_features: wgpu::ExperimentalFeatures::default(),
            })
            .await?;

        Ok(Self {
            instance,
            adapter: Arc::new(adapter),
            device: Arc::new(device),
            queue: Arc::new(queue),
        })
    }

    /// Get info about the GPU adapter.
    pub fn adapter_info(&self) -> wgpu::AdapterInfo {
        self.adapter.get_info()
    }
}
