//! GPU resource wrappers on top of wgpu.
//!
//! Buffers, shader programs and vertex layouts wrap the raw wgpu objects
//! with the bind/unbind bookkeeping the scope renderer relies on. The
//! compositor owns the feedback textures and records each frame.

pub mod buffer;
pub mod compositor;
pub mod context;
pub mod layouts;
pub mod pipelines;
pub mod program;
pub mod shaders;
pub mod surface;
pub mod textures;
pub mod vertex_layout;

pub use buffer::{BufferError, BufferTarget, GpuBuffer};
pub use compositor::{CompositeError, DrawPass, FrameCompositor, FRAMEBUFFER_FORMAT};
pub use context::{GpuContext, GpuError};
pub use program::{ProgramError, ShaderProgram, Stage, UniformLocation, UniformValue};
pub use shaders::ShaderLibrary;
pub use surface::{OffscreenSurface, ScopeSurface, SurfaceError, SurfaceFrame, WindowSurface};
pub use textures::{ReadbackBuffer, ReadbackError, RenderTarget};
pub use vertex_layout::{ComponentType, LayoutError, VertexAttributeSpec, VertexLayout};
