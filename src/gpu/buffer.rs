//! GPU buffer wrapper with bounds-checked sub-range updates.
//!
//! A [`GpuBuffer`] owns at most one `wgpu::Buffer`. Reallocating replaces the
//! underlying resource; anything that captured the previous handle (for
//! example a [`VertexLayout`](super::vertex_layout::VertexLayout)) must be
//! rebuilt. No CPU-side copy of the contents is kept.

use std::cell::Cell;
use std::sync::Arc;

use wgpu::util::DeviceExt;
use wgpu::{Buffer, BufferAddress, BufferUsages, Device, Queue};

/// Errors raised by [`GpuBuffer`] operations.
#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    #[error("Buffer {label} has not been allocated")]
    Unallocated { label: String },
    #[error(
        "Sub-data overflow on {label}: writing {len} bytes at offset {offset} into a buffer of {capacity} bytes"
    )]
    OutOfBounds {
        label: String,
        len: u64,
        offset: u64,
        capacity: u64,
    },
    #[error("Sub-data of {len} bytes at offset {offset} on {label} is not {align}-byte aligned")]
    Misaligned {
        label: String,
        len: u64,
        offset: u64,
        align: u64,
    },
    #[error("Buffer {label} cannot be bound as {target:?}")]
    UnsupportedTarget { label: String, target: BufferTarget },
    #[error("Buffer {label} of {size} bytes exceeds the device limit of {limit} bytes")]
    TooLarge { label: String, size: u64, limit: u64 },
}

/// Role a buffer is currently bound for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferTarget {
    Vertex,
    Uniform,
    CopySource,
    CopyDestination,
}

impl BufferTarget {
    fn required_usage(self) -> BufferUsages {
        match self {
            BufferTarget::Vertex => BufferUsages::VERTEX,
            BufferTarget::Uniform => BufferUsages::UNIFORM,
            BufferTarget::CopySource => BufferUsages::COPY_SRC,
            BufferTarget::CopyDestination => BufferUsages::COPY_DST,
        }
    }
}

/// Check that `len` bytes written at `offset` fit in `capacity`.
pub fn check_sub_range(capacity: u64, offset: u64, len: u64) -> Result<(), (u64, u64, u64)> {
    if offset > capacity || len > capacity - offset {
        return Err((len, offset, capacity));
    }
    Ok(())
}

/// A single GPU buffer resource.
pub struct GpuBuffer {
    label: String,
    device: Arc<Device>,
    queue: Arc<Queue>,
    buffer: Option<Buffer>,
    usage: BufferUsages,
    capacity: u64,
    bound_target: Cell<Option<BufferTarget>>,
}

impl GpuBuffer {
    /// Create an unallocated buffer.
    pub fn new(device: &Arc<Device>, queue: &Arc<Queue>, label: &str) -> Self {
        Self {
            label: label.to_string(),
            device: device.clone(),
            queue: queue.clone(),
            buffer: None,
            usage: BufferUsages::empty(),
            capacity: 0,
            bound_target: Cell::new(None),
        }
    }

    /// Reserve `size` bytes of storage, discarding the previous resource.
    ///
    /// `usage` always gains `COPY_DST` so that sub-data updates work.
    pub fn allocate(&mut self, size: u64, usage: BufferUsages) -> Result<(), BufferError> {
        self.check_size(size)?;
        let usage = usage | BufferUsages::COPY_DST;
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&self.label),
            size,
            usage,
            mapped_at_creation: false,
        });
        self.replace(buffer, usage, size);
        Ok(())
    }

    /// Replace contents and capacity with `bytes`.
    pub fn set_data(&mut self, bytes: &[u8], usage: BufferUsages) -> Result<(), BufferError> {
        self.check_size(bytes.len() as u64)?;
        let usage = usage | BufferUsages::COPY_DST;
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&self.label),
                contents: bytes,
                usage,
            });
        self.replace(buffer, usage, bytes.len() as u64);
        Ok(())
    }

    fn check_size(&self, size: u64) -> Result<(), BufferError> {
        let limit = self.device.limits().max_buffer_size;
        if size > limit {
            return Err(BufferError::TooLarge {
                label: self.label.clone(),
                size,
                limit,
            });
        }
        Ok(())
    }

    fn replace(&mut self, buffer: Buffer, usage: BufferUsages, capacity: u64) {
        self.buffer = Some(buffer);
        self.usage = usage;
        self.capacity = capacity;
        self.bound_target.set(None);
    }

    /// Write `bytes` at `offset`.
    ///
    /// Nothing is written when the range does not fit the current capacity.
    pub fn set_sub_data(&self, bytes: &[u8], offset: u64) -> Result<(), BufferError> {
        let buffer = self.handle()?;
        let len = bytes.len() as u64;

        check_sub_range(self.capacity, offset, len).map_err(|(len, offset, capacity)| {
            BufferError::OutOfBounds {
                label: self.label.clone(),
                len,
                offset,
                capacity,
            }
        })?;

        let align = wgpu::COPY_BUFFER_ALIGNMENT;
        if offset % align != 0 || len % align != 0 {
            return Err(BufferError::Misaligned {
                label: self.label.clone(),
                len,
                offset,
                align,
            });
        }

        if len > 0 {
            self.queue.write_buffer(buffer, offset as BufferAddress, bytes);
        }
        Ok(())
    }

    /// Current capacity in bytes, 0 when unallocated.
    pub fn length(&self) -> u64 {
        self.capacity
    }

    pub fn usage(&self) -> BufferUsages {
        self.usage
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Bind the buffer for `target`.
    pub fn bind(&self, target: BufferTarget) -> Result<(), BufferError> {
        self.handle()?;
        if !self.usage.contains(target.required_usage()) {
            return Err(BufferError::UnsupportedTarget {
                label: self.label.clone(),
                target,
            });
        }
        self.bound_target.set(Some(target));
        Ok(())
    }

    /// Release the current binding. Does nothing when not bound.
    pub fn unbind(&self) {
        self.bound_target.take();
    }

    pub fn bound_target(&self) -> Option<BufferTarget> {
        self.bound_target.get()
    }

    /// The underlying wgpu buffer.
    pub fn handle(&self) -> Result<&Buffer, BufferError> {
        self.buffer.as_ref().ok_or_else(|| BufferError::Unallocated {
            label: self.label.clone(),
        })
    }
}
