//! Vertex layouts: named attributes mapped onto buffer byte ranges.
//!
//! Every attribute gets its own vertex buffer slot whose index matches the
//! attribute's `@location`, assigned in declaration order from 0. A slot
//! binds `buffer.slice(offset..)`, so each attribute can live at an
//! arbitrary 4-byte aligned offset inside a shared buffer.

use std::cell::Cell;

use wgpu::{BufferAddress, RenderPass, VertexBufferLayout, VertexFormat, VertexStepMode};

use super::buffer::{BufferError, BufferTarget, GpuBuffer};

/// Required alignment of attribute offsets and strides.
pub const ATTRIBUTE_ALIGNMENT: u64 = 4;

/// Errors raised while building a [`VertexLayout`].
#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("Attribute {attribute}: instance divisor {divisor} is not supported (only 0 or 1)")]
    UnsupportedDivisor { attribute: String, divisor: u32 },
    #[error("Attribute {attribute}: offset {offset} is not a multiple of {ATTRIBUTE_ALIGNMENT}")]
    MisalignedOffset { attribute: String, offset: u64 },
    #[error("Attribute {attribute}: stride {stride} is not a multiple of {ATTRIBUTE_ALIGNMENT}")]
    MisalignedStride { attribute: String, stride: u64 },
    #[error("Attribute {attribute}: offset {offset} lies outside a buffer of {length} bytes")]
    OffsetOutOfRange {
        attribute: String,
        offset: u64,
        length: u64,
    },
    #[error(
        "Attribute {attribute}: {count} x {component_type:?} (normalize={normalize}) has no vertex format"
    )]
    UnsupportedComponents {
        attribute: String,
        count: u32,
        component_type: ComponentType,
        normalize: bool,
    },
    #[error(transparent)]
    Buffer(#[from] BufferError),
}

/// Scalar type of each attribute component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentType {
    Float,
    Int,
    UnsignedInt,
    Short,
    UnsignedShort,
    Byte,
    UnsignedByte,
}

/// Resolve the vertex format for `count` components of `ty`.
///
/// `normalize` maps integer components into `[0, 1]` / `[-1, 1]`; it is
/// ignored for floats. 32-bit integers cannot be normalized.
pub fn vertex_format(count: u32, ty: ComponentType, normalize: bool) -> Option<VertexFormat> {
    use ComponentType::*;
    use VertexFormat as F;

    let format = match (ty, normalize, count) {
        (Float, _, 1) => F::Float32,
        (Float, _, 2) => F::Float32x2,
        (Float, _, 3) => F::Float32x3,
        (Float, _, 4) => F::Float32x4,

        (Int, false, 1) => F::Sint32,
        (Int, false, 2) => F::Sint32x2,
        (Int, false, 3) => F::Sint32x3,
        (Int, false, 4) => F::Sint32x4,
        (UnsignedInt, false, 1) => F::Uint32,
        (UnsignedInt, false, 2) => F::Uint32x2,
        (UnsignedInt, false, 3) => F::Uint32x3,
        (UnsignedInt, false, 4) => F::Uint32x4,

        (Short, false, 1) => F::Sint16,
        (Short, false, 2) => F::Sint16x2,
        (Short, false, 4) => F::Sint16x4,
        (Short, true, 1) => F::Snorm16,
        (Short, true, 2) => F::Snorm16x2,
        (Short, true, 4) => F::Snorm16x4,
        (UnsignedShort, false, 1) => F::Uint16,
        (UnsignedShort, false, 2) => F::Uint16x2,
        (UnsignedShort, false, 4) => F::Uint16x4,
        (UnsignedShort, true, 1) => F::Unorm16,
        (UnsignedShort, true, 2) => F::Unorm16x2,
        (UnsignedShort, true, 4) => F::Unorm16x4,

        (Byte, false, 1) => F::Sint8,
        (Byte, false, 2) => F::Sint8x2,
        (Byte, false, 4) => F::Sint8x4,
        (Byte, true, 1) => F::Snorm8,
        (Byte, true, 2) => F::Snorm8x2,
        (Byte, true, 4) => F::Snorm8x4,
        (UnsignedByte, false, 1) => F::Uint8,
        (UnsignedByte, false, 2) => F::Uint8x2,
        (UnsignedByte, false, 4) => F::Uint8x4,
        (UnsignedByte, true, 1) => F::Unorm8,
        (UnsignedByte, true, 2) => F::Unorm8x2,
        (UnsignedByte, true, 4) => F::Unorm8x4,

        _ => return None,
    };
    Some(format)
}

/// Step mode for an instance divisor.
pub fn step_mode(divisor: u32) -> Option<VertexStepMode> {
    match divisor {
        0 => Some(VertexStepMode::Vertex),
        1 => Some(VertexStepMode::Instance),
        _ => None,
    }
}

/// Description of one attribute's source data.
#[derive(Clone, Copy)]
pub struct VertexAttributeSpec<'a> {
    pub buffer: &'a GpuBuffer,
    pub component_count: u32,
    pub component_type: ComponentType,
    pub normalize: bool,
    /// Bytes between consecutive elements, 0 for tightly packed.
    pub stride_bytes: u64,
    pub offset_bytes: u64,
    /// 0 advances per vertex, 1 per instance.
    pub instance_divisor: u32,
}

impl<'a> VertexAttributeSpec<'a> {
    pub fn new(buffer: &'a GpuBuffer, component_count: u32, component_type: ComponentType) -> Self {
        Self {
            buffer,
            component_count,
            component_type,
            normalize: false,
            stride_bytes: 0,
            offset_bytes: 0,
            instance_divisor: 0,
        }
    }

    pub fn normalized(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    pub fn stride(mut self, stride_bytes: u64) -> Self {
        self.stride_bytes = stride_bytes;
        self
    }

    pub fn offset(mut self, offset_bytes: u64) -> Self {
        self.offset_bytes = offset_bytes;
        self
    }

    pub fn divisor(mut self, instance_divisor: u32) -> Self {
        self.instance_divisor = instance_divisor;
        self
    }
}

struct VertexSlot {
    name: String,
    buffer: wgpu::Buffer,
    offset: BufferAddress,
    stride: BufferAddress,
    step_mode: VertexStepMode,
    attribute: [wgpu::VertexAttribute; 1],
}

/// Immutable mapping of attribute locations to buffer ranges.
///
/// Holds clones of the buffer handles, never the owning [`GpuBuffer`].
/// Reallocating a source buffer invalidates the layout.
pub struct VertexLayout {
    label: String,
    slots: Vec<VertexSlot>,
    active: Cell<bool>,
}

impl VertexLayout {
    /// Build a layout from attributes in location order.
    pub fn build(
        label: &str,
        attributes: &[(&str, VertexAttributeSpec<'_>)],
    ) -> Result<Self, LayoutError> {
        let mut layout = Self::begin(label, attributes.len());
        let result = layout.push_attributes(attributes);
        layout.active.set(false);
        result?;

        log::debug!(
            "Built vertex layout {} with {} attributes",
            label,
            layout.slots.len()
        );
        Ok(layout)
    }

    /// Empty layout, active until construction finishes.
    fn begin(label: &str, capacity: usize) -> Self {
        Self {
            label: label.to_string(),
            slots: Vec::with_capacity(capacity),
            active: Cell::new(true),
        }
    }

    fn push_attributes(
        &mut self,
        attributes: &[(&str, VertexAttributeSpec<'_>)],
    ) -> Result<(), LayoutError> {
        for (location, (name, attr)) in attributes.iter().enumerate() {
            attr.buffer.bind(BufferTarget::Vertex)?;
            let slot = Self::resolve_slot(location as u32, name, attr);
            attr.buffer.unbind();
            self.slots.push(slot?);
        }
        Ok(())
    }

    fn resolve_slot(
        location: u32,
        name: &str,
        attr: &VertexAttributeSpec<'_>,
    ) -> Result<VertexSlot, LayoutError> {
        let format = vertex_format(attr.component_count, attr.component_type, attr.normalize)
            .ok_or_else(|| LayoutError::UnsupportedComponents {
                attribute: name.to_string(),
                count: attr.component_count,
                component_type: attr.component_type,
                normalize: attr.normalize,
            })?;

        let step_mode =
            step_mode(attr.instance_divisor).ok_or_else(|| LayoutError::UnsupportedDivisor {
                attribute: name.to_string(),
                divisor: attr.instance_divisor,
            })?;

        if attr.offset_bytes % ATTRIBUTE_ALIGNMENT != 0 {
            return Err(LayoutError::MisalignedOffset {
                attribute: name.to_string(),
                offset: attr.offset_bytes,
            });
        }
        if attr.stride_bytes % ATTRIBUTE_ALIGNMENT != 0 {
            return Err(LayoutError::MisalignedStride {
                attribute: name.to_string(),
                stride: attr.stride_bytes,
            });
        }

        let length = attr.buffer.length();
        if attr.offset_bytes >= length {
            return Err(LayoutError::OffsetOutOfRange {
                attribute: name.to_string(),
                offset: attr.offset_bytes,
                length,
            });
        }

        let stride = if attr.stride_bytes == 0 {
            format.size()
        } else {
            attr.stride_bytes
        };

        Ok(VertexSlot {
            name: name.to_string(),
            buffer: attr.buffer.handle()?.clone(),
            offset: attr.offset_bytes,
            stride,
            step_mode,
            attribute: [wgpu::VertexAttribute {
                format,
                offset: 0,
                shader_location: location,
            }],
        })
    }

    /// Buffer layouts for pipeline creation, one per slot.
    pub fn buffer_layouts(&self) -> Vec<VertexBufferLayout<'_>> {
        self.slots
            .iter()
            .map(|slot| VertexBufferLayout {
                array_stride: slot.stride,
                step_mode: slot.step_mode,
                attributes: &slot.attribute,
            })
            .collect()
    }

    /// Bind every slot on `pass` and mark the layout active.
    pub fn use_layout(&self, pass: &mut RenderPass<'_>) {
        for (slot_index, slot) in self.slots.iter().enumerate() {
            pass.set_vertex_buffer(slot_index as u32, slot.buffer.slice(slot.offset..));
        }
        self.active.set(true);
    }

    pub fn unuse(&self) {
        self.active.set(false);
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Attribute names in location order.
    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|slot| slot.name.as_str())
    }
}
