//! Shader programs: a vertex/fragment module pair linked into one unit.
//!
//! Both stages are parsed and validated with naga before any GPU object is
//! created, so a broken shader fails with the full diagnostic instead of a
//! device error. Reflection of the parsed modules provides the named
//! uniform locations and the uniform blocks that the program owns.
//!
//! Uniform blocks in bind group 0 are backed by program-owned buffers and
//! a bind group. Other groups (textures, samplers) belong to the caller and
//! are passed in as extra bind group layouts.

use std::borrow::Cow;
use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;

use wgpu::naga;
use wgpu::{
    BindGroup, BindGroupLayout, BlendState, BufferUsages, Device, PipelineLayout,
    PrimitiveTopology, RenderPass, RenderPipeline, ShaderModule, ShaderStages, TextureFormat,
};

use super::buffer::{BufferError, GpuBuffer};
use super::context::GpuContext;
use super::layouts::BindGroupLayoutBuilder;
use super::pipelines::{create_pipeline_layout, RenderPipelineBuilder, FRAGMENT_ENTRY, VERTEX_ENTRY};
use super::shaders::ShaderLibrary;
use super::vertex_layout::VertexLayout;

/// Bind group whose uniform blocks are owned by the program.
pub const UNIFORM_GROUP: u32 = 0;

const UNIFORM_BUFFER_ALIGNMENT: u64 = 16;

/// Shader stage of a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Vertex,
    Fragment,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Vertex => write!(f, "vertex"),
            Stage::Fragment => write!(f, "fragment"),
        }
    }
}

/// Errors raised while compiling or updating a program.
#[derive(Debug, thiserror::Error)]
pub enum ProgramError {
    #[error("No shader source registered for id {0:?}")]
    MissingSource(String),
    #[error("Failed to compile {stage} shader {id}:\n{log}")]
    Compile { stage: Stage, id: String, log: String },
    #[error("Failed to link program {ids}:\n{log}")]
    Link { ids: String, log: String },
    #[error("Uniform {0:?} was not declared for this program")]
    UndeclaredUniform(String),
    #[error("Uniform {name:?} holds {expected} bytes, got {actual}")]
    UniformSize {
        name: String,
        expected: u32,
        actual: u32,
    },
    #[error(transparent)]
    Buffer(#[from] BufferError),
}

/// Where a named uniform lives: a byte range inside a group-0 block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformLocation {
    pub binding: u32,
    pub offset: u32,
    pub size: u32,
}

/// A value written with [`ShaderProgram::set_uniform`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    /// Stored as an `f32` of 1.0 or 0.0.
    Bool(bool),
}

impl UniformValue {
    fn to_bytes(self) -> Vec<u8> {
        match self {
            UniformValue::Float(v) => bytemuck::bytes_of(&v).to_vec(),
            UniformValue::Vec2(v) => bytemuck::cast_slice(&v).to_vec(),
            UniformValue::Vec3(v) => bytemuck::cast_slice(&v).to_vec(),
            UniformValue::Vec4(v) => bytemuck::cast_slice(&v).to_vec(),
            UniformValue::Bool(b) => {
                let v: f32 = if b { 1.0 } else { 0.0 };
                bytemuck::bytes_of(&v).to_vec()
            }
        }
    }
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        UniformValue::Float(v)
    }
}

impl From<[f32; 3]> for UniformValue {
    fn from(v: [f32; 3]) -> Self {
        UniformValue::Vec3(v)
    }
}

impl From<bool> for UniformValue {
    fn from(v: bool) -> Self {
        UniformValue::Bool(v)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct MemberInfo {
    name: String,
    offset: u32,
    size: u32,
}

#[derive(Debug, Clone, PartialEq)]
struct BlockInfo {
    var_name: Option<String>,
    type_name: Option<String>,
    group: u32,
    binding: u32,
    size: u32,
    /// Empty when the uniform is not a struct.
    members: Vec<MemberInfo>,
}

impl BlockInfo {
    fn matches(&self, name: &str) -> bool {
        self.var_name.as_deref() == Some(name) || self.type_name.as_deref() == Some(name)
    }

    fn display_name(&self) -> &str {
        self.var_name
            .as_deref()
            .or(self.type_name.as_deref())
            .unwrap_or("uniforms")
    }
}

#[derive(Debug)]
struct StageInfo {
    has_entry: bool,
    inputs: Vec<(u32, naga::TypeInner)>,
    outputs: Vec<(u32, naga::TypeInner)>,
    blocks: Vec<BlockInfo>,
}

fn parse_stage(stage: Stage, id: &str, source: &str) -> Result<naga::Module, ProgramError> {
    naga::front::wgsl::parse_str(source).map_err(|e| ProgramError::Compile {
        stage,
        id: id.to_string(),
        log: e.emit_to_string(source),
    })
}

fn validate_stage(module: &naga::Module, source: &str) -> Result<(), String> {
    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(module)
    .map(|_| ())
    .map_err(|e| e.emit_to_string(source))
}

fn collect_locations(
    module: &naga::Module,
    ty: naga::Handle<naga::Type>,
    binding: Option<&naga::Binding>,
    out: &mut Vec<(u32, naga::TypeInner)>,
) {
    match binding {
        Some(naga::Binding::Location { location, .. }) => {
            out.push((*location, module.types[ty].inner.clone()));
        }
        Some(naga::Binding::BuiltIn(_)) => {}
        None => {
            if let naga::TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    collect_locations(module, member.ty, member.binding.as_ref(), out);
                }
            }
        }
    }
}

fn reflect(module: &naga::Module, stage: Stage) -> StageInfo {
    let (entry_name, shader_stage) = match stage {
        Stage::Vertex => (VERTEX_ENTRY, naga::ShaderStage::Vertex),
        Stage::Fragment => (FRAGMENT_ENTRY, naga::ShaderStage::Fragment),
    };

    let mut inputs = Vec::new();
    let mut outputs = Vec::new();
    let entry = module
        .entry_points
        .iter()
        .find(|ep| ep.name == entry_name && ep.stage == shader_stage);
    if let Some(ep) = entry {
        for arg in &ep.function.arguments {
            collect_locations(module, arg.ty, arg.binding.as_ref(), &mut inputs);
        }
        if let Some(result) = &ep.function.result {
            collect_locations(module, result.ty, result.binding.as_ref(), &mut outputs);
        }
    }
    inputs.sort_by_key(|(location, _)| *location);
    outputs.sort_by_key(|(location, _)| *location);

    let gctx = module.to_ctx();
    let mut blocks = Vec::new();
    for (_, var) in module.global_variables.iter() {
        if var.space != naga::AddressSpace::Uniform {
            continue;
        }
        let Some(binding) = &var.binding else {
            continue;
        };
        let ty = &module.types[var.ty];
        let members = match &ty.inner {
            naga::TypeInner::Struct { members, .. } => members
                .iter()
                .map(|m| MemberInfo {
                    name: m.name.clone().unwrap_or_default(),
                    offset: m.offset,
                    size: module.types[m.ty].inner.size(gctx),
                })
                .collect(),
            _ => Vec::new(),
        };
        blocks.push(BlockInfo {
            var_name: var.name.clone(),
            type_name: ty.name.clone(),
            group: binding.group,
            binding: binding.binding,
            size: ty.inner.size(gctx),
            members,
        });
    }

    StageInfo {
        has_entry: entry.is_some(),
        inputs,
        outputs,
        blocks,
    }
}

/// Check the stage interface and merge both stages' uniform blocks.
fn link(vertex: &StageInfo, fragment: &StageInfo) -> Result<Vec<BlockInfo>, String> {
    let mut problems = Vec::new();

    if !vertex.has_entry {
        problems.push(format!("vertex module has no @vertex fn {}", VERTEX_ENTRY));
    }
    if !fragment.has_entry {
        problems.push(format!("fragment module has no @fragment fn {}", FRAGMENT_ENTRY));
    }

    for (location, ty) in &fragment.inputs {
        match vertex.outputs.iter().find(|(l, _)| l == location) {
            None => problems.push(format!(
                "fragment input @location({}) is not written by the vertex stage",
                location
            )),
            Some((_, written)) if written != ty => problems.push(format!(
                "fragment input @location({}) is {:?} but the vertex stage writes {:?}",
                location, ty, written
            )),
            Some(_) => {}
        }
    }

    let mut merged = vertex.blocks.clone();
    for block in &fragment.blocks {
        let existing = merged
            .iter()
            .find(|b| b.group == block.group && b.binding == block.binding);
        match existing {
            Some(existing) if existing.size != block.size || existing.members != block.members => {
                problems.push(format!(
                    "uniform block at @group({}) @binding({}) differs between stages",
                    block.group, block.binding
                ));
            }
            Some(_) => {}
            None => merged.push(block.clone()),
        }
    }

    if problems.is_empty() {
        Ok(merged)
    } else {
        Err(problems.join("\n"))
    }
}

fn resolve_uniform(blocks: &[BlockInfo], name: &str) -> Option<UniformLocation> {
    blocks.iter().find_map(|block| {
        if block.members.is_empty() {
            return block.matches(name).then_some(UniformLocation {
                binding: block.binding,
                offset: 0,
                size: block.size,
            });
        }
        block
            .members
            .iter()
            .find(|m| m.name == name)
            .map(|m| UniformLocation {
                binding: block.binding,
                offset: m.offset,
                size: m.size,
            })
    })
}

fn resolve_blocks(blocks: &[BlockInfo], requested: &[(&str, u32)], label: &str) -> HashMap<String, u32> {
    let mut resolved = HashMap::new();
    for &(name, binding) in requested {
        match blocks.iter().find(|b| b.matches(name)) {
            None => {
                log::warn!("Invalid index for uniform block {} on program {}", name, label);
            }
            Some(block) => {
                if block.binding != binding {
                    log::warn!(
                        "Uniform block {} on program {} is declared at binding {}, not {}",
                        name,
                        label,
                        block.binding,
                        binding
                    );
                }
                resolved.insert(name.to_string(), block.binding);
            }
        }
    }
    resolved
}

fn padded_size(size: u32) -> u64 {
    (size as u64)
        .div_ceil(UNIFORM_BUFFER_ALIGNMENT)
        .max(1)
        * UNIFORM_BUFFER_ALIGNMENT
}

/// A compiled and linked vertex/fragment pair.
pub struct ShaderProgram {
    label: String,
    vertex: ShaderModule,
    fragment: ShaderModule,
    uniforms: HashMap<String, Option<UniformLocation>>,
    block_buffers: Vec<(u32, GpuBuffer)>,
    resolved_blocks: HashMap<String, u32>,
    bind_group: BindGroup,
    pipeline_layout: PipelineLayout,
    active: Cell<bool>,
}

impl ShaderProgram {
    /// Compile and link the shaders registered under `vertex_id` and
    /// `fragment_id`.
    ///
    /// `uniform_names` lists the uniforms the caller will set; names the
    /// shaders do not declare resolve to `None` and are ignored by
    /// [`set_uniform`](Self::set_uniform). `uniform_blocks` maps block names
    /// to their expected binding; unknown blocks only log a warning.
    /// `extra_layouts` become bind groups 1.. of the pipeline layout.
    pub fn compile(
        ctx: &GpuContext,
        library: &ShaderLibrary,
        vertex_id: &str,
        fragment_id: &str,
        uniform_names: &[&str],
        uniform_blocks: &[(&str, u32)],
        extra_layouts: &[&BindGroupLayout],
    ) -> Result<Self, ProgramError> {
        let label = format!("{}+{}", vertex_id, fragment_id);
        let vertex_source = library
            .source(vertex_id)
            .ok_or_else(|| ProgramError::MissingSource(vertex_id.to_string()))?;
        let fragment_source = library
            .source(fragment_id)
            .ok_or_else(|| ProgramError::MissingSource(fragment_id.to_string()))?;

        let vertex_module = parse_stage(Stage::Vertex, vertex_id, vertex_source)?;
        let fragment_module = parse_stage(Stage::Fragment, fragment_id, fragment_source)?;

        let link_error = |log: String| ProgramError::Link {
            ids: label.clone(),
            log,
        };
        validate_stage(&vertex_module, vertex_source).map_err(link_error)?;
        validate_stage(&fragment_module, fragment_source).map_err(link_error)?;

        let vertex_info = reflect(&vertex_module, Stage::Vertex);
        let fragment_info = reflect(&fragment_module, Stage::Fragment);
        let blocks: Vec<BlockInfo> = link(&vertex_info, &fragment_info)
            .map_err(link_error)?
            .into_iter()
            .filter(|b| b.group == UNIFORM_GROUP)
            .collect();

        let mut uniforms = HashMap::with_capacity(uniform_names.len());
        for &name in uniform_names {
            let location = resolve_uniform(&blocks, name);
            if location.is_none() {
                log::debug!("Uniform {} not found in program {}", name, label);
            }
            uniforms.insert(name.to_string(), location);
        }
        let resolved_blocks = resolve_blocks(&blocks, uniform_blocks, &label);

        let device = &ctx.device;
        let vertex = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(vertex_id),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(vertex_source)),
        });
        let fragment = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(fragment_id),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(fragment_source)),
        });

        let uniform_layout = blocks
            .iter()
            .fold(BindGroupLayoutBuilder::new(&label), |builder, block| {
                builder.uniform(block.binding, ShaderStages::VERTEX_FRAGMENT)
            })
            .build(device);

        let mut block_buffers = Vec::with_capacity(blocks.len());
        for block in &blocks {
            let mut buffer = GpuBuffer::new(
                &ctx.device,
                &ctx.queue,
                &format!("{}:{}", label, block.display_name()),
            );
            buffer.allocate(padded_size(block.size), BufferUsages::UNIFORM)?;
            block_buffers.push((block.binding, buffer));
        }

        let entries = block_buffers
            .iter()
            .map(|(binding, buffer)| {
                Ok(wgpu::BindGroupEntry {
                    binding: *binding,
                    resource: buffer.handle()?.as_entire_binding(),
                })
            })
            .collect::<Result<Vec<_>, BufferError>>()?;
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&label),
            layout: &uniform_layout,
            entries: &entries,
        });

        let mut layouts = vec![&uniform_layout];
        layouts.extend_from_slice(extra_layouts);
        let pipeline_layout = create_pipeline_layout(device, &label, &layouts);

        log::debug!(
            "Compiled program {} ({} uniform blocks)",
            label,
            block_buffers.len()
        );

        Ok(Self {
            label,
            vertex,
            fragment,
            uniforms,
            block_buffers,
            resolved_blocks,
            bind_group,
            pipeline_layout,
            active: Cell::new(false),
        })
    }

    /// Link the program with a vertex layout into a render pipeline.
    pub fn build_pipeline(
        &self,
        device: &Device,
        layout: &VertexLayout,
        topology: PrimitiveTopology,
        format: TextureFormat,
        blend: Option<BlendState>,
    ) -> RenderPipeline {
        let buffers = layout.buffer_layouts();
        RenderPipelineBuilder::new(&self.label, &self.vertex, &self.fragment)
            .layout(&self.pipeline_layout)
            .vertex_buffers(&buffers)
            .topology(topology)
            .format(format)
            .blend(blend)
            .build(device)
    }

    /// Make the program current on `pass` with `pipeline`.
    pub fn use_program(&self, pass: &mut RenderPass<'_>, pipeline: &RenderPipeline) {
        pass.set_pipeline(pipeline);
        pass.set_bind_group(UNIFORM_GROUP, &self.bind_group, &[]);
        self.active.set(true);
    }

    pub fn unuse(&self) {
        self.active.set(false);
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    /// Write a uniform value. Declared but unresolved names are ignored.
    pub fn set_uniform(&self, name: &str, value: impl Into<UniformValue>) -> Result<(), ProgramError> {
        let location = self
            .uniforms
            .get(name)
            .ok_or_else(|| ProgramError::UndeclaredUniform(name.to_string()))?;
        let Some(location) = location else {
            return Ok(());
        };

        let bytes = value.into().to_bytes();
        if bytes.len() as u32 != location.size {
            return Err(ProgramError::UniformSize {
                name: name.to_string(),
                expected: location.size,
                actual: bytes.len() as u32,
            });
        }

        // Locations only ever point at blocks the program allocated
        if let Some((_, buffer)) = self
            .block_buffers
            .iter()
            .find(|(binding, _)| *binding == location.binding)
        {
            buffer.set_sub_data(&bytes, location.offset as u64)?;
        }
        Ok(())
    }

    /// Resolved location of a declared uniform, `None` if the shaders lack it.
    pub fn uniform_location(&self, name: &str) -> Option<UniformLocation> {
        self.uniforms.get(name).copied().flatten()
    }

    /// Binding a requested uniform block resolved to.
    pub fn uniform_block_binding(&self, name: &str) -> Option<u32> {
        self.resolved_blocks.get(name).copied()
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::shaders::{FADE_FS, FADE_VS, POINT_FS, POINT_VS};

    fn stage_info(stage: Stage, source: &str) -> StageInfo {
        let module = parse_stage(stage, "test", source).unwrap();
        validate_stage(&module, source).unwrap();
        reflect(&module, stage)
    }

    fn builtin(id: &str) -> String {
        ShaderLibrary::builtin().source(id).unwrap().to_string()
    }

    #[test]
    fn test_point_uniform_offsets() {
        let info = stage_info(Stage::Vertex, &builtin(POINT_VS));
        assert_eq!(info.blocks.len(), 1);
        let block = &info.blocks[0];
        assert_eq!((block.group, block.binding, block.size), (0, 0, 32));

        let expected = [
            ("point_color", 0, 12),
            ("point_size", 12, 4),
            ("flip_x", 16, 4),
            ("flip_y", 20, 4),
            ("viewport_size", 24, 4),
            ("point_mode", 28, 4),
        ];
        for (name, offset, size) in expected {
            assert_eq!(
                resolve_uniform(&info.blocks, name),
                Some(UniformLocation {
                    binding: 0,
                    offset,
                    size
                }),
                "{}",
                name
            );
        }
        assert_eq!(resolve_uniform(&info.blocks, "fade_rate"), None);
    }

    #[test]
    fn test_builtin_programs_link() {
        let point = link(
            &stage_info(Stage::Vertex, &builtin(POINT_VS)),
            &stage_info(Stage::Fragment, &builtin(POINT_FS)),
        )
        .unwrap();
        assert_eq!(point.len(), 1);

        let fade = link(
            &stage_info(Stage::Vertex, &builtin(FADE_VS)),
            &stage_info(Stage::Fragment, &builtin(FADE_FS)),
        )
        .unwrap();
        let uniform_blocks: Vec<_> = fade.iter().filter(|b| b.group == UNIFORM_GROUP).collect();
        assert_eq!(uniform_blocks.len(), 1);
        assert_eq!(padded_size(uniform_blocks[0].size), 16);
    }

    #[test]
    fn test_parse_error_is_compile_error() {
        let err = parse_stage(Stage::Fragment, "broken", "fn fs_main( {").unwrap_err();
        match err {
            ProgramError::Compile { stage, id, log } => {
                assert_eq!(stage, Stage::Fragment);
                assert_eq!(id, "broken");
                assert!(!log.is_empty());
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_link_rejects_missing_varying() {
        let vertex = stage_info(
            Stage::Vertex,
            "@vertex fn vs_main() -> @builtin(position) vec4<f32> { return vec4<f32>(0.0); }",
        );
        let fragment = stage_info(
            Stage::Fragment,
            "@fragment fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> { return vec4<f32>(uv, 0.0, 1.0); }",
        );
        let log = link(&vertex, &fragment).unwrap_err();
        assert!(log.contains("@location(0)"), "{}", log);
    }

    #[test]
    fn test_link_rejects_type_mismatch() {
        let vertex = stage_info(
            Stage::Vertex,
            "struct Out { @builtin(position) p: vec4<f32>, @location(0) v: vec3<f32> };
             @vertex fn vs_main() -> Out { var o: Out; o.p = vec4<f32>(0.0); o.v = vec3<f32>(0.0); return o; }",
        );
        let fragment = stage_info(
            Stage::Fragment,
            "@fragment fn fs_main(@location(0) v: vec2<f32>) -> @location(0) vec4<f32> { return vec4<f32>(v, 0.0, 1.0); }",
        );
        assert!(link(&vertex, &fragment).is_err());
    }

    #[test]
    fn test_link_requires_entry_points() {
        let vertex = stage_info(
            Stage::Vertex,
            "@vertex fn main() -> @builtin(position) vec4<f32> { return vec4<f32>(0.0); }",
        );
        let fragment = stage_info(Stage::Fragment, &builtin(POINT_FS));
        let log = link(&vertex, &fragment).unwrap_err();
        assert!(log.contains(VERTEX_ENTRY));
    }

    #[test]
    fn test_link_rejects_block_layout_mismatch() {
        let vertex = stage_info(
            Stage::Vertex,
            "struct U { a: f32 };
             @group(0) @binding(0) var<uniform> u: U;
             @vertex fn vs_main() -> @builtin(position) vec4<f32> { return vec4<f32>(u.a); }",
        );
        let fragment = stage_info(
            Stage::Fragment,
            "struct U { a: vec4<f32> };
             @group(0) @binding(0) var<uniform> u: U;
             @fragment fn fs_main() -> @location(0) vec4<f32> { return u.a; }",
        );
        let log = link(&vertex, &fragment).unwrap_err();
        assert!(log.contains("differs"));
    }

    #[test]
    fn test_resolve_blocks_keeps_shader_binding() {
        let info = stage_info(Stage::Fragment, &builtin(POINT_FS));
        let resolved = resolve_blocks(&info.blocks, &[("params", 3), ("Missing", 1)], "test");
        assert_eq!(resolved.get("params"), Some(&0));
        assert!(!resolved.contains_key("Missing"));

        let by_type = resolve_blocks(&info.blocks, &[("PointUniforms", 0)], "test");
        assert_eq!(by_type.get("PointUniforms"), Some(&0));
    }

    #[test]
    fn test_uniform_value_bytes() {
        assert_eq!(UniformValue::Float(1.0).to_bytes().len(), 4);
        assert_eq!(UniformValue::Vec3([1.0, 0.0, 1.0]).to_bytes().len(), 12);
        assert_eq!(
            UniformValue::Bool(true).to_bytes(),
            1.0f32.to_ne_bytes().to_vec()
        );
        assert_eq!(
            UniformValue::Bool(false).to_bytes(),
            0.0f32.to_ne_bytes().to_vec()
        );
    }

    #[test]
    fn test_padded_size() {
        assert_eq!(padded_size(0), 16);
        assert_eq!(padded_size(4), 16);
        assert_eq!(padded_size(32), 32);
        assert_eq!(padded_size(33), 48);
    }
}
