/// GPU program: compiled vertex + fragment shader pair
///
/// Attribute locations are fixed by vertex semantic before linking, so any
/// vertex layout works with any program. Reflection runs on first use and
/// produces the program's binding plan:
///
/// * one typed setter per active default-block uniform (and per element of
///   uniform arrays), keyed by name;
/// * one texture unit per sampler uniform element, assigned in reflection
///   order;
/// * a binding point per active uniform block (extended tier).
///
/// Uniform blocks are fed from structured buffers with `set_block`. Without
/// block support the same struct is pushed field by field from the buffer's
/// shadow, through a per-(block, layout) plan built once.

mod uniform;

pub use uniform::{make_setter, scalar_family, Components, ScalarFamily, SetterFn, UniformValue};

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::bind_group::BindGroupLayout;
use crate::buffer::std140::{LayoutLeaf, StructLayout};
use crate::buffer::{Buffer, StructuredBuffer};
use crate::context::{gl, NativeProgram, NativeShader, UniformData, UniformType};
use crate::device::shared::DeviceShared;
use crate::error::{Error, Result};
use crate::object::{GpuObject, ObjectBase, ObjectKind, RestoreHandler};
use crate::vertex_layout::VertexSemantic;
use crate::{gpu_bail, gpu_debug, gpu_error, gpu_trace};

const SOURCE: &str = "galaxy3d::gpu::Program";

/// Shader stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex shader
    Vertex,
    /// Fragment/Pixel shader
    Fragment,
}

impl ShaderStage {
    pub fn to_gl(self) -> u32 {
        match self {
            ShaderStage::Vertex => gl::VERTEX_SHADER,
            ShaderStage::Fragment => gl::FRAGMENT_SHADER,
        }
    }
}

/// Descriptor for creating a program
#[derive(Clone, Default)]
pub struct ProgramDesc {
    pub vertex_source: String,
    pub fragment_source: String,
    /// Bind group layouts, by group index
    pub bind_group_layouts: Vec<Rc<BindGroupLayout>>,
    pub label: Option<String>,
}

impl ProgramDesc {
    pub fn new(vertex_source: impl Into<String>, fragment_source: impl Into<String>) -> Self {
        Self {
            vertex_source: vertex_source.into(),
            fragment_source: fragment_source.into(),
            ..Default::default()
        }
    }

    pub fn with_bind_group_layout(mut self, layout: Rc<BindGroupLayout>) -> Self {
        self.bind_group_layouts.push(layout);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

struct UniformSlot {
    uniform_type: UniformType,
    size: u32,
    setter: SetterFn,
}

#[derive(Debug, Clone, Copy)]
struct BlockSlot {
    binding: u32,
    data_size: u32,
}

/// (uniform name, leaf) pairs a legacy block upload walks
type BlockPlan = Rc<Vec<(String, LayoutLeaf)>>;

#[derive(Default)]
struct Reflection {
    uniforms: FxHashMap<String, UniformSlot>,
    texture_units: FxHashMap<String, u32>,
    blocks: FxHashMap<String, BlockSlot>,
    /// Keyed by block name and layout address
    block_plans: FxHashMap<(String, u64), BlockPlan>,
}

/// Linked GPU program
pub struct Program {
    base: ObjectBase,
    device: Rc<DeviceShared>,
    vertex_source: String,
    fragment_source: String,
    layouts: Vec<Rc<BindGroupLayout>>,
    handle: Cell<Option<NativeProgram>>,
    /// Compile or link failure of the last build
    failure: RefCell<Option<Error>>,
    reflection: RefCell<Option<Reflection>>,
    restore_handler: RestoreHandler<Program>,
}

impl Program {
    /// Build the program. A compile or link failure does not fail creation:
    /// it is kept on the program (`status`, `error_log`) and every use of
    /// the program reports it.
    pub(crate) fn new(device: &Rc<DeviceShared>, desc: ProgramDesc) -> Result<Rc<Self>> {
        if desc.vertex_source.trim().is_empty() || desc.fragment_source.trim().is_empty() {
            gpu_bail!(InvalidUsage, SOURCE, "Program needs a vertex and a fragment source");
        }
        let program = Rc::new(Self {
            base: ObjectBase::new(),
            device: device.clone(),
            vertex_source: desc.vertex_source,
            fragment_source: desc.fragment_source,
            layouts: desc.bind_group_layouts,
            handle: Cell::new(None),
            failure: RefCell::new(None),
            reflection: RefCell::new(None),
            restore_handler: RestoreHandler::new(),
        });
        if let Some(label) = desc.label {
            program.base.set_label(label);
        }
        device.register(&program);
        if !program.is_disposed() {
            // failure is recorded on the program
            let _ = program.create_native();
        }
        Ok(program)
    }

    pub fn native(&self) -> Option<NativeProgram> {
        self.handle.get()
    }

    /// `Ok` once linked, otherwise the compile or link error
    pub fn status(&self) -> Result<()> {
        match self.failure.borrow().as_ref() {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    /// Compile or link log of a failed build
    pub fn error_log(&self) -> Option<String> {
        self.failure.borrow().as_ref().map(|error| match error {
            Error::ShaderCompile { log, .. } => log.clone(),
            Error::ProgramLink(log) => log.clone(),
            other => other.to_string(),
        })
    }

    pub fn bind_group_layouts(&self) -> &[Rc<BindGroupLayout>] {
        &self.layouts
    }

    pub fn bind_group_layout(&self, index: usize) -> Option<&Rc<BindGroupLayout>> {
        self.layouts.get(index)
    }

    pub fn set_restore_handler(&self, handler: impl FnMut(&Program) + 'static) {
        self.restore_handler.set(handler);
    }

    // ===== BUILD =====

    fn compile(&self, stage: ShaderStage, source: &str) -> Result<NativeShader> {
        let gl = self.device.gl();
        let shader = gl
            .create_shader(stage.to_gl())
            .ok_or_else(|| Error::BackendError(format!("Failed to create {:?} shader", stage)))?;
        gl.shader_source(shader, source);
        gl.compile_shader(shader);
        if !gl.get_shader_compile_status(shader) {
            let log = gl.get_shader_info_log(shader);
            gl.delete_shader(shader);
            gpu_error!(SOURCE, "Program {}: {:?} shader failed to compile:\n{}", self.uid(), stage, log);
            return Err(Error::ShaderCompile { stage, log });
        }
        Ok(shader)
    }

    fn build(&self) -> Result<NativeProgram> {
        let gl = self.device.gl();
        let vertex = self.compile(ShaderStage::Vertex, &self.vertex_source)?;
        let fragment = match self.compile(ShaderStage::Fragment, &self.fragment_source) {
            Ok(shader) => shader,
            Err(e) => {
                gl.delete_shader(vertex);
                return Err(e);
            }
        };
        let Some(program) = gl.create_program() else {
            gl.delete_shader(vertex);
            gl.delete_shader(fragment);
            return Err(Error::BackendError("Failed to create program".to_string()));
        };
        gl.attach_shader(program, vertex);
        gl.attach_shader(program, fragment);
        let max_attributes = self.device.caps().misc.max_vertex_attributes;
        for semantic in VertexSemantic::all() {
            if semantic.location() < max_attributes {
                gl.bind_attrib_location(program, semantic.location(), &semantic.attribute_name());
            }
        }
        gl.link_program(program);
        let linked = gl.get_program_link_status(program);
        gl.detach_shader(program, vertex);
        gl.detach_shader(program, fragment);
        gl.delete_shader(vertex);
        gl.delete_shader(fragment);
        if !linked {
            let log = gl.get_program_info_log(program);
            gl.delete_program(program);
            gpu_error!(SOURCE, "Program {} failed to link:\n{}", self.uid(), log);
            return Err(Error::ProgramLink(log));
        }
        Ok(program)
    }

    // ===== USE =====

    /// Make the program current, reflecting it on first use.
    /// Returns false while the context is lost.
    pub(crate) fn activate(&self) -> Result<bool> {
        if self.device.is_lost() {
            return Ok(false);
        }
        if self.is_disposed() {
            self.reload()?;
        }
        self.status()?;
        let Some(handle) = self.handle.get() else {
            gpu_bail!(InvalidResource, SOURCE, "Program {} has no native program", self.uid());
        };
        self.device.use_program(Some(handle));
        if self.reflection.borrow().is_none() {
            let reflection = self.reflect(handle)?;
            *self.reflection.borrow_mut() = Some(reflection);
        }
        Ok(true)
    }

    fn reflect(&self, handle: NativeProgram) -> Result<Reflection> {
        let gl = self.device.gl();
        let caps = self.device.caps();
        let mut reflection = Reflection::default();

        if self.device.tier().is_extended() {
            for (binding, block) in gl.get_active_uniform_blocks(handle).into_iter().enumerate() {
                let binding = binding as u32;
                if binding >= caps.shader.max_uniform_buffer_bindings {
                    gpu_bail!(
                        Unsupported,
                        SOURCE,
                        "Program {} uses more than {} uniform blocks",
                        self.uid(),
                        caps.shader.max_uniform_buffer_bindings
                    );
                }
                gl.uniform_block_binding(handle, block.index, binding);
                reflection.blocks.insert(
                    block.name,
                    BlockSlot {
                        binding,
                        data_size: block.data_size,
                    },
                );
            }
        }

        let mut next_unit = 0u32;
        for active in gl.get_active_uniforms(handle) {
            if active.block_index.is_some() {
                continue;
            }
            let base = active.name.strip_suffix("[0]").unwrap_or(&active.name).to_string();
            let Some(location) = gl.get_uniform_location(handle, &active.name) else {
                continue;
            };
            let size = active.size.max(1);

            if active.uniform_type.is_sampler() {
                if next_unit + size > caps.shader.max_texture_units {
                    gpu_bail!(
                        Unsupported,
                        SOURCE,
                        "Program {} needs more than {} texture units",
                        self.uid(),
                        caps.shader.max_texture_units
                    );
                }
                let units: Vec<i32> = (next_unit..next_unit + size).map(|u| u as i32).collect();
                gl.uniform(location, UniformData::Int { components: 1, values: &units });
                reflection.texture_units.insert(base.clone(), next_unit);
                for i in 0..size {
                    reflection.texture_units.insert(format!("{}[{}]", base, i), next_unit + i);
                }
                next_unit += size;
            }

            if size > 1 {
                for i in 1..size {
                    let element = format!("{}[{}]", base, i);
                    if let Some(element_location) = gl.get_uniform_location(handle, &element) {
                        reflection.uniforms.insert(
                            element.clone(),
                            UniformSlot {
                                uniform_type: active.uniform_type,
                                size: 1,
                                setter: make_setter(&element, active.uniform_type, 1, element_location),
                            },
                        );
                    }
                }
                let first = format!("{}[0]", base);
                reflection.uniforms.insert(
                    first.clone(),
                    UniformSlot {
                        uniform_type: active.uniform_type,
                        size: 1,
                        setter: make_setter(&first, active.uniform_type, 1, location),
                    },
                );
            }
            reflection.uniforms.insert(
                base.clone(),
                UniformSlot {
                    uniform_type: active.uniform_type,
                    size,
                    setter: make_setter(&base, active.uniform_type, size, location),
                },
            );
        }

        gpu_debug!(
            SOURCE,
            "Program {} reflected: {} uniforms, {} texture units, {} blocks",
            self.uid(),
            reflection.uniforms.len(),
            next_unit,
            reflection.blocks.len()
        );
        Ok(reflection)
    }

    /// Whether `name` is an active default-block uniform
    pub fn has_uniform(&self, name: &str) -> Result<bool> {
        if !self.activate()? {
            return Ok(false);
        }
        Ok(self
            .reflection
            .borrow()
            .as_ref()
            .is_some_and(|r| r.uniforms.contains_key(name)))
    }

    /// Declared type and element count of an active uniform
    pub fn uniform_info(&self, name: &str) -> Option<(UniformType, u32)> {
        self.reflection
            .borrow()
            .as_ref()
            .and_then(|r| r.uniforms.get(name).map(|s| (s.uniform_type, s.size)))
    }

    /// Texture unit reserved for a sampler uniform (`name` or `name[i]`)
    pub fn texture_unit(&self, name: &str) -> Result<Option<u32>> {
        if !self.activate()? {
            return Ok(None);
        }
        Ok(self
            .reflection
            .borrow()
            .as_ref()
            .and_then(|r| r.texture_units.get(name).copied()))
    }

    /// Whether the program declares the uniform block `name` (extended tier)
    pub fn has_block(&self, name: &str) -> Result<bool> {
        if !self.activate()? {
            return Ok(false);
        }
        Ok(self
            .reflection
            .borrow()
            .as_ref()
            .is_some_and(|r| r.blocks.contains_key(name)))
    }

    /// Set a uniform. Structs and arrays are flattened to `name.field` and
    /// `name[index]`. Uniforms the program does not use are ignored.
    pub fn set_uniform(&self, name: &str, value: &UniformValue) -> Result<()> {
        if !self.activate()? {
            return Ok(());
        }
        self.set_uniform_value(name, value)
    }

    fn set_uniform_value(&self, name: &str, value: &UniformValue) -> Result<()> {
        match value {
            UniformValue::Struct(fields) => {
                for (field, field_value) in fields {
                    self.set_uniform_value(&format!("{}.{}", name, field), field_value)?;
                }
                Ok(())
            }
            UniformValue::Array(elements) => {
                for (i, element) in elements.iter().enumerate() {
                    self.set_uniform_value(&format!("{}[{}]", name, i), element)?;
                }
                Ok(())
            }
            leaf => {
                let components = leaf
                    .components()
                    .ok_or_else(|| Error::InvalidUsage(format!("'{}' has no value", name)))?;
                self.upload(name, &components)
            }
        }
    }

    fn upload(&self, name: &str, components: &Components) -> Result<()> {
        let reflection = self.reflection.borrow();
        match reflection.as_ref().and_then(|r| r.uniforms.get(name)) {
            Some(slot) => (slot.setter)(self.device.gl(), components),
            None => {
                gpu_trace!(SOURCE, "Program {} has no active uniform '{}'", self.uid(), name);
                Ok(())
            }
        }
    }

    /// Feed the uniform block `name` from a structured buffer, starting at
    /// byte `offset`
    pub fn set_block(&self, name: &str, buffer: &StructuredBuffer, offset: u32) -> Result<()> {
        self.bind_block(name, buffer.buffer(), Some(buffer.layout()), offset)
    }

    /// Route `buffer` to block `name`: a buffer range bind when the program
    /// has the block, otherwise the legacy per-field upload from the shadow
    pub(crate) fn bind_block(
        &self,
        name: &str,
        buffer: &Rc<Buffer>,
        layout: Option<&Rc<StructLayout>>,
        offset: u32,
    ) -> Result<()> {
        if !self.activate()? {
            return Ok(());
        }
        let block = self
            .reflection
            .borrow()
            .as_ref()
            .and_then(|r| r.blocks.get(name).copied());

        if let Some(block) = block {
            let alignment = self.device.caps().shader.uniform_buffer_offset_alignment.max(1);
            if offset % alignment != 0 {
                gpu_bail!(
                    InvalidUsage,
                    SOURCE,
                    "Offset {} for block '{}' is not a multiple of {}",
                    offset,
                    name,
                    alignment
                );
            }
            let size = layout.map(|l| l.size()).unwrap_or(block.data_size).max(block.data_size);
            if offset as u64 + size as u64 > buffer.size() as u64 {
                gpu_bail!(
                    InvalidUsage,
                    SOURCE,
                    "Block '{}' needs {} bytes at offset {}, buffer has {}",
                    name,
                    size,
                    offset,
                    buffer.size()
                );
            }
            if !buffer.ensure_live()? {
                return Ok(());
            }
            self.device
                .gl()
                .bind_buffer_range(gl::UNIFORM_BUFFER, block.binding, buffer.native(), offset, size);
            return Ok(());
        }

        let Some(layout) = layout else {
            gpu_trace!(SOURCE, "Program {} has no block '{}'", self.uid(), name);
            return Ok(());
        };
        let plan = self.block_plan(name, layout);
        if plan.is_empty() {
            return Ok(());
        }
        let result = buffer.with_shadow(|bytes| -> Result<()> {
            let bytes = bytes.get(offset as usize..).unwrap_or(&[]);
            for (uniform, leaf) in plan.iter() {
                if let Some(components) = layout.read_components(leaf, bytes) {
                    self.upload(uniform, &components)?;
                }
            }
            Ok(())
        });
        match result {
            Some(result) => result,
            None => {
                gpu_bail!(
                    InvalidUsage,
                    SOURCE,
                    "Block '{}' needs a buffer with a shadow copy on this context",
                    name
                )
            }
        }
    }

    /// Leaves of `layout` the program has a uniform for, resolved once
    fn block_plan(&self, name: &str, layout: &Rc<StructLayout>) -> BlockPlan {
        let key = (name.to_string(), layout.id());
        if let Some(plan) = self.reflection.borrow().as_ref().and_then(|r| r.block_plans.get(&key)) {
            return plan.clone();
        }
        let plan: BlockPlan = {
            let reflection = self.reflection.borrow();
            let uniforms = reflection.as_ref().map(|r| &r.uniforms);
            Rc::new(
                layout
                    .leaves()
                    .iter()
                    .filter_map(|leaf| {
                        let uniform = format!("{}.{}", name, leaf.path);
                        uniforms
                            .is_some_and(|u| u.contains_key(&uniform))
                            .then(|| (uniform, leaf.clone()))
                    })
                    .collect(),
            )
        };
        if let Some(reflection) = self.reflection.borrow_mut().as_mut() {
            reflection.block_plans.insert(key, plan.clone());
        }
        plan
    }
}

impl GpuObject for Program {
    fn base(&self) -> &ObjectBase {
        &self.base
    }

    fn kind(&self) -> ObjectKind {
        ObjectKind::Program
    }

    fn native_ids(&self) -> Vec<u32> {
        self.handle.get().map(|h| h.id()).into_iter().collect()
    }

    fn release_native(&self, delete: bool) {
        if let Some(handle) = self.handle.take() {
            if delete {
                if self.device.current_program() == Some(handle) {
                    self.device.use_program(None);
                }
                self.device.gl().delete_program(handle);
            }
        }
        *self.reflection.borrow_mut() = None;
    }

    fn create_native(&self) -> Result<()> {
        if self.handle.get().is_some() {
            return Ok(());
        }
        *self.reflection.borrow_mut() = None;
        match self.build() {
            Ok(handle) => {
                self.handle.set(Some(handle));
                *self.failure.borrow_mut() = None;
                gpu_debug!(SOURCE, "Linked program {}", self.uid());
                Ok(())
            }
            Err(error) => {
                *self.failure.borrow_mut() = Some(error.clone());
                Err(error)
            }
        }
    }

    fn on_restored(&self) {
        self.restore_handler.invoke(self);
    }
}

impl Drop for Program {
    fn drop(&mut self) {
        if !self.device.is_lost() {
            self.release_native(true);
        }
        self.device.unregister(self.base.registry_key());
    }
}

#[cfg(test)]
#[path = "program_tests.rs"]
mod tests;
