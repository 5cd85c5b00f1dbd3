/// Bind groups: named resource slots applied together to a program
///
/// A `BindGroupLayout` declares the slots (uniform buffers and texture +
/// sampler pairs) a program reads from one group. A `BindGroup` only records
/// which resource occupies each slot; nothing reaches the context until
/// `apply`, which routes every slot to the program:
///
/// - uniform buffers go to the uniform block of the same name (buffer range
///   bind) or, without blocks, to the `name.field` uniforms of the struct;
/// - textures go to the unit the program reserved for the sampler uniform
///   of the same name, video textures pulling a frame first.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashSet;

use crate::buffer::std140::StructLayout;
use crate::buffer::{Buffer, BufferUsage, StructuredBuffer};
use crate::device::shared::DeviceShared;
use crate::error::{Error, Result};
use crate::program::{Program, UniformValue};
use crate::sampler::Sampler;
use crate::texture::Texture;
use crate::{gpu_bail, gpu_trace};

const SOURCE: &str = "galaxy3d::gpu::BindGroup";

// ============================================================================
// Binding types and layout description
// ============================================================================

/// Type of resource bound at a given slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingType {
    /// Uniform buffer (read-only structured data)
    UniformBuffer,
    /// Combined image sampler (texture + sampler in one binding)
    CombinedImageSampler,
}

/// Description of a single slot within a BindGroupLayout
#[derive(Debug, Clone)]
pub struct BindGroupLayoutEntry {
    /// Uniform block / struct uniform name, or sampler uniform name
    pub name: String,
    pub binding_type: BindingType,
    /// std140 layout of the struct a uniform buffer slot holds
    pub struct_layout: Option<Rc<StructLayout>>,
    /// Byte offset supplied at apply time
    pub has_dynamic_offset: bool,
}

impl BindGroupLayoutEntry {
    pub fn uniform_buffer(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            binding_type: BindingType::UniformBuffer,
            struct_layout: None,
            has_dynamic_offset: false,
        }
    }

    /// Uniform buffer slot holding a struct of known layout
    pub fn structured(name: impl Into<String>, layout: Rc<StructLayout>) -> Self {
        Self {
            struct_layout: Some(layout),
            ..Self::uniform_buffer(name)
        }
    }

    pub fn texture(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            binding_type: BindingType::CombinedImageSampler,
            struct_layout: None,
            has_dynamic_offset: false,
        }
    }

    pub fn with_dynamic_offset(mut self) -> Self {
        self.has_dynamic_offset = true;
        self
    }
}

/// Blueprint of a bind group
#[derive(Debug, Clone)]
pub struct BindGroupLayout {
    entries: Vec<BindGroupLayoutEntry>,
}

impl BindGroupLayout {
    pub fn new(entries: Vec<BindGroupLayoutEntry>) -> Result<Self> {
        let mut names = FxHashSet::default();
        for entry in &entries {
            if entry.name.is_empty() {
                gpu_bail!(InvalidUsage, SOURCE, "Bind group layout entry without a name");
            }
            if !names.insert(entry.name.as_str()) {
                gpu_bail!(InvalidUsage, SOURCE, "Bind group layout declares '{}' twice", entry.name);
            }
            if entry.has_dynamic_offset && entry.binding_type != BindingType::UniformBuffer {
                gpu_bail!(
                    InvalidUsage,
                    SOURCE,
                    "Dynamic offset on non-buffer slot '{}'",
                    entry.name
                );
            }
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[BindGroupLayoutEntry] {
        &self.entries
    }

    pub fn entry(&self, name: &str) -> Option<(usize, &BindGroupLayoutEntry)> {
        self.entries.iter().enumerate().find(|(_, e)| e.name == name)
    }

    /// Number of offsets `BindGroup::apply` expects
    pub fn dynamic_offset_count(&self) -> usize {
        self.entries.iter().filter(|e| e.has_dynamic_offset).count()
    }
}

// ============================================================================
// Bind group
// ============================================================================

/// Resource occupying one slot
#[derive(Clone)]
pub enum BindingResource {
    Buffer(Rc<Buffer>),
    Structured(Rc<StructuredBuffer>),
    Texture {
        texture: Rc<Texture>,
        /// `None` uses the texture's own sampler options
        sampler: Option<Rc<Sampler>>,
    },
}

/// Set of resources filling the slots of a layout
pub struct BindGroup {
    device: Rc<DeviceShared>,
    layout: Rc<BindGroupLayout>,
    slots: RefCell<Vec<Option<BindingResource>>>,
    label: Option<String>,
}

impl BindGroup {
    pub(crate) fn new(device: &Rc<DeviceShared>, layout: Rc<BindGroupLayout>, label: Option<String>) -> Rc<Self> {
        let slots = vec![None; layout.entries().len()];
        Rc::new(Self {
            device: device.clone(),
            layout,
            slots: RefCell::new(slots),
            label,
        })
    }

    pub fn layout(&self) -> &Rc<BindGroupLayout> {
        &self.layout
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    fn slot(&self, name: &str, expected: BindingType) -> Result<(usize, &BindGroupLayoutEntry)> {
        match self.layout.entry(name) {
            Some((index, entry)) if entry.binding_type == expected => Ok((index, entry)),
            Some(_) => gpu_bail!(InvalidUsage, SOURCE, "Slot '{}' is not a {:?} slot", name, expected),
            None => gpu_bail!(InvalidUsage, SOURCE, "Bind group layout has no slot '{}'", name),
        }
    }

    pub fn resource(&self, name: &str) -> Option<BindingResource> {
        let (index, _) = self.layout.entry(name)?;
        self.slots.borrow()[index].clone()
    }

    /// Every slot holds a resource
    pub fn is_complete(&self) -> bool {
        self.slots.borrow().iter().all(Option::is_some)
    }

    /// Put a raw uniform buffer in slot `name`
    pub fn set_buffer(&self, name: &str, buffer: Rc<Buffer>) -> Result<()> {
        let (index, entry) = self.slot(name, BindingType::UniformBuffer)?;
        if !buffer.usage().contains(BufferUsage::UNIFORM) {
            gpu_bail!(
                InvalidUsage,
                SOURCE,
                "Buffer bound to '{}' was not created with UNIFORM usage",
                name
            );
        }
        if let Some(layout) = &entry.struct_layout {
            if buffer.size() < layout.size() {
                gpu_bail!(
                    InvalidUsage,
                    SOURCE,
                    "Buffer of {} bytes is smaller than '{}' ({} bytes)",
                    buffer.size(),
                    layout.name(),
                    layout.size()
                );
            }
        }
        self.slots.borrow_mut()[index] = Some(BindingResource::Buffer(buffer));
        Ok(())
    }

    pub fn set_structured_buffer(&self, name: &str, buffer: Rc<StructuredBuffer>) -> Result<()> {
        let (index, _) = self.slot(name, BindingType::UniformBuffer)?;
        self.slots.borrow_mut()[index] = Some(BindingResource::Structured(buffer));
        Ok(())
    }

    pub fn set_texture(&self, name: &str, texture: Rc<Texture>, sampler: Option<Rc<Sampler>>) -> Result<()> {
        let (index, _) = self.slot(name, BindingType::CombinedImageSampler)?;
        self.slots.borrow_mut()[index] = Some(BindingResource::Texture { texture, sampler });
        Ok(())
    }

    /// Structured buffer behind slot `name`, created on first use from the
    /// slot's struct layout
    pub fn structured_buffer(&self, name: &str) -> Result<Rc<StructuredBuffer>> {
        let (index, entry) = self.slot(name, BindingType::UniformBuffer)?;
        if let Some(resource) = &self.slots.borrow()[index] {
            return match resource {
                BindingResource::Structured(buffer) => Ok(buffer.clone()),
                _ => Err(Error::InvalidUsage(format!(
                    "Slot '{}' holds a raw buffer, values cannot be set by path",
                    name
                ))),
            };
        }
        let Some(layout) = entry.struct_layout.clone() else {
            gpu_bail!(InvalidUsage, SOURCE, "Slot '{}' has no struct layout", name);
        };
        let buffer = StructuredBuffer::new(&self.device, layout)?;
        self.slots.borrow_mut()[index] = Some(BindingResource::Structured(buffer.clone()));
        Ok(buffer)
    }

    /// Write `value` at `path` in the struct held by slot `name`
    pub fn set_value(&self, name: &str, path: &str, value: &UniformValue) -> Result<()> {
        self.structured_buffer(name)?.set_value(path, value)
    }

    pub fn get_value(&self, name: &str, path: &str) -> Option<UniformValue> {
        match self.resource(name)? {
            BindingResource::Structured(buffer) => buffer.get_value(path),
            _ => None,
        }
    }

    /// Route every slot to `program`. `dynamic_offsets` are consumed in slot
    /// order by the slots declared with a dynamic offset.
    pub fn apply(&self, program: &Program, dynamic_offsets: &[u32]) -> Result<()> {
        let expected = self.layout.dynamic_offset_count();
        if dynamic_offsets.len() != expected {
            gpu_bail!(
                InvalidUsage,
                SOURCE,
                "Bind group expects {} dynamic offsets, got {}",
                expected,
                dynamic_offsets.len()
            );
        }
        let mut offsets = dynamic_offsets.iter().copied();
        let slots = self.slots.borrow().clone();
        for (entry, resource) in self.layout.entries().iter().zip(slots) {
            let offset = if entry.has_dynamic_offset {
                offsets.next().unwrap_or(0)
            } else {
                0
            };
            let Some(resource) = resource else {
                gpu_bail!(InvalidResource, SOURCE, "Slot '{}' has no resource", entry.name);
            };
            match resource {
                BindingResource::Structured(buffer) => {
                    program.bind_block(&entry.name, buffer.buffer(), Some(buffer.layout()), offset)?;
                }
                BindingResource::Buffer(buffer) => {
                    program.bind_block(&entry.name, &buffer, entry.struct_layout.as_ref(), offset)?;
                }
                BindingResource::Texture { texture, sampler } => {
                    let Some(unit) = program.texture_unit(&entry.name)? else {
                        gpu_trace!(SOURCE, "Program does not sample '{}'", entry.name);
                        continue;
                    };
                    if texture.needs_pump_on_apply() {
                        texture.pump()?;
                    }
                    texture.bind_to_unit(unit, sampler.as_ref())?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "bind_group_tests.rs"]
mod tests;
