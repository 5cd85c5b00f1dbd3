/// Vertex input layout: which buffers feed which attribute locations
///
/// Attribute locations are fixed per semantic so programs can bind them by
/// name before linking. When vertex array objects are available the layout
/// records its attribute setup once in a native VAO and only re-records it
/// after one of its buffers got a new native handle. Without VAOs the setup
/// is re-issued on every bind.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::buffer::{Buffer, BufferUsage, IndexBuffer};
use crate::context::{gl, NativeVertexArray};
use crate::device::shared::DeviceShared;
use crate::error::{Error, Result};
use crate::object::{GpuObject, ObjectBase, ObjectKind};
use crate::{gpu_bail, gpu_trace};

const SOURCE: &str = "galaxy3d::gpu::VertexLayout";

/// Number of texture coordinate sets with a reserved location
pub const MAX_TEX_COORDS: u8 = 8;

/// Meaning of a vertex attribute, mapped to a fixed location and name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexSemantic {
    Position,
    Normal,
    /// Vertex color
    Diffuse,
    Tangent,
    /// Texture coordinate set 0..8
    TexCoord(u8),
    BlendIndices,
    BlendWeights,
}

impl VertexSemantic {
    /// Every semantic, in location order
    pub fn all() -> Vec<VertexSemantic> {
        let mut all = vec![
            VertexSemantic::Position,
            VertexSemantic::Normal,
            VertexSemantic::Diffuse,
            VertexSemantic::Tangent,
        ];
        all.extend((0..MAX_TEX_COORDS).map(VertexSemantic::TexCoord));
        all.push(VertexSemantic::BlendIndices);
        all.push(VertexSemantic::BlendWeights);
        all
    }

    pub fn location(self) -> u32 {
        match self {
            VertexSemantic::Position => 0,
            VertexSemantic::Normal => 1,
            VertexSemantic::Diffuse => 2,
            VertexSemantic::Tangent => 3,
            VertexSemantic::TexCoord(set) => 4 + set as u32,
            VertexSemantic::BlendIndices => 12,
            VertexSemantic::BlendWeights => 13,
        }
    }

    /// Attribute name shaders declare for this semantic
    pub fn attribute_name(self) -> String {
        match self {
            VertexSemantic::Position => "a_position".to_string(),
            VertexSemantic::Normal => "a_normal".to_string(),
            VertexSemantic::Diffuse => "a_diffuse".to_string(),
            VertexSemantic::Tangent => "a_tangent".to_string(),
            VertexSemantic::TexCoord(set) => format!("a_texCoord{}", set),
            VertexSemantic::BlendIndices => "a_blendIndices".to_string(),
            VertexSemantic::BlendWeights => "a_blendWeights".to_string(),
        }
    }
}

/// Data type and component count of one attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum VertexFormat {
    // Float formats
    R32_SFLOAT,
    R32G32_SFLOAT,
    R32G32B32_SFLOAT,
    R32G32B32A32_SFLOAT,

    // Half float formats (extended tier)
    R16G16_SFLOAT,
    R16G16B16A16_SFLOAT,

    // Integer formats, read as integers by the shader (extended tier)
    R32_SINT,
    R32G32_SINT,
    R32G32B32_SINT,
    R32G32B32A32_SINT,
    R32_UINT,
    R32G32_UINT,
    R32G32B32_UINT,
    R32G32B32A32_UINT,
    R16G16_SINT,
    R16G16B16A16_SINT,
    R16G16_UINT,
    R16G16B16A16_UINT,
    R8G8B8A8_SINT,
    R8G8B8A8_UINT,

    // Normalized formats, read as floats
    R16G16_SNORM,
    R16G16B16A16_SNORM,
    R16G16_UNORM,
    R16G16B16A16_UNORM,
    R8G8B8A8_SNORM,
    R8G8B8A8_UNORM,
}

impl VertexFormat {
    pub fn components(self) -> u32 {
        use VertexFormat::*;
        match self {
            R32_SFLOAT | R32_SINT | R32_UINT => 1,
            R32G32_SFLOAT | R16G16_SFLOAT | R32G32_SINT | R32G32_UINT | R16G16_SINT | R16G16_UINT
            | R16G16_SNORM | R16G16_UNORM => 2,
            R32G32B32_SFLOAT | R32G32B32_SINT | R32G32B32_UINT => 3,
            _ => 4,
        }
    }

    /// Bytes of one component
    fn component_bytes(self) -> u32 {
        match self.gl_type() {
            gl::BYTE | gl::UNSIGNED_BYTE => 1,
            gl::SHORT | gl::UNSIGNED_SHORT | gl::HALF_FLOAT => 2,
            _ => 4,
        }
    }

    pub fn size_bytes(self) -> u32 {
        self.components() * self.component_bytes()
    }

    pub fn gl_type(self) -> u32 {
        use VertexFormat::*;
        match self {
            R32_SFLOAT | R32G32_SFLOAT | R32G32B32_SFLOAT | R32G32B32A32_SFLOAT => gl::FLOAT,
            R16G16_SFLOAT | R16G16B16A16_SFLOAT => gl::HALF_FLOAT,
            R32_SINT | R32G32_SINT | R32G32B32_SINT | R32G32B32A32_SINT => gl::INT,
            R32_UINT | R32G32_UINT | R32G32B32_UINT | R32G32B32A32_UINT => gl::UNSIGNED_INT,
            R16G16_SINT | R16G16B16A16_SINT | R16G16_SNORM | R16G16B16A16_SNORM => gl::SHORT,
            R16G16_UINT | R16G16B16A16_UINT | R16G16_UNORM | R16G16B16A16_UNORM => {
                gl::UNSIGNED_SHORT
            }
            R8G8B8A8_SINT | R8G8B8A8_SNORM => gl::BYTE,
            R8G8B8A8_UINT | R8G8B8A8_UNORM => gl::UNSIGNED_BYTE,
        }
    }

    pub fn is_normalized(self) -> bool {
        use VertexFormat::*;
        matches!(
            self,
            R16G16_SNORM | R16G16B16A16_SNORM | R16G16_UNORM | R16G16B16A16_UNORM | R8G8B8A8_SNORM
                | R8G8B8A8_UNORM
        )
    }

    /// Read as integers by the shader
    pub fn is_integer(self) -> bool {
        matches!(
            self.gl_type(),
            gl::INT | gl::UNSIGNED_INT | gl::SHORT | gl::UNSIGNED_SHORT | gl::BYTE | gl::UNSIGNED_BYTE
        ) && !self.is_normalized()
    }

    /// Whether the legacy tier can feed this format
    pub fn legacy_supported(self) -> bool {
        !self.is_integer() && !matches!(self.gl_type(), gl::HALF_FLOAT | gl::INT | gl::UNSIGNED_INT)
    }
}

/// Per-vertex or per-instance stepping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VertexInputRate {
    #[default]
    Vertex,
    Instance,
}

/// One attribute inside a vertex buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub semantic: VertexSemantic,
    pub format: VertexFormat,
    /// Offset in bytes from the start of the element
    pub offset: u32,
}

impl VertexAttribute {
    pub fn new(semantic: VertexSemantic, format: VertexFormat, offset: u32) -> Self {
        Self {
            semantic,
            format,
            offset,
        }
    }
}

/// One vertex buffer and the attributes it carries
#[derive(Clone)]
pub struct VertexBufferLayout {
    pub buffer: Rc<Buffer>,
    /// Bytes between elements; 0 derives a tightly packed stride
    pub stride: u32,
    pub input_rate: VertexInputRate,
    pub attributes: Vec<VertexAttribute>,
}

impl VertexBufferLayout {
    pub fn new(buffer: Rc<Buffer>, stride: u32, attributes: Vec<VertexAttribute>) -> Self {
        Self {
            buffer,
            stride,
            input_rate: VertexInputRate::Vertex,
            attributes,
        }
    }

    pub fn per_instance(mut self) -> Self {
        self.input_rate = VertexInputRate::Instance;
        self
    }

    fn packed_stride(&self) -> u32 {
        self.attributes
            .iter()
            .map(|a| a.offset.saturating_add(a.format.size_bytes()))
            .max()
            .unwrap_or(0)
    }

    fn effective_stride(&self) -> u32 {
        if self.stride == 0 {
            self.packed_stride()
        } else {
            self.stride
        }
    }
}

/// Descriptor for creating a vertex layout
#[derive(Clone, Default)]
pub struct VertexLayoutDesc {
    pub vertex_buffers: Vec<VertexBufferLayout>,
    pub index_buffer: Option<IndexBuffer>,
    pub label: Option<String>,
}

/// Native identity of every buffer when the VAO was last recorded
type BufferIdentity = Vec<(u64, u32)>;

/// Vertex buffers plus optional index buffer, bound together
pub struct VertexLayout {
    base: ObjectBase,
    device: Rc<DeviceShared>,
    vertex_buffers: Vec<VertexBufferLayout>,
    index_buffer: Option<IndexBuffer>,
    attribute_mask: u32,
    vao: Cell<Option<NativeVertexArray>>,
    recorded: RefCell<Option<BufferIdentity>>,
}

impl VertexLayout {
    pub(crate) fn new(device: &Rc<DeviceShared>, desc: VertexLayoutDesc) -> Result<Rc<Self>> {
        let caps = device.caps();
        let extended = device.tier().is_extended();
        let mut attribute_mask = 0u32;

        for (index, vb) in desc.vertex_buffers.iter().enumerate() {
            if !vb.buffer.usage().contains(BufferUsage::VERTEX) {
                gpu_bail!(InvalidUsage, SOURCE, "Vertex buffer {} lacks VERTEX usage", index);
            }
            if vb.input_rate == VertexInputRate::Instance && !caps.misc.instancing {
                gpu_bail!(Unsupported, SOURCE, "Per-instance data needs instancing support");
            }
            let stride = vb.effective_stride();
            for attr in &vb.attributes {
                let location = attr.semantic.location();
                if let VertexSemantic::TexCoord(set) = attr.semantic {
                    if set >= MAX_TEX_COORDS {
                        gpu_bail!(InvalidUsage, SOURCE, "Texture coordinate set {} out of range", set);
                    }
                }
                if location >= caps.misc.max_vertex_attributes {
                    gpu_bail!(
                        Unsupported,
                        SOURCE,
                        "{:?} needs location {}, context has {} attributes",
                        attr.semantic,
                        location,
                        caps.misc.max_vertex_attributes
                    );
                }
                if attribute_mask & (1 << location) != 0 {
                    gpu_bail!(InvalidUsage, SOURCE, "{:?} is fed twice", attr.semantic);
                }
                if !extended && !attr.format.legacy_supported() {
                    gpu_bail!(Unsupported, SOURCE, "{:?} needs the extended tier", attr.format);
                }
                if attr.offset.saturating_add(attr.format.size_bytes()) > stride {
                    gpu_bail!(
                        InvalidUsage,
                        SOURCE,
                        "{:?} at offset {} overflows stride {}",
                        attr.semantic,
                        attr.offset,
                        stride
                    );
                }
                attribute_mask |= 1 << location;
            }
        }

        let layout = Rc::new(Self {
            base: ObjectBase::new(),
            device: device.clone(),
            vertex_buffers: desc.vertex_buffers,
            index_buffer: desc.index_buffer,
            attribute_mask,
            vao: Cell::new(None),
            recorded: RefCell::new(None),
        });
        if let Some(label) = desc.label {
            layout.base.set_label(label);
        }
        if !device.is_lost() {
            layout.create_native()?;
        }
        device.register(&layout);
        Ok(layout)
    }

    pub fn vertex_buffers(&self) -> &[VertexBufferLayout] {
        &self.vertex_buffers
    }

    pub fn index_buffer(&self) -> Option<&IndexBuffer> {
        self.index_buffer.as_ref()
    }

    /// Bit per attribute location fed by this layout
    pub fn attribute_mask(&self) -> u32 {
        self.attribute_mask
    }

    pub fn has_instance_data(&self) -> bool {
        self.vertex_buffers
            .iter()
            .any(|vb| vb.input_rate == VertexInputRate::Instance)
    }

    pub fn native(&self) -> Option<NativeVertexArray> {
        self.vao.get()
    }

    fn buffer_identity(&self) -> BufferIdentity {
        self.vertex_buffers
            .iter()
            .map(|vb| &vb.buffer)
            .chain(self.index_buffer.as_ref().map(|ib| ib.buffer()))
            .map(|b| (b.uid(), b.cid()))
            .collect()
    }

    /// Make the layout current for the next draw. Returns false while the
    /// context is lost.
    pub(crate) fn bind(&self) -> Result<bool> {
        if self.device.is_lost() {
            return Ok(false);
        }
        if self.is_disposed() {
            self.reload()?;
        }
        for vb in &self.vertex_buffers {
            if !vb.buffer.ensure_live()? {
                return Ok(false);
            }
        }
        if let Some(ib) = &self.index_buffer {
            if !ib.ensure_live()? {
                return Ok(false);
            }
        }

        let gl = self.device.gl();
        if let Some(vao) = self.vao.get() {
            gl.bind_vertex_array(Some(vao));
            let identity = self.buffer_identity();
            if self.recorded.borrow().as_ref() != Some(&identity) {
                gpu_trace!(SOURCE, "Recording vertex array for layout {}", self.uid());
                self.specify_attributes();
                *self.recorded.borrow_mut() = Some(identity);
            }
            return Ok(true);
        }

        // No VAO: attribute enables are global, turn off what the previous
        // layout left on
        let previous = self.device.swap_enabled_attributes(self.attribute_mask);
        let stale = previous & !self.attribute_mask;
        for location in 0..32 {
            if stale & (1 << location) != 0 {
                gl.disable_vertex_attrib_array(location);
            }
        }
        self.specify_attributes();
        Ok(true)
    }

    fn specify_attributes(&self) {
        let gl = self.device.gl();
        let caps = self.device.caps();
        let extended = self.device.tier().is_extended();
        for vb in &self.vertex_buffers {
            let stride = vb.effective_stride();
            gl.bind_buffer(gl::ARRAY_BUFFER, vb.buffer.native());
            for attr in &vb.attributes {
                let location = attr.semantic.location();
                gl.enable_vertex_attrib_array(location);
                if extended && attr.format.is_integer() {
                    gl.vertex_attrib_pointer_i32(
                        location,
                        attr.format.components(),
                        attr.format.gl_type(),
                        stride,
                        attr.offset,
                    );
                } else {
                    gl.vertex_attrib_pointer_f32(
                        location,
                        attr.format.components(),
                        attr.format.gl_type(),
                        attr.format.is_normalized(),
                        stride,
                        attr.offset,
                    );
                }
                if caps.misc.instancing {
                    let divisor = match vb.input_rate {
                        VertexInputRate::Vertex => 0,
                        VertexInputRate::Instance => 1,
                    };
                    gl.vertex_attrib_divisor(location, divisor);
                }
            }
        }
        gl.bind_buffer(gl::ARRAY_BUFFER, None);
        if let Some(ib) = &self.index_buffer {
            gl.bind_buffer(gl::ELEMENT_ARRAY_BUFFER, ib.native());
        }
    }
}

impl GpuObject for VertexLayout {
    fn base(&self) -> &ObjectBase {
        &self.base
    }

    fn kind(&self) -> ObjectKind {
        ObjectKind::VertexLayout
    }

    fn native_ids(&self) -> Vec<u32> {
        self.vao.get().map(|v| vec![v.id()]).unwrap_or_default()
    }

    fn release_native(&self, delete: bool) {
        if let Some(vao) = self.vao.take() {
            if delete {
                self.device.gl().delete_vertex_array(vao);
                self.device.release_vertex_array();
            }
        }
        *self.recorded.borrow_mut() = None;
    }

    fn create_native(&self) -> Result<()> {
        if !self.device.caps().misc.vertex_array_objects {
            return Ok(());
        }
        let vao = self.device.gl().create_vertex_array().ok_or_else(|| {
            Error::BackendError(format!("Failed to create vertex array for layout {}", self.uid()))
        })?;
        self.vao.set(Some(vao));
        *self.recorded.borrow_mut() = None;
        Ok(())
    }
}

impl Drop for VertexLayout {
    fn drop(&mut self) {
        if let Some(vao) = self.vao.take() {
            if !self.device.is_lost() {
                self.device.gl().delete_vertex_array(vao);
                self.device.release_vertex_array();
            }
        }
        self.device.unregister(self.base.registry_key());
    }
}

#[cfg(test)]
#[path = "vertex_layout_tests.rs"]
mod tests;
