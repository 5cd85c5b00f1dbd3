/// Index buffer: a buffer with INDEX usage and a fixed index type

use std::ops::Deref;
use std::rc::Rc;

use crate::buffer::{Buffer, BufferDesc, BufferUsage};
use crate::context::gl;
use crate::device::shared::DeviceShared;
use crate::error::Result;
use crate::gpu_bail;

/// Width of one index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexType {
    U16,
    U32,
}

impl IndexType {
    pub fn size(self) -> u32 {
        match self {
            IndexType::U16 => 2,
            IndexType::U32 => 4,
        }
    }

    pub fn to_gl(self) -> u32 {
        match self {
            IndexType::U16 => gl::UNSIGNED_SHORT,
            IndexType::U32 => gl::UNSIGNED_INT,
        }
    }
}

/// Buffer of `count` indices of `index_type`
#[derive(Clone)]
pub struct IndexBuffer {
    buffer: Rc<Buffer>,
    index_type: IndexType,
    count: u32,
}

impl IndexBuffer {
    /// `extra_usage` may add DYNAMIC / MANAGED / READ
    pub(crate) fn new(
        device: &Rc<DeviceShared>,
        index_type: IndexType,
        count: u32,
        extra_usage: BufferUsage,
    ) -> Result<Self> {
        if index_type == IndexType::U32 && !device.caps().misc.element_index_uint {
            gpu_bail!(
                Unsupported,
                "galaxy3d::gpu::IndexBuffer",
                "32-bit indices need OES_element_index_uint on this tier"
            );
        }
        let desc = BufferDesc::new(BufferUsage::INDEX | extra_usage, count * index_type.size());
        let buffer = Buffer::new(device, &desc)?;
        Ok(Self {
            buffer,
            index_type,
            count,
        })
    }

    pub fn index_type(&self) -> IndexType {
        self.index_type
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn buffer(&self) -> &Rc<Buffer> {
        &self.buffer
    }

    /// Write 16-bit indices starting at index `first`
    pub fn write_u16(&self, first: u32, indices: &[u16]) -> Result<()> {
        if self.index_type != IndexType::U16 {
            gpu_bail!(InvalidUsage, "galaxy3d::gpu::IndexBuffer", "Index buffer holds 32-bit indices");
        }
        let Some(offset) = first.checked_mul(2) else {
            gpu_bail!(InvalidUsage, "galaxy3d::gpu::IndexBuffer", "Index {} is past any buffer", first);
        };
        self.buffer.buffer_sub_data(offset, bytemuck::cast_slice(indices))
    }

    /// Write 32-bit indices starting at index `first`
    pub fn write_u32(&self, first: u32, indices: &[u32]) -> Result<()> {
        if self.index_type != IndexType::U32 {
            gpu_bail!(InvalidUsage, "galaxy3d::gpu::IndexBuffer", "Index buffer holds 16-bit indices");
        }
        let Some(offset) = first.checked_mul(4) else {
            gpu_bail!(InvalidUsage, "galaxy3d::gpu::IndexBuffer", "Index {} is past any buffer", first);
        };
        self.buffer.buffer_sub_data(offset, bytemuck::cast_slice(indices))
    }
}

impl Deref for IndexBuffer {
    type Target = Buffer;

    fn deref(&self) -> &Buffer {
        &self.buffer
    }
}
