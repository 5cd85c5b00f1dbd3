/// Structured buffer: a uniform buffer with a std140 struct layout
///
/// Always keeps a shadow, so values can be read back and, on the legacy tier,
/// pushed field by field through a program's uniform setters.

use std::ops::Deref;
use std::rc::Rc;

use crate::buffer::std140::StructLayout;
use crate::buffer::{Buffer, BufferDesc, BufferUsage};
use crate::device::shared::DeviceShared;
use crate::error::Result;
use crate::program::UniformValue;

pub struct StructuredBuffer {
    buffer: Rc<Buffer>,
    layout: Rc<StructLayout>,
}

impl StructuredBuffer {
    pub(crate) fn new(device: &Rc<DeviceShared>, layout: Rc<StructLayout>) -> Result<Rc<Self>> {
        let desc = BufferDesc::new(BufferUsage::UNIFORM | BufferUsage::MANAGED, layout.size())
            .with_label(layout.name().to_string());
        let buffer = Buffer::new(device, &desc)?;
        Ok(Rc::new(Self { buffer, layout }))
    }

    pub fn layout(&self) -> &Rc<StructLayout> {
        &self.layout
    }

    pub fn buffer(&self) -> &Rc<Buffer> {
        &self.buffer
    }

    /// Write a field (or an aggregate rooted at `path`; `""` is the whole struct)
    pub fn set_value(&self, path: &str, value: &UniformValue) -> Result<()> {
        let mut bytes = self.buffer.shadow().unwrap_or_else(|| vec![0u8; self.layout.size() as usize]);
        let (offset, len) = self.layout.write(path, value, &mut bytes)?;
        let range = offset as usize..(offset + len) as usize;
        self.buffer.buffer_sub_data(offset, &bytes[range])
    }

    /// Read a leaf back from the shadow
    pub fn get_value(&self, path: &str) -> Option<UniformValue> {
        self.buffer
            .with_shadow(|bytes| self.layout.read(path, bytes))
            .flatten()
    }
}

impl Deref for StructuredBuffer {
    type Target = Buffer;

    fn deref(&self) -> &Buffer {
        &self.buffer
    }
}
