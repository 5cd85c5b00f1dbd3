/// Buffer family: generic buffer, index buffer, structured (uniform) buffer
///
/// A `Buffer` owns one native buffer object and an optional system-memory
/// shadow. The shadow is written first on every update and is what readback
/// and restore use when it exists.

mod index_buffer;
pub mod std140;
mod structured_buffer;

pub use index_buffer::{IndexBuffer, IndexType};
pub use structured_buffer::StructuredBuffer;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use bitflags::bitflags;

use crate::context::{gl, NativeBuffer};
use crate::device::readback::FenceWait;
use crate::device::shared::DeviceShared;
use crate::error::{Error, Result};
use crate::object::{GpuObject, ObjectBase, ObjectKind, RestoreHandler};
use crate::{gpu_bail, gpu_debug};

const SOURCE: &str = "galaxy3d::gpu::Buffer";

bitflags! {
    /// What a buffer is used for
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const VERTEX = 1 << 0;
        const INDEX = 1 << 1;
        const UNIFORM = 1 << 2;
        const READ = 1 << 3;
        const WRITE = 1 << 4;
        /// Target of pixel readback (extended tier)
        const PACK = 1 << 5;
        /// Source of pixel uploads (extended tier)
        const UNPACK = 1 << 6;
        /// Updated often
        const DYNAMIC = 1 << 7;
        /// Keep a system-memory shadow (content survives context loss)
        const MANAGED = 1 << 8;
    }
}

/// Descriptor for creating a buffer
#[derive(Debug, Clone)]
pub struct BufferDesc {
    /// Size in bytes
    pub size: u32,
    pub usage: BufferUsage,
    pub label: Option<String>,
}

impl BufferDesc {
    pub fn new(usage: BufferUsage, size: u32) -> Self {
        Self {
            size,
            usage,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Reject illegal usage combinations for the given tier
pub fn validate_usage(usage: BufferUsage, size: u32, extended: bool) -> Result<()> {
    if size == 0 {
        gpu_bail!(InvalidUsage, SOURCE, "Buffer size must be positive");
    }
    if usage.contains(BufferUsage::VERTEX | BufferUsage::INDEX) {
        gpu_bail!(InvalidUsage, SOURCE, "Vertex and index usage are mutually exclusive");
    }
    if usage.contains(BufferUsage::DYNAMIC | BufferUsage::MANAGED) {
        gpu_bail!(InvalidUsage, SOURCE, "Dynamic and managed usage are mutually exclusive");
    }
    if !extended && usage.intersects(BufferUsage::PACK | BufferUsage::UNPACK) {
        gpu_bail!(Unsupported, SOURCE, "Pack/unpack buffers need the extended tier");
    }
    Ok(())
}

/// A GPU buffer
pub struct Buffer {
    base: ObjectBase,
    device: Rc<DeviceShared>,
    usage: BufferUsage,
    size: u32,
    handle: Cell<Option<NativeBuffer>>,
    shadow: RefCell<Option<Vec<u8>>>,
    restore_handler: RestoreHandler<Buffer>,
}

impl Buffer {
    pub(crate) fn new(device: &Rc<DeviceShared>, desc: &BufferDesc) -> Result<Rc<Self>> {
        let extended = device.tier().is_extended();
        validate_usage(desc.usage, desc.size, extended)?;

        let shadowed = desc.usage.contains(BufferUsage::MANAGED)
            || (!extended && desc.usage.intersects(BufferUsage::UNIFORM | BufferUsage::READ));

        let buffer = Rc::new(Self {
            base: ObjectBase::new(),
            device: device.clone(),
            usage: desc.usage,
            size: desc.size,
            handle: Cell::new(None),
            shadow: RefCell::new(shadowed.then(|| vec![0u8; desc.size as usize])),
            restore_handler: RestoreHandler::new(),
        });
        if let Some(label) = &desc.label {
            buffer.base.set_label(label.clone());
        }

        if !device.is_lost() {
            buffer.create_native()?;
        }
        device.register(&buffer);
        gpu_debug!(SOURCE, "Created buffer {} ({} bytes, {:?})", buffer.uid(), desc.size, desc.usage);
        Ok(buffer)
    }

    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn has_shadow(&self) -> bool {
        self.shadow.borrow().is_some()
    }

    /// Copy of the shadow contents, if the buffer keeps one
    pub fn shadow(&self) -> Option<Vec<u8>> {
        self.shadow.borrow().clone()
    }

    pub(crate) fn with_shadow<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        self.shadow.borrow().as_deref().map(f)
    }

    pub fn native(&self) -> Option<NativeBuffer> {
        self.handle.get()
    }

    pub fn set_restore_handler(&self, handler: impl FnMut(&Buffer) + 'static) {
        self.restore_handler.set(handler);
    }

    /// Legacy-tier uniform buffers exist only as their shadow
    fn needs_native(&self) -> bool {
        self.device.tier().is_extended() || !self.usage.contains(BufferUsage::UNIFORM)
            || self.usage.intersects(BufferUsage::VERTEX | BufferUsage::INDEX)
    }

    /// Binding point used for uploads
    pub(crate) fn target(&self) -> u32 {
        if self.usage.contains(BufferUsage::INDEX) {
            gl::ELEMENT_ARRAY_BUFFER
        } else if self.usage.contains(BufferUsage::UNIFORM) && self.device.tier().is_extended() {
            gl::UNIFORM_BUFFER
        } else if self.usage.contains(BufferUsage::PACK) && !self.usage.contains(BufferUsage::VERTEX) {
            gl::PIXEL_PACK_BUFFER
        } else {
            gl::ARRAY_BUFFER
        }
    }

    fn gl_usage(&self) -> u32 {
        if self.usage.contains(BufferUsage::DYNAMIC) {
            gl::DYNAMIC_DRAW
        } else if self.usage.intersects(BufferUsage::PACK | BufferUsage::READ) {
            gl::STREAM_READ
        } else {
            gl::STATIC_DRAW
        }
    }

    /// Bind for an upload; index buffers must not land in a bound vertex array
    fn bind_for_update(&self, handle: NativeBuffer) -> u32 {
        let target = self.target();
        if target == gl::ELEMENT_ARRAY_BUFFER {
            self.device.release_vertex_array();
        }
        self.device.gl().bind_buffer(target, Some(handle));
        target
    }

    /// Make sure the buffer has its native handle. Returns false while the
    /// context is lost.
    pub(crate) fn ensure_live(&self) -> Result<bool> {
        if self.device.is_lost() {
            return Ok(false);
        }
        if self.is_disposed() {
            self.reload()?;
        }
        Ok(true)
    }

    /// Write `data` at byte `offset`
    pub fn buffer_sub_data(&self, offset: u32, data: &[u8]) -> Result<()> {
        let end = offset as u64 + data.len() as u64;
        if end > self.size as u64 {
            gpu_bail!(
                InvalidUsage,
                SOURCE,
                "Write of {} bytes at offset {} overflows buffer of {} bytes",
                data.len(),
                offset,
                self.size
            );
        }
        if data.is_empty() {
            return Ok(());
        }

        if let Some(shadow) = self.shadow.borrow_mut().as_mut() {
            shadow[offset as usize..end as usize].copy_from_slice(data);
        }

        if !self.ensure_live()? {
            return Ok(());
        }
        if let Some(handle) = self.handle.get() {
            let target = self.bind_for_update(handle);
            self.device.gl().buffer_sub_data(target, offset, data);
        }
        Ok(())
    }

    /// Read `length` bytes at `offset` (`None` reads to the end).
    ///
    /// Served from the shadow when there is one. Otherwise the extended tier
    /// waits on a fence before copying, and the legacy tier reads directly.
    pub async fn get_buffer_sub_data(&self, offset: u32, length: Option<u32>) -> Result<Vec<u8>> {
        let length = length.unwrap_or(self.size.saturating_sub(offset));
        if offset as u64 + length as u64 > self.size as u64 {
            gpu_bail!(
                InvalidUsage,
                SOURCE,
                "Read of {} bytes at offset {} overflows buffer of {} bytes",
                length,
                offset,
                self.size
            );
        }
        let range = offset as usize..(offset + length) as usize;

        if let Some(bytes) = self.with_shadow(|s| s[range.clone()].to_vec()) {
            return Ok(bytes);
        }
        if !self.ensure_live()? {
            return Err(Error::ContextLost);
        }

        if self.device.caps().misc.fences {
            FenceWait::insert(self.device.gl_rc(), self.device.fence_poll_interval())?.await?;
            if self.device.is_lost() || self.device.gl().is_context_lost() {
                return Err(Error::FenceFailed);
            }
        }
        // The handle may have changed while waiting
        self.ensure_live()?;
        let mut bytes = vec![0u8; length as usize];
        if let Some(handle) = self.handle.get() {
            let target = if self.device.tier().is_extended() {
                gl::COPY_READ_BUFFER
            } else {
                self.target()
            };
            if target == gl::ELEMENT_ARRAY_BUFFER {
                self.device.release_vertex_array();
            }
            let gl = self.device.gl();
            gl.bind_buffer(target, Some(handle));
            gl.get_buffer_sub_data(target, offset, &mut bytes);
            gl.bind_buffer(target, None);
        }
        Ok(bytes)
    }
}

impl GpuObject for Buffer {
    fn base(&self) -> &ObjectBase {
        &self.base
    }

    fn kind(&self) -> ObjectKind {
        ObjectKind::Buffer
    }

    fn native_ids(&self) -> Vec<u32> {
        self.handle.get().map(|h| vec![h.id()]).unwrap_or_default()
    }

    fn release_native(&self, delete: bool) {
        if let Some(handle) = self.handle.take() {
            if delete {
                self.device.gl().delete_buffer(handle);
            }
            self.device.remove_memory(self.size as u64);
        }
    }

    fn create_native(&self) -> Result<()> {
        if !self.needs_native() {
            return Ok(());
        }
        let gl = self.device.gl();
        let handle = gl.create_buffer().ok_or_else(|| {
            Error::BackendError(format!("Failed to create buffer {}", self.uid()))
        })?;
        self.handle.set(Some(handle));
        if self.usage.contains(BufferUsage::VERTEX) {
            // attribute pointers recorded against the old handle are stale
            self.device.release_vertex_array();
        }
        let target = self.bind_for_update(handle);
        gl.buffer_data_size(target, self.size, self.gl_usage());
        // storage starts zeroed, so an untouched shadow needs no upload
        if let Some(shadow) = self.shadow.borrow().as_ref().filter(|s| s.iter().any(|&b| b != 0)) {
            gl.buffer_sub_data(target, 0, shadow);
        }
        self.device.add_memory(self.size as u64);
        Ok(())
    }

    fn on_restored(&self) {
        self.restore_handler.invoke(self);
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.device.remove_memory(self.size as u64);
            if !self.device.is_lost() {
                self.device.gl().delete_buffer(handle);
            }
        }
        self.device.unregister(self.base.registry_key());
    }
}

#[cfg(test)]
#[path = "buffer_tests.rs"]
mod tests;
