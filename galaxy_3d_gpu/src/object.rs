/// GPU object base and device object registry
///
/// Every disposable, loss-aware resource embeds an `ObjectBase` and
/// implements `GpuObject`. The device keeps a registry of weak references to
/// all of them so that context loss and restore can be broadcast in a
/// deterministic order (creation order, by uid).

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use slotmap::{new_key_type, SlotMap};

use crate::error::Result;

new_key_type! {
    /// Key of an object inside the device registry
    pub struct ObjectKey;
}

static NEXT_UID: AtomicU64 = AtomicU64::new(1);

/// Resource family of a GPU object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Texture,
    Buffer,
    Sampler,
    Framebuffer,
    VertexLayout,
    Program,
}

/// Identity and lifecycle state shared by every GPU object
#[derive(Debug)]
pub struct ObjectBase {
    uid: u64,
    cid: Cell<u32>,
    disposed: Cell<bool>,
    key: Cell<Option<ObjectKey>>,
    label: RefCell<Option<String>>,
}

impl ObjectBase {
    pub fn new() -> Self {
        Self {
            uid: NEXT_UID.fetch_add(1, Ordering::Relaxed),
            cid: Cell::new(0),
            disposed: Cell::new(false),
            key: Cell::new(None),
            label: RefCell::new(None),
        }
    }

    /// Process-wide unique, monotonic identifier
    pub fn uid(&self) -> u64 {
        self.uid
    }

    /// Generation counter, incremented on every reload
    pub fn cid(&self) -> u32 {
        self.cid.get()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    pub fn label(&self) -> Option<String> {
        self.label.borrow().clone()
    }

    pub fn set_label(&self, label: impl Into<String>) {
        *self.label.borrow_mut() = Some(label.into());
    }

    pub(crate) fn mark_disposed(&self) {
        self.disposed.set(true);
    }

    pub(crate) fn mark_live(&self) {
        self.disposed.set(false);
        self.cid.set(self.cid.get() + 1);
    }

    pub(crate) fn registry_key(&self) -> Option<ObjectKey> {
        self.key.get()
    }

    pub(crate) fn set_registry_key(&self, key: ObjectKey) {
        self.key.set(Some(key));
    }
}

impl Default for ObjectBase {
    fn default() -> Self {
        Self::new()
    }
}

/// Common lifecycle of every GPU resource
///
/// Implementors provide `release_native` and `create_native`; the provided
/// methods turn those into the dispose / reload / loss state machine.
pub trait GpuObject {
    fn base(&self) -> &ObjectBase;

    fn kind(&self) -> ObjectKind;

    /// Native handle names currently held (empty when disposed)
    fn native_ids(&self) -> Vec<u32>;

    /// Drop every native handle. `delete` is false when the context already
    /// destroyed them (context loss).
    fn release_native(&self, delete: bool);

    /// Re-create native handles from the retained logical state
    fn create_native(&self) -> Result<()>;

    /// Called after a successful restore, used to run user handlers
    fn on_restored(&self) {}

    /// Called by the device at the start of every frame
    fn frame_begin(&self) {}

    fn uid(&self) -> u64 {
        self.base().uid()
    }

    fn cid(&self) -> u32 {
        self.base().cid()
    }

    fn is_disposed(&self) -> bool {
        self.base().is_disposed()
    }

    /// Explicitly destroy the native handles. The object stays usable:
    /// the next operation on it reloads it.
    fn dispose(&self) {
        if self.base().is_disposed() {
            return;
        }
        self.release_native(true);
        self.base().mark_disposed();
    }

    /// Re-acquire native handles after a dispose, bumping `cid`
    fn reload(&self) -> Result<()> {
        if !self.base().is_disposed() {
            return Ok(());
        }
        self.create_native()?;
        self.base().mark_live();
        Ok(())
    }

    /// Context lost: forget handles without deleting them
    fn invalidate(&self) {
        self.release_native(false);
        self.base().mark_disposed();
    }

    /// Context restored: reload then notify
    fn restore(&self) -> Result<()> {
        self.reload()?;
        self.on_restored();
        Ok(())
    }
}

/// User callback run after an object re-created its native handle
pub struct RestoreHandler<T: ?Sized> {
    handler: RefCell<Option<Box<dyn FnMut(&T)>>>,
}

impl<T: ?Sized> RestoreHandler<T> {
    pub fn new() -> Self {
        Self {
            handler: RefCell::new(None),
        }
    }

    pub fn set(&self, handler: impl FnMut(&T) + 'static) {
        *self.handler.borrow_mut() = Some(Box::new(handler));
    }

    pub fn clear(&self) {
        *self.handler.borrow_mut() = None;
    }

    pub fn is_set(&self) -> bool {
        self.handler.borrow().is_some()
    }

    /// Run the handler; it may itself replace the handler
    pub fn invoke(&self, target: &T) {
        let taken = self.handler.borrow_mut().take();
        if let Some(mut handler) = taken {
            handler(target);
            let mut slot = self.handler.borrow_mut();
            if slot.is_none() {
                *slot = Some(handler);
            }
        }
    }
}

impl<T: ?Sized> Default for RestoreHandler<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Arena of weakly-referenced GPU objects owned by the device
#[derive(Default)]
pub struct ObjectRegistry {
    objects: SlotMap<ObjectKey, Weak<dyn GpuObject>>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, object: Weak<dyn GpuObject>) -> ObjectKey {
        self.objects.insert(object)
    }

    pub fn remove(&mut self, key: ObjectKey) {
        self.objects.remove(key);
    }

    /// Number of registered objects still alive
    pub fn len(&self) -> usize {
        self.objects.values().filter(|o| o.strong_count() > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Strong references to every live object, ordered by uid
    pub fn live_objects(&self) -> Vec<Rc<dyn GpuObject>> {
        let mut live: Vec<Rc<dyn GpuObject>> =
            self.objects.values().filter_map(Weak::upgrade).collect();
        live.sort_by_key(|object| object.uid());
        live
    }

    /// Drop entries whose object is gone
    pub fn prune(&mut self) {
        self.objects.retain(|_, object| object.strong_count() > 0);
    }
}

#[cfg(test)]
#[path = "object_tests.rs"]
mod tests;
