/// Device state shared with every resource
///
/// Resources keep an `Rc<DeviceShared>` so they can reach the context, the
/// capability tables and the bookkeeping the device owns (registry, deferred
/// deletions, memory counter, draw tag) without holding the `Device` itself.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::caps::DeviceCaps;
use crate::context::{
    gl, ContextTier, GlContext, NativeFramebuffer, NativeProgram, NativeRenderbuffer,
    NativeTexture,
};
use crate::object::{GpuObject, ObjectKey, ObjectRegistry};
use crate::sampler::{Sampler, SamplerOptions};

/// Native handle whose deletion waits for the next frame boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeferredDelete {
    Texture(NativeTexture),
    Framebuffer(NativeFramebuffer),
    Renderbuffer(NativeRenderbuffer),
}

pub(crate) struct DeviceShared {
    gl: Rc<dyn GlContext>,
    tier: ContextTier,
    caps: RefCell<Rc<DeviceCaps>>,
    fence_poll_interval: Duration,
    msaa: bool,
    lost: Cell<bool>,
    registry: RefCell<ObjectRegistry>,
    /// uids invalidated by a loss (or created during one) that restore must bring back
    pending_restore: RefCell<FxHashSet<u64>>,
    deferred: RefCell<Vec<DeferredDelete>>,
    memory: Cell<u64>,
    draw_tag: Cell<u64>,
    current_program: Cell<Option<NativeProgram>>,
    current_framebuffer: Cell<Option<NativeFramebuffer>>,
    vertex_array_dirty: Cell<bool>,
    /// Attribute locations enabled outside any vertex array object
    enabled_attributes: Cell<u32>,
    samplers: RefCell<FxHashMap<SamplerOptions, Rc<Sampler>>>,
}

impl DeviceShared {
    pub(crate) fn new(
        gl: Rc<dyn GlContext>,
        caps: DeviceCaps,
        fence_poll_interval: Duration,
        msaa: bool,
    ) -> Self {
        Self {
            tier: gl.tier(),
            gl,
            caps: RefCell::new(Rc::new(caps)),
            fence_poll_interval,
            msaa,
            lost: Cell::new(false),
            registry: RefCell::new(ObjectRegistry::new()),
            pending_restore: RefCell::new(FxHashSet::default()),
            deferred: RefCell::new(Vec::new()),
            memory: Cell::new(0),
            draw_tag: Cell::new(0),
            current_program: Cell::new(None),
            current_framebuffer: Cell::new(None),
            vertex_array_dirty: Cell::new(true),
            enabled_attributes: Cell::new(0),
            samplers: RefCell::new(FxHashMap::default()),
        }
    }

    pub(crate) fn gl(&self) -> &dyn GlContext {
        self.gl.as_ref()
    }

    pub(crate) fn gl_rc(&self) -> Rc<dyn GlContext> {
        self.gl.clone()
    }

    pub(crate) fn tier(&self) -> ContextTier {
        self.tier
    }

    pub(crate) fn caps(&self) -> Rc<DeviceCaps> {
        self.caps.borrow().clone()
    }

    pub(crate) fn set_caps(&self, caps: DeviceCaps) {
        *self.caps.borrow_mut() = Rc::new(caps);
    }

    pub(crate) fn fence_poll_interval(&self) -> Duration {
        self.fence_poll_interval
    }

    pub(crate) fn msaa_enabled(&self) -> bool {
        self.msaa
    }

    pub(crate) fn is_lost(&self) -> bool {
        self.lost.get()
    }

    pub(crate) fn set_lost(&self, lost: bool) {
        self.lost.set(lost);
    }

    // ===== REGISTRY =====

    /// Register a freshly constructed object. Objects created while the
    /// context is lost start disposed and are brought up by the next restore.
    pub(crate) fn register<T: GpuObject + 'static>(&self, object: &Rc<T>) {
        let dynamic: Rc<dyn GpuObject> = object.clone();
        let weak: Weak<dyn GpuObject> = Rc::downgrade(&dynamic);
        let key = self.registry.borrow_mut().insert(weak);
        object.base().set_registry_key(key);
        if self.is_lost() {
            object.base().mark_disposed();
            self.pending_restore.borrow_mut().insert(object.uid());
        }
    }

    pub(crate) fn unregister(&self, key: Option<ObjectKey>) {
        if let Some(key) = key {
            if let Ok(mut registry) = self.registry.try_borrow_mut() {
                registry.remove(key);
            }
        }
    }

    pub(crate) fn live_objects(&self) -> Vec<Rc<dyn GpuObject>> {
        let mut registry = self.registry.borrow_mut();
        registry.prune();
        registry.live_objects()
    }

    pub(crate) fn mark_pending_restore(&self, uid: u64) {
        self.pending_restore.borrow_mut().insert(uid);
    }

    pub(crate) fn take_pending_restore(&self) -> FxHashSet<u64> {
        std::mem::take(&mut *self.pending_restore.borrow_mut())
    }

    // ===== DEFERRED DELETION =====

    pub(crate) fn defer_delete(&self, item: DeferredDelete) {
        if !self.is_lost() {
            self.deferred.borrow_mut().push(item);
        }
    }

    pub(crate) fn pending_deletions(&self) -> usize {
        self.deferred.borrow().len()
    }

    /// Delete everything queued before this frame boundary
    pub(crate) fn drain_deferred(&self) -> usize {
        let items = std::mem::take(&mut *self.deferred.borrow_mut());
        if self.is_lost() {
            return 0;
        }
        let gl = self.gl();
        for item in &items {
            match *item {
                DeferredDelete::Texture(t) => gl.delete_texture(t),
                DeferredDelete::Framebuffer(f) => gl.delete_framebuffer(f),
                DeferredDelete::Renderbuffer(r) => gl.delete_renderbuffer(r),
            }
        }
        items.len()
    }

    pub(crate) fn clear_deferred(&self) {
        self.deferred.borrow_mut().clear();
    }

    // ===== MEMORY =====

    pub(crate) fn add_memory(&self, bytes: u64) {
        self.memory.set(self.memory.get() + bytes);
    }

    pub(crate) fn remove_memory(&self, bytes: u64) {
        self.memory.set(self.memory.get().saturating_sub(bytes));
    }

    pub(crate) fn memory(&self) -> u64 {
        self.memory.get()
    }

    // ===== DRAW TAG =====

    pub(crate) fn draw_tag(&self) -> u64 {
        self.draw_tag.get()
    }

    pub(crate) fn bump_draw_tag(&self) -> u64 {
        let tag = self.draw_tag.get() + 1;
        self.draw_tag.set(tag);
        tag
    }

    // ===== TRACKED BINDINGS =====

    pub(crate) fn use_program(&self, program: Option<NativeProgram>) {
        if self.current_program.get() != program {
            self.gl.use_program(program);
            self.current_program.set(program);
        }
    }

    pub(crate) fn current_program(&self) -> Option<NativeProgram> {
        self.current_program.get()
    }

    /// Bind the draw framebuffer, skipping redundant binds
    pub(crate) fn bind_framebuffer(&self, framebuffer: Option<NativeFramebuffer>) {
        if self.current_framebuffer.get() != framebuffer {
            self.gl.bind_framebuffer(gl::FRAMEBUFFER, framebuffer);
            self.current_framebuffer.set(framebuffer);
        }
    }

    pub(crate) fn current_framebuffer(&self) -> Option<NativeFramebuffer> {
        self.current_framebuffer.get()
    }

    /// Forget tracked bindings without talking to the context
    pub(crate) fn forget_bindings(&self) {
        self.current_program.set(None);
        self.current_framebuffer.set(None);
        self.vertex_array_dirty.set(true);
        self.enabled_attributes.set(0);
    }

    /// Record the attribute mask a layout just enabled, returning the previous one
    pub(crate) fn swap_enabled_attributes(&self, mask: u32) -> u32 {
        self.enabled_attributes.replace(mask)
    }

    /// Unbind any vertex array so element-array binds do not leak into it
    pub(crate) fn release_vertex_array(&self) {
        if self.caps().misc.vertex_array_objects {
            self.gl.bind_vertex_array(None);
        }
        self.vertex_array_dirty.set(true);
    }

    /// True once after `release_vertex_array`: the next draw must rebind
    pub(crate) fn take_vertex_array_dirty(&self) -> bool {
        self.vertex_array_dirty.replace(false)
    }

    /// Bind a texture on unit 0 for uploads and parameter changes
    pub(crate) fn bind_texture_for_update(&self, target: u32, texture: Option<NativeTexture>) {
        self.gl.active_texture(gl::TEXTURE0);
        self.gl.bind_texture(target, texture);
    }

    // ===== SAMPLER CACHE =====

    pub(crate) fn cached_sampler(&self, options: &SamplerOptions) -> Option<Rc<Sampler>> {
        self.samplers.borrow().get(options).cloned()
    }

    pub(crate) fn cache_sampler(&self, options: SamplerOptions, sampler: Rc<Sampler>) {
        self.samplers.borrow_mut().insert(options, sampler);
    }

    #[cfg(test)]
    pub(crate) fn sampler_cache_len(&self) -> usize {
        self.samplers.borrow().len()
    }

    pub(crate) fn clear_sampler_cache(&self) {
        self.samplers.borrow_mut().clear();
    }
}
