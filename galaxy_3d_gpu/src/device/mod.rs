/// Device - owner of the context and factory of every GPU resource
///
/// The device keeps the current bindings (program, vertex layout, render
/// states, framebuffer, bind groups, viewport and scissor), resolves them
/// into context calls at draw time, and drives the frame boundary and the
/// context loss / restore protocol across every registered object.

pub mod backend;
mod options;
pub mod readback;
pub(crate) mod shared;

pub use options::{
    drawing_buffer_size, DeviceEvent, DeviceOptions, DeviceStats, PixelRounding, PrimitiveTopology,
    Rect,
};

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::bind_group::{BindGroup, BindGroupLayout};
use crate::buffer::std140::StructLayout;
use crate::buffer::{Buffer, BufferDesc, BufferUsage, IndexBuffer, IndexType, StructuredBuffer};
use crate::caps::{DeviceCaps, SampleKind};
use crate::context::{gl, ContextTier, GlContext, Surface};
use crate::error::{Error, Result};
use crate::framebuffer::{Framebuffer, FramebufferDesc};
use crate::object::{GpuObject, ObjectKind};
use crate::program::{Program, ProgramDesc};
use crate::render_states::{AppliedStateCache, RenderStateSet, StateCategory};
use crate::sampler::{Sampler, SamplerOptions};
use crate::texture::{
    Texture, Texture2D, Texture2DArray, Texture3D, TextureCube, TextureDesc, TextureKind,
    TextureVideo, VideoSource,
};
use crate::vertex_layout::{VertexLayout, VertexLayoutDesc};
use crate::{gpu_bail, gpu_debug, gpu_error, gpu_info, gpu_trace, gpu_warn};

use readback::{exceeds, pack_into_buffer, PendingRead, ReadFormat, ReadRegion};
use shared::DeviceShared;

const SOURCE: &str = "galaxy3d::gpu::Device";

/// Bind group occupying one slot, with the offsets given at `set_bind_group`
#[derive(Clone)]
struct BoundGroup {
    group: Rc<BindGroup>,
    offsets: Vec<u32>,
}

#[derive(Default)]
struct Bindings {
    program: Option<Rc<Program>>,
    vertex_layout: Option<Rc<VertexLayout>>,
    /// The vertex layout must be bound again before the next draw
    layout_dirty: bool,
    render_states: Option<Rc<RenderStateSet>>,
    framebuffer: Option<Rc<Framebuffer>>,
    bind_groups: Vec<Option<BoundGroup>>,
    /// `None` covers the whole target
    viewport: Option<Rect>,
    /// `None` disables the scissor test
    scissor: Option<Rect>,
}

type Listener = Box<dyn FnMut(&DeviceEvent)>;

/// A device over one graphics context
pub struct Device {
    shared: Rc<DeviceShared>,
    surface: Option<Rc<dyn Surface>>,
    options: DeviceOptions,
    state_cache: RefCell<AppliedStateCache>,
    bindings: RefCell<Bindings>,
    listeners: RefCell<Vec<Listener>>,
    frame: Cell<u64>,
    draw_calls: Cell<u32>,
    /// Drawing-buffer size in device pixels
    backbuffer: Cell<(u32, u32)>,
}

impl Device {
    /// Create the context of `tier` from `surface` and set the device up
    pub fn new(surface: Rc<dyn Surface>, tier: ContextTier, options: DeviceOptions) -> Result<Self> {
        let Some(gl) = surface.create_context(tier, &options.context_attributes) else {
            gpu_bail!(InitializationFailed, SOURCE, "Surface cannot provide a {:?} context", tier);
        };
        let device = Self::build(gl, Some(surface), options)?;
        device.resize();
        Ok(device)
    }

    /// Device over a context the host already created
    pub fn from_context(gl: Rc<dyn GlContext>, options: DeviceOptions) -> Result<Self> {
        Self::build(gl, None, options)
    }

    fn build(gl: Rc<dyn GlContext>, surface: Option<Rc<dyn Surface>>, options: DeviceOptions) -> Result<Self> {
        if gl.is_context_lost() {
            gpu_bail!(InitializationFailed, SOURCE, "Context is lost at device creation");
        }
        let caps = DeviceCaps::query(gl.as_ref());
        gpu_info!(
            SOURCE,
            "Device created on the {:?} tier (max texture {}, {} draw buffers, {} texture units)",
            caps.tier,
            caps.texture.max_texture_size,
            caps.framebuffer.max_draw_buffers,
            caps.shader.max_texture_units
        );
        let backbuffer = gl.drawing_buffer_size();
        let shared = Rc::new(DeviceShared::new(
            gl,
            caps,
            options.fence_poll_interval,
            options.msaa,
        ));
        let device = Self {
            shared,
            surface,
            options,
            state_cache: RefCell::new(AppliedStateCache::new()),
            bindings: RefCell::new(Bindings::default()),
            listeners: RefCell::new(Vec::new()),
            frame: Cell::new(0),
            draw_calls: Cell::new(0),
            backbuffer: Cell::new(backbuffer),
        };
        device.setup_context_state();
        Ok(device)
    }

    /// Put the context in the state the layer assumes
    fn setup_context_state(&self) {
        let gl = self.shared.gl();
        gl.pixel_store_i32(gl::UNPACK_ALIGNMENT, 1);
        self.state_cache.borrow_mut().apply_defaults(gl, true);
        self.apply_viewport();
    }

    // ===== ACCESSORS =====

    pub fn tier(&self) -> ContextTier {
        self.shared.tier()
    }

    pub fn caps(&self) -> Rc<DeviceCaps> {
        self.shared.caps()
    }

    pub fn options(&self) -> &DeviceOptions {
        &self.options
    }

    pub fn is_lost(&self) -> bool {
        self.shared.is_lost()
    }

    /// Frames started by `run_frame`
    pub fn frame_index(&self) -> u64 {
        self.frame.get()
    }

    /// Configured ratio, else the surface's, else 1
    pub fn device_pixel_ratio(&self) -> f32 {
        let ratio = self
            .options
            .device_pixel_ratio
            .or_else(|| self.surface.as_ref().map(|s| s.device_pixel_ratio()))
            .unwrap_or(1.0);
        if ratio > 0.0 {
            ratio
        } else {
            1.0
        }
    }

    /// Size of the default framebuffer in device pixels
    pub fn drawing_buffer_size(&self) -> (u32, u32) {
        self.backbuffer.get()
    }

    /// Follow the surface's client size. Returns the new drawing-buffer size.
    pub fn resize(&self) -> (u32, u32) {
        let Some(surface) = &self.surface else {
            return self.backbuffer.get();
        };
        let size = drawing_buffer_size(
            surface.client_size(),
            self.device_pixel_ratio(),
            self.options.pixel_rounding,
        );
        if size != self.backbuffer.get() {
            surface.set_drawing_buffer_size(size.0, size.1);
            self.backbuffer.set(size);
            gpu_debug!(SOURCE, "Drawing buffer resized to {}x{}", size.0, size.1);
            if self.bindings.borrow().framebuffer.is_none() {
                self.apply_viewport();
            }
            self.emit(DeviceEvent::Resized {
                width: size.0,
                height: size.1,
            });
        }
        size
    }

    // ===== RESOURCE CREATION =====

    pub fn create_texture_2d(&self, desc: &TextureDesc) -> Result<Texture2D> {
        Texture::new(&self.shared, TextureKind::Tex2D, desc, None).map(Texture2D::from_texture)
    }

    pub fn create_texture_2d_array(&self, desc: &TextureDesc) -> Result<Texture2DArray> {
        Texture::new(&self.shared, TextureKind::Tex2DArray, desc, None).map(Texture2DArray::from_texture)
    }

    pub fn create_texture_3d(&self, desc: &TextureDesc) -> Result<Texture3D> {
        Texture::new(&self.shared, TextureKind::Tex3D, desc, None).map(Texture3D::from_texture)
    }

    pub fn create_texture_cube(&self, desc: &TextureDesc) -> Result<TextureCube> {
        Texture::new(&self.shared, TextureKind::Cube, desc, None).map(TextureCube::from_texture)
    }

    /// Texture fed by `source`, sized after its current frame
    pub fn create_texture_video(&self, source: Rc<dyn VideoSource>, desc: &TextureDesc) -> Result<TextureVideo> {
        let (width, height) = source.dimensions();
        let desc = TextureDesc {
            width,
            height,
            ..desc.clone()
        };
        Texture::new(&self.shared, TextureKind::Video, &desc, Some(source)).map(TextureVideo::from_texture)
    }

    pub fn create_buffer(&self, desc: &BufferDesc) -> Result<Rc<Buffer>> {
        Buffer::new(&self.shared, desc)
    }

    /// Index buffer of `count` indices; `extra_usage` may add DYNAMIC, MANAGED or READ
    pub fn create_index_buffer(&self, index_type: IndexType, count: u32, extra_usage: BufferUsage) -> Result<IndexBuffer> {
        IndexBuffer::new(&self.shared, index_type, count, extra_usage)
    }

    pub fn create_structured_buffer(&self, layout: Rc<StructLayout>) -> Result<Rc<StructuredBuffer>> {
        StructuredBuffer::new(&self.shared, layout)
    }

    pub fn create_vertex_layout(&self, desc: VertexLayoutDesc) -> Result<Rc<VertexLayout>> {
        VertexLayout::new(&self.shared, desc)
    }

    pub fn create_frame_buffer(&self, desc: FramebufferDesc) -> Result<Rc<Framebuffer>> {
        Framebuffer::new(&self.shared, desc)
    }

    pub fn create_bind_group(&self, layout: Rc<BindGroupLayout>, label: Option<String>) -> Rc<BindGroup> {
        BindGroup::new(&self.shared, layout, label)
    }

    /// Samplers are shared: equal options return the same sampler
    pub fn create_sampler(&self, options: SamplerOptions) -> Result<Rc<Sampler>> {
        Sampler::get_or_create(&self.shared, options)
    }

    pub fn create_gpu_program(&self, desc: ProgramDesc) -> Result<Rc<Program>> {
        Program::new(&self.shared, desc)
    }

    /// Freeze a render-state set so the state cache can compare it by identity
    pub fn create_render_state_set(&self, set: RenderStateSet) -> Rc<RenderStateSet> {
        Rc::new(set)
    }

    // ===== BINDINGS =====

    pub fn set_program(&self, program: Option<Rc<Program>>) {
        self.bindings.borrow_mut().program = program;
    }

    pub fn set_vertex_layout(&self, layout: Option<Rc<VertexLayout>>) {
        let mut bindings = self.bindings.borrow_mut();
        let same = match (&bindings.vertex_layout, &layout) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            _ => false,
        };
        if !same {
            bindings.vertex_layout = layout;
            bindings.layout_dirty = true;
        }
    }

    /// `None` applies the default state of every category
    pub fn set_render_states(&self, states: Option<Rc<RenderStateSet>>) {
        self.bindings.borrow_mut().render_states = states;
    }

    /// Put `group` in slot `index`. `dynamic_offsets` must match the
    /// layout's dynamic slots.
    pub fn set_bind_group(&self, index: usize, group: Option<Rc<BindGroup>>, dynamic_offsets: &[u32]) -> Result<()> {
        let bound = match group {
            Some(group) => {
                let expected = group.layout().dynamic_offset_count();
                if dynamic_offsets.len() != expected {
                    gpu_bail!(
                        InvalidUsage,
                        SOURCE,
                        "Bind group {} expects {} dynamic offsets, got {}",
                        index,
                        expected,
                        dynamic_offsets.len()
                    );
                }
                Some(BoundGroup {
                    group,
                    offsets: dynamic_offsets.to_vec(),
                })
            }
            None => None,
        };
        let mut bindings = self.bindings.borrow_mut();
        if bindings.bind_groups.len() <= index {
            bindings.bind_groups.resize(index + 1, None);
        }
        bindings.bind_groups[index] = bound;
        Ok(())
    }

    /// Switch render target. The previous framebuffer is finished (resolved,
    /// emulated levels copied back); viewport and scissor reset to the new
    /// target.
    pub fn set_framebuffer(&self, framebuffer: Option<Rc<Framebuffer>>) -> Result<()> {
        let previous = self.bindings.borrow_mut().framebuffer.take();
        if let Some(previous) = previous {
            previous.unbind()?;
        }
        {
            let mut bindings = self.bindings.borrow_mut();
            bindings.framebuffer = framebuffer.clone();
            bindings.viewport = None;
            bindings.scissor = None;
        }
        if self.shared.is_lost() {
            return Ok(());
        }
        self.bind_target(framebuffer.as_deref())?;
        self.apply_viewport();
        Ok(())
    }

    pub fn framebuffer(&self) -> Option<Rc<Framebuffer>> {
        self.bindings.borrow().framebuffer.clone()
    }

    /// Viewport in target pixels, or CSS pixels on the default framebuffer.
    /// `None` covers the whole target.
    pub fn set_viewport(&self, viewport: Option<Rect>) {
        self.bindings.borrow_mut().viewport = viewport;
        self.apply_viewport();
    }

    /// Same coordinates as `set_viewport`; `None` disables scissoring
    pub fn set_scissor(&self, scissor: Option<Rect>) {
        self.bindings.borrow_mut().scissor = scissor;
        self.apply_viewport();
    }

    /// Viewport actually given to the context, in device pixels
    pub fn effective_viewport(&self) -> Rect {
        let viewport = self.bindings.borrow().viewport;
        viewport
            .map(|rect| self.to_target_pixels(rect))
            .unwrap_or_else(|| {
                let (width, height) = self.target_size();
                Rect::of_size(width, height)
            })
    }

    /// Scissor actually given to the context, in device pixels
    pub fn effective_scissor(&self) -> Option<Rect> {
        let scissor = self.bindings.borrow().scissor;
        scissor.map(|rect| self.to_target_pixels(rect))
    }

    fn target_size(&self) -> (u32, u32) {
        match &self.bindings.borrow().framebuffer {
            Some(framebuffer) => (framebuffer.width(), framebuffer.height()),
            None => self.backbuffer.get(),
        }
    }

    fn to_target_pixels(&self, rect: Rect) -> Rect {
        if self.bindings.borrow().framebuffer.is_some() {
            rect
        } else {
            rect.to_device_pixels(self.device_pixel_ratio(), self.options.pixel_rounding)
        }
    }

    fn apply_viewport(&self) {
        if self.shared.is_lost() {
            return;
        }
        let gl = self.shared.gl();
        let viewport = self.effective_viewport();
        gl.viewport(viewport.x, viewport.y, viewport.width as i32, viewport.height as i32);
        match self.effective_scissor() {
            Some(scissor) => {
                gl.enable(gl::SCISSOR_TEST);
                gl.scissor(scissor.x, scissor.y, scissor.width as i32, scissor.height as i32);
            }
            None => gl.disable(gl::SCISSOR_TEST),
        }
    }

    /// Bind `framebuffer`, or the default framebuffer. False while lost.
    fn bind_target(&self, framebuffer: Option<&Framebuffer>) -> Result<bool> {
        match framebuffer {
            Some(framebuffer) => framebuffer.bind(),
            None => {
                self.shared.bind_framebuffer(None);
                Ok(true)
            }
        }
    }

    // ===== DRAW =====

    pub fn draw(&self, topology: PrimitiveTopology, first: u32, count: u32) -> Result<()> {
        self.draw_instanced(topology, first, count, 1)
    }

    /// Draw `count` vertices (or indices, when the layout has an index
    /// buffer) starting at `first`.
    ///
    /// A draw with a missing program, vertex layout or bind group is logged
    /// and skipped, as is every draw while the context is lost.
    pub fn draw_instanced(&self, topology: PrimitiveTopology, first: u32, count: u32, instances: u32) -> Result<()> {
        if self.shared.is_lost() || count == 0 || instances == 0 {
            return Ok(());
        }
        let (program, layout, states, framebuffer, groups, layout_dirty) = {
            let mut bindings = self.bindings.borrow_mut();
            let dirty = std::mem::take(&mut bindings.layout_dirty);
            (
                bindings.program.clone(),
                bindings.vertex_layout.clone(),
                bindings.render_states.clone(),
                bindings.framebuffer.clone(),
                bindings.bind_groups.clone(),
                dirty,
            )
        };
        let Some(program) = program else {
            gpu_warn!(SOURCE, "Draw skipped: no program set");
            return Ok(());
        };
        let Some(layout) = layout else {
            gpu_warn!(SOURCE, "Draw skipped: no vertex layout set");
            return Ok(());
        };

        match program.activate() {
            Ok(true) => {}
            Ok(false) => return Ok(()),
            Err(e) => {
                gpu_warn!(SOURCE, "Draw skipped: program {} is unusable ({})", program.uid(), e);
                return Ok(());
            }
        }

        for index in 0..program.bind_group_layouts().len() {
            let Some(bound) = groups.get(index).cloned().flatten() else {
                gpu_warn!(SOURCE, "Draw skipped: bind group {} is not set", index);
                return Ok(());
            };
            if !bound.group.is_complete() {
                gpu_warn!(SOURCE, "Draw skipped: bind group {} has empty slots", index);
                return Ok(());
            }
            bound.group.apply(&program, &bound.offsets)?;
        }

        if !self.bind_target(framebuffer.as_deref())? {
            return Ok(());
        }

        // a vertex array is always rebound; loose attributes only when stale
        let released = self.shared.take_vertex_array_dirty();
        let rebind = layout.native().is_some() || layout_dirty || released;
        if rebind && !layout.bind()? {
            return Ok(());
        }

        let instanced = instances > 1 || layout.has_instance_data();
        if instanced && !self.shared.caps().misc.instancing {
            gpu_bail!(Unsupported, SOURCE, "Instanced draws need ANGLE_instanced_arrays on this tier");
        }

        let gl = self.shared.gl();
        {
            let mut cache = self.state_cache.borrow_mut();
            match &states {
                Some(states) => cache.apply(gl, states, false),
                None => cache.apply_defaults(gl, false),
            };
        }

        let mode = topology.to_gl();
        match layout.index_buffer() {
            Some(indices) => {
                if first as u64 + count as u64 > indices.count() as u64 {
                    gpu_bail!(
                        InvalidUsage,
                        SOURCE,
                        "Draw of {} indices from {} overflows the index buffer ({})",
                        count,
                        first,
                        indices.count()
                    );
                }
                let index_type = indices.index_type();
                let offset = first * index_type.size();
                if instanced {
                    gl.draw_elements_instanced(mode, count, index_type.to_gl(), offset, instances);
                } else {
                    gl.draw_elements(mode, count, index_type.to_gl(), offset);
                }
            }
            None => {
                if instanced {
                    gl.draw_arrays_instanced(mode, first, count, instances);
                } else {
                    gl.draw_arrays(mode, first, count);
                }
            }
        }
        self.shared.bump_draw_tag();
        self.draw_calls.set(self.draw_calls.get() + 1);
        Ok(())
    }

    /// Clear the current target. Each `Some` selects a buffer to clear.
    pub fn clear_frame_buffer(&self, color: Option<[f32; 4]>, depth: Option<f32>, stencil: Option<i32>) -> Result<()> {
        if self.shared.is_lost() {
            return Ok(());
        }
        let framebuffer = self.bindings.borrow().framebuffer.clone();
        if !self.bind_target(framebuffer.as_deref())? {
            return Ok(());
        }
        let gl = self.shared.gl();
        let mut cache = self.state_cache.borrow_mut();
        let mut mask = 0;
        if let Some([r, g, b, a]) = color {
            gl.color_mask(true, true, true, true);
            gl.clear_color(r, g, b, a);
            cache.invalidate(StateCategory::Color);
            mask |= gl::COLOR_BUFFER_BIT;
        }
        if let Some(depth) = depth {
            gl.depth_mask(true);
            gl.clear_depth(depth);
            cache.invalidate(StateCategory::Depth);
            mask |= gl::DEPTH_BUFFER_BIT;
        }
        if let Some(stencil) = stencil {
            gl.stencil_mask_separate(gl::FRONT_AND_BACK, 0xFF);
            gl.clear_stencil(stencil);
            cache.invalidate(StateCategory::Stencil);
            mask |= gl::STENCIL_BUFFER_BIT;
        }
        if mask == 0 {
            return Ok(());
        }
        gl.clear(mask);
        self.shared.bump_draw_tag();
        Ok(())
    }

    // ===== READBACK =====

    /// Validate a read of the current target and pick its format
    fn check_read(&self, x: u32, y: u32, width: u32, height: u32) -> Result<ReadFormat> {
        if self.shared.is_lost() {
            return Err(Error::ContextLost);
        }
        let (target_width, target_height) = self.target_size();
        if width == 0 || height == 0 || exceeds(x, width, target_width) || exceeds(y, height, target_height) {
            gpu_bail!(
                InvalidUsage,
                SOURCE,
                "Read region {}x{} at ({}, {}) exceeds the target ({}x{})",
                width,
                height,
                x,
                y,
                target_width,
                target_height
            );
        }
        let Some(framebuffer) = self.bindings.borrow().framebuffer.clone() else {
            return Ok(ReadFormat::RGBA8);
        };
        let Some(attachment) = framebuffer.color_attachment(0) else {
            gpu_bail!(InvalidUsage, SOURCE, "Framebuffer {} has no color attachment to read", framebuffer.uid());
        };
        match attachment.texture.format().sample_kind() {
            SampleKind::Normalized => Ok(ReadFormat::RGBA8),
            SampleKind::Float | SampleKind::HalfFloat => Ok(ReadFormat::RGBA32F),
            other => gpu_bail!(Unsupported, SOURCE, "Cannot read back {:?} attachments", other),
        }
    }

    /// Bind the single-sample image of the current target for reading.
    /// Returns the read binding point used.
    fn bind_read_source(&self) -> Result<u32> {
        let framebuffer = self.bindings.borrow().framebuffer.clone();
        let source = match &framebuffer {
            Some(framebuffer) => match framebuffer.read_source()? {
                Some(handle) => Some(handle),
                None => return Err(Error::ContextLost),
            },
            None => None,
        };
        let gl = self.shared.gl();
        if self.shared.tier().is_extended() {
            gl.bind_framebuffer(gl::READ_FRAMEBUFFER, source);
            if source.is_some() {
                gl.read_buffer(gl::COLOR_ATTACHMENT0);
            }
            Ok(gl::READ_FRAMEBUFFER)
        } else {
            self.shared.bind_framebuffer(source);
            Ok(gl::FRAMEBUFFER)
        }
    }

    fn release_read_source(&self, read_target: u32) -> Result<()> {
        if read_target == gl::READ_FRAMEBUFFER {
            self.shared
                .gl()
                .bind_framebuffer(gl::READ_FRAMEBUFFER, self.shared.current_framebuffer());
            return Ok(());
        }
        let framebuffer = self.bindings.borrow().framebuffer.clone();
        self.bind_target(framebuffer.as_deref()).map(|_| ())
    }

    /// Read a region of the current target into `dst`.
    ///
    /// Coordinates are device pixels, origin bottom-left. The extended tier
    /// stages the read behind a fence; the legacy tier reads synchronously.
    pub async fn read_pixels(&self, x: u32, y: u32, width: u32, height: u32, dst: &mut [u8]) -> Result<()> {
        let format = self.check_read(x, y, width, height)?;
        let needed = format.byte_len(width, height);
        if dst.len() < needed {
            gpu_bail!(InvalidUsage, SOURCE, "Readback needs {} bytes, got {}", needed, dst.len());
        }
        let read_target = self.bind_read_source()?;
        let region = ReadRegion {
            x: x as i32,
            y: y as i32,
            width,
            height,
        };
        let pending = PendingRead::issue(
            self.shared.gl_rc(),
            region,
            format,
            self.shared.caps().misc.async_readback,
            self.shared.fence_poll_interval(),
        );
        self.release_read_source(read_target)?;
        pending?.finish(&mut dst[..needed]).await
    }

    /// Read a region of the current target into `buffer` at byte `offset`
    pub async fn read_pixels_to_buffer(
        &self,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        buffer: &Buffer,
        offset: u32,
    ) -> Result<()> {
        let format = self.check_read(x, y, width, height)?;
        let len = format.byte_len(width, height);
        if offset as u64 + len as u64 > buffer.size() as u64 {
            gpu_bail!(InvalidUsage, SOURCE, "Readback of {} bytes overflows the buffer", len);
        }
        let direct = self.shared.tier().is_extended()
            && buffer.usage().contains(BufferUsage::PACK)
            && !buffer.has_shadow();
        if direct {
            if !buffer.ensure_live()? {
                return Ok(());
            }
            let read_target = self.bind_read_source()?;
            if let Some(handle) = buffer.native() {
                let region = ReadRegion {
                    x: x as i32,
                    y: y as i32,
                    width,
                    height,
                };
                pack_into_buffer(self.shared.gl(), region, format, handle, offset);
            }
            return self.release_read_source(read_target);
        }
        let mut bytes = vec![0u8; len];
        self.read_pixels(x, y, width, height, &mut bytes).await?;
        buffer.buffer_sub_data(offset, &bytes)
    }

    // ===== FRAME LOOP =====

    /// Run one frame: poll the context, wake fence waits parked for the
    /// frame boundary, delete what the previous frame released, pump
    /// callback-driven video textures, then call `frame`.
    ///
    /// Returns false (without calling `frame`) while the context is lost.
    pub fn run_frame(&self, frame: impl FnOnce(&Device) -> Result<()>) -> Result<bool> {
        self.poll_context();
        readback::wake_parked();
        if self.shared.is_lost() {
            return Ok(false);
        }
        self.frame.set(self.frame.get() + 1);
        self.draw_calls.set(0);

        let deleted = self.shared.drain_deferred();
        if deleted > 0 {
            gpu_trace!(SOURCE, "Frame {}: deleted {} deferred handles", self.frame.get(), deleted);
        }
        for object in self.shared.live_objects() {
            object.frame_begin();
        }

        frame(self)?;
        Ok(true)
    }

    /// Compare the context's loss status with ours and run the transition
    pub fn poll_context(&self) {
        let lost = self.shared.gl().is_context_lost();
        if lost && !self.shared.is_lost() {
            self.handle_context_lost();
        } else if !lost && self.shared.is_lost() {
            self.handle_context_restored();
        }
    }

    // ===== CONTEXT LOSS =====

    /// The context is gone: invalidate every live object without deleting
    /// its handles, drop queued deletions and forget every cached binding.
    pub fn handle_context_lost(&self) {
        if self.shared.is_lost() {
            return;
        }
        self.shared.set_lost(true);
        let mut invalidated = 0;
        for object in self.shared.live_objects() {
            if !object.is_disposed() {
                object.invalidate();
                self.shared.mark_pending_restore(object.uid());
                invalidated += 1;
            }
        }
        self.shared.clear_deferred();
        self.shared.forget_bindings();
        self.state_cache.borrow_mut().invalidate_all();
        self.bindings.borrow_mut().layout_dirty = true;
        gpu_warn!(SOURCE, "Context lost, {} objects invalidated", invalidated);
        self.emit(DeviceEvent::ContextLost);
    }

    /// The context is back: rebuild the capability tables, restore every
    /// object the loss invalidated and force the whole pipeline state.
    /// Returns the number of restored objects.
    pub fn handle_context_restored(&self) -> usize {
        if !self.shared.is_lost() {
            return 0;
        }
        self.shared.set_lost(false);
        self.shared.set_caps(DeviceCaps::query(self.shared.gl()));
        self.shared.forget_bindings();

        let pending = self.shared.take_pending_restore();
        let mut objects: Vec<_> = self
            .shared
            .live_objects()
            .into_iter()
            .filter(|object| pending.contains(&object.uid()))
            .collect();
        // dependencies first: storage before the objects sampling or attaching it
        objects.sort_by_key(|object| (restore_rank(object.kind()), object.uid()));

        let mut restored = 0;
        for object in &objects {
            match object.restore() {
                Ok(()) => restored += 1,
                Err(e) => gpu_error!(SOURCE, "Failed to restore {:?} {}: {}", object.kind(), object.uid(), e),
            }
        }

        {
            let mut cache = self.state_cache.borrow_mut();
            cache.invalidate_all();
            cache.apply_defaults(self.shared.gl(), true);
        }
        self.shared.gl().pixel_store_i32(gl::UNPACK_ALIGNMENT, 1);
        self.bindings.borrow_mut().layout_dirty = true;
        let framebuffer = self.bindings.borrow().framebuffer.clone();
        if let Err(e) = self.bind_target(framebuffer.as_deref()) {
            gpu_error!(SOURCE, "Failed to rebind the framebuffer after restore: {}", e);
        }
        self.apply_viewport();

        gpu_info!(SOURCE, "Context restored, {} objects restored", restored);
        self.emit(DeviceEvent::ContextRestored {
            restored_objects: restored,
        });
        restored
    }

    // ===== EVENTS =====

    pub fn on_event(&self, listener: impl FnMut(&DeviceEvent) + 'static) {
        self.listeners.borrow_mut().push(Box::new(listener));
    }

    fn emit(&self, event: DeviceEvent) {
        // listeners may register more listeners while running
        let mut listeners = std::mem::take(&mut *self.listeners.borrow_mut());
        for listener in listeners.iter_mut() {
            listener(&event);
        }
        let mut slot = self.listeners.borrow_mut();
        listeners.append(&mut slot);
        *slot = listeners;
    }

    // ===== DIAGNOSTICS =====

    pub fn stats(&self) -> DeviceStats {
        let mut stats = DeviceStats {
            frame: self.frame.get(),
            draw_calls: self.draw_calls.get(),
            gpu_memory_used: self.shared.memory(),
            pending_deletions: self.shared.pending_deletions() as u32,
            ..DeviceStats::default()
        };
        for object in self.shared.live_objects() {
            match object.kind() {
                ObjectKind::Texture => stats.textures += 1,
                ObjectKind::Buffer => stats.buffers += 1,
                ObjectKind::Program => stats.programs += 1,
                ObjectKind::Framebuffer => stats.framebuffers += 1,
                ObjectKind::Sampler => stats.samplers += 1,
                ObjectKind::VertexLayout => stats.vertex_layouts += 1,
            }
        }
        stats
    }

    /// Turn a pending context error code into an error
    pub fn check_error(&self) -> Result<()> {
        let code = self.shared.gl().get_error();
        if code == gl::NO_ERROR {
            return Ok(());
        }
        let error = Error::from_context_code(code);
        gpu_error!(SOURCE, "{}", error);
        Err(error)
    }
}

/// Order in which a restore brings object families back
fn restore_rank(kind: ObjectKind) -> u8 {
    match kind {
        ObjectKind::Buffer => 0,
        ObjectKind::Texture => 1,
        ObjectKind::Sampler => 2,
        ObjectKind::Program => 3,
        ObjectKind::VertexLayout => 4,
        ObjectKind::Framebuffer => 5,
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        // cached samplers hold the shared state
        self.shared.clear_sampler_cache();
        self.shared.drain_deferred();
    }
}

#[cfg(test)]
#[path = "device_tests.rs"]
mod tests;
