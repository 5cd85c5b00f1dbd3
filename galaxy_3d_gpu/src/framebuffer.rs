/// Framebuffer: a fixed set of texture attachments rendered into together
///
/// Attachments are bound lazily on first bind and the completeness status is
/// memoised until an attachment changes face, layer, level or native
/// storage. Two capability gaps are emulated here so draws never notice:
///
/// * multisampling renders into a parallel framebuffer of multisample
///   renderbuffers, resolved into the textures on unbind when something was
///   drawn since the last resolve;
/// * rendering into a mip level other than 0 on a context that cannot attach
///   one goes through an intermediate texture of that level's size, copied
///   back into the real level on unbind.

use std::cell::{Cell, RefCell};
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHasher};

use crate::caps::{memory_cost_of, TextureFormat};
use crate::context::{gl, NativeFramebuffer, NativeRenderbuffer, NativeTexture};
use crate::device::shared::{DeferredDelete, DeviceShared};
use crate::error::{Error, Result};
use crate::object::{GpuObject, ObjectBase, ObjectKind};
use crate::texture::{Texture, TextureDesc, TextureFlags, TextureKind};
use crate::{gpu_bail, gpu_debug, gpu_error, gpu_warn};

const SOURCE: &str = "galaxy3d::gpu::Framebuffer";

/// One texture image a framebuffer renders into
#[derive(Clone)]
pub struct FramebufferAttachment {
    pub texture: Rc<Texture>,
    /// Cube face, or array layer / 3D slice
    pub face_or_layer: u32,
    pub level: u32,
    /// Regenerate the texture's mip chain on unbind
    pub auto_mipmap: bool,
    /// Take part in the multisample resolve
    pub resolve: bool,
}

impl FramebufferAttachment {
    pub fn new(texture: Rc<Texture>) -> Self {
        Self {
            texture,
            face_or_layer: 0,
            level: 0,
            auto_mipmap: false,
            resolve: true,
        }
    }

    pub fn with_face(mut self, face_or_layer: u32) -> Self {
        self.face_or_layer = face_or_layer;
        self
    }

    pub fn at_level(mut self, level: u32) -> Self {
        self.level = level;
        self
    }

    pub fn with_auto_mipmap(mut self) -> Self {
        self.auto_mipmap = true;
        self
    }

    pub fn without_resolve(mut self) -> Self {
        self.resolve = false;
        self
    }

    fn size(&self) -> (u32, u32) {
        let (w, h, _) = self.texture.level_size(self.level);
        (w, h)
    }
}

/// Descriptor for creating a framebuffer
#[derive(Clone, Default)]
pub struct FramebufferDesc {
    pub color_attachments: Vec<FramebufferAttachment>,
    pub depth_stencil: Option<FramebufferAttachment>,
    /// Requested sample count (0 or 1 for none)
    pub samples: u32,
    pub label: Option<String>,
}

/// What is currently attached to one slot of the resolve framebuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AttachedImage {
    texture: NativeTexture,
    generation: u64,
    face_or_layer: u32,
    level: u32,
    /// Intermediate texture standing in for a mip level
    emulated: bool,
}

struct MsaaTarget {
    framebuffer: NativeFramebuffer,
    /// Colors in order, depth/stencil last
    renderbuffers: Vec<NativeRenderbuffer>,
    size: (u32, u32),
    complete: bool,
    memory: u64,
}

/// Render target made of texture attachments
pub struct Framebuffer {
    base: ObjectBase,
    device: Rc<DeviceShared>,
    colors: RefCell<Vec<FramebufferAttachment>>,
    depth: Option<FramebufferAttachment>,
    samples: u32,
    format_hash: u64,
    size: Cell<(u32, u32)>,
    handle: Cell<Option<NativeFramebuffer>>,
    /// Memoised completeness of the resolve framebuffer
    complete: Cell<Option<bool>>,
    attached: RefCell<Vec<Option<AttachedImage>>>,
    msaa: RefCell<Option<MsaaTarget>>,
    /// Stand-ins for mip levels the context cannot attach, per (texture uid, level)
    intermediates: RefCell<FxHashMap<(u64, u32), Rc<Texture>>>,
    bind_tag: Cell<u64>,
    last_resolve_tag: Cell<u64>,
}

fn depth_attachment_point(format: TextureFormat) -> u32 {
    if format.has_stencil() {
        gl::DEPTH_STENCIL_ATTACHMENT
    } else {
        gl::DEPTH_ATTACHMENT
    }
}

impl Framebuffer {
    pub(crate) fn new(device: &Rc<DeviceShared>, desc: FramebufferDesc) -> Result<Rc<Self>> {
        let caps = device.caps();
        if desc.color_attachments.is_empty() && desc.depth_stencil.is_none() {
            gpu_bail!(InvalidUsage, SOURCE, "Framebuffer needs at least one attachment");
        }
        let max_colors = caps.framebuffer.max_color_attachments.min(caps.framebuffer.max_draw_buffers);
        if desc.color_attachments.len() as u32 > max_colors {
            gpu_bail!(
                Unsupported,
                SOURCE,
                "{} color attachments exceed the limit of {}",
                desc.color_attachments.len(),
                max_colors
            );
        }

        for (index, attachment) in desc.color_attachments.iter().enumerate() {
            Self::check_attachment(device, attachment, false)
                .map_err(|e| Error::InvalidUsage(format!("Color attachment {}: {}", index, e)))?;
        }
        if let Some(depth) = &desc.depth_stencil {
            Self::check_attachment(device, depth, true)
                .map_err(|e| Error::InvalidUsage(format!("Depth attachment: {}", e)))?;
        }

        let all = || desc.color_attachments.iter().chain(desc.depth_stencil.iter());
        let size = all().next().map(|a| a.size()).unwrap_or((1, 1));
        if let Some(other) = all().find(|a| a.size() != size) {
            let (w, h) = other.size();
            gpu_bail!(
                InvalidUsage,
                SOURCE,
                "Attachment sizes differ: {}x{} and {}x{}",
                size.0,
                size.1,
                w,
                h
            );
        }

        let mut samples = desc.samples.max(1);
        if samples > 1 {
            if !caps.framebuffer.multisample || !device.msaa_enabled() {
                gpu_warn!(SOURCE, "Multisampling unavailable, rendering {} samples as 1", samples);
                samples = 1;
            } else if samples > caps.framebuffer.max_samples {
                gpu_warn!(
                    SOURCE,
                    "{} samples requested, clamped to {}",
                    samples,
                    caps.framebuffer.max_samples
                );
                samples = caps.framebuffer.max_samples;
            }
        }

        let mut hasher = FxHasher::default();
        for attachment in all() {
            attachment.texture.format().hash(&mut hasher);
        }
        desc.depth_stencil.is_some().hash(&mut hasher);
        samples.hash(&mut hasher);
        let format_hash = hasher.finish();

        let slots = desc.color_attachments.len() + desc.depth_stencil.iter().count();
        let framebuffer = Rc::new(Self {
            base: ObjectBase::new(),
            device: device.clone(),
            colors: RefCell::new(desc.color_attachments),
            depth: desc.depth_stencil,
            samples,
            format_hash,
            size: Cell::new(size),
            handle: Cell::new(None),
            complete: Cell::new(None),
            attached: RefCell::new(vec![None; slots]),
            msaa: RefCell::new(None),
            intermediates: RefCell::new(FxHashMap::default()),
            bind_tag: Cell::new(0),
            last_resolve_tag: Cell::new(0),
        });
        if let Some(label) = desc.label {
            framebuffer.base.set_label(label);
        }
        device.register(&framebuffer);
        gpu_debug!(
            SOURCE,
            "Created framebuffer {} ({}x{}, {} colors, {} samples)",
            framebuffer.uid(),
            size.0,
            size.1,
            slots,
            samples
        );
        Ok(framebuffer)
    }

    /// Range and capability checks for one attachment
    fn check_attachment(device: &DeviceShared, attachment: &FramebufferAttachment, depth: bool) -> Result<()> {
        let caps = device.caps();
        let texture = &attachment.texture;
        let format = texture.format();
        let renderable = caps.texture.format(format).map(|i| i.renderable).unwrap_or(false);
        if !renderable {
            return Err(Error::Unsupported(format!("{:?} is not renderable", format)));
        }
        if format.is_depth() != depth {
            return Err(Error::InvalidUsage(format!("{:?} cannot be used in this slot", format)));
        }
        if texture.kind() == TextureKind::Video {
            return Err(Error::InvalidUsage("video textures cannot be rendered into".to_string()));
        }
        if attachment.level >= texture.mip_levels() {
            return Err(Error::InvalidUsage(format!(
                "mip level {} out of range ({} levels)",
                attachment.level,
                texture.mip_levels()
            )));
        }
        let (_, _, depth_at_level) = texture.level_size(attachment.level);
        let faces = match texture.kind() {
            TextureKind::Cube => 6,
            kind if kind.is_layered() => depth_at_level,
            _ => 1,
        };
        if attachment.face_or_layer >= faces {
            return Err(Error::InvalidUsage(format!(
                "face/layer {} out of range ({})",
                attachment.face_or_layer, faces
            )));
        }
        if attachment.level > 0 && !caps.framebuffer.render_to_mip_level && texture.kind().is_layered() {
            return Err(Error::Unsupported("layered mip levels cannot be emulated".to_string()));
        }
        Ok(())
    }

    // ===== ACCESSORS =====

    pub fn width(&self) -> u32 {
        self.size.get().0
    }

    pub fn height(&self) -> u32 {
        self.size.get().1
    }

    /// Effective sample count (1 when not multisampled)
    pub fn samples(&self) -> u32 {
        self.samples
    }

    pub fn is_multisampled(&self) -> bool {
        self.samples > 1
    }

    /// Hash of attachment formats and sample count, for pipeline compatibility
    pub fn format_hash(&self) -> u64 {
        self.format_hash
    }

    pub fn color_count(&self) -> usize {
        self.colors.borrow().len()
    }

    pub fn color_attachment(&self, index: usize) -> Option<FramebufferAttachment> {
        self.colors.borrow().get(index).cloned()
    }

    pub fn depth_attachment(&self) -> Option<&FramebufferAttachment> {
        self.depth.as_ref()
    }

    /// Memoised completeness (`None` until first bind)
    pub fn is_complete(&self) -> Option<bool> {
        self.complete.get()
    }

    pub fn native(&self) -> Option<NativeFramebuffer> {
        self.handle.get()
    }

    /// Re-target color attachment `index` to another face/layer and level.
    /// Takes effect on the next bind.
    pub fn set_color_target(&self, index: usize, face_or_layer: u32, level: u32) -> Result<()> {
        let Some(current) = self.color_attachment(index) else {
            gpu_bail!(InvalidUsage, SOURCE, "No color attachment {}", index);
        };
        let changed = FramebufferAttachment {
            face_or_layer,
            level,
            ..current
        };
        Self::check_attachment(&self.device, &changed, false)?;
        let others_agree = self
            .colors
            .borrow()
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, a)| a.size())
            .chain(self.depth.iter().map(|a| a.size()))
            .all(|s| s == changed.size());
        if !others_agree {
            gpu_bail!(InvalidUsage, SOURCE, "Level {} size differs from the other attachments", level);
        }
        self.size.set(changed.size());
        self.colors.borrow_mut()[index] = changed;
        Ok(())
    }

    // ===== ATTACHMENT =====

    fn needs_mip_emulation(&self, attachment: &FramebufferAttachment) -> bool {
        attachment.level > 0 && !self.device.caps().framebuffer.render_to_mip_level
    }

    fn intermediate(&self, attachment: &FramebufferAttachment) -> Result<Rc<Texture>> {
        let key = (attachment.texture.uid(), attachment.level);
        if let Some(texture) = self.intermediates.borrow().get(&key) {
            return Ok(texture.clone());
        }
        let (w, h) = attachment.size();
        let desc = TextureDesc::new(attachment.texture.format(), w, h).with_flags(TextureFlags::NO_MIPMAP);
        let texture = Texture::new(&self.device, TextureKind::Tex2D, &desc, None)?;
        gpu_debug!(
            SOURCE,
            "Framebuffer {} emulates level {} of texture {} ({}x{})",
            self.uid(),
            attachment.level,
            attachment.texture.uid(),
            w,
            h
        );
        self.intermediates.borrow_mut().insert(key, texture.clone());
        Ok(texture)
    }

    /// Image to attach for `attachment`, `None` while the context is lost
    fn desired_image(&self, attachment: &FramebufferAttachment) -> Result<Option<AttachedImage>> {
        if self.needs_mip_emulation(attachment) {
            let stand_in = self.intermediate(attachment)?;
            return Ok(stand_in.ensure_ready()?.map(|texture| AttachedImage {
                texture,
                generation: stand_in.generation(),
                face_or_layer: 0,
                level: 0,
                emulated: true,
            }));
        }
        Ok(attachment.texture.ensure_ready()?.map(|texture| AttachedImage {
            texture,
            generation: attachment.texture.generation(),
            face_or_layer: attachment.face_or_layer,
            level: attachment.level,
            emulated: false,
        }))
    }

    fn attach_image(&self, point: u32, attachment: &FramebufferAttachment, image: &AttachedImage) {
        let gl = self.device.gl();
        let kind = attachment.texture.kind();
        if image.emulated {
            gl.framebuffer_texture_2d(gl::FRAMEBUFFER, point, gl::TEXTURE_2D, Some(image.texture), 0);
        } else if kind.is_layered() {
            gl.framebuffer_texture_layer(
                gl::FRAMEBUFFER,
                point,
                Some(image.texture),
                image.level,
                image.face_or_layer,
            );
        } else {
            gl.framebuffer_texture_2d(
                gl::FRAMEBUFFER,
                point,
                kind.image_target(image.face_or_layer),
                Some(image.texture),
                image.level,
            );
        }
    }

    /// Select every color attachment for drawing on the bound framebuffer
    fn configure_draw_buffers(&self) {
        let gl = self.device.gl();
        let count = self.color_count() as u32;
        if count == 0 {
            if self.device.tier().is_extended() {
                gl.draw_buffers(&[gl::NONE]);
                gl.read_buffer(gl::NONE);
            }
        } else if count > 1 {
            let buffers: Vec<u32> = (0..count).map(|i| gl::COLOR_ATTACHMENT0 + i).collect();
            gl.draw_buffers(&buffers);
        }
    }

    /// Attach whatever changed since the last bind and re-check completeness
    /// only then. Returns false while the context is lost.
    fn prepare(&self) -> Result<bool> {
        if self.device.is_lost() {
            return Ok(false);
        }
        if self.is_disposed() {
            self.reload()?;
        }
        let colors = self.colors.borrow().clone();
        let slots: Vec<(u32, &FramebufferAttachment)> = colors
            .iter()
            .enumerate()
            .map(|(i, a)| (gl::COLOR_ATTACHMENT0 + i as u32, a))
            .chain(
                self.depth
                    .iter()
                    .map(|a| (depth_attachment_point(a.texture.format()), a)),
            )
            .collect();

        let mut desired = Vec::with_capacity(slots.len());
        for (_, attachment) in &slots {
            match self.desired_image(attachment)? {
                Some(image) => desired.push(Some(image)),
                None => return Ok(false),
            }
        }

        // Textures may have been resized since construction
        let size = slots.first().map(|(_, a)| a.size()).unwrap_or((1, 1));
        if slots.iter().any(|(_, a)| a.size() != size) {
            self.complete.set(Some(false));
            gpu_bail!(InvalidResource, SOURCE, "Framebuffer {} attachments no longer agree in size", self.uid());
        }
        self.size.set(size);

        let handle = match self.handle.get() {
            Some(handle) => handle,
            None => {
                self.create_native()?;
                self.handle.get().ok_or(Error::InvalidResource("Framebuffer has no handle".to_string()))?
            }
        };

        let dirty = *self.attached.borrow() != desired || self.complete.get().is_none();
        if dirty {
            self.device.bind_framebuffer(Some(handle));
            let attached = self.attached.borrow().clone();
            for (slot, ((point, attachment), image)) in slots.iter().zip(&desired).enumerate() {
                if let Some(image) = image {
                    if attached.get(slot).copied().flatten() != Some(*image) {
                        self.attach_image(*point, attachment, image);
                    }
                }
            }
            self.configure_draw_buffers();
            let status = self.device.gl().check_framebuffer_status(gl::FRAMEBUFFER);
            let complete = status == gl::FRAMEBUFFER_COMPLETE;
            if !complete {
                gpu_error!(SOURCE, "Framebuffer {} is incomplete (status 0x{:X})", self.uid(), status);
            }
            self.complete.set(Some(complete));
            *self.attached.borrow_mut() = desired;
        }

        if self.samples > 1 {
            self.prepare_msaa(size)?;
        }
        Ok(true)
    }

    fn prepare_msaa(&self, size: (u32, u32)) -> Result<()> {
        let stale = matches!(self.msaa.borrow().as_ref(), Some(m) if m.size != size);
        if stale {
            if let Some(old) = self.msaa.borrow_mut().take() {
                self.device.defer_delete(DeferredDelete::Framebuffer(old.framebuffer));
                for rb in old.renderbuffers {
                    self.device.defer_delete(DeferredDelete::Renderbuffer(rb));
                }
                self.device.remove_memory(old.memory);
            }
        }
        if self.msaa.borrow().is_some() {
            return Ok(());
        }

        let gl = self.device.gl();
        let caps = self.device.caps();
        let framebuffer = gl
            .create_framebuffer()
            .ok_or_else(|| Error::BackendError("Failed to create multisample framebuffer".to_string()))?;
        self.device.bind_framebuffer(Some(framebuffer));

        let colors = self.colors.borrow().clone();
        let slots = colors
            .iter()
            .enumerate()
            .map(|(i, a)| (gl::COLOR_ATTACHMENT0 + i as u32, a))
            .chain(self.depth.iter().map(|a| (depth_attachment_point(a.texture.format()), a)));
        let mut renderbuffers = Vec::new();
        let mut memory = 0;
        for (point, attachment) in slots {
            let format = attachment.texture.format();
            let Some(info) = caps.texture.format(format).copied() else {
                gpu_bail!(Unsupported, SOURCE, "{:?} is not available on this context", format);
            };
            let rb = gl
                .create_renderbuffer()
                .ok_or_else(|| Error::BackendError("Failed to create renderbuffer".to_string()))?;
            gl.bind_renderbuffer(gl::RENDERBUFFER, Some(rb));
            gl.renderbuffer_storage_multisample(gl::RENDERBUFFER, self.samples, info.gl_internal_format, size.0, size.1);
            gl.framebuffer_renderbuffer(gl::FRAMEBUFFER, point, gl::RENDERBUFFER, Some(rb));
            memory += memory_cost_of(&info, size.0 as u64 * size.1 as u64) * self.samples as u64;
            renderbuffers.push(rb);
        }
        gl.bind_renderbuffer(gl::RENDERBUFFER, None);
        self.configure_draw_buffers();
        let complete = gl.check_framebuffer_status(gl::FRAMEBUFFER) == gl::FRAMEBUFFER_COMPLETE;
        if !complete {
            gpu_error!(SOURCE, "Multisample framebuffer of {} is incomplete", self.uid());
        }
        self.device.add_memory(memory);
        *self.msaa.borrow_mut() = Some(MsaaTarget {
            framebuffer,
            renderbuffers,
            size,
            complete,
            memory,
        });
        Ok(())
    }

    // ===== BIND / UNBIND =====

    /// Make this the draw target. Returns false while the context is lost.
    pub(crate) fn bind(&self) -> Result<bool> {
        if !self.prepare()? {
            return Ok(false);
        }
        if self.complete.get() != Some(true) {
            gpu_bail!(InvalidResource, SOURCE, "Framebuffer {} is incomplete", self.uid());
        }
        let target = match self.msaa.borrow().as_ref() {
            Some(msaa) if msaa.complete => msaa.framebuffer,
            Some(_) => gpu_bail!(InvalidResource, SOURCE, "Framebuffer {} multisample target is incomplete", self.uid()),
            None => self.handle.get().ok_or(Error::InvalidResource("Framebuffer has no handle".to_string()))?,
        };
        self.device.bind_framebuffer(Some(target));
        self.bind_tag.set(self.device.draw_tag());
        Ok(true)
    }

    /// Anything drawn since this framebuffer was bound or last resolved
    fn drawn_since_resolve(&self) -> bool {
        self.device.draw_tag() > self.bind_tag.get().max(self.last_resolve_tag.get())
    }

    /// Finish rendering: resolve, copy emulated levels back, build mips
    pub(crate) fn unbind(&self) -> Result<()> {
        if self.device.is_lost() || self.is_disposed() {
            return Ok(());
        }
        if !self.drawn_since_resolve() {
            return Ok(());
        }
        self.resolve();
        self.last_resolve_tag.set(self.device.draw_tag());
        self.copy_back_levels()?;
        let colors = self.colors.borrow().clone();
        for attachment in colors.iter().chain(self.depth.iter()) {
            if attachment.auto_mipmap {
                attachment.texture.generate_mipmaps()?;
            }
        }
        Ok(())
    }

    /// Resolve now if needed, returning the single-sample framebuffer to
    /// read from
    pub(crate) fn read_source(&self) -> Result<Option<NativeFramebuffer>> {
        if !self.prepare()? {
            return Ok(None);
        }
        if self.drawn_since_resolve() {
            self.resolve();
            self.last_resolve_tag.set(self.device.draw_tag());
            self.copy_back_levels()?;
        }
        Ok(self.handle.get())
    }

    /// Blit multisample renderbuffers into the textures, one color
    /// attachment at a time, depth/stencil last
    fn resolve(&self) {
        let msaa = self.msaa.borrow();
        let (Some(msaa), Some(main)) = (msaa.as_ref(), self.handle.get()) else {
            return;
        };
        let gl = self.device.gl();
        let (w, h) = self.size.get();
        let (w, h) = (w as i32, h as i32);
        gl.bind_framebuffer(gl::READ_FRAMEBUFFER, Some(msaa.framebuffer));
        gl.bind_framebuffer(gl::DRAW_FRAMEBUFFER, Some(main));

        let colors = self.colors.borrow();
        for (i, attachment) in colors.iter().enumerate() {
            if !attachment.resolve {
                continue;
            }
            let point = gl::COLOR_ATTACHMENT0 + i as u32;
            let mut draw = vec![gl::NONE; i + 1];
            draw[i] = point;
            gl.read_buffer(point);
            gl.draw_buffers(&draw);
            gl.blit_framebuffer(0, 0, w, h, 0, 0, w, h, gl::COLOR_BUFFER_BIT, gl::NEAREST);
        }
        if let Some(depth) = self.depth.as_ref().filter(|d| d.resolve) {
            let mut mask = gl::DEPTH_BUFFER_BIT;
            if depth.texture.format().has_stencil() {
                mask |= gl::STENCIL_BUFFER_BIT;
            }
            gl.blit_framebuffer(0, 0, w, h, 0, 0, w, h, mask, gl::NEAREST);
        }
        if !colors.is_empty() {
            let all: Vec<u32> = (0..colors.len() as u32).map(|i| gl::COLOR_ATTACHMENT0 + i).collect();
            gl.draw_buffers(&all);
        }
        gl.bind_framebuffer(gl::FRAMEBUFFER, self.device.current_framebuffer());
    }

    /// Copy intermediate textures into the mip level they stand in for
    fn copy_back_levels(&self) -> Result<()> {
        let colors = self.colors.borrow().clone();
        for attachment in &colors {
            if !self.needs_mip_emulation(attachment) {
                continue;
            }
            let key = (attachment.texture.uid(), attachment.level);
            let Some(stand_in) = self.intermediates.borrow().get(&key).cloned() else {
                continue;
            };
            let (Some(src), Some(dst)) = (stand_in.native(), attachment.texture.ensure_ready()?) else {
                continue;
            };
            let gl = self.device.gl();
            let scratch = gl
                .create_framebuffer()
                .ok_or_else(|| Error::BackendError("Failed to create copy framebuffer".to_string()))?;
            gl.bind_framebuffer(gl::FRAMEBUFFER, Some(scratch));
            gl.framebuffer_texture_2d(gl::FRAMEBUFFER, gl::COLOR_ATTACHMENT0, gl::TEXTURE_2D, Some(src), 0);
            let kind = attachment.texture.kind();
            self.device.bind_texture_for_update(kind.bind_target(), Some(dst));
            let (w, h) = attachment.size();
            gl.copy_tex_sub_image_2d(kind.image_target(attachment.face_or_layer), attachment.level, 0, 0, 0, 0, w, h);
            gl.bind_framebuffer(gl::FRAMEBUFFER, self.device.current_framebuffer());
            gl.delete_framebuffer(scratch);
        }
        Ok(())
    }

    fn delete_handles(&self, delete: bool) {
        let gl = self.device.gl();
        if let Some(handle) = self.handle.take() {
            if delete {
                if self.device.current_framebuffer() == Some(handle) {
                    self.device.bind_framebuffer(None);
                }
                gl.delete_framebuffer(handle);
            }
        }
        if let Some(msaa) = self.msaa.borrow_mut().take() {
            if delete {
                if self.device.current_framebuffer() == Some(msaa.framebuffer) {
                    self.device.bind_framebuffer(None);
                }
                gl.delete_framebuffer(msaa.framebuffer);
                for rb in msaa.renderbuffers {
                    gl.delete_renderbuffer(rb);
                }
            }
            self.device.remove_memory(msaa.memory);
        }
    }
}

impl GpuObject for Framebuffer {
    fn base(&self) -> &ObjectBase {
        &self.base
    }

    fn kind(&self) -> ObjectKind {
        ObjectKind::Framebuffer
    }

    fn native_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.handle.get().map(|h| h.id()).into_iter().collect();
        if let Some(msaa) = self.msaa.borrow().as_ref() {
            ids.push(msaa.framebuffer.id());
            ids.extend(msaa.renderbuffers.iter().map(|rb| rb.id()));
        }
        ids
    }

    fn release_native(&self, delete: bool) {
        self.delete_handles(delete);
        self.complete.set(None);
        for slot in self.attached.borrow_mut().iter_mut() {
            *slot = None;
        }
    }

    fn create_native(&self) -> Result<()> {
        if self.handle.get().is_some() {
            return Ok(());
        }
        let handle = self
            .device
            .gl()
            .create_framebuffer()
            .ok_or_else(|| Error::BackendError(format!("Failed to create framebuffer {}", self.uid())))?;
        self.handle.set(Some(handle));
        self.complete.set(None);
        Ok(())
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        let lost = self.device.is_lost();
        self.delete_handles(!lost);
        self.device.unregister(self.base.registry_key());
    }
}

#[cfg(test)]
#[path = "framebuffer_tests.rs"]
mod tests;
