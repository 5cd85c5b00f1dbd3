/// Texture family: 2D, 2D array, 3D, cube and video textures
///
/// All variants are one `Texture` type parameterised by `TextureKind`; the
/// typed wrappers only add the kind-specific upload helpers. Storage is
/// allocated lazily on first real use and re-allocated whenever format,
/// size or mip count change. The replaced handle is deleted at the next
/// frame boundary, never while it may still be bound.

mod kind;
mod source;

pub use kind::{compute_mip_levels, full_mip_count, MipChain, TextureFlags, TextureKind};
pub use source::{FrameQueue, ImageData, ImageSource, VideoSource};

use std::cell::{Cell, RefCell};
use std::ops::Deref;
use std::rc::Rc;

use crate::buffer::{Buffer, BufferUsage};
use crate::caps::{memory_cost_of, DeviceCaps, FormatInfo, SampleKind, TextureFormat};
use crate::context::{gl, NativeFramebuffer, NativeTexture};
use crate::device::readback::{exceeds, pack_into_buffer, PendingRead, ReadFormat, ReadRegion};
use crate::device::shared::{DeferredDelete, DeviceShared};
use crate::error::{Error, Result};
use crate::object::{GpuObject, ObjectBase, ObjectKind, RestoreHandler};
use crate::sampler::{Sampler, SamplerOptions, SamplingLimits};
use crate::{gpu_bail, gpu_debug, gpu_error};

const SOURCE: &str = "galaxy3d::gpu::Texture";

/// Descriptor for creating a texture
#[derive(Debug, Clone)]
pub struct TextureDesc {
    pub format: TextureFormat,
    pub width: u32,
    pub height: u32,
    /// Layers (2D array) or slices (3D); ignored by other kinds
    pub depth: u32,
    /// 0 requests the full chain
    pub mip_levels: u32,
    pub flags: TextureFlags,
    /// Used when a bind group pairs the texture with no explicit sampler
    pub sampler: SamplerOptions,
    pub label: Option<String>,
}

impl TextureDesc {
    pub fn new(format: TextureFormat, width: u32, height: u32) -> Self {
        Self {
            format,
            width,
            height,
            depth: 1,
            mip_levels: 0,
            flags: TextureFlags::empty(),
            sampler: SamplerOptions::default(),
            label: None,
        }
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }

    pub fn with_flags(mut self, flags: TextureFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_sampler(mut self, sampler: SamplerOptions) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Sub-region of one mip level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureRegion {
    pub x: u32,
    pub y: u32,
    /// First layer / slice (layered kinds)
    pub z: u32,
    pub width: u32,
    pub height: u32,
    /// Layer / slice count (layered kinds)
    pub depth: u32,
    pub level: u32,
    /// Cube face (cube kind)
    pub face: u32,
}

impl TextureRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            z: 0,
            width,
            height,
            depth: 1,
            level: 0,
            face: 0,
        }
    }

    pub fn at_level(mut self, level: u32) -> Self {
        self.level = level;
        self
    }

    pub fn on_face(mut self, face: u32) -> Self {
        self.face = face;
        self
    }

    pub fn with_layers(mut self, z: u32, depth: u32) -> Self {
        self.z = z;
        self.depth = depth;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AllocKey {
    format: TextureFormat,
    width: u32,
    height: u32,
    depth: u32,
    levels: u32,
}

struct TextureState {
    format: TextureFormat,
    width: u32,
    height: u32,
    depth: u32,
    requested_mips: u32,
    chain: MipChain,
    flags: TextureFlags,
    sampler: SamplerOptions,
    allocated: Option<AllocKey>,
    memory_cost: u64,
    generation: u64,
    /// Sampling parameters last written into the texture object (legacy tier)
    applied_sampling: Option<SamplerOptions>,
    video_frame: Option<u64>,
}

impl TextureState {
    fn alloc_key(&self) -> AllocKey {
        AllocKey {
            format: self.format,
            width: self.width,
            height: self.height,
            depth: self.depth,
            levels: self.chain.levels,
        }
    }
}

/// Extent of mip `level`
pub fn level_extent(width: u32, height: u32, level: u32) -> (u32, u32) {
    ((width >> level).max(1), (height >> level).max(1))
}

/// Bytes of a whole allocation, block padding included
fn allocation_cost(info: &FormatInfo, kind: TextureKind, key: &AllocKey) -> u64 {
    (0..key.levels)
        .map(|level| {
            let (w, h) = level_extent(key.width, key.height, level);
            let padded_w = w.div_ceil(info.block_width) * info.block_width;
            let padded_h = h.div_ceil(info.block_height) * info.block_height;
            let d = kind.level_depth(key.depth, level) as u64;
            memory_cost_of(info, padded_w as u64 * padded_h as u64) * d * kind.face_count() as u64
        })
        .sum()
}

/// A texture of any kind
pub struct Texture {
    base: ObjectBase,
    device: Rc<DeviceShared>,
    kind: TextureKind,
    state: RefCell<TextureState>,
    handle: Cell<Option<NativeTexture>>,
    video: Option<Rc<dyn VideoSource>>,
    restore_handler: RestoreHandler<Texture>,
}

impl Texture {
    pub(crate) fn new(
        device: &Rc<DeviceShared>,
        kind: TextureKind,
        desc: &TextureDesc,
        video: Option<Rc<dyn VideoSource>>,
    ) -> Result<Rc<Self>> {
        let caps = device.caps();
        let depth = if kind.is_layered() { desc.depth } else { 1 };
        validate_desc(&caps, kind, desc.format, desc.width, desc.height, depth, desc.flags)?;

        let chain = compute_mip_levels(
            device.tier(),
            kind,
            desc.width,
            desc.height,
            depth,
            desc.mip_levels,
            desc.flags,
        );

        let texture = Rc::new(Self {
            base: ObjectBase::new(),
            device: device.clone(),
            kind,
            state: RefCell::new(TextureState {
                format: desc.format,
                width: desc.width,
                height: desc.height,
                depth,
                requested_mips: desc.mip_levels,
                chain,
                flags: desc.flags,
                sampler: desc.sampler,
                allocated: None,
                memory_cost: 0,
                generation: 0,
                applied_sampling: None,
                video_frame: None,
            }),
            handle: Cell::new(None),
            video,
            restore_handler: RestoreHandler::new(),
        });
        if let Some(label) = &desc.label {
            texture.base.set_label(label.clone());
        }
        device.register(&texture);
        gpu_debug!(
            SOURCE,
            "Created {:?} texture {} ({}x{}x{}, {:?}, {} mips{})",
            kind,
            texture.uid(),
            desc.width,
            desc.height,
            depth,
            desc.format,
            chain.levels,
            if chain.legacy_fallback { ", legacy fallback" } else { "" }
        );
        Ok(texture)
    }

    // ===== ACCESSORS =====

    pub fn kind(&self) -> TextureKind {
        self.kind
    }

    pub fn format(&self) -> TextureFormat {
        self.state.borrow().format
    }

    pub fn width(&self) -> u32 {
        self.state.borrow().width
    }

    pub fn height(&self) -> u32 {
        self.state.borrow().height
    }

    /// Layers / slices (1 for 2D, cube and video)
    pub fn depth(&self) -> u32 {
        self.state.borrow().depth
    }

    pub fn mip_levels(&self) -> u32 {
        self.state.borrow().chain.levels
    }

    /// Legacy tier NPOT texture (one mip level, clamped sampling)
    pub fn is_legacy_fallback(&self) -> bool {
        self.state.borrow().chain.legacy_fallback
    }

    pub fn flags(&self) -> TextureFlags {
        self.state.borrow().flags
    }

    pub fn sampler_options(&self) -> SamplerOptions {
        self.state.borrow().sampler
    }

    pub fn set_sampler_options(&self, options: SamplerOptions) {
        self.state.borrow_mut().sampler = options;
    }

    /// Estimated bytes of the current allocation (0 until allocated)
    pub fn memory_cost(&self) -> u64 {
        self.state.borrow().memory_cost
    }

    pub fn is_allocated(&self) -> bool {
        self.handle.get().is_some()
    }

    pub fn native(&self) -> Option<NativeTexture> {
        self.handle.get()
    }

    /// Bumped on every (re)allocation; framebuffers re-attach when it moves
    pub(crate) fn generation(&self) -> u64 {
        self.state.borrow().generation
    }

    /// Size of mip `level` as (width, height, depth)
    pub fn level_size(&self, level: u32) -> (u32, u32, u32) {
        let state = self.state.borrow();
        let (w, h) = level_extent(state.width, state.height, level);
        (w, h, self.kind.level_depth(state.depth, level))
    }

    pub fn video_source(&self) -> Option<&Rc<dyn VideoSource>> {
        self.video.as_ref()
    }

    pub fn set_restore_handler(&self, handler: impl FnMut(&Texture) + 'static) {
        self.restore_handler.set(handler);
    }

    pub(crate) fn sampling_limits(&self) -> SamplingLimits {
        let state = self.state.borrow();
        let filterable = self
            .device
            .caps()
            .texture
            .format(state.format)
            .map(|info| info.filterable)
            .unwrap_or(false);
        SamplingLimits {
            filterable,
            mip_levels: state.chain.levels,
            legacy_fallback: state.chain.legacy_fallback,
        }
    }

    // ===== ALLOCATION =====

    /// Change the size. Storage is re-allocated on next use.
    pub fn resize(&self, width: u32, height: u32, depth: u32) -> Result<()> {
        let caps = self.device.caps();
        let (format, flags, requested) = {
            let state = self.state.borrow();
            (state.format, state.flags, state.requested_mips)
        };
        let depth = if self.kind.is_layered() { depth } else { 1 };
        validate_desc(&caps, self.kind, format, width, height, depth, flags)?;

        let chain = compute_mip_levels(self.device.tier(), self.kind, width, height, depth, requested, flags);
        let mut state = self.state.borrow_mut();
        state.width = width;
        state.height = height;
        state.depth = depth;
        state.chain = chain;
        Ok(())
    }

    /// Native handle with storage matching the logical description.
    /// `None` while the context is lost.
    pub(crate) fn ensure_ready(&self) -> Result<Option<NativeTexture>> {
        if self.device.is_lost() {
            return Ok(None);
        }
        if self.is_disposed() {
            self.reload()?;
        }
        self.allocate()?;
        Ok(self.handle.get())
    }

    fn allocate(&self) -> Result<()> {
        let key = self.state.borrow().alloc_key();
        if self.handle.get().is_some() && self.state.borrow().allocated == Some(key) {
            return Ok(());
        }

        if let Some(old) = self.handle.take() {
            self.device.defer_delete(DeferredDelete::Texture(old));
            let old_cost = std::mem::take(&mut self.state.borrow_mut().memory_cost);
            self.device.remove_memory(old_cost);
        }

        let caps = self.device.caps();
        let info = *caps.texture.format(key.format).ok_or_else(|| {
            Error::Unsupported(format!("{:?} is not available on this context", key.format))
        })?;
        let gl = self.device.gl();
        let handle = gl
            .create_texture()
            .ok_or_else(|| Error::BackendError(format!("Failed to create texture {}", self.uid())))?;
        let target = self.kind.bind_target();
        self.device.bind_texture_for_update(target, Some(handle));

        let immutable = caps.texture.immutable_storage && self.kind != TextureKind::Video;
        if immutable {
            if self.kind.is_layered() {
                gl.tex_storage_3d(target, key.levels, info.gl_internal_format, key.width, key.height, key.depth);
            } else {
                gl.tex_storage_2d(target, key.levels, info.gl_internal_format, key.width, key.height);
            }
        } else {
            for level in 0..key.levels {
                let (w, h) = level_extent(key.width, key.height, level);
                let d = self.kind.level_depth(key.depth, level);
                for face in 0..self.kind.face_count() {
                    let image_target = self.kind.image_target(face);
                    if info.compressed {
                        let zeros = vec![0u8; (key.format.image_size(w, h) * d as u64) as usize];
                        if self.kind.is_layered() {
                            gl.compressed_tex_image_3d(image_target, level, info.gl_internal_format, w, h, d, &zeros);
                        } else {
                            gl.compressed_tex_image_2d(image_target, level, info.gl_internal_format, w, h, &zeros);
                        }
                    } else if self.kind.is_layered() {
                        gl.tex_image_3d(
                            image_target,
                            level,
                            info.gl_internal_format,
                            w,
                            h,
                            d,
                            info.gl_format,
                            info.gl_type,
                            None,
                        );
                    } else {
                        gl.tex_image_2d(
                            image_target,
                            level,
                            info.gl_internal_format,
                            w,
                            h,
                            info.gl_format,
                            info.gl_type,
                            None,
                        );
                    }
                }
            }
            if self.device.tier().is_extended() {
                gl.tex_parameter_i32(target, gl::TEXTURE_MAX_LEVEL, key.levels as i32 - 1);
            }
        }

        let cost = allocation_cost(&info, self.kind, &key);
        self.handle.set(Some(handle));
        {
            let mut state = self.state.borrow_mut();
            state.allocated = Some(key);
            state.memory_cost = cost;
            state.generation += 1;
            state.applied_sampling = None;
        }
        self.device.add_memory(cost);

        // Without sampler objects the texture's own parameters must already
        // describe a complete texture (legacy NPOT rules).
        if !caps.misc.sampler_objects {
            let options = self.sampler_options();
            self.apply_sampling(&caps, &options);
        }
        Ok(())
    }

    /// Write downgraded sampling parameters into the bound texture object
    fn apply_sampling(&self, caps: &DeviceCaps, options: &SamplerOptions) {
        let downgraded = options.downgraded(self.sampling_limits());
        if self.state.borrow().applied_sampling == Some(downgraded) {
            return;
        }
        let max_anisotropy = if caps.texture.anisotropy {
            caps.texture.max_anisotropy
        } else {
            1.0
        };
        downgraded.apply_to_texture(
            self.device.gl(),
            self.kind.bind_target(),
            self.device.tier().is_extended(),
            max_anisotropy,
        );
        self.state.borrow_mut().applied_sampling = Some(downgraded);
    }

    /// Bind to texture `unit` with `sampler` (or the texture's own options)
    pub(crate) fn bind_to_unit(&self, unit: u32, sampler: Option<&Rc<Sampler>>) -> Result<()> {
        let Some(handle) = self.ensure_ready()? else {
            return Ok(());
        };
        let gl = self.device.gl();
        let target = self.kind.bind_target();
        gl.active_texture(gl::TEXTURE0 + unit);
        gl.bind_texture(target, Some(handle));

        let caps = self.device.caps();
        let options = sampler.map(|s| *s.options()).unwrap_or_else(|| self.sampler_options());
        if caps.misc.sampler_objects {
            let downgraded = options.downgraded(self.sampling_limits());
            match sampler {
                Some(s) if downgraded == options => s.bind(unit)?,
                _ => Sampler::get_or_create(&self.device, downgraded)?.bind(unit)?,
            }
        } else {
            self.apply_sampling(&caps, &options);
        }
        Ok(())
    }

    // ===== UPLOADS =====

    /// Write `data` into `region`
    pub fn write_region(&self, region: &TextureRegion, data: &[u8]) -> Result<()> {
        let (format, levels) = {
            let state = self.state.borrow();
            (state.format, state.chain.levels)
        };
        if region.level >= levels {
            gpu_bail!(InvalidUsage, SOURCE, "Mip level {} out of range (texture has {})", region.level, levels);
        }
        if region.face >= self.kind.face_count() {
            gpu_bail!(InvalidUsage, SOURCE, "Face {} out of range for {:?} texture", region.face, self.kind);
        }
        let (lw, lh, ld) = self.level_size(region.level);
        let depth = if self.kind.is_layered() { region.depth } else { 1 };
        let z = if self.kind.is_layered() { region.z } else { 0 };
        if region.width == 0 || region.height == 0 || depth == 0 {
            gpu_bail!(InvalidUsage, SOURCE, "Empty upload region");
        }
        if exceeds(region.x, region.width, lw) || exceeds(region.y, region.height, lh) || exceeds(z, depth, ld) {
            gpu_bail!(
                InvalidUsage,
                SOURCE,
                "Region {}x{}x{} at ({}, {}, {}) exceeds level {} size {}x{}x{}",
                region.width,
                region.height,
                depth,
                region.x,
                region.y,
                z,
                region.level,
                lw,
                lh,
                ld
            );
        }
        let expected = (format.image_size(region.width, region.height) * depth as u64) as usize;
        if data.len() < expected {
            gpu_bail!(InvalidUsage, SOURCE, "Upload needs {} bytes, got {}", expected, data.len());
        }

        let Some(handle) = self.ensure_ready()? else {
            return Ok(());
        };
        let caps = self.device.caps();
        let Some(info) = caps.texture.format(format).copied() else {
            gpu_bail!(Unsupported, SOURCE, "{:?} is not available on this context", format);
        };
        let gl = self.device.gl();
        let target = self.kind.bind_target();
        let data = &data[..expected];
        self.device.bind_texture_for_update(target, Some(handle));
        gl.pixel_store_i32(gl::UNPACK_ALIGNMENT, 1);

        if info.compressed {
            if self.kind.is_layered() {
                gl.compressed_tex_sub_image_3d(
                    target,
                    region.level,
                    region.x,
                    region.y,
                    z,
                    region.width,
                    region.height,
                    depth,
                    info.gl_internal_format,
                    data,
                );
            } else {
                gl.compressed_tex_sub_image_2d(
                    self.kind.image_target(region.face),
                    region.level,
                    region.x,
                    region.y,
                    region.width,
                    region.height,
                    info.gl_internal_format,
                    data,
                );
            }
        } else if self.kind.is_layered() {
            gl.tex_sub_image_3d(
                target,
                region.level,
                region.x,
                region.y,
                z,
                region.width,
                region.height,
                depth,
                info.gl_format,
                info.gl_type,
                data,
            );
        } else {
            gl.tex_sub_image_2d(
                self.kind.image_target(region.face),
                region.level,
                region.x,
                region.y,
                region.width,
                region.height,
                info.gl_format,
                info.gl_type,
                data,
            );
        }
        Ok(())
    }

    /// Replace a whole mip level. Cube textures take the six faces back to
    /// back; layered textures take every layer/slice of the level.
    pub fn update(&self, level: u32, data: &[u8]) -> Result<()> {
        let (w, h, d) = self.level_size(level);
        let format = self.format();
        if self.kind == TextureKind::Cube {
            let face_size = format.image_size(w, h) as usize;
            if data.len() < face_size * 6 {
                gpu_bail!(InvalidUsage, SOURCE, "Cube update needs {} bytes, got {}", face_size * 6, data.len());
            }
            for face in 0..6 {
                let region = TextureRegion::new(0, 0, w, h).at_level(level).on_face(face);
                let start = face as usize * face_size;
                self.write_region(&region, &data[start..start + face_size])?;
            }
            return Ok(());
        }
        let region = TextureRegion::new(0, 0, w, h).at_level(level).with_layers(0, d);
        self.write_region(&region, data)
    }

    /// Upload an RGBA8 image into level 0 of `face_or_layer`, then regenerate
    /// the mip chain. 2D and video textures adopt the source size.
    pub fn update_from_element(&self, source: &dyn ImageSource, face_or_layer: u32) -> Result<()> {
        let format = self.format();
        if !matches!(format, TextureFormat::R8G8B8A8_UNORM | TextureFormat::R8G8B8A8_SRGB) {
            gpu_bail!(InvalidUsage, SOURCE, "Image sources upload RGBA8 data, texture is {:?}", format);
        }
        let (w, h) = source.dimensions();
        if (w, h) != (self.width(), self.height()) {
            match self.kind {
                TextureKind::Tex2D | TextureKind::Video => self.resize(w, h, 1)?,
                _ => gpu_bail!(
                    InvalidUsage,
                    SOURCE,
                    "Source is {}x{}, texture is {}x{}",
                    w,
                    h,
                    self.width(),
                    self.height()
                ),
            }
        }
        let pixels = source.rgba8();
        let mut region = TextureRegion::new(0, 0, w, h);
        match self.kind {
            TextureKind::Cube => region = region.on_face(face_or_layer),
            TextureKind::Tex2DArray | TextureKind::Tex3D => region = region.with_layers(face_or_layer, 1),
            _ => {
                if face_or_layer != 0 {
                    gpu_bail!(InvalidUsage, SOURCE, "2D texture has no face/layer {}", face_or_layer);
                }
            }
        }
        self.write_region(&region, &pixels)?;
        self.generate_mipmaps()
    }

    /// Regenerate levels 1.. from level 0. No-op for single-level, compressed,
    /// non-renderable, non-filterable and video textures.
    pub fn generate_mipmaps(&self) -> Result<()> {
        let (format, levels) = {
            let state = self.state.borrow();
            (state.format, state.chain.levels)
        };
        if levels <= 1 || !self.kind.allows_mipmaps() {
            return Ok(());
        }
        let caps = self.device.caps();
        let Some(info) = caps.texture.format(format) else {
            return Ok(());
        };
        if info.compressed || !info.renderable || !info.filterable {
            return Ok(());
        }
        let Some(handle) = self.ensure_ready()? else {
            return Ok(());
        };
        let target = self.kind.bind_target();
        self.device.bind_texture_for_update(target, Some(handle));
        self.device.gl().generate_mipmap(target);
        Ok(())
    }

    // ===== VIDEO =====

    /// Upload the source's current frame (video textures only)
    pub fn pump(&self) -> Result<bool> {
        let Some(source) = self.video.clone() else {
            return Ok(false);
        };
        let Some(frame) = source.frame_id() else {
            return Ok(false);
        };
        if self.device.is_lost() {
            return Ok(false);
        }
        self.update_from_element(source.as_ref(), 0)?;
        self.state.borrow_mut().video_frame = Some(frame);
        Ok(true)
    }

    /// Manually pumped video textures upload on every consuming apply
    pub(crate) fn needs_pump_on_apply(&self) -> bool {
        self.video.as_ref().is_some_and(|v| !v.has_frame_callback())
    }

    // ===== READBACK =====

    /// Validate a readback request and pick the read format
    fn check_read(
        &self,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        face_or_layer: u32,
        level: u32,
    ) -> Result<ReadFormat> {
        match self.kind {
            TextureKind::Tex2D | TextureKind::Video if face_or_layer != 0 => {
                gpu_bail!(InvalidUsage, SOURCE, "2D texture has no face/layer {}", face_or_layer)
            }
            TextureKind::Cube if face_or_layer >= 6 => {
                gpu_bail!(InvalidUsage, SOURCE, "Cube face {} out of range", face_or_layer)
            }
            _ => {}
        }
        let levels = self.mip_levels();
        if level >= levels {
            gpu_bail!(InvalidUsage, SOURCE, "Mip level {} out of range (texture has {})", level, levels);
        }
        let (lw, lh, ld) = self.level_size(level);
        if self.kind.is_layered() && face_or_layer >= ld {
            gpu_bail!(InvalidUsage, SOURCE, "Layer {} out of range (level has {})", face_or_layer, ld);
        }
        if width == 0 || height == 0 || exceeds(x, width, lw) || exceeds(y, height, lh) {
            gpu_bail!(
                InvalidUsage,
                SOURCE,
                "Read region {}x{} at ({}, {}) exceeds level size {}x{}",
                width,
                height,
                x,
                y,
                lw,
                lh
            );
        }
        if level > 0 && !self.device.caps().framebuffer.render_to_mip_level {
            gpu_bail!(Unsupported, SOURCE, "Reading mip level {} needs render-to-mip support", level);
        }
        match self.format().sample_kind() {
            SampleKind::Normalized => Ok(ReadFormat::RGBA8),
            SampleKind::Float | SampleKind::HalfFloat => Ok(ReadFormat::RGBA32F),
            other => gpu_bail!(Unsupported, SOURCE, "Cannot read back {:?} textures", other),
        }
    }

    /// Bind a throw-away framebuffer with the requested image as read source
    fn bind_read_source(&self, face_or_layer: u32, level: u32) -> Result<Option<(NativeFramebuffer, u32)>> {
        let Some(handle) = self.ensure_ready()? else {
            return Ok(None);
        };
        let gl = self.device.gl();
        let read_target = if self.device.tier().is_extended() {
            gl::READ_FRAMEBUFFER
        } else {
            gl::FRAMEBUFFER
        };
        let framebuffer = gl
            .create_framebuffer()
            .ok_or_else(|| Error::BackendError("Failed to create readback framebuffer".to_string()))?;
        gl.bind_framebuffer(read_target, Some(framebuffer));
        if self.kind.is_layered() {
            gl.framebuffer_texture_layer(read_target, gl::COLOR_ATTACHMENT0, Some(handle), level, face_or_layer);
        } else {
            gl.framebuffer_texture_2d(
                read_target,
                gl::COLOR_ATTACHMENT0,
                self.kind.image_target(face_or_layer),
                Some(handle),
                level,
            );
        }
        if gl.check_framebuffer_status(read_target) != gl::FRAMEBUFFER_COMPLETE {
            self.release_read_source(framebuffer, read_target);
            gpu_bail!(InvalidResource, SOURCE, "Texture {} is not readable (incomplete framebuffer)", self.uid());
        }
        Ok(Some((framebuffer, read_target)))
    }

    fn release_read_source(&self, framebuffer: NativeFramebuffer, read_target: u32) {
        let gl = self.device.gl();
        gl.bind_framebuffer(read_target, self.device.current_framebuffer());
        gl.delete_framebuffer(framebuffer);
    }

    /// Read a region of `level` (and cube face / layer) into `dst`.
    ///
    /// Normalized formats read as RGBA8, float formats as RGBA32F.
    #[allow(clippy::too_many_arguments)]
    pub async fn read_pixels(
        &self,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        face_or_layer: u32,
        level: u32,
        dst: &mut [u8],
    ) -> Result<()> {
        let format = self.check_read(x, y, width, height, face_or_layer, level)?;
        let needed = format.byte_len(width, height);
        if dst.len() < needed {
            gpu_bail!(InvalidUsage, SOURCE, "Readback needs {} bytes, got {}", needed, dst.len());
        }
        let Some((framebuffer, read_target)) = self.bind_read_source(face_or_layer, level)? else {
            return Err(Error::ContextLost);
        };
        let region = ReadRegion {
            x: x as i32,
            y: y as i32,
            width,
            height,
        };
        let pending = PendingRead::issue(
            self.device.gl_rc(),
            region,
            format,
            self.device.caps().misc.async_readback,
            self.device.fence_poll_interval(),
        );
        self.release_read_source(framebuffer, read_target);
        pending?.finish(&mut dst[..needed]).await
    }

    /// Read a region into `buffer` at byte `offset`.
    ///
    /// Pack buffers without a shadow are filled on the GPU; every other buffer
    /// goes through client memory so its shadow stays authoritative.
    #[allow(clippy::too_many_arguments)]
    pub async fn read_pixels_to_buffer(
        &self,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        face_or_layer: u32,
        level: u32,
        buffer: &Buffer,
        offset: u32,
    ) -> Result<()> {
        let format = self.check_read(x, y, width, height, face_or_layer, level)?;
        let len = format.byte_len(width, height);
        if offset as u64 + len as u64 > buffer.size() as u64 {
            gpu_bail!(InvalidUsage, SOURCE, "Readback of {} bytes overflows the buffer", len);
        }
        let direct = self.device.tier().is_extended()
            && buffer.usage().contains(BufferUsage::PACK)
            && !buffer.has_shadow();
        if direct {
            buffer.ensure_live()?;
            let Some((framebuffer, read_target)) = self.bind_read_source(face_or_layer, level)? else {
                return Ok(());
            };
            if let Some(handle) = buffer.native() {
                let region = ReadRegion {
                    x: x as i32,
                    y: y as i32,
                    width,
                    height,
                };
                pack_into_buffer(self.device.gl(), region, format, handle, offset);
            }
            self.release_read_source(framebuffer, read_target);
            return Ok(());
        }
        let mut bytes = vec![0u8; len];
        self.read_pixels(x, y, width, height, face_or_layer, level, &mut bytes).await?;
        buffer.buffer_sub_data(offset, &bytes)
    }
}

/// Creation-time checks shared by `new` and `resize`
fn validate_desc(
    caps: &DeviceCaps,
    kind: TextureKind,
    format: TextureFormat,
    width: u32,
    height: u32,
    depth: u32,
    flags: TextureFlags,
) -> Result<()> {
    if flags.contains(TextureFlags::WRITABLE) {
        gpu_bail!(Unsupported, SOURCE, "Writable (storage) textures are not supported");
    }
    if kind.needs_extended_tier() && !caps.is_extended() {
        gpu_bail!(Unsupported, SOURCE, "{:?} textures need the extended tier", kind);
    }
    if width == 0 || height == 0 || depth == 0 {
        gpu_bail!(InvalidUsage, SOURCE, "Texture dimensions must be positive ({}x{}x{})", width, height, depth);
    }
    let limits = &caps.texture;
    let max = match kind {
        TextureKind::Cube => limits.max_cube_map_size,
        TextureKind::Tex3D => limits.max_3d_texture_size,
        _ => limits.max_texture_size,
    };
    if width > max || height > max {
        gpu_bail!(InvalidUsage, SOURCE, "{}x{} exceeds the maximum size {}", width, height, max);
    }
    match kind {
        TextureKind::Tex2DArray if depth > limits.max_array_layers => {
            gpu_bail!(InvalidUsage, SOURCE, "{} layers exceed the maximum {}", depth, limits.max_array_layers)
        }
        TextureKind::Tex3D if depth > limits.max_3d_texture_size => {
            gpu_bail!(InvalidUsage, SOURCE, "Depth {} exceeds the maximum {}", depth, limits.max_3d_texture_size)
        }
        TextureKind::Cube if width != height => {
            gpu_bail!(InvalidUsage, SOURCE, "Cube faces must be square ({}x{})", width, height)
        }
        _ => {}
    }
    if !limits.supports(format) {
        gpu_bail!(Unsupported, SOURCE, "{:?} is not available on this context", format);
    }
    if kind == TextureKind::Tex3D && (format.is_compressed() || format.is_depth()) {
        gpu_bail!(Unsupported, SOURCE, "3D textures cannot use {:?}", format);
    }
    if kind == TextureKind::Video && format != TextureFormat::R8G8B8A8_UNORM {
        gpu_bail!(InvalidUsage, SOURCE, "Video textures are R8G8B8A8_UNORM");
    }
    Ok(())
}

impl GpuObject for Texture {
    fn base(&self) -> &ObjectBase {
        &self.base
    }

    fn kind(&self) -> ObjectKind {
        ObjectKind::Texture
    }

    fn native_ids(&self) -> Vec<u32> {
        self.handle.get().map(|h| vec![h.id()]).unwrap_or_default()
    }

    fn release_native(&self, delete: bool) {
        if let Some(handle) = self.handle.take() {
            if delete {
                self.device.gl().delete_texture(handle);
            }
            let cost = {
                let mut state = self.state.borrow_mut();
                state.allocated = None;
                state.applied_sampling = None;
                std::mem::take(&mut state.memory_cost)
            };
            self.device.remove_memory(cost);
        }
    }

    fn create_native(&self) -> Result<()> {
        self.allocate()
    }

    fn on_restored(&self) {
        self.restore_handler.invoke(self);
    }

    fn frame_begin(&self) {
        let Some(source) = &self.video else {
            return;
        };
        if !source.has_frame_callback() {
            return;
        }
        let frame = source.frame_id();
        if frame.is_some() && frame != self.state.borrow().video_frame {
            if let Err(e) = self.pump() {
                gpu_error!(SOURCE, "Video upload failed for texture {}: {}", self.uid(), e);
            }
        }
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.device.remove_memory(self.state.borrow().memory_cost);
            if !self.device.is_lost() {
                self.device.gl().delete_texture(handle);
            }
        }
        self.device.unregister(self.base.registry_key());
    }
}

// ===== TYPED WRAPPERS =====

macro_rules! texture_wrapper {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone)]
        pub struct $name {
            texture: Rc<Texture>,
        }

        impl $name {
            pub(crate) fn from_texture(texture: Rc<Texture>) -> Self {
                Self { texture }
            }

            /// The shared texture, as bind groups and framebuffers take it
            pub fn texture(&self) -> &Rc<Texture> {
                &self.texture
            }
        }

        impl Deref for $name {
            type Target = Texture;

            fn deref(&self) -> &Texture {
                &self.texture
            }
        }

        impl From<$name> for Rc<Texture> {
            fn from(wrapper: $name) -> Self {
                wrapper.texture
            }
        }
    };
}

texture_wrapper!(
    /// Plain 2D texture
    Texture2D
);
texture_wrapper!(
    /// Stack of 2D layers (extended tier)
    Texture2DArray
);
texture_wrapper!(
    /// Volume texture (extended tier)
    Texture3D
);
texture_wrapper!(
    /// Six square faces
    TextureCube
);
texture_wrapper!(
    /// 2D texture driven by a `VideoSource`
    TextureVideo
);

impl Texture2DArray {
    /// Replace one layer of a mip level
    pub fn update_layer(&self, layer: u32, level: u32, data: &[u8]) -> Result<()> {
        let (w, h, _) = self.level_size(level);
        let region = TextureRegion::new(0, 0, w, h).at_level(level).with_layers(layer, 1);
        self.write_region(&region, data)
    }
}

impl Texture3D {
    /// Write a box of texels
    #[allow(clippy::too_many_arguments)]
    pub fn update_box(
        &self,
        x: u32,
        y: u32,
        z: u32,
        width: u32,
        height: u32,
        depth: u32,
        level: u32,
        data: &[u8],
    ) -> Result<()> {
        let region = TextureRegion::new(x, y, width, height)
            .with_layers(z, depth)
            .at_level(level);
        self.write_region(&region, data)
    }
}

impl TextureCube {
    /// Replace one face of a mip level (faces ordered +X, -X, +Y, -Y, +Z, -Z)
    pub fn update_face(&self, face: u32, level: u32, data: &[u8]) -> Result<()> {
        let (w, h, _) = self.level_size(level);
        let region = TextureRegion::new(0, 0, w, h).at_level(level).on_face(face);
        self.write_region(&region, data)
    }
}

impl TextureVideo {
    pub fn source(&self) -> Option<&Rc<dyn VideoSource>> {
        self.video_source()
    }
}

#[cfg(test)]
#[path = "texture_tests.rs"]
mod tests;
