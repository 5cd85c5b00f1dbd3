/// Samplers and the device sampler cache
///
/// On the extended tier a `Sampler` owns a native sampler object. The legacy
/// tier has none: the options are written into the texture's own parameters
/// at bind time, downgraded when the texture cannot honour them.

use std::cell::Cell;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::context::{gl, GlContext, NativeSampler};
use crate::device::shared::DeviceShared;
use crate::error::{Error, Result};
use crate::object::{GpuObject, ObjectBase, ObjectKind};
use crate::render_states::CompareOp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    Repeat,
    ClampToEdge,
    MirroredRepeat,
}

impl AddressMode {
    pub fn to_gl(self) -> u32 {
        match self {
            AddressMode::Repeat => gl::REPEAT,
            AddressMode::ClampToEdge => gl::CLAMP_TO_EDGE,
            AddressMode::MirroredRepeat => gl::MIRRORED_REPEAT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Nearest,
    Linear,
}

/// Full sampling configuration
#[derive(Debug, Clone, Copy)]
pub struct SamplerOptions {
    pub address_u: AddressMode,
    pub address_v: AddressMode,
    pub address_w: AddressMode,
    pub mag_filter: FilterMode,
    pub min_filter: FilterMode,
    /// `None` samples level 0 only
    pub mip_filter: Option<FilterMode>,
    pub lod_min_clamp: f32,
    pub lod_max_clamp: f32,
    /// Depth comparison (shadow sampling)
    pub compare: Option<CompareOp>,
    /// 1 disables anisotropic filtering
    pub max_anisotropy: u16,
}

impl SamplerOptions {
    fn with_filters(filter: FilterMode, address: AddressMode) -> Self {
        Self {
            address_u: address,
            address_v: address,
            address_w: address,
            mag_filter: filter,
            min_filter: filter,
            mip_filter: Some(filter),
            lod_min_clamp: 0.0,
            lod_max_clamp: 1000.0,
            compare: None,
            max_anisotropy: 1,
        }
    }

    /// Trilinear, repeat (default)
    pub fn linear_repeat() -> Self {
        Self::with_filters(FilterMode::Linear, AddressMode::Repeat)
    }

    /// Trilinear, clamp to edge (UI, post-process, render targets)
    pub fn linear_clamp() -> Self {
        Self::with_filters(FilterMode::Linear, AddressMode::ClampToEdge)
    }

    /// Point sampling, repeat (pixel art)
    pub fn nearest_repeat() -> Self {
        Self::with_filters(FilterMode::Nearest, AddressMode::Repeat)
    }

    /// Point sampling, clamp to edge (data lookups)
    pub fn nearest_clamp() -> Self {
        Self::with_filters(FilterMode::Nearest, AddressMode::ClampToEdge)
    }

    /// Depth comparison sampling for shadow maps
    pub fn shadow() -> Self {
        Self {
            mip_filter: None,
            compare: Some(CompareOp::LessOrEqual),
            ..Self::with_filters(FilterMode::Linear, AddressMode::ClampToEdge)
        }
    }

    /// Trilinear, repeat, 16x anisotropy
    pub fn anisotropic() -> Self {
        Self {
            max_anisotropy: 16,
            ..Self::linear_repeat()
        }
    }

    pub fn with_address(mut self, address: AddressMode) -> Self {
        self.address_u = address;
        self.address_v = address;
        self.address_w = address;
        self
    }

    pub fn with_filter(mut self, mag: FilterMode, min: FilterMode, mip: Option<FilterMode>) -> Self {
        self.mag_filter = mag;
        self.min_filter = min;
        self.mip_filter = mip;
        self
    }

    pub fn with_lod_clamp(mut self, min: f32, max: f32) -> Self {
        self.lod_min_clamp = min;
        self.lod_max_clamp = max;
        self
    }

    pub fn with_compare(mut self, compare: Option<CompareOp>) -> Self {
        self.compare = compare;
        self
    }

    pub fn with_max_anisotropy(mut self, max_anisotropy: u16) -> Self {
        self.max_anisotropy = max_anisotropy.max(1);
        self
    }

    /// Options as a texture limited by `limits` can honour them
    pub fn downgraded(&self, limits: SamplingLimits) -> Self {
        let mut options = *self;
        if !limits.filterable {
            options.mag_filter = FilterMode::Nearest;
            options.min_filter = FilterMode::Nearest;
            options.mip_filter = options.mip_filter.map(|_| FilterMode::Nearest);
            options.max_anisotropy = 1;
        }
        if limits.mip_levels <= 1 || limits.legacy_fallback {
            options.mip_filter = None;
        }
        if limits.legacy_fallback {
            options = options.with_address(AddressMode::ClampToEdge);
        }
        options
    }

    pub fn gl_min_filter(&self) -> u32 {
        match (self.min_filter, self.mip_filter) {
            (FilterMode::Nearest, None) => gl::NEAREST,
            (FilterMode::Linear, None) => gl::LINEAR,
            (FilterMode::Nearest, Some(FilterMode::Nearest)) => gl::NEAREST_MIPMAP_NEAREST,
            (FilterMode::Linear, Some(FilterMode::Nearest)) => gl::LINEAR_MIPMAP_NEAREST,
            (FilterMode::Nearest, Some(FilterMode::Linear)) => gl::NEAREST_MIPMAP_LINEAR,
            (FilterMode::Linear, Some(FilterMode::Linear)) => gl::LINEAR_MIPMAP_LINEAR,
        }
    }

    pub fn gl_mag_filter(&self) -> u32 {
        match self.mag_filter {
            FilterMode::Nearest => gl::NEAREST,
            FilterMode::Linear => gl::LINEAR,
        }
    }

    /// Write the options into the parameters of the texture bound to `target`
    pub(crate) fn apply_to_texture(&self, gl: &dyn GlContext, target: u32, extended: bool, max_anisotropy: f32) {
        gl.tex_parameter_i32(target, gl::TEXTURE_MIN_FILTER, self.gl_min_filter() as i32);
        gl.tex_parameter_i32(target, gl::TEXTURE_MAG_FILTER, self.gl_mag_filter() as i32);
        gl.tex_parameter_i32(target, gl::TEXTURE_WRAP_S, self.address_u.to_gl() as i32);
        gl.tex_parameter_i32(target, gl::TEXTURE_WRAP_T, self.address_v.to_gl() as i32);
        if extended {
            gl.tex_parameter_i32(target, gl::TEXTURE_WRAP_R, self.address_w.to_gl() as i32);
            gl.tex_parameter_f32(target, gl::TEXTURE_MIN_LOD, self.lod_min_clamp);
            gl.tex_parameter_f32(target, gl::TEXTURE_MAX_LOD, self.lod_max_clamp);
            match self.compare {
                Some(op) => {
                    gl.tex_parameter_i32(target, gl::TEXTURE_COMPARE_MODE, gl::COMPARE_REF_TO_TEXTURE as i32);
                    gl.tex_parameter_i32(target, gl::TEXTURE_COMPARE_FUNC, op.to_gl() as i32);
                }
                None => gl.tex_parameter_i32(target, gl::TEXTURE_COMPARE_MODE, gl::NONE as i32),
            }
        }
        if max_anisotropy > 1.0 {
            let level = (self.max_anisotropy as f32).min(max_anisotropy);
            gl.tex_parameter_f32(target, gl::TEXTURE_MAX_ANISOTROPY_EXT, level);
        }
    }

    fn bits(&self) -> [u32; 2] {
        [self.lod_min_clamp.to_bits(), self.lod_max_clamp.to_bits()]
    }
}

impl Default for SamplerOptions {
    fn default() -> Self {
        Self::linear_repeat()
    }
}

impl PartialEq for SamplerOptions {
    fn eq(&self, other: &Self) -> bool {
        self.address_u == other.address_u
            && self.address_v == other.address_v
            && self.address_w == other.address_w
            && self.mag_filter == other.mag_filter
            && self.min_filter == other.min_filter
            && self.mip_filter == other.mip_filter
            && self.bits() == other.bits()
            && self.compare == other.compare
            && self.max_anisotropy == other.max_anisotropy
    }
}

impl Eq for SamplerOptions {}

impl Hash for SamplerOptions {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address_u.hash(state);
        self.address_v.hash(state);
        self.address_w.hash(state);
        self.mag_filter.hash(state);
        self.min_filter.hash(state);
        self.mip_filter.hash(state);
        self.bits().hash(state);
        self.compare.hash(state);
        self.max_anisotropy.hash(state);
    }
}

/// What a texture can honour when sampled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingLimits {
    pub filterable: bool,
    pub mip_levels: u32,
    pub legacy_fallback: bool,
}

/// Immutable sampling configuration shared between bind groups
pub struct Sampler {
    base: ObjectBase,
    device: Rc<DeviceShared>,
    options: SamplerOptions,
    handle: Cell<Option<NativeSampler>>,
}

impl Sampler {
    pub(crate) fn new(device: &Rc<DeviceShared>, options: SamplerOptions) -> Result<Rc<Self>> {
        let sampler = Rc::new(Self {
            base: ObjectBase::new(),
            device: device.clone(),
            options,
            handle: Cell::new(None),
        });
        if !device.is_lost() {
            sampler.create_native()?;
        }
        device.register(&sampler);
        Ok(sampler)
    }

    /// Cached sampler for `options`
    pub(crate) fn get_or_create(device: &Rc<DeviceShared>, options: SamplerOptions) -> Result<Rc<Self>> {
        if let Some(sampler) = device.cached_sampler(&options) {
            return Ok(sampler);
        }
        let sampler = Self::new(device, options)?;
        device.cache_sampler(options, sampler.clone());
        Ok(sampler)
    }

    pub fn options(&self) -> &SamplerOptions {
        &self.options
    }

    pub fn native(&self) -> Option<NativeSampler> {
        self.handle.get()
    }

    /// Bind to a texture unit (sampler objects only)
    pub(crate) fn bind(&self, unit: u32) -> Result<()> {
        if self.device.is_lost() || !self.device.caps().misc.sampler_objects {
            return Ok(());
        }
        if self.is_disposed() {
            self.reload()?;
        }
        self.device.gl().bind_sampler(unit, self.handle.get());
        Ok(())
    }
}

impl GpuObject for Sampler {
    fn base(&self) -> &ObjectBase {
        &self.base
    }

    fn kind(&self) -> ObjectKind {
        ObjectKind::Sampler
    }

    fn native_ids(&self) -> Vec<u32> {
        self.handle.get().map(|h| vec![h.id()]).unwrap_or_default()
    }

    fn release_native(&self, delete: bool) {
        if let Some(handle) = self.handle.take() {
            if delete {
                self.device.gl().delete_sampler(handle);
            }
        }
    }

    fn create_native(&self) -> Result<()> {
        let caps = self.device.caps();
        if !caps.misc.sampler_objects {
            return Ok(());
        }
        let gl = self.device.gl();
        let handle = gl
            .create_sampler()
            .ok_or_else(|| Error::BackendError("Failed to create sampler".to_string()))?;
        let o = &self.options;
        gl.sampler_parameter_i32(handle, gl::TEXTURE_MIN_FILTER, o.gl_min_filter() as i32);
        gl.sampler_parameter_i32(handle, gl::TEXTURE_MAG_FILTER, o.gl_mag_filter() as i32);
        gl.sampler_parameter_i32(handle, gl::TEXTURE_WRAP_S, o.address_u.to_gl() as i32);
        gl.sampler_parameter_i32(handle, gl::TEXTURE_WRAP_T, o.address_v.to_gl() as i32);
        gl.sampler_parameter_i32(handle, gl::TEXTURE_WRAP_R, o.address_w.to_gl() as i32);
        gl.sampler_parameter_f32(handle, gl::TEXTURE_MIN_LOD, o.lod_min_clamp);
        gl.sampler_parameter_f32(handle, gl::TEXTURE_MAX_LOD, o.lod_max_clamp);
        if let Some(op) = o.compare {
            gl.sampler_parameter_i32(handle, gl::TEXTURE_COMPARE_MODE, gl::COMPARE_REF_TO_TEXTURE as i32);
            gl.sampler_parameter_i32(handle, gl::TEXTURE_COMPARE_FUNC, op.to_gl() as i32);
        }
        if caps.texture.anisotropy && o.max_anisotropy > 1 {
            let level = (o.max_anisotropy as f32).min(caps.texture.max_anisotropy);
            gl.sampler_parameter_f32(handle, gl::TEXTURE_MAX_ANISOTROPY_EXT, level);
        }
        self.handle.set(Some(handle));
        Ok(())
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if !self.device.is_lost() {
                self.device.gl().delete_sampler(handle);
            }
        }
        self.device.unregister(self.base.registry_key());
    }
}

#[cfg(test)]
#[path = "sampler_tests.rs"]
mod tests;
