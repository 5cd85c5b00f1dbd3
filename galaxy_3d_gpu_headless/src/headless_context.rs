/// HeadlessContext - software implementation of the context seam
///
/// Keeps every object the way a driver would (buffers hold their bytes,
/// textures hold their texel images, programs hold their uniform values)
/// and validates each call, raising the same error codes the host API
/// raises. Draw calls are validated and recorded but not rasterized; clears,
/// blits, copies, mipmap generation and readback operate on real texels.
///
/// A context can be lost and restored on demand. Losing it drops every
/// object; while lost, calls are ignored and creations return `None`.

use std::cell::{Cell, RefCell};
use std::num::NonZeroU32;

use galaxy_3d_gpu::galaxy3d::context::{
    gl, ActiveUniform, ActiveUniformBlock, ContextTier, GlContext, NativeBuffer, NativeFence,
    NativeFramebuffer, NativeProgram, NativeRenderbuffer, NativeSampler, NativeShader,
    NativeTexture, NativeUniformLocation, NativeVertexArray, UniformData, UniformType,
};
use galaxy_3d_gpu::galaxy3d::caps::ext;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::headless_config::HeadlessConfig;
use crate::headless_debug::{print_error_stats_report, ErrorStats, ErrorTracker};
use crate::headless_framebuffer::{Attachment, FramebufferObject, RenderSupport};
use crate::headless_shader::{self, ProgramInterface, ShaderInterface};
use crate::headless_texel::{Image, TexelFormat};

// ===== OBJECTS =====

pub(crate) struct BufferObject {
    pub(crate) data: Vec<u8>,
}

pub(crate) struct TextureObject {
    /// Bind target, fixed on first bind
    pub(crate) target: Option<u32>,
    /// Images per (image target, level). Layered textures key by their
    /// bind target and keep every layer in one image.
    pub(crate) images: FxHashMap<(u32, u32), Image>,
    pub(crate) params: FxHashMap<u32, f32>,
    pub(crate) immutable: bool,
}

pub(crate) struct RenderbufferObject {
    pub(crate) image: Option<Image>,
}

struct ShaderObject {
    stage: u32,
    source: String,
    compiled: Option<Result<ShaderInterface, String>>,
}

#[derive(Default)]
struct ProgramObject {
    attached: Vec<u32>,
    interface: Option<ProgramInterface>,
    log: String,
    /// Raw 32-bit words per uniform location
    values: FxHashMap<u32, Vec<u32>>,
    block_bindings: FxHashMap<u32, u32>,
    attributes: FxHashMap<String, u32>,
}

#[derive(Default)]
struct SamplerObject {
    params: FxHashMap<u32, f32>,
}

/// Where a vertex attribute reads from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttribPointer {
    pub buffer: Option<NativeBuffer>,
    pub size: u32,
    pub ty: u32,
    pub normalized: bool,
    pub integer: bool,
    pub stride: u32,
    pub offset: u32,
}

#[derive(Default)]
struct VertexArrayState {
    element_buffer: Option<u32>,
    enabled: FxHashSet<u32>,
    pointers: FxHashMap<u32, AttribPointer>,
    divisors: FxHashMap<u32, u32>,
}

/// Range bound to an indexed uniform-buffer binding point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformBinding {
    pub buffer: NativeBuffer,
    pub offset: u32,
    pub size: u32,
}

/// Last validated draw call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawRecord {
    pub mode: u32,
    /// First vertex, or byte offset into the index buffer
    pub first: u32,
    pub count: u32,
    pub index_type: Option<u32>,
    pub instances: u32,
    pub program: NativeProgram,
    pub framebuffer: Option<NativeFramebuffer>,
}

/// Fixed-function state as last set
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedState {
    pub viewport: [i32; 4],
    pub scissor: [i32; 4],
    pub clear_color: [f32; 4],
    pub clear_depth: f32,
    pub clear_stencil: i32,
    pub color_mask: [bool; 4],
    pub depth_mask: bool,
    pub depth_func: u32,
    /// src rgb, dst rgb, src alpha, dst alpha
    pub blend_func: [u32; 4],
    pub blend_equation: [u32; 2],
    pub blend_color: [f32; 4],
    pub cull_face: u32,
    pub front_face: u32,
    pub polygon_offset: [f32; 2],
    /// (func, reference, mask) for front and back faces
    pub stencil_func: [(u32, i32, u32); 2],
    /// (fail, depth fail, pass) for front and back faces
    pub stencil_op: [[u32; 3]; 2],
    pub stencil_write_mask: [u32; 2],
}

impl FixedState {
    fn new(width: u32, height: u32) -> Self {
        let full = [0, 0, width as i32, height as i32];
        Self {
            viewport: full,
            scissor: full,
            clear_color: [0.0; 4],
            clear_depth: 1.0,
            clear_stencil: 0,
            color_mask: [true; 4],
            depth_mask: true,
            depth_func: gl::LESS,
            blend_func: [gl::ONE, gl::ZERO, gl::ONE, gl::ZERO],
            blend_equation: [gl::FUNC_ADD, gl::FUNC_ADD],
            blend_color: [0.0; 4],
            cull_face: gl::BACK,
            front_face: gl::CCW,
            polygon_offset: [0.0; 2],
            stencil_func: [(gl::ALWAYS, 0, u32::MAX); 2],
            stencil_op: [[gl::KEEP; 3]; 2],
            stencil_write_mask: [u32::MAX; 2],
        }
    }
}

/// Number of live objects per kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObjectCounts {
    pub buffers: usize,
    pub textures: usize,
    pub renderbuffers: usize,
    pub framebuffers: usize,
    pub shaders: usize,
    pub programs: usize,
    pub samplers: usize,
    pub vertex_arrays: usize,
    pub fences: usize,
}

impl ObjectCounts {
    pub fn total(&self) -> usize {
        self.buffers
            + self.textures
            + self.renderbuffers
            + self.framebuffers
            + self.shaders
            + self.programs
            + self.samplers
            + self.vertex_arrays
            + self.fences
    }
}

/// Everything the context owns; dropped as a whole on loss
pub(crate) struct State {
    next_id: u32,
    pub(crate) buffers: FxHashMap<u32, BufferObject>,
    pub(crate) textures: FxHashMap<u32, TextureObject>,
    pub(crate) renderbuffers: FxHashMap<u32, RenderbufferObject>,
    pub(crate) framebuffers: FxHashMap<u32, FramebufferObject>,
    shaders: FxHashMap<u32, ShaderObject>,
    programs: FxHashMap<u32, ProgramObject>,
    samplers: FxHashMap<u32, SamplerObject>,
    vertex_arrays: FxHashMap<u32, VertexArrayState>,
    fences: FxHashMap<u32, u32>,

    buffer_bindings: FxHashMap<u32, u32>,
    uniform_bindings: FxHashMap<u32, UniformBinding>,
    active_unit: u32,
    texture_units: FxHashMap<(u32, u32), u32>,
    sampler_units: FxHashMap<u32, u32>,
    pub(crate) draw_framebuffer: Option<u32>,
    pub(crate) read_framebuffer: Option<u32>,
    renderbuffer: Option<u32>,
    program: Option<u32>,
    vertex_array: Option<u32>,
    default_vertex_array: VertexArrayState,

    pub(crate) default_color: Image,
    pub(crate) default_depth: Image,
    pub(crate) capabilities: FxHashSet<u32>,
    pub(crate) fixed: FixedState,
    pixel_store: FxHashMap<u32, i32>,
    draws: u32,
    last_draw: Option<DrawRecord>,
}

impl State {
    fn new(width: u32, height: u32) -> Self {
        Self {
            next_id: 1,
            buffers: FxHashMap::default(),
            textures: FxHashMap::default(),
            renderbuffers: FxHashMap::default(),
            framebuffers: FxHashMap::default(),
            shaders: FxHashMap::default(),
            programs: FxHashMap::default(),
            samplers: FxHashMap::default(),
            vertex_arrays: FxHashMap::default(),
            fences: FxHashMap::default(),
            buffer_bindings: FxHashMap::default(),
            uniform_bindings: FxHashMap::default(),
            active_unit: 0,
            texture_units: FxHashMap::default(),
            sampler_units: FxHashMap::default(),
            draw_framebuffer: None,
            read_framebuffer: None,
            renderbuffer: None,
            program: None,
            vertex_array: None,
            default_vertex_array: VertexArrayState::default(),
            default_color: Image::new(width, height, 1, TexelFormat::Rgba8),
            default_depth: Image::new(width, height, 1, TexelFormat::Depth32),
            capabilities: FxHashSet::default(),
            fixed: FixedState::new(width, height),
            pixel_store: FxHashMap::default(),
            draws: 0,
            last_draw: None,
        }
    }

    fn allocate_id(&mut self) -> Option<NonZeroU32> {
        let id = NonZeroU32::new(self.next_id)?;
        self.next_id += 1;
        Some(id)
    }

    fn vertex_array_mut(&mut self) -> &mut VertexArrayState {
        match self.vertex_array.and_then(|id| self.vertex_arrays.get_mut(&id)) {
            Some(vao) => vao,
            None => &mut self.default_vertex_array,
        }
    }

    fn vertex_array(&self) -> &VertexArrayState {
        self.vertex_array
            .and_then(|id| self.vertex_arrays.get(&id))
            .unwrap_or(&self.default_vertex_array)
    }

    /// Texture bound to `target` on the active unit
    pub(crate) fn bound_texture(&self, target: u32) -> Option<u32> {
        self.texture_units.get(&(self.active_unit, target)).copied()
    }

    fn bound_buffer(&self, target: u32) -> Option<u32> {
        if target == gl::ELEMENT_ARRAY_BUFFER {
            return self.vertex_array().element_buffer;
        }
        self.buffer_bindings.get(&target).copied()
    }

    fn counts(&self) -> ObjectCounts {
        ObjectCounts {
            buffers: self.buffers.len(),
            textures: self.textures.len(),
            renderbuffers: self.renderbuffers.len(),
            framebuffers: self.framebuffers.len(),
            shaders: self.shaders.len(),
            programs: self.programs.len(),
            samplers: self.samplers.len(),
            vertex_arrays: self.vertex_arrays.len(),
            fences: self.fences.len(),
        }
    }
}

// ===== HELPERS =====

/// Bind target owning an image target (cube faces belong to the cube map)
pub(crate) fn bind_target_of(image_target: u32) -> u32 {
    if (gl::TEXTURE_CUBE_MAP_POSITIVE_X..=gl::TEXTURE_CUBE_MAP_NEGATIVE_Z).contains(&image_target) {
        gl::TEXTURE_CUBE_MAP
    } else {
        image_target
    }
}

fn is_layered_target(target: u32) -> bool {
    target == gl::TEXTURE_3D || target == gl::TEXTURE_2D_ARRAY
}

/// Extension exposing a compressed format
fn compressed_extension(format: u32) -> Option<&'static str> {
    let name = match format {
        0x83F0..=0x83F3 => ext::WEBGL_COMPRESSED_TEXTURE_S3TC,
        0x8C4C..=0x8C4F => ext::WEBGL_COMPRESSED_TEXTURE_S3TC_SRGB,
        0x8DBB..=0x8DBE => ext::EXT_TEXTURE_COMPRESSION_RGTC,
        0x8E8C..=0x8E8F => ext::EXT_TEXTURE_COMPRESSION_BPTC,
        0x9270..=0x9279 => ext::WEBGL_COMPRESSED_TEXTURE_ETC,
        0x93B0..=0x93DD => ext::WEBGL_COMPRESSED_TEXTURE_ASTC,
        _ => return None,
    };
    Some(name)
}

/// Bytes per texel of a client transfer
fn transfer_size(format: u32, ty: u32) -> Option<u32> {
    let channels = match format {
        gl::RED | gl::RED_INTEGER | gl::ALPHA | gl::LUMINANCE | gl::DEPTH_COMPONENT => 1,
        gl::RG | gl::RG_INTEGER => 2,
        gl::RGB | gl::RGB_INTEGER => 3,
        gl::RGBA | gl::RGBA_INTEGER | gl::SRGB_ALPHA_EXT => 4,
        gl::DEPTH_STENCIL => 1,
        _ => return None,
    };
    let size = match ty {
        gl::UNSIGNED_BYTE | gl::BYTE => 1,
        gl::UNSIGNED_SHORT | gl::SHORT | gl::HALF_FLOAT | gl::HALF_FLOAT_OES => 2,
        gl::UNSIGNED_INT | gl::INT | gl::FLOAT => 4,
        gl::UNSIGNED_INT_24_8 | gl::UNSIGNED_INT_10F_11F_11F_REV => return Some(4),
        gl::FLOAT_32_UNSIGNED_INT_24_8_REV => return Some(8),
        _ => return None,
    };
    Some(channels * size)
}

fn uniform_accepts(ty: UniformType, data: &UniformData<'_>) -> bool {
    use UniformType::*;
    let components = ty.components() as u8;
    let is_bool = matches!(ty, Bool | BVec2 | BVec3 | BVec4);
    match data {
        UniformData::Float { components: c, .. } => {
            *c == components && (matches!(ty, Float | Vec2 | Vec3 | Vec4) || is_bool)
        }
        UniformData::Int { components: c, .. } => {
            (*c == components && (matches!(ty, Int | IVec2 | IVec3 | IVec4) || is_bool))
                || (*c == 1 && ty.is_sampler())
        }
        UniformData::UInt { components: c, .. } => {
            *c == components && (matches!(ty, UInt | UVec2 | UVec3 | UVec4) || is_bool)
        }
        UniformData::Matrix { dim, .. } => matches!((ty, dim), (Mat2, 2) | (Mat3, 3) | (Mat4, 4)),
    }
}

/// Element size (in words) and raw words of an upload
fn uniform_words(data: &UniformData<'_>) -> (usize, Vec<u32>) {
    match data {
        UniformData::Float { components, values } => {
            (*components as usize, values.iter().map(|v| v.to_bits()).collect())
        }
        UniformData::Int { components, values } => {
            (*components as usize, values.iter().map(|v| *v as u32).collect())
        }
        UniformData::UInt { components, values } => (*components as usize, values.to_vec()),
        UniformData::Matrix { dim, values } => {
            ((*dim as usize) * (*dim as usize), values.iter().map(|v| v.to_bits()).collect())
        }
    }
}

macro_rules! live {
    ($self:ident, $call:literal) => {
        if !$self.enter($call) {
            return;
        }
    };
    ($self:ident, $call:literal, $lost:expr) => {
        if !$self.enter($call) {
            return $lost;
        }
    };
}

// ===== CONTEXT =====

/// In-memory context of one tier
pub struct HeadlessContext {
    config: HeadlessConfig,
    pub(crate) state: RefCell<State>,
    lost: Cell<bool>,
    /// CONTEXT_LOST_WEBGL not yet reported by `get_error`
    loss_pending: Cell<bool>,
    error: Cell<u32>,
    errors: ErrorTracker,
    calls: RefCell<FxHashMap<&'static str, u32>>,
}

impl HeadlessContext {
    pub fn new(config: HeadlessConfig) -> Self {
        let (width, height) = config.drawing_buffer_size;
        let errors = ErrorTracker::new(config.print_errors);
        Self {
            state: RefCell::new(State::new(width, height)),
            lost: Cell::new(false),
            loss_pending: Cell::new(false),
            error: Cell::new(gl::NO_ERROR),
            errors,
            calls: RefCell::new(FxHashMap::default()),
            config,
        }
    }

    pub fn config(&self) -> &HeadlessConfig {
        &self.config
    }

    fn has_extension(&self, name: &str) -> bool {
        self.config.has_extension(name)
    }

    fn extended(&self) -> bool {
        self.config.tier.is_extended()
    }

    /// Count the call; false while the context is lost
    fn enter(&self, call: &'static str) -> bool {
        *self.calls.borrow_mut().entry(call).or_insert(0) += 1;
        !self.lost.get()
    }

    /// Record an error. Only the first one is kept until `get_error`.
    pub(crate) fn raise(&self, call: &'static str, code: u32, message: &str) {
        self.errors.record(call, code, message);
        if self.error.get() == gl::NO_ERROR {
            self.error.set(code);
        }
    }

    // ===== LOSS SIMULATION =====

    /// Drop every object and report the context as lost
    pub fn lose_context(&self) {
        if self.lost.replace(true) {
            return;
        }
        let (width, height) = self.drawing_buffer_size();
        *self.state.borrow_mut() = State::new(width, height);
        self.error.set(gl::NO_ERROR);
        self.loss_pending.set(true);
        self.errors.record("lose_context", gl::CONTEXT_LOST_WEBGL, "context lost");
    }

    /// Bring the context back, empty
    pub fn restore_context(&self) {
        self.lost.set(false);
        self.loss_pending.set(false);
    }

    /// Resize the default framebuffer; its content is cleared
    pub fn resize_drawing_buffer(&self, width: u32, height: u32) {
        let mut state = self.state.borrow_mut();
        state.default_color = Image::new(width.max(1), height.max(1), 1, TexelFormat::Rgba8);
        state.default_depth = Image::new(width.max(1), height.max(1), 1, TexelFormat::Depth32);
    }

    // ===== INSTRUMENTATION =====

    /// Times `call` (a `GlContext` method name) was issued
    pub fn call_count(&self, call: &str) -> u32 {
        self.calls.borrow().get(call).copied().unwrap_or(0)
    }

    pub fn reset_call_counts(&self) {
        self.calls.borrow_mut().clear();
    }

    pub fn error_stats(&self) -> ErrorStats {
        self.errors.stats()
    }

    pub fn reset_error_stats(&self) {
        self.errors.reset();
    }

    pub fn set_print_errors(&self, enabled: bool) {
        self.errors.set_print(enabled);
    }

    pub fn print_error_report(&self) {
        print_error_stats_report(&self.errors.stats(), self.errors.repeated());
    }

    pub fn object_counts(&self) -> ObjectCounts {
        self.state.borrow().counts()
    }

    pub fn draw_count(&self) -> u32 {
        self.state.borrow().draws
    }

    pub fn last_draw(&self) -> Option<DrawRecord> {
        self.state.borrow().last_draw
    }

    pub fn is_enabled(&self, capability: u32) -> bool {
        self.state.borrow().capabilities.contains(&capability)
    }

    pub fn fixed_state(&self) -> FixedState {
        self.state.borrow().fixed
    }

    // ===== OBJECT QUERIES =====

    pub fn buffer_data(&self, buffer: NativeBuffer) -> Option<Vec<u8>> {
        self.state.borrow().buffers.get(&buffer.id()).map(|b| b.data.clone())
    }

    pub fn texture_image(&self, texture: NativeTexture, image_target: u32, level: u32) -> Option<Image> {
        let state = self.state.borrow();
        state.textures.get(&texture.id())?.images.get(&(image_target, level)).cloned()
    }

    pub fn texture_parameter(&self, texture: NativeTexture, pname: u32) -> Option<f32> {
        self.state.borrow().textures.get(&texture.id())?.params.get(&pname).copied()
    }

    pub fn sampler_parameter(&self, sampler: NativeSampler, pname: u32) -> Option<f32> {
        self.state.borrow().samplers.get(&sampler.id())?.params.get(&pname).copied()
    }

    pub fn renderbuffer_image(&self, renderbuffer: NativeRenderbuffer) -> Option<Image> {
        self.state.borrow().renderbuffers.get(&renderbuffer.id())?.image.clone()
    }

    pub fn bound_texture(&self, unit: u32, target: u32) -> Option<NativeTexture> {
        let state = self.state.borrow();
        state.texture_units.get(&(unit, target)).and_then(|id| NonZeroU32::new(*id)).map(NativeTexture)
    }

    pub fn bound_sampler(&self, unit: u32) -> Option<NativeSampler> {
        let state = self.state.borrow();
        state.sampler_units.get(&unit).and_then(|id| NonZeroU32::new(*id)).map(NativeSampler)
    }

    pub fn current_program(&self) -> Option<NativeProgram> {
        self.state.borrow().program.and_then(NonZeroU32::new).map(NativeProgram)
    }

    pub fn uniform_buffer_binding(&self, index: u32) -> Option<UniformBinding> {
        self.state.borrow().uniform_bindings.get(&index).copied()
    }

    /// Binding point assigned to a uniform block of `program`
    pub fn uniform_block_binding_of(&self, program: NativeProgram, block: &str) -> Option<u32> {
        let state = self.state.borrow();
        let object = state.programs.get(&program.id())?;
        let index = object.interface.as_ref()?.blocks.iter().find(|b| b.name == block)?.index;
        object.block_bindings.get(&index).copied()
    }

    /// Raw words last uploaded to `name`
    pub fn uniform_words(&self, program: NativeProgram, name: &str) -> Option<Vec<u32>> {
        let state = self.state.borrow();
        let object = state.programs.get(&program.id())?;
        let location = object.interface.as_ref()?.location(name)?;
        object.values.get(&location).cloned()
    }

    pub fn uniform_f32(&self, program: NativeProgram, name: &str) -> Option<Vec<f32>> {
        self.uniform_words(program, name)
            .map(|words| words.into_iter().map(f32::from_bits).collect())
    }

    pub fn uniform_i32(&self, program: NativeProgram, name: &str) -> Option<Vec<i32>> {
        self.uniform_words(program, name)
            .map(|words| words.into_iter().map(|w| w as i32).collect())
    }

    pub fn attrib_location(&self, program: NativeProgram, name: &str) -> Option<u32> {
        self.state.borrow().programs.get(&program.id())?.attributes.get(name).copied()
    }

    /// Pointer of attribute `index` on the bound vertex array
    pub fn vertex_attrib(&self, index: u32) -> Option<AttribPointer> {
        self.state.borrow().vertex_array().pointers.get(&index).copied()
    }

    pub fn is_attrib_enabled(&self, index: u32) -> bool {
        self.state.borrow().vertex_array().enabled.contains(&index)
    }

    pub fn attrib_divisor(&self, index: u32) -> u32 {
        self.state.borrow().vertex_array().divisors.get(&index).copied().unwrap_or(0)
    }

    /// Color at (x, y) of the read image of `framebuffer` (default when None)
    pub fn pixel(&self, framebuffer: Option<NativeFramebuffer>, x: u32, y: u32) -> Option<[f32; 4]> {
        let state = self.state.borrow();
        let target = state.read_target(framebuffer.map(|f| f.id()))?;
        let (image, layer) = state.image(target)?;
        (x < image.width && y < image.height).then(|| image.texel(x, y, layer))
    }

    // ===== VALIDATION HELPERS =====

    /// Which color formats this context can render to
    pub(crate) fn render_support(&self) -> RenderSupport {
        let extended = self.extended();
        RenderSupport {
            legacy: !extended,
            float32: if extended {
                self.has_extension(ext::EXT_COLOR_BUFFER_FLOAT)
            } else {
                self.has_extension(ext::WEBGL_COLOR_BUFFER_FLOAT)
            },
            float16: self.has_extension(ext::EXT_COLOR_BUFFER_FLOAT)
                || self.has_extension(ext::EXT_COLOR_BUFFER_HALF_FLOAT),
        }
    }

    fn require_extended(&self, call: &'static str) -> bool {
        if !self.extended() {
            self.raise(call, gl::INVALID_OPERATION, "not available on the legacy tier");
            return false;
        }
        true
    }

    fn buffer_target_valid(&self, target: u32) -> bool {
        match target {
            gl::ARRAY_BUFFER | gl::ELEMENT_ARRAY_BUFFER => true,
            gl::UNIFORM_BUFFER
            | gl::PIXEL_PACK_BUFFER
            | gl::PIXEL_UNPACK_BUFFER
            | gl::COPY_READ_BUFFER
            | gl::COPY_WRITE_BUFFER => self.extended(),
            _ => false,
        }
    }

    fn texture_target_valid(&self, target: u32) -> bool {
        match target {
            gl::TEXTURE_2D | gl::TEXTURE_CUBE_MAP => true,
            gl::TEXTURE_3D | gl::TEXTURE_2D_ARRAY => self.extended(),
            _ => false,
        }
    }

    fn image_target_valid(&self, target: u32) -> bool {
        target == gl::TEXTURE_2D || bind_target_of(target) == gl::TEXTURE_CUBE_MAP
    }

    /// Legacy uploads: unsized formats only, each gated by its extension
    fn legacy_upload_allowed(&self, call: &'static str, internal_format: u32, format: u32, ty: u32) -> bool {
        if internal_format != format {
            self.raise(call, gl::INVALID_OPERATION, "internal format must match format");
            return false;
        }
        let needed = match (format, ty) {
            (_, gl::FLOAT) => Some(ext::OES_TEXTURE_FLOAT),
            (_, gl::HALF_FLOAT_OES) => Some(ext::OES_TEXTURE_HALF_FLOAT),
            (gl::DEPTH_COMPONENT | gl::DEPTH_STENCIL, _) => Some(ext::WEBGL_DEPTH_TEXTURE),
            (gl::SRGB_ALPHA_EXT, _) => Some(ext::EXT_SRGB),
            (_, gl::HALF_FLOAT) => {
                self.raise(call, gl::INVALID_ENUM, "HALF_FLOAT needs the extended tier");
                return false;
            }
            _ => None,
        };
        match needed {
            Some(name) if !self.has_extension(name) => {
                self.raise(call, gl::INVALID_ENUM, &format!("format needs {}", name));
                false
            }
            _ => true,
        }
    }

    /// Resolve the texel format of an uncompressed upload
    fn upload_format(&self, call: &'static str, internal_format: u32, format: u32, ty: u32) -> Option<TexelFormat> {
        if !self.extended() && !self.legacy_upload_allowed(call, internal_format, format, ty) {
            return None;
        }
        let texel = TexelFormat::from_transfer(internal_format, format, ty);
        if texel.is_none() {
            self.raise(call, gl::INVALID_ENUM, "unsupported format/type combination");
        }
        texel
    }

    fn compressed_allowed(&self, call: &'static str, format: u32) -> bool {
        match compressed_extension(format) {
            Some(name) if self.has_extension(name) => true,
            _ => {
                self.raise(call, gl::INVALID_ENUM, "compressed format not exposed");
                false
            }
        }
    }

    fn size_allowed(&self, call: &'static str, target: u32, width: u32, height: u32, depth: u32) -> bool {
        let limits = &self.config.limits;
        let max = match bind_target_of(target) {
            gl::TEXTURE_CUBE_MAP => limits.max_cube_map_size,
            gl::TEXTURE_3D => limits.max_3d_texture_size,
            _ => limits.max_texture_size,
        };
        let layers = if target == gl::TEXTURE_2D_ARRAY { limits.max_array_layers } else { max.max(1) };
        if width > max || height > max || depth > layers {
            self.raise(call, gl::INVALID_VALUE, "size exceeds the context limits");
            return false;
        }
        true
    }

    /// Texture currently bound for `target` (bind target), raising when absent
    fn texture_for(&self, call: &'static str, state: &State, target: u32) -> Option<u32> {
        let texture = state.bound_texture(target);
        if texture.is_none() {
            self.raise(call, gl::INVALID_OPERATION, "no texture bound");
        }
        texture
    }

    /// Store one image level of the bound texture
    #[allow(clippy::too_many_arguments)]
    fn define_image(
        &self,
        call: &'static str,
        key: (u32, u32),
        width: u32,
        height: u32,
        depth: u32,
        image: Image,
        pixels: Option<&[u8]>,
    ) {
        let mut state = self.state.borrow_mut();
        let Some(id) = self.texture_for(call, &state, bind_target_of(key.0)) else {
            return;
        };
        let Some(texture) = state.textures.get_mut(&id) else {
            return;
        };
        if texture.immutable {
            self.raise(call, gl::INVALID_OPERATION, "texture storage is immutable");
            return;
        }
        let mut image = image;
        if let Some(pixels) = pixels {
            if !image.data.is_empty() && !image.write_region(0, 0, 0, width, height, depth, pixels) {
                self.raise(call, gl::INVALID_OPERATION, "pixel data too small");
                return;
            }
        }
        texture.images.insert(key, image);
    }

    /// Write a region of an existing level
    #[allow(clippy::too_many_arguments)]
    fn update_region(
        &self,
        call: &'static str,
        key: (u32, u32),
        origin: (u32, u32, u32),
        extent: (u32, u32, u32),
        texel_size: Option<u32>,
        pixels: &[u8],
    ) {
        let mut state = self.state.borrow_mut();
        let Some(id) = self.texture_for(call, &state, bind_target_of(key.0)) else {
            return;
        };
        let Some(image) = state.textures.get_mut(&id).and_then(|t| t.images.get_mut(&key)) else {
            self.raise(call, gl::INVALID_OPERATION, "level not defined");
            return;
        };
        let (x, y, z) = origin;
        let (width, height, depth) = extent;
        if !image.contains(x, y, z, width, height, depth) {
            self.raise(call, gl::INVALID_VALUE, "region outside the level");
            return;
        }
        match texel_size {
            // compressed: content is opaque, only a full replace is kept
            None => {
                if x == 0 && y == 0 && z == 0 && width == image.width && height == image.height && depth == image.depth {
                    image.data = pixels.to_vec();
                }
            }
            Some(size) => {
                if size != image.format.bytes_per_texel() {
                    self.raise(call, gl::INVALID_OPERATION, "format/type does not match the level");
                    return;
                }
                if !image.write_region(x, y, z, width, height, depth, pixels) {
                    self.raise(call, gl::INVALID_OPERATION, "pixel data too small");
                }
            }
        }
    }

    fn allocate_storage(&self, call: &'static str, target: u32, levels: u32, internal_format: u32, size: (u32, u32, u32)) {
        if !self.require_extended(call) {
            return;
        }
        let (width, height, depth) = size;
        if levels == 0 || width == 0 || height == 0 || depth == 0 {
            self.raise(call, gl::INVALID_VALUE, "empty storage");
            return;
        }
        let max_levels = 32 - width.max(height).max(if target == gl::TEXTURE_3D { depth } else { 1 }).leading_zeros();
        if levels > max_levels {
            self.raise(call, gl::INVALID_OPERATION, "too many levels");
            return;
        }
        let compressed = compressed_extension(internal_format).is_some();
        let format = if compressed {
            if !self.compressed_allowed(call, internal_format) {
                return;
            }
            None
        } else {
            match TexelFormat::from_internal(internal_format) {
                Some(format) => Some(format),
                None => {
                    self.raise(call, gl::INVALID_ENUM, "storage needs a sized internal format");
                    return;
                }
            }
        };
        if !self.size_allowed(call, target, width, height, depth) {
            return;
        }

        let mut state = self.state.borrow_mut();
        let Some(id) = self.texture_for(call, &state, target) else {
            return;
        };
        let Some(texture) = state.textures.get_mut(&id) else {
            return;
        };
        if texture.immutable {
            self.raise(call, gl::INVALID_OPERATION, "texture storage is immutable");
            return;
        }
        let faces: Vec<u32> = if target == gl::TEXTURE_CUBE_MAP {
            (0..6).map(|f| gl::TEXTURE_CUBE_MAP_POSITIVE_X + f).collect()
        } else {
            vec![target]
        };
        texture.images.clear();
        for level in 0..levels {
            let w = (width >> level).max(1);
            let h = (height >> level).max(1);
            let d = if target == gl::TEXTURE_3D { (depth >> level).max(1) } else { depth };
            for face in &faces {
                let image = match format {
                    Some(format) => Image::new(w, h, d, format),
                    None => Image::opaque(w, h, d, &[]),
                };
                texture.images.insert((*face, level), image);
            }
        }
        texture.immutable = true;
    }

    fn validate_draw(&self, call: &'static str, state: &State, mode: u32, instanced: bool) -> Option<NativeProgram> {
        if mode > gl::TRIANGLE_FAN {
            self.raise(call, gl::INVALID_ENUM, "unknown primitive mode");
            return None;
        }
        if instanced && !self.extended() && !self.has_extension(ext::ANGLE_INSTANCED_ARRAYS) {
            self.raise(call, gl::INVALID_OPERATION, "instancing needs ANGLE_instanced_arrays");
            return None;
        }
        let program = state
            .program
            .filter(|id| state.programs.get(id).is_some_and(|p| p.interface.is_some()));
        let Some(program) = program.and_then(NonZeroU32::new) else {
            self.raise(call, gl::INVALID_OPERATION, "no valid program in use");
            return None;
        };
        let status = state.framebuffer_status(state.draw_framebuffer, &self.render_support());
        if status != gl::FRAMEBUFFER_COMPLETE {
            self.raise(call, gl::INVALID_FRAMEBUFFER_OPERATION, "draw framebuffer incomplete");
            return None;
        }
        Some(NativeProgram(program))
    }

    fn record_draw(&self, state: &mut State, record: DrawRecord) {
        state.draws += 1;
        state.last_draw = Some(record);
    }

    fn draw_elements_common(&self, call: &'static str, mode: u32, count: u32, index_type: u32, offset: u32, instances: u32) {
        let mut state = self.state.borrow_mut();
        let Some(program) = self.validate_draw(call, &state, mode, call.ends_with("instanced")) else {
            return;
        };
        let size = match index_type {
            gl::UNSIGNED_BYTE => 1,
            gl::UNSIGNED_SHORT => 2,
            gl::UNSIGNED_INT if self.extended() || self.has_extension(ext::OES_ELEMENT_INDEX_UINT) => 4,
            _ => {
                self.raise(call, gl::INVALID_ENUM, "unsupported index type");
                return;
            }
        };
        if offset % size != 0 {
            self.raise(call, gl::INVALID_OPERATION, "offset not aligned to the index type");
            return;
        }
        let Some(buffer) = state.vertex_array().element_buffer.and_then(|id| state.buffers.get(&id)) else {
            self.raise(call, gl::INVALID_OPERATION, "no element array buffer bound");
            return;
        };
        if offset as u64 + count as u64 * size as u64 > buffer.data.len() as u64 {
            self.raise(call, gl::INVALID_OPERATION, "indices outside the element buffer");
            return;
        }
        let framebuffer = state.draw_framebuffer.and_then(NonZeroU32::new).map(NativeFramebuffer);
        self.record_draw(
            &mut state,
            DrawRecord {
                mode,
                first: offset,
                count,
                index_type: Some(index_type),
                instances,
                program,
                framebuffer,
            },
        );
    }

    fn draw_arrays_common(&self, call: &'static str, mode: u32, first: u32, count: u32, instances: u32) {
        let mut state = self.state.borrow_mut();
        let Some(program) = self.validate_draw(call, &state, mode, call.ends_with("instanced")) else {
            return;
        };
        let framebuffer = state.draw_framebuffer.and_then(NonZeroU32::new).map(NativeFramebuffer);
        self.record_draw(
            &mut state,
            DrawRecord {
                mode,
                first,
                count,
                index_type: None,
                instances,
                program,
                framebuffer,
            },
        );
    }

    fn framebuffer_binding(&self, call: &'static str, target: u32) -> Option<Option<u32>> {
        let state = self.state.borrow();
        match target {
            gl::FRAMEBUFFER | gl::DRAW_FRAMEBUFFER if target == gl::FRAMEBUFFER || self.extended() => {
                Some(state.draw_framebuffer)
            }
            gl::READ_FRAMEBUFFER if self.extended() => Some(state.read_framebuffer),
            _ => {
                self.raise(call, gl::INVALID_ENUM, "unknown framebuffer target");
                None
            }
        }
    }

    /// Framebuffer object bound at `target`; raises on the default one
    fn attach_target(&self, call: &'static str, target: u32, attachment: u32) -> Option<u32> {
        let bound = self.framebuffer_binding(call, target)?;
        let Some(framebuffer) = bound else {
            self.raise(call, gl::INVALID_OPERATION, "default framebuffer cannot be modified");
            return None;
        };
        let max_colors = if self.extended() || self.has_extension(ext::WEBGL_DRAW_BUFFERS) {
            self.config.limits.max_color_attachments.max(1)
        } else {
            1
        };
        let valid = match attachment {
            gl::DEPTH_ATTACHMENT | gl::STENCIL_ATTACHMENT | gl::DEPTH_STENCIL_ATTACHMENT => true,
            a => a >= gl::COLOR_ATTACHMENT0 && a < gl::COLOR_ATTACHMENT0 + max_colors,
        };
        if !valid {
            self.raise(call, gl::INVALID_ENUM, "attachment point out of range");
            return None;
        }
        Some(framebuffer)
    }

    fn set_attachment(&self, framebuffer: u32, point: u32, attachment: Option<Attachment>) {
        let mut state = self.state.borrow_mut();
        if let Some(object) = state.framebuffers.get_mut(&framebuffer) {
            match attachment {
                Some(attachment) => {
                    object.attachments.insert(point, attachment);
                }
                None => {
                    object.attachments.remove(&point);
                }
            }
        }
    }
}

impl GlContext for HeadlessContext {
    // ===== INFO =====

    fn tier(&self) -> ContextTier {
        self.config.tier
    }

    fn supported_extensions(&self) -> Vec<String> {
        live!(self, "supported_extensions", Vec::new());
        self.config.extensions.clone()
    }

    fn get_parameter_i32(&self, pname: u32) -> i32 {
        live!(self, "get_parameter_i32", 0);
        let limits = &self.config.limits;
        let extended = self.extended();
        let draw_buffers = extended || self.has_extension(ext::WEBGL_DRAW_BUFFERS);
        let value = match pname {
            gl::MAX_TEXTURE_SIZE => limits.max_texture_size,
            gl::MAX_CUBE_MAP_TEXTURE_SIZE => limits.max_cube_map_size,
            gl::MAX_RENDERBUFFER_SIZE => limits.max_renderbuffer_size,
            gl::MAX_COMBINED_TEXTURE_IMAGE_UNITS => limits.max_combined_texture_units,
            gl::MAX_TEXTURE_IMAGE_UNITS => limits.max_fragment_texture_units,
            gl::MAX_VERTEX_TEXTURE_IMAGE_UNITS => limits.max_vertex_texture_units,
            gl::MAX_VERTEX_ATTRIBS => limits.max_vertex_attribs,
            gl::MAX_VERTEX_UNIFORM_VECTORS => limits.max_vertex_uniform_vectors,
            gl::MAX_FRAGMENT_UNIFORM_VECTORS => limits.max_fragment_uniform_vectors,
            gl::MAX_VARYING_VECTORS => if extended { 15 } else { 8 },
            gl::MAX_DRAW_BUFFERS if draw_buffers => limits.max_draw_buffers,
            gl::MAX_COLOR_ATTACHMENTS if draw_buffers => limits.max_color_attachments,
            gl::MAX_3D_TEXTURE_SIZE if extended => limits.max_3d_texture_size,
            gl::MAX_ARRAY_TEXTURE_LAYERS if extended => limits.max_array_layers,
            gl::MAX_SAMPLES if extended => limits.max_samples,
            gl::MAX_UNIFORM_BLOCK_SIZE if extended => limits.max_uniform_block_size,
            gl::MAX_UNIFORM_BUFFER_BINDINGS if extended => limits.max_uniform_buffer_bindings,
            gl::UNIFORM_BUFFER_OFFSET_ALIGNMENT if extended => limits.uniform_buffer_offset_alignment,
            _ => {
                self.raise("get_parameter_i32", gl::INVALID_ENUM, &format!("unknown parameter 0x{:04X}", pname));
                return 0;
            }
        };
        value as i32
    }

    fn get_parameter_f32(&self, pname: u32) -> f32 {
        live!(self, "get_parameter_f32", 0.0);
        if pname == gl::MAX_TEXTURE_MAX_ANISOTROPY_EXT && self.has_extension(ext::EXT_TEXTURE_FILTER_ANISOTROPIC) {
            return self.config.limits.max_anisotropy;
        }
        self.raise("get_parameter_f32", gl::INVALID_ENUM, &format!("unknown parameter 0x{:04X}", pname));
        0.0
    }

    fn get_error(&self) -> u32 {
        *self.calls.borrow_mut().entry("get_error").or_insert(0) += 1;
        if self.loss_pending.replace(false) {
            return gl::CONTEXT_LOST_WEBGL;
        }
        self.error.replace(gl::NO_ERROR)
    }

    fn is_context_lost(&self) -> bool {
        self.lost.get()
    }

    fn drawing_buffer_size(&self) -> (u32, u32) {
        let state = self.state.borrow();
        (state.default_color.width, state.default_color.height)
    }

    fn flush(&self) {
        live!(self, "flush");
    }

    // ===== BUFFERS =====

    fn create_buffer(&self) -> Option<NativeBuffer> {
        live!(self, "create_buffer", None);
        let mut state = self.state.borrow_mut();
        let id = state.allocate_id()?;
        state.buffers.insert(id.get(), BufferObject { data: Vec::new() });
        Some(NativeBuffer(id))
    }

    fn delete_buffer(&self, buffer: NativeBuffer) {
        live!(self, "delete_buffer");
        let mut state = self.state.borrow_mut();
        let id = buffer.id();
        if state.buffers.remove(&id).is_none() {
            return;
        }
        state.buffer_bindings.retain(|_, bound| *bound != id);
        state.uniform_bindings.retain(|_, binding| binding.buffer.id() != id);
        let vao = state.vertex_array_mut();
        if vao.element_buffer == Some(id) {
            vao.element_buffer = None;
        }
    }

    fn bind_buffer(&self, target: u32, buffer: Option<NativeBuffer>) {
        live!(self, "bind_buffer");
        if !self.buffer_target_valid(target) {
            self.raise("bind_buffer", gl::INVALID_ENUM, "unknown buffer target");
            return;
        }
        let mut state = self.state.borrow_mut();
        if let Some(buffer) = buffer {
            if !state.buffers.contains_key(&buffer.id()) {
                self.raise("bind_buffer", gl::INVALID_OPERATION, "deleted or foreign buffer");
                return;
            }
        }
        let id = buffer.map(|b| b.id());
        if target == gl::ELEMENT_ARRAY_BUFFER {
            state.vertex_array_mut().element_buffer = id;
            return;
        }
        match id {
            Some(id) => state.buffer_bindings.insert(target, id),
            None => state.buffer_bindings.remove(&target),
        };
    }

    fn bind_buffer_range(&self, target: u32, index: u32, buffer: Option<NativeBuffer>, offset: u32, size: u32) {
        live!(self, "bind_buffer_range");
        if !self.require_extended("bind_buffer_range") {
            return;
        }
        if target != gl::UNIFORM_BUFFER {
            self.raise("bind_buffer_range", gl::INVALID_ENUM, "only uniform buffers are indexed");
            return;
        }
        let limits = &self.config.limits;
        if index >= limits.max_uniform_buffer_bindings {
            self.raise("bind_buffer_range", gl::INVALID_VALUE, "binding index out of range");
            return;
        }
        let mut state = self.state.borrow_mut();
        let Some(buffer) = buffer else {
            state.uniform_bindings.remove(&index);
            return;
        };
        let Some(object) = state.buffers.get(&buffer.id()) else {
            self.raise("bind_buffer_range", gl::INVALID_OPERATION, "deleted or foreign buffer");
            return;
        };
        let alignment = limits.uniform_buffer_offset_alignment.max(1);
        if offset % alignment != 0 {
            self.raise("bind_buffer_range", gl::INVALID_VALUE, "offset not aligned");
            return;
        }
        if size == 0 || offset as u64 + size as u64 > object.data.len() as u64 {
            self.raise("bind_buffer_range", gl::INVALID_VALUE, "range outside the buffer");
            return;
        }
        state.uniform_bindings.insert(index, UniformBinding { buffer, offset, size });
        state.buffer_bindings.insert(target, buffer.id());
    }

    fn buffer_data_size(&self, target: u32, size: u32, _usage: u32) {
        live!(self, "buffer_data_size");
        let mut state = self.state.borrow_mut();
        let Some(id) = state.bound_buffer(target) else {
            self.raise("buffer_data_size", gl::INVALID_OPERATION, "no buffer bound");
            return;
        };
        if let Some(buffer) = state.buffers.get_mut(&id) {
            buffer.data = vec![0; size as usize];
        }
    }

    fn buffer_sub_data(&self, target: u32, offset: u32, data: &[u8]) {
        live!(self, "buffer_sub_data");
        let mut state = self.state.borrow_mut();
        let Some(buffer) = state.bound_buffer(target).and_then(|id| state.buffers.get_mut(&id)) else {
            self.raise("buffer_sub_data", gl::INVALID_OPERATION, "no buffer bound");
            return;
        };
        let start = offset as usize;
        let Some(dst) = buffer.data.get_mut(start..start + data.len()) else {
            self.raise("buffer_sub_data", gl::INVALID_VALUE, "write outside the buffer");
            return;
        };
        dst.copy_from_slice(data);
    }

    // served on both tiers: legacy hosts read back synchronously
    fn get_buffer_sub_data(&self, target: u32, offset: u32, dst: &mut [u8]) {
        live!(self, "get_buffer_sub_data");
        let state = self.state.borrow();
        let Some(buffer) = state.bound_buffer(target).and_then(|id| state.buffers.get(&id)) else {
            self.raise("get_buffer_sub_data", gl::INVALID_OPERATION, "no buffer bound");
            return;
        };
        let start = offset as usize;
        let Some(src) = buffer.data.get(start..start + dst.len()) else {
            self.raise("get_buffer_sub_data", gl::INVALID_VALUE, "read outside the buffer");
            return;
        };
        dst.copy_from_slice(src);
    }

    // ===== TEXTURES =====

    fn create_texture(&self) -> Option<NativeTexture> {
        live!(self, "create_texture", None);
        let mut state = self.state.borrow_mut();
        let id = state.allocate_id()?;
        state.textures.insert(
            id.get(),
            TextureObject {
                target: None,
                images: FxHashMap::default(),
                params: FxHashMap::default(),
                immutable: false,
            },
        );
        Some(NativeTexture(id))
    }

    fn delete_texture(&self, texture: NativeTexture) {
        live!(self, "delete_texture");
        let mut state = self.state.borrow_mut();
        let id = texture.id();
        if state.textures.remove(&id).is_some() {
            state.texture_units.retain(|_, bound| *bound != id);
            state.detach_everywhere(|a| matches!(a, Attachment::Texture { texture, .. } if *texture == id));
        }
    }

    fn active_texture(&self, unit: u32) {
        live!(self, "active_texture");
        let index = unit.wrapping_sub(gl::TEXTURE0);
        if unit < gl::TEXTURE0 || index >= self.config.limits.max_combined_texture_units {
            self.raise("active_texture", gl::INVALID_ENUM, "texture unit out of range");
            return;
        }
        self.state.borrow_mut().active_unit = index;
    }

    fn bind_texture(&self, target: u32, texture: Option<NativeTexture>) {
        live!(self, "bind_texture");
        if !self.texture_target_valid(target) {
            self.raise("bind_texture", gl::INVALID_ENUM, "unknown texture target");
            return;
        }
        let mut state = self.state.borrow_mut();
        let unit = state.active_unit;
        let Some(texture) = texture else {
            state.texture_units.remove(&(unit, target));
            return;
        };
        let Some(object) = state.textures.get_mut(&texture.id()) else {
            self.raise("bind_texture", gl::INVALID_OPERATION, "deleted or foreign texture");
            return;
        };
        match object.target {
            Some(existing) if existing != target => {
                self.raise("bind_texture", gl::INVALID_OPERATION, "texture bound to another target before");
                return;
            }
            _ => object.target = Some(target),
        }
        state.texture_units.insert((unit, target), texture.id());
    }

    fn tex_parameter_i32(&self, target: u32, pname: u32, value: i32) {
        live!(self, "tex_parameter_i32");
        self.tex_parameter_f32_inner("tex_parameter_i32", target, pname, value as f32);
    }

    fn tex_parameter_f32(&self, target: u32, pname: u32, value: f32) {
        live!(self, "tex_parameter_f32");
        self.tex_parameter_f32_inner("tex_parameter_f32", target, pname, value);
    }

    fn pixel_store_i32(&self, pname: u32, value: i32) {
        live!(self, "pixel_store_i32");
        match pname {
            gl::PACK_ALIGNMENT | gl::UNPACK_ALIGNMENT => {
                if ![1, 2, 4, 8].contains(&value) {
                    self.raise("pixel_store_i32", gl::INVALID_VALUE, "alignment must be 1, 2, 4 or 8");
                    return;
                }
            }
            gl::UNPACK_FLIP_Y_WEBGL | gl::UNPACK_PREMULTIPLY_ALPHA_WEBGL | gl::UNPACK_COLORSPACE_CONVERSION_WEBGL => {}
            _ => {
                self.raise("pixel_store_i32", gl::INVALID_ENUM, "unknown pixel store parameter");
                return;
            }
        }
        self.state.borrow_mut().pixel_store.insert(pname, value);
    }

    fn tex_storage_2d(&self, target: u32, levels: u32, internal_format: u32, width: u32, height: u32) {
        live!(self, "tex_storage_2d");
        if target != gl::TEXTURE_2D && target != gl::TEXTURE_CUBE_MAP {
            self.raise("tex_storage_2d", gl::INVALID_ENUM, "2D storage on a layered target");
            return;
        }
        self.allocate_storage("tex_storage_2d", target, levels, internal_format, (width, height, 1));
    }

    fn tex_storage_3d(&self, target: u32, levels: u32, internal_format: u32, width: u32, height: u32, depth: u32) {
        live!(self, "tex_storage_3d");
        if !is_layered_target(target) {
            self.raise("tex_storage_3d", gl::INVALID_ENUM, "3D storage on a 2D target");
            return;
        }
        self.allocate_storage("tex_storage_3d", target, levels, internal_format, (width, height, depth));
    }

    fn tex_image_2d(
        &self,
        target: u32,
        level: u32,
        internal_format: u32,
        width: u32,
        height: u32,
        format: u32,
        ty: u32,
        pixels: Option<&[u8]>,
    ) {
        live!(self, "tex_image_2d");
        if !self.image_target_valid(target) {
            self.raise("tex_image_2d", gl::INVALID_ENUM, "unknown image target");
            return;
        }
        if !self.size_allowed("tex_image_2d", target, width, height, 1) {
            return;
        }
        let Some(texel) = self.upload_format("tex_image_2d", internal_format, format, ty) else {
            return;
        };
        let image = Image::new(width, height, 1, texel);
        self.define_image("tex_image_2d", (target, level), width, height, 1, image, pixels);
    }

    fn tex_image_3d(
        &self,
        target: u32,
        level: u32,
        internal_format: u32,
        width: u32,
        height: u32,
        depth: u32,
        format: u32,
        ty: u32,
        pixels: Option<&[u8]>,
    ) {
        live!(self, "tex_image_3d");
        if !self.require_extended("tex_image_3d") {
            return;
        }
        if !is_layered_target(target) {
            self.raise("tex_image_3d", gl::INVALID_ENUM, "3D image on a 2D target");
            return;
        }
        if !self.size_allowed("tex_image_3d", target, width, height, depth) {
            return;
        }
        let Some(texel) = self.upload_format("tex_image_3d", internal_format, format, ty) else {
            return;
        };
        let image = Image::new(width, height, depth, texel);
        self.define_image("tex_image_3d", (target, level), width, height, depth, image, pixels);
    }

    fn tex_sub_image_2d(
        &self,
        target: u32,
        level: u32,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        format: u32,
        ty: u32,
        pixels: &[u8],
    ) {
        live!(self, "tex_sub_image_2d");
        let Some(size) = transfer_size(format, ty) else {
            self.raise("tex_sub_image_2d", gl::INVALID_ENUM, "unsupported format/type combination");
            return;
        };
        self.update_region("tex_sub_image_2d", (target, level), (x, y, 0), (width, height, 1), Some(size), pixels);
    }

    fn tex_sub_image_3d(
        &self,
        target: u32,
        level: u32,
        x: u32,
        y: u32,
        z: u32,
        width: u32,
        height: u32,
        depth: u32,
        format: u32,
        ty: u32,
        pixels: &[u8],
    ) {
        live!(self, "tex_sub_image_3d");
        if !self.require_extended("tex_sub_image_3d") {
            return;
        }
        let Some(size) = transfer_size(format, ty) else {
            self.raise("tex_sub_image_3d", gl::INVALID_ENUM, "unsupported format/type combination");
            return;
        };
        self.update_region("tex_sub_image_3d", (target, level), (x, y, z), (width, height, depth), Some(size), pixels);
    }

    fn compressed_tex_image_2d(&self, target: u32, level: u32, internal_format: u32, width: u32, height: u32, data: &[u8]) {
        live!(self, "compressed_tex_image_2d");
        if !self.compressed_allowed("compressed_tex_image_2d", internal_format) {
            return;
        }
        if !self.size_allowed("compressed_tex_image_2d", target, width, height, 1) {
            return;
        }
        let image = Image::opaque(width, height, 1, data);
        self.define_image("compressed_tex_image_2d", (target, level), width, height, 1, image, None);
    }

    fn compressed_tex_image_3d(
        &self,
        target: u32,
        level: u32,
        internal_format: u32,
        width: u32,
        height: u32,
        depth: u32,
        data: &[u8],
    ) {
        live!(self, "compressed_tex_image_3d");
        if !self.require_extended("compressed_tex_image_3d") || !self.compressed_allowed("compressed_tex_image_3d", internal_format) {
            return;
        }
        let image = Image::opaque(width, height, depth, data);
        self.define_image("compressed_tex_image_3d", (target, level), width, height, depth, image, None);
    }

    fn compressed_tex_sub_image_2d(
        &self,
        target: u32,
        level: u32,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        format: u32,
        data: &[u8],
    ) {
        live!(self, "compressed_tex_sub_image_2d");
        if !self.compressed_allowed("compressed_tex_sub_image_2d", format) {
            return;
        }
        self.update_region("compressed_tex_sub_image_2d", (target, level), (x, y, 0), (width, height, 1), None, data);
    }

    fn compressed_tex_sub_image_3d(
        &self,
        target: u32,
        level: u32,
        x: u32,
        y: u32,
        z: u32,
        width: u32,
        height: u32,
        depth: u32,
        format: u32,
        data: &[u8],
    ) {
        live!(self, "compressed_tex_sub_image_3d");
        if !self.require_extended("compressed_tex_sub_image_3d") || !self.compressed_allowed("compressed_tex_sub_image_3d", format) {
            return;
        }
        self.update_region("compressed_tex_sub_image_3d", (target, level), (x, y, z), (width, height, depth), None, data);
    }

    fn copy_tex_sub_image_2d(
        &self,
        target: u32,
        level: u32,
        x_offset: u32,
        y_offset: u32,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) {
        live!(self, "copy_tex_sub_image_2d");
        let support = self.render_support();
        let mut state = self.state.borrow_mut();
        let read = state.read_framebuffer;
        if state.framebuffer_status(read, &support) != gl::FRAMEBUFFER_COMPLETE {
            self.raise("copy_tex_sub_image_2d", gl::INVALID_FRAMEBUFFER_OPERATION, "read framebuffer incomplete");
            return;
        }
        let Some(texels) = state.read_texels(read, x, y, width, height) else {
            self.raise("copy_tex_sub_image_2d", gl::INVALID_OPERATION, "no read image");
            return;
        };
        let Some(id) = self.texture_for("copy_tex_sub_image_2d", &state, bind_target_of(target)) else {
            return;
        };
        let Some(image) = state.textures.get_mut(&id).and_then(|t| t.images.get_mut(&(target, level))) else {
            self.raise("copy_tex_sub_image_2d", gl::INVALID_OPERATION, "level not defined");
            return;
        };
        if !image.contains(x_offset, y_offset, 0, width, height, 1) {
            self.raise("copy_tex_sub_image_2d", gl::INVALID_VALUE, "region outside the level");
            return;
        }
        for row in 0..height {
            for column in 0..width {
                let texel = texels[(row * width + column) as usize];
                image.set_texel(x_offset + column, y_offset + row, 0, texel);
            }
        }
    }

    fn generate_mipmap(&self, target: u32) {
        live!(self, "generate_mipmap");
        if !self.texture_target_valid(target) {
            self.raise("generate_mipmap", gl::INVALID_ENUM, "unknown texture target");
            return;
        }
        let extended = self.extended();
        let mut state = self.state.borrow_mut();
        let Some(id) = self.texture_for("generate_mipmap", &state, target) else {
            return;
        };
        let Some(texture) = state.textures.get_mut(&id) else {
            return;
        };
        let faces: Vec<u32> = if target == gl::TEXTURE_CUBE_MAP {
            (0..6).map(|f| gl::TEXTURE_CUBE_MAP_POSITIVE_X + f).collect()
        } else {
            vec![target]
        };
        for face in faces {
            let Some(base) = texture.images.get(&(face, 0)).cloned() else {
                self.raise("generate_mipmap", gl::INVALID_OPERATION, "base level not defined");
                return;
            };
            if matches!(base.format, TexelFormat::Opaque(_)) || base.format.is_depth() {
                self.raise("generate_mipmap", gl::INVALID_OPERATION, "format cannot be filtered");
                return;
            }
            if !extended && (!base.width.is_power_of_two() || !base.height.is_power_of_two()) {
                self.raise("generate_mipmap", gl::INVALID_OPERATION, "legacy mipmaps need power-of-two sizes");
                return;
            }
            let mut level = 0;
            let mut current = base;
            while current.width > 1 || current.height > 1 || (target == gl::TEXTURE_3D && current.depth > 1) {
                level += 1;
                if texture.immutable && !texture.images.contains_key(&(face, level)) {
                    break;
                }
                let mut next = current.downsample();
                if target == gl::TEXTURE_3D {
                    next = halve_depth(&next);
                }
                texture.images.insert((face, level), next.clone());
                current = next;
            }
        }
    }

    // ===== SAMPLERS (extended) =====

    fn create_sampler(&self) -> Option<NativeSampler> {
        live!(self, "create_sampler", None);
        if !self.require_extended("create_sampler") {
            return None;
        }
        let mut state = self.state.borrow_mut();
        let id = state.allocate_id()?;
        state.samplers.insert(id.get(), SamplerObject::default());
        Some(NativeSampler(id))
    }

    fn delete_sampler(&self, sampler: NativeSampler) {
        live!(self, "delete_sampler");
        let mut state = self.state.borrow_mut();
        if state.samplers.remove(&sampler.id()).is_some() {
            state.sampler_units.retain(|_, bound| *bound != sampler.id());
        }
    }

    fn bind_sampler(&self, unit: u32, sampler: Option<NativeSampler>) {
        live!(self, "bind_sampler");
        if !self.require_extended("bind_sampler") {
            return;
        }
        if unit >= self.config.limits.max_combined_texture_units {
            self.raise("bind_sampler", gl::INVALID_VALUE, "texture unit out of range");
            return;
        }
        let mut state = self.state.borrow_mut();
        match sampler {
            Some(sampler) if !state.samplers.contains_key(&sampler.id()) => {
                self.raise("bind_sampler", gl::INVALID_OPERATION, "deleted or foreign sampler");
            }
            Some(sampler) => {
                state.sampler_units.insert(unit, sampler.id());
            }
            None => {
                state.sampler_units.remove(&unit);
            }
        }
    }

    fn sampler_parameter_i32(&self, sampler: NativeSampler, pname: u32, value: i32) {
        live!(self, "sampler_parameter_i32");
        self.sampler_parameter_inner("sampler_parameter_i32", sampler, pname, value as f32);
    }

    fn sampler_parameter_f32(&self, sampler: NativeSampler, pname: u32, value: f32) {
        live!(self, "sampler_parameter_f32");
        self.sampler_parameter_inner("sampler_parameter_f32", sampler, pname, value);
    }

    // ===== FRAMEBUFFERS =====

    fn create_framebuffer(&self) -> Option<NativeFramebuffer> {
        live!(self, "create_framebuffer", None);
        let mut state = self.state.borrow_mut();
        let id = state.allocate_id()?;
        state.framebuffers.insert(id.get(), FramebufferObject::default());
        Some(NativeFramebuffer(id))
    }

    fn delete_framebuffer(&self, framebuffer: NativeFramebuffer) {
        live!(self, "delete_framebuffer");
        let mut state = self.state.borrow_mut();
        let id = framebuffer.id();
        if state.framebuffers.remove(&id).is_some() {
            if state.draw_framebuffer == Some(id) {
                state.draw_framebuffer = None;
            }
            if state.read_framebuffer == Some(id) {
                state.read_framebuffer = None;
            }
        }
    }

    fn bind_framebuffer(&self, target: u32, framebuffer: Option<NativeFramebuffer>) {
        live!(self, "bind_framebuffer");
        let valid = target == gl::FRAMEBUFFER
            || (self.extended() && (target == gl::READ_FRAMEBUFFER || target == gl::DRAW_FRAMEBUFFER));
        if !valid {
            self.raise("bind_framebuffer", gl::INVALID_ENUM, "unknown framebuffer target");
            return;
        }
        let mut state = self.state.borrow_mut();
        if let Some(framebuffer) = framebuffer {
            if !state.framebuffers.contains_key(&framebuffer.id()) {
                self.raise("bind_framebuffer", gl::INVALID_OPERATION, "deleted or foreign framebuffer");
                return;
            }
        }
        let id = framebuffer.map(|f| f.id());
        if target != gl::READ_FRAMEBUFFER {
            state.draw_framebuffer = id;
        }
        if target != gl::DRAW_FRAMEBUFFER {
            state.read_framebuffer = id;
        }
    }

    fn framebuffer_texture_2d(
        &self,
        target: u32,
        attachment: u32,
        texture_target: u32,
        texture: Option<NativeTexture>,
        level: u32,
    ) {
        live!(self, "framebuffer_texture_2d");
        let Some(framebuffer) = self.attach_target("framebuffer_texture_2d", target, attachment) else {
            return;
        };
        let Some(texture) = texture else {
            self.set_attachment(framebuffer, attachment, None);
            return;
        };
        if !self.image_target_valid(texture_target) {
            self.raise("framebuffer_texture_2d", gl::INVALID_ENUM, "unknown image target");
            return;
        }
        if level > 0 && !self.extended() && !self.has_extension(ext::OES_FBO_RENDER_MIPMAP) {
            self.raise("framebuffer_texture_2d", gl::INVALID_VALUE, "level must be 0 on the legacy tier");
            return;
        }
        {
            let state = self.state.borrow();
            let Some(object) = state.textures.get(&texture.id()) else {
                self.raise("framebuffer_texture_2d", gl::INVALID_OPERATION, "deleted or foreign texture");
                return;
            };
            if object.target.is_some_and(|t| t != bind_target_of(texture_target)) {
                self.raise("framebuffer_texture_2d", gl::INVALID_OPERATION, "texture target mismatch");
                return;
            }
        }
        self.set_attachment(
            framebuffer,
            attachment,
            Some(Attachment::Texture {
                texture: texture.id(),
                image_target: texture_target,
                level,
                layer: 0,
            }),
        );
    }

    fn framebuffer_texture_layer(
        &self,
        target: u32,
        attachment: u32,
        texture: Option<NativeTexture>,
        level: u32,
        layer: u32,
    ) {
        live!(self, "framebuffer_texture_layer");
        if !self.require_extended("framebuffer_texture_layer") {
            return;
        }
        let Some(framebuffer) = self.attach_target("framebuffer_texture_layer", target, attachment) else {
            return;
        };
        let Some(texture) = texture else {
            self.set_attachment(framebuffer, attachment, None);
            return;
        };
        let texture_target = {
            let state = self.state.borrow();
            state.textures.get(&texture.id()).and_then(|t| t.target)
        };
        let Some(texture_target) = texture_target.filter(|t| is_layered_target(*t)) else {
            self.raise("framebuffer_texture_layer", gl::INVALID_OPERATION, "texture is not layered");
            return;
        };
        self.set_attachment(
            framebuffer,
            attachment,
            Some(Attachment::Texture {
                texture: texture.id(),
                image_target: texture_target,
                level,
                layer,
            }),
        );
    }

    fn framebuffer_renderbuffer(
        &self,
        target: u32,
        attachment: u32,
        renderbuffer_target: u32,
        renderbuffer: Option<NativeRenderbuffer>,
    ) {
        live!(self, "framebuffer_renderbuffer");
        if renderbuffer_target != gl::RENDERBUFFER {
            self.raise("framebuffer_renderbuffer", gl::INVALID_ENUM, "unknown renderbuffer target");
            return;
        }
        let Some(framebuffer) = self.attach_target("framebuffer_renderbuffer", target, attachment) else {
            return;
        };
        let attached = match renderbuffer {
            Some(rb) if !self.state.borrow().renderbuffers.contains_key(&rb.id()) => {
                self.raise("framebuffer_renderbuffer", gl::INVALID_OPERATION, "deleted or foreign renderbuffer");
                return;
            }
            Some(rb) => Some(Attachment::Renderbuffer(rb.id())),
            None => None,
        };
        self.set_attachment(framebuffer, attachment, attached);
    }

    fn check_framebuffer_status(&self, target: u32) -> u32 {
        live!(self, "check_framebuffer_status", gl::FRAMEBUFFER_UNSUPPORTED);
        let Some(bound) = self.framebuffer_binding("check_framebuffer_status", target) else {
            return 0;
        };
        self.state.borrow().framebuffer_status(bound, &self.render_support())
    }

    fn draw_buffers(&self, buffers: &[u32]) {
        live!(self, "draw_buffers");
        if !self.extended() && !self.has_extension(ext::WEBGL_DRAW_BUFFERS) {
            self.raise("draw_buffers", gl::INVALID_OPERATION, "draw buffers need WEBGL_draw_buffers");
            return;
        }
        if buffers.len() as u32 > self.config.limits.max_draw_buffers.max(1) {
            self.raise("draw_buffers", gl::INVALID_VALUE, "too many draw buffers");
            return;
        }
        let mut state = self.state.borrow_mut();
        match state.draw_framebuffer {
            None => {
                if buffers.len() != 1 || (buffers[0] != gl::BACK && buffers[0] != gl::NONE) {
                    self.raise("draw_buffers", gl::INVALID_OPERATION, "default framebuffer takes BACK or NONE");
                }
            }
            Some(id) => {
                let valid = buffers
                    .iter()
                    .enumerate()
                    .all(|(i, b)| *b == gl::NONE || *b == gl::COLOR_ATTACHMENT0 + i as u32);
                if !valid {
                    self.raise("draw_buffers", gl::INVALID_OPERATION, "draw buffer i must be NONE or COLOR_ATTACHMENTi");
                    return;
                }
                if let Some(framebuffer) = state.framebuffers.get_mut(&id) {
                    framebuffer.draw_buffers = buffers.to_vec();
                }
            }
        }
    }

    fn read_buffer(&self, source: u32) {
        live!(self, "read_buffer");
        if !self.require_extended("read_buffer") {
            return;
        }
        let mut state = self.state.borrow_mut();
        match state.read_framebuffer {
            None => {
                if source != gl::BACK && source != gl::NONE {
                    self.raise("read_buffer", gl::INVALID_OPERATION, "default framebuffer reads BACK or NONE");
                }
            }
            Some(id) => {
                let max = self.config.limits.max_color_attachments.max(1);
                if source != gl::NONE && !(gl::COLOR_ATTACHMENT0..gl::COLOR_ATTACHMENT0 + max).contains(&source) {
                    self.raise("read_buffer", gl::INVALID_OPERATION, "read buffer must be a color attachment");
                    return;
                }
                if let Some(framebuffer) = state.framebuffers.get_mut(&id) {
                    framebuffer.read_buffer = source;
                }
            }
        }
    }

    fn blit_framebuffer(
        &self,
        src_x0: i32,
        src_y0: i32,
        src_x1: i32,
        src_y1: i32,
        dst_x0: i32,
        dst_y0: i32,
        dst_x1: i32,
        dst_y1: i32,
        mask: u32,
        filter: u32,
    ) {
        live!(self, "blit_framebuffer");
        if !self.require_extended("blit_framebuffer") {
            return;
        }
        if filter != gl::NEAREST && filter != gl::LINEAR {
            self.raise("blit_framebuffer", gl::INVALID_ENUM, "unknown filter");
            return;
        }
        if filter == gl::LINEAR && mask & (gl::DEPTH_BUFFER_BIT | gl::STENCIL_BUFFER_BIT) != 0 {
            self.raise("blit_framebuffer", gl::INVALID_OPERATION, "depth/stencil blits must use NEAREST");
            return;
        }
        let support = self.render_support();
        let mut state = self.state.borrow_mut();
        let (read, draw) = (state.read_framebuffer, state.draw_framebuffer);
        if state.framebuffer_status(read, &support) != gl::FRAMEBUFFER_COMPLETE
            || state.framebuffer_status(draw, &support) != gl::FRAMEBUFFER_COMPLETE
        {
            self.raise("blit_framebuffer", gl::INVALID_FRAMEBUFFER_OPERATION, "incomplete framebuffer");
            return;
        }
        let src = [src_x0, src_y0, src_x1, src_y1];
        let dst = [dst_x0, dst_y0, dst_x1, dst_y1];
        if mask & gl::COLOR_BUFFER_BIT != 0 {
            if let Some(source) = state.read_target(read) {
                for destination in state.color_targets(draw) {
                    state.blit_image(source, destination, src, dst);
                }
            }
        }
        if mask & gl::DEPTH_BUFFER_BIT != 0 {
            if let (Some(source), Some(destination)) = (state.depth_target(read), state.depth_target(draw)) {
                state.blit_image(source, destination, src, dst);
            }
        }
    }

    fn create_renderbuffer(&self) -> Option<NativeRenderbuffer> {
        live!(self, "create_renderbuffer", None);
        let mut state = self.state.borrow_mut();
        let id = state.allocate_id()?;
        state.renderbuffers.insert(id.get(), RenderbufferObject { image: None });
        Some(NativeRenderbuffer(id))
    }

    fn delete_renderbuffer(&self, renderbuffer: NativeRenderbuffer) {
        live!(self, "delete_renderbuffer");
        let mut state = self.state.borrow_mut();
        let id = renderbuffer.id();
        if state.renderbuffers.remove(&id).is_some() {
            if state.renderbuffer == Some(id) {
                state.renderbuffer = None;
            }
            state.detach_everywhere(|a| *a == Attachment::Renderbuffer(id));
        }
    }

    fn bind_renderbuffer(&self, target: u32, renderbuffer: Option<NativeRenderbuffer>) {
        live!(self, "bind_renderbuffer");
        if target != gl::RENDERBUFFER {
            self.raise("bind_renderbuffer", gl::INVALID_ENUM, "unknown renderbuffer target");
            return;
        }
        let mut state = self.state.borrow_mut();
        match renderbuffer {
            Some(rb) if !state.renderbuffers.contains_key(&rb.id()) => {
                self.raise("bind_renderbuffer", gl::INVALID_OPERATION, "deleted or foreign renderbuffer");
            }
            other => state.renderbuffer = other.map(|rb| rb.id()),
        }
    }

    fn renderbuffer_storage(&self, target: u32, internal_format: u32, width: u32, height: u32) {
        live!(self, "renderbuffer_storage");
        self.renderbuffer_storage_inner("renderbuffer_storage", target, 0, internal_format, width, height);
    }

    fn renderbuffer_storage_multisample(&self, target: u32, samples: u32, internal_format: u32, width: u32, height: u32) {
        live!(self, "renderbuffer_storage_multisample");
        if !self.require_extended("renderbuffer_storage_multisample") {
            return;
        }
        if samples > self.config.limits.max_samples {
            self.raise("renderbuffer_storage_multisample", gl::INVALID_OPERATION, "too many samples");
            return;
        }
        self.renderbuffer_storage_inner("renderbuffer_storage_multisample", target, samples, internal_format, width, height);
    }

    // ===== SHADERS & PROGRAMS =====

    fn create_shader(&self, shader_type: u32) -> Option<NativeShader> {
        live!(self, "create_shader", None);
        if shader_type != gl::VERTEX_SHADER && shader_type != gl::FRAGMENT_SHADER {
            self.raise("create_shader", gl::INVALID_ENUM, "unknown shader type");
            return None;
        }
        let mut state = self.state.borrow_mut();
        let id = state.allocate_id()?;
        state.shaders.insert(
            id.get(),
            ShaderObject {
                stage: shader_type,
                source: String::new(),
                compiled: None,
            },
        );
        Some(NativeShader(id))
    }

    fn delete_shader(&self, shader: NativeShader) {
        live!(self, "delete_shader");
        self.state.borrow_mut().shaders.remove(&shader.id());
    }

    fn shader_source(&self, shader: NativeShader, source: &str) {
        live!(self, "shader_source");
        match self.state.borrow_mut().shaders.get_mut(&shader.id()) {
            Some(object) => object.source = source.to_string(),
            None => self.raise("shader_source", gl::INVALID_VALUE, "unknown shader"),
        }
    }

    fn compile_shader(&self, shader: NativeShader) {
        live!(self, "compile_shader");
        let tier = self.config.tier;
        match self.state.borrow_mut().shaders.get_mut(&shader.id()) {
            Some(object) => object.compiled = Some(headless_shader::compile(tier, &object.source)),
            None => self.raise("compile_shader", gl::INVALID_VALUE, "unknown shader"),
        }
    }

    fn get_shader_compile_status(&self, shader: NativeShader) -> bool {
        live!(self, "get_shader_compile_status", false);
        let state = self.state.borrow();
        matches!(state.shaders.get(&shader.id()).and_then(|s| s.compiled.as_ref()), Some(Ok(_)))
    }

    fn get_shader_info_log(&self, shader: NativeShader) -> String {
        live!(self, "get_shader_info_log", String::new());
        let state = self.state.borrow();
        match state.shaders.get(&shader.id()).and_then(|s| s.compiled.as_ref()) {
            Some(Err(log)) => log.clone(),
            _ => String::new(),
        }
    }

    fn create_program(&self) -> Option<NativeProgram> {
        live!(self, "create_program", None);
        let mut state = self.state.borrow_mut();
        let id = state.allocate_id()?;
        state.programs.insert(id.get(), ProgramObject::default());
        Some(NativeProgram(id))
    }

    fn delete_program(&self, program: NativeProgram) {
        live!(self, "delete_program");
        let mut state = self.state.borrow_mut();
        if state.programs.remove(&program.id()).is_some() && state.program == Some(program.id()) {
            state.program = None;
        }
    }

    fn attach_shader(&self, program: NativeProgram, shader: NativeShader) {
        live!(self, "attach_shader");
        let mut state = self.state.borrow_mut();
        let Some(stage) = state.shaders.get(&shader.id()).map(|s| s.stage) else {
            self.raise("attach_shader", gl::INVALID_VALUE, "unknown shader");
            return;
        };
        let attached_stages: Vec<u32> = match state.programs.get(&program.id()) {
            Some(object) => object
                .attached
                .iter()
                .filter_map(|id| state.shaders.get(id).map(|s| s.stage))
                .collect(),
            None => {
                self.raise("attach_shader", gl::INVALID_VALUE, "unknown program");
                return;
            }
        };
        if attached_stages.contains(&stage) {
            self.raise("attach_shader", gl::INVALID_OPERATION, "a shader of that stage is already attached");
            return;
        }
        if let Some(object) = state.programs.get_mut(&program.id()) {
            object.attached.push(shader.id());
        }
    }

    fn detach_shader(&self, program: NativeProgram, shader: NativeShader) {
        live!(self, "detach_shader");
        let mut state = self.state.borrow_mut();
        let Some(object) = state.programs.get_mut(&program.id()) else {
            self.raise("detach_shader", gl::INVALID_VALUE, "unknown program");
            return;
        };
        let before = object.attached.len();
        object.attached.retain(|id| *id != shader.id());
        if object.attached.len() == before {
            self.raise("detach_shader", gl::INVALID_OPERATION, "shader not attached");
        }
    }

    fn bind_attrib_location(&self, program: NativeProgram, index: u32, name: &str) {
        live!(self, "bind_attrib_location");
        if index >= self.config.limits.max_vertex_attribs {
            self.raise("bind_attrib_location", gl::INVALID_VALUE, "attribute index out of range");
            return;
        }
        if name.starts_with("gl_") {
            self.raise("bind_attrib_location", gl::INVALID_OPERATION, "reserved attribute name");
            return;
        }
        match self.state.borrow_mut().programs.get_mut(&program.id()) {
            Some(object) => {
                object.attributes.insert(name.to_string(), index);
            }
            None => self.raise("bind_attrib_location", gl::INVALID_VALUE, "unknown program"),
        }
    }

    fn link_program(&self, program: NativeProgram) {
        live!(self, "link_program");
        let mut state = self.state.borrow_mut();
        let Some(object) = state.programs.get(&program.id()) else {
            self.raise("link_program", gl::INVALID_VALUE, "unknown program");
            return;
        };
        let stage = |stage: u32| {
            object
                .attached
                .iter()
                .filter_map(|id| state.shaders.get(id))
                .find(|s| s.stage == stage)
                .map(|s| s.compiled.clone())
        };
        let result = match (stage(gl::VERTEX_SHADER), stage(gl::FRAGMENT_SHADER)) {
            (Some(Some(Ok(vertex))), Some(Some(Ok(fragment)))) => headless_shader::link(&vertex, &fragment),
            (None, _) => Err("ERROR: Missing vertex shader\n".to_string()),
            (_, None) => Err("ERROR: Missing fragment shader\n".to_string()),
            _ => Err("ERROR: One or more attached shaders not successfully compiled\n".to_string()),
        };
        if let Some(object) = state.programs.get_mut(&program.id()) {
            object.values.clear();
            object.block_bindings.clear();
            match result {
                Ok(interface) => {
                    object.interface = Some(interface);
                    object.log.clear();
                }
                Err(log) => {
                    object.interface = None;
                    object.log = log;
                }
            }
        }
    }

    fn get_program_link_status(&self, program: NativeProgram) -> bool {
        live!(self, "get_program_link_status", false);
        let state = self.state.borrow();
        state.programs.get(&program.id()).is_some_and(|p| p.interface.is_some())
    }

    fn get_program_info_log(&self, program: NativeProgram) -> String {
        live!(self, "get_program_info_log", String::new());
        let state = self.state.borrow();
        state.programs.get(&program.id()).map(|p| p.log.clone()).unwrap_or_default()
    }

    fn use_program(&self, program: Option<NativeProgram>) {
        live!(self, "use_program");
        let mut state = self.state.borrow_mut();
        match program {
            Some(p) if !state.programs.get(&p.id()).is_some_and(|o| o.interface.is_some()) => {
                self.raise("use_program", gl::INVALID_OPERATION, "program not linked");
            }
            other => state.program = other.map(|p| p.id()),
        }
    }

    fn get_active_uniforms(&self, program: NativeProgram) -> Vec<ActiveUniform> {
        live!(self, "get_active_uniforms", Vec::new());
        let state = self.state.borrow();
        state
            .programs
            .get(&program.id())
            .and_then(|p| p.interface.as_ref())
            .map(|i| i.uniforms.clone())
            .unwrap_or_default()
    }

    fn get_uniform_location(&self, program: NativeProgram, name: &str) -> Option<NativeUniformLocation> {
        live!(self, "get_uniform_location", None);
        let state = self.state.borrow();
        let interface = state.programs.get(&program.id())?.interface.as_ref()?;
        interface.location(name).map(NativeUniformLocation)
    }

    fn get_active_uniform_blocks(&self, program: NativeProgram) -> Vec<ActiveUniformBlock> {
        live!(self, "get_active_uniform_blocks", Vec::new());
        if !self.require_extended("get_active_uniform_blocks") {
            return Vec::new();
        }
        let state = self.state.borrow();
        state
            .programs
            .get(&program.id())
            .and_then(|p| p.interface.as_ref())
            .map(|i| i.blocks.clone())
            .unwrap_or_default()
    }

    fn uniform_block_binding(&self, program: NativeProgram, block_index: u32, binding: u32) {
        live!(self, "uniform_block_binding");
        if !self.require_extended("uniform_block_binding") {
            return;
        }
        if binding >= self.config.limits.max_uniform_buffer_bindings {
            self.raise("uniform_block_binding", gl::INVALID_VALUE, "binding out of range");
            return;
        }
        let mut state = self.state.borrow_mut();
        let Some(object) = state.programs.get_mut(&program.id()) else {
            self.raise("uniform_block_binding", gl::INVALID_VALUE, "unknown program");
            return;
        };
        let block_count = object.interface.as_ref().map(|i| i.blocks.len()).unwrap_or(0) as u32;
        if block_index >= block_count {
            self.raise("uniform_block_binding", gl::INVALID_VALUE, "block index out of range");
            return;
        }
        object.block_bindings.insert(block_index, binding);
    }

    fn uniform(&self, location: NativeUniformLocation, data: UniformData<'_>) {
        live!(self, "uniform");
        let mut state = self.state.borrow_mut();
        let Some(program) = state.program.and_then(|id| state.programs.get_mut(&id)) else {
            self.raise("uniform", gl::INVALID_OPERATION, "no program in use");
            return;
        };
        let Some(interface) = program.interface.as_ref() else {
            return;
        };
        let types = &interface.location_types;
        let Some(declared) = types.get(location.0 as usize).copied() else {
            self.raise("uniform", gl::INVALID_OPERATION, "location not in the current program");
            return;
        };
        if !uniform_accepts(declared, &data) {
            self.raise("uniform", gl::INVALID_OPERATION, "value does not match the uniform type");
            return;
        }
        let (per_element, words) = uniform_words(&data);
        if per_element == 0 || words.is_empty() || words.len() % per_element != 0 {
            self.raise("uniform", gl::INVALID_VALUE, "value length does not match the uniform type");
            return;
        }
        let mut slot = location.0;
        for element in words.chunks(per_element) {
            if types.get(slot as usize) != Some(&declared) {
                break;
            }
            program.values.insert(slot, element.to_vec());
            slot += 1;
        }
    }

    // ===== VERTEX INPUT =====

    fn create_vertex_array(&self) -> Option<NativeVertexArray> {
        live!(self, "create_vertex_array", None);
        if !self.extended() && !self.has_extension(ext::OES_VERTEX_ARRAY_OBJECT) {
            self.raise("create_vertex_array", gl::INVALID_OPERATION, "vertex arrays need OES_vertex_array_object");
            return None;
        }
        let mut state = self.state.borrow_mut();
        let id = state.allocate_id()?;
        state.vertex_arrays.insert(id.get(), VertexArrayState::default());
        Some(NativeVertexArray(id))
    }

    fn delete_vertex_array(&self, vertex_array: NativeVertexArray) {
        live!(self, "delete_vertex_array");
        let mut state = self.state.borrow_mut();
        if state.vertex_arrays.remove(&vertex_array.id()).is_some() && state.vertex_array == Some(vertex_array.id()) {
            state.vertex_array = None;
        }
    }

    fn bind_vertex_array(&self, vertex_array: Option<NativeVertexArray>) {
        live!(self, "bind_vertex_array");
        let mut state = self.state.borrow_mut();
        match vertex_array {
            Some(vao) if !state.vertex_arrays.contains_key(&vao.id()) => {
                self.raise("bind_vertex_array", gl::INVALID_OPERATION, "deleted or foreign vertex array");
            }
            other => state.vertex_array = other.map(|v| v.id()),
        }
    }

    fn enable_vertex_attrib_array(&self, index: u32) {
        live!(self, "enable_vertex_attrib_array");
        if index >= self.config.limits.max_vertex_attribs {
            self.raise("enable_vertex_attrib_array", gl::INVALID_VALUE, "attribute index out of range");
            return;
        }
        self.state.borrow_mut().vertex_array_mut().enabled.insert(index);
    }

    fn disable_vertex_attrib_array(&self, index: u32) {
        live!(self, "disable_vertex_attrib_array");
        if index >= self.config.limits.max_vertex_attribs {
            self.raise("disable_vertex_attrib_array", gl::INVALID_VALUE, "attribute index out of range");
            return;
        }
        self.state.borrow_mut().vertex_array_mut().enabled.remove(&index);
    }

    fn vertex_attrib_pointer_f32(&self, index: u32, size: u32, ty: u32, normalized: bool, stride: u32, offset: u32) {
        live!(self, "vertex_attrib_pointer_f32");
        self.attrib_pointer("vertex_attrib_pointer_f32", index, size, ty, normalized, false, stride, offset);
    }

    fn vertex_attrib_pointer_i32(&self, index: u32, size: u32, ty: u32, stride: u32, offset: u32) {
        live!(self, "vertex_attrib_pointer_i32");
        if !self.require_extended("vertex_attrib_pointer_i32") {
            return;
        }
        self.attrib_pointer("vertex_attrib_pointer_i32", index, size, ty, false, true, stride, offset);
    }

    fn vertex_attrib_divisor(&self, index: u32, divisor: u32) {
        live!(self, "vertex_attrib_divisor");
        if !self.extended() && !self.has_extension(ext::ANGLE_INSTANCED_ARRAYS) {
            self.raise("vertex_attrib_divisor", gl::INVALID_OPERATION, "divisors need ANGLE_instanced_arrays");
            return;
        }
        if index >= self.config.limits.max_vertex_attribs {
            self.raise("vertex_attrib_divisor", gl::INVALID_VALUE, "attribute index out of range");
            return;
        }
        self.state.borrow_mut().vertex_array_mut().divisors.insert(index, divisor);
    }

    // ===== FIXED-FUNCTION STATE =====

    fn enable(&self, capability: u32) {
        live!(self, "enable");
        self.set_capability("enable", capability, true);
    }

    fn disable(&self, capability: u32) {
        live!(self, "disable");
        self.set_capability("disable", capability, false);
    }

    fn blend_func_separate(&self, src_rgb: u32, dst_rgb: u32, src_alpha: u32, dst_alpha: u32) {
        live!(self, "blend_func_separate");
        self.state.borrow_mut().fixed.blend_func = [src_rgb, dst_rgb, src_alpha, dst_alpha];
    }

    fn blend_equation_separate(&self, mode_rgb: u32, mode_alpha: u32) {
        live!(self, "blend_equation_separate");
        let min_max_allowed = self.extended() || self.has_extension(ext::EXT_BLEND_MINMAX);
        for mode in [mode_rgb, mode_alpha] {
            let valid = match mode {
                gl::FUNC_ADD | gl::FUNC_SUBTRACT | gl::FUNC_REVERSE_SUBTRACT => true,
                gl::MIN | gl::MAX => min_max_allowed,
                _ => false,
            };
            if !valid {
                self.raise("blend_equation_separate", gl::INVALID_ENUM, "unsupported blend equation");
                return;
            }
        }
        self.state.borrow_mut().fixed.blend_equation = [mode_rgb, mode_alpha];
    }

    fn blend_color(&self, r: f32, g: f32, b: f32, a: f32) {
        live!(self, "blend_color");
        self.state.borrow_mut().fixed.blend_color = [r, g, b, a];
    }

    fn color_mask(&self, r: bool, g: bool, b: bool, a: bool) {
        live!(self, "color_mask");
        self.state.borrow_mut().fixed.color_mask = [r, g, b, a];
    }

    fn depth_mask(&self, enabled: bool) {
        live!(self, "depth_mask");
        self.state.borrow_mut().fixed.depth_mask = enabled;
    }

    fn depth_func(&self, func: u32) {
        live!(self, "depth_func");
        if !(gl::NEVER..=gl::ALWAYS).contains(&func) {
            self.raise("depth_func", gl::INVALID_ENUM, "unknown comparison");
            return;
        }
        self.state.borrow_mut().fixed.depth_func = func;
    }

    fn polygon_offset(&self, factor: f32, units: f32) {
        live!(self, "polygon_offset");
        self.state.borrow_mut().fixed.polygon_offset = [factor, units];
    }

    fn cull_face(&self, mode: u32) {
        live!(self, "cull_face");
        if ![gl::FRONT, gl::BACK, gl::FRONT_AND_BACK].contains(&mode) {
            self.raise("cull_face", gl::INVALID_ENUM, "unknown face");
            return;
        }
        self.state.borrow_mut().fixed.cull_face = mode;
    }

    fn front_face(&self, mode: u32) {
        live!(self, "front_face");
        if mode != gl::CW && mode != gl::CCW {
            self.raise("front_face", gl::INVALID_ENUM, "unknown winding");
            return;
        }
        self.state.borrow_mut().fixed.front_face = mode;
    }

    fn stencil_func_separate(&self, face: u32, func: u32, reference: i32, mask: u32) {
        live!(self, "stencil_func_separate");
        let Some(faces) = self.faces("stencil_func_separate", face) else {
            return;
        };
        let mut state = self.state.borrow_mut();
        for i in faces {
            state.fixed.stencil_func[i] = (func, reference, mask);
        }
    }

    fn stencil_op_separate(&self, face: u32, fail: u32, depth_fail: u32, pass: u32) {
        live!(self, "stencil_op_separate");
        let Some(faces) = self.faces("stencil_op_separate", face) else {
            return;
        };
        let mut state = self.state.borrow_mut();
        for i in faces {
            state.fixed.stencil_op[i] = [fail, depth_fail, pass];
        }
    }

    fn stencil_mask_separate(&self, face: u32, mask: u32) {
        live!(self, "stencil_mask_separate");
        let Some(faces) = self.faces("stencil_mask_separate", face) else {
            return;
        };
        let mut state = self.state.borrow_mut();
        for i in faces {
            state.fixed.stencil_write_mask[i] = mask;
        }
    }

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) {
        live!(self, "viewport");
        if width < 0 || height < 0 {
            self.raise("viewport", gl::INVALID_VALUE, "negative viewport size");
            return;
        }
        self.state.borrow_mut().fixed.viewport = [x, y, width, height];
    }

    fn scissor(&self, x: i32, y: i32, width: i32, height: i32) {
        live!(self, "scissor");
        if width < 0 || height < 0 {
            self.raise("scissor", gl::INVALID_VALUE, "negative scissor size");
            return;
        }
        self.state.borrow_mut().fixed.scissor = [x, y, width, height];
    }

    fn clear_color(&self, r: f32, g: f32, b: f32, a: f32) {
        live!(self, "clear_color");
        self.state.borrow_mut().fixed.clear_color = [r, g, b, a];
    }

    fn clear_depth(&self, depth: f32) {
        live!(self, "clear_depth");
        self.state.borrow_mut().fixed.clear_depth = depth.clamp(0.0, 1.0);
    }

    fn clear_stencil(&self, stencil: i32) {
        live!(self, "clear_stencil");
        self.state.borrow_mut().fixed.clear_stencil = stencil;
    }

    fn clear(&self, mask: u32) {
        live!(self, "clear");
        let known = gl::COLOR_BUFFER_BIT | gl::DEPTH_BUFFER_BIT | gl::STENCIL_BUFFER_BIT;
        if mask & !known != 0 {
            self.raise("clear", gl::INVALID_VALUE, "unknown clear bits");
            return;
        }
        let support = self.render_support();
        let mut state = self.state.borrow_mut();
        let draw = state.draw_framebuffer;
        if state.framebuffer_status(draw, &support) != gl::FRAMEBUFFER_COMPLETE {
            self.raise("clear", gl::INVALID_FRAMEBUFFER_OPERATION, "draw framebuffer incomplete");
            return;
        }
        state.clear(draw, mask);
    }

    // ===== DRAW =====

    fn draw_arrays(&self, mode: u32, first: u32, count: u32) {
        live!(self, "draw_arrays");
        self.draw_arrays_common("draw_arrays", mode, first, count, 1);
    }

    fn draw_arrays_instanced(&self, mode: u32, first: u32, count: u32, instances: u32) {
        live!(self, "draw_arrays_instanced");
        self.draw_arrays_common("draw_arrays_instanced", mode, first, count, instances);
    }

    fn draw_elements(&self, mode: u32, count: u32, index_type: u32, offset: u32) {
        live!(self, "draw_elements");
        self.draw_elements_common("draw_elements", mode, count, index_type, offset, 1);
    }

    fn draw_elements_instanced(&self, mode: u32, count: u32, index_type: u32, offset: u32, instances: u32) {
        live!(self, "draw_elements_instanced");
        self.draw_elements_common("draw_elements_instanced", mode, count, index_type, offset, instances);
    }

    // ===== READBACK =====

    fn read_pixels(&self, x: i32, y: i32, width: u32, height: u32, format: u32, ty: u32, dst: &mut [u8]) {
        live!(self, "read_pixels");
        if self.state.borrow().buffer_bindings.contains_key(&gl::PIXEL_PACK_BUFFER) {
            self.raise("read_pixels", gl::INVALID_OPERATION, "a pixel pack buffer is bound");
            return;
        }
        let Some(bytes) = self.read_region("read_pixels", x, y, width, height, format, ty) else {
            return;
        };
        if dst.len() < bytes.len() {
            self.raise("read_pixels", gl::INVALID_OPERATION, "destination too small");
            return;
        }
        dst[..bytes.len()].copy_from_slice(&bytes);
    }

    fn read_pixels_to_pack_buffer(&self, x: i32, y: i32, width: u32, height: u32, format: u32, ty: u32, offset: u32) {
        live!(self, "read_pixels_to_pack_buffer");
        if !self.require_extended("read_pixels_to_pack_buffer") {
            return;
        }
        let Some(buffer) = self.state.borrow().buffer_bindings.get(&gl::PIXEL_PACK_BUFFER).copied() else {
            self.raise("read_pixels_to_pack_buffer", gl::INVALID_OPERATION, "no pixel pack buffer bound");
            return;
        };
        let Some(bytes) = self.read_region("read_pixels_to_pack_buffer", x, y, width, height, format, ty) else {
            return;
        };
        let mut state = self.state.borrow_mut();
        let start = offset as usize;
        let Some(dst) = state
            .buffers
            .get_mut(&buffer)
            .and_then(|b| b.data.get_mut(start..start + bytes.len()))
        else {
            self.raise("read_pixels_to_pack_buffer", gl::INVALID_OPERATION, "pack buffer too small");
            return;
        };
        dst.copy_from_slice(&bytes);
    }

    // ===== SYNC (extended) =====

    fn fence_sync(&self, condition: u32, flags: u32) -> Option<NativeFence> {
        live!(self, "fence_sync", None);
        if !self.require_extended("fence_sync") {
            return None;
        }
        if condition != gl::SYNC_GPU_COMMANDS_COMPLETE || flags != 0 {
            self.raise("fence_sync", gl::INVALID_ENUM, "unknown fence condition");
            return None;
        }
        let mut state = self.state.borrow_mut();
        let id = state.allocate_id()?;
        state.fences.insert(id.get(), self.config.fence_latency);
        Some(NativeFence(id))
    }

    fn client_wait_sync(&self, fence: NativeFence, _flags: u32, _timeout_ns: u64) -> u32 {
        live!(self, "client_wait_sync", gl::WAIT_FAILED);
        let mut state = self.state.borrow_mut();
        let Some(remaining) = state.fences.get_mut(&fence.id()) else {
            self.raise("client_wait_sync", gl::INVALID_VALUE, "unknown fence");
            return gl::WAIT_FAILED;
        };
        match *remaining {
            0 => gl::ALREADY_SIGNALED,
            1 => {
                *remaining = 0;
                gl::CONDITION_SATISFIED
            }
            _ => {
                *remaining -= 1;
                gl::TIMEOUT_EXPIRED
            }
        }
    }

    fn delete_sync(&self, fence: NativeFence) {
        live!(self, "delete_sync");
        self.state.borrow_mut().fences.remove(&fence.id());
    }
}

// ===== INNER OPERATIONS =====

impl HeadlessContext {
    fn tex_parameter_f32_inner(&self, call: &'static str, target: u32, pname: u32, value: f32) {
        if !self.texture_target_valid(target) {
            self.raise(call, gl::INVALID_ENUM, "unknown texture target");
            return;
        }
        if !self.parameter_allowed(call, pname, value) {
            return;
        }
        let mut state = self.state.borrow_mut();
        let Some(id) = self.texture_for(call, &state, target) else {
            return;
        };
        if let Some(texture) = state.textures.get_mut(&id) {
            texture.params.insert(pname, value);
        }
    }

    fn sampler_parameter_inner(&self, call: &'static str, sampler: NativeSampler, pname: u32, value: f32) {
        if !self.require_extended(call) || !self.parameter_allowed(call, pname, value) {
            return;
        }
        match self.state.borrow_mut().samplers.get_mut(&sampler.id()) {
            Some(object) => {
                object.params.insert(pname, value);
            }
            None => self.raise(call, gl::INVALID_OPERATION, "deleted or foreign sampler"),
        }
    }

    fn parameter_allowed(&self, call: &'static str, pname: u32, value: f32) -> bool {
        let extended = self.extended();
        let valid = match pname {
            gl::TEXTURE_MIN_FILTER => [
                gl::NEAREST,
                gl::LINEAR,
                gl::NEAREST_MIPMAP_NEAREST,
                gl::LINEAR_MIPMAP_NEAREST,
                gl::NEAREST_MIPMAP_LINEAR,
                gl::LINEAR_MIPMAP_LINEAR,
            ]
            .contains(&(value as u32)),
            gl::TEXTURE_MAG_FILTER => value as u32 == gl::NEAREST || value as u32 == gl::LINEAR,
            gl::TEXTURE_WRAP_S | gl::TEXTURE_WRAP_T => {
                [gl::REPEAT, gl::CLAMP_TO_EDGE, gl::MIRRORED_REPEAT].contains(&(value as u32))
            }
            gl::TEXTURE_WRAP_R => extended && [gl::REPEAT, gl::CLAMP_TO_EDGE, gl::MIRRORED_REPEAT].contains(&(value as u32)),
            gl::TEXTURE_MIN_LOD | gl::TEXTURE_MAX_LOD | gl::TEXTURE_BASE_LEVEL | gl::TEXTURE_MAX_LEVEL => extended,
            gl::TEXTURE_COMPARE_MODE => {
                extended && (value as u32 == gl::NONE || value as u32 == gl::COMPARE_REF_TO_TEXTURE)
            }
            gl::TEXTURE_COMPARE_FUNC => extended && (gl::NEVER..=gl::ALWAYS).contains(&(value as u32)),
            gl::TEXTURE_MAX_ANISOTROPY_EXT => {
                if !self.has_extension(ext::EXT_TEXTURE_FILTER_ANISOTROPIC) {
                    false
                } else if value < 1.0 {
                    self.raise(call, gl::INVALID_VALUE, "anisotropy below 1");
                    return false;
                } else {
                    true
                }
            }
            _ => false,
        };
        if !valid {
            self.raise(call, gl::INVALID_ENUM, &format!("invalid parameter 0x{:04X} = {}", pname, value));
        }
        valid
    }

    fn renderbuffer_storage_inner(
        &self,
        call: &'static str,
        target: u32,
        samples: u32,
        internal_format: u32,
        width: u32,
        height: u32,
    ) {
        if target != gl::RENDERBUFFER {
            self.raise(call, gl::INVALID_ENUM, "unknown renderbuffer target");
            return;
        }
        let max = self.config.limits.max_renderbuffer_size;
        if width > max || height > max {
            self.raise(call, gl::INVALID_VALUE, "size exceeds the context limits");
            return;
        }
        let format = match internal_format {
            gl::DEPTH_STENCIL => Some(TexelFormat::Depth32),
            other => TexelFormat::from_internal(other),
        };
        let Some(format) = format else {
            self.raise(call, gl::INVALID_ENUM, "format is not renderable");
            return;
        };
        let mut state = self.state.borrow_mut();
        let Some(id) = state.renderbuffer else {
            self.raise(call, gl::INVALID_OPERATION, "no renderbuffer bound");
            return;
        };
        if let Some(renderbuffer) = state.renderbuffers.get_mut(&id) {
            let mut image = Image::new(width, height, 1, format);
            image.samples = samples;
            renderbuffer.image = Some(image);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn attrib_pointer(
        &self,
        call: &'static str,
        index: u32,
        size: u32,
        ty: u32,
        normalized: bool,
        integer: bool,
        stride: u32,
        offset: u32,
    ) {
        if index >= self.config.limits.max_vertex_attribs || !(1..=4).contains(&size) || stride > 255 {
            self.raise(call, gl::INVALID_VALUE, "attribute index, size or stride out of range");
            return;
        }
        let mut state = self.state.borrow_mut();
        let buffer = state.buffer_bindings.get(&gl::ARRAY_BUFFER).copied();
        if buffer.is_none() && offset != 0 {
            self.raise(call, gl::INVALID_OPERATION, "no array buffer bound");
            return;
        }
        let pointer = AttribPointer {
            buffer: buffer.and_then(NonZeroU32::new).map(NativeBuffer),
            size,
            ty,
            normalized,
            integer,
            stride,
            offset,
        };
        state.vertex_array_mut().pointers.insert(index, pointer);
    }

    fn set_capability(&self, call: &'static str, capability: u32, enabled: bool) {
        let known = [
            gl::CULL_FACE,
            gl::DEPTH_TEST,
            gl::STENCIL_TEST,
            gl::BLEND,
            gl::SCISSOR_TEST,
            gl::POLYGON_OFFSET_FILL,
            gl::SAMPLE_ALPHA_TO_COVERAGE,
        ];
        if !known.contains(&capability) {
            self.raise(call, gl::INVALID_ENUM, "unknown capability");
            return;
        }
        let mut state = self.state.borrow_mut();
        if enabled {
            state.capabilities.insert(capability);
        } else {
            state.capabilities.remove(&capability);
        }
    }

    fn faces(&self, call: &'static str, face: u32) -> Option<Vec<usize>> {
        match face {
            gl::FRONT => Some(vec![0]),
            gl::BACK => Some(vec![1]),
            gl::FRONT_AND_BACK => Some(vec![0, 1]),
            _ => {
                self.raise(call, gl::INVALID_ENUM, "unknown face");
                None
            }
        }
    }

    /// Read a region of the current read image as `format` / `ty`
    #[allow(clippy::too_many_arguments)]
    fn read_region(&self, call: &'static str, x: i32, y: i32, width: u32, height: u32, format: u32, ty: u32) -> Option<Vec<u8>> {
        let support = self.render_support();
        let state = self.state.borrow();
        let read = state.read_framebuffer;
        if state.framebuffer_status(read, &support) != gl::FRAMEBUFFER_COMPLETE {
            self.raise(call, gl::INVALID_FRAMEBUFFER_OPERATION, "read framebuffer incomplete");
            return None;
        }
        let Some((image, _)) = state.read_target(read).and_then(|target| state.image(target)) else {
            self.raise(call, gl::INVALID_OPERATION, "no read image");
            return None;
        };
        let float_source = image.format.is_float_color();
        let valid = format == gl::RGBA && (ty == gl::UNSIGNED_BYTE || (ty == gl::FLOAT && float_source));
        if !valid {
            self.raise(call, gl::INVALID_OPERATION, &format!("cannot read as 0x{:04X}/0x{:04X}", format, ty));
            return None;
        }
        let texel_size = if ty == gl::FLOAT { 16 } else { 4 };
        let mut bytes = vec![0u8; width as usize * height as usize * texel_size];
        for row in 0..height {
            for column in 0..width {
                let (px, py) = (x + column as i32, y + row as i32);
                if px < 0 || py < 0 {
                    continue;
                }
                let Some(texel) = state.texel_at(read, px as u32, py as u32) else {
                    continue;
                };
                let at = (row * width + column) as usize * texel_size;
                let dst = &mut bytes[at..at + texel_size];
                if ty == gl::FLOAT {
                    TexelFormat::Rgba32F.encode(texel, dst);
                } else {
                    TexelFormat::Rgba8.encode(texel, dst);
                }
            }
        }
        Some(bytes)
    }
}

/// Keep every other layer (3D mip chains halve the depth too)
fn halve_depth(image: &Image) -> Image {
    let depth = (image.depth / 2).max(1);
    let mut next = Image::new(image.width, image.height, depth, image.format);
    for z in 0..depth {
        for y in 0..image.height {
            for x in 0..image.width {
                next.set_texel(x, y, z, image.texel(x, y, (z * 2).min(image.depth - 1)));
            }
        }
    }
    next
}

#[cfg(test)]
#[path = "headless_context_tests.rs"]
mod tests;
