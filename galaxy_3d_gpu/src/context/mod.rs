/// Context seam - the lower-capability, context-based graphics API
///
/// Everything the GPU layer does ends up as calls on a `GlContext`. The trait
/// mirrors the two tiers of the underlying API: the legacy tier (WebGL1-class
/// with extensions) and the extended tier (WebGL2-class). Calls that only
/// exist on the extended tier are still part of the trait; the layer never
/// issues them unless the capability tables say they are available.
///
/// All methods take `&self`: a context is bound to a single thread and keeps
/// its own interior state, the way the host API does.

pub mod gl;

#[cfg(test)]
pub(crate) mod mock_context;

use std::num::NonZeroU32;
use std::rc::Rc;

macro_rules! native_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub NonZeroU32);

        impl $name {
            /// Raw object name as seen by the context
            pub fn id(self) -> u32 {
                self.0.get()
            }
        }
    };
}

native_handle!(
    /// Buffer object name
    NativeBuffer
);
native_handle!(
    /// Texture object name
    NativeTexture
);
native_handle!(
    /// Framebuffer object name
    NativeFramebuffer
);
native_handle!(
    /// Renderbuffer object name
    NativeRenderbuffer
);
native_handle!(
    /// Shader object name
    NativeShader
);
native_handle!(
    /// Program object name
    NativeProgram
);
native_handle!(
    /// Sampler object name (extended tier only)
    NativeSampler
);
native_handle!(
    /// Vertex array object name
    NativeVertexArray
);
native_handle!(
    /// Fence sync object (extended tier only)
    NativeFence
);

/// Location of a uniform inside a linked program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeUniformLocation(pub u32);

/// Capability level of the context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextTier {
    /// WebGL1-class: unsized formats, extensions for most features, no blocks
    Legacy,
    /// WebGL2-class: sized formats, MRT, 3D/array textures, blocks, fences
    Extended,
}

impl ContextTier {
    pub fn is_extended(self) -> bool {
        self == ContextTier::Extended
    }
}

/// Context creation attributes passed to the surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextAttributes {
    pub alpha: bool,
    pub depth: bool,
    pub stencil: bool,
    pub antialias: bool,
    pub premultiplied_alpha: bool,
    pub preserve_drawing_buffer: bool,
}

impl Default for ContextAttributes {
    fn default() -> Self {
        Self {
            alpha: true,
            depth: true,
            stencil: false,
            antialias: false,
            premultiplied_alpha: true,
            preserve_drawing_buffer: false,
        }
    }
}

/// Canvas-like surface a context is created from
pub trait Surface {
    /// Create (or fetch) the context of the requested tier.
    /// Returns `None` when the host cannot provide that tier.
    fn create_context(
        &self,
        tier: ContextTier,
        attributes: &ContextAttributes,
    ) -> Option<Rc<dyn GlContext>>;

    /// Size of the surface in CSS pixels
    fn client_size(&self) -> (u32, u32);

    /// Host device pixel ratio
    fn device_pixel_ratio(&self) -> f32;

    /// Resize the drawing buffer backing the context
    fn set_drawing_buffer_size(&self, width: u32, height: u32);
}

// ===== REFLECTION =====

/// Declared type of an active uniform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformType {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Int,
    IVec2,
    IVec3,
    IVec4,
    UInt,
    UVec2,
    UVec3,
    UVec4,
    Bool,
    BVec2,
    BVec3,
    BVec4,
    Mat2,
    Mat3,
    Mat4,
    Sampler2D,
    Sampler3D,
    SamplerCube,
    Sampler2DArray,
    Sampler2DShadow,
    ISampler2D,
    USampler2D,
}

impl UniformType {
    /// Whether the uniform consumes a texture unit
    pub fn is_sampler(self) -> bool {
        matches!(
            self,
            UniformType::Sampler2D
                | UniformType::Sampler3D
                | UniformType::SamplerCube
                | UniformType::Sampler2DArray
                | UniformType::Sampler2DShadow
                | UniformType::ISampler2D
                | UniformType::USampler2D
        )
    }

    /// Number of scalar components
    pub fn components(self) -> u32 {
        match self {
            UniformType::Float | UniformType::Int | UniformType::UInt | UniformType::Bool => 1,
            UniformType::Vec2 | UniformType::IVec2 | UniformType::UVec2 | UniformType::BVec2 => 2,
            UniformType::Vec3 | UniformType::IVec3 | UniformType::UVec3 | UniformType::BVec3 => 3,
            UniformType::Vec4 | UniformType::IVec4 | UniformType::UVec4 | UniformType::BVec4 => 4,
            UniformType::Mat2 => 4,
            UniformType::Mat3 => 9,
            UniformType::Mat4 => 16,
            _ => 1,
        }
    }

    /// Parse a GLSL type keyword
    pub fn from_glsl(keyword: &str) -> Option<Self> {
        let ty = match keyword {
            "float" => UniformType::Float,
            "vec2" => UniformType::Vec2,
            "vec3" => UniformType::Vec3,
            "vec4" => UniformType::Vec4,
            "int" => UniformType::Int,
            "ivec2" => UniformType::IVec2,
            "ivec3" => UniformType::IVec3,
            "ivec4" => UniformType::IVec4,
            "uint" => UniformType::UInt,
            "uvec2" => UniformType::UVec2,
            "uvec3" => UniformType::UVec3,
            "uvec4" => UniformType::UVec4,
            "bool" => UniformType::Bool,
            "bvec2" => UniformType::BVec2,
            "bvec3" => UniformType::BVec3,
            "bvec4" => UniformType::BVec4,
            "mat2" => UniformType::Mat2,
            "mat3" => UniformType::Mat3,
            "mat4" => UniformType::Mat4,
            "sampler2D" => UniformType::Sampler2D,
            "sampler3D" => UniformType::Sampler3D,
            "samplerCube" => UniformType::SamplerCube,
            "sampler2DArray" => UniformType::Sampler2DArray,
            "sampler2DShadow" => UniformType::Sampler2DShadow,
            "isampler2D" => UniformType::ISampler2D,
            "usampler2D" => UniformType::USampler2D,
            _ => return None,
        };
        Some(ty)
    }
}

/// One entry of the program's active uniform list
///
/// Array uniforms are reported once, with `name` ending in `[0]` and
/// `size` set to the element count, like the host API does.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveUniform {
    pub name: String,
    pub uniform_type: UniformType,
    pub size: u32,
    /// Index of the owning uniform block, `None` for default-block uniforms
    pub block_index: Option<u32>,
}

/// One entry of the program's active uniform block list (extended tier)
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveUniformBlock {
    pub name: String,
    pub index: u32,
    pub data_size: u32,
}

/// Payload of a uniform upload
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformData<'a> {
    /// `components` floats per element
    Float { components: u8, values: &'a [f32] },
    /// `components` ints per element (also bools and sampler units)
    Int { components: u8, values: &'a [i32] },
    /// `components` uints per element (extended tier)
    UInt { components: u8, values: &'a [u32] },
    /// Column-major `dim`x`dim` matrices
    Matrix { dim: u8, values: &'a [f32] },
}

/// The context-based graphics API, as seen by the GPU layer
pub trait GlContext {
    // ===== INFO =====

    fn tier(&self) -> ContextTier;
    fn supported_extensions(&self) -> Vec<String>;
    fn get_parameter_i32(&self, pname: u32) -> i32;
    fn get_parameter_f32(&self, pname: u32) -> f32;
    fn get_error(&self) -> u32;
    fn is_context_lost(&self) -> bool;
    fn drawing_buffer_size(&self) -> (u32, u32);
    fn flush(&self);

    // ===== BUFFERS =====

    fn create_buffer(&self) -> Option<NativeBuffer>;
    fn delete_buffer(&self, buffer: NativeBuffer);
    fn bind_buffer(&self, target: u32, buffer: Option<NativeBuffer>);
    fn bind_buffer_range(
        &self,
        target: u32,
        index: u32,
        buffer: Option<NativeBuffer>,
        offset: u32,
        size: u32,
    );
    fn buffer_data_size(&self, target: u32, size: u32, usage: u32);
    fn buffer_sub_data(&self, target: u32, offset: u32, data: &[u8]);
    fn get_buffer_sub_data(&self, target: u32, offset: u32, dst: &mut [u8]);

    // ===== TEXTURES =====

    fn create_texture(&self) -> Option<NativeTexture>;
    fn delete_texture(&self, texture: NativeTexture);
    fn active_texture(&self, unit: u32);
    fn bind_texture(&self, target: u32, texture: Option<NativeTexture>);
    fn tex_parameter_i32(&self, target: u32, pname: u32, value: i32);
    fn tex_parameter_f32(&self, target: u32, pname: u32, value: f32);
    fn pixel_store_i32(&self, pname: u32, value: i32);
    fn tex_storage_2d(&self, target: u32, levels: u32, internal_format: u32, width: u32, height: u32);
    fn tex_storage_3d(
        &self,
        target: u32,
        levels: u32,
        internal_format: u32,
        width: u32,
        height: u32,
        depth: u32,
    );
    #[allow(clippy::too_many_arguments)]
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
    );
    #[allow(clippy::too_many_arguments)]
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
    );
    #[allow(clippy::too_many_arguments)]
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
    );
    #[allow(clippy::too_many_arguments)]
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
    );
    fn compressed_tex_image_2d(
        &self,
        target: u32,
        level: u32,
        internal_format: u32,
        width: u32,
        height: u32,
        data: &[u8],
    );
    #[allow(clippy::too_many_arguments)]
    fn compressed_tex_image_3d(
        &self,
        target: u32,
        level: u32,
        internal_format: u32,
        width: u32,
        height: u32,
        depth: u32,
        data: &[u8],
    );
    #[allow(clippy::too_many_arguments)]
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
    );
    #[allow(clippy::too_many_arguments)]
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
    );
    #[allow(clippy::too_many_arguments)]
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
    );
    fn generate_mipmap(&self, target: u32);

    // ===== SAMPLERS (extended) =====

    fn create_sampler(&self) -> Option<NativeSampler>;
    fn delete_sampler(&self, sampler: NativeSampler);
    fn bind_sampler(&self, unit: u32, sampler: Option<NativeSampler>);
    fn sampler_parameter_i32(&self, sampler: NativeSampler, pname: u32, value: i32);
    fn sampler_parameter_f32(&self, sampler: NativeSampler, pname: u32, value: f32);

    // ===== FRAMEBUFFERS =====

    fn create_framebuffer(&self) -> Option<NativeFramebuffer>;
    fn delete_framebuffer(&self, framebuffer: NativeFramebuffer);
    fn bind_framebuffer(&self, target: u32, framebuffer: Option<NativeFramebuffer>);
    fn framebuffer_texture_2d(
        &self,
        target: u32,
        attachment: u32,
        texture_target: u32,
        texture: Option<NativeTexture>,
        level: u32,
    );
    fn framebuffer_texture_layer(
        &self,
        target: u32,
        attachment: u32,
        texture: Option<NativeTexture>,
        level: u32,
        layer: u32,
    );
    fn framebuffer_renderbuffer(
        &self,
        target: u32,
        attachment: u32,
        renderbuffer_target: u32,
        renderbuffer: Option<NativeRenderbuffer>,
    );
    fn check_framebuffer_status(&self, target: u32) -> u32;
    fn draw_buffers(&self, buffers: &[u32]);
    fn read_buffer(&self, source: u32);
    #[allow(clippy::too_many_arguments)]
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
    );
    fn create_renderbuffer(&self) -> Option<NativeRenderbuffer>;
    fn delete_renderbuffer(&self, renderbuffer: NativeRenderbuffer);
    fn bind_renderbuffer(&self, target: u32, renderbuffer: Option<NativeRenderbuffer>);
    fn renderbuffer_storage(&self, target: u32, internal_format: u32, width: u32, height: u32);
    fn renderbuffer_storage_multisample(
        &self,
        target: u32,
        samples: u32,
        internal_format: u32,
        width: u32,
        height: u32,
    );

    // ===== SHADERS & PROGRAMS =====

    fn create_shader(&self, shader_type: u32) -> Option<NativeShader>;
    fn delete_shader(&self, shader: NativeShader);
    fn shader_source(&self, shader: NativeShader, source: &str);
    fn compile_shader(&self, shader: NativeShader);
    fn get_shader_compile_status(&self, shader: NativeShader) -> bool;
    fn get_shader_info_log(&self, shader: NativeShader) -> String;
    fn create_program(&self) -> Option<NativeProgram>;
    fn delete_program(&self, program: NativeProgram);
    fn attach_shader(&self, program: NativeProgram, shader: NativeShader);
    fn detach_shader(&self, program: NativeProgram, shader: NativeShader);
    fn bind_attrib_location(&self, program: NativeProgram, index: u32, name: &str);
    fn link_program(&self, program: NativeProgram);
    fn get_program_link_status(&self, program: NativeProgram) -> bool;
    fn get_program_info_log(&self, program: NativeProgram) -> String;
    fn use_program(&self, program: Option<NativeProgram>);
    fn get_active_uniforms(&self, program: NativeProgram) -> Vec<ActiveUniform>;
    fn get_uniform_location(&self, program: NativeProgram, name: &str) -> Option<NativeUniformLocation>;
    fn get_active_uniform_blocks(&self, program: NativeProgram) -> Vec<ActiveUniformBlock>;
    fn uniform_block_binding(&self, program: NativeProgram, block_index: u32, binding: u32);
    fn uniform(&self, location: NativeUniformLocation, data: UniformData<'_>);

    // ===== VERTEX INPUT =====

    fn create_vertex_array(&self) -> Option<NativeVertexArray>;
    fn delete_vertex_array(&self, vertex_array: NativeVertexArray);
    fn bind_vertex_array(&self, vertex_array: Option<NativeVertexArray>);
    fn enable_vertex_attrib_array(&self, index: u32);
    fn disable_vertex_attrib_array(&self, index: u32);
    #[allow(clippy::too_many_arguments)]
    fn vertex_attrib_pointer_f32(
        &self,
        index: u32,
        size: u32,
        ty: u32,
        normalized: bool,
        stride: u32,
        offset: u32,
    );
    fn vertex_attrib_pointer_i32(&self, index: u32, size: u32, ty: u32, stride: u32, offset: u32);
    fn vertex_attrib_divisor(&self, index: u32, divisor: u32);

    // ===== FIXED-FUNCTION STATE =====

    fn enable(&self, capability: u32);
    fn disable(&self, capability: u32);
    fn blend_func_separate(&self, src_rgb: u32, dst_rgb: u32, src_alpha: u32, dst_alpha: u32);
    fn blend_equation_separate(&self, mode_rgb: u32, mode_alpha: u32);
    fn blend_color(&self, r: f32, g: f32, b: f32, a: f32);
    fn color_mask(&self, r: bool, g: bool, b: bool, a: bool);
    fn depth_mask(&self, enabled: bool);
    fn depth_func(&self, func: u32);
    fn polygon_offset(&self, factor: f32, units: f32);
    fn cull_face(&self, mode: u32);
    fn front_face(&self, mode: u32);
    fn stencil_func_separate(&self, face: u32, func: u32, reference: i32, mask: u32);
    fn stencil_op_separate(&self, face: u32, fail: u32, depth_fail: u32, pass: u32);
    fn stencil_mask_separate(&self, face: u32, mask: u32);
    fn viewport(&self, x: i32, y: i32, width: i32, height: i32);
    fn scissor(&self, x: i32, y: i32, width: i32, height: i32);
    fn clear_color(&self, r: f32, g: f32, b: f32, a: f32);
    fn clear_depth(&self, depth: f32);
    fn clear_stencil(&self, stencil: i32);
    fn clear(&self, mask: u32);

    // ===== DRAW =====

    fn draw_arrays(&self, mode: u32, first: u32, count: u32);
    fn draw_arrays_instanced(&self, mode: u32, first: u32, count: u32, instances: u32);
    fn draw_elements(&self, mode: u32, count: u32, index_type: u32, offset: u32);
    fn draw_elements_instanced(
        &self,
        mode: u32,
        count: u32,
        index_type: u32,
        offset: u32,
        instances: u32,
    );

    // ===== READBACK =====

    #[allow(clippy::too_many_arguments)]
    fn read_pixels(
        &self,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        format: u32,
        ty: u32,
        dst: &mut [u8],
    );
    /// Read into the buffer bound to `PIXEL_PACK_BUFFER` (extended tier)
    #[allow(clippy::too_many_arguments)]
    fn read_pixels_to_pack_buffer(
        &self,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        format: u32,
        ty: u32,
        offset: u32,
    );

    // ===== SYNC (extended) =====

    fn fence_sync(&self, condition: u32, flags: u32) -> Option<NativeFence>;
    fn client_wait_sync(&self, fence: NativeFence, flags: u32, timeout_ns: u64) -> u32;
    fn delete_sync(&self, fence: NativeFence);
}
