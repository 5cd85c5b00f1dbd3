/// Capability probe
///
/// Inspects the context once (at device creation and again after every
/// restore) and produces immutable tables consulted by every other part of
/// the layer. The probe itself is a pure function of the tier, the
/// extension list and the numeric limits, so it can be exercised without a
/// context.

mod format;

pub use format::{CompressionFamily, FormatBlock, SampleKind, TextureFormat};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::context::{gl, ContextTier, GlContext};

// ===== EXTENSIONS =====

/// Extension names the probe understands
pub mod ext {
    pub const ANGLE_INSTANCED_ARRAYS: &str = "ANGLE_instanced_arrays";
    pub const OES_VERTEX_ARRAY_OBJECT: &str = "OES_vertex_array_object";
    pub const OES_ELEMENT_INDEX_UINT: &str = "OES_element_index_uint";
    pub const OES_TEXTURE_FLOAT: &str = "OES_texture_float";
    pub const OES_TEXTURE_FLOAT_LINEAR: &str = "OES_texture_float_linear";
    pub const OES_TEXTURE_HALF_FLOAT: &str = "OES_texture_half_float";
    pub const OES_TEXTURE_HALF_FLOAT_LINEAR: &str = "OES_texture_half_float_linear";
    pub const OES_STANDARD_DERIVATIVES: &str = "OES_standard_derivatives";
    pub const OES_FBO_RENDER_MIPMAP: &str = "OES_fbo_render_mipmap";
    pub const WEBGL_DEPTH_TEXTURE: &str = "WEBGL_depth_texture";
    pub const WEBGL_DRAW_BUFFERS: &str = "WEBGL_draw_buffers";
    pub const WEBGL_COLOR_BUFFER_FLOAT: &str = "WEBGL_color_buffer_float";
    pub const EXT_COLOR_BUFFER_FLOAT: &str = "EXT_color_buffer_float";
    pub const EXT_COLOR_BUFFER_HALF_FLOAT: &str = "EXT_color_buffer_half_float";
    pub const EXT_FLOAT_BLEND: &str = "EXT_float_blend";
    pub const EXT_SRGB: &str = "EXT_sRGB";
    pub const EXT_BLEND_MINMAX: &str = "EXT_blend_minmax";
    pub const EXT_FRAG_DEPTH: &str = "EXT_frag_depth";
    pub const EXT_SHADER_TEXTURE_LOD: &str = "EXT_shader_texture_lod";
    pub const EXT_TEXTURE_FILTER_ANISOTROPIC: &str = "EXT_texture_filter_anisotropic";
    pub const WEBGL_COMPRESSED_TEXTURE_S3TC: &str = "WEBGL_compressed_texture_s3tc";
    pub const WEBGL_COMPRESSED_TEXTURE_S3TC_SRGB: &str = "WEBGL_compressed_texture_s3tc_srgb";
    pub const EXT_TEXTURE_COMPRESSION_RGTC: &str = "EXT_texture_compression_rgtc";
    pub const EXT_TEXTURE_COMPRESSION_BPTC: &str = "EXT_texture_compression_bptc";
    pub const WEBGL_COMPRESSED_TEXTURE_ETC: &str = "WEBGL_compressed_texture_etc";
    pub const WEBGL_COMPRESSED_TEXTURE_ASTC: &str = "WEBGL_compressed_texture_astc";
}

/// Set of extension names reported by the context
#[derive(Debug, Clone, Default)]
pub struct ExtensionSet {
    names: FxHashSet<String>,
}

impl ExtensionSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

// ===== LIMITS =====

/// Numeric limits read from the context
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContextLimits {
    pub max_texture_size: u32,
    pub max_cube_map_size: u32,
    pub max_3d_texture_size: u32,
    pub max_array_layers: u32,
    pub max_renderbuffer_size: u32,
    pub max_draw_buffers: u32,
    pub max_color_attachments: u32,
    pub max_samples: u32,
    pub max_combined_texture_units: u32,
    pub max_fragment_texture_units: u32,
    pub max_vertex_texture_units: u32,
    pub max_vertex_attribs: u32,
    pub max_vertex_uniform_vectors: u32,
    pub max_fragment_uniform_vectors: u32,
    pub max_uniform_block_size: u32,
    pub max_uniform_buffer_bindings: u32,
    pub uniform_buffer_offset_alignment: u32,
    pub max_anisotropy: f32,
}

impl ContextLimits {
    /// Read every limit the probe uses. Tier-only limits read as 0 on the
    /// legacy tier.
    pub fn query(gl: &dyn GlContext, extensions: &ExtensionSet) -> Self {
        let extended = gl.tier().is_extended();
        let read = |pname: u32| gl.get_parameter_i32(pname).max(0) as u32;
        let read_extended = |pname: u32| if extended { read(pname) } else { 0 };
        let draw_buffers = extended || extensions.has(ext::WEBGL_DRAW_BUFFERS);

        Self {
            max_texture_size: read(gl::MAX_TEXTURE_SIZE),
            max_cube_map_size: read(gl::MAX_CUBE_MAP_TEXTURE_SIZE),
            max_3d_texture_size: read_extended(gl::MAX_3D_TEXTURE_SIZE),
            max_array_layers: read_extended(gl::MAX_ARRAY_TEXTURE_LAYERS),
            max_renderbuffer_size: read(gl::MAX_RENDERBUFFER_SIZE),
            max_draw_buffers: if draw_buffers { read(gl::MAX_DRAW_BUFFERS) } else { 1 },
            max_color_attachments: if draw_buffers { read(gl::MAX_COLOR_ATTACHMENTS) } else { 1 },
            max_samples: read_extended(gl::MAX_SAMPLES),
            max_combined_texture_units: read(gl::MAX_COMBINED_TEXTURE_IMAGE_UNITS),
            max_fragment_texture_units: read(gl::MAX_TEXTURE_IMAGE_UNITS),
            max_vertex_texture_units: read(gl::MAX_VERTEX_TEXTURE_IMAGE_UNITS),
            max_vertex_attribs: read(gl::MAX_VERTEX_ATTRIBS),
            max_vertex_uniform_vectors: read(gl::MAX_VERTEX_UNIFORM_VECTORS),
            max_fragment_uniform_vectors: read(gl::MAX_FRAGMENT_UNIFORM_VECTORS),
            max_uniform_block_size: read_extended(gl::MAX_UNIFORM_BLOCK_SIZE),
            max_uniform_buffer_bindings: read_extended(gl::MAX_UNIFORM_BUFFER_BINDINGS),
            uniform_buffer_offset_alignment: read_extended(gl::UNIFORM_BUFFER_OFFSET_ALIGNMENT),
            max_anisotropy: if extensions.has(ext::EXT_TEXTURE_FILTER_ANISOTROPIC) {
                gl.get_parameter_f32(gl::MAX_TEXTURE_MAX_ANISOTROPY_EXT)
            } else {
                1.0
            },
        }
    }
}

impl Default for ContextLimits {
    /// Minimums guaranteed by the legacy tier
    fn default() -> Self {
        Self {
            max_texture_size: 2048,
            max_cube_map_size: 2048,
            max_3d_texture_size: 0,
            max_array_layers: 0,
            max_renderbuffer_size: 2048,
            max_draw_buffers: 1,
            max_color_attachments: 1,
            max_samples: 0,
            max_combined_texture_units: 8,
            max_fragment_texture_units: 8,
            max_vertex_texture_units: 0,
            max_vertex_attribs: 8,
            max_vertex_uniform_vectors: 128,
            max_fragment_uniform_vectors: 16,
            max_uniform_block_size: 0,
            max_uniform_buffer_bindings: 0,
            uniform_buffer_offset_alignment: 0,
            max_anisotropy: 1.0,
        }
    }
}

// ===== TABLES =====

/// Per-format record: how a logical format maps onto context enums
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatInfo {
    /// Transfer (client data) format
    pub gl_format: u32,
    /// Storage format passed to allocation calls
    pub gl_internal_format: u32,
    /// Accepted transfer type (0 for compressed formats)
    pub gl_type: u32,
    pub filterable: bool,
    pub renderable: bool,
    pub compressed: bool,
    pub block_width: u32,
    pub block_height: u32,
    pub block_bytes: u32,
}

/// Texture-related capabilities
#[derive(Debug, Clone)]
pub struct TextureCaps {
    formats: FxHashMap<TextureFormat, FormatInfo>,
    /// Non-power-of-two textures can mip and repeat
    pub npot: bool,
    pub texture_3d: bool,
    pub texture_array: bool,
    /// Single-call immutable storage allocation
    pub immutable_storage: bool,
    pub depth_texture: bool,
    pub float_texture: bool,
    pub float_linear: bool,
    pub half_float_texture: bool,
    pub half_float_linear: bool,
    pub color_buffer_float: bool,
    pub color_buffer_half_float: bool,
    pub srgb: bool,
    pub anisotropy: bool,
    pub max_anisotropy: f32,
    pub compression: FxHashSet<CompressionFamily>,
    pub max_texture_size: u32,
    pub max_cube_map_size: u32,
    pub max_3d_texture_size: u32,
    pub max_array_layers: u32,
}

impl TextureCaps {
    /// Lookup a format; `None` when the tier/extensions cannot provide it
    pub fn format(&self, format: TextureFormat) -> Option<&FormatInfo> {
        self.formats.get(&format)
    }

    pub fn supports(&self, format: TextureFormat) -> bool {
        self.formats.contains_key(&format)
    }

    pub fn supported_formats(&self) -> impl Iterator<Item = TextureFormat> + '_ {
        TextureFormat::ALL.iter().copied().filter(|f| self.formats.contains_key(f))
    }
}

/// Framebuffer-related capabilities
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FramebufferCaps {
    pub max_draw_buffers: u32,
    pub max_color_attachments: u32,
    pub max_samples: u32,
    pub max_renderbuffer_size: u32,
    /// Multisampled renderbuffers + blit resolve
    pub multisample: bool,
    /// More than one color attachment per draw
    pub draw_buffers: bool,
    /// Non-zero mip levels can be attached directly
    pub render_to_mip_level: bool,
    pub float_blend: bool,
}

/// Shader-related capabilities
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShaderCaps {
    pub uniform_blocks: bool,
    pub max_uniform_block_size: u32,
    pub max_uniform_buffer_bindings: u32,
    pub uniform_buffer_offset_alignment: u32,
    pub max_vertex_uniform_vectors: u32,
    pub max_fragment_uniform_vectors: u32,
    pub max_texture_units: u32,
    pub standard_derivatives: bool,
    pub frag_depth: bool,
    pub texture_lod: bool,
}

/// Everything else
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MiscCaps {
    pub instancing: bool,
    pub vertex_array_objects: bool,
    pub element_index_uint: bool,
    pub fences: bool,
    pub sampler_objects: bool,
    pub min_max_blending: bool,
    pub max_vertex_attributes: u32,
    /// Pixel-pack buffers + fences for non-blocking readback
    pub async_readback: bool,
}

/// Immutable capability tables for one context
#[derive(Debug, Clone)]
pub struct DeviceCaps {
    pub tier: ContextTier,
    pub texture: TextureCaps,
    pub framebuffer: FramebufferCaps,
    pub shader: ShaderCaps,
    pub misc: MiscCaps,
}

impl DeviceCaps {
    /// Read the context and build the tables
    pub fn query(gl: &dyn GlContext) -> Self {
        let extensions = ExtensionSet::new(gl.supported_extensions());
        let limits = ContextLimits::query(gl, &extensions);
        Self::probe(gl.tier(), &extensions, &limits)
    }

    /// Build the tables from tier, extensions and limits alone
    pub fn probe(tier: ContextTier, extensions: &ExtensionSet, limits: &ContextLimits) -> Self {
        let extended = tier.is_extended();
        let has = |name: &str| extensions.has(name);

        let mut compression = FxHashSet::default();
        for (family, name) in [
            (CompressionFamily::S3tc, ext::WEBGL_COMPRESSED_TEXTURE_S3TC),
            (CompressionFamily::S3tcSrgb, ext::WEBGL_COMPRESSED_TEXTURE_S3TC_SRGB),
            (CompressionFamily::Rgtc, ext::EXT_TEXTURE_COMPRESSION_RGTC),
            (CompressionFamily::Bptc, ext::EXT_TEXTURE_COMPRESSION_BPTC),
            (CompressionFamily::Etc2, ext::WEBGL_COMPRESSED_TEXTURE_ETC),
            (CompressionFamily::Astc, ext::WEBGL_COMPRESSED_TEXTURE_ASTC),
        ] {
            if has(name) {
                compression.insert(family);
            }
        }

        let color_buffer_float = if extended {
            has(ext::EXT_COLOR_BUFFER_FLOAT)
        } else {
            has(ext::WEBGL_COLOR_BUFFER_FLOAT)
        };
        let color_buffer_half_float = if extended {
            has(ext::EXT_COLOR_BUFFER_FLOAT) || has(ext::EXT_COLOR_BUFFER_HALF_FLOAT)
        } else {
            has(ext::EXT_COLOR_BUFFER_HALF_FLOAT)
        };

        let mut texture = TextureCaps {
            formats: FxHashMap::default(),
            npot: extended,
            texture_3d: extended,
            texture_array: extended,
            immutable_storage: extended,
            depth_texture: extended || has(ext::WEBGL_DEPTH_TEXTURE),
            float_texture: extended || has(ext::OES_TEXTURE_FLOAT),
            float_linear: has(ext::OES_TEXTURE_FLOAT_LINEAR),
            half_float_texture: extended || has(ext::OES_TEXTURE_HALF_FLOAT),
            half_float_linear: extended || has(ext::OES_TEXTURE_HALF_FLOAT_LINEAR),
            color_buffer_float,
            color_buffer_half_float,
            srgb: extended || has(ext::EXT_SRGB),
            anisotropy: has(ext::EXT_TEXTURE_FILTER_ANISOTROPIC),
            max_anisotropy: limits.max_anisotropy.max(1.0),
            compression,
            max_texture_size: limits.max_texture_size,
            max_cube_map_size: limits.max_cube_map_size,
            max_3d_texture_size: limits.max_3d_texture_size,
            max_array_layers: limits.max_array_layers,
        };

        for &format in TextureFormat::ALL {
            let entry = if extended {
                describe_extended(format, &texture)
            } else {
                describe_legacy(format, &texture)
            };
            if let Some(info) = entry {
                texture.formats.insert(format, info);
            }
        }

        let draw_buffers = extended || has(ext::WEBGL_DRAW_BUFFERS);
        let framebuffer = FramebufferCaps {
            max_draw_buffers: if draw_buffers { limits.max_draw_buffers.max(1) } else { 1 },
            max_color_attachments: if draw_buffers { limits.max_color_attachments.max(1) } else { 1 },
            max_samples: if extended { limits.max_samples } else { 0 },
            max_renderbuffer_size: limits.max_renderbuffer_size,
            multisample: extended && limits.max_samples > 1,
            draw_buffers,
            render_to_mip_level: extended || has(ext::OES_FBO_RENDER_MIPMAP),
            float_blend: has(ext::EXT_FLOAT_BLEND),
        };

        let shader = ShaderCaps {
            uniform_blocks: extended,
            max_uniform_block_size: if extended { limits.max_uniform_block_size } else { 0 },
            max_uniform_buffer_bindings: if extended { limits.max_uniform_buffer_bindings } else { 0 },
            uniform_buffer_offset_alignment: if extended {
                limits.uniform_buffer_offset_alignment.max(1)
            } else {
                0
            },
            max_vertex_uniform_vectors: limits.max_vertex_uniform_vectors,
            max_fragment_uniform_vectors: limits.max_fragment_uniform_vectors,
            max_texture_units: limits.max_combined_texture_units,
            standard_derivatives: extended || has(ext::OES_STANDARD_DERIVATIVES),
            frag_depth: extended || has(ext::EXT_FRAG_DEPTH),
            texture_lod: extended || has(ext::EXT_SHADER_TEXTURE_LOD),
        };

        let misc = MiscCaps {
            instancing: extended || has(ext::ANGLE_INSTANCED_ARRAYS),
            vertex_array_objects: extended || has(ext::OES_VERTEX_ARRAY_OBJECT),
            element_index_uint: extended || has(ext::OES_ELEMENT_INDEX_UINT),
            fences: extended,
            sampler_objects: extended,
            min_max_blending: extended || has(ext::EXT_BLEND_MINMAX),
            max_vertex_attributes: limits.max_vertex_attribs,
            async_readback: extended,
        };

        Self {
            tier,
            texture,
            framebuffer,
            shader,
            misc,
        }
    }

    pub fn is_extended(&self) -> bool {
        self.tier.is_extended()
    }

    /// Estimated storage cost in bytes of `pixel_count` pixels of `format`
    ///
    /// Linear in `pixel_count`. Block formats cost
    /// `pixel_count * block_bytes / (block_width * block_height)`.
    /// Returns `None` for formats absent from the tables.
    pub fn memory_cost(&self, format: TextureFormat, pixel_count: u64) -> Option<u64> {
        let info = self.texture.format(format)?;
        Some(memory_cost_of(info, pixel_count))
    }
}

/// Memory cost from a format record
pub fn memory_cost_of(info: &FormatInfo, pixel_count: u64) -> u64 {
    let block_pixels = (info.block_width * info.block_height) as u64;
    pixel_count * info.block_bytes as u64 / block_pixels
}

// ===== PER-TIER FORMAT MAPPING =====

fn uncompressed(
    format: TextureFormat,
    gl_format: u32,
    gl_internal_format: u32,
    gl_type: u32,
    filterable: bool,
    renderable: bool,
) -> FormatInfo {
    let block = format.block();
    FormatInfo {
        gl_format,
        gl_internal_format,
        gl_type,
        filterable,
        renderable,
        compressed: false,
        block_width: block.width,
        block_height: block.height,
        block_bytes: block.bytes,
    }
}

fn compressed(format: TextureFormat, caps: &TextureCaps) -> Option<FormatInfo> {
    use TextureFormat::*;
    let family = format.compression_family()?;
    if !caps.compression.contains(&family) {
        return None;
    }
    let internal = match format {
        BC1_RGBA_UNORM => gl::COMPRESSED_RGBA_S3TC_DXT1_EXT,
        BC2_RGBA_UNORM => gl::COMPRESSED_RGBA_S3TC_DXT3_EXT,
        BC3_RGBA_UNORM => gl::COMPRESSED_RGBA_S3TC_DXT5_EXT,
        BC1_RGBA_SRGB => gl::COMPRESSED_SRGB_ALPHA_S3TC_DXT1_EXT,
        BC2_RGBA_SRGB => gl::COMPRESSED_SRGB_ALPHA_S3TC_DXT3_EXT,
        BC3_RGBA_SRGB => gl::COMPRESSED_SRGB_ALPHA_S3TC_DXT5_EXT,
        BC4_R_UNORM => gl::COMPRESSED_RED_RGTC1_EXT,
        BC4_R_SNORM => gl::COMPRESSED_SIGNED_RED_RGTC1_EXT,
        BC5_RG_UNORM => gl::COMPRESSED_RED_GREEN_RGTC2_EXT,
        BC5_RG_SNORM => gl::COMPRESSED_SIGNED_RED_GREEN_RGTC2_EXT,
        BC6H_RGB_UFLOAT => gl::COMPRESSED_RGB_BPTC_UNSIGNED_FLOAT_EXT,
        BC6H_RGB_SFLOAT => gl::COMPRESSED_RGB_BPTC_SIGNED_FLOAT_EXT,
        BC7_RGBA_UNORM => gl::COMPRESSED_RGBA_BPTC_UNORM_EXT,
        BC7_RGBA_SRGB => gl::COMPRESSED_SRGB_ALPHA_BPTC_UNORM_EXT,
        ETC2_RGB8_UNORM => gl::COMPRESSED_RGB8_ETC2,
        ETC2_RGB8_SRGB => gl::COMPRESSED_SRGB8_ETC2,
        ETC2_RGB8A1_UNORM => gl::COMPRESSED_RGB8_PUNCHTHROUGH_ALPHA1_ETC2,
        ETC2_RGBA8_UNORM => gl::COMPRESSED_RGBA8_ETC2_EAC,
        ETC2_RGBA8_SRGB => gl::COMPRESSED_SRGB8_ALPHA8_ETC2_EAC,
        ASTC_4X4_UNORM => gl::COMPRESSED_RGBA_ASTC_4X4_KHR,
        ASTC_5X5_UNORM => gl::COMPRESSED_RGBA_ASTC_5X5_KHR,
        ASTC_6X6_UNORM => gl::COMPRESSED_RGBA_ASTC_6X6_KHR,
        ASTC_8X8_UNORM => gl::COMPRESSED_RGBA_ASTC_8X8_KHR,
        ASTC_10X10_UNORM => gl::COMPRESSED_RGBA_ASTC_10X10_KHR,
        ASTC_12X12_UNORM => gl::COMPRESSED_RGBA_ASTC_12X12_KHR,
        _ => return None,
    };
    let block = format.block();
    Some(FormatInfo {
        gl_format: internal,
        gl_internal_format: internal,
        gl_type: 0,
        filterable: true,
        renderable: false,
        compressed: true,
        block_width: block.width,
        block_height: block.height,
        block_bytes: block.bytes,
    })
}

/// Legacy tier: unsized formats, most features behind extensions
fn describe_legacy(format: TextureFormat, caps: &TextureCaps) -> Option<FormatInfo> {
    use TextureFormat::*;
    if format.is_compressed() {
        return compressed(format, caps);
    }
    let info = match format {
        R8G8B8A8_UNORM => uncompressed(format, gl::RGBA, gl::RGBA, gl::UNSIGNED_BYTE, true, true),
        R8G8B8A8_SRGB if caps.srgb => uncompressed(
            format,
            gl::SRGB_ALPHA_EXT,
            gl::SRGB_ALPHA_EXT,
            gl::UNSIGNED_BYTE,
            true,
            true,
        ),
        R16G16B16A16_SFLOAT if caps.half_float_texture => uncompressed(
            format,
            gl::RGBA,
            gl::RGBA,
            gl::HALF_FLOAT_OES,
            caps.half_float_linear,
            caps.color_buffer_half_float,
        ),
        R32G32B32A32_SFLOAT if caps.float_texture => uncompressed(
            format,
            gl::RGBA,
            gl::RGBA,
            gl::FLOAT,
            caps.float_linear,
            caps.color_buffer_float,
        ),
        D16_UNORM if caps.depth_texture => uncompressed(
            format,
            gl::DEPTH_COMPONENT,
            gl::DEPTH_COMPONENT,
            gl::UNSIGNED_SHORT,
            false,
            true,
        ),
        D24_UNORM if caps.depth_texture => uncompressed(
            format,
            gl::DEPTH_COMPONENT,
            gl::DEPTH_COMPONENT,
            gl::UNSIGNED_INT,
            false,
            true,
        ),
        D24_UNORM_S8_UINT if caps.depth_texture => uncompressed(
            format,
            gl::DEPTH_STENCIL,
            gl::DEPTH_STENCIL,
            gl::UNSIGNED_INT_24_8,
            false,
            true,
        ),
        _ => return None,
    };
    Some(info)
}

/// Extended tier: sized internal formats
fn describe_extended(format: TextureFormat, caps: &TextureCaps) -> Option<FormatInfo> {
    use TextureFormat::*;
    if format.is_compressed() {
        return compressed(format, caps);
    }
    let half_rt = caps.color_buffer_half_float;
    let float_rt = caps.color_buffer_float;
    let (gl_format, internal, ty, filterable, renderable) = match format {
        R8_UNORM => (gl::RED, gl::R8, gl::UNSIGNED_BYTE, true, true),
        R8_SNORM => (gl::RED, gl::R8_SNORM, gl::BYTE, true, false),
        R8_UINT => (gl::RED_INTEGER, gl::R8UI, gl::UNSIGNED_BYTE, false, true),
        R8_SINT => (gl::RED_INTEGER, gl::R8I, gl::BYTE, false, true),
        R8G8_UNORM => (gl::RG, gl::RG8, gl::UNSIGNED_BYTE, true, true),
        R8G8_SNORM => (gl::RG, gl::RG8_SNORM, gl::BYTE, true, false),
        R8G8_UINT => (gl::RG_INTEGER, gl::RG8UI, gl::UNSIGNED_BYTE, false, true),
        R8G8_SINT => (gl::RG_INTEGER, gl::RG8I, gl::BYTE, false, true),
        R8G8B8A8_UNORM => (gl::RGBA, gl::RGBA8, gl::UNSIGNED_BYTE, true, true),
        R8G8B8A8_SRGB => (gl::RGBA, gl::SRGB8_ALPHA8, gl::UNSIGNED_BYTE, true, true),
        R8G8B8A8_SNORM => (gl::RGBA, gl::RGBA8_SNORM, gl::BYTE, true, false),
        R8G8B8A8_UINT => (gl::RGBA_INTEGER, gl::RGBA8UI, gl::UNSIGNED_BYTE, false, true),
        R8G8B8A8_SINT => (gl::RGBA_INTEGER, gl::RGBA8I, gl::BYTE, false, true),
        R16_UINT => (gl::RED_INTEGER, gl::R16UI, gl::UNSIGNED_SHORT, false, true),
        R16_SINT => (gl::RED_INTEGER, gl::R16I, gl::SHORT, false, true),
        R16_SFLOAT => (gl::RED, gl::R16F, gl::HALF_FLOAT, true, half_rt),
        R16G16_SFLOAT => (gl::RG, gl::RG16F, gl::HALF_FLOAT, true, half_rt),
        R16G16B16A16_UINT => (gl::RGBA_INTEGER, gl::RGBA16UI, gl::UNSIGNED_SHORT, false, true),
        R16G16B16A16_SFLOAT => (gl::RGBA, gl::RGBA16F, gl::HALF_FLOAT, true, half_rt),
        R32_UINT => (gl::RED_INTEGER, gl::R32UI, gl::UNSIGNED_INT, false, true),
        R32_SINT => (gl::RED_INTEGER, gl::R32I, gl::INT, false, true),
        R32_SFLOAT => (gl::RED, gl::R32F, gl::FLOAT, caps.float_linear, float_rt),
        R32G32_SFLOAT => (gl::RG, gl::RG32F, gl::FLOAT, caps.float_linear, float_rt),
        R32G32B32A32_UINT => (gl::RGBA_INTEGER, gl::RGBA32UI, gl::UNSIGNED_INT, false, true),
        R32G32B32A32_SFLOAT => (gl::RGBA, gl::RGBA32F, gl::FLOAT, caps.float_linear, float_rt),
        B10G11R11_UFLOAT => (
            gl::RGB,
            gl::R11F_G11F_B10F,
            gl::UNSIGNED_INT_10F_11F_11F_REV,
            true,
            float_rt,
        ),
        D16_UNORM => (gl::DEPTH_COMPONENT, gl::DEPTH_COMPONENT16, gl::UNSIGNED_SHORT, false, true),
        D24_UNORM => (gl::DEPTH_COMPONENT, gl::DEPTH_COMPONENT24, gl::UNSIGNED_INT, false, true),
        D32_FLOAT => (gl::DEPTH_COMPONENT, gl::DEPTH_COMPONENT32F, gl::FLOAT, false, true),
        D24_UNORM_S8_UINT => (gl::DEPTH_STENCIL, gl::DEPTH24_STENCIL8, gl::UNSIGNED_INT_24_8, false, true),
        D32_FLOAT_S8_UINT => (
            gl::DEPTH_STENCIL,
            gl::DEPTH32F_STENCIL8,
            gl::FLOAT_32_UNSIGNED_INT_24_8_REV,
            false,
            true,
        ),
        _ => return None,
    };
    Some(uncompressed(format, gl_format, internal, ty, filterable, renderable))
}

#[cfg(test)]
#[path = "caps_tests.rs"]
mod tests;
