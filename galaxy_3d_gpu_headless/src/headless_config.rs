/// Headless context configuration - tier, extensions, limits and timing
///
/// The presets mirror what typical hosts expose: `legacy()` is a WebGL1-class
/// context with the common extensions, `legacy_minimal()` is the bare tier
/// with none, `extended()` is a WebGL2-class context.

use galaxy_3d_gpu::galaxy3d::caps::{ext, ContextLimits};
use galaxy_3d_gpu::galaxy3d::context::ContextTier;

/// Everything a `HeadlessContext` is built from
#[derive(Debug, Clone)]
pub struct HeadlessConfig {
    pub tier: ContextTier,
    /// Extension names reported to the probe
    pub extensions: Vec<String>,
    pub limits: ContextLimits,
    /// Initial default-framebuffer size in device pixels
    pub drawing_buffer_size: (u32, u32),
    /// Polls a fence stays unsignaled after `fence_sync`
    pub fence_latency: u32,
    /// Print every raised context error
    pub print_errors: bool,
}

const LEGACY_EXTENSIONS: &[&str] = &[
    ext::ANGLE_INSTANCED_ARRAYS,
    ext::OES_VERTEX_ARRAY_OBJECT,
    ext::OES_ELEMENT_INDEX_UINT,
    ext::OES_TEXTURE_FLOAT,
    ext::OES_TEXTURE_HALF_FLOAT,
    ext::OES_STANDARD_DERIVATIVES,
    ext::WEBGL_DEPTH_TEXTURE,
    ext::WEBGL_DRAW_BUFFERS,
    ext::WEBGL_COLOR_BUFFER_FLOAT,
    ext::EXT_COLOR_BUFFER_HALF_FLOAT,
    ext::EXT_BLEND_MINMAX,
    ext::EXT_SHADER_TEXTURE_LOD,
    ext::EXT_SRGB,
    ext::EXT_TEXTURE_FILTER_ANISOTROPIC,
    ext::WEBGL_COMPRESSED_TEXTURE_S3TC,
];

const EXTENDED_EXTENSIONS: &[&str] = &[
    ext::EXT_COLOR_BUFFER_FLOAT,
    ext::OES_TEXTURE_FLOAT_LINEAR,
    ext::EXT_FLOAT_BLEND,
    ext::EXT_TEXTURE_FILTER_ANISOTROPIC,
    ext::WEBGL_COMPRESSED_TEXTURE_S3TC,
    ext::EXT_TEXTURE_COMPRESSION_BPTC,
];

impl HeadlessConfig {
    /// WebGL1-class context with the extensions most hosts expose
    pub fn legacy() -> Self {
        Self {
            extensions: LEGACY_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            limits: ContextLimits {
                max_texture_size: 4096,
                max_cube_map_size: 4096,
                max_renderbuffer_size: 4096,
                max_draw_buffers: 4,
                max_color_attachments: 4,
                max_combined_texture_units: 16,
                max_fragment_texture_units: 16,
                max_vertex_texture_units: 4,
                max_vertex_attribs: 16,
                max_vertex_uniform_vectors: 256,
                max_fragment_uniform_vectors: 224,
                max_anisotropy: 16.0,
                ..ContextLimits::default()
            },
            ..Self::legacy_minimal()
        }
    }

    /// The legacy tier with no extension and the minimum limits
    pub fn legacy_minimal() -> Self {
        Self {
            tier: ContextTier::Legacy,
            extensions: Vec::new(),
            limits: ContextLimits::default(),
            drawing_buffer_size: (300, 150),
            fence_latency: 0,
            print_errors: false,
        }
    }

    /// WebGL2-class context
    pub fn extended() -> Self {
        Self {
            tier: ContextTier::Extended,
            extensions: EXTENDED_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            limits: ContextLimits {
                max_texture_size: 8192,
                max_cube_map_size: 8192,
                max_3d_texture_size: 2048,
                max_array_layers: 256,
                max_renderbuffer_size: 8192,
                max_draw_buffers: 8,
                max_color_attachments: 8,
                max_samples: 4,
                max_combined_texture_units: 32,
                max_fragment_texture_units: 16,
                max_vertex_texture_units: 16,
                max_vertex_attribs: 16,
                max_vertex_uniform_vectors: 256,
                max_fragment_uniform_vectors: 224,
                max_uniform_block_size: 16384,
                max_uniform_buffer_bindings: 24,
                uniform_buffer_offset_alignment: 256,
                max_anisotropy: 16.0,
            },
            drawing_buffer_size: (300, 150),
            fence_latency: 1,
            print_errors: false,
        }
    }

    pub fn with_extension(mut self, name: &str) -> Self {
        if !self.has_extension(name) {
            self.extensions.push(name.to_string());
        }
        self
    }

    pub fn without_extension(mut self, name: &str) -> Self {
        self.extensions.retain(|e| e != name);
        self
    }

    pub fn with_limits(mut self, limits: ContextLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_drawing_buffer_size(mut self, width: u32, height: u32) -> Self {
        self.drawing_buffer_size = (width.max(1), height.max(1));
        self
    }

    pub fn with_fence_latency(mut self, polls: u32) -> Self {
        self.fence_latency = polls;
        self
    }

    pub fn with_print_errors(mut self, enabled: bool) -> Self {
        self.print_errors = enabled;
        self
    }

    pub fn has_extension(&self, name: &str) -> bool {
        self.extensions.iter().any(|e| e == name)
    }
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self::extended()
    }
}
