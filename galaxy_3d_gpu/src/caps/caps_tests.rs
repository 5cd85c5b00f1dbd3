//! Unit tests for the capability probe
//!
//! The probe is pure: every test builds tables from a tier, an extension
//! list and a limits record, no context involved.

use crate::caps::{
    ext, memory_cost_of, CompressionFamily, ContextLimits, DeviceCaps, ExtensionSet, SampleKind,
    TextureFormat,
};
use crate::context::{gl, ContextTier};

fn extended_limits() -> ContextLimits {
    ContextLimits {
        max_texture_size: 4096,
        max_3d_texture_size: 256,
        max_array_layers: 256,
        max_draw_buffers: 4,
        max_color_attachments: 4,
        max_samples: 4,
        max_uniform_block_size: 16384,
        max_uniform_buffer_bindings: 24,
        uniform_buffer_offset_alignment: 256,
        ..ContextLimits::default()
    }
}

fn legacy_bare() -> DeviceCaps {
    DeviceCaps::probe(ContextTier::Legacy, &ExtensionSet::default(), &ContextLimits::default())
}

fn extended_bare() -> DeviceCaps {
    DeviceCaps::probe(ContextTier::Extended, &ExtensionSet::default(), &extended_limits())
}

// ============================================================================
// FORMAT TABLE
// ============================================================================

#[test]
fn test_format_block_uncompressed() {
    assert_eq!(TextureFormat::R8_UNORM.bytes_per_pixel(), Some(1));
    assert_eq!(TextureFormat::R8G8B8A8_UNORM.bytes_per_pixel(), Some(4));
    assert_eq!(TextureFormat::R16G16B16A16_SFLOAT.bytes_per_pixel(), Some(8));
    assert_eq!(TextureFormat::R32G32B32A32_SFLOAT.bytes_per_pixel(), Some(16));
    assert_eq!(TextureFormat::D24_UNORM_S8_UINT.bytes_per_pixel(), Some(4));
    assert_eq!(TextureFormat::D32_FLOAT_S8_UINT.bytes_per_pixel(), Some(8));
}

#[test]
fn test_format_block_compressed() {
    let bc1 = TextureFormat::BC1_RGBA_UNORM.block();
    assert_eq!((bc1.width, bc1.height, bc1.bytes), (4, 4, 8));
    let astc = TextureFormat::ASTC_12X12_UNORM.block();
    assert_eq!((astc.width, astc.height, astc.bytes), (12, 12, 16));
    assert_eq!(TextureFormat::BC7_RGBA_UNORM.bytes_per_pixel(), None);
}

#[test]
fn test_format_classification() {
    assert_eq!(TextureFormat::R8_UINT.sample_kind(), SampleKind::Integer);
    assert_eq!(TextureFormat::R16_SFLOAT.sample_kind(), SampleKind::HalfFloat);
    assert_eq!(TextureFormat::R32_SFLOAT.sample_kind(), SampleKind::Float);
    assert_eq!(TextureFormat::D16_UNORM.sample_kind(), SampleKind::Depth);
    assert_eq!(TextureFormat::ETC2_RGB8_UNORM.sample_kind(), SampleKind::Compressed);
    assert_eq!(TextureFormat::R8G8B8A8_SRGB.sample_kind(), SampleKind::Normalized);
    assert!(TextureFormat::D24_UNORM_S8_UINT.has_stencil());
    assert!(!TextureFormat::D24_UNORM.has_stencil());
    assert!(TextureFormat::BC7_RGBA_SRGB.is_srgb());
}

#[test]
fn test_image_size_rounds_to_blocks() {
    assert_eq!(TextureFormat::R8G8B8A8_UNORM.image_size(3, 5), 60);
    // 5x5 BC1 -> 2x2 blocks of 8 bytes
    assert_eq!(TextureFormat::BC1_RGBA_UNORM.image_size(5, 5), 32);
    // 1x1 still costs a whole block
    assert_eq!(TextureFormat::ASTC_8X8_UNORM.image_size(1, 1), 16);
}

#[test]
fn test_all_lists_every_format_once() {
    let mut seen = std::collections::HashSet::new();
    for format in TextureFormat::ALL {
        assert!(seen.insert(*format), "{:?} listed twice", format);
    }
    assert_eq!(seen.len(), 56);
}

// ============================================================================
// TIER DIFFERENCES
// ============================================================================

#[test]
fn test_legacy_bare_tables() {
    let caps = legacy_bare();
    assert!(!caps.is_extended());
    assert!(!caps.texture.npot);
    assert!(!caps.texture.texture_3d);
    assert!(!caps.texture.immutable_storage);
    assert!(!caps.shader.uniform_blocks);
    assert!(!caps.misc.fences);
    assert!(!caps.misc.instancing);
    assert_eq!(caps.framebuffer.max_draw_buffers, 1);
    assert!(!caps.framebuffer.multisample);

    let formats: Vec<_> = caps.texture.supported_formats().collect();
    assert_eq!(formats, vec![TextureFormat::R8G8B8A8_UNORM]);

    let rgba = caps.texture.format(TextureFormat::R8G8B8A8_UNORM).unwrap();
    assert_eq!(rgba.gl_internal_format, gl::RGBA);
    assert_eq!(rgba.gl_format, gl::RGBA);
    assert_eq!(rgba.gl_type, gl::UNSIGNED_BYTE);
}

#[test]
fn test_legacy_extensions_enable_formats() {
    let extensions = ExtensionSet::new([
        ext::OES_TEXTURE_FLOAT,
        ext::OES_TEXTURE_HALF_FLOAT,
        ext::OES_TEXTURE_HALF_FLOAT_LINEAR,
        ext::WEBGL_DEPTH_TEXTURE,
        ext::EXT_SRGB,
        ext::ANGLE_INSTANCED_ARRAYS,
        ext::OES_VERTEX_ARRAY_OBJECT,
        ext::WEBGL_DRAW_BUFFERS,
    ]);
    let limits = ContextLimits {
        max_draw_buffers: 4,
        max_color_attachments: 4,
        ..ContextLimits::default()
    };
    let caps = DeviceCaps::probe(ContextTier::Legacy, &extensions, &limits);

    let float = caps.texture.format(TextureFormat::R32G32B32A32_SFLOAT).unwrap();
    assert_eq!(float.gl_type, gl::FLOAT);
    assert!(!float.filterable);
    assert!(!float.renderable);

    let half = caps.texture.format(TextureFormat::R16G16B16A16_SFLOAT).unwrap();
    assert_eq!(half.gl_type, gl::HALF_FLOAT_OES);
    assert!(half.filterable);

    let depth = caps.texture.format(TextureFormat::D24_UNORM_S8_UINT).unwrap();
    assert_eq!(depth.gl_format, gl::DEPTH_STENCIL);
    assert!(depth.renderable);

    assert!(caps.texture.supports(TextureFormat::R8G8B8A8_SRGB));
    assert!(caps.misc.instancing);
    assert!(caps.misc.vertex_array_objects);
    assert_eq!(caps.framebuffer.max_draw_buffers, 4);
    // Still no R/RG or integer formats on this tier
    assert!(!caps.texture.supports(TextureFormat::R8_UNORM));
    assert!(!caps.texture.supports(TextureFormat::R32_UINT));
}

#[test]
fn test_extended_bare_tables() {
    let caps = extended_bare();
    assert!(caps.texture.npot);
    assert!(caps.texture.texture_3d);
    assert!(caps.texture.texture_array);
    assert!(caps.shader.uniform_blocks);
    assert_eq!(caps.shader.uniform_buffer_offset_alignment, 256);
    assert!(caps.misc.fences);
    assert!(caps.misc.async_readback);
    assert!(caps.framebuffer.multisample);
    assert_eq!(caps.framebuffer.max_samples, 4);

    let rgba = caps.texture.format(TextureFormat::R8G8B8A8_UNORM).unwrap();
    assert_eq!(rgba.gl_internal_format, gl::RGBA8);

    let float = caps.texture.format(TextureFormat::R32G32B32A32_SFLOAT).unwrap();
    assert!(!float.renderable);
    assert!(!float.filterable);

    let int = caps.texture.format(TextureFormat::R32_UINT).unwrap();
    assert!(!int.filterable);
    assert!(int.renderable);

    let snorm = caps.texture.format(TextureFormat::R8G8B8A8_SNORM).unwrap();
    assert!(!snorm.renderable);
}

#[test]
fn test_extended_color_buffer_float() {
    let extensions = ExtensionSet::new([ext::EXT_COLOR_BUFFER_FLOAT, ext::OES_TEXTURE_FLOAT_LINEAR]);
    let caps = DeviceCaps::probe(ContextTier::Extended, &extensions, &extended_limits());
    let float = caps.texture.format(TextureFormat::R32G32B32A32_SFLOAT).unwrap();
    assert!(float.renderable);
    assert!(float.filterable);
    assert!(caps.texture.color_buffer_half_float);
}

#[test]
fn test_compression_families_gate_formats() {
    let extensions = ExtensionSet::new([ext::WEBGL_COMPRESSED_TEXTURE_S3TC, ext::WEBGL_COMPRESSED_TEXTURE_ASTC]);
    let caps = DeviceCaps::probe(ContextTier::Legacy, &extensions, &ContextLimits::default());

    assert!(caps.texture.compression.contains(&CompressionFamily::S3tc));
    assert!(caps.texture.compression.contains(&CompressionFamily::Astc));
    assert!(caps.texture.supports(TextureFormat::BC3_RGBA_UNORM));
    assert!(caps.texture.supports(TextureFormat::ASTC_6X6_UNORM));
    assert!(!caps.texture.supports(TextureFormat::BC1_RGBA_SRGB));
    assert!(!caps.texture.supports(TextureFormat::ETC2_RGBA8_UNORM));

    let bc3 = caps.texture.format(TextureFormat::BC3_RGBA_UNORM).unwrap();
    assert!(bc3.compressed);
    assert!(!bc3.renderable);
    assert_eq!(bc3.gl_internal_format, gl::COMPRESSED_RGBA_S3TC_DXT5_EXT);
}

#[test]
fn test_anisotropy_from_limits() {
    let extensions = ExtensionSet::new([ext::EXT_TEXTURE_FILTER_ANISOTROPIC]);
    let limits = ContextLimits {
        max_anisotropy: 16.0,
        ..ContextLimits::default()
    };
    let caps = DeviceCaps::probe(ContextTier::Legacy, &extensions, &limits);
    assert!(caps.texture.anisotropy);
    assert_eq!(caps.texture.max_anisotropy, 16.0);
    assert!(!legacy_bare().texture.anisotropy);
}

// ============================================================================
// MEMORY COST
// ============================================================================

#[test]
fn test_memory_cost_is_linear_for_every_supported_format() {
    let extensions = ExtensionSet::new([
        ext::WEBGL_COMPRESSED_TEXTURE_S3TC,
        ext::WEBGL_COMPRESSED_TEXTURE_S3TC_SRGB,
        ext::EXT_TEXTURE_COMPRESSION_RGTC,
        ext::EXT_TEXTURE_COMPRESSION_BPTC,
        ext::WEBGL_COMPRESSED_TEXTURE_ETC,
        ext::WEBGL_COMPRESSED_TEXTURE_ASTC,
    ]);
    let caps = DeviceCaps::probe(ContextTier::Extended, &extensions, &extended_limits());

    for format in caps.texture.supported_formats() {
        let block = format.block();
        let unit = (block.width * block.height) as u64;
        let one = caps.memory_cost(format, unit).unwrap();
        assert_eq!(one, block.bytes as u64, "{:?}", format);
        for k in [2u64, 7, 64, 1000] {
            assert_eq!(caps.memory_cost(format, unit * k), Some(one * k), "{:?}", format);
        }
    }
}

#[test]
fn test_memory_cost_documented_values() {
    let caps = extended_bare();
    assert_eq!(caps.memory_cost(TextureFormat::R8G8B8A8_UNORM, 256 * 256), Some(262_144));
    assert_eq!(caps.memory_cost(TextureFormat::D24_UNORM_S8_UINT, 100), Some(400));
    assert_eq!(caps.memory_cost(TextureFormat::D32_FLOAT_S8_UINT, 100), Some(800));
    assert_eq!(caps.memory_cost(TextureFormat::R16G16B16A16_SFLOAT, 10), Some(80));
}

#[test]
fn test_memory_cost_absent_format() {
    let caps = legacy_bare();
    assert_eq!(caps.memory_cost(TextureFormat::R8_UNORM, 16), None);
    assert_eq!(caps.memory_cost(TextureFormat::BC1_RGBA_UNORM, 16), None);
}

#[test]
fn test_memory_cost_of_block_format_record() {
    let extensions = ExtensionSet::new([ext::WEBGL_COMPRESSED_TEXTURE_S3TC]);
    let caps = DeviceCaps::probe(ContextTier::Legacy, &extensions, &ContextLimits::default());
    let bc1 = caps.texture.format(TextureFormat::BC1_RGBA_UNORM).unwrap();
    // 64x64 pixels = 256 blocks of 8 bytes
    assert_eq!(memory_cost_of(bc1, 64 * 64), 2048);
}
