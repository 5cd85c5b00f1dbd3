//! Unit tests for texture/mod.rs and texture/kind.rs

use std::rc::Rc;

use crate::caps::{ext, TextureFormat};
use crate::context::mock_context::{mock_shared, MockContext};
use crate::context::ContextTier;
use crate::device::shared::DeviceShared;
use crate::error::Error;
use crate::object::GpuObject;
use crate::sampler::SamplerOptions;
use crate::texture::*;

fn rgba(width: u32, height: u32) -> TextureDesc {
    TextureDesc::new(TextureFormat::R8G8B8A8_UNORM, width, height)
}

fn create(
    device: &Rc<DeviceShared>,
    kind: TextureKind,
    desc: TextureDesc,
) -> Rc<Texture> {
    Texture::new(device, kind, &desc, None).unwrap()
}

fn extended() -> (Rc<MockContext>, Rc<DeviceShared>) {
    mock_shared(ContextTier::Extended, &[])
}

fn legacy() -> (Rc<MockContext>, Rc<DeviceShared>) {
    mock_shared(ContextTier::Legacy, &[])
}

// ============================================================================
// MIP CHAIN RULES
// ============================================================================

#[test]
fn test_full_mip_count() {
    assert_eq!(full_mip_count(1, 1, 1), 1);
    assert_eq!(full_mip_count(256, 256, 1), 9);
    assert_eq!(full_mip_count(300, 200, 1), 9);
    assert_eq!(full_mip_count(4, 4, 64), 7);
}

#[test]
fn test_legacy_npot_falls_back_to_single_level() {
    let chain = compute_mip_levels(
        ContextTier::Legacy,
        TextureKind::Tex2D,
        300,
        200,
        1,
        0,
        TextureFlags::empty(),
    );
    assert_eq!(chain, MipChain { levels: 1, legacy_fallback: true });

    let chain = compute_mip_levels(
        ContextTier::Extended,
        TextureKind::Tex2D,
        300,
        200,
        1,
        0,
        TextureFlags::empty(),
    );
    assert_eq!(chain.levels, 9);
    assert!(!chain.legacy_fallback);
}

#[test]
fn test_requested_mips_are_clamped() {
    let chain = |requested| {
        compute_mip_levels(
            ContextTier::Extended,
            TextureKind::Tex2D,
            64,
            64,
            1,
            requested,
            TextureFlags::empty(),
        )
        .levels
    };
    assert_eq!(chain(3), 3);
    assert_eq!(chain(40), 7);
    assert_eq!(chain(0), 7);
}

#[test]
fn test_array_layers_do_not_shrink_along_chain() {
    assert_eq!(TextureKind::Tex2DArray.level_depth(6, 3), 6);
    assert_eq!(TextureKind::Tex3D.level_depth(8, 2), 2);
    assert_eq!(TextureKind::Tex3D.level_depth(8, 5), 1);
    // 3D chain counts depth, array chain does not
    let array = compute_mip_levels(
        ContextTier::Extended,
        TextureKind::Tex2DArray,
        4,
        4,
        64,
        0,
        TextureFlags::empty(),
    );
    assert_eq!(array.levels, 3);
}

#[test]
fn test_video_and_no_mipmap_flag_give_one_level() {
    let video = compute_mip_levels(
        ContextTier::Extended,
        TextureKind::Video,
        256,
        256,
        1,
        0,
        TextureFlags::empty(),
    );
    assert_eq!(video.levels, 1);
    let flagged = compute_mip_levels(
        ContextTier::Extended,
        TextureKind::Tex2D,
        256,
        256,
        1,
        0,
        TextureFlags::NO_MIPMAP,
    );
    assert_eq!(flagged.levels, 1);
}

// ============================================================================
// CREATION
// ============================================================================

#[test]
fn test_allocation_is_lazy() {
    let (gl, device) = extended();
    let texture = create(&device, TextureKind::Tex2D, rgba(64, 64));
    assert_eq!(gl.count("create_texture"), 0);
    assert!(!texture.is_allocated());
    assert_eq!(texture.memory_cost(), 0);

    texture.update(0, &vec![0u8; 64 * 64 * 4]).unwrap();
    assert_eq!(gl.count("create_texture"), 1);
    assert_eq!(gl.count("tex_storage_2d"), 1);
    assert!(texture.is_allocated());
}

#[test]
fn test_legacy_allocates_every_level() {
    let (gl, device) = legacy();
    let texture = create(&device, TextureKind::Tex2D, rgba(16, 16));
    assert_eq!(texture.mip_levels(), 5);
    texture.generate_mipmaps().unwrap();
    assert_eq!(gl.count("tex_image_2d"), 5);
    assert_eq!(gl.count("tex_storage_2d"), 0);
    assert_eq!(gl.count("generate_mipmap"), 1);
}

#[test]
fn test_memory_cost_sums_levels_and_faces() {
    let (_gl, device) = extended();
    let texture = create(&device, TextureKind::Tex2D, rgba(4, 4));
    texture.generate_mipmaps().unwrap();
    // 4x4 + 2x2 + 1x1 pixels at 4 bytes
    assert_eq!(texture.memory_cost(), (16 + 4 + 1) * 4);
    assert_eq!(device.memory(), texture.memory_cost());

    let cube = create(&device, TextureKind::Cube, rgba(4, 4).with_mip_levels(1));
    cube.update(0, &vec![0u8; 16 * 4 * 6]).unwrap();
    assert_eq!(cube.memory_cost(), 16 * 4 * 6);

    drop(texture);
    assert_eq!(device.memory(), 16 * 4 * 6);
}

#[test]
fn test_legacy_npot_texture_is_flagged() {
    let (_gl, device) = legacy();
    let texture = create(&device, TextureKind::Tex2D, rgba(300, 200));
    assert!(texture.is_legacy_fallback());
    assert_eq!(texture.mip_levels(), 1);
}

#[test]
fn test_layered_kinds_need_extended_tier() {
    let (_gl, device) = legacy();
    let result = Texture::new(&device, TextureKind::Tex2DArray, &rgba(4, 4).with_depth(2), None);
    assert!(matches!(result, Err(Error::Unsupported(_))));
    let result = Texture::new(&device, TextureKind::Tex3D, &rgba(4, 4).with_depth(2), None);
    assert!(matches!(result, Err(Error::Unsupported(_))));
}

#[test]
fn test_creation_validation() {
    let (_gl, device) = extended();
    let writable = rgba(4, 4).with_flags(TextureFlags::WRITABLE);
    assert!(matches!(
        Texture::new(&device, TextureKind::Tex2D, &writable, None),
        Err(Error::Unsupported(_))
    ));
    assert!(matches!(
        Texture::new(&device, TextureKind::Tex2D, &rgba(0, 4), None),
        Err(Error::InvalidUsage(_))
    ));
    assert!(matches!(
        Texture::new(&device, TextureKind::Tex2D, &rgba(8192, 4), None),
        Err(Error::InvalidUsage(_))
    ));
    assert!(matches!(
        Texture::new(&device, TextureKind::Cube, &rgba(8, 4), None),
        Err(Error::InvalidUsage(_))
    ));
    let depth_3d = TextureDesc::new(TextureFormat::D24_UNORM, 4, 4).with_depth(4);
    assert!(matches!(
        Texture::new(&device, TextureKind::Tex3D, &depth_3d, None),
        Err(Error::Unsupported(_))
    ));
}

#[test]
fn test_compressed_format_requires_extension() {
    let desc = TextureDesc::new(TextureFormat::BC1_RGBA_UNORM, 8, 8);
    let (_gl, device) = legacy();
    assert!(matches!(
        Texture::new(&device, TextureKind::Tex2D, &desc, None),
        Err(Error::Unsupported(_))
    ));

    let (gl, device) = mock_shared(ContextTier::Legacy, &[ext::WEBGL_COMPRESSED_TEXTURE_S3TC]);
    let texture = create(&device, TextureKind::Tex2D, desc);
    // one 4x4 block, 8 bytes
    texture
        .write_region(&TextureRegion::new(0, 0, 4, 4).at_level(1), &[0u8; 8])
        .unwrap();
    // legacy storage is zero-filled level by level
    assert_eq!(gl.count("compressed_tex_image_2d"), 4);
    assert_eq!(gl.count("compressed_tex_sub_image_2d"), 1);
}

// ============================================================================
// REALLOCATION
// ============================================================================

#[test]
fn test_resize_defers_old_handle_deletion() {
    let (gl, device) = extended();
    let texture = create(&device, TextureKind::Tex2D, rgba(8, 8));
    texture.generate_mipmaps().unwrap();
    let first = texture.native();
    let generation = texture.generation();

    texture.resize(16, 16, 1).unwrap();
    assert_eq!(texture.mip_levels(), 5);
    texture.generate_mipmaps().unwrap();
    assert_ne!(texture.native(), first);
    assert_eq!(texture.generation(), generation + 1);
    assert_eq!(gl.count("delete_texture"), 0);
    assert_eq!(device.pending_deletions(), 1);

    assert_eq!(device.drain_deferred(), 1);
    assert_eq!(gl.count("delete_texture"), 1);
}

#[test]
fn test_same_description_does_not_reallocate() {
    let (gl, device) = extended();
    let texture = create(&device, TextureKind::Tex2D, rgba(8, 8));
    texture.update(0, &[0u8; 256]).unwrap();
    texture.update(0, &[1u8; 256]).unwrap();
    texture.resize(8, 8, 1).unwrap();
    texture.update(0, &[2u8; 256]).unwrap();
    assert_eq!(gl.count("create_texture"), 1);
    assert_eq!(gl.count("tex_sub_image_2d"), 3);
}

#[test]
fn test_dispose_then_use_reloads() {
    let (gl, device) = extended();
    let texture = create(&device, TextureKind::Tex2D, rgba(4, 4));
    texture.update(0, &[0u8; 64]).unwrap();
    texture.dispose();
    assert!(texture.is_disposed());
    assert!(texture.native_ids().is_empty());
    assert_eq!(gl.count("delete_texture"), 1);
    assert_eq!(device.memory(), 0);

    texture.update(0, &[0u8; 64]).unwrap();
    assert!(!texture.is_disposed());
    assert_eq!(texture.cid(), 1);
    assert_eq!(gl.count("create_texture"), 2);
}

// ============================================================================
// UPLOADS
// ============================================================================

#[test]
fn test_write_region_bounds() {
    let (_gl, device) = extended();
    let texture = create(&device, TextureKind::Tex2D, rgba(8, 8));
    let too_wide = TextureRegion::new(4, 0, 8, 1);
    assert!(matches!(
        texture.write_region(&too_wide, &[0u8; 32]),
        Err(Error::InvalidUsage(_))
    ));
    let short = TextureRegion::new(0, 0, 2, 2);
    assert!(matches!(
        texture.write_region(&short, &[0u8; 15]),
        Err(Error::InvalidUsage(_))
    ));
    let bad_level = TextureRegion::new(0, 0, 1, 1).at_level(4);
    assert!(matches!(
        texture.write_region(&bad_level, &[0u8; 4]),
        Err(Error::InvalidUsage(_))
    ));
    let wrapping = TextureRegion::new(u32::MAX, 0, 1, 1);
    assert!(matches!(
        texture.write_region(&wrapping, &[0u8; 4]),
        Err(Error::InvalidUsage(_))
    ));
}

#[test]
fn test_cube_update_writes_six_faces() {
    let (gl, device) = extended();
    let cube = create(&device, TextureKind::Cube, rgba(2, 2).with_mip_levels(1));
    assert!(matches!(cube.update(0, &[0u8; 16]), Err(Error::InvalidUsage(_))));
    cube.update(0, &[0u8; 16 * 6]).unwrap();
    assert_eq!(gl.count("tex_sub_image_2d"), 6);

    let typed = TextureCube::from_texture(cube);
    typed.update_face(3, 0, &[0u8; 16]).unwrap();
    assert_eq!(gl.count("tex_sub_image_2d"), 7);
}

#[test]
fn test_array_layer_update_uses_3d_upload() {
    let (gl, device) = extended();
    let array = Texture2DArray::from_texture(create(
        &device,
        TextureKind::Tex2DArray,
        rgba(4, 4).with_depth(3),
    ));
    array.update_layer(2, 0, &[0u8; 64]).unwrap();
    assert_eq!(gl.count("tex_storage_3d"), 1);
    assert_eq!(gl.count("tex_sub_image_3d"), 1);
    assert!(array.update_layer(3, 0, &[0u8; 64]).is_err());
}

#[test]
fn test_update_from_element_resizes_and_builds_mips() {
    let (gl, device) = extended();
    let texture = create(&device, TextureKind::Tex2D, rgba(4, 4));
    let image = ImageData::solid(16, 8, [255, 0, 0, 255]);
    texture.update_from_element(&image, 0).unwrap();
    assert_eq!((texture.width(), texture.height()), (16, 8));
    assert_eq!(texture.mip_levels(), 5);
    assert_eq!(gl.count("generate_mipmap"), 1);
}

#[test]
fn test_update_from_element_rejects_non_rgba8() {
    let (_gl, device) = extended();
    let desc = TextureDesc::new(TextureFormat::R32_SFLOAT, 4, 4);
    let texture = create(&device, TextureKind::Tex2D, desc);
    let image = ImageData::solid(4, 4, [0, 0, 0, 0]);
    assert!(matches!(
        texture.update_from_element(&image, 0),
        Err(Error::InvalidUsage(_))
    ));
}

#[test]
fn test_generate_mipmaps_skips_non_filterable_formats() {
    // float textures are not filterable without the linear extension
    let (gl, device) = mock_shared(ContextTier::Extended, &[]);
    let desc = TextureDesc::new(TextureFormat::R32G32B32A32_SFLOAT, 8, 8);
    let texture = create(&device, TextureKind::Tex2D, desc);
    texture.generate_mipmaps().unwrap();
    assert_eq!(gl.count("generate_mipmap"), 0);
}

// ============================================================================
// SAMPLING
// ============================================================================

#[test]
fn test_legacy_sampling_parameters_are_cached() {
    let (gl, device) = legacy();
    let texture = create(&device, TextureKind::Tex2D, rgba(4, 4));
    texture.bind_to_unit(0, None).unwrap();
    let after_first = gl.count("tex_parameter_i32");
    assert!(after_first > 0);

    texture.bind_to_unit(1, None).unwrap();
    assert_eq!(gl.count("tex_parameter_i32"), after_first);

    texture.set_sampler_options(SamplerOptions::nearest_clamp());
    texture.bind_to_unit(0, None).unwrap();
    assert!(gl.count("tex_parameter_i32") > after_first);
}

#[test]
fn test_extended_binding_uses_cached_sampler_objects() {
    let (gl, device) = extended();
    let a = create(&device, TextureKind::Tex2D, rgba(4, 4));
    let b = create(&device, TextureKind::Tex2D, rgba(4, 4));
    a.bind_to_unit(0, None).unwrap();
    b.bind_to_unit(1, None).unwrap();
    assert_eq!(gl.count("create_sampler"), 1);
    assert_eq!(gl.count("bind_sampler"), 2);
    assert_eq!(device.sampler_cache_len(), 1);
    device.clear_sampler_cache();
}

// ============================================================================
// VIDEO
// ============================================================================

#[test]
fn test_video_callback_mode_uploads_on_new_frames_only() {
    let (gl, device) = extended();
    let queue = Rc::new(FrameQueue::new(4, 4, true));
    let source: Rc<dyn VideoSource> = queue.clone();
    let video = Texture::new(&device, TextureKind::Video, &rgba(4, 4), Some(source)).unwrap();

    video.frame_begin();
    assert_eq!(gl.count("tex_sub_image_2d"), 0);

    queue.push(ImageData::solid(4, 4, [1, 2, 3, 4]));
    video.frame_begin();
    video.frame_begin();
    assert_eq!(gl.count("tex_sub_image_2d"), 1);
    assert_eq!(gl.count("generate_mipmap"), 0);
    assert!(!video.needs_pump_on_apply());
}

#[test]
fn test_video_manual_mode_pumps_on_demand() {
    let (gl, device) = extended();
    let queue = Rc::new(FrameQueue::new(4, 4, false));
    let source: Rc<dyn VideoSource> = queue.clone();
    let video = TextureVideo::from_texture(
        Texture::new(&device, TextureKind::Video, &rgba(4, 4), Some(source)).unwrap(),
    );
    assert!(video.needs_pump_on_apply());
    assert!(!video.pump().unwrap());

    queue.push(ImageData::solid(8, 8, [0, 0, 0, 255]));
    video.frame_begin();
    assert_eq!(gl.count("tex_sub_image_2d"), 0);
    assert!(video.pump().unwrap());
    assert_eq!((video.width(), video.height()), (8, 8));
}

// ============================================================================
// READBACK
// ============================================================================

#[test]
fn test_legacy_readback_uses_throwaway_framebuffer() {
    let (gl, device) = legacy();
    let texture = create(&device, TextureKind::Tex2D, rgba(4, 4));
    let mut dst = vec![0u8; 4 * 4 * 4];
    pollster::block_on(texture.read_pixels(0, 0, 4, 4, 0, 0, &mut dst)).unwrap();
    assert_eq!(gl.count("create_framebuffer"), 1);
    assert_eq!(gl.count("delete_framebuffer"), 1);
    assert_eq!(gl.count("read_pixels"), 1);
    assert_eq!(gl.count("fence_sync"), 0);
}

#[test]
fn test_extended_readback_waits_on_fence() {
    let (gl, device) = extended();
    let texture = create(&device, TextureKind::Tex2D, rgba(4, 4));
    let mut dst = vec![0u8; 64];
    pollster::block_on(texture.read_pixels(0, 0, 4, 4, 0, 0, &mut dst)).unwrap();
    assert_eq!(gl.count("read_pixels_to_pack_buffer"), 1);
    assert_eq!(gl.count("fence_sync"), 1);
    assert_eq!(gl.count("delete_sync"), 1);
}

#[test]
fn test_readback_validation() {
    let (_gl, device) = legacy();
    let texture = create(&device, TextureKind::Tex2D, rgba(4, 4));
    let mut dst = vec![0u8; 64];
    let wrong_face = pollster::block_on(texture.read_pixels(0, 0, 4, 4, 1, 0, &mut dst));
    assert!(matches!(wrong_face, Err(Error::InvalidUsage(_))));
    let too_big = pollster::block_on(texture.read_pixels(2, 2, 4, 4, 0, 0, &mut dst));
    assert!(matches!(too_big, Err(Error::InvalidUsage(_))));
    let wrapping = pollster::block_on(texture.read_pixels(1, u32::MAX, 1, 1, 0, 0, &mut dst));
    assert!(matches!(wrapping, Err(Error::InvalidUsage(_))));
    // no render-to-mip support on a bare legacy context
    let mip = pollster::block_on(texture.read_pixels(0, 0, 1, 1, 0, 1, &mut dst));
    assert!(matches!(mip, Err(Error::Unsupported(_))));
}
