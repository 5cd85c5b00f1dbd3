//! Integration tests for pixel and buffer readback
//!
//! Run with: cargo test --test readback_integration_tests


use galaxy_3d_gpu::galaxy3d::caps::TextureFormat;
use galaxy_3d_gpu::galaxy3d::resource::{BufferDesc, BufferUsage, TextureDesc, TextureRegion};
use galaxy_3d_gpu::galaxy3d::Error;
use gpu_test_utils::*;

const RED: [f32; 4] = [1.0, 0.0, 0.0, 1.0];

#[test]
fn test_extended_read_goes_through_a_fence() {
    let t = extended();
    t.device.clear_frame_buffer(Some(RED), None, None).unwrap();

    let mut pixels = vec![0u8; 2 * 2 * 4];
    pollster::block_on(t.device.read_pixels(4, 4, 2, 2, &mut pixels)).unwrap();

    assert_eq!(pixels, solid_rgba(2, 2, [255, 0, 0, 255]));
    assert_eq!(t.context.call_count("fence_sync"), 1);
    assert_eq!(t.context.call_count("read_pixels_to_pack_buffer"), 1);
    assert!(t.context.call_count("client_wait_sync") >= 1);
    // staging buffer and fence are gone
    assert_eq!(t.context.object_counts().fences, 0);
}

#[test]
fn test_legacy_read_is_synchronous() {
    let t = legacy();
    t.device.clear_frame_buffer(Some([0.0, 0.0, 1.0, 1.0]), None, None).unwrap();

    let mut pixels = vec![0u8; 4];
    pollster::block_on(t.device.read_pixels(0, 0, 1, 1, &mut pixels)).unwrap();

    assert_eq!(pixels, vec![0, 0, 255, 255]);
    assert_eq!(t.context.call_count("fence_sync"), 0);
    assert_eq!(t.context.call_count("read_pixels"), 1);
}

#[test]
fn test_read_validates_region_and_destination() {
    let t = extended();
    let mut small = vec![0u8; 3];
    let result = pollster::block_on(t.device.read_pixels(0, 0, 1, 1, &mut small));
    assert!(matches!(result, Err(Error::InvalidUsage(_))));

    let mut pixels = vec![0u8; 16];
    let result = pollster::block_on(t.device.read_pixels(WIDTH - 1, 0, 2, 2, &mut pixels));
    assert!(matches!(result, Err(Error::InvalidUsage(_))));
}

#[test]
fn test_read_while_lost_fails() {
    let t = extended();
    t.context.lose_context();
    t.device.poll_context();

    let mut pixels = vec![0u8; 4];
    let result = pollster::block_on(t.device.read_pixels(0, 0, 1, 1, &mut pixels));
    assert_eq!(result, Err(Error::ContextLost));
}

#[test]
fn test_texture_readback_after_region_write() {
    for t in [legacy(), extended()] {
        let texture = t
            .device
            .create_texture_2d(&TextureDesc::new(TextureFormat::R8G8B8A8_UNORM, 4, 4).with_mip_levels(1))
            .unwrap();
        texture.update(0, &solid_rgba(4, 4, [0, 0, 0, 255])).unwrap();
        texture
            .write_region(&TextureRegion::new(2, 2, 2, 2), &solid_rgba(2, 2, [0, 255, 0, 255]))
            .unwrap();

        let mut corner = vec![0u8; 2 * 2 * 4];
        pollster::block_on(texture.read_pixels(2, 2, 2, 2, 0, 0, &mut corner)).unwrap();
        assert_eq!(corner, solid_rgba(2, 2, [0, 255, 0, 255]));

        let mut origin = vec![0u8; 4];
        pollster::block_on(texture.read_pixels(0, 0, 1, 1, 0, 0, &mut origin)).unwrap();
        assert_eq!(origin, vec![0, 0, 0, 255]);
    }
}

#[test]
fn test_legacy_mip_level_read_is_unsupported() {
    let t = legacy();
    let texture = t
        .device
        .create_texture_2d(&TextureDesc::new(TextureFormat::R8G8B8A8_UNORM, 8, 8))
        .unwrap();
    texture.update(0, &solid_rgba(8, 8, [255, 255, 255, 255])).unwrap();
    texture.generate_mipmaps().unwrap();

    let mut pixels = vec![0u8; 4];
    let result = pollster::block_on(texture.read_pixels(0, 0, 1, 1, 0, 1, &mut pixels));
    assert!(matches!(result, Err(Error::Unsupported(_))));
}

#[test]
fn test_extended_mip_level_read() {
    let t = extended();
    let texture = t
        .device
        .create_texture_2d(&TextureDesc::new(TextureFormat::R8G8B8A8_UNORM, 8, 8))
        .unwrap();
    texture.update(0, &solid_rgba(8, 8, [255, 255, 255, 255])).unwrap();
    texture.generate_mipmaps().unwrap();
    assert_eq!(texture.mip_levels(), 4);

    let mut pixels = vec![0u8; 4 * 4 * 4];
    pollster::block_on(texture.read_pixels(0, 0, 4, 4, 0, 1, &mut pixels)).unwrap();
    assert_eq!(pixels, solid_rgba(4, 4, [255, 255, 255, 255]));
}

#[test]
fn test_read_into_pack_buffer_stays_on_the_gpu() {
    let t = extended();
    t.device.clear_frame_buffer(Some(RED), None, None).unwrap();
    let buffer = t
        .device
        .create_buffer(&BufferDesc::new(BufferUsage::PACK | BufferUsage::READ, 64))
        .unwrap();

    pollster::block_on(t.device.read_pixels_to_buffer(0, 0, 2, 2, &buffer, 16)).unwrap();
    assert_eq!(t.context.call_count("read_pixels_to_pack_buffer"), 1);
    assert_eq!(t.context.call_count("fence_sync"), 0);

    let bytes = pollster::block_on(buffer.get_buffer_sub_data(16, Some(16))).unwrap();
    assert_eq!(bytes, solid_rgba(2, 2, [255, 0, 0, 255]));
    // the read waited on a fence
    assert_eq!(t.context.call_count("fence_sync"), 1);
}

#[test]
fn test_read_into_managed_buffer_updates_the_shadow() {
    let t = legacy();
    t.device.clear_frame_buffer(Some(RED), None, None).unwrap();
    let buffer = t
        .device
        .create_buffer(&BufferDesc::new(BufferUsage::VERTEX | BufferUsage::MANAGED, 8))
        .unwrap();

    pollster::block_on(t.device.read_pixels_to_buffer(0, 0, 1, 1, &buffer, 4)).unwrap();
    assert_eq!(buffer.shadow(), Some(vec![0, 0, 0, 0, 255, 0, 0, 255]));
    let native = t.context.buffer_data(buffer.native().unwrap()).unwrap();
    assert_eq!(native, vec![0, 0, 0, 0, 255, 0, 0, 255]);
}

#[test]
fn test_buffer_readback_paths() {
    let t = extended();
    let shadowed = t
        .device
        .create_buffer(&BufferDesc::new(BufferUsage::UNIFORM | BufferUsage::MANAGED, 8))
        .unwrap();
    shadowed.buffer_sub_data(0, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
    let bytes = pollster::block_on(shadowed.get_buffer_sub_data(2, Some(3))).unwrap();
    assert_eq!(bytes, vec![3, 4, 5]);
    // served from the shadow
    assert_eq!(t.context.call_count("get_buffer_sub_data"), 0);

    let native = t.device.create_buffer(&BufferDesc::new(BufferUsage::VERTEX, 4)).unwrap();
    native.buffer_sub_data(0, &[9, 8, 7, 6]).unwrap();
    let bytes = pollster::block_on(native.get_buffer_sub_data(1, None)).unwrap();
    assert_eq!(bytes, vec![8, 7, 6]);
    assert_eq!(t.context.call_count("get_buffer_sub_data"), 1);

    let overflow = pollster::block_on(native.get_buffer_sub_data(2, Some(4)));
    assert!(matches!(overflow, Err(Error::InvalidUsage(_))));
}

#[test]
fn test_buffer_round_trip_survives_loss_only_with_a_shadow() {
    use galaxy_3d_gpu::galaxy3d::context::ContextTier;

    let pattern: Vec<u8> = (0..64u8).collect();
    for tier in [ContextTier::Legacy, ContextTier::Extended] {
        for managed in [false, true] {
            let t = tier_device(tier);
            let usage = if managed {
                BufferUsage::VERTEX | BufferUsage::MANAGED
            } else {
                BufferUsage::VERTEX
            };
            let buffer = t.device.create_buffer(&BufferDesc::new(usage, 64)).unwrap();
            buffer.buffer_sub_data(0, &pattern).unwrap();
            assert_eq!(pollster::block_on(buffer.get_buffer_sub_data(0, None)).unwrap(), pattern);

            t.context.lose_context();
            t.device.poll_context();
            t.context.restore_context();
            t.device.poll_context();

            let after = pollster::block_on(buffer.get_buffer_sub_data(0, None)).unwrap();
            assert_eq!(after == pattern, managed, "{:?} tier, managed {}", tier, managed);
        }
    }
}
