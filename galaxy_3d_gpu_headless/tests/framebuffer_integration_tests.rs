//! Integration tests for render targets: multisampling, resolve, mip-level
//! emulation and attachment validation
//!
//! Run with: cargo test --test framebuffer_integration_tests


use std::rc::Rc;

use galaxy_3d_gpu::galaxy3d::caps::TextureFormat;
use galaxy_3d_gpu::galaxy3d::context::gl;
use galaxy_3d_gpu::galaxy3d::resource::{FramebufferAttachment, FramebufferDesc, Texture, TextureDesc};
use galaxy_3d_gpu::galaxy3d::{Device, DeviceOptions, Error};
use galaxy_3d_gpu_headless::HeadlessConfig;
use gpu_test_utils::*;

const RED: [f32; 4] = [1.0, 0.0, 0.0, 1.0];
const GREEN: [f32; 4] = [0.0, 1.0, 0.0, 1.0];

fn color_target(device: &Device, size: u32, levels: u32) -> Rc<Texture> {
    let desc = TextureDesc::new(TextureFormat::R8G8B8A8_UNORM, size, size).with_mip_levels(levels);
    device.create_texture_2d(&desc).unwrap().into()
}

fn single(texture: &Rc<Texture>, samples: u32) -> FramebufferDesc {
    FramebufferDesc {
        color_attachments: vec![FramebufferAttachment::new(texture.clone())],
        samples,
        ..Default::default()
    }
}

#[test]
fn test_framebuffer_owns_viewport_while_bound() {
    let t = extended();
    let texture = color_target(&t.device, 16, 1);
    let framebuffer = t.device.create_frame_buffer(single(&texture, 1)).unwrap();

    t.device.set_framebuffer(Some(framebuffer.clone())).unwrap();
    assert_eq!(t.context.fixed_state().viewport, [0, 0, 16, 16]);
    t.device.clear_frame_buffer(Some(GREEN), None, None).unwrap();
    assert_eq!(t.context.pixel(framebuffer.native(), 3, 3), Some(GREEN));

    t.device.set_framebuffer(None).unwrap();
    assert_eq!(t.context.fixed_state().viewport, [0, 0, WIDTH as i32, HEIGHT as i32]);
    let image = t.context.texture_image(texture.native().unwrap(), gl::TEXTURE_2D, 0).unwrap();
    assert_eq!(image.texel(15, 15, 0), GREEN);
}

#[test]
fn test_multisampled_target_resolves_into_texture() {
    let t = extended();
    let texture = color_target(&t.device, 16, 1);
    let framebuffer = t.device.create_frame_buffer(single(&texture, 4)).unwrap();
    assert_eq!(framebuffer.samples(), 4);
    assert!(framebuffer.is_multisampled());

    t.device.set_framebuffer(Some(framebuffer.clone())).unwrap();
    assert_eq!(t.context.call_count("renderbuffer_storage_multisample"), 1);
    t.device.clear_frame_buffer(Some(RED), None, None).unwrap();

    // reading resolves first
    let mut pixels = vec![0u8; 4];
    pollster::block_on(t.device.read_pixels(8, 8, 1, 1, &mut pixels)).unwrap();
    assert_eq!(pixels, vec![255, 0, 0, 255]);
    assert_eq!(t.context.call_count("blit_framebuffer"), 1);

    // nothing drawn since: unbinding does not blit again
    t.device.set_framebuffer(None).unwrap();
    assert_eq!(t.context.call_count("blit_framebuffer"), 1);
    let image = t.context.texture_image(texture.native().unwrap(), gl::TEXTURE_2D, 0).unwrap();
    assert_eq!(image.texel(0, 0, 0), RED);
    assert_eq!(t.context.object_counts().renderbuffers, 1);
}

#[test]
fn test_unbind_resolves_after_drawing() {
    let t = extended();
    let texture = color_target(&t.device, 8, 1);
    let framebuffer = t.device.create_frame_buffer(single(&texture, 4)).unwrap();

    t.device.set_framebuffer(Some(framebuffer)).unwrap();
    t.device.clear_frame_buffer(Some(GREEN), None, None).unwrap();
    t.device.set_framebuffer(None).unwrap();

    assert_eq!(t.context.call_count("blit_framebuffer"), 1);
    let image = t.context.texture_image(texture.native().unwrap(), gl::TEXTURE_2D, 0).unwrap();
    assert_eq!(image.texel(4, 4, 0), GREEN);
}

#[test]
fn test_multisampling_falls_back_to_one_sample() {
    let t = device_with(HeadlessConfig::extended(), DeviceOptions::default().with_msaa(false));
    let texture = color_target(&t.device, 16, 1);
    let framebuffer = t.device.create_frame_buffer(single(&texture, 4)).unwrap();
    assert_eq!(framebuffer.samples(), 1);

    // the legacy tier has no multisampled renderbuffers at all
    let legacy = legacy();
    let texture = color_target(&legacy.device, 16, 1);
    let framebuffer = legacy.device.create_frame_buffer(single(&texture, 4)).unwrap();
    assert_eq!(framebuffer.samples(), 1);

    legacy.device.set_framebuffer(Some(framebuffer)).unwrap();
    assert_eq!(legacy.context.call_count("create_renderbuffer"), 0);
}

#[test]
fn test_legacy_mip_level_is_emulated() {
    let t = legacy();
    let texture = color_target(&t.device, 16, 0);
    assert_eq!(texture.mip_levels(), 5);
    let framebuffer = t
        .device
        .create_frame_buffer(FramebufferDesc {
            color_attachments: vec![FramebufferAttachment::new(texture.clone()).at_level(1)],
            ..Default::default()
        })
        .unwrap();
    assert_eq!((framebuffer.width(), framebuffer.height()), (8, 8));

    t.device.set_framebuffer(Some(framebuffer)).unwrap();
    t.device.clear_frame_buffer(Some(GREEN), None, None).unwrap();
    assert_eq!(t.context.call_count("copy_tex_sub_image_2d"), 0);
    t.device.set_framebuffer(None).unwrap();

    assert_eq!(t.context.call_count("copy_tex_sub_image_2d"), 1);
    let level = t.context.texture_image(texture.native().unwrap(), gl::TEXTURE_2D, 1).unwrap();
    assert_eq!((level.width, level.height), (8, 8));
    assert_eq!(level.texel(7, 7, 0), GREEN);
    // level 0 untouched
    let base = t.context.texture_image(texture.native().unwrap(), gl::TEXTURE_2D, 0).unwrap();
    assert_eq!(base.texel(0, 0, 0), [0.0; 4]);
}

#[test]
fn test_extended_mip_level_attaches_directly() {
    let t = extended();
    let texture = color_target(&t.device, 16, 0);
    let framebuffer = t
        .device
        .create_frame_buffer(FramebufferDesc {
            color_attachments: vec![FramebufferAttachment::new(texture.clone()).at_level(2)],
            ..Default::default()
        })
        .unwrap();

    t.device.set_framebuffer(Some(framebuffer)).unwrap();
    t.device.clear_frame_buffer(Some(RED), None, None).unwrap();
    t.device.set_framebuffer(None).unwrap();

    assert_eq!(t.context.call_count("copy_tex_sub_image_2d"), 0);
    let level = t.context.texture_image(texture.native().unwrap(), gl::TEXTURE_2D, 2).unwrap();
    assert_eq!(level.texel(3, 3, 0), RED);
}

#[test]
fn test_auto_mipmap_after_rendering() {
    let t = extended();
    let texture = color_target(&t.device, 8, 0);
    let framebuffer = t
        .device
        .create_frame_buffer(FramebufferDesc {
            color_attachments: vec![FramebufferAttachment::new(texture.clone()).with_auto_mipmap()],
            ..Default::default()
        })
        .unwrap();

    t.device.set_framebuffer(Some(framebuffer)).unwrap();
    t.device.clear_frame_buffer(Some(RED), None, None).unwrap();
    t.device.set_framebuffer(None).unwrap();

    assert_eq!(t.context.call_count("generate_mipmap"), 1);
    let smallest = t.context.texture_image(texture.native().unwrap(), gl::TEXTURE_2D, 3).unwrap();
    assert_eq!(smallest.texel(0, 0, 0), RED);
}

#[test]
fn test_float_attachment_needs_color_buffer_float() {
    let config = HeadlessConfig::extended().without_extension("EXT_color_buffer_float");
    let t = device_with(config, DeviceOptions::default());
    let desc = TextureDesc::new(TextureFormat::R32G32B32A32_SFLOAT, 4, 4).with_mip_levels(1);
    let texture: Rc<Texture> = t.device.create_texture_2d(&desc).unwrap().into();
    let result = t.device.create_frame_buffer(single(&texture, 1));
    assert!(matches!(result, Err(Error::InvalidUsage(_))));

    let t = extended();
    let texture: Rc<Texture> = t.device.create_texture_2d(&desc).unwrap().into();
    let framebuffer = t.device.create_frame_buffer(single(&texture, 1)).unwrap();
    t.device.set_framebuffer(Some(framebuffer)).unwrap();
    t.device.clear_frame_buffer(Some([0.5, -2.0, 8.0, 1.0]), None, None).unwrap();

    // float targets read back as f32
    let mut pixels = vec![0u8; 16];
    pollster::block_on(t.device.read_pixels(1, 1, 1, 1, &mut pixels)).unwrap();
    assert_eq!(f32s(&pixels), vec![0.5, -2.0, 8.0, 1.0]);
}

#[test]
fn test_attachment_validation() {
    let t = extended();
    let empty = t.device.create_frame_buffer(FramebufferDesc::default());
    assert!(matches!(empty, Err(Error::InvalidUsage(_))));

    let small = color_target(&t.device, 8, 1);
    let large = color_target(&t.device, 16, 1);
    let mismatched = t.device.create_frame_buffer(FramebufferDesc {
        color_attachments: vec![FramebufferAttachment::new(small.clone()), FramebufferAttachment::new(large)],
        ..Default::default()
    });
    assert!(matches!(mismatched, Err(Error::InvalidUsage(_))));

    let out_of_range = t.device.create_frame_buffer(FramebufferDesc {
        color_attachments: vec![FramebufferAttachment::new(small.clone()).at_level(1)],
        ..Default::default()
    });
    assert!(matches!(out_of_range, Err(Error::InvalidUsage(_))));

    // a color format in the depth slot
    let depth_slot = t.device.create_frame_buffer(FramebufferDesc {
        depth_stencil: Some(FramebufferAttachment::new(small)),
        ..Default::default()
    });
    assert!(matches!(depth_slot, Err(Error::InvalidUsage(_))));
}

#[test]
fn test_depth_attachment_clears() {
    let t = extended();
    let color = color_target(&t.device, 8, 1);
    let depth_desc = TextureDesc::new(TextureFormat::D24_UNORM_S8_UINT, 8, 8).with_mip_levels(1);
    let depth: Rc<Texture> = t.device.create_texture_2d(&depth_desc).unwrap().into();
    let framebuffer = t
        .device
        .create_frame_buffer(FramebufferDesc {
            color_attachments: vec![FramebufferAttachment::new(color)],
            depth_stencil: Some(FramebufferAttachment::new(depth)),
            ..Default::default()
        })
        .unwrap();

    t.device.set_framebuffer(Some(framebuffer)).unwrap();
    t.device.clear_frame_buffer(Some(RED), Some(1.0), Some(0)).unwrap();
    assert!(t.device.check_error().is_ok());
}
