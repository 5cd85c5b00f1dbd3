//! Unit tests for device/options.rs

use crate::device::options::*;

#[test]
fn test_pixel_rounding_golden() {
    let rect = Rect::new(1, 1, 3, 3);
    assert_eq!(rect.to_device_pixels(1.5, PixelRounding::Round), Rect::new(2, 2, 4, 4));
    assert_eq!(rect.to_device_pixels(1.5, PixelRounding::Floor), Rect::new(1, 1, 5, 5));
    assert_eq!(rect.to_device_pixels(1.5, PixelRounding::Ceil), Rect::new(2, 2, 4, 4));

    let odd = Rect::of_size(301, 151);
    assert_eq!(odd.to_device_pixels(1.25, PixelRounding::Round), Rect::new(0, 0, 376, 189));
    assert_eq!(odd.to_device_pixels(1.25, PixelRounding::Floor), Rect::new(0, 0, 376, 188));
    assert_eq!(odd.to_device_pixels(1.25, PixelRounding::Ceil), Rect::new(0, 0, 377, 189));
}

#[test]
fn test_adjacent_rects_stay_adjacent() {
    let left = Rect::new(0, 0, 3, 10).to_device_pixels(1.5, PixelRounding::Round);
    let right = Rect::new(3, 0, 3, 10).to_device_pixels(1.5, PixelRounding::Round);
    assert_eq!(left.x + left.width as i32, right.x);
}

#[test]
fn test_drawing_buffer_size() {
    assert_eq!(drawing_buffer_size((300, 150), 2.0, PixelRounding::Round), (600, 300));
    assert_eq!(drawing_buffer_size((301, 151), 1.25, PixelRounding::Floor), (376, 188));
    // never collapses to zero
    assert_eq!(drawing_buffer_size((0, 1), 0.25, PixelRounding::Floor), (1, 1));
}

#[test]
fn test_topology_codes() {
    assert_eq!(PrimitiveTopology::Points.to_gl(), 0x0000);
    assert_eq!(PrimitiveTopology::Triangles.to_gl(), 0x0004);
    assert_eq!(PrimitiveTopology::TriangleFan.to_gl(), 0x0006);
}

#[test]
fn test_default_options() {
    let options = DeviceOptions::default();
    assert!(options.msaa);
    assert_eq!(options.device_pixel_ratio, None);
    assert_eq!(options.pixel_rounding, PixelRounding::Round);
    let tuned = options.with_msaa(false).with_device_pixel_ratio(2.0);
    assert!(!tuned.msaa);
    assert_eq!(tuned.device_pixel_ratio, Some(2.0));
}
