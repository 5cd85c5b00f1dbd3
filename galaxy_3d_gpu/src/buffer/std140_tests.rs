//! Unit tests for std140.rs

use std::rc::Rc;

use glam::{Mat3, Mat4, Vec3};

use crate::buffer::std140::*;
use crate::context::UniformType;
use crate::program::UniformValue;

fn light_type() -> Rc<StructType> {
    Rc::new(
        StructType::new("Light")
            .with_field("color", ShaderType::Leaf(UniformType::Vec3))
            .with_field("intensity", ShaderType::Leaf(UniformType::Float)),
    )
}

fn frame_type() -> StructType {
    StructType::new("Frame")
        .with_field("view_proj", ShaderType::Leaf(UniformType::Mat4))
        .with_field("eye", ShaderType::Leaf(UniformType::Vec3))
        .with_field("time", ShaderType::Leaf(UniformType::Float))
        .with_field("lights", ShaderType::array(ShaderType::Struct(light_type()), 2))
        .with_field("weights", ShaderType::array(ShaderType::Leaf(UniformType::Float), 3))
        .with_field("normal", ShaderType::Leaf(UniformType::Mat3))
}

// ============================================================================
// LAYOUT
// ============================================================================

#[test]
fn test_offsets_follow_std140() {
    let layout = StructLayout::new(&frame_type()).unwrap();

    let offset = |path: &str| layout.leaf(path).unwrap().offset;
    assert_eq!(offset("view_proj"), 0);
    assert_eq!(offset("eye"), 64);
    // A float packs into the tail of the preceding vec3
    assert_eq!(offset("time"), 76);
    assert_eq!(offset("lights[0].color"), 80);
    assert_eq!(offset("lights[0].intensity"), 92);
    assert_eq!(offset("lights[1].color"), 96);
    assert_eq!(offset("weights"), 112);
    assert_eq!(offset("normal"), 160);
    assert_eq!(layout.size(), 208);
}

#[test]
fn test_scalar_arrays_are_single_leaves_with_vec4_stride() {
    let layout = StructLayout::new(&frame_type()).unwrap();
    let weights = layout.leaf("weights").unwrap();
    assert_eq!(weights.count, 3);
    assert_eq!(weights.stride, 16);
    assert_eq!(weights.span(), 36);

    let (offset, ty, count, _) = layout.locate("weights[2]").unwrap();
    assert_eq!(offset, 144);
    assert_eq!(ty, UniformType::Float);
    assert_eq!(count, 1);
    assert!(layout.locate("weights[3]").is_none());
}

#[test]
fn test_sizes_of_basic_types() {
    assert_eq!(ShaderType::Leaf(UniformType::Vec3).std140_size(), 12);
    assert_eq!(ShaderType::Leaf(UniformType::Vec3).std140_align(), 16);
    assert_eq!(ShaderType::Leaf(UniformType::Vec2).std140_align(), 8);
    assert_eq!(ShaderType::Leaf(UniformType::Mat2).std140_size(), 32);
    assert_eq!(ShaderType::Leaf(UniformType::Mat4).std140_size(), 64);
    assert_eq!(ShaderType::array(ShaderType::Leaf(UniformType::Vec2), 4).std140_size(), 64);
}

#[test]
fn test_samplers_and_empty_arrays_rejected() {
    let with_sampler = StructType::new("Bad")
        .with_field("tex", ShaderType::Leaf(UniformType::Sampler2D));
    assert!(StructLayout::new(&with_sampler).is_err());

    let empty_array = StructType::new("Bad")
        .with_field("values", ShaderType::array(ShaderType::Leaf(UniformType::Float), 0));
    assert!(StructLayout::new(&empty_array).is_err());
}

// ============================================================================
// WRITE / READ
// ============================================================================

#[test]
fn test_write_leaf_and_read_back() {
    let layout = StructLayout::new(&frame_type()).unwrap();
    let mut bytes = vec![0u8; layout.size() as usize];

    let range = layout
        .write("eye", &UniformValue::Vec3(Vec3::new(1.0, 2.0, 3.0)), &mut bytes)
        .unwrap();
    assert_eq!(range, (64, 12));
    assert_eq!(
        layout.read("eye", &bytes),
        Some(UniformValue::Vec3(Vec3::new(1.0, 2.0, 3.0)))
    );
}

#[test]
fn test_mat3_columns_are_padded() {
    let layout = StructLayout::new(&frame_type()).unwrap();
    let mut bytes = vec![0u8; layout.size() as usize];
    let m = Mat3::from_cols_array(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);

    layout.write("normal", &UniformValue::Mat3(m), &mut bytes).unwrap();

    let word = |at: usize| f32::from_le_bytes(bytes[at..at + 4].try_into().unwrap());
    assert_eq!(word(160), 1.0);
    assert_eq!(word(176), 4.0);
    assert_eq!(word(192), 7.0);
    assert_eq!(layout.read("normal", &bytes), Some(UniformValue::Mat3(m)));
}

#[test]
fn test_struct_value_is_flattened() {
    let layout = StructLayout::new(&frame_type()).unwrap();
    let mut bytes = vec![0u8; layout.size() as usize];
    let light = UniformValue::Struct(vec![
        ("color".to_string(), UniformValue::Vec3(Vec3::X)),
        ("intensity".to_string(), UniformValue::Float(0.5)),
    ]);

    let range = layout.write("lights[1]", &light, &mut bytes).unwrap();
    assert_eq!(range, (96, 16));
    assert_eq!(layout.read("lights[1].intensity", &bytes), Some(UniformValue::Float(0.5)));
    assert_eq!(layout.read("lights[0].intensity", &bytes), Some(UniformValue::Float(0.0)));
}

#[test]
fn test_float_array_uses_padded_stride() {
    let layout = StructLayout::new(&frame_type()).unwrap();
    let mut bytes = vec![0u8; layout.size() as usize];

    layout
        .write("weights", &UniformValue::FloatArray(vec![1.0, 2.0, 3.0]), &mut bytes)
        .unwrap();

    assert_eq!(layout.read("weights[1]", &bytes), Some(UniformValue::Float(2.0)));
    assert_eq!(
        layout.read("weights", &bytes),
        Some(UniformValue::Array(vec![
            UniformValue::Float(1.0),
            UniformValue::Float(2.0),
            UniformValue::Float(3.0),
        ]))
    );
}

#[test]
fn test_type_mismatch_and_unknown_path() {
    let layout = StructLayout::new(&frame_type()).unwrap();
    let mut bytes = vec![0u8; layout.size() as usize];

    assert!(layout.write("eye", &UniformValue::Float(1.0), &mut bytes).is_err());
    assert!(layout.write("missing", &UniformValue::Float(1.0), &mut bytes).is_err());
    assert!(layout
        .write("weights", &UniformValue::FloatArray(vec![0.0; 4]), &mut bytes)
        .is_err());
}

#[test]
fn test_whole_struct_write_matches_field_writes() {
    let layout = StructLayout::new(&frame_type()).unwrap();
    let mut whole = vec![0u8; layout.size() as usize];
    let mut fields = vec![0u8; layout.size() as usize];

    let value = UniformValue::Struct(vec![
        ("view_proj".to_string(), UniformValue::Mat4(Mat4::IDENTITY)),
        ("time".to_string(), UniformValue::Float(4.0)),
    ]);
    let range = layout.write("", &value, &mut whole).unwrap();
    layout.write("view_proj", &UniformValue::Mat4(Mat4::IDENTITY), &mut fields).unwrap();
    layout.write("time", &UniformValue::Float(4.0), &mut fields).unwrap();

    assert_eq!(whole, fields);
    assert_eq!(range, (0, 80));
}
