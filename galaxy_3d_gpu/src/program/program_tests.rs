//! Unit tests for program/mod.rs

use std::rc::Rc;

use glam::{Vec3, Vec4};

use crate::buffer::std140::{ShaderType, StructLayout, StructType};
use crate::buffer::StructuredBuffer;
use crate::context::mock_context::{mock_shared_over, MockContext};
use crate::context::{ActiveUniform, ActiveUniformBlock, ContextTier, UniformType};
use crate::device::shared::DeviceShared;
use crate::error::Error;
use crate::object::GpuObject;
use crate::program::*;

const VS: &str = "attribute vec3 a_position; void main() { gl_Position = vec4(a_position, 1.0); }";
const FS: &str = "void main() { gl_FragColor = vec4(1.0); }";

fn uniform(name: &str, uniform_type: UniformType, size: u32) -> ActiveUniform {
    ActiveUniform {
        name: name.to_string(),
        uniform_type,
        size,
        block_index: None,
    }
}

fn context(tier: ContextTier, uniforms: Vec<ActiveUniform>) -> (Rc<MockContext>, Rc<DeviceShared>) {
    mock_shared_over(MockContext::new(tier).with_uniforms(uniforms, Vec::new()), false)
}

fn program(device: &Rc<DeviceShared>) -> Rc<Program> {
    Program::new(device, ProgramDesc::new(VS, FS)).unwrap()
}

fn material_layout() -> Rc<StructLayout> {
    let material = StructType::new("Material")
        .with_field("color", ShaderType::Leaf(UniformType::Vec4))
        .with_field("roughness", ShaderType::Leaf(UniformType::Float));
    Rc::new(StructLayout::new(&material).unwrap())
}

fn bits(values: &[f32]) -> Vec<u32> {
    values.iter().map(|v| v.to_bits()).collect()
}

#[test]
fn test_empty_source_rejected() {
    let (_gl, device) = context(ContextTier::Extended, Vec::new());
    let result = Program::new(&device, ProgramDesc::new("", FS));
    assert!(matches!(result, Err(Error::InvalidUsage(_))));
}

#[test]
fn test_compile_failure_is_kept_on_the_program() {
    let context = MockContext::new(ContextTier::Legacy);
    context.fail_compile("ERROR: 0:1: 'vec5' : undeclared identifier");
    let (_gl, device) = mock_shared_over(context, false);

    let program = program(&device);
    assert!(matches!(
        program.status(),
        Err(Error::ShaderCompile { stage: ShaderStage::Vertex, .. })
    ));
    assert_eq!(
        program.error_log().as_deref(),
        Some("ERROR: 0:1: 'vec5' : undeclared identifier")
    );
    assert!(program.native().is_none());
    assert!(program.set_uniform("u_color", &UniformValue::Float(1.0)).is_err());
}

#[test]
fn test_link_failure() {
    let context = MockContext::new(ContextTier::Extended);
    context.fail_link("varying v_uv not written");
    let (gl, device) = mock_shared_over(context, false);
    let program = program(&device);
    assert!(matches!(program.status(), Err(Error::ProgramLink(_))));
    assert_eq!(gl.count("delete_program"), 1);
    assert_eq!(gl.count("delete_shader"), 2);
}

#[test]
fn test_attribute_locations_bound_before_link() {
    let (gl, device) = context(ContextTier::Legacy, Vec::new());
    let program = program(&device);
    assert!(program.status().is_ok());
    let calls = gl.calls();
    let link = calls.iter().position(|c| *c == "link_program").unwrap();
    let bound = calls[..link].iter().filter(|c| **c == "bind_attrib_location").count();
    assert_eq!(bound, 14);
}

#[test]
fn test_reflection_is_lazy_and_setters_are_typed() {
    let (gl, device) = context(
        ContextTier::Extended,
        vec![uniform("u_color", UniformType::Vec4, 1), uniform("u_count", UniformType::Int, 1)],
    );
    let program = program(&device);
    assert_eq!(gl.count("uniform"), 0);
    assert_eq!(program.uniform_info("u_color"), None);

    program
        .set_uniform("u_color", &UniformValue::Vec4(Vec4::new(1.0, 0.5, 0.25, 1.0)))
        .unwrap();
    assert_eq!(gl.uploaded("u_color"), Some(bits(&[1.0, 0.5, 0.25, 1.0])));
    assert_eq!(program.uniform_info("u_color"), Some((UniformType::Vec4, 1)));

    // inactive uniform: ignored
    program.set_uniform("u_unused", &UniformValue::Float(2.0)).unwrap();

    let wrong = program.set_uniform("u_count", &UniformValue::Float(2.0));
    assert!(matches!(wrong, Err(Error::InvalidUsage(_))));
}

#[test]
fn test_sampler_units_one_per_element() {
    let (gl, device) = context(
        ContextTier::Extended,
        vec![
            uniform("u_albedo", UniformType::Sampler2D, 1),
            uniform("u_shadows[0]", UniformType::Sampler2DShadow, 3),
            uniform("u_normal", UniformType::Sampler2D, 1),
        ],
    );
    let program = program(&device);
    assert_eq!(program.texture_unit("u_albedo").unwrap(), Some(0));
    assert_eq!(program.texture_unit("u_shadows").unwrap(), Some(1));
    assert_eq!(program.texture_unit("u_shadows[2]").unwrap(), Some(3));
    assert_eq!(program.texture_unit("u_normal").unwrap(), Some(4));
    assert_eq!(program.texture_unit("u_missing").unwrap(), None);
    assert_eq!(gl.uploaded("u_shadows"), Some(vec![1, 2, 3]));
    assert_eq!(gl.uploaded("u_normal"), Some(vec![4]));
}

#[test]
fn test_aggregates_are_flattened() {
    let (gl, device) = context(
        ContextTier::Legacy,
        vec![
            uniform("u_light.color", UniformType::Vec3, 1),
            uniform("u_light.intensity", UniformType::Float, 1),
            uniform("u_weights[0]", UniformType::Float, 4),
        ],
    );
    let program = program(&device);

    let light = UniformValue::Struct(vec![
        ("color".to_string(), UniformValue::Vec3(Vec3::new(1.0, 0.9, 0.8))),
        ("intensity".to_string(), UniformValue::Float(3.0)),
    ]);
    program.set_uniform("u_light", &light).unwrap();
    assert_eq!(gl.uploaded("u_light.color"), Some(bits(&[1.0, 0.9, 0.8])));
    assert_eq!(gl.uploaded("u_light.intensity"), Some(bits(&[3.0])));

    let weights = UniformValue::Array(vec![UniformValue::Float(0.5), UniformValue::Float(0.25)]);
    program.set_uniform("u_weights", &weights).unwrap();
    assert_eq!(gl.uploaded("u_weights[1]"), Some(bits(&[0.25])));

    program
        .set_uniform("u_weights", &UniformValue::FloatArray(vec![1.0, 2.0, 3.0, 4.0]))
        .unwrap();
    assert_eq!(gl.uploaded("u_weights"), Some(bits(&[1.0, 2.0, 3.0, 4.0])));
}

#[test]
fn test_legacy_block_emulation_from_shadow() {
    let (gl, device) = context(
        ContextTier::Legacy,
        vec![
            uniform("Material.color", UniformType::Vec4, 1),
            uniform("Material.roughness", UniformType::Float, 1),
        ],
    );
    let program = program(&device);
    let material = StructuredBuffer::new(&device, material_layout()).unwrap();
    material
        .set_value("color", &UniformValue::Vec4(Vec4::new(0.1, 0.2, 0.3, 1.0)))
        .unwrap();
    material.set_value("roughness", &UniformValue::Float(0.7)).unwrap();

    program.set_block("Material", &material, 0).unwrap();
    assert_eq!(gl.uploaded("Material.color"), Some(bits(&[0.1, 0.2, 0.3, 1.0])));
    assert_eq!(gl.uploaded("Material.roughness"), Some(bits(&[0.7])));
    assert_eq!(gl.count("bind_buffer_range"), 0);
}

#[test]
fn test_block_plan_follows_the_layout_not_its_address() {
    let (gl, device) = context(
        ContextTier::Legacy,
        vec![
            uniform("Material.color", UniformType::Vec4, 1),
            uniform("Material.roughness", UniformType::Float, 1),
        ],
    );
    let program = program(&device);
    let first = StructuredBuffer::new(&device, material_layout()).unwrap();
    first.set_value("roughness", &UniformValue::Float(0.7)).unwrap();
    program.set_block("Material", &first, 0).unwrap();
    drop(first);

    // same block name, different shape; may land where the first layout was
    let rough_only = StructType::new("Material")
        .with_field("roughness", ShaderType::Leaf(UniformType::Float));
    let second = StructuredBuffer::new(&device, Rc::new(StructLayout::new(&rough_only).unwrap())).unwrap();
    second.set_value("roughness", &UniformValue::Float(0.3)).unwrap();

    gl.reset();
    program.set_block("Material", &second, 0).unwrap();
    assert_eq!(gl.count("uniform"), 1);
    assert_eq!(gl.uploaded("Material.roughness"), Some(bits(&[0.3])));
}

#[test]
fn test_layout_ids_are_unique_and_shared_by_clones() {
    let a = material_layout();
    let b = material_layout();
    assert_ne!(a.id(), b.id());
    assert_eq!(*a, *b);
    assert_eq!(StructLayout::clone(&a).id(), a.id());
}

#[test]
fn test_extended_block_binds_buffer_range() {
    let block_uniform = ActiveUniform {
        block_index: Some(0),
        ..uniform("color", UniformType::Vec4, 1)
    };
    let block = ActiveUniformBlock {
        name: "Material".to_string(),
        index: 0,
        data_size: 32,
    };
    let (gl, device) = mock_shared_over(
        MockContext::new(ContextTier::Extended).with_uniforms(vec![block_uniform], vec![block]),
        false,
    );
    let program = program(&device);
    let material = StructuredBuffer::new(&device, material_layout()).unwrap();

    assert!(program.has_block("Material").unwrap());
    program.set_block("Material", &material, 0).unwrap();
    assert_eq!(gl.count("uniform_block_binding"), 1);
    assert_eq!(gl.count("bind_buffer_range"), 1);
    assert_eq!(gl.count("uniform"), 0);

    let misaligned = program.set_block("Material", &material, 4);
    assert!(matches!(misaligned, Err(Error::InvalidUsage(_))));
}

#[test]
fn test_dispose_and_reload_rebuilds() {
    let (gl, device) = context(ContextTier::Extended, vec![uniform("u_time", UniformType::Float, 1)]);
    let program = program(&device);
    program.set_uniform("u_time", &UniformValue::Float(1.0)).unwrap();
    assert_eq!(device.current_program(), program.native());

    program.dispose();
    assert_eq!(gl.count("delete_program"), 1);
    assert_eq!(device.current_program(), None);

    program.set_uniform("u_time", &UniformValue::Float(2.0)).unwrap();
    assert_eq!(program.cid(), 1);
    assert_eq!(gl.count("create_program"), 2);
    assert_eq!(gl.uploaded("u_time"), Some(bits(&[2.0])));
}

#[test]
fn test_lost_context_is_a_no_op() {
    let (gl, device) = context(ContextTier::Extended, vec![uniform("u_time", UniformType::Float, 1)]);
    let program = program(&device);
    device.set_lost(true);
    program.set_uniform("u_time", &UniformValue::Float(1.0)).unwrap();
    assert_eq!(gl.count("uniform"), 0);
    assert_eq!(program.texture_unit("u_time").unwrap(), None);
}
