//! Unit tests for vertex_layout.rs

use std::rc::Rc;

use crate::buffer::{Buffer, BufferDesc, BufferUsage};
use crate::caps::ext;
use crate::context::mock_context::mock_shared;
use crate::context::ContextTier;
use crate::device::shared::DeviceShared;
use crate::error::Error;
use crate::object::GpuObject;
use crate::vertex_layout::*;

fn vertex_buffer(device: &Rc<DeviceShared>, size: u32) -> Rc<Buffer> {
    Buffer::new(device, &BufferDesc::new(BufferUsage::VERTEX, size)).unwrap()
}

fn position_uv(buffer: Rc<Buffer>) -> VertexBufferLayout {
    VertexBufferLayout::new(
        buffer,
        20,
        vec![
            VertexAttribute::new(VertexSemantic::Position, VertexFormat::R32G32B32_SFLOAT, 0),
            VertexAttribute::new(VertexSemantic::TexCoord(0), VertexFormat::R32G32_SFLOAT, 12),
        ],
    )
}

fn desc(buffers: Vec<VertexBufferLayout>) -> VertexLayoutDesc {
    VertexLayoutDesc {
        vertex_buffers: buffers,
        ..Default::default()
    }
}

#[test]
fn test_semantic_locations_and_names() {
    assert_eq!(VertexSemantic::Position.location(), 0);
    assert_eq!(VertexSemantic::Tangent.location(), 3);
    assert_eq!(VertexSemantic::TexCoord(2).location(), 6);
    assert_eq!(VertexSemantic::BlendWeights.location(), 13);
    assert_eq!(VertexSemantic::TexCoord(1).attribute_name(), "a_texCoord1");
    assert_eq!(VertexSemantic::BlendIndices.attribute_name(), "a_blendIndices");

    let all = VertexSemantic::all();
    assert_eq!(all.len(), 14);
    let mut locations: Vec<u32> = all.iter().map(|s| s.location()).collect();
    locations.dedup();
    assert_eq!(locations, (0..14).collect::<Vec<_>>());
}

#[test]
fn test_vertex_format_table() {
    assert_eq!(VertexFormat::R32G32B32_SFLOAT.size_bytes(), 12);
    assert_eq!(VertexFormat::R8G8B8A8_UNORM.size_bytes(), 4);
    assert_eq!(VertexFormat::R16G16_SNORM.size_bytes(), 4);
    assert!(VertexFormat::R8G8B8A8_UNORM.is_normalized());
    assert!(!VertexFormat::R8G8B8A8_UNORM.is_integer());
    assert!(VertexFormat::R8G8B8A8_UINT.is_integer());
    assert!(VertexFormat::R8G8B8A8_UNORM.legacy_supported());
    assert!(!VertexFormat::R32_UINT.legacy_supported());
    assert!(!VertexFormat::R16G16_SFLOAT.legacy_supported());
}

#[test]
fn test_validation() {
    let (_gl, device) = mock_shared(ContextTier::Legacy, &[]);

    let index_only = Buffer::new(&device, &BufferDesc::new(BufferUsage::INDEX, 16)).unwrap();
    let result = VertexLayout::new(&device, desc(vec![position_uv(index_only)]));
    assert!(matches!(result, Err(Error::InvalidUsage(_))));

    let twice = VertexBufferLayout::new(
        vertex_buffer(&device, 64),
        24,
        vec![
            VertexAttribute::new(VertexSemantic::Position, VertexFormat::R32G32B32_SFLOAT, 0),
            VertexAttribute::new(VertexSemantic::Position, VertexFormat::R32G32B32_SFLOAT, 12),
        ],
    );
    assert!(matches!(
        VertexLayout::new(&device, desc(vec![twice])),
        Err(Error::InvalidUsage(_))
    ));

    let overflow = VertexBufferLayout::new(
        vertex_buffer(&device, 64),
        8,
        vec![VertexAttribute::new(VertexSemantic::Normal, VertexFormat::R32G32B32_SFLOAT, 0)],
    );
    assert!(matches!(
        VertexLayout::new(&device, desc(vec![overflow])),
        Err(Error::InvalidUsage(_))
    ));

    let integer = VertexBufferLayout::new(
        vertex_buffer(&device, 64),
        4,
        vec![VertexAttribute::new(VertexSemantic::BlendIndices, VertexFormat::R8G8B8A8_UINT, 0)],
    );
    assert!(matches!(
        VertexLayout::new(&device, desc(vec![integer])),
        Err(Error::Unsupported(_))
    ));

    let instanced = position_uv(vertex_buffer(&device, 64)).per_instance();
    assert!(matches!(
        VertexLayout::new(&device, desc(vec![instanced])),
        Err(Error::Unsupported(_))
    ));
}

#[test]
fn test_legacy_instancing_with_extension() {
    let (gl, device) = mock_shared(ContextTier::Legacy, &[ext::ANGLE_INSTANCED_ARRAYS]);
    let per_vertex = position_uv(vertex_buffer(&device, 64));
    let per_instance = VertexBufferLayout::new(
        vertex_buffer(&device, 64),
        16,
        vec![VertexAttribute::new(VertexSemantic::Diffuse, VertexFormat::R32G32B32A32_SFLOAT, 0)],
    )
    .per_instance();
    let layout = VertexLayout::new(&device, desc(vec![per_vertex, per_instance])).unwrap();
    assert!(layout.has_instance_data());
    assert!(layout.bind().unwrap());
    assert_eq!(gl.count("vertex_attrib_divisor"), 3);
}

#[test]
fn test_packed_stride_is_derived() {
    let (gl, device) = mock_shared(ContextTier::Extended, &[]);
    let packed = VertexBufferLayout::new(
        vertex_buffer(&device, 64),
        0,
        vec![
            VertexAttribute::new(VertexSemantic::Position, VertexFormat::R32G32B32_SFLOAT, 0),
            VertexAttribute::new(VertexSemantic::Diffuse, VertexFormat::R8G8B8A8_UNORM, 12),
        ],
    );
    let layout = VertexLayout::new(&device, desc(vec![packed])).unwrap();
    assert_eq!(layout.attribute_mask(), 0b101);
    assert!(layout.bind().unwrap());
    assert_eq!(gl.count("vertex_attrib_pointer_f32"), 2);
}

#[test]
fn test_vertex_array_recorded_once() {
    let (gl, device) = mock_shared(ContextTier::Extended, &[]);
    let buffer = vertex_buffer(&device, 80);
    let layout = VertexLayout::new(&device, desc(vec![position_uv(buffer.clone())])).unwrap();
    assert_eq!(gl.count("create_vertex_array"), 1);
    // creating the vertex buffer already unbound any vertex array
    assert_eq!(gl.count("bind_vertex_array"), 1);
    gl.reset();

    layout.bind().unwrap();
    layout.bind().unwrap();
    assert_eq!(gl.count("bind_vertex_array"), 2);
    assert_eq!(gl.count("vertex_attrib_pointer_f32"), 2);

    // new native buffer: record again
    buffer.dispose();
    layout.bind().unwrap();
    assert_eq!(gl.count("vertex_attrib_pointer_f32"), 4);
}

#[test]
fn test_legacy_without_vao_respecifies_and_disables_stale() {
    let (gl, device) = mock_shared(ContextTier::Legacy, &[]);
    let wide = VertexLayout::new(&device, desc(vec![position_uv(vertex_buffer(&device, 80))])).unwrap();
    let narrow = VertexLayout::new(
        &device,
        desc(vec![VertexBufferLayout::new(
            vertex_buffer(&device, 48),
            12,
            vec![VertexAttribute::new(VertexSemantic::Position, VertexFormat::R32G32B32_SFLOAT, 0)],
        )]),
    )
    .unwrap();
    assert_eq!(gl.count("create_vertex_array"), 0);

    wide.bind().unwrap();
    wide.bind().unwrap();
    assert_eq!(gl.count("vertex_attrib_pointer_f32"), 4);
    assert_eq!(gl.count("disable_vertex_attrib_array"), 0);

    narrow.bind().unwrap();
    assert_eq!(gl.count("disable_vertex_attrib_array"), 1);
}

#[test]
fn test_dispose_and_reload_vertex_array() {
    let (gl, device) = mock_shared(ContextTier::Extended, &[]);
    let layout = VertexLayout::new(&device, desc(vec![position_uv(vertex_buffer(&device, 80))])).unwrap();
    layout.dispose();
    assert!(layout.native().is_none());
    assert_eq!(gl.count("delete_vertex_array"), 1);
    layout.bind().unwrap();
    assert_eq!(layout.cid(), 1);
    assert_eq!(gl.count("create_vertex_array"), 2);
}
