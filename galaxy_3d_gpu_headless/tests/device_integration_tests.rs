//! Integration tests for Device over the headless context
//!
//! Run with: cargo test --test device_integration_tests


use std::cell::RefCell;
use std::rc::Rc;

use galaxy_3d_gpu::galaxy3d::context::{gl, ContextTier, GlContext};
use galaxy_3d_gpu::galaxy3d::render::{BlendingState, RenderStateSet};
use galaxy_3d_gpu::galaxy3d::resource::{
    BindGroupLayout, BindGroupLayoutEntry, BufferUsage, IndexType, ProgramDesc, VertexLayoutDesc,
};
use galaxy_3d_gpu::galaxy3d::{
    find_backend, preferred_backend, DeviceBackend, DeviceEvent, DeviceOptions, Error,
    PrimitiveTopology, Rect,
};
use galaxy_3d_gpu_headless::{HeadlessConfig, HeadlessSurface};
use gpu_test_utils::*;

fn program(t: &TestDevice) -> Rc<galaxy_3d_gpu::galaxy3d::resource::Program> {
    let (vs, fs) = shaders(t.device.tier());
    t.device.create_gpu_program(ProgramDesc::new(vs, fs)).unwrap()
}

// ============================================================================
// SURFACE AND VIEWPORT
// ============================================================================

#[test]
fn test_device_follows_surface_size_and_pixel_ratio() {
    let t = extended();
    assert_eq!(t.device.drawing_buffer_size(), (WIDTH, HEIGHT));
    assert_eq!(t.context.fixed_state().viewport, [0, 0, WIDTH as i32, HEIGHT as i32]);

    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    t.device.on_event(move |event| sink.borrow_mut().push(event.clone()));

    t.surface.set_client_size(50, 20);
    t.surface.set_device_pixel_ratio(2.0);
    assert_eq!(t.device.resize(), (100, 40));
    assert_eq!(t.context.drawing_buffer_size(), (100, 40));
    assert_eq!(t.context.fixed_state().viewport, [0, 0, 100, 40]);
    assert_eq!(
        *events.borrow(),
        vec![DeviceEvent::Resized {
            width: 100,
            height: 40
        }]
    );

    // same size again: nothing happens
    t.device.resize();
    assert_eq!(events.borrow().len(), 1);
}

#[test]
fn test_viewport_and_scissor_in_device_pixels() {
    let t = device_with(HeadlessConfig::extended(), DeviceOptions::default().with_device_pixel_ratio(2.0));
    t.device.set_viewport(Some(Rect::new(5, 5, 10, 10)));
    assert_eq!(t.context.fixed_state().viewport, [10, 10, 20, 20]);

    t.device.set_scissor(Some(Rect::new(1, 2, 3, 4)));
    assert!(t.context.is_enabled(gl::SCISSOR_TEST));
    assert_eq!(t.context.fixed_state().scissor, [2, 4, 6, 8]);

    t.device.set_scissor(None);
    assert!(!t.context.is_enabled(gl::SCISSOR_TEST));
}

#[test]
fn test_clear_honors_scissor() {
    let t = extended();
    t.device.clear_frame_buffer(Some([1.0, 0.0, 0.0, 1.0]), Some(1.0), None).unwrap();
    assert_eq!(t.context.pixel(None, 30, 20), Some([1.0, 0.0, 0.0, 1.0]));

    t.device.set_scissor(Some(Rect::new(0, 0, 8, 8)));
    t.device.clear_frame_buffer(Some([0.0, 1.0, 0.0, 1.0]), None, None).unwrap();
    assert_eq!(t.context.pixel(None, 2, 2), Some([0.0, 1.0, 0.0, 1.0]));
    assert_eq!(t.context.pixel(None, 30, 20), Some([1.0, 0.0, 0.0, 1.0]));
}

// ============================================================================
// DRAWS
// ============================================================================

#[test]
fn test_draw_reaches_context() {
    for tier in [ContextTier::Legacy, ContextTier::Extended] {
        let t = tier_device(tier);
        let program = program(&t);
        let layout = triangle_layout(&t.device);

        let ran = t
            .device
            .run_frame(|device| {
                device.set_program(Some(program.clone()));
                device.set_vertex_layout(Some(layout.clone()));
                device.draw(PrimitiveTopology::Triangles, 0, 3)
            })
            .unwrap();
        assert!(ran);

        assert_eq!(t.context.draw_count(), 1);
        let draw = t.context.last_draw().unwrap();
        assert_eq!(draw.mode, gl::TRIANGLES);
        assert_eq!((draw.first, draw.count, draw.instances), (0, 3, 1));
        assert_eq!(draw.index_type, None);
        assert_eq!(Some(draw.program), program.native());
        assert_eq!(draw.framebuffer, None);

        let attribute = t.context.vertex_attrib(0).unwrap();
        assert!(t.context.is_attrib_enabled(0));
        assert_eq!((attribute.size, attribute.stride, attribute.offset), (3, 12, 0));
        assert_eq!(attribute.buffer, layout.vertex_buffers()[0].buffer.native());

        let stats = t.device.stats();
        assert_eq!((stats.frame, stats.draw_calls), (1, 1));
        assert!(t.device.check_error().is_ok());
    }
}

#[test]
fn test_indexed_draw_offsets_and_bounds() {
    let t = extended();
    let indices = t.device.create_index_buffer(IndexType::U16, 6, BufferUsage::empty()).unwrap();
    indices.write_u16(0, &[0, 1, 2, 2, 1, 0]).unwrap();
    let layout = t
        .device
        .create_vertex_layout(VertexLayoutDesc {
            vertex_buffers: vec![position_stream(&t.device)],
            index_buffer: Some(indices),
            label: None,
        })
        .unwrap();
    t.device.set_program(Some(program(&t)));
    t.device.set_vertex_layout(Some(layout));

    t.device.draw(PrimitiveTopology::Triangles, 3, 3).unwrap();
    let draw = t.context.last_draw().unwrap();
    assert_eq!(draw.index_type, Some(gl::UNSIGNED_SHORT));
    // byte offset of the first index
    assert_eq!((draw.first, draw.count), (6, 3));

    let overflow = t.device.draw(PrimitiveTopology::Triangles, 4, 3);
    assert!(matches!(overflow, Err(Error::InvalidUsage(_))));
    assert_eq!(t.context.draw_count(), 1);
}

#[test]
fn test_incomplete_bindings_skip_the_draw() {
    let t = extended();
    let layout = triangle_layout(&t.device);
    t.device.set_vertex_layout(Some(layout));
    t.device.draw(PrimitiveTopology::Triangles, 0, 3).unwrap();
    assert_eq!(t.context.draw_count(), 0);

    // the program reads group 0, which was never set
    let group_layout = Rc::new(BindGroupLayout::new(vec![BindGroupLayoutEntry::texture("u_albedo")]).unwrap());
    let (vs, fs) = shaders(ContextTier::Extended);
    let program = t
        .device
        .create_gpu_program(ProgramDesc::new(vs, fs).with_bind_group_layout(group_layout.clone()))
        .unwrap();
    t.device.set_program(Some(program));
    t.device.draw(PrimitiveTopology::Triangles, 0, 3).unwrap();
    assert_eq!(t.context.draw_count(), 0);

    // set but empty
    let group = t.device.create_bind_group(group_layout, Some("material".to_string()));
    t.device.set_bind_group(0, Some(group), &[]).unwrap();
    t.device.draw(PrimitiveTopology::Triangles, 0, 3).unwrap();
    assert_eq!(t.context.draw_count(), 0);
}

#[test]
fn test_instancing_needs_the_extension_on_legacy() {
    let bare = device_with(HeadlessConfig::legacy_minimal(), DeviceOptions::default());
    bare.device.set_program(Some(program(&bare)));
    bare.device.set_vertex_layout(Some(triangle_layout(&bare.device)));
    let result = bare.device.draw_instanced(PrimitiveTopology::Triangles, 0, 3, 2);
    assert!(matches!(result, Err(Error::Unsupported(_))));

    let t = legacy();
    t.device.set_program(Some(program(&t)));
    t.device.set_vertex_layout(Some(triangle_layout(&t.device)));
    t.device.draw_instanced(PrimitiveTopology::Triangles, 0, 3, 2).unwrap();
    assert_eq!(t.context.last_draw().unwrap().instances, 2);
}

#[test]
fn test_render_states_applied_once() {
    let t = extended();
    t.device.set_program(Some(program(&t)));
    t.device.set_vertex_layout(Some(triangle_layout(&t.device)));
    let states = t
        .device
        .create_render_state_set(RenderStateSet::new().with_blending(Rc::new(BlendingState::alpha_blend())));
    t.device.set_render_states(Some(states));

    t.device.draw(PrimitiveTopology::Triangles, 0, 3).unwrap();
    assert!(t.context.is_enabled(gl::BLEND));
    let blend = t.context.fixed_state().blend_func;
    assert_eq!((blend[0], blend[1]), (gl::SRC_ALPHA, gl::ONE_MINUS_SRC_ALPHA));

    let calls = t.context.call_count("blend_func_separate");
    t.device.draw(PrimitiveTopology::Triangles, 0, 3).unwrap();
    assert_eq!(t.context.call_count("blend_func_separate"), calls);

    t.device.set_render_states(None);
    t.device.draw(PrimitiveTopology::Triangles, 0, 3).unwrap();
    assert!(!t.context.is_enabled(gl::BLEND));
    assert_eq!(t.context.draw_count(), 3);
}

#[test]
fn test_check_error_surfaces_context_errors() {
    let t = extended();
    assert!(t.device.check_error().is_ok());
    t.context.enable(0xDEAD);
    match t.device.check_error() {
        Err(Error::ContextError { code, .. }) => assert_eq!(code, gl::INVALID_ENUM),
        other => panic!("expected a context error, got {:?}", other),
    }
    assert!(t.device.check_error().is_ok());
}

// ============================================================================
// BACKENDS
// ============================================================================

#[test]
fn test_preferred_backend_falls_back_to_legacy() {
    let backend = preferred_backend(Rc::new(HeadlessSurface::extended())).unwrap();
    assert_eq!(backend.type_name(), "webgl2");

    let backend = preferred_backend(Rc::new(HeadlessSurface::legacy())).unwrap();
    assert_eq!(backend.type_name(), "webgl");

    let nothing = HeadlessSurface::legacy().refuse(ContextTier::Legacy);
    assert!(preferred_backend(Rc::new(nothing)).is_none());
}

#[test]
fn test_backend_creates_devices() {
    let probe = Rc::new(HeadlessSurface::extended());
    assert!(find_backend("webgpu", probe.clone()).is_none());

    let backend = find_backend("webgl2", probe).unwrap();
    assert!(backend.supported());
    let device = pollster::block_on(backend.create_device(
        Rc::new(HeadlessSurface::extended()),
        DeviceOptions::default(),
    ))
    .unwrap();
    assert_eq!(device.tier(), ContextTier::Extended);

    // a legacy-only surface cannot host an extended device
    let refused = pollster::block_on(backend.create_device(
        Rc::new(HeadlessSurface::legacy()),
        DeviceOptions::default(),
    ));
    assert!(refused.is_none());
}
