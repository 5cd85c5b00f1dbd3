//! Unit tests for device/backend.rs

use std::cell::Cell;
use std::rc::Rc;

use crate::context::mock_context::{MockContext, MockSurface};
use crate::context::{ContextAttributes, ContextTier, GlContext, Surface};
use crate::device::backend::*;
use crate::device::DeviceOptions;

fn surface(tier: ContextTier) -> Rc<dyn Surface> {
    Rc::new(MockSurface::new(MockContext::new(tier)))
}

#[test]
fn test_type_names() {
    let probe = surface(ContextTier::Legacy);
    assert_eq!(GlBackend::legacy(probe.clone()).type_name(), "webgl");
    assert_eq!(GlBackend::extended(probe.clone()).type_name(), "webgl2");
    assert_eq!(find_backend("webgl2", probe.clone()).map(|b| b.tier()), Some(ContextTier::Extended));
    assert!(find_backend("vulkan", probe).is_none());
}

/// Surface counting context requests
struct CountingSurface {
    inner: MockSurface,
    requests: Cell<u32>,
}

impl Surface for CountingSurface {
    fn create_context(&self, tier: ContextTier, attributes: &ContextAttributes) -> Option<Rc<dyn GlContext>> {
        self.requests.set(self.requests.get() + 1);
        self.inner.create_context(tier, attributes)
    }

    fn client_size(&self) -> (u32, u32) {
        self.inner.client_size()
    }

    fn device_pixel_ratio(&self) -> f32 {
        self.inner.device_pixel_ratio()
    }

    fn set_drawing_buffer_size(&self, width: u32, height: u32) {
        self.inner.set_drawing_buffer_size(width, height)
    }
}

#[test]
fn test_supported_is_probed_once() {
    let counting = Rc::new(CountingSurface {
        inner: MockSurface::new(MockContext::new(ContextTier::Legacy)),
        requests: Cell::new(0),
    });
    let probe: Rc<dyn Surface> = counting.clone();

    let legacy = GlBackend::legacy(probe.clone());
    assert!(legacy.supported());
    assert!(legacy.supported());
    assert_eq!(counting.requests.get(), 1);

    let extended = GlBackend::extended(probe);
    assert!(!extended.supported());
    assert!(!extended.supported());
    assert_eq!(counting.requests.get(), 2);
}

#[test]
fn test_preferred_backend_falls_back_to_legacy() {
    let probe = surface(ContextTier::Legacy);
    let backend = preferred_backend(probe).unwrap();
    assert_eq!(backend.type_name(), "webgl");
}

#[test]
fn test_create_device() {
    let probe = surface(ContextTier::Extended);
    let backend = GlBackend::extended(probe.clone());
    let device = pollster::block_on(backend.create_device(probe.clone(), DeviceOptions::default()));
    let device = device.unwrap();
    assert_eq!(device.tier(), ContextTier::Extended);

    // wrong tier: no device
    let legacy = GlBackend::legacy(probe.clone());
    assert!(pollster::block_on(legacy.create_device(probe, DeviceOptions::default())).is_none());
}
