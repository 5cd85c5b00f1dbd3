/// Device factories, one per context tier
///
/// Hosts pick a backend by name (`"webgl"` for the legacy tier, `"webgl2"`
/// for the extended tier), ask whether it is supported, then create devices
/// from it. Creation is asynchronous so hosts whose context creation is
/// asynchronous fit the same surface.

use std::cell::OnceCell;
use std::rc::Rc;

use futures::future::{FutureExt, LocalBoxFuture};

use crate::context::{ContextAttributes, ContextTier, Surface};
use crate::device::{Device, DeviceOptions};
use crate::{gpu_debug, gpu_error};

const SOURCE: &str = "galaxy3d::gpu::Backend";

/// A named way of creating devices
pub trait DeviceBackend {
    /// Backend name as hosts select it
    fn type_name(&self) -> &'static str;

    /// Whether a context of this backend can be created. Probed once, then cached.
    fn supported(&self) -> bool;

    /// Create a ready-to-use device on `surface`, or `None` on failure
    fn create_device(&self, surface: Rc<dyn Surface>, options: DeviceOptions) -> LocalBoxFuture<'static, Option<Device>>;
}

/// Backend over the context-based API, at a fixed tier
pub struct GlBackend {
    tier: ContextTier,
    probe: Rc<dyn Surface>,
    supported: OnceCell<bool>,
}

impl GlBackend {
    /// Legacy tier backend. `probe` is a surface used only to test availability.
    pub fn legacy(probe: Rc<dyn Surface>) -> Self {
        Self::with_tier(ContextTier::Legacy, probe)
    }

    /// Extended tier backend
    pub fn extended(probe: Rc<dyn Surface>) -> Self {
        Self::with_tier(ContextTier::Extended, probe)
    }

    fn with_tier(tier: ContextTier, probe: Rc<dyn Surface>) -> Self {
        Self {
            tier,
            probe,
            supported: OnceCell::new(),
        }
    }

    pub fn tier(&self) -> ContextTier {
        self.tier
    }
}

impl DeviceBackend for GlBackend {
    fn type_name(&self) -> &'static str {
        match self.tier {
            ContextTier::Legacy => "webgl",
            ContextTier::Extended => "webgl2",
        }
    }

    fn supported(&self) -> bool {
        *self.supported.get_or_init(|| {
            let available = self
                .probe
                .create_context(self.tier, &ContextAttributes::default())
                .is_some();
            gpu_debug!(SOURCE, "Backend '{}' supported: {}", self.type_name(), available);
            available
        })
    }

    fn create_device(&self, surface: Rc<dyn Surface>, options: DeviceOptions) -> LocalBoxFuture<'static, Option<Device>> {
        let tier = self.tier;
        let name = self.type_name();
        async move {
            match Device::new(surface, tier, options) {
                Ok(device) => Some(device),
                Err(e) => {
                    gpu_error!(SOURCE, "Backend '{}' failed to create a device: {}", name, e);
                    None
                }
            }
        }
        .boxed_local()
    }
}

/// Backend registered under `name`, probing with `probe`
pub fn find_backend(name: &str, probe: Rc<dyn Surface>) -> Option<GlBackend> {
    match name {
        "webgl" => Some(GlBackend::legacy(probe)),
        "webgl2" => Some(GlBackend::extended(probe)),
        _ => None,
    }
}

/// Best available backend: extended first, then legacy
pub fn preferred_backend(probe: Rc<dyn Surface>) -> Option<GlBackend> {
    [GlBackend::extended(probe.clone()), GlBackend::legacy(probe)]
        .into_iter()
        .find(|backend| backend.supported())
}

#[cfg(test)]
#[path = "backend_tests.rs"]
mod tests;
