/// HeadlessSurface - canvas stand-in that hands out `HeadlessContext`s
///
/// Like a canvas, a surface yields one context: asking again for the same
/// tier returns it, asking for the other tier afterwards fails. An extended
/// surface can still produce a legacy context if that is asked for first.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use galaxy_3d_gpu::galaxy3d::context::{ContextAttributes, ContextTier, GlContext, Surface};

use crate::headless_config::HeadlessConfig;
use crate::headless_context::HeadlessContext;

pub struct HeadlessSurface {
    config: HeadlessConfig,
    context: RefCell<Option<Rc<HeadlessContext>>>,
    attributes: Cell<Option<ContextAttributes>>,
    refused: RefCell<Vec<ContextTier>>,
    client_size: Cell<(u32, u32)>,
    device_pixel_ratio: Cell<f32>,
}

impl HeadlessSurface {
    pub fn new(config: HeadlessConfig) -> Self {
        let client_size = config.drawing_buffer_size;
        Self {
            config,
            context: RefCell::new(None),
            attributes: Cell::new(None),
            refused: RefCell::new(Vec::new()),
            client_size: Cell::new(client_size),
            device_pixel_ratio: Cell::new(1.0),
        }
    }

    /// Surface whose contexts use the `legacy()` preset
    pub fn legacy() -> Self {
        Self::new(HeadlessConfig::legacy())
    }

    /// Surface whose contexts use the `extended()` preset
    pub fn extended() -> Self {
        Self::new(HeadlessConfig::extended())
    }

    /// Pretend the host cannot create contexts of `tier`
    pub fn refuse(self, tier: ContextTier) -> Self {
        self.refused.borrow_mut().push(tier);
        self
    }

    /// Context created so far, if any
    pub fn context(&self) -> Option<Rc<HeadlessContext>> {
        self.context.borrow().clone()
    }

    /// Attributes the context was requested with
    pub fn attributes(&self) -> Option<ContextAttributes> {
        self.attributes.get()
    }

    pub fn set_client_size(&self, width: u32, height: u32) {
        self.client_size.set((width, height));
    }

    pub fn set_device_pixel_ratio(&self, ratio: f32) {
        self.device_pixel_ratio.set(ratio);
    }

    fn config_for(&self, tier: ContextTier) -> Option<HeadlessConfig> {
        if self.refused.borrow().contains(&tier) {
            return None;
        }
        match (self.config.tier, tier) {
            (own, wanted) if own == wanted => Some(self.config.clone()),
            (ContextTier::Extended, ContextTier::Legacy) => {
                let (width, height) = self.config.drawing_buffer_size;
                Some(
                    HeadlessConfig::legacy()
                        .with_drawing_buffer_size(width, height)
                        .with_print_errors(self.config.print_errors),
                )
            }
            _ => None,
        }
    }
}

impl Surface for HeadlessSurface {
    fn create_context(&self, tier: ContextTier, attributes: &ContextAttributes) -> Option<Rc<dyn GlContext>> {
        if let Some(existing) = self.context.borrow().as_ref() {
            return (existing.tier() == tier).then(|| existing.clone() as Rc<dyn GlContext>);
        }
        let context = Rc::new(HeadlessContext::new(self.config_for(tier)?));
        self.attributes.set(Some(*attributes));
        *self.context.borrow_mut() = Some(context.clone());
        Some(context)
    }

    fn client_size(&self) -> (u32, u32) {
        self.client_size.get()
    }

    fn device_pixel_ratio(&self) -> f32 {
        self.device_pixel_ratio.get()
    }

    fn set_drawing_buffer_size(&self, width: u32, height: u32) {
        if let Some(context) = self.context.borrow().as_ref() {
            context.resize_drawing_buffer(width, height);
        }
    }
}
