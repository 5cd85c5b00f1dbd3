/// Device configuration, events, statistics and small value types

use std::time::Duration;

use crate::context::{gl, ContextAttributes};

/// How CSS-pixel coordinates become device pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelRounding {
    /// Nearest device pixel, halves away from zero
    #[default]
    Round,
    Floor,
    Ceil,
}

impl PixelRounding {
    pub fn apply(self, value: f32) -> i32 {
        let rounded = match self {
            PixelRounding::Round => value.round(),
            PixelRounding::Floor => value.floor(),
            PixelRounding::Ceil => value.ceil(),
        };
        rounded as i32
    }
}

/// Options recognized at device creation
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceOptions {
    /// Overrides the ratio reported by the surface
    pub device_pixel_ratio: Option<f32>,
    /// Allow multisampled framebuffers
    pub msaa: bool,
    /// Minimum delay between two fence checks of an async readback
    pub fence_poll_interval: Duration,
    pub pixel_rounding: PixelRounding,
    pub context_attributes: ContextAttributes,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            device_pixel_ratio: None,
            msaa: true,
            fence_poll_interval: Duration::from_millis(1),
            pixel_rounding: PixelRounding::Round,
            context_attributes: ContextAttributes::default(),
        }
    }
}

impl DeviceOptions {
    pub fn with_device_pixel_ratio(mut self, ratio: f32) -> Self {
        self.device_pixel_ratio = Some(ratio);
        self
    }

    pub fn with_msaa(mut self, msaa: bool) -> Self {
        self.msaa = msaa;
        self
    }

    pub fn with_fence_poll_interval(mut self, interval: Duration) -> Self {
        self.fence_poll_interval = interval;
        self
    }

    pub fn with_pixel_rounding(mut self, rounding: PixelRounding) -> Self {
        self.pixel_rounding = rounding;
        self
    }

    pub fn with_context_attributes(mut self, attributes: ContextAttributes) -> Self {
        self.context_attributes = attributes;
        self
    }
}

/// Axis-aligned pixel rectangle, origin at the bottom-left like the context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Rect covering a whole target
    pub fn of_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Scale a CSS-pixel rect to device pixels.
    ///
    /// Both edges are rounded, then the size is taken between them, so two
    /// rects sharing an edge in CSS pixels still share it in device pixels.
    pub fn to_device_pixels(&self, ratio: f32, rounding: PixelRounding) -> Rect {
        let x0 = rounding.apply(self.x as f32 * ratio);
        let y0 = rounding.apply(self.y as f32 * ratio);
        let x1 = rounding.apply((self.x as f32 + self.width as f32) * ratio);
        let y1 = rounding.apply((self.y as f32 + self.height as f32) * ratio);
        Rect {
            x: x0,
            y: y0,
            width: (x1 - x0).max(0) as u32,
            height: (y1 - y0).max(0) as u32,
        }
    }
}

/// Drawing-buffer size backing a surface of `client` CSS pixels
pub fn drawing_buffer_size(client: (u32, u32), ratio: f32, rounding: PixelRounding) -> (u32, u32) {
    let scale = |v: u32| rounding.apply(v as f32 * ratio).max(1) as u32;
    (scale(client.0), scale(client.1))
}

/// Lifecycle notifications dispatched to `Device::on_event` listeners
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// Rendering is suspended until the restore
    ContextLost,
    ContextRestored { restored_objects: usize },
    /// The drawing buffer changed size (device pixels)
    Resized { width: u32, height: u32 },
}

/// How vertices are assembled into primitives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    Points,
    Lines,
    LineStrip,
    LineLoop,
    Triangles,
    TriangleStrip,
    TriangleFan,
}

impl PrimitiveTopology {
    pub fn to_gl(self) -> u32 {
        match self {
            PrimitiveTopology::Points => gl::POINTS,
            PrimitiveTopology::Lines => gl::LINES,
            PrimitiveTopology::LineStrip => gl::LINE_STRIP,
            PrimitiveTopology::LineLoop => gl::LINE_LOOP,
            PrimitiveTopology::Triangles => gl::TRIANGLES,
            PrimitiveTopology::TriangleStrip => gl::TRIANGLE_STRIP,
            PrimitiveTopology::TriangleFan => gl::TRIANGLE_FAN,
        }
    }
}

/// Snapshot returned by `Device::stats`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceStats {
    /// Frames started by `run_frame`
    pub frame: u64,
    /// Draws issued since the current frame started
    pub draw_calls: u32,
    pub textures: u32,
    pub buffers: u32,
    pub programs: u32,
    pub framebuffers: u32,
    pub samplers: u32,
    pub vertex_layouts: u32,
    /// Estimated bytes of texture, buffer and renderbuffer storage
    pub gpu_memory_used: u64,
    /// Native handles waiting for the next frame boundary
    pub pending_deletions: u32,
}

#[cfg(test)]
#[path = "options_tests.rs"]
mod tests;
