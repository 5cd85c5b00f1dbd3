/// Image and video sources for texture uploads

use std::borrow::Cow;
use std::cell::{Cell, RefCell};

/// Anything that can hand out an RGBA8 image (decoded images, canvases)
pub trait ImageSource {
    /// Width and height in pixels
    fn dimensions(&self) -> (u32, u32);

    /// Tightly packed RGBA8 rows, top row first
    fn rgba8(&self) -> Cow<'_, [u8]>;
}

/// A source whose content changes over time
pub trait VideoSource: ImageSource {
    /// Identifier of the frame currently available, `None` before the first one
    fn frame_id(&self) -> Option<u64>;

    /// Whether the host notifies new frames. When true the texture uploads at
    /// frame begin whenever `frame_id` advances; otherwise it is pumped by
    /// every bind group apply that samples it.
    fn has_frame_callback(&self) -> bool {
        false
    }
}

/// In-memory RGBA8 image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl ImageData {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self { width, height, pixels }
    }

    /// Image filled with one color
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = rgba.iter().copied().cycle().take((width * height * 4) as usize).collect();
        Self { width, height, pixels }
    }
}

impl ImageSource for ImageData {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn rgba8(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(&self.pixels)
    }
}

/// Video source fed by hand, one frame at a time
pub struct FrameQueue {
    frame: RefCell<ImageData>,
    frame_id: Cell<Option<u64>>,
    callback: bool,
}

impl FrameQueue {
    /// `callback` selects host-notified (true) or manually pumped (false) mode
    pub fn new(width: u32, height: u32, callback: bool) -> Self {
        Self {
            frame: RefCell::new(ImageData::solid(width, height, [0, 0, 0, 255])),
            frame_id: Cell::new(None),
            callback,
        }
    }

    /// Publish a new frame
    pub fn push(&self, frame: ImageData) {
        *self.frame.borrow_mut() = frame;
        self.frame_id.set(Some(self.frame_id.get().map_or(0, |id| id + 1)));
    }
}

impl ImageSource for FrameQueue {
    fn dimensions(&self) -> (u32, u32) {
        let frame = self.frame.borrow();
        (frame.width, frame.height)
    }

    fn rgba8(&self) -> Cow<'_, [u8]> {
        Cow::Owned(self.frame.borrow().pixels.clone())
    }
}

impl VideoSource for FrameQueue {
    fn frame_id(&self) -> Option<u64> {
        self.frame_id.get()
    }

    fn has_frame_callback(&self) -> bool {
        self.callback
    }
}
