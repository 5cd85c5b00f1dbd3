/// Framebuffer objects of the headless context
///
/// Attachments point at texture levels (or layers) and renderbuffers.
/// Completeness follows the host rules for each tier; clears, blits and
/// reads resolve the attachments to their images and work on texels.

use galaxy_3d_gpu::galaxy3d::context::gl;
use rustc_hash::FxHashMap;

use crate::headless_context::State;
use crate::headless_texel::{Image, TexelFormat};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Attachment {
    /// Layered textures use their bind target as `image_target`
    Texture {
        texture: u32,
        image_target: u32,
        level: u32,
        layer: u32,
    },
    Renderbuffer(u32),
}

pub(crate) struct FramebufferObject {
    pub(crate) attachments: FxHashMap<u32, Attachment>,
    pub(crate) draw_buffers: Vec<u32>,
    pub(crate) read_buffer: u32,
}

impl Default for FramebufferObject {
    fn default() -> Self {
        Self {
            attachments: FxHashMap::default(),
            draw_buffers: vec![gl::COLOR_ATTACHMENT0],
            read_buffer: gl::COLOR_ATTACHMENT0,
        }
    }
}

/// Color formats the context can render to
#[derive(Debug, Clone, Copy)]
pub(crate) struct RenderSupport {
    pub(crate) legacy: bool,
    pub(crate) float32: bool,
    pub(crate) float16: bool,
}

/// Image behind an attachment point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ImageRef {
    DefaultColor,
    DefaultDepth,
    Texture { texture: u32, key: (u32, u32), layer: u32 },
    Renderbuffer(u32),
}

impl ImageRef {
    fn of(attachment: Attachment) -> Self {
        match attachment {
            Attachment::Texture {
                texture,
                image_target,
                level,
                layer,
            } => ImageRef::Texture {
                texture,
                key: (image_target, level),
                layer,
            },
            Attachment::Renderbuffer(id) => ImageRef::Renderbuffer(id),
        }
    }
}

fn is_color_point(point: u32) -> bool {
    point >= gl::COLOR_ATTACHMENT0 && point < gl::COLOR_ATTACHMENT0 + 16
}

/// Scissor rectangle clipped to an image, as (x, y, width, height)
fn clip(scissor: Option<[i32; 4]>, width: u32, height: u32) -> (u32, u32, u32, u32) {
    match scissor {
        None => (0, 0, width, height),
        Some([x, y, w, h]) => {
            let x0 = x.clamp(0, width as i32) as u32;
            let y0 = y.clamp(0, height as i32) as u32;
            let x1 = x.saturating_add(w).clamp(0, width as i32) as u32;
            let y1 = y.saturating_add(h).clamp(0, height as i32) as u32;
            (x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0))
        }
    }
}

/// Source coordinate sampled for destination pixel `value` (nearest)
fn map_coordinate(value: i32, dst0: i32, dst1: i32, src0: i32, src1: i32) -> i32 {
    let t = (value as f32 + 0.5 - dst0 as f32) / (dst1 - dst0) as f32;
    (src0 as f32 + t * (src1 - src0) as f32).floor() as i32
}

impl State {
    pub(crate) fn image(&self, target: ImageRef) -> Option<(&Image, u32)> {
        match target {
            ImageRef::DefaultColor => Some((&self.default_color, 0)),
            ImageRef::DefaultDepth => Some((&self.default_depth, 0)),
            ImageRef::Texture { texture, key, layer } => {
                self.textures.get(&texture)?.images.get(&key).map(|image| (image, layer))
            }
            ImageRef::Renderbuffer(id) => self.renderbuffers.get(&id)?.image.as_ref().map(|image| (image, 0)),
        }
    }

    pub(crate) fn image_mut(&mut self, target: ImageRef) -> Option<(&mut Image, u32)> {
        match target {
            ImageRef::DefaultColor => Some((&mut self.default_color, 0)),
            ImageRef::DefaultDepth => Some((&mut self.default_depth, 0)),
            ImageRef::Texture { texture, key, layer } => self
                .textures
                .get_mut(&texture)?
                .images
                .get_mut(&key)
                .map(|image| (image, layer)),
            ImageRef::Renderbuffer(id) => self
                .renderbuffers
                .get_mut(&id)?
                .image
                .as_mut()
                .map(|image| (image, 0)),
        }
    }

    /// Images the draw buffers of `framebuffer` write to
    pub(crate) fn color_targets(&self, framebuffer: Option<u32>) -> Vec<ImageRef> {
        let Some(id) = framebuffer else {
            return vec![ImageRef::DefaultColor];
        };
        let Some(object) = self.framebuffers.get(&id) else {
            return Vec::new();
        };
        object
            .draw_buffers
            .iter()
            .filter(|buffer| **buffer != gl::NONE)
            .filter_map(|buffer| object.attachments.get(buffer))
            .map(|attachment| ImageRef::of(*attachment))
            .collect()
    }

    pub(crate) fn depth_target(&self, framebuffer: Option<u32>) -> Option<ImageRef> {
        let Some(id) = framebuffer else {
            return Some(ImageRef::DefaultDepth);
        };
        let object = self.framebuffers.get(&id)?;
        object
            .attachments
            .get(&gl::DEPTH_ATTACHMENT)
            .or_else(|| object.attachments.get(&gl::DEPTH_STENCIL_ATTACHMENT))
            .map(|attachment| ImageRef::of(*attachment))
    }

    /// Image selected by the read buffer of `framebuffer`
    pub(crate) fn read_target(&self, framebuffer: Option<u32>) -> Option<ImageRef> {
        let Some(id) = framebuffer else {
            return Some(ImageRef::DefaultColor);
        };
        let object = self.framebuffers.get(&id)?;
        if object.read_buffer == gl::NONE {
            return None;
        }
        object.attachments.get(&object.read_buffer).map(|attachment| ImageRef::of(*attachment))
    }

    pub(crate) fn texel_at(&self, framebuffer: Option<u32>, x: u32, y: u32) -> Option<[f32; 4]> {
        let (image, layer) = self.image(self.read_target(framebuffer)?)?;
        (x < image.width && y < image.height).then(|| image.texel(x, y, layer))
    }

    /// Region of the read image, row-major; outside texels read as zero
    pub(crate) fn read_texels(&self, framebuffer: Option<u32>, x: u32, y: u32, width: u32, height: u32) -> Option<Vec<[f32; 4]>> {
        let (image, layer) = self.image(self.read_target(framebuffer)?)?;
        let mut texels = Vec::with_capacity(width as usize * height as usize);
        for row in 0..height {
            for column in 0..width {
                let (px, py) = (x + column, y + row);
                let texel = if px < image.width && py < image.height {
                    image.texel(px, py, layer)
                } else {
                    [0.0; 4]
                };
                texels.push(texel);
            }
        }
        Some(texels)
    }

    pub(crate) fn framebuffer_status(&self, framebuffer: Option<u32>, support: &RenderSupport) -> u32 {
        let Some(id) = framebuffer else {
            return gl::FRAMEBUFFER_COMPLETE;
        };
        let Some(object) = self.framebuffers.get(&id) else {
            return gl::FRAMEBUFFER_UNSUPPORTED;
        };
        if object.attachments.is_empty() {
            return gl::FRAMEBUFFER_INCOMPLETE_MISSING_ATTACHMENT;
        }

        let mut size: Option<(u32, u32)> = None;
        let mut samples: Option<u32> = None;
        for (point, attachment) in &object.attachments {
            let Some((image, layer)) = self.image(ImageRef::of(*attachment)) else {
                return gl::FRAMEBUFFER_INCOMPLETE_ATTACHMENT;
            };
            if layer >= image.depth || image.width == 0 || image.height == 0 {
                return gl::FRAMEBUFFER_INCOMPLETE_ATTACHMENT;
            }
            if image.format == TexelFormat::Opaque(0) || is_color_point(*point) == image.format.is_depth() {
                return gl::FRAMEBUFFER_INCOMPLETE_ATTACHMENT;
            }
            if image.format.is_float_color() {
                let renderable = if image.format.is_half_float() { support.float16 } else { support.float32 };
                if !renderable {
                    return gl::FRAMEBUFFER_UNSUPPORTED;
                }
            }
            match size {
                Some(existing) if existing != (image.width, image.height) && support.legacy => {
                    return gl::FRAMEBUFFER_INCOMPLETE_DIMENSIONS;
                }
                _ => size = Some((image.width, image.height)),
            }
            match samples {
                Some(existing) if existing != image.samples => {
                    return gl::FRAMEBUFFER_INCOMPLETE_MULTISAMPLE;
                }
                _ => samples = Some(image.samples),
            }
        }
        gl::FRAMEBUFFER_COMPLETE
    }

    /// Clear the draw images of `framebuffer`, honoring scissor and masks
    pub(crate) fn clear(&mut self, framebuffer: Option<u32>, mask: u32) {
        let scissor = self.capabilities.contains(&gl::SCISSOR_TEST).then_some(self.fixed.scissor);
        let fixed = self.fixed;
        if mask & gl::COLOR_BUFFER_BIT != 0 {
            for target in self.color_targets(framebuffer) {
                if let Some((image, layer)) = self.image_mut(target) {
                    let (x, y, width, height) = clip(scissor, image.width, image.height);
                    image.fill(x, y, layer, width, height, fixed.clear_color, fixed.color_mask);
                }
            }
        }
        if mask & gl::DEPTH_BUFFER_BIT != 0 && fixed.depth_mask {
            if let Some((image, layer)) = self.depth_target(framebuffer).and_then(|t| self.image_mut(t)) {
                let (x, y, width, height) = clip(scissor, image.width, image.height);
                image.fill(x, y, layer, width, height, [fixed.clear_depth, 0.0, 0.0, 0.0], [true; 4]);
            }
        }
    }

    /// Nearest-filtered copy of `src` rect into `dst` rect; either may be flipped
    pub(crate) fn blit_image(&mut self, source: ImageRef, destination: ImageRef, src: [i32; 4], dst: [i32; 4]) {
        let Some((image, src_layer)) = self.image(source) else {
            return;
        };
        let snapshot = image.clone();
        let Some((target, dst_layer)) = self.image_mut(destination) else {
            return;
        };
        let (x_start, x_end) = (dst[0].min(dst[2]), dst[0].max(dst[2]));
        let (y_start, y_end) = (dst[1].min(dst[3]), dst[1].max(dst[3]));
        for y in y_start.max(0)..y_end.min(target.height as i32) {
            let sy = map_coordinate(y, dst[1], dst[3], src[1], src[3]);
            if sy < 0 || sy >= snapshot.height as i32 {
                continue;
            }
            for x in x_start.max(0)..x_end.min(target.width as i32) {
                let sx = map_coordinate(x, dst[0], dst[2], src[0], src[2]);
                if sx < 0 || sx >= snapshot.width as i32 {
                    continue;
                }
                let texel = snapshot.texel(sx as u32, sy as u32, src_layer);
                target.set_texel(x as u32, y as u32, dst_layer, texel);
            }
        }
    }

    /// Drop attachments matching `matches` from every framebuffer
    pub(crate) fn detach_everywhere(&mut self, matches: impl Fn(&Attachment) -> bool) {
        for framebuffer in self.framebuffers.values_mut() {
            framebuffer.attachments.retain(|_, attachment| !matches(attachment));
        }
    }
}
