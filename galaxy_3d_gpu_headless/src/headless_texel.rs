/// Texel storage for the headless context
///
/// Every texture level and renderbuffer is an `Image`: a tightly packed
/// width x height x depth block of texels in one `TexelFormat`. Clears,
/// blits, readback and mipmap generation go through `decode` / `encode`,
/// which convert a texel to and from linear RGBA floats.

use galaxy_3d_gpu::galaxy3d::context::gl;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TexelFormat {
    Rgba8,
    Rgb8,
    Rg8,
    R8,
    /// Legacy unsized luminance / alpha: the single channel lands in R or A
    Luminance8,
    Alpha8,
    Rgba16F,
    Rg16F,
    R16F,
    Rgba32F,
    Rg32F,
    R32F,
    /// 16-bit normalized depth
    Depth16,
    /// Depth kept as a 32-bit float (24-bit, 32F and packed depth-stencil)
    Depth32,
    /// Stored byte for byte, never interpreted (integer, packed and
    /// compressed formats)
    Opaque(u32),
}

impl TexelFormat {
    /// Format of a sized internal format (extended tier allocations)
    pub fn from_internal(internal_format: u32) -> Option<Self> {
        let format = match internal_format {
            gl::RGBA8 | gl::SRGB8_ALPHA8 | gl::RGBA8_SNORM | gl::RGBA8UI | gl::RGBA8I => TexelFormat::Rgba8,
            gl::RG8 | gl::RG8_SNORM | gl::RG8UI | gl::RG8I => TexelFormat::Rg8,
            gl::R8 | gl::R8_SNORM | gl::R8UI | gl::R8I => TexelFormat::R8,
            gl::RGBA16F => TexelFormat::Rgba16F,
            gl::RG16F => TexelFormat::Rg16F,
            gl::R16F => TexelFormat::R16F,
            gl::RGBA32F => TexelFormat::Rgba32F,
            gl::RG32F => TexelFormat::Rg32F,
            gl::R32F => TexelFormat::R32F,
            gl::DEPTH_COMPONENT16 => TexelFormat::Depth16,
            gl::DEPTH_COMPONENT24 | gl::DEPTH_COMPONENT32F | gl::DEPTH24_STENCIL8 => TexelFormat::Depth32,
            gl::R16UI | gl::R16I => TexelFormat::Opaque(2),
            gl::R32UI | gl::R32I | gl::RG16UI | gl::RG16I | gl::R11F_G11F_B10F => TexelFormat::Opaque(4),
            gl::RG32UI | gl::RG32I | gl::RGBA16UI | gl::RGBA16I | gl::DEPTH32F_STENCIL8 => TexelFormat::Opaque(8),
            gl::RGBA32UI | gl::RGBA32I => TexelFormat::Opaque(16),
            _ => return None,
        };
        Some(format)
    }

    /// Format of a legacy unsized allocation, or of a sized one when
    /// `internal_format` is sized
    pub fn from_transfer(internal_format: u32, format: u32, ty: u32) -> Option<Self> {
        if let Some(sized) = Self::from_internal(internal_format) {
            return Some(sized);
        }
        let texel = match (format, ty) {
            (gl::RGBA | gl::SRGB_ALPHA_EXT, gl::UNSIGNED_BYTE) => TexelFormat::Rgba8,
            (gl::RGB, gl::UNSIGNED_BYTE) => TexelFormat::Rgb8,
            (gl::LUMINANCE, gl::UNSIGNED_BYTE) => TexelFormat::Luminance8,
            (gl::ALPHA, gl::UNSIGNED_BYTE) => TexelFormat::Alpha8,
            (gl::RGBA, gl::HALF_FLOAT_OES | gl::HALF_FLOAT) => TexelFormat::Rgba16F,
            (gl::RGBA, gl::FLOAT) => TexelFormat::Rgba32F,
            (gl::DEPTH_COMPONENT, gl::UNSIGNED_SHORT) => TexelFormat::Depth16,
            (gl::DEPTH_COMPONENT, gl::UNSIGNED_INT) | (gl::DEPTH_STENCIL, gl::UNSIGNED_INT_24_8) => {
                TexelFormat::Depth32
            }
            _ => return None,
        };
        Some(texel)
    }

    pub fn bytes_per_texel(self) -> u32 {
        match self {
            TexelFormat::R8 | TexelFormat::Luminance8 | TexelFormat::Alpha8 => 1,
            TexelFormat::Rg8 | TexelFormat::R16F | TexelFormat::Depth16 => 2,
            TexelFormat::Rgb8 => 3,
            TexelFormat::Rgba8 | TexelFormat::Rg16F | TexelFormat::R32F | TexelFormat::Depth32 => 4,
            TexelFormat::Rgba16F | TexelFormat::Rg32F => 8,
            TexelFormat::Rgba32F => 16,
            TexelFormat::Opaque(bytes) => bytes,
        }
    }

    pub fn is_depth(self) -> bool {
        matches!(self, TexelFormat::Depth16 | TexelFormat::Depth32)
    }

    /// Float color formats need a color-buffer extension to be rendered to
    pub fn is_float_color(self) -> bool {
        matches!(
            self,
            TexelFormat::Rgba16F
                | TexelFormat::Rg16F
                | TexelFormat::R16F
                | TexelFormat::Rgba32F
                | TexelFormat::Rg32F
                | TexelFormat::R32F
        )
    }

    pub fn is_half_float(self) -> bool {
        matches!(self, TexelFormat::Rgba16F | TexelFormat::Rg16F | TexelFormat::R16F)
    }

    /// Linear RGBA of one texel. Depth formats report depth in R.
    pub fn decode(self, bytes: &[u8]) -> [f32; 4] {
        let unorm = |b: u8| b as f32 / 255.0;
        let f32_at = |i: usize| f32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        let f16_at = |i: usize| half_to_f32(u16::from_le_bytes([bytes[i], bytes[i + 1]]));
        match self {
            TexelFormat::Rgba8 => [unorm(bytes[0]), unorm(bytes[1]), unorm(bytes[2]), unorm(bytes[3])],
            TexelFormat::Rgb8 => [unorm(bytes[0]), unorm(bytes[1]), unorm(bytes[2]), 1.0],
            TexelFormat::Rg8 => [unorm(bytes[0]), unorm(bytes[1]), 0.0, 1.0],
            TexelFormat::R8 => [unorm(bytes[0]), 0.0, 0.0, 1.0],
            TexelFormat::Luminance8 => {
                let l = unorm(bytes[0]);
                [l, l, l, 1.0]
            }
            TexelFormat::Alpha8 => [0.0, 0.0, 0.0, unorm(bytes[0])],
            TexelFormat::Rgba16F => [f16_at(0), f16_at(2), f16_at(4), f16_at(6)],
            TexelFormat::Rg16F => [f16_at(0), f16_at(2), 0.0, 1.0],
            TexelFormat::R16F => [f16_at(0), 0.0, 0.0, 1.0],
            TexelFormat::Rgba32F => [f32_at(0), f32_at(4), f32_at(8), f32_at(12)],
            TexelFormat::Rg32F => [f32_at(0), f32_at(4), 0.0, 1.0],
            TexelFormat::R32F => [f32_at(0), 0.0, 0.0, 1.0],
            TexelFormat::Depth16 => {
                let d = u16::from_le_bytes([bytes[0], bytes[1]]) as f32 / 65535.0;
                [d, 0.0, 0.0, 1.0]
            }
            TexelFormat::Depth32 => [f32_at(0), 0.0, 0.0, 1.0],
            TexelFormat::Opaque(_) => [0.0; 4],
        }
    }

    /// Store `rgba` into `dst` (exactly `bytes_per_texel` bytes)
    pub fn encode(self, rgba: [f32; 4], dst: &mut [u8]) {
        let unorm = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        let put_f32 = |dst: &mut [u8], i: usize, v: f32| dst[i..i + 4].copy_from_slice(&v.to_le_bytes());
        let put_f16 = |dst: &mut [u8], i: usize, v: f32| dst[i..i + 2].copy_from_slice(&f32_to_half(v).to_le_bytes());
        match self {
            TexelFormat::Rgba8 => {
                for (d, v) in dst.iter_mut().zip(rgba) {
                    *d = unorm(v);
                }
            }
            TexelFormat::Rgb8 => {
                for (d, v) in dst.iter_mut().zip(rgba).take(3) {
                    *d = unorm(v);
                }
            }
            TexelFormat::Rg8 => {
                dst[0] = unorm(rgba[0]);
                dst[1] = unorm(rgba[1]);
            }
            TexelFormat::R8 | TexelFormat::Luminance8 => dst[0] = unorm(rgba[0]),
            TexelFormat::Alpha8 => dst[0] = unorm(rgba[3]),
            TexelFormat::Rgba16F => (0..4).for_each(|c| put_f16(dst, c * 2, rgba[c])),
            TexelFormat::Rg16F => (0..2).for_each(|c| put_f16(dst, c * 2, rgba[c])),
            TexelFormat::R16F => put_f16(dst, 0, rgba[0]),
            TexelFormat::Rgba32F => (0..4).for_each(|c| put_f32(dst, c * 4, rgba[c])),
            TexelFormat::Rg32F => (0..2).for_each(|c| put_f32(dst, c * 4, rgba[c])),
            TexelFormat::R32F | TexelFormat::Depth32 => put_f32(dst, 0, rgba[0]),
            TexelFormat::Depth16 => {
                let d = (rgba[0].clamp(0.0, 1.0) * 65535.0).round() as u16;
                dst[0..2].copy_from_slice(&d.to_le_bytes());
            }
            TexelFormat::Opaque(_) => dst.fill(0),
        }
    }
}

/// IEEE half to single precision
pub fn half_to_f32(bits: u16) -> f32 {
    let sign = if bits & 0x8000 != 0 { -1.0 } else { 1.0 };
    let exponent = ((bits >> 10) & 0x1F) as i32;
    let mantissa = (bits & 0x3FF) as f32;
    match exponent {
        0 => sign * mantissa * 2f32.powi(-24),
        31 if mantissa == 0.0 => sign * f32::INFINITY,
        31 => f32::NAN,
        _ => sign * (1.0 + mantissa / 1024.0) * 2f32.powi(exponent - 15),
    }
}

/// Single to half precision, round to nearest
pub fn f32_to_half(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    if value.is_nan() {
        return sign | 0x7E00;
    }
    let abs = value.abs();
    if abs >= 65520.0 {
        return sign | 0x7C00;
    }
    if abs < 2f32.powi(-14) {
        // subnormal range
        return sign | (abs / 2f32.powi(-24)).round() as u16;
    }
    let exponent = abs.log2().floor() as i32;
    let mantissa = ((abs / 2f32.powi(exponent) - 1.0) * 1024.0).round() as u32;
    let (exponent, mantissa) = if mantissa == 1024 { (exponent + 1, 0) } else { (exponent, mantissa) };
    sign | (((exponent + 15) as u16) << 10) | mantissa as u16
}

/// Tightly packed block of texels
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub format: TexelFormat,
    /// Sample count of multisample renderbuffers (stored resolved)
    pub samples: u32,
    pub data: Vec<u8>,
}

impl Image {
    pub fn new(width: u32, height: u32, depth: u32, format: TexelFormat) -> Self {
        let len = width as usize * height as usize * depth as usize * format.bytes_per_texel() as usize;
        Self {
            width,
            height,
            depth,
            format,
            samples: 0,
            data: vec![0; len],
        }
    }

    /// Image holding opaque (compressed) bytes as uploaded
    pub fn opaque(width: u32, height: u32, depth: u32, data: &[u8]) -> Self {
        Self {
            width,
            height,
            depth,
            format: TexelFormat::Opaque(0),
            samples: 0,
            data: data.to_vec(),
        }
    }

    fn offset(&self, x: u32, y: u32, z: u32) -> usize {
        let bpp = self.format.bytes_per_texel() as usize;
        ((z as usize * self.height as usize + y as usize) * self.width as usize + x as usize) * bpp
    }

    pub fn contains(&self, x: u32, y: u32, z: u32, width: u32, height: u32, depth: u32) -> bool {
        x as u64 + width as u64 <= self.width as u64
            && y as u64 + height as u64 <= self.height as u64
            && z as u64 + depth as u64 <= self.depth as u64
    }

    pub fn texel(&self, x: u32, y: u32, z: u32) -> [f32; 4] {
        let bpp = self.format.bytes_per_texel() as usize;
        if bpp == 0 {
            return [0.0; 4];
        }
        let at = self.offset(x, y, z);
        self.format.decode(&self.data[at..at + bpp])
    }

    pub fn set_texel(&mut self, x: u32, y: u32, z: u32, rgba: [f32; 4]) {
        let bpp = self.format.bytes_per_texel() as usize;
        if bpp == 0 {
            return;
        }
        let at = self.offset(x, y, z);
        self.format.encode(rgba, &mut self.data[at..at + bpp]);
    }

    /// Copy client rows into a region. `pixels` holds packed rows of the
    /// region (unpack alignment 1).
    #[allow(clippy::too_many_arguments)]
    pub fn write_region(&mut self, x: u32, y: u32, z: u32, width: u32, height: u32, depth: u32, pixels: &[u8]) -> bool {
        let bpp = self.format.bytes_per_texel() as usize;
        let row = width as usize * bpp;
        if bpp == 0 || !self.contains(x, y, z, width, height, depth) || pixels.len() < row * height as usize * depth as usize {
            return false;
        }
        for layer in 0..depth {
            for line in 0..height {
                let src = ((layer * height + line) as usize) * row;
                let dst = self.offset(x, y + line, z + layer);
                self.data[dst..dst + row].copy_from_slice(&pixels[src..src + row]);
            }
        }
        true
    }

    /// Fill a 2D region of layer `z` with one color
    pub fn fill(&mut self, x: u32, y: u32, z: u32, width: u32, height: u32, rgba: [f32; 4], mask: [bool; 4]) {
        let x_end = (x + width).min(self.width);
        let y_end = (y + height).min(self.height);
        let full_mask = mask.iter().all(|m| *m);
        for py in y.min(y_end)..y_end {
            for px in x.min(x_end)..x_end {
                let value = if full_mask {
                    rgba
                } else {
                    let mut current = self.texel(px, py, z);
                    for c in 0..4 {
                        if mask[c] {
                            current[c] = rgba[c];
                        }
                    }
                    current
                };
                self.set_texel(px, py, z, value);
            }
        }
    }

    /// Next mip level: 2x2 box filter, odd edges clamped
    pub fn downsample(&self) -> Image {
        let width = (self.width / 2).max(1);
        let height = (self.height / 2).max(1);
        let mut next = Image::new(width, height, self.depth, self.format);
        for z in 0..self.depth {
            for y in 0..height {
                for x in 0..width {
                    let mut sum = [0.0f32; 4];
                    for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                        let sx = (x * 2 + dx).min(self.width - 1);
                        let sy = (y * 2 + dy).min(self.height - 1);
                        let texel = self.texel(sx, sy, z);
                        for c in 0..4 {
                            sum[c] += texel[c] / 4.0;
                        }
                    }
                    next.set_texel(x, y, z, sum);
                }
            }
        }
        next
    }
}

#[cfg(test)]
#[path = "headless_texel_tests.rs"]
mod tests;
