/// Logical pixel formats and their static block table
///
/// The table here is tier-independent: block footprint, bytes per block and
/// the broad classification of each format. Which formats are actually
/// available, and with which context enums, is decided by the capability
/// probe.

/// Logical texture format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum TextureFormat {
    // Color 8-bit
    R8_UNORM,
    R8_SNORM,
    R8_UINT,
    R8_SINT,
    R8G8_UNORM,
    R8G8_SNORM,
    R8G8_UINT,
    R8G8_SINT,
    R8G8B8A8_UNORM,
    R8G8B8A8_SRGB,
    R8G8B8A8_SNORM,
    R8G8B8A8_UINT,
    R8G8B8A8_SINT,

    // Color 16/32-bit
    R16_UINT,
    R16_SINT,
    R16_SFLOAT,
    R16G16_SFLOAT,
    R16G16B16A16_UINT,
    R16G16B16A16_SFLOAT,
    R32_UINT,
    R32_SINT,
    R32_SFLOAT,
    R32G32_SFLOAT,
    R32G32B32A32_UINT,
    R32G32B32A32_SFLOAT,
    B10G11R11_UFLOAT,

    // Depth / stencil
    D16_UNORM,
    D24_UNORM,
    D32_FLOAT,
    D24_UNORM_S8_UINT,
    D32_FLOAT_S8_UINT,

    // Block compressed: S3TC / RGTC / BPTC
    BC1_RGBA_UNORM,
    BC1_RGBA_SRGB,
    BC2_RGBA_UNORM,
    BC2_RGBA_SRGB,
    BC3_RGBA_UNORM,
    BC3_RGBA_SRGB,
    BC4_R_UNORM,
    BC4_R_SNORM,
    BC5_RG_UNORM,
    BC5_RG_SNORM,
    BC6H_RGB_UFLOAT,
    BC6H_RGB_SFLOAT,
    BC7_RGBA_UNORM,
    BC7_RGBA_SRGB,

    // Block compressed: ETC2
    ETC2_RGB8_UNORM,
    ETC2_RGB8_SRGB,
    ETC2_RGB8A1_UNORM,
    ETC2_RGBA8_UNORM,
    ETC2_RGBA8_SRGB,

    // Block compressed: ASTC
    ASTC_4X4_UNORM,
    ASTC_5X5_UNORM,
    ASTC_6X6_UNORM,
    ASTC_8X8_UNORM,
    ASTC_10X10_UNORM,
    ASTC_12X12_UNORM,
}

/// Compressed format family, each gated by one context extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionFamily {
    S3tc,
    S3tcSrgb,
    Rgtc,
    Bptc,
    Etc2,
    Astc,
}

/// Broad sample type of a format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    /// Normalized fixed point (unorm/snorm/srgb)
    Normalized,
    /// Integer, never filterable
    Integer,
    /// 16-bit float
    HalfFloat,
    /// 32-bit float
    Float,
    /// Depth (optionally with stencil)
    Depth,
    /// Block compressed
    Compressed,
}

/// Static per-format footprint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatBlock {
    pub width: u32,
    pub height: u32,
    pub bytes: u32,
}

impl TextureFormat {
    /// Every logical format, in declaration order
    pub const ALL: &'static [TextureFormat] = &[
        TextureFormat::R8_UNORM,
        TextureFormat::R8_SNORM,
        TextureFormat::R8_UINT,
        TextureFormat::R8_SINT,
        TextureFormat::R8G8_UNORM,
        TextureFormat::R8G8_SNORM,
        TextureFormat::R8G8_UINT,
        TextureFormat::R8G8_SINT,
        TextureFormat::R8G8B8A8_UNORM,
        TextureFormat::R8G8B8A8_SRGB,
        TextureFormat::R8G8B8A8_SNORM,
        TextureFormat::R8G8B8A8_UINT,
        TextureFormat::R8G8B8A8_SINT,
        TextureFormat::R16_UINT,
        TextureFormat::R16_SINT,
        TextureFormat::R16_SFLOAT,
        TextureFormat::R16G16_SFLOAT,
        TextureFormat::R16G16B16A16_UINT,
        TextureFormat::R16G16B16A16_SFLOAT,
        TextureFormat::R32_UINT,
        TextureFormat::R32_SINT,
        TextureFormat::R32_SFLOAT,
        TextureFormat::R32G32_SFLOAT,
        TextureFormat::R32G32B32A32_UINT,
        TextureFormat::R32G32B32A32_SFLOAT,
        TextureFormat::B10G11R11_UFLOAT,
        TextureFormat::D16_UNORM,
        TextureFormat::D24_UNORM,
        TextureFormat::D32_FLOAT,
        TextureFormat::D24_UNORM_S8_UINT,
        TextureFormat::D32_FLOAT_S8_UINT,
        TextureFormat::BC1_RGBA_UNORM,
        TextureFormat::BC1_RGBA_SRGB,
        TextureFormat::BC2_RGBA_UNORM,
        TextureFormat::BC2_RGBA_SRGB,
        TextureFormat::BC3_RGBA_UNORM,
        TextureFormat::BC3_RGBA_SRGB,
        TextureFormat::BC4_R_UNORM,
        TextureFormat::BC4_R_SNORM,
        TextureFormat::BC5_RG_UNORM,
        TextureFormat::BC5_RG_SNORM,
        TextureFormat::BC6H_RGB_UFLOAT,
        TextureFormat::BC6H_RGB_SFLOAT,
        TextureFormat::BC7_RGBA_UNORM,
        TextureFormat::BC7_RGBA_SRGB,
        TextureFormat::ETC2_RGB8_UNORM,
        TextureFormat::ETC2_RGB8_SRGB,
        TextureFormat::ETC2_RGB8A1_UNORM,
        TextureFormat::ETC2_RGBA8_UNORM,
        TextureFormat::ETC2_RGBA8_SRGB,
        TextureFormat::ASTC_4X4_UNORM,
        TextureFormat::ASTC_5X5_UNORM,
        TextureFormat::ASTC_6X6_UNORM,
        TextureFormat::ASTC_8X8_UNORM,
        TextureFormat::ASTC_10X10_UNORM,
        TextureFormat::ASTC_12X12_UNORM,
    ];

    /// Block footprint (1x1 for uncompressed formats)
    pub fn block(self) -> FormatBlock {
        use TextureFormat::*;
        let (width, height, bytes) = match self {
            R8_UNORM | R8_SNORM | R8_UINT | R8_SINT => (1, 1, 1),
            R8G8_UNORM | R8G8_SNORM | R8G8_UINT | R8G8_SINT => (1, 1, 2),
            R16_UINT | R16_SINT | R16_SFLOAT => (1, 1, 2),
            R8G8B8A8_UNORM | R8G8B8A8_SRGB | R8G8B8A8_SNORM | R8G8B8A8_UINT | R8G8B8A8_SINT => {
                (1, 1, 4)
            }
            R16G16_SFLOAT | R32_UINT | R32_SINT | R32_SFLOAT | B10G11R11_UFLOAT => (1, 1, 4),
            R16G16B16A16_UINT | R16G16B16A16_SFLOAT | R32G32_SFLOAT => (1, 1, 8),
            R32G32B32A32_UINT | R32G32B32A32_SFLOAT => (1, 1, 16),
            D16_UNORM => (1, 1, 2),
            D24_UNORM | D32_FLOAT => (1, 1, 4),
            // Packed 24/8
            D24_UNORM_S8_UINT => (1, 1, 4),
            // 32-bit float depth, 24 unused bits, 8-bit stencil
            D32_FLOAT_S8_UINT => (1, 1, 8),
            BC1_RGBA_UNORM | BC1_RGBA_SRGB | BC4_R_UNORM | BC4_R_SNORM => (4, 4, 8),
            BC2_RGBA_UNORM | BC2_RGBA_SRGB | BC3_RGBA_UNORM | BC3_RGBA_SRGB => (4, 4, 16),
            BC5_RG_UNORM | BC5_RG_SNORM => (4, 4, 16),
            BC6H_RGB_UFLOAT | BC6H_RGB_SFLOAT | BC7_RGBA_UNORM | BC7_RGBA_SRGB => (4, 4, 16),
            ETC2_RGB8_UNORM | ETC2_RGB8_SRGB | ETC2_RGB8A1_UNORM => (4, 4, 8),
            ETC2_RGBA8_UNORM | ETC2_RGBA8_SRGB => (4, 4, 16),
            ASTC_4X4_UNORM => (4, 4, 16),
            ASTC_5X5_UNORM => (5, 5, 16),
            ASTC_6X6_UNORM => (6, 6, 16),
            ASTC_8X8_UNORM => (8, 8, 16),
            ASTC_10X10_UNORM => (10, 10, 16),
            ASTC_12X12_UNORM => (12, 12, 16),
        };
        FormatBlock { width, height, bytes }
    }

    /// Bytes per pixel for uncompressed formats
    pub fn bytes_per_pixel(self) -> Option<u32> {
        if self.is_compressed() {
            None
        } else {
            Some(self.block().bytes)
        }
    }

    pub fn sample_kind(self) -> SampleKind {
        use TextureFormat::*;
        match self {
            R8_UINT | R8_SINT | R8G8_UINT | R8G8_SINT | R8G8B8A8_UINT | R8G8B8A8_SINT
            | R16_UINT | R16_SINT | R16G16B16A16_UINT | R32_UINT | R32_SINT
            | R32G32B32A32_UINT => SampleKind::Integer,
            R16_SFLOAT | R16G16_SFLOAT | R16G16B16A16_SFLOAT | B10G11R11_UFLOAT => {
                SampleKind::HalfFloat
            }
            R32_SFLOAT | R32G32_SFLOAT | R32G32B32A32_SFLOAT => SampleKind::Float,
            D16_UNORM | D24_UNORM | D32_FLOAT | D24_UNORM_S8_UINT | D32_FLOAT_S8_UINT => {
                SampleKind::Depth
            }
            _ if self.compression_family().is_some() => SampleKind::Compressed,
            _ => SampleKind::Normalized,
        }
    }

    pub fn compression_family(self) -> Option<CompressionFamily> {
        use TextureFormat::*;
        match self {
            BC1_RGBA_UNORM | BC2_RGBA_UNORM | BC3_RGBA_UNORM => Some(CompressionFamily::S3tc),
            BC1_RGBA_SRGB | BC2_RGBA_SRGB | BC3_RGBA_SRGB => Some(CompressionFamily::S3tcSrgb),
            BC4_R_UNORM | BC4_R_SNORM | BC5_RG_UNORM | BC5_RG_SNORM => Some(CompressionFamily::Rgtc),
            BC6H_RGB_UFLOAT | BC6H_RGB_SFLOAT | BC7_RGBA_UNORM | BC7_RGBA_SRGB => {
                Some(CompressionFamily::Bptc)
            }
            ETC2_RGB8_UNORM | ETC2_RGB8_SRGB | ETC2_RGB8A1_UNORM | ETC2_RGBA8_UNORM
            | ETC2_RGBA8_SRGB => Some(CompressionFamily::Etc2),
            ASTC_4X4_UNORM | ASTC_5X5_UNORM | ASTC_6X6_UNORM | ASTC_8X8_UNORM
            | ASTC_10X10_UNORM | ASTC_12X12_UNORM => Some(CompressionFamily::Astc),
            _ => None,
        }
    }

    pub fn is_compressed(self) -> bool {
        self.compression_family().is_some()
    }

    pub fn is_depth(self) -> bool {
        self.sample_kind() == SampleKind::Depth
    }

    pub fn has_stencil(self) -> bool {
        matches!(self, TextureFormat::D24_UNORM_S8_UINT | TextureFormat::D32_FLOAT_S8_UINT)
    }

    pub fn is_srgb(self) -> bool {
        use TextureFormat::*;
        matches!(
            self,
            R8G8B8A8_SRGB | BC1_RGBA_SRGB | BC2_RGBA_SRGB | BC3_RGBA_SRGB | BC7_RGBA_SRGB
                | ETC2_RGB8_SRGB | ETC2_RGBA8_SRGB
        )
    }

    /// Byte size of a `width`x`height` image, rounded up to whole blocks
    pub fn image_size(self, width: u32, height: u32) -> u64 {
        let block = self.block();
        let blocks_x = width.div_ceil(block.width).max(1) as u64;
        let blocks_y = height.div_ceil(block.height).max(1) as u64;
        blocks_x * blocks_y * block.bytes as u64
    }
}
