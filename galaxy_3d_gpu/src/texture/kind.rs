/// Texture kinds and the pure mip-chain rules
///
/// Every texture variant shares one allocation routine; what differs between
/// them (bind target, faces, whether depth takes part in the mip chain) is
/// looked up here.

use bitflags::bitflags;

use crate::context::{gl, ContextTier};

/// Variant of a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    Tex2D,
    Tex2DArray,
    Tex3D,
    Cube,
    /// 2D texture fed from a video source, never mipmapped
    Video,
}

impl TextureKind {
    /// Target the texture object is bound to
    pub fn bind_target(self) -> u32 {
        match self {
            TextureKind::Tex2D | TextureKind::Video => gl::TEXTURE_2D,
            TextureKind::Tex2DArray => gl::TEXTURE_2D_ARRAY,
            TextureKind::Tex3D => gl::TEXTURE_3D,
            TextureKind::Cube => gl::TEXTURE_CUBE_MAP,
        }
    }

    /// Target of one face's image (cube faces have their own)
    pub fn image_target(self, face: u32) -> u32 {
        match self {
            TextureKind::Cube => gl::TEXTURE_CUBE_MAP_POSITIVE_X + face,
            other => other.bind_target(),
        }
    }

    pub fn face_count(self) -> u32 {
        match self {
            TextureKind::Cube => 6,
            _ => 1,
        }
    }

    /// Stored as a stack of layers/slices
    pub fn is_layered(self) -> bool {
        matches!(self, TextureKind::Tex2DArray | TextureKind::Tex3D)
    }

    /// Depth shrinks along the mip chain (3D only; array layers do not)
    pub fn mips_include_depth(self) -> bool {
        self == TextureKind::Tex3D
    }

    pub fn allows_mipmaps(self) -> bool {
        self != TextureKind::Video
    }

    pub fn needs_extended_tier(self) -> bool {
        self.is_layered()
    }

    /// Depth of mip `level` given base depth
    pub fn level_depth(self, depth: u32, level: u32) -> u32 {
        if self.mips_include_depth() {
            (depth >> level).max(1)
        } else {
            depth.max(1)
        }
    }
}

bitflags! {
    /// Texture creation flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TextureFlags: u32 {
        /// Single mip level, no mipmap generation
        const NO_MIPMAP = 1 << 0;
        /// Storage (shader-writable) texture; not available on either tier
        const WRITABLE = 1 << 1;
        /// Data is linear even if the format is sRGB-capable
        const LINEAR_COLOR_SPACE = 1 << 2;
    }
}

/// Outcome of the mip-chain rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MipChain {
    pub levels: u32,
    /// Legacy tier NPOT texture: no mips, no tiling
    pub legacy_fallback: bool,
}

/// Full chain length for the given dimensions: `floor(log2(max)) + 1`
pub fn full_mip_count(width: u32, height: u32, depth: u32) -> u32 {
    let largest = width.max(height).max(depth).max(1);
    32 - largest.leading_zeros()
}

/// Number of mip levels a texture gets
///
/// `requested == 0` means a full chain; a request outside `[1, full]` is
/// clamped to the full chain. Legacy NPOT textures always get one level.
pub fn compute_mip_levels(
    tier: ContextTier,
    kind: TextureKind,
    width: u32,
    height: u32,
    depth: u32,
    requested: u32,
    flags: TextureFlags,
) -> MipChain {
    let pot = width.is_power_of_two() && height.is_power_of_two();
    let legacy_fallback = tier == ContextTier::Legacy && !pot;

    if legacy_fallback || !kind.allows_mipmaps() || flags.contains(TextureFlags::NO_MIPMAP) {
        return MipChain {
            levels: 1,
            legacy_fallback,
        };
    }

    let mip_depth = if kind.mips_include_depth() { depth } else { 1 };
    let full = full_mip_count(width, height, mip_depth);
    let levels = if requested == 0 || requested > full {
        full
    } else {
        requested
    };
    MipChain {
        levels,
        legacy_fallback,
    }
}
