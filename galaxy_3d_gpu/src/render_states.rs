/// Render state sets
///
/// Five independent sub-states (color mask, blending, rasterizer, depth,
/// stencil). Each one is an immutable value built with `with_*` setters and
/// shared through `Rc`. The device keeps an `AppliedStateCache` that remembers
/// which instance was last applied per category and skips the context calls
/// when the same instance is applied again.
///
/// The cache compares instances by identity, not by value: two separately
/// built states with identical fields are applied twice. Share the `Rc` to
/// benefit from the cache.

use std::rc::Rc;

use crate::context::{gl, GlContext};

// ===== ENUMS =====

/// Comparison operator for depth and stencil tests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// Never pass
    Never,
    /// Pass if value < reference
    Less,
    /// Pass if value == reference
    Equal,
    /// Pass if value <= reference
    LessOrEqual,
    /// Pass if value > reference
    Greater,
    /// Pass if value != reference
    NotEqual,
    /// Pass if value >= reference
    GreaterOrEqual,
    /// Always pass
    Always,
}

impl CompareOp {
    pub fn to_gl(self) -> u32 {
        match self {
            CompareOp::Never => gl::NEVER,
            CompareOp::Less => gl::LESS,
            CompareOp::Equal => gl::EQUAL,
            CompareOp::LessOrEqual => gl::LEQUAL,
            CompareOp::Greater => gl::GREATER,
            CompareOp::NotEqual => gl::NOTEQUAL,
            CompareOp::GreaterOrEqual => gl::GEQUAL,
            CompareOp::Always => gl::ALWAYS,
        }
    }
}

/// Stencil operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StencilOp {
    /// Keep current value
    Keep,
    /// Set to zero
    Zero,
    /// Replace with reference value
    Replace,
    /// Increment and clamp to max
    IncrementAndClamp,
    /// Decrement and clamp to zero
    DecrementAndClamp,
    /// Bitwise invert
    Invert,
    /// Increment and wrap around
    IncrementAndWrap,
    /// Decrement and wrap around
    DecrementAndWrap,
}

impl StencilOp {
    pub fn to_gl(self) -> u32 {
        match self {
            StencilOp::Keep => gl::KEEP,
            StencilOp::Zero => gl::ZERO,
            StencilOp::Replace => gl::REPLACE,
            StencilOp::IncrementAndClamp => gl::INCR,
            StencilOp::DecrementAndClamp => gl::DECR,
            StencilOp::Invert => gl::INVERT,
            StencilOp::IncrementAndWrap => gl::INCR_WRAP,
            StencilOp::DecrementAndWrap => gl::DECR_WRAP,
        }
    }
}

/// Blend factor for color blending equations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    ConstantColor,
    OneMinusConstantColor,
    ConstantAlpha,
    OneMinusConstantAlpha,
    SrcAlphaSaturate,
}

impl BlendFactor {
    pub fn to_gl(self) -> u32 {
        match self {
            BlendFactor::Zero => gl::ZERO,
            BlendFactor::One => gl::ONE,
            BlendFactor::SrcColor => gl::SRC_COLOR,
            BlendFactor::OneMinusSrcColor => gl::ONE_MINUS_SRC_COLOR,
            BlendFactor::DstColor => gl::DST_COLOR,
            BlendFactor::OneMinusDstColor => gl::ONE_MINUS_DST_COLOR,
            BlendFactor::SrcAlpha => gl::SRC_ALPHA,
            BlendFactor::OneMinusSrcAlpha => gl::ONE_MINUS_SRC_ALPHA,
            BlendFactor::DstAlpha => gl::DST_ALPHA,
            BlendFactor::OneMinusDstAlpha => gl::ONE_MINUS_DST_ALPHA,
            BlendFactor::ConstantColor => gl::CONSTANT_COLOR,
            BlendFactor::OneMinusConstantColor => gl::ONE_MINUS_CONSTANT_COLOR,
            BlendFactor::ConstantAlpha => gl::CONSTANT_ALPHA,
            BlendFactor::OneMinusConstantAlpha => gl::ONE_MINUS_CONSTANT_ALPHA,
            BlendFactor::SrcAlphaSaturate => gl::SRC_ALPHA_SATURATE,
        }
    }
}

/// Blend operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendOp {
    /// result = src * srcFactor + dst * dstFactor
    Add,
    /// result = src * srcFactor - dst * dstFactor
    Subtract,
    /// result = dst * dstFactor - src * srcFactor
    ReverseSubtract,
    /// result = min(src, dst)
    Min,
    /// result = max(src, dst)
    Max,
}

impl BlendOp {
    pub fn to_gl(self) -> u32 {
        match self {
            BlendOp::Add => gl::FUNC_ADD,
            BlendOp::Subtract => gl::FUNC_SUBTRACT,
            BlendOp::ReverseSubtract => gl::FUNC_REVERSE_SUBTRACT,
            BlendOp::Min => gl::MIN,
            BlendOp::Max => gl::MAX,
        }
    }
}

/// Face culling mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    /// No culling
    None,
    /// Cull front faces
    Front,
    /// Cull back faces
    Back,
}

/// Front face winding order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontFace {
    /// Counter-clockwise vertices define front face
    CounterClockwise,
    /// Clockwise vertices define front face
    Clockwise,
}

/// Color write mask
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorWriteMask {
    pub r: bool,
    pub g: bool,
    pub b: bool,
    pub a: bool,
}

impl ColorWriteMask {
    /// All channels enabled
    pub const ALL: Self = Self { r: true, g: true, b: true, a: true };
    /// No channels enabled
    pub const NONE: Self = Self { r: false, g: false, b: false, a: false };
}

impl Default for ColorWriteMask {
    fn default() -> Self {
        Self::ALL
    }
}

// ===== SUB-STATES =====

/// One category of fixed-function state
pub trait RenderState {
    /// Issue every context call needed to make this state current
    fn apply(&self, gl: &dyn GlContext);
}

/// Color write mask state
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ColorState {
    pub write_mask: ColorWriteMask,
}

impl ColorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_write_mask(mut self, write_mask: ColorWriteMask) -> Self {
        self.write_mask = write_mask;
        self
    }
}

impl RenderState for ColorState {
    fn apply(&self, gl: &dyn GlContext) {
        let m = self.write_mask;
        gl.color_mask(m.r, m.g, m.b, m.a);
    }
}

/// Color blending state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendingState {
    pub enabled: bool,
    pub src_color_factor: BlendFactor,
    pub dst_color_factor: BlendFactor,
    pub color_op: BlendOp,
    pub src_alpha_factor: BlendFactor,
    pub dst_alpha_factor: BlendFactor,
    pub alpha_op: BlendOp,
    pub constant: [f32; 4],
}

impl Default for BlendingState {
    fn default() -> Self {
        Self {
            enabled: false,
            src_color_factor: BlendFactor::One,
            dst_color_factor: BlendFactor::Zero,
            color_op: BlendOp::Add,
            src_alpha_factor: BlendFactor::One,
            dst_alpha_factor: BlendFactor::Zero,
            alpha_op: BlendOp::Add,
            constant: [0.0; 4],
        }
    }
}

impl BlendingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Straight alpha blending
    pub fn alpha_blend() -> Self {
        Self::default()
            .with_enabled(true)
            .with_color(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha, BlendOp::Add)
            .with_alpha(BlendFactor::One, BlendFactor::OneMinusSrcAlpha, BlendOp::Add)
    }

    /// Premultiplied alpha blending
    pub fn premultiplied() -> Self {
        Self::default()
            .with_enabled(true)
            .with_color(BlendFactor::One, BlendFactor::OneMinusSrcAlpha, BlendOp::Add)
            .with_alpha(BlendFactor::One, BlendFactor::OneMinusSrcAlpha, BlendOp::Add)
    }

    pub fn additive() -> Self {
        Self::default()
            .with_enabled(true)
            .with_color(BlendFactor::One, BlendFactor::One, BlendOp::Add)
            .with_alpha(BlendFactor::One, BlendFactor::One, BlendOp::Add)
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_color(mut self, src: BlendFactor, dst: BlendFactor, op: BlendOp) -> Self {
        self.src_color_factor = src;
        self.dst_color_factor = dst;
        self.color_op = op;
        self
    }

    pub fn with_alpha(mut self, src: BlendFactor, dst: BlendFactor, op: BlendOp) -> Self {
        self.src_alpha_factor = src;
        self.dst_alpha_factor = dst;
        self.alpha_op = op;
        self
    }

    pub fn with_constant(mut self, constant: [f32; 4]) -> Self {
        self.constant = constant;
        self
    }

    /// Min/max equations need `EXT_blend_minmax` on the legacy tier
    pub fn uses_min_max(&self) -> bool {
        self.enabled
            && [self.color_op, self.alpha_op]
                .iter()
                .any(|op| matches!(op, BlendOp::Min | BlendOp::Max))
    }
}

impl RenderState for BlendingState {
    fn apply(&self, gl: &dyn GlContext) {
        if !self.enabled {
            gl.disable(gl::BLEND);
            return;
        }
        gl.enable(gl::BLEND);
        gl.blend_func_separate(
            self.src_color_factor.to_gl(),
            self.dst_color_factor.to_gl(),
            self.src_alpha_factor.to_gl(),
            self.dst_alpha_factor.to_gl(),
        );
        gl.blend_equation_separate(self.color_op.to_gl(), self.alpha_op.to_gl());
        let [r, g, b, a] = self.constant;
        gl.blend_color(r, g, b, a);
    }
}

/// Rasterizer state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterizerState {
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub alpha_to_coverage: bool,
}

impl Default for RasterizerState {
    fn default() -> Self {
        Self {
            cull_mode: CullMode::Back,
            front_face: FrontFace::CounterClockwise,
            alpha_to_coverage: false,
        }
    }
}

impl RasterizerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cull_mode(mut self, cull_mode: CullMode) -> Self {
        self.cull_mode = cull_mode;
        self
    }

    pub fn with_front_face(mut self, front_face: FrontFace) -> Self {
        self.front_face = front_face;
        self
    }

    pub fn with_alpha_to_coverage(mut self, enabled: bool) -> Self {
        self.alpha_to_coverage = enabled;
        self
    }
}

impl RenderState for RasterizerState {
    fn apply(&self, gl: &dyn GlContext) {
        match self.cull_mode {
            CullMode::None => gl.disable(gl::CULL_FACE),
            CullMode::Front => {
                gl.enable(gl::CULL_FACE);
                gl.cull_face(gl::FRONT);
            }
            CullMode::Back => {
                gl.enable(gl::CULL_FACE);
                gl.cull_face(gl::BACK);
            }
        }
        gl.front_face(match self.front_face {
            FrontFace::CounterClockwise => gl::CCW,
            FrontFace::Clockwise => gl::CW,
        });
        if self.alpha_to_coverage {
            gl.enable(gl::SAMPLE_ALPHA_TO_COVERAGE);
        } else {
            gl.disable(gl::SAMPLE_ALPHA_TO_COVERAGE);
        }
    }
}

/// Depth bias parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthBias {
    /// Constant depth offset
    pub constant_factor: f32,
    /// Slope-based depth offset
    pub slope_factor: f32,
}

/// Depth test / write / bias state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthState {
    pub test_enable: bool,
    pub write_enable: bool,
    pub compare_op: CompareOp,
    /// None = disabled
    pub bias: Option<DepthBias>,
}

impl Default for DepthState {
    fn default() -> Self {
        Self {
            test_enable: true,
            write_enable: true,
            compare_op: CompareOp::LessOrEqual,
            bias: None,
        }
    }
}

impl DepthState {
    pub fn new() -> Self {
        Self::default()
    }

    /// No depth test, no depth write
    pub fn disabled() -> Self {
        Self::default().with_test(false).with_write(false)
    }

    pub fn with_test(mut self, enabled: bool) -> Self {
        self.test_enable = enabled;
        self
    }

    pub fn with_write(mut self, enabled: bool) -> Self {
        self.write_enable = enabled;
        self
    }

    pub fn with_compare(mut self, compare_op: CompareOp) -> Self {
        self.compare_op = compare_op;
        self
    }

    pub fn with_bias(mut self, bias: Option<DepthBias>) -> Self {
        self.bias = bias;
        self
    }
}

impl RenderState for DepthState {
    fn apply(&self, gl: &dyn GlContext) {
        if self.test_enable {
            gl.enable(gl::DEPTH_TEST);
            gl.depth_func(self.compare_op.to_gl());
        } else {
            gl.disable(gl::DEPTH_TEST);
        }
        gl.depth_mask(self.write_enable);
        match self.bias {
            Some(bias) => {
                gl.enable(gl::POLYGON_OFFSET_FILL);
                gl.polygon_offset(bias.slope_factor, bias.constant_factor);
            }
            None => gl.disable(gl::POLYGON_OFFSET_FILL),
        }
    }
}

/// Stencil operations for one face
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StencilFaceState {
    pub fail_op: StencilOp,
    pub depth_fail_op: StencilOp,
    pub pass_op: StencilOp,
    pub compare_op: CompareOp,
}

impl Default for StencilFaceState {
    fn default() -> Self {
        Self {
            fail_op: StencilOp::Keep,
            depth_fail_op: StencilOp::Keep,
            pass_op: StencilOp::Keep,
            compare_op: CompareOp::Always,
        }
    }
}

/// Stencil test state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StencilState {
    pub enabled: bool,
    pub front: StencilFaceState,
    pub back: StencilFaceState,
    pub read_mask: u32,
    pub write_mask: u32,
    pub reference: i32,
}

impl Default for StencilState {
    fn default() -> Self {
        Self {
            enabled: false,
            front: StencilFaceState::default(),
            back: StencilFaceState::default(),
            read_mask: 0xFF,
            write_mask: 0xFF,
            reference: 0,
        }
    }
}

impl StencilState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Same operations on both faces
    pub fn with_faces(mut self, face: StencilFaceState) -> Self {
        self.front = face;
        self.back = face;
        self
    }

    pub fn with_front(mut self, face: StencilFaceState) -> Self {
        self.front = face;
        self
    }

    pub fn with_back(mut self, face: StencilFaceState) -> Self {
        self.back = face;
        self
    }

    pub fn with_masks(mut self, read_mask: u32, write_mask: u32) -> Self {
        self.read_mask = read_mask;
        self.write_mask = write_mask;
        self
    }

    pub fn with_reference(mut self, reference: i32) -> Self {
        self.reference = reference;
        self
    }
}

impl RenderState for StencilState {
    fn apply(&self, gl: &dyn GlContext) {
        if !self.enabled {
            gl.disable(gl::STENCIL_TEST);
            gl.stencil_mask_separate(gl::FRONT_AND_BACK, self.write_mask);
            return;
        }
        gl.enable(gl::STENCIL_TEST);
        for (face, state) in [(gl::FRONT, &self.front), (gl::BACK, &self.back)] {
            gl.stencil_func_separate(face, state.compare_op.to_gl(), self.reference, self.read_mask);
            gl.stencil_op_separate(
                face,
                state.fail_op.to_gl(),
                state.depth_fail_op.to_gl(),
                state.pass_op.to_gl(),
            );
        }
        gl.stencil_mask_separate(gl::FRONT_AND_BACK, self.write_mask);
    }
}

// ===== SET =====

/// A render-state set: any category left unset falls back to the default
#[derive(Debug, Clone, Default)]
pub struct RenderStateSet {
    pub color: Option<Rc<ColorState>>,
    pub blending: Option<Rc<BlendingState>>,
    pub rasterizer: Option<Rc<RasterizerState>>,
    pub depth: Option<Rc<DepthState>>,
    pub stencil: Option<Rc<StencilState>>,
}

impl RenderStateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_color(mut self, state: Rc<ColorState>) -> Self {
        self.color = Some(state);
        self
    }

    pub fn with_blending(mut self, state: Rc<BlendingState>) -> Self {
        self.blending = Some(state);
        self
    }

    pub fn with_rasterizer(mut self, state: Rc<RasterizerState>) -> Self {
        self.rasterizer = Some(state);
        self
    }

    pub fn with_depth(mut self, state: Rc<DepthState>) -> Self {
        self.depth = Some(state);
        self
    }

    pub fn with_stencil(mut self, state: Rc<StencilState>) -> Self {
        self.stencil = Some(state);
        self
    }
}

/// Category selector for cache invalidation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateCategory {
    Color,
    Blending,
    Rasterizer,
    Depth,
    Stencil,
}

/// Last applied instance per category, plus the default instances
#[derive(Debug)]
pub struct AppliedStateCache {
    color: Option<Rc<ColorState>>,
    blending: Option<Rc<BlendingState>>,
    rasterizer: Option<Rc<RasterizerState>>,
    depth: Option<Rc<DepthState>>,
    stencil: Option<Rc<StencilState>>,
    default_color: Rc<ColorState>,
    default_blending: Rc<BlendingState>,
    default_rasterizer: Rc<RasterizerState>,
    default_depth: Rc<DepthState>,
    default_stencil: Rc<StencilState>,
}

fn apply_slot<T: RenderState>(
    slot: &mut Option<Rc<T>>,
    state: &Rc<T>,
    gl: &dyn GlContext,
    force: bool,
) -> bool {
    if !force {
        if let Some(current) = slot {
            if Rc::ptr_eq(current, state) {
                return false;
            }
        }
    }
    state.apply(gl);
    *slot = Some(state.clone());
    true
}

impl AppliedStateCache {
    pub fn new() -> Self {
        Self {
            color: None,
            blending: None,
            rasterizer: None,
            depth: None,
            stencil: None,
            default_color: Rc::new(ColorState::default()),
            default_blending: Rc::new(BlendingState::default()),
            default_rasterizer: Rc::new(RasterizerState::default()),
            default_depth: Rc::new(DepthState::default()),
            default_stencil: Rc::new(StencilState::default()),
        }
    }

    /// Apply every category of `set`; returns how many categories issued calls
    pub fn apply(&mut self, gl: &dyn GlContext, set: &RenderStateSet, force: bool) -> usize {
        let color = set.color.clone().unwrap_or_else(|| self.default_color.clone());
        let blending = set.blending.clone().unwrap_or_else(|| self.default_blending.clone());
        let rasterizer = set.rasterizer.clone().unwrap_or_else(|| self.default_rasterizer.clone());
        let depth = set.depth.clone().unwrap_or_else(|| self.default_depth.clone());
        let stencil = set.stencil.clone().unwrap_or_else(|| self.default_stencil.clone());

        [
            apply_slot(&mut self.color, &color, gl, force),
            apply_slot(&mut self.blending, &blending, gl, force),
            apply_slot(&mut self.rasterizer, &rasterizer, gl, force),
            apply_slot(&mut self.depth, &depth, gl, force),
            apply_slot(&mut self.stencil, &stencil, gl, force),
        ]
        .iter()
        .filter(|applied| **applied)
        .count()
    }

    /// Apply the default instance of every category
    pub fn apply_defaults(&mut self, gl: &dyn GlContext, force: bool) -> usize {
        self.apply(gl, &RenderStateSet::default(), force)
    }

    /// Forget one category: its next apply always reaches the context
    pub fn invalidate(&mut self, category: StateCategory) {
        match category {
            StateCategory::Color => self.color = None,
            StateCategory::Blending => self.blending = None,
            StateCategory::Rasterizer => self.rasterizer = None,
            StateCategory::Depth => self.depth = None,
            StateCategory::Stencil => self.stencil = None,
        }
    }

    /// Forget everything (after context loss/restore)
    pub fn invalidate_all(&mut self) {
        self.color = None;
        self.blending = None;
        self.rasterizer = None;
        self.depth = None;
        self.stencil = None;
    }

    pub fn is_current(&self, category: StateCategory) -> bool {
        match category {
            StateCategory::Color => self.color.is_some(),
            StateCategory::Blending => self.blending.is_some(),
            StateCategory::Rasterizer => self.rasterizer.is_some(),
            StateCategory::Depth => self.depth.is_some(),
            StateCategory::Stencil => self.stencil.is_some(),
        }
    }
}

impl Default for AppliedStateCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "render_states_tests.rs"]
mod tests;
