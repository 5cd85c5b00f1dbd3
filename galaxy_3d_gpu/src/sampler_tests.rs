//! Unit tests for sampler.rs

use rustc_hash::FxHashSet;

use crate::context::gl;
use crate::context::mock_context::MockContext;
use crate::context::ContextTier;
use crate::render_states::CompareOp;
use crate::sampler::*;

#[test]
fn test_min_filter_combinations() {
    let o = SamplerOptions::linear_repeat();
    assert_eq!(o.gl_min_filter(), gl::LINEAR_MIPMAP_LINEAR);
    assert_eq!(SamplerOptions::nearest_clamp().gl_min_filter(), gl::NEAREST_MIPMAP_NEAREST);
    assert_eq!(SamplerOptions::shadow().gl_min_filter(), gl::LINEAR);
    let mixed = o.with_filter(FilterMode::Linear, FilterMode::Nearest, Some(FilterMode::Linear));
    assert_eq!(mixed.gl_min_filter(), gl::NEAREST_MIPMAP_LINEAR);
}

#[test]
fn test_presets() {
    assert_eq!(SamplerOptions::default(), SamplerOptions::linear_repeat());
    assert_eq!(SamplerOptions::shadow().compare, Some(CompareOp::LessOrEqual));
    assert_eq!(SamplerOptions::anisotropic().max_anisotropy, 16);
    assert_eq!(SamplerOptions::linear_clamp().address_w, AddressMode::ClampToEdge);
}

#[test]
fn test_options_hash_and_eq_include_lod_clamps() {
    let a = SamplerOptions::linear_repeat();
    let b = SamplerOptions::linear_repeat().with_lod_clamp(0.0, 4.0);
    let mut set = FxHashSet::default();
    set.insert(a);
    set.insert(SamplerOptions::linear_repeat());
    set.insert(b);
    assert_eq!(set.len(), 2);
}

#[test]
fn test_downgrade_legacy_fallback() {
    let limits = SamplingLimits {
        filterable: true,
        mip_levels: 1,
        legacy_fallback: true,
    };
    let o = SamplerOptions::linear_repeat().downgraded(limits);
    assert_eq!(o.mip_filter, None);
    assert_eq!(o.address_u, AddressMode::ClampToEdge);
    assert_eq!(o.address_v, AddressMode::ClampToEdge);
    assert_eq!(o.gl_min_filter(), gl::LINEAR);
}

#[test]
fn test_downgrade_non_filterable() {
    let limits = SamplingLimits {
        filterable: false,
        mip_levels: 4,
        legacy_fallback: false,
    };
    let o = SamplerOptions::anisotropic().downgraded(limits);
    assert_eq!(o.mag_filter, FilterMode::Nearest);
    assert_eq!(o.gl_min_filter(), gl::NEAREST_MIPMAP_NEAREST);
    assert_eq!(o.max_anisotropy, 1);
    // wrap untouched
    assert_eq!(o.address_u, AddressMode::Repeat);
}

#[test]
fn test_apply_to_texture_legacy_skips_extended_parameters() {
    let gl = MockContext::new(ContextTier::Legacy);
    SamplerOptions::shadow().apply_to_texture(&gl, gl::TEXTURE_2D, false, 1.0);
    assert_eq!(gl.count("tex_parameter_i32"), 4);
    assert_eq!(gl.count("tex_parameter_f32"), 0);

    let gl = MockContext::new(ContextTier::Extended);
    SamplerOptions::anisotropic().apply_to_texture(&gl, gl::TEXTURE_2D, true, 8.0);
    // filters, wraps, compare mode
    assert_eq!(gl.count("tex_parameter_i32"), 6);
    // lod clamps and anisotropy
    assert_eq!(gl.count("tex_parameter_f32"), 3);
}
