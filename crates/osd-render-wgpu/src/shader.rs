//! WGSL sources for the fixed-function emulation and the back buffer blit.

use bytemuck::{Pod, Zeroable};
use osd_render::device::TextureOp;

/// Per-draw uniforms at `@group(0) @binding(0)`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct DrawUniforms {
    pub target_size: [f32; 2],
    pub color_op: u32,
    pub alpha_op: u32,
}

pub fn texture_op_code(op: TextureOp) -> u32 {
    match op {
        TextureOp::Modulate => 0,
        TextureOp::SelectTexture => 1,
        TextureOp::SelectDiffuse => 2,
    }
}

/// Vertex layout matches `osd_render::geometry::Vertex`: position (x, y, z, rhw),
/// a packed `0xAARRGGBB` color read as BGRA bytes, then two UV pairs of which
/// only the first is sampled.
pub const FIXED_FUNCTION_WGSL: &str = r#"
struct DrawUniforms {
    target_size: vec2<f32>,
    color_op: u32,
    alpha_op: u32,
};

@group(0) @binding(0) var<uniform> draw: DrawUniforms;
@group(1) @binding(0) var stage0: texture_2d<f32>;
@group(1) @binding(1) var stage0_sampler: sampler;

struct VsIn {
    @location(0) pos: vec4<f32>,
    @location(1) color: vec4<f32>,
    @location(2) uv0: vec2<f32>,
};

struct VsOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) color: vec4<f32>,
    @location(1) uv0: vec2<f32>,
};

@vertex
fn vs_pretransformed(v: VsIn) -> VsOut {
    var out: VsOut;
    let ndc = vec2<f32>(
        v.pos.x / draw.target_size.x * 2.0 - 1.0,
        1.0 - v.pos.y / draw.target_size.y * 2.0,
    );
    out.pos = vec4<f32>(ndc, clamp(v.pos.z, 0.0, 1.0), 1.0);
    out.color = v.color.zyxw;
    out.uv0 = v.uv0;
    return out;
}

@vertex
fn vs_homogeneous(v: VsIn) -> VsOut {
    var out: VsOut;
    out.pos = v.pos;
    out.color = v.color.zyxw;
    out.uv0 = v.uv0;
    return out;
}

fn combine3(op: u32, tex: vec3<f32>, diffuse: vec3<f32>) -> vec3<f32> {
    switch op {
        case 1u: { return tex; }
        case 2u: { return diffuse; }
        default: { return tex * diffuse; }
    }
}

fn combine1(op: u32, tex: f32, diffuse: f32) -> f32 {
    switch op {
        case 1u: { return tex; }
        case 2u: { return diffuse; }
        default: { return tex * diffuse; }
    }
}

@fragment
fn fs_main(in: VsOut) -> @location(0) vec4<f32> {
    let tex = textureSample(stage0, stage0_sampler, in.uv0);
    return vec4<f32>(
        combine3(draw.color_op, tex.rgb, in.color.rgb),
        combine1(draw.alpha_op, tex.a, in.color.a),
    );
}
"#;

/// Full-screen triangle that copies the back buffer onto the swap chain image.
pub const BLIT_WGSL: &str = r#"
@group(0) @binding(0) var source: texture_2d<f32>;
@group(0) @binding(1) var source_sampler: sampler;

struct VsOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_blit(@builtin(vertex_index) index: u32) -> VsOut {
    var out: VsOut;
    let uv = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    out.pos = vec4<f32>(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0, 0.0, 1.0);
    out.uv = uv;
    return out;
}

@fragment
fn fs_blit(in: VsOut) -> @location(0) vec4<f32> {
    return textureSample(source, source_sampler, in.uv);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniforms_match_wgsl_layout() {
        assert_eq!(std::mem::size_of::<DrawUniforms>(), 16);
    }

    #[test]
    fn op_codes_match_shader_switch() {
        assert_eq!(texture_op_code(TextureOp::Modulate), 0);
        assert_eq!(texture_op_code(TextureOp::SelectTexture), 1);
        assert_eq!(texture_op_code(TextureOp::SelectDiffuse), 2);
    }
}
