//! WGSL shared by every program the device runs.

/// Declarations every program starts with.
///
/// Group 0 holds the frame constant block (same layout as
/// [`FrameConstantsGpu`](crate::FrameConstantsGpu)). Group 1 holds the four
/// material texture slots and a point sampler.
pub const FRAME_PRELUDE: &str = r#"
struct FrameConstants {
    world: mat4x4<f32>,
    world_inverse_transpose: mat4x4<f32>,
    view: mat4x4<f32>,
    projection: mat4x4<f32>,
    world_view_projection: mat4x4<f32>,
    light_view_projection: mat4x4<f32>,
    camera_position: vec4<f32>,
    light_direction: vec4<f32>,
    light_color: vec4<f32>,
    ambient_color: vec4<f32>,
    clip_plane: vec4<f32>,
    // x: elapsed seconds, y: clip plane enabled, z: receives shadow, w: shadow pass
    params: vec4<f32>,
};

@group(0) @binding(0)
var<uniform> frame: FrameConstants;

@group(1) @binding(0) var slot0: texture_2d<f32>;
@group(1) @binding(1) var slot1: texture_2d<f32>;
@group(1) @binding(2) var slot2: texture_2d<f32>;
@group(1) @binding(3) var slot3: texture_2d<f32>;
@group(1) @binding(4) var point_sampler: sampler;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
};

fn clipped(world_position: vec3<f32>) -> bool {
    return frame.params.y > 0.5 && dot(frame.clip_plane.xyz, world_position) + frame.clip_plane.w < 0.0;
}

fn in_shadow_pass() -> bool {
    return frame.params.w > 0.5;
}

const SHADOW_BIAS: f32 = 0.005;
const SHADOW_DARKNESS: f32 = 0.35;

// Light reaching `world_position` according to the shadow map in slot 2:
// 1.0 when lit, outside the map or not a receiver.
fn shadow_factor(world_position: vec3<f32>) -> f32 {
    if frame.params.z < 0.5 {
        return 1.0;
    }
    let light_clip = frame.light_view_projection * vec4<f32>(world_position, 1.0);
    let ndc = light_clip.xyz / light_clip.w;
    let uv = vec2<f32>(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5);
    if any(uv < vec2<f32>(0.0)) || any(uv > vec2<f32>(1.0)) || ndc.z > 1.0 {
        return 1.0;
    }
    let stored = textureSampleLevel(slot2, point_sampler, uv, 0.0).r;
    return select(1.0, SHADOW_DARKNESS, ndc.z - SHADOW_BIAS > stored);
}
"#;

/// Prefix `body` with [`FRAME_PRELUDE`].
pub fn with_prelude(body: &str) -> String {
    format!("{FRAME_PRELUDE}\n{body}")
}

/// Copies the offscreen primary target onto the swapchain image.
pub(crate) const BLIT_SHADER: &str = r#"
@group(0) @binding(0) var source: texture_2d<f32>;
@group(0) @binding(1) var source_sampler: sampler;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> VertexOutput {
    let uv = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    var out: VertexOutput;
    out.clip_position = vec4<f32>(uv * vec2<f32>(2.0, -2.0) + vec2<f32>(-1.0, 1.0), 0.0, 1.0);
    out.uv = uv;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(source, source_sampler, in.uv);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prelude_declares_both_groups() {
        assert!(FRAME_PRELUDE.contains("@group(0) @binding(0)"));
        assert!(FRAME_PRELUDE.contains("@group(1) @binding(4)"));
    }

    #[test]
    fn test_prelude_matches_constant_block() {
        let members = FRAME_PRELUDE.matches("mat4x4<f32>,").count();
        let vectors = FRAME_PRELUDE.matches("vec4<f32>,").count();
        let bytes = members * 64 + vectors * 16;
        assert_eq!(bytes as u64, crate::FrameConstantsGpu::SIZE);
    }

    #[test]
    fn test_with_prelude_appends_body() {
        let source = with_prelude("fn body() {}");
        assert!(source.starts_with(FRAME_PRELUDE));
        assert!(source.ends_with("fn body() {}"));
    }
}
