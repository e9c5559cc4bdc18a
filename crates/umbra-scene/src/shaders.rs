//! WGSL bodies for the stock scene materials. Each is compiled with
//! [`with_prelude`](umbra_render::shaders::with_prelude).

/// Lambert lighting with screen-space ambient occlusion from slot 1 and the
/// shadow map in slot 2. Writes light-space depth during the shadow pass.
pub const LIT: &str = r#"
struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
    @location(3) screen: vec4<f32>,
};

fn screen_uv(clip: vec4<f32>) -> vec2<f32> {
    let ndc = clip.xy / clip.w;
    return vec2<f32>(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5);
}

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let clip = frame.world_view_projection * vec4<f32>(in.position, 1.0);
    out.clip_position = clip;
    out.world_position = (frame.world * vec4<f32>(in.position, 1.0)).xyz;
    out.normal = (frame.world_inverse_transpose * vec4<f32>(in.normal, 0.0)).xyz;
    out.uv = in.uv;
    out.screen = clip;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    if in_shadow_pass() {
        return vec4<f32>(in.clip_position.z, 0.0, 0.0, 1.0);
    }
    let albedo = textureSample(slot0, point_sampler, in.uv).rgb;
    let occlusion = textureSample(slot1, point_sampler, screen_uv(in.screen)).r;
    if clipped(in.world_position) {
        discard;
    }
    let n = normalize(in.normal);
    let diffuse = max(dot(n, -frame.light_direction.xyz), 0.0) * shadow_factor(in.world_position);
    let light = frame.light_color.rgb * diffuse + frame.ambient_color.rgb * occlusion;
    return vec4<f32>(albedo * light, 1.0);
}
"#;

/// Vertical gradient drawn on the far plane around the camera.
pub const SKY: &str = r#"
struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) direction: vec3<f32>,
};

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let rotation = mat4x4<f32>(
        vec4<f32>(frame.view[0].xyz, 0.0),
        vec4<f32>(frame.view[1].xyz, 0.0),
        vec4<f32>(frame.view[2].xyz, 0.0),
        vec4<f32>(0.0, 0.0, 0.0, 1.0),
    );
    let clip = frame.projection * rotation * vec4<f32>(in.position, 1.0);
    out.clip_position = clip.xyww;
    out.direction = in.position;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let horizon = vec3<f32>(0.75, 0.82, 0.9);
    let zenith = vec3<f32>(0.18, 0.36, 0.72);
    let t = clamp(normalize(in.direction).y * 1.5, 0.0, 1.0);
    return vec4<f32>(mix(horizon, zenith, t), 1.0);
}
"#;

/// Slope and height tinted terrain lit like [`LIT`], shadowed from slot 2.
pub const TERRAIN: &str = r#"
struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_position: vec3<f32>,
    @location(1) normal: vec3<f32>,
};

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = frame.world_view_projection * vec4<f32>(in.position, 1.0);
    out.world_position = (frame.world * vec4<f32>(in.position, 1.0)).xyz;
    out.normal = (frame.world_inverse_transpose * vec4<f32>(in.normal, 0.0)).xyz;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    if clipped(in.world_position) {
        discard;
    }
    let n = normalize(in.normal);
    let grass = vec3<f32>(0.3, 0.5, 0.2);
    let rock = vec3<f32>(0.45, 0.4, 0.35);
    let albedo = mix(rock, grass, smoothstep(0.6, 0.9, n.y));
    let diffuse = max(dot(n, -frame.light_direction.xyz), 0.0) * shadow_factor(in.world_position);
    let light = frame.light_color.rgb * diffuse + frame.ambient_color.rgb;
    return vec4<f32>(albedo * light, 1.0);
}
"#;

/// Translucent water mixing the reflection in slot 0 with the refraction
/// copy in slot 1, with a time-driven shimmer.
pub const WATER: &str = r#"
struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
    @location(1) screen: vec4<f32>,
    @location(2) world_position: vec3<f32>,
};

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let clip = frame.world_view_projection * vec4<f32>(in.position, 1.0);
    out.clip_position = clip;
    out.uv = in.uv;
    out.screen = clip;
    out.world_position = (frame.world * vec4<f32>(in.position, 1.0)).xyz;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let t = frame.params.x;
    let ripple = sin(in.uv.x * 40.0 + t) * cos(in.uv.y * 40.0 + t * 0.7) * 0.05;
    let ndc = in.screen.xy / in.screen.w;
    let uv = vec2<f32>(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5) + vec2<f32>(ripple * 0.1);
    let reflection = textureSample(slot0, point_sampler, uv).rgb;
    let refraction = textureSample(slot1, point_sampler, uv).rgb;
    let to_eye = normalize(frame.camera_position.xyz - in.world_position);
    let fresnel = clamp(1.0 - to_eye.y, 0.2, 0.8);
    let tint = vec3<f32>(0.1, 0.3, 0.45) + vec3<f32>(ripple);
    let color = mix(mix(refraction, reflection, fresnel), tint, 0.3);
    return vec4<f32>(color, 0.6);
}
"#;

/// Writes light-space depth into the red channel.
pub const SHADOW_DEPTH: &str = r#"
@vertex
fn vs_main(in: VertexInput) -> @builtin(position) vec4<f32> {
    return frame.world_view_projection * vec4<f32>(in.position, 1.0);
}

@fragment
fn fs_main(@builtin(position) position: vec4<f32>) -> @location(0) vec4<f32> {
    return vec4<f32>(position.z, 0.0, 0.0, 1.0);
}
"#;

/// View-space normal in `rgb`, view-space distance in `a`.
pub const NORMAL_DEPTH: &str = r#"
struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) view_normal: vec3<f32>,
    @location(1) view_depth: f32,
};

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let world = frame.world * vec4<f32>(in.position, 1.0);
    let view = frame.view * world;
    let normal = frame.world_inverse_transpose * vec4<f32>(in.normal, 0.0);
    out.clip_position = frame.world_view_projection * vec4<f32>(in.position, 1.0);
    out.view_normal = (frame.view * vec4<f32>(normal.xyz, 0.0)).xyz;
    out.view_depth = -view.z;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return vec4<f32>(normalize(in.view_normal), in.view_depth);
}
"#;

/// Full-screen pass turning the normal-depth target in slot 0 into occlusion.
pub const AMBIENT_OCCLUSION: &str = r#"
struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = vec4<f32>(in.position.xy, 0.0, 1.0);
    out.uv = in.uv;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let size = vec2<f32>(textureDimensions(slot0));
    let texel = 1.0 / size;
    let center = textureSample(slot0, point_sampler, in.uv);
    var offsets = array<vec2<f32>, 8>(
        vec2<f32>(1.0, 0.0), vec2<f32>(-1.0, 0.0), vec2<f32>(0.0, 1.0), vec2<f32>(0.0, -1.0),
        vec2<f32>(2.0, 2.0), vec2<f32>(-2.0, 2.0), vec2<f32>(2.0, -2.0), vec2<f32>(-2.0, -2.0),
    );
    var occlusion = 0.0;
    for (var i = 0; i < 8; i = i + 1) {
        let sample_uv = in.uv + offsets[i] * texel * 3.0;
        let neighbour = textureSampleLevel(slot0, point_sampler, sample_uv, 0.0);
        let delta = center.a - neighbour.a;
        occlusion = occlusion + select(0.0, 1.0, delta > 0.05 && delta < 2.0);
    }
    let ambient = 1.0 - occlusion / 8.0;
    return vec4<f32>(ambient, ambient, ambient, 1.0);
}
"#;

/// Shows the red channel of slot 0 in a screen corner.
pub const DEBUG_QUAD: &str = r#"
struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = vec4<f32>(in.position.xy, 0.0, 1.0);
    out.uv = in.uv;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let value = textureSample(slot0, point_sampler, in.uv).r;
    return vec4<f32>(value, value, value, 1.0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_body_has_both_entry_points() {
        for body in [
            LIT,
            SKY,
            TERRAIN,
            WATER,
            SHADOW_DEPTH,
            NORMAL_DEPTH,
            AMBIENT_OCCLUSION,
            DEBUG_QUAD,
        ] {
            assert!(body.contains("fn vs_main"));
            assert!(body.contains("fn fs_main"));
        }
    }

    #[test]
    fn test_receivers_sample_shadow_map() {
        for body in [LIT, TERRAIN] {
            assert!(body.contains("shadow_factor(in.world_position)"));
        }
        assert!(LIT.contains("in_shadow_pass()"));
    }

    #[test]
    fn test_bodies_do_not_redeclare_prelude() {
        for body in [LIT, SKY, TERRAIN, WATER] {
            assert!(!body.contains("struct FrameConstants"));
            assert!(!body.contains("struct VertexInput"));
        }
    }
}
