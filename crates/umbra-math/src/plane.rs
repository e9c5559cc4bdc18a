use glam::{Vec3, Vec4};

/// A plane `normal · p + d = 0` with a unit-length normal.
///
/// Points with a positive signed distance lie on the kept side when the
/// plane is used as a clip plane.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub d: f32,
}

impl Plane {
    /// Plane through `point` facing `normal`. The normal is normalized.
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        let normal = normal.normalize();
        Self {
            normal,
            d: -normal.dot(point),
        }
    }

    /// Horizontal plane at height `y` keeping everything above it.
    pub fn horizontal(y: f32) -> Self {
        Self::from_point_normal(Vec3::new(0.0, y, 0.0), Vec3::Y)
    }

    pub fn signed_distance(&self, p: Vec3) -> f32 {
        self.normal.dot(p) + self.d
    }

    /// The same plane facing the other way.
    pub fn flipped(&self) -> Self {
        Self {
            normal: -self.normal,
            d: -self.d,
        }
    }

    /// Packed `(nx, ny, nz, d)` as consumed by shaders.
    pub fn to_vec4(&self) -> Vec4 {
        self.normal.extend(self.d)
    }
}
