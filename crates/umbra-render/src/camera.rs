//! View camera owned by the render device.

use glam::{Mat4, Quat, Vec3};

/// A camera that produces view and projection matrices.
///
/// Depth maps near to 0 and far to 1, matching the `LessEqual` default
/// depth test and the 1.0 depth clear.
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    /// Rotation as a unit quaternion. Identity looks down -Z.
    pub rotation: Quat,
    pub projection: Projection,
    /// Near clip plane distance (always positive).
    pub near: f32,
    /// Far clip plane distance (always positive, > near).
    pub far: f32,
}

/// Projection type for the camera.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Perspective {
        /// Vertical field of view in radians.
        fov_y: f32,
        /// Width / height.
        aspect_ratio: f32,
    },
    Orthographic {
        half_width: f32,
        half_height: f32,
    },
}

impl Camera {
    /// Perspective camera at `position` looking at `target`.
    pub fn looking_at(position: Vec3, target: Vec3, aspect_ratio: f32) -> Self {
        let mut camera = Self {
            position,
            ..Self::default()
        };
        camera.set_aspect_ratio(aspect_ratio);
        camera.look_at(target);
        camera
    }

    /// Inverse of the camera's world transform.
    pub fn view_matrix(&self) -> Mat4 {
        (Mat4::from_translation(self.position) * Mat4::from_quat(self.rotation)).inverse()
    }

    pub fn projection_matrix(&self) -> Mat4 {
        match &self.projection {
            Projection::Perspective {
                fov_y,
                aspect_ratio,
            } => Mat4::perspective_rh(*fov_y, *aspect_ratio, self.near, self.far),
            Projection::Orthographic {
                half_width,
                half_height,
            } => Mat4::orthographic_rh(
                -*half_width,
                *half_width,
                -*half_height,
                *half_height,
                self.near,
                self.far,
            ),
        }
    }

    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// The forward direction vector (-Z in camera space).
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    /// Rotate so that `forward()` points at `target`. Keeps +Y as up unless
    /// looking straight up or down.
    pub fn look_at(&mut self, target: Vec3) {
        let dir = target - self.position;
        if dir.length_squared() <= f32::EPSILON {
            return;
        }
        let dir = dir.normalize();
        let up = if dir.cross(Vec3::Y).length_squared() <= 1e-6 {
            Vec3::Z
        } else {
            Vec3::Y
        };
        let view = Mat4::look_to_rh(Vec3::ZERO, dir, up);
        self.rotation = Quat::from_mat4(&view.inverse()).normalize();
    }

    /// Width / height of the projection.
    pub fn aspect_ratio(&self) -> f32 {
        match self.projection {
            Projection::Perspective { aspect_ratio, .. } => aspect_ratio,
            Projection::Orthographic {
                half_width,
                half_height,
            } => half_width / half_height,
        }
    }

    /// Update the aspect ratio. Orthographic cameras keep their height and
    /// adjust their width.
    pub fn set_aspect_ratio(&mut self, aspect: f32) {
        match &mut self.projection {
            Projection::Perspective { aspect_ratio, .. } => *aspect_ratio = aspect,
            Projection::Orthographic {
                half_width,
                half_height,
            } => *half_width = *half_height * aspect,
        }
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            projection: Projection::Perspective {
                fov_y: std::f32::consts::FRAC_PI_4,
                aspect_ratio: 16.0 / 9.0,
            },
            near: 0.1,
            far: 1000.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn test_identity_camera_looks_down_neg_z() {
        let forward = Camera::default().forward();
        assert!((forward - Vec3::NEG_Z).length() < 1e-6);
    }

    #[test]
    fn test_set_aspect_ratio() {
        let mut camera = Camera::default();
        camera.set_aspect_ratio(1920.0 / 1080.0);
        assert!((camera.aspect_ratio() - 16.0 / 9.0).abs() < 1e-6);
        camera.set_aspect_ratio(1.0);
        assert_eq!(camera.aspect_ratio(), 1.0);
    }

    #[test]
    fn test_ortho_aspect_keeps_height() {
        let mut camera = Camera {
            projection: Projection::Orthographic {
                half_width: 10.0,
                half_height: 5.0,
            },
            ..Camera::default()
        };
        camera.set_aspect_ratio(1.0);
        assert_eq!(
            camera.projection,
            Projection::Orthographic {
                half_width: 5.0,
                half_height: 5.0
            }
        );
    }

    #[test]
    fn test_near_plane_maps_to_zero_depth() {
        let camera = Camera::default();
        let clip = camera.projection_matrix() * Vec4::new(0.0, 0.0, -camera.near, 1.0);
        assert!((clip.z / clip.w).abs() < 1e-5);
        let clip = camera.projection_matrix() * Vec4::new(0.0, 0.0, -camera.far, 1.0);
        assert!((clip.z / clip.w - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_view_matrix_inverse_is_camera_transform() {
        let camera = Camera {
            position: Vec3::new(10.0, 20.0, 30.0),
            rotation: Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
            ..Camera::default()
        };
        let reconstructed = camera.view_matrix().inverse().col(3).truncate();
        assert!((reconstructed - camera.position).length() < 1e-4);
    }

    #[test]
    fn test_look_at_points_forward_at_target() {
        let camera = Camera::looking_at(Vec3::new(0.0, 5.0, 10.0), Vec3::ZERO, 1.5);
        let expected = (Vec3::ZERO - camera.position).normalize();
        assert!((camera.forward() - expected).length() < 1e-4);
        assert!((camera.aspect_ratio() - 1.5).abs() < 1e-6);
    }
}
