use glam::{Mat4, Vec3};

/// Extents closer than this on an axis are treated as planar.
pub const PLANAR_EPSILON: f32 = 1e-6;

/// Axis-Aligned Bounding Box in f32 space.
///
/// Invariant: min.x <= max.x, min.y <= max.y, min.z <= max.z.
/// The constructor enforces this by swapping components if needed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::from_point(Vec3::ZERO)
    }
}

impl Aabb {
    /// Create an AABB from two corners. Automatically sorts
    /// components so that min <= max on every axis.
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// A zero-size box sitting on a single point.
    pub fn from_point(p: Vec3) -> Self {
        Self { min: p, max: p }
    }

    /// Create an AABB from a center point and half-extents.
    pub fn from_center_half_extents(center: Vec3, half: Vec3) -> Self {
        Self::new(center - half, center + half)
    }

    /// Build the tightest box around `points`. Returns `None` for an empty iterator.
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        let mut aabb = Self::from_point(first);
        for p in points {
            aabb.merge_point(p);
        }
        Some(aabb)
    }

    /// Grow the box so it contains `p`.
    pub fn merge_point(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    /// Returns true if the point lies inside or on the boundary.
    pub fn contains_point(&self, p: Vec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    /// Returns true if this AABB overlaps with other
    /// (including touching edges/faces).
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.cmple(other.max).all() && self.max.cmpge(other.min).all()
    }

    /// Returns the smallest AABB enclosing both self and other.
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Returns the size along each axis.
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Returns a new AABB expanded by `margin` on each side.
    pub fn expand_by(&self, margin: f32) -> Aabb {
        Aabb {
            min: self.min - Vec3::splat(margin),
            max: self.max + Vec3::splat(margin),
        }
    }

    /// Returns true if the AABB is flat on at least one axis.
    pub fn is_degenerate(&self) -> bool {
        self.size().cmple(Vec3::splat(PLANAR_EPSILON)).any()
    }

    /// Push every planar axis outward by `margin` on both sides, leaving
    /// the other axes untouched.
    pub fn thicken_planar_axes(&self, margin: f32) -> Aabb {
        let mut out = *self;
        for axis in 0..3 {
            if (out.max[axis] - out.min[axis]).abs() <= PLANAR_EPSILON {
                out.min[axis] -= margin;
                out.max[axis] += margin;
            }
        }
        out
    }

    /// The eight corners, min corner first.
    pub fn corners(&self) -> [Vec3; 8] {
        let (lo, hi) = (self.min, self.max);
        [
            Vec3::new(lo.x, lo.y, lo.z),
            Vec3::new(hi.x, lo.y, lo.z),
            Vec3::new(lo.x, hi.y, lo.z),
            Vec3::new(hi.x, hi.y, lo.z),
            Vec3::new(lo.x, lo.y, hi.z),
            Vec3::new(hi.x, lo.y, hi.z),
            Vec3::new(lo.x, hi.y, hi.z),
            Vec3::new(hi.x, hi.y, hi.z),
        ]
    }

    /// Transform the box by an affine matrix and return the box enclosing
    /// all eight transformed corners.
    pub fn transformed(&self, matrix: &Mat4) -> Aabb {
        let corners = self.corners();
        let mut out = Aabb::from_point(matrix.transform_point3(corners[0]));
        for corner in &corners[1..] {
            out.merge_point(matrix.transform_point3(*corner));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    #[test]
    fn test_constructor_auto_sorts() {
        let aabb = Aabb::new(Vec3::splat(10.0), Vec3::ZERO);
        assert_eq!(aabb.min, Vec3::ZERO);
        assert_eq!(aabb.max, Vec3::splat(10.0));
    }

    #[test]
    fn test_from_points_starts_at_first_point() {
        let aabb = Aabb::from_points([
            Vec3::new(1.0, 2.0, 3.0),
            Vec3::new(-1.0, 5.0, 0.0),
            Vec3::new(4.0, 0.0, 1.0),
        ])
        .unwrap();
        assert_eq!(aabb.min, Vec3::new(-1.0, 0.0, 0.0));
        assert_eq!(aabb.max, Vec3::new(4.0, 5.0, 3.0));
    }

    #[test]
    fn test_from_points_empty_is_none() {
        assert!(Aabb::from_points(std::iter::empty()).is_none());
    }

    #[test]
    fn test_contains_point_on_edge() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::splat(10.0));
        assert!(aabb.contains_point(Vec3::ZERO));
        assert!(aabb.contains_point(Vec3::splat(10.0)));
        assert!(aabb.contains_point(Vec3::new(10.0, 5.0, 5.0)));
        assert!(!aabb.contains_point(Vec3::new(11.0, 5.0, 5.0)));
    }

    #[test]
    fn test_intersects_touching() {
        let a = Aabb::new(Vec3::ZERO, Vec3::splat(10.0));
        let b = Aabb::new(Vec3::new(10.0, 0.0, 0.0), Vec3::new(20.0, 10.0, 10.0));
        let c = Aabb::new(Vec3::splat(20.0), Vec3::splat(30.0));
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert!(!c.intersects(&a));
    }

    #[test]
    fn test_union_encloses_both() {
        let a = Aabb::new(Vec3::ZERO, Vec3::splat(5.0));
        let b = Aabb::new(Vec3::splat(3.0), Vec3::splat(10.0));
        let u = a.union(&b);
        assert_eq!(u.min, Vec3::ZERO);
        assert_eq!(u.max, Vec3::splat(10.0));
    }

    #[test]
    fn test_thicken_planar_axes_only_touches_flat_axis() {
        let flat = Aabb::new(Vec3::new(-1.0, 2.0, -3.0), Vec3::new(1.0, 2.0, 3.0));
        assert!(flat.is_degenerate());

        let thick = flat.thicken_planar_axes(0.5);
        assert_eq!(thick.min, Vec3::new(-1.0, 1.5, -3.0));
        assert_eq!(thick.max, Vec3::new(1.0, 2.5, 3.0));
        assert!(!thick.is_degenerate());
        // Symmetric around the shared coordinate.
        assert_eq!(thick.center().y, 2.0);
    }

    #[test]
    fn test_thicken_point_box_grows_every_axis() {
        let point = Aabb::from_point(Vec3::new(4.0, 4.0, 4.0));
        let thick = point.thicken_planar_axes(0.5);
        assert_eq!(thick.size(), Vec3::ONE);
        assert_eq!(thick.center(), Vec3::splat(4.0));
    }

    #[test]
    fn test_transformed_by_translation() {
        let aabb = Aabb::new(Vec3::splat(-1.0), Vec3::ONE);
        let moved = aabb.transformed(&Mat4::from_translation(Vec3::new(10.0, 0.0, -5.0)));
        assert_eq!(moved.min, Vec3::new(9.0, -1.0, -6.0));
        assert_eq!(moved.max, Vec3::new(11.0, 1.0, -4.0));
    }

    #[test]
    fn test_transformed_by_rotation_grows_to_enclose_corners() {
        let aabb = Aabb::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0));
        let rot = Mat4::from_quat(Quat::from_rotation_y(std::f32::consts::FRAC_PI_4));
        let rotated = aabb.transformed(&rot);
        let expected = std::f32::consts::SQRT_2;
        assert!((rotated.max.x - expected).abs() < 1e-5);
        assert!((rotated.min.z + expected).abs() < 1e-5);
        assert!((rotated.max.y - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_expand_by() {
        let aabb = Aabb::new(Vec3::splat(5.0), Vec3::splat(15.0));
        let expanded = aabb.expand_by(2.0);
        assert_eq!(expanded.min, Vec3::splat(3.0));
        assert_eq!(expanded.max, Vec3::splat(17.0));
    }
}
