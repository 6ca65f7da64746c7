use crate::float_types::Real;
use nalgebra::{Point3, Vector3};

/// Axis-aligned bounding box. A freshly created box is *cleared*: its mins are
/// larger than its maxs, so the first [`add_point`](Aabb::add_point) defines it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub mins: Point3<Real>,
    pub maxs: Point3<Real>,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::cleared()
    }
}

impl Aabb {
    #[inline]
    pub const fn new(mins: Point3<Real>, maxs: Point3<Real>) -> Self {
        Self { mins, maxs }
    }

    #[inline]
    pub fn cleared() -> Self {
        Self {
            mins: Point3::new(Real::MAX, Real::MAX, Real::MAX),
            maxs: Point3::new(-Real::MAX, -Real::MAX, -Real::MAX),
        }
    }

    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3<Real>>) -> Self {
        let mut aabb = Self::cleared();
        for p in points {
            aabb.add_point(p);
        }
        aabb
    }

    #[inline]
    pub fn is_cleared(&self) -> bool {
        self.mins.x > self.maxs.x || self.mins.y > self.maxs.y || self.mins.z > self.maxs.z
    }

    #[inline]
    pub fn add_point(&mut self, p: &Point3<Real>) {
        for i in 0..3 {
            self.mins[i] = self.mins[i].min(p[i]);
            self.maxs[i] = self.maxs[i].max(p[i]);
        }
    }

    #[inline]
    pub fn add_box(&mut self, other: &Aabb) {
        if other.is_cleared() {
            return;
        }
        self.add_point(&other.mins);
        self.add_point(&other.maxs);
    }

    /// Closed-interval overlap test; touching boxes intersect.
    #[inline]
    pub fn intersects(&self, other: &Self) -> bool {
        self.maxs.x >= other.mins.x
            && self.mins.x <= other.maxs.x
            && self.maxs.y >= other.mins.y
            && self.mins.y <= other.maxs.y
            && self.maxs.z >= other.mins.z
            && self.mins.z <= other.maxs.z
    }

    /// Open-interval overlap test with a tolerance; boxes that only touch within
    /// `epsilon` do not overlap.
    #[inline]
    pub fn overlaps(&self, other: &Self, epsilon: Real) -> bool {
        (0..3).all(|i| {
            self.maxs[i] > other.mins[i] + epsilon && self.mins[i] < other.maxs[i] - epsilon
        })
    }

    #[inline]
    pub fn contains_point(&self, p: &Point3<Real>, epsilon: Real) -> bool {
        (0..3).all(|i| p[i] >= self.mins[i] - epsilon && p[i] <= self.maxs[i] + epsilon)
    }

    #[inline]
    pub fn center(&self) -> Point3<Real> {
        nalgebra::center(&self.mins, &self.maxs)
    }

    #[inline]
    pub fn size(&self) -> Vector3<Real> {
        self.maxs - self.mins
    }

    /// Grows the box by `amount` on every side.
    #[inline]
    pub fn expanded(&self, amount: Real) -> Self {
        let v = Vector3::repeat(amount);
        Self::new(self.mins - v, self.maxs + v)
    }
}

#[cfg(test)]
mod tests {
    use super::Aabb;
    use nalgebra::Point3;

    #[test]
    fn touching_boxes_intersect_but_do_not_overlap() {
        let a = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(64.0, 64.0, 64.0));
        let b = Aabb::new(Point3::new(64.0, 0.0, 0.0), Point3::new(128.0, 64.0, 64.0));
        assert!(a.intersects(&b));
        assert!(!a.overlaps(&b, 0.01));
    }

    #[test]
    fn cleared_box_absorbs_first_point() {
        let mut a = Aabb::cleared();
        assert!(a.is_cleared());
        a.add_point(&Point3::new(1.0, 2.0, 3.0));
        assert!(!a.is_cleared());
        assert_eq!(a.mins, a.maxs);
    }
}
