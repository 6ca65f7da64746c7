//! Planes and point/winding classification against them.

use crate::float_types::{NORMAL_EPSILON, Real, tolerance};
use nalgebra::{Point3, Vector3};

// Classification bitmask: a winding's class is the OR of its points' classes.
pub const COPLANAR: i8 = 0;
pub const FRONT: i8 = 1;
pub const BACK: i8 = 2;
pub const SPANNING: i8 = 3;

/// Axis classification of a plane normal.
///
/// Axial planes (`X`, `Y`, `Z`) get a fast-path distance test; the `Any*`
/// variants record the dominant axis of a non-axial normal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum PlaneType {
    X = 0,
    Y = 1,
    Z = 2,
    AnyX = 3,
    AnyY = 4,
    AnyZ = 5,
}

impl PlaneType {
    pub fn for_normal(normal: &Vector3<Real>) -> Self {
        if normal.x == 1.0 || normal.x == -1.0 {
            return PlaneType::X;
        }
        if normal.y == 1.0 || normal.y == -1.0 {
            return PlaneType::Y;
        }
        if normal.z == 1.0 || normal.z == -1.0 {
            return PlaneType::Z;
        }

        let ax = normal.x.abs();
        let ay = normal.y.abs();
        let az = normal.z.abs();
        if ax >= ay && ax >= az {
            PlaneType::AnyX
        } else if ay >= ax && ay >= az {
            PlaneType::AnyY
        } else {
            PlaneType::AnyZ
        }
    }

    #[inline]
    pub const fn is_axial(self) -> bool {
        (self as i32) < 3
    }

    /// Index of the dominant axis (0, 1 or 2).
    #[inline]
    pub const fn axis(self) -> usize {
        (self as i32 % 3) as usize
    }

    pub const fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(PlaneType::X),
            1 => Some(PlaneType::Y),
            2 => Some(PlaneType::Z),
            3 => Some(PlaneType::AnyX),
            4 => Some(PlaneType::AnyY),
            5 => Some(PlaneType::AnyZ),
            _ => None,
        }
    }
}

/// A plane `normal · p = dist`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Unit normal vector of the plane
    pub normal: Vector3<Real>,
    /// Distance from origin along normal
    pub dist: Real,
    pub kind: PlaneType,
}

impl Plane {
    /// Create a new plane from a normal (normalized here) and distance.
    pub fn new(normal: Vector3<Real>, dist: Real) -> Self {
        let normal = normal.normalize();
        Plane {
            normal,
            dist,
            kind: PlaneType::for_normal(&normal),
        }
    }

    /// Plane through three points, normal = (p0 − p1) × (p2 − p1).
    ///
    /// This is the brush-side convention of `.map` files: for points listed
    /// clockwise when seen from outside the brush the normal points out of it.
    /// Returns `None` for collinear points.
    pub fn from_points(p0: &Point3<Real>, p1: &Point3<Real>, p2: &Point3<Real>) -> Option<Self> {
        let t1 = p0 - p1;
        let t2 = p2 - p1;
        let normal = t1.cross(&t2);
        let len = normal.norm();
        if len < NORMAL_EPSILON {
            return None;
        }
        let normal = normal / len;
        Some(Plane {
            normal,
            dist: p1.coords.dot(&normal),
            kind: PlaneType::for_normal(&normal),
        })
    }

    /// Signed distance of `p` to the plane, positive in front.
    #[inline]
    pub fn distance_to(&self, p: &Point3<Real>) -> Real {
        if self.kind.is_axial() {
            let axis = self.kind.axis();
            p[axis] * self.normal[axis] - self.dist
        } else {
            self.normal.dot(&p.coords) - self.dist
        }
    }

    /// Classify a point using the crate tolerance.
    #[inline]
    pub fn orient_point(&self, p: &Point3<Real>) -> i8 {
        self.orient_point_eps(p, tolerance())
    }

    #[inline]
    pub fn orient_point_eps(&self, p: &Point3<Real>, epsilon: Real) -> i8 {
        let d = self.distance_to(p);
        if d > epsilon {
            FRONT
        } else if d < -epsilon {
            BACK
        } else {
            COPLANAR
        }
    }

    /// Classify a set of points; the result is the OR of the point classes.
    pub fn classify_points(&self, points: &[Point3<Real>], epsilon: Real) -> i8 {
        points
            .iter()
            .fold(COPLANAR, |acc, p| acc | self.orient_point_eps(p, epsilon))
    }

    /// Flip the plane (reverse normal and distance)
    pub fn flip(&mut self) {
        self.normal = -self.normal;
        self.dist = -self.dist;
    }

    /// Return a flipped copy of this plane
    pub fn flipped(&self) -> Self {
        Plane {
            normal: -self.normal,
            dist: -self.dist,
            kind: self.kind,
        }
    }

    /// Same orientation and position within the given tolerances.
    pub fn approx_eq(&self, other: &Plane, normal_epsilon: Real, dist_epsilon: Real) -> bool {
        (self.normal - other.normal).iter().all(|c| c.abs() < normal_epsilon)
            && (self.dist - other.dist).abs() < dist_epsilon
    }

    /// Point on the plane closest to the origin.
    pub fn origin(&self) -> Point3<Real> {
        Point3::from(self.normal * self.dist)
    }

    /// Intersection parameter of the segment `a → b` with the plane, if it crosses.
    pub fn segment_intersection(&self, a: &Point3<Real>, b: &Point3<Real>) -> Option<Real> {
        let da = self.distance_to(a);
        let db = self.distance_to(b);
        if (da > 0.0) == (db > 0.0) || (da - db).abs() < Real::EPSILON {
            return None;
        }
        Some(da / (da - db))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axial_fast_path_matches_dot_product() {
        let plane = Plane::new(Vector3::new(0.0, 0.0, -1.0), 16.0);
        assert_eq!(plane.kind, PlaneType::Z);
        let p = Point3::new(3.0, 4.0, -20.0);
        assert_eq!(plane.distance_to(&p), plane.normal.dot(&p.coords) - plane.dist);
    }

    #[test]
    fn brush_side_points_face_outward() {
        // top face of a cube at z = 64, listed clockwise when seen from above
        let plane = Plane::from_points(
            &Point3::new(0.0, 0.0, 64.0),
            &Point3::new(0.0, 64.0, 64.0),
            &Point3::new(64.0, 64.0, 64.0),
        )
        .unwrap();
        assert_eq!(plane.normal, Vector3::z());
        assert_eq!(plane.dist, 64.0);
    }
}
