//! Convex polygons ("windings").
//!
//! Points are ordered clockwise when seen from the front of the winding's
//! plane, matching the brush-side convention of `.map` files and the face
//! order the engine renders. Every operation that changes the point list
//! returns a new winding; callers own the result exclusively.

use crate::aabb::Aabb;
use crate::float_types::{BOGUS_RANGE, EQUAL_EPSILON, MIN_WINDING_AREA, Real};
use crate::geometry::plane::{BACK, COPLANAR, FRONT, Plane, SPANNING};
use nalgebra::{Point3, Vector3};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Winding {
    pub points: Vec<Point3<Real>>,
}

impl Winding {
    pub const fn new(points: Vec<Point3<Real>>) -> Self {
        Winding { points }
    }

    /// A huge square lying on `plane`, used as the starting point for clipping
    /// a brush side or a portal down to its final shape.
    pub fn base_for_plane(plane: &Plane) -> Self {
        // find the major axis
        let mut major = 0;
        let mut max = -1.0;
        for i in 0..3 {
            let v = plane.normal[i].abs();
            if v > max {
                major = i;
                max = v;
            }
        }

        let mut up = match major {
            0 | 1 => Vector3::z(),
            _ => Vector3::x(),
        };
        let v = up.dot(&plane.normal);
        up -= plane.normal * v;
        up.normalize_mut();

        let org = Point3::from(plane.normal * plane.dist);
        let right = up.cross(&plane.normal) * BOGUS_RANGE;
        let up = up * BOGUS_RANGE;

        Winding::new(vec![
            org - right + up,
            org + right + up,
            org + right - up,
            org - right - up,
        ])
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn area(&self) -> Real {
        if self.points.len() < 3 {
            return 0.0;
        }
        let p0 = self.points[0];
        let sum = self.points[1..]
            .windows(2)
            .fold(Vector3::zeros(), |acc, pair| {
                acc + (pair[0] - p0).cross(&(pair[1] - p0))
            });
        sum.norm() * 0.5
    }

    /// Average of the points.
    pub fn center(&self) -> Point3<Real> {
        if self.points.is_empty() {
            return Point3::origin();
        }
        let sum = self
            .points
            .iter()
            .fold(Vector3::zeros(), |acc, p| acc + p.coords);
        Point3::from(sum / self.points.len() as Real)
    }

    /// Area-weighted centroid; equal to [`center`](Winding::center) for
    /// triangles and parallelograms.
    pub fn centroid(&self) -> Point3<Real> {
        if self.points.len() < 3 {
            return self.center();
        }
        let p0 = self.points[0];
        let mut total = 0.0;
        let mut acc = Vector3::zeros();
        for pair in self.points[1..].windows(2) {
            let area = (pair[0] - p0).cross(&(pair[1] - p0)).norm() * 0.5;
            let c = (p0.coords + pair[0].coords + pair[1].coords) / 3.0;
            acc += c * area;
            total += area;
        }
        if total <= Real::EPSILON {
            return self.center();
        }
        Point3::from(acc / total)
    }

    pub fn bounds(&self) -> Aabb {
        Aabb::from_points(self.points.iter())
    }

    /// The plane the winding lies on, if the first three points span one.
    pub fn plane(&self) -> Option<Plane> {
        if self.points.len() < 3 {
            return None;
        }
        // pick the best-conditioned corner so long thin windings still work
        let n = self.points.len();
        let normal = (0..n).fold(Vector3::zeros(), |acc, i| {
            let prev = self.points[(i + n - 1) % n];
            let cur = self.points[i];
            let next = self.points[(i + 1) % n];
            acc + (prev - cur).cross(&(next - cur))
        });
        let len = normal.norm();
        if len < Real::EPSILON {
            return None;
        }
        let normal = normal / len;
        Some(Plane::new(normal, self.points[0].coords.dot(&normal)))
    }

    /// Reverse the point order in place, flipping the facing.
    pub fn flip(&mut self) {
        self.points.reverse();
    }

    pub fn reversed(&self) -> Self {
        let mut w = self.clone();
        w.flip();
        w
    }

    /// Bitmask of [`FRONT`]/[`BACK`] over all points.
    pub fn classify(&self, plane: &Plane, epsilon: Real) -> i8 {
        plane.classify_points(&self.points, epsilon)
    }

    /// Splits against `plane`, returning `(front, back)`. A winding lying on
    /// the plane goes to the side its own normal faces.
    pub fn split(&self, plane: &Plane, epsilon: Real) -> (Option<Winding>, Option<Winding>) {
        let (dists, sides) = self.distances(plane, epsilon);
        let class = sides.iter().fold(COPLANAR, |acc, &s| acc | s);

        match class {
            COPLANAR => {
                let facing = self
                    .plane()
                    .map(|p| p.normal.dot(&plane.normal))
                    .unwrap_or(1.0);
                if facing > 0.0 {
                    (Some(self.clone()), None)
                } else {
                    (None, Some(self.clone()))
                }
            },
            FRONT => (Some(self.clone()), None),
            BACK => (None, Some(self.clone())),
            _ => {
                let (front, back) = self.split_points(plane, &dists, &sides, true, true);
                (Self::accept(front), Self::accept(back))
            },
        }
    }

    /// Keeps the part in front of `plane`. When the whole winding lies on the
    /// plane it is kept only if `keep_on` is set.
    pub fn clip(&self, plane: &Plane, epsilon: Real, keep_on: bool) -> Option<Winding> {
        let (dists, sides) = self.distances(plane, epsilon);
        let class = sides.iter().fold(COPLANAR, |acc, &s| acc | s);

        match class {
            COPLANAR => keep_on.then(|| self.clone()),
            FRONT => Some(self.clone()),
            BACK => None,
            _ => {
                let (front, _) = self.split_points(plane, &dists, &sides, true, false);
                Self::accept(front)
            },
        }
    }

    /// Keeps the part behind `plane`; the common "chop a brush side by the
    /// other sides" operation.
    pub fn chop(&self, plane: &Plane, epsilon: Real) -> Option<Winding> {
        self.clip(&plane.flipped(), epsilon, false)
    }

    fn distances(&self, plane: &Plane, epsilon: Real) -> (Vec<Real>, Vec<i8>) {
        let dists: Vec<Real> = self.points.iter().map(|p| plane.distance_to(p)).collect();
        let sides = dists
            .iter()
            .map(|&d| {
                if d > epsilon {
                    FRONT
                } else if d < -epsilon {
                    BACK
                } else {
                    COPLANAR
                }
            })
            .collect();
        (dists, sides)
    }

    fn split_points(
        &self,
        plane: &Plane,
        dists: &[Real],
        sides: &[i8],
        want_front: bool,
        want_back: bool,
    ) -> (Vec<Point3<Real>>, Vec<Point3<Real>>) {
        let n = self.points.len();
        let mut front = Vec::with_capacity(n + 4);
        let mut back = Vec::with_capacity(n + 4);

        for i in 0..n {
            let p1 = self.points[i];
            let side = sides[i];

            if side == COPLANAR {
                if want_front {
                    front.push(p1);
                }
                if want_back {
                    back.push(p1);
                }
                continue;
            }
            if side == FRONT && want_front {
                front.push(p1);
            }
            if side == BACK && want_back {
                back.push(p1);
            }

            let j = (i + 1) % n;
            let next_side = sides[j];
            if next_side == COPLANAR || next_side == side || (side | next_side) != SPANNING {
                continue;
            }

            // generate a split point
            let p2 = self.points[j];
            let t = dists[i] / (dists[i] - dists[j]);
            let mut mid = p1 + (p2 - p1) * t;
            // avoid round off error when possible
            for axis in 0..3 {
                if plane.normal[axis] == 1.0 {
                    mid[axis] = plane.dist;
                } else if plane.normal[axis] == -1.0 {
                    mid[axis] = -plane.dist;
                }
            }
            if want_front {
                front.push(mid);
            }
            if want_back {
                back.push(mid);
            }
        }
        (front, back)
    }

    fn accept(points: Vec<Point3<Real>>) -> Option<Winding> {
        let mut w = Winding::new(points);
        w.remove_duplicate_points();
        (w.points.len() >= 3 && w.area() > MIN_WINDING_AREA).then_some(w)
    }

    /// Drops consecutive points closer than `EQUAL_EPSILON`.
    pub fn remove_duplicate_points(&mut self) {
        if self.points.len() < 2 {
            return;
        }
        let mut out: Vec<Point3<Real>> = Vec::with_capacity(self.points.len());
        for p in &self.points {
            if out
                .last()
                .is_none_or(|last| (p - last).amax() > EQUAL_EPSILON)
            {
                out.push(*p);
            }
        }
        while out.len() > 1 {
            let first = out[0];
            let last = out[out.len() - 1];
            if (first - last).amax() > EQUAL_EPSILON {
                break;
            }
            out.pop();
        }
        self.points = out;
    }

    /// Removes points that lie on the straight line between their neighbours.
    pub fn remove_colinear_points(&mut self) {
        self.remove_duplicate_points();
        let n = self.points.len();
        if n < 3 {
            return;
        }
        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            let prev = self.points[(i + n - 1) % n];
            let cur = self.points[i];
            let next = self.points[(i + 1) % n];
            let v1 = (cur - prev).normalize();
            let v2 = (next - cur).normalize();
            if v1.dot(&v2) < 0.999 {
                out.push(cur);
            }
        }
        self.points = out;
    }

    /// A winding too small to matter: fewer than three edges longer than
    /// `EDGE_LENGTH`.
    pub fn is_tiny(&self) -> bool {
        const EDGE_LENGTH: Real = 0.2;
        let n = self.points.len();
        let mut edges = 0;
        for i in 0..n {
            let j = (i + 1) % n;
            if (self.points[j] - self.points[i]).norm() > EDGE_LENGTH {
                edges += 1;
                if edges == 3 {
                    return false;
                }
            }
        }
        true
    }

    /// Every point lies on `plane` within `epsilon` and every edge turns the
    /// same way.
    pub fn is_convex_on(&self, plane: &Plane, epsilon: Real) -> bool {
        let n = self.points.len();
        if n < 3 {
            return false;
        }
        if self
            .points
            .iter()
            .any(|p| plane.distance_to(p).abs() > epsilon)
        {
            return false;
        }
        for i in 0..n {
            let p1 = self.points[i];
            let p2 = self.points[(i + 1) % n];
            let dir = p2 - p1;
            if dir.norm() < EQUAL_EPSILON {
                return false;
            }
            let outward = plane.normal.cross(&dir).normalize();
            let edge_dist = outward.dot(&p1.coords) + epsilon;
            if self
                .points
                .iter()
                .any(|p| outward.dot(&p.coords) > edge_dist)
            {
                return false;
            }
        }
        true
    }

    /// Translate every point.
    pub fn translate(&mut self, offset: &Vector3<Real>) {
        for p in &mut self.points {
            *p += offset;
        }
    }
}

/// Face windings of the convex solid bounded by `planes` (normals pointing
/// out). Each plane's base winding is chopped by all the others; sides that
/// vanish come back as `None`.
pub fn brush_windings(planes: &[Plane], epsilon: Real) -> Vec<Option<Winding>> {
    planes
        .iter()
        .enumerate()
        .map(|(i, plane)| {
            planes
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .try_fold(Winding::base_for_plane(plane), |w, (_, other)| {
                    w.chop(other, epsilon)
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size: Real) -> Winding {
        // clockwise from +z
        Winding::new(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0, size, 0.0),
            Point3::new(size, size, 0.0),
            Point3::new(size, 0.0, 0.0),
        ])
    }

    #[test]
    fn base_winding_faces_its_plane() {
        let plane = Plane::new(Vector3::new(1.0, 2.0, 3.0), 40.0);
        let w = Winding::base_for_plane(&plane);
        let wp = w.plane().unwrap();
        assert!((wp.normal - plane.normal).norm() < 1e-9);
        assert!((wp.dist - plane.dist).abs() < 1e-6);
    }

    #[test]
    fn square_orientation_is_clockwise_from_front() {
        let w = square(64.0);
        let p = w.plane().unwrap();
        assert!((p.normal - Vector3::z()).norm() < 1e-12);
        assert!(w.is_convex_on(&p, 0.01));
        assert_eq!(w.area(), 4096.0);
    }

    #[test]
    fn split_through_middle() {
        let w = square(64.0);
        let plane = Plane::new(Vector3::x(), 16.0);
        let (front, back) = w.split(&plane, 0.01);
        let front = front.unwrap();
        let back = back.unwrap();
        assert!((front.area() - 48.0 * 64.0).abs() < 1e-9);
        assert!((back.area() - 16.0 * 64.0).abs() < 1e-9);
        assert!(front.points.iter().all(|p| p.x >= 16.0));
    }

    #[test]
    fn coplanar_split_follows_facing() {
        let w = square(64.0);
        let up = Plane::new(Vector3::z(), 0.0);
        assert!(w.split(&up, 0.01).0.is_some());
        assert!(w.split(&up.flipped(), 0.01).1.is_some());
        assert!(w.clip(&up, 0.01, false).is_none());
        assert!(w.clip(&up, 0.01, true).is_some());
    }

    #[test]
    fn cube_sides_are_squares() {
        let planes: Vec<Plane> = (0..3)
            .flat_map(|axis| {
                let mut n = Vector3::zeros();
                n[axis] = 1.0;
                [Plane::new(n, 64.0), Plane::new(-n, 0.0)]
            })
            .collect();
        let windings = brush_windings(&planes, 0.01);
        for (w, plane) in windings.iter().zip(&planes) {
            let w = w.as_ref().unwrap();
            assert_eq!(w.len(), 4);
            assert!((w.area() - 4096.0).abs() < 1e-6);
            let wp = w.plane().unwrap();
            assert!((wp.normal - plane.normal).norm() < 1e-9);
        }
    }

    #[test]
    fn colinear_points_are_removed() {
        let mut w = Winding::new(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0, 32.0, 0.0),
            Point3::new(0.0, 64.0, 0.0),
            Point3::new(64.0, 64.0, 0.0),
            Point3::new(64.0, 0.0, 0.0),
        ]);
        w.remove_colinear_points();
        assert_eq!(w.len(), 4);
    }
}
