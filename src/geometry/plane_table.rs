//! Interned plane table.
//!
//! Planes are stored in antiparallel pairs: the even index of a pair holds the
//! canonical orientation (dominant normal component positive) and the odd
//! index its flip, so `index ^ 1` is always the opposite plane.

use crate::errors::{Result, check_limit};
use crate::float_types::{DIST_EPSILON, NORMAL_EPSILON, Real};
use crate::geometry::plane::{Plane, PlaneType};
use hashbrown::HashMap;
use nalgebra::Vector3;

/// Internal planes may exceed what the BSP lump can hold; only the ones that
/// reach the output are checked against `MAX_MAP_PLANES`.
pub const MAX_INTERNAL_PLANES: usize = 262144;

#[derive(Debug, Clone, Default)]
pub struct PlaneTable {
    planes: Vec<Plane>,
    /// Distance bucket → indices of canonical planes in that bucket.
    buckets: HashMap<i64, Vec<usize>>,
}

/// Snaps near-axial normals onto the axis and near-integer distances onto
/// the integer, so planes written by the editor with float noise intern to
/// the same entry.
pub fn snap_plane(normal: &mut Vector3<Real>, dist: &mut Real) {
    for i in 0..3 {
        if (normal[i] - 1.0).abs() < NORMAL_EPSILON {
            *normal = Vector3::zeros();
            normal[i] = 1.0;
            break;
        }
        if (normal[i] + 1.0).abs() < NORMAL_EPSILON {
            *normal = Vector3::zeros();
            normal[i] = -1.0;
            break;
        }
    }

    let rounded = dist.round();
    if (*dist - rounded).abs() < DIST_EPSILON {
        *dist = rounded;
    }
}

#[inline]
fn bucket_of(dist: Real) -> i64 {
    dist.abs().floor() as i64
}

/// The orientation stored at the even index of a pair.
fn is_canonical(normal: &Vector3<Real>) -> bool {
    let kind = PlaneType::for_normal(normal);
    normal[kind.axis()] > 0.0
}

impl PlaneTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a table from a raw plane array (as read from a `.pln` file).
    /// The array must already be laid out in pairs.
    pub fn from_planes(planes: Vec<Plane>) -> Self {
        let mut table = PlaneTable {
            planes,
            buckets: HashMap::new(),
        };
        for index in (0..table.planes.len()).step_by(2) {
            let dist = table.planes[index].dist;
            table.buckets.entry(bucket_of(dist)).or_default().push(index);
        }
        table
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.planes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.planes.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> &Plane {
        &self.planes[index]
    }

    pub fn as_slice(&self) -> &[Plane] {
        &self.planes
    }

    /// Returns the index of the plane `normal · p = dist`, adding the pair if
    /// it isn't present yet.
    pub fn find_or_insert(&mut self, normal: Vector3<Real>, dist: Real) -> Result<usize> {
        let mut normal = normal.normalize();
        let mut dist = dist;
        snap_plane(&mut normal, &mut dist);

        let probe = Plane {
            normal,
            dist,
            kind: PlaneType::for_normal(&normal),
        };
        let flipped = probe.flipped();

        // neighbouring buckets catch distances that straddle an integer
        let bucket = bucket_of(dist);
        for b in [bucket - 1, bucket, bucket + 1] {
            let Some(indices) = self.buckets.get(&b) else {
                continue;
            };
            for &index in indices {
                let canonical = &self.planes[index];
                if canonical.approx_eq(&probe, NORMAL_EPSILON, DIST_EPSILON) {
                    return Ok(index);
                }
                if canonical.approx_eq(&flipped, NORMAL_EPSILON, DIST_EPSILON) {
                    return Ok(index ^ 1);
                }
            }
        }

        check_limit("internal planes", self.planes.len() + 2, MAX_INTERNAL_PLANES)?;

        let index = self.planes.len();
        let (canonical, other, result) = if is_canonical(&normal) {
            (probe, flipped, index)
        } else {
            (flipped, probe, index + 1)
        };
        self.planes.push(canonical);
        self.planes.push(other);
        self.buckets.entry(bucket_of(canonical.dist)).or_default().push(index);
        Ok(result)
    }

    /// Interns an existing plane value.
    pub fn intern(&mut self, plane: &Plane) -> Result<usize> {
        self.find_or_insert(plane.normal, plane.dist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_are_antiparallel() {
        let mut table = PlaneTable::new();
        let a = table.find_or_insert(Vector3::new(0.0, 0.0, -1.0), 32.0).unwrap();
        assert_eq!(a, 1, "negative z is stored at the odd slot");
        let b = table.find_or_insert(Vector3::z(), -32.0).unwrap();
        assert_eq!(b, 0);
        assert_eq!(table.get(a).normal, -table.get(a ^ 1).normal);
        assert_eq!(table.get(a).dist, -table.get(a ^ 1).dist);
    }

    #[test]
    fn near_duplicates_intern_to_one_entry() {
        let mut table = PlaneTable::new();
        let a = table
            .find_or_insert(Vector3::new(0.3, 0.4, 0.866), 100.0)
            .unwrap();
        let b = table
            .find_or_insert(Vector3::new(0.3, 0.4, 0.866), 100.000_01)
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(table.len(), 2);
    }
}
