//! Chops faces whose lightmap would be too large.

use crate::float_types::Real;
use crate::geometry::{Plane, Winding};
use crate::io::bspfile::{TEX_SPECIAL, TexInfo};
use nalgebra::Vector3;

/// Default texel extent after which a face is chopped.
pub const DEFAULT_SUBDIVIDE_SIZE: Real = 240.0;

/// Splits `winding` along its texture axes until no piece spans more than
/// `size` texels. Special (unlit) surfaces are returned whole.
pub fn subdivide_face(winding: Winding, tex: &TexInfo, size: Real, epsilon: Real) -> Vec<Winding> {
    if tex.flags & TEX_SPECIAL != 0 {
        return vec![winding];
    }

    let mut pending = vec![winding];
    for axis in 0..2 {
        let v = tex.vecs[axis];
        let vec = Vector3::new(v[0] as Real, v[1] as Real, v[2] as Real);
        let len = vec.norm();
        if len == 0.0 {
            continue;
        }
        let normal = vec / len;

        let mut next = Vec::new();
        while let Some(mut w) = pending.pop() {
            loop {
                let (mins, maxs) = w.points.iter().fold(
                    (Real::MAX, Real::MIN),
                    |(lo, hi), p| {
                        let d = p.coords.dot(&vec);
                        (lo.min(d), hi.max(d))
                    },
                );
                if maxs - mins <= size {
                    next.push(w);
                    break;
                }

                let plane = Plane::new(normal, (mins + size - 16.0) / len);
                match w.split(&plane, epsilon) {
                    (Some(front), Some(back)) => {
                        next.push(back);
                        w = front;
                    },
                    (front, back) => {
                        // nothing left to cut off
                        next.extend(front.into_iter().chain(back));
                        break;
                    },
                }
            }
        }
        pending = next;
    }
    pending
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    #[test]
    fn long_face_is_cut_into_strips() {
        // 512 x 64 on the floor, clockwise from above
        let w = Winding::new(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0, 64.0, 0.0),
            Point3::new(512.0, 64.0, 0.0),
            Point3::new(512.0, 0.0, 0.0),
        ]);
        let tex = TexInfo {
            vecs: [[1.0, 0.0, 0.0, 0.0], [0.0, -1.0, 0.0, 0.0]],
            ..TexInfo::default()
        };
        let pieces = subdivide_face(w, &tex, DEFAULT_SUBDIVIDE_SIZE, 0.01);
        assert_eq!(pieces.len(), 3);
        let total: Real = pieces.iter().map(Winding::area).sum();
        assert!((total - 512.0 * 64.0).abs() < 1e-6);
        for p in &pieces {
            let b = p.bounds();
            assert!(b.maxs.x - b.mins.x <= DEFAULT_SUBDIVIDE_SIZE);
        }
    }
}
