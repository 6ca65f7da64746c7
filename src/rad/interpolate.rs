//! Indirect light at a luxel from the bounced light of nearby patches.
//!
//! Candidate patches are projected onto the face plane and sorted by angle
//! around the luxel. The angular gaps between them are wedges: when three
//! candidates have no gap wider than a half turn they enclose the luxel and
//! their triangle interpolates it. Among enclosing triangles the one whose
//! widest wedge is smallest wins, then the one with the lowest candidate
//! indices. A luxel outside every triangle is interpolated along the edge
//! spanning its widest wedge.

use crate::float_types::{Real, TAU};
use crate::io::bspfile::BspFile;
use crate::rad::faces::FaceInfo;
use crate::rad::patch::Patch;
use hashbrown::HashMap;
use nalgebra::{Point3, Vector2, Vector3};

/// Patches considered per luxel.
pub const MAX_CANDIDATES: usize = 8;

/// Neighbour faces bending further than this do not share light.
const SMOOTHING_COS: Real = 0.707;

const SAME_POINT: Real = 1e-3;

/// Wedge angles closer than this are equal.
const ANGLE_TIE: Real = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub enum Wedge {
    Single(usize),
    Edge { a: usize, b: usize, t: Real },
    Triangle { vertices: [usize; 3], weights: [Real; 3] },
}

impl Wedge {
    /// `(candidate, weight)` pairs summing to 1.
    pub fn weights(&self) -> Vec<(usize, Real)> {
        match *self {
            Wedge::Single(a) => vec![(a, 1.0)],
            Wedge::Edge { a, b, t } => vec![(a, 1.0 - t), (b, t)],
            Wedge::Triangle { vertices, weights } => vertices.into_iter().zip(weights).collect(),
        }
    }
}

fn barycentric(p: &Vector2<Real>, a: &Vector2<Real>, b: &Vector2<Real>, c: &Vector2<Real>) -> Option<[Real; 3]> {
    let det = (b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y);
    if det.abs() < 1e-9 {
        return None;
    }
    let wb = ((p.x - a.x) * (c.y - a.y) - (c.x - a.x) * (p.y - a.y)) / det;
    let wc = ((b.x - a.x) * (p.y - a.y) - (p.x - a.x) * (b.y - a.y)) / det;
    let w = [1.0 - wb - wc, wb, wc].map(|w: Real| w.max(0.0));
    let sum: Real = w.iter().sum();
    (sum > 0.0).then(|| w.map(|x| x / sum))
}

/// Picks the wedge interpolating `p` from `candidates` (`(index, point)`
/// pairs on the plane). `None` without candidates.
pub fn classify(candidates: &[(usize, Vector2<Real>)], p: &Vector2<Real>) -> Option<Wedge> {
    if let Some(&(index, _)) = candidates
        .iter()
        .filter(|(_, q)| (q - p).norm() < SAME_POINT)
        .min_by_key(|(i, _)| *i)
    {
        return Some(Wedge::Single(index));
    }

    let mut sorted: Vec<(Real, usize, Vector2<Real>)> = candidates
        .iter()
        .map(|&(i, q)| {
            let d = q - p;
            (d.y.atan2(d.x).rem_euclid(TAU), i, q)
        })
        .collect();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

    match sorted.len() {
        0 => return None,
        1 => return Some(Wedge::Single(sorted[0].1)),
        _ => {},
    }

    let half = TAU / 2.0 + ANGLE_TIE;
    let m = sorted.len();
    let mut best: Option<(Real, [usize; 3], Wedge)> = None;
    for i in 0..m {
        for j in (i + 1)..m {
            for k in (j + 1)..m {
                let (ti, tj, tk) = (sorted[i].0, sorted[j].0, sorted[k].0);
                let widest = (tj - ti).max(tk - tj).max(TAU - (tk - ti));
                if widest > half {
                    continue;
                }
                let Some(weights) = barycentric(p, &sorted[i].2, &sorted[j].2, &sorted[k].2)
                else {
                    continue;
                };
                let vertices = [sorted[i].1, sorted[j].1, sorted[k].1];
                let mut key = vertices;
                key.sort_unstable();
                let better = best.as_ref().is_none_or(|(w, bkey, _)| {
                    widest < *w - ANGLE_TIE || ((widest - *w).abs() <= ANGLE_TIE && key < *bkey)
                });
                if better {
                    best = Some((widest, key, Wedge::Triangle { vertices, weights }));
                }
            }
        }
    }
    if let Some((_, _, wedge)) = best {
        return Some(wedge);
    }

    // outside: the widest wedge's edge
    let mut widest = (Real::MIN, 0);
    for i in 0..m {
        let next = (i + 1) % m;
        let gap = if next == 0 {
            TAU - (sorted[i].0 - sorted[0].0)
        } else {
            sorted[next].0 - sorted[i].0
        };
        if gap > widest.0 {
            widest = (gap, i);
        }
    }
    let (_, a, qa) = sorted[widest.1];
    let (_, b, qb) = sorted[(widest.1 + 1) % m];
    let ab = qb - qa;
    let len2 = ab.norm_squared();
    let t = if len2 > 0.0 {
        ((p - qa).dot(&ab) / len2).clamp(0.0, 1.0)
    } else {
        0.0
    };
    Some(Wedge::Edge { a, b, t })
}

/// Faces sharing an edge and bending less than 45 degrees.
pub fn face_neighbours(bsp: &BspFile, faces: &[FaceInfo]) -> Vec<Vec<usize>> {
    let mut by_edge: HashMap<u32, Vec<usize>> = HashMap::new();
    for (i, f) in bsp.faces.iter().enumerate() {
        let first = f.firstedge.max(0) as usize;
        let count = f.numedges.max(0) as usize;
        for &se in bsp.surfedges.get(first..first + count).unwrap_or(&[]) {
            by_edge.entry(se.unsigned_abs()).or_default().push(i);
        }
    }
    let mut neighbours = vec![Vec::new(); faces.len()];
    for list in by_edge.values() {
        for &a in list {
            for &b in list {
                if a != b
                    && faces[a].plane.normal.dot(&faces[b].plane.normal) >= SMOOTHING_COS
                    && !neighbours[a].contains(&b)
                {
                    neighbours[a].push(b);
                }
            }
        }
    }
    neighbours
}

/// Interpolates per-patch values over one face.
pub struct FaceInterpolator<'a> {
    origin: Point3<Real>,
    axes: [Vector3<Real>; 2],
    candidates: Vec<(usize, Point3<Real>)>,
    values: &'a [[Real; 3]],
}

impl<'a> FaceInterpolator<'a> {
    pub fn new(
        face: &FaceInfo,
        neighbours: &[usize],
        by_face: &[Vec<usize>],
        patches: &[Patch],
        values: &'a [[Real; 3]],
    ) -> Self {
        let n = face.plane.normal;
        let helper = if n.x.abs() < 0.9 { Vector3::x() } else { Vector3::y() };
        let u = n.cross(&helper).normalize();
        let v = n.cross(&u);
        let candidates = std::iter::once(face.index)
            .chain(neighbours.iter().copied())
            .flat_map(|f| by_face[f].iter().map(|&p| (p, patches[p].origin - patches[p].normal)))
            .collect();
        FaceInterpolator {
            origin: face.winding.center(),
            axes: [u, v],
            candidates,
            values,
        }
    }

    fn project(&self, p: &Point3<Real>) -> Vector2<Real> {
        let d = p - self.origin;
        Vector2::new(d.dot(&self.axes[0]), d.dot(&self.axes[1]))
    }

    pub fn sample(&self, p: &Point3<Real>) -> [Real; 3] {
        let mut near: Vec<(Real, usize, Point3<Real>)> = self
            .candidates
            .iter()
            .map(|&(i, q)| ((q - p).norm_squared(), i, q))
            .collect();
        near.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        near.truncate(MAX_CANDIDATES);

        let projected: Vec<(usize, Vector2<Real>)> =
            near.iter().map(|&(_, i, q)| (i, self.project(&q))).collect();
        let Some(wedge) = classify(&projected, &self.project(p)) else {
            return [0.0; 3];
        };
        let mut out = [0.0; 3];
        for (i, w) in wedge.weights() {
            for c in 0..3 {
                out[c] += self.values[i][c] * w;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(x: Real, y: Real) -> Vector2<Real> {
        Vector2::new(x, y)
    }

    #[test]
    fn enclosed_point_uses_a_triangle() {
        let c = [(0, v(-1.0, -1.0)), (1, v(1.0, -1.0)), (2, v(0.0, 1.0))];
        match classify(&c, &v(0.0, 0.0)).unwrap() {
            Wedge::Triangle { weights, .. } => {
                assert!((weights.iter().sum::<Real>() - 1.0).abs() < 1e-9);
                assert!(weights.iter().all(|&w| w > 0.0));
            },
            other => panic!("expected triangle, got {other:?}"),
        }
    }

    #[test]
    fn outside_point_uses_the_facing_edge() {
        let c = [(4, v(0.0, 0.0)), (7, v(2.0, 0.0)), (9, v(1.0, 2.0))];
        let w = classify(&c, &v(1.0, -1.0)).unwrap();
        assert_eq!(w, Wedge::Edge { a: 4, b: 7, t: 0.5 });
    }

    #[test]
    fn square_ties_go_to_lower_indices() {
        // the centre of a square is enclosed by all four corner triangles
        let c = [(3, v(1.0, 1.0)), (1, v(-1.0, 1.0)), (0, v(-1.0, -1.0)), (2, v(1.0, -1.0))];
        match classify(&c, &v(0.0, 0.0)).unwrap() {
            Wedge::Triangle { mut vertices, .. } => {
                vertices.sort_unstable();
                assert_eq!(vertices, [0, 1, 2]);
            },
            other => panic!("expected triangle, got {other:?}"),
        }
    }
}
