//! Line tests through the world's hull 0 and opaque brush entities.

use crate::contents::Contents;
use crate::float_types::Real;
use crate::geometry::{Plane, Winding};
use crate::io::bspfile::BspFile;
use crate::rad::faces::{FaceInfo, point_in_winding};
use nalgebra::{Point3, Vector3};

/// `zhlt_lightflags` bit for entities that block light.
pub const LIGHTFLAG_OPAQUE: i32 = 2;

const TRACE_EPSILON: Real = 0.01;

/// Far enough to leave any map when looking for the sky.
const SKY_DISTANCE: Real = 65536.0;

pub struct Tracer {
    planes: Vec<Plane>,
    nodes: Vec<([i16; 2], usize)>,
    leaf_contents: Vec<i32>,
    headnode: i32,
    opaque: Vec<(Plane, Winding)>,
}

impl Tracer {
    /// `opaque_models` lists the brush models whose faces block light.
    pub fn new(bsp: &BspFile, faces: &[FaceInfo], opaque_models: &[usize]) -> Self {
        let planes = bsp
            .planes
            .iter()
            .map(|p| {
                Plane::new(
                    Vector3::new(p.normal[0] as Real, p.normal[1] as Real, p.normal[2] as Real),
                    p.dist as Real,
                )
            })
            .collect();
        let opaque = faces
            .iter()
            .filter(|f| f.model != 0 && opaque_models.contains(&f.model))
            .map(|f| (f.plane, f.winding.clone()))
            .collect();
        Tracer {
            planes,
            nodes: bsp
                .nodes
                .iter()
                .map(|n| (n.children, n.planenum.max(0) as usize))
                .collect(),
            leaf_contents: bsp.leafs.iter().map(|l| l.contents).collect(),
            headnode: bsp.models.first().map_or(0, |m| m.headnode[0]),
            opaque,
        }
    }

    /// BSP leaf containing `p`.
    pub fn point_leaf(&self, p: &Point3<Real>) -> usize {
        let mut node = self.headnode;
        while node >= 0 {
            let Some(&(children, planenum)) = self.nodes.get(node as usize) else {
                return 0;
            };
            let side = usize::from(self.planes[planenum].distance_to(p) < 0.0);
            node = children[side] as i32;
        }
        (-(node + 1)) as usize
    }

    fn contents(&self, leaf: usize) -> i32 {
        self.leaf_contents
            .get(leaf)
            .copied()
            .unwrap_or(Contents::Solid.code())
    }

    /// Contents of the first opaque leaf along `a → b`, if any.
    fn first_opaque(&self, node: i32, a: Point3<Real>, b: Point3<Real>) -> Option<i32> {
        if node < 0 {
            let contents = self.contents((-(node + 1)) as usize);
            let opaque = Contents::from_code(contents).is_none_or(Contents::is_opaque);
            return opaque.then_some(contents);
        }
        let (children, planenum) = *self.nodes.get(node as usize)?;
        let plane = &self.planes[planenum];
        let front = plane.distance_to(&a);
        let back = plane.distance_to(&b);

        if front >= -TRACE_EPSILON && back >= -TRACE_EPSILON {
            return self.first_opaque(children[0] as i32, a, b);
        }
        if front < TRACE_EPSILON && back < TRACE_EPSILON {
            return self.first_opaque(children[1] as i32, a, b);
        }

        let side = usize::from(front < 0.0);
        let frac = front / (front - back);
        let mid = a + (b - a) * frac;
        self.first_opaque(children[side] as i32, a, mid)
            .or_else(|| self.first_opaque(children[1 - side] as i32, mid, b))
    }

    fn crosses_opaque_face(&self, a: &Point3<Real>, b: &Point3<Real>) -> bool {
        self.opaque.iter().any(|(plane, winding)| {
            let da = plane.distance_to(a);
            let db = plane.distance_to(b);
            let crosses = (da > TRACE_EPSILON && db < -TRACE_EPSILON)
                || (da < -TRACE_EPSILON && db > TRACE_EPSILON);
            if !crosses {
                return false;
            }
            let hit = a + (b - a) * (da / (da - db));
            point_in_winding(winding, &plane.normal, &hit, 0.0)
        })
    }

    /// Nothing solid, sky or opaque between `a` and `b`.
    pub fn clear(&self, a: &Point3<Real>, b: &Point3<Real>) -> bool {
        self.first_opaque(self.headnode, *a, *b).is_none() && !self.crosses_opaque_face(a, b)
    }

    /// Looking from `p` along `direction` the first thing hit is sky.
    pub fn sees_sky(&self, p: &Point3<Real>, direction: &Vector3<Real>) -> bool {
        let end = p + direction.normalize() * SKY_DISTANCE;
        self.first_opaque(self.headnode, *p, end) == Some(Contents::Sky.code())
            && !self.crosses_opaque_face(p, &end)
    }
}
