//! Recursive partitioning of one hull's faces into a BSP tree.
//!
//! Every node also tracks the convex cell it covers (as a set of outward
//! facing windings) so node and leaf bounds describe the real region, not
//! just the faces inside it.

use crate::aabb::Aabb;
use crate::bsp::node::{BspNode, Leaf, NodeId, NodeKind, RenderFace, Tree};
use crate::bsp::surface::{BuildFace, Surface, faces_bounds, group_surfaces};
use crate::bsp::traits::SplittingPlaneStrategy;
use crate::contents::Contents;
use crate::errors::{CompileError, Result};
use crate::float_types::{Real, tolerance};
use crate::geometry::winding::brush_windings;
use crate::geometry::{Plane, PlaneTable, Winding};
use crate::io::polyfile::DetailBrushRecord;
use nalgebra::Vector3;

/// Space left around the faces for the root cell.
pub const SIDESPACE: Real = 24.0;

/// Outward plane and face winding of a node's convex cell.
type Cell = Vec<(Plane, Winding)>;

fn box_cell(bounds: &Aabb) -> Cell {
    let mut planes = Vec::with_capacity(6);
    for axis in 0..3 {
        let mut normal = Vector3::zeros();
        normal[axis] = 1.0;
        planes.push(Plane::new(normal, bounds.maxs[axis]));
        planes.push(Plane::new(-normal, -bounds.mins[axis]));
    }
    let windings = brush_windings(&planes, tolerance());
    planes
        .into_iter()
        .zip(windings)
        .filter_map(|(p, w)| w.map(|w| (p, w)))
        .collect()
}

fn split_cell(cell: &Cell, plane: &Plane, epsilon: Real) -> (Cell, Cell) {
    let cap = cell
        .iter()
        .try_fold(Winding::base_for_plane(plane), |w, (p, _)| w.chop(p, epsilon));

    let mut front = Vec::with_capacity(cell.len() + 1);
    let mut back = Vec::with_capacity(cell.len() + 1);
    for (p, w) in cell {
        let (f, b) = w.split(plane, epsilon);
        if let Some(f) = f {
            front.push((*p, f));
        }
        if let Some(b) = b {
            back.push((*p, b));
        }
    }
    if let Some(cap) = cap {
        front.push((plane.flipped(), cap.reversed()));
        back.push((*plane, cap));
    }
    (front, back)
}

fn cell_bounds(cell: &Cell) -> Aabb {
    let mut bounds = Aabb::cleared();
    for (_, w) in cell {
        bounds.add_box(&w.bounds());
    }
    bounds
}

/// Knobs of one tree build.
pub struct BuildSettings<'a> {
    pub strategy: &'a dyn SplittingPlaneStrategy,
    pub max_node_size: Real,
    /// Partition detail faces into clusters below the structural tree.
    pub use_detail: bool,
    /// Record on-node faces for rendering.
    pub render: bool,
    pub detail_brushes: &'a [DetailBrushRecord],
}

struct TreeBuilder<'a> {
    planes: &'a mut PlaneTable,
    settings: &'a BuildSettings<'a>,
    epsilon: Real,
    tree: Tree,
}

/// Builds the tree of one model in one hull.
pub fn build_tree(
    faces: Vec<BuildFace>,
    planes: &mut PlaneTable,
    settings: &BuildSettings<'_>,
) -> Result<Tree> {
    let mut builder = TreeBuilder {
        planes,
        settings,
        epsilon: tolerance(),
        tree: Tree::default(),
    };

    if faces.is_empty() {
        // nothing to collide with or draw
        builder.tree.root = builder
            .tree
            .push(BspNode::leaf(Contents::Empty, Aabb::cleared()));
        return Ok(builder.tree);
    }

    let cell = box_cell(&faces_bounds(&faces).expanded(SIDESPACE));
    let root = builder.build_node(faces, cell, None, false)?;
    builder.tree.root = root;
    Ok(builder.tree)
}

impl TreeBuilder<'_> {
    fn build_node(
        &mut self,
        faces: Vec<BuildFace>,
        cell: Cell,
        parent: Option<NodeId>,
        in_detail: bool,
    ) -> Result<NodeId> {
        let bounds = cell_bounds(&cell);
        let surfaces = group_surfaces(&faces);
        let candidates: Vec<&Surface> = surfaces
            .iter()
            .filter(|s| in_detail || !self.settings.use_detail || s.structural)
            .collect();

        if candidates.is_empty() {
            if !in_detail && !surfaces.is_empty() {
                let id = self.build_node(faces, cell, parent, true)?;
                self.tree.nodes[id].cluster = true;
                return Ok(id);
            }
            return Ok(self.make_leaf(&faces, bounds, parent, in_detail));
        }

        let planenum = self.choose_plane(&candidates, &faces)?;
        let plane = *self.planes.get(planenum);

        let mut node = BspNode::leaf(Contents::Empty, bounds);
        node.parent = parent;
        node.detail = in_detail;
        let id = self.tree.push(node);

        let mut front = Vec::with_capacity(faces.len());
        let mut back = Vec::with_capacity(faces.len());
        for mut face in faces {
            if face.planenum & !1 == planenum {
                face.on_node = true;
                if self.settings.render && face.render.is_none() && face.texinfo >= 0 {
                    let render = self.tree.faces.len();
                    self.tree.faces.push(RenderFace {
                        planenum: face.planenum,
                        texinfo: face.texinfo,
                        contents: face.contents,
                        winding: face.winding.clone(),
                        node: id,
                    });
                    self.tree.nodes[id].faces.push(render);
                    face.render = Some(render);
                }
                if face.planenum == planenum {
                    front.push(face);
                } else {
                    back.push(face);
                }
                continue;
            }

            let (f, b) = face.winding.split(&plane, self.epsilon);
            match (f, b) {
                (Some(f), Some(b)) => {
                    front.push(face.with_winding(f));
                    back.push(face.with_winding(b));
                },
                (Some(_), None) => front.push(face),
                (None, Some(_)) => back.push(face),
                (None, None) => {},
            }
        }

        let (front_cell, back_cell) = split_cell(&cell, &plane, self.epsilon);
        let front_id = self.build_node(front, front_cell, Some(id), in_detail)?;
        let back_id = self.build_node(back, back_cell, Some(id), in_detail)?;
        self.tree.nodes[id].kind = NodeKind::Decision {
            planenum,
            children: [front_id, back_id],
        };
        Ok(id)
    }

    /// Node size limit first, then the strategy.
    fn choose_plane(&mut self, candidates: &[&Surface], faces: &[BuildFace]) -> Result<usize> {
        let bounds = faces_bounds(faces);
        let size = bounds.size();
        let axis = size.imax();

        if size[axis] > self.settings.max_node_size {
            let lo = bounds.mins[axis] + size[axis] * 0.25;
            let hi = bounds.maxs[axis] - size[axis] * 0.25;
            let axial: Vec<usize> = candidates
                .iter()
                .map(|s| s.planenum)
                .filter(|&p| {
                    let plane = self.planes.get(p);
                    plane.kind.is_axial()
                        && plane.kind.axis() == axis
                        && (lo..=hi).contains(&(plane.dist * plane.normal[axis]))
                })
                .collect();
            if let Some(p) = self
                .settings
                .strategy
                .pick_best_splitting_plane(&axial, faces, self.planes)
            {
                return Ok(p);
            }

            let mut normal = Vector3::zeros();
            normal[axis] = 1.0;
            let mid = ((bounds.mins[axis] + bounds.maxs[axis]) * 0.5).round();
            let planenum = self.planes.find_or_insert(normal, mid)?;
            tracing::trace!("bisecting node at {mid} on axis {axis}");
            return Ok(planenum & !1);
        }

        let planenums: Vec<usize> = candidates.iter().map(|s| s.planenum).collect();
        self.settings
            .strategy
            .pick_best_splitting_plane(&planenums, faces, self.planes)
            .ok_or_else(|| CompileError::Internal("no splitting plane among candidates".into()))
    }

    fn make_leaf(
        &mut self,
        faces: &[BuildFace],
        bounds: Aabb,
        parent: Option<NodeId>,
        in_detail: bool,
    ) -> NodeId {
        let mut contents: Option<Contents> = None;
        for face in faces {
            let c = face.contents.leaf_contents();
            if contents.is_none_or(|cur| c.rank() > cur.rank()) {
                contents = Some(c);
            }
        }
        let mut contents = contents.unwrap_or(Contents::Solid);
        if in_detail && contents != Contents::Solid && self.inside_detail_brush(&bounds) {
            contents = Contents::Solid;
        }

        let mut mark_faces: Vec<usize> = Vec::new();
        if contents != Contents::Solid {
            for render in faces.iter().filter_map(|f| f.render) {
                if !mark_faces.contains(&render) {
                    mark_faces.push(render);
                }
            }
        }

        let mut node = BspNode::leaf(contents, bounds);
        node.kind = NodeKind::Leaf(Leaf {
            contents,
            mark_faces,
        });
        node.parent = parent;
        node.detail = in_detail;
        self.tree.push(node)
    }

    fn inside_detail_brush(&self, bounds: &Aabb) -> bool {
        if bounds.is_cleared() {
            return false;
        }
        let center = bounds.center();
        self.settings.detail_brushes.iter().any(|brush| {
            !brush.faces.is_empty()
                && brush.faces.iter().all(|(planenum, _)| {
                    usize::try_from(*planenum)
                        .ok()
                        .filter(|&p| p < self.planes.len())
                        .is_some_and(|p| self.planes.get(p).distance_to(&center) < -self.epsilon)
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bsp::traits::BalancedSplittingStrategy;

    fn face(planes: &mut PlaneTable, normal: Vector3<Real>, dist: Real, w: Winding) -> BuildFace {
        BuildFace {
            planenum: planes.find_or_insert(normal, dist).unwrap(),
            texinfo: 0,
            contents: Contents::Empty,
            detail_level: 0,
            winding: w,
            on_node: false,
            render: None,
        }
    }

    /// Inward-facing faces of a hollow box from 0 to `size`.
    fn room(planes: &mut PlaneTable, size: Real) -> Vec<BuildFace> {
        let mut faces = Vec::new();
        for axis in 0..3 {
            let mut n = Vector3::zeros();
            n[axis] = 1.0;
            for (normal, dist) in [(n, 0.0), (-n, -size)] {
                let plane = Plane::new(normal, dist);
                let w = [0, 1, 2]
                    .iter()
                    .filter(|&&a| a != axis)
                    .flat_map(|&a| {
                        let mut lo = Vector3::zeros();
                        lo[a] = 1.0;
                        [Plane::new(lo, size), Plane::new(-lo, 0.0)]
                    })
                    .try_fold(Winding::base_for_plane(&plane), |w, p| w.chop(&p, 0.01))
                    .unwrap();
                faces.push(face(planes, normal, dist, w));
            }
        }
        faces
    }

    #[test]
    fn hollow_box_has_one_open_leaf() {
        let mut planes = PlaneTable::new();
        let faces = room(&mut planes, 256.0);
        let strategy = BalancedSplittingStrategy::default();
        let settings = BuildSettings {
            strategy: &strategy,
            max_node_size: 1024.0,
            use_detail: true,
            render: true,
            detail_brushes: &[],
        };
        let tree = build_tree(faces, &mut planes, &settings).unwrap();
        assert_eq!(tree.faces.len(), 6);
        let open: Vec<_> = tree
            .leaves_under(tree.root)
            .into_iter()
            .filter(|&l| !tree.is_solid(l))
            .collect();
        assert_eq!(open.len(), 1);
        let bounds = tree.node(open[0]).bounds;
        assert!((bounds.mins - nalgebra::Point3::origin()).norm() < 1e-6);
        assert!((bounds.maxs - nalgebra::Point3::new(256.0, 256.0, 256.0)).norm() < 1e-6);
        let leaf = tree.node(open[0]).as_leaf().unwrap();
        assert_eq!(leaf.mark_faces.len(), 6);
    }

    #[test]
    fn large_room_is_bisected() {
        let mut planes = PlaneTable::new();
        let faces = room(&mut planes, 4096.0);
        let strategy = BalancedSplittingStrategy::default();
        let settings = BuildSettings {
            strategy: &strategy,
            max_node_size: 1024.0,
            use_detail: true,
            render: true,
            detail_brushes: &[],
        };
        let tree = build_tree(faces, &mut planes, &settings).unwrap();
        let open: Vec<_> = tree
            .leaves_under(tree.root)
            .into_iter()
            .filter(|&l| !tree.is_solid(l))
            .collect();
        assert!(open.len() > 1);
        // the open leafs tile the room exactly
        let volume: Real = open
            .iter()
            .map(|&l| {
                let size = tree.node(l).bounds.size();
                size.x * size.y * size.z
            })
            .sum();
        assert!((volume - 4096.0 * 4096.0 * 4096.0).abs() < 1.0);
    }
}
