//! BSP tree arena.
//!
//! Nodes live in one `Vec` and refer to each other by [`NodeId`]. A tree is
//! built once per model and hull; the portal and fill passes only change leaf
//! contents and portal lists afterwards.

use crate::aabb::Aabb;
use crate::bsp::portals::PortalId;
use crate::contents::Contents;
use crate::float_types::Real;
use crate::geometry::{PlaneTable, Winding};
use nalgebra::Point3;

pub type NodeId = usize;

/// A face that reached a node plane and will be written for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderFace {
    pub planenum: usize,
    pub texinfo: i32,
    pub contents: Contents,
    pub winding: Winding,
    pub node: NodeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Leaf {
    pub contents: Contents,
    /// Render faces that bound this leaf and face into it.
    pub mark_faces: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// `children[0]` is in front of the plane, `children[1]` behind it.
    Decision { planenum: usize, children: [NodeId; 2] },
    Leaf(Leaf),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BspNode {
    pub kind: NodeKind,
    /// Bounds of the convex region the node covers.
    pub bounds: Aabb,
    pub parent: Option<NodeId>,
    /// Render faces lying on this node's plane.
    pub faces: Vec<usize>,
    /// Part of a detail sub-tree.
    pub detail: bool,
    /// Root of a detail cluster; portals and flood fill treat the whole
    /// sub-tree as a single leaf.
    pub cluster: bool,
    pub portals: Vec<PortalId>,
}

impl BspNode {
    pub fn leaf(contents: Contents, bounds: Aabb) -> Self {
        BspNode {
            kind: NodeKind::Leaf(Leaf {
                contents,
                mark_faces: Vec::new(),
            }),
            bounds,
            parent: None,
            faces: Vec::new(),
            detail: false,
            cluster: false,
            portals: Vec::new(),
        }
    }

    pub fn children(&self) -> Option<[NodeId; 2]> {
        match &self.kind {
            NodeKind::Decision { children, .. } => Some(*children),
            NodeKind::Leaf(_) => None,
        }
    }

    pub fn planenum(&self) -> Option<usize> {
        match &self.kind {
            NodeKind::Decision { planenum, .. } => Some(*planenum),
            NodeKind::Leaf(_) => None,
        }
    }

    pub fn as_leaf(&self) -> Option<&Leaf> {
        match &self.kind {
            NodeKind::Leaf(leaf) => Some(leaf),
            NodeKind::Decision { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tree {
    pub nodes: Vec<BspNode>,
    pub root: NodeId,
    pub faces: Vec<RenderFace>,
}

impl Tree {
    pub fn push(&mut self, node: BspNode) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub fn node(&self, id: NodeId) -> &BspNode {
        &self.nodes[id]
    }

    /// A leaf or a detail cluster: the unit portals connect.
    pub fn is_portal_leaf(&self, id: NodeId) -> bool {
        let node = &self.nodes[id];
        node.cluster || node.as_leaf().is_some()
    }

    /// All BSP leafs below `id`, front child first.
    pub fn leaves_under(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            match self.nodes[n].children() {
                Some([front, back]) => {
                    stack.push(back);
                    stack.push(front);
                },
                None => out.push(n),
            }
        }
        out
    }

    /// Leafs and clusters of the structural tree, front child first.
    pub fn portal_leaves(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(n) = stack.pop() {
            if self.is_portal_leaf(n) {
                out.push(n);
                continue;
            }
            if let Some([front, back]) = self.nodes[n].children() {
                stack.push(back);
                stack.push(front);
            }
        }
        out
    }

    /// Contents seen from a portal: a cluster is solid only when every leaf
    /// in it is.
    pub fn portal_contents(&self, id: NodeId) -> Contents {
        if let Some(leaf) = self.nodes[id].as_leaf() {
            return leaf.contents;
        }
        self.leaves_under(id)
            .into_iter()
            .filter_map(|l| self.nodes[l].as_leaf().map(|leaf| leaf.contents))
            .find(|&c| c != Contents::Solid)
            .unwrap_or(Contents::Solid)
    }

    pub fn is_solid(&self, id: NodeId) -> bool {
        self.portal_contents(id) == Contents::Solid
    }

    /// Makes a leaf or cluster solid and drops its faces.
    pub fn fill(&mut self, id: NodeId) {
        for l in self.leaves_under(id) {
            if let NodeKind::Leaf(leaf) = &mut self.nodes[l].kind {
                leaf.contents = Contents::Solid;
                leaf.mark_faces.clear();
            }
        }
    }

    /// Portal leaf containing `point`. Points on a plane go to the front.
    pub fn locate(&self, point: &Point3<Real>, planes: &PlaneTable) -> NodeId {
        let mut n = self.root;
        while !self.is_portal_leaf(n) {
            let node = &self.nodes[n];
            let (Some(planenum), Some([front, back])) = (node.planenum(), node.children()) else {
                break;
            };
            n = if planes.get(planenum).distance_to(point) >= 0.0 {
                front
            } else {
                back
            };
        }
        n
    }

    /// Number of BSP leafs below `id` that are not solid.
    pub fn open_leaf_count(&self, id: NodeId) -> usize {
        self.leaves_under(id)
            .into_iter()
            .filter(|&l| {
                self.nodes[l]
                    .as_leaf()
                    .is_some_and(|leaf| leaf.contents != Contents::Solid)
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_leaf_tree() -> (Tree, PlaneTable) {
        let mut planes = PlaneTable::new();
        let planenum = planes
            .find_or_insert(nalgebra::Vector3::x(), 0.0)
            .unwrap();
        let mut tree = Tree::default();
        let front = tree.push(BspNode::leaf(Contents::Empty, Aabb::cleared()));
        let back = tree.push(BspNode::leaf(Contents::Solid, Aabb::cleared()));
        let mut root = BspNode::leaf(Contents::Empty, Aabb::cleared());
        root.kind = NodeKind::Decision {
            planenum,
            children: [front, back],
        };
        tree.root = tree.push(root);
        (tree, planes)
    }

    #[test]
    fn locate_follows_planes() {
        let (tree, planes) = two_leaf_tree();
        assert_eq!(tree.locate(&Point3::new(5.0, 0.0, 0.0), &planes), 0);
        assert_eq!(tree.locate(&Point3::new(-5.0, 0.0, 0.0), &planes), 1);
        assert_eq!(tree.locate(&Point3::origin(), &planes), 0);
    }

    #[test]
    fn fill_clears_leaf() {
        let (mut tree, _) = two_leaf_tree();
        assert!(!tree.is_solid(0));
        tree.fill(0);
        assert!(tree.is_solid(0));
        assert_eq!(tree.open_leaf_count(tree.root), 0);
    }
}
