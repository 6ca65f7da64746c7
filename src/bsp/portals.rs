//! Portals between the leafs of a finished tree.
//!
//! The head node is wrapped in a box of six portals leading to a synthetic
//! outside leaf; every decision node then adds a portal on its own plane and
//! splits the portals it inherited. Detail clusters are not descended into.

use crate::bsp::node::{BspNode, NodeId, Tree};
use crate::contents::Contents;
use crate::float_types::{Real, tolerance};
use crate::geometry::{Plane, PlaneTable, Winding};
use crate::io::portalfile::{PortalFile, PortalRecord};
use nalgebra::Vector3;

pub type PortalId = usize;

/// Distance of the head node box beyond the model bounds.
pub const HEADNODE_SPACE: Real = 8.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Portal {
    /// Faces `nodes[0]`.
    pub plane: Plane,
    pub winding: Winding,
    pub nodes: [NodeId; 2],
}

impl Portal {
    /// The node on the other side from `node`.
    pub fn other(&self, node: NodeId) -> NodeId {
        if self.nodes[0] == node {
            self.nodes[1]
        } else {
            self.nodes[0]
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Portals {
    pub portals: Vec<Option<Portal>>,
    /// Synthetic leaf outside the head node box.
    pub outside: NodeId,
}

impl Portals {
    pub fn get(&self, id: PortalId) -> Option<&Portal> {
        self.portals.get(id).and_then(Option::as_ref)
    }

    pub fn live(&self) -> impl Iterator<Item = (PortalId, &Portal)> {
        self.portals
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.as_ref().map(|p| (i, p)))
    }

    fn add(&mut self, tree: &mut Tree, portal: Portal) -> PortalId {
        let id = self.portals.len();
        for n in portal.nodes {
            tree.nodes[n].portals.push(id);
        }
        self.portals.push(Some(portal));
        id
    }
}

/// Builds the portals of `tree`. The outside leaf is appended to the arena
/// but is not reachable from the root.
pub fn portalize(tree: &mut Tree, planes: &PlaneTable) -> Portals {
    let epsilon = tolerance();
    let mut portals = Portals::default();
    let root = tree.root;
    let bounds = tree
        .node(root)
        .bounds
        .expanded(HEADNODE_SPACE - crate::bsp::build::SIDESPACE);
    portals.outside = tree.push(BspNode::leaf(Contents::Empty, bounds));

    if tree.is_portal_leaf(root) {
        return portals;
    }

    // inward facing box planes
    let mut box_planes = Vec::with_capacity(6);
    for axis in 0..3 {
        let mut normal = Vector3::zeros();
        normal[axis] = 1.0;
        box_planes.push(Plane::new(normal, bounds.mins[axis]));
        box_planes.push(Plane::new(-normal, -bounds.maxs[axis]));
    }
    for (i, plane) in box_planes.iter().enumerate() {
        let winding = box_planes
            .iter()
            .enumerate()
            .filter(|&(j, _)| j != i)
            .try_fold(Winding::base_for_plane(plane), |w, (_, other)| {
                w.clip(other, epsilon, false)
            });
        if let Some(winding) = winding {
            portals.add(tree, Portal {
                plane: *plane,
                winding,
                nodes: [root, portals.outside],
            });
        }
    }

    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if tree.is_portal_leaf(node) {
            continue;
        }
        let (Some(planenum), Some([front, back])) =
            (tree.node(node).planenum(), tree.node(node).children())
        else {
            continue;
        };
        cut_node_portals(tree, &mut portals, node, planes.get(planenum), [front, back], epsilon);
        stack.push(back);
        stack.push(front);
    }

    tracing::debug!("{} portals", portals.live().count());
    portals
}

fn cut_node_portals(
    tree: &mut Tree,
    portals: &mut Portals,
    node: NodeId,
    plane: &Plane,
    children: [NodeId; 2],
    epsilon: Real,
) {
    let inherited = std::mem::take(&mut tree.nodes[node].portals);

    // the new portal on the node plane, clipped to the node's cell
    let mut winding = Some(Winding::base_for_plane(plane));
    for &pid in &inherited {
        let Some(p) = portals.get(pid) else {
            continue;
        };
        let clip = if p.nodes[0] == node {
            p.plane
        } else {
            p.plane.flipped()
        };
        winding = winding.and_then(|w| w.clip(&clip, epsilon, false));
    }
    match winding {
        Some(winding) if !winding.is_tiny() => {
            portals.add(tree, Portal {
                plane: *plane,
                winding,
                nodes: children,
            });
        },
        _ => tracing::trace!("node {node}: new portal clipped away"),
    }

    // hand the inherited portals down to the children
    for pid in inherited {
        let Some(mut portal) = portals.portals[pid].take() else {
            continue;
        };
        let side = usize::from(portal.nodes[0] != node);
        let other = portal.nodes[1 - side];
        tree.nodes[other].portals.retain(|&p| p != pid);

        let (front, back) = portal.winding.split(plane, epsilon);
        match (front, back) {
            (Some(f), Some(b)) => {
                let mut back_portal = portal.clone();
                back_portal.winding = b;
                back_portal.nodes[side] = children[1];
                portal.winding = f;
                portal.nodes[side] = children[0];
                for n in portal.nodes {
                    tree.nodes[n].portals.push(pid);
                }
                portals.portals[pid] = Some(portal);
                portals.add(tree, back_portal);
            },
            (Some(_), None) => {
                portal.nodes[side] = children[0];
                for n in portal.nodes {
                    tree.nodes[n].portals.push(pid);
                }
                portals.portals[pid] = Some(portal);
            },
            (None, Some(_)) => {
                portal.nodes[side] = children[1];
                for n in portal.nodes {
                    tree.nodes[n].portals.push(pid);
                }
                portals.portals[pid] = Some(portal);
            },
            (None, None) => {},
        }
    }
}

/// Vis leaf numbering: open leafs and clusters of the structural tree, in
/// the same front-first order their BSP leafs are written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisLeaves {
    /// Vis leaf of each arena node, if it is one.
    pub of_node: Vec<Option<usize>>,
    /// BSP leafs each vis leaf covers.
    pub leaf_counts: Vec<usize>,
}

pub fn number_vis_leaves(tree: &Tree) -> VisLeaves {
    let mut vis = VisLeaves {
        of_node: vec![None; tree.nodes.len()],
        leaf_counts: Vec::new(),
    };
    for node in tree.portal_leaves() {
        let count = tree.open_leaf_count(node);
        if count == 0 {
            continue;
        }
        vis.of_node[node] = Some(vis.leaf_counts.len());
        vis.leaf_counts.push(count);
    }
    vis
}

/// The `.prt` contents: every portal between two vis leafs.
pub fn portal_file(portals: &Portals, vis: &VisLeaves) -> PortalFile {
    let records = portals
        .live()
        .filter_map(|(_, p)| {
            let a = vis.of_node.get(p.nodes[0]).copied().flatten()?;
            let b = vis.of_node.get(p.nodes[1]).copied().flatten()?;
            Some(PortalRecord {
                winding: p.winding.clone(),
                leafs: [a, b],
            })
        })
        .collect();
    PortalFile {
        num_leafs: vis.leaf_counts.len(),
        portals: records,
        leaf_counts: vis.leaf_counts.clone(),
    }
}
