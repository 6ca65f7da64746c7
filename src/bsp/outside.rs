//! Outside fill and leak detection.

use crate::bsp::node::{NodeId, Tree};
use crate::bsp::portals::{PortalId, Portals};
use crate::float_types::Real;
use crate::geometry::PlaneTable;
use crate::io::entities::Entity;
use hashbrown::HashMap;
use nalgebra::Point3;
use std::collections::VecDeque;

/// A point entity that marks the space it stands in as inside the level.
#[derive(Debug, Clone, PartialEq)]
pub struct Occupant {
    pub classname: String,
    pub origin: Point3<Real>,
}

/// Point entities with an origin. The world and brush entities do not count.
pub fn occupants(entities: &[Entity]) -> Vec<Occupant> {
    entities
        .iter()
        .skip(1)
        .filter(|e| !e.value_or_empty("model").starts_with('*'))
        .filter_map(|e| {
            e.origin().map(|origin| Occupant {
                classname: e.classname().to_string(),
                origin,
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum FillOutcome {
    /// No entity stands in open space; nothing was filled.
    Unoccupied,
    /// The flood from outside reached an occupant. `trace` runs from the
    /// occupant out through portal centres to the void.
    Leaked { occupant: Occupant, trace: Vec<Point3<Real>> },
    /// Leafs (or clusters) turned solid.
    Filled { leafs: usize },
}

/// Floods from the outside leaf through portals with open space on both
/// sides. Without a leak every reached leaf becomes solid; with one the tree
/// is left untouched.
pub fn fill_outside(
    tree: &mut Tree,
    portals: &Portals,
    planes: &PlaneTable,
    occupants: &[Occupant],
) -> FillOutcome {
    let mut occupied: HashMap<NodeId, usize> = HashMap::new();
    for (i, occupant) in occupants.iter().enumerate() {
        let leaf = tree.locate(&occupant.origin, planes);
        if tree.is_solid(leaf) {
            tracing::debug!(
                "{} at {:?} is inside solid",
                occupant.classname,
                occupant.origin
            );
            continue;
        }
        occupied.entry(leaf).or_insert(i);
    }
    if occupied.is_empty() {
        return FillOutcome::Unoccupied;
    }

    let mut came_from: HashMap<NodeId, (NodeId, PortalId)> = HashMap::new();
    let mut queue = VecDeque::from([portals.outside]);
    let mut reached = vec![false; tree.nodes.len()];
    reached[portals.outside] = true;

    while let Some(node) = queue.pop_front() {
        for &pid in &tree.nodes[node].portals {
            let Some(portal) = portals.get(pid) else {
                continue;
            };
            let other = portal.other(node);
            if reached[other] || tree.is_solid(other) {
                continue;
            }
            reached[other] = true;
            came_from.insert(other, (node, pid));

            if let Some(&i) = occupied.get(&other) {
                let occupant = occupants[i].clone();
                let mut trace = vec![occupant.origin];
                let mut at = other;
                while let Some(&(prev, pid)) = came_from.get(&at) {
                    if let Some(p) = portals.get(pid) {
                        trace.push(p.winding.center());
                    }
                    at = prev;
                }
                return FillOutcome::Leaked { occupant, trace };
            }
            queue.push_back(other);
        }
    }

    let mut leafs = 0;
    for (node, &hit) in reached.iter().enumerate() {
        if hit && node != portals.outside {
            tree.fill(node);
            leafs += 1;
        }
    }
    FillOutcome::Filled { leafs }
}
