//! Rough per-portal visibility: which portals could possibly be seen
//! through each portal, ignoring occlusion by other portals.

use crate::errors::Result;
use crate::float_types::Real;
use crate::parallel::run_threads_on;
use crate::vis::portal::{PortalBits, PortalGraph, VisPortal};

/// `target` has a point in front of `source`, and `source` has a point
/// behind `target`.
fn might_see(source: &VisPortal, target: &VisPortal, epsilon: Real) -> bool {
    let in_front = target
        .winding
        .points
        .iter()
        .any(|p| source.plane.distance_to(p) > epsilon);
    let behind = source
        .winding
        .points
        .iter()
        .any(|p| target.plane.distance_to(p) < -epsilon);
    in_front && behind
}

fn too_far(source: &VisPortal, target: &VisPortal, max_distance: Option<Real>) -> bool {
    max_distance.is_some_and(|max| {
        (target.origin - source.origin).norm() - source.radius - target.radius > max
    })
}

/// The `mightsee` set of one portal: candidates from [`might_see`], kept
/// only when a flood from the portal's leaf through candidates reaches them.
pub fn base_portal_vis(
    graph: &PortalGraph,
    source: usize,
    max_distance: Option<Real>,
    epsilon: Real,
) -> PortalBits {
    let n = graph.portals.len();
    let p = &graph.portals[source];

    let mut front = PortalBits::new(n);
    for (i, target) in graph.portals.iter().enumerate() {
        if i != source && might_see(p, target, epsilon) && !too_far(p, target, max_distance) {
            front.set(i);
        }
    }

    let mut flood = PortalBits::new(n);
    let mut stack = vec![p.leaf];
    while let Some(leaf) = stack.pop() {
        for &next in &graph.leafs[leaf].portals {
            if front.get(next) && !flood.get(next) {
                flood.set(next);
                stack.push(graph.portals[next].leaf);
            }
        }
    }
    flood
}

pub fn base_vis(
    graph: &PortalGraph,
    max_distance: Option<Real>,
    epsilon: Real,
    threads: usize,
) -> Result<Vec<PortalBits>> {
    let mightsee = run_threads_on(graph.portals.len(), threads, "base vis", |p| {
        Ok(base_portal_vis(graph, p, max_distance, epsilon))
    })?;
    let total: usize = mightsee.iter().map(PortalBits::count).sum();
    tracing::debug!(
        "base vis: {total} mightsee ({:.1} per portal)",
        total as Real / graph.portals.len().max(1) as Real
    );
    Ok(mightsee)
}
