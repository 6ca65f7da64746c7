//! Exact portal visibility by recursive flow through pass portals.
//!
//! Starting from a source portal, each step into a neighbour leaf narrows
//! the visible region of the next portal by the planes that separate the
//! source from the current pass portal. A portal is visible once anything of
//! it survives.

use crate::errors::{CompileError, Result};
use crate::float_types::Real;
use crate::geometry::{Plane, Winding};
use crate::parallel::run_threads_on;
use crate::vis::portal::{PortalBits, PortalGraph};
use std::sync::OnceLock;

struct PassStack {
    source: Winding,
    pass: Option<Winding>,
    portal_plane: Plane,
    mightsee: PortalBits,
}

struct Flow<'a> {
    graph: &'a PortalGraph,
    mightsee: &'a [PortalBits],
    done: &'a [OnceLock<PortalBits>],
    epsilon: Real,
}

/// Cuts `target` by every plane that has all of `source` on one side and
/// all of `pass` on the other. With `flip` the side kept is reversed.
fn clip_to_separators(
    source: &Winding,
    pass: &Winding,
    mut target: Winding,
    flip: bool,
    epsilon: Real,
) -> Option<Winding> {
    let sn = source.points.len();
    for i in 0..sn {
        let l = (i + 1) % sn;
        let v1 = source.points[l] - source.points[i];

        for (j, pj) in pass.points.iter().enumerate() {
            let v2 = pj - source.points[i];
            let normal = v1.cross(&v2);
            let length = normal.norm();
            if length < epsilon {
                continue;
            }
            let normal = normal / length;
            let mut plane = Plane::new(normal, pj.coords.dot(&normal));

            // which side holds the source portal
            let side = source
                .points
                .iter()
                .enumerate()
                .filter(|&(k, _)| k != i && k != l)
                .map(|(_, p)| plane.distance_to(p))
                .find(|d| d.abs() > epsilon);
            match side {
                // coplanar with the source portal
                None => continue,
                Some(d) if d > 0.0 => plane.flip(),
                Some(_) => {},
            }

            // a separator has every pass point on its front
            let mut any_front = false;
            let mut separates = true;
            for (k, p) in pass.points.iter().enumerate() {
                if k == j {
                    continue;
                }
                let d = plane.distance_to(p);
                if d < -epsilon {
                    separates = false;
                    break;
                }
                any_front |= d > epsilon;
            }
            if !separates || !any_front {
                continue;
            }

            if flip {
                plane.flip();
            }
            // on-plane targets stay visible: over-reporting keeps fast ⊇ full
            target = target.clip(&plane, epsilon, true)?;
        }
    }
    Some(target)
}

impl Flow<'_> {
    fn portal_flow(&self, source: usize) -> PortalBits {
        let portal = &self.graph.portals[source];
        let mut vis = PortalBits::new(self.graph.portals.len());
        let head = PassStack {
            source: portal.winding.clone(),
            pass: None,
            portal_plane: portal.plane,
            mightsee: self.mightsee[source].clone(),
        };
        self.leaf_flow(&portal.plane, portal.leaf, &head, &mut vis);
        vis
    }

    fn leaf_flow(&self, base_plane: &Plane, leaf: usize, prev: &PassStack, vis: &mut PortalBits) {
        for &pnum in &self.graph.leafs[leaf].portals {
            if !prev.mightsee.get(pnum) {
                continue;
            }
            // finished portals prune with their exact set
            let test = self.done[pnum].get().unwrap_or(&self.mightsee[pnum]);
            let might = prev.mightsee.intersection(test);
            if !might.has_new(vis) && vis.get(pnum) {
                continue;
            }

            let portal = &self.graph.portals[pnum];
            let Some(pass) = portal.winding.clip(base_plane, self.epsilon, true) else {
                continue;
            };
            let Some(source) = prev.source.clip(&portal.plane.flipped(), self.epsilon, true)
            else {
                continue;
            };

            let pass = match &prev.pass {
                // the first neighbour can only be hidden when coplanar
                None => pass,
                Some(prev_pass) => {
                    let Some(pass) = pass.clip(&prev.portal_plane, self.epsilon, true) else {
                        continue;
                    };
                    let Some(pass) =
                        clip_to_separators(&source, prev_pass, pass, false, self.epsilon)
                    else {
                        continue;
                    };
                    let Some(pass) =
                        clip_to_separators(prev_pass, &source, pass, true, self.epsilon)
                    else {
                        continue;
                    };
                    pass
                },
            };

            vis.set(pnum);
            let next = PassStack {
                source,
                pass: Some(pass),
                portal_plane: portal.plane,
                mightsee: might,
            };
            self.leaf_flow(base_plane, portal.leaf, &next, vis);
        }
    }
}

/// Exact visibility of every portal. Portals are flowed in ascending
/// `mightsee` order so small flows finish first and prune the large ones.
pub fn full_vis(
    graph: &PortalGraph,
    mightsee: &[PortalBits],
    epsilon: Real,
    threads: usize,
) -> Result<Vec<PortalBits>> {
    let mut order: Vec<usize> = (0..graph.portals.len()).collect();
    order.sort_by_key(|&p| mightsee[p].count());

    let done: Vec<OnceLock<PortalBits>> = (0..graph.portals.len()).map(|_| OnceLock::new()).collect();
    let flow = Flow {
        graph,
        mightsee,
        done: &done,
        epsilon,
    };
    run_threads_on(order.len(), threads, "portal flow", |i| {
        let p = order[i];
        let bits = flow.portal_flow(p);
        done[p]
            .set(bits)
            .map_err(|_| CompileError::Internal(format!("portal {p} flowed twice")))
    })?;

    let total: usize = done.iter().filter_map(OnceLock::get).map(PortalBits::count).sum();
    tracing::debug!("portal flow: {total} visible portals");
    Ok(done
        .into_iter()
        .map(|cell| cell.into_inner().unwrap_or_default())
        .collect())
}
