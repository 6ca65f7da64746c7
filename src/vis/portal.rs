//! One-way portals and leafs read back from the portal file.

use crate::errors::{CompileError, Result};
use crate::float_types::Real;
use crate::geometry::{Plane, Winding};
use crate::io::portalfile::PortalFile;
use nalgebra::Point3;
use std::path::Path;

/// Fixed-size bit set over portals (or leafs).
#[derive(Debug, Clone, PartialEq, Eq, Default, Hash)]
pub struct PortalBits {
    words: Vec<u64>,
    len: usize,
}

impl PortalBits {
    pub fn new(len: usize) -> Self {
        PortalBits {
            words: vec![0; len.div_ceil(64)],
            len,
        }
    }

    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn get(&self, i: usize) -> bool {
        self.words[i / 64] & (1 << (i % 64)) != 0
    }

    #[inline]
    pub fn set(&mut self, i: usize) {
        self.words[i / 64] |= 1 << (i % 64);
    }

    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn union_with(&mut self, other: &PortalBits) {
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a |= b;
        }
    }

    pub fn intersection(&self, other: &PortalBits) -> PortalBits {
        PortalBits {
            words: self.words.iter().zip(&other.words).map(|(a, b)| a & b).collect(),
            len: self.len,
        }
    }

    /// Whether any bit set here is clear in `seen`.
    pub fn has_new(&self, seen: &PortalBits) -> bool {
        self.words.iter().zip(&seen.words).any(|(a, b)| a & !b != 0)
    }

    /// `self ⊆ other`
    pub fn is_subset(&self, other: &PortalBits) -> bool {
        !self.has_new(other)
    }

    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(|&i| self.get(i))
    }
}

/// A portal as seen from the leaf it lives in. The plane faces into `leaf`,
/// the leaf it leads to.
#[derive(Debug, Clone, PartialEq)]
pub struct VisPortal {
    pub plane: Plane,
    pub winding: Winding,
    pub owner: usize,
    pub leaf: usize,
    pub origin: Point3<Real>,
    pub radius: Real,
}

impl VisPortal {
    fn new(plane: Plane, winding: Winding, owner: usize, leaf: usize) -> Self {
        let origin = winding.center();
        let radius = winding
            .points
            .iter()
            .map(|p| (p - origin).norm())
            .fold(0.0, Real::max);
        VisPortal {
            plane,
            winding,
            owner,
            leaf,
            origin,
            radius,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisLeaf {
    /// Portals leading out of this leaf.
    pub portals: Vec<usize>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortalGraph {
    pub portals: Vec<VisPortal>,
    pub leafs: Vec<VisLeaf>,
    /// BSP leafs covered by each vis leaf.
    pub leaf_counts: Vec<usize>,
}

impl PortalGraph {
    /// Two one-way portals per record: the forward one lives in `leafs[0]`
    /// and looks into `leafs[1]`, the backward one the other way round.
    pub fn from_file(prt: &PortalFile, path: &Path) -> Result<Self> {
        let mut graph = PortalGraph {
            portals: Vec::with_capacity(prt.portals.len() * 2),
            leafs: vec![VisLeaf::default(); prt.num_leafs],
            leaf_counts: prt.leaf_counts.clone(),
        };

        for (i, record) in prt.portals.iter().enumerate() {
            let [a, b] = record.leafs;
            if a >= prt.num_leafs || b >= prt.num_leafs {
                return Err(CompileError::corrupt(
                    path,
                    format!("portal {i} references leaf beyond {}", prt.num_leafs),
                ));
            }
            let Some(plane) = record.winding.plane() else {
                tracing::warn!("portal {i}: degenerate winding skipped");
                continue;
            };

            let forward = graph.portals.len();
            graph.portals.push(VisPortal::new(
                plane.flipped(),
                record.winding.clone(),
                a,
                b,
            ));
            graph.leafs[a].portals.push(forward);

            let backward = graph.portals.len();
            graph
                .portals
                .push(VisPortal::new(plane, record.winding.reversed(), b, a));
            graph.leafs[b].portals.push(backward);
        }
        Ok(graph)
    }

    /// Leaf visibility from per-portal visibility: the leaf itself, the
    /// leafs its portals lead into and everything those portals see.
    pub fn leaf_vis(&self, portal_vis: &[PortalBits]) -> Vec<PortalBits> {
        self.leafs
            .iter()
            .enumerate()
            .map(|(l, leaf)| {
                let mut seen = PortalBits::new(self.portals.len());
                for &p in &leaf.portals {
                    seen.union_with(&portal_vis[p]);
                }
                let mut row = PortalBits::new(self.leafs.len());
                row.set(l);
                for &p in &leaf.portals {
                    row.set(self.portals[p].leaf);
                }
                for p in seen.ones() {
                    row.set(self.portals[p].leaf);
                }
                row
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_track_new_portals() {
        let mut seen = PortalBits::new(130);
        let mut might = PortalBits::new(130);
        might.set(3);
        might.set(129);
        assert!(might.has_new(&seen));
        seen.set(129);
        seen.set(3);
        assert!(!might.has_new(&seen));
        assert!(might.is_subset(&seen));
        assert_eq!(might.ones().collect::<Vec<_>>(), vec![3, 129]);
        assert_eq!(seen.intersection(&might).count(), 2);
    }
}
