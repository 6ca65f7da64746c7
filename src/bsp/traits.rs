//! Splitting plane selection

use crate::bsp::surface::BuildFace;
use crate::float_types::{Real, tolerance};
use crate::geometry::PlaneTable;
use crate::geometry::plane::{BACK, COPLANAR, FRONT};

/// Trait for picking the plane a node is split by.
pub trait SplittingPlaneStrategy: Sync {
    /// Picks one of `candidates` (canonical plane numbers) for splitting
    /// `faces`, or `None` when there are no candidates.
    fn pick_best_splitting_plane(
        &self,
        candidates: &[usize],
        faces: &[BuildFace],
        planes: &PlaneTable,
    ) -> Option<usize>;
}

/// Default strategy: fewest splits, then the most even front/back count.
/// Axial planes win ties.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BalancedSplittingStrategy {
    pub split_weight: Real,
    pub balance_weight: Real,
}

impl Default for BalancedSplittingStrategy {
    fn default() -> Self {
        Self {
            split_weight: 8.0,
            balance_weight: 1.0,
        }
    }
}

impl SplittingPlaneStrategy for BalancedSplittingStrategy {
    fn pick_best_splitting_plane(
        &self,
        candidates: &[usize],
        faces: &[BuildFace],
        planes: &PlaneTable,
    ) -> Option<usize> {
        let epsilon = tolerance();
        let mut best: Option<(usize, Real, bool)> = None;

        for &planenum in candidates {
            let plane = planes.get(planenum);
            let (num_front, num_back, num_split) = faces
                .iter()
                .filter(|f| f.planenum & !1 != planenum)
                .map(|f| match f.winding.classify(plane, epsilon) {
                    COPLANAR => (0, 0, 0),
                    FRONT => (1, 0, 0),
                    BACK => (0, 1, 0),
                    _ => (0, 0, 1),
                })
                .fold((0i64, 0i64, 0i64), |acc, x| (acc.0 + x.0, acc.1 + x.1, acc.2 + x.2));

            let score = self.split_weight * num_split as Real
                + self.balance_weight * ((num_front - num_back) as Real).abs();
            let axial = plane.kind.is_axial();

            let better = match best {
                None => true,
                Some((_, best_score, best_axial)) => {
                    score < best_score || (score == best_score && axial && !best_axial)
                },
            };
            if better {
                best = Some((planenum, score, axial));
            }
        }

        best.map(|(planenum, _, _)| planenum)
    }
}
