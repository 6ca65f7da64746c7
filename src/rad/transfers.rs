//! Form factors between visible patches, stored as 16-bit fractions.

use crate::errors::Result;
use crate::float_types::{PI, Real};
use crate::parallel::run_threads_on;
use crate::rad::patch::Patch;
use crate::rad::vismatrix::{PairTest, VisMatrix};

/// Fixed-point scale of a stored fraction.
pub const TRANSFER_SCALE: Real = 65535.0;

pub const DEFAULT_MAX_TRANSFER_FRACTION: Real = 0.5;

/// A run of consecutive target patches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferRun {
    pub first: u32,
    pub count: u32,
}

/// Outgoing transfers of one patch: targets as runs, one fraction per
/// target in the same order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferList {
    pub runs: Vec<TransferRun>,
    pub data: Vec<u16>,
}

impl TransferList {
    /// Builds the list from `(target, fraction)` pairs sorted by target.
    pub fn from_sorted(pairs: &[(usize, Real)]) -> Self {
        let mut list = TransferList::default();
        for &(target, fraction) in pairs {
            let target = target as u32;
            match list.runs.last_mut() {
                Some(run) if run.first + run.count == target => run.count += 1,
                _ => list.runs.push(TransferRun {
                    first: target,
                    count: 1,
                }),
            }
            list.data
                .push((fraction * TRANSFER_SCALE).floor().clamp(0.0, TRANSFER_SCALE) as u16);
        }
        list
    }

    pub fn is_consistent(&self) -> bool {
        self.runs.iter().map(|r| r.count as usize).sum::<usize>() == self.data.len()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// `(target, fraction)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (usize, Real)> + '_ {
        self.runs
            .iter()
            .flat_map(|r| (r.first..r.first + r.count).map(|t| t as usize))
            .zip(self.data.iter().map(|&d| d as Real / TRANSFER_SCALE))
    }

    pub fn total(&self) -> Real {
        self.iter().map(|(_, f)| f).sum()
    }
}

/// Fraction of the light leaving `from` that arrives on `to`.
pub fn form_factor(from: &Patch, to: &Patch) -> Real {
    let delta = to.origin - from.origin;
    let dist2 = delta.norm_squared();
    if dist2 <= 0.0 {
        return 0.0;
    }
    let dist = dist2.sqrt();
    let dir = delta / dist;
    let cos_from = from.normal.dot(&dir);
    let cos_to = -to.normal.dot(&dir);
    if cos_from <= 0.0 || cos_to <= 0.0 {
        return 0.0;
    }

    let point = cos_from * cos_to * to.area / (PI * dist2);
    if dist >= to.emitter_range || to.emitter_range <= 0.0 {
        return point;
    }
    // close by: blend towards the sight-area estimate
    let disk = cos_from * cos_to * to.area / (PI * dist2 + to.area);
    let w = 1.0 - (dist / to.emitter_range).powi(2);
    w * disk + (1.0 - w) * point
}

/// Transfers of patch `i`.
pub fn patch_transfers(
    i: usize,
    patches: &[Patch],
    matrix: &VisMatrix,
    test: &PairTest<'_>,
    max_fraction: Real,
) -> TransferList {
    let from = &patches[i];
    let mut pairs: Vec<(usize, Real)> = Vec::new();
    let mut total = 0.0;
    for (j, to) in patches.iter().enumerate() {
        if !matrix.visible(i, j, test) {
            continue;
        }
        let f = form_factor(from, to).min(max_fraction);
        if f > 0.0 {
            total += f;
            pairs.push((j, f));
        }
    }
    if total > 1.0 {
        for (_, f) in &mut pairs {
            *f /= total;
        }
    }
    TransferList::from_sorted(&pairs)
}

pub fn make_transfers(
    patches: &[Patch],
    matrix: &VisMatrix,
    test: &PairTest<'_>,
    max_fraction: Real,
    threads: usize,
) -> Result<Vec<TransferList>> {
    let lists = run_threads_on(patches.len(), threads, "transfers", |i| {
        Ok(patch_transfers(i, patches, matrix, test, max_fraction))
    })?;
    let count: usize = lists.iter().map(TransferList::len).sum();
    tracing::info!(
        "{count} transfers ({:.1} MB)",
        (count * 2 + lists.iter().map(|l| l.runs.len() * 8).sum::<usize>()) as Real / 1_048_576.0
    );
    Ok(lists)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fractions_are_floored_into_runs() {
        let list = TransferList::from_sorted(&[(3, 0.5), (4, 0.25), (9, 0.125)]);
        assert_eq!(
            list.runs,
            vec![
                TransferRun { first: 3, count: 2 },
                TransferRun { first: 9, count: 1 }
            ]
        );
        assert!(list.is_consistent());
        assert_eq!(list.data, vec![32767, 16383, 8191]);
        assert!(list.total() < 0.875);
    }
}
