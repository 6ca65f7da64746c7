//! Which patch pairs can exchange light.

use crate::errors::Result;
use crate::float_types::Real;
use crate::io::bspfile::BspFile;
use crate::parallel::run_threads_on;
use crate::rad::patch::Patch;
use crate::rad::trace::Tracer;
use crate::vis::compress::decompress_row;

/// Decompressed leaf visibility of the world.
#[derive(Debug, Clone, Default)]
pub struct Pvs {
    /// Row of BSP leaf `i + 1`.
    rows: Vec<Option<Vec<u8>>>,
}

impl Pvs {
    pub fn from_bsp(bsp: &BspFile) -> Self {
        if bsp.visibility.is_empty() {
            return Pvs::default();
        }
        let visleafs = bsp.models.first().map_or(0, |m| m.visleafs.max(0) as usize);
        let row_len = visleafs.div_ceil(8);
        let rows = (1..=visleafs)
            .map(|leaf| {
                let ofs = usize::try_from(bsp.leafs.get(leaf)?.visofs).ok()?;
                decompress_row(bsp.visibility.get(ofs..)?, row_len)
            })
            .collect();
        Pvs { rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Without data for either leaf everything is potentially visible.
    pub fn can_see(&self, a: usize, b: usize) -> bool {
        if a == 0 || b == 0 {
            return true;
        }
        match self.rows.get(a - 1) {
            Some(Some(row)) if b - 1 < row.len() * 8 => row[(b - 1) / 8] & (1 << ((b - 1) % 8)) != 0,
            _ => true,
        }
    }
}

/// The on-demand visibility test between two patches.
pub struct PairTest<'a> {
    pub patches: &'a [Patch],
    pub tracer: &'a Tracer,
    pub pvs: &'a Pvs,
}

impl PairTest<'_> {
    pub fn visible(&self, i: usize, j: usize) -> bool {
        const FACING: Real = 0.001;
        let (a, b) = (&self.patches[i], &self.patches[j]);
        if a.face == b.face {
            return false;
        }
        let delta = b.origin - a.origin;
        if a.normal.dot(&delta) <= FACING || b.normal.dot(&-delta) <= FACING {
            return false;
        }
        if !self.pvs.can_see(a.leaf, b.leaf) || !self.pvs.can_see(b.leaf, a.leaf) {
            return false;
        }
        self.tracer.clear(&a.origin, &b.origin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VisMatrixMode {
    /// One bit per unordered pair.
    Full,
    /// Sorted runs of visible partners per patch.
    #[default]
    Sparse,
    /// No storage; test every pair when asked.
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VisMatrix {
    Full { count: usize, bits: Vec<u64> },
    Sparse { rows: Vec<Vec<(u32, u32)>> },
    OnDemand,
}

fn pair_bit(count: usize, i: usize, j: usize) -> usize {
    // row i holds partners i+1..count
    i * (2 * count - i - 1) / 2 + (j - i - 1)
}

fn to_runs(partners: &[u32]) -> Vec<(u32, u32)> {
    let mut runs: Vec<(u32, u32)> = Vec::new();
    for &j in partners {
        match runs.last_mut() {
            Some((first, count)) if *first + *count == j => *count += 1,
            _ => runs.push((j, 1)),
        }
    }
    runs
}

impl VisMatrix {
    pub fn build(mode: VisMatrixMode, test: &PairTest<'_>, threads: usize) -> Result<Self> {
        let count = test.patches.len();
        if mode == VisMatrixMode::None {
            return Ok(VisMatrix::OnDemand);
        }
        let partners = run_threads_on(count, threads, "vismatrix", |i| {
            Ok(((i + 1)..count)
                .filter(|&j| test.visible(i, j))
                .map(|j| j as u32)
                .collect::<Vec<u32>>())
        })?;
        let pairs: usize = partners.iter().map(Vec::len).sum();
        tracing::debug!("vismatrix: {pairs} visible pairs");

        Ok(match mode {
            VisMatrixMode::Full => {
                let total = count * count.saturating_sub(1) / 2;
                let mut bits = vec![0u64; total.div_ceil(64)];
                for (i, row) in partners.iter().enumerate() {
                    for &j in row {
                        let bit = pair_bit(count, i, j as usize);
                        bits[bit / 64] |= 1 << (bit % 64);
                    }
                }
                VisMatrix::Full { count, bits }
            },
            _ => VisMatrix::Sparse {
                rows: partners.iter().map(|p| to_runs(p)).collect(),
            },
        })
    }

    /// Symmetric; a patch never sees itself.
    pub fn visible(&self, i: usize, j: usize, test: &PairTest<'_>) -> bool {
        if i == j {
            return false;
        }
        let (lo, hi) = (i.min(j), i.max(j));
        match self {
            VisMatrix::Full { count, bits } => {
                let bit = pair_bit(*count, lo, hi);
                bits[bit / 64] & (1 << (bit % 64)) != 0
            },
            VisMatrix::Sparse { rows } => {
                let hi = hi as u32;
                let runs = &rows[lo];
                let at = runs.partition_point(|&(first, _)| first <= hi);
                at > 0 && {
                    let (first, count) = runs[at - 1];
                    hi < first + count
                }
            },
            VisMatrix::OnDemand => test.visible(lo, hi),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_and_pair_bits() {
        assert_eq!(to_runs(&[2, 3, 4, 7, 9, 10]), vec![(2, 3), (7, 1), (9, 2)]);
        // every unordered pair of 5 gets its own bit
        let mut seen = Vec::new();
        for i in 0..5 {
            for j in (i + 1)..5 {
                seen.push(pair_bit(5, i, j));
            }
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }
}
