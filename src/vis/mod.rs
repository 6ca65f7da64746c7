//! VIS stage: potentially visible sets from the portal file.

pub mod basevis;
pub mod compress;
pub mod flow;
pub mod portal;

use crate::errors::{CompileError, Result, check_limit};
use crate::float_types::{Real, tolerance};
use crate::io::bspfile::{BspFile, MAX_MAP_VISIBILITY};
use crate::io::portalfile::PortalFile;
use crate::io::with_extension;
use crate::vis::basevis::base_vis;
use crate::vis::compress::compress_row;
use crate::vis::flow::full_vis;
use crate::vis::portal::{PortalBits, PortalGraph};
use hashbrown::HashMap;
use std::path::Path;
use std::time::Instant;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisOptions {
    /// Worker threads, 0 for one per core.
    pub threads: usize,
    /// Stop after base vis.
    pub fast: bool,
    /// Portals farther apart than this never see each other.
    pub max_distance: Option<Real>,
}

pub struct VisContext {
    pub options: VisOptions,
    pub graph: PortalGraph,
}

impl VisContext {
    pub fn new(prt: &PortalFile, prt_path: &Path, options: VisOptions) -> Result<Self> {
        Ok(VisContext {
            graph: PortalGraph::from_file(prt, prt_path)?,
            options,
        })
    }

    /// Visibility of every portal, rough or exact.
    pub fn portal_vis(&self) -> Result<Vec<PortalBits>> {
        let epsilon = tolerance();
        let mightsee = base_vis(
            &self.graph,
            self.options.max_distance,
            epsilon,
            self.options.threads,
        )?;
        if self.options.fast {
            return Ok(mightsee);
        }
        full_vis(&self.graph, &mightsee, epsilon, self.options.threads)
    }

    /// Vis leaf rows, made symmetric.
    pub fn leaf_vis(&self) -> Result<Vec<PortalBits>> {
        let mut rows = self.graph.leaf_vis(&self.portal_vis()?);
        make_symmetric(&mut rows);
        for (a, row) in rows.iter().enumerate() {
            if let Some(b) = row.ones().find(|&b| !rows[b].get(a)) {
                return Err(CompileError::Internal(format!(
                    "leaf {a} sees {b} but not the other way round"
                )));
            }
        }
        Ok(rows)
    }
}

/// A sees B implies B sees A.
pub fn make_symmetric(rows: &mut [PortalBits]) {
    let pairs: Vec<(usize, usize)> = rows
        .iter()
        .enumerate()
        .flat_map(|(a, row)| row.ones().map(move |b| (a, b)))
        .collect();
    for (a, b) in pairs {
        rows[b].set(a);
    }
}

/// Expands vis leaf rows to BSP leaf rows and packs them into a visibility
/// lump. Returns the lump and the offset of each BSP leaf's row (BSP leaf
/// `i + 1` for entry `i`).
pub fn build_visibility(rows: &[PortalBits], leaf_counts: &[usize]) -> Result<(Vec<u8>, Vec<i32>)> {
    let total: usize = leaf_counts.iter().sum();
    let row_bytes = total.div_ceil(8);
    let mut starts = Vec::with_capacity(leaf_counts.len());
    let mut next = 0;
    for &count in leaf_counts {
        starts.push(next);
        next += count;
    }

    let mut lump = Vec::new();
    let mut shared: HashMap<Vec<u8>, i32> = HashMap::new();
    let mut offsets = Vec::with_capacity(total);
    for (cluster, row) in rows.iter().enumerate() {
        let mut bytes = vec![0u8; row_bytes];
        for seen in row.ones() {
            for bit in starts[seen]..starts[seen] + leaf_counts[seen] {
                bytes[bit / 8] |= 1 << (bit % 8);
            }
        }
        let packed = compress_row(&bytes);
        let offset = match shared.get(&packed) {
            Some(&offset) => offset,
            None => {
                let offset = lump.len() as i32;
                lump.extend_from_slice(&packed);
                check_limit("visibility", lump.len(), MAX_MAP_VISIBILITY)?;
                shared.insert(packed, offset);
                offset
            },
        };
        offsets.extend(std::iter::repeat_n(offset, leaf_counts[cluster]));
    }
    Ok((lump, offsets))
}

pub fn run_vis(map_path: &Path, options: &VisOptions) -> Result<()> {
    let start = Instant::now();
    let prt_path = with_extension(map_path, "prt");
    let bsp_path = with_extension(map_path, "bsp");
    let prt = PortalFile::read(&prt_path)?;
    let mut bsp = BspFile::read(&bsp_path)?;

    let visleafs: usize = prt.leaf_counts.iter().sum();
    let world_leafs = bsp.models.first().map_or(0, |m| m.visleafs.max(0) as usize);
    if visleafs != world_leafs || visleafs + 1 > bsp.leafs.len() {
        return Err(CompileError::corrupt(
            &prt_path,
            format!("{visleafs} leafs in portal file, {world_leafs} in bsp"),
        ));
    }

    let context = VisContext::new(&prt, &prt_path, options.clone())?;
    tracing::info!(
        "{} vis leafs, {} portals{}",
        context.graph.leafs.len(),
        context.graph.portals.len(),
        if options.fast { " (fast)" } else { "" }
    );
    let rows = context.leaf_vis()?;
    let average = rows.iter().map(PortalBits::count).sum::<usize>() as Real
        / rows.len().max(1) as Real;
    tracing::info!("average leafs visible: {average:.1}");

    let (lump, offsets) = build_visibility(&rows, &prt.leaf_counts)?;
    for leaf in bsp.leafs.iter_mut() {
        leaf.visofs = -1;
    }
    for (i, offset) in offsets.into_iter().enumerate() {
        bsp.leafs[i + 1].visofs = offset;
    }
    tracing::debug!("visibility: {} bytes", lump.len());
    bsp.visibility = lump;
    bsp.write(&bsp_path)?;
    tracing::info!("vis done in {:.2?}", start.elapsed());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Winding;
    use crate::io::portalfile::PortalRecord;
    use crate::vis::compress::decompress_row;
    use nalgebra::Point3;

    #[test]
    fn neighbours_through_one_portal_see_each_other() {
        let winding = Winding::new(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0, 0.0, 64.0),
            Point3::new(0.0, 64.0, 64.0),
            Point3::new(0.0, 64.0, 0.0),
        ]);
        let prt = PortalFile {
            num_leafs: 2,
            portals: vec![PortalRecord {
                winding,
                leafs: [0, 1],
            }],
            leaf_counts: vec![1, 1],
        };
        for fast in [false, true] {
            let options = VisOptions {
                fast,
                threads: 1,
                ..VisOptions::default()
            };
            let context = VisContext::new(&prt, Path::new("two.prt"), options).unwrap();
            let rows = context.leaf_vis().unwrap();
            assert!(rows[0].get(1) && rows[1].get(0), "fast = {fast}");
            assert!(rows[0].get(0) && rows[1].get(1));
        }
    }

    #[test]
    fn cluster_rows_expand_to_bsp_leafs() {
        // cluster 0 covers two BSP leafs and sees cluster 1
        let mut a = PortalBits::new(2);
        a.set(0);
        a.set(1);
        let mut b = PortalBits::new(2);
        b.set(1);
        let mut rows = vec![a, b];
        make_symmetric(&mut rows);
        assert!(rows[1].get(0));

        let (lump, offsets) = build_visibility(&rows, &[2, 1]).unwrap();
        assert_eq!(offsets.len(), 3);
        assert_eq!(offsets[0], offsets[1]);
        let row = decompress_row(&lump[offsets[2] as usize..], 1).unwrap();
        assert_eq!(row, vec![0b111]);
    }
}
