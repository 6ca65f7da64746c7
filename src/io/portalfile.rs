//! `.prt` portal file.
//!
//! ```text
//! PRT1
//! <vis leafs>
//! <portals>
//! <numpoints> <leaf0> <leaf1> (x y z ) (x y z ) ...
//! ...
//! <BSP leafs covered by vis leaf 0>
//! ...
//! ```

use crate::errors::{CompileError, Result};
use crate::geometry::Winding;
use crate::io::{Tokens, create, read_to_string};
use nalgebra::Point3;
use std::io::Write;
use std::path::Path;

pub const PORTALFILE: &str = "PRT1";

#[derive(Debug, Clone, PartialEq)]
pub struct PortalRecord {
    /// The winding's own plane faces `leafs[0]`.
    pub winding: Winding,
    pub leafs: [usize; 2],
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PortalFile {
    pub num_leafs: usize,
    pub portals: Vec<PortalRecord>,
    /// BSP leafs covered by each vis leaf (1 unless the vis leaf is a
    /// detail cluster).
    pub leaf_counts: Vec<usize>,
}

impl PortalFile {
    pub fn write(&self, path: &Path) -> Result<()> {
        let mut out = create(path)?;
        let mut emit = || -> std::io::Result<()> {
            writeln!(out, "{PORTALFILE}")?;
            writeln!(out, "{}", self.num_leafs)?;
            writeln!(out, "{}", self.portals.len())?;
            for p in &self.portals {
                write!(out, "{} {} {} ", p.winding.len(), p.leafs[0], p.leafs[1])?;
                for v in &p.winding.points {
                    write!(out, "({:.6} {:.6} {:.6} ) ", v.x, v.y, v.z)?;
                }
                writeln!(out)?;
            }
            for count in &self.leaf_counts {
                writeln!(out, "{count}")?;
            }
            out.flush()
        };
        emit().map_err(|e| CompileError::io(path, e))
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text = read_to_string(path)?;
        let mut tokens = Tokens::new(path, &text);
        tokens.expect(PORTALFILE)?;
        let num_leafs: usize = tokens.parse()?;
        let num_portals: usize = tokens.parse()?;

        let mut portals = Vec::with_capacity(num_portals);
        for index in 0..num_portals {
            let numpoints: usize = tokens.parse()?;
            let leafs = [tokens.parse::<usize>()?, tokens.parse::<usize>()?];
            if numpoints < 3 || leafs[0] >= num_leafs || leafs[1] >= num_leafs {
                return Err(CompileError::corrupt(
                    path,
                    format!("portal {index}: {numpoints} points, leafs {leafs:?}"),
                ));
            }
            let mut points = Vec::with_capacity(numpoints);
            for _ in 0..numpoints {
                let x = match tokens.next_token() {
                    Some(t) => tokens.parse_token::<f64>(t.trim_start_matches('('))?,
                    None => return Err(CompileError::corrupt(path, "unexpected end of file")),
                };
                let y = tokens.parse()?;
                let z = tokens.parse()?;
                tokens.expect(")")?;
                points.push(Point3::new(x, y, z));
            }
            portals.push(PortalRecord {
                winding: Winding::new(points),
                leafs,
            });
        }

        // older files stop after the portals
        let mut leaf_counts = Vec::with_capacity(num_leafs);
        for _ in 0..num_leafs {
            match tokens.next_token() {
                Some(t) => leaf_counts.push(tokens.parse_token(t)?),
                None => {
                    leaf_counts = vec![1; num_leafs];
                    break;
                },
            }
        }

        Ok(PortalFile {
            num_leafs,
            portals,
            leaf_counts,
        })
    }
}
