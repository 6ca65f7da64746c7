//! `.inc` transfer cache.
//!
//! `u32` patch count, then per patch: `u32` run count, runs of
//! `(u32 first, u32 count)`, `u32` data count and the `u16` fractions.

use crate::errors::{CompileError, Result};
use crate::rad::transfers::{TransferList, TransferRun};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};
use std::path::Path;

pub fn write_transfer_cache(path: &Path, transfers: &[TransferList]) -> Result<()> {
    let mut out = crate::io::create(path)?;
    let mut emit = || -> std::io::Result<()> {
        out.write_u32::<LittleEndian>(transfers.len() as u32)?;
        for list in transfers {
            out.write_u32::<LittleEndian>(list.runs.len() as u32)?;
            for run in &list.runs {
                out.write_u32::<LittleEndian>(run.first)?;
                out.write_u32::<LittleEndian>(run.count)?;
            }
            out.write_u32::<LittleEndian>(list.data.len() as u32)?;
            for &d in &list.data {
                out.write_u16::<LittleEndian>(d)?;
            }
        }
        out.flush()
    };
    emit().map_err(|e| CompileError::io(path, e))?;
    tracing::debug!("wrote transfer cache {}", path.display());
    Ok(())
}

fn decode(input: &mut impl Read, expected_patches: usize) -> std::io::Result<Option<Vec<TransferList>>> {
    let count = input.read_u32::<LittleEndian>()? as usize;
    if count != expected_patches {
        return Ok(None);
    }
    let mut lists = Vec::with_capacity(count);
    for _ in 0..count {
        let num_runs = input.read_u32::<LittleEndian>()? as usize;
        let mut runs = Vec::with_capacity(num_runs.min(1 << 16));
        for _ in 0..num_runs {
            let first = input.read_u32::<LittleEndian>()?;
            let count = input.read_u32::<LittleEndian>()?;
            runs.push(TransferRun { first, count });
        }
        let num_data = input.read_u32::<LittleEndian>()? as usize;
        let mut data = Vec::with_capacity(num_data.min(1 << 20));
        for _ in 0..num_data {
            data.push(input.read_u16::<LittleEndian>()?);
        }
        let list = TransferList { runs, data };
        if !list.is_consistent() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "run lengths do not match data count",
            ));
        }
        lists.push(list);
    }
    Ok(Some(lists))
}

/// Loads the cache when it exists and was written for `expected_patches`
/// patches. A stale or damaged cache is ignored with a warning.
pub fn read_transfer_cache(path: &Path, expected_patches: usize) -> Result<Option<Vec<TransferList>>> {
    if !path.exists() {
        return Ok(None);
    }
    let mut input = crate::io::open(path)?;
    match decode(&mut input, expected_patches) {
        Ok(Some(lists)) => {
            tracing::info!("loaded transfers for {} patches from {}", lists.len(), path.display());
            Ok(Some(lists))
        },
        Ok(None) => {
            tracing::warn!("{}: patch count changed, recomputing transfers", path.display());
            Ok(None)
        },
        Err(e) => {
            tracing::warn!("{}: ignoring damaged transfer cache ({e})", path.display());
            Ok(None)
        },
    }
}
