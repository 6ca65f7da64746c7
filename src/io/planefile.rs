//! `.pln`: the CSG plane table as a raw little-endian array.
//!
//! 40 bytes per plane: `f64` normal ×3, `f64` dist, `i32` type, 4 zero bytes.

use crate::errors::{CompileError, Result};
use crate::geometry::plane::{Plane, PlaneType};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use nalgebra::Vector3;
use std::io::{Cursor, Write};
use std::path::Path;

pub const PLANE_RECORD_SIZE: usize = 40;

pub fn write_planes(path: &Path, planes: &[Plane]) -> Result<()> {
    let mut out = crate::io::create(path)?;
    let mut encode = || -> std::io::Result<()> {
        for p in planes {
            for i in 0..3 {
                out.write_f64::<LittleEndian>(p.normal[i])?;
            }
            out.write_f64::<LittleEndian>(p.dist)?;
            out.write_i32::<LittleEndian>(p.kind as i32)?;
            out.write_all(&[0; 4])?;
        }
        out.flush()
    };
    encode().map_err(|e| CompileError::io(path, e))
}

pub fn read_planes(path: &Path) -> Result<Vec<Plane>> {
    let bytes = std::fs::read(path).map_err(|e| CompileError::io(path, e))?;
    if bytes.len() % PLANE_RECORD_SIZE != 0 {
        return Err(CompileError::corrupt(
            path,
            format!("size {} is not a multiple of {PLANE_RECORD_SIZE}", bytes.len()),
        ));
    }

    let mut cursor = Cursor::new(bytes.as_slice());
    let count = bytes.len() / PLANE_RECORD_SIZE;
    let mut planes = Vec::with_capacity(count);
    for index in 0..count {
        let mut decode = || -> std::io::Result<(Vector3<f64>, f64, i32)> {
            let x = cursor.read_f64::<LittleEndian>()?;
            let y = cursor.read_f64::<LittleEndian>()?;
            let z = cursor.read_f64::<LittleEndian>()?;
            let dist = cursor.read_f64::<LittleEndian>()?;
            let kind = cursor.read_i32::<LittleEndian>()?;
            cursor.read_i32::<LittleEndian>()?;
            Ok((Vector3::new(x, y, z), dist, kind))
        };
        let (normal, dist, kind) = decode().map_err(|e| CompileError::io(path, e))?;
        let kind = PlaneType::from_i32(kind)
            .ok_or_else(|| CompileError::corrupt(path, format!("plane {index}: bad type {kind}")))?;
        // stored verbatim, no renormalisation
        planes.push(Plane { normal, dist, kind });
    }
    Ok(planes)
}
