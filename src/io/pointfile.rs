//! `.pts` leak trace: one point per line.

use crate::errors::{CompileError, Result};
use crate::float_types::Real;
use crate::io::{Tokens, create, read_to_string};
use nalgebra::Point3;
use std::io::Write;
use std::path::Path;

/// Spacing of the points written along each leg of the trace.
const STEP: Real = 8.0;

/// Writes the path through `points`, filling each segment with points every
/// few units so editors can draw it as a dotted line.
pub fn write_pointfile(path: &Path, points: &[Point3<Real>]) -> Result<()> {
    let mut out = create(path)?;
    let mut emit = || -> std::io::Result<()> {
        for pair in points.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let dir = b - a;
            let len = dir.norm();
            let steps = (len / STEP).floor() as usize;
            for i in 0..steps.max(1) {
                let p = a + dir * (i as Real * STEP / len.max(Real::EPSILON));
                writeln!(out, "{} {} {}", p.x, p.y, p.z)?;
            }
        }
        if let Some(last) = points.last() {
            writeln!(out, "{} {} {}", last.x, last.y, last.z)?;
        }
        out.flush()
    };
    emit().map_err(|e| CompileError::io(path, e))
}

pub fn read_pointfile(path: &Path) -> Result<Vec<Point3<Real>>> {
    let text = read_to_string(path)?;
    let mut tokens = Tokens::new(path, &text);
    let mut points = Vec::new();
    while let Some(t) = tokens.next_token() {
        let x = tokens.parse_token(t)?;
        let y = tokens.parse()?;
        let z = tokens.parse()?;
        points.push(Point3::new(x, y, z));
    }
    Ok(points)
}
