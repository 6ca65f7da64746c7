//! `.hsz`: one line per hull with its six extents.

use crate::errors::Result;
use crate::float_types::Real;
use crate::io::{Tokens, create, read_to_string};
use nalgebra::Point3;
use std::io::Write;
use std::path::Path;

pub const NUM_HULLS: usize = 4;

/// Player/monster bounding boxes of hulls 0..3.
pub const DEFAULT_HULL_SIZES: [[[Real; 3]; 2]; NUM_HULLS] = [
    [[0.0, 0.0, 0.0], [0.0, 0.0, 0.0]],
    [[-16.0, -16.0, -36.0], [16.0, 16.0, 36.0]],
    [[-32.0, -32.0, -32.0], [32.0, 32.0, 32.0]],
    [[-16.0, -16.0, -18.0], [16.0, 16.0, 18.0]],
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HullSizes(pub [(Point3<Real>, Point3<Real>); NUM_HULLS]);

impl Default for HullSizes {
    fn default() -> Self {
        HullSizes(DEFAULT_HULL_SIZES.map(|[min, max]| (Point3::from(min), Point3::from(max))))
    }
}

impl HullSizes {
    pub fn write(&self, path: &Path) -> Result<()> {
        let mut out = create(path)?;
        for (min, max) in &self.0 {
            writeln!(
                out,
                "{} {} {} {} {} {}",
                min.x, min.y, min.z, max.x, max.y, max.z
            )
            .map_err(|e| crate::errors::CompileError::io(path, e))?;
        }
        out.flush().map_err(|e| crate::errors::CompileError::io(path, e))
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text = read_to_string(path)?;
        let mut tokens = Tokens::new(path, &text);
        let mut sizes = HullSizes::default();
        for (min, max) in &mut sizes.0 {
            for i in 0..3 {
                min[i] = tokens.parse()?;
            }
            for i in 0..3 {
                max[i] = tokens.parse()?;
            }
        }
        Ok(sizes)
    }
}
