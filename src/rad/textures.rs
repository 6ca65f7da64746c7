//! Texture reflectivity and the texlight table.

use crate::errors::{CompileError, Result};
use crate::float_types::Real;
use crate::io::bspfile::MipTex;
use crate::io::read_to_string;
use hashbrown::{HashMap, HashSet};
use std::path::Path;

/// Reflectivity of a texture without embedded pixels.
pub const DEFAULT_REFLECTIVITY: [Real; 3] = [0.5, 0.5, 0.5];

/// Average colour of every texture, scaled and clamped below 1.
pub fn texture_reflectivity(textures: &[MipTex], scale: Real) -> Vec<[Real; 3]> {
    let mut warned = HashSet::new();
    textures
        .iter()
        .map(|tex| {
            let base = match tex.average_color() {
                Some(c) => c.map(Real::from),
                None => {
                    if warned.insert(tex.name.to_ascii_lowercase()) {
                        tracing::warn!(
                            "texture {} has no embedded pixels, using neutral reflectivity",
                            tex.name
                        );
                    }
                    DEFAULT_REFLECTIVITY
                },
            };
            base.map(|c| (c * scale).clamp(0.0, 0.99))
        })
        .collect()
}

/// Emitted light per texture name (lowercase).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TexLights {
    lights: HashMap<String, [Real; 3]>,
}

impl TexLights {
    pub fn get(&self, texture: &str) -> Option<[Real; 3]> {
        self.lights.get(&texture.to_ascii_lowercase()).copied()
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    /// Adds one `texname r g b [intensity]` entry. With an intensity the
    /// colour is taken as 0-255 and scaled by it.
    pub fn add_line(&mut self, line: &str) -> std::result::Result<(), String> {
        let mut parts = line.split_whitespace();
        let Some(name) = parts.next() else {
            return Ok(());
        };
        let values: Vec<Real> = parts
            .map(|v| v.parse::<Real>().map_err(|_| format!("bad number {v:?}")))
            .collect::<std::result::Result<_, _>>()?;
        let light = match values.as_slice() {
            [r, g, b] => [*r, *g, *b],
            [r, g, b, i] => [r * i / 255.0, g * i / 255.0, b * i / 255.0],
            _ => return Err(format!("expected 3 or 4 values after {name}")),
        };
        if self.lights.insert(name.to_ascii_lowercase(), light).is_some() {
            tracing::debug!("texlight {name} redefined");
        }
        Ok(())
    }

    pub fn parse(text: &str) -> std::result::Result<Self, (usize, String)> {
        let mut table = TexLights::default();
        for (i, line) in text.lines().enumerate() {
            let line = line.split("//").next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            table.add_line(line).map_err(|e| (i + 1, e))?;
        }
        Ok(table)
    }

    /// Reads a `lights.rad` file. A missing file is an empty table.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(TexLights::default());
        }
        let text = read_to_string(path)?;
        let table = TexLights::parse(&text).map_err(|(line, message)| CompileError::Parse {
            line,
            message: format!("{}: {message}", path.display()),
        })?;
        tracing::info!("{} texlights from {}", table.len(), path.display());
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lights_rad_lines() {
        let table = TexLights::parse(
            "// comment\n+0light 255 255 128 200\nLAMP 10 20 30 // trailing\n",
        )
        .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("+0LIGHT"), Some([200.0, 200.0, 128.0 * 200.0 / 255.0]));
        assert_eq!(table.get("lamp"), Some([10.0, 20.0, 30.0]));
        assert_eq!(TexLights::parse("x 1 2").unwrap_err().0, 1);
    }
}
