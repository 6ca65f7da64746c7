//! Surface patches: the unit of light transport.

use crate::errors::{CompileError, Result};
use crate::float_types::{MIN_WINDING_AREA, Real};
use crate::geometry::{Plane, Winding};
use crate::io::bspfile::MAXLIGHTMAPS;
use crate::rad::faces::FaceInfo;
use crate::rad::textures::TexLights;
use nalgebra::{Point3, Vector3};

/// Transfer indices must fit this many patches.
pub const MAX_PATCHES: usize = 65535 * 16;

pub const DEFAULT_CHOP: Real = 64.0;
pub const DEFAULT_TEXCHOP: Real = 32.0;

/// Light per style slot. Unused slots carry style 255.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StyledLight {
    pub styles: [u8; MAXLIGHTMAPS],
    pub values: [[Real; 3]; MAXLIGHTMAPS],
}

impl Default for StyledLight {
    fn default() -> Self {
        StyledLight {
            styles: [255; MAXLIGHTMAPS],
            values: [[0.0; 3]; MAXLIGHTMAPS],
        }
    }
}

impl StyledLight {
    pub fn slot(&self, style: u8) -> Option<usize> {
        self.styles.iter().position(|&s| s == style)
    }

    pub fn get(&self, style: u8) -> [Real; 3] {
        self.slot(style).map_or([0.0; 3], |i| self.values[i])
    }

    /// Adds light in `style`. Returns false when all slots are taken by
    /// other styles.
    pub fn add(&mut self, style: u8, rgb: [Real; 3]) -> bool {
        let slot = match self.slot(style) {
            Some(i) => i,
            None => match self.slot(255) {
                Some(i) => {
                    self.styles[i] = style;
                    i
                },
                None => return false,
            },
        };
        for c in 0..3 {
            self.values[slot][c] += rgb[c];
        }
        true
    }

    pub fn active(&self) -> impl Iterator<Item = (u8, [Real; 3])> + '_ {
        self.styles
            .iter()
            .zip(&self.values)
            .filter(|&(&s, _)| s != 255)
            .map(|(&s, &v)| (s, v))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    pub face: usize,
    pub winding: Winding,
    /// Centre lifted one unit off the surface.
    pub origin: Point3<Real>,
    pub normal: Vector3<Real>,
    pub area: Real,
    /// Below this distance form factors blend in the disk estimate.
    pub emitter_range: Real,
    pub reflectivity: [Real; 3],
    /// Emitted by a texlight.
    pub baselight: [Real; 3],
    /// Hull 0 leaf of the origin.
    pub leaf: usize,
    pub direct: StyledLight,
}

fn chop_axial(winding: Winding, chop: Real, epsilon: Real, out: &mut Vec<Winding>) {
    let bounds = winding.bounds();
    let size = bounds.size();
    for axis in 0..3 {
        if size[axis] <= chop + epsilon {
            continue;
        }
        // first grid line strictly inside the winding
        let dist = ((bounds.mins[axis] + epsilon) / chop).floor() * chop + chop;
        if dist >= bounds.maxs[axis] - epsilon {
            continue;
        }
        let mut normal = Vector3::zeros();
        normal[axis] = 1.0;
        let (front, back) = winding.split(&Plane::new(normal, dist), epsilon);
        if let (Some(front), Some(back)) = (front, back) {
            chop_axial(front, chop, epsilon, out);
            chop_axial(back, chop, epsilon, out);
            return;
        }
    }
    out.push(winding);
}

pub struct PatchSettings {
    pub chop: Real,
    pub texchop: Real,
    pub range_scale: Real,
}

/// Chops every lit face into patches on a grid of `chop` units.
pub fn make_patches(
    faces: &[FaceInfo],
    reflectivity: &[[Real; 3]],
    texlights: &TexLights,
    settings: &PatchSettings,
) -> Result<Vec<Patch>> {
    let epsilon = crate::float_types::tolerance();
    let mut patches = Vec::new();
    let mut dropped = 0;
    for face in faces.iter().filter(|f| !f.special && !f.sky) {
        let baselight = texlights.get(&face.texture);
        let chop = if baselight.is_some() {
            settings.texchop
        } else {
            settings.chop
        };
        let refl = usize::try_from(face.texinfo.miptex)
            .ok()
            .and_then(|m| reflectivity.get(m))
            .copied()
            .unwrap_or(crate::rad::textures::DEFAULT_REFLECTIVITY);

        let mut pieces = Vec::new();
        chop_axial(face.winding.clone(), chop, epsilon, &mut pieces);
        for w in pieces {
            let area = w.area();
            if area < MIN_WINDING_AREA {
                dropped += 1;
                continue;
            }
            let origin = w.centroid() + face.plane.normal;
            patches.push(Patch {
                face: face.index,
                winding: w,
                origin,
                normal: face.plane.normal,
                area,
                emitter_range: area.sqrt() * settings.range_scale,
                reflectivity: refl,
                baselight: baselight.unwrap_or([0.0; 3]),
                leaf: 0,
                direct: StyledLight::default(),
            });
        }
        if patches.len() > MAX_PATCHES {
            return Err(CompileError::TooManyPatches {
                count: patches.len(),
                limit: MAX_PATCHES,
            });
        }
    }
    if dropped > 0 {
        tracing::debug!("{dropped} zero area patches dropped");
    }
    tracing::info!("{} patches", patches.len());
    Ok(patches)
}

/// Patch indices per face.
pub fn patches_by_face(patches: &[Patch], face_count: usize) -> Vec<Vec<usize>> {
    let mut by_face = vec![Vec::new(); face_count];
    for (i, p) in patches.iter().enumerate() {
        by_face[p.face].push(i);
    }
    by_face
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_chop_covers_face() {
        let w = Winding::new(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0, 100.0, 0.0),
            Point3::new(200.0, 100.0, 0.0),
            Point3::new(200.0, 0.0, 0.0),
        ]);
        let mut out = Vec::new();
        chop_axial(w, 64.0, 0.01, &mut out);
        // 4 columns (64, 64, 64, 8) by 2 rows (64, 36)
        assert_eq!(out.len(), 8);
        let total: Real = out.iter().map(Winding::area).sum();
        assert!((total - 20000.0).abs() < 1e-6);
        for w in &out {
            let size = w.bounds().size();
            assert!(size.x <= 64.0 + 1e-6 && size.y <= 64.0 + 1e-6);
        }
    }

    #[test]
    fn styled_light_fills_four_slots() {
        let mut light = StyledLight::default();
        for style in [0, 3, 5, 7] {
            assert!(light.add(style, [1.0; 3]));
        }
        assert!(!light.add(9, [1.0; 3]));
        assert!(light.add(3, [1.0; 3]));
        assert_eq!(light.get(3), [2.0; 3]);
        assert_eq!(light.get(9), [0.0; 3]);
    }
}
