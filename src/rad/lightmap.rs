//! Final per-luxel light written into the lighting lump.

use crate::errors::{Result, check_limit};
use crate::float_types::Real;
use crate::io::bspfile::{BspFile, MAX_MAP_LIGHTING, MAXLIGHTMAPS};
use crate::parallel::run_threads_on;
use crate::rad::bounce::BounceResult;
use crate::rad::faces::FaceInfo;
use crate::rad::interpolate::FaceInterpolator;
use crate::rad::lights::{DirectLight, gather_direct};
use crate::rad::patch::{Patch, StyledLight};
use crate::rad::trace::Tracer;
use crate::rad::vismatrix::Pvs;

pub const DEFAULT_GAMMA: Real = 0.55;
pub const DEFAULT_MAX_LIGHT: Real = 255.0;

/// How light values become lightmap bytes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightmapSettings {
    pub scale: Real,
    pub gamma: Real,
    pub max_light: Real,
    /// Minimum light of every luxel.
    pub ambient: [Real; 3],
}

impl Default for LightmapSettings {
    fn default() -> Self {
        LightmapSettings {
            scale: 1.0,
            gamma: DEFAULT_GAMMA,
            max_light: DEFAULT_MAX_LIGHT,
            ambient: [0.0; 3],
        }
    }
}

impl LightmapSettings {
    /// Scale, gamma, ambient minimum, then the clamp that keeps the
    /// colour's ratios.
    pub fn finish(&self, rgb: [Real; 3]) -> [u8; 3] {
        let mut v = [0usize, 1, 2].map(|c| {
            let x = (rgb[c] * self.scale).max(0.0);
            let x = (x / 256.0).powf(self.gamma) * 256.0;
            x.max(self.ambient[c])
        });
        let brightest = v.iter().copied().fold(0.0, Real::max);
        let limit = self.max_light.clamp(0.0, 255.0);
        if brightest > limit {
            let k = limit / brightest;
            v = v.map(|x| x * k);
        }
        v.map(|x| x.round().clamp(0.0, 255.0) as u8)
    }
}

/// Everything a face needs to light its luxels.
pub struct LightingScene<'a> {
    pub faces: &'a [FaceInfo],
    pub patches: &'a [Patch],
    pub by_face: &'a [Vec<usize>],
    pub neighbours: &'a [Vec<usize>],
    pub lights: &'a [DirectLight],
    pub bounced: &'a [BounceResult],
    pub tracer: &'a Tracer,
    pub pvs: &'a Pvs,
}

/// Lightmap of one face: its styles and `luxels × styles` RGB samples,
/// one block per style.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceLightmap {
    pub styles: [u8; MAXLIGHTMAPS],
    pub samples: Vec<[u8; 3]>,
}

/// `None` for faces without a lightmap.
pub fn light_face(
    scene: &LightingScene<'_>,
    face: &FaceInfo,
    settings: &LightmapSettings,
) -> Option<FaceLightmap> {
    if face.special || face.sky {
        return None;
    }
    let [width, height] = face.luxels();
    let normal = face.plane.normal;

    let indirect: Vec<(u8, FaceInterpolator<'_>)> = scene
        .bounced
        .iter()
        .map(|b| {
            (
                b.style,
                FaceInterpolator::new(
                    face,
                    &scene.neighbours[face.index],
                    scene.by_face,
                    scene.patches,
                    &b.total,
                ),
            )
        })
        .collect();
    let own_light = scene
        .by_face
        .get(face.index)
        .and_then(|p| p.first())
        .map(|&p| scene.patches[p].baselight);

    let mut luxels = Vec::with_capacity(width * height);
    let mut dropped_style = false;
    for v in 0..height {
        for u in 0..width {
            let p = face.nudge_inside(face.luxel_position(u, v)) + normal;
            let leaf = scene.tracer.point_leaf(&p);
            let mut light = gather_direct(
                scene.lights,
                &p,
                &normal,
                leaf,
                face.index,
                scene.tracer,
                scene.pvs,
            );
            for (style, interpolator) in &indirect {
                dropped_style |= !light.add(*style, interpolator.sample(&p));
            }
            if let Some(own) = own_light {
                dropped_style |= !light.add(0, own);
            }
            luxels.push(light);
        }
    }
    if dropped_style {
        tracing::warn!("face {}: more than {MAXLIGHTMAPS} light styles", face.index);
    }

    let styles = face_styles(&luxels);
    let mut samples = Vec::with_capacity(luxels.len() * MAXLIGHTMAPS);
    for &style in styles.iter().take_while(|&&s| s != 255) {
        samples.extend(luxels.iter().map(|l| settings.finish(l.get(style))));
    }
    Some(FaceLightmap { styles, samples })
}

/// Style 0 first, then the others in order of appearance.
fn face_styles(luxels: &[StyledLight]) -> [u8; MAXLIGHTMAPS] {
    let mut styles = [255; MAXLIGHTMAPS];
    styles[0] = 0;
    let mut used = 1;
    for (style, _) in luxels.iter().flat_map(StyledLight::active) {
        if used == MAXLIGHTMAPS {
            break;
        }
        if !styles[..used].contains(&style) {
            styles[used] = style;
            used += 1;
        }
    }
    styles
}

/// Lights every face and fills the lighting lump, face styles and offsets.
pub fn build_lightmaps(
    bsp: &mut BspFile,
    scene: &LightingScene<'_>,
    settings: &LightmapSettings,
    threads: usize,
) -> Result<()> {
    let maps = run_threads_on(scene.faces.len(), threads, "lightmaps", |i| {
        Ok(light_face(scene, &scene.faces[i], settings))
    })?;

    let mut lighting = Vec::new();
    for (face, map) in bsp.faces.iter_mut().zip(maps) {
        match map {
            Some(map) => {
                face.styles = map.styles;
                face.lightofs = lighting.len() as i32;
                lighting.extend(map.samples.iter().flatten());
                check_limit("lighting", lighting.len(), MAX_MAP_LIGHTING)?;
            },
            None => {
                face.styles = [255; MAXLIGHTMAPS];
                face.lightofs = -1;
            },
        }
    }
    tracing::info!("lighting: {} bytes", lighting.len());
    bsp.lighting = lighting;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_applies_gamma_and_keeps_colour_ratio() {
        let linear = LightmapSettings {
            gamma: 1.0,
            ..LightmapSettings::default()
        };
        assert_eq!(linear.finish([100.0, 50.0, 0.0]), [100, 50, 0]);
        // twice too bright: halved, ratios kept
        assert_eq!(linear.finish([510.0, 255.0, 0.0]), [255, 128, 0]);

        let dim = LightmapSettings {
            gamma: 1.0,
            ambient: [20.0; 3],
            ..LightmapSettings::default()
        };
        assert_eq!(dim.finish([0.0, 100.0, 5.0]), [20, 100, 20]);

        // gamma below 1 brightens
        let [g, _, _] = LightmapSettings::default().finish([64.0; 3]);
        assert!(g > 64);
    }

    #[test]
    fn style_zero_leads() {
        let mut a = StyledLight::default();
        a.add(5, [1.0; 3]);
        let mut b = StyledLight::default();
        b.add(0, [1.0; 3]);
        b.add(2, [1.0; 3]);
        assert_eq!(face_styles(&[a, b]), [0, 5, 2, 255]);
    }
}
