//! Direct light sources: light entities and texlight patches.

use crate::float_types::{PI, Real};
use crate::io::entities::Entity;
use crate::rad::patch::{Patch, StyledLight};
use crate::rad::trace::Tracer;
use crate::rad::vismatrix::Pvs;
use nalgebra::{Point3, Vector3};

/// Distance at which a point light shows its nominal brightness.
pub const REFERENCE_DISTANCE: Real = 128.0;

/// Contributions below this are not traced.
const LIGHT_EPSILON: Real = 0.01;

#[derive(Debug, Clone, PartialEq)]
pub enum LightKind {
    Point,
    Spot {
        direction: Vector3<Real>,
        /// Cosines of the full-strength and the cut-off cone.
        inner_cos: Real,
        outer_cos: Real,
    },
    /// Reaches samples that see sky; `direction` is the way the light travels.
    Sun { direction: Vector3<Real> },
    /// A texlight patch.
    Surface {
        normal: Vector3<Real>,
        area: Real,
        face: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DirectLight {
    pub kind: LightKind,
    pub origin: Point3<Real>,
    pub intensity: [Real; 3],
    pub style: u8,
    pub leaf: usize,
}

/// `_light` as `r g b brightness`, `r g b` or a single value.
fn parse_intensity(entity: &Entity) -> [Real; 3] {
    let text = entity
        .value("_light")
        .or_else(|| entity.value("light"))
        .unwrap_or("255 255 255 200");
    let v: Vec<Real> = text
        .split_whitespace()
        .filter_map(|t| t.parse().ok())
        .collect();
    match v.as_slice() {
        [r, g, b, i] => [r * i / 255.0, g * i / 255.0, b * i / 255.0],
        [r, g, b] => [*r, *g, *b],
        [i] => [*i; 3],
        _ => {
            tracing::warn!("{}: bad _light value {text:?}", entity.classname());
            [200.0; 3]
        },
    }
}

/// Direction from `pitch`/`angle`/`angles`. `angle` -1 is up, -2 down.
fn parse_direction(entity: &Entity) -> Vector3<Real> {
    let angles = entity.vector("angles").unwrap_or_else(Vector3::zeros);
    let yaw = entity.float("angle").unwrap_or(angles.y);
    if yaw == -1.0 {
        return Vector3::z();
    }
    if yaw == -2.0 {
        return -Vector3::z();
    }
    let pitch = entity.float("pitch").unwrap_or(angles.x);
    let (yaw, pitch) = (yaw.to_radians(), pitch.to_radians());
    Vector3::new(yaw.cos() * pitch.cos(), yaw.sin() * pitch.cos(), pitch.sin())
}

fn target_direction(entity: &Entity, entities: &[Entity]) -> Option<Vector3<Real>> {
    let target = entity.value("target")?;
    let dest = entities
        .iter()
        .find(|e| e.value("targetname") == Some(target))?
        .origin()?;
    let dir = dest - entity.origin()?;
    (dir.norm() > 0.0).then(|| dir.normalize())
}

/// Light entities of the map.
pub fn entity_lights(entities: &[Entity], tracer: &Tracer) -> Vec<DirectLight> {
    let mut lights = Vec::new();
    for e in entities {
        let classname = e.classname();
        if !matches!(classname, "light" | "light_spot" | "light_environment") {
            continue;
        }
        let origin = e.origin().unwrap_or_else(Point3::origin);
        let intensity = parse_intensity(e);
        let style = e.int("style").and_then(|s| u8::try_from(s).ok()).unwrap_or(0);

        let kind = match classname {
            "light_spot" => {
                let direction = target_direction(e, entities).unwrap_or_else(|| parse_direction(e));
                let inner = e.float("_cone").unwrap_or(10.0);
                let outer = e.float("_cone2").unwrap_or(inner * 2.0).max(inner);
                LightKind::Spot {
                    direction,
                    inner_cos: inner.to_radians().cos(),
                    outer_cos: outer.to_radians().cos(),
                }
            },
            "light_environment" => LightKind::Sun {
                direction: parse_direction(e),
            },
            _ => LightKind::Point,
        };

        let leaf = tracer.point_leaf(&origin);
        if leaf == 0 && !matches!(kind, LightKind::Sun { .. }) {
            tracing::warn!("{classname} at {origin} is in solid");
            continue;
        }
        lights.push(DirectLight {
            kind,
            origin,
            intensity,
            style,
            leaf,
        });
    }
    tracing::info!("{} light entities", lights.len());
    lights
}

/// One surface light per texlight patch.
pub fn surface_lights(patches: &[Patch]) -> Vec<DirectLight> {
    patches
        .iter()
        .filter(|p| p.baselight != [0.0; 3])
        .map(|p| DirectLight {
            kind: LightKind::Surface {
                normal: p.normal,
                area: p.area,
                face: p.face,
            },
            origin: p.origin,
            intensity: p.baselight,
            style: 0,
            leaf: p.leaf,
        })
        .collect()
}

/// Light arriving at `p` on a surface facing `normal`, before tracing.
fn falloff(light: &DirectLight, p: &Point3<Real>, normal: &Vector3<Real>) -> Real {
    let delta = light.origin - p;
    let dist2 = delta.norm_squared().max(1.0);
    let to_light = delta / dist2.sqrt();
    let cos_r = normal.dot(&to_light);
    if cos_r <= 0.0 {
        return 0.0;
    }
    let reference = REFERENCE_DISTANCE * REFERENCE_DISTANCE;
    match &light.kind {
        LightKind::Point => cos_r * reference / dist2,
        LightKind::Spot {
            direction,
            inner_cos,
            outer_cos,
        } => {
            let cos_spot = direction.dot(&-to_light);
            if cos_spot <= *outer_cos {
                return 0.0;
            }
            let cone = if cos_spot >= *inner_cos || inner_cos <= outer_cos {
                1.0
            } else {
                (cos_spot - outer_cos) / (inner_cos - outer_cos)
            };
            cone * cos_r * reference / dist2
        },
        LightKind::Sun { direction } => normal.dot(&-direction).max(0.0),
        LightKind::Surface { normal: n, area, .. } => {
            let cos_e = n.dot(&-to_light);
            if cos_e <= 0.0 {
                return 0.0;
            }
            cos_e * cos_r * area / (PI * dist2.max(*area))
        },
    }
}

/// Direct light at a sample point in leaf `leaf`.
pub fn gather_direct(
    lights: &[DirectLight],
    p: &Point3<Real>,
    normal: &Vector3<Real>,
    leaf: usize,
    face: usize,
    tracer: &Tracer,
    pvs: &Pvs,
) -> StyledLight {
    let mut out = StyledLight::default();
    for light in lights {
        if let LightKind::Surface { face: f, .. } = light.kind {
            if f == face {
                continue;
            }
        }
        let scale = falloff(light, p, normal);
        if scale * light.intensity.iter().copied().fold(0.0, Real::max) < LIGHT_EPSILON {
            continue;
        }
        let visible = match &light.kind {
            LightKind::Sun { direction } => tracer.sees_sky(p, &-direction),
            _ => pvs.can_see(light.leaf, leaf) && tracer.clear(&light.origin, p),
        };
        if !visible {
            continue;
        }
        if !out.add(light.style, light.intensity.map(|i| i * scale)) {
            tracing::trace!("face {face}: more than four light styles");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn light_values_and_angles() {
        let mut e = Entity::new("light_spot");
        e.set("_light", "255 128 0 100");
        assert_eq!(parse_intensity(&e), [100.0, 128.0 * 100.0 / 255.0, 0.0]);
        e.set("angle", "-2");
        assert_eq!(parse_direction(&e), -Vector3::z());
        e.set("angle", "90");
        e.set("pitch", "0");
        assert!((parse_direction(&e) - Vector3::y()).norm() < 1e-9);
    }
}
