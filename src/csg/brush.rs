//! Per-hull brush geometry.
//!
//! Hull 0 faces come straight from the brush sides. The clip hulls push every
//! side plane out by the hull box (the Minkowski sum of brush and box) and add
//! axial bevel planes so the expanded solid stays tight around corners.

use crate::aabb::Aabb;
use crate::contents::Contents;
use crate::errors::Result;
use crate::float_types::{Real, tolerance};
use crate::geometry::winding::brush_windings;
use crate::geometry::{Plane, PlaneTable, Winding};
use crate::io::hullsize::{HullSizes, NUM_HULLS};
use crate::map::MapBrush;
use nalgebra::{Point3, Vector3};
use parking_lot::Mutex;

/// A planar face fragment. Owned by exactly one face list at a time.
#[derive(Debug, Clone, PartialEq)]
pub struct BrushFace {
    pub planenum: usize,
    /// Texinfo of the originating side, -1 for bevels.
    pub texinfo: i32,
    pub winding: Winding,
    /// `[front, back]`.
    pub contents: [Contents; 2],
    pub bounds: Aabb,
    pub used: bool,
}

impl BrushFace {
    pub fn new(planenum: usize, texinfo: i32, winding: Winding, contents: [Contents; 2]) -> Self {
        let bounds = winding.bounds();
        BrushFace {
            planenum,
            texinfo,
            winding,
            contents,
            bounds,
            used: false,
        }
    }

    /// Same face attributes on a new piece of geometry.
    pub fn with_winding(&self, winding: Winding) -> Self {
        BrushFace::new(self.planenum, self.texinfo, winding, self.contents)
    }

    /// The back side of this face: reversed winding on the opposite plane.
    pub fn mirrored(&self) -> Self {
        BrushFace::new(
            self.planenum ^ 1,
            self.texinfo,
            self.winding.reversed(),
            [self.contents[1], self.contents[0]],
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BrushHull {
    pub bounds: Aabb,
    pub faces: Vec<BrushFace>,
}

/// A brush with its geometry replicated per collision hull.
#[derive(Debug, Clone, PartialEq)]
pub struct CsgBrush {
    pub source_entity: usize,
    pub number: usize,
    pub contents: Contents,
    pub detail_level: i32,
    pub coplanar_priority: i32,
    pub hulls: [Option<BrushHull>; NUM_HULLS],
}

impl CsgBrush {
    /// Contents the brush acts as in `hull`.
    pub fn hull_contents(&self, hull: usize) -> Contents {
        if hull == 0 {
            self.contents
        } else {
            Contents::Solid
        }
    }
}

/// Whether a brush of these contents exists in `hull`.
pub const fn in_hull(contents: Contents, hull: usize) -> bool {
    match contents {
        Contents::Origin | Contents::BoundingBox => false,
        Contents::Clip => hull > 0,
        Contents::Solid | Contents::Sky => true,
        _ => hull == 0,
    }
}

fn make_hull(
    planes: &[(usize, Plane, i32)],
    contents: [Contents; 2],
    min_faces: usize,
) -> Option<BrushHull> {
    let geometry: Vec<Plane> = planes.iter().map(|(_, p, _)| *p).collect();
    let faces: Vec<BrushFace> = brush_windings(&geometry, tolerance())
        .into_iter()
        .zip(planes)
        .filter_map(|(w, &(planenum, _, texinfo))| {
            w.map(|w| BrushFace::new(planenum, texinfo, w, contents))
        })
        .collect();
    if faces.len() < min_faces {
        return None;
    }
    let mut bounds = Aabb::cleared();
    for f in &faces {
        bounds.add_box(&f.bounds);
    }
    Some(BrushHull { bounds, faces })
}

/// Builds the hull geometry of one brush. Expanded planes are interned into
/// the shared table under its lock.
pub fn make_brush_hulls(
    brush: &MapBrush,
    plane_table: &Mutex<PlaneTable>,
    sizes: &HullSizes,
    no_clip: bool,
) -> Result<Option<CsgBrush>> {
    let base: Vec<(usize, Plane, i32)> = {
        let table = plane_table.lock();
        brush
            .sides
            .iter()
            .map(|s| (s.planenum, *table.get(s.planenum), s.texinfo as i32))
            .collect()
    };

    let front_back = |contents: Contents| [Contents::Empty, contents];
    let mut hulls: [Option<BrushHull>; NUM_HULLS] = Default::default();

    let Some(hull0) = make_hull(&base, front_back(brush.contents), 4) else {
        tracing::warn!(
            "entity {}, brush {}: degenerate brush ignored",
            brush.source_entity,
            brush.number
        );
        return Ok(None);
    };
    let brush_bounds = hull0.bounds;
    if in_hull(brush.contents, 0) {
        hulls[0] = Some(hull0);
    }

    if !no_clip {
        // axial bevels keep the expanded brush from sticking out at corners
        let mut bevelled = base.clone();
        {
            let mut table = plane_table.lock();
            for axis in 0..3 {
                for dir in [1.0, -1.0] {
                    let mut normal = Vector3::zeros();
                    normal[axis] = dir;
                    if bevelled.iter().any(|(_, p, _)| p.normal == normal) {
                        continue;
                    }
                    let dist = if dir > 0.0 {
                        brush_bounds.maxs[axis]
                    } else {
                        -brush_bounds.mins[axis]
                    };
                    let planenum = table.find_or_insert(normal, dist)?;
                    bevelled.push((planenum, *table.get(planenum), -1));
                }
            }
        }

        for (hull, (hull_min, hull_max)) in sizes.0.iter().enumerate().skip(1) {
            if !in_hull(brush.contents, hull) {
                continue;
            }
            let expanded = expand_planes(&bevelled, hull_min, hull_max, plane_table)?;
            hulls[hull] = make_hull(&expanded, front_back(Contents::Solid), 4);
        }
    }

    Ok(Some(CsgBrush {
        source_entity: brush.source_entity,
        number: brush.number,
        contents: brush.contents,
        detail_level: brush.detail_level,
        coplanar_priority: brush.coplanar_priority,
        hulls,
    }))
}

/// Pushes each plane out by the support distance of the hull box.
fn expand_planes(
    planes: &[(usize, Plane, i32)],
    hull_min: &Point3<Real>,
    hull_max: &Point3<Real>,
    plane_table: &Mutex<PlaneTable>,
) -> Result<Vec<(usize, Plane, i32)>> {
    let mut table = plane_table.lock();
    planes
        .iter()
        .map(|(_, plane, texinfo)| {
            let corner = Vector3::from_fn(|i, _| {
                if plane.normal[i] > 0.0 {
                    hull_max[i]
                } else {
                    hull_min[i]
                }
            });
            let dist = plane.dist + corner.dot(&plane.normal);
            let planenum = table.find_or_insert(plane.normal, dist)?;
            Ok((planenum, *table.get(planenum), *texinfo))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::BrushSide;

    fn cube(table: &mut PlaneTable, contents: Contents) -> MapBrush {
        let mut sides = Vec::new();
        for axis in 0..3 {
            let mut n = Vector3::zeros();
            n[axis] = 1.0;
            for (normal, dist) in [(n, 64.0), (-n, 0.0)] {
                sides.push(BrushSide {
                    planenum: table.find_or_insert(normal, dist).unwrap(),
                    texinfo: 0,
                    contents,
                });
            }
        }
        MapBrush {
            model: 0,
            number: 0,
            source_entity: 0,
            sides,
            contents,
            detail_level: 0,
            coplanar_priority: 0,
        }
    }

    #[test]
    fn player_hull_grows_by_box() {
        let mut table = PlaneTable::new();
        let brush = cube(&mut table, Contents::Solid);
        let table = Mutex::new(table);
        let csg = make_brush_hulls(&brush, &table, &HullSizes::default(), false)
            .unwrap()
            .unwrap();
        let h1 = csg.hulls[1].as_ref().unwrap();
        assert_eq!(h1.bounds.mins, Point3::new(-16.0, -16.0, -36.0));
        assert_eq!(h1.bounds.maxs, Point3::new(80.0, 80.0, 100.0));
        assert_eq!(h1.faces.len(), 6);
    }

    #[test]
    fn water_stays_out_of_clip_hulls() {
        let mut table = PlaneTable::new();
        let brush = cube(&mut table, Contents::Water);
        let table = Mutex::new(table);
        let csg = make_brush_hulls(&brush, &table, &HullSizes::default(), false)
            .unwrap()
            .unwrap();
        assert!(csg.hulls[0].is_some());
        assert!(csg.hulls[1..].iter().all(Option::is_none));
    }
}
