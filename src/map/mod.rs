//! Map loading: parse the text, apply the entity rules and turn brush sides
//! into interned planes and texinfo.

pub mod parser;
pub mod texinfo;
pub mod tokenizer;

use crate::aabb::Aabb;
use crate::contents::Contents;
use crate::errors::{CompileError, Result};
use crate::float_types::{Real, tolerance};
use crate::geometry::winding::brush_windings;
use crate::geometry::{Plane, PlaneTable};
use crate::io::entities::Entity;
use crate::map::parser::{RawBrush, RawEntity, parse_map};
use crate::map::texinfo::{TexinfoTable, texinfo_for_side};
use nalgebra::{Point3, Vector3};
use std::ops::Range;

#[derive(Debug, Clone, PartialEq)]
pub struct BrushSide {
    pub planenum: usize,
    pub texinfo: usize,
    pub contents: Contents,
}

/// A convex brush after loading, in entity-relative coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct MapBrush {
    /// Model (brush entity) the brush belongs to; 0 is the world.
    pub model: usize,
    /// Position within its source entity, for messages.
    pub number: usize,
    pub source_entity: usize,
    pub sides: Vec<BrushSide>,
    pub contents: Contents,
    pub detail_level: i32,
    pub coplanar_priority: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapModel {
    /// Index into [`MapFile::entities`].
    pub entity: usize,
    pub brushes: Range<usize>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapFile {
    /// Entities that reach the entity lump. `func_detail` and `func_group`
    /// are merged into the world and dropped.
    pub entities: Vec<Entity>,
    /// Brushes grouped by model, in model order.
    pub brushes: Vec<MapBrush>,
    pub models: Vec<MapModel>,
}

/// Contents of a brush from the contents of its sides.
fn brush_contents(sides: &[Contents], entity: usize, brush: usize) -> Contents {
    for special in [Contents::Origin, Contents::BoundingBox, Contents::Clip] {
        if sides.contains(&special) {
            return special;
        }
    }
    let first = sides.first().copied().unwrap_or(Contents::Solid);
    if sides.iter().any(|&c| c != first) {
        tracing::warn!(
            "entity {entity}, brush {brush}: mixed face contents, using {first}"
        );
    }
    first
}

fn raw_bounds(brush: &RawBrush) -> Option<Aabb> {
    let planes: Vec<Plane> = brush
        .sides
        .iter()
        .filter_map(|s| Plane::from_points(&s.points[0], &s.points[1], &s.points[2]))
        .collect();
    let mut bounds = Aabb::cleared();
    for w in brush_windings(&planes, tolerance()).into_iter().flatten() {
        bounds.add_box(&w.bounds());
    }
    (!bounds.is_cleared()).then_some(bounds)
}

fn format_vec(v: &Vector3<Real>) -> String {
    format!("{} {} {}", v.x, v.y, v.z)
}

/// Brush entities that fold into the world model.
fn merge_rule(classname: &str, entity: &Entity) -> Option<i32> {
    match classname {
        "func_detail" => Some(entity.int("zhlt_detaillevel").unwrap_or(1)),
        "func_group" => Some(0),
        _ => None,
    }
}

struct PendingBrush {
    raw: RawBrush,
    source_entity: usize,
    number: usize,
    detail_level: i32,
    coplanar_priority: i32,
}

/// Parses `text` and builds the brush list, interning planes into `planes`
/// and texinfo into `texinfo`. Entities without `zhlt_coplanarpriority` get
/// `default_priority`.
pub fn load_map(
    text: &str,
    default_priority: i32,
    planes: &mut PlaneTable,
    texinfo: &TexinfoTable,
) -> Result<MapFile> {
    let raw = parse_map(text)?;
    let Some(world) = raw.first() else {
        return Err(CompileError::Parse {
            line: 1,
            message: "map has no entities".into(),
        });
    };
    if world.entity.classname() != "worldspawn" {
        return Err(CompileError::Parse {
            line: 1,
            message: format!("first entity is '{}', not worldspawn", world.entity.classname()),
        });
    }

    // group brushes into models
    let mut models: Vec<(Entity, Vec<PendingBrush>)> = Vec::new();
    let mut world_extra = Vec::new();
    for (source_entity, RawEntity { entity, brushes }) in raw.into_iter().enumerate() {
        let priority = entity.int("zhlt_coplanarpriority").unwrap_or(default_priority);
        let pending = |detail_level: i32| {
            move |(number, raw): (usize, RawBrush)| PendingBrush {
                raw,
                source_entity,
                number,
                detail_level,
                coplanar_priority: priority,
            }
        };
        if source_entity > 0 {
            if let Some(detail) = merge_rule(entity.classname(), &entity) {
                world_extra.extend(brushes.into_iter().enumerate().map(pending(detail)));
                continue;
            }
        }
        let list = brushes.into_iter().enumerate().map(pending(0)).collect();
        models.push((entity, list));
    }
    if let Some((_, world_brushes)) = models.first_mut() {
        world_brushes.extend(world_extra);
    }

    let mut file = MapFile::default();
    let mut model_count = 0;
    for (mut entity, pending) in models {
        // the world is always model 0, even when it has no brushes
        if pending.is_empty() && !file.entities.is_empty() {
            file.entities.push(entity);
            continue;
        }
        let model = model_count;
        model_count += 1;
        if model > 0 {
            entity.set("model", format!("*{model}"));
        }

        let side_contents = |b: &RawBrush| -> Vec<Contents> {
            b.sides.iter().map(|s| Contents::for_texture(&s.texture)).collect()
        };

        // origin and bounding box brushes are consumed here
        let mut origin = Vector3::zeros();
        let mut kept = Vec::with_capacity(pending.len());
        for p in pending {
            let contents = brush_contents(&side_contents(&p.raw), p.source_entity, p.number);
            match contents {
                Contents::Origin | Contents::BoundingBox => {
                    let Some(bounds) = raw_bounds(&p.raw) else {
                        tracing::warn!(
                            "entity {}, brush {}: degenerate {contents} brush ignored",
                            p.source_entity,
                            p.number
                        );
                        continue;
                    };
                    if model == 0 {
                        tracing::warn!("{contents} brushes are not allowed in the world; ignored");
                    } else if contents == Contents::Origin {
                        origin = bounds.center().coords;
                        entity.set("origin", format_vec(&origin));
                    } else {
                        entity.set(
                            "zhlt_minsmaxs",
                            format!("{} {}", format_vec(&bounds.mins.coords), format_vec(&bounds.maxs.coords)),
                        );
                    }
                },
                _ => kept.push((p, contents)),
            }
        }
        if let Some(bbox) = entity.value("zhlt_minsmaxs").map(str::to_string) {
            // stored relative to the origin like everything else
            let v: Vec<Real> = bbox.split_whitespace().filter_map(|t| t.parse().ok()).collect();
            if v.len() == 6 {
                let mins = Vector3::new(v[0], v[1], v[2]) - origin;
                let maxs = Vector3::new(v[3], v[4], v[5]) - origin;
                entity.set("zhlt_minsmaxs", format!("{} {}", format_vec(&mins), format_vec(&maxs)));
            }
        }

        let entity_index = file.entities.len();
        let first = file.brushes.len();
        for (p, contents) in kept {
            if let Some(brush) = build_brush(&p, contents, model, &origin, planes, texinfo)? {
                file.brushes.push(brush);
            }
        }
        file.models.push(MapModel {
            entity: entity_index,
            brushes: first..file.brushes.len(),
        });
        file.entities.push(entity);
    }

    tracing::info!(
        "{} entities, {} brushes, {} models, {} planes",
        file.entities.len(),
        file.brushes.len(),
        file.models.len(),
        planes.len()
    );
    Ok(file)
}

fn build_brush(
    p: &PendingBrush,
    contents: Contents,
    model: usize,
    origin: &Vector3<Real>,
    planes: &mut PlaneTable,
    texinfo: &TexinfoTable,
) -> Result<Option<MapBrush>> {
    let mut sides: Vec<BrushSide> = Vec::with_capacity(p.raw.sides.len());
    for side in &p.raw.sides {
        let shifted = side.points.map(|pt| Point3::from(pt.coords - origin));
        let Some(plane) = Plane::from_points(&shifted[0], &shifted[1], &shifted[2]) else {
            tracing::warn!(
                "entity {}, brush {} (line {}): side with collinear points ignored",
                p.source_entity,
                p.number,
                side.line
            );
            continue;
        };
        let planenum = planes.intern(&plane)?;
        if sides.iter().any(|s| s.planenum == planenum) {
            tracing::warn!(
                "entity {}, brush {} (line {}): duplicate plane ignored",
                p.source_entity,
                p.number,
                side.line
            );
            continue;
        }
        if sides.iter().any(|s| s.planenum == planenum ^ 1) {
            tracing::warn!(
                "entity {}, brush {}: mirrored planes, brush ignored",
                p.source_entity,
                p.number
            );
            return Ok(None);
        }

        let miptex = texinfo.texture_index(&side.texture)?;
        let normal = planes.get(planenum).normal;
        let tx = texinfo_for_side(&side.texture, &side.projection, &normal, origin, miptex);
        sides.push(BrushSide {
            planenum,
            texinfo: texinfo.find_or_insert(tx)?,
            contents: Contents::for_texture(&side.texture),
        });
    }

    if sides.len() < 4 {
        tracing::warn!(
            "entity {}, brush {}: only {} usable sides, brush ignored",
            p.source_entity,
            p.number,
            sides.len()
        );
        return Ok(None);
    }

    Ok(Some(MapBrush {
        model,
        number: p.number,
        source_entity: p.source_entity,
        sides,
        contents,
        detail_level: p.detail_level,
        coplanar_priority: p.coplanar_priority,
    }))
}
