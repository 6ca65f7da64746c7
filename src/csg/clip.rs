//! Brush-versus-brush face clipping.

use crate::contents::Contents;
use crate::csg::brush::{BrushFace, CsgBrush};
use crate::errors::{CompileError, Result};
use crate::float_types::Real;
use crate::geometry::PlaneTable;

/// Fragments of `face` that survive `b2`: the pieces outside it, plus the
/// inside piece when `b1_contents` outranks `b2_contents`.
fn clip_against_brush(
    face: BrushFace,
    b2: &[BrushFace],
    b1_contents: Contents,
    b2_contents: Contents,
    overwrite: bool,
    planes: &PlaneTable,
    epsilon: Real,
    out: &mut Vec<BrushFace>,
) {
    let mut inside = Some(face);
    for split in b2 {
        let Some(piece) = inside.take() else {
            return;
        };

        if piece.planenum == split.planenum {
            // on the plane and facing the same way
            if overwrite {
                inside = Some(piece);
            } else {
                out.push(piece);
            }
            continue;
        }
        if piece.planenum == split.planenum ^ 1 {
            // facing the other way always goes inside
            inside = Some(piece);
            continue;
        }

        let plane = planes.get(split.planenum);
        let (front, back) = piece.winding.split(plane, epsilon);
        if let Some(front) = front {
            out.push(piece.with_winding(front));
        }
        inside = back.map(|back| piece.with_winding(back));
    }

    if let Some(mut piece) = inside {
        if b1_contents.rank() > b2_contents.rank() {
            piece.contents[0] = b2_contents;
            out.push(piece);
        }
    }
}

/// Resolves brush `index` of a model against every other brush of the model
/// in `hull` and returns the faces to emit, mirrored copies included.
pub fn csg_brush(
    brushes: &[CsgBrush],
    index: usize,
    hull: usize,
    planes: &PlaneTable,
    epsilon: Real,
) -> Result<Vec<BrushFace>> {
    let b1 = &brushes[index];
    let Some(h1) = &b1.hulls[hull] else {
        return Ok(Vec::new());
    };
    let b1_contents = b1.hull_contents(hull);

    let mut outside: Vec<BrushFace> = h1.faces.clone();
    let mut overwrite = false;

    for (j, b2) in brushes.iter().enumerate() {
        if j == index {
            overwrite = true;
            continue;
        }
        if b2.contents == Contents::ToEmpty {
            continue;
        }

        if hull == 0 && b1.contents.is_liquid() && b2.detail_level > b1.detail_level {
            if let Some(h2) = &b2.hulls[0] {
                let inner = h1.bounds.expanded(-epsilon);
                if h2.bounds.contains_point(&inner.mins, 0.0)
                    && h2.bounds.contains_point(&inner.maxs, 0.0)
                {
                    return Err(CompileError::LiquidInsideDetail {
                        entity: b1.source_entity,
                        brush: b1.number,
                        contents: b1.contents.name(),
                    });
                }
            }
        }

        // (a) detail cannot chop less detailed brushes
        if b2.detail_level > b1.detail_level {
            continue;
        }
        let b2_contents = b2.hull_contents(hull);
        let mut overwrite_b2 = overwrite;
        // (b) same contents: the less detailed brush wins coplanar faces
        if b1_contents == b2_contents && b1.detail_level != b2.detail_level {
            overwrite_b2 = b2.detail_level < b1.detail_level;
        }
        // (c) same contents and detail: explicit priority decides
        if b1_contents == b2_contents
            && hull == 0
            && b1.detail_level == b2.detail_level
            && b1.coplanar_priority != b2.coplanar_priority
        {
            overwrite_b2 = b2.coplanar_priority > b1.coplanar_priority;
        }

        let Some(h2) = &b2.hulls[hull] else {
            continue;
        };
        if !h1.bounds.intersects(&h2.bounds) {
            continue;
        }

        let mut next = Vec::with_capacity(outside.len());
        for face in outside.drain(..) {
            if !face.bounds.intersects(&h2.bounds) {
                next.push(face);
                continue;
            }
            clip_against_brush(
                face,
                &h2.faces,
                b1_contents,
                b2_contents,
                overwrite_b2,
                planes,
                epsilon,
                &mut next,
            );
        }
        outside = next;
    }

    let mirror = !matches!(b1_contents, Contents::Solid | Contents::Empty);
    let mut emitted = Vec::with_capacity(outside.len() * if mirror { 2 } else { 1 });
    for face in outside {
        if face.contents[0] == face.contents[1] {
            continue;
        }
        if mirror {
            let back = face.mirrored();
            emitted.push(face);
            emitted.push(back);
        } else {
            emitted.push(face);
        }
    }
    Ok(emitted)
}
