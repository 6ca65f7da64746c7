//! Face geometry and texture-space mapping rebuilt from the BSP lumps.

use crate::errors::{CompileError, Result};
use crate::float_types::Real;
use crate::geometry::{Plane, Winding};
use crate::io::bspfile::{BspFile, TEX_SPECIAL, TexInfo};
use crate::io::entities::Entity;
use crate::map::texinfo::is_special_texture;
use nalgebra::{Matrix3, Point3, Vector3};
use std::path::Path;

/// Texels per luxel.
pub const TEXTURE_STEP: i32 = 16;

/// Largest lightmap extent in texels.
pub const MAX_SURFACE_EXTENT: i32 = 256;

#[derive(Debug, Clone, PartialEq)]
pub struct FaceInfo {
    pub index: usize,
    pub model: usize,
    /// World space, model origin applied.
    pub winding: Winding,
    /// Faces out of the surface.
    pub plane: Plane,
    pub texinfo: TexInfo,
    pub texture: String,
    /// Gets no lightmap.
    pub special: bool,
    pub sky: bool,
    pub texture_mins: [i32; 2],
    pub extents: [i32; 2],
    /// Offset of the model the face belongs to.
    pub offset: Vector3<Real>,
    tex_to_world: Matrix3<Real>,
}

impl FaceInfo {
    /// Luxel columns and rows.
    pub const fn luxels(&self) -> [usize; 2] {
        [
            (self.extents[0] / TEXTURE_STEP) as usize + 1,
            (self.extents[1] / TEXTURE_STEP) as usize + 1,
        ]
    }

    pub const fn luxel_count(&self) -> usize {
        let [w, h] = self.luxels();
        w * h
    }

    fn tex_axis(&self, axis: usize) -> (Vector3<Real>, Real) {
        let v = self.texinfo.vecs[axis];
        (
            Vector3::new(v[0] as Real, v[1] as Real, v[2] as Real),
            v[3] as Real,
        )
    }

    /// World position of texture coordinates `(s, t)` on the face plane.
    pub fn tex_to_world(&self, s: Real, t: Real) -> Point3<Real> {
        let (_, s_off) = self.tex_axis(0);
        let (_, t_off) = self.tex_axis(1);
        // the face plane is in model space
        let dist = self.plane.dist - self.plane.normal.dot(&self.offset);
        let local = self.tex_to_world * Vector3::new(s - s_off, t - t_off, dist);
        Point3::from(local + self.offset)
    }

    /// Position of luxel `(u, v)` before it is moved onto the face.
    pub fn luxel_position(&self, u: usize, v: usize) -> Point3<Real> {
        let s = (self.texture_mins[0] + u as i32 * TEXTURE_STEP) as Real;
        let t = (self.texture_mins[1] + v as i32 * TEXTURE_STEP) as Real;
        self.tex_to_world(s, t)
    }

    /// Pulls `p` towards the face centre until it lies on the face.
    pub fn nudge_inside(&self, p: Point3<Real>) -> Point3<Real> {
        let center = self.winding.center();
        if self.contains(&p) {
            return p;
        }
        let (mut inside, mut outside) = (center, p);
        for _ in 0..8 {
            let mid = Point3::from((inside.coords + outside.coords) * 0.5);
            if self.contains(&mid) {
                inside = mid;
            } else {
                outside = mid;
            }
        }
        inside
    }

    /// `p` (on the plane) lies inside the winding edges.
    pub fn contains(&self, p: &Point3<Real>) -> bool {
        point_in_winding(&self.winding, &self.plane.normal, p, 0.01)
    }
}

/// `p` is on the inner side of every edge of a winding facing `normal`.
pub fn point_in_winding(w: &Winding, normal: &Vector3<Real>, p: &Point3<Real>, epsilon: Real) -> bool {
    let n = w.points.len();
    (0..n).all(|i| {
        let a = w.points[i];
        let b = w.points[(i + 1) % n];
        // clockwise from the front: inward is edge × normal
        let inward = (b - a).cross(normal);
        inward.dot(&(p - a)) >= -epsilon * inward.norm()
    })
}

fn face_winding(bsp: &BspFile, face: usize, path: &Path) -> Result<Winding> {
    let f = &bsp.faces[face];
    let first = usize::try_from(f.firstedge)
        .map_err(|_| CompileError::corrupt(path, format!("face {face}: bad first edge")))?;
    let count = usize::try_from(f.numedges)
        .map_err(|_| CompileError::corrupt(path, format!("face {face}: bad edge count")))?;
    let surfedges = bsp
        .surfedges
        .get(first..first + count)
        .ok_or_else(|| CompileError::corrupt(path, format!("face {face}: surfedges out of range")))?;

    let mut points = Vec::with_capacity(count);
    for &se in surfedges {
        let edge = bsp
            .edges
            .get(se.unsigned_abs() as usize)
            .ok_or_else(|| CompileError::corrupt(path, format!("face {face}: edge {se}")))?;
        let v = if se >= 0 { edge.v[0] } else { edge.v[1] };
        let vertex = bsp
            .vertexes
            .get(v as usize)
            .ok_or_else(|| CompileError::corrupt(path, format!("face {face}: vertex {v}")))?;
        points.push(Point3::new(
            vertex.point[0] as Real,
            vertex.point[1] as Real,
            vertex.point[2] as Real,
        ));
    }
    Ok(Winding::new(points))
}

/// Origin of every model, from the entities' `origin` keys.
pub fn model_offsets(bsp: &BspFile, entities: &[Entity]) -> Vec<Vector3<Real>> {
    let mut offsets = vec![Vector3::zeros(); bsp.models.len()];
    for e in entities {
        let Some(model) = e
            .value("model")
            .and_then(|m| m.strip_prefix('*'))
            .and_then(|m| m.parse::<usize>().ok())
        else {
            continue;
        };
        if let (Some(slot), Some(origin)) = (offsets.get_mut(model), e.origin()) {
            *slot = origin.coords;
        }
    }
    offsets
}

/// Rebuilds every face of the file.
pub fn load_faces(bsp: &BspFile, entities: &[Entity], path: &Path) -> Result<Vec<FaceInfo>> {
    let offsets = model_offsets(bsp, entities);
    let mut model_of = vec![0; bsp.faces.len()];
    for (m, model) in bsp.models.iter().enumerate() {
        let first = model.firstface.max(0) as usize;
        let end = (first + model.numfaces.max(0) as usize).min(bsp.faces.len());
        for slot in model_of.iter_mut().take(end).skip(first) {
            *slot = m;
        }
    }

    let mut faces = Vec::with_capacity(bsp.faces.len());
    for (index, f) in bsp.faces.iter().enumerate() {
        let model = model_of[index];
        let offset = offsets.get(model).copied().unwrap_or_else(Vector3::zeros);

        let plane = bsp
            .planes
            .get(f.planenum as usize)
            .ok_or_else(|| CompileError::corrupt(path, format!("face {index}: plane {}", f.planenum)))?;
        let normal = Vector3::new(plane.normal[0] as Real, plane.normal[1] as Real, plane.normal[2] as Real);
        let mut plane = Plane::new(normal, plane.dist as Real);
        if f.side != 0 {
            plane.flip();
        }
        // into world space
        plane.dist += plane.normal.dot(&offset);

        let texinfo = *bsp
            .texinfo
            .get(f.texinfo as usize)
            .ok_or_else(|| CompileError::corrupt(path, format!("face {index}: texinfo {}", f.texinfo)))?;
        let texture = usize::try_from(texinfo.miptex)
            .ok()
            .and_then(|m| bsp.textures.get(m))
            .map(|t| t.name.clone())
            .unwrap_or_default();
        let sky = texture.to_ascii_lowercase().starts_with("sky");
        let special = texinfo.flags & TEX_SPECIAL != 0 || is_special_texture(&texture);

        let mut winding = face_winding(bsp, index, path)?;
        winding.translate(&offset);

        let mut info = FaceInfo {
            index,
            model,
            winding,
            plane,
            texinfo,
            texture,
            special,
            sky,
            texture_mins: [0; 2],
            extents: [0; 2],
            offset,
            tex_to_world: Matrix3::identity(),
        };
        if !info.special {
            compute_extents(&mut info);
        }
        faces.push(info);
    }
    Ok(faces)
}

fn compute_extents(info: &mut FaceInfo) {
    let (s_axis, s_off) = info.tex_axis(0);
    let (t_axis, t_off) = info.tex_axis(1);

    for axis in 0..2 {
        let (vec, off) = if axis == 0 { (s_axis, s_off) } else { (t_axis, t_off) };
        let (mut lo, mut hi) = (Real::MAX, Real::MIN);
        for p in &info.winding.points {
            let v = (p.coords - info.offset).dot(&vec) + off;
            lo = lo.min(v);
            hi = hi.max(v);
        }
        let bmin = (lo / TEXTURE_STEP as Real).floor() as i32;
        let bmax = (hi / TEXTURE_STEP as Real).ceil() as i32;
        info.texture_mins[axis] = bmin * TEXTURE_STEP;
        info.extents[axis] = (bmax - bmin) * TEXTURE_STEP;
        if info.extents[axis] > MAX_SURFACE_EXTENT {
            tracing::warn!(
                "face {}: texture extent {} too large, lightmap clamped",
                info.index,
                info.extents[axis]
            );
            info.extents[axis] = MAX_SURFACE_EXTENT;
        }
    }

    let rows = Matrix3::from_rows(&[
        s_axis.transpose(),
        t_axis.transpose(),
        info.plane.normal.transpose(),
    ]);
    match rows.try_inverse() {
        Some(inverse) => info.tex_to_world = inverse,
        None => {
            tracing::warn!("face {}: texture axes parallel to the face, not lit", info.index);
            info.special = true;
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clockwise_square_contains_its_centre() {
        // floor seen from above, clockwise
        let w = Winding::new(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0, 64.0, 0.0),
            Point3::new(64.0, 64.0, 0.0),
            Point3::new(64.0, 0.0, 0.0),
        ]);
        let up = Vector3::z();
        assert!(point_in_winding(&w, &up, &Point3::new(32.0, 32.0, 0.0), 0.01));
        assert!(!point_in_winding(&w, &up, &Point3::new(80.0, 32.0, 0.0), 0.01));
    }
}
