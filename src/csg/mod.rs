//! CSG stage: brush-versus-brush clipping per collision hull.
//!
//! Reads a `.map`, builds the hull geometry of every brush, resolves each
//! brush against the other brushes of its model and writes the surviving
//! fragments to the per-hull polygon files for the BSP stage.

pub mod brush;
pub mod clip;

use crate::csg::brush::{CsgBrush, make_brush_hulls};
use crate::csg::clip::csg_brush;
use crate::errors::{CompileError, Result};
use crate::float_types::tolerance;
use crate::geometry::PlaneTable;
use crate::io::bspfile::BspFile;
use crate::io::entities::write_entities;
use crate::io::hullsize::{HullSizes, NUM_HULLS};
use crate::io::planefile::write_planes;
use crate::io::polyfile::{DetailBrushRecord, DetailBrushWriter, PolyRecord, PolyWriter};
use crate::io::{read_to_string, with_extension};
use crate::map::texinfo::TexinfoTable;
use crate::map::{MapFile, load_map};
use crate::parallel::run_threads_on;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Debug, Clone, Default)]
pub struct CsgOptions {
    /// Worker threads, 0 for one per core.
    pub threads: usize,
    /// Skip hulls 1-3 entirely.
    pub no_clip: bool,
    /// Treat every brush as structural.
    pub no_detail: bool,
    /// Alternate `.hsz` hull sizes.
    pub hull_file: Option<PathBuf>,
    /// Coplanar priority of entities without `zhlt_coplanarpriority`.
    pub coplanar_priority: i32,
}

/// Tables owned by one CSG run.
pub struct CsgContext {
    pub options: CsgOptions,
    pub planes: Mutex<PlaneTable>,
    pub texinfo: TexinfoTable,
    pub hulls: HullSizes,
    pub map: MapFile,
}

impl CsgContext {
    /// Loads and parses the map text.
    pub fn load(text: &str, options: CsgOptions) -> Result<Self> {
        let hulls = match &options.hull_file {
            Some(path) => HullSizes::read(path)?,
            None => HullSizes::default(),
        };
        let mut planes = PlaneTable::new();
        let texinfo = TexinfoTable::new();
        let mut map = load_map(text, options.coplanar_priority, &mut planes, &texinfo)?;
        if options.no_detail {
            for brush in &mut map.brushes {
                brush.detail_level = 0;
            }
        }
        Ok(CsgContext {
            options,
            planes: Mutex::new(planes),
            texinfo,
            hulls,
            map,
        })
    }

    /// Hull geometry of every brush, grouped by model. Brushes that turn out
    /// degenerate are dropped.
    pub fn build_hulls(&self) -> Result<Vec<Vec<CsgBrush>>> {
        let built = run_threads_on(
            self.map.brushes.len(),
            self.options.threads,
            "brush hulls",
            |i| {
                make_brush_hulls(
                    &self.map.brushes[i],
                    &self.planes,
                    &self.hulls,
                    self.options.no_clip,
                )
            },
        )?;
        let mut built = built.into_iter();
        Ok(self
            .map
            .models
            .iter()
            .map(|m| built.by_ref().take(m.brushes.len()).flatten().collect())
            .collect())
    }
}

/// Output of one model in one hull.
#[derive(Debug, Default)]
pub struct HullOutput {
    pub faces: Vec<PolyRecord>,
    pub detail_brushes: Vec<DetailBrushRecord>,
}

/// Resolves every brush of a model in `hull`; fragments are returned in
/// brush order.
pub fn csg_model(
    brushes: &[CsgBrush],
    hull: usize,
    planes: &PlaneTable,
    threads: usize,
) -> Result<HullOutput> {
    let epsilon = tolerance();
    let per_brush = run_threads_on(brushes.len(), threads, "csg", |i| {
        csg_brush(brushes, i, hull, planes, epsilon)
    })?;

    let mut out = HullOutput::default();
    for (brush, faces) in brushes.iter().zip(per_brush) {
        for face in faces {
            out.faces.push(PolyRecord {
                detail_level: brush.detail_level,
                planenum: face.planenum as i32,
                texinfo: face.texinfo,
                contents: face.contents[0].code(),
                winding: face.winding,
            });
        }
        if brush.detail_level > 0 {
            if let Some(h) = &brush.hulls[hull] {
                out.detail_brushes.push(DetailBrushRecord {
                    detail_level: brush.detail_level,
                    contents: brush.hull_contents(hull).code(),
                    faces: h
                        .faces
                        .iter()
                        .map(|f| (f.planenum as i32, f.winding.clone()))
                        .collect(),
                });
            }
        }
    }
    Ok(out)
}

/// Runs the CSG stage on `map_path`, writing `.p0`-`.p3`, `.b0`-`.b3`,
/// `.pln`, `.hsz` and the seed `.bsp` next to it.
pub fn run_csg(map_path: &Path, options: &CsgOptions) -> Result<()> {
    let start = Instant::now();
    let text = read_to_string(map_path)?;
    let context = CsgContext::load(&text, options.clone())?;
    if context.map.brushes.is_empty() {
        return Err(CompileError::Parse {
            line: 1,
            message: "map has no brushes".into(),
        });
    }
    let models = context.build_hulls()?;

    let CsgContext {
        planes,
        texinfo,
        hulls,
        map,
        ..
    } = context;
    let planes = planes.into_inner();

    for hull in 0..NUM_HULLS {
        let mut polys = PolyWriter::create(&with_extension(map_path, &format!("p{hull}")))?;
        let mut details =
            DetailBrushWriter::create(&with_extension(map_path, &format!("b{hull}")))?;
        let mut total = 0;
        for brushes in &models {
            let out = csg_model(brushes, hull, &planes, options.threads)?;
            total += out.faces.len();
            for face in &out.faces {
                polys.write_face(face)?;
            }
            for brush in &out.detail_brushes {
                details.write_brush(brush)?;
            }
            polys.end_model()?;
            details.end_model()?;
        }
        polys.finish()?;
        details.finish()?;
        tracing::debug!("hull {hull}: {total} faces");
    }

    write_planes(&with_extension(map_path, "pln"), planes.as_slice())?;
    hulls.write(&with_extension(map_path, "hsz"))?;

    let (texinfo, textures) = texinfo.into_lumps();
    let seed = BspFile {
        entities: write_entities(&map.entities),
        texinfo,
        textures,
        ..BspFile::default()
    };
    seed.write(&with_extension(map_path, "bsp"))?;

    tracing::info!(
        "csg: {} planes, {} brushes in {:.2?}",
        planes.len(),
        map.brushes.len(),
        start.elapsed()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contents::Contents;

    const ROOM: &str = r#"
{
"classname" "worldspawn"
{
( 0 0 64 ) ( 0 64 64 ) ( 64 64 64 ) CRATE 0 0 0 1 1
( 0 0 0 ) ( 64 0 0 ) ( 64 64 0 ) CRATE 0 0 0 1 1
( 0 0 0 ) ( 0 0 64 ) ( 64 0 64 ) CRATE 0 0 0 1 1
( 0 64 0 ) ( 64 64 0 ) ( 64 64 64 ) CRATE 0 0 0 1 1
( 0 0 0 ) ( 0 64 0 ) ( 0 64 64 ) CRATE 0 0 0 1 1
( 64 0 0 ) ( 64 0 64 ) ( 64 64 64 ) CRATE 0 0 0 1 1
}
}
"#;

    #[test]
    fn lone_cube_emits_six_quads() {
        let context = CsgContext::load(ROOM, CsgOptions::default()).unwrap();
        let models = context.build_hulls().unwrap();
        let planes = context.planes.lock();
        let out = csg_model(&models[0], 0, &planes, 1).unwrap();
        assert_eq!(out.faces.len(), 6);
        for face in &out.faces {
            assert_eq!(face.winding.len(), 4);
            assert!((face.winding.area() - 4096.0).abs() < 1e-6);
            assert_eq!(face.contents, Contents::Empty.code());
        }
        assert!(out.detail_brushes.is_empty());
    }
}
