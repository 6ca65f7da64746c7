//! Per-hull polygon (`.p0`–`.p3`) and detail brush (`.b0`–`.b3`) streams.
//!
//! Both are text. A polygon record is
//! `detaillevel planenum texinfo contents numpoints` followed by one
//! `x y z` line per point; `-1 -1 -1 -1 -1` closes a model. A detail brush is
//! `detaillevel contents numfaces`, then per face `planenum numpoints` and its
//! points; a lone `-1` closes a model.

use crate::errors::{CompileError, Result};
use crate::geometry::Winding;
use crate::io::{Tokens, create, read_to_string};
use nalgebra::Point3;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// One face fragment handed from CSG to BSP.
#[derive(Debug, Clone, PartialEq)]
pub struct PolyRecord {
    pub detail_level: i32,
    pub planenum: i32,
    pub texinfo: i32,
    pub contents: i32,
    pub winding: Winding,
}

/// A detail brush's hull faces, used by BSP to decide detail leaf contents.
#[derive(Debug, Clone, PartialEq)]
pub struct DetailBrushRecord {
    pub detail_level: i32,
    pub contents: i32,
    pub faces: Vec<(i32, Winding)>,
}

fn write_points(out: &mut impl Write, w: &Winding) -> std::io::Result<()> {
    for p in &w.points {
        writeln!(out, "{:.8} {:.8} {:.8}", p.x, p.y, p.z)?;
    }
    Ok(())
}

fn read_points(tokens: &mut Tokens<'_>, count: usize) -> Result<Winding> {
    let mut points = Vec::with_capacity(count);
    for _ in 0..count {
        let x = tokens.parse()?;
        let y = tokens.parse()?;
        let z = tokens.parse()?;
        points.push(Point3::new(x, y, z));
    }
    Ok(Winding::new(points))
}

/// Buffered writer for one hull's `.p` file.
pub struct PolyWriter {
    path: PathBuf,
    out: BufWriter<File>,
}

impl PolyWriter {
    pub fn create(path: &Path) -> Result<Self> {
        Ok(PolyWriter {
            path: path.to_path_buf(),
            out: create(path)?,
        })
    }

    pub fn write_face(&mut self, record: &PolyRecord) -> Result<()> {
        let out = &mut self.out;
        let mut emit = || -> std::io::Result<()> {
            writeln!(
                out,
                "{} {} {} {} {}",
                record.detail_level,
                record.planenum,
                record.texinfo,
                record.contents,
                record.winding.len()
            )?;
            write_points(out, &record.winding)
        };
        emit().map_err(|e| CompileError::io(&self.path, e))
    }

    pub fn end_model(&mut self) -> Result<()> {
        writeln!(self.out, "-1 -1 -1 -1 -1").map_err(|e| CompileError::io(&self.path, e))
    }

    pub fn finish(mut self) -> Result<()> {
        self.out.flush().map_err(|e| CompileError::io(&self.path, e))
    }
}

/// Reads every model of a `.p` file.
pub fn read_poly_file(path: &Path) -> Result<Vec<Vec<PolyRecord>>> {
    let text = read_to_string(path)?;
    let mut tokens = Tokens::new(path, &text);
    let mut models = Vec::new();
    let mut current = Vec::new();

    while let Some(first) = tokens.next_token() {
        let detail_level: i32 = tokens.parse_token(first)?;
        let planenum: i32 = tokens.parse()?;
        let texinfo: i32 = tokens.parse()?;
        let contents: i32 = tokens.parse()?;
        let numpoints: i32 = tokens.parse()?;

        if detail_level == -1 {
            models.push(std::mem::take(&mut current));
            continue;
        }
        if numpoints < 3 || planenum < 0 {
            return Err(CompileError::corrupt(
                path,
                format!("bad face record: plane {planenum}, {numpoints} points"),
            ));
        }
        current.push(PolyRecord {
            detail_level,
            planenum,
            texinfo,
            contents,
            winding: read_points(&mut tokens, numpoints as usize)?,
        });
    }
    if !current.is_empty() {
        return Err(CompileError::corrupt(path, "last model is not terminated"));
    }
    Ok(models)
}

/// Buffered writer for one hull's `.b` file.
pub struct DetailBrushWriter {
    path: PathBuf,
    out: BufWriter<File>,
}

impl DetailBrushWriter {
    pub fn create(path: &Path) -> Result<Self> {
        Ok(DetailBrushWriter {
            path: path.to_path_buf(),
            out: create(path)?,
        })
    }

    pub fn write_brush(&mut self, brush: &DetailBrushRecord) -> Result<()> {
        let out = &mut self.out;
        let mut emit = || -> std::io::Result<()> {
            writeln!(
                out,
                "{} {} {}",
                brush.detail_level,
                brush.contents,
                brush.faces.len()
            )?;
            for (planenum, w) in &brush.faces {
                writeln!(out, "{} {}", planenum, w.len())?;
                write_points(out, w)?;
            }
            Ok(())
        };
        emit().map_err(|e| CompileError::io(&self.path, e))
    }

    pub fn end_model(&mut self) -> Result<()> {
        writeln!(self.out, "-1").map_err(|e| CompileError::io(&self.path, e))
    }

    pub fn finish(mut self) -> Result<()> {
        self.out.flush().map_err(|e| CompileError::io(&self.path, e))
    }
}

pub fn read_detail_file(path: &Path) -> Result<Vec<Vec<DetailBrushRecord>>> {
    let text = read_to_string(path)?;
    let mut tokens = Tokens::new(path, &text);
    let mut models = Vec::new();
    let mut current = Vec::new();

    while let Some(first) = tokens.next_token() {
        let detail_level: i32 = tokens.parse_token(first)?;
        if detail_level == -1 {
            models.push(std::mem::take(&mut current));
            continue;
        }
        let contents: i32 = tokens.parse()?;
        let numfaces: usize = tokens.parse()?;
        let mut faces = Vec::with_capacity(numfaces);
        for _ in 0..numfaces {
            let planenum: i32 = tokens.parse()?;
            let numpoints: usize = tokens.parse()?;
            faces.push((planenum, read_points(&mut tokens, numpoints)?));
        }
        current.push(DetailBrushRecord {
            detail_level,
            contents,
            faces,
        });
    }
    if !current.is_empty() {
        return Err(CompileError::corrupt(path, "last model is not terminated"));
    }
    Ok(models)
}
