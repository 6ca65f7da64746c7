//! Faces as the BSP builder sees them, grouped into surfaces by plane.

use crate::aabb::Aabb;
use crate::contents::Contents;
use crate::errors::{CompileError, Result};
use crate::geometry::Winding;
use crate::io::polyfile::PolyRecord;
use hashbrown::HashMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct BuildFace {
    /// Oriented plane; odd numbers face the back of the canonical plane.
    pub planenum: usize,
    pub texinfo: i32,
    /// Contents in front of the face.
    pub contents: Contents,
    pub detail_level: i32,
    pub winding: Winding,
    /// Already lies on an ancestor's plane.
    pub on_node: bool,
    /// Render face this fragment belongs to once it reached a node.
    pub render: Option<usize>,
}

impl BuildFace {
    pub fn from_record(record: &PolyRecord, path: &Path) -> Result<Self> {
        let contents = Contents::from_code(record.contents).ok_or_else(|| {
            CompileError::corrupt(path, format!("unknown contents {}", record.contents))
        })?;
        let planenum = usize::try_from(record.planenum)
            .map_err(|_| CompileError::corrupt(path, format!("bad plane {}", record.planenum)))?;
        Ok(BuildFace {
            planenum,
            texinfo: record.texinfo,
            contents,
            detail_level: record.detail_level,
            winding: record.winding.clone(),
            on_node: false,
            render: None,
        })
    }

    pub fn with_winding(&self, winding: Winding) -> Self {
        BuildFace {
            winding,
            ..self.clone()
        }
    }

    pub const fn is_structural(&self) -> bool {
        self.detail_level == 0
    }
}

/// Faces sharing one canonical plane.
#[derive(Debug, Clone, PartialEq)]
pub struct Surface {
    pub planenum: usize,
    pub faces: Vec<usize>,
    pub structural: bool,
}

/// Groups the faces not yet on a node into surfaces, in first-seen order.
pub fn group_surfaces(faces: &[BuildFace]) -> Vec<Surface> {
    let mut index: HashMap<usize, usize> = HashMap::new();
    let mut surfaces: Vec<Surface> = Vec::new();
    for (i, face) in faces.iter().enumerate().filter(|(_, f)| !f.on_node) {
        let planenum = face.planenum & !1;
        let slot = *index.entry(planenum).or_insert_with(|| {
            surfaces.push(Surface {
                planenum,
                faces: Vec::new(),
                structural: false,
            });
            surfaces.len() - 1
        });
        let surface = &mut surfaces[slot];
        surface.faces.push(i);
        surface.structural |= face.is_structural();
    }
    surfaces
}

pub fn faces_bounds(faces: &[BuildFace]) -> Aabb {
    let mut bounds = Aabb::cleared();
    for f in faces {
        bounds.add_box(&f.winding.bounds());
    }
    bounds
}
