//! BSP stage: partitions the CSG fragments of every model and hull, finds
//! leaks, writes the portal file and the geometry lumps.

pub mod build;
pub mod node;
pub mod outside;
pub mod portals;
pub mod subdivide;
pub mod surface;
pub mod traits;
pub mod writebsp;

use crate::bsp::build::{BuildSettings, build_tree};
use crate::bsp::node::Tree;
use crate::bsp::outside::{FillOutcome, Occupant, fill_outside, occupants};
use crate::bsp::portals::{number_vis_leaves, portal_file, portalize};
use crate::bsp::subdivide::DEFAULT_SUBDIVIDE_SIZE;
use crate::bsp::surface::BuildFace;
use crate::bsp::traits::BalancedSplittingStrategy;
use crate::bsp::writebsp::{BspWriter, ModelTrees};
use crate::errors::{CompileError, Result};
use crate::float_types::Real;
use crate::geometry::PlaneTable;
use crate::io::bspfile::BspFile;
use crate::io::entities::{Entity, parse_entities};
use crate::io::hullsize::NUM_HULLS;
use crate::io::planefile::read_planes;
use crate::io::pointfile::write_pointfile;
use crate::io::polyfile::{DetailBrushRecord, PolyRecord, read_detail_file, read_poly_file};
use crate::io::with_extension;
use nalgebra::Vector3;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub struct BspOptions {
    /// Nodes larger than this on any axis are split axially.
    pub max_node_size: Real,
    pub split_weight: Real,
    pub balance_weight: Real,
    /// Report a leak and keep going instead of failing.
    pub leak_only: bool,
    /// Texel extent after which rendered faces are chopped.
    pub subdivide_size: Real,
    /// Skip hulls 1-3.
    pub no_clip: bool,
    /// Treat detail faces as structural.
    pub no_detail: bool,
}

impl Default for BspOptions {
    fn default() -> Self {
        BspOptions {
            max_node_size: 1024.0,
            split_weight: 8.0,
            balance_weight: 1.0,
            leak_only: false,
            subdivide_size: DEFAULT_SUBDIVIDE_SIZE,
            no_clip: false,
            no_detail: false,
        }
    }
}

/// Everything one BSP run reads from the CSG stage.
pub struct BspContext {
    pub options: BspOptions,
    pub map_path: PathBuf,
    pub planes: PlaneTable,
    pub entities: Vec<Entity>,
    /// Fragments per hull, per model.
    pub faces: Vec<Vec<Vec<PolyRecord>>>,
    /// Detail brushes per hull, per model.
    pub detail_brushes: Vec<Vec<Vec<DetailBrushRecord>>>,
    pub seed: BspFile,
}

impl BspContext {
    pub fn load(map_path: &Path, options: BspOptions) -> Result<Self> {
        let planes = PlaneTable::from_planes(read_planes(&with_extension(map_path, "pln"))?);
        let seed = BspFile::read(&with_extension(map_path, "bsp"))?;
        let entities = parse_entities(&seed.entities)?;

        let mut faces = Vec::with_capacity(NUM_HULLS);
        let mut detail_brushes = Vec::with_capacity(NUM_HULLS);
        for hull in 0..NUM_HULLS {
            if hull > 0 && options.no_clip {
                faces.push(Vec::new());
                detail_brushes.push(Vec::new());
                continue;
            }
            faces.push(read_poly_file(&with_extension(map_path, &format!("p{hull}")))?);
            detail_brushes.push(read_detail_file(&with_extension(
                map_path,
                &format!("b{hull}"),
            ))?);
        }
        if faces[0].is_empty() {
            return Err(CompileError::corrupt(
                with_extension(map_path, "p0"),
                "no models",
            ));
        }

        Ok(BspContext {
            options,
            map_path: map_path.to_path_buf(),
            planes,
            entities,
            faces,
            detail_brushes,
            seed,
        })
    }

    pub fn model_count(&self) -> usize {
        self.faces[0].len()
    }

    fn build_faces(&self, hull: usize, model: usize) -> Result<Vec<BuildFace>> {
        let path = with_extension(&self.map_path, &format!("p{hull}"));
        let mut faces = Vec::new();
        for record in self.faces[hull].get(model).map_or(&[][..], Vec::as_slice) {
            let mut face = BuildFace::from_record(record, &path)?;
            if self.options.no_detail {
                face.detail_level = 0;
            }
            faces.push(face);
        }
        Ok(faces)
    }

    /// Builds one hull of one model.
    pub fn build_hull(&mut self, hull: usize, model: usize) -> Result<Tree> {
        let faces = self.build_faces(hull, model)?;
        let strategy = BalancedSplittingStrategy {
            split_weight: self.options.split_weight,
            balance_weight: self.options.balance_weight,
        };
        let empty = Vec::new();
        let detail_brushes = if hull == 0 {
            self.detail_brushes[0].get(model).unwrap_or(&empty)
        } else {
            &empty
        };
        let settings = BuildSettings {
            strategy: &strategy,
            max_node_size: self.options.max_node_size,
            use_detail: hull == 0 && !self.options.no_detail,
            render: hull == 0,
            detail_brushes,
        };
        build_tree(faces, &mut self.planes, &settings)
    }

    /// Origin of a brush model from its entity's `origin` key.
    fn model_origin(&self, model: usize) -> Vector3<Real> {
        if model == 0 {
            return Vector3::zeros();
        }
        let key = format!("*{model}");
        self.entities
            .iter()
            .find(|e| e.value("model") == Some(key.as_str()))
            .and_then(Entity::origin)
            .map_or_else(Vector3::zeros, |p| p.coords)
    }

    /// Portalizes and fills the world's hull 0. Returns the `.prt` contents
    /// when the fill succeeded.
    fn seal_world(
        &self,
        tree: &mut Tree,
        occupants: &[Occupant],
    ) -> Result<Option<crate::io::portalfile::PortalFile>> {
        let portals = portalize(tree, &self.planes);
        match fill_outside(tree, &portals, &self.planes, occupants) {
            FillOutcome::Leaked { occupant, trace } => {
                let pointfile = with_extension(&self.map_path, "pts");
                write_pointfile(&pointfile, &trace)?;
                let error = CompileError::Leak {
                    classname: occupant.classname,
                    origin: occupant.origin,
                    pointfile,
                };
                if !self.options.leak_only {
                    return Err(error);
                }
                tracing::warn!("{error}");
                Ok(None)
            },
            FillOutcome::Unoccupied => {
                tracing::warn!("no entities in empty space, outside not filled");
                let vis = number_vis_leaves(tree);
                Ok(Some(portal_file(&portals, &vis)))
            },
            FillOutcome::Filled { leafs } => {
                tracing::debug!("{leafs} outside leafs filled");
                let vis = number_vis_leaves(tree);
                Ok(Some(portal_file(&portals, &vis)))
            },
        }
    }

    /// Same fill for a world clip hull; a leak there only skips the fill.
    fn seal_clip_hull(&self, tree: &mut Tree, hull: usize, occupants: &[Occupant]) {
        let portals = portalize(tree, &self.planes);
        if let FillOutcome::Leaked { occupant, .. } =
            fill_outside(tree, &portals, &self.planes, occupants)
        {
            tracing::warn!(
                "hull {hull}: {} at {} leaks, outside left unfilled",
                occupant.classname,
                occupant.origin
            );
        }
    }
}

/// Runs the BSP stage on the outputs of [`crate::csg::run_csg`].
pub fn run_bsp(map_path: &Path, options: &BspOptions) -> Result<()> {
    let start = Instant::now();
    let pointfile = with_extension(map_path, "pts");
    let prtfile = with_extension(map_path, "prt");
    for stale in [&pointfile, &prtfile] {
        if stale.exists() {
            std::fs::remove_file(stale).map_err(|e| CompileError::io(stale, e))?;
        }
    }

    let mut context = BspContext::load(map_path, options.clone())?;
    let occupants = occupants(&context.entities);
    let mut writer = BspWriter::new(std::mem::take(&mut context.seed), options.subdivide_size);

    for model in 0..context.model_count() {
        let world = model == 0;
        let mut hull0 = context.build_hull(0, model)?;
        if world {
            if let Some(prt) = context.seal_world(&mut hull0, &occupants)? {
                prt.write(&prtfile)?;
                tracing::info!("{} vis leafs, {} portals", prt.num_leafs, prt.portals.len());
            }
        }

        let mut clip: [Option<Tree>; 3] = [None, None, None];
        if !options.no_clip {
            for hull in 1..NUM_HULLS {
                let mut tree = context.build_hull(hull, model)?;
                if world {
                    context.seal_clip_hull(&mut tree, hull, &occupants);
                }
                clip[hull - 1] = Some(tree);
            }
        }

        let trees = ModelTrees {
            hull0: &hull0,
            clip: [clip[0].as_ref(), clip[1].as_ref(), clip[2].as_ref()],
            origin: context.model_origin(model),
            world,
        };
        writer.write_model(&trees, &context.planes)?;
    }

    let bsp = writer.finish();
    bsp.check_limits()?;
    bsp.write(&with_extension(map_path, "bsp"))?;
    bsp.print_usage();
    tracing::info!("bsp: {} models in {:.2?}", bsp.models.len(), start.elapsed());
    Ok(())
}
