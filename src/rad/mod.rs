//! RAD stage: radiosity lighting of a compiled BSP.
//!
//! Faces are chopped into patches, patch pairs that see each other get form
//! factor transfers, direct light is gathered at every patch and bounced
//! through the transfers, and every luxel finally combines traced direct
//! light with indirect light interpolated from the patches.

pub mod bounce;
pub mod faces;
pub mod interpolate;
pub mod lightmap;
pub mod lights;
pub mod patch;
pub mod textures;
pub mod trace;
pub mod transfers;
pub mod vismatrix;

use crate::errors::{CompileError, Result};
use crate::float_types::Real;
use crate::io::bspfile::BspFile;
use crate::io::entities::{Entity, parse_entities};
use crate::io::transfer_cache::{read_transfer_cache, write_transfer_cache};
use crate::io::with_extension;
use crate::parallel::run_threads_on;
use crate::rad::bounce::{BounceResult, bounce_light};
use crate::rad::faces::{FaceInfo, load_faces};
use crate::rad::interpolate::face_neighbours;
use crate::rad::lightmap::{LightingScene, LightmapSettings, build_lightmaps};
use crate::rad::lights::{DirectLight, entity_lights, gather_direct, surface_lights};
use crate::rad::patch::{
    DEFAULT_CHOP, DEFAULT_TEXCHOP, Patch, PatchSettings, make_patches, patches_by_face,
};
use crate::rad::textures::{TexLights, texture_reflectivity};
use crate::rad::trace::{LIGHTFLAG_OPAQUE, Tracer};
use crate::rad::transfers::{DEFAULT_MAX_TRANSFER_FRACTION, TransferList, make_transfers};
use crate::rad::vismatrix::{PairTest, Pvs, VisMatrix, VisMatrixMode};
use std::path::{Path, PathBuf};
use std::time::Instant;

pub const DEFAULT_BOUNCES: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct RadOptions {
    /// Worker threads, 0 for one per core.
    pub threads: usize,
    pub chop: Real,
    pub texchop: Real,
    /// Emitter range in multiples of a patch's size.
    pub range_scale: Real,
    pub reflectivity_scale: Real,
    pub bounces: usize,
    pub vismatrix: VisMatrixMode,
    pub max_transfer_fraction: Real,
    pub lightmap: LightmapSettings,
    /// Extra `texname r g b [intensity]` texlights.
    pub texlights: Vec<String>,
    /// Texlight file used instead of `lights.rad` beside the map.
    pub lights_file: Option<PathBuf>,
    /// Neither read nor write the `.inc` transfer cache.
    pub no_cache: bool,
}

impl Default for RadOptions {
    fn default() -> Self {
        RadOptions {
            threads: 0,
            chop: DEFAULT_CHOP,
            texchop: DEFAULT_TEXCHOP,
            range_scale: 1.0,
            reflectivity_scale: 1.0,
            bounces: DEFAULT_BOUNCES,
            vismatrix: VisMatrixMode::default(),
            max_transfer_fraction: DEFAULT_MAX_TRANSFER_FRACTION,
            lightmap: LightmapSettings::default(),
            texlights: Vec::new(),
            lights_file: None,
            no_cache: false,
        }
    }
}

/// Brush models with `zhlt_lightflags` containing the opaque bit.
fn opaque_models(entities: &[Entity]) -> Vec<usize> {
    entities
        .iter()
        .filter(|e| e.int("zhlt_lightflags").unwrap_or(0) & LIGHTFLAG_OPAQUE != 0)
        .filter_map(|e| e.value("model")?.strip_prefix('*')?.parse().ok())
        .collect()
}

/// Texlights from `lights.rad` (or the given file) and the options.
fn load_texlights(map_path: &Path, options: &RadOptions) -> Result<TexLights> {
    let file = options
        .lights_file
        .clone()
        .unwrap_or_else(|| map_path.with_file_name("lights.rad"));
    let mut table = TexLights::load(&file)?;
    for (i, line) in options.texlights.iter().enumerate() {
        table.add_line(line).map_err(|message| CompileError::Parse {
            line: i + 1,
            message: format!("texlight option: {message}"),
        })?;
    }
    Ok(table)
}

/// Everything RAD derives from the BSP before light is computed.
pub struct RadContext {
    pub options: RadOptions,
    pub bsp: BspFile,
    pub entities: Vec<Entity>,
    pub faces: Vec<FaceInfo>,
    pub patches: Vec<Patch>,
    pub tracer: Tracer,
    pub pvs: Pvs,
}

impl RadContext {
    pub fn new(bsp: BspFile, path: &Path, texlights: &TexLights, options: RadOptions) -> Result<Self> {
        let entities = parse_entities(&bsp.entities)?;
        let faces = load_faces(&bsp, &entities, path)?;
        let reflectivity = texture_reflectivity(&bsp.textures, options.reflectivity_scale);
        let mut patches = make_patches(
            &faces,
            &reflectivity,
            texlights,
            &PatchSettings {
                chop: options.chop,
                texchop: options.texchop,
                range_scale: options.range_scale,
            },
        )?;

        let tracer = Tracer::new(&bsp, &faces, &opaque_models(&entities));
        for p in &mut patches {
            p.leaf = tracer.point_leaf(&p.origin);
        }
        let pvs = Pvs::from_bsp(&bsp);
        if pvs.is_empty() {
            tracing::warn!("no visibility data, every leaf sees every other");
        }
        Ok(RadContext {
            options,
            bsp,
            entities,
            faces,
            patches,
            tracer,
            pvs,
        })
    }

    /// Entity lights plus one surface light per texlight patch.
    pub fn direct_lights(&self) -> Vec<DirectLight> {
        let mut lights = entity_lights(&self.entities, &self.tracer);
        lights.extend(surface_lights(&self.patches));
        lights
    }

    /// Fills every patch's direct light.
    pub fn light_patches(&mut self, lights: &[DirectLight]) -> Result<()> {
        let direct = run_threads_on(self.patches.len(), self.options.threads, "direct", |i| {
            let p = &self.patches[i];
            Ok(gather_direct(
                lights,
                &p.origin,
                &p.normal,
                p.leaf,
                p.face,
                &self.tracer,
                &self.pvs,
            ))
        })?;
        for (p, light) in self.patches.iter_mut().zip(direct) {
            p.direct = light;
        }
        Ok(())
    }

    /// Transfers from the cache when it matches, computed otherwise.
    pub fn transfers(&self, cache: Option<&Path>) -> Result<Vec<TransferList>> {
        if let Some(path) = cache.filter(|p| p.exists()) {
            match read_transfer_cache(path, self.patches.len()) {
                Ok(Some(lists)) => {
                    tracing::info!("transfers read from {}", path.display());
                    return Ok(lists);
                },
                Ok(None) => tracing::info!("{} is stale, recomputing", path.display()),
                Err(e) => tracing::warn!("ignoring transfer cache: {e}"),
            }
        }

        let test = PairTest {
            patches: &self.patches,
            tracer: &self.tracer,
            pvs: &self.pvs,
        };
        let matrix = VisMatrix::build(self.options.vismatrix, &test, self.options.threads)?;
        let lists = make_transfers(
            &self.patches,
            &matrix,
            &test,
            self.options.max_transfer_fraction,
            self.options.threads,
        )?;
        if let Some(path) = cache {
            write_transfer_cache(path, &lists)?;
        }
        Ok(lists)
    }

    pub fn bounce(&self, transfers: &[TransferList]) -> Vec<BounceResult> {
        bounce_light(&self.patches, transfers, self.options.bounces)
    }

    /// Writes the lighting lump and face styles into the BSP.
    pub fn write_lightmaps(&mut self, lights: &[DirectLight], bounced: &[BounceResult]) -> Result<()> {
        let by_face = patches_by_face(&self.patches, self.faces.len());
        let neighbours = face_neighbours(&self.bsp, &self.faces);
        let scene = LightingScene {
            faces: &self.faces,
            patches: &self.patches,
            by_face: &by_face,
            neighbours: &neighbours,
            lights,
            bounced,
            tracer: &self.tracer,
            pvs: &self.pvs,
        };
        build_lightmaps(&mut self.bsp, &scene, &self.options.lightmap, self.options.threads)
    }
}

pub fn run_rad(map_path: &Path, options: &RadOptions) -> Result<()> {
    let start = Instant::now();
    let bsp_path = with_extension(map_path, "bsp");
    let bsp = BspFile::read(&bsp_path)?;
    let texlights = load_texlights(map_path, options)?;

    let mut context = RadContext::new(bsp, &bsp_path, &texlights, options.clone())?;
    let lights = context.direct_lights();
    context.light_patches(&lights)?;

    let cache = (!options.no_cache).then(|| with_extension(map_path, "inc"));
    let transfers = context.transfers(cache.as_deref())?;
    let bounced = context.bounce(&transfers);
    context.write_lightmaps(&lights, &bounced)?;

    context.bsp.check_limits()?;
    context.bsp.write(&bsp_path)?;
    tracing::info!("rad done in {:.2?}", start.elapsed());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_flag_selects_models() {
        let mut door = Entity::new("func_door");
        door.set("model", "*2");
        door.set("zhlt_lightflags", "2");
        let mut wall = Entity::new("func_wall");
        wall.set("model", "*3");
        wall.set("zhlt_lightflags", "1");
        assert_eq!(opaque_models(&[Entity::new("worldspawn"), door, wall]), vec![2]);
    }
}
