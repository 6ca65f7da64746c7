use clap::{Args, Parser, Subcommand, ValueEnum};
use hlcompile::bsp::{BspOptions, run_bsp};
use hlcompile::csg::{CsgOptions, run_csg};
use hlcompile::float_types::Real;
use hlcompile::rad::lightmap::LightmapSettings;
use hlcompile::rad::vismatrix::VisMatrixMode;
use hlcompile::rad::{RadOptions, run_rad};
use hlcompile::vis::{VisOptions, run_vis};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "hlcompile", about = "Compiles .map sources into BSP version 30 maps", version)]
struct Cli {
    /// More log output (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Worker threads, 0 for one per core.
    #[arg(long, global = true, default_value_t = 0)]
    threads: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Brush CSG: writes the face, detail brush and plane files.
    Csg {
        /// The .map file; the other files are found beside it.
        map: PathBuf,
        #[command(flatten)]
        hulls: HullArgs,
        #[command(flatten)]
        csg: CsgArgs,
    },
    /// BSP trees, portals and leak check: writes the .bsp and .prt.
    Bsp {
        map: PathBuf,
        #[command(flatten)]
        hulls: HullArgs,
        #[command(flatten)]
        bsp: BspArgs,
    },
    /// Potentially visible sets from the .prt.
    Vis {
        map: PathBuf,
        #[command(flatten)]
        vis: VisArgs,
    },
    /// Radiosity lighting.
    Rad {
        map: PathBuf,
        #[command(flatten)]
        rad: RadArgs,
    },
    /// Every stage in order.
    All {
        map: PathBuf,
        #[command(flatten)]
        hulls: HullArgs,
        #[command(flatten)]
        csg: CsgArgs,
        #[command(flatten)]
        bsp: BspArgs,
        #[command(flatten)]
        vis: VisArgs,
        #[command(flatten)]
        rad: RadArgs,
    },
}

#[derive(Debug, Args)]
struct HullArgs {
    /// Only build the visible hull.
    #[arg(long)]
    noclip: bool,
    /// Treat detail brushes as structural.
    #[arg(long)]
    nodetail: bool,
}

#[derive(Debug, Args)]
struct CsgArgs {
    /// Collision hull sizes file.
    #[arg(long)]
    hullfile: Option<PathBuf>,
    /// Coplanar priority of brush entities without `zhlt_coplanarpriority`.
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    coplanarpriority: i32,
}

#[derive(Debug, Args)]
struct BspArgs {
    /// Split nodes larger than this on any axis.
    #[arg(long, default_value_t = 1024.0)]
    maxnodesize: Real,
    /// Penalty per face split by a candidate plane.
    #[arg(long, default_value_t = 8.0)]
    splitweight: Real,
    /// Penalty per face of imbalance between the sides.
    #[arg(long, default_value_t = 1.0)]
    balanceweight: Real,
    /// Report leaks without failing.
    #[arg(long)]
    leakonly: bool,
    /// Chop rendered faces beyond this many texels.
    #[arg(long, default_value_t = 240.0)]
    subdivide: Real,
}

#[derive(Debug, Args)]
struct VisArgs {
    /// Rough visibility only.
    #[arg(long)]
    fast: bool,
    /// Portals farther apart than this never see each other.
    #[arg(long)]
    maxdistance: Option<Real>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MatrixArg {
    Full,
    Sparse,
    None,
}

#[derive(Debug, Args)]
struct RadArgs {
    #[arg(long, default_value_t = 64.0)]
    chop: Real,
    #[arg(long, default_value_t = 32.0)]
    texchop: Real,
    #[arg(long, default_value_t = 8)]
    bounce: usize,
    #[arg(long, value_enum, default_value_t = MatrixArg::Sparse)]
    vismatrix: MatrixArg,
    /// Largest share of a patch's light a single transfer may carry.
    #[arg(long, default_value_t = 0.5)]
    maxtransfer: Real,
    #[arg(long, default_value_t = 0.55)]
    gamma: Real,
    #[arg(long, default_value_t = 1.0)]
    scale: Real,
    #[arg(long, default_value_t = 255.0)]
    maxlight: Real,
    /// Minimum light as `r g b`.
    #[arg(long, num_args = 3, value_names = ["R", "G", "B"])]
    ambient: Option<Vec<Real>>,
    #[arg(long, default_value_t = 1.0)]
    reflectivity: Real,
    #[arg(long, default_value_t = 1.0)]
    rangescale: Real,
    /// Extra texlight, `texname r g b [intensity]`.
    #[arg(long)]
    texlight: Vec<String>,
    /// Texlight file instead of lights.rad beside the map.
    #[arg(long)]
    lights: Option<PathBuf>,
    /// Do not read or write the transfer cache.
    #[arg(long)]
    nocache: bool,
}

impl HullArgs {
    fn csg_options(&self, args: &CsgArgs, threads: usize) -> CsgOptions {
        CsgOptions {
            threads,
            no_clip: self.noclip,
            no_detail: self.nodetail,
            hull_file: args.hullfile.clone(),
            coplanar_priority: args.coplanarpriority,
        }
    }

    const fn bsp_options(&self, args: &BspArgs) -> BspOptions {
        BspOptions {
            max_node_size: args.maxnodesize,
            split_weight: args.splitweight,
            balance_weight: args.balanceweight,
            leak_only: args.leakonly,
            subdivide_size: args.subdivide,
            no_clip: self.noclip,
            no_detail: self.nodetail,
        }
    }
}

impl VisArgs {
    const fn options(&self, threads: usize) -> VisOptions {
        VisOptions {
            threads,
            fast: self.fast,
            max_distance: self.maxdistance,
        }
    }
}

impl RadArgs {
    fn options(&self, threads: usize) -> RadOptions {
        let ambient = match self.ambient.as_deref() {
            Some(&[r, g, b]) => [r, g, b],
            _ => [0.0; 3],
        };
        RadOptions {
            threads,
            chop: self.chop,
            texchop: self.texchop,
            range_scale: self.rangescale,
            reflectivity_scale: self.reflectivity,
            bounces: self.bounce,
            vismatrix: match self.vismatrix {
                MatrixArg::Full => VisMatrixMode::Full,
                MatrixArg::Sparse => VisMatrixMode::Sparse,
                MatrixArg::None => VisMatrixMode::None,
            },
            max_transfer_fraction: self.maxtransfer,
            lightmap: LightmapSettings {
                scale: self.scale,
                gamma: self.gamma,
                max_light: self.maxlight,
                ambient,
            },
            texlights: self.texlight.clone(),
            lights_file: self.lights.clone(),
            no_cache: self.nocache,
        }
    }
}

fn run(cli: Cli) -> hlcompile::Result<()> {
    let threads = cli.threads;
    match cli.command {
        Command::Csg { map, hulls, csg } => run_csg(&map, &hulls.csg_options(&csg, threads)),
        Command::Bsp { map, hulls, bsp } => run_bsp(&map, &hulls.bsp_options(&bsp)),
        Command::Vis { map, vis } => run_vis(&map, &vis.options(threads)),
        Command::Rad { map, rad } => run_rad(&map, &rad.options(threads)),
        Command::All {
            map,
            hulls,
            csg,
            bsp,
            vis,
            rad,
        } => {
            run_csg(&map, &hulls.csg_options(&csg, threads))?;
            run_bsp(&map, &hulls.bsp_options(&bsp))?;
            run_vis(&map, &vis.options(threads))?;
            run_rad(&map, &rad.options(threads))
        },
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    hlcompile::logging::init(cli.verbose);
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        },
    }
}
