// Our Real scalar type. Geometry is computed in double precision and narrowed
// to f32 only when it is written into the BSP lumps.
pub type Real = f64;

use core::str::FromStr;
use std::sync::OnceLock;

/// Lazily-initialized on-plane tolerance used by winding classification.
/// Defaults to [`DEFAULT_ON_EPSILON`], but can be overridden:
///  1) **Build-time**: set env var `HLCOMPILE_ON_EPSILON` (e.g. `HLCOMPILE_ON_EPSILON=0.01 cargo build`)
///  2) **Runtime**: call [`set_tolerance`] once before compiling
static TOLERANCE_CELL: OnceLock<Real> = OnceLock::new();

/// Distance at which a point is considered to lie on a plane.
pub const DEFAULT_ON_EPSILON: Real = 0.04;

/// Two plane normals closer than this are the same normal.
pub const NORMAL_EPSILON: Real = 0.00001;

/// Two plane distances closer than this are the same distance.
pub const DIST_EPSILON: Real = 0.04;

/// Used for point comparisons (vertex welding, duplicate point pruning).
pub const EQUAL_EPSILON: Real = 0.004;

/// Windings with less area than this are degenerate.
pub const MIN_WINDING_AREA: Real = 0.001;

/// Half-size of the "infinite" base winding created for a plane.
pub const BOGUS_RANGE: Real = 131072.0;

/// Returns the current on-plane epsilon.
/// If not set yet, it tries `HLCOMPILE_ON_EPSILON` (parsed as `Real`) and
/// falls back to [`DEFAULT_ON_EPSILON`].
pub fn tolerance() -> Real {
    *TOLERANCE_CELL.get_or_init(|| {
        if let Some(environment_variable) = option_env!("HLCOMPILE_ON_EPSILON") {
            if let Ok(value) = Real::from_str(environment_variable) {
                return value.max(Real::EPSILON);
            }
        }
        DEFAULT_ON_EPSILON
    })
}

/// Set the on-plane epsilon once (subsequent calls are ignored).
/// Call near program start: `hlcompile::float_types::set_tolerance(0.01);`
pub fn set_tolerance(value: Real) {
    let _ = TOLERANCE_CELL.set(value.max(Real::EPSILON));
}

/// Archimedes' constant (π)
pub const PI: Real = core::f64::consts::PI;

/// π/2
pub const FRAC_PI_2: Real = core::f64::consts::FRAC_PI_2;

/// The full circle constant (τ)
pub const TAU: Real = core::f64::consts::TAU;
