//! Fatal compile errors

use crate::float_types::Real;
use nalgebra::Point3;
use std::path::PathBuf;

/// Everything that aborts a compile stage.
///
/// Recoverable conditions (bad texture alignment, missing texture pixels,
/// degenerate fragments) are logged with `tracing::warn!` and never become
/// a `CompileError`.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// A fixed-width index field of the BSP format would overflow.
    #[error("exceeded {what} limit ({limit})")]
    LimitExceeded { what: &'static str, limit: usize },

    /// An intermediate or BSP file is truncated or inconsistent.
    #[error("{path}: corrupt file: {reason}")]
    CorruptFile { path: PathBuf, reason: String },

    /// Opening, reading or writing a required file failed.
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Map text could not be parsed.
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    /// A liquid brush sits inside a detail brush.
    #[error("entity {entity}, brush {brush}: {contents} brush is nested inside a detail brush")]
    LiquidInsideDetail {
        entity: usize,
        brush: usize,
        contents: &'static str,
    },

    /// Flood fill from outside reached an occupied leaf.
    #[error("LEAK: entity {classname} at {origin} can see the void, trace written to {pointfile}")]
    Leak {
        classname: String,
        origin: Point3<Real>,
        pointfile: PathBuf,
    },

    /// Subdivision produced more patches than a transfer index can address.
    #[error("too many patches ({count}, limit {limit})")]
    TooManyPatches { count: usize, limit: usize },

    /// An internal consistency check failed.
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, CompileError>;

impl CompileError {
    /// Wraps an `std::io::Error` with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CompileError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        CompileError::CorruptFile {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Fails with [`CompileError::LimitExceeded`] when `count` does not fit under `limit`.
#[inline]
pub fn check_limit(what: &'static str, count: usize, limit: usize) -> Result<()> {
    if count > limit {
        Err(CompileError::LimitExceeded { what, limit })
    } else {
        Ok(())
    }
}
