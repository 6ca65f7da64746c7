//! Planes, the interned plane table and convex windings.

pub mod plane;
pub mod plane_table;
pub mod winding;

pub use plane::{Plane, PlaneType};
pub use plane_table::PlaneTable;
pub use winding::Winding;
