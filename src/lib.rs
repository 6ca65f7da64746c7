//! A **BSP version 30 map compiler**: CSG, BSP, VIS and RAD stages that turn a
//! `.map` source into a lit, visibility-culled `.bsp`.
//!
//! # Stages
//! - [**csg**](csg): brush planes expanded per collision hull, clipped against each
//!   other into the `.p0`..`.p3` face lists, `.b0`..`.b3` detail brushes and `.pln`
//! - [**bsp**](bsp): binary space partitioning per hull, portals, outside fill and
//!   leak detection, `.prt` for VIS and the first `.bsp`
//! - [**vis**](vis): potentially visible sets from the portal graph, written into
//!   the visibility lump
//! - [**rad**](rad): radiosity with patches, transfers and bounces, written into the
//!   lighting lump
//!
//! # Features
//! #### Default
//! - **parallel**: use rayon for multithreading

#![forbid(unsafe_code)]
#![warn(clippy::missing_const_for_fn, clippy::approx_constant, clippy::all)]

pub mod aabb;
pub mod bsp;
pub mod contents;
pub mod csg;
pub mod errors;
pub mod float_types;
pub mod geometry;
pub mod io;
pub mod logging;
pub mod map;
pub mod parallel;
pub mod rad;
pub mod vis;

pub use contents::Contents;
pub use errors::{CompileError, Result};
pub use geometry::{Plane, PlaneTable, Winding};
