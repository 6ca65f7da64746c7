//! Test support library
//! Map text builders and small helpers shared by the integration tests.
#![allow(dead_code)]

use hlcompile::float_types::Real;
use std::path::{Path, PathBuf};

/// Quick helper to compare floating-point results with an acceptable tolerance.
pub fn approx_eq(a: Real, b: Real, eps: Real) -> bool {
    (a - b).abs() < eps
}

fn point(p: [Real; 3]) -> String {
    format!("( {} {} {} )", p[0], p[1], p[2])
}

/// One brush side through `p1` with normal `a × b`, in the standard
/// texture format.
fn side(p1: [Real; 3], a: [Real; 3], b: [Real; 3], texture: &str) -> String {
    let p0 = [p1[0] + a[0], p1[1] + a[1], p1[2] + a[2]];
    let p2 = [p1[0] + b[0], p1[1] + b[1], p1[2] + b[2]];
    format!("{} {} {} {texture} 0 0 0 1 1\n", point(p0), point(p1), point(p2))
}

/// An axial box brush.
pub fn box_brush(mins: [Real; 3], maxs: [Real; 3], texture: &str) -> String {
    let [x0, y0, z0] = mins;
    let [x1, y1, z1] = maxs;
    let (x, y, z) = ([16.0, 0.0, 0.0], [0.0, 16.0, 0.0], [0.0, 0.0, 16.0]);
    let mut out = String::from("{\n");
    out += &side([x1, y0, z0], y, z, texture);
    out += &side([x0, y0, z0], z, y, texture);
    out += &side([x0, y1, z0], z, x, texture);
    out += &side([x0, y0, z0], x, z, texture);
    out += &side([x0, y0, z1], x, y, texture);
    out += &side([x0, y0, z0], y, x, texture);
    out += "}\n";
    out
}

/// The six walls of a hollow box around `mins..maxs`, `thickness` thick.
/// With `open` the ceiling is left out.
pub fn room_brushes(mins: [Real; 3], maxs: [Real; 3], thickness: Real, open: bool) -> Vec<String> {
    let t = thickness;
    let [x0, y0, z0] = mins;
    let [x1, y1, z1] = maxs;
    let mut walls = vec![
        box_brush([x0 - t, y0 - t, z0 - t], [x1 + t, y1 + t, z0], "floor"),
        box_brush([x0 - t, y0 - t, z0], [x0, y1 + t, z1], "wall"),
        box_brush([x1, y0 - t, z0], [x1 + t, y1 + t, z1], "wall"),
        box_brush([x0, y0 - t, z0], [x1, y0, z1], "wall"),
        box_brush([x0, y1, z0], [x1, y1 + t, z1], "wall"),
    ];
    if !open {
        walls.push(box_brush([x0 - t, y0 - t, z1], [x1 + t, y1 + t, z1 + t], "ceiling"));
    }
    walls
}

/// A whole map: worldspawn with `brushes`, followed by `entities` text.
pub fn map_text(brushes: &[String], entities: &str) -> String {
    let mut out = String::from("{\n\"classname\" \"worldspawn\"\n");
    for b in brushes {
        out += b;
    }
    out += "}\n";
    out += entities;
    out
}

pub fn point_entity(classname: &str, origin: [Real; 3], extra: &[(&str, &str)]) -> String {
    let mut out = format!(
        "{{\n\"classname\" \"{classname}\"\n\"origin\" \"{} {} {}\"\n",
        origin[0], origin[1], origin[2]
    );
    for (k, v) in extra {
        out += &format!("\"{k}\" \"{v}\"\n");
    }
    out += "}\n";
    out
}

/// Writes `text` as `name.map` in `dir` and returns its path.
pub fn write_map(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(format!("{name}.map"));
    std::fs::write(&path, text).expect("write map");
    path
}

/// A sealed 256 unit room with a player start and a light.
pub fn lit_room() -> String {
    map_text(
        &room_brushes([0.0; 3], [256.0; 3], 16.0, false),
        &(point_entity("info_player_start", [128.0, 128.0, 64.0], &[])
            + &point_entity("light", [128.0, 128.0, 192.0], &[("_light", "255 255 255 300")])),
    )
}
