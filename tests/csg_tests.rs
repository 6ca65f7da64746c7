mod support;

use hlcompile::contents::Contents;
use hlcompile::csg::{CsgContext, CsgOptions, HullOutput, csg_model};
use hlcompile::errors::CompileError;
use hlcompile::float_types::Real;
use support::{approx_eq, box_brush, map_text, point_entity};

fn hull0(text: &str) -> HullOutput {
    let options = CsgOptions {
        threads: 2,
        no_clip: true,
        ..CsgOptions::default()
    };
    let context = CsgContext::load(text, options).unwrap();
    let models = context.build_hulls().unwrap();
    let planes = context.planes.lock();
    csg_model(&models[0], 0, &planes, 2).unwrap()
}

/// Hull 0 area emitted per texture, in order of first appearance.
fn area_per_texture(text: &str) -> Vec<(String, Real)> {
    let options = CsgOptions {
        threads: 2,
        no_clip: true,
        ..CsgOptions::default()
    };
    let context = CsgContext::load(text, options).unwrap();
    let models = context.build_hulls().unwrap();
    let out = csg_model(&models[0], 0, &context.planes.lock(), 2).unwrap();
    let mut areas: Vec<(String, Real)> = Vec::new();
    for f in &out.faces {
        let name = context.texinfo.texture_name(f.texinfo as usize).unwrap().to_lowercase();
        match areas.iter_mut().find(|(n, _)| *n == name) {
            Some((_, area)) => *area += f.winding.area(),
            None => areas.push((name, f.winding.area())),
        }
    }
    areas
}

fn area_of(areas: &[(String, Real)], texture: &str) -> Real {
    areas.iter().find(|(n, _)| n == texture).map_or(0.0, |(_, a)| *a)
}

fn detail_entity(brush: &str, keys: &[(&str, &str)]) -> String {
    let mut out = String::from("{\n\"classname\" \"func_detail\"\n");
    for (k, v) in keys {
        out += &format!("\"{k}\" \"{v}\"\n");
    }
    out + brush + "}\n"
}

// Two 128 cubes overlapping by half along x: "crate" at 0..128, "rock" at
// 64..192. A fully kept cube emits 6 * 128², one that loses its buried face
// and the buried halves of four sides emits 3 * 128², and one that keeps the
// coplanar halves emits 5 * 128².
const FULL: Real = 6.0 * 16384.0;
const KEEPS_COPLANAR: Real = 5.0 * 16384.0;
const LOSES_COPLANAR: Real = 3.0 * 16384.0;

#[test]
fn detail_brushes_never_chop_structural_ones() {
    let areas = area_per_texture(&map_text(
        &[box_brush([0.0; 3], [128.0; 3], "rock")],
        &detail_entity(&box_brush([64.0, 0.0, 0.0], [192.0, 128.0, 128.0], "crate"), &[]),
    ));
    assert!(approx_eq(area_of(&areas, "rock"), FULL, 1e-3), "{areas:?}");
    assert!(approx_eq(area_of(&areas, "crate"), LOSES_COPLANAR, 1e-3), "{areas:?}");
}

#[test]
fn less_detailed_brush_keeps_coplanar_faces() {
    // the level 2 brush comes first, so only the detail rule takes the
    // shared faces away from it
    let areas = area_per_texture(&map_text(
        &[],
        &(detail_entity(
            &box_brush([0.0; 3], [128.0; 3], "crate"),
            &[("zhlt_detaillevel", "2")],
        ) + &detail_entity(
            &box_brush([64.0, 0.0, 0.0], [192.0, 128.0, 128.0], "rock"),
            &[("zhlt_detaillevel", "1")],
        )),
    ));
    assert!(approx_eq(area_of(&areas, "rock"), FULL, 1e-3), "{areas:?}");
    assert!(approx_eq(area_of(&areas, "crate"), LOSES_COPLANAR, 1e-3), "{areas:?}");
}

#[test]
fn coplanar_priority_decides_shared_faces() {
    let crate_brush = box_brush([0.0; 3], [128.0; 3], "crate");
    let rock_brush = box_brush([64.0, 0.0, 0.0], [192.0, 128.0, 128.0], "rock");

    // equal priority: the earlier brush keeps the shared faces
    let areas = area_per_texture(&map_text(
        &[],
        &(detail_entity(&crate_brush, &[]) + &detail_entity(&rock_brush, &[])),
    ));
    assert!(approx_eq(area_of(&areas, "crate"), KEEPS_COPLANAR, 1e-3), "{areas:?}");
    assert!(approx_eq(area_of(&areas, "rock"), LOSES_COPLANAR, 1e-3), "{areas:?}");

    let areas = area_per_texture(&map_text(
        &[],
        &(detail_entity(&crate_brush, &[])
            + &detail_entity(&rock_brush, &[("zhlt_coplanarpriority", "5")])),
    ));
    assert!(approx_eq(area_of(&areas, "crate"), LOSES_COPLANAR, 1e-3), "{areas:?}");
    assert!(approx_eq(area_of(&areas, "rock"), KEEPS_COPLANAR, 1e-3), "{areas:?}");
}

fn total_area(out: &HullOutput) -> Real {
    out.faces.iter().map(|f| f.winding.area()).sum()
}

#[test]
fn cube_emits_six_quads() {
    let out = hull0(&map_text(&[box_brush([0.0; 3], [64.0; 3], "crate")], ""));
    assert_eq!(out.faces.len(), 6);
    let mut planes: Vec<i32> = out.faces.iter().map(|f| f.planenum).collect();
    planes.sort_unstable();
    planes.dedup();
    assert_eq!(planes.len(), 6, "no face may appear twice");
    for f in &out.faces {
        assert_eq!(f.winding.len(), 4);
        assert!(approx_eq(f.winding.area(), 4096.0, 1e-6));
        // mirrored copies would face into the brush
        assert_eq!(f.contents, Contents::Empty.code());
    }
}

#[test]
fn overlapping_cubes_emit_the_union_surface() {
    let out = hull0(&map_text(
        &[
            box_brush([0.0; 3], [64.0; 3], "crate"),
            box_brush([32.0; 3], [96.0; 3], "crate"),
        ],
        "",
    ));
    // two cubes minus the three 32x32 squares of each buried in the other
    let expected = 2.0 * 6.0 * 4096.0 - 2.0 * 3.0 * 1024.0;
    assert!(approx_eq(total_area(&out), expected, 1e-3));
    for f in &out.faces {
        let c = f.winding.center();
        let buried = (32.0 + 1e-3..64.0 - 1e-3).contains(&c.x)
            && (32.0 + 1e-3..64.0 - 1e-3).contains(&c.y)
            && (32.0 + 1e-3..64.0 - 1e-3).contains(&c.z);
        assert!(!buried, "interior face at {c}");
    }
}

#[test]
fn water_inside_solid_leaves_no_water_faces() {
    let out = hull0(&map_text(
        &[
            box_brush([0.0; 3], [128.0; 3], "rock"),
            box_brush([32.0; 3], [96.0; 3], "!water"),
        ],
        "",
    ));
    assert!(out.faces.iter().all(|f| f.contents != Contents::Water.code()));
    assert_eq!(out.faces.len(), 6);
    assert!(approx_eq(total_area(&out), 6.0 * 128.0 * 128.0, 1e-3));
}

#[test]
fn water_faces_are_mirrored() {
    let out = hull0(&map_text(&[box_brush([0.0; 3], [64.0; 3], "!water")], ""));
    // both sides of each water surface
    assert_eq!(out.faces.len(), 12);
    assert_eq!(
        out.faces.iter().filter(|f| f.contents == Contents::Water.code()).count(),
        6
    );
}

#[test]
fn liquid_inside_detail_is_fatal() {
    let text = map_text(
        &[box_brush([32.0; 3], [96.0; 3], "!water")],
        &format!(
            "{{\n\"classname\" \"func_detail\"\n{}}}\n",
            box_brush([0.0; 3], [128.0; 3], "rock")
        ),
    );
    let options = CsgOptions {
        no_clip: true,
        ..CsgOptions::default()
    };
    let context = CsgContext::load(&text, options).unwrap();
    let models = context.build_hulls().unwrap();
    let planes = context.planes.lock();
    let err = csg_model(&models[0], 0, &planes, 1).unwrap_err();
    assert!(matches!(err, CompileError::LiquidInsideDetail { .. }), "{err}");
}

#[test]
fn clip_hulls_grow_by_the_hull_box() {
    let text = map_text(
        &[box_brush([0.0; 3], [64.0; 3], "crate")],
        &point_entity("info_player_start", [0.0, 0.0, 200.0], &[]),
    );
    let context = CsgContext::load(&text, CsgOptions::default()).unwrap();
    let models = context.build_hulls().unwrap();
    let planes = context.planes.lock();
    let out = csg_model(&models[0], 1, &planes, 1).unwrap();
    let mut bounds = hlcompile::aabb::Aabb::cleared();
    for f in &out.faces {
        bounds.add_box(&f.winding.bounds());
    }
    assert!(approx_eq(bounds.mins.x, -16.0, 1e-6));
    assert!(approx_eq(bounds.maxs.z, 100.0, 1e-6));
}

#[test]
fn parse_errors_carry_the_line() {
    let err = CsgContext::load("{\n\"classname\" \"worldspawn\"\n{\n( 0 0 0 ) oops\n}\n}\n", CsgOptions::default())
        .err()
        .unwrap();
    assert!(matches!(err, CompileError::Parse { line: 4, .. }), "{err}");
}
