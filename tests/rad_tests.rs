mod support;

use hlcompile::bsp::{BspOptions, run_bsp};
use hlcompile::csg::{CsgOptions, run_csg};
use hlcompile::float_types::Real;
use hlcompile::geometry::Winding;
use hlcompile::io::bspfile::BspFile;
use hlcompile::io::transfer_cache::{read_transfer_cache, write_transfer_cache};
use hlcompile::rad::bounce::bounce_light;
use hlcompile::rad::patch::{Patch, StyledLight};
use hlcompile::rad::textures::TexLights;
use hlcompile::rad::transfers::TransferList;
use hlcompile::rad::vismatrix::{PairTest, VisMatrix, VisMatrixMode};
use hlcompile::rad::{RadContext, RadOptions, run_rad};
use hlcompile::vis::{VisOptions, run_vis};
use nalgebra::{Point3, Vector3};
use support::{box_brush, lit_room, map_text, point_entity, room_brushes, write_map};

fn patch(face: usize, area: Real, reflectivity: Real) -> Patch {
    let side = area.sqrt();
    Patch {
        face,
        winding: Winding::new(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0, side, 0.0),
            Point3::new(side, side, 0.0),
            Point3::new(side, 0.0, 0.0),
        ]),
        origin: Point3::new(side / 2.0, side / 2.0, 1.0),
        normal: Vector3::z(),
        area,
        emitter_range: side,
        reflectivity: [reflectivity; 3],
        baselight: [0.0; 3],
        leaf: 1,
        direct: StyledLight::default(),
    }
}

#[test]
fn bounce_runs_each_style_separately() {
    let mut patches = vec![patch(0, 100.0, 0.5), patch(1, 200.0, 0.3), patch(2, 50.0, 0.7)];
    patches[0].direct.add(0, [10.0, 20.0, 30.0]);
    patches[2].direct.add(3, [5.0, 0.0, 0.0]);
    let transfers = vec![
        TransferList::from_sorted(&[(1, 0.5), (2, 0.4)]),
        TransferList::from_sorted(&[(0, 0.3), (2, 0.2)]),
        TransferList::from_sorted(&[(0, 0.5), (1, 0.5)]),
    ];

    let results = bounce_light(&patches, &transfers, 8);
    assert_eq!(results.iter().map(|r| r.style).collect::<Vec<_>>(), vec![0, 3]);
    for r in &results {
        assert_eq!(r.energy.len(), 9);
        assert!(r.energy[0] > 0.0);
        for pair in r.energy.windows(2) {
            assert!(pair[1] <= 0.7 * pair[0] + 1e-9, "{:?}", r.energy);
        }
        assert!(r.total.iter().flatten().all(|&v| v >= 0.0));
    }
    // style 0 light reaches the other patches after one bounce
    assert!(results[0].total[1][2] > 0.0);
}

#[test]
fn closed_room_bounce_energy_decays_by_the_reflectivity() {
    let dir = tempfile::tempdir().unwrap();
    let map = write_map(dir.path(), "room", &lit_room());
    run_csg(&map, &CsgOptions::default()).unwrap();
    run_bsp(&map, &BspOptions::default()).unwrap();
    run_vis(&map, &VisOptions::default()).unwrap();

    let bsp_path = map.with_extension("bsp");
    let options = RadOptions {
        threads: 2,
        bounces: 6,
        ..RadOptions::default()
    };
    let bsp = BspFile::read(&bsp_path).unwrap();
    let mut context = RadContext::new(bsp, &bsp_path, &TexLights::default(), options).unwrap();
    let lights = context.direct_lights();
    assert_eq!(lights.len(), 1);
    context.light_patches(&lights).unwrap();
    let transfers = context.transfers(None).unwrap();
    let results = context.bounce(&transfers);

    // untextured walls all fall back to the same grey
    let max_reflectivity = context
        .patches
        .iter()
        .flat_map(|p| p.reflectivity)
        .fold(0.0, Real::max);
    assert!(max_reflectivity > 0.0 && max_reflectivity < 1.0);

    assert_eq!(results.len(), 1);
    let energy = &results[0].energy;
    assert_eq!(energy.len(), 7);
    assert!(energy[1] > 0.0, "no light bounced: {energy:?}");
    for pair in energy.windows(2) {
        assert!(pair[1] < pair[0], "{energy:?}");
        assert!(pair[1] <= max_reflectivity * pair[0] * (1.0 + 1e-9), "{energy:?}");
    }
}

#[test]
fn vismatrix_modes_agree_on_every_pair() {
    let dir = tempfile::tempdir().unwrap();
    let mut brushes = room_brushes([0.0; 3], [256.0; 3], 16.0, false);
    // floor to ceiling pillar hiding parts of the walls from each other
    brushes.push(box_brush([96.0, 32.0, 0.0], [160.0, 96.0, 256.0], "pillar"));
    let map = write_map(
        dir.path(),
        "pillar",
        &map_text(&brushes, &point_entity("info_player_start", [200.0, 200.0, 64.0], &[])),
    );
    run_csg(&map, &CsgOptions::default()).unwrap();
    run_bsp(&map, &BspOptions::default()).unwrap();
    run_vis(&map, &VisOptions::default()).unwrap();

    let bsp_path = map.with_extension("bsp");
    let bsp = BspFile::read(&bsp_path).unwrap();
    let context =
        RadContext::new(bsp, &bsp_path, &TexLights::default(), RadOptions::default()).unwrap();
    let test = PairTest {
        patches: &context.patches,
        tracer: &context.tracer,
        pvs: &context.pvs,
    };
    let full = VisMatrix::build(VisMatrixMode::Full, &test, 2).unwrap();
    let sparse = VisMatrix::build(VisMatrixMode::Sparse, &test, 2).unwrap();
    let on_demand = VisMatrix::build(VisMatrixMode::None, &test, 2).unwrap();
    assert_eq!(on_demand, VisMatrix::OnDemand);

    let n = context.patches.len();
    let mut visible = 0;
    for i in 0..n {
        for j in 0..n {
            let expected = on_demand.visible(i, j, &test);
            assert_eq!(full.visible(i, j, &test), expected, "full {i} {j}");
            assert_eq!(sparse.visible(i, j, &test), expected, "sparse {i} {j}");
            assert_eq!(expected, on_demand.visible(j, i, &test));
            visible += usize::from(expected);
        }
    }
    assert!(visible > 0, "no patch sees another");
    assert!(visible < n * (n - 1), "the pillar hides nothing");
}

#[test]
fn transfer_cache_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.inc");
    let lists = vec![
        TransferList::from_sorted(&[(1, 0.25), (2, 0.125), (7, 0.5)]),
        TransferList::default(),
        TransferList::from_sorted(&[(0, 0.75)]),
    ];
    write_transfer_cache(&path, &lists).unwrap();
    assert_eq!(read_transfer_cache(&path, 3).unwrap(), Some(lists));
    // a different patch count makes the cache stale
    assert_eq!(read_transfer_cache(&path, 4).unwrap(), None);
}

#[test]
fn lit_room_gets_lightmaps() {
    let dir = tempfile::tempdir().unwrap();
    let map = write_map(dir.path(), "room", &lit_room());
    run_csg(&map, &CsgOptions::default()).unwrap();
    run_bsp(&map, &BspOptions::default()).unwrap();
    run_vis(&map, &VisOptions::default()).unwrap();
    let options = RadOptions {
        bounces: 2,
        ..RadOptions::default()
    };
    run_rad(&map, &options).unwrap();
    assert!(map.with_extension("inc").exists());

    let bsp = BspFile::read(&map.with_extension("bsp")).unwrap();
    assert!(!bsp.lighting.is_empty());
    assert!(bsp.lighting.iter().any(|&b| b > 0));
    for face in &bsp.faces {
        if face.lightofs >= 0 {
            assert_eq!(face.styles[0], 0);
            assert!((face.lightofs as usize) < bsp.lighting.len());
        } else {
            assert_eq!(face.styles, [255; 4]);
        }
    }

    // the second run reads the cached transfers
    run_rad(&map, &options).unwrap();
    let again = BspFile::read(&map.with_extension("bsp")).unwrap();
    assert_eq!(again.lighting, bsp.lighting);
}
