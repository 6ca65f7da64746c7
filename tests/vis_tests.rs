mod support;

use hlcompile::bsp::{BspOptions, run_bsp};
use hlcompile::csg::{CsgOptions, run_csg};
use hlcompile::geometry::Winding;
use hlcompile::io::bspfile::BspFile;
use hlcompile::io::portalfile::{PortalFile, PortalRecord};
use hlcompile::vis::compress::{compress_row, decompress_row};
use hlcompile::vis::{VisContext, VisOptions, run_vis};
use hlcompile::vis::portal::PortalBits;
use nalgebra::{Point3, Vector3};
use std::path::{Path, PathBuf};
use support::{box_brush, map_text, point_entity, room_brushes, write_map};

/// A long hall split by a wall with a doorway at one end and a baffle in
/// front of the doorway.
fn compiled_hall(dir: &std::path::Path) -> PathBuf {
    let mut brushes = room_brushes([0.0; 3], [512.0, 256.0, 128.0], 16.0, false);
    // divider at x 240..272 with a 64 unit gap at y 0..64
    brushes.push(box_brush([240.0, 64.0, 0.0], [272.0, 256.0, 128.0], "wall"));
    // baffle in front of the gap
    brushes.push(box_brush([176.0, 0.0, 0.0], [208.0, 160.0, 128.0], "wall"));
    let map = write_map(
        dir,
        "hall",
        &map_text(&brushes, &point_entity("info_player_start", [64.0, 200.0, 40.0], &[])),
    );
    run_csg(&map, &CsgOptions::default()).unwrap();
    run_bsp(&map, &BspOptions::default()).unwrap();
    map
}

#[test]
fn fast_vis_contains_full_vis_and_rows_are_symmetric() {
    let dir = tempfile::tempdir().unwrap();
    let map = compiled_hall(dir.path());
    let prt_path = map.with_extension("prt");
    let prt = PortalFile::read(&prt_path).unwrap();
    assert!(prt.num_leafs > 2);

    let options = VisOptions {
        threads: 2,
        ..VisOptions::default()
    };
    let full = VisContext::new(&prt, &prt_path, options.clone())
        .unwrap()
        .leaf_vis()
        .unwrap();
    let fast = VisContext::new(
        &prt,
        &prt_path,
        VisOptions {
            fast: true,
            ..options
        },
    )
    .unwrap()
    .leaf_vis()
    .unwrap();

    assert_eq!(full.len(), prt.num_leafs);
    for (a, row) in full.iter().enumerate() {
        assert!(row.get(a), "leaf {a} must see itself");
        assert!(row.is_subset(&fast[a]), "full vis of leaf {a} exceeds fast vis");
        for b in row.ones() {
            assert!(full[b].get(a), "{a} sees {b} but not back");
        }
    }
    // neighbours through a portal always see each other
    for p in &prt.portals {
        assert!(full[p.leafs[0]].get(p.leafs[1]));
    }
}

/// A wall-high portal from `a` to `b` (x, y), facing `leafs[0]` on the side
/// of `toward`.
fn wall_portal(a: [f64; 2], b: [f64; 2], leafs: [usize; 2], toward: Vector3<f64>) -> PortalRecord {
    let winding = Winding::new(vec![
        Point3::new(a[0], a[1], 0.0),
        Point3::new(b[0], b[1], 0.0),
        Point3::new(b[0], b[1], 64.0),
        Point3::new(a[0], a[1], 64.0),
    ]);
    let facing = winding.plane().unwrap().normal.dot(&toward);
    PortalRecord {
        winding: if facing < 0.0 { winding.reversed() } else { winding },
        leafs,
    }
}

fn rows(prt: &PortalFile, fast: bool, max_distance: Option<f64>) -> Vec<PortalBits> {
    let options = VisOptions {
        threads: 2,
        fast,
        max_distance,
    };
    VisContext::new(prt, Path::new("graph.prt"), options)
        .unwrap()
        .leaf_vis()
        .unwrap()
}

fn assert_fast_contains_full(fast: &[PortalBits], full: &[PortalBits]) {
    for (a, row) in full.iter().enumerate() {
        assert!(row.is_subset(&fast[a]), "full vis of leaf {a} exceeds fast vis");
    }
}

#[test]
fn full_vis_hides_the_room_around_a_corner() {
    // 0 | 1 : 1 turns north into 2 through a door at its east end, 2 leads
    // north into 3 through a door at its west end. No line passes through
    // all three doors.
    let prt = PortalFile {
        num_leafs: 4,
        portals: vec![
            wall_portal([0.0, 0.0], [0.0, 32.0], [0, 1], -Vector3::x()),
            wall_portal([96.0, 128.0], [128.0, 128.0], [1, 2], -Vector3::y()),
            wall_portal([0.0, 256.0], [32.0, 256.0], [2, 3], -Vector3::y()),
        ],
        leaf_counts: vec![1; 4],
    };
    let fast = rows(&prt, true, None);
    let full = rows(&prt, false, None);
    assert_fast_contains_full(&fast, &full);

    assert!(fast[0].get(3), "base vis cannot rule out the far room");
    assert!(full[0].get(1) && full[0].get(2));
    assert!(!full[0].get(3) && !full[3].get(0));
}

#[test]
fn max_distance_drops_far_leafs_in_both_modes() {
    // four rooms in a row, doors 256 apart
    let prt = PortalFile {
        num_leafs: 4,
        portals: (0..3)
            .map(|i| {
                let x = 256.0 * i as f64;
                wall_portal([x, 0.0], [x, 64.0], [i, i + 1], -Vector3::x())
            })
            .collect(),
        leaf_counts: vec![1; 4],
    };
    let unlimited = rows(&prt, false, None);
    assert!(unlimited[0].get(3));

    // the first and last doors are 512 apart, neighbouring doors 256
    let fast = rows(&prt, true, Some(200.0));
    let full = rows(&prt, false, Some(200.0));
    assert_fast_contains_full(&fast, &full);
    for vis in [&fast, &full] {
        assert!(vis[0].get(1) && vis[0].get(2));
        assert!(!vis[0].get(3) && !vis[3].get(0));
    }
}

#[test]
fn vis_stage_fills_every_leaf_row() {
    let dir = tempfile::tempdir().unwrap();
    let map = compiled_hall(dir.path());
    run_vis(&map, &VisOptions::default()).unwrap();

    let bsp = BspFile::read(&map.with_extension("bsp")).unwrap();
    let visleafs = bsp.models[0].visleafs as usize;
    assert!(!bsp.visibility.is_empty());
    assert_eq!(bsp.leafs[0].visofs, -1);
    for leaf in 1..=visleafs {
        let ofs = bsp.leafs[leaf].visofs;
        assert!(ofs >= 0);
        let row = decompress_row(&bsp.visibility[ofs as usize..], visleafs.div_ceil(8)).unwrap();
        let bit = leaf - 1;
        assert!(row[bit / 8] & (1 << (bit % 8)) != 0, "leaf {leaf} cannot see itself");
    }
}

#[test]
fn zero_runs_round_trip() {
    let mut row = vec![0u8; 700];
    row[0] = 0x81;
    row[300] = 0xff;
    row[699] = 1;
    let packed = compress_row(&row);
    assert!(packed.len() < 16);
    assert_eq!(decompress_row(&packed, row.len()).unwrap(), row);
    assert_eq!(decompress_row(&packed[..packed.len() - 1], row.len()), None);
}

#[test]
fn portal_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.prt");
    let square = |x: f64| {
        Winding::new(vec![
            Point3::new(x, 0.0, 0.0),
            Point3::new(x, 64.0, 0.0),
            Point3::new(x, 64.0, 64.0),
            Point3::new(x, 0.0, 64.0),
        ])
    };
    let prt = PortalFile {
        num_leafs: 3,
        portals: vec![
            PortalRecord {
                winding: square(64.0),
                leafs: [0, 1],
            },
            PortalRecord {
                winding: square(128.5),
                leafs: [1, 2],
            },
        ],
        leaf_counts: vec![1, 3, 1],
    };
    prt.write(&path).unwrap();
    assert_eq!(PortalFile::read(&path).unwrap(), prt);
}
