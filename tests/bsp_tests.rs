mod support;

use hlcompile::bsp::node::NodeKind;
use hlcompile::bsp::{BspContext, BspOptions, run_bsp};
use hlcompile::contents::Contents;
use hlcompile::csg::{CsgOptions, run_csg};
use hlcompile::errors::CompileError;
use hlcompile::float_types::tolerance;
use hlcompile::geometry::Plane;
use hlcompile::geometry::winding::brush_windings;
use hlcompile::io::bspfile::BspFile;
use hlcompile::io::pointfile::read_pointfile;
use hlcompile::io::portalfile::PortalFile;
use nalgebra::Vector3;
use support::{box_brush, lit_room, map_text, point_entity, room_brushes, write_map};

fn csg_options() -> CsgOptions {
    CsgOptions {
        threads: 2,
        ..CsgOptions::default()
    }
}

#[test]
fn leaf_regions_match_leaf_bounds() {
    let dir = tempfile::tempdir().unwrap();
    let mut brushes = room_brushes([0.0; 3], [256.0; 3], 16.0, false);
    brushes.push(box_brush([96.0, 96.0, 0.0], [160.0, 160.0, 128.0], "pillar"));
    let map = write_map(
        dir.path(),
        "pillar",
        &map_text(&brushes, &point_entity("info_player_start", [32.0, 32.0, 64.0], &[])),
    );
    run_csg(&map, &csg_options()).unwrap();

    let mut context = BspContext::load(&map, BspOptions::default()).unwrap();
    let tree = context.build_hull(0, 0).unwrap();
    let root = tree.node(tree.root).bounds;

    let mut leafs = 0;
    for (id, node) in tree.nodes.iter().enumerate() {
        if node.as_leaf().is_none() {
            continue;
        }
        leafs += 1;
        // the root box and every ancestor half-space
        let mut planes = Vec::new();
        for axis in 0..3 {
            let mut n = Vector3::zeros();
            n[axis] = 1.0;
            planes.push(Plane::new(n, root.maxs[axis]));
            planes.push(Plane::new(-n, -root.mins[axis]));
        }
        let mut child = id;
        while let Some(parent) = tree.node(child).parent {
            if let NodeKind::Decision { planenum, children } = &tree.node(parent).kind {
                let plane = *context.planes.get(*planenum);
                planes.push(if children[0] == child { plane.flipped() } else { plane });
            }
            child = parent;
        }

        let sides: Vec<_> = brush_windings(&planes, tolerance()).into_iter().flatten().collect();
        assert!(sides.len() >= 4, "leaf {id} has an empty region");
        let mut region = hlcompile::aabb::Aabb::cleared();
        for w in &sides {
            region.add_box(&w.bounds());
        }
        assert!((region.mins - node.bounds.mins).norm() < 0.1, "leaf {id}");
        assert!((region.maxs - node.bounds.maxs).norm() < 0.1, "leaf {id}");
    }
    assert!(leafs > 6);
}

#[test]
fn sealed_room_writes_portals_and_bsp() {
    let dir = tempfile::tempdir().unwrap();
    let map = write_map(dir.path(), "room", &lit_room());
    run_csg(&map, &csg_options()).unwrap();
    run_bsp(&map, &BspOptions::default()).unwrap();

    assert!(!map.with_extension("pts").exists());
    let prt = PortalFile::read(&map.with_extension("prt")).unwrap();
    assert_eq!(prt.leaf_counts.len(), prt.num_leafs);

    let bsp = BspFile::read(&map.with_extension("bsp")).unwrap();
    let world = &bsp.models[0];
    assert_eq!(world.visleafs as usize, prt.leaf_counts.iter().sum::<usize>());
    assert_eq!(bsp.leafs[0].contents, Contents::Solid.code());
    // the inside of six walls
    assert!(world.numfaces >= 6);
    assert!(bsp.faces.iter().all(|f| f.planenum % 2 == 0 && (f.side == 0 || f.side == 1)));
    assert!(bsp.nodes.iter().all(|n| n.planenum % 2 == 0));
    // plane p ^ 1 is the exact negation of p
    assert_eq!(bsp.planes.len() % 2, 0);
    for pair in bsp.planes.chunks(2) {
        assert_eq!(pair[1].normal, pair[0].normal.map(|c| -c));
        assert_eq!(pair[1].dist, -pair[0].dist);
        assert_eq!(pair[1].kind, pair[0].kind);
    }
    assert_eq!(bsp.edges[0].v, [0, 0]);
    // hulls 1-3 have clipnodes
    assert!(world.headnode[1..].iter().all(|&h| h >= 0));
    assert!(!bsp.clipnodes.is_empty());
}

#[test]
fn open_room_leaks() {
    let dir = tempfile::tempdir().unwrap();
    let map = write_map(
        dir.path(),
        "open",
        &map_text(
            &room_brushes([0.0; 3], [256.0; 3], 16.0, true),
            &point_entity("info_player_start", [128.0, 128.0, 64.0], &[]),
        ),
    );
    run_csg(&map, &csg_options()).unwrap();
    let err = run_bsp(&map, &BspOptions::default()).unwrap_err();
    match err {
        CompileError::Leak {
            classname,
            pointfile,
            ..
        } => {
            assert_eq!(classname, "info_player_start");
            assert!(!read_pointfile(&pointfile).unwrap().is_empty());
        },
        other => panic!("expected a leak, got {other}"),
    }
    assert!(!map.with_extension("prt").exists());
}

#[test]
fn leak_only_still_writes_the_bsp() {
    let dir = tempfile::tempdir().unwrap();
    let map = write_map(
        dir.path(),
        "open",
        &map_text(
            &room_brushes([0.0; 3], [256.0; 3], 16.0, true),
            &point_entity("info_player_start", [128.0, 128.0, 64.0], &[]),
        ),
    );
    run_csg(&map, &csg_options()).unwrap();
    let options = BspOptions {
        leak_only: true,
        ..BspOptions::default()
    };
    run_bsp(&map, &options).unwrap();
    assert!(map.with_extension("pts").exists());
    assert!(map.with_extension("bsp").exists());
    assert!(!map.with_extension("prt").exists());
}
