mod support;

use hlcompile::geometry::PlaneTable;
use hlcompile::io::bspfile::{
    BspFile, DEdge, DFace, DLeaf, DModel, DPlane, DVertex, MipTex, TexInfo,
};
use hlcompile::io::entities::{parse_entities, write_entities};
use hlcompile::io::polyfile::{PolyRecord, PolyWriter, read_poly_file};
use hlcompile::map::load_map;
use hlcompile::map::texinfo::TexinfoTable;
use nalgebra::Point3;
use std::path::Path;

fn sample_bsp() -> BspFile {
    BspFile {
        entities: "{\n\"classname\" \"worldspawn\"\n}\n".into(),
        planes: vec![DPlane {
            normal: [0.0, 0.0, 1.0],
            dist: 64.0,
            kind: 2,
        }],
        textures: vec![MipTex::external("crate", 64, 64), MipTex::external("sky", 256, 128)],
        vertexes: vec![
            DVertex { point: [0.0, 0.0, 64.0] },
            DVertex { point: [0.0, 64.0, 64.0] },
            DVertex { point: [64.0, 64.0, 64.0] },
        ],
        visibility: vec![0xff, 0, 3],
        texinfo: vec![TexInfo {
            vecs: [[1.0, 0.0, 0.0, 0.0], [0.0, -1.0, 0.0, 0.0]],
            miptex: 0,
            flags: 0,
        }],
        faces: vec![DFace {
            planenum: 0,
            side: 1,
            firstedge: 0,
            numedges: 3,
            texinfo: 0,
            styles: [0, 255, 255, 255],
            lightofs: 0,
        }],
        lighting: vec![10, 20, 30, 40, 50],
        leafs: vec![
            DLeaf {
                contents: -2,
                visofs: -1,
                ..DLeaf::default()
            },
            DLeaf {
                contents: -1,
                visofs: 0,
                mins: [0, 0, 0],
                maxs: [64, 64, 64],
                firstmarksurface: 0,
                nummarksurfaces: 1,
                ambient_level: [0; 4],
            },
        ],
        marksurfaces: vec![0],
        edges: vec![DEdge { v: [0, 0] }, DEdge { v: [0, 1] }, DEdge { v: [1, 2] }],
        surfedges: vec![1, 2, -1],
        models: vec![DModel {
            mins: [0.0; 3],
            maxs: [64.0; 3],
            visleafs: 1,
            numfaces: 1,
            ..DModel::default()
        }],
        ..BspFile::default()
    }
}

#[test]
fn bsp_container_round_trip() {
    let bsp = sample_bsp();
    let bytes = bsp.to_bytes().unwrap();
    assert_eq!(&bytes[..4], &30i32.to_le_bytes());
    let back = BspFile::from_bytes(Path::new("sample.bsp"), &bytes).unwrap();
    assert_eq!(back, bsp);
}

#[test]
fn truncated_bsp_is_corrupt() {
    let bytes = sample_bsp().to_bytes().unwrap();
    assert!(BspFile::from_bytes(Path::new("short.bsp"), &bytes[..32]).is_err());
    let mut wrong = bytes.clone();
    wrong[0] = 29;
    assert!(BspFile::from_bytes(Path::new("old.bsp"), &wrong).is_err());
}

#[test]
fn entity_text_round_trip() {
    let text = "{\n\"classname\" \"worldspawn\"\n\"message\" \"two words\"\n}\n{\n\"classname\" \"info_player_start\"\n\"origin\" \"1 2 3\"\n}\n";
    let entities = parse_entities(text).unwrap();
    assert_eq!(write_entities(&entities), text);
    assert_eq!(entities[1].origin(), Some(Point3::new(1.0, 2.0, 3.0)));
}

#[test]
fn face_file_keeps_models_apart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.p0");
    let record = PolyRecord {
        detail_level: 0,
        planenum: 4,
        texinfo: 2,
        contents: -1,
        winding: hlcompile::geometry::Winding::new(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0, 64.0, 0.0),
            Point3::new(64.0, 64.0, 0.0),
        ]),
    };
    let mut writer = PolyWriter::create(&path).unwrap();
    writer.write_face(&record).unwrap();
    writer.end_model().unwrap();
    writer.end_model().unwrap();
    writer.finish().unwrap();

    let models = read_poly_file(&path).unwrap();
    assert_eq!(models.len(), 2);
    assert_eq!(models[0], vec![record]);
    assert!(models[1].is_empty());
}

#[test]
fn map_loads_both_texture_formats() {
    let text = r#"
// comment before the world
{
"classname" "worldspawn"
"mapversion" "220"
{
( 0 0 64 ) ( 0 64 64 ) ( 64 64 64 ) CRATE [ 1 0 0 0 ] [ 0 -1 0 0 ] 0 1 1
( 0 0 0 ) ( 64 0 0 ) ( 64 64 0 ) CRATE 0 0 0 1 1
( 0 0 64 ) ( 0 0 0 ) ( 0 64 0 ) CRATE [ 0 1 0 0 ] [ 0 0 -1 0 ] 0 1 1
( 64 64 0 ) ( 64 0 0 ) ( 64 0 64 ) CRATE 0 0 0 1 1
( 64 0 0 ) ( 0 0 0 ) ( 0 0 64 ) CRATE 0 0 0 1 1
( 0 64 64 ) ( 0 64 0 ) ( 64 64 0 ) CRATE 0 0 0 1 1
}
}
{
"classname" "func_detail"
{
( 16 16 80 ) ( 16 48 80 ) ( 48 48 80 ) CRATE 0 0 0 1 1
( 16 16 64 ) ( 48 16 64 ) ( 48 48 64 ) CRATE 0 0 0 1 1
( 16 16 80 ) ( 16 16 64 ) ( 16 48 64 ) CRATE 0 0 0 1 1
( 48 48 64 ) ( 48 16 64 ) ( 48 16 80 ) CRATE 0 0 0 1 1
( 48 16 64 ) ( 16 16 64 ) ( 16 16 80 ) CRATE 0 0 0 1 1
( 16 48 80 ) ( 16 48 64 ) ( 48 48 64 ) CRATE 0 0 0 1 1
}
}
"#;
    let mut planes = PlaneTable::new();
    let texinfo = TexinfoTable::new();
    let map = load_map(text, 0, &mut planes, &texinfo).unwrap();
    // func_detail folds into the world
    assert_eq!(map.models.len(), 1);
    assert_eq!(map.entities.len(), 1);
    assert_eq!(map.brushes.len(), 2);
    assert_eq!(map.brushes[0].sides.len(), 6);
    assert_eq!(map.brushes.iter().map(|b| b.detail_level).max(), Some(1));
    assert!(!texinfo.is_empty());
    for b in &map.brushes {
        for s in &b.sides {
            assert!(s.planenum < planes.len());
        }
    }
}
