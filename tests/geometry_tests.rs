mod support;

use hlcompile::float_types::{PI, Real, tolerance};
use hlcompile::geometry::{Plane, PlaneTable, Winding};
use hlcompile::io::planefile::{read_planes, write_planes};
use nalgebra::{Point3, Vector3};
use proptest::prelude::*;
use support::approx_eq;

fn square(size: Real) -> Winding {
    // clockwise seen from +z
    Winding::new(vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(0.0, size, 0.0),
        Point3::new(size, size, 0.0),
        Point3::new(size, 0.0, 0.0),
    ])
}

#[test]
fn plane_pairs_negate_exactly() {
    let mut table = PlaneTable::new();
    let normals = [
        Vector3::new(1.0, 0.0, 0.0),
        Vector3::new(0.0, -1.0, 0.0),
        Vector3::new(0.3, 0.4, -0.8),
        Vector3::new(-2.0, 1.0, 5.0),
    ];
    for (i, n) in normals.iter().enumerate() {
        let p = table.find_or_insert(*n, 10.0 * i as Real - 7.0).unwrap();
        let a = table.get(p);
        let b = table.get(p ^ 1);
        assert_eq!(a.normal, -b.normal);
        assert_eq!(a.dist, -b.dist);
        // the same plane flipped comes back as the partner
        assert_eq!(table.find_or_insert(-*n, -(10.0 * i as Real - 7.0)).unwrap(), p ^ 1);
    }
    assert_eq!(table.len(), 2 * normals.len());
}

#[test]
fn plane_file_round_trip_is_bit_identical() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.pln");
    let mut table = PlaneTable::new();
    table.find_or_insert(Vector3::new(0.1, 0.7, 0.3), 123.456).unwrap();
    table.find_or_insert(Vector3::z(), -64.0).unwrap();
    write_planes(&path, table.as_slice()).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(bytes.len(), 40 * table.len());
    let back = read_planes(&path).unwrap();
    assert_eq!(back.len(), table.len());
    for (a, b) in back.iter().zip(table.as_slice()) {
        assert_eq!(a.normal.x.to_bits(), b.normal.x.to_bits());
        assert_eq!(a.normal.y.to_bits(), b.normal.y.to_bits());
        assert_eq!(a.normal.z.to_bits(), b.normal.z.to_bits());
        assert_eq!(a.dist.to_bits(), b.dist.to_bits());
        assert_eq!(a.kind, b.kind);
    }
}

#[test]
fn split_keeps_area() {
    let w = square(64.0);
    let (front, back) = w.split(&Plane::new(Vector3::x(), 16.0), tolerance());
    let (front, back) = (front.unwrap(), back.unwrap());
    assert!(approx_eq(front.area(), 48.0 * 64.0, 1e-6));
    assert!(approx_eq(back.area(), 16.0 * 64.0, 1e-6));
}

proptest! {
    #[test]
    fn clipped_windings_stay_on_plane_and_convex(
        angle in 0.0..(2.0 * PI),
        offset in -40.0..40.0f64,
        keep_front in any::<bool>(),
    ) {
        let w = square(64.0);
        let face = w.plane().unwrap();
        let normal = Vector3::new(angle.cos(), angle.sin(), 0.0);
        let centre = Point3::new(32.0, 32.0, 0.0);
        let mut plane = Plane::new(normal, normal.dot(&centre.coords) + offset as Real);
        if !keep_front {
            plane.flip();
        }
        if let Some(clipped) = w.clip(&plane, tolerance(), false) {
            prop_assert!(clipped.is_convex_on(&face, 1e-6));
            prop_assert!(clipped.area() <= w.area() + 1e-6);
            for p in &clipped.points {
                prop_assert!(plane.distance_to(p) > -1e-6);
            }
        }
    }
}
