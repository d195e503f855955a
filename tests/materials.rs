use std::path::PathBuf;
use std::sync::Arc;

use nalgebra::{Isometry3, Point3, Vector3};
use optrace::catalog::{self, GlassCatalog};
use optrace::geom::{Mesh, Shape};
use optrace::multilayer::Multilayer;
use optrace::ray::{Ray, RayStatus};
use optrace::refractive_index::{AbsorptionLength, RefractiveIndex, LINE_D};
use optrace::role::{Lens, OpticalRole};
use optrace::scene::{SceneBuilder, WORLD};
use optrace::settings::Settings;
use optrace::surface::SurfaceCondition;
use optrace::tracer::Tracer;
use optrace::units::{NM, UM};

fn data(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/data")
        .join(name)
}

#[test]
fn refractiveindex_info_file() {
    let silica = catalog::refractiveindex_info_from_file(data("fused_silica.csv")).unwrap();
    assert!((silica.refractive_index(450.0 * NM) - 1.4662).abs() < 1e-9);
    // clamped outside the table
    assert!((silica.refractive_index(300.0 * NM) - 1.4701).abs() < 1e-12);
    assert!((silica.refractive_index(1.0 * UM) - 1.4533).abs() < 1e-12);
    assert_eq!(silica.extinction_coefficient(500.0 * NM), 0.0);
    assert!(silica.absorption_length(500.0 * NM).is_infinite());
}

#[test]
fn filmetrics_file_with_bom_and_crlf() {
    let silicon = catalog::filmetrics_from_file(data("silicon_filmetrics.txt")).unwrap();
    assert!((silicon.refractive_index(450.0 * NM) - 4.934).abs() < 1e-9);
    assert!((silicon.extinction_coefficient(450.0 * NM) - 0.23).abs() < 1e-9);
    let n = silicon.complex_refractive_index(400.0 * NM);
    assert!((n.re - 5.57).abs() < 1e-12 && (n.im - 0.387).abs() < 1e-12);
}

#[test]
fn glass_catalog_file() {
    let glasses = GlassCatalog::from_file(data("glass.cat")).unwrap();
    assert_eq!(glasses.len(), 4);

    let f2 = glasses.get("F2").unwrap();
    assert!((f2.refractive_index(LINE_D) - 1.62004).abs() < 1e-5);
    assert!((f2.abbe_number() - 36.37).abs() < 0.05, "vd: {}", f2.abbe_number());

    let acrylic = glasses.get("ACRYLIC").unwrap();
    assert!((acrylic.refractive_index(500.0 * NM) - 1.4993).abs() < 1e-9);

    let bk7 = glasses.get("N-BK7").unwrap();
    let schott = glasses.get("BK7-SCHOTT").unwrap();
    assert!((bk7.refractive_index(LINE_D) - schott.refractive_index(LINE_D)).abs() < 1e-4);
}

#[test]
fn mesh_volume_in_scene() {
    let cube = Mesh::from_obj(data("cube.obj")).unwrap();
    let mut b = SceneBuilder::new(Shape::new_box(5.0, 5.0, 5.0).unwrap());
    let stop = b
        .add_node(WORLD, "cube", Shape::Mesh(cube), OpticalRole::Obscuration, Isometry3::identity())
        .unwrap();
    let scene = b.close().unwrap();
    assert_eq!(scene.locate(&Point3::new(0.5, -0.5, 0.5)), Some(stop));
    assert_eq!(scene.locate(&Point3::new(1.5, 0.0, 0.0)), Some(WORLD));

    let tracer = Tracer::new(scene, Settings::default()).unwrap();
    let mut ray = Ray::new(0, 500.0 * NM, Point3::new(0.2, 0.3, 3.0), -Vector3::z(), 0.0);
    tracer.trace_ray(&mut ray);
    assert_eq!(ray.status(), RayStatus::Stopped);
    assert!((ray.position().z - 1.0).abs() < 1e-9);
    assert_eq!(ray.history().last().map(|v| v.node), Some(stop));
}

/// Reflected fraction off an absorbing glass block, optionally coated.
fn reflected_fraction(coating: Option<Multilayer>, n: usize) -> f64 {
    let glass = Arc::new(RefractiveIndex::constant(1.52, 0.0));
    let mut b = SceneBuilder::new(Shape::new_box(1.0, 1.0, 1.0).unwrap());
    let lens = Lens::new(glass).with_absorption_length(AbsorptionLength::Constant(1.0 * UM));
    let block = b
        .add_node(WORLD, "block", Shape::new_box(0.5, 0.5, 0.5).unwrap(), OpticalRole::Lens(lens), Isometry3::identity())
        .unwrap();
    if let Some(stack) = coating {
        b.add_surface_condition(WORLD, block, SurfaceCondition::new().with_multilayer(Arc::new(stack)))
            .unwrap();
    }
    let settings = Settings {
        seed: Some(21),
        ..Default::default()
    };
    let tracer = Tracer::new(b.close().unwrap(), settings).unwrap();
    let rays = (0..n)
        .map(|i| Ray::new(i, 550.0 * NM, Point3::new(0.0, 0.0, 0.9), -Vector3::z(), 0.0))
        .collect();
    let traced = tracer.trace_rays(rays).unwrap();
    traced.count(RayStatus::Exited) as f64 / n as f64
}

#[test]
fn antireflection_coating_on_border() {
    let _ = env_logger::builder().is_test(true).try_init();
    let n = 20000;
    let mut stack = Multilayer::new(
        Arc::new(RefractiveIndex::vacuum()),
        Arc::new(RefractiveIndex::constant(1.52, 0.0)),
    );
    stack
        .insert_layer(Arc::new(RefractiveIndex::constant(1.38, 0.0)), 550.0 * NM / (4.0 * 1.38))
        .unwrap();

    let bare = reflected_fraction(None, n);
    let coated = reflected_fraction(Some(stack), n);

    let r_bare: f64 = ((1.52 - 1.0) / (1.52 + 1.0_f64)).powi(2);
    let r_coated: f64 = ((1.52 - 1.38 * 1.38) / (1.52 + 1.38 * 1.38_f64)).powi(2);
    let tol = |p: f64| 4.0 * (p * (1.0 - p) / n as f64).sqrt();
    assert!((bare - r_bare).abs() < tol(r_bare), "bare: {}", bare);
    assert!((coated - r_coated).abs() < tol(r_coated), "coated: {}", coated);
}
