use std::path::PathBuf;

use nalgebra::{Isometry3, Vector3};
use optrace::geom::Shape;
use optrace::multilayer::Multilayer;
use optrace::output;
use optrace::ray::RayStatus;
use optrace::refractive_index::RefractiveIndex;
use optrace::role::{OpticalRole, Reflectance};
use optrace::scene::{SceneBuilder, WORLD};
use optrace::settings::{self, Settings};
use optrace::shooter;
use optrace::tracer::Tracer;
use optrace::transform::Euler;
use optrace::units::NM;
use std::sync::Arc;

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("optrace_io_{}_{}", std::process::id(), name))
}

#[test]
fn write_traced_rays_and_summary() {
    let mut b = SceneBuilder::new(Shape::new_box(1.0, 1.0, 1.0).unwrap());
    b.add_node(
        WORLD,
        "mirror",
        Shape::new_box(0.5, 0.5, 0.1).unwrap(),
        OpticalRole::Mirror(Reflectance::Constant(0.5)),
        Isometry3::identity(),
    )
    .unwrap();
    let settings = Settings {
        seed: Some(3),
        ..Default::default()
    };
    let tracer = Tracer::new(b.close().unwrap(), settings).unwrap();
    let placement = Euler::from_degrees(0.0, 180.0, 0.0).placement(Vector3::new(0.0, 0.0, 0.5));
    let rays = shooter::square(400.0 * NM, 0.2, 5, &placement).unwrap();
    let traced = tracer.trace_rays(rays).unwrap();
    let summary = Tracer::summary(&traced);
    assert_eq!(summary.total, 25);
    assert_eq!(summary.exited + summary.absorbed, 25);

    let summary_path = temp_path("summary.json");
    output::write_summary(&summary_path, &summary).unwrap();
    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&summary_path).unwrap()).unwrap();
    assert_eq!(value["total"], 25);
    assert_eq!(value["exited"], summary.exited);

    let rays_path = temp_path("rays.dat");
    output::write_rays(&rays_path, traced.iter()).unwrap();
    let text = std::fs::read_to_string(&rays_path).unwrap();
    let rows: Vec<&str> = text.lines().filter(|l| !l.starts_with('#')).collect();
    assert_eq!(rows.len(), summary.total_points);
    assert!(rows
        .iter()
        .all(|row| row.split_whitespace().count() == 7));
    let exited_rows = rows.iter().filter(|row| row.contains(" exited ")).count();
    assert_eq!(exited_rows, 3 * traced.count(RayStatus::Exited));

    std::fs::remove_file(summary_path).unwrap();
    std::fs::remove_file(rays_path).unwrap();
}

#[test]
fn write_coating_sweep() {
    let mut stack = Multilayer::new(
        Arc::new(RefractiveIndex::vacuum()),
        Arc::new(RefractiveIndex::constant(1.52, 0.0)),
    );
    stack
        .insert_layer(Arc::new(RefractiveIndex::constant(1.38, 0.0)), 100.0 * NM)
        .unwrap();
    let wavelengths: Vec<f64> = (0..11).map(|i| (400.0 + 30.0 * i as f64) * NM).collect();
    let results = stack.coherent_tmm_mixed_wavelengths(0.0, &wavelengths).unwrap();

    let path = temp_path("sweep.dat");
    output::write_tmm_sweep(&path, &wavelengths, &results).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().count(), 12);
    for row in text.lines().skip(1) {
        let fields: Vec<f64> = row
            .split_whitespace()
            .map(|f| f.parse().unwrap())
            .collect();
        assert_eq!(fields.len(), 4);
        assert!((fields[1] + fields[2] + fields[3] - 1.0).abs() < 1e-6);
    }
    std::fs::remove_file(path).unwrap();
}

#[test]
fn project_configuration() {
    let settings = settings::load_default_config().unwrap();
    assert_eq!(settings, Settings::default());
    assert_eq!(settings.limit, None);
    assert!(settings.multi_thread);

    let path = temp_path("local.toml");
    std::fs::write(&path, "limit = 1000\nseed = 7\nmulti_thread = false\n").unwrap();
    let custom = settings::load_config_file(&path, false).unwrap();
    assert_eq!(custom.limit, Some(1000));
    assert_eq!(custom.seed, Some(7));
    assert!(!custom.multi_thread);
    assert!(!custom.disable_fresnel_reflection);

    std::fs::write(&path, "max_threads = 0\n").unwrap();
    assert!(settings::load_config_file(&path, false).is_err());
    std::fs::remove_file(path).unwrap();
}
