//! Non-sequential tracing of rays through a closed [`Scene`].
//!
//! Each running ray is stepped from boundary to boundary. At every crossing
//! the volume on the far side decides what happens: obscurations stop the
//! ray, focal surfaces detect it, mirrors reflect or absorb it and refractive
//! volumes reflect, refract or absorb it. Bulk absorption is sampled along
//! every segment inside an absorbing lens.
//!
//! Rays are independent. Each one draws from its own generator, seeded from
//! the configured seed and the ray id, so parallel and sequential runs with
//! the same seed give identical results.

use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, trace, warn};
use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::error::{Result, TraceError};
use crate::ray::{Ray, RayCollection, RayStatus};
use crate::role::OpticalRole;
use crate::scene::{NodeId, Scene};
use crate::settings::{Settings, NUDGE_DISTANCE};
use crate::summary::TraceSummary;
use crate::surface::{self, Outcome};
use crate::units::SPEED_OF_LIGHT;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Shape;
    use crate::role::{FocalSurface, Lens, Reflectance};
    use crate::scene::{SceneBuilder, WORLD};
    use crate::transform::translation;
    use crate::units::{MM, NM};
    use nalgebra::{Isometry3, Point3};
    use std::sync::Arc;

    fn world() -> SceneBuilder {
        SceneBuilder::new(Shape::new_box(1.0, 1.0, 1.0).unwrap())
    }

    fn seeded(limit: Option<usize>) -> Settings {
        Settings {
            limit,
            seed: Some(11),
            ..Default::default()
        }
    }

    #[test]
    fn empty_world_exits() {
        let tracer = Tracer::new(world().close().unwrap(), seeded(None)).unwrap();
        let mut ray = Ray::new(0, 400.0 * NM, Point3::origin(), Vector3::z(), 0.0);
        tracer.trace_ray(&mut ray);
        assert_eq!(ray.status(), RayStatus::Exited);
        assert_eq!(ray.num_points(), 2);
        assert!((ray.position().z - 1.0).abs() < 1e-12);
        assert!((ray.time() - 1.0 / SPEED_OF_LIGHT).abs() < 1e-20);
    }

    #[test]
    fn ray_outside_world_exits_immediately() {
        let tracer = Tracer::new(world().close().unwrap(), seeded(None)).unwrap();
        let mut ray = Ray::new(0, 400.0 * NM, Point3::new(0.0, 0.0, 5.0), Vector3::z(), 0.0);
        tracer.trace_ray(&mut ray);
        assert_eq!(ray.status(), RayStatus::Exited);
        assert_eq!(ray.num_points(), 1);
    }

    #[test]
    fn obscuration_and_focal_surface() {
        let mut b = world();
        let stop = b
            .add_node(WORLD, "stop", Shape::new_box(0.5, 0.5, 0.1).unwrap(), OpticalRole::Obscuration, translation(0.5, 0.0, 0.0))
            .unwrap();
        let focal = b
            .add_node(
                WORLD,
                "focal",
                Shape::new_box(0.2, 0.5, 0.1).unwrap(),
                OpticalRole::FocalSurface(FocalSurface::new()),
                translation(-0.5, 0.0, 0.0),
            )
            .unwrap();
        let tracer = Tracer::new(b.close().unwrap(), seeded(None)).unwrap();

        let mut ray = Ray::new(0, 400.0 * NM, Point3::new(0.5, 0.0, 0.5), -Vector3::z(), 0.0);
        tracer.trace_ray(&mut ray);
        assert_eq!(ray.status(), RayStatus::Stopped);
        assert_eq!(ray.history().last().map(|v| v.node), Some(stop));

        let mut ray = Ray::new(1, 400.0 * NM, Point3::new(-0.5, 0.0, 0.5), -Vector3::z(), 0.0);
        tracer.trace_ray(&mut ray);
        assert_eq!(ray.status(), RayStatus::Focused);
        assert_eq!(ray.find_node_starting_with("/world/focal").map(|v| v.node), Some(focal));
        assert!((ray.position().z - 0.1).abs() < 1e-12);
    }

    #[test]
    fn mirror_cavity_is_suspended_at_limit() {
        let mut b = world();
        b.add_node(
            WORLD,
            "cavity",
            Shape::new_sphere(0.1, 0.2).unwrap(),
            OpticalRole::Mirror(Reflectance::default()),
            Isometry3::identity(),
        )
        .unwrap();
        let tracer = Tracer::new(b.close().unwrap(), seeded(Some(1000))).unwrap();
        let mut ray = Ray::new(0, 400.0 * NM, Point3::origin(), -Vector3::z(), 0.0);
        tracer.trace_ray(&mut ray);
        assert_eq!(ray.status(), RayStatus::Suspended);
        assert_eq!(ray.num_points(), 1000);
    }

    #[test]
    fn refraction_into_lens() {
        let mut b = world();
        let index = Arc::new(crate::refractive_index::RefractiveIndex::constant(1.5, 0.0));
        let lens = b
            .add_node(WORLD, "lens", Shape::new_box(0.5, 0.5, 1.0 * MM).unwrap(), OpticalRole::Lens(Lens::new(index)), Isometry3::identity())
            .unwrap();
        b.add_node(
            lens,
            "focal",
            Shape::new_box(0.5, 0.5, 0.1 * MM).unwrap(),
            OpticalRole::FocalSurface(FocalSurface::new()),
            translation(0.0, 0.0, -0.9 * MM),
        )
        .unwrap();
        let settings = Settings {
            disable_fresnel_reflection: true,
            ..seeded(None)
        };
        let tracer = Tracer::new(b.close().unwrap(), settings).unwrap();
        let theta = 30f64.to_radians();
        let mut ray = Ray::new(
            0,
            400.0 * NM,
            Point3::new(0.0, 0.0, 2.0 * MM),
            Vector3::new(theta.sin(), 0.0, -theta.cos()),
            0.0,
        );
        tracer.trace_ray(&mut ray);
        assert_eq!(ray.status(), RayStatus::Focused);
        assert!((ray.direction().x - theta.sin() / 1.5).abs() < 1e-9);
        assert!(ray.direction().y.abs() < 1e-12);
        assert_eq!(ray.count_nodes_starting_with("/world/lens"), 2);
    }

    #[test]
    fn parallel_matches_sequential() {
        let mut b = world();
        let index = Arc::new(crate::refractive_index::RefractiveIndex::constant(1.5, 0.0));
        b.add_node(WORLD, "lens", Shape::new_sphere(0.0, 0.3).unwrap(), OpticalRole::Lens(Lens::new(index)), Isometry3::identity())
            .unwrap();
        let scene = b.close().unwrap();
        let rays: Vec<Ray> = (0..200)
            .map(|i| {
                let x = -0.25 + 0.5 * i as f64 / 200.0;
                Ray::new(i, 400.0 * NM, Point3::new(x, 0.0, 0.9), -Vector3::z(), 0.0)
            })
            .collect();

        let parallel = Tracer::new(scene.clone(), seeded(None)).unwrap();
        let sequential = Tracer::new(
            scene,
            Settings {
                multi_thread: false,
                ..seeded(None)
            },
        )
        .unwrap();
        let a = parallel.trace_rays(rays.clone()).unwrap();
        let b = sequential.trace_rays(rays).unwrap();
        for status in RayStatus::ALL {
            assert_eq!(a.get(status), b.get(status));
        }
        assert_eq!(Tracer::summary(&a).unaccounted(), 0);
        assert_eq!(Tracer::summary(&a).running, 0);
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let settings = Settings {
            max_threads: Some(0),
            ..Default::default()
        };
        assert!(Tracer::new(world().close().unwrap(), settings).is_err());
    }
}

/// Traces rays through a scene with fixed settings.
#[derive(Debug, Clone)]
pub struct Tracer {
    scene: Scene,
    settings: Settings,
}

/// What a single step did to the ray.
enum Step {
    Continue(NodeId),
    Done(RayStatus),
}

impl Tracer {
    pub fn new(scene: Scene, settings: Settings) -> Result<Self> {
        settings.validate()?;
        Ok(Self { scene, settings })
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn summary(rays: &RayCollection) -> TraceSummary {
        TraceSummary::from_rays(rays)
    }

    /// Generator for one ray: seeded from the settings and the ray id, or
    /// from the operating system when no seed is set.
    pub fn rng_for(&self, ray_id: usize) -> StdRng {
        match self.settings.seed {
            Some(seed) => StdRng::seed_from_u64(ray_seed(seed, ray_id as u64)),
            None => StdRng::from_os_rng(),
        }
    }

    /// Traces one ray with its own generator.
    pub fn trace_ray(&self, ray: &mut Ray) {
        let mut rng = self.rng_for(ray.id());
        self.trace(ray, &mut rng);
    }

    /// Traces every ray and collects them by final status. Order within a
    /// partition follows the input order.
    pub fn trace_rays(&self, rays: Vec<Ray>) -> Result<RayCollection> {
        let start = Instant::now();
        let n = rays.len();
        let pb = self.progress_bar(n)?;

        let traced: Vec<Ray> = if self.settings.multi_thread {
            let mut pool = rayon::ThreadPoolBuilder::new();
            if let Some(threads) = self.settings.max_threads {
                pool = pool.num_threads(threads);
            }
            let pool = pool.build().map_err(|e| {
                TraceError::Configuration(format!("failed to build thread pool: {}", e))
            })?;
            pool.install(|| {
                rays.into_par_iter()
                    .map(|mut ray| {
                        self.trace_ray(&mut ray);
                        pb.inc(1);
                        ray
                    })
                    .collect()
            })
        } else {
            rays.into_iter()
                .map(|mut ray| {
                    self.trace_ray(&mut ray);
                    pb.inc(1);
                    ray
                })
                .collect()
        };
        pb.finish_and_clear();

        let collection: RayCollection = traced.into_iter().collect();
        let duration = start.elapsed();
        debug!(
            "traced {} rays in {:.2?}: {:?}",
            n,
            duration,
            Self::summary(&collection)
        );
        Ok(collection)
    }

    /// Traces the running rays of a collection in place.
    pub fn trace_all(&self, rays: &mut RayCollection) -> Result<()> {
        let running = rays.take(RayStatus::Running);
        let traced = self.trace_rays(running)?;
        rays.merge(traced);
        Ok(())
    }

    fn progress_bar(&self, n: usize) -> Result<ProgressBar> {
        if !self.settings.progress {
            return Ok(ProgressBar::hidden());
        }
        let pb = ProgressBar::new(n as u64);
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] {bar:40.green/blue} {pos:>5}/{len:5} {msg} ETA: {eta_precise}",
            )
            .map_err(|e| TraceError::Configuration(format!("bad progress template: {}", e)))?
            .progress_chars("█▇▆▅▄▃▂▁"),
        );
        pb.set_message("rays".to_string());
        Ok(pb)
    }

    /// Traces a running ray until it reaches a terminal status.
    pub fn trace<R: Rng + ?Sized>(&self, ray: &mut Ray, rng: &mut R) {
        if !ray.is_running() {
            return;
        }
        let limit = self.settings.limit.unwrap_or(usize::MAX);

        let Some(mut current) = self.scene.locate(ray.position()) else {
            ray.set_status(RayStatus::Exited);
            return;
        };
        ray.visit(current, self.scene.path(current));
        if self.scene.nodes()[current].role.is_terminal() {
            ray.set_status(RayStatus::Stopped);
            return;
        }

        loop {
            if ray.num_points() >= limit {
                ray.set_status(RayStatus::Suspended);
                return;
            }
            match self.step(ray, current, rng) {
                Ok(Step::Continue(next)) => current = next,
                Ok(Step::Done(status)) => {
                    ray.set_status(status);
                    return;
                }
                Err(e) => {
                    warn!("ray {} suspended: {}", ray.id(), e);
                    ray.set_status(RayStatus::Suspended);
                    return;
                }
            }
        }
    }

    /// Moves the ray to the next crossing and resolves it.
    fn step<R: Rng + ?Sized>(&self, ray: &mut Ray, current: NodeId, rng: &mut R) -> Result<Step> {
        let node = &self.scene.nodes()[current];
        let wavelength = ray.wavelength();
        let d = *ray.direction();
        let p = *ray.position();

        let n_current = node.role.medium_index(wavelength).ok_or_else(|| {
            TraceError::Numerical(format!("ray inside terminal volume {}", node.path))
        })?;
        let (distance, normal) = self.scene.nearest_crossing(current, &p, &d).ok_or_else(|| {
            TraceError::Numerical(format!("no boundary ahead of {} inside {}", p, node.path))
        })?;
        let speed = SPEED_OF_LIGHT / n_current.re;

        if let OpticalRole::Lens(lens) = &node.role {
            let free_path = surface::sample_absorption_distance(rng, lens.absorption_length(wavelength))?;
            if free_path < distance {
                ray.add_point(p + d * free_path, ray.time() + free_path / speed);
                return Ok(Step::Done(RayStatus::Absorbed));
            }
        }

        let x1 = p + d * distance;
        ray.add_point(x1, ray.time() + distance / speed);

        let Some(next) = self.scene.locate(&(x1 + d * NUDGE_DISTANCE)) else {
            return Ok(Step::Done(RayStatus::Exited));
        };
        if next == current {
            return Ok(Step::Continue(current));
        }

        let condition = self.scene.condition(current, next);
        let next_node = &self.scene.nodes()[next];
        trace!("ray {} at {} -> {}", ray.id(), node.path, next_node.path);

        match &next_node.role {
            OpticalRole::Obscuration => {
                ray.visit(next, self.scene.path(next));
                Ok(Step::Done(RayStatus::Stopped))
            }
            OpticalRole::FocalSurface(focal) => {
                ray.visit(next, self.scene.path(next));
                let angle = d.dot(&normal).abs().min(1.0).acos();
                if surface::accept_focal(rng, focal, wavelength, angle) {
                    Ok(Step::Done(RayStatus::Focused))
                } else {
                    Ok(Step::Done(RayStatus::Stopped))
                }
            }
            OpticalRole::Mirror(reflectance) => {
                ray.visit(next, self.scene.path(next));
                match surface::resolve_mirror(rng, &d, &normal, wavelength, reflectance, condition) {
                    Outcome::Reflect(r) => self.redirect(ray, r, current),
                    _ => Ok(Step::Done(RayStatus::Absorbed)),
                }
            }
            OpticalRole::Lens(_) | OpticalRole::Transparent => {
                let n_next = next_node.role.medium_index(wavelength).unwrap_or(n_current);
                let outcome = surface::resolve_refractive(
                    rng,
                    &d,
                    &normal,
                    ray.polarization(),
                    wavelength,
                    n_current,
                    n_next,
                    condition,
                    !self.settings.disable_fresnel_reflection,
                )?;
                match outcome {
                    Outcome::Reflect(r) => self.redirect(ray, r, current),
                    Outcome::Transmit(t) => {
                        ray.visit(next, self.scene.path(next));
                        self.redirect(ray, t, next)
                    }
                    Outcome::Absorb => Ok(Step::Done(RayStatus::Absorbed)),
                }
            }
        }
    }

    fn redirect(&self, ray: &mut Ray, direction: Vector3<f64>, node: NodeId) -> Result<Step> {
        if direction.iter().any(|c| !c.is_finite()) {
            return Err(TraceError::Numerical(format!(
                "invalid direction {}",
                direction
            )));
        }
        ray.set_direction(direction);
        Ok(Step::Continue(node))
    }
}

/// Mixes the run seed with a ray id (splitmix64 finaliser).
fn ray_seed(seed: u64, id: u64) -> u64 {
    let mut z = seed ^ id.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
