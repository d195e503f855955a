//! Non-sequential Monte Carlo optical ray tracing.
//!
//! A [`scene::Scene`] is a frozen tree of volumes, each with a shape, a
//! placement and an optical role. Rays are traced through it by a
//! [`tracer::Tracer`] until they are absorbed, leave the world, are stopped
//! by an obscuration, are detected on a focal surface or hit the point limit.
//! Border physics (Fresnel, roughness, Lambertian scatter, thin-film stacks)
//! lives in [`surface`] and [`multilayer`].

pub mod catalog;
pub mod containment;
pub mod error;
pub mod fresnel;
pub mod geom;
pub mod interp;
pub mod multilayer;
pub mod output;
pub mod ray;
pub mod refractive_index;
pub mod role;
pub mod scene;
pub mod settings;
pub mod shooter;
pub mod snell;
pub mod summary;
pub mod surface;
pub mod tracer;
pub mod transform;
pub mod units;

pub use error::{Result, TraceError};
pub use ray::{Ray, RayCollection, RayStatus};
pub use scene::{Scene, SceneBuilder};
pub use settings::Settings;
pub use summary::TraceSummary;
pub use tracer::Tracer;
