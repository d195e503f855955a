use anyhow::{Context, Result};
use config::{Config, Environment, File};
use log::info;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::TraceError;

/// Minimum distance traversed by a ray to the next crossing. Closer crossings are ignored.
pub const CROSSING_EPSILON: f64 = 1e-9;
/// Distance stepped past a crossing to find the volume on the other side.
pub const NUDGE_DISTANCE: f64 = 1e-9;
/// Maximum number of facet normals sampled on a rough surface before falling back to the geometric normal.
pub const MAX_FACET_ATTEMPTS: usize = 100;
/// Prefix of environment variables overriding configuration values.
pub const ENV_PREFIX: &str = "OPTRACE";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_file() {
        let settings = load_default_config().unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn toml_round_trip() {
        let settings = Settings {
            limit: Some(1000),
            seed: Some(42),
            ..Default::default()
        };
        let text = settings.to_toml().unwrap();
        let back: Settings = toml::from_str(&text).unwrap();
        assert_eq!(back, settings);
    }

    #[test]
    fn validation() {
        let mut settings = Settings::default();
        assert!(settings.validate().is_ok());
        settings.limit = Some(0);
        assert!(settings.validate().is_err());
        settings.limit = None;
        settings.max_threads = Some(0);
        assert!(settings.validate().is_err());
    }
}

/// Runtime configuration of the tracer.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Maximum number of points recorded per ray. Unbounded when absent.
    pub limit: Option<usize>,
    pub disable_fresnel_reflection: bool,
    pub multi_thread: bool,
    /// Worker count. Defaults to the number of logical cores.
    pub max_threads: Option<usize>,
    /// Seeds the per-ray generators. Entropy is used when absent.
    pub seed: Option<u64>,
    pub progress: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            limit: None,
            disable_fresnel_reflection: false,
            multi_thread: true,
            max_threads: None,
            seed: None,
            progress: false,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> std::result::Result<(), TraceError> {
        if self.limit == Some(0) {
            return Err(TraceError::Configuration(
                "point limit must be at least 1".to_string(),
            ));
        }
        if self.max_threads == Some(0) {
            return Err(TraceError::Configuration(
                "max_threads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string(self).context("failed to serialise settings")
    }
}

/// Loads `config/default.toml` from the project root.
pub fn load_default_config() -> Result<Settings> {
    let root = retrieve_project_root()?;
    load_config_file(&root.join("config/default.toml"), false)
}

/// Loads `config/default.toml`, overlaid by `config/local.toml` if present and
/// by `OPTRACE_*` environment variables.
pub fn load_config() -> Result<Settings> {
    let root = retrieve_project_root()?;
    let default_config = root.join("config/default.toml");
    let local_config = root.join("config/local.toml");

    let mut builder = Config::builder().add_source(File::from(default_config.clone()).required(true));
    if local_config.exists() {
        info!("using local configuration: {:?}", local_config);
        builder = builder.add_source(File::from(local_config).required(false));
    } else {
        info!("using default configuration: {:?}", default_config);
    }
    let settings = builder
        .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
        .build()
        .context("error loading configuration")?;

    let config: Settings = settings
        .try_deserialize()
        .context("error deserializing configuration")?;
    config.validate()?;
    Ok(config)
}

/// Loads a single configuration file, optionally overlaid by the environment.
pub fn load_config_file(path: &Path, with_env: bool) -> Result<Settings> {
    let mut builder = Config::builder().add_source(File::from(path.to_path_buf()).required(true));
    if with_env {
        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true));
    }
    let settings = builder
        .build()
        .with_context(|| format!("error loading configuration from {:?}", path))?;
    let config: Settings = settings
        .try_deserialize()
        .context("error deserializing configuration")?;
    config.validate()?;
    Ok(config)
}

/// Retrieve the project root directory.
/// This function tries to find the project root directory in different ways:
/// 1. If the CARGO_MANIFEST_DIR environment variable is set, use it.
/// 2. If the OPTRACE_ROOT_DIR environment variable is set, use it.
/// 3. If the "config" subdirectory is found in the executable directory or any of its parents, use it.
fn retrieve_project_root() -> Result<PathBuf> {
    if let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR") {
        return Ok(PathBuf::from(manifest_dir));
    }
    if let Ok(path) = env::var("OPTRACE_ROOT_DIR") {
        return Ok(PathBuf::from(path));
    }
    let exe_path = env::current_exe().context("failed to get current executable path")?;
    exe_path
        .ancestors()
        .skip(1)
        .find(|dir| dir.join("config").is_dir())
        .map(Path::to_path_buf)
        .ok_or_else(|| anyhow::anyhow!("could not find project root directory"))
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let or_unset = |v: Option<String>| v.unwrap_or_else(|| "unset".to_string());
        write!(
            f,
            "Settings:
  - Point Limit: {}
  - Fresnel Reflection: {}
  - Multi Thread: {}
  - Max Threads: {}
  - Seed: {}
  - Progress Bar: {}
  ",
            or_unset(self.limit.map(|l| l.to_string())),
            if self.disable_fresnel_reflection {
                "disabled"
            } else {
                "enabled"
            },
            self.multi_thread,
            or_unset(self.max_threads.map(|t| t.to_string())),
            or_unset(self.seed.map(|s| s.to_string())),
            self.progress,
        )
    }
}
