//! Pipeline configuration.
//!
//! Loaded from a TOML file where every field is optional. The resulting
//! [`Config`] is passed explicitly into the pipeline; nothing is global.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, Offset, Utc};
use flowplan_solver::{Backend, Solver, UnknownBackend};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Overrides `storage.root` when set
pub const STORAGE_ROOT_ENV: &str = "FLOWPLAN_STORAGE_ROOT";

/// Format of every timestamp in a status record
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error(transparent)]
    Backend(#[from] UnknownBackend),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub files: FileConfig,
    pub solver: SolverConfig,
    pub clock: ClockConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Parent of the per-user namespaces
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./data"),
        }
    }
}

/// Artifact file names inside a user namespace
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub input: String,
    pub error: String,
    pub output: String,
    pub plot: String,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            input: "input.zip".to_string(),
            error: "error.zip".to_string(),
            output: "output.zip".to_string(),
            plot: "plot.zip".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Backend used when the caller names none
    pub default: String,
    /// Explicit executable per backend name
    pub executables: BTreeMap<String, PathBuf>,
    /// Relative tolerance of the post-solve constraint audit
    pub tolerance: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            default: Backend::Cbc.name().to_string(),
            executables: BTreeMap::new(),
            tolerance: 1e-6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    pub utc_offset_hours: i32,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self { utc_offset_hours: 7 }
    }
}

impl ClockConfig {
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_hours * 3600).unwrap_or_else(|| Utc.fix())
    }

    pub fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset())
    }

    pub fn timestamp(&self) -> String {
        self.now().format(TIMESTAMP_FORMAT).to_string()
    }
}

impl Config {
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    /// Load a config file and apply environment overrides
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&source)?;
        config.apply_env();
        Ok(config)
    }

    pub fn apply_env(&mut self) {
        if let Some(root) = std::env::var_os(STORAGE_ROOT_ENV) {
            self.storage.root = PathBuf::from(root);
        }
    }

    /// Solver for a backend name, falling back to the configured default
    pub fn solver(&self, name: Option<&str>) -> Result<Solver, ConfigError> {
        let backend: Backend = name.unwrap_or(self.solver.default.as_str()).parse()?;
        let solver = Solver::new(backend).with_tolerance(self.solver.tolerance);
        Ok(match self.solver.executables.get(backend.name()) {
            Some(path) => solver.with_executable(path.clone()),
            None => solver,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = Config::from_toml(
            r#"
            [storage]
            root = "/srv/flowplan"

            [solver.executables]
            glpk = "/opt/glpk/bin/glpsol"
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.root, PathBuf::from("/srv/flowplan"));
        assert_eq!(config.files.input, "input.zip");
        assert_eq!(config.solver.default, "cbc");
        assert_eq!(config.solver.tolerance, 1e-6);
        assert_eq!(config.clock.utc_offset_hours, 7);
    }

    #[test]
    fn test_solver_selection() {
        let mut config = Config::default();
        config
            .solver
            .executables
            .insert("glpk".to_string(), PathBuf::from("/opt/glpk/bin/glpsol"));

        assert_eq!(config.solver(None).unwrap().backend(), Backend::Cbc);
        assert_eq!(config.solver(Some("MicroLP")).unwrap().backend(), Backend::Microlp);
        config.solver.tolerance = 1e-4;
        assert_eq!(config.solver(None).unwrap().tolerance(), 1e-4);
        assert!(matches!(
            config.solver(Some("gurobi")),
            Err(ConfigError::Backend(_))
        ));
    }

    #[test]
    fn test_timestamps_use_the_configured_offset() {
        let clock = ClockConfig { utc_offset_hours: 7 };
        assert_eq!(clock.now().offset().local_minus_utc(), 7 * 3600);
        assert_eq!(clock.timestamp().len(), "2024-01-01 00:00:00".len());

        // Out of range offsets fall back to UTC
        let clock = ClockConfig { utc_offset_hours: 48 };
        assert_eq!(clock.offset().local_minus_utc(), 0);
    }

    #[test]
    fn test_bad_toml_is_an_error() {
        assert!(matches!(
            Config::from_toml("[storage]\nroot = 5\n"),
            Err(ConfigError::Parse(_))
        ));
    }
}
