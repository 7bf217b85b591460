use rollcall_core::{FeatureBuilder, FeatureError, DEFAULT_LOG_INTERVAL, DEFAULT_SIMILARITY_THRESHOLD, FACE_MESH_LANDMARKS, MESH_PAIRS_V1};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("unknown feature table: {0}")]
    UnknownFeatureTable(String),
    #[error("feature table: {0}")]
    Feature(#[from] FeatureError),
}

/// Runtime configuration shared by the CLI and the daemon.
///
/// Loaded from the TOML file named by `ROLLCALL_CONFIG` (if any), then
/// overridden by `ROLLCALL_*` environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory holding one `<name>_embedding.json` per identity.
    pub registry_dir: PathBuf,
    /// Enrollment samples, one subdirectory per person.
    pub samples_dir: PathBuf,
    /// Cosine similarity threshold for a positive match.
    pub similarity_threshold: f32,
    /// Minimum seconds between two attendance records for one person.
    pub log_interval_secs: u64,
    /// Landmarks per face reported by the detector. Defaults to 468; a
    /// detector with iris refinement enabled reports 478, and registry files
    /// trained from such meshes need `ROLLCALL_LANDMARK_COUNT=478`.
    pub landmark_count: usize,
    /// Version tag of the derived feature table.
    pub feature_table: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            registry_dir: default_data_dir().join("embeddings"),
            samples_dir: PathBuf::from("data"),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            log_interval_secs: DEFAULT_LOG_INTERVAL.as_secs(),
            landmark_count: FACE_MESH_LANDMARKS,
            feature_table: MESH_PAIRS_V1.version.to_string(),
        }
    }
}

impl Config {
    /// Load from `ROLLCALL_CONFIG` and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("ROLLCALL_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `ROLLCALL_*` overrides. Unparseable values keep the current setting.
    pub fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = var("ROLLCALL_REGISTRY_DIR") {
            self.registry_dir = PathBuf::from(v);
        }
        if let Some(v) = var("ROLLCALL_SAMPLES_DIR") {
            self.samples_dir = PathBuf::from(v);
        }
        if let Some(v) = var("ROLLCALL_FEATURE_TABLE") {
            self.feature_table = v;
        }
        self.similarity_threshold = parsed(&var, "ROLLCALL_SIMILARITY_THRESHOLD", self.similarity_threshold);
        self.log_interval_secs = parsed(&var, "ROLLCALL_LOG_INTERVAL_SECS", self.log_interval_secs);
        self.landmark_count = parsed(&var, "ROLLCALL_LANDMARK_COUNT", self.landmark_count);
    }

    pub fn log_interval(&self) -> Duration {
        Duration::from_secs(self.log_interval_secs)
    }

    /// Feature builder for the configured table and mesh size.
    pub fn feature_builder(&self) -> Result<FeatureBuilder, ConfigError> {
        let table = rollcall_core::feature_table(&self.feature_table)
            .ok_or_else(|| ConfigError::UnknownFeatureTable(self.feature_table.clone()))?;
        Ok(FeatureBuilder::new(table, self.landmark_count)?)
    }
}

fn parsed<F, T>(var: &F, key: &str, current: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match var(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "ignoring unparseable setting");
            current
        }),
        None => current,
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
}
