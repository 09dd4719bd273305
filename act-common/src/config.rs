//! Configuration loading and system path profiles
//!
//! Config file resolution follows this priority order:
//! 1. Command-line argument (highest priority)
//! 2. `ACT_CONFIG` environment variable
//! 3. User config file (`~/.config/act-ingest/config.toml` on Linux)
//! 4. System config file (`/etc/act-ingest/config.toml`, Linux only)
//! 5. Compiled defaults (fallback)
//!
//! A missing config file is not fatal: a warning is logged and compiled
//! defaults are used. The resolved [`SystemPaths`] value is handed to every
//! component explicitly; nothing here is global state.

use crate::record::CohortRanges;
use crate::{Error, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "ACT_CONFIG";

/// Name of the built-in system profile
pub const LOCAL_SYSTEM: &str = "local";

/// Study roots and network drop for one deployment ("system")
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SystemPaths {
    /// Interventional study root
    pub int_dir: PathBuf,
    /// Observational study root
    pub obs_dir: PathBuf,
    /// Network drop where raw files land
    #[serde(default)]
    pub drop_dir: Option<PathBuf>,
}

impl SystemPaths {
    pub fn new(
        int_dir: impl Into<PathBuf>,
        obs_dir: impl Into<PathBuf>,
        drop_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            int_dir: int_dir.into(),
            obs_dir: obs_dir.into(),
            drop_dir,
        }
    }

    /// Network drop directory, required for ingestion
    pub fn require_drop_dir(&self) -> Result<&Path> {
        self.drop_dir.as_deref().ok_or_else(|| {
            Error::Config(
                "Network drop directory is not configured for this system; cannot ingest files"
                    .to_string(),
            )
        })
    }

    /// Both study roots, interventional first
    pub fn study_roots(&self) -> [&Path; 2] {
        [self.int_dir.as_path(), self.obs_dir.as_path()]
    }

    fn local_default() -> Self {
        Self {
            int_dir: PathBuf::from("mnt/int_dir"),
            obs_dir: PathBuf::from("mnt/obs_dir"),
            drop_dir: Some(PathBuf::from("mnt/rdss_dir")),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_manifest_path() -> PathBuf {
    PathBuf::from(crate::manifest::DEFAULT_MANIFEST_PATH)
}

fn default_drop_floor_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 8, 5).unwrap_or(NaiveDate::MIN)
}

/// Ingest configuration loaded from TOML
///
/// ```toml
/// manifest_path = "res/data.json"
/// excluded_subjects = ["7143", "8066"]
/// link_sessions = false
/// drop_floor_date = "2024-08-05"
///
/// [cohorts]
/// obs_min = 6000
/// int_min = 8000
///
/// [systems.cluster]
/// int_dir = "/mnt/nfs/project/int"
/// obs_dir = "/mnt/nfs/project/obs"
/// drop_dir = "/mnt/nfs/rdss/accelerometer"
///
/// [logging]
/// level = "info"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IngestConfig {
    /// Named system profiles
    #[serde(default)]
    pub systems: BTreeMap<String, SystemPaths>,

    /// Manifest file location
    #[serde(default = "default_manifest_path")]
    pub manifest_path: PathBuf,

    /// Subjects never treated as a duplicate-identity counterpart
    #[serde(default)]
    pub excluded_subjects: BTreeSet<String>,

    /// Subject-ID ranges for cohort derivation
    #[serde(default)]
    pub cohorts: CohortRanges,

    /// Maintain `sub-*/accel/all` link trees after copies
    #[serde(default)]
    pub link_sessions: bool,

    /// Oldest drop file considered when no look-back window is given
    #[serde(default = "default_drop_floor_date")]
    pub drop_floor_date: NaiveDate,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            systems: BTreeMap::new(),
            manifest_path: default_manifest_path(),
            excluded_subjects: BTreeSet::new(),
            cohorts: CohortRanges::default(),
            link_sessions: false,
            drop_floor_date: default_drop_floor_date(),
            logging: LoggingConfig::default(),
        }
    }
}

impl IngestConfig {
    /// Parse a config from TOML text
    pub fn from_toml_str(content: &str, origin: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|source| Error::Toml {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Load from an optional file path
    ///
    /// `None` or a path that does not exist yields compiled defaults with a
    /// warning. A file that exists but does not parse is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            warn!("No config file found; using compiled defaults");
            return Ok(Self::default());
        };

        if !path.exists() {
            warn!("Config file not found: {}; using compiled defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read config {} failed: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&content, path)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Names of every available system profile, including the built-in one
    pub fn available_systems(&self) -> Vec<String> {
        let mut names: BTreeSet<String> = self.systems.keys().cloned().collect();
        names.insert(LOCAL_SYSTEM.to_string());
        names.into_iter().collect()
    }

    /// Resolve one system profile by name
    pub fn system(&self, name: &str) -> Result<SystemPaths> {
        if let Some(paths) = self.systems.get(name) {
            return Ok(paths.clone());
        }
        if name == LOCAL_SYSTEM {
            return Ok(SystemPaths::local_default());
        }
        Err(Error::Config(format!(
            "Unknown system '{}'. Available systems: {}",
            name,
            self.available_systems().join(", ")
        )))
    }
}

/// Locates the config file following the documented priority order
pub struct ConfigResolver {
    app_name: String,
}

impl ConfigResolver {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
        }
    }

    /// Resolve the config path; `None` means "use compiled defaults"
    pub fn resolve(&self, cli_arg: Option<&Path>) -> Option<PathBuf> {
        // Priority 1: Command-line argument
        if let Some(path) = cli_arg {
            return Some(path.to_path_buf());
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        // Priority 3: User config directory
        if let Some(path) = dirs::config_dir().map(|d| d.join(&self.app_name).join("config.toml")) {
            if path.exists() {
                return Some(path);
            }
        }

        // Priority 4: System-wide config (Linux)
        if cfg!(target_os = "linux") {
            let system = PathBuf::from("/etc").join(&self.app_name).join("config.toml");
            if system.exists() {
                return Some(system);
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IngestConfig::default();
        assert_eq!(config.manifest_path, PathBuf::from("res/data.json"));
        assert_eq!(config.drop_floor_date.to_string(), "2024-08-05");
        assert_eq!(config.cohorts, CohortRanges::default());
        assert!(!config.link_sessions);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            manifest_path = "out/manifest.json"
            excluded_subjects = ["7143", "8066"]
            link_sessions = true
            drop_floor_date = "2025-01-01"

            [cohorts]
            int_min = 9000

            [systems.cluster]
            int_dir = "/data/int"
            obs_dir = "/data/obs"
            drop_dir = "/data/drop"

            [logging]
            level = "debug"
            file = "logs/ingest.log"
        "#;

        let config = IngestConfig::from_toml_str(toml, Path::new("test.toml")).unwrap();
        assert_eq!(config.manifest_path, PathBuf::from("out/manifest.json"));
        assert!(config.excluded_subjects.contains("7143"));
        assert!(config.link_sessions);
        assert_eq!(config.drop_floor_date.to_string(), "2025-01-01");
        assert_eq!(config.cohorts.int_min, 9000);
        assert_eq!(config.cohorts.obs_min, 6000);
        assert_eq!(config.logging.file, Some(PathBuf::from("logs/ingest.log")));

        let cluster = config.system("cluster").unwrap();
        assert_eq!(cluster.int_dir, PathBuf::from("/data/int"));
        assert_eq!(cluster.require_drop_dir().unwrap(), Path::new("/data/drop"));
    }

    #[test]
    fn test_unknown_system_lists_available() {
        let config = IngestConfig::default();
        let err = config.system("nowhere").unwrap_err().to_string();
        assert!(err.contains("nowhere"));
        assert!(err.contains(LOCAL_SYSTEM));
    }

    #[test]
    fn test_missing_drop_dir_is_config_error() {
        let paths = SystemPaths::new("/int", "/obs", None);
        assert!(matches!(paths.require_drop_dir(), Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_toml_is_error() {
        let result = IngestConfig::from_toml_str("systems = 3", Path::new("bad.toml"));
        assert!(matches!(result, Err(Error::Toml { .. })));
    }
}
