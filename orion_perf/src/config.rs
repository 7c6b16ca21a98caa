use config::{Config, ConfigError, Environment, File, FileFormat};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::defaults::{
    DEFAULT_BENCHMARK_INDEX, DEFAULT_CHANGEPOINT_EXIT_CODE, DEFAULT_CONFIGS_DIR,
    DEFAULT_CONTAINER_IMAGE, DEFAULT_CONTAINER_RUNTIME, DEFAULT_FALLBACK_CONFIGS,
    DEFAULT_LOOKBACK_DAYS, DEFAULT_METADATA_INDEX, DEFAULT_ORION_BINARY, DEFAULT_TIMEOUT_SECONDS,
    DEFAULT_VERSION,
};

/// Environment variable holding the OpenSearch URL orion reads its data from.
pub const DATA_SOURCE_ENV: &str = "ES_SERVER";

/// Prefix for environment variables overriding individual settings,
/// e.g. `ORION_PERF_TIMEOUT_SECONDS=600`.
pub const SETTINGS_ENV_PREFIX: &str = "ORION_PERF";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to load settings: {0}")]
    Load(#[from] ConfigError),

    #[error("{} environment variable is not set", DATA_SOURCE_ENV)]
    MissingDataSource,

    #[error("Invalid configuration name '{0}': expected a file name inside the configuration directory")]
    InvalidConfigurationName(String),
}

/// Effective settings, resolved once at startup and passed down explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<String>,
    pub configs_dir: PathBuf,
    pub fallback_configs: Vec<String>,
    pub orion_binary: String,
    pub container_runtime: String,
    pub container_image: String,
    pub metadata_index: String,
    pub benchmark_index: String,
    pub changepoint_exit_code: i32,
    /// Zero disables the timeout.
    pub timeout_seconds: u64,
    pub default_version: String,
    pub default_lookback: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            data_source: None,
            configs_dir: PathBuf::from(DEFAULT_CONFIGS_DIR),
            fallback_configs: DEFAULT_FALLBACK_CONFIGS
                .iter()
                .map(|c| c.to_string())
                .collect(),
            orion_binary: DEFAULT_ORION_BINARY.to_string(),
            container_runtime: DEFAULT_CONTAINER_RUNTIME.to_string(),
            container_image: DEFAULT_CONTAINER_IMAGE.to_string(),
            metadata_index: DEFAULT_METADATA_INDEX.to_string(),
            benchmark_index: DEFAULT_BENCHMARK_INDEX.to_string(),
            changepoint_exit_code: DEFAULT_CHANGEPOINT_EXIT_CODE,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            default_version: DEFAULT_VERSION.to_string(),
            default_lookback: DEFAULT_LOOKBACK_DAYS,
        }
    }
}

impl Settings {
    /// The configured data source. Its absence aborts any request that needs orion.
    pub fn data_source(&self) -> Result<&str, SettingsError> {
        match self.data_source.as_deref() {
            Some(source) if !source.trim().is_empty() => Ok(source),
            _ => Err(SettingsError::MissingDataSource),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        match self.timeout_seconds {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Resolve a configuration name against the configuration directory.
    pub fn config_path(&self, name: &str) -> Result<PathBuf, SettingsError> {
        let candidate = Path::new(name);
        let is_plain_file_name = candidate.file_name().map(|f| f == candidate.as_os_str());
        if name.trim().is_empty() || is_plain_file_name != Some(true) {
            return Err(SettingsError::InvalidConfigurationName(name.to_string()));
        }
        Ok(self.configs_dir.join(candidate))
    }

    /// List the YAML configurations in the configuration directory.
    ///
    /// Falls back to `fallback_configs` when the directory cannot be read or
    /// contains no configurations.
    pub fn resolve_configs(&self) -> Vec<PathBuf> {
        match list_yaml_files(&self.configs_dir) {
            Ok(configs) if !configs.is_empty() => configs,
            Ok(_) => {
                debug!(
                    "No configurations found in {}, using fallback list",
                    self.configs_dir.display()
                );
                self.fallback_config_paths()
            }
            Err(e) => {
                warn!(
                    "Cannot list configurations in {}: {}. Using fallback list",
                    self.configs_dir.display(),
                    e
                );
                self.fallback_config_paths()
            }
        }
    }

    fn fallback_config_paths(&self) -> Vec<PathBuf> {
        self.fallback_configs
            .iter()
            .map(|c| self.configs_dir.join(c))
            .collect()
    }
}

fn list_yaml_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut configs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
            .unwrap_or(false);
        if is_yaml && path.is_file() {
            configs.push(path);
        }
    }
    configs.sort();
    Ok(configs)
}

/// System-wide settings file (XDG_CONFIG_HOME or ~/.config/orion-perf/config.toml)
fn system_config_path() -> Option<PathBuf> {
    if let Ok(xdg_config_home) = env::var("XDG_CONFIG_HOME") {
        Some(
            Path::new(&xdg_config_home)
                .join("orion-perf")
                .join("config.toml"),
        )
    } else {
        dirs_next::home_dir().map(|home| home.join(".config").join("orion-perf").join("config.toml"))
    }
}

/// Read hierarchical settings (defaults -> system file -> explicit file -> environment)
pub fn read_settings(explicit_file: Option<&Path>) -> Result<Settings, SettingsError> {
    let mut builder = Config::builder().add_source(Config::try_from(&Settings::default())?);

    // 1. System-wide settings, optional
    if let Some(system_path) = system_config_path() {
        builder = builder.add_source(
            File::from(system_path)
                .format(FileFormat::Toml)
                .required(false),
        );
    }

    // 2. Settings file given on the command line, must exist
    if let Some(path) = explicit_file {
        builder = builder.add_source(
            File::from(path.to_path_buf())
                .format(FileFormat::Toml)
                .required(true),
        );
    }

    // 3. Individual overrides from the environment, kept as text so versions
    //    such as 4.20 survive; numeric fields are converted on deserialization
    builder = builder.add_source(Environment::with_prefix(SETTINGS_ENV_PREFIX));

    // 4. The data source keeps the variable name orion itself uses
    let data_source = env::var(DATA_SOURCE_ENV).ok().filter(|s| !s.is_empty());
    builder = builder.set_override_option("data_source", data_source)?;

    let settings: Settings = builder.build()?.try_deserialize()?;
    debug!("Effective settings: {settings:?}");
    Ok(settings)
}
