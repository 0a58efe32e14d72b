//! Layered runtime configuration.
//!
//! Values are resolved once at startup in this order, later layers winning:
//! built-in defaults, `runiva.toml` in the project root, environment
//! variables, then command-line overrides.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::address::{AddressError, ListenAddress};

pub const CONFIG_FILE_NAME: &str = "runiva.toml";

pub const ENV_RUNTIME: &str = "RUNIVA_RUNTIME";
pub const ENV_BINARY: &str = "RUNIVA_BINARY";
pub const ENV_CONFIG: &str = "RUNIVA_CONFIG";
pub const ENV_WORKERS: &str = "RUNIVA_WORKERS";
pub const ENV_ADDRESS: &str = "RUNIVA_ADDRESS";
pub const ENV_PHP: &str = "RUNIVA_PHP";
pub const ENV_BOOTSTRAP: &str = "RUNIVA_BOOTSTRAP";
pub const ENV_FRANKENPHP_BINARY: &str = "FRANKENPHP_BINARY";
pub const ENV_APP_ENV: &str = "APP_ENV";

const DEFAULT_RUNTIME: &str = "roadrunner";
const DEFAULT_BINARY: &str = "rr";
const DEFAULT_CONFIG: &str = "rr.yaml";
const DEFAULT_WORKERS: usize = 2;
const DEFAULT_ADDRESS: &str = ":8080";
const DEFAULT_PHP: &str = "php";
const DEFAULT_FRANKENPHP: &str = "frankenphp";
const DEFAULT_BOOTSTRAP: &str = "vendor/glueful/runiva/bin/swoole-server.php";
const DEFAULT_APP_ENV: &str = "development";

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },

    #[error(transparent)]
    Address(#[from] AddressError),
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    runiva: FileSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSection {
    runtime: Option<String>,
    binary: Option<String>,
    config: Option<String>,
    workers: Option<usize>,
    address: Option<String>,
    php: Option<String>,
    frankenphp: Option<String>,
    bootstrap: Option<String>,
    app_env: Option<String>,
}

/// Immutable runtime settings for one process lifetime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    runtime: String,
    binary: String,
    config: Option<PathBuf>,
    workers: usize,
    address: ListenAddress,
    raw_address: String,
    project_root: PathBuf,
    php_binary: String,
    frankenphp_binary: String,
    bootstrap: PathBuf,
    app_env: String,
    version: &'static str,
}

impl RuntimeConfig {
    /// Built-in defaults rooted at `project_root`.
    pub fn defaults(project_root: impl Into<PathBuf>) -> Self {
        Self {
            runtime: DEFAULT_RUNTIME.to_string(),
            binary: DEFAULT_BINARY.to_string(),
            config: Some(PathBuf::from(DEFAULT_CONFIG)),
            workers: DEFAULT_WORKERS,
            address: ListenAddress::default(),
            raw_address: DEFAULT_ADDRESS.to_string(),
            project_root: project_root.into(),
            php_binary: DEFAULT_PHP.to_string(),
            frankenphp_binary: DEFAULT_FRANKENPHP.to_string(),
            bootstrap: PathBuf::from(DEFAULT_BOOTSTRAP),
            app_env: DEFAULT_APP_ENV.to_string(),
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    /// Loads defaults, `runiva.toml` and the process environment.
    pub fn load(project_root: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        Self::load_with(project_root, |key| std::env::var(key).ok())
    }

    /// Like [`RuntimeConfig::load`] with an explicit environment lookup.
    pub fn load_with<F>(
        project_root: impl Into<PathBuf>,
        lookup: F,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::defaults(project_root);

        let file_path = config.project_root.join(CONFIG_FILE_NAME);
        if file_path.is_file() {
            config.apply_file(&file_path)?;
        }

        config.apply_env(lookup)?;

        Ok(config)
    }

    fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let file: ConfigFile =
            toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        #[cfg(feature = "tracing")]
        tracing::debug!(path = %path.display(), "Loaded config file");

        let section = file.runiva;

        if let Some(runtime) = section.runtime {
            self.runtime = runtime;
        }
        if let Some(binary) = section.binary {
            self.binary = binary;
        }
        if let Some(cfg) = section.config {
            self.config = non_empty_path(&cfg);
        }
        if let Some(workers) = section.workers {
            self.workers = workers;
        }
        if let Some(address) = section.address {
            self.set_address(&address)?;
        }
        if let Some(php) = section.php {
            self.php_binary = php;
        }
        if let Some(frankenphp) = section.frankenphp {
            self.frankenphp_binary = frankenphp;
        }
        if let Some(bootstrap) = section.bootstrap {
            self.bootstrap = PathBuf::from(bootstrap);
        }
        if let Some(app_env) = section.app_env {
            self.app_env = app_env;
        }

        Ok(())
    }

    fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(runtime) = get(ENV_RUNTIME) {
            self.runtime = runtime;
        }
        if let Some(binary) = get(ENV_BINARY) {
            self.binary = binary;
        }
        if let Some(cfg) = get(ENV_CONFIG) {
            self.config = non_empty_path(&cfg);
        }
        if let Some(workers) = get(ENV_WORKERS) {
            self.workers = workers.trim().parse().map_err(|_| {
                ConfigError::InvalidValue {
                    key: ENV_WORKERS.to_string(),
                    value: workers.clone(),
                }
            })?;
        }
        if let Some(address) = get(ENV_ADDRESS) {
            self.set_address(&address)?;
        }
        if let Some(php) = get(ENV_PHP) {
            self.php_binary = php;
        }
        if let Some(frankenphp) = get(ENV_FRANKENPHP_BINARY) {
            self.frankenphp_binary = frankenphp;
        }
        if let Some(bootstrap) = get(ENV_BOOTSTRAP) {
            self.bootstrap = PathBuf::from(bootstrap);
        }
        if let Some(app_env) = get(ENV_APP_ENV) {
            self.app_env = app_env;
        }

        Ok(())
    }

    fn set_address(&mut self, raw: &str) -> Result<(), ConfigError> {
        self.address = ListenAddress::parse(raw)?;
        self.raw_address = raw.to_string();
        Ok(())
    }

    #[must_use]
    pub fn with_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtime = runtime.into();
        self
    }

    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    #[must_use]
    pub fn with_config(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.config = (!path.as_os_str().is_empty()).then_some(path);
        self
    }

    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_address(mut self, address: &str) -> Result<Self, ConfigError> {
        self.set_address(address)?;
        Ok(self)
    }

    #[must_use]
    pub fn with_php_binary(mut self, php: impl Into<String>) -> Self {
        self.php_binary = php.into();
        self
    }

    #[must_use]
    pub fn with_frankenphp_binary(mut self, bin: impl Into<String>) -> Self {
        self.frankenphp_binary = bin.into();
        self
    }

    #[must_use]
    pub fn with_bootstrap(mut self, script: impl Into<PathBuf>) -> Self {
        self.bootstrap = script.into();
        self
    }

    #[must_use]
    pub fn with_app_env(mut self, app_env: impl Into<String>) -> Self {
        self.app_env = app_env.into();
        self
    }

    pub fn runtime(&self) -> &str {
        &self.runtime
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Runtime config file as configured (may be relative).
    pub fn config(&self) -> Option<&Path> {
        self.config.as_deref()
    }

    /// Runtime config file resolved against the project root.
    pub fn config_path(&self) -> Option<PathBuf> {
        self.config
            .as_ref()
            .map(|p| self.resolve(p))
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn address(&self) -> &ListenAddress {
        &self.address
    }

    /// Address string as it was configured, e.g. `":8080"`.
    pub fn raw_address(&self) -> &str {
        &self.raw_address
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn php_binary(&self) -> &str {
        &self.php_binary
    }

    pub fn frankenphp_binary(&self) -> &str {
        &self.frankenphp_binary
    }

    /// Swoole bootstrap script resolved against the project root.
    pub fn bootstrap(&self) -> PathBuf {
        self.resolve(&self.bootstrap)
    }

    pub fn app_env(&self) -> &str {
        &self.app_env
    }

    pub fn version(&self) -> &'static str {
        self.version
    }

    /// Joins relative paths onto the project root.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }
}

fn non_empty_path(value: &str) -> Option<PathBuf> {
    let value = value.trim();
    (!value.is_empty()).then(|| PathBuf::from(value))
}
