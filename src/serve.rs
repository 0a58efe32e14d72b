//! The `serve` command: select a runtime and run it in the foreground, or
//! check its environment with `--check`.

use std::io::Write;
use std::path::PathBuf;

use thiserror::Error;

#[cfg(feature = "tracing")]
use tracing::{info, warn};

use crate::config::{ConfigError, RuntimeConfig};
use crate::process::Launcher;
use crate::runtime::{LaunchPlan, Runtime, RuntimeRegistry};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

/// Command-line overrides; unset fields keep the configured value.
#[derive(Debug, Clone, Default)]
pub struct ServeOptions {
    pub root: PathBuf,
    pub config: Option<PathBuf>,
    pub runtime: Option<String>,
    pub binary: Option<String>,
    pub check: bool,
}

impl ServeOptions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: impl Into<PathBuf>) -> Self {
        self.config = Some(config.into());
        self
    }

    #[must_use]
    pub fn with_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtime = Some(runtime.into());
        self
    }

    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = Some(binary.into());
        self
    }

    #[must_use]
    pub fn with_check(mut self, check: bool) -> Self {
        self.check = check;
        self
    }

    /// Applies the overrides on top of an already loaded config.
    pub fn apply(&self, mut config: RuntimeConfig) -> RuntimeConfig {
        if let Some(runtime) = &self.runtime {
            config = config.with_runtime(runtime.as_str());
        }
        if let Some(binary) = &self.binary {
            config = config.with_binary(binary.as_str());
        }
        if let Some(path) = &self.config {
            config = config.with_config(path.clone());
        }
        config
    }
}

pub struct ServeCommand {
    options: ServeOptions,
    registry: RuntimeRegistry,
    launcher: Launcher,
}

impl ServeCommand {
    pub fn new(options: ServeOptions) -> Self {
        Self {
            options,
            registry: RuntimeRegistry::builtin(),
            launcher: Launcher::from_env(),
        }
    }

    #[must_use]
    pub fn with_registry(mut self, registry: RuntimeRegistry) -> Self {
        self.registry = registry;
        self
    }

    #[must_use]
    pub fn with_launcher(mut self, launcher: Launcher) -> Self {
        self.launcher = launcher;
        self
    }

    /// Loads configuration from the project root and the process
    /// environment, then runs the command.
    pub fn execute<W: Write + ?Sized>(&self, out: &mut W) -> Result<u8, ServeError> {
        let config = RuntimeConfig::load(&self.options.root)?;
        self.execute_with(config, out)
    }

    /// Runs with an explicit base config; CLI overrides still apply.
    ///
    /// Returns the process exit code: the child's code when a runtime was
    /// launched, otherwise `0` or `1`.
    pub fn execute_with<W: Write + ?Sized>(
        &self,
        config: RuntimeConfig,
        out: &mut W,
    ) -> Result<u8, ServeError> {
        let config = self.options.apply(config);

        if self.options.check {
            return self.check(&config, out);
        }

        let plan = match self.registry.plan(&config) {
            Ok(plan) => plan,
            Err(e) => {
                writeln!(out, "{}", e)?;
                return Ok(1);
            }
        };

        // RoadRunner always reads its config; other runtimes only when one
        // was named on the command line.
        let reads_config =
            plan.runtime() == Runtime::RoadRunner || self.options.config.is_some();
        if let Some(path) = config.config_path().filter(|_| reads_config) {
            if !path.is_file() {
                #[cfg(feature = "tracing")]
                warn!(path = %path.display(), "Config file not found, continuing");

                writeln!(out, "Warning: config file not found: {}", path.display())?;
            }
        }

        self.launch(&plan, out)
    }

    fn check<W: Write + ?Sized>(
        &self,
        config: &RuntimeConfig,
        out: &mut W,
    ) -> Result<u8, ServeError> {
        let report = self
            .registry
            .probe(config, self.launcher.locator());
        report.render(out)?;

        Ok(if report.passed() { 0 } else { 1 })
    }

    fn launch<W: Write + ?Sized>(
        &self,
        plan: &LaunchPlan,
        out: &mut W,
    ) -> Result<u8, ServeError> {
        let command = plan.command();

        #[cfg(feature = "tracing")]
        {
            info!("Starting {}: {}", plan.runtime(), command);
            if let LaunchPlan::InProcess(embedded) = plan {
                info!(
                    address = %embedded.address,
                    workers = embedded.workers,
                    "Runtime hosted by the PHP interpreter"
                );
            }
        }

        match self.launcher.run(command) {
            Ok(code) => Ok(u8::try_from(code).unwrap_or(1)),
            Err(e) => {
                writeln!(out, "{}", e)?;
                Ok(1)
            }
        }
    }
}
