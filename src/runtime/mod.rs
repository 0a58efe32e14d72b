//! Runtime selection and launch planning.
//!
//! A [`RuntimeRegistry`] maps every supported [`Runtime`] to the driver that
//! knows how to start it and how to check its environment. Drivers are
//! registered up front; nothing is discovered at runtime.

mod frankenphp;
mod roadrunner;
mod swoole;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use tempfile::NamedTempFile;
use thiserror::Error;

#[cfg(feature = "tracing")]
use tracing::debug;

use crate::address::ListenAddress;
use crate::config::RuntimeConfig;
use crate::probe::ProbeReport;
use crate::process::{BinaryLocator, LaunchCommand};

pub use frankenphp::{public_dir, render_caddyfile, FrankenPhpDriver, CADDYFILE_PREFIX};
pub use roadrunner::RoadRunnerDriver;
pub use swoole::SwooleDriver;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RuntimeError {
    #[error("Unsupported runtime: {0}")]
    Unsupported(String),

    #[error("Failed to write generated Caddyfile: {0}")]
    Artifact(#[source] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Runtime {
    RoadRunner,
    Swoole,
    OpenSwoole,
    FrankenPhp,
}

impl Runtime {
    pub const ALL: [Runtime; 4] = [
        Runtime::RoadRunner,
        Runtime::Swoole,
        Runtime::OpenSwoole,
        Runtime::FrankenPhp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Runtime::RoadRunner => "roadrunner",
            Runtime::Swoole => "swoole",
            Runtime::OpenSwoole => "openswoole",
            Runtime::FrankenPhp => "frankenphp",
        }
    }

    /// Whether the runtime is a PHP extension hosting the server loop.
    pub fn is_in_process(&self) -> bool {
        matches!(self, Runtime::Swoole | Runtime::OpenSwoole)
    }
}

impl FromStr for Runtime {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Runtime::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| RuntimeError::Unsupported(name.to_string()))
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External binary that owns the listening socket.
#[derive(Debug)]
pub struct SpawnLaunch {
    pub runtime: Runtime,
    pub command: LaunchCommand,
    artifact: Option<NamedTempFile>,
}

impl SpawnLaunch {
    pub fn new(runtime: Runtime, command: LaunchCommand) -> Self {
        Self {
            runtime,
            command,
            artifact: None,
        }
    }

    /// Attaches a generated file that must outlive the child process.
    #[must_use]
    pub fn with_artifact(mut self, artifact: NamedTempFile) -> Self {
        self.artifact = Some(artifact);
        self
    }

    pub fn artifact(&self) -> Option<&Path> {
        self.artifact
            .as_ref()
            .map(|f| f.path())
    }
}

/// Runtime hosted inside the PHP interpreter (Swoole/OpenSwoole).
///
/// `command` starts the interpreter on the bootstrap script; a host that
/// embeds the worker loop can use the other fields instead.
#[derive(Debug)]
pub struct EmbeddedLaunch {
    pub runtime: Runtime,
    pub interpreter: String,
    pub script: PathBuf,
    pub address: ListenAddress,
    pub workers: usize,
    pub command: LaunchCommand,
}

#[derive(Debug)]
pub enum LaunchPlan {
    Spawn(SpawnLaunch),
    InProcess(EmbeddedLaunch),
}

impl LaunchPlan {
    pub fn runtime(&self) -> Runtime {
        match self {
            LaunchPlan::Spawn(s) => s.runtime,
            LaunchPlan::InProcess(e) => e.runtime,
        }
    }

    pub fn command(&self) -> &LaunchCommand {
        match self {
            LaunchPlan::Spawn(s) => &s.command,
            LaunchPlan::InProcess(e) => &e.command,
        }
    }

    pub fn is_in_process(&self) -> bool {
        matches!(self, LaunchPlan::InProcess(_))
    }

    /// Generated file the plan owns, deleted when the plan is dropped.
    pub fn artifact(&self) -> Option<&Path> {
        match self {
            LaunchPlan::Spawn(s) => s.artifact(),
            LaunchPlan::InProcess(_) => None,
        }
    }
}

/// Starts and checks one family of runtimes.
pub trait RuntimeDriver: Send + Sync {
    fn name(&self) -> &'static str;

    fn plan(
        &self,
        runtime: Runtime,
        config: &RuntimeConfig,
    ) -> Result<LaunchPlan, RuntimeError>;

    fn probe(
        &self,
        runtime: Runtime,
        config: &RuntimeConfig,
        locator: &BinaryLocator,
    ) -> ProbeReport;
}

#[derive(Clone, Default)]
pub struct RuntimeRegistry {
    drivers: BTreeMap<Runtime, Arc<dyn RuntimeDriver>>,
}

impl fmt::Debug for RuntimeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.drivers
                    .iter()
                    .map(|(r, d)| (r.as_str(), d.name())),
            )
            .finish()
    }
}

impl RuntimeRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the RoadRunner, Swoole/OpenSwoole and FrankenPHP
    /// drivers.
    pub fn builtin() -> Self {
        let swoole: Arc<dyn RuntimeDriver> = Arc::new(SwooleDriver);

        let mut registry = Self::empty();
        registry.register(Runtime::RoadRunner, Arc::new(RoadRunnerDriver));
        registry.register(Runtime::Swoole, Arc::clone(&swoole));
        registry.register(Runtime::OpenSwoole, swoole);
        registry.register(Runtime::FrankenPhp, Arc::new(FrankenPhpDriver));
        registry
    }

    pub fn register(&mut self, runtime: Runtime, driver: Arc<dyn RuntimeDriver>) {
        self.drivers.insert(runtime, driver);
    }

    pub fn runtimes(&self) -> impl Iterator<Item = Runtime> + '_ {
        self.drivers.keys().copied()
    }

    /// Resolves a configured runtime name to its driver.
    pub fn resolve(
        &self,
        name: &str,
    ) -> Result<(Runtime, &dyn RuntimeDriver), RuntimeError> {
        let runtime: Runtime = name.parse()?;
        let driver = self
            .drivers
            .get(&runtime)
            .ok_or_else(|| RuntimeError::Unsupported(name.trim().to_string()))?;

        Ok((runtime, driver.as_ref()))
    }

    pub fn plan(&self, config: &RuntimeConfig) -> Result<LaunchPlan, RuntimeError> {
        let (runtime, driver) = self.resolve(config.runtime())?;
        let plan = driver.plan(runtime, config)?;

        #[cfg(feature = "tracing")]
        debug!(
            runtime = runtime.as_str(),
            command = %plan.command(),
            in_process = plan.is_in_process(),
            "Planned launch"
        );

        Ok(plan)
    }

    /// Checks the environment of the configured runtime. Unsupported names
    /// yield a report with a single failure.
    pub fn probe(&self, config: &RuntimeConfig, locator: &BinaryLocator) -> ProbeReport {
        match self.resolve(config.runtime()) {
            Ok((runtime, driver)) => driver.probe(runtime, config, locator),
            Err(e) => {
                let mut report = ProbeReport::new(config.runtime().trim());
                report.fail("runtime", e.to_string());
                report
            }
        }
    }
}
