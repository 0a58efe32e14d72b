//! External binary lookup and blocking launch.
//!
//! Commands are executed with an argument vector, never through a shell, so
//! configured paths reach the child verbatim.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use thiserror::Error;

#[cfg(feature = "tracing")]
use tracing::{debug, info};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LaunchError {
    #[error("Binary not found: {binary} ({hint})")]
    BinaryNotFound { binary: String, hint: String },

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
}

/// Program, arguments and environment for one external process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
    current_dir: Option<PathBuf>,
    hint: String,
}

impl LaunchCommand {
    pub fn new(program: impl Into<String>) -> Self {
        let program = program.into();
        let hint = format!("install {} or check PATH", program);
        Self {
            program,
            args: Vec::new(),
            env: Vec::new(),
            current_dir: None,
            hint,
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, iter: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args
            .extend(iter.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Remediation shown when the program cannot be found.
    #[must_use]
    pub fn hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = hint.into();
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn get_env(&self) -> &[(String, String)] {
        &self.env
    }

    pub fn get_current_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    pub fn get_hint(&self) -> &str {
        &self.hint
    }
}

impl fmt::Display for LaunchCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", display_arg(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", display_arg(arg))?;
        }
        Ok(())
    }
}

fn display_arg(arg: &str) -> String {
    if arg.is_empty() || arg.contains(char::is_whitespace) {
        format!("'{}'", arg.replace('\'', "'\\''"))
    } else {
        arg.to_string()
    }
}

/// Finds executables the way a shell would, without invoking one.
#[derive(Debug, Clone, Default)]
pub struct BinaryLocator {
    search_path: Option<OsString>,
}

impl BinaryLocator {
    /// Searches the process `PATH`.
    pub fn from_env() -> Self {
        Self {
            search_path: std::env::var_os("PATH"),
        }
    }

    pub fn with_search_path(search_path: impl Into<OsString>) -> Self {
        Self {
            search_path: Some(search_path.into()),
        }
    }

    /// Resolves `binary` to an executable file.
    ///
    /// Names containing a path separator are checked directly; bare names
    /// are searched in each search-path directory.
    pub fn locate(&self, binary: &str) -> Option<PathBuf> {
        let binary = binary.trim();
        if binary.is_empty() {
            return None;
        }

        let path = Path::new(binary);
        if path.components().count() > 1 || path.is_absolute() {
            return is_executable(path).then(|| path.to_path_buf());
        }

        let search_path = self.search_path.as_deref()?;
        std::env::split_paths(search_path)
            .filter(|dir| !dir.as_os_str().is_empty())
            .flat_map(|dir| candidates(&dir, binary))
            .find(|candidate| is_executable(candidate))
    }
}

/// Resolves `binary` against the process `PATH`.
pub fn locate_binary(binary: &str) -> Option<PathBuf> {
    BinaryLocator::from_env().locate(binary)
}

#[cfg(windows)]
fn candidates(dir: &Path, binary: &str) -> Vec<PathBuf> {
    let base = dir.join(binary);
    if base.extension().is_some() {
        return vec![base];
    }
    vec![base.clone(), base.with_extension("exe"), base.with_extension("bat")]
}

#[cfg(not(windows))]
fn candidates(dir: &Path, binary: &str) -> Vec<PathBuf> {
    vec![dir.join(binary)]
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Runs launch commands in the foreground.
#[derive(Debug, Clone, Default)]
pub struct Launcher {
    locator: BinaryLocator,
}

impl Launcher {
    pub fn new(locator: BinaryLocator) -> Self {
        Self { locator }
    }

    pub fn from_env() -> Self {
        Self::new(BinaryLocator::from_env())
    }

    pub fn locator(&self) -> &BinaryLocator {
        &self.locator
    }

    /// Resolves the program before anything is spawned.
    pub fn preflight(&self, command: &LaunchCommand) -> Result<PathBuf, LaunchError> {
        self.locator
            .locate(command.program())
            .ok_or_else(|| LaunchError::BinaryNotFound {
                binary: command.program().to_string(),
                hint: command.get_hint().to_string(),
            })
    }

    /// Runs `command` with inherited stdio and waits for it to exit.
    ///
    /// Returns the child's exit code; on Unix a child killed by a signal
    /// yields `128 + signal`.
    pub fn run(&self, command: &LaunchCommand) -> Result<i32, LaunchError> {
        let program = self.preflight(command)?;

        #[cfg(feature = "tracing")]
        debug!(program = %program.display(), args = ?command.get_args(), "Spawning");

        let mut cmd = Command::new(&program);
        cmd.args(command.get_args())
            .envs(
                command
                    .get_env()
                    .iter()
                    .map(|(k, v)| (OsStr::new(k), OsStr::new(v))),
            );

        if let Some(dir) = command.get_current_dir() {
            cmd.current_dir(dir);
        }

        let status = cmd.status().map_err(|source| LaunchError::Spawn {
            program: command.program().to_string(),
            source,
        })?;

        let code = exit_code(status);

        #[cfg(feature = "tracing")]
        info!(program = command.program(), code, "Process exited");

        Ok(code)
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}
