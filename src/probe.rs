//! Environment checks for `serve --check`.
//!
//! Probing never launches a runtime and never fails hard: every problem is
//! recorded as a [`Check`] in the report.

use std::fmt;
use std::io::{self, Write};
use std::path::Path;
use std::process::{Command, Stdio};

use crate::process::BinaryLocator;

/// Composer packages the PSR-7 worker bridge needs.
pub const PSR7_BRIDGE_PACKAGES: [&str; 2] =
    ["nyholm/psr7", "symfony/psr-http-message-bridge"];

pub const ROADRUNNER_HTTP_PACKAGE: &str = "spiral/roadrunner-http";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    /// Optional dependency missing; the runtime works in degraded mode.
    Warn,
    Fail,
}

impl CheckStatus {
    fn label(self) -> &'static str {
        match self {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "FAIL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:<4}] {}: {}", self.status.label(), self.name, self.detail)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    runtime: String,
    checks: Vec<Check>,
}

impl ProbeReport {
    pub fn new(runtime: impl Into<String>) -> Self {
        Self {
            runtime: runtime.into(),
            checks: Vec::new(),
        }
    }

    pub fn push(
        &mut self,
        name: impl Into<String>,
        status: CheckStatus,
        detail: impl Into<String>,
    ) {
        self.checks.push(Check {
            name: name.into(),
            status,
            detail: detail.into(),
        });
    }

    pub fn pass(&mut self, name: impl Into<String>, detail: impl Into<String>) {
        self.push(name, CheckStatus::Pass, detail);
    }

    pub fn warn(&mut self, name: impl Into<String>, detail: impl Into<String>) {
        self.push(name, CheckStatus::Warn, detail);
    }

    pub fn fail(&mut self, name: impl Into<String>, detail: impl Into<String>) {
        self.push(name, CheckStatus::Fail, detail);
    }

    pub fn runtime(&self) -> &str {
        &self.runtime
    }

    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    pub fn passed(&self) -> bool {
        !self
            .checks
            .iter()
            .any(|c| c.status == CheckStatus::Fail)
    }

    pub fn failures(&self) -> impl Iterator<Item = &Check> {
        self.checks
            .iter()
            .filter(|c| c.status == CheckStatus::Fail)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Check> {
        self.checks
            .iter()
            .filter(|c| c.status == CheckStatus::Warn)
    }

    /// Writes the human-readable report, ending with the verdict line.
    pub fn render<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "Runtime: {}", self.runtime)?;
        for check in &self.checks {
            writeln!(out, "  {}", check)?;
        }

        if self.passed() {
            writeln!(out, "Environment check passed")
        } else {
            writeln!(out, "Environment check failed")
        }
    }
}

/// Records whether `binary` resolves, failing with `hint` when it does not.
pub fn check_binary(
    report: &mut ProbeReport,
    locator: &BinaryLocator,
    name: &str,
    binary: &str,
    hint: &str,
) -> bool {
    match locator.locate(binary) {
        Some(path) => {
            report.pass(name, path.display().to_string());
            true
        }
        None => {
            report.fail(name, format!("not found: {} ({})", binary, hint));
            false
        }
    }
}

/// Warns when a composer package is not installed under `vendor/`.
pub fn check_vendor_package(report: &mut ProbeReport, root: &Path, package: &str) {
    if has_vendor_package(root, package) {
        report.pass(package, "installed");
    } else {
        report.warn(
            package,
            format!("not installed (composer require {})", package),
        );
    }
}

pub fn has_vendor_package(root: &Path, package: &str) -> bool {
    root.join("vendor").join(package).is_dir()
}

/// Lists the interpreter's loaded extensions via `php -m`.
pub fn php_modules(php: &Path) -> io::Result<Vec<String>> {
    let output = Command::new(php)
        .arg("-m")
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()?;

    if !output.status.success() {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            format!("{} -m exited with {}", php.display(), output.status),
        ));
    }

    Ok(parse_php_modules(&String::from_utf8_lossy(&output.stdout)))
}

/// Parses `php -m` output, skipping the `[PHP Modules]` style section
/// headers. Names are lower-cased.
pub fn parse_php_modules(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('['))
        .map(str::to_ascii_lowercase)
        .collect()
}
