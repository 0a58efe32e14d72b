use std::io::Write;
use std::path::{Path, PathBuf};

use super::{LaunchPlan, Runtime, RuntimeDriver, RuntimeError, SpawnLaunch};
use crate::address::ListenAddress;
use crate::config::{RuntimeConfig, ENV_APP_ENV};
use crate::probe::{check_binary, ProbeReport};
use crate::process::{BinaryLocator, LaunchCommand};

pub const CADDYFILE_PREFIX: &str = "runiva_frankenphp_";

const HINT: &str = "set FRANKENPHP_BINARY or install frankenphp";

/// Document root: `<project>/public` when present, else the project root.
pub fn public_dir(project_root: &Path) -> PathBuf {
    let public = project_root.join("public");
    if public.is_dir() {
        public
    } else {
        project_root.to_path_buf()
    }
}

pub fn render_caddyfile(address: &ListenAddress, public_dir: &Path) -> String {
    format!(
        "{{\n    order php_server before file_server\n}}\n\n{} {{\n    root * {}\n    php_server\n    file_server\n}}\n",
        address.caddy_site(),
        public_dir.display()
    )
}

/// `frankenphp run --config <generated Caddyfile>`.
///
/// The Caddyfile lives in the system temp dir and is removed when the plan
/// is dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrankenPhpDriver;

impl RuntimeDriver for FrankenPhpDriver {
    fn name(&self) -> &'static str {
        "frankenphp"
    }

    fn plan(
        &self,
        runtime: Runtime,
        config: &RuntimeConfig,
    ) -> Result<LaunchPlan, RuntimeError> {
        let caddyfile = render_caddyfile(
            config.address(),
            &public_dir(config.project_root()),
        );

        let mut file = tempfile::Builder::new()
            .prefix(CADDYFILE_PREFIX)
            .tempfile()
            .map_err(RuntimeError::Artifact)?;
        file.write_all(caddyfile.as_bytes())
            .and_then(|()| file.flush())
            .map_err(RuntimeError::Artifact)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(path = %file.path().display(), "Wrote Caddyfile");

        let command = LaunchCommand::new(config.frankenphp_binary())
            .args(["run", "--config"])
            .arg(file.path().to_string_lossy())
            .hint(HINT)
            .env(ENV_APP_ENV, config.app_env())
            .current_dir(config.project_root());

        Ok(LaunchPlan::Spawn(
            SpawnLaunch::new(runtime, command).with_artifact(file),
        ))
    }

    fn probe(
        &self,
        runtime: Runtime,
        config: &RuntimeConfig,
        locator: &BinaryLocator,
    ) -> ProbeReport {
        let mut report = ProbeReport::new(runtime.as_str());

        check_binary(
            &mut report,
            locator,
            "frankenphp binary",
            config.frankenphp_binary(),
            HINT,
        );

        let public = config.project_root().join("public");
        if public.is_dir() {
            report.pass("public dir", public.display().to_string());
        } else {
            report.warn(
                "public dir",
                format!(
                    "not found: {} (serving from {})",
                    public.display(),
                    config.project_root().display()
                ),
            );
        }

        report
    }
}
