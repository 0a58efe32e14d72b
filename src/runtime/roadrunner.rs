use super::{LaunchPlan, Runtime, RuntimeDriver, RuntimeError, SpawnLaunch};
use crate::config::{RuntimeConfig, ENV_APP_ENV};
use crate::probe::{
    check_binary, check_vendor_package, ProbeReport, PSR7_BRIDGE_PACKAGES,
    ROADRUNNER_HTTP_PACKAGE,
};
use crate::process::{BinaryLocator, LaunchCommand};

const HINT: &str = "set RUNIVA_BINARY or install rr";

/// `rr serve [-c <config>]`; RoadRunner spawns and supervises the PHP
/// workers itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoadRunnerDriver;

impl RuntimeDriver for RoadRunnerDriver {
    fn name(&self) -> &'static str {
        "roadrunner"
    }

    fn plan(
        &self,
        runtime: Runtime,
        config: &RuntimeConfig,
    ) -> Result<LaunchPlan, RuntimeError> {
        let mut command = LaunchCommand::new(config.binary())
            .arg("serve")
            .hint(HINT);

        if let Some(path) = config.config_path() {
            command = command
                .arg("-c")
                .arg(path.to_string_lossy());
        }

        let command = command
            .env(ENV_APP_ENV, config.app_env())
            .current_dir(config.project_root());

        Ok(LaunchPlan::Spawn(SpawnLaunch::new(runtime, command)))
    }

    fn probe(
        &self,
        runtime: Runtime,
        config: &RuntimeConfig,
        locator: &BinaryLocator,
    ) -> ProbeReport {
        let mut report = ProbeReport::new(runtime.as_str());

        check_binary(&mut report, locator, "rr binary", config.binary(), HINT);

        match config.config_path() {
            Some(path) if path.is_file() => {
                report.pass("rr config", path.display().to_string())
            }
            Some(path) => report.warn(
                "rr config",
                format!("not found: {} (rr falls back to its defaults)", path.display()),
            ),
            None => report.warn("rr config", "not configured"),
        }

        let root = config.project_root();
        for package in PSR7_BRIDGE_PACKAGES {
            check_vendor_package(&mut report, root, package);
        }
        check_vendor_package(&mut report, root, ROADRUNNER_HTTP_PACKAGE);

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::CheckStatus;

    #[test]
    fn test_plan_passes_config_and_app_env() {
        let config = RuntimeConfig::defaults("/srv/app")
            .with_binary("/opt/bin/rr")
            .with_app_env("production");

        let plan = RoadRunnerDriver
            .plan(Runtime::RoadRunner, &config)
            .unwrap();
        let cmd = plan.command();

        assert!(!plan.is_in_process());
        assert_eq!(cmd.program(), "/opt/bin/rr");
        assert_eq!(cmd.get_args(), ["serve", "-c", "/srv/app/rr.yaml"]);
        assert_eq!(
            cmd.get_env(),
            [("APP_ENV".to_string(), "production".to_string())]
        );
        assert_eq!(
            cmd.get_current_dir(),
            Some(std::path::Path::new("/srv/app"))
        );
        assert!(plan.artifact().is_none());
    }

    #[test]
    fn test_plan_without_config() {
        let config = RuntimeConfig::defaults("/srv/app").with_config("");
        let plan = RoadRunnerDriver
            .plan(Runtime::RoadRunner, &config)
            .unwrap();

        assert_eq!(plan.command().get_args(), ["serve"]);
    }

    #[test]
    fn test_probe_missing_binary_and_bridge() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("rr.yaml"), "version: '3'\n").unwrap();

        let config = RuntimeConfig::defaults(dir.path()).with_binary("rr-missing-2231");
        let locator = BinaryLocator::with_search_path(dir.path());
        let report = RoadRunnerDriver.probe(Runtime::RoadRunner, &config, &locator);

        assert!(!report.passed());

        let statuses: Vec<_> = report
            .checks()
            .iter()
            .map(|c| (c.name.as_str(), c.status))
            .collect();
        assert_eq!(
            statuses,
            vec![
                ("rr binary", CheckStatus::Fail),
                ("rr config", CheckStatus::Pass),
                ("nyholm/psr7", CheckStatus::Warn),
                ("symfony/psr-http-message-bridge", CheckStatus::Warn),
                ("spiral/roadrunner-http", CheckStatus::Warn),
            ]
        );
        assert!(report.checks()[0]
            .detail
            .contains("set RUNIVA_BINARY or install rr"));
    }
}
