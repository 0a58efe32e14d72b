use super::{EmbeddedLaunch, LaunchPlan, Runtime, RuntimeDriver, RuntimeError};
use crate::config::{
    RuntimeConfig, ENV_ADDRESS, ENV_APP_ENV, ENV_RUNTIME, ENV_WORKERS,
};
use crate::probe::{check_binary, php_modules, ProbeReport};
use crate::process::{BinaryLocator, LaunchCommand};

const HINT: &str = "set RUNIVA_PHP or install php";

/// Extension names that provide the server loop.
const EXTENSIONS: [&str; 2] = ["swoole", "openswoole"];

/// Swoole and OpenSwoole live inside the interpreter, so the plan starts
/// `php <bootstrap>` and hands it the resolved settings through the
/// environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct SwooleDriver;

impl RuntimeDriver for SwooleDriver {
    fn name(&self) -> &'static str {
        "swoole"
    }

    fn plan(
        &self,
        runtime: Runtime,
        config: &RuntimeConfig,
    ) -> Result<LaunchPlan, RuntimeError> {
        let script = config.bootstrap();
        let address = config.address().clone();

        let command = LaunchCommand::new(config.php_binary())
            .arg(script.to_string_lossy())
            .hint(HINT)
            .env(ENV_RUNTIME, runtime.as_str())
            .env(ENV_ADDRESS, address.to_string())
            .env(ENV_WORKERS, config.workers().to_string())
            .env(ENV_APP_ENV, config.app_env())
            .current_dir(config.project_root());

        Ok(LaunchPlan::InProcess(EmbeddedLaunch {
            runtime,
            interpreter: config.php_binary().to_string(),
            script,
            address,
            workers: config.workers(),
            command,
        }))
    }

    fn probe(
        &self,
        runtime: Runtime,
        config: &RuntimeConfig,
        locator: &BinaryLocator,
    ) -> ProbeReport {
        let mut report = ProbeReport::new(runtime.as_str());

        let php = locator.locate(config.php_binary());
        check_binary(&mut report, locator, "php", config.php_binary(), HINT);

        match php.map(|path| php_modules(&path)) {
            Some(Ok(modules)) => {
                match EXTENSIONS
                    .iter()
                    .find(|ext| modules.iter().any(|m| m == *ext))
                {
                    Some(ext) => report.pass("extension", format!("{} loaded", ext)),
                    None => report.fail("extension", "Swoole/OpenSwoole extension not loaded"),
                }
            }
            Some(Err(e)) => report.fail(
                "extension",
                format!("could not list PHP extensions: {}", e),
            ),
            None => report.fail("extension", "Swoole/OpenSwoole extension not loaded"),
        }

        let script = config.bootstrap();
        if script.is_file() {
            report.pass("bootstrap", script.display().to_string());
        } else {
            report.warn(
                "bootstrap",
                format!("not found: {} (set RUNIVA_BOOTSTRAP)", script.display()),
            );
        }

        report
    }
}
