use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};

use runiva::{ServeCommand, ServeOptions};

#[derive(Parser)]
#[command(name = "runiva")]
#[command(about = "Run a PHP application under RoadRunner, Swoole/OpenSwoole or FrankenPHP", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the configured runtime in the foreground
    Serve {
        /// Runtime config file, e.g. rr.yaml
        config: Option<PathBuf>,

        #[arg(short, long)]
        runtime: Option<String>,

        #[arg(short, long)]
        binary: Option<String>,

        /// Project root (defaults to the current directory)
        #[arg(long)]
        root: Option<PathBuf>,

        /// Check the environment instead of starting the runtime
        #[arg(long)]
        check: bool,
    },

    Version,
}

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            runtime,
            binary,
            root,
            check,
        } => {
            let root = match root {
                Some(root) => root,
                None => std::env::current_dir()
                    .context("Failed to resolve the current directory")?,
            };

            let options = ServeOptions {
                root,
                config,
                runtime,
                binary,
                check,
            };

            let code = ServeCommand::new(options)
                .execute(&mut std::io::stdout().lock())
                .context("serve failed")?;

            Ok(ExitCode::from(code))
        }
        Commands::Version => {
            println!("runiva {}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::SUCCESS)
        }
    }
}
