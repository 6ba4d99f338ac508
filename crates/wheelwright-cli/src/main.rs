//! Wheelwright CLI tool.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "wheelwright")]
#[command(about = "Build and publish Python release artifacts", long_about = None)]
struct Cli {
    /// Release configuration file
    #[arg(
        long,
        env = "WHEELWRIGHT_CONFIG",
        default_value = "release.kdl",
        global = true
    )]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build every target, then publish to a repository
    Release {
        /// Repository name from the configuration
        #[arg(long)]
        repository: String,
        /// Directory artifacts are collected in
        #[arg(long, default_value = "wheelhouse")]
        output: String,
        /// Write a JSON run report to this path
        #[arg(long)]
        report: Option<String>,
        /// Override the configured number of parallel jobs
        #[arg(long)]
        jobs: Option<usize>,
        /// Override the configured per-job timeout
        #[arg(long)]
        timeout_minutes: Option<u64>,
    },
    /// Build every target without publishing
    Build {
        /// Directory artifacts are collected in
        #[arg(long, default_value = "wheelhouse")]
        output: String,
        /// Write a JSON run report to this path
        #[arg(long)]
        report: Option<String>,
        /// Override the configured number of parallel jobs
        #[arg(long)]
        jobs: Option<usize>,
        /// Override the configured per-job timeout
        #[arg(long)]
        timeout_minutes: Option<u64>,
    },
    /// Print the expanded target matrix
    Targets,
    /// Validate a release configuration
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Release {
            repository,
            output,
            report,
            jobs,
            timeout_minutes,
        } => {
            let overrides = commands::release::Overrides {
                jobs,
                timeout_minutes,
            };
            let code = commands::release::run(
                &cli.config,
                Some(&repository),
                &output,
                report.as_deref(),
                overrides,
            )
            .await?;
            if code != 0 {
                std::process::exit(code);
            }
        }
        Commands::Build {
            output,
            report,
            jobs,
            timeout_minutes,
        } => {
            let overrides = commands::release::Overrides {
                jobs,
                timeout_minutes,
            };
            let code =
                commands::release::run(&cli.config, None, &output, report.as_deref(), overrides)
                    .await?;
            if code != 0 {
                std::process::exit(code);
            }
        }
        Commands::Targets => {
            commands::targets::run(&cli.config)?;
        }
        Commands::Validate => {
            commands::validate(&cli.config)?;
        }
    }

    Ok(())
}
