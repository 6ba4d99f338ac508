//! Local release execution command.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;

use wheelwright_core::artifact::ArtifactStore;
use wheelwright_core::executor::{BuildContext, Emulation};
use wheelwright_core::job::JobStatus;
use wheelwright_core::release::Credentials;
use wheelwright_executor::{CommandEmulation, LocalExecutor, NativeOnly};
use wheelwright_publisher::HttpIndexClient;
use wheelwright_scheduler::{
    Destination, ReleaseCoordinator, ReleaseEvent, RunOptions, RunOutcome,
};

/// Flag overrides applied on top of the configuration.
#[derive(Default)]
pub struct Overrides {
    pub jobs: Option<usize>,
    pub timeout_minutes: Option<u64>,
}

/// Run a release locally, publishing to `repository` when one is given.
pub async fn run(
    config_path: &str,
    repository: Option<&str>,
    output: &str,
    report_path: Option<&str>,
    overrides: Overrides,
) -> Result<i32> {
    let config = wheelwright_config::load_release_config(Path::new(config_path))
        .with_context(|| format!("Failed to read config file: {}", config_path))?;
    let request = config.to_request()?;

    // Resolve the destination before anything builds, so a missing token
    // fails in milliseconds instead of after the whole matrix.
    let destination = match repository {
        Some(name) => {
            let repo = config.repository(name)?.clone();
            let credentials = Credentials::from_env(&repo)?;
            let client = Arc::new(HttpIndexClient::new(&request.package, &request.version)?);
            Some(Destination {
                repository: repo,
                credentials,
                client,
            })
        }
        None => None,
    };

    // Build commands run relative to the config file's directory.
    let config_dir = Path::new(config_path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let source_dir = config_dir
        .join(&config.source_dir)
        .canonicalize()
        .with_context(|| format!("Failed to resolve source dir {}", config.source_dir.display()))?;

    println!("Releasing {} {}", request.package, request.version);
    println!("Source: {}", source_dir.display());
    println!("Jobs: {}\n", request.job_count());

    let store = Arc::new(ArtifactStore::open(output)?);
    let ctx = BuildContext {
        package: request.package.clone(),
        source_dir,
        build_command: config.build.wheel_command.clone(),
        test_command: config.build.test_command.clone(),
        sdist_command: config.build.sdist_command.clone().unwrap_or_default(),
        env: config.build.env.clone(),
        pass_env: config.build.pass_env.clone(),
        log_dir: Path::new(output).join("logs"),
    };

    let emulation: Arc<dyn Emulation> = match &config.build.emulation_command {
        Some(command) => Arc::new(CommandEmulation::new(command.clone())),
        None => Arc::new(NativeOnly),
    };
    let executor = Arc::new(LocalExecutor::new(emulation));

    // Ctrl-C flips the cancel flag; workers finish nothing further and
    // the run reports as cancelled.
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupt received, cancelling...");
            let _ = cancel_tx.send(true);
        }
    });

    let coordinator = ReleaseCoordinator::new(executor);
    let options = RunOptions {
        jobs: overrides.jobs.unwrap_or(config.build.jobs),
        timeout: overrides
            .timeout_minutes
            .map(|m| std::time::Duration::from_secs(m * 60))
            .unwrap_or(config.build.timeout),
        destination,
        cancel: cancel_rx,
    };
    let (mut rx, handle) = coordinator.execute(request, ctx, store.clone(), options);

    // Process events concurrently with execution
    while let Some(event) = rx.recv().await {
        match event {
            ReleaseEvent::JobStarted { label } => {
                println!("▶ {} started", label);
            }
            ReleaseEvent::JobFinished { label, status } => match status {
                JobStatus::Succeeded => println!("✓ {} succeeded", label),
                JobStatus::Failed { message } => println!("✗ {} failed: {}", label, message),
                JobStatus::Cancelled => println!("⊘ {} cancelled", label),
                _ => {}
            },
            ReleaseEvent::PublishStarted { repository, files } => {
                println!("\nPublishing {} files to {}", files, repository);
            }
            ReleaseEvent::PublishFinished { succeeded } => {
                if !succeeded {
                    println!("Publish did not complete cleanly");
                }
            }
            ReleaseEvent::Completed { .. } => {}
        }
    }

    let report = handle.await.context("Release task failed")?;

    println!("\n--- Job summary ---");
    for job in &report.jobs {
        let status = match &job.status {
            JobStatus::Succeeded => "✓ succeeded".to_string(),
            JobStatus::Failed { message } => format!("✗ failed: {}", message),
            JobStatus::Cancelled => "⊘ cancelled".to_string(),
            other => format!("{:?}", other),
        };
        println!("  {} - {}", job.label, status);
    }

    if let Some(publish) = &report.publish {
        println!("\n--- Publish summary ---");
        if let Some(fatal) = &publish.fatal {
            println!("  aborted: {}", fatal);
        }
        println!(
            "  {} uploaded, {} already present, {} failed, {} skipped",
            publish.uploaded(),
            publish.already_present(),
            publish.failed(),
            publish.skipped()
        );
    }

    if let Some(path) = report_path {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path))?;
        println!("\nReport written to {}", path);
    }

    match report.outcome {
        RunOutcome::Published => println!("\n✓ Release published"),
        RunOutcome::Built => println!(
            "\n✓ Build succeeded, {} artifacts in {}",
            store.len(),
            output
        ),
        RunOutcome::BuildFailed => println!("\n✗ Build failed; nothing was published"),
        RunOutcome::PublishFailed => println!("\n✗ Publish failed"),
        RunOutcome::Cancelled => println!("\n⊘ Release cancelled"),
    }

    Ok(report.outcome.exit_code())
}
