//! CLI command implementations.

pub mod release;
pub mod targets;

use anyhow::Result;
use std::path::Path;

pub fn validate(path: &str) -> Result<()> {
    let loaded = wheelwright_config::load_release_config(Path::new(path)).and_then(|config| {
        let request = config.to_request()?;
        Ok((config, request))
    });

    match loaded {
        Ok((config, request)) => {
            println!("Configuration is valid");
            println!("  package: {} {}", request.package, request.version);
            let sdist = if request.sdist { " + sdist" } else { "" };
            println!(
                "  jobs: {} ({} wheels{})",
                request.job_count(),
                request.targets.len(),
                sdist
            );
            let repositories: Vec<_> = config
                .repositories
                .iter()
                .map(|r| r.name.as_str())
                .collect();
            println!("  repositories: {}", repositories.join(", "));
            Ok(())
        }
        Err(e) => {
            println!("Configuration error: {}", e);
            std::process::exit(1);
        }
    }
}
