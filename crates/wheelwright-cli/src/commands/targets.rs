//! Target matrix inspection command.

use anyhow::{Context, Result};
use std::path::Path;

/// Print the targets a configuration expands to.
pub fn run(config_path: &str) -> Result<()> {
    let config = wheelwright_config::load_release_config(Path::new(config_path))
        .with_context(|| format!("Failed to read config file: {}", config_path))?;
    let targets = config.matrix.expand()?;

    println!(
        "{} {} expands to {} targets:",
        config.package,
        config.version,
        targets.len()
    );
    for target in &targets {
        let mut notes = Vec::new();
        if !target.run_tests {
            notes.push("tests skipped");
        }
        if !target.required {
            notes.push("failure allowed");
        }
        if notes.is_empty() {
            println!("  {}", target.label());
        } else {
            println!("  {} ({})", target.label(), notes.join(", "));
        }
    }
    if config.build.sdist_command.is_some() {
        println!("  sdist");
    }

    Ok(())
}
