//! Emulation setup strategies for cross-architecture builds.

use async_trait::async_trait;
use std::collections::HashSet;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::info;

use wheelwright_core::executor::Emulation;
use wheelwright_core::target::Arch;
use wheelwright_core::{Error, Result};

/// Refuses every foreign architecture. The default when no emulation
/// command is configured.
pub struct NativeOnly;

#[async_trait]
impl Emulation for NativeOnly {
    async fn prepare(&self, arch: Arch) -> Result<()> {
        Err(Error::EmulationSetup(format!(
            "no emulation command configured; cannot build {arch} wheels on this host"
        )))
    }
}

/// Prepares a foreign architecture by running a configured command once,
/// e.g. `docker run --privileged --rm tonistiigi/binfmt --install ${arch}`
/// to register qemu binfmt handlers.
pub struct CommandEmulation {
    command: String,
    prepared: Mutex<HashSet<Arch>>,
}

impl CommandEmulation {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            prepared: Mutex::new(HashSet::new()),
        }
    }
}

#[async_trait]
impl Emulation for CommandEmulation {
    async fn prepare(&self, arch: Arch) -> Result<()> {
        // Held across the command so concurrent jobs for one architecture
        // trigger a single registration.
        let mut prepared = self.prepared.lock().await;
        if prepared.contains(&arch) {
            return Ok(());
        }

        let command_line = self.command.replace("${arch}", arch.as_str());
        info!(%arch, command = %command_line, "preparing emulation");
        let (shell, flag) = crate::local::shell_invocation();
        let output = Command::new(shell)
            .arg(flag)
            .arg(&command_line)
            .output()
            .await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::EmulationSetup(format!(
                "'{command_line}' exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        prepared.insert(arch);
        Ok(())
    }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn native_only_rejects_everything() {
        let err = NativeOnly.prepare(Arch::Aarch64).await.unwrap_err();
        assert!(matches!(err, Error::EmulationSetup(_)));
    }

    #[tokio::test]
    async fn command_runs_once_per_architecture() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("calls");
        let emulation = CommandEmulation::new(format!(
            "echo ${{arch}} >> {}",
            marker.display()
        ));

        emulation.prepare(Arch::Aarch64).await.unwrap();
        emulation.prepare(Arch::Aarch64).await.unwrap();
        emulation.prepare(Arch::I686).await.unwrap();

        let calls = std::fs::read_to_string(&marker).unwrap();
        let lines: Vec<&str> = calls.lines().collect();
        assert_eq!(lines, vec!["aarch64", "i686"]);
    }

    #[tokio::test]
    async fn failing_command_is_an_emulation_setup_error() {
        let emulation = CommandEmulation::new("echo broken >&2; exit 1");
        let err = emulation.prepare(Arch::Aarch64).await.unwrap_err();
        match err {
            Error::EmulationSetup(msg) => assert!(msg.contains("broken"), "got: {msg}"),
            other => panic!("expected EmulationSetup, got {other:?}"),
        }

        // A failed attempt is not memoized; the next job retries.
        let err = emulation.prepare(Arch::Aarch64).await.unwrap_err();
        assert!(matches!(err, Error::EmulationSetup(_)));
    }
}
