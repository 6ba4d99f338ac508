//! Local process executor implementation.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info};

use wheelwright_core::artifact::{ArtifactRef, ArtifactStore};
use wheelwright_core::executor::{BuildContext, Emulation, JobExecutor};
use wheelwright_core::job::{BuildJob, JobKind};
use wheelwright_core::target::{Arch, BuildTarget};
use wheelwright_core::template::TemplateVars;
use wheelwright_core::{Error, Result};

/// Runs build jobs as local child processes, one scratch directory per job.
///
/// Commands run with a cleared environment; only `PATH`, `HOME`, the
/// variables the config sets, and the ones it explicitly passes through
/// survive, so a build cannot accidentally depend on the operator's shell
/// setup. Any files a failed job leaves behind vanish with its scratch
/// directory, which is how partial artifacts are kept out of the store.
pub struct LocalExecutor {
    host: Option<Arch>,
    emulation: Arc<dyn Emulation>,
}

impl LocalExecutor {
    pub fn new(emulation: Arc<dyn Emulation>) -> Self {
        Self {
            host: Arch::host(),
            emulation,
        }
    }

    /// An unknown host architecture counts as foreign for everything.
    fn needs_emulation(&self, target: &BuildTarget) -> bool {
        self.host != Some(target.arch)
    }

    async fn run_logged(
        &self,
        command_line: &str,
        ctx: &BuildContext,
        tmp_dir: &Path,
        log: &std::fs::File,
    ) -> Result<std::process::ExitStatus> {
        use std::io::Write as _;
        let mut header = log.try_clone()?;
        writeln!(header, "$ {command_line}")?;

        let (shell, flag) = shell_invocation();
        let mut command = Command::new(shell);
        command
            .arg(flag)
            .arg(command_line)
            .current_dir(&ctx.source_dir)
            .env_clear()
            .env("TMPDIR", tmp_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log.try_clone()?))
            .stderr(Stdio::from(log.try_clone()?))
            // The worker enforces timeouts and cancellation by dropping
            // this future; the child must die with it.
            .kill_on_drop(true);
        for (key, value) in host_passthrough(&ctx.pass_env) {
            command.env(key, value);
        }
        for (key, value) in &ctx.env {
            command.env(key, value);
        }
        Ok(command.status().await?)
    }
}

#[async_trait]
impl JobExecutor for LocalExecutor {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn execute(
        &self,
        job: &BuildJob,
        ctx: &BuildContext,
        store: &ArtifactStore,
    ) -> Result<Vec<ArtifactRef>> {
        let label = job.label();
        tokio::fs::create_dir_all(&ctx.log_dir).await?;
        let log_path = ctx.log_path(&label);
        let log = std::fs::File::create(&log_path)?;

        if let JobKind::Wheel(target) = &job.kind {
            if self.needs_emulation(target) {
                debug!(job = %label, arch = %target.arch, "preparing emulation");
                self.emulation.prepare(target.arch).await?;
            }
        }

        let scratch = tempfile::tempdir()?;
        let output_dir = scratch.path().join("dist");
        std::fs::create_dir_all(&output_dir)?;

        let mut vars = TemplateVars::new()
            .with_package(&ctx.package)
            .with_output(&output_dir);
        let template = match &job.kind {
            JobKind::Wheel(target) => {
                vars = vars.with_target(target);
                &ctx.build_command
            }
            JobKind::Sdist => &ctx.sdist_command,
        };
        let command_line = vars.interpolate(template);

        info!(job = %label, "running build command");
        let status = self
            .run_logged(&command_line, ctx, scratch.path(), &log)
            .await?;
        if !status.success() {
            return Err(Error::Build(format!(
                "{label}: command exited with {status} (log: {})",
                log_path.display()
            )));
        }

        let files = collect_files(&output_dir)?;
        if files.is_empty() {
            return Err(Error::Build(format!(
                "{label}: build succeeded but produced no files in the output directory"
            )));
        }

        let run_tests = matches!(&job.kind, JobKind::Wheel(target) if target.run_tests);
        if run_tests {
            if let Some(test_template) = &ctx.test_command {
                for file in &files {
                    let test_line = vars.clone().with_artifact(file).interpolate(test_template);
                    debug!(job = %label, artifact = %file.display(), "running test command");
                    let status = self
                        .run_logged(&test_line, ctx, scratch.path(), &log)
                        .await?;
                    if !status.success() {
                        return Err(Error::Test(format!(
                            "{label}: test command exited with {status} (log: {})",
                            log_path.display()
                        )));
                    }
                }
            }
        }

        // Tests passed; only now do the files leave the scratch directory.
        store.deposit(job.id, &label, &files)
    }
}

/// Files directly under `dir`, sorted by name so deposit order does not
/// depend on readdir order.
fn collect_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Host variables that survive `env_clear`: the interpreter search path,
/// home (pip and friends cache there), and whatever the config passes.
fn host_passthrough(pass_env: &[String]) -> Vec<(String, String)> {
    ["PATH", "HOME"]
        .iter()
        .map(|v| v.to_string())
        .chain(pass_env.iter().cloned())
        .filter_map(|var| std::env::var(&var).ok().map(|value| (var, value)))
        .collect()
}

pub(crate) fn shell_invocation() -> (&'static str, &'static str) {
    #[cfg(unix)]
    {
        ("/bin/sh", "-c")
    }
    #[cfg(windows)]
    {
        ("powershell.exe", "-Command")
    }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use wheelwright_core::target::{Os, PythonVersion};

    struct NoEmulation;

    #[async_trait]
    impl Emulation for NoEmulation {
        async fn prepare(&self, arch: Arch) -> Result<()> {
            Err(Error::EmulationSetup(format!("not available for {arch}")))
        }
    }

    struct RecordingEmulation(std::sync::Mutex<Vec<Arch>>);

    #[async_trait]
    impl Emulation for RecordingEmulation {
        async fn prepare(&self, arch: Arch) -> Result<()> {
            self.0.lock().unwrap().push(arch);
            Ok(())
        }
    }

    fn executor() -> LocalExecutor {
        LocalExecutor::new(Arc::new(NoEmulation))
    }

    fn native_arch() -> Arch {
        Arch::host().unwrap_or(Arch::X86_64)
    }

    fn native_target() -> BuildTarget {
        BuildTarget::new(Os::Linux, native_arch(), PythonVersion::new(3, 11))
    }

    fn ctx(dirs: &tempfile::TempDir, build: &str, test: Option<&str>) -> BuildContext {
        BuildContext {
            package: "pkg".into(),
            source_dir: dirs.path().to_path_buf(),
            build_command: build.into(),
            test_command: test.map(String::from),
            sdist_command: "printf sdist > ${output}/pkg-1.0.tar.gz".into(),
            env: HashMap::new(),
            pass_env: Vec::new(),
            log_dir: dirs.path().join("logs"),
        }
    }

    fn wheel_job() -> BuildJob {
        BuildJob::new(JobKind::Wheel(native_target()))
    }

    #[tokio::test]
    async fn successful_build_deposits_artifacts() {
        let dirs = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dirs.path().join("store")).unwrap();
        let ctx = ctx(
            &dirs,
            "printf wheel-bytes > ${output}/pkg-1.0-${python_tag}-none-any.whl",
            None,
        );

        let refs = executor().execute(&wheel_job(), &ctx, &store).await.unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].name, "pkg-1.0-cp311-none-any.whl");
        assert_eq!(store.len(), 1);
        assert!(store.list()[0].path.exists());
    }

    #[tokio::test]
    async fn failed_build_leaves_store_empty_and_log_behind() {
        let dirs = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dirs.path().join("store")).unwrap();
        let ctx = ctx(&dirs, "echo compiling; exit 1", None);
        let job = wheel_job();

        let err = executor().execute(&job, &ctx, &store).await.unwrap_err();
        assert!(matches!(err, Error::Build(_)), "got {err:?}");
        assert!(store.is_empty());

        let log = std::fs::read_to_string(ctx.log_path(&job.label())).unwrap();
        assert!(log.contains("compiling"), "log was: {log}");
    }

    #[tokio::test]
    async fn build_with_no_output_files_fails() {
        let dirs = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dirs.path().join("store")).unwrap();
        let ctx = ctx(&dirs, "true", None);

        let err = executor().execute(&wheel_job(), &ctx, &store).await.unwrap_err();
        assert!(matches!(err, Error::Build(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn failing_test_keeps_artifacts_out_of_the_store() {
        let dirs = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dirs.path().join("store")).unwrap();
        let ctx = ctx(
            &dirs,
            "printf w > ${output}/pkg.whl",
            Some("test -f ${artifact} && exit 7"),
        );

        let err = executor().execute(&wheel_job(), &ctx, &store).await.unwrap_err();
        assert!(matches!(err, Error::Test(_)), "got {err:?}");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn passing_test_sees_the_built_artifact() {
        let dirs = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dirs.path().join("store")).unwrap();
        let ctx = ctx(
            &dirs,
            "printf w > ${output}/pkg.whl",
            Some("test -f ${artifact}"),
        );

        executor().execute(&wheel_job(), &ctx, &store).await.unwrap();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn skip_tests_target_never_runs_test_command() {
        let dirs = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dirs.path().join("store")).unwrap();
        // A test command that would fail if it ran.
        let ctx = ctx(&dirs, "printf w > ${output}/pkg.whl", Some("exit 1"));

        let mut target = native_target();
        target.run_tests = false;
        let job = BuildJob::new(JobKind::Wheel(target));
        executor().execute(&job, &ctx, &store).await.unwrap();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn sdist_job_uses_the_sdist_command() {
        let dirs = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dirs.path().join("store")).unwrap();
        let ctx = ctx(&dirs, "exit 1", None);

        let refs = executor()
            .execute(&BuildJob::new(JobKind::Sdist), &ctx, &store)
            .await
            .unwrap();
        assert_eq!(refs[0].name, "pkg-1.0.tar.gz");
    }

    #[tokio::test]
    async fn foreign_arch_without_emulation_fails_setup() {
        let dirs = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dirs.path().join("store")).unwrap();
        let ctx = ctx(&dirs, "printf w > ${output}/pkg.whl", None);

        let foreign = if native_arch() == Arch::Aarch64 {
            Arch::X86_64
        } else {
            Arch::Aarch64
        };
        let job = BuildJob::new(JobKind::Wheel(BuildTarget::new(
            Os::Linux,
            foreign,
            PythonVersion::new(3, 11),
        )));
        let err = executor().execute(&job, &ctx, &store).await.unwrap_err();
        assert!(matches!(err, Error::EmulationSetup(_)), "got {err:?}");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn native_arch_skips_emulation() {
        let dirs = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dirs.path().join("store")).unwrap();
        let ctx = ctx(&dirs, "printf w > ${output}/pkg.whl", None);

        if Arch::host().is_none() {
            return;
        }
        let recorder = Arc::new(RecordingEmulation(std::sync::Mutex::new(Vec::new())));
        let executor = LocalExecutor::new(recorder.clone());
        executor.execute(&wheel_job(), &ctx, &store).await.unwrap();
        assert!(recorder.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn config_env_reaches_the_build_command() {
        let dirs = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dirs.path().join("store")).unwrap();
        let mut ctx = ctx(&dirs, "printf w > ${output}/wheel-$MARKER.whl", None);
        ctx.env.insert("MARKER".into(), "abc".into());

        let refs = executor().execute(&wheel_job(), &ctx, &store).await.unwrap();
        assert_eq!(refs[0].name, "wheel-abc.whl");
    }
}
