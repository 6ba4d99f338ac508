//! Release configuration parsing.
//!
//! A `release.kdl` looks like:
//!
//! ```kdl
//! package "metrohash" version="2.0.3"
//! source "."
//!
//! matrix {
//!     os "linux" "macos" "windows"
//!     arch "x86_64" "aarch64"
//!     python "3.9" "3.10" "3.11" "3.12"
//!     exclude os="windows" arch="aarch64"
//!     skip-tests arch="aarch64"
//!     allow-failure os="macos" arch="aarch64"
//! }
//!
//! build {
//!     wheel "cibuildwheel --archs ${arch} --only ${python_tag}-* --output-dir ${output}"
//!     sdist "python -m build --sdist --outdir ${output}"
//!     test "pip install ${artifact} && pytest tests/"
//!     timeout-minutes 30
//!     jobs 4
//! }
//!
//! repository "testpypi" {
//!     url "https://test.pypi.org/legacy/"
//!     username-env "TESTPYPI_USERNAME"
//!     password-env "TESTPYPI_TOKEN"
//! }
//! ```

use crate::matrix::{MatrixSpec, Selector};
use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;
use wheelwright_core::release::{ReleaseRequest, Repository};
use wheelwright_core::target::{Arch, Os, PythonVersion};

/// Per-job timeout when the config does not set one. Emulated builds are
/// slow, so the default is generous.
const DEFAULT_TIMEOUT_MINUTES: u64 = 60;
/// Build parallelism when the config does not set one.
const DEFAULT_JOBS: usize = 4;
/// Credential variables twine-style tooling conventionally reads.
const DEFAULT_USERNAME_ENV: &str = "TWINE_USERNAME";
const DEFAULT_PASSWORD_ENV: &str = "TWINE_PASSWORD";

/// A parsed release configuration.
#[derive(Debug, Clone)]
pub struct ReleaseConfig {
    /// Package name.
    pub package: String,
    /// Version being released.
    pub version: String,
    /// Source checkout build commands run against.
    pub source_dir: PathBuf,
    /// Declared build matrix.
    pub matrix: MatrixSpec,
    /// Build commands and limits.
    pub build: BuildConfig,
    /// Repositories the release can be published to.
    pub repositories: Vec<Repository>,
}

/// Build commands and limits.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Command template for wheel builds.
    pub wheel_command: String,
    /// Command template for the sdist job; no sdist is built when unset.
    pub sdist_command: Option<String>,
    /// Command template run against each built wheel.
    pub test_command: Option<String>,
    /// Command that makes a foreign architecture runnable, with `${arch}`
    /// interpolated. Cross builds are refused when unset.
    pub emulation_command: Option<String>,
    /// Per-job timeout.
    pub timeout: Duration,
    /// Number of concurrent build jobs.
    pub jobs: usize,
    /// Extra environment for build commands.
    pub env: HashMap<String, String>,
    /// Host environment variables passed through to build commands.
    pub pass_env: Vec<String>,
}

impl ReleaseConfig {
    /// Look up a repository by the name it was declared with.
    pub fn repository(&self, name: &str) -> ConfigResult<&Repository> {
        self.repositories
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| {
                let available: Vec<&str> =
                    self.repositories.iter().map(|r| r.name.as_str()).collect();
                ConfigError::InvalidReference(format!(
                    "repository '{name}' is not defined (available: {})",
                    if available.is_empty() {
                        "none".to_string()
                    } else {
                        available.join(", ")
                    }
                ))
            })
    }

    /// Expand the matrix into a concrete release request.
    pub fn to_request(&self) -> ConfigResult<ReleaseRequest> {
        Ok(ReleaseRequest {
            package: self.package.clone(),
            version: self.version.clone(),
            targets: self.matrix.expand()?,
            sdist: self.build.sdist_command.is_some(),
        })
    }
}

/// Read and parse a release configuration file.
pub fn load_release_config(path: &Path) -> ConfigResult<ReleaseConfig> {
    let text = std::fs::read_to_string(path)?;
    parse_release_config(&text)
}

/// Parse a release configuration from KDL text.
pub fn parse_release_config(kdl: &str) -> ConfigResult<ReleaseConfig> {
    let doc: KdlDocument = kdl.parse()?;

    let mut package = String::new();
    let mut version = String::new();
    let mut source_dir = PathBuf::from(".");
    let mut matrix = None;
    let mut build = None;
    let mut repositories: Vec<Repository> = Vec::new();

    for node in doc.nodes() {
        match node.name().value() {
            "package" => {
                package = get_first_string_arg(node)
                    .ok_or_else(|| ConfigError::MissingField("package name".to_string()))?;
                version = get_string_prop(node, "version")
                    .ok_or_else(|| ConfigError::MissingField("package version".to_string()))?;
            }
            "source" => {
                if let Some(dir) = get_first_string_arg(node) {
                    source_dir = PathBuf::from(dir);
                }
            }
            "matrix" => {
                matrix = Some(parse_matrix(node)?);
            }
            "build" => {
                build = Some(parse_build(node)?);
            }
            "repository" => {
                let repository = parse_repository(node)?;
                if repositories.iter().any(|r| r.name == repository.name) {
                    return Err(ConfigError::Duplicate(format!(
                        "repository '{}'",
                        repository.name
                    )));
                }
                repositories.push(repository);
            }
            _ => {} // Ignore unknown nodes
        }
    }

    if package.is_empty() {
        return Err(ConfigError::MissingField("package name".to_string()));
    }

    Ok(ReleaseConfig {
        package,
        version,
        source_dir,
        matrix: matrix.ok_or_else(|| ConfigError::MissingField("matrix".to_string()))?,
        build: build.ok_or_else(|| ConfigError::MissingField("build".to_string()))?,
        repositories,
    })
}

fn parse_matrix(node: &KdlNode) -> ConfigResult<MatrixSpec> {
    let mut spec = MatrixSpec::default();

    let Some(children) = node.children() else {
        return Ok(spec);
    };
    for child in children.nodes() {
        match child.name().value() {
            "os" => {
                for value in get_all_string_args(child) {
                    spec.os.push(value.parse::<Os>()?);
                }
            }
            "arch" => {
                for value in get_all_string_args(child) {
                    spec.arch.push(value.parse::<Arch>()?);
                }
            }
            "python" => {
                for value in get_all_string_args(child) {
                    spec.python.push(value.parse::<PythonVersion>()?);
                }
            }
            "exclude" => {
                spec.excludes.push(parse_selector(child)?);
            }
            "include" => {
                spec.includes.push(parse_include(child)?);
            }
            "skip-tests" => {
                spec.skip_tests.push(parse_selector(child)?);
            }
            "allow-failure" => {
                spec.allow_failure.push(parse_selector(child)?);
            }
            _ => {}
        }
    }

    Ok(spec)
}

fn parse_selector(node: &KdlNode) -> ConfigResult<Selector> {
    Ok(Selector {
        os: get_string_prop(node, "os")
            .map(|v| v.parse::<Os>())
            .transpose()?,
        arch: get_string_prop(node, "arch")
            .map(|v| v.parse::<Arch>())
            .transpose()?,
        python: get_string_prop(node, "python")
            .map(|v| v.parse::<PythonVersion>())
            .transpose()?,
    })
}

fn parse_include(node: &KdlNode) -> ConfigResult<(Os, Arch, PythonVersion)> {
    let require = |dim: &str| {
        get_string_prop(node, dim)
            .ok_or_else(|| ConfigError::MissingField(format!("include {dim}")))
    };
    Ok((
        require("os")?.parse()?,
        require("arch")?.parse()?,
        require("python")?.parse()?,
    ))
}

fn parse_build(node: &KdlNode) -> ConfigResult<BuildConfig> {
    let mut wheel_command = None;
    let mut sdist_command = None;
    let mut test_command = None;
    let mut emulation_command = None;
    let mut timeout_minutes = DEFAULT_TIMEOUT_MINUTES;
    let mut jobs = DEFAULT_JOBS;
    let mut env = HashMap::new();
    let mut pass_env = Vec::new();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "wheel" => {
                    wheel_command = get_first_string_arg(child);
                }
                "sdist" => {
                    sdist_command = get_first_string_arg(child);
                }
                "test" => {
                    test_command = get_first_string_arg(child);
                }
                "emulation" => {
                    emulation_command = get_first_string_arg(child);
                }
                "timeout-minutes" => {
                    timeout_minutes = get_positive_int_arg(child, "timeout-minutes")?;
                }
                "jobs" => {
                    jobs = get_positive_int_arg(child, "jobs")? as usize;
                }
                "env" => {
                    if let Some(grandchildren) = child.children() {
                        for gc in grandchildren.nodes() {
                            let key = gc.name().value().to_string();
                            if let Some(val) = get_first_string_arg(gc) {
                                env.insert(key, val);
                            }
                        }
                    }
                }
                "pass-env" => {
                    pass_env.extend(get_all_string_args(child));
                }
                _ => {}
            }
        }
    }

    Ok(BuildConfig {
        wheel_command: wheel_command
            .ok_or_else(|| ConfigError::MissingField("build wheel command".to_string()))?,
        sdist_command,
        test_command,
        emulation_command,
        timeout: Duration::from_secs(timeout_minutes * 60),
        jobs,
        env,
        pass_env,
    })
}

fn parse_repository(node: &KdlNode) -> ConfigResult<Repository> {
    let name = get_first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField("repository name".to_string()))?;

    let mut url = None;
    let mut username_env = DEFAULT_USERNAME_ENV.to_string();
    let mut password_env = DEFAULT_PASSWORD_ENV.to_string();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "url" => {
                    url = get_first_string_arg(child);
                }
                "username-env" => {
                    if let Some(v) = get_first_string_arg(child) {
                        username_env = v;
                    }
                }
                "password-env" => {
                    if let Some(v) = get_first_string_arg(child) {
                        password_env = v;
                    }
                }
                _ => {}
            }
        }
    }

    let url = url.ok_or_else(|| {
        ConfigError::MissingField(format!("url for repository '{name}'"))
    })?;
    let url = Url::parse(&url).map_err(|e| ConfigError::InvalidValue {
        field: format!("repository '{name}' url"),
        message: e.to_string(),
    })?;

    Ok(Repository {
        name,
        url,
        username_env,
        password_env,
    })
}

// Helper functions for extracting values from KDL nodes

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_all_string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

fn get_positive_int_arg(node: &KdlNode, field: &str) -> ConfigResult<u64> {
    let value = node
        .entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_integer())
        .ok_or_else(|| ConfigError::MissingField(field.to_string()))?;
    u64::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| ConfigError::InvalidValue {
            field: field.to_string(),
            message: format!("must be a positive integer, got {value}"),
        })
}
