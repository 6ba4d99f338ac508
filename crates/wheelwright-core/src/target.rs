//! Build targets: the (os, architecture, python version) combinations a
//! release is built for.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error parsing a target dimension value.
#[derive(Debug, Error)]
#[error("unknown {dimension} value: {value}")]
pub struct ParseTargetError {
    pub dimension: &'static str,
    pub value: String,
}

/// Operating system a wheel is built for.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    Linux,
    Macos,
    Windows,
}

impl Os {
    pub fn as_str(&self) -> &'static str {
        match self {
            Os::Linux => "linux",
            Os::Macos => "macos",
            Os::Windows => "windows",
        }
    }
}

impl std::fmt::Display for Os {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Os {
    type Err = ParseTargetError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "linux" => Ok(Os::Linux),
            "macos" => Ok(Os::Macos),
            "windows" => Ok(Os::Windows),
            _ => Err(ParseTargetError {
                dimension: "os",
                value: s.to_string(),
            }),
        }
    }
}

/// CPU architecture a wheel is built for.
///
/// The values mirror what auditwheel/cibuildwheel call architectures
/// (`x86_64`, `aarch64`, `i686`); `arm64` is accepted as the macOS spelling
/// of aarch64.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    Aarch64,
    I686,
    X86_64,
}

impl Arch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::Aarch64 => "aarch64",
            Arch::I686 => "i686",
            Arch::X86_64 => "x86_64",
        }
    }

    /// The architecture of the machine this process is running on, if it is
    /// one wheelwright knows how to build for.
    pub fn host() -> Option<Arch> {
        match std::env::consts::ARCH {
            "x86_64" => Some(Arch::X86_64),
            "aarch64" => Some(Arch::Aarch64),
            "x86" => Some(Arch::I686),
            _ => None,
        }
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Arch {
    type Err = ParseTargetError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "aarch64" | "arm64" => Ok(Arch::Aarch64),
            "i686" => Ok(Arch::I686),
            "x86_64" => Ok(Arch::X86_64),
            _ => Err(ParseTargetError {
                dimension: "arch",
                value: s.to_string(),
            }),
        }
    }
}

/// A CPython version, e.g. `3.9`.
///
/// Ordered numerically so that 3.10 sorts after 3.9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct PythonVersion {
    pub major: u8,
    pub minor: u8,
}

impl PythonVersion {
    pub fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// The CPython tag, e.g. `cp39` or `cp310`.
    pub fn tag(&self) -> String {
        format!("cp{}{}", self.major, self.minor)
    }
}

impl std::fmt::Display for PythonVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl std::str::FromStr for PythonVersion {
    type Err = ParseTargetError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let err = || ParseTargetError {
            dimension: "python",
            value: s.to_string(),
        };
        let (major, minor) = s.split_once('.').ok_or_else(err)?;
        Ok(Self {
            major: major.parse().map_err(|_| err())?,
            minor: minor.parse().map_err(|_| err())?,
        })
    }
}

impl From<PythonVersion> for String {
    fn from(v: PythonVersion) -> Self {
        v.to_string()
    }
}

impl TryFrom<String> for PythonVersion {
    type Error = ParseTargetError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}

/// One concrete combination to build a wheel for.
///
/// Identity is the (os, arch, python) triple; `run_tests` and `required`
/// are derived from matrix rules during expansion and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildTarget {
    pub os: Os,
    pub arch: Arch,
    pub python: PythonVersion,
    /// Whether the test command runs against the built wheel. Skip rules
    /// turn this off, e.g. for emulated architectures where tests are
    /// prohibitively slow.
    pub run_tests: bool,
    /// Whether a failure of this target blocks the publish phase.
    pub required: bool,
}

impl BuildTarget {
    pub fn new(os: Os, arch: Arch, python: PythonVersion) -> Self {
        Self {
            os,
            arch,
            python,
            run_tests: true,
            required: true,
        }
    }

    /// The dedupe/ordering key.
    pub fn key(&self) -> (Os, Arch, PythonVersion) {
        (self.os, self.arch, self.python)
    }

    /// Human-readable label, e.g. `linux-x86_64-cp39`.
    pub fn label(&self) -> String {
        format!("{}-{}-{}", self.os, self.arch, self.python.tag())
    }
}

impl std::fmt::Display for BuildTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_dimension_values() {
        assert_eq!("linux".parse::<Os>().unwrap(), Os::Linux);
        assert_eq!("arm64".parse::<Arch>().unwrap(), Arch::Aarch64);
        assert_eq!("x86_64".parse::<Arch>().unwrap(), Arch::X86_64);
        assert!("freebsd".parse::<Os>().is_err());
        assert!("mips".parse::<Arch>().is_err());
    }

    #[test]
    fn python_version_orders_numerically() {
        let v39: PythonVersion = "3.9".parse().unwrap();
        let v310: PythonVersion = "3.10".parse().unwrap();
        assert!(v39 < v310);
        assert_eq!(v310.tag(), "cp310");
        assert_eq!(v310.to_string(), "3.10");
    }

    #[test]
    fn python_version_rejects_garbage() {
        assert!("39".parse::<PythonVersion>().is_err());
        assert!("3.x".parse::<PythonVersion>().is_err());
        assert!("".parse::<PythonVersion>().is_err());
    }

    #[test]
    fn target_label_format() {
        let t = BuildTarget::new(Os::Linux, Arch::X86_64, PythonVersion::new(3, 9));
        assert_eq!(t.label(), "linux-x86_64-cp39");
        assert!(t.run_tests);
        assert!(t.required);
    }
}
