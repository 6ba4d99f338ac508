//! Build matrix expansion.

use std::collections::HashSet;

use crate::{ConfigError, ConfigResult};
use wheelwright_core::target::{Arch, BuildTarget, Os, PythonVersion};

/// A partial match over target dimensions, as written in `exclude`,
/// `skip-tests` and `allow-failure` rules. A dimension left unset matches
/// anything, so a selector with no dimensions matches every target.
#[derive(Debug, Clone, Copy, Default)]
pub struct Selector {
    pub os: Option<Os>,
    pub arch: Option<Arch>,
    pub python: Option<PythonVersion>,
}

impl Selector {
    pub fn matches(&self, os: Os, arch: Arch, python: PythonVersion) -> bool {
        self.os.is_none_or(|v| v == os)
            && self.arch.is_none_or(|v| v == arch)
            && self.python.is_none_or(|v| v == python)
    }
}

/// The declared build matrix, before expansion.
#[derive(Debug, Clone, Default)]
pub struct MatrixSpec {
    /// Operating system axis.
    pub os: Vec<Os>,
    /// Architecture axis.
    pub arch: Vec<Arch>,
    /// Python version axis.
    pub python: Vec<PythonVersion>,
    /// Combinations removed from the cross product.
    pub excludes: Vec<Selector>,
    /// Extra combinations added after excludes, so an include wins over an
    /// exclude for the same triple.
    pub includes: Vec<(Os, Arch, PythonVersion)>,
    /// Targets whose test phase is skipped.
    pub skip_tests: Vec<Selector>,
    /// Targets whose failure does not block publishing.
    pub allow_failure: Vec<Selector>,
}

impl MatrixSpec {
    /// Expand the matrix into a concrete, ordered, duplicate-free target
    /// list.
    ///
    /// Order of operations: cross product of the axes, minus excludes, plus
    /// includes, dedupe on (os, arch, python) keeping the first occurrence,
    /// then the skip-tests and allow-failure rules, sorted by
    /// (os, arch, python).
    pub fn expand(&self) -> ConfigResult<Vec<BuildTarget>> {
        for (axis, empty) in [
            ("matrix os", self.os.is_empty()),
            ("matrix arch", self.arch.is_empty()),
            ("matrix python", self.python.is_empty()),
        ] {
            if empty {
                return Err(ConfigError::MissingField(axis.to_string()));
            }
        }

        let mut triples = Vec::new();
        for &os in &self.os {
            for &arch in &self.arch {
                for &python in &self.python {
                    triples.push((os, arch, python));
                }
            }
        }

        triples.retain(|&(os, arch, python)| {
            !self.excludes.iter().any(|s| s.matches(os, arch, python))
        });
        triples.extend(self.includes.iter().copied());

        let mut seen = HashSet::new();
        triples.retain(|t| seen.insert(*t));

        if triples.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "matrix".to_string(),
                message: "expands to zero targets".to_string(),
            });
        }

        let mut targets: Vec<BuildTarget> = triples
            .into_iter()
            .map(|(os, arch, python)| {
                let mut target = BuildTarget::new(os, arch, python);
                target.run_tests = !self.skip_tests.iter().any(|s| s.matches(os, arch, python));
                target.required = !self
                    .allow_failure
                    .iter()
                    .any(|s| s.matches(os, arch, python));
                target
            })
            .collect();
        targets.sort_by_key(BuildTarget::key);
        Ok(targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> MatrixSpec {
        MatrixSpec {
            os: vec![Os::Linux, Os::Windows],
            arch: vec![Arch::X86_64, Arch::Aarch64],
            python: vec![PythonVersion::new(3, 9), PythonVersion::new(3, 10)],
            ..Default::default()
        }
    }

    #[test]
    fn cross_product_of_axes() {
        let targets = base().expand().unwrap();
        assert_eq!(targets.len(), 8);
    }

    #[test]
    fn output_is_sorted_regardless_of_axis_order() {
        let mut spec = base();
        spec.os = vec![Os::Windows, Os::Linux];
        spec.python = vec![PythonVersion::new(3, 10), PythonVersion::new(3, 9)];
        let targets = spec.expand().unwrap();
        let keys: Vec<_> = targets.iter().map(BuildTarget::key).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert_eq!(targets[0].label(), "linux-aarch64-cp39");
    }

    #[test]
    fn excludes_remove_matching_triples() {
        let mut spec = base();
        spec.excludes.push(Selector {
            os: Some(Os::Windows),
            arch: Some(Arch::Aarch64),
            python: None,
        });
        let targets = spec.expand().unwrap();
        assert_eq!(targets.len(), 6);
        assert!(
            !targets
                .iter()
                .any(|t| t.os == Os::Windows && t.arch == Arch::Aarch64)
        );
    }

    #[test]
    fn include_wins_over_exclude() {
        let mut spec = base();
        spec.excludes.push(Selector {
            os: Some(Os::Windows),
            ..Default::default()
        });
        spec.includes
            .push((Os::Windows, Arch::X86_64, PythonVersion::new(3, 10)));
        let targets = spec.expand().unwrap();
        let windows: Vec<_> = targets.iter().filter(|t| t.os == Os::Windows).collect();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].label(), "windows-x86_64-cp310");
    }

    #[test]
    fn include_already_in_product_is_deduplicated() {
        let mut spec = base();
        spec.includes
            .push((Os::Linux, Arch::X86_64, PythonVersion::new(3, 9)));
        let targets = spec.expand().unwrap();
        assert_eq!(targets.len(), 8);
    }

    #[test]
    fn skip_tests_and_allow_failure_rules_apply() {
        let mut spec = base();
        spec.skip_tests.push(Selector {
            arch: Some(Arch::Aarch64),
            ..Default::default()
        });
        spec.allow_failure.push(Selector {
            os: Some(Os::Windows),
            ..Default::default()
        });
        let targets = spec.expand().unwrap();
        for t in &targets {
            assert_eq!(t.run_tests, t.arch != Arch::Aarch64, "{t}");
            assert_eq!(t.required, t.os != Os::Windows, "{t}");
        }
    }

    #[test]
    fn rules_apply_to_included_targets_too() {
        let mut spec = base();
        spec.includes
            .push((Os::Macos, Arch::Aarch64, PythonVersion::new(3, 12)));
        spec.skip_tests.push(Selector {
            arch: Some(Arch::Aarch64),
            ..Default::default()
        });
        let targets = spec.expand().unwrap();
        let included = targets
            .iter()
            .find(|t| t.os == Os::Macos)
            .unwrap();
        assert!(!included.run_tests);
    }

    #[test]
    fn empty_expansion_is_an_error() {
        let mut spec = base();
        // A selector with no dimensions matches everything.
        spec.excludes.push(Selector::default());
        assert!(matches!(
            spec.expand().unwrap_err(),
            ConfigError::InvalidValue { .. }
        ));
    }

    #[test]
    fn missing_axis_is_an_error() {
        let mut spec = base();
        spec.python.clear();
        assert!(matches!(
            spec.expand().unwrap_err(),
            ConfigError::MissingField(_)
        ));
    }
}
