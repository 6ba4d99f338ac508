//! Variable interpolation for build command templates.
//!
//! Supports variables like:
//! - `${os}` - target operating system (e.g. `linux`)
//! - `${arch}` - target architecture (e.g. `aarch64`)
//! - `${python}` - target python version (e.g. `3.11`)
//! - `${python_tag}` - CPython tag (e.g. `cp311`)
//! - `${package}` - package name
//! - `${output}` - directory built artifacts must be written to
//! - `${artifact}` - path of the file under test (test commands only)

use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use crate::target::BuildTarget;

// Regex for matching ${...} variables
static VAR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*)\}").unwrap());

/// Values available to one job's command templates.
#[derive(Debug, Clone, Default)]
pub struct TemplateVars {
    vars: HashMap<&'static str, String>,
}

impl TemplateVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_package(mut self, name: impl Into<String>) -> Self {
        self.vars.insert("package", name.into());
        self
    }

    pub fn with_target(mut self, target: &BuildTarget) -> Self {
        self.vars.insert("os", target.os.to_string());
        self.vars.insert("arch", target.arch.to_string());
        self.vars.insert("python", target.python.to_string());
        self.vars.insert("python_tag", target.python.tag());
        self
    }

    pub fn with_output(mut self, dir: &Path) -> Self {
        self.vars.insert("output", dir.display().to_string());
        self
    }

    pub fn with_artifact(mut self, path: &Path) -> Self {
        self.vars.insert("artifact", path.display().to_string());
        self
    }

    /// Interpolate all variables in a string.
    ///
    /// Unknown variables are preserved verbatim so a typo surfaces in the
    /// executed command instead of vanishing silently.
    pub fn interpolate(&self, input: &str) -> String {
        VAR_REGEX
            .replace_all(input, |caps: &regex::Captures| {
                let name = &caps[1];
                self.vars
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| format!("${{{name}}}"))
            })
            .to_string()
    }
}
