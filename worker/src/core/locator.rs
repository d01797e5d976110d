//! Runner module locator validation and normalization.
//!
//! The pool names the runner module with an absolute path or a URL.
//! Relative paths are rejected outright: isolation units do not share a
//! working directory, so relative resolution would be ambiguous.

use std::fmt;
use std::sync::LazyLock;

use crate::error::ConfigurationError;

static SCHEME_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:").unwrap());

/// Normalized runner module locator. Always URL-shaped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleUrl(String);

impl ModuleUrl {
    /// Validate and normalize a raw locator.
    ///
    /// Relative locators (leading `.`) fail with
    /// [`ConfigurationError::RelativeRunnerLocator`]. URL-shaped
    /// locators are kept byte-for-byte; bare paths become `file://`
    /// URLs.
    pub fn normalize(locator: &str) -> Result<Self, ConfigurationError> {
        if locator.starts_with('.') {
            return Err(ConfigurationError::RelativeRunnerLocator {
                locator: locator.to_string(),
            });
        }
        if SCHEME_RE.is_match(locator) {
            return Ok(Self(locator.to_string()));
        }
        Ok(Self(format!("file://{locator}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_locator_is_rejected_with_the_received_literal() {
        let err = ModuleUrl::normalize("./runner.rs").expect_err("must reject");
        assert!(matches!(
            &err,
            ConfigurationError::RelativeRunnerLocator { locator } if locator == "./runner.rs"
        ));
        assert!(err.to_string().contains("\"./runner.rs\""));
    }

    #[test]
    fn parent_relative_locator_is_rejected() {
        ModuleUrl::normalize("../runner.rs").expect_err("must reject");
    }

    #[test]
    fn absolute_path_becomes_file_url() {
        let url = ModuleUrl::normalize("/opt/runners/basic.rs").expect("normalize");
        assert_eq!(url.as_str(), "file:///opt/runners/basic.rs");
    }

    #[test]
    fn url_shaped_locator_is_kept_untouched() {
        for locator in ["file:///opt/runner.rs", "builtin:noop", "https://example.com/r"] {
            let url = ModuleUrl::normalize(locator).expect("normalize");
            assert_eq!(url.as_str(), locator);
        }
    }
}
