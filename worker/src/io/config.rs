//! Worker options stored as TOML, and the per-invocation resolved
//! configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::types::TestConfig;
use crate::error::ConfigurationError;

/// Worker options (TOML).
///
/// This file is intended to be edited by humans and must remain stable
/// and automatable. Missing fields default to sensible values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorkerOptions {
    /// Default wall-clock budget for one controller request, seconds.
    pub request_timeout_secs: u64,
    /// Budget for flushing in-flight channel operations at teardown.
    pub drain_timeout_secs: u64,
    /// Arm the inspection hook even when the context config does not
    /// ask for it.
    pub inspect: bool,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            drain_timeout_secs: 10,
            inspect: false,
        }
    }
}

impl WorkerOptions {
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_secs == 0 {
            return Err(anyhow!("request_timeout_secs must be > 0"));
        }
        if self.drain_timeout_secs == 0 {
            return Err(anyhow!("drain_timeout_secs must be > 0"));
        }
        Ok(())
    }
}

/// Load options from a TOML file.
///
/// If the file is missing, returns `WorkerOptions::default()`.
pub fn load_options(path: &Path) -> Result<WorkerOptions> {
    if !path.exists() {
        let options = WorkerOptions::default();
        options.validate()?;
        return Ok(options);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let options: WorkerOptions =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    options.validate()?;
    Ok(options)
}

/// Per-invocation configuration after merging the context's test config
/// over the worker options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub name: Option<String>,
    pub root: PathBuf,
    pub inspect: bool,
    pub request_timeout: Duration,
    pub drain_timeout: Duration,
}

/// Context config wins where set; worker options fill the rest.
pub fn resolve_config(
    config: &TestConfig,
    options: &WorkerOptions,
) -> Result<ResolvedConfig, ConfigurationError> {
    let request_timeout_secs = config
        .request_timeout_secs
        .unwrap_or(options.request_timeout_secs);
    let drain_timeout_secs = config
        .drain_timeout_secs
        .unwrap_or(options.drain_timeout_secs);
    if request_timeout_secs == 0 {
        return Err(ConfigurationError::InvalidOptions {
            reason: "request_timeout_secs must be > 0".to_string(),
        });
    }
    if drain_timeout_secs == 0 {
        return Err(ConfigurationError::InvalidOptions {
            reason: "drain_timeout_secs must be > 0".to_string(),
        });
    }
    Ok(ResolvedConfig {
        name: config.name.clone(),
        root: config.root.clone().unwrap_or_else(|| PathBuf::from(".")),
        inspect: config.inspect || options.inspect,
        request_timeout: Duration::from_secs(request_timeout_secs),
        drain_timeout: Duration::from_secs(drain_timeout_secs),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let options = load_options(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(options, WorkerOptions::default());
    }

    #[test]
    fn load_parses_partial_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("worker.toml");
        fs::write(&path, "request_timeout_secs = 5\n").expect("write");

        let options = load_options(&path).expect("load");
        assert_eq!(options.request_timeout_secs, 5);
        assert_eq!(
            options.drain_timeout_secs,
            WorkerOptions::default().drain_timeout_secs
        );
    }

    #[test]
    fn load_rejects_zero_timeouts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("worker.toml");
        fs::write(&path, "drain_timeout_secs = 0\n").expect("write");
        assert!(load_options(&path).is_err());
    }

    #[test]
    fn context_config_wins_over_options() {
        let config = TestConfig {
            request_timeout_secs: Some(3),
            inspect: true,
            ..TestConfig::default()
        };
        let resolved = resolve_config(&config, &WorkerOptions::default()).expect("resolve");
        assert_eq!(resolved.request_timeout, Duration::from_secs(3));
        assert_eq!(resolved.drain_timeout, Duration::from_secs(10));
        assert!(resolved.inspect);
    }

    #[test]
    fn zero_timeout_from_context_is_rejected() {
        let config = TestConfig {
            request_timeout_secs: Some(0),
            ..TestConfig::default()
        };
        let err = resolve_config(&config, &WorkerOptions::default()).expect_err("must reject");
        assert!(matches!(err, ConfigurationError::InvalidOptions { .. }));
    }
}
