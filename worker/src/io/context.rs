//! Reader for the pool-supplied worker context file.
//!
//! The context is validated against an embedded JSON Schema before the
//! typed parse, so structural mistakes surface as one readable report
//! instead of the first serde error.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use jsonschema::Draft;
use serde_json::Value;
use tracing::debug;

use crate::core::types::WorkerContext;

const CONTEXT_SCHEMA: &str = include_str!("../../schemas/worker_context.schema.json");

/// Read, schema-validate, and parse a worker context file.
pub fn read_context(path: &Path) -> Result<WorkerContext> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    parse_context(&raw).with_context(|| format!("parse {}", path.display()))
}

/// Parse and validate context JSON: schema conformance, then typed
/// parse.
pub fn parse_context(raw: &str) -> Result<WorkerContext> {
    let instance: Value = serde_json::from_str(raw).context("parse context json")?;
    let schema: Value = serde_json::from_str(CONTEXT_SCHEMA).context("parse context schema")?;
    validate_schema(&instance, &schema)?;
    let ctx: WorkerContext =
        serde_json::from_str(raw).context("parse context as worker context")?;
    debug!(
        worker_id = ctx.worker_id,
        pool_id = ctx.pool_id,
        runner = %ctx.runner,
        "context accepted"
    );
    Ok(ctx)
}

/// Validate a JSON instance against a JSON Schema (Draft 2020-12).
fn validate_schema(instance: &Value, schema: &Value) -> Result<()> {
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(schema)
        .context("compile context schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("schema validation failed:\n- {}", messages.join("\n- "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
        "worker_id": 1,
        "pool_id": 2,
        "runner": "file:///runners/basic",
        "environment": { "name": "node", "transform_mode": "web" },
        "files": ["tests/a.rs"],
        "isolation": "process"
    }"#;

    #[test]
    fn valid_context_parses() {
        let ctx = parse_context(VALID).expect("parse");
        assert_eq!(ctx.pool_id, 2);
        assert_eq!(ctx.files, vec!["tests/a.rs".to_string()]);
    }

    #[test]
    fn missing_required_field_fails_schema_validation() {
        let raw = r#"{"worker_id": 1, "pool_id": 2, "environment": {"name": "node"}}"#;
        let err = parse_context(raw).expect_err("must reject");
        assert!(format!("{err:#}").contains("schema validation failed"));
    }

    #[test]
    fn unknown_top_level_field_is_rejected() {
        let raw = r#"{
            "worker_id": 1,
            "pool_id": 2,
            "runner": "file:///r",
            "environment": { "name": "node" },
            "surprise": true
        }"#;
        assert!(parse_context(raw).is_err());
    }

    #[test]
    fn read_context_round_trips_through_a_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("context.json");
        fs::write(&path, VALID).expect("write");
        let ctx = read_context(&path).expect("read");
        assert_eq!(ctx.runner, "file:///runners/basic");
    }
}
