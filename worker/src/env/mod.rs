//! Sandbox environment construction.
//!
//! What an environment *is* lives with the controller; the worker asks
//! it to resolve the selected name over the channel and applies any
//! context-declared transform-mode override afterwards. Environment
//! resolution is a real suspension point: the controller may hit disk or
//! network to produce the setup payload.

use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;

use crate::core::types::{TransformMode, WorkerContext};
use crate::rpc::{ChannelError, RpcHandle};

/// Sandbox construction failure. Fatal to the invocation.
#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error("controller rejected environment {name:?}: {reason}")]
    Rejected { name: String, reason: String },
    #[error("failed to resolve environment {name:?}: {source}")]
    Channel {
        name: String,
        #[source]
        source: ChannelError,
    },
    #[error("malformed environment resolution for {name:?}: {reason}")]
    InvalidResolution { name: String, reason: String },
}

/// Execution environment for one worker invocation.
///
/// Owned by the execution state; its lifecycle is fully contained within
/// the invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxEnvironment {
    pub name: String,
    /// May be overridden from the context after construction.
    pub transform_mode: TransformMode,
    /// Controller-provided setup payload, opaque to the bootstrap.
    pub options: Value,
}

#[derive(Debug, Deserialize)]
struct Resolution {
    #[serde(default)]
    transform_mode: Option<TransformMode>,
    #[serde(default)]
    options: Value,
}

/// Ask the controller to resolve the context's environment selection.
pub async fn load_environment(
    ctx: &WorkerContext,
    rpc: &RpcHandle,
) -> Result<SandboxEnvironment, EnvironmentError> {
    let name = ctx.environment.name.clone();
    debug!(environment = %name, "resolving environment");

    let reply = rpc
        .request(
            "resolve_environment",
            json!({ "name": name, "options": ctx.environment.options }),
        )
        .await
        .map_err(|err| match err {
            ChannelError::Rejected { reason, .. } => EnvironmentError::Rejected {
                name: name.clone(),
                reason,
            },
            other => EnvironmentError::Channel {
                name: name.clone(),
                source: other,
            },
        })?;

    let resolution: Resolution =
        serde_json::from_value(reply).map_err(|err| EnvironmentError::InvalidResolution {
            name: name.clone(),
            reason: err.to_string(),
        })?;

    Ok(SandboxEnvironment {
        name,
        transform_mode: resolution.transform_mode.unwrap_or(TransformMode::Ssr),
        options: resolution.options,
    })
}
