//! Wire protocol between a worker invocation and its controller.
//!
//! The worker issues `Request` frames; the controller answers with
//! `Response` frames and may interleave `Cancel` at any point. Frames
//! are self-describing JSON objects tagged by `type`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Why the controller asked the worker to stop early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CancelReason {
    /// The user interrupted the run.
    KeyboardInput,
    /// The controller bails out after a failure elsewhere.
    TestFailure,
}

/// One frame on the duplex channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireFrame {
    Request {
        id: u64,
        method: String,
        params: Value,
    },
    Response {
        id: u64,
        #[serde(default)]
        result: Option<Value>,
        #[serde(default)]
        error: Option<String>,
    },
    Cancel {
        reason: CancelReason,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn frames_carry_stable_wire_tags() {
        let request = WireFrame::Request {
            id: 7,
            method: "resolve_environment".to_string(),
            params: json!({"name": "node"}),
        };
        assert_eq!(
            serde_json::to_value(&request).expect("serialize"),
            json!({
                "type": "request",
                "id": 7,
                "method": "resolve_environment",
                "params": {"name": "node"}
            })
        );

        let cancel: WireFrame =
            serde_json::from_value(json!({"type": "cancel", "reason": "keyboard-input"}))
                .expect("parse");
        assert_eq!(
            cancel,
            WireFrame::Cancel {
                reason: CancelReason::KeyboardInput
            }
        );
    }

    #[test]
    fn response_fields_default_when_absent() {
        let response: WireFrame =
            serde_json::from_value(json!({"type": "response", "id": 3})).expect("parse");
        assert_eq!(
            response,
            WireFrame::Response {
                id: 3,
                result: None,
                error: None
            }
        );
    }
}
