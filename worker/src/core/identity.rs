//! Worker identity threaded through one invocation.
//!
//! Identity travels explicitly on the context/state chain instead of
//! process-global variables, so nested code (runner, environment, user
//! test code) reads it from the state it was handed.

use crate::core::types::{IsolationUnit, WorkerContext};

/// Worker ordinal and pool identity for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerIdentity {
    pub worker_id: u32,
    pub pool_id: u32,
}

impl WorkerIdentity {
    pub fn from_context(ctx: &WorkerContext) -> Self {
        Self {
            worker_id: ctx.worker_id,
            pool_id: ctx.pool_id,
        }
    }

    /// Human-readable label for process-isolated units.
    ///
    /// Lighter isolation units (threads) share the pool process and get
    /// no label of their own.
    pub fn process_label(&self, isolation: IsolationUnit) -> Option<String> {
        match isolation {
            IsolationUnit::Process => Some(format!("test-worker {}", self.pool_id)),
            IsolationUnit::Thread => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{EnvironmentOptions, TestConfig};

    fn context(isolation: IsolationUnit) -> WorkerContext {
        WorkerContext {
            worker_id: 4,
            pool_id: 9,
            runner: "file:///runners/basic".to_string(),
            config: TestConfig::default(),
            files: Vec::new(),
            invalidates: Vec::new(),
            environment: EnvironmentOptions {
                name: "node".to_string(),
                transform_mode: None,
                options: serde_json::Value::Null,
            },
            provided_context: serde_json::Value::Null,
            isolation,
        }
    }

    #[test]
    fn process_isolation_gets_a_label_with_the_pool_identity() {
        let identity = WorkerIdentity::from_context(&context(IsolationUnit::Process));
        assert_eq!(
            identity.process_label(IsolationUnit::Process).as_deref(),
            Some("test-worker 9")
        );
    }

    #[test]
    fn thread_isolation_gets_no_label() {
        let identity = WorkerIdentity::from_context(&context(IsolationUnit::Thread));
        assert_eq!(identity.process_label(IsolationUnit::Thread), None);
    }
}
