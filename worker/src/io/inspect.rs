//! Process-wide inspection hook armed for the duration of one
//! invocation.
//!
//! When inspection is enabled the worker installs a panic hook that
//! reports panics in user test code through tracing with the worker's
//! identity attached. The previous hook is restored at teardown, paired
//! 1:1 with the arm call.

use std::panic;

use tracing::error;

use crate::core::identity::WorkerIdentity;
use crate::io::config::ResolvedConfig;

type PanicHook = Box<dyn Fn(&panic::PanicHookInfo<'_>) + Send + Sync + 'static>;

/// Reversal handle for the inspection hook.
///
/// `restore` runs the reversal exactly once; dropping an unrestored
/// guard also restores.
pub struct InspectorGuard {
    previous: Option<PanicHook>,
}

/// Arm the inspection hook if the resolved configuration asks for it.
pub fn arm(config: &ResolvedConfig, identity: WorkerIdentity) -> InspectorGuard {
    if !config.inspect {
        return InspectorGuard { previous: None };
    }
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        error!(
            worker_id = identity.worker_id,
            pool_id = identity.pool_id,
            "panic in worker: {info}"
        );
    }));
    InspectorGuard {
        previous: Some(previous),
    }
}

impl InspectorGuard {
    pub fn is_armed(&self) -> bool {
        self.previous.is_some()
    }

    /// Reverse the hook installed by [`arm`]. Idempotent.
    pub fn restore(&mut self) {
        if let Some(previous) = self.previous.take() {
            panic::set_hook(previous);
        }
    }
}

impl Drop for InspectorGuard {
    fn drop(&mut self) {
        self.restore();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::TestConfig;
    use crate::io::config::{WorkerOptions, resolve_config};

    fn config(inspect: bool) -> ResolvedConfig {
        let test_config = TestConfig {
            inspect,
            ..TestConfig::default()
        };
        resolve_config(&test_config, &WorkerOptions::default()).expect("resolve")
    }

    fn identity() -> WorkerIdentity {
        WorkerIdentity {
            worker_id: 1,
            pool_id: 1,
        }
    }

    // Panic hooks are process-global; keep all assertions in one test so
    // parallel test execution cannot interleave arm/restore pairs.
    #[test]
    fn arm_restore_lifecycle() {
        let disarmed = arm(&config(false), identity());
        assert!(!disarmed.is_armed());

        let mut guard = arm(&config(true), identity());
        assert!(guard.is_armed());

        guard.restore();
        assert!(!guard.is_armed());

        // Second restore is a no-op.
        guard.restore();
        assert!(!guard.is_armed());
    }
}
