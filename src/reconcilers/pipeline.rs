// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Ordered reconcile steps and the driver that runs them.

use crate::error::{DpaError, Result};
use crate::types::DataProtectionApplication;
use async_trait::async_trait;
use tracing::{debug, warn};

/// One unit of a reconcile pass.
///
/// `Ok(true)` continues with the next step, `Ok(false)` stops the pass cleanly and
/// `Err` stops it with a failure.
#[async_trait]
pub trait ReconcileStep<C: Sync>: Send + Sync {
    fn name(&self) -> &'static str;

    async fn reconcile(&self, dpa: &DataProtectionApplication, ctx: &C) -> Result<bool>;
}

#[derive(Debug)]
pub enum StepOutcome {
    Completed,
    Stopped { step: &'static str },
    Failed { step: &'static str, error: DpaError },
}

/// Run `steps` in order against the same DPA, stopping at the first clean stop or error
pub async fn run_steps<C: Sync>(
    steps: &[&dyn ReconcileStep<C>],
    dpa: &DataProtectionApplication,
    ctx: &C,
) -> StepOutcome {
    for step in steps {
        debug!(step = step.name(), "Running reconcile step");
        match step.reconcile(dpa, ctx).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(step = step.name(), "Reconcile step requested stop");
                return StepOutcome::Stopped { step: step.name() };
            }
            Err(error) => {
                warn!(step = step.name(), "Reconcile step failed: {}", error);
                return StepOutcome::Failed {
                    step: step.name(),
                    error,
                };
            }
        }
    }
    StepOutcome::Completed
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Context that records which steps ran
    #[derive(Default)]
    pub(crate) struct CallLog {
        pub calls: Mutex<Vec<&'static str>>,
    }

    pub(crate) enum Behaviour {
        Continue,
        Stop,
        Fail,
    }

    pub(crate) struct FakeStep(pub &'static str, pub Behaviour);

    #[async_trait]
    impl ReconcileStep<CallLog> for FakeStep {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn reconcile(&self, _dpa: &DataProtectionApplication, ctx: &CallLog) -> Result<bool> {
            ctx.calls.lock().unwrap().push(self.0);
            match self.1 {
                Behaviour::Continue => Ok(true),
                Behaviour::Stop => Ok(false),
                Behaviour::Fail => Err(DpaError::Validation(format!("{} failed", self.0))),
            }
        }
    }

    fn dpa() -> DataProtectionApplication {
        DataProtectionApplication::new("dpa", Default::default())
    }

    #[tokio::test]
    async fn test_all_steps_run_in_order() {
        let log = CallLog::default();
        let steps: &[&dyn ReconcileStep<CallLog>] = &[
            &FakeStep("a", Behaviour::Continue),
            &FakeStep("b", Behaviour::Continue),
            &FakeStep("c", Behaviour::Continue),
        ];

        let outcome = run_steps(steps, &dpa(), &log).await;

        assert!(matches!(outcome, StepOutcome::Completed));
        assert_eq!(*log.calls.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_clean_stop_short_circuits() {
        let log = CallLog::default();
        let steps: &[&dyn ReconcileStep<CallLog>] = &[
            &FakeStep("a", Behaviour::Stop),
            &FakeStep("b", Behaviour::Continue),
        ];

        let outcome = run_steps(steps, &dpa(), &log).await;

        assert!(matches!(outcome, StepOutcome::Stopped { step: "a" }));
        assert_eq!(*log.calls.lock().unwrap(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_error_short_circuits_and_names_step() {
        let log = CallLog::default();
        let steps: &[&dyn ReconcileStep<CallLog>] = &[
            &FakeStep("a", Behaviour::Continue),
            &FakeStep("b", Behaviour::Fail),
            &FakeStep("c", Behaviour::Continue),
        ];

        let outcome = run_steps(steps, &dpa(), &log).await;

        match outcome {
            StepOutcome::Failed { step, error } => {
                assert_eq!(step, "b");
                assert!(error.to_string().contains("b failed"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(*log.calls.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_empty_pipeline_completes() {
        let outcome = run_steps::<CallLog>(&[], &dpa(), &CallLog::default()).await;
        assert!(matches!(outcome, StepOutcome::Completed));
    }
}
