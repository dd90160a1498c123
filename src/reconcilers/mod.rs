// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! DataProtectionApplication reconciler and its reconcile steps.

pub mod dpa;
pub mod pipeline;
pub mod sts;
pub mod validation;
pub mod watch;
pub mod workload_identity;

pub use dpa::{reconcile_dpa, Context, DpaReconciler, STEPS};
pub use pipeline::{run_steps, ReconcileStep, StepOutcome};
pub use watch::dpa_ref_for_labels;
