// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! DataProtectionApplication reconciler - runs the reconcile steps and records the outcome
//! in the `Reconciled` status condition.

use super::pipeline::{run_steps, ReconcileStep, StepOutcome};
use super::sts::ReconcileStsCredentials;
use super::validation::ValidateDataProtectionApplication;
use super::watch::dpa_ref_for_labels;
use super::workload_identity::ReconcileAzureWorkloadIdentitySecret;
use crate::config::Config;
use crate::constants::{conditions, labels, OPERATOR_NAME};
use crate::error::{DpaError, Result};
use crate::kubernetes::events::{EventPublisher, KubeEventPublisher};
use crate::types::{set_status_condition, Condition, ConditionStatus, DataProtectionApplication};
use chrono::{SecondsFormat, Utc};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::{
    api::{Patch, PatchParams},
    runtime::{controller::Action, Controller},
    Api, Client, ResourceExt,
};
use kube_runtime::watcher::Config as WatcherConfig;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Shared, read-only state handed to every reconcile step
pub struct Context {
    pub client: Client,
    pub config: Config,
    pub events: Arc<dyn EventPublisher>,
}

/// Steps of one reconcile pass, in execution order
pub const STEPS: &[&dyn ReconcileStep<Context>] = &[
    &ValidateDataProtectionApplication,
    &ReconcileStsCredentials,
    &ReconcileAzureWorkloadIdentitySecret,
];

pub struct DpaReconciler {
    context: Arc<Context>,
}

impl DpaReconciler {
    pub fn new(client: Client, config: Config) -> Self {
        let events = Arc::new(KubeEventPublisher::new(client.clone(), OPERATOR_NAME));
        Self {
            context: Arc::new(Context {
                client,
                config,
                events,
            }),
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let client = self.context.client.clone();
        let namespace = self.context.config.watch_namespace.clone();
        let dpas: Api<DataProtectionApplication> = Api::namespaced(client.clone(), &namespace);
        let secrets: Api<Secret> = Api::namespaced(client, &namespace);

        info!("Watching DataProtectionApplications in namespace {}", namespace);

        Controller::new(dpas, WatcherConfig::default())
            .owns(secrets.clone(), WatcherConfig::default())
            .watches(
                secrets,
                WatcherConfig::default().labels(labels::OADP_OPERATOR),
                |secret| dpa_ref_for_labels(&secret),
            )
            .run(reconcile, error_policy, self.context)
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Reconciled DataProtectionApplication: {:?}", o),
                    Err(e) => warn!("Reconciliation error: {:?}", e),
                }
            })
            .await;

        Ok(())
    }
}

async fn reconcile(dpa: Arc<DataProtectionApplication>, ctx: Arc<Context>) -> Result<Action> {
    let namespace = dpa.namespace().unwrap_or_default();
    let api: Api<DataProtectionApplication> = Api::namespaced(ctx.client.clone(), &namespace);

    reconcile_dpa(&api, &dpa.name_any(), STEPS, ctx.as_ref()).await?;
    Ok(Action::requeue(ctx.config.resync_interval))
}

fn error_policy(
    _dpa: Arc<DataProtectionApplication>,
    error: &DpaError,
    _ctx: Arc<Context>,
) -> Action {
    if error.is_transient() {
        warn!("Reconciliation failed, will retry: {}", error);
    } else {
        error!("Reconciliation error: {}", error);
    }
    Action::requeue(Duration::from_secs(60))
}

/// One reconcile pass for the named DPA.
///
/// The DPA is re-read through the API so steps never act on a stale cache entry.
/// A step error takes precedence over a failure to write the status.
#[instrument(skip(api, steps, ctx))]
pub async fn reconcile_dpa<C: Sync>(
    api: &Api<DataProtectionApplication>,
    name: &str,
    steps: &[&dyn ReconcileStep<C>],
    ctx: &C,
) -> Result<()> {
    let Some(dpa) = api.get_opt(name).await? else {
        info!("DataProtectionApplication {} not found, nothing to reconcile", name);
        return Ok(());
    };

    let (condition, step_error) = match run_steps(steps, &dpa, ctx).await {
        StepOutcome::Completed => (
            reconciled_condition(
                &dpa,
                ConditionStatus::True,
                conditions::REASON_COMPLETE,
                conditions::RECONCILE_COMPLETE_MESSAGE.to_string(),
            ),
            None,
        ),
        StepOutcome::Stopped { step } => {
            debug!("Reconcile of {} stopped by {}, leaving status as is", name, step);
            return Ok(());
        }
        StepOutcome::Failed { step, error } => {
            debug!("Reconcile of {} failed in {}", name, step);
            (
                reconciled_condition(
                    &dpa,
                    ConditionStatus::False,
                    conditions::REASON_ERROR,
                    error.to_string(),
                ),
                Some(error),
            )
        }
    };

    let status_result = update_status_condition(api, &dpa, condition).await;
    match (step_error, status_result) {
        (Some(step_error), Err(status_error)) => {
            warn!("Failed to record reconcile failure in status: {}", status_error);
            Err(step_error)
        }
        (Some(step_error), Ok(())) => Err(step_error),
        (None, status_result) => status_result,
    }
}

fn reconciled_condition(
    dpa: &DataProtectionApplication,
    status: ConditionStatus,
    reason: &str,
    message: String,
) -> Condition {
    Condition {
        condition_type: conditions::RECONCILED.to_string(),
        status,
        reason: reason.to_string(),
        message,
        last_transition_time: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        observed_generation: dpa.metadata.generation,
    }
}

/// Upsert `condition` and write the status back, conditional on the version that was read
async fn update_status_condition(
    api: &Api<DataProtectionApplication>,
    dpa: &DataProtectionApplication,
    condition: Condition,
) -> Result<()> {
    let mut conditions = dpa.conditions().to_vec();
    if !set_status_condition(&mut conditions, condition) {
        debug!("Condition of {} unchanged, patching status anyway", dpa.name_any());
    }

    let patch = json!({
        "metadata": { "resourceVersion": dpa.resource_version() },
        "status": { "conditions": conditions }
    });
    api.patch_status(&dpa.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    Ok(())
}
