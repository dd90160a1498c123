// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Owner-referenced environment secret consumed by Azure workload identity.

use super::dpa::Context;
use super::pipeline::ReconcileStep;
use crate::config::StsConfig;
use crate::constants::secrets::{AZURE_WORKLOAD_IDENTITY_SECRET_NAME, WEB_IDENTITY_TOKEN_PATH};
use crate::error::{DpaError, Result};
use crate::kubernetes::events::{reasons, EventPublisher};
use crate::types::DataProtectionApplication;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use k8s_openapi::ByteString;
use kube::api::{ObjectMeta, PostParams};
use kube::runtime::events::EventType;
use kube::{Api, Client, Resource, ResourceExt};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, instrument};

pub struct ReconcileAzureWorkloadIdentitySecret;

#[async_trait]
impl ReconcileStep<Context> for ReconcileAzureWorkloadIdentitySecret {
    fn name(&self) -> &'static str {
        "ReconcileAzureWorkloadIdentitySecret"
    }

    async fn reconcile(&self, dpa: &DataProtectionApplication, ctx: &Context) -> Result<bool> {
        reconcile_azure_workload_identity_secret(
            &ctx.client,
            ctx.events.as_ref(),
            dpa,
            &ctx.config.sts,
        )
        .await?;
        Ok(true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretOperation {
    Created,
    Updated,
    Unchanged,
    /// Azure workload identity is not configured
    Skipped,
}

impl fmt::Display for SecretOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SecretOperation::Created => "created",
            SecretOperation::Updated => "updated",
            SecretOperation::Unchanged => "unchanged",
            SecretOperation::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

fn desired_data(sts: &StsConfig) -> BTreeMap<String, ByteString> {
    [
        ("AZURE_CLIENT_ID", sts.client_id.as_str()),
        ("AZURE_TENANT_ID", sts.tenant_id.as_str()),
        ("AZURE_FEDERATED_TOKEN_FILE", WEB_IDENTITY_TOKEN_PATH),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
    .collect()
}

/// Create or update the workload identity env secret owned by `dpa`.
///
/// A Normal event is published on the DPA whenever the secret is created or changed.
#[instrument(skip_all, fields(dpa = %dpa.name_any()))]
pub async fn reconcile_azure_workload_identity_secret(
    client: &Client,
    events: &dyn EventPublisher,
    dpa: &DataProtectionApplication,
    sts: &StsConfig,
) -> Result<SecretOperation> {
    if sts.client_id.is_empty() || sts.tenant_id.is_empty() || sts.subscription_id.is_empty() {
        debug!("Azure workload identity not configured, skipping secret");
        return Ok(SecretOperation::Skipped);
    }

    let namespace = dpa
        .namespace()
        .ok_or_else(|| DpaError::Validation("DataProtectionApplication has no namespace".to_string()))?;
    let owner = dpa.controller_owner_ref(&()).ok_or_else(|| {
        DpaError::Precondition("DataProtectionApplication has no uid yet".to_string())
    })?;

    let api: Api<Secret> = Api::namespaced(client.clone(), &namespace);
    let name = AZURE_WORKLOAD_IDENTITY_SECRET_NAME;

    let operation = match api.get_opt(name).await? {
        None => {
            let secret = Secret {
                metadata: ObjectMeta {
                    name: Some(name.to_string()),
                    namespace: Some(namespace.clone()),
                    labels: Some(dpa.app_labels()),
                    owner_references: Some(vec![owner]),
                    ..Default::default()
                },
                data: Some(desired_data(sts)),
                ..Default::default()
            };
            api.create(&PostParams::default(), &secret).await?;
            SecretOperation::Created
        }
        Some(existing) => {
            let mut updated = existing.clone();
            apply_desired(&mut updated, dpa, owner, sts)?;
            if updated == existing {
                SecretOperation::Unchanged
            } else {
                api.replace(name, &PostParams::default(), &updated).await?;
                SecretOperation::Updated
            }
        }
    };

    if matches!(operation, SecretOperation::Created | SecretOperation::Updated) {
        info!("Azure workload identity secret {}/{} {}", namespace, name, operation);
        events
            .publish(
                &dpa.object_ref(&()),
                EventType::Normal,
                reasons::AZURE_WORKLOAD_IDENTITY_SECRET_RECONCILED,
                "Reconcile",
                Some(format!(
                    "performed {} on azure workload identity secret {}/{}",
                    operation, namespace, name
                )),
            )
            .await;
    }
    Ok(operation)
}

fn apply_desired(
    secret: &mut Secret,
    dpa: &DataProtectionApplication,
    owner: OwnerReference,
    sts: &StsConfig,
) -> Result<()> {
    let owners = secret.owner_references_mut();
    if let Some(other) = owners
        .iter()
        .find(|r| r.controller == Some(true) && r.uid != owner.uid)
    {
        return Err(DpaError::Precondition(format!(
            "secret {} is already controlled by {} {}",
            AZURE_WORKLOAD_IDENTITY_SECRET_NAME, other.kind, other.name
        )));
    }
    match owners.iter_mut().find(|r| r.uid == owner.uid) {
        Some(existing) => *existing = owner,
        None => owners.push(owner),
    }

    secret.labels_mut().extend(dpa.app_labels());
    secret.data = Some(desired_data(sts));
    Ok(())
}
