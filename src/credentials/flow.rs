// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! The STS provisioning flow: select a provider, materialize its secret, optionally
//! wait for it to be readable, and annotate the velero service account on Azure.

use super::providers::{select_credentials, ProviderCredentials};
use super::secrets::{create_or_update_sts_secret, wait_for_secret, SecretReader, SecretWrite, VisibilityWait};
use super::service_account::{annotate_velero_service_account_for_azure, AnnotationOutcome};
use crate::config::StsConfig;
use crate::error::{DpaError, Result};
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Second read path to confirm the secret is visible before returning
pub struct SecretVisibility<'a> {
    pub reader: &'a dyn SecretReader,
    pub wait: VisibilityWait,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionOutcome {
    pub provider: &'static str,
    pub secret_name: String,
    pub namespace: String,
    pub write: SecretWrite,
    /// Only set for Azure
    pub annotation: Option<AnnotationOutcome>,
}

/// Materialize the STS secret for `credentials` in `namespace`.
///
/// Without `visibility` the call returns right after the write.
#[instrument(skip(client, credentials, visibility, cancel), fields(provider = credentials.provider()))]
pub async fn provision(
    client: &Client,
    namespace: &str,
    credentials: &ProviderCredentials,
    visibility: Option<SecretVisibility<'_>>,
    cancel: &CancellationToken,
) -> Result<ProvisionOutcome> {
    if let ProviderCredentials::Azure(azure) = credentials {
        if azure.client_id.is_empty() {
            return Err(DpaError::Precondition(
                "Azure client id is required for workload identity".to_string(),
            ));
        }
    }

    let api: Api<Secret> = Api::namespaced(client.clone(), namespace);
    let name = credentials.secret_name();
    let write = create_or_update_sts_secret(&api, name, &credentials.string_data()).await?;

    if let Some(visibility) = visibility {
        wait_for_secret(visibility.reader, namespace, name, visibility.wait, cancel).await?;
    }

    let annotation = match credentials {
        ProviderCredentials::Azure(azure) => Some(
            match annotate_velero_service_account_for_azure(client, &azure.client_id, namespace).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("Could not annotate velero service account: {}", e);
                    AnnotationOutcome::Skipped(e.to_string())
                }
            },
        ),
        _ => None,
    };

    info!(?write, "STS secret {}/{} provisioned", namespace, name);
    Ok(ProvisionOutcome {
        provider: credentials.provider(),
        secret_name: name.to_string(),
        namespace: namespace.to_string(),
        write,
        annotation,
    })
}

/// Provision the STS secret for whichever cloud identity `sts` configures.
/// Returns `None` when no provider is fully configured.
pub async fn sts_standardized_flow(
    client: &Client,
    namespace: &str,
    sts: &StsConfig,
    visibility: Option<SecretVisibility<'_>>,
    cancel: &CancellationToken,
) -> Result<Option<ProvisionOutcome>> {
    let Some(credentials) = select_credentials(sts) else {
        debug!("No cloud identity configured, skipping STS secret provisioning");
        return Ok(None);
    };

    provision(client, namespace, &credentials, visibility, cancel)
        .await
        .map(Some)
}
