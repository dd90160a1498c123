// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Velero service account annotation for Azure workload identity.

use crate::constants::{annotations::AZURE_WORKLOAD_IDENTITY_CLIENT_ID, VELERO_SERVICE_ACCOUNT};
use crate::error::{DpaError, Result};
use k8s_openapi::api::core::v1::ServiceAccount;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use serde_json::json;
use tracing::{debug, info, instrument};

/// Result of annotating the velero service account for Azure workload identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationOutcome {
    Annotated,
    AlreadyAnnotated,
    /// The annotation could not be applied. Holds the reason.
    Skipped(String),
}

/// Set the Azure workload identity client id on the velero service account.
/// The service account must already exist.
#[instrument(skip(client))]
pub async fn annotate_velero_service_account_for_azure(
    client: &Client,
    client_id: &str,
    namespace: &str,
) -> Result<AnnotationOutcome> {
    if client_id.is_empty() {
        return Err(DpaError::Precondition(
            "Azure client id is empty, cannot annotate service account".to_string(),
        ));
    }

    let api: Api<ServiceAccount> = Api::namespaced(client.clone(), namespace);
    let sa = api.get_opt(VELERO_SERVICE_ACCOUNT).await?.ok_or_else(|| {
        DpaError::Precondition(format!(
            "service account {}/{} not found",
            namespace, VELERO_SERVICE_ACCOUNT
        ))
    })?;

    if sa
        .annotations()
        .get(AZURE_WORKLOAD_IDENTITY_CLIENT_ID)
        .is_some_and(|v| v == client_id)
    {
        debug!("Service account {}/{} already annotated", namespace, VELERO_SERVICE_ACCOUNT);
        return Ok(AnnotationOutcome::AlreadyAnnotated);
    }

    let patch = json!({
        "metadata": {
            "annotations": { AZURE_WORKLOAD_IDENTITY_CLIENT_ID: client_id }
        }
    });
    api.patch(VELERO_SERVICE_ACCOUNT, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    info!(
        "Annotated service account {}/{} with Azure workload identity client id",
        namespace, VELERO_SERVICE_ACCOUNT
    );
    Ok(AnnotationOutcome::Annotated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{service_account_json, service_accounts_collection, FakeApiServer};

    const NS: &str = "openshift-adp";

    fn sa_path() -> String {
        format!("{}/velero", service_accounts_collection(NS))
    }

    #[tokio::test]
    async fn test_empty_client_id_is_a_precondition_error() {
        let server = FakeApiServer::new();

        let err = annotate_velero_service_account_for_azure(&server.client(), "", NS)
            .await
            .unwrap_err();

        assert!(matches!(err, DpaError::Precondition(_)));
        assert!(server.requests().is_empty());
    }

    #[tokio::test]
    async fn test_missing_service_account_is_an_error() {
        let server = FakeApiServer::new();

        let err = annotate_velero_service_account_for_azure(&server.client(), "client", NS)
            .await
            .unwrap_err();

        assert!(matches!(err, DpaError::Precondition(_)));
    }

    #[tokio::test]
    async fn test_annotates_service_account() {
        let server = FakeApiServer::new()
            .with_object(&service_accounts_collection(NS), service_account_json(NS, "velero"));

        let outcome = annotate_velero_service_account_for_azure(&server.client(), "client", NS)
            .await
            .unwrap();

        assert_eq!(outcome, AnnotationOutcome::Annotated);
        let sa = server.object(&sa_path()).unwrap();
        assert_eq!(sa["metadata"]["annotations"][AZURE_WORKLOAD_IDENTITY_CLIENT_ID], "client");
    }

    #[tokio::test]
    async fn test_already_annotated_is_not_patched() {
        let mut sa = service_account_json(NS, "velero");
        sa["metadata"]["annotations"] = json!({ AZURE_WORKLOAD_IDENTITY_CLIENT_ID: "client" });
        let server = FakeApiServer::new().with_object(&service_accounts_collection(NS), sa);

        let outcome = annotate_velero_service_account_for_azure(&server.client(), "client", NS)
            .await
            .unwrap();

        assert_eq!(outcome, AnnotationOutcome::AlreadyAnnotated);
        assert_eq!(server.write_count(), 0);
    }
}
