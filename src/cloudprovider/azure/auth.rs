// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Microsoft Entra ID credentials for the storage and management planes.

use super::AzureCredentials;
use crate::error::{DpaError, Result};
use azure_core::credentials::{Secret, TokenCredential, TokenRequestOptions};
use azure_identity::{
    ClientCertificateCredential, ClientSecretCredential, ManagedIdentityCredential,
    ManagedIdentityCredentialOptions, TokenCredentialOptions, UserAssignedId, WorkloadIdentityCredential,
    WorkloadIdentityCredentialOptions,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::Arc;
use tracing::{debug, info};

/// Which platform credential the default chain resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultCredentialSource {
    /// Federated token projected by the workload identity webhook
    WorkloadIdentity { client_id: String },
    ManagedIdentity { client_id: Option<String> },
}

impl DefaultCredentialSource {
    /// Workload identity when the webhook-injected variables are all present,
    /// otherwise the instance's managed identity
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        match (
            get("AZURE_TENANT_ID"),
            get("AZURE_CLIENT_ID"),
            get("AZURE_FEDERATED_TOKEN_FILE"),
        ) {
            (Some(_), Some(client_id), Some(_)) => {
                DefaultCredentialSource::WorkloadIdentity { client_id }
            }
            (_, client_id, _) => DefaultCredentialSource::ManagedIdentity { client_id },
        }
    }

    pub fn into_credential(self) -> Result<Arc<dyn TokenCredential>> {
        debug!(source = ?self, "Using default Azure credential");
        let credential: Arc<dyn TokenCredential> = match self {
            DefaultCredentialSource::WorkloadIdentity { client_id } => {
                let options = WorkloadIdentityCredentialOptions {
                    client_id: Some(client_id),
                    ..Default::default()
                };
                WorkloadIdentityCredential::new(Some(options))?
            }
            DefaultCredentialSource::ManagedIdentity { client_id } => {
                let options = ManagedIdentityCredentialOptions {
                    user_assigned_id: client_id.map(UserAssignedId::ClientId),
                    ..Default::default()
                };
                ManagedIdentityCredential::new(Some(options))?
            }
        };
        Ok(credential)
    }
}

/// Default credential resolved from the process environment
pub fn default_credential() -> Result<Arc<dyn TokenCredential>> {
    DefaultCredentialSource::from_lookup(|key| std::env::var(key).ok()).into_credential()
}

pub fn client_secret_credential(credentials: &AzureCredentials) -> Result<Arc<dyn TokenCredential>> {
    info!(client_id = %credentials.client_id, "Using Azure client secret authentication");
    let credential: Arc<dyn TokenCredential> = ClientSecretCredential::new(
        &credentials.tenant_id,
        credentials.client_id.clone(),
        Secret::new(credentials.client_secret.clone()),
        None,
    )?;
    Ok(credential)
}

/// Certificate credential from a PKCS#12 bundle on disk
pub async fn client_certificate_credential(
    credentials: &AzureCredentials,
) -> Result<Arc<dyn TokenCredential>> {
    info!(client_id = %credentials.client_id, "Using Azure client certificate authentication");
    let bundle = tokio::fs::read(&credentials.certificate_path).await.map_err(|e| {
        DpaError::Config(format!(
            "failed to read certificate file {}: {}",
            credentials.certificate_path, e
        ))
    })?;
    if bundle.is_empty() {
        return Err(DpaError::Config(format!(
            "certificate file {} is empty",
            credentials.certificate_path
        )));
    }

    let credential: Arc<dyn TokenCredential> = ClientCertificateCredential::new(
        credentials.tenant_id.clone(),
        credentials.client_id.clone(),
        Secret::new(STANDARD.encode(bundle)),
        Secret::new(String::new()),
        TokenCredentialOptions::default(),
    )?;
    Ok(credential)
}

/// Bearer token for `scope`
pub async fn bearer_token(credential: &dyn TokenCredential, scope: &str) -> Result<String> {
    let token = credential
        .get_token(&[scope], Some(TokenRequestOptions::default()))
        .await?;
    Ok(token.token.secret().to_string())
}
