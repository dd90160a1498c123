// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Azure Blob Storage adapter.
//!
//! Uploads go to the blob data plane. Versioning and encryption are storage account
//! properties and are read from the ARM management plane.

pub mod auth;

use super::{
    check_response, prepare_upload, timed_upload, BucketMetadata, CloudProvider,
    UploadSpeedTestConfig, UploadTestResult,
};
use crate::error::{DpaError, Result};
use async_trait::async_trait;
use auth::{bearer_token, client_certificate_credential, client_secret_credential, default_credential};
use azure_core::credentials::TokenCredential;
use azure_storage::StorageCredentials;
use azure_storage_blobs::prelude::ClientBuilder;
use bytes::Bytes;
use chrono::Utc;
use k8s_openapi::ByteString;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};
use url::Url;

const STORAGE_SCOPE: &str = "https://storage.azure.com/.default";
const MANAGEMENT_SCOPE: &str = "https://management.azure.com/.default";
const MANAGEMENT_ENDPOINT: &str = "https://management.azure.com/";
const STORAGE_API_VERSION: &str = "2021-08-06";
const ARM_API_VERSION: &str = "2023-01-01";
const OCTET_STREAM: &str = "application/octet-stream";

/// Credential secret contents for an Azure backup location
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AzureCredentials {
    pub subscription_id: String,
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub resource_group: String,
    pub storage_account: String,
    pub storage_account_key: String,
    pub certificate_path: String,
}

impl fmt::Debug for AzureCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureCredentials")
            .field("subscription_id", &self.subscription_id)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("resource_group", &self.resource_group)
            .field("storage_account", &self.storage_account)
            .field("auth_mode", &self.auth_mode())
            .finish_non_exhaustive()
    }
}

/// How the adapter authenticates, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AzureAuthMode {
    SharedKey,
    ClientSecret,
    ClientCertificate,
    Default,
}

impl AzureCredentials {
    pub fn from_secret_data(data: &BTreeMap<String, ByteString>) -> Self {
        let get = |key: &str| {
            data.get(key)
                .map(|v| String::from_utf8_lossy(&v.0).trim().to_string())
                .unwrap_or_default()
        };
        AzureCredentials {
            subscription_id: get("AZURE_SUBSCRIPTION_ID"),
            tenant_id: get("AZURE_TENANT_ID"),
            client_id: get("AZURE_CLIENT_ID"),
            client_secret: get("AZURE_CLIENT_SECRET"),
            resource_group: get("AZURE_RESOURCE_GROUP"),
            storage_account: get("AZURE_STORAGE_ACCOUNT_ID"),
            storage_account_key: get("AZURE_STORAGE_ACCOUNT_ACCESS_KEY"),
            certificate_path: get("AZURE_CLIENT_CERTIFICATE_PATH"),
        }
    }

    pub fn auth_mode(&self) -> AzureAuthMode {
        if !self.storage_account_key.is_empty() {
            AzureAuthMode::SharedKey
        } else if !self.client_secret.is_empty() {
            AzureAuthMode::ClientSecret
        } else if !self.certificate_path.is_empty() {
            AzureAuthMode::ClientCertificate
        } else {
            AzureAuthMode::Default
        }
    }
}

/// How Put Blob requests are authorized
pub enum BlobAuth {
    /// Storage account access key, signed by the storage SDK
    SharedKey(String),
    Token(Arc<dyn TokenCredential>),
}

pub struct AzureProvider {
    credentials: AzureCredentials,
    http: reqwest::Client,
    blob_auth: BlobAuth,
    /// Token source for the management plane
    arm: Arc<dyn TokenCredential>,
    blob_endpoint: Url,
    management_endpoint: Url,
}

impl AzureProvider {
    pub async fn new(credentials: AzureCredentials) -> Result<Self> {
        if credentials.storage_account.is_empty() {
            return Err(DpaError::Config(
                "AZURE_STORAGE_ACCOUNT_ID is required".to_string(),
            ));
        }

        let mode = credentials.auth_mode();
        debug!(?mode, "Selected Azure authentication");

        // Shared keys only sign data plane requests; ARM still needs a token
        let token = match mode {
            AzureAuthMode::SharedKey | AzureAuthMode::Default => default_credential()?,
            AzureAuthMode::ClientSecret => client_secret_credential(&credentials)?,
            AzureAuthMode::ClientCertificate => client_certificate_credential(&credentials).await?,
        };

        let blob_auth = match mode {
            AzureAuthMode::SharedKey => BlobAuth::SharedKey(credentials.storage_account_key.clone()),
            _ => BlobAuth::Token(token.clone()),
        };

        let blob_endpoint = parse_endpoint(&format!(
            "https://{}.blob.core.windows.net/",
            credentials.storage_account
        ))?;
        let management_endpoint = parse_endpoint(MANAGEMENT_ENDPOINT)?;

        Ok(Self::with_endpoints(
            credentials,
            reqwest::Client::new(),
            blob_auth,
            token,
            blob_endpoint,
            management_endpoint,
        ))
    }

    pub fn with_endpoints(
        credentials: AzureCredentials,
        http: reqwest::Client,
        blob_auth: BlobAuth,
        arm: Arc<dyn TokenCredential>,
        blob_endpoint: Url,
        management_endpoint: Url,
    ) -> Self {
        Self {
            credentials,
            http,
            blob_auth,
            arm,
            blob_endpoint,
            management_endpoint,
        }
    }

    pub fn is_storage_account_key_auth(&self) -> bool {
        matches!(self.blob_auth, BlobAuth::SharedKey(_))
    }

    fn storage_account_url(&self, extra: &[&str]) -> Result<Url> {
        let c = &self.credentials;
        if c.subscription_id.is_empty() || c.resource_group.is_empty() {
            return Err(DpaError::Config(
                "AZURE_SUBSCRIPTION_ID and AZURE_RESOURCE_GROUP are required for storage account properties"
                    .to_string(),
            ));
        }

        let mut url = self.management_endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| DpaError::Config("invalid management endpoint".to_string()))?
            .pop_if_empty()
            .extend([
                "subscriptions",
                c.subscription_id.as_str(),
                "resourceGroups",
                c.resource_group.as_str(),
                "providers",
                "Microsoft.Storage",
                "storageAccounts",
                c.storage_account.as_str(),
            ])
            .extend(extra);
        url.query_pairs_mut().append_pair("api-version", ARM_API_VERSION);
        Ok(url)
    }

    async fn arm_get(&self, url: Url, token: &str) -> Result<Value> {
        let response = self.http.get(url).bearer_auth(token).send().await?;
        Ok(check_response(response).await?.json().await?)
    }
}

impl AzureProvider {
    /// Put Blob on the data plane with an Entra ID bearer token
    async fn put_blob(
        &self,
        container: &str,
        name: &str,
        data: Bytes,
        token: &str,
        timeout: std::time::Duration,
        cancel: &CancellationToken,
    ) -> Result<UploadTestResult> {
        let len = data.len() as u64;
        let mut url = self.blob_endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| DpaError::Config("invalid blob endpoint".to_string()))?
            .pop_if_empty()
            .extend([container, name]);

        let request = self
            .http
            .put(url)
            .bearer_auth(token)
            .header(CONTENT_TYPE, OCTET_STREAM)
            .header("x-ms-blob-type", "BlockBlob")
            .header("x-ms-version", STORAGE_API_VERSION)
            .header(
                "x-ms-date",
                Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
            )
            .body(data);

        timed_upload(len, timeout, cancel, async {
            check_response(request.send().await?).await?;
            Ok(())
        })
        .await
    }
}

fn parse_endpoint(endpoint: &str) -> Result<Url> {
    Url::parse(endpoint).map_err(|e| DpaError::Config(format!("invalid endpoint {}: {}", endpoint, e)))
}

/// `Enabled` only when the blob service explicitly turns versioning on
pub fn versioning_from_blob_services(blob_services: &Value) -> String {
    match blob_services["properties"]["isVersioningEnabled"].as_bool() {
        Some(true) => "Enabled",
        _ => "Disabled",
    }
    .to_string()
}

pub fn encryption_from_account(account: &Value) -> String {
    account["properties"]["encryption"]["keySource"]
        .as_str()
        .unwrap_or("Unknown")
        .to_string()
}

#[async_trait]
impl CloudProvider for AzureProvider {
    #[instrument(skip(self, config, cancel))]
    async fn upload_test(
        &self,
        config: &UploadSpeedTestConfig,
        bucket: &str,
        cancel: &CancellationToken,
    ) -> Result<UploadTestResult> {
        let payload = prepare_upload(config)?;
        let len = payload.data.len() as u64;
        info!(bytes = len, timeout = ?payload.timeout, "Starting Azure blob upload test");

        match &self.blob_auth {
            BlobAuth::SharedKey(key) => {
                let account = self.credentials.storage_account.clone();
                let blob = ClientBuilder::new(
                    account.clone(),
                    StorageCredentials::access_key(account, key.clone()),
                )
                .blob_client(bucket, payload.key.as_str());
                let data = payload.data;
                timed_upload(len, payload.timeout, cancel, async move {
                    blob.put_block_blob(data)
                        .content_type(OCTET_STREAM)
                        .await
                        .map_err(|e| DpaError::Cloud(format!("put blob failed: {}", e)))?;
                    Ok(())
                })
                .await
            }
            BlobAuth::Token(credential) => {
                let token = bearer_token(credential.as_ref(), STORAGE_SCOPE).await?;
                self.put_blob(bucket, &payload.key, payload.data, &token, payload.timeout, cancel)
                    .await
            }
        }
    }

    /// The container is not consulted: both settings live on the storage account
    #[instrument(skip(self))]
    async fn get_bucket_metadata(&self, bucket: &str) -> Result<BucketMetadata> {
        let token = bearer_token(self.arm.as_ref(), MANAGEMENT_SCOPE).await?;
        let blob_services = self
            .arm_get(self.storage_account_url(&["blobServices", "default"])?, &token)
            .await?;
        let account = self.arm_get(self.storage_account_url(&[])?, &token).await?;

        let metadata = BucketMetadata {
            encryption_algorithm: encryption_from_account(&account),
            versioning_status: versioning_from_blob_services(&blob_services),
        };
        debug!(?metadata, "Retrieved Azure storage account metadata");
        Ok(metadata)
    }
}
