// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Google Cloud Storage adapter over the JSON API.

use super::{
    check_response, prepare_upload, read_access_token, timed_upload, BucketMetadata, CloudProvider,
    UploadSpeedTestConfig, UploadTestResult,
};
use crate::error::{DpaError, Result};
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};
use url::Url;

const STORAGE_ENDPOINT: &str = "https://storage.googleapis.com";
const STORAGE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";
const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// The credential documents GCP client libraries accept
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GcpCredentials {
    ServiceAccount(ServiceAccountKey),
    ExternalAccount(ExternalAccount),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExternalAccount {
    pub audience: String,
    pub subject_token_type: String,
    pub token_url: String,
    pub service_account_impersonation_url: Option<String>,
    pub credential_source: CredentialSource,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CredentialSource {
    pub file: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Serialize)]
struct JwtBearerClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// OAuth2 access token source for the storage API
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self, scope: &str) -> Result<String>;
}

/// Token source for a parsed credentials document
pub struct GcpTokenCredential {
    http: reqwest::Client,
    credentials: GcpCredentials,
}

impl GcpTokenCredential {
    pub fn new(http: reqwest::Client, credentials: GcpCredentials) -> Self {
        Self { http, credentials }
    }

    async fn service_account_token(&self, key: &ServiceAccountKey, scope: &str) -> Result<String> {
        let now = unix_now();
        let claims = JwtBearerClaims {
            iss: &key.client_email,
            scope,
            aud: &key.token_uri,
            iat: now,
            exp: now + 3600,
        };
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| DpaError::Cloud(format!("invalid service account private key: {}", e)))?;
        let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &signing_key)
            .map_err(|e| DpaError::Cloud(format!("failed to sign token request: {}", e)))?;

        let response = self
            .http
            .post(&key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;
        read_access_token(response).await
    }

    /// Exchange the projected service account token at the STS endpoint, then
    /// impersonate the target service account when one is configured
    async fn external_account_token(&self, account: &ExternalAccount, scope: &str) -> Result<String> {
        let subject_token = tokio::fs::read_to_string(&account.credential_source.file)
            .await
            .map_err(|e| {
                DpaError::Cloud(format!(
                    "failed to read subject token {}: {}",
                    account.credential_source.file, e
                ))
            })?;

        let exchange_scope = if account.service_account_impersonation_url.is_some() {
            CLOUD_PLATFORM_SCOPE
        } else {
            scope
        };
        let response = self
            .http
            .post(&account.token_url)
            .json(&json!({
                "grant_type": "urn:ietf:params:oauth:grant-type:token-exchange",
                "audience": account.audience,
                "scope": exchange_scope,
                "requested_token_type": "urn:ietf:params:oauth:token-type:access_token",
                "subject_token": subject_token.trim(),
                "subject_token_type": account.subject_token_type,
            }))
            .send()
            .await?;
        let federated = read_access_token(response).await?;

        let Some(url) = &account.service_account_impersonation_url else {
            return Ok(federated);
        };

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct ImpersonatedToken {
            access_token: String,
        }

        let response = self
            .http
            .post(url)
            .bearer_auth(&federated)
            .json(&json!({ "scope": [scope] }))
            .send()
            .await?;
        let token: ImpersonatedToken = check_response(response).await?.json().await?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl AccessTokenSource for GcpTokenCredential {
    async fn access_token(&self, scope: &str) -> Result<String> {
        match &self.credentials {
            GcpCredentials::ServiceAccount(key) => self.service_account_token(key, scope).await,
            GcpCredentials::ExternalAccount(account) => self.external_account_token(account, scope).await,
        }
    }
}

pub struct GcpProvider {
    http: reqwest::Client,
    credential: Arc<dyn AccessTokenSource>,
    endpoint: Url,
}

impl GcpProvider {
    pub fn new(http: reqwest::Client, credential: Arc<dyn AccessTokenSource>, endpoint: Url) -> Self {
        Self {
            http,
            credential,
            endpoint,
        }
    }

    /// Parse a `service_account` or `external_account` document. Tokens are fetched lazily.
    pub fn from_credentials_json(json: &[u8]) -> Result<Self> {
        let credentials: GcpCredentials = serde_json::from_slice(json)
            .map_err(|e| DpaError::Cloud(format!("invalid GCP credentials: {}", e)))?;
        let http = reqwest::Client::new();
        let endpoint = Url::parse(STORAGE_ENDPOINT)
            .map_err(|e| DpaError::Config(format!("invalid storage endpoint: {}", e)))?;
        Ok(Self::new(
            http.clone(),
            Arc::new(GcpTokenCredential::new(http, credentials)),
            endpoint,
        ))
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| DpaError::Config("storage endpoint cannot be a base URL".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

/// Map a bucket resource to the reported metadata
pub fn bucket_metadata_from_resource(bucket: &Value) -> BucketMetadata {
    let kms_key = bucket["encryption"]["defaultKmsKeyName"]
        .as_str()
        .filter(|k| !k.is_empty());
    let versioning = bucket["versioning"]["enabled"].as_bool().unwrap_or(false);

    BucketMetadata {
        encryption_algorithm: if kms_key.is_some() { "google-kms" } else { "google-managed" }.to_string(),
        versioning_status: if versioning { "Enabled" } else { "Suspended" }.to_string(),
    }
}

#[async_trait]
impl CloudProvider for GcpProvider {
    #[instrument(skip(self, config, cancel))]
    async fn upload_test(
        &self,
        config: &UploadSpeedTestConfig,
        bucket: &str,
        cancel: &CancellationToken,
    ) -> Result<UploadTestResult> {
        let payload = prepare_upload(config)?;
        let len = payload.data.len() as u64;
        info!(bytes = len, timeout = ?payload.timeout, "Starting GCS upload test");

        let token = self.credential.access_token(STORAGE_SCOPE).await?;
        let mut url = self.url(&["upload", "storage", "v1", "b", bucket, "o"])?;
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", &payload.key);

        let request = self
            .http
            .post(url)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(payload.data);

        timed_upload(len, payload.timeout, cancel, async {
            check_response(request.send().await?).await?;
            Ok(())
        })
        .await
    }

    #[instrument(skip(self))]
    async fn get_bucket_metadata(&self, bucket: &str) -> Result<BucketMetadata> {
        let token = self.credential.access_token(STORAGE_SCOPE).await?;
        let url = self.url(&["storage", "v1", "b", bucket])?;
        let response = self.http.get(url).bearer_auth(token).send().await?;
        let resource: Value = check_response(response).await?.json().await?;

        let metadata = bucket_metadata_from_resource(&resource);
        debug!(?metadata, "Retrieved GCS bucket metadata");
        Ok(metadata)
    }
}
