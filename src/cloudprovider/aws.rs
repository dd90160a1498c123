// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Amazon S3 adapter.

use super::{prepare_upload, timed_upload, BucketMetadata, CloudProvider, UploadSpeedTestConfig, UploadTestResult};
use crate::error::{DpaError, Result};
use async_trait::async_trait;
use aws_config::profile::ProfileFileCredentialsProvider;
use aws_config::provider_config::ProviderConfig;
use aws_config::{BehaviorVersion, Region};
use aws_runtime::env_config::file::{EnvConfigFileKind, EnvConfigFiles};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::operation::get_bucket_encryption::GetBucketEncryptionOutput;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

const DEFAULT_PROFILE: &str = "default";
const NO_ENCRYPTION_CONFIG: &str = "ServerSideEncryptionConfigurationNotFoundError";

pub struct AwsProvider {
    client: Client,
}

impl AwsProvider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from a shared credentials document such as the backup location
    /// secret. Static keys and `role_arn` with `web_identity_token_file` both work.
    pub async fn from_credentials_file(
        contents: &str,
        profile: Option<&str>,
        region: Option<String>,
    ) -> Result<Self> {
        if contents.trim().is_empty() {
            return Err(DpaError::Config("AWS credentials document is empty".to_string()));
        }

        let region = region.map(Region::new);
        let profile = profile.unwrap_or(DEFAULT_PROFILE);
        debug!(profile, "Loading AWS credentials from secret");

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .credentials_provider(profile_credentials(contents, profile, region.clone()));
        if let Some(region) = region {
            loader = loader.region(region);
        }
        let sdk_config = loader.load().await;
        Ok(Self::new(Client::new(&sdk_config)))
    }
}

/// Credentials resolved from `profile` in an in-memory credentials file only,
/// never from the operator's own environment
pub fn profile_credentials(
    contents: &str,
    profile: &str,
    region: Option<Region>,
) -> ProfileFileCredentialsProvider {
    let files = EnvConfigFiles::builder()
        .with_contents(EnvConfigFileKind::Credentials, contents)
        .build();
    ProfileFileCredentialsProvider::builder()
        .configure(&ProviderConfig::default().with_region(region))
        .profile_files(files)
        .profile_name(profile)
        .build()
}

fn sdk_error<E: std::error::Error>(context: &str, e: E) -> DpaError {
    DpaError::Cloud(format!("{}: {}", context, DisplayErrorContext(e)))
}

/// SSE algorithm of the first default encryption rule
fn encryption_algorithm(output: &GetBucketEncryptionOutput) -> String {
    output
        .server_side_encryption_configuration()
        .and_then(|c| c.rules().first())
        .and_then(|r| r.apply_server_side_encryption_by_default())
        .map(|d| d.sse_algorithm().as_str().to_string())
        .unwrap_or_else(|| "None".to_string())
}

#[async_trait]
impl CloudProvider for AwsProvider {
    #[instrument(skip(self, config, cancel))]
    async fn upload_test(
        &self,
        config: &UploadSpeedTestConfig,
        bucket: &str,
        cancel: &CancellationToken,
    ) -> Result<UploadTestResult> {
        let payload = prepare_upload(config)?;
        let len = payload.data.len() as u64;
        info!(bytes = len, timeout = ?payload.timeout, "Starting S3 upload test");

        let request = self
            .client
            .put_object()
            .bucket(bucket)
            .key(&payload.key)
            .content_type("application/octet-stream")
            .body(ByteStream::from(payload.data));

        timed_upload(len, payload.timeout, cancel, async {
            request
                .send()
                .await
                .map(|_| ())
                .map_err(|e| sdk_error("S3 upload failed", e))
        })
        .await
    }

    #[instrument(skip(self))]
    async fn get_bucket_metadata(&self, bucket: &str) -> Result<BucketMetadata> {
        let encryption_algorithm = match self.client.get_bucket_encryption().bucket(bucket).send().await {
            Ok(output) => encryption_algorithm(&output),
            Err(e) if e.code() == Some(NO_ENCRYPTION_CONFIG) => "None".to_string(),
            Err(e) => return Err(sdk_error("failed to get bucket encryption", e)),
        };

        let versioning = self
            .client
            .get_bucket_versioning()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| sdk_error("failed to get bucket versioning", e))?;
        // Buckets that never had versioning configured report no status at all
        let versioning_status = versioning
            .status()
            .map(|s| s.as_str().to_string())
            .unwrap_or_else(|| "Disabled".to_string());

        debug!(%encryption_algorithm, %versioning_status, "Retrieved S3 bucket metadata");
        Ok(BucketMetadata {
            encryption_algorithm,
            versioning_status,
        })
    }
}
