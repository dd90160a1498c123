// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Object storage adapters used to measure upload throughput and read bucket settings.

pub mod aws;
pub mod azure;
pub mod gcp;

use crate::error::{DpaError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use k8s_openapi::ByteString;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Largest payload an upload test may allocate
pub const MAX_TEST_FILE_BYTES: u64 = 200 * 1024 * 1024;
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSpeedTestConfig {
    /// Size with an optional unit, e.g. `10MB` or `512KiB`
    pub file_size: String,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTestResult {
    pub speed_mbps: u64,
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketMetadata {
    pub encryption_algorithm: String,
    pub versioning_status: String,
}

#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Upload a generated object of `config.file_size` bytes and report the throughput
    async fn upload_test(
        &self,
        config: &UploadSpeedTestConfig,
        bucket: &str,
        cancel: &CancellationToken,
    ) -> Result<UploadTestResult>;

    async fn get_bucket_metadata(&self, bucket: &str) -> Result<BucketMetadata>;
}

/// Build the adapter for a backup location provider from its credential secret data.
///
/// `credential_key` selects the AWS or GCP credentials document; Azure reads well-known keys.
pub async fn new_cloud_provider(
    provider: &str,
    secret_data: &BTreeMap<String, ByteString>,
    credential_key: Option<&str>,
    region: Option<String>,
) -> Result<Box<dyn CloudProvider>> {
    let provider = provider.strip_prefix("velero.io/").unwrap_or(provider);
    match provider {
        "aws" => {
            let document = credential_document(secret_data, credential_key)
                .ok_or_else(|| DpaError::Config("AWS credentials not found in secret".to_string()))?;
            let contents = String::from_utf8_lossy(&document.0);
            Ok(Box::new(
                aws::AwsProvider::from_credentials_file(&contents, None, region).await?,
            ))
        }
        "gcp" => {
            let json = credential_document(secret_data, credential_key)
                .ok_or_else(|| DpaError::Config("GCP credentials not found in secret".to_string()))?;
            Ok(Box::new(gcp::GcpProvider::from_credentials_json(&json.0)?))
        }
        "azure" => {
            let credentials = azure::AzureCredentials::from_secret_data(secret_data);
            Ok(Box::new(azure::AzureProvider::new(credentials).await?))
        }
        other => Err(DpaError::Config(format!(
            "unsupported cloud provider '{}'",
            other
        ))),
    }
}

/// The secret entry named by `credential_key`, or the first entry when no key is set
fn credential_document<'a>(
    secret_data: &'a BTreeMap<String, ByteString>,
    credential_key: Option<&str>,
) -> Option<&'a ByteString> {
    match credential_key {
        Some(key) => secret_data.get(key),
        None => secret_data.values().next(),
    }
}

/// Parse a size such as `100`, `1.5MB` or `10 GiB` into bytes.
///
/// Units are case-insensitive binary multiples; a bare number is bytes.
pub fn parse_file_size(size: &str) -> Result<u64> {
    let invalid = || DpaError::InvalidFileSize(size.to_string());
    let trimmed = size.trim();
    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);

    let value: f64 = number.parse().map_err(|_| invalid())?;
    let multiplier: u64 = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" | "KIB" => 1 << 10,
        "M" | "MB" | "MIB" => 1 << 20,
        "G" | "GB" | "GIB" => 1 << 30,
        "T" | "TB" | "TIB" => 1 << 40,
        _ => return Err(invalid()),
    };

    let bytes = value * multiplier as f64;
    if !bytes.is_finite() || bytes > u64::MAX as f64 {
        return Err(invalid());
    }
    Ok(bytes as u64)
}

/// An in-memory object ready to be uploaded
#[derive(Debug)]
pub struct TestPayload {
    pub key: String,
    pub data: Bytes,
    pub timeout: Duration,
}

/// Validate the test config and allocate the payload. Nothing touches the network here.
pub fn prepare_upload(config: &UploadSpeedTestConfig) -> Result<TestPayload> {
    let size = parse_file_size(&config.file_size)?;
    if size > MAX_TEST_FILE_BYTES {
        return Err(DpaError::ResourceLimit {
            requested: size,
            max: MAX_TEST_FILE_BYTES,
        });
    }

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();

    Ok(TestPayload {
        key: format!("dpt-upload-test-{}", nanos),
        data: Bytes::from(vec![b'0'; size as usize]),
        timeout: config.timeout.filter(|t| !t.is_zero()).unwrap_or(DEFAULT_UPLOAD_TIMEOUT),
    })
}

/// Whole megabits per second. An unmeasurably short upload reports 0.
pub fn speed_mbps(bytes: u64, duration: Duration) -> u64 {
    let secs = duration.as_secs_f64();
    if secs <= 0.0 {
        return 0;
    }
    ((bytes as f64 * 8.0) / secs / 1_000_000.0) as u64
}

/// Run `upload` under the payload timeout and `cancel`, timing only the upload itself
pub async fn timed_upload<F>(
    payload_len: u64,
    timeout: Duration,
    cancel: &CancellationToken,
    upload: F,
) -> Result<UploadTestResult>
where
    F: Future<Output = Result<()>>,
{
    let start = Instant::now();
    tokio::select! {
        _ = cancel.cancelled() => return Err(DpaError::Cancelled("upload test".to_string())),
        res = tokio::time::timeout(timeout, upload) => {
            res.map_err(|_| DpaError::UploadTimeout(timeout))??
        }
    }
    let duration = start.elapsed();

    let speed = speed_mbps(payload_len, duration);
    info!(bytes = payload_len, ?duration, speed_mbps = speed, "Upload test completed");
    Ok(UploadTestResult {
        speed_mbps: speed,
        duration,
    })
}

#[derive(Deserialize)]
struct AccessTokenResponse {
    access_token: String,
}

/// Extract `access_token` from an OAuth2 token endpoint response
pub(crate) async fn read_access_token(response: reqwest::Response) -> Result<String> {
    let response = check_response(response).await?;
    Ok(response.json::<AccessTokenResponse>().await?.access_token)
}

/// Turn a non-success HTTP status into a `Cloud` error carrying the response body
pub(crate) async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().clone();
    let body = response.text().await.unwrap_or_default();
    Err(DpaError::Cloud(format!(
        "{} returned {}: {}",
        url.path(),
        status,
        body.trim()
    )))
}
