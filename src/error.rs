// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DpaError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Invalid DataProtectionApplication: {0}")]
    Validation(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Secret {namespace}/{name} not visible after {waited:?}")]
    VisibilityTimeout {
        namespace: String,
        name: String,
        waited: Duration,
    },

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Test file size {requested} exceeds maximum allowed size {max}")]
    ResourceLimit { requested: u64, max: u64 },

    #[error("Invalid file size: {0}")]
    InvalidFileSize(String),

    #[error("Upload did not finish within {0:?}")]
    UploadTimeout(Duration),

    #[error("Cloud provider error: {0}")]
    Cloud(String),

    #[error("Azure SDK error: {0}")]
    Azure(#[from] azure_core::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl DpaError {
    /// True for errors a later resync is expected to clear on its own
    pub fn is_transient(&self) -> bool {
        match self {
            DpaError::KubeError(kube::Error::Api(resp)) => {
                resp.code == 409 || resp.code == 429 || resp.code >= 500
            }
            DpaError::KubeError(_) | DpaError::Http(_) | DpaError::Azure(_) => true,
            DpaError::VisibilityTimeout { .. } | DpaError::UploadTimeout(_) => true,
            _ => false,
        }
    }

    /// True when the API server rejected a conditional write
    pub fn is_conflict(&self) -> bool {
        matches!(self, DpaError::KubeError(kube::Error::Api(resp)) if resp.code == 409)
    }
}

pub type Result<T> = std::result::Result<T, DpaError>;
