// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Cloud provider detection and the secret contents for each federated identity.

use crate::config::StsConfig;
use crate::constants::secrets::{
    AWS_CREDENTIALS_KEY, AWS_SECRET_NAME, AZURE_CLOUD_NAME, AZURE_SECRET_KEY, AZURE_SECRET_NAME,
    GCP_SECRET_JSON_KEY, GCP_SECRET_NAME, WEB_IDENTITY_TOKEN_PATH,
};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsStsCredentials {
    pub role_arn: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcpStsCredentials {
    pub service_account_email: String,
    pub project_number: String,
    pub pool_id: String,
    pub provider_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzureStsCredentials {
    pub client_id: String,
    pub tenant_id: String,
    pub subscription_id: String,
}

impl AwsStsCredentials {
    pub fn is_complete(&self) -> bool {
        !self.role_arn.is_empty()
    }
}

impl GcpStsCredentials {
    pub fn is_complete(&self) -> bool {
        !self.service_account_email.is_empty()
            && !self.project_number.is_empty()
            && !self.pool_id.is_empty()
            && !self.provider_id.is_empty()
    }

    fn audience(&self) -> String {
        format!(
            "//iam.googleapis.com/projects/{}/locations/global/workloadIdentityPools/{}/providers/{}",
            self.project_number, self.pool_id, self.provider_id
        )
    }
}

impl AzureStsCredentials {
    pub fn is_complete(&self) -> bool {
        !self.client_id.is_empty() && !self.tenant_id.is_empty() && !self.subscription_id.is_empty()
    }
}

/// Federated identity for exactly one cloud
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCredentials {
    Aws(AwsStsCredentials),
    Gcp(GcpStsCredentials),
    Azure(AzureStsCredentials),
}

impl ProviderCredentials {
    pub fn provider(&self) -> &'static str {
        match self {
            ProviderCredentials::Aws(_) => "aws",
            ProviderCredentials::Gcp(_) => "gcp",
            ProviderCredentials::Azure(_) => "azure",
        }
    }

    pub fn is_complete(&self) -> bool {
        match self {
            ProviderCredentials::Aws(c) => c.is_complete(),
            ProviderCredentials::Gcp(c) => c.is_complete(),
            ProviderCredentials::Azure(c) => c.is_complete(),
        }
    }

    /// Name of the STS secret this provider writes
    pub fn secret_name(&self) -> &'static str {
        match self {
            ProviderCredentials::Aws(_) => AWS_SECRET_NAME,
            ProviderCredentials::Gcp(_) => GCP_SECRET_NAME,
            ProviderCredentials::Azure(_) => AZURE_SECRET_NAME,
        }
    }

    /// Full desired contents of the STS secret
    pub fn string_data(&self) -> BTreeMap<String, String> {
        let (key, value) = match self {
            ProviderCredentials::Aws(c) => (
                AWS_CREDENTIALS_KEY,
                format!(
                    "[default]\nsts_regional_endpoints = regional\nrole_arn = {}\nweb_identity_token_file = {}",
                    c.role_arn, WEB_IDENTITY_TOKEN_PATH
                ),
            ),
            ProviderCredentials::Gcp(c) => (GCP_SECRET_JSON_KEY, gcp_external_account(c)),
            ProviderCredentials::Azure(c) => (
                AZURE_SECRET_KEY,
                format!(
                    "\nAZURE_SUBSCRIPTION_ID={}\nAZURE_TENANT_ID={}\nAZURE_CLIENT_ID={}\nAZURE_CLOUD_NAME={}\n",
                    c.subscription_id, c.tenant_id, c.client_id, AZURE_CLOUD_NAME
                ),
            ),
        };
        BTreeMap::from([(key.to_string(), value)])
    }
}

fn gcp_external_account(c: &GcpStsCredentials) -> String {
    let document = json!({
        "type": "external_account",
        "audience": c.audience(),
        "subject_token_type": "urn:ietf:params:oauth:token-type:jwt",
        "token_url": "https://sts.googleapis.com/v1/token",
        "service_account_impersonation_url": format!(
            "https://iamcredentials.googleapis.com/v1/projects/-/serviceAccounts/{}:generateAccessToken",
            c.service_account_email
        ),
        "credential_source": {
            "file": WEB_IDENTITY_TOKEN_PATH,
            "format": {"type": "text"}
        }
    });
    // A json! value always serializes
    serde_json::to_string_pretty(&document).unwrap_or_else(|_| document.to_string())
}

/// Pick the federated identity to provision.
///
/// AWS wins over GCP, GCP over Azure. Incomplete providers are never selected.
pub fn select_credentials(sts: &StsConfig) -> Option<ProviderCredentials> {
    let candidates = [
        ProviderCredentials::Aws(AwsStsCredentials {
            role_arn: sts.role_arn.clone(),
        }),
        ProviderCredentials::Gcp(GcpStsCredentials {
            service_account_email: sts.service_account_email.clone(),
            project_number: sts.project_number.clone(),
            pool_id: sts.pool_id.clone(),
            provider_id: sts.provider_id.clone(),
        }),
        ProviderCredentials::Azure(AzureStsCredentials {
            client_id: sts.client_id.clone(),
            tenant_id: sts.tenant_id.clone(),
            subscription_id: sts.subscription_id.clone(),
        }),
    ];

    let mut complete = candidates.into_iter().filter(ProviderCredentials::is_complete);
    let selected = complete.next()?;
    let ignored: Vec<&str> = complete.map(|c| c.provider()).collect();
    if !ignored.is_empty() {
        warn!(
            selected = selected.provider(),
            ?ignored,
            "Multiple cloud identities are configured, using the highest priority one"
        );
    }
    Some(selected)
}
