// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// Kubernetes label keys and values used by the operator
pub mod labels {
    /// Marks objects that belong to the operator
    pub const OADP_OPERATOR: &str = "openshift.io/oadp";
    pub const OADP_OPERATOR_VALUE: &str = "True";
    /// Name of the DataProtectionApplication an object belongs to
    pub const DPA_NAME: &str = "dataprotectionapplication.name";
    /// Type marker set on every STS secret
    pub const SECRET_TYPE: &str = "oadp.openshift.io/secret-type";
    pub const STS_SECRET_TYPE: &str = "sts-credentials";

    pub const APP_NAME: &str = "app.kubernetes.io/name";
    pub const APP_INSTANCE: &str = "app.kubernetes.io/instance";
    pub const APP_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
    pub const APP_COMPONENT: &str = "app.kubernetes.io/component";
}

/// Kubernetes annotation keys used by the operator
pub mod annotations {
    /// Azure workload identity client id on the velero service account
    pub const AZURE_WORKLOAD_IDENTITY_CLIENT_ID: &str = "azure.workload.identity/client-id";
}

/// Environment variable names carrying the STS federation settings
pub mod env {
    pub const ROLE_ARN: &str = "ROLEARN";
    pub const SERVICE_ACCOUNT_EMAIL: &str = "SERVICE_ACCOUNT_EMAIL";
    pub const PROJECT_NUMBER: &str = "PROJECT_NUMBER";
    pub const POOL_ID: &str = "POOL_ID";
    pub const PROVIDER_ID: &str = "PROVIDER_ID";
    pub const CLIENT_ID: &str = "CLIENTID";
    pub const TENANT_ID: &str = "TENANTID";
    pub const SUBSCRIPTION_ID: &str = "SUBSCRIPTIONID";

    pub const WATCH_NAMESPACE: &str = "WATCH_NAMESPACE";
    pub const RESYNC_INTERVAL_SECS: &str = "RESYNC_INTERVAL_SECS";
    pub const STS_SECRET_WAIT_TIMEOUT_SECS: &str = "STS_SECRET_WAIT_TIMEOUT_SECS";
    pub const LOG_FORMAT: &str = "LOG_FORMAT";
}

/// Names and keys of the secrets the operator materializes
pub mod secrets {
    /// Projected service account token the cloud SDKs exchange for credentials
    pub const WEB_IDENTITY_TOKEN_PATH: &str = "/var/run/secrets/openshift/serviceaccount/token";

    pub const AWS_SECRET_NAME: &str = "cloud-credentials";
    pub const AWS_CREDENTIALS_KEY: &str = "credentials";

    pub const GCP_SECRET_NAME: &str = "cloud-credentials-gcp";
    pub const GCP_SECRET_JSON_KEY: &str = "service_account.json";

    pub const AZURE_SECRET_NAME: &str = "cloud-credentials-azure";
    pub const AZURE_SECRET_KEY: &str = "azurekey";
    pub const AZURE_CLOUD_NAME: &str = "AzurePublicCloud";

    pub const AZURE_WORKLOAD_IDENTITY_SECRET_NAME: &str = "azure-workload-identity-env";
}

/// Status condition vocabulary of the DataProtectionApplication
pub mod conditions {
    pub const RECONCILED: &str = "Reconciled";
    pub const REASON_COMPLETE: &str = "Complete";
    pub const REASON_ERROR: &str = "Error";
    pub const RECONCILE_COMPLETE_MESSAGE: &str = "Reconcile complete";
}

/// The operator name used for field managers and events
pub const OPERATOR_NAME: &str = "oadp-operator";

/// Service account the velero workloads run as
pub const VELERO_SERVICE_ACCOUNT: &str = "velero";

/// CRD polling configuration
pub mod crd {
    /// Initial polling interval in seconds when waiting for CRD
    pub const POLL_INTERVAL_SECS: u64 = 10;
    /// Maximum polling interval in seconds (exponential backoff cap)
    pub const POLL_MAX_INTERVAL_SECS: u64 = 60;
}

/// Wait-for-visibility polling of freshly written secrets
pub mod visibility {
    pub const POLL_INTERVAL_MILLIS: u64 = 1000;
}
