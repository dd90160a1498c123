// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::env as keys;
use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 300;
const DEFAULT_STS_SECRET_WAIT_TIMEOUT_SECS: u64 = 120;

/// Operator configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Namespace holding the DataProtectionApplication and its secrets
    pub watch_namespace: String,
    pub sts: StsConfig,
    /// Requeue interval after a successful reconcile
    pub resync_interval: Duration,
    /// How long startup waits for the STS secret to become readable
    pub sts_wait_timeout: Duration,
    pub json_logs: bool,
}

/// Cloud identity federation settings. An empty field means "not configured".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StsConfig {
    pub role_arn: String,
    pub service_account_email: String,
    pub project_number: String,
    pub pool_id: String,
    pub provider_id: String,
    pub client_id: String,
    pub tenant_id: String,
    pub subscription_id: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let watch_namespace = env::var(keys::WATCH_NAMESPACE)
            .context("WATCH_NAMESPACE environment variable not set")?;

        let resync_interval = parse_secs(keys::RESYNC_INTERVAL_SECS, DEFAULT_RESYNC_INTERVAL_SECS)?;
        let sts_wait_timeout = parse_secs(
            keys::STS_SECRET_WAIT_TIMEOUT_SECS,
            DEFAULT_STS_SECRET_WAIT_TIMEOUT_SECS,
        )?;
        let json_logs = env::var(keys::LOG_FORMAT).is_ok_and(|f| f.eq_ignore_ascii_case("json"));

        Ok(Config {
            watch_namespace,
            sts: StsConfig::from_lookup(|key| env::var(key).ok()),
            resync_interval,
            sts_wait_timeout,
            json_logs,
        })
    }
}

impl StsConfig {
    /// Build the federation settings from any key/value source
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).unwrap_or_default();

        StsConfig {
            role_arn: get(keys::ROLE_ARN),
            service_account_email: get(keys::SERVICE_ACCOUNT_EMAIL),
            project_number: get(keys::PROJECT_NUMBER),
            pool_id: get(keys::POOL_ID),
            provider_id: get(keys::PROVIDER_ID),
            client_id: get(keys::CLIENT_ID),
            tenant_id: get(keys::TENANT_ID),
            subscription_id: get(keys::SUBSCRIPTION_ID),
        }
    }
}

fn parse_secs(key: &str, default: u64) -> Result<Duration> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .with_context(|| format!("{} must be a number of seconds, got '{}'", key, raw)),
        Err(_) => Ok(Duration::from_secs(default)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_sts_config_from_lookup_reads_all_keys() {
        let values = HashMap::from([
            (keys::ROLE_ARN, "arn:aws:iam::123456789012:role/velero"),
            (keys::CLIENT_ID, "client"),
            (keys::TENANT_ID, "tenant"),
            (keys::SUBSCRIPTION_ID, "sub"),
        ]);

        let sts = StsConfig::from_lookup(|k| values.get(k).map(|v| v.to_string()));

        assert_eq!(sts.role_arn, "arn:aws:iam::123456789012:role/velero");
        assert_eq!(sts.client_id, "client");
        assert_eq!(sts.tenant_id, "tenant");
        assert_eq!(sts.subscription_id, "sub");
        assert!(sts.service_account_email.is_empty());
    }

    #[test]
    fn test_sts_config_trims_whitespace() {
        let sts = StsConfig::from_lookup(|k| (k == keys::POOL_ID).then(|| "  pool \n".to_string()));
        assert_eq!(sts.pool_id, "pool");
    }

    #[test]
    fn test_sts_config_empty_source() {
        assert_eq!(StsConfig::from_lookup(|_| None), StsConfig::default());
    }
}
