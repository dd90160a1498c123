// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Diff-aware writes of STS secrets and waiting for them to become readable.

use crate::constants::labels::{SECRET_TYPE, STS_SECRET_TYPE};
use crate::error::{DpaError, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{ObjectMeta, Patch, PatchParams, PostParams};
use kube::runtime::reflector::{ObjectRef, Store};
use kube::{Api, Client, ResourceExt};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::{sleep, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// What a create-or-update call did to the secret
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretWrite {
    Created,
    Patched {
        changed_keys: Vec<String>,
        removed_keys: Vec<String>,
    },
    Unchanged,
}

/// Make the named secret hold exactly `desired`.
///
/// At most one write is issued. The patch carries the resourceVersion that was read,
/// so a concurrent writer makes it fail with a conflict instead of being overwritten.
#[instrument(skip(api, desired))]
pub async fn create_or_update_sts_secret(
    api: &Api<Secret>,
    name: &str,
    desired: &BTreeMap<String, String>,
) -> Result<SecretWrite> {
    let Some(current) = api.get_opt(name).await? else {
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(BTreeMap::from([(
                    SECRET_TYPE.to_string(),
                    STS_SECRET_TYPE.to_string(),
                )])),
                ..Default::default()
            },
            string_data: Some(desired.clone()),
            ..Default::default()
        };
        api.create(&PostParams::default(), &secret).await?;
        info!("Created STS secret {}", name);
        return Ok(SecretWrite::Created);
    };

    let stored = decoded_data(&current);
    let changed_keys: Vec<String> = desired
        .iter()
        .filter(|(k, v)| stored.get(*k) != Some(*v))
        .map(|(k, _)| k.clone())
        .collect();
    let removed_keys: Vec<String> = stored
        .keys()
        .filter(|k| !desired.contains_key(*k))
        .cloned()
        .collect();

    if changed_keys.is_empty() && removed_keys.is_empty() {
        debug!("STS secret {} already up to date", name);
        return Ok(SecretWrite::Unchanged);
    }

    let string_data: Map<String, Value> = changed_keys
        .iter()
        .map(|k| (k.clone(), json!(desired[k])))
        .collect();
    let stale: Map<String, Value> = removed_keys
        .iter()
        .map(|k| (k.clone(), Value::Null))
        .collect();

    let mut patch = json!({
        "metadata": {
            "resourceVersion": current.resource_version(),
            "labels": { SECRET_TYPE: STS_SECRET_TYPE }
        },
        "stringData": string_data,
    });
    if !stale.is_empty() {
        patch["data"] = Value::Object(stale);
    }

    api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    info!(
        changed = ?changed_keys,
        removed = ?removed_keys,
        "Patched STS secret {}", name
    );
    Ok(SecretWrite::Patched {
        changed_keys,
        removed_keys,
    })
}

/// Current secret contents as text, `data` overlaid with any `stringData`
fn decoded_data(secret: &Secret) -> BTreeMap<String, String> {
    let mut out: BTreeMap<String, String> = secret
        .data
        .iter()
        .flatten()
        .map(|(k, v)| (k.clone(), String::from_utf8_lossy(&v.0).into_owned()))
        .collect();
    if let Some(string_data) = &secret.string_data {
        out.extend(string_data.clone());
    }
    out
}

/// A read path used to confirm a written secret is observable
#[async_trait]
pub trait SecretReader: Send + Sync {
    async fn secret_exists(&self, namespace: &str, name: &str) -> Result<bool>;
}

#[async_trait]
impl SecretReader for Client {
    async fn secret_exists(&self, namespace: &str, name: &str) -> Result<bool> {
        let api: Api<Secret> = Api::namespaced(self.clone(), namespace);
        Ok(api.get_opt(name).await?.is_some())
    }
}

#[async_trait]
impl SecretReader for Store<Secret> {
    async fn secret_exists(&self, namespace: &str, name: &str) -> Result<bool> {
        Ok(self.get(&ObjectRef::new(name).within(namespace)).is_some())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VisibilityWait {
    pub interval: Duration,
    pub timeout: Duration,
}

impl VisibilityWait {
    pub fn new(timeout: Duration) -> Self {
        Self {
            interval: Duration::from_millis(crate::constants::visibility::POLL_INTERVAL_MILLIS),
            timeout,
        }
    }
}

/// Poll `reader` until the secret shows up, the deadline passes, or `cancel` fires.
/// Read errors are retried until the deadline.
#[instrument(skip(reader, cancel))]
pub async fn wait_for_secret(
    reader: &dyn SecretReader,
    namespace: &str,
    name: &str,
    wait: VisibilityWait,
    cancel: &CancellationToken,
) -> Result<()> {
    let deadline = Instant::now() + wait.timeout;
    let timed_out = || DpaError::VisibilityTimeout {
        namespace: namespace.to_string(),
        name: name.to_string(),
        waited: wait.timeout,
    };
    let cancelled = || DpaError::Cancelled(format!("waiting for secret {}/{}", namespace, name));

    loop {
        let read = tokio::select! {
            _ = cancel.cancelled() => return Err(cancelled()),
            read = timeout_at(deadline, reader.secret_exists(namespace, name)) => read,
        };

        match read {
            Ok(Ok(true)) => {
                debug!("Secret {}/{} is visible", namespace, name);
                return Ok(());
            }
            Ok(Ok(false)) => debug!("Secret {}/{} not visible yet", namespace, name),
            Ok(Err(e)) => debug!("Reading secret {}/{} failed: {}", namespace, name, e),
            Err(_) => return Err(timed_out()),
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(timed_out());
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(cancelled()),
            _ = sleep(wait.interval.min(deadline - now)) => {}
        }
    }
}
